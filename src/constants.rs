// src/constants.rs

/// Default verbosity when no environment override is given (Info).
pub const DEFAULT_VERBOSITY: i64 = 2;

/// Default per-command timeout in seconds. Zero disables the facility.
pub const DEFAULT_TIMEOUT_SECS: i64 = 30;

/// Default bound on each existence cache.
pub const DEFAULT_CACHE_MAX_SIZE: i64 = 100;

/// Default depth at which the logging recursion guard turns fatal.
pub const DEFAULT_LOG_MAX_DEPTH: i64 = 8;

/// Default render stride for long progress loops (totals above 25).
pub const DEFAULT_PROGRESS_UPDATE_INTERVAL: i64 = 10;

/// Exit code for failures with no more specific code of their own.
pub const FAILURE_EXIT_CODE: i32 = 1;

/// Exit code reported when a supervised child outlives its deadline.
/// Matches the coreutils `timeout` convention so scripts can test for it.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Exit code reported when execution is refused or aborted before spawn.
pub const BLOCKED_EXIT_CODE: i32 = 126;

/// Exit code reported when a run is abandoned because of an interrupt.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Upper bound on symlink indirections during manual path resolution.
pub const SYMLINK_LOOP_GUARD: u32 = 32;

/// Terminal width assumed when no probe succeeds.
pub const FALLBACK_TERMINAL_WIDTH: usize = 80;

/// Widths below this render the compact progress form.
pub const NARROW_TERMINAL_WIDTH: usize = 60;

/// The name of the directory containing rckit configuration.
pub const RCKIT_CONFIG_DIR: &str = "rckit";

/// The name of the shell-init trust allow-list file (inside the config dir).
pub const TRUST_FILENAME: &str = "trust.toml";

// Environment variables read once at startup to seed the registry.

/// Seeds `verbosity`.
pub const ENV_VERBOSITY: &str = "RCKIT_VERBOSITY";
/// Seeds `performance_mode`.
pub const ENV_PERFORMANCE_MODE: &str = "RCKIT_PERFORMANCE_MODE";
/// Seeds `show_progress`.
pub const ENV_SHOW_PROGRESS: &str = "RCKIT_SHOW_PROGRESS";
/// Seeds `cache_max_size`.
pub const ENV_CACHE_MAX_SIZE: &str = "RCKIT_CACHE_MAX_SIZE";
/// Seeds `timeout_default`.
pub const ENV_TIMEOUT_DEFAULT: &str = "RCKIT_TIMEOUT_DEFAULT";
/// Seeds `log_max_depth`.
pub const ENV_LOG_MAX_DEPTH: &str = "RCKIT_LOG_MAX_DEPTH";
/// Seeds `progress_update_interval`.
pub const ENV_PROGRESS_UPDATE_INTERVAL: &str = "RCKIT_PROGRESS_UPDATE_INTERVAL";
