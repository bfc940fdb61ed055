// src/models.rs

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// --- LOGGING MODELS ---

/// Diagnostic severity, ordered from most to least urgent.
///
/// The numeric values are part of the configuration surface: verbosity is
/// stored in the registry as an integer and messages are emitted only when
/// their level's value is less than or equal to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
}

impl LogLevel {
    /// Maps a raw numeric level to a known one. Returns `None` for values
    /// outside the 0..=3 range so callers can reject bad levels explicitly.
    pub fn from_value(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Error),
            1 => Some(Self::Warn),
            2 => Some(Self::Info),
            3 => Some(Self::Debug),
            _ => None,
        }
    }

    pub fn value(self) -> i64 {
        self as i64
    }

    /// The bracketed tag rendered in front of each diagnostic line.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warn => "WARN",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

// --- CONFIG REGISTRY MODELS ---

/// A registry value. The key set and each key's variant are fixed at
/// startup; overwrites must keep the variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingValue {
    Integer(i64),
    Boolean(bool),
}

impl SettingValue {
    pub fn as_integer(self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(v),
            Self::Boolean(_) => None,
        }
    }

    pub fn as_bool(self) -> Option<bool> {
        match self {
            Self::Boolean(v) => Some(v),
            Self::Integer(_) => None,
        }
    }

    /// Variant name used in type-mismatch diagnostics.
    pub fn kind(self) -> &'static str {
        match self {
            Self::Integer(_) => "integer",
            Self::Boolean(_) => "boolean",
        }
    }
}

// --- SECURITY SCANNER MODELS ---

/// A family of destructive idioms the scanner knows how to recognize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreatCategory {
    FilesystemDestruction,
    DeviceManipulation,
    NetworkToShell,
    ProcessManipulation,
    PermissionEscalation,
}

impl ThreatCategory {
    pub fn label(self) -> &'static str {
        match self {
            Self::FilesystemDestruction => "filesystem destruction",
            Self::DeviceManipulation => "device manipulation",
            Self::NetworkToShell => "network-to-shell execution",
            Self::ProcessManipulation => "process manipulation",
            Self::PermissionEscalation => "permission escalation",
        }
    }
}

impl fmt::Display for ThreatCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// How severe a category is. Performance mode narrows scanning to
/// `Critical` categories instead of disabling the scanner outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RiskTier {
    High,
    Critical,
}

/// The scanner's verdict. Scanning never fails; it always produces one of
/// these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDecision {
    Allow,
    Block(ThreatCategory),
}

// --- EXECUTION MODELS ---

/// Who vouches for a piece of command text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustLevel {
    /// Arbitrary caller-supplied text; always scanned, always bounded.
    Untrusted,
    /// Recognized startup-tool invocation from the trust allow-list.
    ShellInit,
}

/// How the text is handed to the operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    /// One command line, split into words and spawned directly.
    RunIsolated,
    /// Arbitrary shell code, staged into a script and run by the shell.
    EvalInline,
}

/// A fully described unit of work for the execution layer.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    pub text: String,
    /// Explicit deadline in seconds; `None` falls back to the registry
    /// default, and a resolved value of zero means no facility.
    pub timeout_secs: Option<u64>,
    pub mode: ExecMode,
    pub trust: TrustLevel,
    /// Run in the caller's context: inherit everything, no deadline.
    pub force_current_shell: bool,
}

impl ExecRequest {
    pub fn run(text: impl Into<String>, timeout_secs: Option<u64>) -> Self {
        Self {
            text: text.into(),
            timeout_secs,
            mode: ExecMode::RunIsolated,
            trust: TrustLevel::Untrusted,
            force_current_shell: false,
        }
    }

    pub fn eval(
        text: impl Into<String>,
        timeout_secs: Option<u64>,
        force_current_shell: bool,
    ) -> Self {
        Self {
            text: text.into(),
            timeout_secs,
            mode: ExecMode::EvalInline,
            trust: TrustLevel::Untrusted,
            force_current_shell,
        }
    }
}

// --- STATE MANAGER MODELS ---

/// What kind of binding `unset` should remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnsetKind {
    Var,
    Func,
    /// Try the variable interpretation first, then the callable one.
    #[default]
    Auto,
}

/// Result of a safe-unset attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsetOutcome {
    Removed,
    NotFound,
    /// The binding exists but carries the read-only mark; it was left
    /// untouched.
    ReadOnlyBlocked,
}

// --- PLATFORM MODELS ---

/// Boolean platform flags, computed once per process.
///
/// At most one primary flag (`is_macos`, `is_linux`, `is_bsd`, `is_cygwin`)
/// is set; `is_wsl` and `is_termux` are secondary flags that ride alongside
/// `is_linux`. `is_unknown` is set when nothing matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlatformInfo {
    pub is_macos: bool,
    pub is_linux: bool,
    pub is_bsd: bool,
    pub is_cygwin: bool,
    pub is_wsl: bool,
    pub is_termux: bool,
    pub is_unknown: bool,
}

// --- FILESYSTEM MODELS ---

/// Where `add_to_path` places a new directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathPosition {
    Prepend,
    Append,
}

// --- TRUST ALLOW-LIST MODELS (for trust.toml) ---

/// On-disk shape of the shell-init trust allow-list.
///
/// Keys are tool names matched against the first word of a command line;
/// a `false` value disables a tool without deleting the entry.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct TrustConfig {
    #[serde(default)]
    pub tools: BTreeMap<String, bool>,
}
