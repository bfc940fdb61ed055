// src/runtime.rs

//! The runtime context: one explicitly constructed handle that owns the
//! registry, the logger, the caches, the scanner, the state manager, and
//! the execution layer, and exposes the call surface startup scripts
//! consume. There is no ambient global; embedders build a `Runtime` and
//! thread it through.

use crate::InterruptFlag;
use crate::constants::{BLOCKED_EXIT_CODE, FAILURE_EXIT_CODE, INTERRUPTED_EXIT_CODE};
use crate::core::cache::ExistenceCaches;
use crate::core::logging::{LogError, Logger};
use crate::core::progress::{self, Progress};
use crate::core::scanner::Scanner;
use crate::core::settings::Settings;
use crate::core::state::{StateError, StateManager};
use crate::models::{
    ExecRequest, LogLevel, PathPosition, PlatformInfo, UnsetKind, UnsetOutcome,
};
use crate::system::executor::{ExecError, Executor};
use crate::system::paths::{self, PathError};
use crate::system::platform::PlatformDetector;
use crate::system::source::{SourceError, SourceLoader};
use crate::system::trust::TrustList;
use anyhow::Context;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// One fully wired runtime instance.
#[derive(Debug)]
pub struct Runtime {
    settings: Arc<Settings>,
    logger: Arc<Logger>,
    caches: ExistenceCaches,
    state: StateManager,
    progress: Progress,
    platform: PlatformDetector,
    executor: Executor,
    sourcer: SourceLoader,
    interrupt: InterruptFlag,
    /// Environment overrides applied to every spawned child. `PATH` lands
    /// here when `add_to_path` edits it; the process's own environment is
    /// never mutated.
    exports: Mutex<HashMap<String, String>>,
}

impl Runtime {
    /// Builds the full component graph with settings seeded from the
    /// process environment and the trust list loaded from (or written to)
    /// the user config directory.
    pub fn from_env() -> anyhow::Result<Self> {
        let trust = TrustList::load_or_generate()
            .context("Failed to load the shell-init trust list")?;
        Ok(Self::with_parts(Settings::from_env(), trust))
    }

    /// Assembles a runtime from explicit parts. Tests and embedders with
    /// their own configuration story start here.
    pub fn with_parts(settings: Settings, trust: TrustList) -> Self {
        let settings = Arc::new(settings);
        let logger = Arc::new(Logger::new(Arc::clone(&settings)));
        let interrupt: InterruptFlag = Arc::new(AtomicBool::new(false));
        let scanner = Scanner::new(Arc::clone(&settings), Arc::clone(&logger));
        let executor = Executor::new(
            Arc::clone(&settings),
            Arc::clone(&logger),
            scanner,
            trust,
            Arc::clone(&interrupt),
        );
        let sourcer = SourceLoader::new(
            Arc::clone(&settings),
            Arc::clone(&logger),
            Arc::clone(&interrupt),
        );
        Self {
            caches: ExistenceCaches::new(Arc::clone(&settings)),
            state: StateManager::new(Arc::clone(&logger)),
            progress: Progress::new(Arc::clone(&settings)),
            platform: PlatformDetector::new(),
            executor,
            sourcer,
            interrupt,
            exports: Mutex::new(HashMap::new()),
            settings,
            logger,
        }
    }

    /// Wires SIGINT/SIGTERM to the interrupt flag. Call at most once per
    /// process.
    pub fn install_signal_hooks(&self) -> anyhow::Result<()> {
        let flag = Arc::clone(&self.interrupt);
        ctrlc::set_handler(move || {
            flag.store(true, Ordering::SeqCst);
        })
        .context("Failed to install the interrupt handler")?;
        Ok(())
    }

    /// A clone of the process-wide interrupt flag, for embedders that set
    /// or observe it themselves.
    pub fn interrupt_flag(&self) -> InterruptFlag {
        Arc::clone(&self.interrupt)
    }

    pub fn interrupted(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    // --- 1. Logging ---

    pub fn log_error(&self, message: &str) -> Result<(), LogError> {
        self.logger.error(message)
    }

    pub fn log_warn(&self, message: &str) -> Result<(), LogError> {
        self.logger.warn(message)
    }

    pub fn log_info(&self, message: &str) -> Result<(), LogError> {
        self.logger.info(message)
    }

    pub fn log_debug(&self, message: &str) -> Result<(), LogError> {
        self.logger.debug(message)
    }

    pub fn verbosity(&self) -> LogLevel {
        self.settings.verbosity()
    }

    /// Raises verbosity to Debug for the rest of the process.
    pub fn enable_debug(&self) {
        self.settings.set_verbosity(LogLevel::Debug);
        let _ = self.logger.debug("Verbose diagnostics enabled.");
    }

    // --- 2. Execution ---

    /// Runs one command line under the safety envelope and maps every
    /// refusal to its conventional exit code. The typed variant is
    /// [`Runtime::execute`].
    pub fn run(&self, command: &str, timeout_secs: Option<u64>) -> i32 {
        self.dispatch(&ExecRequest::run(command, timeout_secs))
    }

    /// Evaluates shell code via a staged script, same conventions as
    /// [`Runtime::run`].
    pub fn eval(&self, code: &str, timeout_secs: Option<u64>, force_current_shell: bool) -> i32 {
        self.dispatch(&ExecRequest::eval(code, timeout_secs, force_current_shell))
    }

    /// Full-fidelity execution for callers that want the typed errors.
    pub fn execute(&self, request: &ExecRequest) -> Result<i32, ExecError> {
        self.executor.execute(request, &self.env_snapshot())
    }

    /// Invokes a registered callable by name.
    pub fn call(&self, name: &str, args: &[String]) -> Result<i32, StateError> {
        self.state.call(name, args)
    }

    /// Installs a named callable for later [`Runtime::call`] dispatch.
    pub fn register<F>(&self, name: &str, callable: F)
    where
        F: Fn(&[String]) -> i32 + Send + Sync + 'static,
    {
        self.state.register(name, callable);
        // A cached "not found" from before the registration is now stale.
        self.caches.evict_function(name);
    }

    // --- 3. Caching ---

    pub fn function_exists(&self, name: &str) -> bool {
        self.caches
            .function_exists(name, |probed| self.state.has_function(probed))
    }

    pub fn command_exists(&self, name: &str) -> bool {
        self.caches.command_exists(name, |probed| {
            paths::find_in_path(probed, self.effective_path().as_deref())
        })
    }

    // --- 4. Filesystem ---

    pub fn resolve_path(&self, path: &str) -> Result<PathBuf, PathError> {
        paths::resolve(path).inspect_err(|e| {
            let _ = self.logger.error(&e.to_string());
        })
    }

    pub fn source_safely(&self, path: &str, args: &[String]) -> Result<i32, SourceError> {
        self.sourcer.source_safely(path, args, &self.env_snapshot())
    }

    /// Inserts `dir` into the PATH seen by spawned children and by
    /// [`Runtime::command_exists`]. Returns whether anything changed; an
    /// already-present directory is a no-op.
    pub fn add_to_path(&self, dir: &Path, position: PathPosition) -> Result<bool, PathError> {
        let current = self.effective_path();
        match paths::insert_path_entry(current.as_deref(), dir, position)? {
            Some(updated) => {
                self.lock_exports().insert("PATH".to_string(), updated);
                // Cached "not found" answers may now be wrong.
                self.caches.clear_commands();
                let _ = self
                    .logger
                    .debug(&format!("Added '{}' to PATH.", dir.display()));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // --- 5. State ---

    pub fn set_var(&self, name: &str, value: impl Into<String>) -> Result<(), StateError> {
        self.state.set_var(name, value)
    }

    pub fn var(&self, name: &str) -> Option<String> {
        self.state.var(name)
    }

    pub fn mark_read_only(&self, name: &str) -> bool {
        self.state.mark_read_only(name)
    }

    /// Safe unset across both namespaces, keeping the existence cache
    /// coherent with the removal.
    pub fn unset(&self, name: &str, kind: UnsetKind) -> UnsetOutcome {
        self.state.unset(name, kind, &self.caches)
    }

    // --- 6. UI and platform ---

    pub fn show_progress(&self, current: u64, total: u64, label: &str) -> bool {
        self.progress.show(current, total, label)
    }

    pub fn terminal_width(&self) -> usize {
        progress::terminal_width()
    }

    pub fn detect_platform(&self) -> PlatformInfo {
        self.platform.detect()
    }

    // --- Internals ---

    fn dispatch(&self, request: &ExecRequest) -> i32 {
        match self.executor.execute(request, &self.env_snapshot()) {
            Ok(code) => code,
            Err(error) => {
                // Refusals the execution layer has not already reported
                // still get one diagnostic line on this code-only surface.
                if matches!(
                    error,
                    ExecError::CommandParse(_)
                        | ExecError::CommandFailed(..)
                        | ExecError::ScriptStage(_)
                        | ExecError::InvalidUtf8Output { .. }
                ) {
                    let _ = self.logger.error(&error.to_string());
                }
                exit_code_for(&error)
            }
        }
    }

    fn env_snapshot(&self) -> HashMap<String, String> {
        self.lock_exports().clone()
    }

    fn effective_path(&self) -> Option<String> {
        if let Some(path) = self.lock_exports().get("PATH") {
            return Some(path.clone());
        }
        std::env::var("PATH").ok()
    }

    fn lock_exports(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.exports.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exit code for a refusal that never reached a child process.
fn exit_code_for(error: &ExecError) -> i32 {
    match error {
        ExecError::Blocked(_) | ExecError::TimeoutUnavailable => BLOCKED_EXIT_CODE,
        ExecError::Interrupted => INTERRUPTED_EXIT_CODE,
        _ => FAILURE_EXIT_CODE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SettingValue;

    fn runtime() -> Runtime {
        Runtime::with_parts(Settings::defaults(), TrustList::empty())
    }

    #[test]
    fn default_construction_starts_at_info() {
        let rt = runtime();
        assert_eq!(rt.verbosity(), LogLevel::Info);
        assert!(!rt.interrupted());
        rt.enable_debug();
        assert_eq!(rt.verbosity(), LogLevel::Debug);
    }

    #[test]
    fn callables_flow_through_registry_cache_and_unset() {
        let rt = runtime();
        assert!(!rt.function_exists("greet"));

        // Registration drops the stale negative the probe above cached.
        rt.register("greet", |_| 0);
        assert!(rt.function_exists("greet"));

        assert_eq!(rt.unset("greet", UnsetKind::Auto), UnsetOutcome::Removed);
        assert!(!rt.function_exists("greet"));
        assert!(matches!(
            rt.call("greet", &[]),
            Err(StateError::FunctionNotFound(_))
        ));
    }

    #[test]
    fn call_reaches_the_registered_callable() {
        let rt = runtime();
        rt.register("count", |args| i32::try_from(args.len()).unwrap_or(i32::MAX));
        let args = vec!["a".to_string(), "b".to_string()];
        assert_eq!(rt.call("count", &args).unwrap(), 2);
    }

    #[test]
    fn blocked_commands_map_to_the_blocked_code() {
        let rt = runtime();
        assert_eq!(rt.run("rm -rf /", None), BLOCKED_EXIT_CODE);
    }

    #[test]
    fn interrupt_flag_handle_controls_execution() {
        let rt = runtime();
        rt.interrupt_flag().store(true, Ordering::SeqCst);
        assert!(rt.interrupted());
        assert_eq!(rt.run("true", None), INTERRUPTED_EXIT_CODE);
    }

    #[test]
    fn missing_timeout_facility_maps_to_the_blocked_code() {
        let rt = runtime();
        rt.settings()
            .set("timeout_default", SettingValue::Integer(0))
            .unwrap();
        assert_eq!(rt.run("some-tool", None), BLOCKED_EXIT_CODE);
    }

    #[test]
    fn variables_respect_the_read_only_mark() {
        let rt = runtime();
        rt.set_var("EDITOR", "vi").unwrap();
        assert_eq!(rt.var("EDITOR").as_deref(), Some("vi"));
        assert!(rt.mark_read_only("EDITOR"));
        assert_eq!(
            rt.unset("EDITOR", UnsetKind::Var),
            UnsetOutcome::ReadOnlyBlocked
        );
        assert_eq!(rt.var("EDITOR").as_deref(), Some("vi"));
    }

    #[test]
    fn path_edits_feed_the_command_probe_and_invalidate_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("fakecmd");
        std::fs::write(&exe, "#!/bin/sh\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let rt = runtime();
        // Miss first, so a stale negative answer is in the cache.
        assert!(!rt.command_exists("fakecmd"));

        assert!(rt.add_to_path(dir.path(), PathPosition::Prepend).unwrap());
        assert!(rt.command_exists("fakecmd"));

        // Second insertion of the same directory is a no-op.
        assert!(!rt.add_to_path(dir.path(), PathPosition::Prepend).unwrap());
    }

    #[test]
    fn platform_detection_is_stable_across_calls() {
        let rt = runtime();
        let first = rt.detect_platform();
        let second = rt.detect_platform();
        assert_eq!(first, second);
    }

    #[test]
    fn progress_honors_the_disable_flag() {
        let rt = runtime();
        rt.settings()
            .set("show_progress", SettingValue::Boolean(false))
            .unwrap();
        assert!(!rt.show_progress(1, 3, "modules"));
    }
}
