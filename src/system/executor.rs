// src/system/executor.rs

use crate::InterruptFlag;
use crate::constants::{INTERRUPTED_EXIT_CODE, TIMEOUT_EXIT_CODE};
use crate::core::logging::Logger;
use crate::core::scanner::Scanner;
use crate::core::settings::Settings;
use crate::models::{ExecMode, ExecRequest, ScanDecision, ThreatCategory, TrustLevel};
use crate::system::trust::TrustList;
use std::collections::HashMap;
use std::io::{ErrorKind, Write};
use std::path::Path;
use std::process::{Child, Command as StdCommand, Stdio};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("No command specified to run.")]
    EmptyCommand,
    #[error("Command could not be parsed: {0}")]
    CommandParse(String),
    #[error("Command '{0}' could not be executed: {1}")]
    CommandFailed(String, std::io::Error),
    #[error("Execution blocked by security scan: {0}")]
    Blocked(ThreatCategory),
    #[error("No timeout facility is configured; untrusted code will not run unprotected.")]
    TimeoutUnavailable,
    #[error("Operation was interrupted before execution.")]
    Interrupted,
    #[error("Could not stage the evaluation script: {0}")]
    ScriptStage(std::io::Error),
    #[error("Command '{command}' produced output that was not valid UTF-8")]
    InvalidUtf8Output {
        command: String,
        #[source]
        source: std::string::FromUtf8Error,
    },
}

/// Runs command text under the safety envelope: trust classification,
/// threat scanning, interrupt checks, and a kill-on-expiry deadline.
/// One child process per call, waited on synchronously.
#[derive(Debug)]
pub struct Executor {
    settings: Arc<Settings>,
    logger: Arc<Logger>,
    scanner: Scanner,
    trust: TrustList,
    interrupt: InterruptFlag,
}

impl Executor {
    pub fn new(
        settings: Arc<Settings>,
        logger: Arc<Logger>,
        scanner: Scanner,
        trust: TrustList,
        interrupt: InterruptFlag,
    ) -> Self {
        Self {
            settings,
            logger,
            scanner,
            trust,
            interrupt,
        }
    }

    /// Carries a request through the whole pipeline and returns the exit
    /// code. Refusals (policy blocks, pending interrupt, missing timeout
    /// facility, bad input) are errors; anything the child itself does,
    /// including dying at the deadline, is an `Ok` code. A deadline expiry
    /// reports the distinguished timeout code rather than the kill status.
    pub fn execute(
        &self,
        request: &ExecRequest,
        env_vars: &HashMap<String, String>,
    ) -> Result<i32, ExecError> {
        let text = request.text.trim();
        if text.is_empty() {
            let _ = self.logger.error("No command specified to run.");
            return Err(ExecError::EmptyCommand);
        }

        // 1. Classify. An explicit ShellInit mark is honored; otherwise the
        //    first word is checked against the trust allow-list.
        let trust = match request.trust {
            TrustLevel::ShellInit => TrustLevel::ShellInit,
            TrustLevel::Untrusted => self.trust.classify(text),
        };
        let performance_mode = self.settings.performance_mode();

        // 2. Resolve. A recognized init invocation in eval mode is run
        //    first in an isolated capture, and the code it printed is what
        //    gets applied. Performance mode collapses this back to a single
        //    pass.
        let staged_code = if trust == TrustLevel::ShellInit
            && request.mode == ExecMode::EvalInline
            && !performance_mode
        {
            Some(self.capture(text, env_vars)?)
        } else {
            None
        };

        // 3. Scan. Allow-listed init invocations skip this; the same trust
        //    decision covers the code they generate.
        if trust == TrustLevel::Untrusted {
            if let ScanDecision::Block(category) = self.scanner.scan(text) {
                return Err(ExecError::Blocked(category));
            }
        }

        // 4. Interrupt check.
        self.check_interrupt(text)?;

        // 5. Execute. Init-trusted and force-current-shell requests run in
        //    the caller's context without a deadline; everything else must
        //    have one, and a resolved timeout of zero means the facility is
        //    absent, which fails closed.
        let unbounded = request.force_current_shell || trust == TrustLevel::ShellInit;
        let timeout = if unbounded {
            None
        } else {
            let secs = request
                .timeout_secs
                .unwrap_or_else(|| self.settings.timeout_default());
            if secs == 0 {
                let _ = self.logger.error(
                    "No timeout facility is configured; refusing to run untrusted code unprotected.",
                );
                return Err(ExecError::TimeoutUnavailable);
            }
            Some(Duration::from_secs(secs))
        };

        let started = Instant::now();
        let code = match request.mode {
            ExecMode::RunIsolated => {
                let child = self.spawn_direct(text, env_vars)?;
                self.supervise(child, text, timeout)?
            }
            ExecMode::EvalInline => {
                let script = stage_script(staged_code.as_deref().unwrap_or(text))?;
                let child = self.spawn_script(script.path(), env_vars, text)?;
                // `script` must outlive the child; dropping it deletes the file.
                self.supervise(child, text, timeout)?
            }
        };
        log::debug!(
            "Command finished in {}ms with status {}: {}",
            started.elapsed().as_millis(),
            code,
            summarize(text)
        );

        // 6. Report. Nonzero and timeout results are the caller's problem
        //    to interpret; they are surfaced at Warn and passed through.
        if code == TIMEOUT_EXIT_CODE && timeout.is_some() {
            let _ = self
                .logger
                .warn(&format!("Command timed out: {}", summarize(text)));
        } else if code != 0 {
            let _ = self.logger.warn(&format!(
                "Command exited with status {}: {}",
                code,
                summarize(text)
            ));
        }
        Ok(code)
    }

    /// Runs a command and captures its standard output, the capture half
    /// of the two-phase init flow. The child's standard error is re-emitted
    /// through the logging engine at Debug level.
    /// NOTE: this is blocking and only checks for an interrupt *before*
    /// starting. It is intended for short-running generator commands.
    pub fn capture(
        &self,
        command_line: &str,
        env_vars: &HashMap<String, String>,
    ) -> Result<String, ExecError> {
        self.check_interrupt(command_line)?;

        let trimmed = command_line.trim();
        if trimmed.is_empty() {
            return Err(ExecError::EmptyCommand);
        }
        let parts = shlex::split(trimmed)
            .ok_or_else(|| ExecError::CommandParse(trimmed.to_string()))?;
        let Some((program, args)) = parts.split_first() else {
            return Err(ExecError::EmptyCommand);
        };

        let output = StdCommand::new(program)
            .args(args)
            .envs(env_vars)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| ExecError::CommandFailed(trimmed.to_string(), e))?;

        for line in String::from_utf8_lossy(&output.stderr).lines() {
            let _ = self.logger.debug(&format!("[{program}] {line}"));
        }
        if !output.status.success() {
            let _ = self.logger.warn(&format!(
                "Capture exited with status {}: {}",
                exit_code(output.status),
                summarize(trimmed)
            ));
        }

        String::from_utf8(output.stdout).map_err(|e| ExecError::InvalidUtf8Output {
            command: trimmed.to_string(),
            source: e,
        })
    }

    fn check_interrupt(&self, context: &str) -> Result<(), ExecError> {
        if self.interrupt.load(Ordering::SeqCst) {
            let _ = self.logger.warn(&format!(
                "Interrupt pending; not starting: {}",
                summarize(context)
            ));
            return Err(ExecError::Interrupted);
        }
        Ok(())
    }

    fn spawn_direct(
        &self,
        command_line: &str,
        env_vars: &HashMap<String, String>,
    ) -> Result<Child, ExecError> {
        let parts = shlex::split(command_line)
            .ok_or_else(|| ExecError::CommandParse(command_line.to_string()))?;
        let Some((program, args)) = parts.split_first() else {
            return Err(ExecError::EmptyCommand);
        };

        let mut command = StdCommand::new(program);
        command
            .args(args)
            .envs(env_vars)
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        // Fallback logic for Windows built-in commands like `echo`.
        // We try to spawn directly first. If it fails with `NotFound`, we
        // try with `cmd /C`.
        match command.spawn() {
            Ok(child) => Ok(child),
            Err(e) if e.kind() == ErrorKind::NotFound && cfg!(target_os = "windows") => {
                log::debug!("Command '{}' not found. Retrying with cmd /C.", program);
                StdCommand::new("cmd")
                    .arg("/C")
                    .arg(command_line) // Pass the full, unparsed line to cmd
                    .envs(env_vars)
                    .stdout(Stdio::inherit())
                    .stderr(Stdio::inherit())
                    .spawn()
                    .map_err(|e| ExecError::CommandFailed(command_line.to_string(), e))
            }
            Err(e) => Err(ExecError::CommandFailed(command_line.to_string(), e)),
        }
    }

    fn spawn_script(
        &self,
        script: &Path,
        env_vars: &HashMap<String, String>,
        label: &str,
    ) -> Result<Child, ExecError> {
        let mut command = if cfg!(target_os = "windows") {
            let mut c = StdCommand::new("cmd");
            c.arg("/C").arg(script);
            c
        } else {
            let mut c = StdCommand::new("sh");
            c.arg(script);
            c
        };
        command
            .envs(env_vars)
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| ExecError::CommandFailed(label.to_string(), e))
    }

    // Non-blocking wait loop so the deadline and the interrupt flag are
    // both observed while the child runs.
    fn supervise(
        &self,
        mut child: Child,
        command_line: &str,
        timeout: Option<Duration>,
    ) -> Result<i32, ExecError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(exit_code(status)),
                Ok(None) => {
                    if self.interrupt.load(Ordering::SeqCst) {
                        log::debug!(
                            "Interrupt observed, killing child process (PID: {})...",
                            child.id()
                        );
                        kill_and_reap(&mut child);
                        return Ok(INTERRUPTED_EXIT_CODE);
                    }
                    if let Some(deadline) = deadline {
                        if Instant::now() >= deadline {
                            log::debug!(
                                "Deadline elapsed, killing child process (PID: {})...",
                                child.id()
                            );
                            kill_and_reap(&mut child);
                            return Ok(TIMEOUT_EXIT_CODE);
                        }
                    }
                    // Wait briefly to avoid a tight loop consuming CPU.
                    std::thread::sleep(Duration::from_millis(100));
                }
                Err(e) => {
                    return Err(ExecError::CommandFailed(command_line.to_string(), e));
                }
            }
        }
    }
}

fn kill_and_reap(child: &mut Child) {
    if let Err(e) = child.kill() {
        log::warn!("Failed to kill child process {}: {}", child.id(), e);
    }
    // Wait briefly for the process to die after being killed.
    child.wait().ok();
}

fn stage_script(code: &str) -> Result<NamedTempFile, ExecError> {
    let mut script = tempfile::Builder::new()
        .prefix("rckit-eval-")
        .suffix(if cfg!(target_os = "windows") {
            ".bat"
        } else {
            ".sh"
        })
        .tempfile()
        .map_err(ExecError::ScriptStage)?;
    script
        .write_all(code.as_bytes())
        .map_err(ExecError::ScriptStage)?;
    script.flush().map_err(ExecError::ScriptStage)?;
    Ok(script)
}

pub(crate) fn exit_code(status: std::process::ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        // Shell convention for signal deaths.
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    status.code().unwrap_or(1)
}

fn summarize(text: &str) -> String {
    const LIMIT: usize = 80;
    if text.chars().count() <= LIMIT {
        text.to_string()
    } else {
        let head: String = text.chars().take(LIMIT).collect();
        format!("{head}...")
    }
}
