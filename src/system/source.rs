// src/system/source.rs

use crate::InterruptFlag;
use crate::constants::FAILURE_EXIT_CODE;
use crate::core::logging::Logger;
use crate::core::settings::Settings;
use crate::system::executor::exit_code;
use crate::system::paths::{self, PathError};
use std::collections::HashMap;
use std::fs::File;
use std::path::PathBuf;
use std::process::Command as StdCommand;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Instant;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Could not resolve '{path}': {source}")]
    Resolve {
        path: String,
        #[source]
        source: PathError,
    },
    #[error("Operation was interrupted before sourcing.")]
    Interrupted,
    #[error("File '{0}' could not be loaded: {1}")]
    LoadFailed(PathBuf, std::io::Error),
}

/// Validates and loads a startup file in the caller's context.
///
/// A file that is missing or unreadable is a warning and a failure code,
/// not an error; startup scripts routinely source optional fragments.
#[derive(Debug)]
pub struct SourceLoader {
    settings: Arc<Settings>,
    logger: Arc<Logger>,
    interrupt: InterruptFlag,
}

impl SourceLoader {
    pub fn new(settings: Arc<Settings>, logger: Arc<Logger>, interrupt: InterruptFlag) -> Self {
        Self {
            settings,
            logger,
            interrupt,
        }
    }

    /// Resolves `path` (skipped in performance mode), verifies the file is
    /// present and readable, checks for a pending interrupt, then runs the
    /// file with the extra arguments forwarded. Returns the file's exit
    /// code.
    pub fn source_safely(
        &self,
        path: &str,
        args: &[String],
        env_vars: &HashMap<String, String>,
    ) -> Result<i32, SourceError> {
        let resolved = if self.settings.performance_mode() {
            PathBuf::from(path)
        } else {
            paths::resolve(path).map_err(|e| {
                let _ = self.logger.error(&e.to_string());
                SourceError::Resolve {
                    path: path.to_string(),
                    source: e,
                }
            })?
        };

        if !resolved.is_file() {
            let _ = self
                .logger
                .warn(&format!("Cannot source '{}': no such file.", resolved.display()));
            return Ok(FAILURE_EXIT_CODE);
        }
        if let Err(e) = File::open(&resolved) {
            let _ = self.logger.warn(&format!(
                "Cannot source '{}': {}.",
                resolved.display(),
                e
            ));
            return Ok(FAILURE_EXIT_CODE);
        }

        if self.interrupt.load(Ordering::SeqCst) {
            let _ = self.logger.warn(&format!(
                "Interrupt pending; not sourcing '{}'.",
                resolved.display()
            ));
            return Err(SourceError::Interrupted);
        }

        let started = Instant::now();
        let mut command = if cfg!(target_os = "windows") {
            let mut c = StdCommand::new("cmd");
            c.arg("/C").arg(&resolved);
            c
        } else {
            let mut c = StdCommand::new("sh");
            c.arg(&resolved);
            c
        };
        let status = command
            .args(args)
            .envs(env_vars)
            .status()
            .map_err(|e| SourceError::LoadFailed(resolved.clone(), e))?;

        let code = exit_code(status);
        log::debug!(
            "Sourced '{}' in {}ms with status {}",
            resolved.display(),
            started.elapsed().as_millis(),
            code
        );
        if code != 0 {
            let _ = self.logger.warn(&format!(
                "Sourced file '{}' exited with status {}.",
                resolved.display(),
                code
            ));
        }
        Ok(code)
    }
}
