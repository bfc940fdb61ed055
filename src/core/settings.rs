// src/core/settings.rs

//! The configuration registry.
//!
//! A mutable table of named settings read by every other component. The key
//! set is fixed when the registry is built; values can be overwritten for
//! the lifetime of the process but an overwrite must keep the original
//! variant (an integer key stays an integer key). Nothing here is
//! persisted.

use crate::constants;
use crate::models::{LogLevel, SettingValue};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Unknown setting '{0}'. The registry key set is fixed at startup.")]
    UnknownKey(String),
    #[error("Setting '{key}' holds a {expected} and cannot be overwritten with a {provided}.")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        provided: &'static str,
    },
}

/// The registry itself. Cheap to read, rarely written.
pub struct Settings {
    values: Mutex<HashMap<&'static str, SettingValue>>,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings").finish_non_exhaustive()
    }
}

/// Keys present in every registry, with their startup defaults.
fn default_table() -> HashMap<&'static str, SettingValue> {
    use SettingValue::{Boolean, Integer};
    HashMap::from([
        // Numeric level constants, mirrored here so scripted callers can
        // pass levels by name through the registry.
        ("log_error", Integer(LogLevel::Error.value())),
        ("log_warn", Integer(LogLevel::Warn.value())),
        ("log_info", Integer(LogLevel::Info.value())),
        ("log_debug", Integer(LogLevel::Debug.value())),
        ("verbosity", Integer(constants::DEFAULT_VERBOSITY)),
        ("performance_mode", Boolean(false)),
        ("show_progress", Boolean(true)),
        ("cache_max_size", Integer(constants::DEFAULT_CACHE_MAX_SIZE)),
        ("timeout_default", Integer(constants::DEFAULT_TIMEOUT_SECS)),
        ("log_max_depth", Integer(constants::DEFAULT_LOG_MAX_DEPTH)),
        (
            "progress_update_interval",
            Integer(constants::DEFAULT_PROGRESS_UPDATE_INTERVAL),
        ),
    ])
}

impl Settings {
    /// Builds a registry holding only the built-in defaults.
    pub fn defaults() -> Self {
        Self {
            values: Mutex::new(default_table()),
        }
    }

    /// Builds a registry seeded from the process environment.
    pub fn from_env() -> Self {
        Self::seeded(|name| std::env::var(name).ok())
    }

    /// Seeds a registry through an arbitrary variable lookup. A present but
    /// malformed value is reported and ignored rather than failing startup.
    pub fn seeded<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let settings = Self::defaults();
        let overrides: [(&str, &'static str); 7] = [
            (constants::ENV_VERBOSITY, "verbosity"),
            (constants::ENV_PERFORMANCE_MODE, "performance_mode"),
            (constants::ENV_SHOW_PROGRESS, "show_progress"),
            (constants::ENV_CACHE_MAX_SIZE, "cache_max_size"),
            (constants::ENV_TIMEOUT_DEFAULT, "timeout_default"),
            (constants::ENV_LOG_MAX_DEPTH, "log_max_depth"),
            (
                constants::ENV_PROGRESS_UPDATE_INTERVAL,
                "progress_update_interval",
            ),
        ];

        for (env_name, key) in overrides {
            let Some(raw) = lookup(env_name) else {
                continue;
            };
            let parsed = match settings.get(key) {
                Some(SettingValue::Boolean(_)) => {
                    parse_bool_flag(&raw).map(SettingValue::Boolean)
                }
                Some(SettingValue::Integer(_)) => {
                    raw.trim().parse::<i64>().ok().map(SettingValue::Integer)
                }
                None => None,
            };
            match parsed {
                Some(value) => {
                    // Seeding writes through `set` so the type-stability
                    // invariant is enforced on this path too.
                    if let Err(e) = settings.set(key, value) {
                        log::warn!("Ignoring environment override {env_name}: {e}");
                    }
                }
                None => {
                    log::warn!("Ignoring malformed value '{raw}' for {env_name}.");
                }
            }
        }
        settings
    }

    pub fn get(&self, key: &str) -> Option<SettingValue> {
        self.lock().get(key).copied()
    }

    /// Overwrites an existing key. The key must exist and the new value
    /// must match its variant.
    pub fn set(&self, key: &str, value: SettingValue) -> Result<(), SettingsError> {
        let mut table = self.lock();
        let Some((stable_key, current)) = table.get_key_value(key) else {
            return Err(SettingsError::UnknownKey(key.to_string()));
        };
        if std::mem::discriminant(current) != std::mem::discriminant(&value) {
            return Err(SettingsError::TypeMismatch {
                key: key.to_string(),
                expected: current.kind(),
                provided: value.kind(),
            });
        }
        let stable_key = *stable_key;
        table.insert(stable_key, value);
        Ok(())
    }

    // --- Typed accessors for the well-known keys ---

    /// Current verbosity. An out-of-range stored value reads as Info
    /// rather than silencing or flooding the session.
    pub fn verbosity(&self) -> LogLevel {
        let raw = self.integer_or("verbosity", constants::DEFAULT_VERBOSITY);
        LogLevel::from_value(raw).unwrap_or(LogLevel::Info)
    }

    pub fn set_verbosity(&self, level: LogLevel) {
        // "verbosity" is in the fixed key set, so this cannot fail.
        let _ = self.set("verbosity", SettingValue::Integer(level.value()));
    }

    pub fn performance_mode(&self) -> bool {
        self.bool_or("performance_mode", false)
    }

    pub fn show_progress(&self) -> bool {
        self.bool_or("show_progress", true)
    }

    pub fn cache_max_size(&self) -> usize {
        let raw = self.integer_or("cache_max_size", constants::DEFAULT_CACHE_MAX_SIZE);
        usize::try_from(raw.max(1)).unwrap_or(1)
    }

    /// The default deadline in seconds. Zero means the timeout facility is
    /// unavailable and untrusted execution must fail closed.
    pub fn timeout_default(&self) -> u64 {
        let raw = self.integer_or("timeout_default", constants::DEFAULT_TIMEOUT_SECS);
        u64::try_from(raw.max(0)).unwrap_or(0)
    }

    pub fn log_max_depth(&self) -> u32 {
        let raw = self.integer_or("log_max_depth", constants::DEFAULT_LOG_MAX_DEPTH);
        u32::try_from(raw.max(1)).unwrap_or(1)
    }

    pub fn progress_update_interval(&self) -> u64 {
        let raw = self.integer_or(
            "progress_update_interval",
            constants::DEFAULT_PROGRESS_UPDATE_INTERVAL,
        );
        u64::try_from(raw.max(1)).unwrap_or(1)
    }

    fn integer_or(&self, key: &str, fallback: i64) -> i64 {
        self.get(key).and_then(SettingValue::as_integer).unwrap_or(fallback)
    }

    fn bool_or(&self, key: &str, fallback: bool) -> bool {
        self.get(key).and_then(SettingValue::as_bool).unwrap_or(fallback)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<&'static str, SettingValue>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Accepts the flag spellings shells actually export.
fn parse_bool_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
