// src/system/platform.rs

//! One-shot platform classification.
//!
//! Detection runs once per process; every later call returns the cached
//! record. The primary classification reads the `OSTYPE` indicator shells
//! export, falling back to the compiled-in target when the indicator is
//! absent. WSL is recognized from any one of several independent signals,
//! Termux from its fixed install prefix.

use crate::models::PlatformInfo;
use std::path::Path;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicUsize, Ordering};

/// The well-known Termux prefix on Android.
const TERMUX_PREFIX: &str = "/data/data/com.termux/files/usr";

/// Memoizing wrapper around the probe.
#[derive(Debug, Default)]
pub struct PlatformDetector {
    info: OnceLock<PlatformInfo>,
    probe_runs: AtomicUsize,
}

impl PlatformDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classifies the host. Idempotent: the probe runs once and repeat
    /// calls are lookups.
    pub fn detect(&self) -> PlatformInfo {
        *self.info.get_or_init(|| {
            self.probe_runs.fetch_add(1, Ordering::SeqCst);
            let info = probe();
            log::debug!("Platform detected: {info:?}");
            info
        })
    }

    /// How many times the real probe has run. Stays at one forever after
    /// the first `detect`.
    pub fn probe_runs(&self) -> usize {
        self.probe_runs.load(Ordering::SeqCst)
    }
}

fn probe() -> PlatformInfo {
    let indicator = std::env::var("OSTYPE").unwrap_or_default();
    let mut info = if indicator.trim().is_empty() {
        classify(std::env::consts::OS)
    } else {
        classify(&indicator)
    };

    if info.is_linux {
        info.is_wsl = wsl_signals(
            |name| std::env::var(name).ok(),
            std::fs::read_to_string("/proc/version").ok().as_deref(),
        );
        info.is_termux = Path::new(TERMUX_PREFIX).exists();
    }
    info
}

/// Maps an OS indicator (either a shell `OSTYPE` value like `linux-gnu`
/// or a compiled-in target name like `macos`) onto the primary flags.
/// Exactly one primary flag is set, or none with `is_unknown` set.
fn classify(indicator: &str) -> PlatformInfo {
    let lowered = indicator.trim().to_ascii_lowercase();
    let mut info = PlatformInfo::default();
    if lowered.contains("darwin") || lowered == "macos" {
        info.is_macos = true;
    } else if lowered.contains("linux") || lowered == "android" {
        info.is_linux = true;
    } else if lowered.contains("bsd") || lowered.contains("dragonfly") {
        info.is_bsd = true;
    } else if lowered.contains("cygwin") || lowered.contains("msys") {
        info.is_cygwin = true;
    } else {
        info.is_unknown = true;
    }
    info
}

/// Any single signal is enough: the interop environment markers WSL
/// injects, or the vendor string in the kernel version.
fn wsl_signals<F>(env_lookup: F, kernel_version: Option<&str>) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    let env_marker = ["WSL_DISTRO_NAME", "WSL_INTEROP", "WSLENV"]
        .iter()
        .any(|name| env_lookup(name).is_some_and(|v| !v.is_empty()));
    if env_marker {
        return true;
    }
    kernel_version.is_some_and(|text| text.to_ascii_lowercase().contains("microsoft"))
}
