//! # System Interaction Layer
//!
//! This module provides abstractions for interacting with the underlying operating system.
//! It serves as a boundary between the core runtime logic and the specifics of process
//! management, filesystems, and platform classification.
//!
//! ## Modules
//!
//! - **`executor`**: A robust engine for spawning and supervising external processes. It
//!   handles trust classification, threat scanning, graceful interruption (`Ctrl+C`),
//!   kill-on-expiry deadlines, and output capturing for two-phase init application.
//! - **`paths`**: Path resolution (tilde expansion, bounded symlink dereferencing) and
//!   PATH-variable editing.
//! - **`platform`**: One-shot OS/environment classification, including the WSL and Termux
//!   secondary signals.
//! - **`source`**: Validated loading of startup files into the caller's context.
//! - **`trust`**: Loading and matching of the `trust.toml` shell-init allow-list.

pub mod executor;
pub mod paths;
pub mod platform;
pub mod source;
pub mod trust;
