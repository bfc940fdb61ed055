// src/lib.rs

//! Safe primitives for shell startup scripts: guarded logging, scanned and
//! deadline-bounded command execution, dual existence caches, robust path
//! resolution, safe variable/function teardown, and an adaptive progress
//! line, all owned by one explicitly constructed [`Runtime`].

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Process-wide interrupt flag, set by the signal hook and observed at the
/// execution layer's check points.
pub type InterruptFlag = Arc<AtomicBool>;

pub mod constants;
pub mod core;
pub mod models;
pub mod runtime;
pub mod system;

pub use runtime::Runtime;
