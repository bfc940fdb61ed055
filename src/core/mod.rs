// src/core/mod.rs

pub mod cache;
pub mod logging;
pub mod progress;
pub mod scanner;
pub mod settings;
pub mod state;
