// src/core/state.rs

//! Runtime bindings and their safe teardown.
//!
//! The state manager owns the two kinds of bindings startup scripts
//! create: named variables (with an optional read-only mark) and named
//! callables, the explicit registry behind `call`. Teardown goes through
//! `unset`, which refuses read-only removals and keeps the existence
//! cache coherent by evicting an entry only after the underlying removal
//! actually happened.

use crate::core::cache::ExistenceCaches;
use crate::core::logging::Logger;
use crate::models::{UnsetKind, UnsetOutcome};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("No callable named '{0}' is registered.")]
    FunctionNotFound(String),
    #[error("Variable '{0}' is read-only.")]
    ReadOnlyVariable(String),
}

/// A registered callable: takes the forwarded arguments, returns a status
/// code in the shell convention (zero is success).
pub type Callable = Arc<dyn Fn(&[String]) -> i32 + Send + Sync>;

#[derive(Debug, Clone)]
struct VarBinding {
    value: String,
    read_only: bool,
}

/// Variables and callables, plus the safe-unset logic over both.
pub struct StateManager {
    logger: Arc<Logger>,
    vars: Mutex<HashMap<String, VarBinding>>,
    callables: Mutex<HashMap<String, Callable>>,
}

impl std::fmt::Debug for StateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateManager")
            .field("vars", &lock(&self.vars).len())
            .field("callables", &lock(&self.callables).len())
            .finish_non_exhaustive()
    }
}

impl StateManager {
    pub fn new(logger: Arc<Logger>) -> Self {
        Self {
            logger,
            vars: Mutex::new(HashMap::new()),
            callables: Mutex::new(HashMap::new()),
        }
    }

    // --- Variables ---

    /// Creates or overwrites a variable. Writing over a read-only binding
    /// is refused.
    pub fn set_var(&self, name: &str, value: impl Into<String>) -> Result<(), StateError> {
        let mut vars = lock(&self.vars);
        if let Some(existing) = vars.get(name) {
            if existing.read_only {
                return Err(StateError::ReadOnlyVariable(name.to_string()));
            }
        }
        vars.insert(
            name.to_string(),
            VarBinding {
                value: value.into(),
                read_only: false,
            },
        );
        Ok(())
    }

    pub fn var(&self, name: &str) -> Option<String> {
        lock(&self.vars).get(name).map(|b| b.value.clone())
    }

    /// Marks an existing variable read-only. Returns whether the variable
    /// existed. The mark is permanent for the life of the process.
    pub fn mark_read_only(&self, name: &str) -> bool {
        let mut vars = lock(&self.vars);
        match vars.get_mut(name) {
            Some(binding) => {
                binding.read_only = true;
                true
            }
            None => false,
        }
    }

    // --- Callables ---

    /// Installs a named callable, replacing any previous one.
    pub fn register<F>(&self, name: &str, callable: F)
    where
        F: Fn(&[String]) -> i32 + Send + Sync + 'static,
    {
        lock(&self.callables).insert(name.to_string(), Arc::new(callable));
    }

    /// Invokes a registered callable with the given arguments. A missing
    /// name is the typed not-found error, not a reflective lookup failure.
    pub fn call(&self, name: &str, args: &[String]) -> Result<i32, StateError> {
        let callable = lock(&self.callables)
            .get(name)
            .cloned()
            .ok_or_else(|| StateError::FunctionNotFound(name.to_string()))?;
        // Invoked outside the lock; callables may re-enter the runtime.
        Ok(callable(args))
    }

    /// The authoritative callable-existence probe the cache layer misses
    /// into.
    pub fn has_function(&self, name: &str) -> bool {
        lock(&self.callables).contains_key(name)
    }

    // --- Safe unset ---

    /// Removes a binding under the requested interpretation.
    ///
    /// `Auto` tries the variable reading first and falls back to the
    /// callable one; a read-only hit settles the outcome without touching
    /// any callable of the same name. The cache entry for a removed
    /// callable is evicted only after the removal has succeeded.
    pub fn unset(&self, name: &str, kind: UnsetKind, caches: &ExistenceCaches) -> UnsetOutcome {
        let outcome = match kind {
            UnsetKind::Var => self.unset_var(name),
            UnsetKind::Func => self.unset_func(name, caches),
            UnsetKind::Auto => match self.unset_var(name) {
                UnsetOutcome::NotFound => self.unset_func(name, caches),
                settled => settled,
            },
        };

        match outcome {
            UnsetOutcome::Removed => {
                let _ = self.logger.debug(&format!("Unset '{name}'."));
            }
            UnsetOutcome::ReadOnlyBlocked => {
                let _ = self
                    .logger
                    .error(&format!("Refusing to unset read-only variable '{name}'."));
            }
            UnsetOutcome::NotFound => {
                let _ = self
                    .logger
                    .warn(&format!("Nothing named '{name}' to unset."));
            }
        }
        outcome
    }

    fn unset_var(&self, name: &str) -> UnsetOutcome {
        let mut vars = lock(&self.vars);
        match vars.get(name) {
            None => UnsetOutcome::NotFound,
            Some(binding) if binding.read_only => UnsetOutcome::ReadOnlyBlocked,
            Some(_) => {
                vars.remove(name);
                UnsetOutcome::Removed
            }
        }
    }

    fn unset_func(&self, name: &str, caches: &ExistenceCaches) -> UnsetOutcome {
        let removed = lock(&self.callables).remove(name).is_some();
        if !removed {
            return UnsetOutcome::NotFound;
        }
        // Cache update strictly follows the successful removal; the other
        // order would leave a window reporting "exists" for a gone
        // callable.
        caches.evict_function(name);
        UnsetOutcome::Removed
    }
}

fn lock<T>(slot: &Mutex<T>) -> MutexGuard<'_, T> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}
