// src/core/cache.rs

//! The dual existence cache.
//!
//! Two bounded boolean caches, one keyed by callable name and one by
//! command name, sitting in front of the expensive introspection both
//! checks would otherwise repeat hundreds of times during a startup pass.
//! Both stores share one policy: hits refresh recency, misses probe and
//! insert, and when an insertion would push the store past
//! `cache_max_size`, the oldest half is evicted in a single batch so the
//! cleanup cost is paid once instead of on every subsequent insertion.

use crate::core::settings::Settings;
use lru::LruCache;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One boolean store. Created unbounded; the size policy lives in
/// [`ExistenceCaches`], not in the backing structure, because the batch
/// eviction below is not what a capacity-bounded LRU does.
type Store = Mutex<LruCache<String, bool>>;

/// The pair of caches plus the reentrancy guard for the callable side.
pub struct ExistenceCaches {
    settings: Arc<Settings>,
    functions: Store,
    commands: Store,
    /// Set while a callable lookup is in flight. A probe that winds back
    /// into `function_exists` answers "not found" instead of recursing.
    probing_functions: AtomicBool,
}

impl std::fmt::Debug for ExistenceCaches {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExistenceCaches")
            .field("functions", &self.function_cache_len())
            .field("commands", &self.command_cache_len())
            .finish_non_exhaustive()
    }
}

impl ExistenceCaches {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self {
            settings,
            functions: Mutex::new(LruCache::unbounded()),
            commands: Mutex::new(LruCache::unbounded()),
            probing_functions: AtomicBool::new(false),
        }
    }

    /// Cached callable-existence check. `probe` runs only on a miss.
    pub fn function_exists(&self, name: &str, probe: impl FnOnce(&str) -> bool) -> bool {
        if self.probing_functions.swap(true, Ordering::SeqCst) {
            log::debug!("Reentrant existence check for callable '{name}'; reporting not found.");
            return false;
        }
        let _reentry = scopeguard::guard(&self.probing_functions, |flag| {
            flag.store(false, Ordering::SeqCst);
        });
        self.lookup(&self.functions, "callable", name, probe)
    }

    /// Cached command-existence check. `probe` runs only on a miss.
    pub fn command_exists(&self, name: &str, probe: impl FnOnce(&str) -> bool) -> bool {
        self.lookup(&self.commands, "command", name, probe)
    }

    /// Drops a callable entry along with its recency slot. Called by the
    /// state manager once the underlying removal has succeeded.
    pub fn evict_function(&self, name: &str) -> bool {
        lock(&self.functions).pop(name).is_some()
    }

    /// Reads a cached callable answer without refreshing its recency.
    pub fn peek_function(&self, name: &str) -> Option<bool> {
        lock(&self.functions).peek(name).copied()
    }

    /// Forgets every cached command answer. Called after a PATH edit,
    /// which can turn any cached "not found" stale.
    pub fn clear_commands(&self) {
        lock(&self.commands).clear();
    }

    pub fn function_cache_len(&self) -> usize {
        lock(&self.functions).len()
    }

    pub fn command_cache_len(&self) -> usize {
        lock(&self.commands).len()
    }

    fn lookup(
        &self,
        store: &Store,
        what: &str,
        name: &str,
        probe: impl FnOnce(&str) -> bool,
    ) -> bool {
        {
            let mut cache = lock(store);
            if let Some(hit) = cache.get(name) {
                return *hit;
            }
        }

        // The store stays unlocked while the probe runs; probes may take
        // arbitrary time or call back into unrelated parts of the runtime.
        let value = probe(name);

        let mut cache = lock(store);
        let max = self.settings.cache_max_size();
        if cache.len() >= max {
            let retain = max / 2;
            let evicted = cache.len().saturating_sub(retain);
            while cache.len() > retain {
                if cache.pop_lru().is_none() {
                    break;
                }
            }
            log::debug!(
                "The {what} existence cache reached its bound of {max}; evicted the {evicted} oldest entries."
            );
        }
        cache.put(name.to_string(), value);
        value
    }
}

fn lock(store: &Store) -> MutexGuard<'_, LruCache<String, bool>> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SettingValue;
    use std::sync::atomic::AtomicUsize;

    fn caches_with_limit(limit: i64) -> ExistenceCaches {
        let settings = Arc::new(Settings::defaults());
        settings
            .set("cache_max_size", SettingValue::Integer(limit))
            .unwrap();
        ExistenceCaches::new(settings)
    }

    #[test]
    fn hits_do_not_reprobe() {
        let caches = caches_with_limit(10);
        let probes = AtomicUsize::new(0);

        let first = caches.command_exists("git", |_| {
            probes.fetch_add(1, Ordering::SeqCst);
            true
        });
        let second = caches.command_exists("git", |_| {
            probes.fetch_add(1, Ordering::SeqCst);
            false
        });

        assert!(first);
        assert!(second, "the cached answer wins over the new probe");
        assert_eq!(probes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn the_two_stores_are_independent() {
        let caches = caches_with_limit(10);
        caches.function_exists("deploy", |_| true);
        assert_eq!(caches.function_cache_len(), 1);
        assert_eq!(caches.command_cache_len(), 0);
        assert!(!caches.command_exists("deploy", |_| false));
        assert_eq!(caches.command_cache_len(), 1);
    }

    #[test]
    fn bound_holds_and_eviction_is_batched() {
        let caches = caches_with_limit(4);
        for name in ["a", "b", "c", "d"] {
            caches.command_exists(name, |_| true);
            assert!(caches.command_cache_len() <= 4);
        }
        assert_eq!(caches.command_cache_len(), 4);

        // The fifth insertion triggers one batch eviction of the oldest
        // half, not a single-entry pop.
        caches.command_exists("e", |_| true);
        assert_eq!(caches.command_cache_len(), 3);

        let retained: Vec<String> = lock(&caches.commands)
            .iter()
            .map(|(k, _)| k.clone())
            .collect();
        assert!(retained.contains(&"c".to_string()));
        assert!(retained.contains(&"d".to_string()));
        assert!(retained.contains(&"e".to_string()));
    }

    #[test]
    fn a_hit_refreshes_recency_before_eviction() {
        let caches = caches_with_limit(4);
        for name in ["a", "b", "c", "d"] {
            caches.command_exists(name, |_| true);
        }
        // Touch "a" so it becomes the most recently used entry.
        caches.command_exists("a", |_| false);

        caches.command_exists("e", |_| true);

        let retained: Vec<String> = lock(&caches.commands)
            .iter()
            .map(|(k, _)| k.clone())
            .collect();
        assert!(retained.contains(&"a".to_string()), "refreshed entry survives");
        assert!(!retained.contains(&"b".to_string()));
        assert!(!retained.contains(&"c".to_string()));
    }

    #[test]
    fn reentrant_function_probe_reports_not_found() {
        let caches = caches_with_limit(10);
        let outer = caches.function_exists("outer", |_| {
            // A helper invoked by the probe asks about another callable.
            // The guard answers without recursing into the store.
            let inner = caches.function_exists("inner", |_| true);
            assert!(!inner);
            true
        });
        assert!(outer);
        assert_eq!(caches.peek_function("inner"), None);
        assert_eq!(caches.peek_function("outer"), Some(true));
    }

    #[test]
    fn eviction_clears_recency_bookkeeping() {
        let caches = caches_with_limit(10);
        caches.function_exists("tmp", |_| true);
        assert!(caches.evict_function("tmp"));
        assert!(!caches.evict_function("tmp"));
        assert_eq!(caches.peek_function("tmp"), None);
        assert_eq!(caches.function_cache_len(), 0);
    }

    #[test]
    fn clearing_commands_forces_a_reprobe() {
        let caches = caches_with_limit(10);
        assert!(!caches.command_exists("newcmd", |_| false));
        caches.clear_commands();
        assert_eq!(caches.command_cache_len(), 0);
        assert!(caches.command_exists("newcmd", |_| true));
    }
}
