//! Scoped read/write guards for chained tiers.
//!
//! A standalone memory tier relies on the eviction engine's own
//! synchronization. Once a tier forwards to a successor, a combined operation
//! (merge into both tiers, read falling through and refilling) has to appear
//! atomic to concurrent readers, so the tier runs it inside a scoped guard.
//!
//! ```text
//! read(f):  shared     ── f() ──  released
//! write(f): exclusive  ── f() ──  released
//! ```

use std::sync::{PoisonError, RwLock};

/// Runs closures under a read or write guard.
pub trait ScopedLock: Send + Sync {
    fn read<T>(&self, f: impl FnOnce() -> T) -> T;
    fn write<T>(&self, f: impl FnOnce() -> T) -> T;
}

/// Guard that guards nothing.
#[derive(Debug, Default)]
pub struct NoopLock;

impl ScopedLock for NoopLock {
    fn read<T>(&self, f: impl FnOnce() -> T) -> T {
        f()
    }

    fn write<T>(&self, f: impl FnOnce() -> T) -> T {
        f()
    }
}

/// Guard backed by an OS reader/writer lock.
#[derive(Debug, Default)]
pub struct RwScopedLock {
    lock: RwLock<()>,
}

impl ScopedLock for RwScopedLock {
    fn read<T>(&self, f: impl FnOnce() -> T) -> T {
        // The lock protects no data, so a poisoned lock is still usable.
        let _guard = self.lock.read().unwrap_or_else(PoisonError::into_inner);
        f()
    }

    fn write<T>(&self, f: impl FnOnce() -> T) -> T {
        let _guard = self.lock.write().unwrap_or_else(PoisonError::into_inner);
        f()
    }
}

/// The guard a tier picked at construction.
#[derive(Debug)]
pub enum TierLock {
    Unguarded(NoopLock),
    Guarded(RwScopedLock),
}

impl TierLock {
    /// Real lock for chained tiers, no-op otherwise.
    pub fn for_chain(chained: bool) -> Self {
        if chained {
            TierLock::Guarded(RwScopedLock::default())
        } else {
            TierLock::Unguarded(NoopLock)
        }
    }

    pub fn is_guarded(&self) -> bool {
        matches!(self, TierLock::Guarded(_))
    }
}

impl ScopedLock for TierLock {
    fn read<T>(&self, f: impl FnOnce() -> T) -> T {
        match self {
            TierLock::Unguarded(lock) => lock.read(f),
            TierLock::Guarded(lock) => lock.read(f),
        }
    }

    fn write<T>(&self, f: impl FnOnce() -> T) -> T {
        match self {
            TierLock::Unguarded(lock) => lock.write(f),
            TierLock::Guarded(lock) => lock.write(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_for_chain_selects_guard() {
        assert!(TierLock::for_chain(true).is_guarded());
        assert!(!TierLock::for_chain(false).is_guarded());
    }

    #[test]
    fn test_closures_return_values() {
        let lock = TierLock::for_chain(true);
        assert_eq!(lock.read(|| 1 + 1), 2);
        assert_eq!(lock.write(|| "done"), "done");
        assert_eq!(NoopLock.write(|| 7), 7);
    }

    #[test]
    fn test_writes_are_exclusive() {
        let lock = Arc::new(TierLock::for_chain(true));
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lock = Arc::clone(&lock);
                let inside = Arc::clone(&inside);
                let max_seen = Arc::clone(&max_seen);
                thread::spawn(move || {
                    for _ in 0..100 {
                        lock.write(|| {
                            let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                            max_seen.fetch_max(now, Ordering::SeqCst);
                            inside.fetch_sub(1, Ordering::SeqCst);
                        });
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }
}
