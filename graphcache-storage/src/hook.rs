//! Process-wide error hook.
//!
//! Tiers never propagate storage failures to their callers. Instead they call
//! [`report`], which forwards the error to the installed hook and lets the
//! operation degrade to an empty result. The default hook logs through
//! `tracing`.

use std::sync::{Arc, PoisonError, RwLock};

use graphcache_core::CacheError;
use once_cell::sync::Lazy;

/// Callback receiving every swallowed storage error.
pub type ErrorHook = Arc<dyn Fn(&str, &CacheError) + Send + Sync>;

static ERROR_HOOK: Lazy<RwLock<ErrorHook>> = Lazy::new(|| RwLock::new(default_hook()));

fn default_hook() -> ErrorHook {
    Arc::new(|operation: &str, error: &CacheError| {
        tracing::error!(operation, error = %error, "cache operation failed");
    })
}

/// Install `hook` for the whole process, replacing the previous one.
pub fn set_error_hook<F>(hook: F)
where
    F: Fn(&str, &CacheError) + Send + Sync + 'static,
{
    let mut slot = ERROR_HOOK.write().unwrap_or_else(PoisonError::into_inner);
    *slot = Arc::new(hook);
}

/// Restore the logging hook.
pub fn reset_error_hook() {
    let mut slot = ERROR_HOOK.write().unwrap_or_else(PoisonError::into_inner);
    *slot = default_hook();
}

/// Report a swallowed error raised by `operation`.
pub fn report(operation: &str, error: &CacheError) {
    let hook = Arc::clone(&ERROR_HOOK.read().unwrap_or_else(PoisonError::into_inner));
    hook(operation, error);
}
