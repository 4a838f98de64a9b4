//! Build a tier chain from configuration.

use graphcache_core::{CacheResult, ChainConfig, TierConfig};
use tracing::debug;

use crate::memory::MemoryCache;
use crate::sql::SqlNormalizedCache;
use crate::traits::NormalizedCache;

/// Build the chain described by `config`, returning its first tier.
///
/// Tiers are constructed from last to first so each one can take ownership of
/// its successor.
pub fn build_chain(config: &ChainConfig) -> CacheResult<Box<dyn NormalizedCache>> {
    config.validate()?;

    let mut next: Option<Box<dyn NormalizedCache>> = None;
    for tier in config.tiers.iter().rev() {
        let built: Box<dyn NormalizedCache> = match (tier, next.take()) {
            (TierConfig::Memory(memory), None) => Box::new(MemoryCache::new(memory.clone())?),
            (TierConfig::Memory(memory), Some(successor)) => {
                Box::new(MemoryCache::with_next(memory.clone(), successor)?)
            }
            // validate() guarantees the persistent tier is last.
            (TierConfig::Sql(sql), _) => Box::new(SqlNormalizedCache::from_config(sql.clone())?),
        };
        next = Some(built);
    }

    let head = next.ok_or_else(|| graphcache_core::ConfigError::MissingRequired {
        field: "tiers".to_string(),
    })?;
    debug!(tiers = config.tiers.len(), head = head.name(), "built cache chain");
    Ok(head)
}
