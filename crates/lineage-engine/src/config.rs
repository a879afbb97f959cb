//! Engine configuration

use std::time::Duration;

use lineage_core::limits::{DEFAULT_GENERATIONS, DEFAULT_TREE_GENERATIONS};
use lineage_storage::MAX_TTL;
use serde::{Deserialize, Serialize};

/// Tunables for a [`FamilyEngine`](crate::FamilyEngine)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Lifetime of cached individuals, unions and trees
    pub cache_ttl_secs: u64,

    /// Bound of the background cache-write queue
    pub cache_queue_capacity: usize,

    /// Allow a child to be linked to more than one union
    pub allow_reparenting: bool,

    /// Generations walked by ancestor/descendant queries when none is given
    pub default_generations: u32,

    /// Generations materialized by tree builds when none is given
    pub default_tree_generations: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 3600,
            cache_queue_capacity: 256,
            allow_reparenting: false,
            default_generations: DEFAULT_GENERATIONS,
            default_tree_generations: DEFAULT_TREE_GENERATIONS,
        }
    }
}

impl EngineConfig {
    /// Entry lifetime, capped at [`MAX_TTL`]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs).min(MAX_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"allow_reparenting": true, "cache_ttl_secs": 60}"#).unwrap();
        assert!(config.allow_reparenting);
        assert_eq!(config.cache_ttl(), Duration::from_secs(60));
        assert_eq!(config.cache_queue_capacity, 256);
        assert_eq!(config.default_tree_generations, 3);
    }

    #[test]
    fn test_cache_ttl_is_capped() {
        let config = EngineConfig {
            cache_ttl_secs: u64::MAX,
            ..Default::default()
        };
        assert_eq!(config.cache_ttl(), MAX_TTL);
    }
}
