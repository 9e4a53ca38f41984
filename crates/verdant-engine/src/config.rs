//! Engine configuration.
//!
//! Programmatic configuration with defaults from
//! [`verdant_core::constants`]. The struct is serde-friendly so a host can
//! load it from its own config file if it wants to.

use serde::{Deserialize, Serialize};

use verdant_core::constants::{
    CONFLICT_BACKOFF_BASE_MS, CONFLICT_BACKOFF_JITTER_MS, CONFLICT_MAX_RETRIES,
};
use verdant_ranking::RankingConfig;

/// Configuration for an [`Engine`](crate::Engine) instance.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Defaults for leaderboard computation (mode, rank policy, row limit).
    pub ranking: RankingConfig,
    /// How many times a `Conflict` is retried before surfacing.
    pub conflict_max_retries: u32,
    /// Base backoff between conflict retries, in milliseconds; attempt `n`
    /// waits `base << (n - 1)` plus jitter.
    pub conflict_backoff_base_ms: u64,
    /// Exclusive upper bound of the random jitter per backoff, in
    /// milliseconds. Zero disables jitter.
    pub conflict_backoff_jitter_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ranking: RankingConfig::default(),
            conflict_max_retries: CONFLICT_MAX_RETRIES,
            conflict_backoff_base_ms: CONFLICT_BACKOFF_BASE_MS,
            conflict_backoff_jitter_ms: CONFLICT_BACKOFF_JITTER_MS,
        }
    }
}
