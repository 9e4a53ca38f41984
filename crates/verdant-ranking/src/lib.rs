//! # verdant-ranking
//! Company-scoped leaderboard snapshots: deterministic aggregation of
//! ledger entries with explicit tie-breaking, and append-only snapshot
//! storage where recomputation supersedes but never edits.

pub mod engine;
pub mod snapshots;

pub use engine::{compute_snapshot, RankPolicy, RankingConfig, RankingMode};
pub use snapshots::MemorySnapshotStore;
