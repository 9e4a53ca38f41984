//! # verdant-ledger
//! Append-only store of point movements with idempotent, balance-guarded
//! writes and a reconciliation pass for the maintained balance counters.

pub mod reconcile;
pub mod store;

pub use store::MemoryLedgerStore;
