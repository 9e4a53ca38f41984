//! Append-only snapshot storage.
//!
//! Every `put` for a company/period gets the next revision; earlier
//! revisions stay readable for audit. Nothing is ever edited in place —
//! superseding is the only form of "update".

use std::collections::HashMap;

use verdant_core::period::Period;
use verdant_core::traits::SnapshotStore;
use verdant_core::types::{CompanyId, RankingSnapshot, SnapshotRecord};

/// In-memory [`SnapshotStore`]. Not thread-safe — the engine wraps it in
/// its lock.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    records: HashMap<(CompanyId, String), Vec<SnapshotRecord>>,
}

impl MemorySnapshotStore {
    /// Create an empty snapshot store.
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, company: CompanyId, period: &Period) -> Option<&Vec<SnapshotRecord>> {
        self.records.get(&(company, period.key()))
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn put(&mut self, snapshot: RankingSnapshot) -> SnapshotRecord {
        let slot = self
            .records
            .entry((snapshot.company_id, snapshot.period.key()))
            .or_default();
        let record = SnapshotRecord { revision: slot.len() as u64 + 1, snapshot };
        slot.push(record.clone());
        record
    }

    fn latest(&self, company: CompanyId, period: &Period) -> Option<SnapshotRecord> {
        self.slot(company, period).and_then(|slot| slot.last()).cloned()
    }

    fn revisions(&self, company: CompanyId, period: &Period) -> Vec<SnapshotRecord> {
        self.slot(company, period).cloned().unwrap_or_default()
    }

    fn snapshot_count(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }
}
