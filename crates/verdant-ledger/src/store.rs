//! In-memory ledger store.
//!
//! Entries are append-only: never updated, never deleted. Each user's
//! balance is maintained as a running counter updated in the same critical
//! section as the entry insert, so a debit can never pass the balance check
//! and then find the balance changed. Counter recovery is the
//! reconciliation pass in [`crate::reconcile`].
//!
//! Not thread-safe — callers wrap the store in a lock; the engine holds one
//! write lock across every composite operation.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use verdant_core::error::LedgerError;
use verdant_core::traits::LedgerStore;
use verdant_core::types::{
    CompanyId, IdempotencyKey, LedgerEntry, LedgerEntryId, NewLedgerEntry, ReconcileReport, UserId,
};

/// In-memory [`LedgerStore`].
///
/// Entry ids are assigned sequentially from 1, so `entries[id - 1]` is the
/// entry with that id (entries are never removed).
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    pub(crate) entries: Vec<LedgerEntry>,
    pub(crate) by_key: HashMap<IdempotencyKey, LedgerEntryId>,
    pub(crate) by_user: HashMap<UserId, Vec<LedgerEntryId>>,
    pub(crate) by_company: HashMap<CompanyId, Vec<LedgerEntryId>>,
    /// Maintained running balance per user. Invariant: equals the fold of
    /// the user's entries and is never negative.
    pub(crate) balances: HashMap<UserId, i64>,
}

impl MemoryLedgerStore {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a user's running counter, bypassing every invariant.
    ///
    /// Exists so reconciliation tests can simulate counter corruption.
    #[cfg(any(test, feature = "testing"))]
    pub fn force_balance(&mut self, user: UserId, counter: i64) {
        self.balances.insert(user, counter);
    }

    fn lookup(&self, id: LedgerEntryId) -> Option<&LedgerEntry> {
        let index = usize::try_from(id.0.checked_sub(1)?).ok()?;
        self.entries.get(index)
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn append(
        &mut self,
        new: NewLedgerEntry,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry, LedgerError> {
        if new.amount == 0 {
            return Err(LedgerError::ZeroAmount(new.user_id));
        }

        // Idempotency gate: a replay of the same payload returns the stored
        // entry; the same key with a different payload is a misuse signal.
        if let Some(existing_id) = self.by_key.get(&new.idempotency_key) {
            let existing = self.lookup(*existing_id).ok_or_else(|| {
                LedgerError::InvariantViolation(format!(
                    "key index references missing entry {existing_id}"
                ))
            })?;
            if existing.same_payload(&new) {
                debug!(user = %new.user_id, entry = %existing.id, "idempotent replay");
                return Ok(existing.clone());
            }
            return Err(LedgerError::DuplicateRequest {
                key: new.idempotency_key.to_string(),
            });
        }

        // Balance check and insert are one critical section: the caller
        // holds `&mut self`, so no other debit can interleave.
        let have = self.balances.get(&new.user_id).copied().unwrap_or(0);
        if have < 0 {
            return Err(LedgerError::InvariantViolation(format!(
                "negative running counter {have} for user {}",
                new.user_id
            )));
        }
        if new.amount < 0 {
            let need = new.amount.unsigned_abs();
            if (have as u64) < need {
                return Err(LedgerError::InsufficientBalance { have: have as u64, need });
            }
        }
        let after = have.checked_add(new.amount).ok_or_else(|| {
            LedgerError::InvariantViolation(format!("balance overflow for user {}", new.user_id))
        })?;

        let id = LedgerEntryId(self.entries.len() as u64 + 1);
        let entry = LedgerEntry {
            id,
            user_id: new.user_id,
            company_id: new.company_id,
            amount: new.amount,
            reason: new.reason,
            idempotency_key: new.idempotency_key,
            created_at: now,
        };

        self.by_key.insert(entry.idempotency_key.clone(), id);
        self.by_user.entry(entry.user_id).or_default().push(id);
        self.by_company.entry(entry.company_id).or_default().push(id);
        self.balances.insert(entry.user_id, after);
        self.entries.push(entry.clone());

        debug!(
            user = %entry.user_id,
            entry = %entry.id,
            amount = entry.amount,
            balance = after,
            "ledger append"
        );
        Ok(entry)
    }

    fn balance(&self, user: UserId) -> u64 {
        // The counter is kept non-negative by `append`; reconcile() surfaces
        // any corruption loudly rather than this read path.
        self.balances.get(&user).copied().unwrap_or(0).max(0) as u64
    }

    fn recompute_balance(&self, user: UserId) -> i64 {
        self.by_user
            .get(&user)
            .into_iter()
            .flatten()
            .filter_map(|id| self.lookup(*id))
            .map(|entry| entry.amount)
            .sum()
    }

    fn entry(&self, id: LedgerEntryId) -> Option<LedgerEntry> {
        self.lookup(id).cloned()
    }

    fn find_by_key(&self, key: &IdempotencyKey) -> Option<LedgerEntry> {
        self.by_key.get(key).and_then(|id| self.lookup(*id)).cloned()
    }

    fn entries_for_user(&self, user: UserId) -> Vec<LedgerEntry> {
        self.by_user
            .get(&user)
            .into_iter()
            .flatten()
            .filter_map(|id| self.lookup(*id))
            .cloned()
            .collect()
    }

    fn entries_for_company(&self, company: CompanyId) -> Vec<LedgerEntry> {
        self.by_company
            .get(&company)
            .into_iter()
            .flatten()
            .filter_map(|id| self.lookup(*id))
            .cloned()
            .collect()
    }

    fn entry_count(&self) -> usize {
        self.entries.len()
    }

    fn reconcile(&self) -> Result<ReconcileReport, LedgerError> {
        crate::reconcile::verify(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use verdant_core::types::{Reason, RuleId};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn award(user: u64, amount: i64, key: &str) -> NewLedgerEntry {
        NewLedgerEntry {
            user_id: UserId(user),
            company_id: CompanyId(1),
            amount,
            reason: Reason::RuleAward { rule_id: RuleId(1) },
            idempotency_key: IdempotencyKey::new(key),
        }
    }

    fn debit(user: u64, amount: u64, key: &str) -> NewLedgerEntry {
        NewLedgerEntry {
            amount: -(amount as i64),
            reason: Reason::Manual { note: "debit".into() },
            ..award(user, 0, key)
        }
    }

    // --- Append and balance ---

    #[test]
    fn append_award_credits_balance() {
        let mut ledger = MemoryLedgerStore::new();
        let entry = ledger.append(award(1, 25, "k1"), at(1)).unwrap();
        assert_eq!(entry.id, LedgerEntryId(1));
        assert_eq!(entry.amount, 25);
        assert_eq!(ledger.balance(UserId(1)), 25);
        assert_eq!(ledger.entry_count(), 1);
    }

    #[test]
    fn append_debit_requires_funds() {
        let mut ledger = MemoryLedgerStore::new();
        ledger.append(award(1, 100, "k1"), at(1)).unwrap();
        ledger.append(debit(1, 60, "k2"), at(2)).unwrap();
        assert_eq!(ledger.balance(UserId(1)), 40);

        let err = ledger.append(debit(1, 41, "k3"), at(3)).unwrap_err();
        assert_eq!(err, LedgerError::InsufficientBalance { have: 40, need: 41 });
        // The failed debit left no trace.
        assert_eq!(ledger.balance(UserId(1)), 40);
        assert_eq!(ledger.entry_count(), 2);
    }

    #[test]
    fn debit_with_no_history_fails() {
        let mut ledger = MemoryLedgerStore::new();
        let err = ledger.append(debit(1, 1, "k1"), at(1)).unwrap_err();
        assert_eq!(err, LedgerError::InsufficientBalance { have: 0, need: 1 });
    }

    #[test]
    fn debit_to_exactly_zero_is_allowed() {
        let mut ledger = MemoryLedgerStore::new();
        ledger.append(award(1, 50, "k1"), at(1)).unwrap();
        ledger.append(debit(1, 50, "k2"), at(2)).unwrap();
        assert_eq!(ledger.balance(UserId(1)), 0);
    }

    #[test]
    fn zero_amount_entry_is_rejected() {
        let mut ledger = MemoryLedgerStore::new();
        let err = ledger.append(award(1, 0, "k1"), at(1)).unwrap_err();
        assert_eq!(err, LedgerError::ZeroAmount(UserId(1)));
    }

    #[test]
    fn balances_are_per_user() {
        let mut ledger = MemoryLedgerStore::new();
        ledger.append(award(1, 100, "k1"), at(1)).unwrap();
        ledger.append(award(2, 30, "k2"), at(2)).unwrap();
        assert_eq!(ledger.balance(UserId(1)), 100);
        assert_eq!(ledger.balance(UserId(2)), 30);
        assert_eq!(ledger.balance(UserId(3)), 0);
    }

    // --- Idempotency ---

    #[test]
    fn replay_returns_stored_entry_once() {
        let mut ledger = MemoryLedgerStore::new();
        let first = ledger.append(award(1, 25, "k1"), at(1)).unwrap();
        let second = ledger.append(award(1, 25, "k1"), at(99)).unwrap();
        assert_eq!(first, second);
        assert_eq!(ledger.entry_count(), 1);
        assert_eq!(ledger.balance(UserId(1)), 25);
    }

    #[test]
    fn same_key_different_payload_is_duplicate_request() {
        let mut ledger = MemoryLedgerStore::new();
        ledger.append(award(1, 25, "k1"), at(1)).unwrap();
        let err = ledger.append(award(1, 26, "k1"), at(2)).unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateRequest { .. }));
        assert_eq!(ledger.balance(UserId(1)), 25);
    }

    #[test]
    fn replay_of_debit_does_not_double_spend() {
        let mut ledger = MemoryLedgerStore::new();
        ledger.append(award(1, 100, "k1"), at(1)).unwrap();
        ledger.append(debit(1, 60, "k2"), at(2)).unwrap();
        ledger.append(debit(1, 60, "k2"), at(3)).unwrap();
        assert_eq!(ledger.balance(UserId(1)), 40);
        assert_eq!(ledger.entry_count(), 2);
    }

    // --- Reads ---

    #[test]
    fn entries_for_user_oldest_first() {
        let mut ledger = MemoryLedgerStore::new();
        ledger.append(award(1, 10, "k1"), at(1)).unwrap();
        ledger.append(award(2, 99, "k2"), at(2)).unwrap();
        ledger.append(debit(1, 5, "k3"), at(3)).unwrap();

        let entries = ledger.entries_for_user(UserId(1));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].amount, 10);
        assert_eq!(entries[1].amount, -5);
    }

    #[test]
    fn entries_for_company_covers_all_users() {
        let mut ledger = MemoryLedgerStore::new();
        ledger.append(award(1, 10, "k1"), at(1)).unwrap();
        ledger.append(award(2, 20, "k2"), at(2)).unwrap();
        let mut other = award(3, 30, "k3");
        other.company_id = CompanyId(2);
        ledger.append(other, at(3)).unwrap();

        assert_eq!(ledger.entries_for_company(CompanyId(1)).len(), 2);
        assert_eq!(ledger.entries_for_company(CompanyId(2)).len(), 1);
        assert!(ledger.entries_for_company(CompanyId(3)).is_empty());
    }

    #[test]
    fn entry_and_key_lookup() {
        let mut ledger = MemoryLedgerStore::new();
        let entry = ledger.append(award(1, 10, "k1"), at(1)).unwrap();
        assert_eq!(ledger.entry(entry.id).unwrap(), entry);
        assert_eq!(ledger.find_by_key(&IdempotencyKey::new("k1")).unwrap(), entry);
        assert!(ledger.entry(LedgerEntryId(99)).is_none());
        assert!(ledger.find_by_key(&IdempotencyKey::new("nope")).is_none());
    }

    #[test]
    fn history_is_newest_first_and_paged() {
        let mut ledger = MemoryLedgerStore::new();
        for i in 0..5 {
            ledger.append(award(1, 10 + i, &format!("k{i}")), at(i)).unwrap();
        }
        let page = ledger.history(UserId(1), 0, 2);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].amount, 14);
        assert_eq!(page[1].amount, 13);

        let rest = ledger.history(UserId(1), 2, 10);
        assert_eq!(rest.len(), 3);
        assert_eq!(rest[0].amount, 12);
    }

    #[test]
    fn summary_splits_earned_and_spent() {
        let mut ledger = MemoryLedgerStore::new();
        let jan = at(1_735_689_600); // 2025-01-01
        let now = at(1_738_368_000); // 2025-02-01
        ledger.append(award(1, 100, "k1"), jan).unwrap();
        ledger.append(award(1, 50, "k2"), now).unwrap();
        ledger.append(debit(1, 30, "k3"), now).unwrap();

        let summary = ledger.summary(UserId(1), now);
        assert_eq!(summary.current_balance, 120);
        assert_eq!(summary.total_earned, 150);
        assert_eq!(summary.total_spent, 30);
        // Only the February award counts toward the current month.
        assert_eq!(summary.this_month_earned, 50);
    }

    #[test]
    fn recompute_matches_counter() {
        let mut ledger = MemoryLedgerStore::new();
        ledger.append(award(1, 100, "k1"), at(1)).unwrap();
        ledger.append(debit(1, 40, "k2"), at(2)).unwrap();
        assert_eq!(ledger.recompute_balance(UserId(1)), 60);
        assert_eq!(ledger.balance(UserId(1)), 60);
    }
}
