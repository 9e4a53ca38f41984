//! Counter reconciliation.
//!
//! The maintained running balances are a cache over the append-only
//! entries. After any suspected corruption the entries are the source of
//! truth: [`verify`] recomputes every user's balance from its entries and
//! reports the first divergence (or a negative counter) as an
//! [`LedgerError::InvariantViolation`]. It never repairs silently.

use tracing::warn;

use verdant_core::error::LedgerError;
use verdant_core::traits::LedgerStore;
use verdant_core::types::{ReconcileReport, UserId};

use crate::store::MemoryLedgerStore;

/// Verify that every user's counter equals the fold of their entries and
/// is non-negative.
pub fn verify(store: &MemoryLedgerStore) -> Result<ReconcileReport, LedgerError> {
    let mut users: Vec<UserId> = store
        .balances
        .keys()
        .chain(store.by_user.keys())
        .copied()
        .collect();
    users.sort_unstable();
    users.dedup();

    for user in &users {
        let counter = store.balances.get(user).copied().unwrap_or(0);
        let recomputed = store.recompute_balance(*user);
        if counter != recomputed {
            warn!(%user, counter, recomputed, "balance counter diverged from entries");
            return Err(LedgerError::InvariantViolation(format!(
                "user {user}: counter {counter} != entry sum {recomputed}"
            )));
        }
        if counter < 0 {
            warn!(%user, counter, "negative balance in ledger");
            return Err(LedgerError::InvariantViolation(format!(
                "user {user}: negative balance {counter}"
            )));
        }
    }

    Ok(ReconcileReport {
        users_checked: users.len(),
        entries_scanned: store.entries.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use verdant_core::types::{CompanyId, IdempotencyKey, NewLedgerEntry, Reason, RuleId};

    fn award(user: u64, amount: i64, key: &str) -> NewLedgerEntry {
        NewLedgerEntry {
            user_id: UserId(user),
            company_id: CompanyId(1),
            amount,
            reason: Reason::RuleAward { rule_id: RuleId(1) },
            idempotency_key: IdempotencyKey::new(key),
        }
    }

    fn seeded() -> MemoryLedgerStore {
        let now = Utc.timestamp_opt(1_000, 0).unwrap();
        let mut ledger = MemoryLedgerStore::new();
        ledger.append(award(1, 100, "k1"), now).unwrap();
        ledger.append(award(2, 50, "k2"), now).unwrap();
        ledger
            .append(
                NewLedgerEntry {
                    amount: -30,
                    reason: Reason::Manual { note: "spend".into() },
                    ..award(1, 0, "k3")
                },
                now,
            )
            .unwrap();
        ledger
    }

    #[test]
    fn clean_ledger_reconciles() {
        let ledger = seeded();
        let report = ledger.reconcile().unwrap();
        assert_eq!(report.users_checked, 2);
        assert_eq!(report.entries_scanned, 3);
    }

    #[test]
    fn empty_ledger_reconciles() {
        let ledger = MemoryLedgerStore::new();
        let report = ledger.reconcile().unwrap();
        assert_eq!(report.users_checked, 0);
        assert_eq!(report.entries_scanned, 0);
    }

    #[test]
    fn corrupted_counter_is_detected() {
        let mut ledger = seeded();
        ledger.force_balance(UserId(1), 9_999);
        let err = ledger.reconcile().unwrap_err();
        assert!(matches!(err, LedgerError::InvariantViolation(_)));
        let msg = format!("{err}");
        assert!(msg.contains("user 1"), "message names the user: {msg}");
    }

    #[test]
    fn negative_counter_is_detected() {
        let mut ledger = MemoryLedgerStore::new();
        // A user with a counter but no entries: sum is 0, counter is -5.
        ledger.force_balance(UserId(7), -5);
        let err = ledger.reconcile().unwrap_err();
        assert!(matches!(err, LedgerError::InvariantViolation(_)));
    }

    #[test]
    fn counter_for_user_without_entries_must_be_zero() {
        let mut ledger = seeded();
        ledger.force_balance(UserId(9), 10);
        assert!(ledger.reconcile().is_err());
    }
}
