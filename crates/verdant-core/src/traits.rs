//! Store contracts between crates.
//!
//! These traits define the seams of the engine:
//! - [`LedgerStore`] — append-only point movements (verdant-ledger implements)
//! - [`RewardStore`] — catalog with atomic stock decrement (verdant-rewards)
//! - [`RedemptionStore`] — redemption rows and their lifecycle (verdant-rewards)
//! - [`RuleStore`] — versioned point rules (this crate's memory impl)
//! - [`UserDirectory`] — ranking/scoping view of users (this crate's memory impl)
//! - [`SnapshotStore`] — superseding leaderboard snapshots (verdant-ranking)
//!
//! Stores are single-writer (`&mut self`) and not thread-safe on their own;
//! the engine wraps them in one `RwLock` so that every composite operation
//! (balance-check-then-insert, check-and-decrement, the whole redemption)
//! runs inside a single lock scope.

use chrono::{DateTime, Datelike, Utc};

use crate::constants::MAX_PAGE_SIZE;
use crate::error::{CatalogError, DirectoryError, LedgerError, RedemptionError, RuleError};
use crate::period::Period;
use crate::types::{
    CompanyId, IdempotencyKey, LedgerEntry, LedgerEntryId, NewLedgerEntry, NewPointRule, NewReward,
    NewUser, PointRule, PointsSummary, ReconcileReport, Redemption, RedemptionId, Reward,
    RewardFilter, RewardId, RuleId, SnapshotRecord, RankingSnapshot, UserId, UserProfile,
};

/// Append-only store of point movements; the system of record for
/// "how many points does user X have".
pub trait LedgerStore: Send + Sync {
    /// Append an entry. The single write path for all point movement.
    ///
    /// Idempotent by key: an existing entry with the same key and payload
    /// is returned unchanged; the same key with a different payload fails
    /// [`LedgerError::DuplicateRequest`]. Debits that would drive the
    /// balance negative fail [`LedgerError::InsufficientBalance`] — the
    /// balance check and the insert are one critical section. Awards never
    /// fail the balance check.
    fn append(&mut self, new: NewLedgerEntry, now: DateTime<Utc>)
        -> Result<LedgerEntry, LedgerError>;

    /// Current balance, served from the maintained running counter.
    fn balance(&self, user: UserId) -> u64;

    /// Fold the user's entries from scratch. The documented recovery
    /// source of truth for the running counter.
    fn recompute_balance(&self, user: UserId) -> i64;

    /// Look up an entry by id.
    fn entry(&self, id: LedgerEntryId) -> Option<LedgerEntry>;

    /// Look up an entry by idempotency key.
    fn find_by_key(&self, key: &IdempotencyKey) -> Option<LedgerEntry>;

    /// All entries for a user, oldest first.
    fn entries_for_user(&self, user: UserId) -> Vec<LedgerEntry>;

    /// All entries for a company, oldest first.
    fn entries_for_company(&self, company: CompanyId) -> Vec<LedgerEntry>;

    /// Total number of entries.
    fn entry_count(&self) -> usize;

    /// Verify that every user's running counter equals the fold of their
    /// entries and is non-negative. Divergence is an
    /// [`LedgerError::InvariantViolation`].
    fn reconcile(&self) -> Result<ReconcileReport, LedgerError>;

    /// A newest-first page of a user's entries.
    ///
    /// Default implementation slices [`entries_for_user`](Self::entries_for_user);
    /// `limit` is clamped to [`MAX_PAGE_SIZE`].
    fn history(&self, user: UserId, offset: usize, limit: usize) -> Vec<LedgerEntry> {
        let mut entries = self.entries_for_user(user);
        entries.reverse();
        entries
            .into_iter()
            .skip(offset)
            .take(limit.min(MAX_PAGE_SIZE))
            .collect()
    }

    /// Aggregate view of a user's history. `now` anchors the
    /// current-month window.
    fn summary(&self, user: UserId, now: DateTime<Utc>) -> PointsSummary {
        let month = Period::Monthly { year: now.year(), month: now.month() };
        let mut summary = PointsSummary { current_balance: self.balance(user), ..Default::default() };
        for entry in self.entries_for_user(user) {
            if entry.amount > 0 {
                summary.total_earned += entry.amount as u64;
                if month.contains(entry.created_at) {
                    summary.this_month_earned += entry.amount as u64;
                }
            } else {
                summary.total_spent += entry.amount.unsigned_abs();
            }
        }
        summary
    }
}

/// Read-mostly reward catalog with bounded stock counters.
///
/// Stock is mutated only through [`decrement_stock`](Self::decrement_stock)
/// / [`restore_stock`](Self::restore_stock), and only by the redemption
/// path.
pub trait RewardStore: Send + Sync {
    /// Add a reward to the catalog.
    fn insert(&mut self, new: NewReward, now: DateTime<Utc>) -> Reward;

    /// Look up a reward by id.
    fn get(&self, id: RewardId) -> Option<Reward>;

    /// Active rewards visible to the given company (global rewards
    /// included), newest first, filtered and paginated.
    fn list(&self, company: CompanyId, filter: &RewardFilter) -> Vec<Reward>;

    /// Distinct categories of active rewards visible to the company,
    /// sorted.
    fn categories(&self, company: CompanyId) -> Vec<String>;

    /// Atomically decrement stock by `qty`.
    ///
    /// Succeeds only if `stock >= qty` at the moment of the decrement;
    /// fails [`CatalogError::OutOfStock`] otherwise. Unlimited stock
    /// (`None`) always succeeds. No reservation window: the check and the
    /// decrement are indivisible.
    fn decrement_stock(&mut self, id: RewardId, qty: u32) -> Result<(), CatalogError>;

    /// Undo a decrement made earlier in the same lock scope. Only the
    /// redemption rollback path calls this.
    fn restore_stock(&mut self, id: RewardId, qty: u32) -> Result<(), CatalogError>;

    /// Deactivate a reward. Existing redemptions are unaffected.
    fn retire(&mut self, id: RewardId) -> Result<Reward, CatalogError>;

    /// Total number of rewards, active or not.
    fn reward_count(&self) -> usize;
}

/// Store of redemption rows and their `pending → confirmed | failed`
/// lifecycle. Confirmed rows are terminal.
pub trait RedemptionStore: Send + Sync {
    /// Insert a new pending redemption.
    fn insert_pending(
        &mut self,
        user: UserId,
        reward: RewardId,
        points_spent: u64,
        key: IdempotencyKey,
        now: DateTime<Utc>,
    ) -> Redemption;

    /// Look up by idempotency key.
    fn find_by_key(&self, key: &IdempotencyKey) -> Option<Redemption>;

    /// Look up by id.
    fn get(&self, id: RedemptionId) -> Option<Redemption>;

    /// Transition to `confirmed`, recording the correlated debit entry.
    /// Fails on unknown ids; confirming an already-confirmed row is an
    /// [`RedemptionError::InvariantViolation`].
    fn mark_confirmed(
        &mut self,
        id: RedemptionId,
        entry: LedgerEntryId,
    ) -> Result<Redemption, RedemptionError>;

    /// Transition to `failed`. Idempotent on already-failed rows; fails
    /// on confirmed rows.
    fn mark_failed(&mut self, id: RedemptionId) -> Result<Redemption, RedemptionError>;

    /// Remove a row created earlier in the same atomic unit (rollback).
    /// Confirmed rows cannot be removed.
    fn remove(&mut self, id: RedemptionId) -> Result<(), RedemptionError>;

    /// A user's redemptions, newest first.
    fn redemptions_for_user(&self, user: UserId) -> Vec<Redemption>;

    /// Total number of rows, any status.
    fn redemption_count(&self) -> usize;
}

/// Versioned point rules. Rows are immutable except the `active` flag.
pub trait RuleStore: Send + Sync {
    /// Insert a new rule row.
    fn insert(&mut self, new: NewPointRule, now: DateTime<Utc>) -> Result<PointRule, RuleError>;

    /// Look up a rule by id.
    fn get(&self, id: RuleId) -> Option<PointRule>;

    /// Deactivate a rule row. The row itself is kept so historical awards
    /// stay explainable.
    fn retire(&mut self, id: RuleId) -> Result<PointRule, RuleError>;

    /// Every rule row, oldest first.
    fn rules(&self) -> Vec<PointRule>;

    /// Active rule rows, oldest first.
    fn active_rules(&self) -> Vec<PointRule> {
        self.rules().into_iter().filter(|r| r.active).collect()
    }
}

/// The engine's view of user accounts: company scope, department, and the
/// account-creation instant used as the ranking tie-break.
pub trait UserDirectory: Send + Sync {
    /// Register a user. Ids are assigned by the surrounding system.
    fn register(&mut self, new: NewUser) -> Result<UserProfile, DirectoryError>;

    /// Look up a user.
    fn get(&self, id: UserId) -> Option<UserProfile>;

    /// All users of a company, ordered by account creation then id.
    fn users_of_company(&self, company: CompanyId) -> Vec<UserProfile>;

    /// Total number of registered users.
    fn user_count(&self) -> usize;
}

/// Append-only snapshot storage. A recomputation for the same
/// company/period gets the next revision and supersedes earlier ones;
/// nothing is ever edited in place.
pub trait SnapshotStore: Send + Sync {
    /// Store a snapshot, assigning the next revision for its
    /// company/period. Returns the stored record.
    fn put(&mut self, snapshot: RankingSnapshot) -> SnapshotRecord;

    /// The highest-revision snapshot for a company/period.
    fn latest(&self, company: CompanyId, period: &Period) -> Option<SnapshotRecord>;

    /// All revisions for a company/period, oldest first.
    fn revisions(&self, company: CompanyId, period: &Period) -> Vec<SnapshotRecord>;

    /// Total number of stored records across all periods.
    fn snapshot_count(&self) -> usize;
}
