//! Redemption orchestration.
//!
//! [`redeem`] is the atomic unit of a redemption: it runs while the caller
//! (the engine) holds one write lock over the ledger, the catalog, and the
//! redemption rows, so no other operation can observe a partial state.
//! The order inside the unit is checks first, mutations last:
//!
//! 1. idempotency gate (confirmed replays short-circuit; in-flight keys
//!    conflict; failed attempts with the same key are superseded)
//! 2. reward lookup and scope/active check
//! 3. balance precheck
//! 4. pending row, stock decrement, ledger debit, confirm
//!
//! If the debit fails after the decrement, the decrement is undone and the
//! pending row removed before the lock is released: stock is never
//! decremented without a confirmed debit, and no debit is ever recorded
//! without its decrement. On any failure the unit leaves no row behind —
//! recording failed attempts for audit is the engine's job, after the unit
//! has aborted cleanly.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use verdant_core::error::{CatalogError, LedgerError, RedemptionError};
use verdant_core::traits::{LedgerStore, RedemptionStore, RewardStore};
use verdant_core::types::{
    IdempotencyKey, LedgerEntryId, NewLedgerEntry, Reason, RedeemRequest, Redemption, RedemptionId,
    RedemptionStatus, RewardId, UserId, UserProfile,
};

/// In-memory [`RedemptionStore`]. Not thread-safe — the engine wraps it in
/// its lock.
#[derive(Debug, Default)]
pub struct MemoryRedemptionStore {
    rows: HashMap<RedemptionId, Redemption>,
    by_key: HashMap<IdempotencyKey, RedemptionId>,
    next_id: u64,
}

impl MemoryRedemptionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl RedemptionStore for MemoryRedemptionStore {
    fn insert_pending(
        &mut self,
        user: UserId,
        reward: RewardId,
        points_spent: u64,
        key: IdempotencyKey,
        now: DateTime<Utc>,
    ) -> Redemption {
        self.next_id += 1;
        let row = Redemption {
            id: RedemptionId(self.next_id),
            user_id: user,
            reward_id: reward,
            points_spent,
            status: RedemptionStatus::Pending,
            idempotency_key: key,
            ledger_entry_id: None,
            created_at: now,
        };
        self.by_key.insert(row.idempotency_key.clone(), row.id);
        self.rows.insert(row.id, row.clone());
        row
    }

    fn find_by_key(&self, key: &IdempotencyKey) -> Option<Redemption> {
        self.by_key.get(key).and_then(|id| self.rows.get(id)).cloned()
    }

    fn get(&self, id: RedemptionId) -> Option<Redemption> {
        self.rows.get(&id).cloned()
    }

    fn mark_confirmed(
        &mut self,
        id: RedemptionId,
        entry: LedgerEntryId,
    ) -> Result<Redemption, RedemptionError> {
        let row = self
            .rows
            .get_mut(&id)
            .ok_or(RedemptionError::RedemptionNotFound(id))?;
        if row.status == RedemptionStatus::Confirmed {
            return Err(RedemptionError::InvariantViolation(format!(
                "redemption {id} confirmed twice"
            )));
        }
        row.status = RedemptionStatus::Confirmed;
        row.ledger_entry_id = Some(entry);
        Ok(row.clone())
    }

    fn mark_failed(&mut self, id: RedemptionId) -> Result<Redemption, RedemptionError> {
        let row = self
            .rows
            .get_mut(&id)
            .ok_or(RedemptionError::RedemptionNotFound(id))?;
        if row.status == RedemptionStatus::Confirmed {
            return Err(RedemptionError::InvariantViolation(format!(
                "confirmed redemption {id} cannot fail"
            )));
        }
        row.status = RedemptionStatus::Failed;
        Ok(row.clone())
    }

    fn remove(&mut self, id: RedemptionId) -> Result<(), RedemptionError> {
        let status = self
            .rows
            .get(&id)
            .map(|row| row.status)
            .ok_or(RedemptionError::RedemptionNotFound(id))?;
        if status == RedemptionStatus::Confirmed {
            return Err(RedemptionError::InvariantViolation(format!(
                "confirmed redemption {id} cannot be removed"
            )));
        }
        if let Some(row) = self.rows.remove(&id) {
            self.by_key.remove(&row.idempotency_key);
        }
        Ok(())
    }

    fn redemptions_for_user(&self, user: UserId) -> Vec<Redemption> {
        let mut rows: Vec<Redemption> = self
            .rows
            .values()
            .filter(|row| row.user_id == user)
            .cloned()
            .collect();
        rows.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        rows
    }

    fn redemption_count(&self) -> usize {
        self.rows.len()
    }
}

/// Key for the debit entry, namespaced by the redemption row so caller
/// keys can never collide with award keys in the ledger.
fn debit_key(redemption: RedemptionId, request_key: &IdempotencyKey) -> IdempotencyKey {
    IdempotencyKey::derive("redemption-debit", redemption.0 as i64, request_key.as_str())
}

fn map_ledger_err(err: LedgerError, key: &IdempotencyKey) -> RedemptionError {
    match err {
        LedgerError::InsufficientBalance { have, need } => {
            RedemptionError::InsufficientBalance { have, need }
        }
        LedgerError::Conflict => RedemptionError::Conflict { key: key.to_string() },
        other => RedemptionError::InvariantViolation(format!("ledger debit failed: {other}")),
    }
}

/// Execute one redemption atomically. See the module docs for the
/// step-by-step contract.
pub fn redeem(
    ledger: &mut dyn LedgerStore,
    rewards: &mut dyn RewardStore,
    redemptions: &mut dyn RedemptionStore,
    user: &UserProfile,
    req: &RedeemRequest,
    now: DateTime<Utc>,
) -> Result<Redemption, RedemptionError> {
    debug_assert_eq!(user.id, req.user_id);
    let key = &req.idempotency_key;

    // Idempotency gate.
    if let Some(existing) = redemptions.find_by_key(key) {
        let same_payload =
            existing.user_id == req.user_id && existing.reward_id == req.reward_id;
        if !same_payload {
            return Err(RedemptionError::DuplicateRequest { key: key.to_string() });
        }
        match existing.status {
            RedemptionStatus::Confirmed => {
                debug!(redemption = %existing.id, "idempotent replay of confirmed redemption");
                return Ok(existing);
            }
            RedemptionStatus::Pending => {
                return Err(RedemptionError::Conflict { key: key.to_string() });
            }
            RedemptionStatus::Failed => {
                // A retry supersedes the failed attempt; the fresh row below
                // picks up the current reward price.
                redemptions.remove(existing.id)?;
            }
        }
    }

    // Reward lookup. Missing, inactive, and out-of-scope all read as
    // "not found" to the caller.
    let reward = rewards
        .get(req.reward_id)
        .ok_or(RedemptionError::NotFound(req.reward_id))?;
    if !reward.active || !reward.in_scope(user.company_id) {
        return Err(RedemptionError::NotFound(req.reward_id));
    }

    // Balance precheck. The debit below re-checks inside the ledger's own
    // critical section; this keeps the common failure ahead of any mutation.
    let have = ledger.balance(user.id);
    if have < reward.points_required {
        return Err(RedemptionError::InsufficientBalance {
            have,
            need: reward.points_required,
        });
    }
    let debit_amount = i64::try_from(reward.points_required).map_err(|_| {
        RedemptionError::InvariantViolation(format!(
            "points_required {} exceeds ledger range",
            reward.points_required
        ))
    })?;

    // Mutation phase.
    let row = redemptions.insert_pending(
        user.id,
        reward.id,
        reward.points_required,
        key.clone(),
        now,
    );

    if let Err(err) = rewards.decrement_stock(reward.id, 1) {
        redemptions.remove(row.id)?;
        return Err(match err {
            CatalogError::OutOfStock { .. } => RedemptionError::OutOfStock(reward.id),
            CatalogError::Inactive(id) | CatalogError::NotFound(id) => {
                RedemptionError::NotFound(id)
            }
            CatalogError::Conflict => RedemptionError::Conflict { key: key.to_string() },
            other => RedemptionError::InvariantViolation(format!("stock decrement: {other}")),
        });
    }

    let debit = NewLedgerEntry {
        user_id: user.id,
        company_id: user.company_id,
        amount: -debit_amount,
        reason: Reason::Redemption { redemption_id: row.id },
        idempotency_key: debit_key(row.id, key),
    };
    match ledger.append(debit, now) {
        Ok(entry) => {
            let confirmed = redemptions.mark_confirmed(row.id, entry.id)?;
            info!(
                user = %user.id,
                reward = %reward.id,
                redemption = %confirmed.id,
                points = reward.points_required,
                "redemption confirmed"
            );
            Ok(confirmed)
        }
        Err(err) => {
            // Undo the decrement and the pending row before the lock is
            // released: the unit never happened.
            rewards.restore_stock(reward.id, 1).map_err(|restore_err| {
                RedemptionError::InvariantViolation(format!(
                    "stock rollback failed after ledger error ({err}): {restore_err}"
                ))
            })?;
            redemptions.remove(row.id)?;
            Err(map_ledger_err(err, key))
        }
    }
}
