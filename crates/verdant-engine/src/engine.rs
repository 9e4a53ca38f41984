//! Engine composition and public operations.
//!
//! [`Engine`] holds every store behind a single `parking_lot::RwLock`; a
//! write guard is the transaction scope.
//! Composite operations (award, redeem, ranking) acquire one write lock
//! for their whole critical section, so a caller that gives up waiting
//! observes either all of an operation's effects or none of them.
//!
//! `Conflict` results are retried here, a bounded number of times with
//! jittered exponential backoff; every other failure is returned to the
//! caller untouched.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rand::Rng;
use tracing::{debug, info, warn};

use verdant_core::directory::MemoryUserDirectory;
use verdant_core::error::{DirectoryError, LedgerError, RedemptionError, VerdantError};
use verdant_core::period::Period;
use verdant_core::rules::{self, MemoryRuleStore};
use verdant_core::traits::{
    LedgerStore, RedemptionStore, RewardStore, RuleStore, SnapshotStore, UserDirectory,
};
use verdant_core::types::{
    CompanyId, EnergyType, EventKind, IdempotencyKey, LedgerEntry, LedgerEntryId, NewLedgerEntry,
    NewPointRule, NewReward, NewUser, PointRule, PointsSummary, Reason, ReconcileReport,
    RedeemRequest, Redemption, ReductionEvent, Reward, RewardFilter, RewardId, RuleId,
    SnapshotRecord, UserId, UserProfile,
};
use verdant_ledger::MemoryLedgerStore;
use verdant_ranking::{self as ranking, MemorySnapshotStore, RankingConfig};
use verdant_rewards::{redemption, MemoryRedemptionStore, MemoryRewardStore};

use crate::config::EngineConfig;

/// All durable state, behind one lock in [`Engine`].
#[derive(Debug, Default)]
pub struct EngineState {
    pub users: MemoryUserDirectory,
    pub rules: MemoryRuleStore,
    pub ledger: MemoryLedgerStore,
    pub rewards: MemoryRewardStore,
    pub redemptions: MemoryRedemptionStore,
    pub snapshots: MemorySnapshotStore,
}

/// Result of a bulk rule application run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Users that received an award.
    pub users_processed: usize,
    /// Total points credited across all users.
    pub points_awarded: u64,
    /// Reduction events aggregated into the run.
    pub events_aggregated: usize,
    /// Users whose aggregate matched no active rule (or rounded to zero).
    pub skipped_users: usize,
}

/// Store sizes, for operational visibility.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub users: usize,
    pub rules: usize,
    pub ledger_entries: usize,
    pub rewards: usize,
    pub redemptions: usize,
    pub snapshots: usize,
}

/// The points engine: ledger, catalog, redemptions, rules, directory, and
/// snapshots behind one lock. Cheap to clone (`Arc` inside) and safe to
/// share across threads.
#[derive(Clone)]
pub struct Engine {
    state: Arc<RwLock<EngineState>>,
    config: EngineConfig,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Engine {
    /// Create an empty engine with the given configuration.
    pub fn new(config: EngineConfig) -> Self {
        Self { state: Arc::new(RwLock::new(EngineState::default())), config }
    }

    /// The engine's configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Direct access to the state lock, for invariant-corruption tests.
    #[cfg(any(test, feature = "testing"))]
    pub fn state(&self) -> &Arc<RwLock<EngineState>> {
        &self.state
    }

    // ------------------------------------------------------------------
    // Directory and configuration surface
    // ------------------------------------------------------------------

    /// Register a user with the engine.
    pub fn register_user(&self, new: NewUser) -> Result<UserProfile, VerdantError> {
        let profile = self.state.write().users.register(new)?;
        debug!(user = %profile.id, company = %profile.company_id, "user registered");
        Ok(profile)
    }

    /// Look up a user profile.
    pub fn user(&self, id: UserId) -> Option<UserProfile> {
        self.state.read().users.get(id)
    }

    /// Create a new rule row.
    pub fn define_rule(
        &self,
        new: NewPointRule,
        now: DateTime<Utc>,
    ) -> Result<PointRule, VerdantError> {
        let rule = self.state.write().rules.insert(new, now)?;
        info!(rule = %rule.id, kind = %rule.kind, "rule defined");
        Ok(rule)
    }

    /// Retire a rule row; historical awards keep referencing it.
    pub fn retire_rule(&self, id: RuleId) -> Result<PointRule, VerdantError> {
        let rule = self.state.write().rules.retire(id)?;
        info!(rule = %rule.id, "rule retired");
        Ok(rule)
    }

    /// Add a reward to the catalog.
    pub fn add_reward(&self, new: NewReward, now: DateTime<Utc>) -> Reward {
        let reward = self.state.write().rewards.insert(new, now);
        info!(reward = %reward.id, title = %reward.title, "reward added");
        reward
    }

    /// Deactivate a reward.
    pub fn retire_reward(&self, id: RewardId) -> Result<Reward, VerdantError> {
        Ok(self.state.write().rewards.retire(id)?)
    }

    /// Look up a reward.
    pub fn reward(&self, id: RewardId) -> Option<Reward> {
        self.state.read().rewards.get(id)
    }

    /// Rewards visible to a company, filtered and paginated.
    pub fn list_rewards(&self, company: CompanyId, filter: &RewardFilter) -> Vec<Reward> {
        self.state.read().rewards.list(company, filter)
    }

    /// Distinct active reward categories visible to a company.
    pub fn reward_categories(&self, company: CompanyId) -> Vec<String> {
        self.state.read().rewards.categories(company)
    }

    // ------------------------------------------------------------------
    // Award path (ingestion pipeline entry point)
    // ------------------------------------------------------------------

    /// Evaluate the rule set against an event and append the award.
    ///
    /// Returns `Ok(None)` when no active rule applies. Replays of the same
    /// event (same idempotency key) return the originally stored entry.
    pub fn award_event(
        &self,
        event: &ReductionEvent,
        now: DateTime<Utc>,
    ) -> Result<Option<LedgerEntry>, VerdantError> {
        let mut guard = self.state.write();
        Self::award_locked(&mut guard, event, now)
    }

    fn award_locked(
        state: &mut EngineState,
        event: &ReductionEvent,
        now: DateTime<Utc>,
    ) -> Result<Option<LedgerEntry>, VerdantError> {
        let user = state
            .users
            .get(event.user_id)
            .ok_or(DirectoryError::UnknownUser(event.user_id))?;
        if user.company_id != event.company_id {
            return Err(DirectoryError::CompanyMismatch {
                user: event.user_id,
                actual: user.company_id,
                claimed: event.company_id,
            }
            .into());
        }

        let rules = state.rules.rules();
        let Some(award) = rules::evaluate(&rules, event) else {
            debug!(user = %event.user_id, "no active rule for event");
            return Ok(None);
        };
        let amount = i64::try_from(award.amount).map_err(|_| {
            LedgerError::InvariantViolation(format!(
                "award {} exceeds ledger range",
                award.amount
            ))
        })?;

        let entry = state.ledger.append(
            NewLedgerEntry {
                user_id: event.user_id,
                company_id: event.company_id,
                amount,
                reason: Reason::RuleAward { rule_id: award.rule_id },
                idempotency_key: event.idempotency_key.clone(),
            },
            now,
        )?;
        info!(
            user = %entry.user_id,
            rule = %award.rule_id,
            points = award.amount,
            "points awarded"
        );
        Ok(Some(entry))
    }

    /// Aggregate a batch of reduction events per user and award the totals
    /// through the normal award path.
    ///
    /// Only `Reduction` events whose `occurred_at` falls inside `period`
    /// participate. The synthetic per-user events carry period-scoped
    /// idempotency keys, so re-running the same batch never double-credits.
    pub fn apply_rules_for_period(
        &self,
        events: &[ReductionEvent],
        period: Period,
        now: DateTime<Utc>,
    ) -> Result<ApplyReport, VerdantError> {
        let (start, _) = period.bounds();
        let occurred_at = start.unwrap_or(now);
        let stamp = occurred_at.timestamp_millis();

        // Aggregate grams per (user, company), deterministically ordered.
        let mut totals: Vec<((UserId, CompanyId), u64)> = Vec::new();
        let mut aggregated = 0usize;
        for event in events {
            let EventKind::Reduction { co2_grams, .. } = event.kind else {
                continue;
            };
            if !period.contains(event.occurred_at) {
                continue;
            }
            aggregated += 1;
            let key = (event.user_id, event.company_id);
            match totals.iter_mut().find(|slot| slot.0 == key) {
                Some(slot) => slot.1 = slot.1.saturating_add(co2_grams),
                None => totals.push((key, co2_grams)),
            }
        }
        totals.sort_by_key(|((user, company), _)| (*company, *user));

        let mut report = ApplyReport { events_aggregated: aggregated, ..Default::default() };
        let mut guard = self.state.write();
        let state = &mut *guard;
        for ((user_id, company_id), co2_grams) in totals {
            let synthetic = ReductionEvent {
                user_id,
                company_id,
                kind: EventKind::Reduction { co2_grams, energy_type: EnergyType::Other },
                occurred_at,
                idempotency_key: IdempotencyKey::derive(
                    &format!("apply-rules:{company_id}:{user_id}"),
                    stamp,
                    &period.key(),
                ),
            };
            match Self::award_locked(state, &synthetic, now)? {
                Some(entry) => {
                    report.users_processed += 1;
                    report.points_awarded += entry.amount.unsigned_abs();
                }
                None => report.skipped_users += 1,
            }
        }
        info!(
            period = %period,
            users = report.users_processed,
            points = report.points_awarded,
            "bulk rule application finished"
        );
        Ok(report)
    }

    /// Issue an offsetting correction for an existing entry.
    ///
    /// The ledger is append-only, so a mistaken award (or debit) is undone
    /// by a new entry with the negated amount referencing the original.
    /// Reversing an award a user has already spent fails
    /// `InsufficientBalance` — conservation is enforced here like
    /// everywhere else.
    pub fn correct_entry(
        &self,
        id: LedgerEntryId,
        key: IdempotencyKey,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry, VerdantError> {
        let mut guard = self.state.write();
        let state = &mut *guard;
        let original = state
            .ledger
            .entry(id)
            .ok_or(LedgerError::EntryNotFound(id))?;
        let amount = original.amount.checked_neg().ok_or_else(|| {
            LedgerError::InvariantViolation(format!("cannot negate amount of entry {id}"))
        })?;
        let entry = state.ledger.append(
            NewLedgerEntry {
                user_id: original.user_id,
                company_id: original.company_id,
                amount,
                reason: Reason::Correction { offsets: id },
                idempotency_key: key,
            },
            now,
        )?;
        info!(user = %entry.user_id, offsets = %id, amount, "correction issued");
        Ok(entry)
    }

    // ------------------------------------------------------------------
    // Ledger reads
    // ------------------------------------------------------------------

    /// A user's current balance.
    pub fn balance(&self, user: UserId) -> u64 {
        self.state.read().ledger.balance(user)
    }

    /// Aggregate view of a user's history.
    pub fn summary(&self, user: UserId, now: DateTime<Utc>) -> PointsSummary {
        self.state.read().ledger.summary(user, now)
    }

    /// A newest-first page of a user's ledger history.
    pub fn history(&self, user: UserId, offset: usize, limit: usize) -> Vec<LedgerEntry> {
        self.state.read().ledger.history(user, offset, limit)
    }

    /// A user's redemptions, newest first.
    pub fn redemptions_for_user(&self, user: UserId) -> Vec<Redemption> {
        self.state.read().redemptions.redemptions_for_user(user)
    }

    /// Verify the balance counters against the entries.
    pub fn reconcile(&self) -> Result<ReconcileReport, VerdantError> {
        Ok(self.state.read().ledger.reconcile()?)
    }

    /// Store sizes.
    pub fn stats(&self) -> EngineStats {
        let state = self.state.read();
        EngineStats {
            users: state.users.user_count(),
            rules: state.rules.rules().len(),
            ledger_entries: state.ledger.entry_count(),
            rewards: state.rewards.reward_count(),
            redemptions: state.redemptions.redemption_count(),
            snapshots: state.snapshots.snapshot_count(),
        }
    }

    // ------------------------------------------------------------------
    // Redemption
    // ------------------------------------------------------------------

    /// Redeem a reward.
    ///
    /// The whole redemption runs under one write lock; `Conflict` results
    /// are retried with jittered backoff up to the configured bound.
    /// Business failures (`NotFound`, `InsufficientBalance`, `OutOfStock`)
    /// are returned as-is; the ones with a known reward are also recorded
    /// as `failed` redemption rows for audit.
    pub fn redeem(
        &self,
        req: &RedeemRequest,
        now: DateTime<Utc>,
    ) -> Result<Redemption, VerdantError> {
        let mut attempt: u32 = 0;
        loop {
            let result = {
                let mut guard = self.state.write();
                let state = &mut *guard;
                let user = state
                    .users
                    .get(req.user_id)
                    .ok_or(RedemptionError::UnknownUser(req.user_id))?;
                redemption::redeem(
                    &mut state.ledger,
                    &mut state.rewards,
                    &mut state.redemptions,
                    &user,
                    req,
                    now,
                )
            };
            match result {
                Ok(confirmed) => return Ok(confirmed),
                Err(RedemptionError::Conflict { key }) if attempt < self.config.conflict_max_retries => {
                    attempt += 1;
                    let backoff = self.backoff(attempt);
                    debug!(%key, attempt, ?backoff, "redemption conflict, backing off");
                    thread::sleep(backoff);
                }
                Err(err) => {
                    self.record_failed_attempt(req, &err, now);
                    return Err(err.into());
                }
            }
        }
    }

    /// Exponential backoff with jitter for attempt `n` (1-based).
    fn backoff(&self, attempt: u32) -> Duration {
        let base = self
            .config
            .conflict_backoff_base_ms
            .saturating_mul(1u64 << (attempt - 1).min(16));
        let jitter = if self.config.conflict_backoff_jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..self.config.conflict_backoff_jitter_ms)
        };
        Duration::from_millis(base.saturating_add(jitter))
    }

    /// Record a failed redemption attempt for audit. Only failures with a
    /// known reward get a row; the row carries no ledger entry and no
    /// stock effect, and its key stays reusable for a retry.
    fn record_failed_attempt(
        &self,
        req: &RedeemRequest,
        err: &RedemptionError,
        now: DateTime<Utc>,
    ) {
        if !matches!(
            err,
            RedemptionError::InsufficientBalance { .. } | RedemptionError::OutOfStock(_)
        ) {
            return;
        }
        let mut guard = self.state.write();
        let state = &mut *guard;
        if state.redemptions.find_by_key(&req.idempotency_key).is_some() {
            return; // an earlier attempt already holds the key
        }
        let points = state
            .rewards
            .get(req.reward_id)
            .map(|r| r.points_required)
            .unwrap_or(0);
        let row = state.redemptions.insert_pending(
            req.user_id,
            req.reward_id,
            points,
            req.idempotency_key.clone(),
            now,
        );
        if let Err(audit_err) = state.redemptions.mark_failed(row.id) {
            warn!(%audit_err, "could not record failed redemption");
        }
    }

    // ------------------------------------------------------------------
    // Ranking
    // ------------------------------------------------------------------

    /// Compute and store a leaderboard snapshot with the engine's default
    /// ranking configuration.
    pub fn compute_ranking(
        &self,
        company: CompanyId,
        period: Period,
        now: DateTime<Utc>,
    ) -> SnapshotRecord {
        let config = self.config.ranking.clone();
        self.compute_ranking_with(company, period, &config, now)
    }

    /// Compute and store a leaderboard snapshot with an explicit
    /// configuration (mode, policy, department filter, limit).
    pub fn compute_ranking_with(
        &self,
        company: CompanyId,
        period: Period,
        config: &RankingConfig,
        now: DateTime<Utc>,
    ) -> SnapshotRecord {
        let mut guard = self.state.write();
        let state = &mut *guard;
        let snapshot =
            ranking::compute_snapshot(&state.ledger, &state.users, company, period, config, now);
        let record = state.snapshots.put(snapshot);
        info!(
            company = %company,
            period = %period,
            revision = record.revision,
            rows = record.snapshot.rows.len(),
            "ranking snapshot stored"
        );
        record
    }

    /// The latest stored snapshot for a company/period, if any.
    pub fn latest_ranking(&self, company: CompanyId, period: &Period) -> Option<SnapshotRecord> {
        self.state.read().snapshots.latest(company, period)
    }

    /// All stored revisions for a company/period, oldest first.
    pub fn ranking_revisions(&self, company: CompanyId, period: &Period) -> Vec<SnapshotRecord> {
        self.state.read().snapshots.revisions(company, period)
    }
}
