//! Domain types for the Verdant points engine.
//!
//! Ledger amounts are signed whole points (`i64`; positive = award,
//! negative = debit). CO₂ quantities are unsigned grams and rule
//! coefficients unsigned milli-points, so award math never produces a
//! negative amount. All timestamps are UTC.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::period::Period;

/// Identifier of a user account. Assigned by the surrounding system.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub u64);

/// Identifier of a company (tenant scope for rules, rewards, rankings).
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompanyId(pub u64);

/// Identifier of a point rule row.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(pub u64);

/// Identifier of a reward.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RewardId(pub u64);

/// Identifier of a redemption.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RedemptionId(pub u64);

/// Identifier of a ledger entry.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LedgerEntryId(pub u64);

macro_rules! display_as_inner {
    ($($t:ty),*) => {$(
        impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    )*};
}

display_as_inner!(UserId, CompanyId, RuleId, RewardId, RedemptionId, LedgerEntryId);

/// Caller-supplied token that makes a repeated request a no-op.
///
/// Keys are opaque strings. [`IdempotencyKey::derive`] builds a stable key
/// from source-event coordinates (BLAKE3 over an explicit byte layout), so
/// retried ingestion runs of the same measurement produce the same key.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Wrap an externally supplied key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Derive a stable key from source-event coordinates.
    ///
    /// Layout: `source || 0x00 || stamp_millis (LE) || 0x00 || kind`,
    /// hashed with BLAKE3 and hex-encoded. The same coordinates always
    /// yield the same key.
    pub fn derive(source: &str, stamp_millis: i64, kind: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(source.as_bytes());
        hasher.update(&[0]);
        hasher.update(&stamp_millis.to_le_bytes());
        hasher.update(&[0]);
        hasher.update(kind.as_bytes());
        Self(hex::encode(hasher.finalize().as_bytes()))
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of a point rule, matched against the event kind during evaluation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    /// Points proportional to measured CO₂ reduction.
    PerKg,
    /// Flat bonus paid when upstream reports a leaderboard placement.
    RankBonus,
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleKind::PerKg => f.write_str("per_kg"),
            RuleKind::RankBonus => f.write_str("rank_bonus"),
        }
    }
}

/// A versioned point-award rule.
///
/// Rule rows are immutable once created except for the `active` flag:
/// changing a coefficient means retiring the old row and inserting a new
/// one, so historical awards stay reproducible.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PointRule {
    pub id: RuleId,
    pub name: String,
    pub kind: RuleKind,
    /// Coefficient in milli-points. For `per_kg`: milli-points per kg.
    /// For `rank_bonus`: the flat bonus in milli-points.
    pub coefficient_millipoints: u64,
    /// `None` applies to every company.
    pub company_id: Option<CompanyId>,
    pub active: bool,
    /// Inclusive start of the effective range. `None` = no lower bound.
    pub effective_from: Option<DateTime<Utc>>,
    /// Exclusive end of the effective range. `None` = no upper bound.
    pub effective_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PointRule {
    /// Whether the rule's effective range covers the given instant.
    pub fn is_effective_at(&self, at: DateTime<Utc>) -> bool {
        if let Some(from) = self.effective_from {
            if at < from {
                return false;
            }
        }
        if let Some(until) = self.effective_until {
            if at >= until {
                return false;
            }
        }
        true
    }

    /// Whether the rule's company scope covers the given company.
    pub fn applies_to_company(&self, company: CompanyId) -> bool {
        match self.company_id {
            None => true,
            Some(scope) => scope == company,
        }
    }
}

/// Input for creating a new rule row.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct NewPointRule {
    pub name: String,
    pub kind: RuleKind,
    pub coefficient_millipoints: u64,
    pub company_id: Option<CompanyId>,
    pub effective_from: Option<DateTime<Utc>>,
    pub effective_until: Option<DateTime<Utc>>,
}

/// Energy category of a measured reduction. Informational; rule matching
/// is by [`RuleKind`].
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EnergyType {
    Electricity,
    Gas,
    Water,
    Other,
}

/// What a reduction event reports.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Measured CO₂-equivalent reduction, already computed upstream.
    Reduction { co2_grams: u64, energy_type: EnergyType },
    /// Leaderboard placement reported by the ranking pipeline.
    RankAchieved { rank: u32 },
}

impl EventKind {
    /// The rule kind this event is matched against.
    pub fn rule_kind(&self) -> RuleKind {
        match self {
            EventKind::Reduction { .. } => RuleKind::PerKg,
            EventKind::RankAchieved { .. } => RuleKind::RankBonus,
        }
    }
}

/// A qualifying event produced by the ingestion pipeline.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ReductionEvent {
    pub user_id: UserId,
    pub company_id: CompanyId,
    pub kind: EventKind,
    /// When the reduction occurred (not when it was ingested). Rules are
    /// selected against this instant.
    pub occurred_at: DateTime<Utc>,
    pub idempotency_key: IdempotencyKey,
}

/// Result of evaluating the rule set against an event.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct PointAward {
    /// Points to credit. Never negative by construction.
    pub amount: u64,
    /// The rule that produced the award.
    pub rule_id: RuleId,
}

/// Why a ledger entry exists.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    /// Award produced by a point rule.
    RuleAward { rule_id: RuleId },
    /// Debit for a reward redemption.
    Redemption { redemption_id: RedemptionId },
    /// Offsetting correction of an earlier entry.
    Correction { offsets: LedgerEntryId },
    /// Operator adjustment with a free-text note.
    Manual { note: String },
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::RuleAward { rule_id } => write!(f, "rule:{rule_id}"),
            Reason::Redemption { redemption_id } => write!(f, "redemption:{redemption_id}"),
            Reason::Correction { offsets } => write!(f, "correction:{offsets}"),
            Reason::Manual { note } => write!(f, "manual:{note}"),
        }
    }
}

/// An immutable point movement. Entries are never updated or deleted;
/// corrections are issued as new offsetting entries.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    pub user_id: UserId,
    pub company_id: CompanyId,
    /// Signed points: positive = award, negative = debit.
    pub amount: i64,
    pub reason: Reason,
    pub idempotency_key: IdempotencyKey,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Payload identity used by the idempotency check: everything the
    /// caller controls, excluding store-assigned id and timestamp.
    pub fn same_payload(&self, new: &NewLedgerEntry) -> bool {
        self.user_id == new.user_id
            && self.company_id == new.company_id
            && self.amount == new.amount
            && self.reason == new.reason
    }
}

/// Input for appending a ledger entry.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct NewLedgerEntry {
    pub user_id: UserId,
    pub company_id: CompanyId,
    pub amount: i64,
    pub reason: Reason,
    pub idempotency_key: IdempotencyKey,
}

/// Aggregate view of one user's point history.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct PointsSummary {
    pub current_balance: u64,
    /// Sum of all positive amounts.
    pub total_earned: u64,
    /// Sum of the absolute values of all negative amounts.
    pub total_spent: u64,
    /// Positive amounts credited in the calendar month containing `now`.
    pub this_month_earned: u64,
}

/// A redeemable reward with bounded stock.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Reward {
    pub id: RewardId,
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    /// `None` = offered to every company.
    pub company_id: Option<CompanyId>,
    pub points_required: u64,
    /// Remaining units. `None` = unlimited.
    pub stock: Option<u32>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Reward {
    /// Whether the reward is offered to the given company.
    pub fn in_scope(&self, company: CompanyId) -> bool {
        match self.company_id {
            None => true,
            Some(scope) => scope == company,
        }
    }
}

/// Input for creating a reward.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct NewReward {
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub company_id: Option<CompanyId>,
    pub points_required: u64,
    pub stock: Option<u32>,
}

/// Filters for catalog listings.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RewardFilter {
    /// Exact category match.
    pub category: Option<String>,
    /// Case-insensitive substring match on title or description.
    pub query: Option<String>,
    pub offset: usize,
    pub limit: usize,
}

impl Default for RewardFilter {
    fn default() -> Self {
        Self {
            category: None,
            query: None,
            offset: 0,
            limit: crate::constants::DEFAULT_PAGE_SIZE,
        }
    }
}

/// Lifecycle of a redemption.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RedemptionStatus {
    Pending,
    Confirmed,
    Failed,
}

impl fmt::Display for RedemptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RedemptionStatus::Pending => f.write_str("pending"),
            RedemptionStatus::Confirmed => f.write_str("confirmed"),
            RedemptionStatus::Failed => f.write_str("failed"),
        }
    }
}

/// A reward redemption attempt and its outcome.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Redemption {
    pub id: RedemptionId,
    pub user_id: UserId,
    pub reward_id: RewardId,
    pub points_spent: u64,
    pub status: RedemptionStatus,
    pub idempotency_key: IdempotencyKey,
    /// Set when confirmed: the correlated debit entry.
    pub ledger_entry_id: Option<LedgerEntryId>,
    pub created_at: DateTime<Utc>,
}

/// A redemption request from the API layer.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RedeemRequest {
    pub user_id: UserId,
    pub reward_id: RewardId,
    pub idempotency_key: IdempotencyKey,
}

/// One row of a leaderboard.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct RankingRow {
    pub user_id: UserId,
    /// Signed period total (debits within the period count against it).
    pub total_points: i64,
    /// 1-based rank.
    pub rank: u32,
}

/// An immutable, dated leaderboard for one company and period.
///
/// Recomputation for the same period produces a new snapshot that
/// supersedes the old one; snapshots are never edited in place.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RankingSnapshot {
    pub company_id: CompanyId,
    pub period: Period,
    pub rows: Vec<RankingRow>,
    pub computed_at: DateTime<Utc>,
}

/// A stored snapshot with its supersession revision (assigned by the
/// snapshot store, monotonically increasing per company/period).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SnapshotRecord {
    pub revision: u64,
    pub snapshot: RankingSnapshot,
}

/// What the engine knows about a user. Authentication and profile data
/// live in the surrounding system; this is the ranking/scoping subset.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UserProfile {
    pub id: UserId,
    pub company_id: CompanyId,
    pub display_name: String,
    pub department: Option<String>,
    /// Account creation time; the ranking tie-break.
    pub created_at: DateTime<Utc>,
}

/// Input for registering a user with the engine.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct NewUser {
    /// Assigned by the surrounding system, not by the engine.
    pub id: UserId,
    pub company_id: CompanyId,
    pub display_name: String,
    pub department: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a successful ledger reconciliation pass.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct ReconcileReport {
    pub users_checked: usize,
    pub entries_scanned: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn sample_rule() -> PointRule {
        PointRule {
            id: RuleId(1),
            name: "baseline".into(),
            kind: RuleKind::PerKg,
            coefficient_millipoints: 10_000,
            company_id: None,
            active: true,
            effective_from: Some(at(1_000)),
            effective_until: Some(at(2_000)),
            created_at: at(500),
        }
    }

    // --- IdempotencyKey ---

    #[test]
    fn derived_key_is_stable() {
        let a = IdempotencyKey::derive("meter-7", 1_700_000_000_000, "electricity");
        let b = IdempotencyKey::derive("meter-7", 1_700_000_000_000, "electricity");
        assert_eq!(a, b);
    }

    #[test]
    fn derived_key_changes_with_coordinates() {
        let a = IdempotencyKey::derive("meter-7", 1_700_000_000_000, "electricity");
        let b = IdempotencyKey::derive("meter-7", 1_700_000_000_001, "electricity");
        let c = IdempotencyKey::derive("meter-8", 1_700_000_000_000, "electricity");
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn derived_key_is_hex() {
        let key = IdempotencyKey::derive("meter-7", 0, "gas");
        assert_eq!(key.as_str().len(), 64);
        assert!(key.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn separator_prevents_boundary_collisions() {
        // "ab" + "c" must not collide with "a" + "bc".
        let a = IdempotencyKey::derive("ab", 0, "c");
        let b = IdempotencyKey::derive("a", 0, "bc");
        assert_ne!(a, b);
    }

    // --- PointRule ---

    #[test]
    fn rule_effective_range_is_half_open() {
        let rule = sample_rule();
        assert!(!rule.is_effective_at(at(999)));
        assert!(rule.is_effective_at(at(1_000)));
        assert!(rule.is_effective_at(at(1_999)));
        assert!(!rule.is_effective_at(at(2_000)));
    }

    #[test]
    fn rule_unbounded_range_is_always_effective() {
        let rule = PointRule {
            effective_from: None,
            effective_until: None,
            ..sample_rule()
        };
        assert!(rule.is_effective_at(at(0)));
        assert!(rule.is_effective_at(at(i32::MAX as i64)));
    }

    #[test]
    fn global_rule_applies_to_any_company() {
        let rule = sample_rule();
        assert!(rule.applies_to_company(CompanyId(1)));
        assert!(rule.applies_to_company(CompanyId(99)));
    }

    #[test]
    fn scoped_rule_applies_to_its_company_only() {
        let rule = PointRule {
            company_id: Some(CompanyId(2)),
            ..sample_rule()
        };
        assert!(rule.applies_to_company(CompanyId(2)));
        assert!(!rule.applies_to_company(CompanyId(3)));
    }

    // --- EventKind ---

    #[test]
    fn event_kind_maps_to_rule_kind() {
        let reduction = EventKind::Reduction { co2_grams: 1_000, energy_type: EnergyType::Gas };
        assert_eq!(reduction.rule_kind(), RuleKind::PerKg);
        let rank = EventKind::RankAchieved { rank: 1 };
        assert_eq!(rank.rule_kind(), RuleKind::RankBonus);
    }

    // --- Reason / display ---

    #[test]
    fn reason_display_codes() {
        assert_eq!(Reason::RuleAward { rule_id: RuleId(3) }.to_string(), "rule:3");
        assert_eq!(
            Reason::Redemption { redemption_id: RedemptionId(8) }.to_string(),
            "redemption:8",
        );
        assert_eq!(
            Reason::Correction { offsets: LedgerEntryId(12) }.to_string(),
            "correction:12",
        );
    }

    #[test]
    fn status_display() {
        assert_eq!(RedemptionStatus::Pending.to_string(), "pending");
        assert_eq!(RedemptionStatus::Confirmed.to_string(), "confirmed");
        assert_eq!(RedemptionStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn rule_kind_display_matches_serde() {
        assert_eq!(RuleKind::PerKg.to_string(), "per_kg");
        assert_eq!(serde_json::to_string(&RuleKind::PerKg).unwrap(), "\"per_kg\"");
    }

    // --- LedgerEntry payload identity ---

    #[test]
    fn same_payload_ignores_assigned_fields() {
        let new = NewLedgerEntry {
            user_id: UserId(1),
            company_id: CompanyId(1),
            amount: 25,
            reason: Reason::RuleAward { rule_id: RuleId(1) },
            idempotency_key: IdempotencyKey::new("k"),
        };
        let entry = LedgerEntry {
            id: LedgerEntryId(42),
            user_id: UserId(1),
            company_id: CompanyId(1),
            amount: 25,
            reason: Reason::RuleAward { rule_id: RuleId(1) },
            idempotency_key: IdempotencyKey::new("k"),
            created_at: at(1),
        };
        assert!(entry.same_payload(&new));
        let different = NewLedgerEntry { amount: 26, ..new };
        assert!(!entry.same_payload(&different));
    }

    // --- Reward scope ---

    #[test]
    fn reward_scope() {
        let reward = Reward {
            id: RewardId(1),
            title: "mug".into(),
            description: None,
            category: "goods".into(),
            company_id: Some(CompanyId(5)),
            points_required: 100,
            stock: Some(3),
            active: true,
            created_at: at(0),
        };
        assert!(reward.in_scope(CompanyId(5)));
        assert!(!reward.in_scope(CompanyId(6)));
    }

    #[test]
    fn reward_filter_default_uses_page_size() {
        let filter = RewardFilter::default();
        assert_eq!(filter.limit, crate::constants::DEFAULT_PAGE_SIZE);
        assert_eq!(filter.offset, 0);
        assert!(filter.category.is_none());
    }

    // --- Serde round trips ---

    #[test]
    fn snapshot_serde_round_trip() {
        let snapshot = RankingSnapshot {
            company_id: CompanyId(1),
            period: Period::Monthly { year: 2026, month: 8 },
            rows: vec![RankingRow { user_id: UserId(2), total_points: 120, rank: 1 }],
            computed_at: at(77),
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: RankingSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snapshot, back);
    }

    #[test]
    fn event_serde_round_trip() {
        let event = ReductionEvent {
            user_id: UserId(1),
            company_id: CompanyId(2),
            kind: EventKind::Reduction { co2_grams: 2_500, energy_type: EnergyType::Electricity },
            occurred_at: at(10),
            idempotency_key: IdempotencyKey::derive("meter-1", 10_000, "electricity"),
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: ReductionEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
    }
}
