//! Point rule evaluation.
//!
//! [`evaluate`] is a pure function from a rule set and a reduction event to
//! an optional award: no I/O, fully table-testable. Selection picks the
//! single applicable rule; when several rules of the same kind are active
//! for the same company and date, the most recently created row wins
//! (explicit priority, not arrival order), with equal timestamps broken by
//! the higher rule id.
//!
//! Award math is integer fixed-point. `per_kg` awards are
//! `grams × millipoints / 1_000_000`, rounded half-up; `rank_bonus` awards
//! are the coefficient rounded from milli-points to points. Amounts are
//! computed in `u64`, so an award can never be negative.

use chrono::{DateTime, Utc};

use crate::constants::{MILLIPOINTS_PER_POINT, PER_KG_DIVISOR};
use crate::error::RuleError;
use crate::traits::RuleStore;
use crate::types::{
    EventKind, NewPointRule, PointAward, PointRule, ReductionEvent, RuleId,
};

/// Integer division rounding half-up on the non-negative domain.
///
/// Widens through `u128`; a quotient exceeding `u64::MAX` saturates.
pub fn round_half_up(numerator: u128, denominator: u128) -> u64 {
    debug_assert!(denominator > 0);
    let quotient = (numerator + denominator / 2) / denominator;
    quotient.min(u64::MAX as u128) as u64
}

/// The points a rule pays for an event, before zero filtering.
fn award_amount(rule: &PointRule, event: &ReductionEvent) -> u64 {
    match event.kind {
        EventKind::Reduction { co2_grams, .. } => round_half_up(
            co2_grams as u128 * rule.coefficient_millipoints as u128,
            PER_KG_DIVISOR as u128,
        ),
        EventKind::RankAchieved { .. } => round_half_up(
            rule.coefficient_millipoints as u128,
            MILLIPOINTS_PER_POINT as u128,
        ),
    }
}

/// Whether a rule is a candidate for the event.
fn is_candidate(rule: &PointRule, event: &ReductionEvent) -> bool {
    rule.active
        && rule.kind == event.kind.rule_kind()
        && rule.applies_to_company(event.company_id)
        && rule.is_effective_at(event.occurred_at)
}

/// Evaluate the rule set against an event.
///
/// Returns `None` when no active rule applies or when the selected rule
/// pays zero points (negligible reductions produce no ledger noise).
pub fn evaluate(rules: &[PointRule], event: &ReductionEvent) -> Option<PointAward> {
    let winner = rules
        .iter()
        .filter(|rule| is_candidate(rule, event))
        .max_by_key(|rule| (rule.created_at, rule.id))?;

    let amount = award_amount(winner, event);
    if amount == 0 {
        return None;
    }
    Some(PointAward { amount, rule_id: winner.id })
}

/// In-memory rule store.
///
/// Rows are kept forever (retired rules stay visible) so historical awards
/// remain explainable. Not thread-safe — the engine wraps it in its lock.
#[derive(Debug, Default)]
pub struct MemoryRuleStore {
    rules: Vec<PointRule>,
    next_id: u64,
}

impl MemoryRuleStore {
    /// Create an empty rule store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl RuleStore for MemoryRuleStore {
    fn insert(&mut self, new: NewPointRule, now: DateTime<Utc>) -> Result<PointRule, RuleError> {
        if new.coefficient_millipoints == 0 {
            return Err(RuleError::ZeroCoefficient { name: new.name });
        }
        if let (Some(from), Some(until)) = (new.effective_from, new.effective_until) {
            if from >= until {
                return Err(RuleError::EmptyEffectiveRange {
                    from: from.to_rfc3339(),
                    until: until.to_rfc3339(),
                });
            }
        }
        self.next_id += 1;
        let rule = PointRule {
            id: RuleId(self.next_id),
            name: new.name,
            kind: new.kind,
            coefficient_millipoints: new.coefficient_millipoints,
            company_id: new.company_id,
            active: true,
            effective_from: new.effective_from,
            effective_until: new.effective_until,
            created_at: now,
        };
        self.rules.push(rule.clone());
        Ok(rule)
    }

    fn get(&self, id: RuleId) -> Option<PointRule> {
        self.rules.iter().find(|r| r.id == id).cloned()
    }

    fn retire(&mut self, id: RuleId) -> Result<PointRule, RuleError> {
        let rule = self
            .rules
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(RuleError::NotFound(id))?;
        if !rule.active {
            return Err(RuleError::AlreadyRetired(id));
        }
        rule.active = false;
        Ok(rule.clone())
    }

    fn rules(&self) -> Vec<PointRule> {
        self.rules.clone()
    }
}
