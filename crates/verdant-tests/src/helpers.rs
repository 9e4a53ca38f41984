//! Shared test helpers for the scenario, concurrency, and property suites.

use chrono::{DateTime, TimeZone, Utc};

use verdant_core::types::{
    CompanyId, EnergyType, EventKind, IdempotencyKey, NewPointRule, NewReward, NewUser,
    RedeemRequest, ReductionEvent, RewardId, RuleKind, UserId,
};
use verdant_engine::Engine;

/// UTC instant from epoch seconds.
pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

/// UTC instant from an RFC 3339 string.
pub fn ts(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

/// A user of the given company, with a creation instant for tie-breaks.
pub fn new_user(id: u64, company: u64, created: i64) -> NewUser {
    NewUser {
        id: UserId(id),
        company_id: CompanyId(company),
        display_name: format!("user-{id}"),
        department: None,
        created_at: at(created),
    }
}

/// A global `per_kg` rule with the given milli-point coefficient.
pub fn per_kg_rule(millipoints: u64) -> NewPointRule {
    NewPointRule {
        name: "co2-baseline".into(),
        kind: RuleKind::PerKg,
        coefficient_millipoints: millipoints,
        company_id: None,
        effective_from: None,
        effective_until: None,
    }
}

/// A global reward.
pub fn reward(title: &str, points_required: u64, stock: Option<u32>) -> NewReward {
    NewReward {
        title: title.into(),
        description: None,
        category: "goods".into(),
        company_id: None,
        points_required,
        stock,
    }
}

/// A CO₂ reduction event for company 1.
pub fn reduction(user: u64, co2_grams: u64, key: &str) -> ReductionEvent {
    ReductionEvent {
        user_id: UserId(user),
        company_id: CompanyId(1),
        kind: EventKind::Reduction { co2_grams, energy_type: EnergyType::Electricity },
        occurred_at: ts("2026-08-10T00:00:00Z"),
        idempotency_key: IdempotencyKey::new(key),
    }
}

/// A redemption request.
pub fn redeem_request(user: u64, reward: RewardId, key: &str) -> RedeemRequest {
    RedeemRequest {
        user_id: UserId(user),
        reward_id: reward,
        idempotency_key: IdempotencyKey::new(key),
    }
}

/// An engine with company-1 users 1..=count registered (creation instants
/// ascend with the id) and a 10 points/kg rule defined.
pub fn seeded_engine(user_count: u64) -> Engine {
    let engine = Engine::default();
    for id in 1..=user_count {
        engine.register_user(new_user(id, 1, id as i64 * 100)).unwrap();
    }
    engine.define_rule(per_kg_rule(10_000), at(1)).unwrap();
    engine
}

/// Credit a user through the award path: `points` points via the
/// 10 points/kg rule (1 point = 100 g).
pub fn credit_points(engine: &Engine, user: u64, points: u64, key: &str) {
    let event = reduction(user, points * 100, key);
    engine
        .award_event(&event, event.occurred_at)
        .expect("award failed")
        .expect("no rule matched");
}
