//! Scenario files: a JSON description of users, rules, rewards, events,
//! and redemption requests that `verdant-cli run` replays against a fresh
//! engine. Field shapes are the engine's own serde representations.

use serde::Deserialize;

use verdant_core::types::{NewPointRule, NewReward, NewUser, RedeemRequest, ReductionEvent};

/// A replayable scenario.
#[derive(Deserialize, Debug, Default)]
pub struct Scenario {
    #[serde(default)]
    pub users: Vec<NewUser>,
    #[serde(default)]
    pub rules: Vec<NewPointRule>,
    #[serde(default)]
    pub rewards: Vec<NewReward>,
    #[serde(default)]
    pub events: Vec<ReductionEvent>,
    #[serde(default)]
    pub redemptions: Vec<RedeemRequest>,
    /// Ranking period key (`YYYY-MM`, `YYYY-Qn`, `YYYY`, `all`). Defaults
    /// to the month of the first event, or the current month.
    #[serde(default)]
    pub period: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_scenario_parses() {
        let scenario: Scenario = serde_json::from_str("{}").unwrap();
        assert!(scenario.users.is_empty());
        assert!(scenario.period.is_none());
    }

    #[test]
    fn full_scenario_parses() {
        let json = r#"{
            "users": [
                {"id": 1, "company_id": 1, "display_name": "Akira Sato",
                 "department": "facilities", "created_at": "2026-01-05T09:00:00Z"}
            ],
            "rules": [
                {"name": "co2-baseline", "kind": "per_kg",
                 "coefficient_millipoints": 10000, "company_id": null,
                 "effective_from": null, "effective_until": null}
            ],
            "rewards": [
                {"title": "Eco mug", "description": null, "category": "goods",
                 "company_id": null, "points_required": 400, "stock": 10}
            ],
            "events": [
                {"user_id": 1, "company_id": 1,
                 "kind": {"reduction": {"co2_grams": 2500, "energy_type": "electricity"}},
                 "occurred_at": "2026-08-10T00:00:00Z",
                 "idempotency_key": "meter-1:2026-08-10"}
            ],
            "redemptions": [
                {"user_id": 1, "reward_id": 1, "idempotency_key": "req-1"}
            ],
            "period": "2026-08"
        }"#;
        let scenario: Scenario = serde_json::from_str(json).unwrap();
        assert_eq!(scenario.users.len(), 1);
        assert_eq!(scenario.rules.len(), 1);
        assert_eq!(scenario.events.len(), 1);
        assert_eq!(scenario.period.as_deref(), Some("2026-08"));
    }
}
