//! Leaderboard computation.
//!
//! [`compute_snapshot`] is pure given the ledger and directory contents:
//! the same inputs and the same `now` produce a bit-identical snapshot, so
//! recomputations are replayable. Ordering is total — score descending,
//! then earliest account creation, then lowest user id — which keeps
//! rankings from flapping between identical recomputations even when
//! totals tie.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use verdant_core::constants::{DEFAULT_RANKING_LIMIT, MAX_PAGE_SIZE};
use verdant_core::period::Period;
use verdant_core::traits::{LedgerStore, UserDirectory};
use verdant_core::types::{CompanyId, RankingRow, RankingSnapshot, UserId};

/// Which entries count toward a period's totals.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RankingMode {
    /// Only entries created inside the period window.
    #[default]
    Periodic,
    /// Every entry created at or before the period's end (running totals).
    Cumulative,
}

/// How ranks are assigned to ordered rows.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RankPolicy {
    /// Every row gets a distinct rank; ties are already broken by the
    /// ordering, so ranks are 1..=n.
    #[default]
    Strict,
    /// Standard competition ranking: equal totals share a rank and the
    /// next distinct total skips past them (1, 2, 2, 4).
    Competition,
}

/// Knobs for one leaderboard computation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RankingConfig {
    pub mode: RankingMode,
    pub policy: RankPolicy,
    /// Restrict to users of one department, as recorded in the directory.
    pub department: Option<String>,
    /// Maximum number of rows in the snapshot.
    pub limit: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            mode: RankingMode::default(),
            policy: RankPolicy::default(),
            department: None,
            limit: DEFAULT_RANKING_LIMIT,
        }
    }
}

fn in_window(at: DateTime<Utc>, period: &Period, mode: RankingMode) -> bool {
    match mode {
        RankingMode::Periodic => period.contains(at),
        RankingMode::Cumulative => match period.bounds().1 {
            Some(end) => at < end,
            None => true,
        },
    }
}

/// Compute a leaderboard snapshot for one company and period.
///
/// Users appear only if they have at least one ledger entry in the window;
/// debits inside the window count against the total. Users the directory
/// does not know (or that the department filter excludes) are skipped.
pub fn compute_snapshot(
    ledger: &dyn LedgerStore,
    users: &dyn UserDirectory,
    company: CompanyId,
    period: Period,
    config: &RankingConfig,
    now: DateTime<Utc>,
) -> RankingSnapshot {
    let mut totals: HashMap<UserId, i64> = HashMap::new();
    for entry in ledger.entries_for_company(company) {
        if in_window(entry.created_at, &period, config.mode) {
            let total = totals.entry(entry.user_id).or_insert(0);
            *total = total.saturating_add(entry.amount);
        }
    }

    // Candidates in directory order (created_at, then id) so the sort
    // below is stable-deterministic regardless of map iteration order.
    let mut candidates: Vec<(i64, DateTime<Utc>, UserId)> = users
        .users_of_company(company)
        .into_iter()
        .filter(|profile| match &config.department {
            Some(department) => profile.department.as_deref() == Some(department.as_str()),
            None => true,
        })
        .filter_map(|profile| {
            totals
                .get(&profile.id)
                .map(|total| (*total, profile.created_at, profile.id))
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.0.cmp(&a.0) // total, descending
            .then(a.1.cmp(&b.1)) // account creation, ascending
            .then(a.2.cmp(&b.2)) // user id, ascending
    });
    candidates.truncate(config.limit.min(MAX_PAGE_SIZE));

    let mut rows = Vec::with_capacity(candidates.len());
    let mut previous: Option<(i64, u32)> = None;
    for (index, (total, _, user)) in candidates.into_iter().enumerate() {
        let position = index as u32 + 1;
        let rank = match config.policy {
            RankPolicy::Strict => position,
            RankPolicy::Competition => match previous {
                Some((prior_total, prior_rank)) if prior_total == total => prior_rank,
                _ => position,
            },
        };
        previous = Some((total, rank));
        rows.push(RankingRow { user_id: user, total_points: total, rank });
    }

    debug!(company = %company, period = %period, rows = rows.len(), "snapshot computed");
    RankingSnapshot { company_id: company, period, rows, computed_at: now }
}
