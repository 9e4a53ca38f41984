//! verdant-cli — drive the Verdant points engine from the command line.
//!
//! `demo` seeds a small in-memory data set and walks it through awards, a
//! redemption, and a leaderboard. `run` replays a JSON scenario file (see
//! [`scenario`]) and prints balances and the ranking, which is how the
//! operational seeding flows exercise the engine end to end.

mod scenario;

use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use verdant_core::period::Period;
use verdant_core::types::{
    CompanyId, EnergyType, EventKind, IdempotencyKey, NewPointRule, NewReward, NewUser,
    RedeemRequest, ReductionEvent, RuleKind, UserId,
};
use verdant_engine::{Engine, EngineConfig};

use crate::scenario::Scenario;

/// Verdant points engine command-line driver.
#[derive(Parser)]
#[command(name = "verdant-cli")]
#[command(version, about = "Points ledger, rewards, and rankings for energy savers.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Seed a demo data set and walk it through the engine.
    Demo,
    /// Replay a JSON scenario file against a fresh engine.
    Run(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Path to the scenario JSON file.
    scenario: PathBuf,
    /// Ranking period to print (YYYY-MM, YYYY-Qn, YYYY, or "all");
    /// overrides the scenario's own period.
    #[arg(long)]
    period: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Demo => demo(),
        Commands::Run(args) => run(args),
    }
}

/// Replay a scenario file: users, rules, rewards, events, redemptions,
/// then print every user's balance and the period leaderboard.
fn run(args: RunArgs) -> Result<()> {
    let raw = fs::read_to_string(&args.scenario)
        .with_context(|| format!("reading scenario {}", args.scenario.display()))?;
    let scenario: Scenario = serde_json::from_str(&raw)
        .with_context(|| format!("parsing scenario {}", args.scenario.display()))?;

    let period = match args.period.or(scenario.period.clone()) {
        Some(key) => Period::from_str(&key).with_context(|| format!("period {key:?}"))?,
        None => scenario
            .events
            .first()
            .map(|event| Period::month_of(event.occurred_at))
            .unwrap_or_else(|| Period::month_of(Utc::now())),
    };

    let engine = Engine::new(EngineConfig::default());
    let now = Utc::now();

    let company = scenario
        .users
        .first()
        .map(|user| user.company_id)
        .unwrap_or(CompanyId(1));
    for user in scenario.users {
        engine.register_user(user)?;
    }
    for rule in scenario.rules {
        engine.define_rule(rule, now)?;
    }
    for reward in scenario.rewards {
        engine.add_reward(reward, now);
    }

    let mut awarded = 0u64;
    for event in &scenario.events {
        if let Some(entry) = engine.award_event(event, event.occurred_at)? {
            awarded += entry.amount.unsigned_abs();
        }
    }
    println!("{} events replayed, {awarded} points awarded", scenario.events.len());

    for request in &scenario.redemptions {
        match engine.redeem(request, now) {
            Ok(redemption) => println!(
                "user {} redeemed reward {} for {} points",
                redemption.user_id, redemption.reward_id, redemption.points_spent
            ),
            Err(err) => println!(
                "user {} could not redeem reward {}: {err}",
                request.user_id, request.reward_id
            ),
        }
    }

    report(&engine, company, period);
    Ok(())
}

/// Seed the demo data set (one company, three users, one rule, three
/// rewards, a month of reduction events) and walk it through the engine.
fn demo() -> Result<()> {
    let engine = Engine::new(EngineConfig::default());
    let company = CompanyId(1);

    for (id, name, created) in [
        (1u64, "Akira Sato", "2026-01-05T09:00:00Z"),
        (2, "Mina Tanaka", "2026-02-10T09:00:00Z"),
        (3, "Ren Suzuki", "2026-03-15T09:00:00Z"),
    ] {
        engine.register_user(NewUser {
            id: UserId(id),
            company_id: company,
            display_name: name.into(),
            department: Some("facilities".into()),
            created_at: created.parse()?,
        })?;
    }

    let now = Utc::now();
    engine.define_rule(
        NewPointRule {
            name: "co2-baseline".into(),
            kind: RuleKind::PerKg,
            coefficient_millipoints: 10_000, // 10 points per kg
            company_id: None,
            effective_from: None,
            effective_until: None,
        },
        now,
    )?;

    let mug = engine.add_reward(
        NewReward {
            title: "Eco mug".into(),
            description: Some("Double-walled, office branded".into()),
            category: "goods".into(),
            company_id: None,
            points_required: 400,
            stock: Some(10),
        },
        now,
    );
    engine.add_reward(
        NewReward {
            title: "Cafe voucher".into(),
            description: None,
            category: "voucher".into(),
            company_id: None,
            points_required: 800,
            stock: Some(5),
        },
        now,
    );
    engine.add_reward(
        NewReward {
            title: "Tree donation".into(),
            description: Some("One sapling planted in your name".into()),
            category: "donation".into(),
            company_id: None,
            points_required: 300,
            stock: None,
        },
        now,
    );

    // A month of measured reductions: (user, kg, day).
    for (user, kg, day) in [
        (1u64, 52u64, 3u32),
        (1, 18, 17),
        (2, 44, 5),
        (2, 31, 21),
        (3, 27, 12),
    ] {
        let occurred_at = format!("2026-08-{day:02}T00:00:00Z").parse()?;
        let event = ReductionEvent {
            user_id: UserId(user),
            company_id: company,
            kind: EventKind::Reduction {
                co2_grams: kg * 1_000,
                energy_type: EnergyType::Electricity,
            },
            occurred_at,
            idempotency_key: IdempotencyKey::derive(
                &format!("demo-meter-{user}"),
                occurred_at.timestamp_millis(),
                "electricity",
            ),
        };
        engine.award_event(&event, occurred_at)?;
    }

    let redemption = engine.redeem(
        &RedeemRequest {
            user_id: UserId(1),
            reward_id: mug.id,
            idempotency_key: IdempotencyKey::new("demo-redeem-1"),
        },
        now,
    )?;
    println!(
        "user 1 redeemed \"{}\" for {} points\n",
        mug.title, redemption.points_spent
    );

    report(&engine, company, Period::Monthly { year: 2026, month: 8 });
    engine.reconcile()?;
    Ok(())
}

/// Print balances and the period leaderboard.
fn report(engine: &Engine, company: CompanyId, period: Period) {
    let now = Utc::now();
    let record = engine.compute_ranking(company, period, now);

    println!("leaderboard {} (revision {})", period, record.revision);
    for row in &record.snapshot.rows {
        let name = engine
            .user(row.user_id)
            .map(|profile| profile.display_name)
            .unwrap_or_else(|| format!("user {}", row.user_id));
        let summary = engine.summary(row.user_id, now);
        println!(
            "  #{:<3} {:<20} {:>6} pts this period   {:>6} pts balance",
            row.rank, name, row.total_points, summary.current_balance
        );
    }

    let stats = engine.stats();
    println!(
        "\n{} users, {} ledger entries, {} redemptions, {} snapshots",
        stats.users, stats.ledger_entries, stats.redemptions, stats.snapshots
    );
}
