use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::SqlitePool;
use std::io::Write;
use std::path::Path;

use crate::config::Settings;
use crate::db::{
    clear_all_data, create_pool, get_game, get_odds_for_game, get_parlays, init_database_with_pool, seed_data,
};
use crate::models::{BestPrice, ParlayStatus, ParlayWithLegs};
use crate::services::news::refresh_news;
use crate::services::odds_fetcher::refresh_odds;
use crate::services::{select_best_odds, ParlaySweeper};
use crate::utils::{decimal_to_american, format_american, format_line, implied_probability, round_cents};

async fn open(settings: &Settings) -> Result<SqlitePool> {
    let pool = create_pool(&settings.database_url)
        .await
        .with_context(|| format!("could not open {}", settings.database_url))?;
    init_database_with_pool(&pool).await?;
    Ok(pool)
}

pub async fn seed(settings: &Settings, reset: bool) -> Result<()> {
    let pool = open(settings).await?;
    if reset {
        println!("🧹 Clearing existing data...");
        clear_all_data(&pool).await?;
    }
    println!("🌱 Seeding sample NHL data...");
    seed_data(&pool).await?;
    println!("✅ Seed complete");
    Ok(())
}

pub async fn sweep(settings: &Settings) -> Result<()> {
    let pool = open(settings).await?;
    let sweeper = ParlaySweeper::new(settings.reference_sportsbook.clone());

    println!("🧾 Settling pending parlays against {} lines...", sweeper.reference_book());
    let report = sweeper.sweep_with_report(&pool).await?;

    println!(
        "✅ {} examined | {} settled | {} waiting on games | {} still pending",
        report.examined, report.settled, report.skipped_unfinished, report.still_pending
    );
    for error in &report.errors {
        println!("   ⚠️  {}", error);
    }
    Ok(())
}

pub async fn best_odds(settings: &Settings, game_id: &str) -> Result<()> {
    let pool = open(settings).await?;

    let Some(game) = get_game(&pool, game_id).await? else {
        println!("❌ No game with id '{}'", game_id);
        return Ok(());
    };
    let quotes = get_odds_for_game(&pool, game_id, None).await?;
    if quotes.is_empty() {
        println!("📭 No odds stored for {} vs {}", game.home_team_name, game.away_team_name);
        return Ok(());
    }

    let best = select_best_odds(game_id, &quotes);
    println!(
        "🏒 {} vs {} ({}) - {} books\n",
        game.home_team_name,
        game.away_team_name,
        game.game_time.format("%Y-%m-%d %H:%M"),
        quotes.len()
    );

    let rows: [(&str, &Option<BestPrice>, bool); 6] = [
        ("Home moneyline", &best.home_moneyline, false),
        ("Away moneyline", &best.away_moneyline, false),
        ("Home spread", &best.home_spread, true),
        ("Away spread", &best.away_spread, true),
        ("Over", &best.over, false),
        ("Under", &best.under, false),
    ];
    for (label, price, signed) in rows {
        match price {
            Some(p) => {
                let line = if p.line.is_some() { format!(" {}", format_line(p.line, signed)) } else { String::new() };
                println!(
                    "   {:<15}{} {:>6}  @ {} ({:.1}% implied)",
                    label,
                    line,
                    format_american(p.price),
                    p.sportsbook,
                    implied_probability(p.price) * 100.0
                );
            }
            None => println!("   {:<15} -", label),
        }
    }
    Ok(())
}

pub async fn list_parlays(settings: &Settings, status: Option<&str>) -> Result<()> {
    let pool = open(settings).await?;
    let status = status.map(str::parse::<ParlayStatus>).transpose()?;

    let parlays = get_parlays(&pool, status, None).await?;
    if parlays.is_empty() {
        println!("📭 No parlays found");
        return Ok(());
    }

    println!("📋 {} parlays:\n", parlays.len());
    for (i, p) in parlays.iter().enumerate() {
        println!(
            "{}. {} [{}] stake {:.2} x{:.2} ({}) -> {:.2}",
            i + 1,
            p.parlay.name,
            p.parlay.status,
            p.parlay.stake,
            p.parlay.total_price,
            format_american(decimal_to_american(p.parlay.total_price)),
            round_cents(p.parlay.potential_payout)
        );
        for leg in &p.legs {
            let subject = leg.player_id.as_deref().unwrap_or(&leg.game_id);
            println!(
                "   • {} {} {} {} ({})",
                leg.bet_type,
                leg.selection,
                subject,
                format_american(leg.price),
                leg.status
            );
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct ExportRow<'a> {
    parlay_id: &'a str,
    parlay_name: &'a str,
    stake: f64,
    total_price: f64,
    potential_payout: f64,
    parlay_status: &'static str,
    leg_id: &'a str,
    game_id: &'a str,
    bet_type: &'static str,
    selection: &'static str,
    player_id: Option<&'a str>,
    prop_type: Option<&'static str>,
    price: f64,
    leg_status: &'static str,
    created_at: String,
}

/// One CSV row per leg. Returns the number of rows written.
fn write_parlays_csv<W: Write>(writer: W, parlays: &[ParlayWithLegs]) -> Result<usize> {
    let mut csv = csv::Writer::from_writer(writer);
    let mut rows = 0;
    for p in parlays {
        for leg in &p.legs {
            csv.serialize(ExportRow {
                parlay_id: &p.parlay.id,
                parlay_name: &p.parlay.name,
                stake: p.parlay.stake,
                total_price: p.parlay.total_price,
                potential_payout: round_cents(p.parlay.potential_payout),
                parlay_status: p.parlay.status.as_str(),
                leg_id: &leg.id,
                game_id: &leg.game_id,
                bet_type: leg.bet_type.as_str(),
                selection: leg.selection.as_str(),
                player_id: leg.player_id.as_deref(),
                prop_type: leg.prop_type.map(|t| t.as_str()),
                price: leg.price,
                leg_status: leg.status.as_str(),
                created_at: p.parlay.created_at.to_rfc3339(),
            })?;
            rows += 1;
        }
    }
    csv.flush()?;
    Ok(rows)
}

pub async fn export_parlays(settings: &Settings, out: &Path) -> Result<()> {
    let pool = open(settings).await?;
    let parlays = get_parlays(&pool, None, None).await?;

    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(out).with_context(|| format!("could not create {}", out.display()))?;
    let rows = write_parlays_csv(file, &parlays)?;

    println!("💾 Exported {} parlays ({} legs) to {}", parlays.len(), rows, out.display());
    Ok(())
}

pub async fn fetch_odds(settings: &Settings, force: bool) -> Result<()> {
    let pool = open(settings).await?;

    println!("📥 Fetching {} odds and scores...", settings.odds_api_sport);
    let summary = refresh_odds(&pool, settings, force).await?;
    if summary.skipped {
        println!(
            "⏭️  Skipped: last refresh is under {}h old (use --force to override)",
            settings.odds_refresh_hours
        );
    } else {
        println!(
            "✅ {} events | {} new games | {} quotes | {} games finished",
            summary.events, summary.games_created, summary.quotes_upserted, summary.games_finished
        );
    }
    Ok(())
}

pub async fn fetch_news(settings: &Settings) -> Result<()> {
    let pool = open(settings).await?;

    println!("📰 Fetching news for '{}'...", settings.news_query);
    let summary = refresh_news(&pool, settings).await?;
    println!(
        "✅ {} articles | {} stored | {} skipped",
        summary.fetched, summary.stored, summary.skipped
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Bet, BetCategory, BetStatus, Parlay, PropCategory, Selection};
    use chrono::Utc;

    fn sample() -> ParlayWithLegs {
        let now = Utc::now();
        let leg = |id: &str, bet_type, selection, player: Option<&str>, prop| Bet {
            id: id.into(),
            parlay_id: "p1".into(),
            game_id: "g1".into(),
            bet_type,
            selection,
            player_id: player.map(str::to_string),
            prop_type: prop,
            price: -110.0,
            justification: None,
            status: BetStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        ParlayWithLegs {
            parlay: Parlay {
                id: "p1".into(),
                name: "Friday, late games".into(),
                stake: 10.0,
                total_price: 3.64,
                potential_payout: 36.446,
                status: ParlayStatus::Pending,
                created_at: now,
                updated_at: now,
            },
            legs: vec![
                leg("b1", BetCategory::Moneyline, Selection::Home, None, None),
                leg("b2", BetCategory::PlayerProp, Selection::Over, Some("p9"), Some(PropCategory::Goals)),
            ],
        }
    }

    #[test]
    fn test_export_writes_one_row_per_leg() {
        let mut buf = Vec::new();
        let rows = write_parlays_csv(&mut buf, &[sample()]).unwrap();
        assert_eq!(rows, 2);

        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("parlay_id,parlay_name,stake"));
        // names with commas are quoted
        assert!(lines[1].contains("\"Friday, late games\""));
        assert!(lines[1].contains("36.45"));
        assert!(lines[2].contains("player_prop,over,p9,goals"));
    }

    #[test]
    fn test_export_empty() {
        let mut buf = Vec::new();
        assert_eq!(write_parlays_csv(&mut buf, &[]).unwrap(), 0);
    }
}
