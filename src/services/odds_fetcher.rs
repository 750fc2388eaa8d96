//! Pulls lines and final scores from The Odds API into the store.
//!
//! ## Request budget
//! A refresh costs two requests (odds + scores) and is skipped while the last
//! successful refresh for the sport is younger than `ODDS_REFRESH_HOURS`.
//! Callers can force a refresh, which still records the fetch time.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::config::Settings;
use crate::db::{
    create_game, get_all_teams, get_game_by_external_id, insert_team, record_game_result,
    update_game_status, ts, upsert_odds_quote,
};
use crate::error::BettingError;
use crate::models::{Game, GameResult, GameStatus, NewGame, OddsQuoteInput, Team};
use crate::utils::{abbreviate, validate_team_name};

const API_BASE: &str = "https://api.the-odds-api.com/v4/sports";

// ── Odds API response types ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct OddsEvent {
    id: String,
    commence_time: DateTime<Utc>,
    home_team: String,
    away_team: String,
    #[serde(default)]
    bookmakers: Vec<Bookmaker>,
}

#[derive(Debug, Deserialize)]
struct Bookmaker {
    title: String,
    #[serde(default)]
    markets: Vec<Market>,
}

#[derive(Debug, Deserialize)]
struct Market {
    key: String,
    outcomes: Vec<Outcome>,
}

#[derive(Debug, Deserialize)]
struct Outcome {
    name: String,
    price: f64,
    point: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ScoreEvent {
    id: String,
    commence_time: DateTime<Utc>,
    #[serde(default)]
    completed: bool,
    home_team: String,
    away_team: String,
    scores: Option<Vec<TeamScore>>,
}

#[derive(Debug, Deserialize)]
struct TeamScore {
    name: String,
    score: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FetchSummary {
    pub sport_key: String,
    /// True when the refresh was skipped because the last one is recent.
    pub skipped: bool,
    pub events: usize,
    pub games_created: usize,
    pub quotes_upserted: usize,
    pub games_finished: usize,
}

// ── Public entry point ────────────────────────────────────────────────────────

/// Refresh lines and scores for the configured sport. Without an API key this
/// is an input error; a recent refresh short-circuits unless `force` is set.
pub async fn refresh_odds(pool: &SqlitePool, settings: &Settings, force: bool) -> Result<FetchSummary> {
    let api_key = settings
        .odds_api_key
        .as_deref()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| BettingError::InvalidInput("ODDS_API_KEY is not configured".into()))?;
    let sport_key = settings.odds_api_sport.as_str();

    let mut summary = FetchSummary {
        sport_key: sport_key.to_string(),
        ..Default::default()
    };

    if !force && !is_stale(pool, sport_key, settings.odds_refresh_hours).await? {
        tracing::debug!("Odds: {} fetch skipped (refreshed within {}h)", sport_key, settings.odds_refresh_hours);
        summary.skipped = true;
        return Ok(summary);
    }

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(20))
        .build()?;

    let odds_url = format!(
        "{}/{}/odds/?apiKey={}&regions={}&markets=h2h,spreads,totals&oddsFormat=american&dateFormat=iso",
        API_BASE, sport_key, api_key, settings.odds_api_regions
    );
    let events: Vec<OddsEvent> = get_json(&client, &odds_url, sport_key).await?;
    summary.events = events.len();

    let mut teams = get_all_teams(pool).await?;
    for event in &events {
        match store_event(pool, &mut teams, event).await {
            Ok((created, quotes)) => {
                summary.games_created += usize::from(created);
                summary.quotes_upserted += quotes;
            }
            Err(e) => tracing::error!(
                "Odds: failed to store {} vs {} ({}): {}",
                event.home_team, event.away_team, event.id, e
            ),
        }
    }

    let scores_url = format!(
        "{}/{}/scores/?apiKey={}&daysFrom=3&dateFormat=iso",
        API_BASE, sport_key, api_key
    );
    let scores: Vec<ScoreEvent> = get_json(&client, &scores_url, sport_key).await?;
    for event in &scores {
        match store_score(pool, event).await {
            Ok(true) => summary.games_finished += 1,
            Ok(false) => {}
            Err(e) => tracing::warn!("Scores: {} not applied: {}", event.id, e),
        }
    }

    mark_fetched(pool, sport_key).await?;
    tracing::info!(
        "Odds: {} events, {} new games, {} quotes, {} games finished ({})",
        summary.events, summary.games_created, summary.quotes_upserted, summary.games_finished, sport_key
    );
    Ok(summary)
}

// ── Internal helpers ──────────────────────────────────────────────────────────

async fn get_json<T: serde::de::DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    sport_key: &str,
) -> Result<T> {
    let resp = client.get(url).send().await.context("Odds API request failed")?;

    let status = resp.status();
    if status == 401 {
        return Err(anyhow::anyhow!("Odds API: invalid API key (401)"));
    }
    if status == 422 {
        return Err(anyhow::anyhow!("Odds API: sport {} not in subscription (422)", sport_key));
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(anyhow::anyhow!("Odds API HTTP {}: {}", status, body));
    }
    if let Some(remaining) = resp.headers().get("x-requests-remaining") {
        tracing::debug!("Odds API requests remaining: {:?}", remaining);
    }

    resp.json().await.context("Odds API returned malformed JSON")
}

/// Returns true if this sport_key has not been fetched within `hours`.
async fn is_stale(pool: &SqlitePool, sport_key: &str, hours: i64) -> Result<bool> {
    let last: Option<String> = sqlx::query_scalar("SELECT last_fetched FROM odds_fetch_log WHERE sport_key = ?")
        .bind(sport_key)
        .fetch_optional(pool)
        .await?;

    Ok(match last {
        None => true,
        Some(raw) => match DateTime::parse_from_rfc3339(&raw) {
            Ok(fetched) => Utc::now().signed_duration_since(fetched.with_timezone(&Utc)) > Duration::hours(hours),
            Err(_) => true,
        },
    })
}

async fn mark_fetched(pool: &SqlitePool, sport_key: &str) -> Result<()> {
    sqlx::query("INSERT OR REPLACE INTO odds_fetch_log (sport_key, last_fetched) VALUES (?, ?)")
        .bind(sport_key)
        .bind(ts(Utc::now()))
        .execute(pool)
        .await?;
    Ok(())
}

/// Ensure the game exists and upsert one quote per bookmaker.
/// Returns (game created, quotes stored).
async fn store_event(pool: &SqlitePool, teams: &mut Vec<Team>, event: &OddsEvent) -> Result<(bool, usize)> {
    let (game, created) = ensure_game(pool, teams, &event.id, &event.home_team, &event.away_team, event.commence_time).await?;

    let mut stored = 0;
    for quote in quotes_from_event(event, &game.id) {
        upsert_odds_quote(pool, &quote).await?;
        stored += 1;
    }
    Ok((created, stored))
}

async fn store_score(pool: &SqlitePool, event: &ScoreEvent) -> Result<bool> {
    let Some(game) = get_game_by_external_id(pool, &event.id).await? else {
        return Ok(false);
    };
    if game.status == GameStatus::Finished {
        return Ok(false);
    }

    if !event.completed {
        if event.commence_time <= Utc::now() && game.status == GameStatus::Scheduled {
            update_game_status(pool, &game.id, GameStatus::InProgress).await?;
        }
        return Ok(false);
    }

    let Some((home_score, away_score)) = final_score_from_event(event) else {
        tracing::warn!("Scores: {} marked completed without usable scores", event.id);
        return Ok(false);
    };
    record_game_result(pool, &game.id, &GameResult { home_score, away_score }).await?;
    Ok(true)
}

async fn ensure_game(
    pool: &SqlitePool,
    teams: &mut Vec<Team>,
    external_id: &str,
    home_team: &str,
    away_team: &str,
    commence_time: DateTime<Utc>,
) -> Result<(Game, bool)> {
    if let Some(game) = get_game_by_external_id(pool, external_id).await? {
        return Ok((game, false));
    }

    let home = ensure_team(pool, teams, home_team).await?;
    let away = ensure_team(pool, teams, away_team).await?;
    let game = create_game(
        pool,
        &NewGame {
            external_id: Some(external_id.to_string()),
            home_team_id: home.id,
            away_team_id: away.id,
            game_time: commence_time,
            status: None,
        },
    )
    .await?;
    tracing::debug!("Odds: created game {} vs {}", game.home_team_name, game.away_team_name);
    Ok((game, true))
}

async fn ensure_team(pool: &SqlitePool, teams: &mut Vec<Team>, name: &str) -> Result<Team> {
    if !validate_team_name(name) {
        return Err(BettingError::InvalidInput(format!("feed sent unusable team name '{name}'")).into());
    }
    if let Some(team) = teams.iter().find(|t| names_match(&t.name, name)) {
        return Ok(team.clone());
    }

    let now = Utc::now();
    let team = Team {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        abbreviation: abbreviate(name),
        division: None,
        conference: None,
        logo_url: None,
        created_at: now,
        updated_at: now,
    };
    insert_team(pool, &team).await?;
    teams.push(team.clone());
    Ok(team)
}

/// One quote per bookmaker. Markets a book does not offer stay empty.
fn quotes_from_event(event: &OddsEvent, game_id: &str) -> Vec<OddsQuoteInput> {
    event
        .bookmakers
        .iter()
        .filter_map(|bk| {
            let mut quote = OddsQuoteInput {
                game_id: game_id.to_string(),
                sportsbook: bk.title.clone(),
                ..Default::default()
            };

            for market in &bk.markets {
                for outcome in &market.outcomes {
                    let is_home = names_match(&outcome.name, &event.home_team);
                    let is_away = !is_home && names_match(&outcome.name, &event.away_team);
                    match market.key.as_str() {
                        "h2h" if is_home => quote.home_moneyline = Some(outcome.price),
                        "h2h" if is_away => quote.away_moneyline = Some(outcome.price),
                        "spreads" if is_home => {
                            quote.home_spread = outcome.point;
                            quote.home_spread_price = Some(outcome.price);
                        }
                        "spreads" if is_away => {
                            quote.away_spread = outcome.point;
                            quote.away_spread_price = Some(outcome.price);
                        }
                        "totals" => match outcome.name.to_lowercase().as_str() {
                            "over" => {
                                quote.total = quote.total.or(outcome.point);
                                quote.over_price = Some(outcome.price);
                            }
                            "under" => {
                                quote.total = quote.total.or(outcome.point);
                                quote.under_price = Some(outcome.price);
                            }
                            _ => {}
                        },
                        _ => {}
                    }
                }
            }

            let has_market = quote.home_moneyline.is_some()
                || quote.away_moneyline.is_some()
                || quote.home_spread_price.is_some()
                || quote.away_spread_price.is_some()
                || quote.over_price.is_some()
                || quote.under_price.is_some();
            has_market.then_some(quote)
        })
        .collect()
}

fn final_score_from_event(event: &ScoreEvent) -> Option<(i32, i32)> {
    let scores = event.scores.as_ref()?;
    let find = |team: &str| {
        scores
            .iter()
            .find(|s| names_match(&s.name, team))
            .and_then(|s| s.score.trim().parse::<i32>().ok())
    };
    Some((find(&event.home_team)?, find(&event.away_team)?))
}

/// Fuzzy team-name match: normalise punctuation, then containment either way,
/// then a Jaro-Winkler fallback for spelling variants ("Montreal" / "Montréal").
fn names_match(a: &str, b: &str) -> bool {
    let norm = |s: &str| -> String {
        s.to_lowercase()
            .replace('.', "")
            .replace('-', " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    };
    let a = norm(a);
    let b = norm(b);
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a == b || a.contains(&b) || b.contains(&a) || strsim::jaro_winkler(&a, &b) > 0.93
}
