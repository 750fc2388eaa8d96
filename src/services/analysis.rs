//! LLM-written analysis of games, teams and parlays.
//!
//! Prompts are assembled from the store (lines, props, rosters, tagged news)
//! and sent to an Anthropic Messages-compatible endpoint. Answers are kept in
//! the `analyses` table and served from there until they are older than
//! `ANALYSIS_CACHE_HOURS`, so repeat requests cost nothing. Without
//! `LLM_API_KEY` cached answers are still served; generating a new one is an
//! input error, the same way odds refresh behaves without its key.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Settings;
use crate::db::{
    get_cached_analysis, get_game, get_games, get_games_by_ids, get_news, get_odds_for_game,
    get_parlay, get_player_props, get_players_by_team, get_team_by_id, insert_analysis, GameFilter,
    NewsFilter, PropFilter,
};
use crate::error::BettingError;
use crate::models::{
    Analysis, AnalysisKind, Game, NewsArticle, OddsQuote, ParlayWithLegs, Player, PlayerPropQuote,
    Team,
};
use crate::utils::{format_american, format_line};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;
const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 1000;

/// Article bodies are cut to this many characters inside prompts.
const ARTICLE_EXCERPT_CHARS: usize = 500;

const SYSTEM_PROMPT: &str = "You are an NHL betting analyst. Be concrete and brief. \
Weigh prices against what the news says about form and injuries. \
End your answer with a line of the form 'CONFIDENCE: <number between 0 and 1>'.";

// ── Messages API types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

// ── Client ────────────────────────────────────────────────────────────────────

pub struct LlmClient {
    http: Client,
    api_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl LlmClient {
    pub fn new(api_url: &str, api_key: &str, model: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .context("Failed to build LLM HTTP client")?;
        Ok(Self::with_http(http, api_url, api_key, model))
    }

    fn with_http(http: Client, api_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            http,
            api_url: api_url.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// One completion, retried with backoff on 429 and 5xx.
    pub async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system,
            messages: vec![Message { role: "user", content: prompt }],
        };

        let mut last_error = String::new();
        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = BASE_BACKOFF_MS * 2u64.pow(attempt - 1);
                debug!(attempt, delay_ms = delay, "Retrying LLM call");
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            }

            let response = match self
                .http
                .post(&self.api_url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&request)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    warn!(attempt, error = %e, "LLM request failed");
                    last_error = format!("request error: {e}");
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                let body: MessagesResponse =
                    response.json().await.context("LLM returned malformed JSON")?;
                let text: String = body.content.into_iter().filter_map(|b| b.text).collect();
                if text.trim().is_empty() {
                    return Err(BettingError::Upstream("LLM returned an empty answer".into()).into());
                }
                return Ok(text);
            }

            let error_text = response.text().await.unwrap_or_default();
            if status.as_u16() == 429 || status.is_server_error() {
                warn!(status = %status, attempt, "Retryable LLM error");
                last_error = format!("HTTP {status}: {error_text}");
                continue;
            }
            return Err(BettingError::Upstream(format!("LLM HTTP {status}: {error_text}")).into());
        }

        Err(BettingError::Upstream(format!(
            "LLM failed after {} attempts: {}",
            MAX_RETRIES + 1,
            last_error
        ))
        .into())
    }
}

// ── Answer parsing ────────────────────────────────────────────────────────────

/// The confidence the model stated on its last "confidence" line, as 0.0-1.0.
/// Percentages (e.g. "72%" or "72") are scaled down.
pub fn parse_confidence(text: &str) -> Option<f64> {
    text.lines().rev().find_map(|line| {
        let lower = line.to_lowercase();
        let at = lower.find("confidence")?;
        let rest = &lower[at + "confidence".len()..];
        let start = rest.find(|c: char| c.is_ascii_digit())?;
        let number: String = rest[start..]
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        let mut value: f64 = number.trim_end_matches('.').parse().ok()?;
        if value > 1.0 && value <= 100.0 {
            value /= 100.0;
        }
        Some(value.clamp(0.0, 1.0))
    })
}

// ── Prompt assembly ───────────────────────────────────────────────────────────

fn excerpt(text: &str) -> String {
    if text.chars().count() <= ARTICLE_EXCERPT_CHARS {
        text.to_string()
    } else {
        let cut: String = text.chars().take(ARTICLE_EXCERPT_CHARS).collect();
        format!("{cut}...")
    }
}

fn price(p: Option<f64>) -> String {
    p.map(format_american).unwrap_or_else(|| "-".to_string())
}

fn push_news(out: &mut String, heading: &str, news: &[NewsArticle]) {
    let _ = writeln!(out, "\n{heading}:");
    if news.is_empty() {
        let _ = writeln!(out, "- none");
    }
    for article in news {
        let _ = writeln!(
            out,
            "- [{}] {} ({}): {}",
            article.published_at.format("%Y-%m-%d"),
            article.title,
            article.source,
            excerpt(&article.content)
        );
    }
}

fn push_roster(out: &mut String, team: &str, players: &[Player]) {
    let injured: Vec<String> = players
        .iter()
        .filter(|p| p.is_injured)
        .map(|p| match &p.injury_details {
            Some(details) => format!("{} ({})", p.name, details),
            None => p.name.clone(),
        })
        .collect();
    if !injured.is_empty() {
        let _ = writeln!(out, "{team} injuries: {}", injured.join(", "));
    }
}

fn game_prompt(
    game: &Game,
    odds: &[OddsQuote],
    props: &[(String, PlayerPropQuote)],
    home_players: &[Player],
    away_players: &[Player],
    home_news: &[NewsArticle],
    away_news: &[NewsArticle],
) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Analyze this game: {} (away) at {} (home), {} UTC, status {}.",
        game.away_team_name,
        game.home_team_name,
        game.game_time.format("%Y-%m-%d %H:%M"),
        game.status
    );

    let _ = writeln!(out, "\nLines:");
    if odds.is_empty() {
        let _ = writeln!(out, "- none posted");
    }
    for quote in odds {
        let _ = writeln!(
            out,
            "- {}: moneyline home {} / away {}; spread home {} ({}) / away {} ({}); total {} over {} / under {}",
            quote.sportsbook,
            price(quote.home_moneyline),
            price(quote.away_moneyline),
            format_line(quote.home_spread, true),
            price(quote.home_spread_price),
            format_line(quote.away_spread, true),
            price(quote.away_spread_price),
            format_line(quote.total, false),
            price(quote.over_price),
            price(quote.under_price),
        );
    }

    if !props.is_empty() {
        let _ = writeln!(out, "\nPlayer props:");
        for (player, prop) in props {
            let _ = writeln!(
                out,
                "- {} {} {:.1}: over {} / under {} ({})",
                player,
                prop.prop_type,
                prop.line,
                price(prop.over_price),
                price(prop.under_price),
                prop.sportsbook
            );
        }
    }

    out.push('\n');
    push_roster(&mut out, &game.home_team_name, home_players);
    push_roster(&mut out, &game.away_team_name, away_players);
    push_news(&mut out, &format!("{} news", game.home_team_name), home_news);
    push_news(&mut out, &format!("{} news", game.away_team_name), away_news);

    let _ = writeln!(
        out,
        "\nGive the likely outcome, where the value is (moneyline, spread, total or props), and the main risks."
    );
    out
}

fn team_prompt(team: &Team, players: &[Player], upcoming: &[Game], news: &[NewsArticle]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Analyze the {} ({}).", team.name, team.abbreviation);
    if let (Some(division), Some(conference)) = (&team.division, &team.conference) {
        let _ = writeln!(out, "{division} division, {conference} conference.");
    }

    let _ = writeln!(out, "\nRoster ({} players):", players.len());
    push_roster(&mut out, &team.name, players);

    let _ = writeln!(out, "\nUpcoming games:");
    if upcoming.is_empty() {
        let _ = writeln!(out, "- none scheduled");
    }
    for game in upcoming {
        let _ = writeln!(
            out,
            "- {} at {}, {} UTC",
            game.away_team_name,
            game.home_team_name,
            game.game_time.format("%Y-%m-%d %H:%M")
        );
    }

    push_news(&mut out, "Recent news", news);
    let _ = writeln!(out, "\nSummarize form, injuries and what that means for betting on them this week.");
    out
}

fn parlay_prompt(
    parlay: &ParlayWithLegs,
    games: &HashMap<String, Game>,
    players: &HashMap<String, String>,
    news: &[NewsArticle],
) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Evaluate this {}-leg parlay '{}': stake {:.2}, combined price {}, potential payout {:.2}.",
        parlay.legs.len(),
        parlay.parlay.name,
        parlay.parlay.stake,
        format_american(parlay.parlay.total_price),
        parlay.parlay.potential_payout
    );

    let _ = writeln!(out, "\nLegs:");
    for (n, leg) in parlay.legs.iter().enumerate() {
        let matchup = games
            .get(&leg.game_id)
            .map(|g| format!("{} at {}", g.away_team_name, g.home_team_name))
            .unwrap_or_else(|| leg.game_id.clone());
        let subject = match (&leg.player_id, leg.prop_type) {
            (Some(player_id), Some(prop_type)) => {
                let name = players.get(player_id).cloned().unwrap_or_else(|| player_id.clone());
                format!("{name} {prop_type} {}", leg.selection)
            }
            _ => format!("{} {}", leg.bet_type, leg.selection),
        };
        let _ = writeln!(
            out,
            "{}. {} | {} @ {} [{}]",
            n + 1,
            matchup,
            subject,
            format_american(leg.price),
            leg.status
        );
    }

    push_news(&mut out, "Relevant news", news);
    let _ = writeln!(
        out,
        "\nJudge each leg, flag correlated or weak legs, and say whether the parlay is worth the price."
    );
    out
}

// ── Service ───────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AnalysisService {
    llm: Option<Arc<LlmClient>>,
    cache_hours: i64,
}

impl AnalysisService {
    pub fn new(settings: &Settings) -> Result<Self> {
        let llm = match settings.llm_api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            Some(key) => Some(Arc::new(LlmClient::new(
                &settings.llm_api_url,
                key,
                &settings.llm_model,
            )?)),
            None => None,
        };
        Ok(Self {
            llm,
            cache_hours: settings.analysis_cache_hours,
        })
    }

    #[cfg(test)]
    fn with_client(llm: Option<LlmClient>, cache_hours: i64) -> Self {
        Self {
            llm: llm.map(Arc::new),
            cache_hours,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.llm.is_some()
    }

    async fn cached(
        &self,
        pool: &SqlitePool,
        kind: AnalysisKind,
        subject_id: &str,
        refresh: bool,
    ) -> Result<Option<Analysis>> {
        if refresh {
            return Ok(None);
        }
        let since = Utc::now() - Duration::hours(self.cache_hours);
        get_cached_analysis(pool, kind, subject_id, since).await
    }

    fn client(&self) -> Result<&LlmClient> {
        self.llm
            .as_deref()
            .ok_or_else(|| BettingError::InvalidInput("LLM_API_KEY is not configured".into()).into())
    }

    async fn generate(
        &self,
        pool: &SqlitePool,
        client: &LlmClient,
        kind: AnalysisKind,
        subject_id: &str,
        prompt: &str,
    ) -> Result<Analysis> {
        let content = client.complete(SYSTEM_PROMPT, prompt).await?;
        let analysis = Analysis {
            id: Uuid::new_v4().to_string(),
            kind,
            subject_id: subject_id.to_string(),
            confidence: parse_confidence(&content),
            content,
            model: client.model().to_string(),
            created_at: Utc::now(),
        };
        insert_analysis(pool, &analysis).await?;
        info!("Analysis: generated {} analysis for {}", kind, subject_id);
        Ok(analysis)
    }

    async fn team_news(&self, pool: &SqlitePool, team_id: &str, limit: i64) -> Result<Vec<NewsArticle>> {
        get_news(pool, &NewsFilter {
            team_id: Some(team_id.to_string()),
            since: Some(Utc::now() - Duration::days(7)),
            limit: Some(limit),
            ..Default::default()
        })
        .await
    }

    pub async fn analyze_game(&self, pool: &SqlitePool, game_id: &str, refresh: bool) -> Result<Analysis> {
        let game = get_game(pool, game_id)
            .await?
            .ok_or_else(|| BettingError::not_found("game", game_id))?;
        if let Some(hit) = self.cached(pool, AnalysisKind::Game, game_id, refresh).await? {
            return Ok(hit);
        }
        let client = self.client()?;

        let odds = get_odds_for_game(pool, game_id, None).await?;
        let home_players = get_players_by_team(pool, &game.home_team_id).await?;
        let away_players = get_players_by_team(pool, &game.away_team_id).await?;
        let names: HashMap<&str, &str> = home_players
            .iter()
            .chain(&away_players)
            .map(|p| (p.id.as_str(), p.name.as_str()))
            .collect();
        let props: Vec<(String, PlayerPropQuote)> = get_player_props(pool, &PropFilter {
            game_id: Some(game_id.to_string()),
            ..Default::default()
        })
        .await?
        .into_iter()
        .map(|prop| {
            let name = names
                .get(prop.player_id.as_str())
                .copied()
                .unwrap_or(prop.player_id.as_str())
                .to_string();
            (name, prop)
        })
        .collect();
        let home_news = self.team_news(pool, &game.home_team_id, 5).await?;
        let away_news = self.team_news(pool, &game.away_team_id, 5).await?;

        let prompt = game_prompt(&game, &odds, &props, &home_players, &away_players, &home_news, &away_news);
        self.generate(pool, client, AnalysisKind::Game, game_id, &prompt).await
    }

    pub async fn analyze_team(&self, pool: &SqlitePool, team_id: &str, refresh: bool) -> Result<Analysis> {
        let team = get_team_by_id(pool, team_id)
            .await?
            .ok_or_else(|| BettingError::not_found("team", team_id))?;
        if let Some(hit) = self.cached(pool, AnalysisKind::Team, team_id, refresh).await? {
            return Ok(hit);
        }
        let client = self.client()?;

        let players = get_players_by_team(pool, team_id).await?;
        let upcoming = get_games(pool, &GameFilter {
            team_id: Some(team_id.to_string()),
            upcoming_days: Some(7),
            ..Default::default()
        })
        .await?;
        let news = self.team_news(pool, team_id, 10).await?;

        let prompt = team_prompt(&team, &players, &upcoming, &news);
        self.generate(pool, client, AnalysisKind::Team, team_id, &prompt).await
    }

    pub async fn evaluate_parlay(&self, pool: &SqlitePool, parlay_id: &str, refresh: bool) -> Result<Analysis> {
        let parlay = get_parlay(pool, parlay_id)
            .await?
            .ok_or_else(|| BettingError::not_found("parlay", parlay_id))?;
        if let Some(hit) = self.cached(pool, AnalysisKind::Parlay, parlay_id, refresh).await? {
            return Ok(hit);
        }
        let client = self.client()?;

        let mut game_ids: Vec<String> = parlay.legs.iter().map(|l| l.game_id.clone()).collect();
        game_ids.sort();
        game_ids.dedup();
        let games: HashMap<String, Game> = get_games_by_ids(pool, &game_ids)
            .await?
            .into_iter()
            .map(|g| (g.id.clone(), g))
            .collect();

        let mut players = HashMap::new();
        let mut news: Vec<NewsArticle> = Vec::new();
        for game in games.values() {
            for team_id in [&game.home_team_id, &game.away_team_id] {
                for player in get_players_by_team(pool, team_id).await? {
                    players.insert(player.id, player.name);
                }
                for article in self.team_news(pool, team_id, 3).await? {
                    if !news.iter().any(|a| a.id == article.id) {
                        news.push(article);
                    }
                }
            }
        }
        news.sort_by(|a, b| b.published_at.cmp(&a.published_at));

        let prompt = parlay_prompt(&parlay, &games, &players, &news);
        self.generate(pool, client, AnalysisKind::Parlay, parlay_id, &prompt).await
    }
}
