//! News ingestion: NewsAPI-style feed pulls plus hand-posted articles.
//!
//! Every stored article is tagged with the teams and players it mentions so
//! the news routes and the LLM prompts can look articles up by entity.
//!
//! API: `GET {NEWS_API_URL}?q=..&apiKey=..` returning
//! `{ status, totalResults, articles: [{ title, description, content, url, source: { name }, publishedAt }] }`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::config::Settings;
use crate::db::{get_all_players, get_all_teams, upsert_news_article};
use crate::error::BettingError;
use crate::models::{NewsArticle, NewsArticleInput, Player, Team};

const PAGE_SIZE: u32 = 50;

// ── NewsAPI response types ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct NewsApiResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    articles: Vec<FeedArticle>,
}

#[derive(Debug, Deserialize)]
struct FeedArticle {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    source: Option<FeedSource>,
    #[serde(default, rename = "publishedAt")]
    published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FeedSource {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NewsRefreshSummary {
    pub fetched: usize,
    pub stored: usize,
    pub skipped: usize,
}

// ── Pure helpers ──────────────────────────────────────────────────────────────

/// Usable articles from a feed page. Entries without a title, URL or
/// parseable publish time are dropped.
fn articles_from_response(response: NewsApiResponse) -> Vec<NewsArticleInput> {
    response
        .articles
        .into_iter()
        .filter_map(|a| {
            let title = a.title.filter(|t| !t.trim().is_empty() && t != "[Removed]")?;
            let url = a.url.filter(|u| !u.trim().is_empty())?;
            let published_at = DateTime::parse_from_rfc3339(a.published_at.as_deref()?)
                .ok()?
                .with_timezone(&Utc);
            let source = a
                .source
                .as_ref()
                .and_then(|s| s.name.clone().or_else(|| s.id.clone()))
                .unwrap_or_else(|| "NewsAPI".to_string());
            let content = a
                .content
                .clone()
                .or_else(|| a.description.clone())
                .unwrap_or_else(|| title.clone());

            Some(NewsArticleInput {
                external_id: None,
                source,
                title,
                url,
                content,
                summary: a.description,
                published_at,
            })
        })
        .collect()
}

/// True when `word` appears in `text` as a whole word.
fn contains_word(text: &str, word: &str) -> bool {
    if word.is_empty() {
        return false;
    }
    text.match_indices(word).any(|(start, _)| {
        let before = text[..start].chars().next_back();
        let after = text[start + word.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

/// Team and player ids mentioned in `text`. Teams match on full name or
/// abbreviation (whole word, case-sensitive); a mentioned player also tags
/// their team.
pub fn extract_mentions(text: &str, teams: &[Team], players: &[Player]) -> (Vec<String>, Vec<String>) {
    let mut team_ids: Vec<String> = teams
        .iter()
        .filter(|t| text.contains(&t.name) || contains_word(text, &t.abbreviation))
        .map(|t| t.id.clone())
        .collect();

    let mut player_ids = Vec::new();
    for player in players.iter().filter(|p| contains_word(text, &p.name)) {
        player_ids.push(player.id.clone());
        if !team_ids.contains(&player.team_id) {
            team_ids.push(player.team_id.clone());
        }
    }
    (team_ids, player_ids)
}

// ── Store entry points ────────────────────────────────────────────────────────

/// Tag and store one article; an existing article with the same URL is
/// refreshed in place.
pub async fn ingest_article(pool: &SqlitePool, input: &NewsArticleInput) -> Result<NewsArticle> {
    let teams = get_all_teams(pool).await?;
    let players = get_all_players(pool).await?;
    ingest_with(pool, input, &teams, &players).await
}

async fn ingest_with(
    pool: &SqlitePool,
    input: &NewsArticleInput,
    teams: &[Team],
    players: &[Player],
) -> Result<NewsArticle> {
    if input.title.trim().is_empty() || input.url.trim().is_empty() || input.source.trim().is_empty() {
        return Err(BettingError::InvalidInput("articles need a source, title and url".into()).into());
    }
    let text = format!("{}\n{}", input.title, input.content);
    let (team_ids, player_ids) = extract_mentions(&text, teams, players);
    let article = upsert_news_article(pool, input, &team_ids, &player_ids).await?;
    tracing::debug!(
        "News: stored '{}' ({} teams, {} players)",
        article.title,
        article.teams.len(),
        article.players.len()
    );
    Ok(article)
}

/// Pull the latest page for `NEWS_QUERY`. Without `NEWS_API_KEY` this is an
/// input error.
pub async fn refresh_news(pool: &SqlitePool, settings: &Settings) -> Result<NewsRefreshSummary> {
    let api_key = settings
        .news_api_key
        .as_deref()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| BettingError::InvalidInput("NEWS_API_KEY is not configured".into()))?;

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(15))
        .user_agent("parlaydesk/0.1")
        .build()
        .context("Failed to build news HTTP client")?;

    let page_size = PAGE_SIZE.to_string();
    let resp = client
        .get(&settings.news_api_url)
        .query(&[
            ("q", settings.news_query.as_str()),
            ("language", "en"),
            ("sortBy", "publishedAt"),
            ("pageSize", page_size.as_str()),
            ("apiKey", api_key),
        ])
        .send()
        .await
        .context("News API request failed")?;

    let status = resp.status();
    let body: NewsApiResponse = resp.json().await.context("News API returned malformed JSON")?;
    if !status.is_success() || body.status == "error" {
        return Err(BettingError::Upstream(format!(
            "news feed HTTP {}: {}",
            status,
            body.message.unwrap_or_default()
        ))
        .into());
    }

    let fetched = body.articles.len();
    let articles = articles_from_response(body);
    let mut summary = NewsRefreshSummary {
        fetched,
        skipped: fetched - articles.len(),
        ..Default::default()
    };

    let teams = get_all_teams(pool).await?;
    let players = get_all_players(pool).await?;
    for article in &articles {
        match ingest_with(pool, article, &teams, &players).await {
            Ok(_) => summary.stored += 1,
            Err(e) => {
                summary.skipped += 1;
                tracing::warn!("News: '{}' not stored: {}", article.title, e);
            }
        }
    }

    tracing::info!(
        "News: {} fetched, {} stored, {} skipped ('{}')",
        summary.fetched, summary.stored, summary.skipped, settings.news_query
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{memory_pool, seed_game, seed_player};
    use crate::db::{get_news, NewsFilter};

    fn team(id: &str, name: &str, abbreviation: &str) -> Team {
        Team {
            id: id.into(),
            name: name.into(),
            abbreviation: abbreviation.into(),
            division: None,
            conference: None,
            logo_url: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn player(id: &str, name: &str, team_id: &str) -> Player {
        Player {
            id: id.into(),
            name: name.into(),
            position: "C".into(),
            jersey_number: None,
            team_id: team_id.into(),
            is_injured: false,
            injury_details: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_extract_mentions() {
        let teams = vec![
            team("bos", "Boston Bruins", "BOS"),
            team("edm", "Edmonton Oilers", "EDM"),
            team("tor", "Toronto Maple Leafs", "TOR"),
        ];
        let players = vec![player("mcdavid", "Connor McDavid", "edm")];

        let (team_ids, player_ids) = extract_mentions(
            "BOS rolled on Tuesday while Connor McDavid added two assists. EDITORS note.",
            &teams,
            &players,
        );
        assert_eq!(team_ids, vec!["bos".to_string(), "edm".to_string()]);
        assert_eq!(player_ids, vec!["mcdavid".to_string()]);

        let (team_ids, _) = extract_mentions("The Toronto Maple Leafs won.", &teams, &players);
        assert_eq!(team_ids, vec!["tor".to_string()]);
    }

    #[test]
    fn test_contains_word_needs_boundaries() {
        assert!(contains_word("Go BOS!", "BOS"));
        assert!(!contains_word("BOSTON", "BOS"));
        assert!(!contains_word("anything", ""));
    }

    #[test]
    fn test_articles_from_response_drops_unusable_entries() {
        let body: NewsApiResponse = serde_json::from_str(
            r#"{
                "status": "ok",
                "totalResults": 3,
                "articles": [
                    {
                        "source": {"id": null, "name": "Hockey Wire"},
                        "title": "Bruins extend streak",
                        "description": "Boston wins again.",
                        "url": "https://example.com/a",
                        "publishedAt": "2026-01-10T03:00:00Z",
                        "content": null
                    },
                    {"title": "[Removed]", "url": "https://removed.com", "publishedAt": "2026-01-10T03:00:00Z"},
                    {"title": "No date", "url": "https://example.com/b"}
                ]
            }"#,
        )
        .unwrap();

        let articles = articles_from_response(body);
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].source, "Hockey Wire");
        assert_eq!(articles[0].content, "Boston wins again.");
        assert_eq!(articles[0].summary.as_deref(), Some("Boston wins again."));
    }

    #[tokio::test]
    async fn test_ingest_tags_mentions() {
        let pool = memory_pool().await;
        let game = seed_game(&pool, "g1").await;
        seed_player(&pool, &game.away_team_id, "Star Winger").await;

        let article = ingest_article(&pool, &NewsArticleInput {
            external_id: Some("wire-1".into()),
            source: "Wire".into(),
            title: "g1 Home host rivals".into(),
            url: "https://example.com/g1".into(),
            content: "Star Winger is expected to play.".into(),
            summary: None,
            published_at: Utc::now(),
        })
        .await
        .unwrap();

        assert_eq!(article.teams.len(), 2);
        assert_eq!(article.players.len(), 1);

        let away_news = get_news(&pool, &NewsFilter {
            team_id: Some(game.away_team_id.clone()),
            ..Default::default()
        })
        .await
        .unwrap();
        assert_eq!(away_news.len(), 1);
    }

    #[tokio::test]
    async fn test_ingest_rejects_blank_url() {
        let pool = memory_pool().await;
        let err = ingest_article(&pool, &NewsArticleInput {
            external_id: None,
            source: "Wire".into(),
            title: "Title".into(),
            url: " ".into(),
            content: String::new(),
            summary: None,
            published_at: Utc::now(),
        })
        .await
        .unwrap_err();
        assert!(matches!(err.downcast_ref::<BettingError>(), Some(BettingError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_refresh_without_key_is_input_error() {
        let pool = memory_pool().await;
        let err = refresh_news(&pool, &Settings::default()).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<BettingError>(), Some(BettingError::InvalidInput(_))));
    }
}
