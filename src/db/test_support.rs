//! Fixtures for tests that need a live store.

use chrono::{Duration, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::*;

/// Fresh in-memory store with the schema applied. A single connection that is
/// never recycled, so every query sees the same database.
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    init_database_with_pool(&pool).await.expect("schema");
    pool
}

/// File-backed store with a real connection pool, for tests that need
/// concurrent writers. Remove the returned path when done.
pub async fn file_pool() -> (SqlitePool, std::path::PathBuf) {
    let path = std::env::temp_dir().join(format!("parlaydesk-test-{}.db", Uuid::new_v4()));
    let pool = create_pool(&format!("sqlite:{}", path.display()))
        .await
        .expect("file sqlite");
    init_database_with_pool(&pool).await.expect("schema");
    (pool, path)
}

async fn seed_team(pool: &SqlitePool, name: &str) -> Team {
    let now = Utc::now();
    let team = Team {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        abbreviation: crate::utils::abbreviate(name),
        division: None,
        conference: None,
        logo_url: None,
        created_at: now,
        updated_at: now,
    };
    insert_team(pool, &team).await.expect("insert team");
    team
}

/// A scheduled game between two fresh teams named after `key`.
pub async fn seed_game(pool: &SqlitePool, key: &str) -> Game {
    let home = seed_team(pool, &format!("{key} Home")).await;
    let away = seed_team(pool, &format!("{key} Away")).await;
    create_game(pool, &NewGame {
        external_id: Some(format!("ext-{key}")),
        home_team_id: home.id,
        away_team_id: away.id,
        game_time: Utc::now() + Duration::hours(2),
        status: None,
    })
    .await
    .expect("insert game")
}

pub async fn seed_player(pool: &SqlitePool, team_id: &str, name: &str) -> Player {
    let now = Utc::now();
    let player = Player {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        position: "C".into(),
        jersey_number: Some(91),
        team_id: team_id.to_string(),
        is_injured: false,
        injury_details: None,
        created_at: now,
        updated_at: now,
    };
    insert_player(pool, &player).await.expect("insert player");
    player
}

pub async fn seed_quote(pool: &SqlitePool, input: OddsQuoteInput) -> OddsQuote {
    upsert_odds_quote(pool, &input).await.expect("upsert quote")
}

pub async fn finish_game(pool: &SqlitePool, game_id: &str, home: i32, away: i32) -> Game {
    record_game_result(pool, game_id, &GameResult { home_score: home, away_score: away })
        .await
        .expect("record result")
}
