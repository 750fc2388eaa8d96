pub mod seed;
pub use seed::seed_data;

#[cfg(test)]
pub mod test_support;

use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::BettingError;
use crate::models::*;

pub async fn clear_all_data(pool: &SqlitePool) -> Result<()> {
    for table in [
        "analyses",
        "news_article_players",
        "news_article_teams",
        "news_articles",
        "bets",
        "parlays",
        "player_stats",
        "player_props",
        "odds",
        "games",
        "players",
        "teams",
        "odds_fetch_log",
    ] {
        sqlx::query(&format!("DELETE FROM {table}")).execute(pool).await?;
    }
    tracing::info!("All data cleared");
    Ok(())
}

pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    // Strip the "sqlite:" prefix to get the file path, create parent dir if needed
    let file_path = database_url
        .strip_prefix("sqlite:///")
        .or_else(|| database_url.strip_prefix("sqlite://"))
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url);

    if !file_path.starts_with(":memory:") {
        if let Some(parent) = std::path::Path::new(file_path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
        }
    }

    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePool::connect_with(options).await?;
    Ok(pool)
}

/// Called from the CLI where no pool exists yet.
pub async fn init_database(database_url: &str) -> Result<()> {
    let pool = create_pool(database_url).await?;
    init_database_with_pool(&pool).await
}

/// Called from the server so schema creation shares the main pool.
pub async fn init_database_with_pool(pool: &SqlitePool) -> Result<()> {
    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS teams (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            abbreviation TEXT NOT NULL,
            division TEXT,
            conference TEXT,
            logo_url TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS players (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            position TEXT NOT NULL,
            jersey_number INTEGER,
            team_id TEXT NOT NULL,
            is_injured INTEGER NOT NULL DEFAULT 0,
            injury_details TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY (team_id) REFERENCES teams (id)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS games (
            id TEXT PRIMARY KEY,
            external_id TEXT UNIQUE,
            home_team_id TEXT NOT NULL,
            away_team_id TEXT NOT NULL,
            game_time TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'scheduled',
            home_score INTEGER,
            away_score INTEGER,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY (home_team_id) REFERENCES teams (id),
            FOREIGN KEY (away_team_id) REFERENCES teams (id)
        )
        "#,
        // one row per (game, sportsbook); any line may be missing
        r#"
        CREATE TABLE IF NOT EXISTS odds (
            id TEXT PRIMARY KEY,
            game_id TEXT NOT NULL,
            sportsbook TEXT NOT NULL,
            home_moneyline REAL,
            away_moneyline REAL,
            home_spread REAL,
            away_spread REAL,
            home_spread_price REAL,
            away_spread_price REAL,
            total REAL,
            over_price REAL,
            under_price REAL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (game_id, sportsbook),
            FOREIGN KEY (game_id) REFERENCES games (id)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS player_props (
            id TEXT PRIMARY KEY,
            odds_id TEXT NOT NULL,
            player_id TEXT NOT NULL,
            prop_type TEXT NOT NULL,
            line REAL NOT NULL,
            over_price REAL,
            under_price REAL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (odds_id, player_id, prop_type),
            FOREIGN KEY (odds_id) REFERENCES odds (id),
            FOREIGN KEY (player_id) REFERENCES players (id)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS player_stats (
            game_id TEXT NOT NULL,
            player_id TEXT NOT NULL,
            prop_type TEXT NOT NULL,
            value REAL NOT NULL,
            recorded_at TEXT NOT NULL,
            PRIMARY KEY (game_id, player_id, prop_type),
            FOREIGN KEY (game_id) REFERENCES games (id),
            FOREIGN KEY (player_id) REFERENCES players (id)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS parlays (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            stake REAL NOT NULL,
            total_price REAL NOT NULL,
            potential_payout REAL NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS bets (
            id TEXT PRIMARY KEY,
            parlay_id TEXT NOT NULL,
            game_id TEXT NOT NULL,
            bet_type TEXT NOT NULL,
            selection TEXT NOT NULL,
            player_id TEXT,
            prop_type TEXT,
            price REAL NOT NULL,
            justification TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY (parlay_id) REFERENCES parlays (id),
            FOREIGN KEY (game_id) REFERENCES games (id)
        )
        "#,
        // odds_fetch_log: tracks last successful feed call per sport_key to avoid burning quota
        r#"
        CREATE TABLE IF NOT EXISTS odds_fetch_log (
            sport_key    TEXT PRIMARY KEY,
            last_fetched TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS news_articles (
            id TEXT PRIMARY KEY,
            external_id TEXT,
            source TEXT NOT NULL,
            title TEXT NOT NULL,
            url TEXT NOT NULL UNIQUE,
            content TEXT NOT NULL,
            summary TEXT,
            published_at TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS news_article_teams (
            article_id TEXT NOT NULL,
            team_id TEXT NOT NULL,
            PRIMARY KEY (article_id, team_id),
            FOREIGN KEY (article_id) REFERENCES news_articles (id),
            FOREIGN KEY (team_id) REFERENCES teams (id)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS news_article_players (
            article_id TEXT NOT NULL,
            player_id TEXT NOT NULL,
            PRIMARY KEY (article_id, player_id),
            FOREIGN KEY (article_id) REFERENCES news_articles (id),
            FOREIGN KEY (player_id) REFERENCES players (id)
        )
        "#,
        // cached LLM output, newest row per (kind, subject_id) wins
        r#"
        CREATE TABLE IF NOT EXISTS analyses (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            content TEXT NOT NULL,
            confidence REAL,
            model TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
        "CREATE INDEX IF NOT EXISTS idx_games_time ON games(game_time)",
        "CREATE INDEX IF NOT EXISTS idx_news_published ON news_articles(published_at)",
        "CREATE INDEX IF NOT EXISTS idx_analyses_subject ON analyses(kind, subject_id, created_at)",
        "CREATE INDEX IF NOT EXISTS idx_games_status ON games(status)",
        "CREATE INDEX IF NOT EXISTS idx_parlays_status ON parlays(status)",
        "CREATE INDEX IF NOT EXISTS idx_bets_parlay ON bets(parlay_id)",
    ];

    for statement in statements {
        sqlx::query(statement).execute(pool).await?;
    }

    tracing::info!("Database initialized successfully");
    Ok(())
}

// Row helpers

/// Timestamps are stored as second-precision RFC3339 so text ordering matches time ordering.
pub fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_ts(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>> {
    let raw: String = row.try_get(column)?;
    Ok(DateTime::parse_from_rfc3339(&raw)?.with_timezone(&Utc))
}

fn parse_text<T>(row: &SqliteRow, column: &str) -> Result<T>
where
    T: FromStr<Err = BettingError>,
{
    let raw: String = row.try_get(column)?;
    raw.parse::<T>().map_err(|e| {
        BettingError::DataIntegrity(format!("column {column} holds unreadable value: {e}")).into()
    })
}

fn parse_optional_text<T>(row: &SqliteRow, column: &str) -> Result<Option<T>>
where
    T: FromStr<Err = BettingError>,
{
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|s| {
        s.parse::<T>().map_err(|e| {
            BettingError::DataIntegrity(format!("column {column} holds unreadable value: {e}")).into()
        })
    })
    .transpose()
}

fn team_from_row(row: &SqliteRow) -> Result<Team> {
    Ok(Team {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        abbreviation: row.try_get("abbreviation")?,
        division: row.try_get("division")?,
        conference: row.try_get("conference")?,
        logo_url: row.try_get("logo_url")?,
        created_at: parse_ts(row, "created_at")?,
        updated_at: parse_ts(row, "updated_at")?,
    })
}

fn player_from_row(row: &SqliteRow) -> Result<Player> {
    Ok(Player {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        position: row.try_get("position")?,
        jersey_number: row.try_get("jersey_number")?,
        team_id: row.try_get("team_id")?,
        is_injured: row.try_get("is_injured")?,
        injury_details: row.try_get("injury_details")?,
        created_at: parse_ts(row, "created_at")?,
        updated_at: parse_ts(row, "updated_at")?,
    })
}

fn game_from_row(row: &SqliteRow) -> Result<Game> {
    Ok(Game {
        id: row.try_get("id")?,
        external_id: row.try_get("external_id")?,
        home_team_id: row.try_get("home_team_id")?,
        away_team_id: row.try_get("away_team_id")?,
        home_team_name: row.try_get("home_team_name")?,
        away_team_name: row.try_get("away_team_name")?,
        game_time: parse_ts(row, "game_time")?,
        status: parse_text(row, "status")?,
        home_score: row.try_get("home_score")?,
        away_score: row.try_get("away_score")?,
        created_at: parse_ts(row, "created_at")?,
        updated_at: parse_ts(row, "updated_at")?,
    })
}

fn quote_from_row(row: &SqliteRow) -> Result<OddsQuote> {
    Ok(OddsQuote {
        id: row.try_get("id")?,
        game_id: row.try_get("game_id")?,
        sportsbook: row.try_get("sportsbook")?,
        home_moneyline: row.try_get("home_moneyline")?,
        away_moneyline: row.try_get("away_moneyline")?,
        home_spread: row.try_get("home_spread")?,
        away_spread: row.try_get("away_spread")?,
        home_spread_price: row.try_get("home_spread_price")?,
        away_spread_price: row.try_get("away_spread_price")?,
        total: row.try_get("total")?,
        over_price: row.try_get("over_price")?,
        under_price: row.try_get("under_price")?,
        updated_at: Some(parse_ts(row, "updated_at")?),
    })
}

fn prop_from_row(row: &SqliteRow) -> Result<PlayerPropQuote> {
    Ok(PlayerPropQuote {
        id: row.try_get("id")?,
        odds_id: row.try_get("odds_id")?,
        game_id: row.try_get("game_id")?,
        sportsbook: row.try_get("sportsbook")?,
        player_id: row.try_get("player_id")?,
        prop_type: parse_text(row, "prop_type")?,
        line: row.try_get("line")?,
        over_price: row.try_get("over_price")?,
        under_price: row.try_get("under_price")?,
        updated_at: parse_ts(row, "updated_at")?,
    })
}

fn stat_from_row(row: &SqliteRow) -> Result<PlayerStat> {
    Ok(PlayerStat {
        game_id: row.try_get("game_id")?,
        player_id: row.try_get("player_id")?,
        prop_type: parse_text(row, "prop_type")?,
        value: row.try_get("value")?,
        recorded_at: parse_ts(row, "recorded_at")?,
    })
}

fn bet_from_row(row: &SqliteRow) -> Result<Bet> {
    Ok(Bet {
        id: row.try_get("id")?,
        parlay_id: row.try_get("parlay_id")?,
        game_id: row.try_get("game_id")?,
        bet_type: parse_text(row, "bet_type")?,
        selection: parse_text(row, "selection")?,
        player_id: row.try_get("player_id")?,
        prop_type: parse_optional_text(row, "prop_type")?,
        price: row.try_get("price")?,
        justification: row.try_get("justification")?,
        status: parse_text(row, "status")?,
        created_at: parse_ts(row, "created_at")?,
        updated_at: parse_ts(row, "updated_at")?,
    })
}

fn parlay_from_row(row: &SqliteRow) -> Result<Parlay> {
    Ok(Parlay {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        stake: row.try_get("stake")?,
        total_price: row.try_get("total_price")?,
        potential_payout: row.try_get("potential_payout")?,
        status: parse_text(row, "status")?,
        created_at: parse_ts(row, "created_at")?,
        updated_at: parse_ts(row, "updated_at")?,
    })
}

fn article_from_row(row: &SqliteRow) -> Result<NewsArticle> {
    Ok(NewsArticle {
        id: row.try_get("id")?,
        external_id: row.try_get("external_id")?,
        source: row.try_get("source")?,
        title: row.try_get("title")?,
        url: row.try_get("url")?,
        content: row.try_get("content")?,
        summary: row.try_get("summary")?,
        published_at: parse_ts(row, "published_at")?,
        teams: Vec::new(),
        players: Vec::new(),
        created_at: parse_ts(row, "created_at")?,
        updated_at: parse_ts(row, "updated_at")?,
    })
}

fn analysis_from_row(row: &SqliteRow) -> Result<Analysis> {
    Ok(Analysis {
        id: row.try_get("id")?,
        kind: parse_text(row, "kind")?,
        subject_id: row.try_get("subject_id")?,
        content: row.try_get("content")?,
        confidence: row.try_get("confidence")?,
        model: row.try_get("model")?,
        created_at: parse_ts(row, "created_at")?,
    })
}

// Team operations
pub async fn insert_team(pool: &SqlitePool, team: &Team) -> Result<()> {
    sqlx::query(
        r#"
        INSERT OR REPLACE INTO teams
        (id, name, abbreviation, division, conference, logo_url, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&team.id)
    .bind(&team.name)
    .bind(&team.abbreviation)
    .bind(&team.division)
    .bind(&team.conference)
    .bind(&team.logo_url)
    .bind(ts(team.created_at))
    .bind(ts(team.updated_at))
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_team_by_id(pool: &SqlitePool, team_id: &str) -> Result<Option<Team>> {
    let row = sqlx::query("SELECT * FROM teams WHERE id = ?")
        .bind(team_id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(team_from_row).transpose()
}

pub async fn get_all_teams(pool: &SqlitePool) -> Result<Vec<Team>> {
    let rows = sqlx::query("SELECT * FROM teams ORDER BY conference, division, name")
        .fetch_all(pool)
        .await?;
    rows.iter().map(team_from_row).collect()
}

// Player operations
pub async fn insert_player(pool: &SqlitePool, player: &Player) -> Result<()> {
    sqlx::query(
        r#"
        INSERT OR REPLACE INTO players
        (id, name, position, jersey_number, team_id, is_injured, injury_details, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&player.id)
    .bind(&player.name)
    .bind(&player.position)
    .bind(player.jersey_number)
    .bind(&player.team_id)
    .bind(player.is_injured)
    .bind(&player.injury_details)
    .bind(ts(player.created_at))
    .bind(ts(player.updated_at))
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_player(pool: &SqlitePool, player_id: &str) -> Result<Option<Player>> {
    let row = sqlx::query("SELECT * FROM players WHERE id = ?")
        .bind(player_id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(player_from_row).transpose()
}

pub async fn get_all_players(pool: &SqlitePool) -> Result<Vec<Player>> {
    let rows = sqlx::query("SELECT * FROM players ORDER BY name")
        .fetch_all(pool)
        .await?;
    rows.iter().map(player_from_row).collect()
}

pub async fn get_players_by_team(pool: &SqlitePool, team_id: &str) -> Result<Vec<Player>> {
    let rows = sqlx::query("SELECT * FROM players WHERE team_id = ? ORDER BY name")
        .bind(team_id)
        .fetch_all(pool)
        .await?;
    rows.iter().map(player_from_row).collect()
}

// Game operations

const GAME_SELECT: &str = r#"
    SELECT g.*, h.name AS home_team_name, a.name AS away_team_name
    FROM games g
    JOIN teams h ON h.id = g.home_team_id
    JOIN teams a ON a.id = g.away_team_id
"#;

#[derive(Debug, Clone, Default)]
pub struct GameFilter {
    pub status: Option<GameStatus>,
    pub team_id: Option<String>,
    /// Games on this calendar day (UTC).
    pub date: Option<NaiveDate>,
    /// Otherwise, games between now and now + `days`.
    pub upcoming_days: Option<i64>,
}

pub async fn insert_game(pool: &SqlitePool, game: &Game) -> Result<()> {
    sqlx::query(
        r#"
        INSERT OR REPLACE INTO games
        (id, external_id, home_team_id, away_team_id, game_time, status,
         home_score, away_score, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&game.id)
    .bind(&game.external_id)
    .bind(&game.home_team_id)
    .bind(&game.away_team_id)
    .bind(ts(game.game_time))
    .bind(game.status.as_str())
    .bind(game.home_score)
    .bind(game.away_score)
    .bind(ts(game.created_at))
    .bind(ts(game.updated_at))
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_game(pool: &SqlitePool, request: &NewGame) -> Result<Game> {
    if request.home_team_id == request.away_team_id {
        return Err(BettingError::InvalidInput("a team cannot play itself".into()).into());
    }
    // A game only becomes finished through record_game_result, which sets both scores.
    if request.status == Some(GameStatus::Finished) {
        return Err(BettingError::InvalidInput(
            "a game cannot be created as finished; record its result instead".into(),
        )
        .into());
    }
    let home = get_team_by_id(pool, &request.home_team_id)
        .await?
        .ok_or_else(|| BettingError::not_found("team", request.home_team_id.clone()))?;
    let away = get_team_by_id(pool, &request.away_team_id)
        .await?
        .ok_or_else(|| BettingError::not_found("team", request.away_team_id.clone()))?;

    let now = Utc::now();
    let game = Game {
        id: Uuid::new_v4().to_string(),
        external_id: request.external_id.clone(),
        home_team_id: home.id,
        away_team_id: away.id,
        home_team_name: home.name,
        away_team_name: away.name,
        game_time: request.game_time,
        status: request.status.unwrap_or(GameStatus::Scheduled),
        home_score: None,
        away_score: None,
        created_at: now,
        updated_at: now,
    };
    insert_game(pool, &game).await?;
    Ok(game)
}

pub async fn get_game(pool: &SqlitePool, game_id: &str) -> Result<Option<Game>> {
    let row = sqlx::query(&format!("{GAME_SELECT} WHERE g.id = ?"))
        .bind(game_id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(game_from_row).transpose()
}

pub async fn get_game_by_external_id(pool: &SqlitePool, external_id: &str) -> Result<Option<Game>> {
    let row = sqlx::query(&format!("{GAME_SELECT} WHERE g.external_id = ?"))
        .bind(external_id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(game_from_row).transpose()
}

pub async fn get_games(pool: &SqlitePool, filter: &GameFilter) -> Result<Vec<Game>> {
    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(GAME_SELECT);
    query.push(" WHERE 1=1");

    if let Some(date) = filter.date {
        let start = date.and_time(NaiveTime::MIN).and_utc();
        query.push(" AND g.game_time >= ").push_bind(ts(start));
        query.push(" AND g.game_time < ").push_bind(ts(start + Duration::days(1)));
    } else if let Some(days) = filter.upcoming_days {
        let now = Utc::now();
        query.push(" AND g.game_time >= ").push_bind(ts(now));
        query.push(" AND g.game_time <= ").push_bind(ts(now + Duration::days(days)));
    }
    if let Some(team_id) = &filter.team_id {
        query
            .push(" AND (g.home_team_id = ")
            .push_bind(team_id.clone())
            .push(" OR g.away_team_id = ")
            .push_bind(team_id.clone())
            .push(")");
    }
    if let Some(status) = filter.status {
        query.push(" AND g.status = ").push_bind(status.as_str());
    }
    query.push(" ORDER BY g.game_time");

    let rows = query.build().fetch_all(pool).await?;
    rows.iter().map(game_from_row).collect()
}

pub async fn get_games_by_ids(pool: &SqlitePool, ids: &[String]) -> Result<Vec<Game>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(GAME_SELECT);
    query.push(" WHERE g.id IN (");
    let mut separated = query.separated(", ");
    for id in ids {
        separated.push_bind(id.clone());
    }
    separated.push_unseparated(")");

    let rows = query.build().fetch_all(pool).await?;
    rows.iter().map(game_from_row).collect()
}

pub async fn update_game_status(pool: &SqlitePool, game_id: &str, status: GameStatus) -> Result<()> {
    sqlx::query("UPDATE games SET status = ?, updated_at = ? WHERE id = ? AND status != 'finished'")
        .bind(status.as_str())
        .bind(ts(Utc::now()))
        .bind(game_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Mark a game finished with its final score. Scores are immutable once set;
/// re-recording the identical score is a no-op.
pub async fn record_game_result(pool: &SqlitePool, game_id: &str, result: &GameResult) -> Result<Game> {
    if result.home_score < 0 || result.away_score < 0 {
        return Err(BettingError::InvalidInput("scores cannot be negative".into()).into());
    }
    let game = get_game(pool, game_id)
        .await?
        .ok_or_else(|| BettingError::not_found("game", game_id))?;

    // Only the first writer of a complete final score wins.
    let affected = sqlx::query(
        r#"UPDATE games SET status = 'finished', home_score = ?, away_score = ?, updated_at = ?
           WHERE id = ? AND (status != 'finished' OR home_score IS NULL OR away_score IS NULL)"#,
    )
    .bind(result.home_score)
    .bind(result.away_score)
    .bind(ts(Utc::now()))
    .bind(game_id)
    .execute(pool)
    .await?
    .rows_affected();

    let current = get_game(pool, game_id)
        .await?
        .ok_or_else(|| BettingError::not_found("game", game_id))?;

    if affected == 0 {
        let recorded = (current.home_score, current.away_score);
        if recorded == (Some(result.home_score), Some(result.away_score)) {
            return Ok(current);
        }
        return Err(BettingError::InvalidInput(format!(
            "game {} already finished {}-{}; final scores are immutable",
            current.id,
            current.home_score.unwrap_or_default(),
            current.away_score.unwrap_or_default()
        ))
        .into());
    }

    tracing::info!(
        "Game {} final: {} {} - {} {}",
        game.id,
        game.home_team_name,
        result.home_score,
        result.away_score,
        game.away_team_name
    );
    Ok(current)
}

// Odds operations

pub async fn upsert_odds_quote(pool: &SqlitePool, input: &OddsQuoteInput) -> Result<OddsQuote> {
    if input.sportsbook.trim().is_empty() {
        return Err(BettingError::InvalidInput("sportsbook is required".into()).into());
    }
    if get_game(pool, &input.game_id).await?.is_none() {
        return Err(BettingError::not_found("game", input.game_id.clone()).into());
    }

    let now = ts(Utc::now());
    sqlx::query(
        r#"INSERT INTO odds (id, game_id, sportsbook, home_moneyline, away_moneyline, home_spread,
                             away_spread, home_spread_price, away_spread_price, total, over_price,
                             under_price, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
           ON CONFLICT(game_id, sportsbook) DO UPDATE SET
               home_moneyline    = excluded.home_moneyline,
               away_moneyline    = excluded.away_moneyline,
               home_spread       = excluded.home_spread,
               away_spread       = excluded.away_spread,
               home_spread_price = excluded.home_spread_price,
               away_spread_price = excluded.away_spread_price,
               total             = excluded.total,
               over_price        = excluded.over_price,
               under_price       = excluded.under_price,
               updated_at        = excluded.updated_at"#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&input.game_id)
    .bind(input.sportsbook.trim())
    .bind(input.home_moneyline)
    .bind(input.away_moneyline)
    .bind(input.home_spread)
    .bind(input.away_spread)
    .bind(input.home_spread_price)
    .bind(input.away_spread_price)
    .bind(input.total)
    .bind(input.over_price)
    .bind(input.under_price)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    let row = sqlx::query("SELECT * FROM odds WHERE game_id = ? AND sportsbook = ?")
        .bind(&input.game_id)
        .bind(input.sportsbook.trim())
        .fetch_one(pool)
        .await?;
    quote_from_row(&row)
}

pub async fn get_odds(
    pool: &SqlitePool,
    game_id: Option<&str>,
    sportsbook: Option<&str>,
) -> Result<Vec<OddsQuote>> {
    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM odds WHERE 1=1");
    if let Some(game_id) = game_id {
        query.push(" AND game_id = ").push_bind(game_id.to_string());
    }
    if let Some(book) = sportsbook {
        query.push(" AND sportsbook = ").push_bind(book.to_string());
    }
    query.push(" ORDER BY game_id, sportsbook");

    let rows = query.build().fetch_all(pool).await?;
    rows.iter().map(quote_from_row).collect()
}

pub async fn get_odds_for_game(
    pool: &SqlitePool,
    game_id: &str,
    sportsbook: Option<&str>,
) -> Result<Vec<OddsQuote>> {
    get_odds(pool, Some(game_id), sportsbook).await
}

// Player prop operations

#[derive(Debug, Clone, Default)]
pub struct PropFilter {
    pub game_id: Option<String>,
    pub player_id: Option<String>,
    pub prop_type: Option<PropCategory>,
    pub sportsbook: Option<String>,
}

/// Store a prop line under the (game, sportsbook) quote, creating an empty
/// quote row if the book has no game lines yet.
pub async fn upsert_player_prop(pool: &SqlitePool, input: &PlayerPropInput) -> Result<PlayerPropQuote> {
    if get_player(pool, &input.player_id).await?.is_none() {
        return Err(BettingError::not_found("player", input.player_id.clone()).into());
    }

    let existing = get_odds_for_game(pool, &input.game_id, Some(input.sportsbook.trim())).await?;
    let odds_id = match existing.into_iter().next() {
        Some(quote) => quote.id,
        None => {
            upsert_odds_quote(
                pool,
                &OddsQuoteInput {
                    game_id: input.game_id.clone(),
                    sportsbook: input.sportsbook.clone(),
                    ..Default::default()
                },
            )
            .await?
            .id
        }
    };

    let now = ts(Utc::now());
    sqlx::query(
        r#"INSERT INTO player_props (id, odds_id, player_id, prop_type, line, over_price, under_price,
                                     created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
           ON CONFLICT(odds_id, player_id, prop_type) DO UPDATE SET
               line        = excluded.line,
               over_price  = excluded.over_price,
               under_price = excluded.under_price,
               updated_at  = excluded.updated_at"#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&odds_id)
    .bind(&input.player_id)
    .bind(input.prop_type.as_str())
    .bind(input.line)
    .bind(input.over_price)
    .bind(input.under_price)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    let props = get_player_props(
        pool,
        &PropFilter {
            game_id: Some(input.game_id.clone()),
            player_id: Some(input.player_id.clone()),
            prop_type: Some(input.prop_type),
            sportsbook: Some(input.sportsbook.trim().to_string()),
        },
    )
    .await?;
    props
        .into_iter()
        .next()
        .ok_or_else(|| BettingError::DataIntegrity("player prop vanished after upsert".into()).into())
}

pub async fn get_player_props(pool: &SqlitePool, filter: &PropFilter) -> Result<Vec<PlayerPropQuote>> {
    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
        r#"SELECT pp.*, o.game_id AS game_id, o.sportsbook AS sportsbook
           FROM player_props pp
           JOIN odds o ON o.id = pp.odds_id
           WHERE 1=1"#,
    );
    if let Some(game_id) = &filter.game_id {
        query.push(" AND o.game_id = ").push_bind(game_id.clone());
    }
    if let Some(player_id) = &filter.player_id {
        query.push(" AND pp.player_id = ").push_bind(player_id.clone());
    }
    if let Some(prop_type) = filter.prop_type {
        query.push(" AND pp.prop_type = ").push_bind(prop_type.as_str());
    }
    if let Some(book) = &filter.sportsbook {
        query.push(" AND o.sportsbook = ").push_bind(book.clone());
    }
    query.push(" ORDER BY o.game_id, pp.player_id, pp.prop_type, o.sportsbook");

    let rows = query.build().fetch_all(pool).await?;
    rows.iter().map(prop_from_row).collect()
}

pub async fn get_player_prop(pool: &SqlitePool, prop_id: &str) -> Result<Option<PlayerPropQuote>> {
    let row = sqlx::query(
        r#"SELECT pp.*, o.game_id AS game_id, o.sportsbook AS sportsbook
           FROM player_props pp
           JOIN odds o ON o.id = pp.odds_id
           WHERE pp.id = ?"#,
    )
    .bind(prop_id)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(prop_from_row).transpose()
}

// Player stat operations

pub async fn upsert_player_stat(pool: &SqlitePool, input: &PlayerStatInput) -> Result<PlayerStat> {
    if !input.value.is_finite() || input.value < 0.0 {
        return Err(BettingError::InvalidInput(format!("invalid stat value {}", input.value)).into());
    }
    if get_game(pool, &input.game_id).await?.is_none() {
        return Err(BettingError::not_found("game", input.game_id.clone()).into());
    }
    if get_player(pool, &input.player_id).await?.is_none() {
        return Err(BettingError::not_found("player", input.player_id.clone()).into());
    }

    let recorded_at = Utc::now();
    sqlx::query(
        r#"INSERT INTO player_stats (game_id, player_id, prop_type, value, recorded_at)
           VALUES (?, ?, ?, ?, ?)
           ON CONFLICT(game_id, player_id, prop_type) DO UPDATE SET
               value       = excluded.value,
               recorded_at = excluded.recorded_at"#,
    )
    .bind(&input.game_id)
    .bind(&input.player_id)
    .bind(input.prop_type.as_str())
    .bind(input.value)
    .bind(ts(recorded_at))
    .execute(pool)
    .await?;

    Ok(PlayerStat {
        game_id: input.game_id.clone(),
        player_id: input.player_id.clone(),
        prop_type: input.prop_type,
        value: input.value,
        recorded_at,
    })
}

pub async fn get_player_stats_for_game(pool: &SqlitePool, game_id: &str) -> Result<Vec<PlayerStat>> {
    let rows = sqlx::query("SELECT * FROM player_stats WHERE game_id = ?")
        .bind(game_id)
        .fetch_all(pool)
        .await?;
    rows.iter().map(stat_from_row).collect()
}

// Parlay operations

pub async fn insert_parlay_with_legs(pool: &SqlitePool, parlay: &Parlay, legs: &[Bet]) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"INSERT INTO parlays (id, name, stake, total_price, potential_payout, status, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&parlay.id)
    .bind(&parlay.name)
    .bind(parlay.stake)
    .bind(parlay.total_price)
    .bind(parlay.potential_payout)
    .bind(parlay.status.as_str())
    .bind(ts(parlay.created_at))
    .bind(ts(parlay.updated_at))
    .execute(&mut *tx)
    .await?;

    for bet in legs {
        sqlx::query(
            r#"INSERT INTO bets (id, parlay_id, game_id, bet_type, selection, player_id, prop_type,
                                 price, justification, status, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&bet.id)
        .bind(&bet.parlay_id)
        .bind(&bet.game_id)
        .bind(bet.bet_type.as_str())
        .bind(bet.selection.as_str())
        .bind(&bet.player_id)
        .bind(bet.prop_type.map(|p| p.as_str()))
        .bind(bet.price)
        .bind(&bet.justification)
        .bind(bet.status.as_str())
        .bind(ts(bet.created_at))
        .bind(ts(bet.updated_at))
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

async fn get_legs(pool: &SqlitePool, parlay_id: &str) -> Result<Vec<Bet>> {
    let rows = sqlx::query("SELECT * FROM bets WHERE parlay_id = ? ORDER BY created_at, id")
        .bind(parlay_id)
        .fetch_all(pool)
        .await?;
    rows.iter().map(bet_from_row).collect()
}

pub async fn get_parlay(pool: &SqlitePool, parlay_id: &str) -> Result<Option<ParlayWithLegs>> {
    let row = sqlx::query("SELECT * FROM parlays WHERE id = ?")
        .bind(parlay_id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => {
            let parlay = parlay_from_row(&row)?;
            let legs = get_legs(pool, &parlay.id).await?;
            Ok(Some(ParlayWithLegs { parlay, legs }))
        }
        None => Ok(None),
    }
}

/// Newest first.
pub async fn get_parlays(
    pool: &SqlitePool,
    status: Option<ParlayStatus>,
    limit: Option<i64>,
) -> Result<Vec<ParlayWithLegs>> {
    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM parlays WHERE 1=1");
    if let Some(status) = status {
        query.push(" AND status = ").push_bind(status.as_str());
    }
    query.push(" ORDER BY created_at DESC, id");
    if let Some(limit) = limit {
        query.push(" LIMIT ").push_bind(limit);
    }

    let rows = query.build().fetch_all(pool).await?;
    let mut parlays = Vec::with_capacity(rows.len());
    for row in &rows {
        let parlay = parlay_from_row(row)?;
        let legs = get_legs(pool, &parlay.id).await?;
        parlays.push(ParlayWithLegs { parlay, legs });
    }
    Ok(parlays)
}

pub async fn update_parlay(pool: &SqlitePool, parlay: &Parlay) -> Result<()> {
    sqlx::query(
        r#"UPDATE parlays SET name = ?, stake = ?, potential_payout = ?, status = ?, updated_at = ?
           WHERE id = ?"#,
    )
    .bind(&parlay.name)
    .bind(parlay.stake)
    .bind(parlay.potential_payout)
    .bind(parlay.status.as_str())
    .bind(ts(parlay.updated_at))
    .bind(&parlay.id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Returns false when no such parlay exists.
pub async fn delete_parlay(pool: &SqlitePool, parlay_id: &str) -> Result<bool> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM bets WHERE parlay_id = ?")
        .bind(parlay_id)
        .execute(&mut *tx)
        .await?;
    let deleted = sqlx::query("DELETE FROM parlays WHERE id = ?")
        .bind(parlay_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    tx.commit().await?;
    Ok(deleted > 0)
}

/// Write settled leg statuses and, unless still pending, the parlay status.
/// The parlay write only applies while the row is still `pending`; returns
/// whether this call moved it out of `pending`.
pub async fn apply_settlement(
    pool: &SqlitePool,
    parlay_id: &str,
    leg_updates: &[(String, BetStatus)],
    parlay_status: ParlayStatus,
) -> Result<bool> {
    let now = ts(Utc::now());
    let mut tx = pool.begin().await?;

    let mut transitioned = false;
    if parlay_status != ParlayStatus::Pending {
        let affected = sqlx::query(
            "UPDATE parlays SET status = ?, updated_at = ? WHERE id = ? AND status = 'pending'",
        )
        .bind(parlay_status.as_str())
        .bind(&now)
        .bind(parlay_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if affected == 0 {
            tx.rollback().await?;
            return Ok(false);
        }
        transitioned = true;
    }

    for (bet_id, status) in leg_updates {
        // A parlay settled by someone else since the snapshot keeps its legs.
        let guard = if transitioned {
            ""
        } else {
            " AND EXISTS (SELECT 1 FROM parlays WHERE id = bets.parlay_id AND status = 'pending')"
        };
        sqlx::query(&format!(
            "UPDATE bets SET status = ?, updated_at = ? WHERE id = ? AND parlay_id = ?{guard}"
        ))
        .bind(status.as_str())
        .bind(&now)
        .bind(bet_id)
        .bind(parlay_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(transitioned)
}

// News operations

#[derive(Debug, Clone, Default)]
pub struct NewsFilter {
    pub team_id: Option<String>,
    pub player_id: Option<String>,
    pub source: Option<String>,
    /// Only articles published at or after this instant.
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

/// Insert or refresh an article keyed by URL and replace its team/player tags.
pub async fn upsert_news_article(
    pool: &SqlitePool,
    input: &NewsArticleInput,
    team_ids: &[String],
    player_ids: &[String],
) -> Result<NewsArticle> {
    let now = ts(Utc::now());
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"INSERT INTO news_articles (id, external_id, source, title, url, content, summary,
                                      published_at, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
           ON CONFLICT(url) DO UPDATE SET
               external_id  = COALESCE(excluded.external_id, news_articles.external_id),
               source       = excluded.source,
               title        = excluded.title,
               content      = excluded.content,
               summary      = excluded.summary,
               published_at = excluded.published_at,
               updated_at   = excluded.updated_at"#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&input.external_id)
    .bind(&input.source)
    .bind(&input.title)
    .bind(&input.url)
    .bind(&input.content)
    .bind(&input.summary)
    .bind(ts(input.published_at))
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    let article_id: String = sqlx::query_scalar("SELECT id FROM news_articles WHERE url = ?")
        .bind(&input.url)
        .fetch_one(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM news_article_teams WHERE article_id = ?")
        .bind(&article_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM news_article_players WHERE article_id = ?")
        .bind(&article_id)
        .execute(&mut *tx)
        .await?;
    for team_id in team_ids {
        sqlx::query("INSERT OR IGNORE INTO news_article_teams (article_id, team_id) VALUES (?, ?)")
            .bind(&article_id)
            .bind(team_id)
            .execute(&mut *tx)
            .await?;
    }
    for player_id in player_ids {
        sqlx::query("INSERT OR IGNORE INTO news_article_players (article_id, player_id) VALUES (?, ?)")
            .bind(&article_id)
            .bind(player_id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    get_news_article(pool, &article_id)
        .await?
        .ok_or_else(|| BettingError::DataIntegrity("news article vanished after upsert".into()).into())
}

async fn load_article_tags(pool: &SqlitePool, article: &mut NewsArticle) -> Result<()> {
    let teams = sqlx::query(
        r#"SELECT t.id, t.name FROM news_article_teams nt
           JOIN teams t ON t.id = nt.team_id
           WHERE nt.article_id = ? ORDER BY t.name"#,
    )
    .bind(&article.id)
    .fetch_all(pool)
    .await?;
    let players = sqlx::query(
        r#"SELECT p.id, p.name FROM news_article_players np
           JOIN players p ON p.id = np.player_id
           WHERE np.article_id = ? ORDER BY p.name"#,
    )
    .bind(&article.id)
    .fetch_all(pool)
    .await?;

    let entity = |row: &SqliteRow| -> Result<EntityRef> {
        Ok(EntityRef {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
        })
    };
    article.teams = teams.iter().map(entity).collect::<Result<_>>()?;
    article.players = players.iter().map(entity).collect::<Result<_>>()?;
    Ok(())
}

pub async fn get_news_article(pool: &SqlitePool, article_id: &str) -> Result<Option<NewsArticle>> {
    let row = sqlx::query("SELECT * FROM news_articles WHERE id = ?")
        .bind(article_id)
        .fetch_optional(pool)
        .await?;
    match row {
        Some(row) => {
            let mut article = article_from_row(&row)?;
            load_article_tags(pool, &mut article).await?;
            Ok(Some(article))
        }
        None => Ok(None),
    }
}

/// Newest first.
pub async fn get_news(pool: &SqlitePool, filter: &NewsFilter) -> Result<Vec<NewsArticle>> {
    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT n.* FROM news_articles n WHERE 1=1");
    if let Some(team_id) = &filter.team_id {
        query
            .push(" AND EXISTS (SELECT 1 FROM news_article_teams nt WHERE nt.article_id = n.id AND nt.team_id = ")
            .push_bind(team_id.clone())
            .push(")");
    }
    if let Some(player_id) = &filter.player_id {
        query
            .push(" AND EXISTS (SELECT 1 FROM news_article_players np WHERE np.article_id = n.id AND np.player_id = ")
            .push_bind(player_id.clone())
            .push(")");
    }
    if let Some(source) = &filter.source {
        query.push(" AND n.source = ").push_bind(source.clone());
    }
    if let Some(since) = filter.since {
        query.push(" AND n.published_at >= ").push_bind(ts(since));
    }
    query.push(" ORDER BY n.published_at DESC, n.id");
    if let Some(limit) = filter.limit {
        query.push(" LIMIT ").push_bind(limit);
    }

    let rows = query.build().fetch_all(pool).await?;
    let mut articles = Vec::with_capacity(rows.len());
    for row in &rows {
        let mut article = article_from_row(row)?;
        load_article_tags(pool, &mut article).await?;
        articles.push(article);
    }
    Ok(articles)
}

// Analysis cache

pub async fn insert_analysis(pool: &SqlitePool, analysis: &Analysis) -> Result<()> {
    sqlx::query(
        r#"INSERT INTO analyses (id, kind, subject_id, content, confidence, model, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&analysis.id)
    .bind(analysis.kind.as_str())
    .bind(&analysis.subject_id)
    .bind(&analysis.content)
    .bind(analysis.confidence)
    .bind(&analysis.model)
    .bind(ts(analysis.created_at))
    .execute(pool)
    .await?;
    Ok(())
}

/// Most recent analysis of the subject created at or after `since`.
pub async fn get_cached_analysis(
    pool: &SqlitePool,
    kind: AnalysisKind,
    subject_id: &str,
    since: DateTime<Utc>,
) -> Result<Option<Analysis>> {
    let row = sqlx::query(
        r#"SELECT * FROM analyses
           WHERE kind = ? AND subject_id = ? AND created_at >= ?
           ORDER BY created_at DESC, id DESC LIMIT 1"#,
    )
    .bind(kind.as_str())
    .bind(subject_id)
    .bind(ts(since))
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(analysis_from_row).transpose()
}
