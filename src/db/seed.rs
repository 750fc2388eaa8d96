use anyhow::Result;
use chrono::{DateTime, Duration, Timelike, Utc};
use sqlx::SqlitePool;

use super::{
    insert_game, insert_parlay_with_legs, insert_player, insert_team, upsert_news_article,
    upsert_odds_quote, upsert_player_prop, upsert_player_stat,
};
use crate::models::*;
use crate::utils::{parlay_decimal_price, round_cents};

pub async fn seed_data(pool: &SqlitePool) -> Result<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM teams")
        .fetch_one(pool)
        .await?;

    if count > 0 {
        tracing::info!("Database already seeded ({} teams found), skipping.", count);
        return Ok(());
    }

    tracing::info!("Seeding database with NHL sample data...");

    let now = Utc::now();
    // Whole hours keep the sample schedule readable.
    let base = now
        .with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now);

    seed_teams(pool, now).await?;
    seed_players(pool, now).await?;
    seed_games(pool, base, now).await?;
    seed_odds(pool).await?;
    seed_props_and_stats(pool).await?;
    seed_parlay(pool, now).await?;
    seed_news(pool, now).await?;

    tracing::info!("Database seeded successfully.");
    Ok(())
}

async fn seed_teams(pool: &SqlitePool, now: DateTime<Utc>) -> Result<()> {
    // (id, name, abbreviation, division, conference)
    let teams: Vec<(&str, &str, &str, &str, &str)> = vec![
        ("nhl_bos", "Boston Bruins",        "BOS", "Atlantic",     "Eastern"),
        ("nhl_tor", "Toronto Maple Leafs",  "TOR", "Atlantic",     "Eastern"),
        ("nhl_fla", "Florida Panthers",     "FLA", "Atlantic",     "Eastern"),
        ("nhl_nyr", "New York Rangers",     "NYR", "Metropolitan", "Eastern"),
        ("nhl_car", "Carolina Hurricanes",  "CAR", "Metropolitan", "Eastern"),
        ("nhl_col", "Colorado Avalanche",   "COL", "Central",      "Western"),
        ("nhl_dal", "Dallas Stars",         "DAL", "Central",      "Western"),
        ("nhl_edm", "Edmonton Oilers",      "EDM", "Pacific",      "Western"),
        ("nhl_vgk", "Vegas Golden Knights", "VGK", "Pacific",      "Western"),
        ("nhl_van", "Vancouver Canucks",    "VAN", "Pacific",      "Western"),
    ];

    for (id, name, abbr, division, conference) in &teams {
        let team = Team {
            id: id.to_string(),
            name: name.to_string(),
            abbreviation: abbr.to_string(),
            division: Some(division.to_string()),
            conference: Some(conference.to_string()),
            logo_url: None,
            created_at: now,
            updated_at: now,
        };
        insert_team(pool, &team).await?;
    }

    tracing::info!("Seeded {} teams", teams.len());
    Ok(())
}

async fn seed_players(pool: &SqlitePool, now: DateTime<Utc>) -> Result<()> {
    // (id, name, position, jersey, team_id, injury)
    let players: Vec<(&str, &str, &str, i32, &str, Option<&str>)> = vec![
        ("p_pastrnak",  "David Pastrnak",     "RW", 88, "nhl_bos", None),
        ("p_marchand",  "Brad Marchand",      "LW", 63, "nhl_bos", None),
        ("p_matthews",  "Auston Matthews",    "C",  34, "nhl_tor", None),
        ("p_marner",    "Mitch Marner",       "RW", 16, "nhl_tor", Some("Lower body, day-to-day")),
        ("p_tkachuk",   "Matthew Tkachuk",    "RW", 19, "nhl_fla", None),
        ("p_panarin",   "Artemi Panarin",     "LW", 10, "nhl_nyr", None),
        ("p_aho",       "Sebastian Aho",      "C",  20, "nhl_car", None),
        ("p_mackinnon", "Nathan MacKinnon",   "C",  29, "nhl_col", None),
        ("p_robertson", "Jason Robertson",    "LW", 21, "nhl_dal", None),
        ("p_mcdavid",   "Connor McDavid",     "C",  97, "nhl_edm", None),
        ("p_draisaitl", "Leon Draisaitl",     "C",  29, "nhl_edm", None),
        ("p_eichel",    "Jack Eichel",        "C",   9, "nhl_vgk", None),
        ("p_pettersson","Elias Pettersson",   "C",  40, "nhl_van", None),
    ];

    for (id, name, position, jersey, team_id, injury) in &players {
        let player = Player {
            id: id.to_string(),
            name: name.to_string(),
            position: position.to_string(),
            jersey_number: Some(*jersey),
            team_id: team_id.to_string(),
            is_injured: injury.is_some(),
            injury_details: injury.map(str::to_string),
            created_at: now,
            updated_at: now,
        };
        insert_player(pool, &player).await?;
    }

    tracing::info!("Seeded {} players", players.len());
    Ok(())
}

async fn seed_games(pool: &SqlitePool, base: DateTime<Utc>, now: DateTime<Utc>) -> Result<()> {
    // (id, home, away, hours from now, final score)
    let games: Vec<(&str, &str, &str, i64, Option<(i32, i32)>)> = vec![
        ("g_bos_tor", "nhl_bos", "nhl_tor", -48, Some((4, 2))),
        ("g_edm_van", "nhl_edm", "nhl_van", -44, Some((3, 2))),
        ("g_col_dal", "nhl_col", "nhl_dal", -24, Some((2, 5))),
        ("g_fla_nyr", "nhl_fla", "nhl_nyr", 20,  None),
        ("g_car_bos", "nhl_car", "nhl_bos", 24,  None),
        ("g_vgk_edm", "nhl_vgk", "nhl_edm", 26,  None),
        ("g_tor_col", "nhl_tor", "nhl_col", 48,  None),
        ("g_dal_fla", "nhl_dal", "nhl_fla", 72,  None),
    ];

    for (id, home, away, offset, score) in &games {
        let game = Game {
            id: id.to_string(),
            external_id: None,
            home_team_id: home.to_string(),
            away_team_id: away.to_string(),
            home_team_name: String::new(),
            away_team_name: String::new(),
            game_time: base + Duration::hours(*offset),
            status: if score.is_some() { GameStatus::Finished } else { GameStatus::Scheduled },
            home_score: score.map(|s| s.0),
            away_score: score.map(|s| s.1),
            created_at: now,
            updated_at: now,
        };
        insert_game(pool, &game).await?;
    }

    tracing::info!("Seeded {} games", games.len());
    Ok(())
}

async fn seed_odds(pool: &SqlitePool) -> Result<()> {
    // (game, book, home ml, away ml, home spread, home spread price, away spread price, total, over, under)
    let quotes: Vec<(&str, &str, f64, f64, f64, f64, f64, f64, f64, f64)> = vec![
        ("g_bos_tor", "DraftKings", -135.0, 115.0, -1.5, 185.0, -225.0, 6.5, -105.0, -115.0),
        ("g_bos_tor", "FanDuel",    -130.0, 110.0, -1.5, 190.0, -230.0, 6.5, -102.0, -118.0),
        ("g_edm_van", "DraftKings", -160.0, 135.0, -1.5, 160.0, -190.0, 6.5, -120.0, 100.0),
        ("g_col_dal", "DraftKings", -120.0, 100.0, -1.5, 200.0, -245.0, 6.0, -110.0, -110.0),
        ("g_fla_nyr", "DraftKings", -125.0, 105.0, -1.5, 195.0, -235.0, 5.5, -115.0, -105.0),
        ("g_fla_nyr", "FanDuel",    -122.0, 102.0, -1.5, 198.0, -240.0, 6.0, 110.0, -130.0),
        ("g_car_bos", "DraftKings", -110.0, -110.0, -1.5, 215.0, -260.0, 5.5, -105.0, -115.0),
        ("g_car_bos", "FanDuel",    -115.0, -105.0, -1.5, 210.0, -255.0, 5.5, -110.0, -110.0),
        ("g_vgk_edm", "DraftKings", 105.0, -125.0, 1.5, -230.0, 190.0, 6.5, -110.0, -110.0),
        ("g_vgk_edm", "FanDuel",    110.0, -130.0, 1.5, -225.0, 185.0, 6.5, -108.0, -112.0),
        ("g_tor_col", "DraftKings", 120.0, -140.0, 1.5, -200.0, 170.0, 6.5, -115.0, -105.0),
        ("g_dal_fla", "FanDuel",    -105.0, -115.0, 1.5, -250.0, 205.0, 5.5, -120.0, 100.0),
    ];

    for (game, book, hml, aml, hs, hsp, asp, total, over, under) in &quotes {
        upsert_odds_quote(
            pool,
            &OddsQuoteInput {
                game_id: game.to_string(),
                sportsbook: book.to_string(),
                home_moneyline: Some(*hml),
                away_moneyline: Some(*aml),
                home_spread: Some(*hs),
                away_spread: Some(-hs),
                home_spread_price: Some(*hsp),
                away_spread_price: Some(*asp),
                total: Some(*total),
                over_price: Some(*over),
                under_price: Some(*under),
            },
        )
        .await?;
    }

    tracing::info!("Seeded {} odds quotes", quotes.len());
    Ok(())
}

async fn seed_props_and_stats(pool: &SqlitePool) -> Result<()> {
    // (game, book, player, prop, line, over, under)
    let props: Vec<(&str, &str, &str, PropCategory, f64, f64, f64)> = vec![
        ("g_bos_tor", "DraftKings", "p_pastrnak",  PropCategory::ShotsOnGoal, 3.5, -120.0, 100.0),
        ("g_bos_tor", "DraftKings", "p_matthews",  PropCategory::Goals,       0.5, -110.0, -110.0),
        ("g_edm_van", "DraftKings", "p_mcdavid",   PropCategory::Points,      1.5, -105.0, -115.0),
        ("g_fla_nyr", "DraftKings", "p_tkachuk",   PropCategory::Points,      0.5, -180.0, 150.0),
        ("g_fla_nyr", "FanDuel",    "p_tkachuk",   PropCategory::Points,      0.5, -170.0, 140.0),
        ("g_vgk_edm", "DraftKings", "p_mcdavid",   PropCategory::Assists,     0.5, -200.0, 165.0),
        ("g_vgk_edm", "FanDuel",    "p_draisaitl", PropCategory::ShotsOnGoal, 3.5, 105.0, -125.0),
    ];

    for (game, book, player, prop_type, line, over, under) in &props {
        upsert_player_prop(
            pool,
            &PlayerPropInput {
                game_id: game.to_string(),
                sportsbook: book.to_string(),
                player_id: player.to_string(),
                prop_type: *prop_type,
                line: *line,
                over_price: Some(*over),
                under_price: Some(*under),
            },
        )
        .await?;
    }

    // Box-score figures for finished games.
    let stats: Vec<(&str, &str, PropCategory, f64)> = vec![
        ("g_bos_tor", "p_pastrnak", PropCategory::ShotsOnGoal, 5.0),
        ("g_bos_tor", "p_pastrnak", PropCategory::Goals,       2.0),
        ("g_bos_tor", "p_matthews", PropCategory::Goals,       1.0),
        ("g_bos_tor", "p_matthews", PropCategory::ShotsOnGoal, 4.0),
        ("g_edm_van", "p_mcdavid",  PropCategory::Points,      2.0),
        ("g_edm_van", "p_mcdavid",  PropCategory::Assists,     2.0),
    ];

    for (game, player, prop_type, value) in &stats {
        upsert_player_stat(
            pool,
            &PlayerStatInput {
                game_id: game.to_string(),
                player_id: player.to_string(),
                prop_type: *prop_type,
                value: *value,
            },
        )
        .await?;
    }

    tracing::info!("Seeded {} player props, {} player stats", props.len(), stats.len());
    Ok(())
}

async fn seed_parlay(pool: &SqlitePool, now: DateTime<Utc>) -> Result<()> {
    // (game, bet type, selection, player, prop, price)
    let legs: Vec<(&str, BetCategory, Selection, Option<&str>, Option<PropCategory>, f64)> = vec![
        ("g_bos_tor", BetCategory::Moneyline,  Selection::Home,  None, None, -130.0),
        ("g_bos_tor", BetCategory::PlayerProp, Selection::Over,  Some("p_pastrnak"), Some(PropCategory::ShotsOnGoal), -120.0),
        ("g_fla_nyr", BetCategory::OverUnder,  Selection::Over,  None, None, -115.0),
    ];

    let stake = 25.0;
    let prices: Vec<f64> = legs.iter().map(|l| l.5).collect();
    let total_price = parlay_decimal_price(&prices);
    let parlay = Parlay {
        id: "parlay_sample".to_string(),
        name: "Original Six plus Sunrise".to_string(),
        stake,
        total_price,
        potential_payout: round_cents(stake * total_price),
        status: ParlayStatus::Pending,
        created_at: now,
        updated_at: now,
    };

    let bets: Vec<Bet> = legs
        .iter()
        .enumerate()
        .map(|(i, (game, bet_type, selection, player, prop, price))| Bet {
            id: format!("parlay_sample_leg_{}", i + 1),
            parlay_id: parlay.id.clone(),
            game_id: game.to_string(),
            bet_type: *bet_type,
            selection: *selection,
            player_id: player.map(str::to_string),
            prop_type: *prop,
            price: *price,
            justification: None,
            status: BetStatus::Pending,
            created_at: now,
            updated_at: now,
        })
        .collect();

    insert_parlay_with_legs(pool, &parlay, &bets).await?;
    tracing::info!("Seeded sample parlay with {} legs", bets.len());
    Ok(())
}

async fn seed_news(pool: &SqlitePool, now: DateTime<Utc>) -> Result<()> {
    // (slug, hours ago, title, content, teams, players)
    let articles: Vec<(&str, i64, &str, &str, &[&str], &[&str])> = vec![
        (
            "marner-day-to-day", 3,
            "Marner day-to-day ahead of Bruins visit",
            "Mitch Marner skipped the morning skate with a lower-body issue. The Maple Leafs list him as day-to-day before hosting Boston.",
            &["nhl_tor", "nhl_bos"][..], &["p_marner"][..],
        ),
        (
            "pastrnak-shot-volume", 8,
            "Pastrnak leads the league in shot attempts",
            "David Pastrnak has put at least four shots on goal in six straight games for the Bruins.",
            &["nhl_bos"][..], &["p_pastrnak"][..],
        ),
        (
            "oilers-power-play", 20,
            "Oilers power play clicking again",
            "Connor McDavid and Leon Draisaitl combined for five power-play points as Edmonton won its third straight.",
            &["nhl_edm"][..], &["p_mcdavid", "p_draisaitl"][..],
        ),
    ];

    for (slug, hours_ago, title, content, teams, players) in &articles {
        let input = NewsArticleInput {
            external_id: Some(format!("sample_{slug}")),
            source: "ParlayDesk Wire".to_string(),
            title: title.to_string(),
            url: format!("https://news.example.com/{slug}"),
            content: content.to_string(),
            summary: None,
            published_at: now - Duration::hours(*hours_ago),
        };
        let team_ids: Vec<String> = teams.iter().map(|t| t.to_string()).collect();
        let player_ids: Vec<String> = players.iter().map(|p| p.to_string()).collect();
        upsert_news_article(pool, &input, &team_ids, &player_ids).await?;
    }

    tracing::info!("Seeded {} news articles", articles.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::memory_pool;
    use crate::db::{get_all_teams, get_games, get_news, get_parlays, GameFilter, NewsFilter};

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let pool = memory_pool().await;
        seed_data(&pool).await.unwrap();
        seed_data(&pool).await.unwrap();

        assert_eq!(get_all_teams(&pool).await.unwrap().len(), 10);
        let finished = get_games(&pool, &GameFilter {
            status: Some(GameStatus::Finished),
            ..Default::default()
        })
        .await
        .unwrap();
        assert_eq!(finished.len(), 3);
        assert!(finished.iter().all(|g| g.final_score().unwrap().is_some()));

        let parlays = get_parlays(&pool, None, None).await.unwrap();
        assert_eq!(parlays.len(), 1);
        assert_eq!(parlays[0].legs.len(), 3);

        let boston = get_news(&pool, &NewsFilter {
            team_id: Some("nhl_bos".into()),
            ..Default::default()
        })
        .await
        .unwrap();
        assert_eq!(boston.len(), 2);
        assert_eq!(boston[0].title, "Marner day-to-day ahead of Bruins visit");
    }
}
