//! Leg settlement against final scores.
//!
//! The evaluator is a pure function of a [`MarketSnapshot`]: the finished
//! games, the reference sportsbook's quotes and props, and any player stat
//! outcomes supplied by the stat feed. Whatever is missing from the snapshot
//! leaves a leg `pending`; only malformed data is an error.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::error::BettingError;
use crate::models::{
    Bet, BetStatus, FinalScore, Game, OddsQuote, Pick, PlayerPropQuote, PlayerStat, PropCategory, Side,
    Wager,
};

type PropKey = (String, String, PropCategory);

fn prop_key(game_id: &str, player_id: &str, prop_type: PropCategory) -> PropKey {
    (game_id.to_string(), player_id.to_string(), prop_type)
}

/// Materialized inputs for one settlement pass.
#[derive(Debug, Default, Clone)]
pub struct MarketSnapshot {
    games: HashMap<String, Game>,
    reference_quotes: HashMap<String, OddsQuote>,
    reference_props: HashMap<PropKey, PlayerPropQuote>,
    player_stats: HashMap<PropKey, f64>,
}

impl MarketSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_game(&mut self, game: Game) {
        self.games.insert(game.id.clone(), game);
    }

    /// Register the reference sportsbook's quote for its game.
    pub fn insert_reference_quote(&mut self, quote: OddsQuote) {
        self.reference_quotes.insert(quote.game_id.clone(), quote);
    }

    pub fn insert_reference_prop(&mut self, prop: PlayerPropQuote) {
        let key = prop_key(&prop.game_id, &prop.player_id, prop.prop_type);
        self.reference_props.insert(key, prop);
    }

    pub fn insert_player_stat(&mut self, stat: PlayerStat) {
        let key = prop_key(&stat.game_id, &stat.player_id, stat.prop_type);
        self.player_stats.insert(key, stat.value);
    }

    pub fn game(&self, game_id: &str) -> Option<&Game> {
        self.games.get(game_id)
    }
}

/// Resolve one leg. Idempotent for identical snapshots.
pub fn settle_bet(bet: &Bet, snapshot: &MarketSnapshot) -> Result<BetStatus, BettingError> {
    let game = snapshot
        .game(&bet.game_id)
        .ok_or_else(|| BettingError::not_found("game", bet.game_id.clone()))?;

    let wager = bet.wager().map_err(|e| {
        BettingError::DataIntegrity(format!("stored bet {} is malformed: {}", bet.id, e))
    })?;

    settle_wager(&wager, game, snapshot)
}

/// Resolve a validated wager on `game`.
pub fn settle_wager(
    wager: &Wager,
    game: &Game,
    snapshot: &MarketSnapshot,
) -> Result<BetStatus, BettingError> {
    let Some(score) = game.final_score()? else {
        return Ok(BetStatus::Pending);
    };

    let status = match wager {
        Wager::Moneyline { side } => settle_moneyline(*side, score),
        Wager::Spread { side } => {
            let spread = snapshot.reference_quotes.get(&game.id).and_then(|q| match side {
                Side::Home => q.home_spread,
                Side::Away => q.away_spread,
            });
            match spread {
                Some(spread) => settle_spread(*side, spread, score),
                None => BetStatus::Pending,
            }
        }
        Wager::Total { pick } => {
            let total = snapshot.reference_quotes.get(&game.id).and_then(|q| q.total);
            match total {
                Some(line) => settle_over_under(*pick, score.total() as f64, line),
                None => BetStatus::Pending,
            }
        }
        Wager::PlayerProp {
            player_id,
            prop_type,
            pick,
        } => {
            let key = prop_key(&game.id, player_id, *prop_type);
            let line = snapshot.reference_props.get(&key).map(|p| p.line);
            let actual = snapshot.player_stats.get(&key).copied();
            match (line, actual) {
                (Some(line), Some(actual)) => settle_over_under(*pick, actual, line),
                _ => BetStatus::Pending,
            }
        }
    };

    Ok(status)
}

/// Ties are not represented for this sport, so a level score loses for both sides.
pub fn settle_moneyline(side: Side, score: FinalScore) -> BetStatus {
    let (mine, theirs) = match side {
        Side::Home => (score.home, score.away),
        Side::Away => (score.away, score.home),
    };
    if mine > theirs {
        BetStatus::Won
    } else {
        BetStatus::Lost
    }
}

/// Add the signed spread to the selected side and compare with the opponent.
pub fn settle_spread(side: Side, spread: f64, score: FinalScore) -> BetStatus {
    let (mine, theirs) = match side {
        Side::Home => (score.home, score.away),
        Side::Away => (score.away, score.home),
    };
    let adjusted = mine as f64 + spread;
    from_ordering(adjusted.partial_cmp(&(theirs as f64)))
}

/// Shared by game totals and player props.
pub fn settle_over_under(pick: Pick, actual: f64, line: f64) -> BetStatus {
    let ordering = actual.partial_cmp(&line);
    match pick {
        Pick::Over => from_ordering(ordering),
        Pick::Under => from_ordering(ordering.map(Ordering::reverse)),
    }
}

fn from_ordering(ordering: Option<Ordering>) -> BetStatus {
    match ordering {
        Some(Ordering::Greater) => BetStatus::Won,
        Some(Ordering::Less) => BetStatus::Lost,
        Some(Ordering::Equal) => BetStatus::Push,
        // NaN lines never settle
        None => BetStatus::Pending,
    }
}
