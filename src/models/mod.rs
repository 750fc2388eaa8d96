use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::BettingError;

/// Declares a snake_case string enum that round-trips through the TEXT columns
/// of the store as well as through serde.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = BettingError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(BettingError::InvalidInput(format!(
                        "unknown {} '{}'",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}

text_enum!(GameStatus {
    Scheduled => "scheduled",
    InProgress => "in_progress",
    Finished => "finished",
    Postponed => "postponed",
});

text_enum!(BetCategory {
    Moneyline => "moneyline",
    Spread => "spread",
    OverUnder => "over_under",
    PlayerProp => "player_prop",
});

text_enum!(Selection {
    Home => "home",
    Away => "away",
    Over => "over",
    Under => "under",
});

text_enum!(PropCategory {
    Points => "points",
    Goals => "goals",
    Assists => "assists",
    ShotsOnGoal => "shots_on_goal",
});

text_enum!(
    /// Leg state machine: `pending -> {won, lost, push}`.
    BetStatus {
        Pending => "pending",
        Won => "won",
        Lost => "lost",
        Push => "push",
    }
);

text_enum!(ParlayStatus {
    Pending => "pending",
    Won => "won",
    Lost => "lost",
    PartiallyWon => "partially_won",
});

text_enum!(
    /// What an LLM analysis is about; the subject id points into that table.
    AnalysisKind {
        Game => "game",
        Team => "team",
        Parlay => "parlay",
    }
);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub name: String,
    pub abbreviation: String,
    pub division: Option<String>,
    pub conference: Option<String>,
    pub logo_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: String,
    pub name: String,
    pub position: String,
    pub jersey_number: Option<i32>,
    pub team_id: String,
    pub is_injured: bool,
    pub injury_details: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    pub id: String,
    pub external_id: Option<String>,
    pub home_team_id: String,
    pub away_team_id: String,
    pub home_team_name: String,
    pub away_team_name: String,
    pub game_time: DateTime<Utc>,
    pub status: GameStatus,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Final score of a finished game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FinalScore {
    pub home: i32,
    pub away: i32,
}

impl FinalScore {
    pub fn total(&self) -> i32 {
        self.home + self.away
    }
}

impl Game {
    /// `Ok(None)` while the game is not finished. A finished game without both
    /// scores is an upstream data problem, not an indeterminate state.
    pub fn final_score(&self) -> Result<Option<FinalScore>, BettingError> {
        if self.status != GameStatus::Finished {
            return Ok(None);
        }
        match (self.home_score, self.away_score) {
            (Some(home), Some(away)) => Ok(Some(FinalScore { home, away })),
            _ => Err(BettingError::DataIntegrity(format!(
                "game {} is finished but has no final score",
                self.id
            ))),
        }
    }
}

/// One sportsbook's lines for one game. Any field may be absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OddsQuote {
    pub id: String,
    pub game_id: String,
    pub sportsbook: String,
    pub home_moneyline: Option<f64>,
    pub away_moneyline: Option<f64>,
    pub home_spread: Option<f64>,
    pub away_spread: Option<f64>,
    pub home_spread_price: Option<f64>,
    pub away_spread_price: Option<f64>,
    pub total: Option<f64>,
    pub over_price: Option<f64>,
    pub under_price: Option<f64>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerPropQuote {
    pub id: String,
    pub odds_id: String,
    pub game_id: String,
    pub sportsbook: String,
    pub player_id: String,
    pub prop_type: PropCategory,
    pub line: f64,
    pub over_price: Option<f64>,
    pub under_price: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

/// A player's actual statistic for one game, supplied by an external feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerStat {
    pub game_id: String,
    pub player_id: String,
    pub prop_type: PropCategory,
    pub value: f64,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Home,
    Away,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Pick {
    Over,
    Under,
}

/// A leg's category and selection, validated so that only meaningful
/// combinations exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Wager {
    Moneyline { side: Side },
    Spread { side: Side },
    Total { pick: Pick },
    PlayerProp {
        player_id: String,
        prop_type: PropCategory,
        pick: Pick,
    },
}

impl Wager {
    pub fn from_parts(
        bet_type: BetCategory,
        selection: Selection,
        player_id: Option<&str>,
        prop_type: Option<PropCategory>,
    ) -> Result<Self, BettingError> {
        let side = || match selection {
            Selection::Home => Ok(Side::Home),
            Selection::Away => Ok(Side::Away),
            other => Err(BettingError::InvalidBetShape(format!(
                "{} bets take home/away, got '{}'",
                bet_type, other
            ))),
        };
        let pick = || match selection {
            Selection::Over => Ok(Pick::Over),
            Selection::Under => Ok(Pick::Under),
            other => Err(BettingError::InvalidBetShape(format!(
                "{} bets take over/under, got '{}'",
                bet_type, other
            ))),
        };

        match bet_type {
            BetCategory::Moneyline => Ok(Wager::Moneyline { side: side()? }),
            BetCategory::Spread => Ok(Wager::Spread { side: side()? }),
            BetCategory::OverUnder => Ok(Wager::Total { pick: pick()? }),
            BetCategory::PlayerProp => {
                let player_id = player_id.filter(|p| !p.trim().is_empty()).ok_or_else(|| {
                    BettingError::InvalidBetShape("player_prop bets require a player_id".into())
                })?;
                let prop_type = prop_type.ok_or_else(|| {
                    BettingError::InvalidBetShape("player_prop bets require a prop_type".into())
                })?;
                Ok(Wager::PlayerProp {
                    player_id: player_id.to_string(),
                    prop_type,
                    pick: pick()?,
                })
            }
        }
    }
}

/// A parlay leg.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bet {
    pub id: String,
    pub parlay_id: String,
    pub game_id: String,
    pub bet_type: BetCategory,
    pub selection: Selection,
    pub player_id: Option<String>,
    pub prop_type: Option<PropCategory>,
    pub price: f64,
    pub justification: Option<String>,
    pub status: BetStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Bet {
    pub fn wager(&self) -> Result<Wager, BettingError> {
        Wager::from_parts(
            self.bet_type,
            self.selection,
            self.player_id.as_deref(),
            self.prop_type,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parlay {
    pub id: String,
    pub name: String,
    pub stake: f64,
    pub total_price: f64,
    pub potential_payout: f64,
    pub status: ParlayStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParlayWithLegs {
    #[serde(flatten)]
    pub parlay: Parlay,
    pub legs: Vec<Bet>,
}

// News and analysis

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: String,
    pub name: String,
}

/// A stored news article with the teams and players it mentions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsArticle {
    pub id: String,
    pub external_id: Option<String>,
    pub source: String,
    pub title: String,
    pub url: String,
    pub content: String,
    pub summary: Option<String>,
    pub published_at: DateTime<Utc>,
    pub teams: Vec<EntityRef>,
    pub players: Vec<EntityRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub id: String,
    pub kind: AnalysisKind,
    pub subject_id: String,
    pub content: String,
    /// 0.0-1.0, as stated by the model; absent when it gave none.
    pub confidence: Option<f64>,
    pub model: String,
    pub created_at: DateTime<Utc>,
}

// Best-price selection

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestPrice {
    pub price: f64,
    pub line: Option<f64>,
    pub sportsbook: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BestOdds {
    pub game_id: String,
    pub home_moneyline: Option<BestPrice>,
    pub away_moneyline: Option<BestPrice>,
    pub home_spread: Option<BestPrice>,
    pub away_spread: Option<BestPrice>,
    pub over: Option<BestPrice>,
    pub under: Option<BestPrice>,
}

// Request payloads

#[derive(Debug, Clone, Deserialize)]
pub struct NewGame {
    pub external_id: Option<String>,
    pub home_team_id: String,
    pub away_team_id: String,
    pub game_time: DateTime<Utc>,
    pub status: Option<GameStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GameResult {
    pub home_score: i32,
    pub away_score: i32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OddsQuoteInput {
    pub game_id: String,
    pub sportsbook: String,
    pub home_moneyline: Option<f64>,
    pub away_moneyline: Option<f64>,
    pub home_spread: Option<f64>,
    pub away_spread: Option<f64>,
    pub home_spread_price: Option<f64>,
    pub away_spread_price: Option<f64>,
    pub total: Option<f64>,
    pub over_price: Option<f64>,
    pub under_price: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlayerPropInput {
    pub game_id: String,
    pub sportsbook: String,
    pub player_id: String,
    pub prop_type: PropCategory,
    pub line: f64,
    pub over_price: Option<f64>,
    pub under_price: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlayerStatInput {
    pub game_id: String,
    pub player_id: String,
    pub prop_type: PropCategory,
    pub value: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewLeg {
    pub game_id: String,
    pub bet_type: BetCategory,
    pub selection: Selection,
    pub player_id: Option<String>,
    pub prop_type: Option<PropCategory>,
    /// American price. When absent: the best moneyline across books, or the
    /// reference book's price for spread, total and prop legs.
    pub price: Option<f64>,
    pub justification: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewParlay {
    pub name: Option<String>,
    pub stake: f64,
    pub legs: Vec<NewLeg>,
}

/// An article as delivered by a feed or posted by hand. Articles are keyed by URL.
#[derive(Debug, Clone, Deserialize)]
pub struct NewsArticleInput {
    pub external_id: Option<String>,
    pub source: String,
    pub title: String,
    pub url: String,
    pub content: String,
    pub summary: Option<String>,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ParlayUpdate {
    pub name: Option<String>,
    pub stake: Option<f64>,
    pub status: Option<ParlayStatus>,
}

// API Response types
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn game(status: GameStatus, home: Option<i32>, away: Option<i32>) -> Game {
        Game {
            id: "g1".into(),
            external_id: None,
            home_team_id: "h".into(),
            away_team_id: "a".into(),
            home_team_name: "Home".into(),
            away_team_name: "Away".into(),
            game_time: Utc::now(),
            status,
            home_score: home,
            away_score: away,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_text_enums_round_trip_through_strings() {
        assert_eq!("partially_won".parse::<ParlayStatus>().unwrap(), ParlayStatus::PartiallyWon);
        assert_eq!(PropCategory::ShotsOnGoal.as_str(), "shots_on_goal");
        assert_eq!(GameStatus::InProgress.to_string(), "in_progress");
        assert!("draw".parse::<BetStatus>().is_err());
    }

    #[test]
    fn test_final_score_only_for_finished_games() {
        assert_eq!(game(GameStatus::InProgress, Some(1), Some(0)).final_score().unwrap(), None);
        assert_eq!(
            game(GameStatus::Finished, Some(4), Some(2)).final_score().unwrap(),
            Some(FinalScore { home: 4, away: 2 })
        );
        let err = game(GameStatus::Finished, Some(4), None).final_score().unwrap_err();
        assert!(matches!(err, BettingError::DataIntegrity(_)));
    }

    #[test]
    fn test_wager_rejects_mismatched_selection() {
        let err = Wager::from_parts(BetCategory::Moneyline, Selection::Over, None, None).unwrap_err();
        assert!(matches!(err, BettingError::InvalidBetShape(_)));

        let err = Wager::from_parts(BetCategory::OverUnder, Selection::Home, None, None).unwrap_err();
        assert!(matches!(err, BettingError::InvalidBetShape(_)));
    }

    #[test]
    fn test_prop_wager_requires_player_and_category() {
        let missing_player =
            Wager::from_parts(BetCategory::PlayerProp, Selection::Over, None, Some(PropCategory::Goals));
        assert!(matches!(missing_player, Err(BettingError::InvalidBetShape(_))));

        let missing_prop = Wager::from_parts(BetCategory::PlayerProp, Selection::Over, Some("p1"), None);
        assert!(matches!(missing_prop, Err(BettingError::InvalidBetShape(_))));

        let ok = Wager::from_parts(
            BetCategory::PlayerProp,
            Selection::Under,
            Some("p1"),
            Some(PropCategory::Points),
        )
        .unwrap();
        assert_eq!(
            ok,
            Wager::PlayerProp {
                player_id: "p1".into(),
                prop_type: PropCategory::Points,
                pick: Pick::Under,
            }
        );
    }
}
