use anyhow::Result;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::{
    delete_parlay, get_game, get_odds_for_game, get_parlay, get_player, get_player_props,
    insert_parlay_with_legs, update_parlay, PropFilter,
};
use crate::error::BettingError;
use crate::models::{
    Bet, BetStatus, NewLeg, NewParlay, Parlay, ParlayStatus, ParlayUpdate, ParlayWithLegs, Wager,
};
use crate::services::odds_selector::{best_for_wager, select_best_odds, select_best_prop};
use crate::utils::parlay_decimal_price;

const DEFAULT_PARLAY_NAME: &str = "Custom Parlay";

/// Fold leg outcomes into the parlay outcome.
///
/// `pending` while any leg is pending, then `lost` if any leg lost, `won` if
/// every leg won, otherwise `partially_won` (all legs won or pushed, at
/// least one push).
pub fn aggregate_status(legs: &[BetStatus]) -> ParlayStatus {
    if legs.is_empty() || legs.contains(&BetStatus::Pending) {
        return ParlayStatus::Pending;
    }
    if legs.contains(&BetStatus::Lost) {
        return ParlayStatus::Lost;
    }
    if legs.iter().all(|s| *s == BetStatus::Won) {
        ParlayStatus::Won
    } else {
        ParlayStatus::PartiallyWon
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParlayPricing {
    /// Product of leg decimal multipliers.
    pub total_price: f64,
    pub potential_payout: f64,
}

pub fn price_parlay(stake: f64, leg_prices: &[f64]) -> Result<ParlayPricing, BettingError> {
    validate_stake(stake)?;
    if leg_prices.is_empty() {
        return Err(BettingError::InvalidInput("a parlay needs at least one leg".into()));
    }
    let total_price = parlay_decimal_price(leg_prices);
    Ok(ParlayPricing {
        total_price,
        potential_payout: stake * total_price,
    })
}

fn validate_stake(stake: f64) -> Result<(), BettingError> {
    if !stake.is_finite() || stake <= 0.0 {
        return Err(BettingError::InvalidInput(format!("stake must be positive, got {stake}")));
    }
    Ok(())
}

fn validate_price(price: f64) -> Result<(), BettingError> {
    if !price.is_finite() || price.abs() < 100.0 {
        return Err(BettingError::InvalidInput(format!(
            "price {price} is not a valid American price"
        )));
    }
    Ok(())
}

/// Parlay creation and editing on top of the store. Legs whose settlement
/// depends on a line are priced from the reference book, the same book whose
/// line settles them.
#[derive(Debug, Clone)]
pub struct ParlayService {
    reference_book: String,
}

impl ParlayService {
    pub fn new(reference_book: impl Into<String>) -> Self {
        Self {
            reference_book: reference_book.into(),
        }
    }

    /// Validate and price every leg, then store the parlay and its legs in
    /// one transaction.
    pub async fn create_parlay(&self, pool: &SqlitePool, request: NewParlay) -> Result<ParlayWithLegs> {
        validate_stake(request.stake)?;
        if request.legs.is_empty() {
            return Err(BettingError::InvalidInput("a parlay needs at least one leg".into()).into());
        }

        tracing::info!("Creating parlay with {} legs", request.legs.len());

        let parlay_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let mut legs = Vec::with_capacity(request.legs.len());

        for leg in &request.legs {
            let wager = Wager::from_parts(
                leg.bet_type,
                leg.selection,
                leg.player_id.as_deref(),
                leg.prop_type,
            )?;

            if get_game(pool, &leg.game_id).await?.is_none() {
                return Err(BettingError::not_found("game", leg.game_id.clone()).into());
            }
            if let Wager::PlayerProp { player_id, .. } = &wager {
                if get_player(pool, player_id).await?.is_none() {
                    return Err(BettingError::not_found("player", player_id.clone()).into());
                }
            }

            let price = match leg.price {
                Some(price) => price,
                None => self.lookup_price(pool, leg, &wager).await?,
            };
            validate_price(price)?;

            let (player_id, prop_type) = match &wager {
                Wager::PlayerProp { player_id, prop_type, .. } => (Some(player_id.clone()), Some(*prop_type)),
                _ => (None, None),
            };

            legs.push(Bet {
                id: Uuid::new_v4().to_string(),
                parlay_id: parlay_id.clone(),
                game_id: leg.game_id.clone(),
                bet_type: leg.bet_type,
                selection: leg.selection,
                player_id,
                prop_type,
                price,
                justification: Some(
                    leg.justification.clone().unwrap_or_else(|| "User selection".to_string()),
                ),
                status: BetStatus::Pending,
                created_at: now,
                updated_at: now,
            });
        }

        let prices: Vec<f64> = legs.iter().map(|b| b.price).collect();
        let pricing = price_parlay(request.stake, &prices)?;

        let parlay = Parlay {
            id: parlay_id,
            name: request
                .name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_PARLAY_NAME.to_string()),
            stake: request.stake,
            total_price: pricing.total_price,
            potential_payout: pricing.potential_payout,
            status: ParlayStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        insert_parlay_with_legs(pool, &parlay, &legs).await?;
        tracing::info!(
            "Created parlay {} ({} legs, x{:.2}, payout {:.2})",
            parlay.id,
            legs.len(),
            parlay.total_price,
            parlay.potential_payout
        );

        Ok(ParlayWithLegs { parlay, legs })
    }

    /// Price for a leg submitted without one: the best moneyline across all
    /// books, otherwise the reference book's price for its line.
    async fn lookup_price(&self, pool: &SqlitePool, leg: &NewLeg, wager: &Wager) -> Result<f64> {
        let best = match wager {
            Wager::PlayerProp { player_id, prop_type, pick } => {
                let props = get_player_props(
                    pool,
                    &PropFilter {
                        game_id: Some(leg.game_id.clone()),
                        player_id: Some(player_id.clone()),
                        prop_type: Some(*prop_type),
                        sportsbook: Some(self.reference_book.clone()),
                    },
                )
                .await?;
                select_best_prop(&props, *pick)
            }
            Wager::Moneyline { .. } => {
                let quotes = get_odds_for_game(pool, &leg.game_id, None).await?;
                let best = select_best_odds(&leg.game_id, &quotes);
                best_for_wager(&best, wager).cloned()
            }
            Wager::Spread { .. } | Wager::Total { .. } => {
                let quotes = get_odds_for_game(pool, &leg.game_id, Some(&self.reference_book)).await?;
                let best = select_best_odds(&leg.game_id, &quotes);
                best_for_wager(&best, wager).cloned()
            }
        };

        best.map(|b| b.price).ok_or_else(|| {
            let book = match wager {
                Wager::Moneyline { .. } => "any book".to_string(),
                _ => self.reference_book.clone(),
            };
            BettingError::NoPrice(format!(
                "{} {} on game {} at {}",
                leg.bet_type, leg.selection, leg.game_id, book
            ))
            .into()
        })
    }

    /// Edit name/stake (pending parlays only) or set the status explicitly.
    pub async fn update_parlay(
        &self,
        pool: &SqlitePool,
        parlay_id: &str,
        update: ParlayUpdate,
    ) -> Result<ParlayWithLegs> {
        let ParlayWithLegs { mut parlay, legs } = get_parlay(pool, parlay_id)
            .await?
            .ok_or_else(|| BettingError::not_found("parlay", parlay_id))?;

        if (update.name.is_some() || update.stake.is_some()) && parlay.status != ParlayStatus::Pending {
            return Err(BettingError::InvalidInput(format!(
                "parlay {} is already {}; only pending parlays can be edited",
                parlay.id, parlay.status
            ))
            .into());
        }

        if let Some(name) = update.name {
            parlay.name = name;
        }
        if let Some(stake) = update.stake {
            validate_stake(stake)?;
            parlay.stake = stake;
            parlay.potential_payout = stake * parlay.total_price;
        }
        if let Some(status) = update.status {
            tracing::info!("Parlay {} status set explicitly: {} -> {}", parlay.id, parlay.status, status);
            parlay.status = status;
        }
        parlay.updated_at = Utc::now();

        update_parlay(pool, &parlay).await?;
        Ok(ParlayWithLegs { parlay, legs })
    }

    pub async fn delete_parlay(&self, pool: &SqlitePool, parlay_id: &str) -> Result<()> {
        if !delete_parlay(pool, parlay_id).await? {
            return Err(BettingError::not_found("parlay", parlay_id).into());
        }
        tracing::info!("Deleted parlay {}", parlay_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{memory_pool, seed_game, seed_player, seed_quote};
    use crate::models::{BetCategory, OddsQuoteInput, PropCategory, Selection};

    fn leg(game_id: &str, bet_type: BetCategory, selection: Selection, price: Option<f64>) -> NewLeg {
        NewLeg {
            game_id: game_id.to_string(),
            bet_type,
            selection,
            player_id: None,
            prop_type: None,
            price,
            justification: None,
        }
    }

    #[test]
    fn test_aggregate_all_combinations() {
        use BetStatus::*;
        assert_eq!(aggregate_status(&[]), ParlayStatus::Pending);
        assert_eq!(aggregate_status(&[Won, Pending]), ParlayStatus::Pending);
        assert_eq!(aggregate_status(&[Lost, Pending]), ParlayStatus::Pending);
        assert_eq!(aggregate_status(&[Lost, Won]), ParlayStatus::Lost);
        assert_eq!(aggregate_status(&[Lost, Push]), ParlayStatus::Lost);
        assert_eq!(aggregate_status(&[Won, Won, Won]), ParlayStatus::Won);
        assert_eq!(aggregate_status(&[Won, Push]), ParlayStatus::PartiallyWon);
        assert_eq!(aggregate_status(&[Push, Push]), ParlayStatus::PartiallyWon);
    }

    #[test]
    fn test_aggregate_invariant_exhaustive() {
        let all = [BetStatus::Pending, BetStatus::Won, BetStatus::Lost, BetStatus::Push];
        for a in all {
            for b in all {
                for c in all {
                    let legs = [a, b, c];
                    let status = aggregate_status(&legs);
                    assert_eq!(status == ParlayStatus::Pending, legs.contains(&BetStatus::Pending));
                    if !legs.contains(&BetStatus::Pending) && legs.contains(&BetStatus::Lost) {
                        assert_eq!(status, ParlayStatus::Lost);
                    }
                }
            }
        }
    }

    #[test]
    fn test_price_parlay() {
        let pricing = price_parlay(10.0, &[100.0, -200.0]).unwrap();
        assert!((pricing.total_price - 3.0).abs() < 1e-9);
        assert!((pricing.potential_payout - 30.0).abs() < 1e-9);

        assert!(matches!(price_parlay(0.0, &[100.0]), Err(BettingError::InvalidInput(_))));
        assert!(matches!(price_parlay(5.0, &[]), Err(BettingError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_create_parlay_looks_up_best_price() {
        let pool = memory_pool().await;
        let game = seed_game(&pool, "g1").await;
        seed_quote(&pool, OddsQuoteInput {
            game_id: game.id.clone(),
            sportsbook: "BookA".into(),
            home_moneyline: Some(120.0),
            ..Default::default()
        })
        .await;
        seed_quote(&pool, OddsQuoteInput {
            game_id: game.id.clone(),
            sportsbook: "BookB".into(),
            home_moneyline: Some(150.0),
            ..Default::default()
        })
        .await;

        let created = ParlayService::new("DraftKings")
            .create_parlay(&pool, NewParlay {
                name: None,
                stake: 10.0,
                legs: vec![leg(&game.id, BetCategory::Moneyline, Selection::Home, None)],
            })
            .await
            .unwrap();

        assert_eq!(created.parlay.name, "Custom Parlay");
        assert_eq!(created.parlay.status, ParlayStatus::Pending);
        assert_eq!(created.legs.len(), 1);
        assert_eq!(created.legs[0].price, 150.0);
        assert!((created.parlay.total_price - 2.5).abs() < 1e-9);
        assert!((created.parlay.potential_payout - 25.0).abs() < 1e-9);

        let stored = get_parlay(&pool, &created.parlay.id).await.unwrap().unwrap();
        assert_eq!(stored.legs.len(), 1);
        assert_eq!(stored.legs[0].status, BetStatus::Pending);
    }

    #[tokio::test]
    async fn test_line_legs_are_priced_from_reference_book() {
        let pool = memory_pool().await;
        let game = seed_game(&pool, "g1").await;
        seed_quote(&pool, OddsQuoteInput {
            game_id: game.id.clone(),
            sportsbook: "DraftKings".into(),
            home_spread: Some(-1.5),
            away_spread: Some(1.5),
            home_spread_price: Some(180.0),
            away_spread_price: Some(-220.0),
            total: Some(6.5),
            over_price: Some(-105.0),
            under_price: Some(-115.0),
            ..Default::default()
        })
        .await;
        // a friendlier line elsewhere must not leak into the priced leg
        seed_quote(&pool, OddsQuoteInput {
            game_id: game.id.clone(),
            sportsbook: "BookB".into(),
            home_spread: Some(1.5),
            away_spread: Some(-1.5),
            home_spread_price: Some(-250.0),
            away_spread_price: Some(200.0),
            total: Some(5.5),
            over_price: Some(-130.0),
            under_price: Some(110.0),
            ..Default::default()
        })
        .await;

        let created = ParlayService::new("DraftKings")
            .create_parlay(&pool, NewParlay {
                name: None,
                stake: 10.0,
                legs: vec![
                    leg(&game.id, BetCategory::Spread, Selection::Home, None),
                    leg(&game.id, BetCategory::OverUnder, Selection::Under, None),
                ],
            })
            .await
            .unwrap();
        assert_eq!(created.legs[0].price, 180.0);
        assert_eq!(created.legs[1].price, -115.0);

        let err = ParlayService::new("FanDuel")
            .create_parlay(&pool, NewParlay {
                name: None,
                stake: 10.0,
                legs: vec![leg(&game.id, BetCategory::Spread, Selection::Home, None)],
            })
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<BettingError>(), Some(BettingError::NoPrice(_))));
    }

    #[tokio::test]
    async fn test_create_parlay_rejects_bad_shapes_and_missing_refs() {
        let pool = memory_pool().await;
        let game = seed_game(&pool, "g1").await;
        let service = ParlayService::new("DraftKings");

        let mut prop = leg(&game.id, BetCategory::PlayerProp, Selection::Over, Some(-110.0));
        prop.prop_type = Some(PropCategory::Goals);
        let err = service
            .create_parlay(&pool, NewParlay { name: None, stake: 5.0, legs: vec![prop] })
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<BettingError>(), Some(BettingError::InvalidBetShape(_))));

        let err = service
            .create_parlay(&pool, NewParlay {
                name: None,
                stake: 5.0,
                legs: vec![leg("missing", BetCategory::Moneyline, Selection::Home, Some(-110.0))],
            })
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<BettingError>(), Some(BettingError::NotFound { .. })));

        let err = service
            .create_parlay(&pool, NewParlay {
                name: None,
                stake: 5.0,
                legs: vec![leg(&game.id, BetCategory::Spread, Selection::Away, None)],
            })
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<BettingError>(), Some(BettingError::NoPrice(_))));

        let err = service
            .create_parlay(&pool, NewParlay { name: None, stake: 5.0, legs: vec![] })
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<BettingError>(), Some(BettingError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_prop_leg_keeps_player_fields() {
        let pool = memory_pool().await;
        let game = seed_game(&pool, "g1").await;
        let player = seed_player(&pool, &game.home_team_id, "Skater One").await;

        let mut prop = leg(&game.id, BetCategory::PlayerProp, Selection::Under, Some(115.0));
        prop.player_id = Some(player.id.clone());
        prop.prop_type = Some(PropCategory::Points);

        let created = ParlayService::new("DraftKings")
            .create_parlay(&pool, NewParlay { name: Some("Props".into()), stake: 2.0, legs: vec![prop] })
            .await
            .unwrap();
        assert_eq!(created.legs[0].player_id.as_deref(), Some(player.id.as_str()));
        assert_eq!(created.legs[0].prop_type, Some(PropCategory::Points));
    }

    #[tokio::test]
    async fn test_update_recomputes_payout_and_locks_settled() {
        let pool = memory_pool().await;
        let game = seed_game(&pool, "g1").await;
        let service = ParlayService::new("DraftKings");
        let created = service
            .create_parlay(&pool, NewParlay {
                name: None,
                stake: 10.0,
                legs: vec![leg(&game.id, BetCategory::Moneyline, Selection::Away, Some(100.0))],
            })
            .await
            .unwrap();

        let updated = service
            .update_parlay(&pool, &created.parlay.id, ParlayUpdate {
                stake: Some(20.0),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!((updated.parlay.potential_payout - 40.0).abs() < 1e-9);

        service
            .update_parlay(&pool, &created.parlay.id, ParlayUpdate {
                status: Some(ParlayStatus::Lost),
                ..Default::default()
            })
            .await
            .unwrap();

        let err = service
            .update_parlay(&pool, &created.parlay.id, ParlayUpdate {
                stake: Some(50.0),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<BettingError>(), Some(BettingError::InvalidInput(_))));

        service.delete_parlay(&pool, &created.parlay.id).await.unwrap();
        assert!(get_parlay(&pool, &created.parlay.id).await.unwrap().is_none());
        let err = service.delete_parlay(&pool, &created.parlay.id).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<BettingError>(), Some(BettingError::NotFound { .. })));
    }
}
