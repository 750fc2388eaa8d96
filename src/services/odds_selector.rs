//! Best-price selection across sportsbooks.
//!
//! Moneylines are compared on price alone. Spread and total markets are
//! compared on the line first (the line most favourable to the bettor wins)
//! and on price only when two books hang the identical line.

use crate::models::{BestOdds, BestPrice, OddsQuote, Pick, PlayerPropQuote, Side, Wager};

/// Which direction of line movement helps the bettor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinePreference {
    Higher,
    Lower,
}

impl LinePreference {
    fn for_pick(pick: Pick) -> Self {
        match pick {
            Pick::Over => LinePreference::Lower,
            Pick::Under => LinePreference::Higher,
        }
    }
}

/// Pick the most favourable quote per market side. Missing fields simply
/// leave that market empty.
pub fn select_best_odds(game_id: &str, quotes: &[OddsQuote]) -> BestOdds {
    let mut best = BestOdds {
        game_id: game_id.to_string(),
        ..Default::default()
    };

    for quote in quotes {
        let book = quote.sportsbook.as_str();

        consider_price(&mut best.home_moneyline, quote.home_moneyline, book);
        consider_price(&mut best.away_moneyline, quote.away_moneyline, book);

        // Spread values are signed adjustments to the bettor's side, so a
        // larger value is better for either side.
        consider_line(
            &mut best.home_spread,
            quote.home_spread,
            quote.home_spread_price,
            book,
            LinePreference::Higher,
        );
        consider_line(
            &mut best.away_spread,
            quote.away_spread,
            quote.away_spread_price,
            book,
            LinePreference::Higher,
        );

        consider_line(
            &mut best.over,
            quote.total,
            quote.over_price,
            book,
            LinePreference::for_pick(Pick::Over),
        );
        consider_line(
            &mut best.under,
            quote.total,
            quote.under_price,
            book,
            LinePreference::for_pick(Pick::Under),
        );
    }

    best
}

/// Best over or under price among prop quotes for one player and category.
pub fn select_best_prop(props: &[PlayerPropQuote], pick: Pick) -> Option<BestPrice> {
    let mut best = None;
    for prop in props {
        let price = match pick {
            Pick::Over => prop.over_price,
            Pick::Under => prop.under_price,
        };
        consider_line(
            &mut best,
            Some(prop.line),
            price,
            &prop.sportsbook,
            LinePreference::for_pick(pick),
        );
    }
    best
}

/// The market of `best` that a game-level wager would be priced from.
/// Player props are priced separately through [`select_best_prop`].
pub fn best_for_wager<'a>(best: &'a BestOdds, wager: &Wager) -> Option<&'a BestPrice> {
    match wager {
        Wager::Moneyline { side: Side::Home } => best.home_moneyline.as_ref(),
        Wager::Moneyline { side: Side::Away } => best.away_moneyline.as_ref(),
        Wager::Spread { side: Side::Home } => best.home_spread.as_ref(),
        Wager::Spread { side: Side::Away } => best.away_spread.as_ref(),
        Wager::Total { pick: Pick::Over } => best.over.as_ref(),
        Wager::Total { pick: Pick::Under } => best.under.as_ref(),
        Wager::PlayerProp { .. } => None,
    }
}

fn consider_price(best: &mut Option<BestPrice>, price: Option<f64>, book: &str) {
    let Some(price) = price else { return };
    let better = match best {
        None => true,
        Some(current) => price > current.price,
    };
    if better {
        *best = Some(BestPrice {
            price,
            line: None,
            sportsbook: book.to_string(),
        });
    }
}

fn consider_line(
    best: &mut Option<BestPrice>,
    line: Option<f64>,
    price: Option<f64>,
    book: &str,
    preference: LinePreference,
) {
    let (Some(line), Some(price)) = (line, price) else { return };

    let better = match best {
        None => true,
        Some(current) => {
            let current_line = current.line.unwrap_or(line);
            if line == current_line {
                price > current.price
            } else {
                match preference {
                    LinePreference::Higher => line > current_line,
                    LinePreference::Lower => line < current_line,
                }
            }
        }
    };

    if better {
        *best = Some(BestPrice {
            price,
            line: Some(line),
            sportsbook: book.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PropCategory;
    use chrono::Utc;

    fn quote(book: &str) -> OddsQuote {
        OddsQuote {
            id: format!("q-{book}"),
            game_id: "g1".into(),
            sportsbook: book.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_highest_moneyline_wins() {
        let a = OddsQuote { home_moneyline: Some(120.0), ..quote("BookA") };
        let b = OddsQuote { home_moneyline: Some(150.0), ..quote("BookB") };

        let best = select_best_odds("g1", &[a, b]);
        let home = best.home_moneyline.unwrap();
        assert_eq!(home.sportsbook, "BookB");
        assert_eq!(home.price, 150.0);
        assert_eq!(home.line, None);
    }

    #[test]
    fn test_least_negative_favourite_price_wins() {
        let a = OddsQuote { away_moneyline: Some(-150.0), ..quote("BookA") };
        let b = OddsQuote { away_moneyline: Some(-135.0), ..quote("BookB") };

        let best = select_best_odds("g1", &[a, b]);
        assert_eq!(best.away_moneyline.unwrap().sportsbook, "BookB");
    }

    #[test]
    fn test_spread_prefers_line_over_price() {
        let a = OddsQuote {
            home_spread: Some(-1.5),
            home_spread_price: Some(180.0),
            ..quote("BookA")
        };
        let b = OddsQuote {
            home_spread: Some(-1.0),
            home_spread_price: Some(110.0),
            ..quote("BookB")
        };

        let best = select_best_odds("g1", &[a, b]);
        let home = best.home_spread.unwrap();
        assert_eq!(home.sportsbook, "BookB");
        assert_eq!(home.line, Some(-1.0));
    }

    #[test]
    fn test_equal_line_tie_breaks_on_price() {
        let a = OddsQuote {
            away_spread: Some(1.5),
            away_spread_price: Some(-210.0),
            ..quote("BookA")
        };
        let b = OddsQuote {
            away_spread: Some(1.5),
            away_spread_price: Some(-190.0),
            ..quote("BookB")
        };

        let best = select_best_odds("g1", &[a, b]);
        let away = best.away_spread.unwrap();
        assert_eq!(away.sportsbook, "BookB");
        assert_eq!(away.price, -190.0);
    }

    #[test]
    fn test_totals_prefer_low_for_over_and_high_for_under() {
        let a = OddsQuote {
            total: Some(6.5),
            over_price: Some(-105.0),
            under_price: Some(-115.0),
            ..quote("BookA")
        };
        let b = OddsQuote {
            total: Some(5.5),
            over_price: Some(-140.0),
            under_price: Some(120.0),
            ..quote("BookB")
        };

        let best = select_best_odds("g1", &[a, b]);
        let over = best.over.unwrap();
        let under = best.under.unwrap();
        assert_eq!((over.sportsbook.as_str(), over.line), ("BookB", Some(5.5)));
        assert_eq!((under.sportsbook.as_str(), under.line), ("BookA", Some(6.5)));
    }

    #[test]
    fn test_missing_fields_yield_empty_markets() {
        let a = OddsQuote {
            home_moneyline: Some(-120.0),
            // a spread value without a price is not a quotable market
            home_spread: Some(-1.5),
            ..quote("BookA")
        };

        let best = select_best_odds("g1", &[a]);
        assert!(best.home_moneyline.is_some());
        assert!(best.away_moneyline.is_none());
        assert!(best.home_spread.is_none());
        assert!(best.over.is_none());

        let empty = select_best_odds("g2", &[]);
        assert_eq!(empty.game_id, "g2");
        assert!(empty.home_moneyline.is_none() && empty.under.is_none());
    }

    #[test]
    fn test_best_for_wager_maps_markets() {
        let a = OddsQuote {
            home_moneyline: Some(130.0),
            total: Some(6.0),
            under_price: Some(-110.0),
            ..quote("BookA")
        };
        let best = select_best_odds("g1", &[a]);

        let ml = best_for_wager(&best, &Wager::Moneyline { side: Side::Home }).unwrap();
        assert_eq!(ml.price, 130.0);
        let under = best_for_wager(&best, &Wager::Total { pick: Pick::Under }).unwrap();
        assert_eq!(under.line, Some(6.0));
        assert!(best_for_wager(&best, &Wager::Spread { side: Side::Away }).is_none());
    }

    #[test]
    fn test_best_prop_is_line_aware() {
        let prop = |book: &str, line: f64, over: f64| PlayerPropQuote {
            id: format!("p-{book}"),
            odds_id: format!("q-{book}"),
            game_id: "g1".into(),
            sportsbook: book.into(),
            player_id: "p1".into(),
            prop_type: PropCategory::ShotsOnGoal,
            line,
            over_price: Some(over),
            under_price: None,
            updated_at: Utc::now(),
        };

        let props = vec![prop("BookA", 3.5, 120.0), prop("BookB", 2.5, -150.0)];
        let over = select_best_prop(&props, Pick::Over).unwrap();
        assert_eq!(over.sportsbook, "BookB");
        assert!(select_best_prop(&props, Pick::Under).is_none());
    }
}
