//! Batch settlement of pending parlays.
//!
//! A sweep snapshots every pending parlay together with the games, reference
//! quotes, reference props and player stats its legs depend on, settles the
//! legs purely against that snapshot, and writes each settled parlay in its
//! own transaction. A parlay is only evaluated once every one of its games is
//! finished; otherwise it is skipped untouched.

use anyhow::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::db::{
    apply_settlement, get_games_by_ids, get_odds_for_game, get_parlays, get_player_props,
    get_player_stats_for_game, PropFilter,
};
use crate::models::{BetStatus, GameStatus, ParlayStatus, ParlayWithLegs};
use crate::services::parlay::aggregate_status;
use crate::services::settlement::{settle_bet, MarketSnapshot};

#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    /// Pending parlays looked at.
    pub examined: usize,
    /// Parlays that left `pending` during this sweep.
    pub settled: usize,
    /// Parlays skipped because at least one game is not finished.
    pub skipped_unfinished: usize,
    /// Parlays evaluated but still pending (missing reference line or stat).
    pub still_pending: usize,
    pub errors: Vec<String>,
}

/// Settles pending parlays. Clones share one guard, so sweeps triggered from
/// the API, the CLI and the interval task never interleave.
#[derive(Debug, Clone)]
pub struct ParlaySweeper {
    reference_book: String,
    guard: Arc<Mutex<()>>,
}

impl ParlaySweeper {
    pub fn new(reference_book: impl Into<String>) -> Self {
        Self {
            reference_book: reference_book.into(),
            guard: Arc::new(Mutex::new(())),
        }
    }

    pub fn reference_book(&self) -> &str {
        &self.reference_book
    }

    /// Number of parlays transitioned out of `pending`.
    pub async fn sweep(&self, pool: &SqlitePool) -> Result<usize> {
        Ok(self.sweep_with_report(pool).await?.settled)
    }

    pub async fn sweep_with_report(&self, pool: &SqlitePool) -> Result<SweepReport> {
        let _guard = self.guard.lock().await;

        let pending = get_parlays(pool, Some(ParlayStatus::Pending), None).await?;
        let mut report = SweepReport {
            examined: pending.len(),
            ..Default::default()
        };
        if pending.is_empty() {
            tracing::debug!("Sweep: no pending parlays");
            return Ok(report);
        }

        let snapshot = self.load_snapshot(pool, &pending).await?;

        for parlay in &pending {
            match self.settle_parlay(pool, parlay, &snapshot).await {
                Ok(Outcome::Settled(status)) => {
                    report.settled += 1;
                    tracing::info!("Parlay {} ({}) settled as {}", parlay.parlay.id, parlay.parlay.name, status);
                }
                Ok(Outcome::Unfinished) => report.skipped_unfinished += 1,
                Ok(Outcome::StillPending) => report.still_pending += 1,
                Err(e) => {
                    tracing::warn!("Parlay {} could not be settled: {}", parlay.parlay.id, e);
                    report.errors.push(format!("parlay {}: {}", parlay.parlay.id, e));
                }
            }
        }

        tracing::info!(
            "Sweep complete: {} examined, {} settled, {} unfinished, {} still pending, {} errors",
            report.examined,
            report.settled,
            report.skipped_unfinished,
            report.still_pending,
            report.errors.len()
        );
        Ok(report)
    }

    async fn load_snapshot(&self, pool: &SqlitePool, parlays: &[ParlayWithLegs]) -> Result<MarketSnapshot> {
        let game_ids: Vec<String> = parlays
            .iter()
            .flat_map(|p| p.legs.iter().map(|b| b.game_id.clone()))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        let mut snapshot = MarketSnapshot::new();
        for game in get_games_by_ids(pool, &game_ids).await? {
            // Lines and stats only matter once a game is over.
            if game.status == GameStatus::Finished {
                for quote in get_odds_for_game(pool, &game.id, Some(&self.reference_book)).await? {
                    snapshot.insert_reference_quote(quote);
                }
                let props = get_player_props(
                    pool,
                    &PropFilter {
                        game_id: Some(game.id.clone()),
                        sportsbook: Some(self.reference_book.clone()),
                        ..Default::default()
                    },
                )
                .await?;
                for prop in props {
                    snapshot.insert_reference_prop(prop);
                }
                for stat in get_player_stats_for_game(pool, &game.id).await? {
                    snapshot.insert_player_stat(stat);
                }
            }
            snapshot.insert_game(game);
        }
        Ok(snapshot)
    }

    async fn settle_parlay(
        &self,
        pool: &SqlitePool,
        parlay: &ParlayWithLegs,
        snapshot: &MarketSnapshot,
    ) -> Result<Outcome> {
        let all_finished = parlay.legs.iter().all(|bet| {
            snapshot
                .game(&bet.game_id)
                .map(|g| g.status == GameStatus::Finished)
                .unwrap_or(false)
        });
        if !all_finished {
            return Ok(Outcome::Unfinished);
        }

        let mut statuses = Vec::with_capacity(parlay.legs.len());
        let mut changed: Vec<(String, BetStatus)> = Vec::new();
        for bet in &parlay.legs {
            let status = settle_bet(bet, snapshot)?;
            if status != bet.status {
                changed.push((bet.id.clone(), status));
            }
            statuses.push(status);
        }

        let parlay_status = aggregate_status(&statuses);
        let transitioned = apply_settlement(pool, &parlay.parlay.id, &changed, parlay_status).await?;

        if parlay_status == ParlayStatus::Pending {
            Ok(Outcome::StillPending)
        } else if transitioned {
            Ok(Outcome::Settled(parlay_status))
        } else {
            // Another writer settled it between our read and write.
            Ok(Outcome::StillPending)
        }
    }
}

enum Outcome {
    Settled(ParlayStatus),
    Unfinished,
    StillPending,
}
