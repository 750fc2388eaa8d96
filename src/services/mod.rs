pub mod analysis;
pub mod news;
pub mod odds_fetcher;
pub mod odds_selector;
pub mod parlay;
pub mod settlement;
pub mod sweeper;

pub use analysis::AnalysisService;
pub use odds_selector::*;
pub use parlay::ParlayService;
pub use sweeper::{ParlaySweeper, SweepReport};
