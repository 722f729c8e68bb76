//! Ranking hand-off

use async_trait::async_trait;
use clubcourt_core::{
    models::Reservation,
    traits::{MatchOutcome, RankingSink},
    AppResult,
};
use tracing::info;

/// Ranking sink that only records results in the log
///
/// Used until a club wires in its ranking service.
#[derive(Debug, Default, Clone)]
pub struct LoggingRankingSink;

#[async_trait]
impl RankingSink for LoggingRankingSink {
    async fn record_result(&self, reservation: &Reservation, outcome: &MatchOutcome) -> AppResult<()> {
        info!(
            reservation_id = %reservation.id,
            club_id = %reservation.club_id,
            winners = outcome.winners.len(),
            losers = outcome.losers.len(),
            score = outcome.score.as_deref().unwrap_or("-"),
            "Match result recorded"
        );
        Ok(())
    }
}
