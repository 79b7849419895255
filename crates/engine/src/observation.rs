//! Resolved trade observations.
//!
//! An observation is one trade joined with its market's committed outcome,
//! carrying every per-trade quantity the feature engine aggregates. Trades
//! on unresolved markets produce no observation.

use chrono::{DateTime, Utc};

use crowdcast_core::{
    stats, CategoryBucket, EngineParams, Horizon, Market, Outcome, Trade,
};

/// One trade scored against the realized outcome of its market.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub wallet: String,
    pub market_id: String,
    pub ts: DateTime<Utc>,
    /// Category bucket of the market.
    pub category: CategoryBucket,
    /// Horizon class of the trade-to-resolution gap.
    pub horizon: Horizon,
    /// YES belief revealed by the position.
    pub yes_belief: f64,
    /// Fill price in YES terms at the trade.
    pub yes_price: f64,
    /// Raw fill price of the traded token.
    pub price: f64,
    /// Fill size.
    pub size: f64,
    /// +1 for YES-buy / NO-sell, −1 otherwise.
    pub side_sign: f64,
    /// Realized outcome indicator, 0 or 1.
    pub outcome: f64,
}

impl Observation {
    /// Joins a trade with its market's outcome.
    #[must_use]
    pub fn from_trade(
        trade: &Trade,
        market: &Market,
        outcome: &Outcome,
        params: &EngineParams,
    ) -> Self {
        let gap = outcome.resolution_time - trade.ts;
        Self {
            wallet: trade.wallet.clone(),
            market_id: trade.market_id.clone(),
            ts: trade.ts,
            category: market.category_bucket(),
            horizon: Horizon::from_gap(gap, &params.horizon_thresholds),
            yes_belief: trade.revealed_yes_belief(),
            yes_price: trade.yes_price(),
            price: trade.price_f64(),
            size: trade.size_f64(),
            side_sign: trade.yes_direction(),
            outcome: outcome.resolved.indicator(),
        }
    }

    /// Squared error of the revealed belief against the outcome.
    #[must_use]
    pub fn brier(&self) -> f64 {
        (self.yes_belief - self.outcome).powi(2)
    }

    /// Clamped log-loss of the revealed belief against the outcome.
    #[must_use]
    pub fn log_loss(&self, epsilon: f64) -> f64 {
        stats::safe_log_loss(self.yes_belief, self.outcome, epsilon)
    }

    /// Timing alignment: positive when the revealed belief led the fill
    /// price in the realized direction.
    #[must_use]
    pub fn timing_signal(&self) -> f64 {
        (self.yes_belief - self.yes_price) * (2.0 * self.outcome - 1.0)
    }

    /// Signed PnL-proxy numerator of this observation.
    #[must_use]
    pub fn roi_numerator(&self) -> f64 {
        (2.0 * self.outcome - 1.0) * self.side_sign * self.size * (1.0 - self.price)
    }

    /// True when the revealed belief sits on the YES side of 0.5.
    #[must_use]
    pub fn is_bullish(&self) -> bool {
        self.yes_belief >= 0.5
    }
}
