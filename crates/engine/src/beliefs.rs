//! Belief engine: one wallet's trade sequence on one market → a latent
//! (belief, confidence) pair at an evaluation instant.
//!
//! Each trade votes with its revealed YES belief, weighted by √size, an
//! exponential recency decay, and a small boost for staying on the same
//! side of 0.5 across consecutive revealed beliefs. Confidence saturates
//! with accumulated signal mass and trade count and collapses for wallets
//! whose revealed beliefs keep crossing 0.5.

use chrono::{DateTime, Utc};

use crowdcast_core::{EngineParams, Trade};

/// Inferred latent position of one wallet on one market.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WalletBelief {
    /// Weighted revealed YES belief, in [0, 1].
    pub belief: f64,
    /// Product of mass, support, and persistence scores, in [0, 1].
    pub confidence: f64,
    /// Total vote weight behind the belief.
    pub signal_mass: f64,
    /// Trades considered (at or before the evaluation instant).
    pub trade_count: usize,
    /// Fraction of adjacent trades whose revealed belief side of 0.5
    /// flipped.
    pub churn: f64,
}

/// Longest same-side run that still earns a persistence boost.
const MAX_STREAK: usize = 5;

/// Infers the wallet's belief from its trades on a single market.
///
/// `trades` must be the wallet's fills on one market in chronological
/// order, as the working set provides them; fills after `at` are ignored.
/// Returns `None` when no fill exists at or before `at` — the wallet does
/// not participate in the snapshot.
#[must_use]
pub fn infer_belief(trades: &[&Trade], at: DateTime<Utc>, params: &EngineParams) -> Option<WalletBelief> {
    let half_life = params.half_life_hours.max(1e-9);

    let mut weighted_belief = 0.0;
    let mut total_weight = 0.0;
    let mut considered = 0usize;
    let mut flips = 0usize;
    let mut streak = 0usize;
    let mut previous_bullish: Option<bool> = None;

    for trade in trades {
        if trade.ts > at {
            continue;
        }
        let belief = trade.revealed_yes_belief();
        // Same side-of-0.5 convention as the feature engine's churn.
        let bullish = belief >= 0.5;
        match previous_bullish {
            Some(prev) if prev == bullish => streak += 1,
            Some(_) => {
                flips += 1;
                streak = 1;
            }
            None => streak = 1,
        }
        previous_bullish = Some(bullish);

        let age_hours = (at - trade.ts).num_seconds() as f64 / 3600.0;
        let size_weight = trade.size_f64().max(0.0).sqrt();
        let time_weight = (-age_hours / half_life).exp2();
        let persistence_boost = 1.0 + 0.1 * streak.min(MAX_STREAK) as f64;
        let raw_weight = size_weight * time_weight * persistence_boost;

        weighted_belief += belief * raw_weight;
        total_weight += raw_weight;
        considered += 1;
    }

    if considered == 0 || total_weight <= 0.0 {
        return None;
    }

    let belief = (weighted_belief / total_weight).clamp(0.0, 1.0);
    let churn = if considered > 1 {
        flips as f64 / (considered - 1) as f64
    } else {
        0.0
    };

    let mass_score = 1.0 - (-total_weight / params.signal_mass_scale).exp();
    let support_score = 1.0 - (-(considered as f64) / params.support_scale).exp();
    let persistence_score = 1.0 - churn;
    let confidence = (mass_score * support_score * persistence_score).clamp(0.0, 1.0);

    Some(WalletBelief {
        belief,
        confidence,
        signal_mass: total_weight,
        trade_count: considered,
        churn,
    })
}
