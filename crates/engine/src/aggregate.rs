//! Aggregator: trust-weighted wallet beliefs → a market snapshot.
//!
//! For a market at an instant T the builder collects every wallet that
//! traded at or before T, infers each wallet's latent belief, looks up its
//! trust weight through the bucket fallback chain, and combines the
//! confidence-moderated weighted beliefs into a crowd probability with a
//! full set of diagnostics. Manipulation controls (churn, concentration)
//! only ever suppress confidence, never amplify it.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crowdcast_core::{
    stats, CategoryBucket, CohortSummary, Driver, EngineError, EngineParams, FlowSummary, Horizon,
    RunCounters, Snapshot, Trade, WalletWeight,
};

use crate::beliefs::infer_belief;
use crate::working_set::WorkingSet;

/// Indexed view of the weight engine's output, with the fallback chain
/// used at aggregation time.
#[derive(Debug, Default)]
pub struct WeightTable {
    rows: HashMap<(String, String, String), WalletWeight>,
}

impl WeightTable {
    /// Indexes weight rows by (wallet, category, horizon).
    #[must_use]
    pub fn from_rows(rows: &[WalletWeight]) -> Self {
        let mut index = HashMap::with_capacity(rows.len());
        for row in rows {
            index.insert(
                (
                    row.wallet.clone(),
                    row.bucket.category.as_str().to_string(),
                    row.bucket.horizon.as_str().to_string(),
                ),
                row.clone(),
            );
        }
        Self { rows: index }
    }

    /// Number of indexed rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when no rows are indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Resolves a wallet's trust weight for a (category, horizon) context,
    /// falling back (cat, hz) → (cat, *) → (*, hz) → (*, *).
    #[must_use]
    pub fn lookup(
        &self,
        wallet: &str,
        category: &CategoryBucket,
        horizon: Horizon,
    ) -> Option<&WalletWeight> {
        let cat = category.as_str();
        let hz = horizon.as_str();
        let chain = [
            (cat, hz),
            (cat, crowdcast_core::ALL_BUCKET),
            (crowdcast_core::ALL_BUCKET, hz),
            (crowdcast_core::ALL_BUCKET, crowdcast_core::ALL_BUCKET),
        ];
        for (c, h) in chain {
            let key = (wallet.to_string(), c.to_string(), h.to_string());
            if let Some(row) = self.rows.get(&key) {
                return Some(row);
            }
        }
        None
    }
}

/// One wallet that cleared the effective-weight filter.
struct Participant {
    wallet: String,
    belief: f64,
    churn: f64,
    trust_weight: f64,
    /// Category axis of the weight row the trust weight resolved from.
    resolved_category: CategoryBucket,
    effective_weight: f64,
}

/// Builds market snapshots from a frozen working set and weight table.
pub struct SnapshotBuilder<'a> {
    ws: &'a WorkingSet,
    weights: &'a WeightTable,
    params: &'a EngineParams,
}

impl<'a> SnapshotBuilder<'a> {
    #[must_use]
    pub fn new(ws: &'a WorkingSet, weights: &'a WeightTable, params: &'a EngineParams) -> Self {
        Self { ws, weights, params }
    }

    /// Produces the snapshot for `market_id` at instant `at`.
    ///
    /// Only trades with `ts <= at` are visible; inserting a later trade
    /// cannot change the result. A market with no trusted participants
    /// yields a degenerate snapshot pinned to the market probability with
    /// zero confidence.
    ///
    /// # Errors
    /// [`EngineError::UnknownMarket`] when the market is not in the
    /// working set; [`EngineError::InvariantViolation`] when a computed
    /// probability leaves [0, 1]. Either failure is scoped to this market.
    pub fn build(
        &self,
        market_id: &str,
        at: DateTime<Utc>,
        counters: &mut RunCounters,
    ) -> Result<Snapshot, EngineError> {
        let market = self
            .ws
            .market(market_id)
            .ok_or_else(|| EngineError::UnknownMarket {
                market_id: market_id.to_string(),
            })?;

        let trades = self.ws.trades_for(market_id);
        let market_prob = self.market_prob_at(trades, at);
        let flow = self.flow_summary(trades, at);

        let category = market.category_bucket();
        let horizon = Horizon::from_gap(market.end_time - at, &self.params.horizon_thresholds);

        let lookback_from = self
            .params
            .active_lookback_hours
            .map(|hours| at - Duration::hours(hours));
        let wallets = self.ws.wallets_in(market_id, at, lookback_from);

        let mut participants = Vec::new();
        for wallet in wallets {
            let wallet_trades = self.ws.wallet_trades(market_id, wallet, at);
            let Some(belief) = infer_belief(&wallet_trades, at, self.params) else {
                continue;
            };

            let weight_row = self.weights.lookup(wallet, &category, horizon);
            let (trust_weight, resolved_category) = match weight_row {
                Some(row) => (row.weight, row.bucket.category.clone()),
                None => {
                    counters.missing_weight_lookups += 1;
                    (0.0, CategoryBucket::All)
                }
            };

            let anti_noise = (1.0 - 0.5 * belief.churn).clamp(0.5, 1.0);
            let effective_weight = trust_weight * belief.confidence * anti_noise;
            if effective_weight > 0.0 {
                participants.push(Participant {
                    wallet: wallet.to_string(),
                    belief: belief.belief,
                    churn: belief.churn,
                    trust_weight,
                    resolved_category,
                    effective_weight,
                });
            }
        }

        let snapshot = if participants.is_empty() {
            counters.degenerate_markets += 1;
            debug!(market_id, %at, "degenerate snapshot: no trusted participants");
            Snapshot {
                market_id: market_id.to_string(),
                at,
                market_prob,
                crowd_prob: market_prob,
                divergence: 0.0,
                confidence: 0.0,
                disagreement: 0.0,
                participation_quality: 0.0,
                integrity_risk: 0.0,
                active_wallets: 0,
                degenerate: true,
                drivers: Vec::new(),
                flow,
                cohorts: Vec::new(),
            }
        } else {
            self.aggregate(market_id, at, market_prob, flow, &participants)
        };

        Self::check_invariants(&snapshot)?;
        Ok(snapshot)
    }

    /// Combines participant beliefs into the snapshot record.
    fn aggregate(
        &self,
        market_id: &str,
        at: DateTime<Utc>,
        market_prob: f64,
        flow: FlowSummary,
        participants: &[Participant],
    ) -> Snapshot {
        let ews: Vec<f64> = participants.iter().map(|p| p.effective_weight).collect();
        let beliefs: Vec<f64> = participants.iter().map(|p| p.belief).collect();
        let churns: Vec<f64> = participants.iter().map(|p| p.churn).collect();
        let total_ew: f64 = ews.iter().sum();

        let crowd_prob = stats::weighted_mean(&beliefs, &ews, market_prob);
        let divergence = crowd_prob - market_prob;

        let disagreement =
            (stats::weighted_variance(&beliefs, &ews, crowd_prob).clamp(0.0, 1.0) * 4.0)
                .clamp(0.0, 1.0);

        let effective_n = stats::effective_n(&ews);
        let participation_quality = effective_n / (effective_n + self.params.participation_half);

        let concentration = stats::herfindahl(&ews);
        let churn_mean = stats::weighted_mean(&churns, &ews, 0.0);
        let integrity_risk = (0.6 * concentration + 0.4 * churn_mean).clamp(0.0, 1.0);

        let active_wallets = participants.len() as u64;
        let support_haircut = (active_wallets as f64 / 10.0).clamp(0.0, 1.0);
        let confidence = participation_quality
            * (1.0 - disagreement)
            * (1.0 - 0.5 * integrity_risk)
            * support_haircut;

        let mut drivers: Vec<Driver> = participants
            .iter()
            .map(|p| Driver {
                wallet: p.wallet.clone(),
                weight: p.trust_weight,
                belief: p.belief,
                contribution: p.effective_weight * (p.belief - market_prob) / total_ew,
            })
            .collect();
        drivers.sort_by(|a, b| {
            b.contribution
                .abs()
                .partial_cmp(&a.contribution.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.wallet.cmp(&b.wallet))
        });
        drivers.truncate(self.params.drivers_k);

        let cohorts = Self::cohort_summaries(&drivers, participants);

        Snapshot {
            market_id: market_id.to_string(),
            at,
            market_prob,
            crowd_prob,
            divergence,
            confidence,
            disagreement,
            participation_quality,
            integrity_risk,
            active_wallets,
            degenerate: false,
            drivers,
            flow,
            cohorts,
        }
    }

    /// Market-implied YES probability at `at`: size-weighted YES price
    /// over the recent window, else the last YES price, else 0.5.
    fn market_prob_at(&self, trades: &[Trade], at: DateTime<Utc>) -> f64 {
        let window_start = at - Duration::minutes(self.params.price_window_minutes);
        let mut prices = Vec::new();
        let mut sizes = Vec::new();
        for trade in trades.iter().filter(|t| t.ts <= at && t.ts >= window_start) {
            prices.push(trade.yes_price());
            sizes.push(trade.size_f64());
        }
        if !prices.is_empty() {
            return stats::weighted_mean(&prices, &sizes, 0.5);
        }
        trades
            .iter()
            .filter(|t| t.ts <= at)
            .next_back()
            .map_or(0.5, Trade::yes_price)
    }

    /// Net YES-direction flow over the trailing window.
    fn flow_summary(&self, trades: &[Trade], at: DateTime<Utc>) -> FlowSummary {
        let window_start = at - Duration::hours(self.params.flow_window_hours);
        let mut net_yes_size = 0.0;
        let mut trade_count = 0u64;
        for trade in trades.iter().filter(|t| t.ts <= at && t.ts >= window_start) {
            net_yes_size += trade.yes_direction() * trade.size_f64();
            trade_count += 1;
        }
        FlowSummary {
            net_yes_size,
            trade_count,
            window_hours: self.params.flow_window_hours,
        }
    }

    /// Groups the reported drivers by category bucket.
    ///
    /// Each driver's category bucket is the category axis of the weight
    /// row its trust weight resolved from: the market's category for a
    /// category-specific row, the pooled bucket for a fallback row.
    fn cohort_summaries(drivers: &[Driver], participants: &[Participant]) -> Vec<CohortSummary> {
        let category_of: HashMap<&str, &CategoryBucket> = participants
            .iter()
            .map(|p| (p.wallet.as_str(), &p.resolved_category))
            .collect();

        let mut grouped: std::collections::BTreeMap<CategoryBucket, (u64, f64, f64)> =
            std::collections::BTreeMap::new();
        for driver in drivers {
            let Some(category) = category_of.get(driver.wallet.as_str()) else {
                continue;
            };
            let entry = grouped.entry((*category).clone()).or_insert((0, 0.0, 0.0));
            entry.0 += 1;
            entry.1 += driver.weight;
            entry.2 += driver.belief;
        }

        grouped
            .into_iter()
            .map(|(category, (wallets, total_weight, belief_sum))| CohortSummary {
                category,
                wallets,
                total_weight,
                mean_belief: belief_sum / wallets as f64,
            })
            .collect()
    }

    /// Final range check before a snapshot leaves the engine.
    fn check_invariants(snapshot: &Snapshot) -> Result<(), EngineError> {
        let fields = [
            ("market_prob", snapshot.market_prob),
            ("crowd_prob", snapshot.crowd_prob),
            ("confidence", snapshot.confidence),
            ("disagreement", snapshot.disagreement),
            ("participation_quality", snapshot.participation_quality),
            ("integrity_risk", snapshot.integrity_risk),
        ];
        for (name, value) in fields {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                warn!(
                    market_id = %snapshot.market_id,
                    field = name,
                    value,
                    "snapshot failed invariant check"
                );
                return Err(EngineError::InvariantViolation {
                    market_id: snapshot.market_id.clone(),
                    detail: format!("{name} = {value} outside [0, 1]"),
                });
            }
        }
        if !snapshot.divergence.is_finite() {
            return Err(EngineError::InvariantViolation {
                market_id: snapshot.market_id.clone(),
                detail: "divergence is not finite".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use crowdcast_core::{Action, BucketKey, HorizonBucket, Market, Outcome, Side};
    use rust_decimal::Decimal;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap()
    }

    fn trade(
        id: &str,
        market: &str,
        wallet: &str,
        at: DateTime<Utc>,
        side: Side,
        action: Action,
        price: f64,
        size: f64,
    ) -> Trade {
        Trade::try_new(
            id,
            market,
            wallet,
            at,
            side,
            action,
            Decimal::try_from(price).unwrap(),
            Decimal::try_from(size).unwrap(),
        )
        .unwrap()
    }

    fn weight_row(wallet: &str, weight: f64) -> WalletWeight {
        WalletWeight {
            wallet: wallet.to_string(),
            bucket: BucketKey::global(),
            weight,
            uncertainty: 0.2,
            raw_edge: 0.1,
            shrunk_edge: 0.08,
            support: 20,
        }
    }

    fn assemble(markets: Vec<Market>, trades: Vec<Trade>, outcomes: Vec<Outcome>) -> WorkingSet {
        let mut counters = RunCounters::default();
        WorkingSet::assemble(markets, trades, outcomes, &mut counters)
    }

    // ============================================================
    // Weight Table Fallback
    // ============================================================

    #[test]
    fn lookup_prefers_the_exact_bucket() {
        let exact = WalletWeight {
            bucket: BucketKey::new(
                CategoryBucket::Category("crypto".to_string()),
                HorizonBucket::Horizon(Horizon::Short),
            ),
            weight: 2.0,
            ..weight_row("w-1", 1.0)
        };
        let global = weight_row("w-1", 1.0);
        let table = WeightTable::from_rows(&[global, exact]);

        let row = table
            .lookup(
                "w-1",
                &CategoryBucket::Category("crypto".to_string()),
                Horizon::Short,
            )
            .unwrap();
        assert!((row.weight - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn lookup_falls_back_to_global() {
        let table = WeightTable::from_rows(&[weight_row("w-1", 1.3)]);

        let row = table
            .lookup(
                "w-1",
                &CategoryBucket::Category("politics".to_string()),
                Horizon::Long,
            )
            .unwrap();
        assert!((row.weight - 1.3).abs() < f64::EPSILON);
    }

    #[test]
    fn lookup_misses_for_unknown_wallet() {
        let table = WeightTable::from_rows(&[weight_row("w-1", 1.3)]);

        assert!(table.lookup("w-ghost", &CategoryBucket::All, Horizon::Short).is_none());
    }

    // ============================================================
    // Market Probability
    // ============================================================

    #[test]
    fn market_prob_is_size_weighted_over_the_window() {
        let ws = assemble(
            vec![Market::new("m-1", "q", t0() + Duration::days(1), "crypto")],
            vec![
                trade("t-1", "m-1", "w-1", t0() - Duration::minutes(5), Side::Yes, Action::Buy, 0.40, 1.0),
                trade("t-2", "m-1", "w-2", t0() - Duration::minutes(1), Side::Yes, Action::Buy, 0.60, 3.0),
            ],
            vec![],
        );
        let table = WeightTable::default();
        let params = EngineParams::default();
        let builder = SnapshotBuilder::new(&ws, &table, &params);

        let prob = builder.market_prob_at(ws.trades_for("m-1"), t0());
        // (0.40·1 + 0.60·3) / 4 = 0.55
        assert!((prob - 0.55).abs() < 1e-12);
    }

    #[test]
    fn market_prob_falls_back_to_last_price() {
        let ws = assemble(
            vec![Market::new("m-1", "q", t0() + Duration::days(1), "crypto")],
            vec![trade("t-1", "m-1", "w-1", t0() - Duration::hours(5), Side::No, Action::Buy, 0.30, 1.0)],
            vec![],
        );
        let table = WeightTable::default();
        let params = EngineParams::default();
        let builder = SnapshotBuilder::new(&ws, &table, &params);

        // NO at 0.30 means YES at 0.70
        let prob = builder.market_prob_at(ws.trades_for("m-1"), t0());
        assert!((prob - 0.70).abs() < 1e-12);
    }

    #[test]
    fn market_prob_defaults_to_half_with_no_trades() {
        let ws = assemble(
            vec![Market::new("m-1", "q", t0() + Duration::days(1), "crypto")],
            vec![],
            vec![],
        );
        let table = WeightTable::default();
        let params = EngineParams::default();
        let builder = SnapshotBuilder::new(&ws, &table, &params);

        assert!((builder.market_prob_at(ws.trades_for("m-1"), t0()) - 0.5).abs() < f64::EPSILON);
    }

    // ============================================================
    // Degenerate Market
    // ============================================================

    // Scenario: the only trader's trust weight resolves to zero, so the
    // snapshot pins to the market price with zero confidence.
    #[test]
    fn zero_weight_wallet_yields_degenerate_snapshot() {
        let ws = assemble(
            vec![Market::new("m-1", "q", t0() + Duration::days(1), "crypto")],
            vec![trade("t-1", "m-1", "w-1", t0() - Duration::minutes(1), Side::Yes, Action::Buy, 0.55, 2.0)],
            vec![],
        );
        let table = WeightTable::from_rows(&[weight_row("w-1", 0.0)]);
        let params = EngineParams::default();
        let builder = SnapshotBuilder::new(&ws, &table, &params);
        let mut counters = RunCounters::default();

        let snap = builder.build("m-1", t0(), &mut counters).unwrap();

        assert!(snap.degenerate);
        assert!((snap.crowd_prob - 0.55).abs() < 1e-12);
        assert!(snap.divergence.abs() < 1e-12);
        assert!(snap.confidence.abs() < f64::EPSILON);
        assert!(snap.integrity_risk.abs() < f64::EPSILON);
        assert_eq!(snap.active_wallets, 0);
        assert!(snap.drivers.is_empty());
        assert_eq!(counters.degenerate_markets, 1);
    }

    #[test]
    fn missing_weight_counts_and_degenerates() {
        let ws = assemble(
            vec![Market::new("m-1", "q", t0() + Duration::days(1), "crypto")],
            vec![trade("t-1", "m-1", "w-1", t0(), Side::Yes, Action::Buy, 0.55, 2.0)],
            vec![],
        );
        let table = WeightTable::default();
        let params = EngineParams::default();
        let builder = SnapshotBuilder::new(&ws, &table, &params);
        let mut counters = RunCounters::default();

        let snap = builder.build("m-1", t0(), &mut counters).unwrap();

        assert!(snap.degenerate);
        assert_eq!(counters.missing_weight_lookups, 1);
        assert_eq!(counters.degenerate_markets, 1);
    }

    #[test]
    fn unknown_market_is_an_error() {
        let ws = assemble(vec![], vec![], vec![]);
        let table = WeightTable::default();
        let params = EngineParams::default();
        let builder = SnapshotBuilder::new(&ws, &table, &params);
        let mut counters = RunCounters::default();

        let err = builder.build("m-ghost", t0(), &mut counters).unwrap_err();
        assert!(matches!(err, EngineError::UnknownMarket { .. }));
    }

    // ============================================================
    // Aggregation
    // ============================================================

    // Scenario: two agreeing wallets with concentrated weight; integrity
    // risk suppresses confidence but the crowd probability stands.
    #[test]
    fn concentration_suppresses_confidence_not_the_crowd() {
        let end = t0() + Duration::days(1);
        let mut trades = Vec::new();
        // Both wallets persistently hold YES at 0.8 with several fills so
        // their inferred beliefs are 0.8 with solid confidence.
        for i in 0..6 {
            trades.push(trade(
                &format!("a-{i}"),
                "m-1",
                "w-big",
                t0() - Duration::minutes(30 - i),
                Side::Yes,
                Action::Buy,
                0.80,
                9.0,
            ));
            trades.push(trade(
                &format!("b-{i}"),
                "m-1",
                "w-small",
                t0() - Duration::minutes(30 - i),
                Side::Yes,
                Action::Buy,
                0.80,
                9.0,
            ));
        }
        // Window trades pin the market probability near 0.5.
        trades.push(trade("p-1", "m-1", "w-px", t0() - Duration::minutes(2), Side::Yes, Action::Buy, 0.50, 1000.0));

        let ws = assemble(vec![Market::new("m-1", "q", end, "crypto")], trades, vec![]);
        let table = WeightTable::from_rows(&[
            weight_row("w-big", 0.9),
            weight_row("w-small", 0.1),
            // w-px carries no weight row: lookup misses, ew = 0
        ]);
        let params = EngineParams::default();
        let builder = SnapshotBuilder::new(&ws, &table, &params);
        let mut counters = RunCounters::default();

        let snap = builder.build("m-1", t0(), &mut counters).unwrap();

        assert!(!snap.degenerate);
        assert_eq!(snap.active_wallets, 2);
        // Both beliefs 0.8: the crowd sits at 0.8 regardless of weights.
        assert!((snap.crowd_prob - 0.8).abs() < 1e-9, "crowd {}", snap.crowd_prob);
        assert!(snap.disagreement.abs() < 1e-9);
        // ew ratio is 9:1, so Herfindahl concentration is 0.82.
        assert!((snap.integrity_risk - 0.6 * 0.82).abs() < 1e-9);
        // and the confidence product carries the (1 − 0.5·risk) factor
        let expected_factor = 1.0 - 0.5 * snap.integrity_risk;
        assert!((expected_factor - 0.754).abs() < 1e-3);
        assert_eq!(counters.missing_weight_lookups, 1);
    }

    #[test]
    fn divergence_is_exactly_crowd_minus_market() {
        let end = t0() + Duration::days(1);
        let trades = vec![
            trade("t-1", "m-1", "w-1", t0() - Duration::minutes(10), Side::Yes, Action::Buy, 0.70, 4.0),
            trade("t-2", "m-1", "w-1", t0() - Duration::minutes(5), Side::Yes, Action::Buy, 0.72, 4.0),
            trade("p-1", "m-1", "w-px", t0() - Duration::minutes(1), Side::Yes, Action::Buy, 0.50, 100.0),
        ];
        let ws = assemble(vec![Market::new("m-1", "q", end, "crypto")], trades, vec![]);
        let table = WeightTable::from_rows(&[weight_row("w-1", 1.0)]);
        let params = EngineParams::default();
        let builder = SnapshotBuilder::new(&ws, &table, &params);
        let mut counters = RunCounters::default();

        let snap = builder.build("m-1", t0(), &mut counters).unwrap();

        assert!((snap.divergence - (snap.crowd_prob - snap.market_prob)).abs() < 1e-15);
    }

    // Drivers' normalized contributions can never exceed unit mass.
    #[test]
    fn driver_contributions_are_bounded() {
        let end = t0() + Duration::days(1);
        let mut trades = Vec::new();
        for (i, wallet) in ["w-1", "w-2", "w-3"].iter().enumerate() {
            for j in 0..4 {
                trades.push(trade(
                    &format!("t-{i}-{j}"),
                    "m-1",
                    wallet,
                    t0() - Duration::minutes(20 - j),
                    if i % 2 == 0 { Side::Yes } else { Side::No },
                    Action::Buy,
                    0.2 + 0.15 * i as f64,
                    3.0,
                ));
            }
        }
        let ws = assemble(vec![Market::new("m-1", "q", end, "crypto")], trades, vec![]);
        let table = WeightTable::from_rows(&[
            weight_row("w-1", 1.4),
            weight_row("w-2", 0.8),
            weight_row("w-3", 2.2),
        ]);
        let params = EngineParams::default();
        let builder = SnapshotBuilder::new(&ws, &table, &params);
        let mut counters = RunCounters::default();

        let snap = builder.build("m-1", t0(), &mut counters).unwrap();

        let total: f64 = snap.drivers.iter().map(|d| d.contribution.abs()).sum();
        assert!(total <= 1.0 + 1e-9, "total contribution {total}");
        assert!(snap.drivers.len() <= EngineParams::default().drivers_k);
        // sorted by |contribution| descending
        for pair in snap.drivers.windows(2) {
            assert!(pair[0].contribution.abs() >= pair[1].contribution.abs() - 1e-15);
        }
    }

    // ============================================================
    // Time Causality
    // ============================================================

    // Inserting a trade after T must not change the snapshot at T.
    #[test]
    fn later_trades_do_not_alter_the_snapshot() {
        let end = t0() + Duration::days(1);
        let base_trades = vec![
            trade("t-1", "m-1", "w-1", t0() - Duration::minutes(10), Side::Yes, Action::Buy, 0.62, 4.0),
            trade("t-2", "m-1", "w-1", t0() - Duration::minutes(5), Side::Yes, Action::Buy, 0.64, 4.0),
        ];
        let mut extended = base_trades.clone();
        extended.push(trade("t-3", "m-1", "w-2", t0() + Duration::minutes(30), Side::No, Action::Buy, 0.90, 50.0));

        let table = WeightTable::from_rows(&[weight_row("w-1", 1.0), weight_row("w-2", 3.0)]);
        let params = EngineParams::default();

        let ws_a = assemble(vec![Market::new("m-1", "q", end, "crypto")], base_trades, vec![]);
        let ws_b = assemble(vec![Market::new("m-1", "q", end, "crypto")], extended, vec![]);

        let mut counters = RunCounters::default();
        let snap_a = SnapshotBuilder::new(&ws_a, &table, &params)
            .build("m-1", t0(), &mut counters)
            .unwrap();
        let snap_b = SnapshotBuilder::new(&ws_b, &table, &params)
            .build("m-1", t0(), &mut counters)
            .unwrap();

        assert_eq!(snap_a, snap_b);
    }

    // ============================================================
    // Flow and Cohorts
    // ============================================================

    #[test]
    fn flow_summary_nets_directions_over_the_window() {
        let end = t0() + Duration::days(1);
        let trades = vec![
            // +5 YES
            trade("t-1", "m-1", "w-1", t0() - Duration::hours(2), Side::Yes, Action::Buy, 0.5, 5.0),
            // −2 YES (selling YES)
            trade("t-2", "m-1", "w-2", t0() - Duration::hours(1), Side::Yes, Action::Sell, 0.5, 2.0),
            // outside the 6 h window
            trade("t-3", "m-1", "w-3", t0() - Duration::hours(9), Side::Yes, Action::Buy, 0.5, 50.0),
        ];
        let ws = assemble(vec![Market::new("m-1", "q", end, "crypto")], trades, vec![]);
        let table = WeightTable::default();
        let params = EngineParams::default();
        let builder = SnapshotBuilder::new(&ws, &table, &params);

        let flow = builder.flow_summary(ws.trades_for("m-1"), t0());
        assert!((flow.net_yes_size - 3.0).abs() < 1e-12);
        assert_eq!(flow.trade_count, 2);
        assert_eq!(flow.window_hours, 6);
    }

    #[test]
    fn cohorts_group_drivers_by_category_bucket() {
        let end = t0() + Duration::hours(12);
        let trades = vec![
            trade("t-1", "m-1", "w-1", t0() - Duration::minutes(10), Side::Yes, Action::Buy, 0.7, 4.0),
            trade("t-2", "m-1", "w-2", t0() - Duration::minutes(8), Side::Yes, Action::Buy, 0.6, 4.0),
        ];
        let ws = assemble(vec![Market::new("m-1", "q", end, "crypto")], trades, vec![]);

        // w-1 resolves a category-specific row, w-2 falls back to its
        // pooled row, so the two drivers land in different cohorts.
        let specific = WalletWeight {
            bucket: BucketKey::new(
                CategoryBucket::Category("crypto".to_string()),
                HorizonBucket::Horizon(Horizon::Short),
            ),
            ..weight_row("w-1", 1.5)
        };
        let table = WeightTable::from_rows(&[specific, weight_row("w-2", 1.0)]);
        let params = EngineParams::default();
        let builder = SnapshotBuilder::new(&ws, &table, &params);
        let mut counters = RunCounters::default();

        let snap = builder.build("m-1", t0(), &mut counters).unwrap();

        assert_eq!(snap.cohorts.len(), 2);
        let categories: Vec<&str> = snap.cohorts.iter().map(|c| c.category.as_str()).collect();
        assert!(categories.contains(&"crypto"));
        assert!(categories.contains(&"_all_"));
        let total: u64 = snap.cohorts.iter().map(|c| c.wallets).sum();
        assert_eq!(total, snap.drivers.len() as u64);
    }

    #[test]
    fn drivers_sharing_a_category_row_form_one_cohort() {
        let end = t0() + Duration::hours(12);
        let trades = vec![
            trade("t-1", "m-1", "w-1", t0() - Duration::minutes(10), Side::Yes, Action::Buy, 0.7, 4.0),
            trade("t-2", "m-1", "w-2", t0() - Duration::minutes(8), Side::Yes, Action::Buy, 0.6, 4.0),
        ];
        let ws = assemble(vec![Market::new("m-1", "q", end, "crypto")], trades, vec![]);

        let table = WeightTable::from_rows(&[weight_row("w-1", 1.5), weight_row("w-2", 1.0)]);
        let params = EngineParams::default();
        let builder = SnapshotBuilder::new(&ws, &table, &params);
        let mut counters = RunCounters::default();

        let snap = builder.build("m-1", t0(), &mut counters).unwrap();

        assert_eq!(snap.cohorts.len(), 1);
        assert_eq!(snap.cohorts[0].category.as_str(), "_all_");
        assert_eq!(snap.cohorts[0].wallets, 2);
        assert!((snap.cohorts[0].total_weight - 2.5).abs() < 1e-12);
    }
}
