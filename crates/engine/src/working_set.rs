//! Consistent in-memory view of the store for one pipeline run.
//!
//! A run never queries the store mid-computation: markets, trades, and
//! outcomes are loaded once, validated, deduplicated, and ordered here,
//! and every engine component reads from this frozen view. A trade
//! arriving after assembly is invisible to the run, which is what gives
//! snapshots their time-causality guarantee.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use tracing::debug;

use crowdcast_core::{Market, Outcome, RunCounters, Trade};

/// Frozen inputs of one pipeline run.
#[derive(Debug, Clone, Default)]
pub struct WorkingSet {
    markets: BTreeMap<String, Market>,
    trades: BTreeMap<String, Vec<Trade>>,
    outcomes: BTreeMap<String, Outcome>,
}

impl WorkingSet {
    /// Assembles a working set from raw store rows.
    ///
    /// Malformed trades are filtered with a counter increment, duplicates
    /// by external id are dropped (first occurrence wins), trades on
    /// unknown markets are filtered as malformed, and each market's trades
    /// are sorted chronologically with the external id as tie-breaker so
    /// downstream computation is deterministic.
    #[must_use]
    pub fn assemble(
        markets: Vec<Market>,
        trades: Vec<Trade>,
        outcomes: Vec<Outcome>,
        counters: &mut RunCounters,
    ) -> Self {
        let market_index: BTreeMap<String, Market> =
            markets.into_iter().map(|m| (m.id.clone(), m)).collect();

        let mut seen_ids: HashSet<String> = HashSet::new();
        let mut by_market: BTreeMap<String, Vec<Trade>> = BTreeMap::new();
        for trade in trades {
            if let Err(err) = trade.validate() {
                debug!(error = %err, "filtered malformed trade");
                counters.malformed_records += 1;
                continue;
            }
            if !market_index.contains_key(&trade.market_id) {
                debug!(
                    market_id = %trade.market_id,
                    external_id = %trade.external_id,
                    "filtered trade on unknown market"
                );
                counters.malformed_records += 1;
                continue;
            }
            if !seen_ids.insert(trade.external_id.clone()) {
                counters.duplicate_trades += 1;
                continue;
            }
            by_market.entry(trade.market_id.clone()).or_default().push(trade);
        }
        for market_trades in by_market.values_mut() {
            market_trades.sort_by(|a, b| a.ts.cmp(&b.ts).then_with(|| a.external_id.cmp(&b.external_id)));
        }

        let mut outcome_index: BTreeMap<String, Outcome> = BTreeMap::new();
        for outcome in outcomes {
            if !market_index.contains_key(&outcome.market_id) {
                debug!(market_id = %outcome.market_id, "filtered outcome for unknown market");
                counters.malformed_records += 1;
                continue;
            }
            outcome_index.insert(outcome.market_id.clone(), outcome);
        }

        Self {
            markets: market_index,
            trades: by_market,
            outcomes: outcome_index,
        }
    }

    #[must_use]
    pub fn market(&self, market_id: &str) -> Option<&Market> {
        self.markets.get(market_id)
    }

    /// All markets, in id order.
    pub fn markets(&self) -> impl Iterator<Item = &Market> {
        self.markets.values()
    }

    /// Resolved markets with their outcomes, in id order.
    pub fn resolved_markets(&self) -> impl Iterator<Item = (&Market, &Outcome)> {
        self.outcomes
            .values()
            .filter_map(|o| self.markets.get(&o.market_id).map(|m| (m, o)))
    }

    #[must_use]
    pub fn outcome(&self, market_id: &str) -> Option<&Outcome> {
        self.outcomes.get(market_id)
    }

    /// A market's trades, chronological. Empty when the market has none.
    #[must_use]
    pub fn trades_for(&self, market_id: &str) -> &[Trade] {
        self.trades.get(market_id).map_or(&[], Vec::as_slice)
    }

    /// First trade instant on a market, if any.
    #[must_use]
    pub fn earliest_trade(&self, market_id: &str) -> Option<DateTime<Utc>> {
        self.trades_for(market_id).first().map(|t| t.ts)
    }

    /// Wallets that traded a market inside `[from, at]`, in wallet order.
    #[must_use]
    pub fn wallets_in(
        &self,
        market_id: &str,
        at: DateTime<Utc>,
        from: Option<DateTime<Utc>>,
    ) -> BTreeSet<&str> {
        self.trades_for(market_id)
            .iter()
            .filter(|t| t.ts <= at && from.map_or(true, |f| t.ts >= f))
            .map(|t| t.wallet.as_str())
            .collect()
    }

    /// One wallet's trades on a market at or before `at`, chronological.
    #[must_use]
    pub fn wallet_trades(&self, market_id: &str, wallet: &str, at: DateTime<Utc>) -> Vec<&Trade> {
        self.trades_for(market_id)
            .iter()
            .filter(|t| t.wallet == wallet && t.ts <= at)
            .collect()
    }

    /// Total number of trades across all markets.
    #[must_use]
    pub fn trade_count(&self) -> usize {
        self.trades.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use crowdcast_core::{Action, ResolvedOutcome, Side};
    use rust_decimal_macros::dec;

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, hour, 0, 0).unwrap()
    }

    fn market(id: &str) -> Market {
        Market::new(id, "q", ts(23), "crypto")
    }

    fn trade(id: &str, market: &str, wallet: &str, hour: u32) -> Trade {
        Trade::try_new(
            id,
            market,
            wallet,
            ts(hour),
            Side::Yes,
            Action::Buy,
            dec!(0.5),
            dec!(1),
        )
        .unwrap()
    }

    #[test]
    fn assembly_sorts_trades_chronologically() {
        let mut counters = RunCounters::default();
        let ws = WorkingSet::assemble(
            vec![market("m-1")],
            vec![
                trade("t-2", "m-1", "w-1", 12),
                trade("t-1", "m-1", "w-1", 10),
            ],
            vec![],
            &mut counters,
        );

        let ids: Vec<&str> = ws
            .trades_for("m-1")
            .iter()
            .map(|t| t.external_id.as_str())
            .collect();
        assert_eq!(ids, vec!["t-1", "t-2"]);
        assert!(counters.is_clean());
    }

    #[test]
    fn duplicate_external_ids_are_dropped_and_counted() {
        let mut counters = RunCounters::default();
        let ws = WorkingSet::assemble(
            vec![market("m-1")],
            vec![
                trade("t-1", "m-1", "w-1", 10),
                trade("t-1", "m-1", "w-2", 11),
            ],
            vec![],
            &mut counters,
        );

        assert_eq!(ws.trade_count(), 1);
        assert_eq!(ws.trades_for("m-1")[0].wallet, "w-1");
        assert_eq!(counters.duplicate_trades, 1);
    }

    #[test]
    fn malformed_trades_are_filtered_and_counted() {
        let mut bad = trade("t-1", "m-1", "w-1", 10);
        bad.price = dec!(1.5);

        let mut counters = RunCounters::default();
        let ws = WorkingSet::assemble(vec![market("m-1")], vec![bad], vec![], &mut counters);

        assert_eq!(ws.trade_count(), 0);
        assert_eq!(counters.malformed_records, 1);
    }

    #[test]
    fn trades_on_unknown_markets_are_filtered() {
        let mut counters = RunCounters::default();
        let ws = WorkingSet::assemble(
            vec![market("m-1")],
            vec![trade("t-1", "m-ghost", "w-1", 10)],
            vec![],
            &mut counters,
        );

        assert_eq!(ws.trade_count(), 0);
        assert_eq!(counters.malformed_records, 1);
    }

    #[test]
    fn wallets_in_respects_the_instant() {
        let mut counters = RunCounters::default();
        let ws = WorkingSet::assemble(
            vec![market("m-1")],
            vec![
                trade("t-1", "m-1", "w-early", 10),
                trade("t-2", "m-1", "w-late", 14),
            ],
            vec![],
            &mut counters,
        );

        let wallets = ws.wallets_in("m-1", ts(12), None);
        assert_eq!(wallets.len(), 1);
        assert!(wallets.contains("w-early"));
    }

    #[test]
    fn resolved_markets_joins_outcomes() {
        let mut counters = RunCounters::default();
        let ws = WorkingSet::assemble(
            vec![market("m-1"), market("m-2")],
            vec![],
            vec![Outcome::new("m-1", ResolvedOutcome::Yes, ts(22))],
            &mut counters,
        );

        let resolved: Vec<&str> = ws.resolved_markets().map(|(m, _)| m.id.as_str()).collect();
        assert_eq!(resolved, vec!["m-1"]);
        assert!(ws.outcome("m-2").is_none());
    }
}
