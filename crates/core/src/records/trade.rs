//! Trade fill record and its belief derivations.
//!
//! A trade is immutable after insert and unique by external id. The
//! derivations on this type — the fill price in YES terms, the revealed
//! YES belief, and the YES-exposure direction — are the primitives every
//! downstream component (features, beliefs, aggregation) is built from.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::RecordError;

/// Which outcome token the fill traded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Yes,
    No,
}

impl Side {
    /// Stable string id used in storage.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Yes => "YES",
            Self::No => "NO",
        }
    }

    /// Parses the stable string id.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "YES" => Some(Self::Yes),
            "NO" => Some(Self::No),
            _ => None,
        }
    }
}

/// Whether the wallet bought or sold the token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
}

impl Action {
    /// Stable string id used in storage.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }

    /// Parses the stable string id.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "BUY" => Some(Self::Buy),
            "SELL" => Some(Self::Sell),
            _ => None,
        }
    }
}

/// Maker/taker tag, when the source reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiquidityRole {
    Maker,
    Taker,
}

impl LiquidityRole {
    /// Stable string id used in storage.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Maker => "maker",
            Self::Taker => "taker",
        }
    }

    /// Parses the stable string id.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "maker" => Some(Self::Maker),
            "taker" => Some(Self::Taker),
            _ => None,
        }
    }
}

/// A single trade fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Source-assigned id, or a deterministic content hash when the source
    /// supplied none. Exactly-once is enforced on this field.
    pub external_id: String,
    /// Market the fill belongs to.
    pub market_id: String,
    /// Wallet that took the position.
    pub wallet: String,
    /// Fill instant.
    pub ts: DateTime<Utc>,
    /// Outcome token traded.
    pub side: Side,
    /// Buy or sell.
    pub action: Action,
    /// Fill price of the traded token, in [0, 1].
    pub price: Decimal,
    /// Fill size; strictly positive.
    pub size: Decimal,
    /// Order aggressiveness in [0, 1], when the source reports it.
    pub aggressiveness: Option<f64>,
    /// Maker/taker tag, when the source reports it.
    pub role: Option<LiquidityRole>,
    /// Raw source payload retained for audit.
    pub raw: Option<serde_json::Value>,
}

impl Trade {
    /// Creates a validated trade.
    ///
    /// # Errors
    /// Returns a [`RecordError`] when any field violates the record
    /// invariants: price in [0, 1], size > 0, aggressiveness in [0, 1],
    /// non-empty identifiers.
    pub fn try_new(
        external_id: &str,
        market_id: &str,
        wallet: &str,
        ts: DateTime<Utc>,
        side: Side,
        action: Action,
        price: Decimal,
        size: Decimal,
    ) -> Result<Self, RecordError> {
        if market_id.trim().is_empty() {
            return Err(RecordError::EmptyField {
                market_id: market_id.to_string(),
                field: "market_id",
            });
        }
        if wallet.trim().is_empty() {
            return Err(RecordError::EmptyField {
                market_id: market_id.to_string(),
                field: "wallet",
            });
        }
        if external_id.trim().is_empty() {
            return Err(RecordError::EmptyField {
                market_id: market_id.to_string(),
                field: "external_id",
            });
        }
        if price < Decimal::ZERO || price > Decimal::ONE {
            return Err(RecordError::PriceOutOfRange {
                external_id: external_id.to_string(),
                market_id: market_id.to_string(),
                price,
            });
        }
        if size <= Decimal::ZERO {
            return Err(RecordError::NonPositiveSize {
                external_id: external_id.to_string(),
                market_id: market_id.to_string(),
                size,
            });
        }

        Ok(Self {
            external_id: external_id.to_string(),
            market_id: market_id.to_string(),
            wallet: wallet.to_string(),
            ts,
            side,
            action,
            price,
            size,
            aggressiveness: None,
            role: None,
            raw: None,
        })
    }

    /// Attaches the optional order metadata.
    ///
    /// # Errors
    /// Returns a [`RecordError`] when aggressiveness falls outside [0, 1].
    pub fn with_order_metadata(
        mut self,
        aggressiveness: Option<f64>,
        role: Option<LiquidityRole>,
    ) -> Result<Self, RecordError> {
        if let Some(value) = aggressiveness {
            if !(0.0..=1.0).contains(&value) || !value.is_finite() {
                return Err(RecordError::AggressivenessOutOfRange {
                    external_id: self.external_id.clone(),
                    market_id: self.market_id.clone(),
                    value,
                });
            }
        }
        self.aggressiveness = aggressiveness;
        self.role = role;
        Ok(self)
    }

    /// Attaches the raw source payload for audit.
    #[must_use]
    pub fn with_raw(mut self, raw: serde_json::Value) -> Self {
        self.raw = Some(raw);
        self
    }

    /// Re-checks the record invariants, for trades that entered through
    /// deserialization rather than [`Trade::try_new`].
    ///
    /// # Errors
    /// Returns the same [`RecordError`]s as the constructor.
    pub fn validate(&self) -> Result<(), RecordError> {
        Self::try_new(
            &self.external_id,
            &self.market_id,
            &self.wallet,
            self.ts,
            self.side,
            self.action,
            self.price,
            self.size,
        )?;
        if let Some(value) = self.aggressiveness {
            if !(0.0..=1.0).contains(&value) || !value.is_finite() {
                return Err(RecordError::AggressivenessOutOfRange {
                    external_id: self.external_id.clone(),
                    market_id: self.market_id.clone(),
                    value,
                });
            }
        }
        Ok(())
    }

    /// Deterministic SHA-256 content id for sources that do not assign one.
    #[must_use]
    pub fn content_id(
        market_id: &str,
        wallet: &str,
        ts: DateTime<Utc>,
        side: Side,
        action: Action,
        price: Decimal,
        size: Decimal,
    ) -> String {
        let mut hasher = Sha256::new();
        hasher.update(market_id.as_bytes());
        hasher.update(b"|");
        hasher.update(wallet.as_bytes());
        hasher.update(b"|");
        hasher.update(ts.to_rfc3339().as_bytes());
        hasher.update(b"|");
        hasher.update(side.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(action.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(price.to_string().as_bytes());
        hasher.update(b"|");
        hasher.update(size.to_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Fill price as f64.
    #[must_use]
    pub fn price_f64(&self) -> f64 {
        f64::try_from(self.price).unwrap_or(0.5)
    }

    /// Fill size as f64.
    #[must_use]
    pub fn size_f64(&self) -> f64 {
        f64::try_from(self.size).unwrap_or(0.0)
    }

    /// The fill price expressed as a YES price.
    #[must_use]
    pub fn yes_price(&self) -> f64 {
        match self.side {
            Side::Yes => self.price_f64(),
            Side::No => 1.0 - self.price_f64(),
        }
    }

    /// The YES belief the wallet revealed by taking this position.
    ///
    /// `price` for YES-buys and NO-sells, `1 − price` otherwise. This is
    /// the belief implied by the position taken, not the market price.
    #[must_use]
    pub fn revealed_yes_belief(&self) -> f64 {
        match (self.side, self.action) {
            (Side::Yes, Action::Buy) | (Side::No, Action::Sell) => self.price_f64(),
            _ => 1.0 - self.price_f64(),
        }
    }

    /// Direction of the YES-exposure change: +1 for YES-buy / NO-sell,
    /// −1 otherwise.
    #[must_use]
    pub fn yes_direction(&self) -> f64 {
        match (self.side, self.action) {
            (Side::Yes, Action::Buy) | (Side::No, Action::Sell) => 1.0,
            _ => -1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap()
    }

    fn yes_buy(price: Decimal) -> Trade {
        Trade::try_new("t-1", "m-1", "w-1", ts(), Side::Yes, Action::Buy, price, dec!(4)).unwrap()
    }

    // ============================================================
    // Validation Tests
    // ============================================================

    #[test]
    fn valid_trade_constructs() {
        let trade = yes_buy(dec!(0.40));
        assert_eq!(trade.side, Side::Yes);
        assert_eq!(trade.action, Action::Buy);
        assert!(trade.validate().is_ok());
    }

    #[test]
    fn price_above_one_is_rejected() {
        let err = Trade::try_new(
            "t-1",
            "m-1",
            "w-1",
            ts(),
            Side::Yes,
            Action::Buy,
            dec!(1.01),
            dec!(1),
        )
        .unwrap_err();

        assert!(matches!(err, RecordError::PriceOutOfRange { .. }));
    }

    #[test]
    fn negative_price_is_rejected() {
        let err = Trade::try_new(
            "t-1",
            "m-1",
            "w-1",
            ts(),
            Side::Yes,
            Action::Buy,
            dec!(-0.1),
            dec!(1),
        )
        .unwrap_err();

        assert!(matches!(err, RecordError::PriceOutOfRange { .. }));
    }

    #[test]
    fn zero_size_is_rejected() {
        let err = Trade::try_new(
            "t-1",
            "m-1",
            "w-1",
            ts(),
            Side::No,
            Action::Sell,
            dec!(0.5),
            dec!(0),
        )
        .unwrap_err();

        assert!(matches!(err, RecordError::NonPositiveSize { .. }));
    }

    #[test]
    fn empty_wallet_is_rejected() {
        let err = Trade::try_new(
            "t-1",
            "m-1",
            " ",
            ts(),
            Side::Yes,
            Action::Buy,
            dec!(0.5),
            dec!(1),
        )
        .unwrap_err();

        assert!(matches!(err, RecordError::EmptyField { field: "wallet", .. }));
    }

    #[test]
    fn out_of_range_aggressiveness_is_rejected() {
        let err = yes_buy(dec!(0.5))
            .with_order_metadata(Some(1.5), None)
            .unwrap_err();

        assert!(matches!(err, RecordError::AggressivenessOutOfRange { .. }));
    }

    // ============================================================
    // Belief Derivation Tests
    // ============================================================

    #[test]
    fn yes_buy_reveals_price_as_belief() {
        let trade = yes_buy(dec!(0.40));
        assert!((trade.revealed_yes_belief() - 0.40).abs() < 1e-12);
        assert!((trade.yes_direction() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn yes_sell_reveals_complement() {
        let trade =
            Trade::try_new("t-1", "m-1", "w-1", ts(), Side::Yes, Action::Sell, dec!(0.40), dec!(1))
                .unwrap();
        assert!((trade.revealed_yes_belief() - 0.60).abs() < 1e-12);
        assert!((trade.yes_direction() + 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn no_sell_reveals_price_as_belief() {
        let trade =
            Trade::try_new("t-1", "m-1", "w-1", ts(), Side::No, Action::Sell, dec!(0.30), dec!(1))
                .unwrap();
        assert!((trade.revealed_yes_belief() - 0.30).abs() < 1e-12);
        assert!((trade.yes_direction() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn no_buy_reveals_complement() {
        let trade =
            Trade::try_new("t-1", "m-1", "w-1", ts(), Side::No, Action::Buy, dec!(0.30), dec!(1))
                .unwrap();
        assert!((trade.revealed_yes_belief() - 0.70).abs() < 1e-12);
        assert!((trade.yes_direction() + 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn yes_price_is_complement_for_no_side() {
        let trade =
            Trade::try_new("t-1", "m-1", "w-1", ts(), Side::No, Action::Buy, dec!(0.30), dec!(1))
                .unwrap();
        assert!((trade.yes_price() - 0.70).abs() < 1e-12);
    }

    // ============================================================
    // Content Id Tests
    // ============================================================

    #[test]
    fn content_id_is_deterministic() {
        let a = Trade::content_id("m-1", "w-1", ts(), Side::Yes, Action::Buy, dec!(0.4), dec!(4));
        let b = Trade::content_id("m-1", "w-1", ts(), Side::Yes, Action::Buy, dec!(0.4), dec!(4));

        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn content_id_distinguishes_fields() {
        let a = Trade::content_id("m-1", "w-1", ts(), Side::Yes, Action::Buy, dec!(0.4), dec!(4));
        let b = Trade::content_id("m-1", "w-1", ts(), Side::Yes, Action::Sell, dec!(0.4), dec!(4));
        let c = Trade::content_id("m-1", "w-2", ts(), Side::Yes, Action::Buy, dec!(0.4), dec!(4));

        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn serde_roundtrip_preserves_enums() {
        let trade = yes_buy(dec!(0.40)).with_raw(serde_json::json!({"src": "clob"}));
        let json = serde_json::to_string(&trade).unwrap();
        let back: Trade = serde_json::from_str(&json).unwrap();

        assert_eq!(back, trade);
        assert!(json.contains(r#""side":"YES""#));
        assert!(json.contains(r#""action":"BUY""#));
    }
}
