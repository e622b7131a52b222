//! Mock platform for integration testing.
//!
//! Provides a deterministic `PredictionPlatform` implementation that
//! serves known markets, accepts bets and moves prices, all in-memory
//! with no external dependencies.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use edgetrack::platforms::PredictionPlatform;
use edgetrack::types::*;

/// Mana of liquidity behind every mock market. A bet of this size moves
/// the price halfway towards certainty.
const LIQUIDITY: f64 = 1000.0;

/// A mock prediction platform for deterministic testing.
///
/// Markets, balance and failures are fully controllable from test code.
pub struct MockPlatform {
    markets: Arc<Mutex<BTreeMap<String, MarketQuote>>>,
    balance: Arc<Mutex<Decimal>>,
    receipts: Arc<Mutex<Vec<BetReceipt>>>,
    fetches: Arc<Mutex<Vec<String>>>,
    /// Slugs whose fetches fail.
    broken: Arc<Mutex<Vec<String>>>,
    /// If set, all operations will return this error.
    force_error: Arc<Mutex<Option<String>>>,
}

impl MockPlatform {
    /// Create a new mock platform with default markets and balance.
    pub fn new(initial_balance: Decimal) -> Self {
        let markets = Self::default_markets()
            .into_iter()
            .map(|m| (m.slug.clone(), m))
            .collect();
        Self {
            markets: Arc::new(Mutex::new(markets)),
            balance: Arc::new(Mutex::new(initial_balance)),
            receipts: Arc::new(Mutex::new(Vec::new())),
            fetches: Arc::new(Mutex::new(Vec::new())),
            broken: Arc::new(Mutex::new(Vec::new())),
            force_error: Arc::new(Mutex::new(None)),
        }
    }

    pub fn market(slug: &str, question: &str, probability: f64) -> MarketQuote {
        MarketQuote {
            id: format!("MOCK-{slug}"),
            slug: slug.to_string(),
            question: question.to_string(),
            probability,
            url: format!("https://manifold.markets/mock/{slug}"),
        }
    }

    fn default_markets() -> Vec<MarketQuote> {
        vec![
            Self::market("rain-tomorrow", "Will it rain tomorrow?", 0.50),
            Self::market("grand-final", "Will Team A win the Grand Final?", 0.55),
            Self::market("rate-cut", "Will the central bank cut rates in March?", 0.40),
            Self::market("snap-election", "Will an early election be called?", 0.25),
            Self::market("resolved-yes", "Already resolved market", 1.0),
        ]
    }

    /// Move a market's price, as if someone else traded.
    pub fn set_probability(&self, slug: &str, probability: f64) {
        if let Some(m) = self.markets.lock().unwrap().get_mut(slug) {
            m.probability = probability;
        }
    }

    pub fn probability(&self, slug: &str) -> Option<f64> {
        self.markets.lock().unwrap().get(slug).map(|m| m.probability)
    }

    /// Make fetches of one slug fail.
    pub fn break_market(&self, slug: &str) {
        self.broken.lock().unwrap().push(slug.to_string());
    }

    /// Force all subsequent operations to return an error.
    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    /// Clear any forced error.
    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    pub fn get_receipts(&self) -> Vec<BetReceipt> {
        self.receipts.lock().unwrap().clone()
    }

    pub fn balance(&self) -> Decimal {
        *self.balance.lock().unwrap()
    }

    /// Every slug fetched so far, in call order.
    pub fn fetches(&self) -> Vec<String> {
        self.fetches.lock().unwrap().clone()
    }

    pub fn reset_fetches(&self) {
        self.fetches.lock().unwrap().clear();
    }

    fn check_error(&self) -> Result<()> {
        match self.force_error.lock().unwrap().as_ref() {
            Some(err) => Err(anyhow!("{}", err)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PredictionPlatform for MockPlatform {
    async fn market_by_slug(&self, slug: &str) -> Result<MarketQuote> {
        self.fetches.lock().unwrap().push(slug.to_string());
        self.check_error()?;
        if self.broken.lock().unwrap().iter().any(|s| s == slug) {
            return Err(anyhow!("Manifold API error 500 for market {slug}"));
        }
        self.markets
            .lock()
            .unwrap()
            .get(slug)
            .cloned()
            .ok_or_else(|| anyhow!("Manifold API error 404 for market {slug}"))
    }

    async fn search_markets(&self, term: &str, limit: u32) -> Result<Vec<MarketQuote>> {
        self.check_error()?;
        let term = term.to_lowercase();
        Ok(self
            .markets
            .lock()
            .unwrap()
            .values()
            .filter(|m| m.question.to_lowercase().contains(&term))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn place_bet_by_slug(
        &self,
        api_key: &str,
        slug: &str,
        amount: Decimal,
        side: Side,
    ) -> Result<BetReceipt> {
        self.check_error()?;
        if api_key.is_empty() {
            return Err(anyhow!("Manifold API error 401: missing key"));
        }

        let mut markets = self.markets.lock().unwrap();
        let market = markets
            .get_mut(slug)
            .ok_or_else(|| anyhow!("Market not found: {slug}"))?;

        let mut balance = self.balance.lock().unwrap();
        if *balance < amount {
            return Err(anyhow!("Insufficient balance: need M{amount}, have M{}", *balance));
        }
        *balance -= amount;

        let stake = amount.to_f64().unwrap_or(0.0);
        let pull = stake / (stake + LIQUIDITY);
        market.probability = match side {
            Side::Yes => market.probability + (1.0 - market.probability) * pull,
            Side::No => market.probability * (1.0 - pull),
        };

        let receipt = BetReceipt {
            bet_id: format!("MOCK-{}", Uuid::new_v4()),
            slug: slug.to_string(),
            side,
            amount,
            prob_after: market.probability,
            timestamp: Utc::now(),
        };
        self.receipts.lock().unwrap().push(receipt.clone());
        Ok(receipt)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_market_by_slug() {
        let platform = MockPlatform::new(dec!(1000));
        let m = platform.market_by_slug("rain-tomorrow").await.unwrap();
        assert_eq!(m.probability, 0.5);
        assert!(platform.market_by_slug("nope").await.is_err());
        assert_eq!(platform.fetches(), ["rain-tomorrow", "nope"]);
    }

    #[tokio::test]
    async fn test_mock_search() {
        let platform = MockPlatform::new(dec!(1000));
        let found = platform.search_markets("RAIN", 10).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].slug, "rain-tomorrow");
    }

    #[tokio::test]
    async fn test_mock_bet_moves_price_and_balance() {
        let platform = MockPlatform::new(dec!(1000));
        let r = platform
            .place_bet_by_slug("k", "rain-tomorrow", dec!(1000), Side::Yes)
            .await
            .unwrap();
        assert!((r.prob_after - 0.75).abs() < 1e-12);
        assert_eq!(platform.balance(), Decimal::ZERO);

        let err = platform
            .place_bet_by_slug("k", "rain-tomorrow", dec!(1), Side::No)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Insufficient balance"));
    }

    #[tokio::test]
    async fn test_mock_forced_error() {
        let platform = MockPlatform::new(dec!(1000));
        platform.set_error("Connection refused");
        assert!(platform.market_by_slug("rain-tomorrow").await.is_err());
        platform.clear_error();
        assert!(platform.market_by_slug("rain-tomorrow").await.is_ok());
    }
}
