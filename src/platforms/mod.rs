//! Platform integrations.
//!
//! Defines the `PredictionPlatform` trait and provides the Manifold
//! implementation. The tracker only needs three things from a venue:
//! look a market up by slug, search markets, and place a bet by slug.

pub mod manifold;

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::types::{BetReceipt, MarketQuote, Side};

/// Abstraction over prediction market platforms.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PredictionPlatform: Send + Sync {
    /// Fetch the live quote for a market.
    /// Fails on an unknown slug, a non-binary market or a network error.
    async fn market_by_slug(&self, slug: &str) -> Result<MarketQuote>;

    /// Free-text market search backing the selection widget.
    async fn search_markets(&self, term: &str, limit: u32) -> Result<Vec<MarketQuote>>;

    /// Place a bet of `amount` on `side` of the market with this slug.
    async fn place_bet_by_slug(
        &self,
        api_key: &str,
        slug: &str,
        amount: Decimal,
        side: Side,
    ) -> Result<BetReceipt>;
}
