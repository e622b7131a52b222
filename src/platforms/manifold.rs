//! Manifold Markets play-money integration.
//!
//! All bets are in Mana (play currency, no cash-out).
//!
//! API docs: https://docs.manifold.markets/api
//! Base URL: https://api.manifold.markets/v0/
//! Rate limit: 500 requests/minute per IP
//! Auth: Not required for reads; `Authorization: Key {key}` for writes.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, info};

use super::PredictionPlatform;
use crate::types::{BetReceipt, MarketQuote, Side};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

pub const DEFAULT_BASE_URL: &str = "https://api.manifold.markets/v0";
const PLATFORM_NAME: &str = "manifold";

// ---------------------------------------------------------------------------
// API response types (Manifold JSON → Rust)
// ---------------------------------------------------------------------------

/// Manifold market as returned by `/v0/slug/{slug}` and
/// `/v0/search-markets`. We only deserialize the fields we need.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifoldMarket {
    id: String,
    question: String,
    #[serde(default)]
    slug: String,
    #[serde(default)]
    url: String,

    /// "BINARY", "MULTIPLE_CHOICE", etc.
    #[serde(default)]
    outcome_type: String,

    /// Current implied probability (0.0–1.0). Binary markets only.
    #[serde(default)]
    probability: Option<f64>,

    #[serde(default)]
    is_resolved: bool,
}

/// Response from `/v0/bet` POST (place a bet).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifoldBetResponse {
    #[serde(default)]
    bet_id: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    amount: Option<f64>,
    #[serde(default)]
    prob_after: f64,
    #[serde(default)]
    created_time: Option<i64>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Extract a market slug from a Manifold URL.
///
/// `https://manifold.markets/someone/will-it-rain?r=abc` → `will-it-rain`.
/// Input without a slash is taken as the slug itself. A host on its own
/// (`https://manifold.markets/`) has no slug.
pub fn extract_slug_from_url(url: &str) -> Option<String> {
    let without_fragment = url.split('#').next().unwrap_or_default();
    let path = without_fragment.split('?').next().unwrap_or_default().trim();

    let path = match path.split_once("://") {
        Some((_, rest)) => rest.split_once('/').map(|(_, p)| p).unwrap_or_default(),
        None => match path.split_once('/') {
            Some((host, p)) if host.contains('.') => p,
            Some(_) => path,
            None if path.contains('.') => "",
            None => path,
        },
    };

    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.contains(':'))
        .map(str::to_string)
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Manifold Markets platform client.
pub struct ManifoldClient {
    http: Client,
    base_url: String,
}

impl ManifoldClient {
    /// Create a new Manifold client.
    ///
    /// `base_url` defaults to the public v0 API. The API key is supplied per
    /// bet, so one client can serve whatever key the user entered.
    pub fn new(base_url: Option<String>, timeout_secs: u64) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .user_agent("EDGETRACK/0.1.0 (prediction-market-edge-tracker)")
            .build()
            .context("Failed to build HTTP client for Manifold")?;

        let base_url = base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // -- Internal helpers ------------------------------------------------

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str, what: &str) -> Result<T> {
        debug!(url = %url, "Fetching from Manifold");

        let resp = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("Manifold {what} request failed"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Manifold {what} error {status}: {body}");
        }

        resp.json()
            .await
            .with_context(|| format!("Failed to parse Manifold {what} response"))
    }

    /// Convert a Manifold API timestamp (ms since epoch) to `DateTime<Utc>`.
    fn ms_to_datetime(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
    }

    /// Convert a binary Manifold market to a quote. Returns `None` for
    /// market types without a single YES probability.
    fn to_quote(m: ManifoldMarket) -> Option<MarketQuote> {
        if m.outcome_type != "BINARY" {
            return None;
        }
        let probability = m.probability?;
        Some(MarketQuote {
            id: m.id,
            slug: m.slug,
            question: m.question,
            probability: probability.clamp(0.0, 1.0),
            url: m.url,
        })
    }

    async fn fetch_market(&self, slug: &str) -> Result<ManifoldMarket> {
        let url = format!("{}/slug/{}", self.base_url, urlencoding::encode(slug));
        self.get_json(&url, "market").await
    }
}

// ---------------------------------------------------------------------------
// PredictionPlatform trait implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl PredictionPlatform for ManifoldClient {
    async fn market_by_slug(&self, slug: &str) -> Result<MarketQuote> {
        let market = self.fetch_market(slug).await?;
        let resolved = market.is_resolved;
        let outcome_type = market.outcome_type.clone();

        let mut quote = Self::to_quote(market).with_context(|| {
            format!("Market {slug} is {outcome_type}, only BINARY markets are supported")
        })?;
        if quote.slug.is_empty() {
            quote.slug = slug.to_string();
        }

        debug!(
            slug = %slug,
            probability = quote.probability,
            resolved,
            "Manifold market fetched"
        );
        Ok(quote)
    }

    /// Search open binary markets. Non-binary hits are dropped.
    async fn search_markets(&self, term: &str, limit: u32) -> Result<Vec<MarketQuote>> {
        let url = format!(
            "{}/search-markets?term={}&filter=open&contractType=BINARY&limit={}",
            self.base_url,
            urlencoding::encode(term),
            limit,
        );
        let markets: Vec<ManifoldMarket> = self.get_json(&url, "search-markets").await?;

        let quotes: Vec<MarketQuote> = markets.into_iter().filter_map(Self::to_quote).collect();
        debug!(term = %term, hits = quotes.len(), "Manifold search complete");
        Ok(quotes)
    }

    /// Place a play-money bet on Manifold. Amount is in Mana.
    async fn place_bet_by_slug(
        &self,
        api_key: &str,
        slug: &str,
        amount: Decimal,
        side: Side,
    ) -> Result<BetReceipt> {
        if api_key.trim().is_empty() {
            anyhow::bail!("Manifold API key required for placing bets");
        }

        // Bets are addressed by contract id, not slug.
        let market = self.fetch_market(slug).await?;

        let body = serde_json::json!({
            "amount": amount,
            "outcome": side.as_outcome(),
            "contractId": market.id,
        });

        let resp = self
            .http
            .post(format!("{}/bet", self.base_url))
            .header("Authorization", format!("Key {}", api_key.trim()))
            .json(&body)
            .send()
            .await
            .context("Manifold bet request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Manifold bet failed {status}: {body}");
        }

        let bet: ManifoldBetResponse = resp
            .json()
            .await
            .context("Failed to parse Manifold bet response")?;

        let bet_id = bet
            .bet_id
            .or(bet.id)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let timestamp = bet
            .created_time
            .map(Self::ms_to_datetime)
            .unwrap_or_else(Utc::now);

        let filled = bet
            .amount
            .and_then(Decimal::from_f64_retain)
            .unwrap_or(amount);

        info!(
            platform = PLATFORM_NAME,
            bet_id = %bet_id,
            slug = %slug,
            side = %side,
            amount = %filled,
            prob_after = bet.prob_after,
            "Manifold bet placed"
        );

        Ok(BetReceipt {
            bet_id,
            slug: slug.to_string(),
            side,
            amount: filled,
            prob_after: bet.prob_after,
            timestamp,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
