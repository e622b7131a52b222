//! Shared types for the EDGETRACK tracker.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that platform, strategy,
//! and engine modules can depend on them without circular references.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Probabilities
// ---------------------------------------------------------------------------

/// Validate a user-supplied probability. Accepts the closed interval [0, 1].
pub fn validate_probability(probability: f64) -> Result<f64, TrackerError> {
    if probability.is_finite() && (0.0..=1.0).contains(&probability) {
        Ok(probability)
    } else {
        Err(TrackerError::InvalidProbability(probability))
    }
}

/// Convert a percentage as typed by the user (`"62.5"`) into a fraction.
pub fn percent_to_probability(percent: f64) -> Result<f64, TrackerError> {
    validate_probability(percent / 100.0)
}

// ---------------------------------------------------------------------------
// User estimate
// ---------------------------------------------------------------------------

/// The user's own probability for a market, keyed by slug.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserEstimate {
    pub slug: String,
    /// Subjective YES probability (0.0–1.0)
    pub probability: f64,
}

impl UserEstimate {
    /// Build an estimate, rejecting empty slugs and out-of-range probabilities.
    pub fn new(slug: impl Into<String>, probability: f64) -> Result<Self, TrackerError> {
        let slug = slug.into().trim().to_string();
        if slug.is_empty() {
            return Err(TrackerError::EmptySlug);
        }
        Ok(Self {
            slug,
            probability: validate_probability(probability)?,
        })
    }
}

impl fmt::Display for UserEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {:.1}%", self.slug, self.probability * 100.0)
    }
}

// ---------------------------------------------------------------------------
// Market quote
// ---------------------------------------------------------------------------

/// Live market data for a single binary market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketQuote {
    /// Platform contract id (needed to place bets).
    pub id: String,
    pub slug: String,
    pub question: String,
    /// Current YES probability (0.0–1.0)
    pub probability: f64,
    pub url: String,
}

impl fmt::Display for MarketQuote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (YES: {:.1}%)",
            self.question,
            self.probability * 100.0,
        )
    }
}

// ---------------------------------------------------------------------------
// Side
// ---------------------------------------------------------------------------

/// Bet direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Yes,
    No,
}

impl Side {
    /// Wire name used by the Manifold API (`outcome` field).
    pub fn as_outcome(&self) -> &'static str {
        match self {
            Side::Yes => "YES",
            Side::No => "NO",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_outcome())
    }
}

impl std::str::FromStr for Side {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "YES" => Ok(Side::Yes),
            "NO" => Ok(Side::No),
            other => Err(TrackerError::UnknownSide(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Edge row
// ---------------------------------------------------------------------------

/// One row of the results table: a market, the user's estimate and the
/// betting recommendation derived from both. Rebuilt, never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRow {
    pub slug: String,
    pub title: String,
    pub market_probability: f64,
    pub user_probability: f64,
    pub side: Side,
    /// Payout multiple for the recommended side.
    pub market_return: f64,
    /// Full-Kelly stake as a fraction of bankroll.
    pub kelly_fraction: f64,
    pub roi: f64,
}

impl EdgeRow {
    /// The estimate this row was built from.
    pub fn estimate(&self) -> UserEstimate {
        UserEstimate {
            slug: self.slug.clone(),
            probability: self.user_probability,
        }
    }

    /// Whether betting the recommended side has positive expected value.
    pub fn has_edge(&self) -> bool {
        self.kelly_fraction > 0.0 && self.roi > 0.0
    }

    /// Value of the given column for sorting.
    pub fn sort_value(&self, key: SortKey) -> SortValue<'_> {
        match key {
            SortKey::Slug => SortValue::Text(&self.slug),
            SortKey::Title => SortValue::Text(&self.title),
            SortKey::Side => SortValue::Text(self.side.as_outcome()),
            SortKey::MarketProbability => SortValue::Number(self.market_probability),
            SortKey::UserProbability => SortValue::Number(self.user_probability),
            SortKey::MarketReturn => SortValue::Number(self.market_return),
            SortKey::KellyFraction => SortValue::Number(self.kelly_fraction),
            SortKey::Roi => SortValue::Number(self.roi),
            SortKey::Bet | SortKey::Delete => SortValue::Unsortable,
        }
    }
}

impl fmt::Display for EdgeRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} | market {:.1}% | mine {:.1}% | buy {} | return x{:.2} | kelly {:.1}% | roi {:.1}%",
            self.slug,
            self.title,
            self.market_probability * 100.0,
            self.user_probability * 100.0,
            self.side,
            self.market_return,
            self.kelly_fraction * 100.0,
            self.roi * 100.0,
        )
    }
}

// ---------------------------------------------------------------------------
// Sorting
// ---------------------------------------------------------------------------

/// Table columns. `Bet` and `Delete` are action columns with no value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    Slug,
    Title,
    MarketProbability,
    UserProbability,
    Side,
    MarketReturn,
    KellyFraction,
    Roi,
    Bet,
    Delete,
}

impl std::str::FromStr for SortKey {
    type Err = TrackerError;

    /// Accepts both snake_case names and the table header labels.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = match s.trim() {
            "slug" => SortKey::Slug,
            "title" => SortKey::Title,
            "market_probability" | "marketP" => SortKey::MarketProbability,
            "user_probability" | "myP" => SortKey::UserProbability,
            "side" | "buy" => SortKey::Side,
            "market_return" | "marketReturn" => SortKey::MarketReturn,
            "kelly_fraction" | "kellyPerc" => SortKey::KellyFraction,
            "roi" | "rOI" | "ROI" => SortKey::Roi,
            "bet" | "button" => SortKey::Bet,
            "delete" => SortKey::Delete,
            other => return Err(TrackerError::UnknownSortKey(other.to_string())),
        };
        Ok(key)
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SortKey::Slug => "slug",
            SortKey::Title => "title",
            SortKey::MarketProbability => "market_probability",
            SortKey::UserProbability => "user_probability",
            SortKey::Side => "side",
            SortKey::MarketReturn => "market_return",
            SortKey::KellyFraction => "kelly_fraction",
            SortKey::Roi => "roi",
            SortKey::Bet => "bet",
            SortKey::Delete => "delete",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn toggled(&self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }
}

impl std::str::FromStr for SortDirection {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            other => Err(TrackerError::UnknownSortDirection(other.to_string())),
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => write!(f, "asc"),
            SortDirection::Desc => write!(f, "desc"),
        }
    }
}

/// A sort column together with its direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortOrder {
    pub key: SortKey,
    pub direction: SortDirection,
}

impl SortOrder {
    pub fn new(key: SortKey, direction: SortDirection) -> Self {
        Self { key, direction }
    }

    /// Best opportunities first.
    pub fn by_roi_desc() -> Self {
        Self::new(SortKey::Roi, SortDirection::Desc)
    }
}

impl Default for SortOrder {
    fn default() -> Self {
        Self::by_roi_desc()
    }
}

/// Column value as seen by the sorter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SortValue<'a> {
    Text(&'a str),
    Number(f64),
    Unsortable,
}

// ---------------------------------------------------------------------------
// Bets
// ---------------------------------------------------------------------------

/// Confirmation of a placed bet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetReceipt {
    pub bet_id: String,
    pub slug: String,
    pub side: Side,
    /// Stake in mana.
    pub amount: Decimal,
    /// Market probability after the bet filled.
    pub prob_after: f64,
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for BetReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Bet {} | {} {} M{} → {:.1}% @ {}",
            self.bet_id,
            self.slug,
            self.side,
            self.amount,
            self.prob_after * 100.0,
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for EDGETRACK.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("Probability out of range [0, 1]: {0}")]
    InvalidProbability(f64),

    #[error("Market probability must lie strictly between 0 and 1, got {probability} for {slug}")]
    DegenerateMarket { slug: String, probability: f64 },

    #[error("Market slug must not be empty")]
    EmptySlug,

    #[error("Market not tracked: {0}")]
    NotTracked(String),

    #[error("Unknown sort key: {0}")]
    UnknownSortKey(String),

    #[error("Unknown sort direction: {0}")]
    UnknownSortDirection(String),

    #[error("Unknown side: {0}")]
    UnknownSide(String),

    #[error("Could not sort by {key}: {reason}")]
    Sort { key: SortKey, reason: String },

    #[error("No API key configured for betting")]
    MissingApiKey,

    #[error("Invalid bet amount: {0}")]
    InvalidAmount(Decimal),

    #[error("Failed to fetch market {slug}: {message}")]
    Fetch { slug: String, message: String },

    #[error("Failed to place bet on {slug}: {message}")]
    Bet { slug: String, message: String },

    #[error("Invalid market URL: {0}")]
    InvalidUrl(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
