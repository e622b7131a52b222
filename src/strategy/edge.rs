//! Edge calculation.
//!
//! Compares the user's probability to the market's quoted probability and
//! derives the betting recommendation: which side to buy, the payout
//! multiple, the full-Kelly stake and the expected return on investment.

use tracing::debug;

use crate::types::{validate_probability, EdgeRow, MarketQuote, Side, TrackerError, UserEstimate};

// ---------------------------------------------------------------------------
// Edge analysis
// ---------------------------------------------------------------------------

/// Full breakdown of a single market/estimate comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeAnalysis {
    pub side: Side,
    /// Chance of the chosen side winning at the market price.
    pub market_win_chance: f64,
    /// Chance of the chosen side winning by the user's estimate.
    pub user_win_chance: f64,
    /// Payout multiple per unit staked on the chosen side.
    pub market_return: f64,
    pub kelly_fraction: f64,
    /// Expected profit per share (shares cost `market_win_chance`, pay 1).
    pub expected_value_return: f64,
    pub roi: f64,
}

/// Analyse a market probability against a user probability.
///
/// `market_probability` must lie in (0, 1); at the bounds the payout
/// multiple is undefined. `user_probability` may be anywhere in [0, 1].
pub fn analyze(market_probability: f64, user_probability: f64) -> Result<EdgeAnalysis, TrackerError> {
    if !(market_probability > 0.0 && market_probability < 1.0) {
        return Err(TrackerError::DegenerateMarket {
            slug: String::new(),
            probability: market_probability,
        });
    }
    let user_probability = validate_probability(user_probability)?;

    let side = recommended_side(market_probability, user_probability);
    let market_win_chance = win_chance(market_probability, side);
    let user_win_chance = win_chance(user_probability, side);
    let market_return = market_return(market_win_chance);
    let kelly_fraction = kelly_fraction(market_return, user_win_chance);
    let expected_value_return = user_win_chance - market_win_chance;
    let roi = expected_value_return / market_win_chance;

    Ok(EdgeAnalysis {
        side,
        market_win_chance,
        user_win_chance,
        market_return,
        kelly_fraction,
        expected_value_return,
        roi,
    })
}

/// YES when the user believes YES is underpriced, otherwise NO.
pub fn recommended_side(market_probability: f64, user_probability: f64) -> Side {
    if user_probability > market_probability {
        Side::Yes
    } else {
        Side::No
    }
}

/// Probability of `side` winning given a YES probability.
pub fn win_chance(yes_probability: f64, side: Side) -> f64 {
    match side {
        Side::Yes => yes_probability,
        Side::No => 1.0 - yes_probability,
    }
}

/// Payout multiple implied by the price of the chosen side.
pub fn market_return(market_win_chance: f64) -> f64 {
    1.0 / market_win_chance
}

/// Full-Kelly fraction: f* = (bp - q) / b with b = R - 1 net odds.
///
/// Equivalent to (pR - 1) / (R - 1). Never negative: a bet without edge
/// gets a zero stake.
pub fn kelly_fraction(market_return: f64, win_probability: f64) -> f64 {
    let net_odds = market_return - 1.0;
    if net_odds <= 0.0 {
        return 0.0;
    }
    let kelly = (win_probability * market_return - 1.0) / net_odds;
    kelly.max(0.0)
}

// ---------------------------------------------------------------------------
// Edge calculator
// ---------------------------------------------------------------------------

/// Builds table rows from a quote and the user's estimate.
pub struct EdgeCalculator;

impl EdgeCalculator {
    /// Compute the row for one market.
    pub fn row(quote: &MarketQuote, estimate: &UserEstimate) -> Result<EdgeRow, TrackerError> {
        let analysis = analyze(quote.probability, estimate.probability).map_err(|e| match e {
            TrackerError::DegenerateMarket { probability, .. } => TrackerError::DegenerateMarket {
                slug: estimate.slug.clone(),
                probability,
            },
            other => other,
        })?;

        debug!(
            slug = %estimate.slug,
            side = %analysis.side,
            market = format!("{:.1}%", quote.probability * 100.0),
            mine = format!("{:.1}%", estimate.probability * 100.0),
            kelly = format!("{:.2}%", analysis.kelly_fraction * 100.0),
            roi = format!("{:.1}%", analysis.roi * 100.0),
            "Edge computed"
        );

        Ok(EdgeRow {
            slug: estimate.slug.clone(),
            title: quote.question.clone(),
            market_probability: quote.probability,
            user_probability: estimate.probability,
            side: analysis.side,
            market_return: analysis.market_return,
            kelly_fraction: analysis.kelly_fraction,
            roi: analysis.roi,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
