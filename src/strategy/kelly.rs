//! Kelly criterion position sizing.
//!
//! Turns the full-Kelly fraction on a table row into a whole-mana stake
//! using fractional Kelly with configurable multiplier, cap and floor.

use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use serde::Deserialize;
use tracing::debug;

use crate::types::{EdgeRow, Side};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Kelly sizing configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KellyConfig {
    /// Fractional Kelly multiplier (0.5 = half-Kelly). Lower = more conservative.
    pub multiplier: f64,
    /// Maximum bet as a fraction of the budget.
    pub max_bet_pct: f64,
    /// Minimum stake in mana (below this, don't bother).
    pub min_bet_size: Decimal,
}

impl Default for KellyConfig {
    fn default() -> Self {
        Self {
            multiplier: 0.5,
            max_bet_pct: 0.10,
            min_bet_size: dec!(1),
        }
    }
}

// ---------------------------------------------------------------------------
// Kelly calculator
// ---------------------------------------------------------------------------

/// Sized bet recommendation.
#[derive(Debug, Clone, PartialEq)]
pub struct SizedBet {
    pub slug: String,
    pub side: Side,
    pub kelly_fraction: f64, // Raw Kelly fraction
    pub bet_fraction: f64,   // After multiplier + caps
    pub amount: Decimal,     // Whole mana
    pub expected_value: f64, // ROI * amount
}

pub struct KellyCalculator {
    config: KellyConfig,
}

impl KellyCalculator {
    pub fn new(config: KellyConfig) -> Self {
        Self { config }
    }

    /// Size a bet on a row out of `budget` mana.
    pub fn size_bet(&self, row: &EdgeRow, budget: Decimal) -> Option<SizedBet> {
        if budget <= Decimal::ZERO {
            return None;
        }

        if !row.has_edge() {
            debug!(slug = %row.slug, kelly = row.kelly_fraction, "No edge, no bet");
            return None;
        }

        let fractional = row.kelly_fraction * self.config.multiplier;
        let capped = fractional.min(self.config.max_bet_pct).max(0.0);

        let amount = (budget * Decimal::from_f64(capped)?).floor();

        if amount < self.config.min_bet_size {
            debug!(
                slug = %row.slug,
                amount = %amount,
                min = %self.config.min_bet_size,
                "Bet below minimum size"
            );
            return None;
        }

        let expected_value = row.roi * amount.to_f64().unwrap_or(0.0);

        debug!(
            slug = %row.slug,
            raw_kelly = format!("{:.2}%", row.kelly_fraction * 100.0),
            fractional = format!("{:.2}%", capped * 100.0),
            amount = format!("M{amount}"),
            ev = format!("M{:.2}", expected_value),
            "Bet sized"
        );

        Some(SizedBet {
            slug: row.slug.clone(),
            side: row.side,
            kelly_fraction: row.kelly_fraction,
            bet_fraction: capped,
            amount,
            expected_value,
        })
    }

    /// Size every row with an edge, best ROI first. Rows that would push
    /// the committed total past the budget are skipped.
    pub fn allocate(&self, rows: &[EdgeRow], budget: Decimal) -> Vec<SizedBet> {
        let mut candidates: Vec<&EdgeRow> = rows.iter().filter(|r| r.has_edge()).collect();
        candidates.sort_by(|a, b| b.roi.total_cmp(&a.roi));

        let mut remaining = budget;
        let mut bets = Vec::new();
        for row in candidates {
            if let Some(bet) = self.size_bet(row, budget) {
                if bet.amount > remaining {
                    debug!(slug = %row.slug, remaining = %remaining, "Budget exhausted");
                    continue;
                }
                remaining -= bet.amount;
                bets.push(bet);
            }
        }
        bets
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
