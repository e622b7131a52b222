//! Bet executor.
//!
//! Places bets via the platform client and tracks execution results.
//! In dry-run mode nothing leaves the process; receipts are synthesised.

use chrono::Utc;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{info, warn};

use crate::platforms::PredictionPlatform;
use crate::strategy::kelly::SizedBet;
use crate::types::{BetReceipt, Side, TrackerError};

// ---------------------------------------------------------------------------
// Execution result
// ---------------------------------------------------------------------------

/// Result of executing a batch of bets.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionReport {
    pub placed: Vec<BetReceipt>,
    pub failed: Vec<FailedBet>,
    pub total_committed: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedBet {
    pub slug: String,
    pub side: Side,
    pub amount: Decimal,
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

pub struct Executor {
    dry_run: bool,
}

impl Executor {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Place a single bet.
    pub async fn place(
        &self,
        platform: &dyn PredictionPlatform,
        api_key: Option<&SecretString>,
        slug: &str,
        side: Side,
        amount: Decimal,
    ) -> Result<BetReceipt, TrackerError> {
        if amount <= Decimal::ZERO {
            return Err(TrackerError::InvalidAmount(amount));
        }

        if self.dry_run {
            info!(slug, side = %side, amount = %amount, "[DRY RUN] Would place bet");
            return Ok(BetReceipt {
                bet_id: format!("dry-run-{}", uuid::Uuid::new_v4()),
                slug: slug.to_string(),
                side,
                amount,
                prob_after: 0.0,
                timestamp: Utc::now(),
            });
        }

        let key = api_key
            .map(|k| k.expose_secret().trim())
            .filter(|k| !k.is_empty())
            .ok_or(TrackerError::MissingApiKey)?;

        platform
            .place_bet_by_slug(key, slug, amount, side)
            .await
            .map_err(|e| TrackerError::Bet {
                slug: slug.to_string(),
                message: format!("{e:#}"),
            })
    }

    /// Execute a batch of sized bets one after another. A failed bet is
    /// recorded and the batch carries on.
    pub async fn execute_batch(
        &self,
        platform: &dyn PredictionPlatform,
        api_key: Option<&SecretString>,
        bets: &[SizedBet],
    ) -> ExecutionReport {
        let mut report = ExecutionReport::default();

        if bets.is_empty() {
            return report;
        }

        info!(count = bets.len(), dry_run = self.dry_run, "Executing batch");

        for bet in bets {
            match self.place(platform, api_key, &bet.slug, bet.side, bet.amount).await {
                Ok(receipt) => {
                    report.total_committed += receipt.amount;
                    report.placed.push(receipt);
                }
                Err(e) => {
                    warn!(slug = %bet.slug, error = %e, "Bet failed");
                    report.failed.push(FailedBet {
                        slug: bet.slug.clone(),
                        side: bet.side,
                        amount: bet.amount,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            placed = report.placed.len(),
            failed = report.failed.len(),
            committed = %report.total_committed,
            "Batch complete"
        );

        report
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
