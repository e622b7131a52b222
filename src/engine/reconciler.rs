//! Estimate → row reconciliation.
//!
//! Diffs the user's estimate list against the estimates implied by the
//! current rows, drops rows for removed markets, fetches fresh quotes only
//! for added or changed markets, and returns the new (sorted) row set.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use super::sorter::sort_rows;
use crate::platforms::PredictionPlatform;
use crate::strategy::edge::EdgeCalculator;
use crate::types::{EdgeRow, SortOrder, TrackerError, UserEstimate};

/// Default number of market fetches in flight at once.
pub const DEFAULT_FETCH_CONCURRENCY: usize = 8;

// ---------------------------------------------------------------------------
// Diff
// ---------------------------------------------------------------------------

/// What changed between the tracked rows and a new estimate list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EstimateDiff {
    pub added: Vec<UserEstimate>,
    pub updated: Vec<UserEstimate>,
    pub removed: Vec<String>,
}

impl EstimateDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// Compare by slug. For duplicate slugs in `estimates` the first one wins.
pub fn diff(rows: &[EdgeRow], estimates: &[UserEstimate]) -> EstimateDiff {
    let old: HashMap<&str, f64> = rows
        .iter()
        .map(|r| (r.slug.as_str(), r.user_probability))
        .collect();

    let mut seen = HashSet::new();
    let mut out = EstimateDiff::default();

    for est in estimates {
        if !seen.insert(est.slug.as_str()) {
            continue;
        }
        match old.get(est.slug.as_str()) {
            None => out.added.push(est.clone()),
            Some(&p) if p != est.probability => out.updated.push(est.clone()),
            Some(_) => {}
        }
    }

    let mut removed_seen = HashSet::new();
    out.removed = rows
        .iter()
        .filter(|r| !seen.contains(r.slug.as_str()))
        .filter(|r| removed_seen.insert(r.slug.as_str()))
        .map(|r| r.slug.clone())
        .collect();

    out
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// A market whose row could not be (re)built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowFailure {
    pub slug: String,
    pub error: String,
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileOutcome {
    pub rows: Vec<EdgeRow>,
    pub added: Vec<String>,
    pub updated: Vec<String>,
    pub removed: Vec<String>,
    pub failures: Vec<RowFailure>,
    /// Set when the final sort failed; rows are then in merge order.
    pub sort_error: Option<String>,
}

impl ReconcileOutcome {
    fn unchanged(rows: &[EdgeRow]) -> Self {
        Self {
            rows: rows.to_vec(),
            ..Default::default()
        }
    }

    pub fn is_noop(&self) -> bool {
        self.added.is_empty()
            && self.updated.is_empty()
            && self.removed.is_empty()
            && self.failures.is_empty()
    }
}

/// Fetch the quote for one estimate and compute its row.
pub async fn compute_row(
    platform: &dyn PredictionPlatform,
    estimate: &UserEstimate,
) -> Result<EdgeRow, TrackerError> {
    let quote = platform
        .market_by_slug(&estimate.slug)
        .await
        .map_err(|e| TrackerError::Fetch {
            slug: estimate.slug.clone(),
            message: format!("{e:#}"),
        })?;
    EdgeCalculator::row(&quote, estimate)
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

pub struct Reconciler {
    concurrency: usize,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(DEFAULT_FETCH_CONCURRENCY)
    }
}

impl Reconciler {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    /// Bring `rows` in line with `estimates`.
    ///
    /// Removed markets disappear without any fetch. Added and updated
    /// markets are fetched concurrently; each successful row is merged as
    /// its fetch completes (an updated row replaces its predecessor). A
    /// failed fetch drops an added market and leaves an updated one at its
    /// previous snapshot, so the next pass retries it.
    pub async fn reconcile(
        &self,
        platform: &dyn PredictionPlatform,
        rows: &[EdgeRow],
        estimates: &[UserEstimate],
        order: SortOrder,
    ) -> ReconcileOutcome {
        let diff = diff(rows, estimates);
        if diff.is_empty() {
            debug!(rows = rows.len(), "Estimates unchanged, nothing to reconcile");
            return ReconcileOutcome::unchanged(rows);
        }

        info!(
            added = diff.added.len(),
            updated = diff.updated.len(),
            removed = diff.removed.len(),
            "Reconciling estimates"
        );

        let removed: HashSet<&str> = diff.removed.iter().map(String::as_str).collect();
        let mut next: Vec<EdgeRow> = rows
            .iter()
            .filter(|r| !removed.contains(r.slug.as_str()))
            .cloned()
            .collect();

        let changed: Vec<&UserEstimate> = diff.added.iter().chain(diff.updated.iter()).collect();

        // Futures are built up front; a lazy `map` over borrowed estimates
        // leaves the whole future without a provable `Send`.
        let fetches: Vec<_> = changed
            .into_iter()
            .map(|est| async move { (est, compute_row(platform, est).await) })
            .collect();
        let results: Vec<(&UserEstimate, Result<EdgeRow, TrackerError>)> = stream::iter(fetches)
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut outcome = ReconcileOutcome {
            removed: diff.removed.clone(),
            ..Default::default()
        };
        let updated: HashSet<&str> = diff.updated.iter().map(|e| e.slug.as_str()).collect();

        for (est, result) in results {
            match result {
                Ok(row) => {
                    match next.iter_mut().find(|r| r.slug == row.slug) {
                        Some(existing) => *existing = row,
                        None => next.push(row),
                    }
                    if updated.contains(est.slug.as_str()) {
                        outcome.updated.push(est.slug.clone());
                    } else {
                        outcome.added.push(est.slug.clone());
                    }
                }
                Err(e) => {
                    warn!(slug = %est.slug, error = %e, "Row not refreshed");
                    outcome.failures.push(RowFailure {
                        slug: est.slug.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if let Err(e) = sort_rows(&mut next, order) {
            warn!(error = %e, "Sorting failed, leaving rows unsorted");
            outcome.sort_error = Some(e.to_string());
        }

        outcome.rows = next;
        outcome
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
