//! Core engine — the tracker session.
//!
//! `Tracker` owns the user's estimates and the derived rows. Every mutation
//! reconciles the rows against the new estimate list, persists what
//! changed and hands back a structured outcome for the caller to display.

pub mod executor;
pub mod importer;
pub mod reconciler;
pub mod sorter;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use secrecy::SecretString;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::platforms::manifold::extract_slug_from_url;
use crate::platforms::PredictionPlatform;
use crate::storage::{self, StateStore};
use crate::strategy::kelly::{KellyCalculator, KellyConfig};
use crate::types::{
    percent_to_probability, BetReceipt, EdgeRow, SortDirection, SortKey, SortOrder, TrackerError,
    UserEstimate,
};
use executor::{ExecutionReport, Executor};
use importer::{import_spreadsheet, ImportReport};
use reconciler::{compute_row, ReconcileOutcome, Reconciler, DEFAULT_FETCH_CONCURRENCY};
use sorter::sort_rows;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TrackerSettings {
    /// Stake for a single "bet" action, in mana.
    pub default_bet: Decimal,
    /// Budget for an auto-bet pass, in mana.
    pub autobet_budget: Decimal,
    pub dry_run: bool,
    pub fetch_concurrency: usize,
    pub sort: SortOrder,
    pub kelly: KellyConfig,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            default_bet: dec!(100),
            autobet_budget: dec!(1000),
            dry_run: false,
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
            sort: SortOrder::by_roi_desc(),
            kelly: KellyConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

pub struct Tracker {
    platform: Arc<dyn PredictionPlatform>,
    store: Arc<dyn StateStore>,
    reconciler: Reconciler,
    kelly: KellyCalculator,
    executor: Executor,
    default_bet: Decimal,
    autobet_budget: Decimal,
    api_key: Option<SecretString>,
    estimates: Vec<UserEstimate>,
    rows: Vec<EdgeRow>,
    raw_data: Option<String>,
    order: SortOrder,
}

fn dedup_estimates(estimates: Vec<UserEstimate>) -> Vec<UserEstimate> {
    let mut seen = HashSet::new();
    estimates
        .into_iter()
        .filter(|e| seen.insert(e.slug.clone()))
        .collect()
}

/// Keep only estimates that have a row. A market whose first fetch failed
/// is not tracked at all; the returned slugs are the ones dropped.
fn retain_with_rows(estimates: &mut Vec<UserEstimate>, rows: &[EdgeRow]) -> Vec<String> {
    let with_row: HashSet<&str> = rows.iter().map(|r| r.slug.as_str()).collect();
    let mut dropped = Vec::new();
    estimates.retain(|e| {
        let keep = with_row.contains(e.slug.as_str());
        if !keep {
            dropped.push(e.slug.clone());
        }
        keep
    });
    dropped
}

impl Tracker {
    /// Build a tracker, restoring whatever the store holds.
    pub fn new(
        platform: Arc<dyn PredictionPlatform>,
        store: Arc<dyn StateStore>,
        settings: TrackerSettings,
    ) -> Self {
        let snapshot = storage::load_snapshot(store.as_ref());

        let mut rows = snapshot.rows;
        if let Err(e) = sort_rows(&mut rows, settings.sort) {
            warn!(error = %e, "Restored rows could not be sorted");
        }

        // Rows saved without their estimate list still imply one.
        let mut estimates = if snapshot.estimates.is_empty() {
            rows.iter().map(EdgeRow::estimate).collect()
        } else {
            dedup_estimates(snapshot.estimates)
        };
        let dropped = retain_with_rows(&mut estimates, &rows);
        if !dropped.is_empty() {
            warn!(?dropped, "Saved estimates without a row were dropped");
        }

        info!(
            rows = rows.len(),
            estimates = estimates.len(),
            sort = %settings.sort.key,
            direction = %settings.sort.direction,
            "Tracker ready"
        );

        Self {
            platform,
            store,
            reconciler: Reconciler::new(settings.fetch_concurrency),
            kelly: KellyCalculator::new(settings.kelly),
            executor: Executor::new(settings.dry_run),
            default_bet: settings.default_bet,
            autobet_budget: settings.autobet_budget,
            api_key: None,
            estimates,
            rows,
            raw_data: snapshot.raw_data,
            order: settings.sort,
        }
    }

    pub fn with_api_key(mut self, api_key: Option<SecretString>) -> Self {
        self.api_key = api_key;
        self
    }

    // -- Accessors -------------------------------------------------------

    pub fn rows(&self) -> &[EdgeRow] {
        &self.rows
    }

    pub fn estimates(&self) -> &[UserEstimate] {
        &self.estimates
    }

    pub fn raw_data(&self) -> Option<&str> {
        self.raw_data.as_deref()
    }

    pub fn sort_order(&self) -> SortOrder {
        self.order
    }

    pub fn default_bet(&self) -> Decimal {
        self.default_bet
    }

    pub fn autobet_budget(&self) -> Decimal {
        self.autobet_budget
    }

    pub fn is_dry_run(&self) -> bool {
        self.executor.is_dry_run()
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn platform(&self) -> Arc<dyn PredictionPlatform> {
        Arc::clone(&self.platform)
    }

    pub fn is_tracked(&self, slug: &str) -> bool {
        self.estimates.iter().any(|e| e.slug == slug) || self.rows.iter().any(|r| r.slug == slug)
    }

    /// Replace the API key used for betting. Blank input clears it.
    pub fn set_api_key(&mut self, api_key: Option<String>) {
        self.api_key = api_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .map(SecretString::new);
        info!(configured = self.api_key.is_some(), "API key updated");
    }

    // -- Mutations -------------------------------------------------------

    /// Replace the estimate list and reconcile the rows against it.
    pub async fn set_estimates(&mut self, estimates: Vec<UserEstimate>) -> ReconcileOutcome {
        let mut estimates = dedup_estimates(estimates);
        let outcome = self
            .reconciler
            .reconcile(self.platform.as_ref(), &self.rows, &estimates, self.order)
            .await;

        let dropped = retain_with_rows(&mut estimates, &outcome.rows);
        if !dropped.is_empty() {
            info!(?dropped, "Markets not added");
        }
        self.estimates = estimates;
        self.rows = outcome.rows.clone();
        self.persist_estimates();
        if !outcome.is_noop() {
            self.persist_rows();
        }
        outcome
    }

    /// Add a market picked in the search widget. Already tracked markets
    /// are left alone and `None` is returned.
    pub async fn select_market(
        &mut self,
        url: &str,
        probability: f64,
    ) -> Result<Option<ReconcileOutcome>, TrackerError> {
        let slug =
            extract_slug_from_url(url).ok_or_else(|| TrackerError::InvalidUrl(url.to_string()))?;
        let estimate = UserEstimate::new(slug, probability)?;

        if self.is_tracked(&estimate.slug) {
            debug!(slug = %estimate.slug, "Market already tracked");
            return Ok(None);
        }

        info!(slug = %estimate.slug, probability, "Market selected");
        let mut next = Vec::with_capacity(self.estimates.len() + 1);
        next.push(estimate);
        next.extend(self.estimates.iter().cloned());
        Ok(Some(self.set_estimates(next).await))
    }

    /// Change the user's probability for a tracked market, given in percent.
    pub async fn set_probability(
        &mut self,
        slug: &str,
        percent: f64,
    ) -> Result<ReconcileOutcome, TrackerError> {
        let probability = percent_to_probability(percent)?;
        let pos = self
            .estimates
            .iter()
            .position(|e| e.slug == slug)
            .ok_or_else(|| TrackerError::NotTracked(slug.to_string()))?;

        let mut next = self.estimates.clone();
        next[pos].probability = probability;
        Ok(self.set_estimates(next).await)
    }

    /// Stop tracking a market. Its row disappears immediately.
    pub fn remove(&mut self, slug: &str) -> Result<(), TrackerError> {
        let before = (self.estimates.len(), self.rows.len());
        self.estimates.retain(|e| e.slug != slug);
        self.rows.retain(|r| r.slug != slug);

        if before == (self.estimates.len(), self.rows.len()) {
            return Err(TrackerError::NotTracked(slug.to_string()));
        }

        info!(slug, "Market removed");
        self.persist_estimates();
        self.persist_rows();
        Ok(())
    }

    /// Replace everything with the markets in a pasted spreadsheet.
    pub async fn import(&mut self, raw: &str) -> ImportReport {
        let report = import_spreadsheet(self.platform.as_ref(), raw).await;

        self.raw_data = Some(raw.to_string());
        self.estimates = report.estimates.clone();
        self.rows = report.rows.clone();
        retain_with_rows(&mut self.estimates, &self.rows);
        if let Err(e) = sort_rows(&mut self.rows, self.order) {
            warn!(error = %e, "Imported rows could not be sorted");
        }

        if let Err(e) = storage::save_raw_data(self.store.as_ref(), raw) {
            warn!(error = %e, "Failed to save raw spreadsheet data");
        }
        self.persist_estimates();
        self.persist_rows();
        report
    }

    /// Re-fetch every tracked market. Rows whose fetch fails keep their
    /// last snapshot.
    pub async fn refresh(&mut self) -> ReconcileOutcome {
        let mut outcome = self
            .reconciler
            .reconcile(self.platform.as_ref(), &[], &self.estimates, self.order)
            .await;

        let had_row: HashSet<&str> = self.rows.iter().map(|r| r.slug.as_str()).collect();
        let (updated, added): (Vec<String>, Vec<String>) = outcome
            .added
            .drain(..)
            .partition(|slug| had_row.contains(slug.as_str()));
        outcome.updated = updated;
        outcome.added = added;

        let mut kept = 0;
        for failure in &outcome.failures {
            if let Some(old) = self.rows.iter().find(|r| r.slug == failure.slug) {
                outcome.rows.push(old.clone());
                kept += 1;
            }
        }
        if kept > 0 {
            if let Err(e) = sort_rows(&mut outcome.rows, self.order) {
                outcome.sort_error = Some(e.to_string());
            }
        }

        info!(
            refreshed = outcome.updated.len() + outcome.added.len(),
            stale = kept,
            "Rows refreshed"
        );

        self.rows = outcome.rows.clone();
        if !retain_with_rows(&mut self.estimates, &self.rows).is_empty() {
            self.persist_estimates();
        }
        self.persist_rows();
        outcome
    }

    /// Sort the table. On failure the rows and the current order are kept.
    pub fn sort_by(&mut self, key: SortKey, direction: SortDirection) -> Result<(), TrackerError> {
        let order = SortOrder::new(key, direction);
        sort_rows(&mut self.rows, order)?;
        self.order = order;
        Ok(())
    }

    /// Header click: the same column flips direction, a new column starts
    /// descending. This differs from flipping on every click, which would
    /// open a new column in whatever direction the previous one was left.
    pub fn toggle_sort(&mut self, key: SortKey) -> Result<SortOrder, TrackerError> {
        let direction = if key == self.order.key {
            self.order.direction.toggled()
        } else {
            SortDirection::Desc
        };
        self.sort_by(key, direction)?;
        Ok(self.order)
    }

    /// Bet on the recommended side of a tracked market.
    pub async fn place_bet(
        &mut self,
        slug: &str,
        amount: Option<Decimal>,
    ) -> Result<BetReceipt, TrackerError> {
        let row = self
            .rows
            .iter()
            .find(|r| r.slug == slug)
            .ok_or_else(|| TrackerError::NotTracked(slug.to_string()))?;
        let side = row.side;
        let estimate = row.estimate();
        let amount = amount.unwrap_or(self.default_bet);

        let receipt = self
            .executor
            .place(self.platform.as_ref(), self.api_key.as_ref(), slug, side, amount)
            .await?;

        if !self.executor.is_dry_run() {
            self.refresh_row(&estimate).await;
        }
        Ok(receipt)
    }

    /// Size and place bets on every row with an edge.
    pub async fn autobet(&mut self, budget: Option<Decimal>) -> Result<ExecutionReport, TrackerError> {
        if !self.executor.is_dry_run() && self.api_key.is_none() {
            return Err(TrackerError::MissingApiKey);
        }
        let budget = budget.unwrap_or(self.autobet_budget);
        if budget <= Decimal::ZERO {
            return Err(TrackerError::InvalidAmount(budget));
        }

        let bets = self.kelly.allocate(&self.rows, budget);
        info!(budget = %budget, bets = bets.len(), "Auto-betting");

        let report = self
            .executor
            .execute_batch(self.platform.as_ref(), self.api_key.as_ref(), &bets)
            .await;

        if !report.placed.is_empty() && !self.executor.is_dry_run() {
            self.refresh().await;
        }
        Ok(report)
    }

    /// Write the full state out (used on shutdown).
    pub fn persist(&self) {
        if let Some(raw) = &self.raw_data {
            if let Err(e) = storage::save_raw_data(self.store.as_ref(), raw) {
                warn!(error = %e, "Failed to save raw spreadsheet data");
            }
        }
        self.persist_estimates();
        self.persist_rows();
    }

    // -- Internal helpers ------------------------------------------------

    async fn refresh_row(&mut self, estimate: &UserEstimate) {
        match compute_row(self.platform.as_ref(), estimate).await {
            Ok(row) => {
                if let Some(existing) = self.rows.iter_mut().find(|r| r.slug == row.slug) {
                    *existing = row;
                }
                if let Err(e) = sort_rows(&mut self.rows, self.order) {
                    warn!(error = %e, "Rows could not be sorted");
                }
                self.persist_rows();
            }
            Err(e) => warn!(slug = %estimate.slug, error = %e, "Row not refreshed after bet"),
        }
    }

    fn persist_rows(&self) {
        if let Err(e) = storage::save_rows(self.store.as_ref(), &self.rows) {
            warn!(error = %e, "Failed to save rows");
        }
    }

    fn persist_estimates(&self) {
        if let Err(e) = storage::save_estimates(self.store.as_ref(), &self.estimates) {
            warn!(error = %e, "Failed to save estimates");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
