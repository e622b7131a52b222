//! Spreadsheet import.
//!
//! Accepts text pasted from a spreadsheet: one market per line, slug (or
//! market URL) and probability in percent separated by a tab.

use serde::Serialize;
use std::collections::HashSet;
use tracing::{info, warn};

use super::reconciler::{compute_row, RowFailure};
use super::sorter::sort_rows;
use crate::platforms::manifold::extract_slug_from_url;
use crate::platforms::PredictionPlatform;
use crate::types::{percent_to_probability, EdgeRow, SortOrder, UserEstimate};

/// A line that could not be turned into an estimate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedLine {
    /// 1-based line number within the trimmed input.
    pub line: usize,
    pub content: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedSheet {
    pub estimates: Vec<UserEstimate>,
    pub rejected: Vec<RejectedLine>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    /// Sorted by ROI, best first.
    pub rows: Vec<EdgeRow>,
    pub estimates: Vec<UserEstimate>,
    pub rejected: Vec<RejectedLine>,
    pub failures: Vec<RowFailure>,
}

fn parse_line(line: &str) -> Result<UserEstimate, String> {
    let mut columns = line.split('\t');
    let first = columns.next().unwrap_or_default().trim();
    let slug = extract_slug_from_url(first).ok_or_else(|| "missing market slug".to_string())?;

    let percent = columns
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| "missing probability column".to_string())?;
    let value: f64 = percent
        .trim_end_matches('%')
        .trim()
        .parse()
        .map_err(|_| format!("probability {percent:?} is not a number"))?;
    let probability = percent_to_probability(value).map_err(|e| e.to_string())?;

    Ok(UserEstimate { slug, probability })
}

/// Parse pasted text. Blank lines are skipped; malformed lines and repeated
/// slugs are reported instead of producing rows.
pub fn parse_spreadsheet(raw: &str) -> ParsedSheet {
    let mut sheet = ParsedSheet::default();
    let mut seen = HashSet::new();

    for (idx, line) in raw.trim().split('\n').enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        let reject = |reason: String| RejectedLine {
            line: idx + 1,
            content: line.to_string(),
            reason,
        };

        match parse_line(line) {
            Ok(est) if !seen.insert(est.slug.clone()) => {
                sheet.rejected.push(reject(format!("duplicate slug {}", est.slug)));
            }
            Ok(est) => sheet.estimates.push(est),
            Err(reason) => sheet.rejected.push(reject(reason)),
        }
    }

    sheet
}

/// Parse `raw` and build a row for every valid line, fetching markets one
/// at a time in input order.
pub async fn import_spreadsheet(platform: &dyn PredictionPlatform, raw: &str) -> ImportReport {
    let ParsedSheet { estimates, rejected } = parse_spreadsheet(raw);
    for r in &rejected {
        warn!(line = r.line, reason = %r.reason, "Spreadsheet line rejected");
    }

    let mut report = ImportReport {
        rejected,
        ..Default::default()
    };

    for est in &estimates {
        match compute_row(platform, est).await {
            Ok(row) => report.rows.push(row),
            Err(e) => {
                warn!(slug = %est.slug, error = %e, "Imported market not added");
                report.failures.push(RowFailure {
                    slug: est.slug.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    if let Err(e) = sort_rows(&mut report.rows, SortOrder::by_roi_desc()) {
        warn!(error = %e, "Imported rows could not be sorted by ROI");
    }

    info!(
        rows = report.rows.len(),
        rejected = report.rejected.len(),
        failed = report.failures.len(),
        "Spreadsheet imported"
    );

    report.estimates = estimates;
    report
}
