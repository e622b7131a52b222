//! Table sorting.
//!
//! Stable sort over one column: text columns compare lexicographically,
//! numeric columns numerically, action columns keep the current order.

use std::cmp::Ordering;

use crate::types::{EdgeRow, SortDirection, SortKey, SortOrder, SortValue, TrackerError};

fn compare(a: &EdgeRow, b: &EdgeRow, key: SortKey) -> Ordering {
    match (a.sort_value(key), b.sort_value(key)) {
        (SortValue::Text(x), SortValue::Text(y)) => x.cmp(y),
        (SortValue::Number(x), SortValue::Number(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    }
}

/// Sort `rows` in place. On error the rows are left exactly as they were.
pub fn sort_rows(rows: &mut [EdgeRow], order: SortOrder) -> Result<(), TrackerError> {
    let SortOrder { key, direction } = order;

    // NaN has no place in a total order; refuse rather than scramble.
    if let Some(bad) = rows
        .iter()
        .find(|r| matches!(r.sort_value(key), SortValue::Number(n) if n.is_nan()))
    {
        return Err(TrackerError::Sort {
            key,
            reason: format!("row {} has no numeric value", bad.slug),
        });
    }

    match direction {
        SortDirection::Asc => rows.sort_by(|a, b| compare(a, b, key)),
        SortDirection::Desc => rows.sort_by(|a, b| compare(b, a, key)),
    }
    Ok(())
}
