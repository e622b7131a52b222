//! End-to-end tracker flows: import, reconcile, sort, persist, bet.

use rust_decimal_macros::dec;
use secrecy::SecretString;
use std::path::PathBuf;
use std::sync::Arc;

use edgetrack::engine::{Tracker, TrackerSettings};
use edgetrack::storage::{FileStore, MemoryStore};
use edgetrack::types::*;

use crate::mock_platform::MockPlatform;

fn temp_state_file() -> PathBuf {
    std::env::temp_dir().join(format!("edgetrack_it_{}.json", uuid::Uuid::new_v4()))
}

fn tracker(platform: &Arc<MockPlatform>) -> Tracker {
    Tracker::new(
        platform.clone(),
        Arc::new(MemoryStore::new()),
        TrackerSettings::default(),
    )
}

fn slugs(tracker: &Tracker) -> Vec<&str> {
    tracker.rows().iter().map(|r| r.slug.as_str()).collect()
}

#[tokio::test]
async fn test_import_reports_every_problem_line() {
    let platform = Arc::new(MockPlatform::new(dec!(1000)));
    let mut t = tracker(&platform);

    let report = t
        .import("rain-tomorrow\t60\nrate-cut\t45%\nresolved-yes\t90\n\nbad line\nunknown\t10")
        .await;

    assert_eq!(slugs(&t), ["rain-tomorrow", "rate-cut"]);
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(report.rejected[0].line, 5);

    let failed: Vec<&str> = report.failures.iter().map(|f| f.slug.as_str()).collect();
    assert_eq!(failed, ["resolved-yes", "unknown"]);
    assert!(report.failures[0].error.contains("strictly between 0 and 1"));
    assert_eq!(platform.fetches().len(), 4);

    let tracked: Vec<&str> = t.estimates().iter().map(|e| e.slug.as_str()).collect();
    assert_eq!(tracked, ["rain-tomorrow", "rate-cut"]);
}

#[tokio::test]
async fn test_identical_estimates_do_not_refetch() {
    let platform = Arc::new(MockPlatform::new(dec!(1000)));
    let mut t = tracker(&platform);
    t.import("rain-tomorrow\t60\nrate-cut\t45").await;
    let before = t.rows().to_vec();
    platform.reset_fetches();

    let same = t.estimates().to_vec();
    let outcome = t.set_estimates(same).await;

    assert!(outcome.is_noop());
    assert!(platform.fetches().is_empty());
    assert_eq!(t.rows(), before.as_slice());
}

#[tokio::test]
async fn test_edit_refetches_only_the_changed_market() {
    let platform = Arc::new(MockPlatform::new(dec!(1000)));
    let mut t = tracker(&platform);
    t.import("rain-tomorrow\t60\nrate-cut\t45\ngrand-final\t70").await;
    platform.reset_fetches();

    let outcome = t.set_probability("rate-cut", 10.0).await.unwrap();

    assert_eq!(outcome.updated, ["rate-cut"]);
    assert_eq!(platform.fetches(), ["rate-cut"]);
    assert_eq!(t.rows().len(), 3);
    let row = t.rows().iter().find(|r| r.slug == "rate-cut").unwrap();
    assert_eq!(row.side, Side::No);
}

#[tokio::test]
async fn test_unknown_market_is_not_retried_on_later_edits() {
    let platform = Arc::new(MockPlatform::new(dec!(1000)));
    let mut t = tracker(&platform);
    t.select_market("rain-tomorrow", 0.6).await.unwrap();

    let outcome = t
        .select_market("https://manifold.markets/mock/ghost", 0.5)
        .await
        .unwrap()
        .unwrap();
    assert!(outcome.added.is_empty());
    assert_eq!(outcome.failures[0].slug, "ghost");
    assert!(!t.is_tracked("ghost"));

    platform.reset_fetches();
    t.set_probability("rain-tomorrow", 70.0).await.unwrap();
    assert_eq!(platform.fetches(), ["rain-tomorrow"]);

    // The user may pick it again; it is a fresh add, not a duplicate.
    assert!(t.select_market("ghost", 0.5).await.unwrap().is_some());
}

#[tokio::test]
async fn test_remove_needs_no_fetch() {
    let platform = Arc::new(MockPlatform::new(dec!(1000)));
    let mut t = tracker(&platform);
    t.import("rain-tomorrow\t60\nrate-cut\t45\ngrand-final\t70").await;
    platform.reset_fetches();

    t.remove("rain-tomorrow").unwrap();

    assert!(platform.fetches().is_empty());
    assert_eq!(t.rows().len(), 2);
    assert!(!t.is_tracked("rain-tomorrow"));
}

#[tokio::test]
async fn test_sort_by_slug_both_ways() {
    let platform = Arc::new(MockPlatform::new(dec!(1000)));
    let mut t = tracker(&platform);
    t.import("snap-election\t30\nrain-tomorrow\t60").await;

    t.sort_by(SortKey::Slug, SortDirection::Asc).unwrap();
    assert_eq!(slugs(&t), ["rain-tomorrow", "snap-election"]);
    t.sort_by(SortKey::Slug, SortDirection::Desc).unwrap();
    assert_eq!(slugs(&t), ["snap-election", "rain-tomorrow"]);

    // Action columns leave the order alone.
    t.sort_by(SortKey::Bet, SortDirection::Asc).unwrap();
    assert_eq!(slugs(&t), ["snap-election", "rain-tomorrow"]);
}

#[tokio::test]
async fn test_state_survives_restart() {
    let path = temp_state_file();
    let platform = Arc::new(MockPlatform::new(dec!(1000)));

    {
        let store = Arc::new(FileStore::open(&path).unwrap());
        let mut t = Tracker::new(platform.clone(), store, TrackerSettings::default());
        t.import("rain-tomorrow\t60\nrate-cut\t45").await;
        t.select_market("https://manifold.markets/mock/grand-final?tab=comments", 0.7)
            .await
            .unwrap();
        t.remove("rate-cut").unwrap();
    }

    platform.reset_fetches();
    let store = Arc::new(FileStore::open(&path).unwrap());
    let t = Tracker::new(platform.clone(), store, TrackerSettings::default());

    assert!(platform.fetches().is_empty());
    assert_eq!(t.rows().len(), 2);
    assert!(t.is_tracked("grand-final"));
    assert!(!t.is_tracked("rate-cut"));
    assert_eq!(t.raw_data(), Some("rain-tomorrow\t60\nrate-cut\t45"));

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn test_corrupt_state_file_starts_empty() {
    let path = temp_state_file();
    std::fs::write(&path, "{ not json").unwrap();

    let platform = Arc::new(MockPlatform::new(dec!(1000)));
    let store = Arc::new(FileStore::open(&path).unwrap());
    let t = Tracker::new(platform, store, TrackerSettings::default());
    assert!(t.rows().is_empty());
    assert!(t.estimates().is_empty());

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn test_bet_refreshes_row_with_new_price() {
    let platform = Arc::new(MockPlatform::new(dec!(1000)));
    let mut t = tracker(&platform).with_api_key(Some(SecretString::new("key".into())));
    t.select_market("rain-tomorrow", 0.8).await.unwrap();

    let receipt = t.place_bet("rain-tomorrow", None).await.unwrap();

    assert_eq!(receipt.side, Side::Yes);
    assert_eq!(receipt.amount, dec!(100));
    assert_eq!(platform.balance(), dec!(900));
    let row = &t.rows()[0];
    assert!(row.market_probability > 0.5);
    assert_eq!(Some(row.market_probability), platform.probability("rain-tomorrow"));
}

#[tokio::test]
async fn test_failed_refresh_keeps_last_snapshot() {
    let platform = Arc::new(MockPlatform::new(dec!(1000)));
    let mut t = tracker(&platform);
    t.import("rain-tomorrow\t60\nrate-cut\t45").await;

    platform.set_probability("rain-tomorrow", 0.3);
    platform.break_market("rate-cut");
    let outcome = t.refresh().await;

    assert_eq!(outcome.updated, ["rain-tomorrow"]);
    assert_eq!(outcome.failures.len(), 1);
    let rain = t.rows().iter().find(|r| r.slug == "rain-tomorrow").unwrap();
    assert_eq!(rain.market_probability, 0.3);
    let cut = t.rows().iter().find(|r| r.slug == "rate-cut").unwrap();
    assert_eq!(cut.market_probability, 0.4);
}

#[tokio::test]
async fn test_autobet_sizes_and_places_positive_edges() {
    let platform = Arc::new(MockPlatform::new(dec!(1000)));
    let mut t = tracker(&platform).with_api_key(Some(SecretString::new("key".into())));
    // rain: YES with kelly 0.6, rate-cut: NO with kelly 0.5, snap-election: no edge
    t.import("rain-tomorrow\t80\nrate-cut\t20\nsnap-election\t25").await;

    let report = t.autobet(Some(dec!(1000))).await.unwrap();

    assert_eq!(report.placed.len(), 2);
    assert!(report.failed.is_empty());
    assert_eq!(report.total_committed, dec!(200));
    assert_eq!(platform.balance(), dec!(800));

    let sides: Vec<(String, Side)> = platform
        .get_receipts()
        .into_iter()
        .map(|r| (r.slug, r.side))
        .collect();
    assert!(sides.contains(&("rain-tomorrow".to_string(), Side::Yes)));
    assert!(sides.contains(&("rate-cut".to_string(), Side::No)));
}

#[tokio::test]
async fn test_autobet_reports_platform_failures() {
    let platform = Arc::new(MockPlatform::new(dec!(150)));
    let mut t = tracker(&platform).with_api_key(Some(SecretString::new("key".into())));
    t.import("rain-tomorrow\t80\nrate-cut\t20").await;

    let report = t.autobet(Some(dec!(1000))).await.unwrap();

    assert_eq!(report.placed.len(), 1);
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].reason.contains("Insufficient balance"));
}
