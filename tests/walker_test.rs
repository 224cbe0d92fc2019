//! Walk sequencing tests against a scripted listing surface: dedupe,
//! termination, liveness under slow-loading content, and soft-failure
//! handling, all without a browser.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use menu_scout::scraping::page::{ItemHandle, ListingSurface};
use menu_scout::scraping::walker::{WalkConfig, Walker};
use menu_scout::scraping::ExtractError;
use menu_scout::ScrollState;

fn fast_config() -> WalkConfig {
    WalkConfig {
        scroll_step: 720,
        settle_ms: 0,
        detail_open_ms: 0,
        detail_close_ms: 0,
    }
}

#[derive(Clone)]
struct ScriptedItem {
    id: Option<&'static str>,
    fail_click: bool,
    clicks: Arc<Mutex<HashMap<String, u32>>>,
}

#[async_trait]
impl ItemHandle for ScriptedItem {
    async fn identifier(&self) -> Result<Option<String>> {
        Ok(self.id.map(str::to_string))
    }

    async fn open_detail(&self) -> Result<()> {
        if let Some(id) = self.id {
            *self
                .clicks
                .lock()
                .unwrap()
                .entry(id.to_string())
                .or_insert(0) += 1;
        }
        if self.fail_click {
            bail!("detail pane refused to open");
        }
        Ok(())
    }
}

/// What the page looks like after the n-th scroll: the items present in the
/// DOM and the scroll offset reached.
struct Step {
    items: Vec<(Option<&'static str>, bool)>,
    offset: f64,
}

impl Step {
    fn at(offset: f64, ids: &[&'static str]) -> Self {
        Self {
            items: ids.iter().map(|id| (Some(*id), false)).collect(),
            offset,
        }
    }
}

struct ScriptedListing {
    steps: Vec<Step>,
    scrolls: AtomicUsize,
    dismissals: AtomicU64,
    clicks: Arc<Mutex<HashMap<String, u32>>>,
    viewport: f64,
    total: f64,
}

impl ScriptedListing {
    fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            scrolls: AtomicUsize::new(0),
            dismissals: AtomicU64::new(0),
            clicks: Arc::new(Mutex::new(HashMap::new())),
            viewport: 800.0,
            total: 2000.0,
        }
    }

    fn current(&self) -> &Step {
        let scrolls = self.scrolls.load(Ordering::SeqCst).max(1);
        &self.steps[(scrolls - 1).min(self.steps.len() - 1)]
    }

    fn clicks_for(&self, id: &str) -> u32 {
        self.clicks.lock().unwrap().get(id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ListingSurface for ScriptedListing {
    type Item = ScriptedItem;

    async fn scroll_by(&self, _delta: i64) -> Result<()> {
        self.scrolls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn scroll_state(&self) -> Result<ScrollState> {
        Ok(ScrollState {
            offset: self.current().offset,
            viewport: self.viewport,
            total: self.total,
        })
    }

    async fn listing_items(&self) -> Result<Vec<ScriptedItem>> {
        Ok(self
            .current()
            .items
            .iter()
            .map(|(id, fail_click)| ScriptedItem {
                id: *id,
                fail_click: *fail_click,
                clicks: Arc::clone(&self.clicks),
            })
            .collect())
    }

    async fn dismiss_detail(&self) -> Result<()> {
        self.dismissals.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn walk_terminates_exactly_when_viewport_reaches_bottom() {
    // 720px steps on a 2000px page with an 800px viewport: 720 + 800 < 2000
    // keeps going, 1440 + 800 >= 2000 stops.
    let listing = ScriptedListing::new(vec![
        Step::at(720.0, &["ITEM-1"]),
        Step::at(1440.0, &["ITEM-1", "ITEM-2"]),
    ]);

    let stats = Walker::new(fast_config(), CancellationToken::new())
        .walk(&listing)
        .await
        .unwrap();

    assert_eq!(stats.scroll_steps, 2);
    // Items surfaced on the final step are still clicked before the walk ends.
    assert_eq!(listing.clicks_for("ITEM-1"), 1);
    assert_eq!(listing.clicks_for("ITEM-2"), 1);
    // One dismissal per opened detail view.
    assert_eq!(listing.dismissals.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn rediscovered_identifier_is_clicked_only_once() {
    let listing = ScriptedListing::new(vec![
        Step::at(720.0, &["ITEM-42"]),
        Step::at(1440.0, &["ITEM-42", "ITEM-43"]),
    ]);

    let stats = Walker::new(fast_config(), CancellationToken::new())
        .walk(&listing)
        .await
        .unwrap();

    assert_eq!(listing.clicks_for("ITEM-42"), 1);
    assert_eq!(stats.clicks_issued, 2);
    assert_eq!(stats.duplicates_skipped, 1);
}

#[tokio::test]
async fn zero_new_items_step_does_not_terminate_the_walk() {
    // The middle step surfaces nothing new and the bottom is not reached:
    // the walk must keep scrolling, not bail on an empty-new-items heuristic.
    let listing = ScriptedListing::new(vec![
        Step::at(600.0, &["ITEM-1"]),
        Step::at(600.0, &["ITEM-1"]),
        Step::at(1440.0, &["ITEM-1", "ITEM-2"]),
    ]);

    let stats = Walker::new(fast_config(), CancellationToken::new())
        .walk(&listing)
        .await
        .unwrap();

    assert_eq!(stats.scroll_steps, 3);
    assert_eq!(listing.clicks_for("ITEM-2"), 1);
}

#[tokio::test]
async fn missing_identifier_is_a_soft_failure() {
    let listing = ScriptedListing::new(vec![Step {
        items: vec![(None, false), (Some("ITEM-2"), false)],
        offset: 1440.0,
    }]);

    let stats = Walker::new(fast_config(), CancellationToken::new())
        .walk(&listing)
        .await
        .unwrap();

    assert_eq!(stats.missing_identifiers, 1);
    // The walk proceeded to the next element instead of aborting.
    assert_eq!(listing.clicks_for("ITEM-2"), 1);
    assert_eq!(stats.clicks_issued, 1);
}

#[tokio::test]
async fn one_item_click_failure_does_not_abort_the_walk() {
    let listing = ScriptedListing::new(vec![Step {
        items: vec![(Some("ITEM-BAD"), true), (Some("ITEM-2"), false)],
        offset: 1440.0,
    }]);

    let stats = Walker::new(fast_config(), CancellationToken::new())
        .walk(&listing)
        .await
        .unwrap();

    assert_eq!(stats.item_failures, 1);
    assert_eq!(listing.clicks_for("ITEM-2"), 1);
    // The failed item's click never completed, so only one counted.
    assert_eq!(stats.clicks_issued, 1);
    // No dismissal was attempted for the failed item.
    assert_eq!(listing.dismissals.load(Ordering::SeqCst), 1);
}

#[test]
fn cancelled_token_stops_the_walk_at_the_next_suspension_point() {
    let listing = ScriptedListing::new(vec![Step::at(0.0, &["ITEM-1"])]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = tokio_test::block_on(Walker::new(fast_config(), cancel).walk(&listing))
        .expect_err("cancelled walk must not complete");

    assert!(matches!(err, ExtractError::Cancelled));
    assert_eq!(listing.clicks_for("ITEM-1"), 0);
}
