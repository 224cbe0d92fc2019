//! Scroll-driven listing walk.
//!
//! One sequential actor: scroll by a fixed delta, let lazy content settle,
//! discover item elements, click each unseen one exactly once (the page
//! supports a single open detail view, so clicks are never parallel), then
//! re-read the scroll geometry and stop once the bottom is reached. A step
//! that surfaces zero new items keeps going — content may still be loading;
//! only the geometry check terminates the walk.

use std::collections::HashSet;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::extractor::ExtractError;
use super::page::{ItemHandle, ListingSurface};
use crate::core::config::ScoutConfig;
use crate::core::types::WalkStats;

/// Timing and stepping knobs for one walk. Split out of [`ScoutConfig`] so
/// tests can run with zeroed delays.
#[derive(Debug, Clone)]
pub struct WalkConfig {
    pub scroll_step: i64,
    pub settle_ms: u64,
    pub detail_open_ms: u64,
    pub detail_close_ms: u64,
}

impl From<&ScoutConfig> for WalkConfig {
    fn from(cfg: &ScoutConfig) -> Self {
        Self {
            scroll_step: cfg.scroll_step,
            settle_ms: cfg.settle_ms,
            detail_open_ms: cfg.detail_open_ms,
            detail_close_ms: cfg.detail_close_ms,
        }
    }
}

pub struct Walker {
    config: WalkConfig,
    cancel: CancellationToken,
    seen: HashSet<String>,
    stats: WalkStats,
}

impl Walker {
    pub fn new(config: WalkConfig, cancel: CancellationToken) -> Self {
        Self {
            config,
            cancel,
            seen: HashSet::new(),
            stats: WalkStats::default(),
        }
    }

    /// Run until the page bottom is reached (or the token fires). Per-item
    /// failures are counted and skipped; page-level failures (scroll or
    /// geometry reads going dark) abort the walk.
    pub async fn walk<S: ListingSurface>(mut self, page: &S) -> Result<WalkStats, ExtractError> {
        loop {
            page.scroll_by(self.config.scroll_step).await?;
            self.pause(self.config.settle_ms).await?;
            self.stats.scroll_steps += 1;

            let items = page.listing_items().await?;
            debug!(
                step = self.stats.scroll_steps,
                visible = items.len(),
                "listing pass"
            );

            for item in &items {
                let id = match item.identifier().await {
                    Ok(Some(id)) => id,
                    Ok(None) => {
                        warn!("listing entry without identifier attribute, skipping");
                        self.stats.missing_identifiers += 1;
                        continue;
                    }
                    Err(e) => {
                        warn!("identifier read failed, skipping entry: {e:#}");
                        self.stats.missing_identifiers += 1;
                        continue;
                    }
                };

                // Insert-before-click: even if the click fails, the item is
                // never retried on a later pass.
                if !self.seen.insert(id.clone()) {
                    self.stats.duplicates_skipped += 1;
                    continue;
                }

                debug!(item = %id, "opening detail view");
                if let Err(e) = self.open_and_dismiss(page, item).await {
                    match e {
                        ExtractError::Cancelled => return Err(ExtractError::Cancelled),
                        e => {
                            warn!(item = %id, "detail open/dismiss failed: {e}");
                            self.stats.item_failures += 1;
                        }
                    }
                }
            }

            let state = page.scroll_state().await?;
            debug!(
                offset = state.offset,
                viewport = state.viewport,
                total = state.total,
                "scroll geometry"
            );
            if state.at_bottom() {
                info!(
                    steps = self.stats.scroll_steps,
                    clicked = self.stats.clicks_issued,
                    "reached bottom of listing"
                );
                return Ok(self.stats);
            }
        }
    }

    async fn open_and_dismiss<S: ListingSurface>(
        &mut self,
        page: &S,
        item: &S::Item,
    ) -> Result<(), ExtractError> {
        item.open_detail().await?;
        self.stats.clicks_issued += 1;
        self.pause(self.config.detail_open_ms).await?;
        page.dismiss_detail().await?;
        self.pause(self.config.detail_close_ms).await?;
        Ok(())
    }

    /// Fixed settle delay; doubles as the walk's cancellation point.
    async fn pause(&self, ms: u64) -> Result<(), ExtractError> {
        if self.cancel.is_cancelled() {
            return Err(ExtractError::Cancelled);
        }
        tokio::select! {
            _ = self.cancel.cancelled() => Err(ExtractError::Cancelled),
            _ = tokio::time::sleep(Duration::from_millis(ms)) => Ok(()),
        }
    }
}
