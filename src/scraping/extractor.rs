//! Session orchestration: owns the page lifecycle for one extraction run.
//!
//! Order matters here: the detail capture is registered against the page's
//! response stream *before* navigation, so no matching response can slip by;
//! the startup gate is dismissed under a bounded timeout (fatal on expiry —
//! nothing on the page is interactable behind it); only then does the walker
//! take over. The CDP connection is torn down on every exit path.

use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use chromiumoxide::{Browser, Page};
use chrono::Utc;
use futures::StreamExt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::capture::DetailCapture;
use super::page::CdpListing;
use super::walker::{WalkConfig, Walker};
use crate::core::config::ScoutConfig;
use crate::core::types::ExtractionReport;
use crate::session::SessionHandle;

/// Fatal run errors. Soft per-item and per-response failures never surface
/// here — they end up in the report's counters instead.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("session provider error: {0}")]
    Session(String),

    #[error("remote browser connection failed: {0}")]
    Connect(String),

    #[error("startup gate `{selector}` could not be dismissed: {reason}")]
    Gate { selector: String, reason: String },

    #[error("extraction cancelled")]
    Cancelled,

    #[error("page automation failed: {0}")]
    Page(#[from] anyhow::Error),
}

/// Run one full extraction against `start_url` using an already-started
/// remote browser session. The session itself is the caller's to stop; the
/// CDP connection made here is closed on every exit path.
pub async fn run_extraction<S>(
    session: &S,
    start_url: &str,
    config: &ScoutConfig,
    cancel: CancellationToken,
) -> Result<ExtractionReport, ExtractError>
where
    S: SessionHandle + ?Sized,
{
    let cdp_url = session
        .connection_endpoint()
        .await
        .map_err(|e| ExtractError::Session(format!("no CDP endpoint: {e:#}")))?;

    info!("connecting to remote browser");
    let (mut browser, mut handler) = Browser::connect(cdp_url)
        .await
        .map_err(|e| ExtractError::Connect(e.to_string()))?;
    let cdp_loop = tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                error!("CDP handler error: {e}");
            }
        }
    });

    let result = extract_on_browser(&browser, start_url, config, cancel).await;

    // Best-effort teardown — never let a close error shadow the run result.
    if let Err(e) = browser.close().await {
        warn!("browser close error (non-fatal): {e}");
    }
    cdp_loop.abort();

    result
}

async fn extract_on_browser(
    browser: &Browser,
    start_url: &str,
    config: &ScoutConfig,
    cancel: CancellationToken,
) -> Result<ExtractionReport, ExtractError> {
    let page = browser
        .new_page("about:blank")
        .await
        .map_err(|e| ExtractError::Connect(format!("failed to open page: {e}")))?;

    let (capture, mut records_rx) = DetailCapture::new(
        config.endpoint_marker.clone(),
        config.record_path.clone(),
    );
    let capture_failures = capture.failure_counter();
    let listener = capture.attach(&page).await?;

    let walked = async {
        page.goto(start_url)
            .await
            .map_err(|e| anyhow!("navigation to {start_url} failed: {e}"))?;
        wait_until_stable(&page, config.quiet_ms, config.quiesce_timeout_ms).await;

        dismiss_startup_gate(
            &page,
            &config.gate_selector,
            Duration::from_millis(config.gate_timeout_ms),
        )
        .await?;

        let listing = CdpListing::new(
            page.clone(),
            config.item_selector.clone(),
            config.id_attribute.clone(),
        );
        Walker::new(WalkConfig::from(config), cancel)
            .walk(&listing)
            .await
    }
    .await;

    // The listener task holds its own Page clone; stop it before draining so
    // the record channel is quiescent.
    listener.abort();
    drop(page);

    let stats = walked?;
    let mut records = Vec::new();
    while let Ok(record) = records_rx.try_recv() {
        records.push(record);
    }
    info!(
        records = records.len(),
        clicked = stats.clicks_issued,
        "extraction complete"
    );

    Ok(ExtractionReport {
        records,
        stats,
        capture_failures: capture_failures.load(Ordering::Relaxed),
        finished_at: Utc::now().to_rfc3339(),
    })
}

/// Locate and click the startup-gate control, failing fast if it never
/// appears: nothing further on the page is interactable without it.
async fn dismiss_startup_gate(
    page: &Page,
    selector: &str,
    timeout: Duration,
) -> Result<(), ExtractError> {
    let gate = |reason: String| ExtractError::Gate {
        selector: selector.to_string(),
        reason,
    };

    let found = tokio::time::timeout(timeout, async {
        loop {
            match page.find_element(selector).await {
                Ok(el) => return el,
                Err(_) => tokio::time::sleep(Duration::from_millis(250)).await,
            }
        }
    })
    .await;

    match found {
        Ok(el) => {
            el.click()
                .await
                .map_err(|e| gate(format!("click failed: {e}")))?;
            info!("startup gate dismissed");
            Ok(())
        }
        Err(_) => Err(gate(format!("not found within {}ms", timeout.as_millis()))),
    }
}

/// Wait until the page network goes idle (no new resource entries for
/// `quiet_ms` consecutive ms) or until `timeout_ms` elapses. Polls
/// `performance.getEntriesByType("resource").length` — a networkidle
/// heuristic that needs no extra CDP event plumbing.
async fn wait_until_stable(page: &Page, quiet_ms: u64, timeout_ms: u64) {
    let poll = Duration::from_millis(250);
    let start = Instant::now();
    let mut last_count: u64 = 0;
    let mut stable_since = Instant::now();

    loop {
        if start.elapsed().as_millis() as u64 >= timeout_ms {
            info!("navigation settle: timeout after {timeout_ms}ms");
            return;
        }

        let count: u64 = page
            .evaluate("performance.getEntriesByType('resource').length")
            .await
            .ok()
            .and_then(|v| v.into_value::<serde_json::Value>().ok())
            .and_then(|j| j.as_u64())
            .unwrap_or(0);

        let ready: bool = page
            .evaluate("document.readyState")
            .await
            .ok()
            .and_then(|v| v.into_value::<serde_json::Value>().ok())
            .and_then(|j| j.as_str().map(|s| s == "complete"))
            .unwrap_or(false);

        if !ready || count != last_count {
            last_count = count;
            stable_since = Instant::now();
        } else if stable_since.elapsed().as_millis() as u64 >= quiet_ms {
            info!(
                "navigation settle: idle after {}ms ({count} resources)",
                start.elapsed().as_millis()
            );
            return;
        }

        tokio::time::sleep(poll).await;
    }
}
