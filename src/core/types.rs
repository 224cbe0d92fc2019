use serde::{Deserialize, Serialize};

/// Detail payload captured from one matched network response.
///
/// The upstream schema is open-ended (whatever the store's itemPage endpoint
/// returns), so records stay as raw JSON documents and are handed to the
/// caller unmodified.
pub type ItemRecord = serde_json::Value;

/// Scroll geometry sampled from the live page.
///
/// Derived state: re-read after every scroll + settle cycle, never cached.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ScrollState {
    /// Current vertical scroll offset (`window.scrollY`).
    pub offset: f64,
    /// Viewport height (`window.innerHeight`).
    pub viewport: f64,
    /// Total scrollable content height (`document.documentElement.scrollHeight`).
    pub total: f64,
}

impl ScrollState {
    /// `true` once the viewport's lower edge has reached the end of the
    /// scrollable content.
    pub fn at_bottom(&self) -> bool {
        self.offset + self.viewport >= self.total
    }
}

/// Per-run walk counters. Every skipped or failed listing entry lands in one
/// of these, so an incomplete result set is always explainable from the logs
/// plus this struct.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct WalkStats {
    /// Scroll iterations performed before the bottom was reached.
    pub scroll_steps: u64,
    /// Detail views opened (at most one per identifier).
    pub clicks_issued: u64,
    /// Re-discovered identifiers skipped as already processed.
    pub duplicates_skipped: u64,
    /// Listing elements with no readable identifier attribute.
    pub missing_identifiers: u64,
    /// Entries whose click/dismiss sequence failed; their detail payload may
    /// be absent from the final collection.
    pub item_failures: u64,
}

/// Output of one extraction run: the captured records in arrival order,
/// plus the observability counters accumulated along the way.
#[derive(Debug, Serialize)]
pub struct ExtractionReport {
    pub records: Vec<ItemRecord>,
    pub stats: WalkStats,
    /// Matching responses that could not be turned into a record
    /// (unparseable body or missing key path).
    pub capture_failures: u64,
    /// RFC 3339 completion timestamp.
    pub finished_at: String,
}
