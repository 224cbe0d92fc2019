//! Response-driven capture of item-detail payloads.
//!
//! Clicking a listing item does not put its detail data in the DOM; the data
//! arrives on a background request whose timing is independent of the click
//! call's completion. `DetailCapture` therefore watches the page's response
//! stream: every response whose URL carries the endpoint marker has its body
//! fetched over CDP, parsed as JSON, and reduced along a fixed key path to
//! the detail sub-document, which is pushed onto an unbounded channel. The
//! orchestrator drains the channel once the walk completes.
//!
//! Everything here is fire-and-forget from the walker's point of view: a
//! response that cannot be turned into a record is a counted soft failure,
//! never an error.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventResponseReceived, GetResponseBodyParams,
};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::core::types::ItemRecord;

pub struct DetailCapture {
    marker: String,
    record_path: Vec<String>,
    tx: mpsc::UnboundedSender<ItemRecord>,
    soft_failures: Arc<AtomicU64>,
}

impl DetailCapture {
    /// Returns the capture and the receiving end of its record channel.
    pub fn new(
        marker: impl Into<String>,
        record_path: Vec<String>,
    ) -> (Self, mpsc::UnboundedReceiver<ItemRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                marker: marker.into(),
                record_path,
                tx,
                soft_failures: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    /// Shared soft-failure counter; clone before `attach` consumes `self`.
    pub fn failure_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.soft_failures)
    }

    fn matches(&self, url: &str) -> bool {
        url.contains(&self.marker)
    }

    fn soft_failure(&self, url: &str, what: &str) {
        self.soft_failures.fetch_add(1, Ordering::Relaxed);
        warn!("detail capture: {what} for {url}");
    }

    /// Feed one observed response body through the extraction path.
    /// Non-matching URLs are a silent no-op.
    fn ingest(&self, url: &str, body: &[u8]) {
        if !self.matches(url) {
            return;
        }
        let doc: serde_json::Value = match serde_json::from_slice(body) {
            Ok(doc) => doc,
            Err(e) => {
                self.soft_failure(url, &format!("unparseable body ({e})"));
                return;
            }
        };
        let record = self
            .record_path
            .iter()
            .try_fold(&doc, |node, key| node.get(key));
        match record {
            Some(record) => {
                debug!("detail capture: record extracted from {url}");
                // Receiver outlives the listener; a closed channel just means
                // the run is already tearing down.
                let _ = self.tx.send(record.clone());
            }
            None => {
                self.soft_failure(
                    url,
                    &format!("missing key path {:?}", self.record_path),
                );
            }
        }
    }

    /// Register against the page's response stream. Must run before
    /// navigation so no matching response is lost. The returned task lives
    /// until aborted by the orchestrator.
    pub async fn attach(self, page: &Page) -> Result<JoinHandle<()>> {
        page.execute(EnableParams::default())
            .await
            .map_err(|e| anyhow!("Network.enable failed: {e}"))?;
        let mut responses = page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(|e| anyhow!("response listener registration failed: {e}"))?;

        let page = page.clone();
        Ok(tokio::spawn(async move {
            while let Some(event) = responses.next().await {
                if !self.matches(&event.response.url) {
                    continue;
                }
                let params = GetResponseBodyParams::new(event.request_id.clone());
                match page.execute(params).await {
                    Ok(resp) => {
                        let bytes = if resp.base64_encoded {
                            match BASE64.decode(resp.body.as_bytes()) {
                                Ok(b) => b,
                                Err(e) => {
                                    self.soft_failure(
                                        &event.response.url,
                                        &format!("base64 decode failed ({e})"),
                                    );
                                    continue;
                                }
                            }
                        } else {
                            resp.body.clone().into_bytes()
                        };
                        self.ingest(&event.response.url, &bytes);
                    }
                    Err(e) => {
                        self.soft_failure(
                            &event.response.url,
                            &format!("body fetch failed ({e})"),
                        );
                    }
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture() -> (DetailCapture, mpsc::UnboundedReceiver<ItemRecord>) {
        DetailCapture::new(
            "graphql/itemPage?operation=itemPage",
            vec!["data".to_string(), "itemPage".to_string()],
        )
    }

    const MATCHING_URL: &str =
        "https://www.doordash.com/graphql/itemPage?operation=itemPage";

    #[test]
    fn matching_response_yields_the_sub_document() {
        let (cap, mut rx) = capture();
        cap.ingest(
            MATCHING_URL,
            br#"{"data":{"itemPage":{"itemHeader":{"name":"X"}}}}"#,
        );
        let record = rx.try_recv().expect("one record");
        assert_eq!(record["itemHeader"]["name"], "X");
        assert!(rx.try_recv().is_err(), "exactly one record");
        assert_eq!(cap.failure_counter().load(Ordering::Relaxed), 0);
    }

    #[test]
    fn non_matching_url_is_ignored() {
        let (cap, mut rx) = capture();
        cap.ingest(
            "https://www.doordash.com/graphql/storePage",
            br#"{"data":{"itemPage":{}}}"#,
        );
        assert!(rx.try_recv().is_err());
        assert_eq!(cap.failure_counter().load(Ordering::Relaxed), 0);
    }

    #[test]
    fn unparseable_body_is_a_soft_failure() {
        let (cap, mut rx) = capture();
        cap.ingest(MATCHING_URL, b"<html>definitely not json</html>");
        assert!(rx.try_recv().is_err());
        assert_eq!(cap.failure_counter().load(Ordering::Relaxed), 1);
    }

    #[test]
    fn missing_key_path_is_a_soft_failure() {
        let (cap, mut rx) = capture();
        cap.ingest(MATCHING_URL, br#"{"data":{"somethingElse":{}}}"#);
        assert!(rx.try_recv().is_err());
        assert_eq!(cap.failure_counter().load(Ordering::Relaxed), 1);
    }

    #[test]
    fn records_arrive_in_append_order() {
        let (cap, mut rx) = capture();
        cap.ingest(MATCHING_URL, br#"{"data":{"itemPage":{"n":1}}}"#);
        cap.ingest(MATCHING_URL, br#"{"data":{"itemPage":{"n":2}}}"#);
        assert_eq!(rx.try_recv().unwrap()["n"], 1);
        assert_eq!(rx.try_recv().unwrap()["n"], 2);
    }
}
