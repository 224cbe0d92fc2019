//! The slice of the page-automation surface the walker consumes.
//!
//! The walker is written against the `ListingSurface` / `ItemHandle` traits
//! so its sequencing guarantees can be exercised with a scripted fake;
//! `CdpListing` is the production implementation over a `chromiumoxide::Page`.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType,
};
use chromiumoxide::{Element, Page};
use tracing::debug;

use crate::core::types::ScrollState;

/// One listing entry currently present in the DOM.
#[async_trait]
pub trait ItemHandle: Send + Sync {
    /// The entry's opaque identifier attribute, if the DOM carries one.
    async fn identifier(&self) -> Result<Option<String>>;

    /// Open the entry's detail view. The detail payload arrives later on a
    /// background response, not as a result of this call.
    async fn open_detail(&self) -> Result<()>;
}

/// Scrollable listing page.
#[async_trait]
pub trait ListingSurface: Send + Sync {
    type Item: ItemHandle;

    /// Scroll the page down by `delta` CSS pixels.
    async fn scroll_by(&self, delta: i64) -> Result<()>;

    /// Current scroll geometry, read fresh from the page.
    async fn scroll_state(&self) -> Result<ScrollState>;

    /// All listing item elements currently in the DOM, in document order.
    async fn listing_items(&self) -> Result<Vec<Self::Item>>;

    /// Close whatever detail view is open (cancel key).
    async fn dismiss_detail(&self) -> Result<()>;
}

// ---------------------------------------------------------------------------
// CDP implementation
// ---------------------------------------------------------------------------

pub struct CdpListing {
    page: Page,
    item_selector: String,
    id_attribute: String,
}

impl CdpListing {
    pub fn new(
        page: Page,
        item_selector: impl Into<String>,
        id_attribute: impl Into<String>,
    ) -> Self {
        Self {
            page,
            item_selector: item_selector.into(),
            id_attribute: id_attribute.into(),
        }
    }

    async fn eval_f64(&self, script: &str) -> Result<f64> {
        self.page
            .evaluate(script)
            .await
            .map_err(|e| anyhow!("evaluate `{script}` failed: {e}"))?
            .into_value::<f64>()
            .map_err(|e| anyhow!("non-numeric result from `{script}`: {e}"))
    }
}

#[async_trait]
impl ListingSurface for CdpListing {
    type Item = CdpItem;

    async fn scroll_by(&self, delta: i64) -> Result<()> {
        self.page
            .evaluate(format!("window.scrollBy(0, {delta})"))
            .await
            .map_err(|e| anyhow!("scroll failed: {e}"))?;
        Ok(())
    }

    async fn scroll_state(&self) -> Result<ScrollState> {
        Ok(ScrollState {
            offset: self.eval_f64("window.scrollY").await?,
            viewport: self.eval_f64("window.innerHeight").await?,
            total: self.eval_f64("document.documentElement.scrollHeight").await?,
        })
    }

    async fn listing_items(&self) -> Result<Vec<CdpItem>> {
        // A failing query during a re-render is indistinguishable from "no
        // items yet"; the walk keeps going and re-discovers on the next pass.
        let elements = match self.page.find_elements(self.item_selector.as_str()).await {
            Ok(els) => els,
            Err(e) => {
                debug!("listing query `{}` failed, treating as empty: {e}", self.item_selector);
                Vec::new()
            }
        };
        Ok(elements
            .into_iter()
            .map(|element| CdpItem {
                element,
                id_attribute: self.id_attribute.clone(),
            })
            .collect())
    }

    async fn dismiss_detail(&self) -> Result<()> {
        for kind in [DispatchKeyEventType::KeyDown, DispatchKeyEventType::KeyUp] {
            let params = DispatchKeyEventParams::builder()
                .r#type(kind)
                .key("Escape".to_string())
                .build()
                .map_err(|e| anyhow!("key event build failed: {e}"))?;
            self.page
                .execute(params)
                .await
                .map_err(|e| anyhow!("Escape dispatch failed: {e}"))?;
        }
        Ok(())
    }
}

pub struct CdpItem {
    element: Element,
    id_attribute: String,
}

#[async_trait]
impl ItemHandle for CdpItem {
    async fn identifier(&self) -> Result<Option<String>> {
        self.element
            .attribute(self.id_attribute.as_str())
            .await
            .map_err(|e| anyhow!("attribute `{}` read failed: {e}", self.id_attribute))
    }

    async fn open_detail(&self) -> Result<()> {
        self.element
            .click()
            .await
            .map_err(|e| anyhow!("click failed: {e}"))?;
        Ok(())
    }
}
