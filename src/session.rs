//! Remote browser session provider.
//!
//! The extraction engine never launches a local browser; it attaches to a
//! provider-hosted Chromium instance over its CDP websocket. This module
//! holds the two-method lifecycle the orchestrator consumes (`start` / `stop`
//! plus endpoint discovery) and a JSON-over-HTTP client for a hosted
//! provider. Tests substitute their own `SessionHandle`.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};
use url::Url;

use crate::core::config::SessionConfig;

/// Starts remote browser sessions.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn start_session(&self) -> Result<Box<dyn SessionHandle>>;
}

/// One live remote browser instance.
#[async_trait]
pub trait SessionHandle: Send + Sync {
    /// CDP websocket endpoint for attaching to this instance.
    async fn connection_endpoint(&self) -> Result<String>;

    /// Release the remote instance. Best-effort: failures are logged, never
    /// surfaced, so teardown can run unconditionally on every exit path.
    async fn stop(&self);
}

// ---------------------------------------------------------------------------
// Hosted-provider client
// ---------------------------------------------------------------------------

/// HTTP client for a hosted browser provider (Scrapybara-style API).
pub struct RemoteBrowserClient {
    http: reqwest::Client,
    base: Url,
    api_key: String,
}

#[derive(Deserialize)]
struct StartBody {
    instance_id: String,
}

#[derive(Deserialize)]
struct CdpBody {
    cdp_url: String,
}

impl RemoteBrowserClient {
    pub fn new(config: SessionConfig) -> Result<Self> {
        let base = Url::parse(&config.base_url)
            .with_context(|| format!("invalid provider base URL: {}", config.base_url))?;
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("failed to build provider HTTP client")?;
        Ok(Self {
            http,
            base,
            api_key: config.api_key,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .with_context(|| format!("invalid provider endpoint path: {path}"))
    }
}

#[async_trait]
impl SessionProvider for RemoteBrowserClient {
    async fn start_session(&self) -> Result<Box<dyn SessionHandle>> {
        let url = self.endpoint("v1/browser/start")?;
        let resp = self
            .http
            .post(url)
            .header("x-api-key", &self.api_key)
            .send()
            .await
            .context("provider start request failed")?
            .error_for_status()
            .context("provider refused to start a browser instance")?;

        let body: StartBody = resp
            .json()
            .await
            .context("malformed provider start response")?;
        info!(instance = %body.instance_id, "remote browser session started");

        Ok(Box::new(RemoteSession {
            http: self.http.clone(),
            base: self.base.clone(),
            api_key: self.api_key.clone(),
            instance_id: body.instance_id,
        }))
    }
}

struct RemoteSession {
    http: reqwest::Client,
    base: Url,
    api_key: String,
    instance_id: String,
}

#[async_trait]
impl SessionHandle for RemoteSession {
    async fn connection_endpoint(&self) -> Result<String> {
        let url = self
            .base
            .join(&format!("v1/browser/{}/cdp_url", self.instance_id))?;
        let body: CdpBody = self
            .http
            .get(url)
            .header("x-api-key", &self.api_key)
            .send()
            .await
            .context("provider cdp_url request failed")?
            .error_for_status()
            .context("provider refused the cdp_url request")?
            .json()
            .await
            .context("malformed provider cdp_url response")?;

        if !body.cdp_url.starts_with("ws") {
            return Err(anyhow!(
                "provider returned a non-websocket CDP endpoint: {}",
                body.cdp_url
            ));
        }
        Ok(body.cdp_url)
    }

    async fn stop(&self) {
        let url = match self
            .base
            .join(&format!("v1/browser/{}/stop", self.instance_id))
        {
            Ok(u) => u,
            Err(e) => {
                warn!(instance = %self.instance_id, "cannot build stop URL: {e}");
                return;
            }
        };
        match self
            .http
            .post(url)
            .header("x-api-key", &self.api_key)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                info!(instance = %self.instance_id, "remote browser session stopped");
            }
            Ok(resp) => {
                warn!(
                    instance = %self.instance_id,
                    "provider stop returned {} (instance may leak until provider GC)",
                    resp.status()
                );
            }
            Err(e) => {
                warn!(instance = %self.instance_id, "provider stop request failed: {e}");
            }
        }
    }
}
