use anyhow::{anyhow, Result};

// ---------------------------------------------------------------------------
// ScoutConfig — extraction tunables, injected explicitly into the orchestrator
// ---------------------------------------------------------------------------

pub const ENV_API_KEY: &str = "MENU_SCOUT_API_KEY";
pub const ENV_API_KEY_FALLBACK: &str = "SCRAPYBARA_API_KEY";
pub const ENV_PROVIDER_URL: &str = "MENU_SCOUT_PROVIDER_URL";

const DEFAULT_PROVIDER_URL: &str = "https://api.scrapybara.com";

/// Everything one extraction run needs to know about the target page and its
/// timing. The library never reads process env itself — `from_env()` exists
/// for the binary; tests and embedders construct the struct directly.
#[derive(Debug, Clone)]
pub struct ScoutConfig {
    /// Selector for the startup-gate control that must be dismissed before
    /// the listing becomes interactable. Fatal if it never appears.
    pub gate_selector: String,
    /// Bounded wait for the startup gate.
    pub gate_timeout_ms: u64,
    /// Selector matching listing item elements.
    pub item_selector: String,
    /// Attribute carrying each item's opaque identifier.
    pub id_attribute: String,
    /// Substring marking detail-payload responses on the wire.
    pub endpoint_marker: String,
    /// Key path from the response document root to the detail sub-document.
    pub record_path: Vec<String>,
    /// Vertical scroll delta per walk iteration, in CSS pixels.
    pub scroll_step: i64,
    /// Settle delay after each scroll, letting lazy-loaded content render.
    pub settle_ms: u64,
    /// Delay after opening a detail view, letting its network request start.
    pub detail_open_ms: u64,
    /// Delay after dismissing a detail view.
    pub detail_close_ms: u64,
    /// Consecutive quiet time that counts as network quiescence after
    /// navigation.
    pub quiet_ms: u64,
    /// Upper bound on the post-navigation quiescence wait.
    pub quiesce_timeout_ms: u64,
}

impl Default for ScoutConfig {
    fn default() -> Self {
        Self {
            gate_selector: "button.styles__ButtonRoot-sc-1ldytso-0".to_string(),
            gate_timeout_ms: 5_000,
            item_selector: r#"[data-anchor-id="MenuItem"]"#.to_string(),
            id_attribute: "data-item-id".to_string(),
            endpoint_marker: "https://www.doordash.com/graphql/itemPage?operation=itemPage"
                .to_string(),
            record_path: vec!["data".to_string(), "itemPage".to_string()],
            scroll_step: 720,
            settle_ms: 3_000,
            detail_open_ms: 2_000,
            detail_close_ms: 2_000,
            quiet_ms: 1_500,
            quiesce_timeout_ms: 8_000,
        }
    }
}

impl ScoutConfig {
    /// Defaults with `MENU_SCOUT_*` env overrides applied. Only the binary
    /// calls this; the library takes the struct as-is.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            gate_selector: env_string("MENU_SCOUT_GATE_SELECTOR", d.gate_selector),
            gate_timeout_ms: env_u64("MENU_SCOUT_GATE_TIMEOUT_MS", d.gate_timeout_ms),
            item_selector: env_string("MENU_SCOUT_ITEM_SELECTOR", d.item_selector),
            id_attribute: env_string("MENU_SCOUT_ID_ATTRIBUTE", d.id_attribute),
            endpoint_marker: env_string("MENU_SCOUT_ENDPOINT_MARKER", d.endpoint_marker),
            record_path: d.record_path,
            scroll_step: env_u64("MENU_SCOUT_SCROLL_STEP", d.scroll_step as u64) as i64,
            settle_ms: env_u64("MENU_SCOUT_SETTLE_MS", d.settle_ms),
            detail_open_ms: env_u64("MENU_SCOUT_DETAIL_OPEN_MS", d.detail_open_ms),
            detail_close_ms: env_u64("MENU_SCOUT_DETAIL_CLOSE_MS", d.detail_close_ms),
            quiet_ms: env_u64("MENU_SCOUT_QUIET_MS", d.quiet_ms),
            quiesce_timeout_ms: env_u64("MENU_SCOUT_QUIESCE_TIMEOUT_MS", d.quiesce_timeout_ms),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionConfig — remote browser provider credentials
// ---------------------------------------------------------------------------

/// Credentials and endpoint for the remote browser session provider.
/// Passed explicitly so tests can inject a fake provider instead of relying
/// on ambient process state.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub base_url: String,
    /// Provider API key. Never logged.
    pub api_key: String,
    pub request_timeout_secs: u64,
}

impl SessionConfig {
    /// Resolve provider settings from env. The API key is required:
    /// `MENU_SCOUT_API_KEY`, falling back to `SCRAPYBARA_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var(ENV_API_KEY)
            .or_else(|_| std::env::var(ENV_API_KEY_FALLBACK))
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                anyhow!(
                    "no provider API key: set {} (or {})",
                    ENV_API_KEY,
                    ENV_API_KEY_FALLBACK
                )
            })?;

        Ok(Self {
            base_url: env_string(ENV_PROVIDER_URL, DEFAULT_PROVIDER_URL.to_string()),
            api_key,
            request_timeout_secs: env_u64("MENU_SCOUT_HTTP_TIMEOUT_SECS", 30),
        })
    }
}

// ---------------------------------------------------------------------------

fn env_string(key: &str, default: String) -> String {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v,
        _ => default,
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_carry_the_listing_constants() {
        let cfg = ScoutConfig::default();
        assert_eq!(cfg.scroll_step, 720);
        assert_eq!(cfg.record_path, vec!["data", "itemPage"]);
        assert!(cfg.endpoint_marker.contains("operation=itemPage"));
    }

    #[test]
    fn env_u64_falls_back_on_garbage() {
        std::env::set_var("MENU_SCOUT_TEST_U64", "not-a-number");
        assert_eq!(env_u64("MENU_SCOUT_TEST_U64", 42), 42);
        std::env::set_var("MENU_SCOUT_TEST_U64", " 900 ");
        assert_eq!(env_u64("MENU_SCOUT_TEST_U64", 42), 900);
        std::env::remove_var("MENU_SCOUT_TEST_U64");
    }
}
