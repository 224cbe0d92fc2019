use anyhow::anyhow;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use menu_scout::{run_extraction, RemoteBrowserClient, ScoutConfig, SessionConfig, SessionProvider};

fn start_url_from_args() -> Option<String> {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var("MENU_SCOUT_START_URL").ok())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let start_url = start_url_from_args().ok_or_else(|| {
        anyhow!("usage: menu-scout <listing-url>  (or set MENU_SCOUT_START_URL)")
    })?;

    let config = ScoutConfig::from_env();
    let session_config = SessionConfig::from_env()?;
    let client = RemoteBrowserClient::new(session_config)?;

    info!("starting remote browser session");
    let session = client.start_session().await?;

    // Ctrl-C cancels the walk at its next suspension point; the session is
    // still stopped below.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling extraction");
                cancel.cancel();
            }
        });
    }

    let result = run_extraction(session.as_ref(), &start_url, &config, cancel).await;

    session.stop().await;

    match result {
        Ok(report) => {
            info!(
                records = report.records.len(),
                item_failures = report.stats.item_failures,
                capture_failures = report.capture_failures,
                "run finished"
            );
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Err(e) => {
            error!("extraction failed: {e}");
            Err(e.into())
        }
    }
}
