pub mod core;
pub mod scraping;
pub mod session;

// --- Primary exports ---
pub use crate::core::config::{ScoutConfig, SessionConfig};
pub use crate::core::types::{ExtractionReport, ItemRecord, ScrollState, WalkStats};
pub use scraping::extractor::{run_extraction, ExtractError};
pub use session::{RemoteBrowserClient, SessionHandle, SessionProvider};
