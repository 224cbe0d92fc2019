pub mod capture;
pub mod extractor;
pub mod page;
pub mod walker;

pub use capture::DetailCapture;
pub use extractor::{run_extraction, ExtractError};
pub use page::{CdpListing, ItemHandle, ListingSurface};
pub use walker::{WalkConfig, Walker};
