//! Input collaborators: batch files and worker identities.

pub mod identity;
pub mod loader;
pub mod prompts;

pub use identity::load_identities;
pub use loader::{LoadedBatches, jobs_from_text, load_batches};
pub use prompts::{AssetDirective, extract_asset_directive, parse_prompts};
