pub mod error;
pub mod platform;
pub mod manifest;
pub mod packages;
pub mod upload;
pub mod release;
pub mod cli;

pub use error::ReleaseError;
pub use manifest::{BuildSupportManifest, OutputManifest};
