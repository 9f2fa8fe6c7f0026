// Library crate - exports the interpretation core and its service boundary

pub mod interpretation_core;
pub mod rows;
pub mod versions;
pub mod types;
pub mod api;

// Re-export commonly used types
pub use interpretation_core::*;
pub use types::*;
pub use versions::{ThresholdVersion, VersionRegistry};
