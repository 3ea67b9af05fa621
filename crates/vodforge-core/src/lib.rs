//! vodforge-core: shared types, IDs, errors, asset layout, and event system.
//!
//! This crate is the foundational dependency for the other vodforge crates,
//! providing typed identifiers, a unified error type, the closed set of
//! rendition resolutions, the on-disk asset naming convention, HLS manifest
//! helpers, and a broadcast event bus for pipeline transitions.

pub mod error;
pub mod events;
pub mod ids;
pub mod layout;
pub mod manifest;
pub mod resolution;
pub mod states;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use ids::*;
pub use layout::AssetLayout;
pub use resolution::Resolution;
pub use states::*;
