//! fp-core: shared errors, configuration, and media-domain types.
//!
//! This crate is the foundational dependency for the other fp-* crates. It
//! carries the unified error type, the JSON configuration tree, and the
//! immutable [`MediaProfile`] that flows through the extraction pipeline.

pub mod config;
pub mod error;
pub mod media;

pub use error::{Error, Result};
pub use media::*;
