//! Media probing backends.
//!
//! [`FfprobeProber`] implements [`Prober`] by shelling out to ffprobe. The
//! trait lets the extraction service run against scripted probes in tests.

pub mod ffprobe;

use std::path::Path;

use async_trait::async_trait;
use fp_core::MediaProfile;
use tokio_util::sync::CancellationToken;

pub use self::ffprobe::FfprobeProber;

/// Produces a [`MediaProfile`] for a source file.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Short backend name used in log messages.
    fn name(&self) -> &'static str;

    /// Probe `path`.
    ///
    /// Missing metadata degrades to unknown fields; only cancellation is
    /// reported as an error.
    async fn probe(&self, path: &Path, cancel: &CancellationToken)
        -> fp_core::Result<MediaProfile>;
}
