//! The poster-frame service: probe, detect black scenes, extract.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use fp_av::{
    BoundedRunner, FfprobeProber, FilterSupport, ProcessRunner, Prober, SystemRunner, ToolRegistry,
};
use fp_core::config::Config;
use fp_core::MediaProfile;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::blackdetect::{BlackIntervalCache, BlackSceneDetector};
use crate::extractor::{ExtractionRequest, FrameExtractor};
use crate::hwaccel::{FailedCodecSet, HardwareResolver};
use crate::tonemap::ToneMapPlanner;

/// Per-call options supplied by the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractOptions {
    /// Known duration in seconds; replaces the probed duration.
    pub duration_hint: Option<f64>,
    /// Seek position for the first attempt.
    pub preferred_timestamp: Option<f64>,
}

/// Outcome for one file of a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchEntry {
    pub source: PathBuf,
    pub output: Option<PathBuf>,
}

/// Summary of [`PosterService::extract_batch`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub succeeded: usize,
    pub failed: usize,
    pub outputs: Vec<BatchEntry>,
}

impl BatchReport {
    pub fn all_failed(&self) -> bool {
        self.succeeded == 0 && self.failed > 0
    }
}

/// Long-lived owner of the pipeline and its session caches.
pub struct PosterService {
    prober: Arc<dyn Prober>,
    detector: BlackSceneDetector,
    extractor: FrameExtractor,
}

impl PosterService {
    /// Discover ffmpeg/ffprobe, list filters and build a service that runs
    /// real subprocesses.
    pub async fn start(config: &Config, cancel: &CancellationToken) -> fp_core::Result<Self> {
        let tools = ToolRegistry::discover(&config.tools);
        let ffmpeg = tools.require("ffmpeg")?.path.clone();
        tools.require("ffprobe")?;

        let runner: Arc<dyn ProcessRunner> = Arc::new(SystemRunner);
        let filters = FilterSupport::detect(&ffmpeg, runner.as_ref(), cancel).await;
        Ok(Self::new(config, &tools, runner, filters))
    }

    /// Build a service on top of an arbitrary runner.
    ///
    /// Every subprocess goes through a [`BoundedRunner`] sized by
    /// `extraction.max_concurrency`.
    pub fn new(
        config: &Config,
        tools: &ToolRegistry,
        runner: Arc<dyn ProcessRunner>,
        filters: FilterSupport,
    ) -> Self {
        let ffmpeg = tools.path_or_name("ffmpeg");
        let ffprobe = tools.path_or_name("ffprobe");
        let extraction = &config.extraction;

        let runner: Arc<dyn ProcessRunner> =
            Arc::new(BoundedRunner::new(runner, extraction.max_concurrency));
        let filters = Arc::new(filters);
        let threads = extraction.threads_per_process.max(1);

        let prober = Arc::new(FfprobeProber::new(
            ffprobe,
            runner.clone(),
            Duration::from_secs(extraction.probe_timeout_secs),
        )
        .with_threads(threads));

        let detector = BlackSceneDetector::new(
            ffmpeg.clone(),
            runner.clone(),
            Arc::new(BlackIntervalCache::with_ttl_hours(
                config.black_detect.cache_ttl_hours,
            )),
            config.black_detect.clone(),
            threads,
            Duration::from_secs(extraction.attempt_timeout_secs),
        );

        let resolver = Arc::new(HardwareResolver::new(
            config.hardware.clone(),
            config.tone_mapping.enabled,
            filters.clone(),
            Arc::new(FailedCodecSet::new()),
            ffmpeg.clone(),
            runner.clone(),
        )
        .with_threads(threads));

        let extractor = FrameExtractor::new(
            ffmpeg,
            runner,
            resolver,
            ToneMapPlanner::new(config.tone_mapping.clone(), filters),
            extraction.clone(),
        );

        Self {
            prober,
            detector,
            extractor,
        }
    }

    /// Substitute the prober.
    pub fn with_prober(mut self, prober: Arc<dyn Prober>) -> Self {
        self.prober = prober;
        self
    }

    /// Seed timestamp selection.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.extractor = self.extractor.with_seed(seed);
        self
    }

    pub fn failed_codecs(&self) -> &Arc<FailedCodecSet> {
        self.extractor.resolver().failed_codecs()
    }

    pub fn black_cache(&self) -> &Arc<BlackIntervalCache> {
        self.detector.cache()
    }

    pub fn detector(&self) -> &BlackSceneDetector {
        &self.detector
    }

    pub fn extractor(&self) -> &FrameExtractor {
        &self.extractor
    }

    pub async fn probe(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> fp_core::Result<MediaProfile> {
        self.prober.probe(path, cancel).await
    }

    /// Extract a poster frame from `path`.
    ///
    /// Ownership of the returned file passes to the caller. Missing files,
    /// absent tools and exhausted retries all yield `None`.
    pub async fn extract(
        &self,
        path: &Path,
        options: ExtractOptions,
        cancel: &CancellationToken,
    ) -> Option<PathBuf> {
        if let Err(e) = tokio::fs::metadata(path).await {
            tracing::warn!("Cannot read {}: {e}", path.display());
            return None;
        }

        let mut profile = match self.prober.probe(path, cancel).await {
            Ok(profile) => profile,
            Err(e) => {
                tracing::debug!("Probe of {} ended: {e}", path.display());
                return None;
            }
        };
        if let Some(hint) = options.duration_hint.filter(|d| d.is_finite() && *d > 0.0) {
            profile.duration_secs = Some(hint);
        }

        let black = match profile.duration_secs {
            Some(duration) => match self.detector.detect(path, duration, cancel).await {
                Ok(intervals) => intervals,
                Err(e) => {
                    tracing::debug!("Black detection of {} ended: {e}", path.display());
                    return None;
                }
            },
            None => {
                tracing::warn!(
                    "Unknown duration for {}; skipping black detection",
                    path.display()
                );
                Vec::new()
            }
        };

        self.extractor
            .extract(
                ExtractionRequest {
                    profile: &profile,
                    black: &black,
                    preferred_timestamp: options.preferred_timestamp,
                },
                cancel,
            )
            .await
    }

    /// Extract from each file in turn; one failure never stops the batch.
    pub async fn extract_batch(
        &self,
        paths: &[PathBuf],
        options: ExtractOptions,
        cancel: &CancellationToken,
    ) -> BatchReport {
        let mut report = BatchReport::default();
        for path in paths {
            if cancel.is_cancelled() {
                tracing::info!(
                    "Batch cancelled; {} files not processed",
                    paths.len() - report.outputs.len()
                );
                break;
            }
            let output = self.extract(path, options, cancel).await;
            if output.is_some() {
                report.succeeded += 1;
            } else {
                report.failed += 1;
            }
            report.outputs.push(BatchEntry {
                source: path.clone(),
                output,
            });
        }
        tracing::info!(
            "Batch complete: {} succeeded, {} failed",
            report.succeeded,
            report.failed
        );
        report
    }
}
