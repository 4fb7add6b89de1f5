//! Black scene detection.
//!
//! Samples a handful of windows across the timeline, runs ffmpeg's
//! `blackdetect` filter on each (concurrently when configured), and caches
//! the merged intervals per file identity.

pub mod cache;
pub mod parse;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use fp_av::{ProcessRunner, ToolCommand};
use fp_core::config::BlackDetectConfig;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

pub use self::cache::{BlackIntervalCache, CacheKey};
pub use self::parse::{sample_windows, SampleWindow};

/// A half-open time range `[start, end)` judged visually black.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlackInterval {
    pub start: f64,
    pub end: f64,
}

impl BlackInterval {
    /// Returns `None` unless `start < end`.
    pub fn new(start: f64, end: f64) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn contains(&self, t: f64) -> bool {
        self.start <= t && t < self.end
    }
}

/// Runs windowed `blackdetect` analysis with a shared interval cache.
pub struct BlackSceneDetector {
    ffmpeg: PathBuf,
    runner: Arc<dyn ProcessRunner>,
    cache: Arc<BlackIntervalCache>,
    config: BlackDetectConfig,
    threads: usize,
    timeout: Duration,
}

impl BlackSceneDetector {
    pub fn new(
        ffmpeg: PathBuf,
        runner: Arc<dyn ProcessRunner>,
        cache: Arc<BlackIntervalCache>,
        config: BlackDetectConfig,
        threads: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            ffmpeg,
            runner,
            cache,
            config,
            threads: threads.max(1),
            timeout,
        }
    }

    pub fn cache(&self) -> &Arc<BlackIntervalCache> {
        &self.cache
    }

    /// Detect black intervals in `path`, whose duration is `total` seconds.
    ///
    /// Failed windows contribute nothing; only cancellation is an error.
    pub async fn detect(
        &self,
        path: &Path,
        total: f64,
        cancel: &CancellationToken,
    ) -> fp_core::Result<Vec<BlackInterval>> {
        if !self.config.enabled {
            return Ok(Vec::new());
        }

        let key = CacheKey::for_file(path).await;
        if let Some(hit) = key.as_ref().and_then(|k| self.cache.get(k)) {
            tracing::debug!("Black-interval cache hit for {}", path.display());
            return Ok(hit);
        }

        if total < self.config.min_video_duration_secs {
            tracing::debug!(
                "Skipping black detection for {} ({total:.1}s is below {}s)",
                path.display(),
                self.config.min_video_duration_secs
            );
            return Ok(Vec::new());
        }

        let windows = sample_windows(total, self.config.window_secs, self.config.min_window_secs);

        let results = if self.config.parallel {
            futures::future::join_all(
                windows
                    .iter()
                    .map(|w| self.analyze_window(path, *w, total, cancel)),
            )
            .await
        } else {
            let mut results = Vec::with_capacity(windows.len());
            for w in &windows {
                results.push(self.analyze_window(path, *w, total, cancel).await);
            }
            results
        };

        let mut intervals = Vec::new();
        for (window, result) in windows.iter().zip(results) {
            match result {
                Ok(found) => intervals.extend(found),
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => tracing::warn!(
                    "Black detection window at {:.1}s failed for {}: {e}",
                    window.start,
                    path.display()
                ),
            }
        }
        intervals.sort_by(|a, b| a.start.total_cmp(&b.start));

        tracing::debug!(
            "Detected {} black intervals across {} windows in {}",
            intervals.len(),
            windows.len(),
            path.display()
        );

        if let Some(key) = key {
            self.cache.insert(key, intervals.clone());
        }
        Ok(intervals)
    }

    fn window_command(&self, path: &Path, window: SampleWindow) -> ToolCommand {
        let filter = format!(
            "scale={}:{},blackdetect=d={}:pix_th={}",
            self.config.analysis_width,
            self.config.analysis_height,
            self.config.min_duration_secs,
            self.config.pixel_threshold
        );

        let mut cmd = ToolCommand::new(self.ffmpeg.clone());
        cmd.args(["-hide_banner", "-nostats", "-nostdin"]);
        cmd.arg("-ss").arg(format!("{:.3}", window.start));
        cmd.arg("-t").arg(format!("{:.3}", window.length));
        cmd.arg("-i").arg(path.to_string_lossy().into_owned());
        cmd.args(["-an", "-sn", "-dn"]);
        cmd.arg("-threads").arg(self.threads.to_string());
        cmd.arg("-vf").arg(filter);
        cmd.args(["-f", "null", "-"]);
        cmd.timeout(self.timeout);
        cmd
    }

    async fn analyze_window(
        &self,
        path: &Path,
        window: SampleWindow,
        total: f64,
        cancel: &CancellationToken,
    ) -> fp_core::Result<Vec<BlackInterval>> {
        let output = self.window_command(path, window).run(self.runner.as_ref(), cancel).await?;
        if !output.success() {
            return Err(fp_core::Error::tool(
                "ffmpeg",
                format!("blackdetect exited with {:?}", output.exit_code),
            ));
        }
        Ok(parse::parse_black_intervals(&output.stderr, window.start, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fp_av::ToolOutput;
    use parking_lot::Mutex;

    #[test]
    fn interval_is_half_open() {
        let iv = BlackInterval::new(10.0, 20.0).unwrap();
        assert!(iv.contains(10.0));
        assert!(iv.contains(19.99));
        assert!(!iv.contains(20.0));
        assert_eq!(iv.duration(), 10.0);
        assert!(BlackInterval::new(5.0, 5.0).is_none());
    }

    /// Reports one black interval per window, except for the window starting
    /// at the configured failing offset.
    struct WindowRunner {
        fail_at: Option<&'static str>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ProcessRunner for WindowRunner {
        async fn run(
            &self,
            command: &ToolCommand,
            _cancel: &CancellationToken,
        ) -> fp_core::Result<ToolOutput> {
            let args = command.arg_list().to_vec();
            let ss = args
                .iter()
                .position(|a| a == "-ss")
                .map(|i| args[i + 1].clone())
                .unwrap_or_default();
            self.calls.lock().push(args.join(" "));
            if self.fail_at == Some(ss.as_str()) {
                return Ok(ToolOutput {
                    exit_code: Some(1),
                    ..Default::default()
                });
            }
            Ok(ToolOutput {
                exit_code: Some(0),
                stdout: String::new(),
                stderr: "[blackdetect @ 0x1] black_start:1 black_end:3 black_duration:2\n".into(),
            })
        }
    }

    fn detector(runner: Arc<WindowRunner>, config: BlackDetectConfig) -> BlackSceneDetector {
        BlackSceneDetector::new(
            "ffmpeg".into(),
            runner,
            Arc::new(BlackIntervalCache::default()),
            config,
            2,
            Duration::from_secs(10),
        )
    }

    #[tokio::test]
    async fn failed_window_contributes_nothing() {
        let runner = Arc::new(WindowRunner {
            fail_at: Some("3600.000"),
            calls: Mutex::new(Vec::new()),
        });
        let det = detector(runner.clone(), BlackDetectConfig::default());
        let intervals = det
            .detect(Path::new("/nonexistent/film.mkv"), 7200.0, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(runner.calls.lock().len(), 5);
        assert_eq!(intervals.len(), 4);
        assert!(intervals.windows(2).all(|w| w[0].start <= w[1].start));
        assert!(intervals.iter().all(|iv| iv.start < iv.end && iv.end <= 7200.0));
        assert_eq!(intervals[0], BlackInterval { start: 361.0, end: 363.0 });
    }

    #[tokio::test]
    async fn command_carries_filter_and_threads() {
        let runner = Arc::new(WindowRunner {
            fail_at: None,
            calls: Mutex::new(Vec::new()),
        });
        let config = BlackDetectConfig {
            parallel: false,
            ..Default::default()
        };
        let det = detector(runner.clone(), config);
        det.detect(Path::new("/nonexistent/film.mkv"), 600.0, &CancellationToken::new())
            .await
            .unwrap();

        let calls = runner.calls.lock();
        assert!(calls[0].contains("-vf scale=320:240,blackdetect=d=0.1:pix_th=0.1"));
        assert!(calls[0].contains("-threads 2"));
        assert!(calls[0].contains("-ss 30.000 -t 30.000"));
    }

    #[tokio::test]
    async fn disabled_detection_runs_nothing() {
        let runner = Arc::new(WindowRunner {
            fail_at: None,
            calls: Mutex::new(Vec::new()),
        });
        let config = BlackDetectConfig {
            enabled: false,
            ..Default::default()
        };
        let det = detector(runner.clone(), config);
        let intervals = det
            .detect(Path::new("/nonexistent/film.mkv"), 7200.0, &CancellationToken::new())
            .await
            .unwrap();
        assert!(intervals.is_empty());
        assert!(runner.calls.lock().is_empty());
    }
}
