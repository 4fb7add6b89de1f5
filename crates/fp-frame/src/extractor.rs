//! Frame extraction orchestration.
//!
//! One [`FrameExtractor::extract`] call runs a bounded series of attempts.
//! Each attempt picks a timestamp, resolves the decode path, plans tone
//! mapping and runs ffmpeg into a fresh output path. A failed hardware
//! attempt marks the codec failed and retries the same slot in software.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use fp_av::{ProcessRunner, ToolCommand};
use fp_core::config::ExtractionConfig;
use fp_core::{HdrClass, HwBackend, MediaProfile};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::blackdetect::BlackInterval;
use crate::hwaccel::{HardwareDecision, HardwareResolver, Rejection};
use crate::timestamp::select_timestamp;
use crate::tonemap::{render_chain, ToneMapPlan, ToneMapPlanner};

/// Record of one ffmpeg run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionAttempt {
    /// Retry slot this run belonged to (0-based).
    pub slot: u32,
    pub output: PathBuf,
    pub timestamp: f64,
    pub hardware: bool,
    pub success: bool,
    pub exit_code: Option<i32>,
    /// Captured stderr, or the runner error.
    pub diagnostics: String,
}

/// Result of an extraction call with its attempt history.
#[derive(Debug, Clone, Default)]
pub struct ExtractionOutcome {
    pub output: Option<PathBuf>,
    pub attempts: Vec<ExtractionAttempt>,
    pub cancelled: bool,
}

/// Inputs to one extraction.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionRequest<'a> {
    pub profile: &'a MediaProfile,
    pub black: &'a [BlackInterval],
    /// Seek position for the first attempt, if valid for the file.
    pub preferred_timestamp: Option<f64>,
}

/// Runs the extraction attempt loop.
pub struct FrameExtractor {
    ffmpeg: PathBuf,
    runner: Arc<dyn ProcessRunner>,
    resolver: Arc<HardwareResolver>,
    planner: ToneMapPlanner,
    config: ExtractionConfig,
    rng: Mutex<StdRng>,
}

enum Step {
    Done(ExtractionAttempt),
    Cancelled,
}

impl FrameExtractor {
    pub fn new(
        ffmpeg: PathBuf,
        runner: Arc<dyn ProcessRunner>,
        resolver: Arc<HardwareResolver>,
        planner: ToneMapPlanner,
        config: ExtractionConfig,
    ) -> Self {
        Self {
            ffmpeg,
            runner,
            resolver,
            planner,
            config,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Replace the random source with a seeded one.
    pub fn with_seed(self, seed: u64) -> Self {
        *self.rng.lock() = StdRng::seed_from_u64(seed);
        self
    }

    pub fn resolver(&self) -> &Arc<HardwareResolver> {
        &self.resolver
    }

    /// Extract a single frame; `None` when every attempt failed.
    pub async fn extract(
        &self,
        request: ExtractionRequest<'_>,
        cancel: &CancellationToken,
    ) -> Option<PathBuf> {
        self.extract_detailed(request, cancel).await.output
    }

    /// Like [`extract`](Self::extract), also returning every attempt made.
    pub async fn extract_detailed(
        &self,
        request: ExtractionRequest<'_>,
        cancel: &CancellationToken,
    ) -> ExtractionOutcome {
        let profile = request.profile;
        let mut outcome = ExtractionOutcome::default();
        let class = profile.effective_hdr_class();
        if class != profile.hdr_class {
            tracing::debug!("Treating {} as {class}", profile.path.display());
        }

        let software_plan = match self.planner.plan(class, HwBackend::None) {
            Ok(plan) => plan,
            Err(e) => {
                tracing::warn!("Cannot convert {} ({class}): {e}", profile.path.display());
                return outcome;
            }
        };

        if let Err(e) = tokio::fs::create_dir_all(&self.config.output_dir).await {
            tracing::warn!(
                "Cannot create output directory {}: {e}",
                self.config.output_dir.display()
            );
            return outcome;
        }

        let duration = profile.seek_duration(self.config.fallback_duration_secs);
        let codec = profile.video_codec.as_deref();

        for slot in 0..self.config.max_attempts {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                return outcome;
            }

            let timestamp = self.pick_timestamp(slot, duration, request);

            let decision = match self.resolver.resolve(codec, class, cancel).await {
                Ok(d) => d,
                Err(_) => {
                    outcome.cancelled = true;
                    return outcome;
                }
            };
            if decision.rejection == Some(Rejection::ValidationFailed) {
                if let Some(codec) = codec {
                    self.resolver.failed_codecs().mark_failed(codec);
                }
            }

            if decision.uses_hardware() {
                match self.hardware_plan(profile, class, &decision) {
                    Some(plan) => match self
                        .run_attempt(slot, profile, timestamp, Some(&decision), &plan, cancel)
                        .await
                    {
                        Step::Cancelled => {
                            outcome.cancelled = true;
                            return outcome;
                        }
                        Step::Done(attempt) => {
                            let success = attempt.success;
                            outcome.attempts.push(attempt);
                            if success {
                                return self.finish(outcome);
                            }
                            tracing::warn!(
                                "Hardware ({}) extraction failed for {}; retrying in software",
                                decision.backend,
                                profile.path.display()
                            );
                            if let Some(codec) = codec {
                                self.resolver.failed_codecs().mark_failed(codec);
                            }
                        }
                    },
                    None => tracing::debug!("No hardware tone-map plan; using software"),
                }
            } else if let Some(reason) = decision.rejection {
                tracing::debug!("Software decode for {}: {reason}", profile.path.display());
            }

            match self
                .run_attempt(slot, profile, timestamp, None, &software_plan, cancel)
                .await
            {
                Step::Cancelled => {
                    outcome.cancelled = true;
                    return outcome;
                }
                Step::Done(attempt) => {
                    let success = attempt.success;
                    outcome.attempts.push(attempt);
                    if success {
                        return self.finish(outcome);
                    }
                }
            }
        }

        tracing::warn!(
            "No frame extracted from {} after {} attempts",
            profile.path.display(),
            self.config.max_attempts
        );
        outcome
    }

    fn finish(&self, mut outcome: ExtractionOutcome) -> ExtractionOutcome {
        if let Some(last) = outcome.attempts.last() {
            tracing::info!(
                "Extracted frame at {:.2}s ({}) to {}",
                last.timestamp,
                if last.hardware { "hardware" } else { "software" },
                last.output.display()
            );
            outcome.output = Some(last.output.clone());
        }
        outcome
    }

    fn pick_timestamp(&self, slot: u32, duration: f64, request: ExtractionRequest<'_>) -> f64 {
        if slot == 0 {
            if let Some(t) = request.preferred_timestamp {
                if t.is_finite() && t >= 0.0 && t <= duration {
                    return t;
                }
                tracing::debug!("Ignoring preferred timestamp {t} outside 0-{duration}s");
            }
        }
        let mut rng = self.rng.lock();
        select_timestamp(duration, request.black, &mut *rng)
    }

    /// Filter chain for a hardware decode; `None` sends the slot to software.
    fn hardware_plan(
        &self,
        profile: &MediaProfile,
        class: HdrClass,
        decision: &HardwareDecision,
    ) -> Option<ToneMapPlan> {
        match self
            .planner
            .plan_device(class, decision.backend, profile.bit_depth)
        {
            Ok(plan) => Some(plan),
            Err(e) => {
                tracing::debug!("Hardware tone-map plan unavailable: {e}");
                None
            }
        }
    }

    fn output_path(&self, source: &Path) -> PathBuf {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "frame".to_string());
        self.config.output_dir.join(format!(
            "{stem}-{}.{}",
            Uuid::new_v4(),
            self.config.output_format.extension()
        ))
    }

    fn build_command(
        &self,
        source: &Path,
        timestamp: f64,
        decision: Option<&HardwareDecision>,
        plan: &ToneMapPlan,
        output: &Path,
    ) -> ToolCommand {
        let mut cmd = ToolCommand::new(self.ffmpeg.clone());
        cmd.args(["-hide_banner", "-nostdin", "-y", "-v", "error"]);
        if let Some(d) = decision {
            cmd.args(d.init_args.iter().cloned());
            cmd.args(d.accel_args.iter().cloned());
        }
        cmd.arg("-threads")
            .arg(self.config.threads_per_process.max(1).to_string());
        cmd.arg("-ss").arg(format!("{timestamp:.3}"));
        cmd.arg("-i").arg(source.to_string_lossy().into_owned());
        cmd.args(["-map", "0:v:0", "-an", "-sn", "-dn", "-frames:v", "1"]);
        if !plan.stages.is_empty() {
            cmd.arg("-vf").arg(render_chain(&plan.stages));
        }
        cmd.args(self.config.output_format.quality_args(self.config.quality));
        cmd.args(["-update", "1", "-f", "image2"]);
        cmd.arg(output.to_string_lossy().into_owned());
        cmd.timeout(Duration::from_secs(self.config.attempt_timeout_secs));
        cmd
    }

    async fn run_attempt(
        &self,
        slot: u32,
        profile: &MediaProfile,
        timestamp: f64,
        decision: Option<&HardwareDecision>,
        plan: &ToneMapPlan,
        cancel: &CancellationToken,
    ) -> Step {
        let output = self.output_path(&profile.path);
        let cmd = self.build_command(&profile.path, timestamp, decision, plan, &output);

        let (exit_code, diagnostics, exited_ok) = match cmd.run(self.runner.as_ref(), cancel).await {
            Ok(out) => {
                let exited_ok = out.success();
                (out.exit_code, out.stderr, exited_ok)
            }
            Err(e) if e.is_cancelled() => {
                remove_partial(&output).await;
                return Step::Cancelled;
            }
            Err(e) => (None, e.to_string(), false),
        };

        let success = exited_ok && output_written(&output).await;
        if !success {
            remove_partial(&output).await;
            tracing::debug!(
                "Attempt {} at {timestamp:.2}s failed (exit {exit_code:?}): {}",
                slot + 1,
                diagnostics.trim()
            );
        }

        Step::Done(ExtractionAttempt {
            slot,
            output,
            timestamp,
            hardware: decision.is_some(),
            success,
            exit_code,
            diagnostics,
        })
    }
}

async fn output_written(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove partial output {}: {e}", path.display()),
    }
}
