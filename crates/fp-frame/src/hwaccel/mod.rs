//! Hardware decode backend resolution.
//!
//! The base backend is chosen once from the host-reported capability flags.
//! Each file is then checked against the session's [`FailedCodecSet`], the
//! backend's codec allow-list, tone-mapping capability, and (once per
//! backend) a synthetic validation decode.

pub mod backend;
pub mod failed;

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use fp_av::{FilterSupport, ProcessRunner, ToolCommand};
use fp_core::config::HardwareConfig;
use fp_core::{HdrClass, HwBackend};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

pub use self::failed::FailedCodecSet;

/// Synthetic source used by the validation probe.
const VALIDATION_SOURCE: &str = "testsrc2=size=64x64:rate=1:duration=1";

const VALIDATION_TIMEOUT: Duration = Duration::from_secs(15);

/// Why the hardware path was not chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The host reports no usable accelerator.
    NoBackend,
    /// The codec failed on hardware earlier in this session.
    CodecFailedPreviously,
    /// The codec is missing or not on the backend's allow-list.
    CodecNotAllowed,
    /// HDR content needs tone mapping the backend cannot do on the device.
    TonemapUnsupported,
    /// The synthetic validation decode failed.
    ValidationFailed,
    /// Dolby Vision is mapped from its RPU, which only runs in software.
    RpuMappingRequiresSoftware,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::NoBackend => "no hardware backend available",
            Self::CodecFailedPreviously => "codec failed on hardware earlier",
            Self::CodecNotAllowed => "codec not supported by backend",
            Self::TonemapUnsupported => "backend cannot tone-map on device",
            Self::ValidationFailed => "backend validation probe failed",
            Self::RpuMappingRequiresSoftware => "Dolby Vision RPU mapping runs in software",
        };
        f.write_str(reason)
    }
}

/// Outcome of resolving the decode path for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwareDecision {
    pub backend: HwBackend,
    pub init_args: Vec<String>,
    pub accel_args: Vec<String>,
    /// Whether the backend may decode this file's codec.
    pub supports_codec: bool,
    pub rejection: Option<Rejection>,
}

impl HardwareDecision {
    /// The software path, with the reason hardware was not used.
    pub fn software(rejection: Rejection) -> Self {
        Self {
            backend: HwBackend::None,
            init_args: Vec::new(),
            accel_args: Vec::new(),
            supports_codec: false,
            rejection: Some(rejection),
        }
    }

    pub fn uses_hardware(&self) -> bool {
        self.backend.is_hardware() && self.supports_codec
    }
}

/// Pick the base backend from the host flags.
///
/// A preferred backend wins when its flag is set; otherwise the first
/// flagged backend in [`backend::DETECTION_ORDER`] is used.
pub fn choose_base_backend(config: &HardwareConfig) -> HwBackend {
    if let Some(preferred) = config.preferred {
        if config.flags.supports(preferred) {
            return preferred;
        }
        tracing::warn!("Preferred hardware backend {preferred} is not reported by the host");
    }

    backend::DETECTION_ORDER
        .into_iter()
        .find(|b| config.flags.supports(*b))
        .unwrap_or(HwBackend::None)
}

/// Decides per file whether to decode on hardware.
pub struct HardwareResolver {
    config: HardwareConfig,
    tone_mapping: bool,
    filters: Arc<FilterSupport>,
    failed: Arc<FailedCodecSet>,
    ffmpeg: PathBuf,
    runner: Arc<dyn ProcessRunner>,
    threads: usize,
    base: OnceLock<HwBackend>,
    validated: OnceCell<bool>,
}

impl HardwareResolver {
    pub fn new(
        config: HardwareConfig,
        tone_mapping: bool,
        filters: Arc<FilterSupport>,
        failed: Arc<FailedCodecSet>,
        ffmpeg: PathBuf,
        runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        Self {
            config,
            tone_mapping,
            filters,
            failed,
            ffmpeg,
            runner,
            threads: 1,
            base: OnceLock::new(),
            validated: OnceCell::new(),
        }
    }

    /// Thread count requested by the validation decode (default 1).
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    pub fn failed_codecs(&self) -> &Arc<FailedCodecSet> {
        &self.failed
    }

    /// The backend chosen for this host, computed on first use.
    pub fn base_backend(&self) -> HwBackend {
        *self.base.get_or_init(|| {
            let chosen = choose_base_backend(&self.config);
            tracing::info!("Hardware decode backend: {chosen}");
            chosen
        })
    }

    /// Resolve the decode path for a file with `codec` and `class`.
    ///
    /// Only cancellation of the validation probe is an error.
    pub async fn resolve(
        &self,
        codec: Option<&str>,
        class: HdrClass,
        cancel: &CancellationToken,
    ) -> fp_core::Result<HardwareDecision> {
        let backend = self.base_backend();
        if !backend.is_hardware() {
            return Ok(HardwareDecision::software(Rejection::NoBackend));
        }

        let Some(codec) = codec else {
            return Ok(HardwareDecision::software(Rejection::CodecNotAllowed));
        };
        if self.failed.contains(codec) {
            return Ok(HardwareDecision::software(Rejection::CodecFailedPreviously));
        }
        if !backend::allows_codec(backend, codec) {
            return Ok(HardwareDecision::software(Rejection::CodecNotAllowed));
        }

        if self.tone_mapping && class.requires_tone_mapping() {
            if class.is_dolby_vision() && self.filters.has("libplacebo") {
                return Ok(HardwareDecision::software(
                    Rejection::RpuMappingRequiresSoftware,
                ));
            }
            let native = backend::native_tonemap_filter(backend);
            if !native.is_some_and(|filter| self.filters.has(filter)) {
                return Ok(HardwareDecision::software(Rejection::TonemapUnsupported));
            }
        }

        if self.config.validate && !self.validate(backend, cancel).await? {
            return Ok(HardwareDecision::software(Rejection::ValidationFailed));
        }

        Ok(HardwareDecision {
            backend,
            init_args: backend::init_args(backend, &self.config.vaapi_device),
            accel_args: backend::accel_args(backend),
            supports_codec: true,
            rejection: None,
        })
    }

    /// Run the validation probe once; later calls reuse the result.
    async fn validate(&self, backend: HwBackend, cancel: &CancellationToken) -> fp_core::Result<bool> {
        self.validated
            .get_or_try_init(|| async {
                let cmd = self.validation_command(backend);
                match cmd.run(self.runner.as_ref(), cancel).await {
                    Ok(out) if out.success() => {
                        tracing::info!("Hardware backend {backend} validated");
                        Ok(true)
                    }
                    Ok(out) => {
                        tracing::warn!(
                            "Hardware backend {backend} failed validation: {}",
                            out.stderr.trim()
                        );
                        Ok(false)
                    }
                    Err(e) if e.is_cancelled() => Err(e),
                    Err(e) => {
                        tracing::warn!("Hardware backend {backend} validation could not run: {e}");
                        Ok(false)
                    }
                }
            })
            .await
            .copied()
    }

    fn validation_command(&self, backend: HwBackend) -> ToolCommand {
        let mut cmd = ToolCommand::new(self.ffmpeg.clone());
        cmd.args(["-hide_banner", "-nostdin", "-v", "error"]);
        cmd.args(backend::init_args(backend, &self.config.vaapi_device));
        if let Some(device) = backend::device_name(backend) {
            cmd.arg("-filter_hw_device").arg(device);
        }
        cmd.arg("-threads").arg(self.threads.to_string());
        cmd.args(["-f", "lavfi", "-i", VALIDATION_SOURCE]);
        cmd.args(["-vf", "format=nv12,hwupload", "-frames:v", "1", "-f", "null", "-"]);
        cmd.timeout(VALIDATION_TIMEOUT);
        cmd
    }
}
