//! Configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries the
//! tool, hardware, tone-mapping, black-detection, and extraction sections.
//! Every section defaults sensibly so a completely empty `{}` file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::media::{HwBackend, OutputFormat, ToneMapAlgorithm};
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tools: ToolsConfig,
    pub hardware: HardwareConfig,
    pub tone_mapping: ToneMapConfig,
    pub black_detect: BlackDetectConfig,
    pub extraction: ExtractionConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None`, the file does not exist, or it fails to parse.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.extraction.max_attempts == 0 {
            warnings.push("extraction.max_attempts is 0; no frame will ever be extracted".into());
        }
        if self.extraction.max_concurrency == 0 {
            warnings.push("extraction.max_concurrency is 0; treated as 1".into());
        }
        if self.tone_mapping.peak_luminance <= 0.0 {
            warnings.push(format!(
                "tone_mapping.peak_luminance {} must be positive",
                self.tone_mapping.peak_luminance
            ));
        }
        if !(0.0..=1.0).contains(&self.black_detect.pixel_threshold) {
            warnings.push(format!(
                "black_detect.pixel_threshold {} is outside [0, 1]",
                self.black_detect.pixel_threshold
            ));
        }
        if self.black_detect.min_window_secs > self.black_detect.window_secs {
            warnings.push(
                "black_detect.min_window_secs exceeds window_secs; no window will be sampled"
                    .into(),
            );
        }
        if let Some(preferred) = self.hardware.preferred {
            if preferred.is_hardware() && !self.hardware.flags.supports(preferred) {
                warnings.push(format!(
                    "hardware.preferred is '{preferred}' but the host does not report it"
                ));
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Paths to external CLI tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
}

/// Hardware accelerators the host reports as present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostCapabilities {
    pub vaapi: bool,
    pub qsv: bool,
    pub nvenc: bool,
    pub amf: bool,
    pub videotoolbox: bool,
}

impl HostCapabilities {
    /// Whether the host reports the given backend.
    pub fn supports(&self, backend: HwBackend) -> bool {
        match backend {
            HwBackend::None => true,
            HwBackend::Vaapi => self.vaapi,
            HwBackend::Qsv => self.qsv,
            HwBackend::Cuda => self.nvenc,
            HwBackend::Amf => self.amf,
            HwBackend::VideoToolbox => self.videotoolbox,
        }
    }
}

/// Hardware decode settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    /// Host-reported accelerator availability.
    pub flags: HostCapabilities,
    /// Backend to use when the host reports more than one.
    pub preferred: Option<HwBackend>,
    /// DRM render node used for VAAPI.
    pub vaapi_device: PathBuf,
    /// Decode a synthetic frame once per backend before trusting it.
    pub validate: bool,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            flags: HostCapabilities::default(),
            preferred: None,
            vaapi_device: PathBuf::from("/dev/dri/renderD128"),
            validate: true,
        }
    }
}

/// HDR to SDR conversion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToneMapConfig {
    pub enabled: bool,
    pub algorithm: ToneMapAlgorithm,
    /// Nominal peak luminance in nits.
    pub peak_luminance: f64,
    pub desaturation: f64,
    /// Permit a static PQ curve for Dolby Vision streams without a
    /// compatible base layer when no RPU-aware filter is available.
    pub allow_static_dovi_fallback: bool,
}

impl Default for ToneMapConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            algorithm: ToneMapAlgorithm::Hable,
            peak_luminance: 100.0,
            desaturation: 0.0,
            allow_static_dovi_fallback: false,
        }
    }
}

/// Black scene detection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlackDetectConfig {
    pub enabled: bool,
    /// Pixel luminance threshold (`pix_th`).
    pub pixel_threshold: f64,
    /// Minimum black run length in seconds (`d`).
    pub min_duration_secs: f64,
    pub analysis_width: u32,
    pub analysis_height: u32,
    /// Videos shorter than this are not sampled.
    pub min_video_duration_secs: f64,
    pub window_secs: f64,
    /// Windows clipped below this length are discarded.
    pub min_window_secs: f64,
    pub cache_ttl_hours: u64,
    /// Analyse sample windows concurrently.
    pub parallel: bool,
}

impl Default for BlackDetectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pixel_threshold: 0.1,
            min_duration_secs: 0.1,
            analysis_width: 320,
            analysis_height: 240,
            min_video_duration_secs: 120.0,
            window_secs: 30.0,
            min_window_secs: 5.0,
            cache_ttl_hours: 24,
            parallel: true,
        }
    }
}

/// Frame extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub max_attempts: u32,
    pub output_format: OutputFormat,
    /// Encoder quality (mjpeg qscale for JPEG, 0-100 for WebP).
    pub quality: u32,
    pub output_dir: PathBuf,
    pub attempt_timeout_secs: u64,
    pub probe_timeout_secs: u64,
    /// Maximum simultaneous subprocesses.
    pub max_concurrency: usize,
    /// `-threads` passed to every ffmpeg invocation.
    pub threads_per_process: usize,
    /// Assumed duration for seek bounds when the probe reports none.
    pub fallback_duration_secs: f64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        let cores = num_cpus::get().max(1);
        Self {
            max_attempts: 50,
            output_format: OutputFormat::Jpeg,
            quality: 2,
            output_dir: std::env::temp_dir().join("framepick"),
            attempt_timeout_secs: 60,
            probe_timeout_secs: 30,
            max_concurrency: cores.div_ceil(2),
            threads_per_process: cores.div_ceil(4),
            fallback_duration_secs: 3600.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = Config::default();
        assert_eq!(cfg.extraction.max_attempts, 50);
        assert_eq!(cfg.extraction.output_format, OutputFormat::Jpeg);
        assert!(cfg.extraction.max_concurrency >= 1);
        assert!(cfg.extraction.threads_per_process >= 1);
        assert_eq!(cfg.tone_mapping.algorithm, ToneMapAlgorithm::Hable);
        assert_eq!(cfg.tone_mapping.peak_luminance, 100.0);
        assert_eq!(cfg.black_detect.pixel_threshold, 0.1);
        assert_eq!(cfg.black_detect.min_duration_secs, 0.1);
        assert_eq!(cfg.black_detect.cache_ttl_hours, 24);
        assert_eq!(
            cfg.hardware.vaapi_device,
            PathBuf::from("/dev/dri/renderD128")
        );
    }

    #[test]
    fn default_config_no_warnings() {
        let warnings = Config::default().validate();
        assert!(warnings.is_empty(), "unexpected warnings: {:?}", warnings);
    }

    #[test]
    fn parse_empty_json_uses_defaults() {
        let cfg = Config::from_json("{}").unwrap();
        assert_eq!(cfg.extraction.max_attempts, 50);
        assert!(cfg.tone_mapping.enabled);
    }

    #[test]
    fn parse_partial_json() {
        let json = r#"{
            "hardware": {"flags": {"vaapi": true}, "preferred": "vaapi"},
            "tone_mapping": {"algorithm": "bt2390", "peak_luminance": 203},
            "extraction": {"output_format": "png", "max_attempts": 5}
        }"#;
        let cfg = Config::from_json(json).unwrap();
        assert!(cfg.hardware.flags.vaapi);
        assert_eq!(cfg.hardware.preferred, Some(HwBackend::Vaapi));
        assert_eq!(cfg.tone_mapping.algorithm, ToneMapAlgorithm::Bt2390);
        assert_eq!(cfg.tone_mapping.peak_luminance, 203.0);
        assert_eq!(cfg.extraction.output_format, OutputFormat::Png);
        assert_eq!(cfg.extraction.max_attempts, 5);
        assert!(cfg.hardware.validate);
    }

    #[test]
    fn invalid_json_is_validation_error() {
        let err = Config::from_json("{not json").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn preferred_backend_not_reported_warns() {
        let mut cfg = Config::default();
        cfg.hardware.preferred = Some(HwBackend::Qsv);
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.contains("qsv")));
    }

    #[test]
    fn zero_attempts_warns() {
        let mut cfg = Config::default();
        cfg.extraction.max_attempts = 0;
        assert!(cfg.validate().iter().any(|w| w.contains("max_attempts")));
    }

    #[test]
    fn load_or_default_with_missing_file() {
        let cfg = Config::load_or_default(Some(Path::new("/nonexistent/framepick.json")));
        assert_eq!(cfg.extraction.max_attempts, 50);
    }

    #[test]
    fn load_or_default_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"black_detect": {"enabled": false}}"#).unwrap();
        let cfg = Config::load_or_default(Some(&path));
        assert!(!cfg.black_detect.enabled);
    }

    #[test]
    fn host_capabilities_lookup() {
        let flags = HostCapabilities {
            nvenc: true,
            ..Default::default()
        };
        assert!(flags.supports(HwBackend::Cuda));
        assert!(!flags.supports(HwBackend::Vaapi));
        assert!(flags.supports(HwBackend::None));
    }
}
