//! Media-domain types: HDR classification, hardware backends, tone-map
//! algorithms, output formats, and the probed [`MediaProfile`].
//!
//! Enums serialize in lowercase and implement `Display` manually for a
//! consistent string representation in logs and CLI output.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Dolby Vision variants
// ---------------------------------------------------------------------------

/// Dolby Vision stream variant, derived from the DOVI configuration record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DoviVariant {
    /// Dolby Vision without a cross-compatible base layer (profile 5).
    Plain,
    /// HDR10-compatible base layer (e.g. profile 8.1, profile 7 with compat 6).
    WithHdr10,
    /// HDR10-compatible base layer that also carries HDR10+ metadata.
    WithHdr10Plus,
    /// HLG-compatible base layer (profile 8.4).
    WithHlg,
    /// Enhancement layer present (profile 7) over an HDR10 base layer.
    WithEl,
    /// Enhancement layer present over an HDR10+ base layer.
    WithElHdr10Plus,
    /// SDR-compatible base layer (profile 8.2).
    WithSdr,
    /// The configuration record is inconsistent.
    Invalid,
}

impl DoviVariant {
    /// Whether only RPU-aware mapping produces correct output for this variant.
    ///
    /// Only profile 5 lacks a base layer that a static PQ curve can
    /// interpret; its IPTPQc2 signal must be reshaped from the RPU.
    pub fn requires_rpu_mapping(&self) -> bool {
        matches!(self, Self::Plain)
    }

    /// Transfer function of the base layer used when mapping statically.
    pub fn base_transfer(&self) -> TransferFunction {
        match self {
            Self::WithHlg => TransferFunction::Hlg,
            _ => TransferFunction::Pq,
        }
    }
}

impl fmt::Display for DoviVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain => write!(f, "dovi"),
            Self::WithHdr10 => write!(f, "dovi+hdr10"),
            Self::WithHdr10Plus => write!(f, "dovi+hdr10plus"),
            Self::WithHlg => write!(f, "dovi+hlg"),
            Self::WithEl => write!(f, "dovi+el"),
            Self::WithElHdr10Plus => write!(f, "dovi+el+hdr10plus"),
            Self::WithSdr => write!(f, "dovi+sdr"),
            Self::Invalid => write!(f, "dovi-invalid"),
        }
    }
}

// ---------------------------------------------------------------------------
// HdrClass
// ---------------------------------------------------------------------------

/// Dynamic-range classification of the primary video stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HdrClass {
    Sdr,
    Hdr10,
    #[serde(rename = "hdr10plus")]
    Hdr10Plus,
    Hlg,
    #[serde(rename = "dolbyvision")]
    DolbyVision(DoviVariant),
    Unknown,
}

impl HdrClass {
    /// Whether an extracted still needs HDR-to-SDR conversion.
    ///
    /// SDR and Unknown never do; Dolby Vision with an SDR base layer is
    /// already viewable; every other HDR class (including invalid Dolby
    /// Vision, which is handled as HDR10) does.
    pub fn requires_tone_mapping(&self) -> bool {
        match self {
            Self::Sdr | Self::Unknown => false,
            Self::Hdr10 | Self::Hdr10Plus | Self::Hlg => true,
            Self::DolbyVision(DoviVariant::WithSdr) => false,
            Self::DolbyVision(_) => true,
        }
    }

    /// Whether this is any Dolby Vision variant.
    pub fn is_dolby_vision(&self) -> bool {
        matches!(self, Self::DolbyVision(_))
    }

    /// Source transfer function for classes that are tone mapped.
    pub fn transfer(&self) -> Option<TransferFunction> {
        match self {
            Self::Hdr10 | Self::Hdr10Plus => Some(TransferFunction::Pq),
            Self::Hlg => Some(TransferFunction::Hlg),
            Self::DolbyVision(DoviVariant::WithSdr) => None,
            Self::DolbyVision(v) => Some(v.base_transfer()),
            Self::Sdr | Self::Unknown => None,
        }
    }
}

impl fmt::Display for HdrClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sdr => write!(f, "sdr"),
            Self::Hdr10 => write!(f, "hdr10"),
            Self::Hdr10Plus => write!(f, "hdr10plus"),
            Self::Hlg => write!(f, "hlg"),
            Self::DolbyVision(v) => write!(f, "{v}"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

// ---------------------------------------------------------------------------
// TransferFunction
// ---------------------------------------------------------------------------

/// HDR transfer functions the tone-mapping chains understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferFunction {
    /// SMPTE ST 2084 perceptual quantizer.
    Pq,
    /// ARIB STD-B67 hybrid log-gamma.
    Hlg,
}

impl TransferFunction {
    /// Name understood by ffmpeg's colour filters.
    pub fn ffmpeg_name(&self) -> &'static str {
        match self {
            Self::Pq => "smpte2084",
            Self::Hlg => "arib-std-b67",
        }
    }
}

impl fmt::Display for TransferFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ffmpeg_name())
    }
}

// ---------------------------------------------------------------------------
// HwBackend
// ---------------------------------------------------------------------------

/// Hardware acceleration backend used for decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HwBackend {
    #[default]
    None,
    Vaapi,
    Qsv,
    #[serde(rename = "nvenc", alias = "cuda")]
    Cuda,
    Amf,
    #[serde(rename = "videotoolbox")]
    VideoToolbox,
}

impl HwBackend {
    /// Whether this is a real hardware path.
    pub fn is_hardware(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for HwBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Vaapi => write!(f, "vaapi"),
            Self::Qsv => write!(f, "qsv"),
            Self::Cuda => write!(f, "nvenc"),
            Self::Amf => write!(f, "amf"),
            Self::VideoToolbox => write!(f, "videotoolbox"),
        }
    }
}

// ---------------------------------------------------------------------------
// ToneMapAlgorithm
// ---------------------------------------------------------------------------

/// Tone curve applied in linear light.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToneMapAlgorithm {
    #[default]
    Hable,
    Reinhard,
    Mobius,
    Bt2390,
}

impl ToneMapAlgorithm {
    /// Name used by the `tonemap` and hardware tone-map filters.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hable => "hable",
            Self::Reinhard => "reinhard",
            Self::Mobius => "mobius",
            Self::Bt2390 => "bt2390",
        }
    }
}

impl fmt::Display for ToneMapAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// OutputFormat
// ---------------------------------------------------------------------------

/// Still-image format written for the extracted frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Png,
    Webp,
}

impl OutputFormat {
    /// File extension without the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Webp => "webp",
        }
    }

    /// Encoder arguments for the given quality setting.
    pub fn quality_args(&self, quality: u32) -> Vec<String> {
        match self {
            Self::Jpeg => vec!["-c:v".into(), "mjpeg".into(), "-q:v".into(), quality.to_string()],
            Self::Png => vec!["-c:v".into(), "png".into()],
            Self::Webp => vec![
                "-c:v".into(),
                "libwebp".into(),
                "-quality".into(),
                quality.to_string(),
            ],
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Jpeg => write!(f, "jpeg"),
            Self::Png => write!(f, "png"),
            Self::Webp => write!(f, "webp"),
        }
    }
}

// ---------------------------------------------------------------------------
// MediaProfile
// ---------------------------------------------------------------------------

/// Properties of a source file, derived once per extraction request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaProfile {
    /// Path to the probed file.
    pub path: PathBuf,
    /// Container duration in seconds, if the probe reported one.
    pub duration_secs: Option<f64>,
    /// Codec of the primary video stream (ffmpeg name, e.g. "hevc").
    pub video_codec: Option<String>,
    pub color_space: Option<String>,
    pub color_transfer: Option<String>,
    pub color_primaries: Option<String>,
    pub pixel_format: Option<String>,
    pub bit_depth: Option<u8>,
    /// Classification as reported by the probe.
    pub hdr_class: HdrClass,
}

impl MediaProfile {
    /// A profile with every probed field unknown.
    pub fn unknown(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            duration_secs: None,
            video_codec: None,
            color_space: None,
            color_transfer: None,
            color_primaries: None,
            pixel_format: None,
            bit_depth: None,
            hdr_class: HdrClass::Unknown,
        }
    }

    /// Classification used for planning.
    ///
    /// An `Unknown` class is promoted to HDR10 when the stream is at least
    /// 10-bit or its colour space names BT.2020/BT.2100.
    pub fn effective_hdr_class(&self) -> HdrClass {
        if self.hdr_class != HdrClass::Unknown {
            return self.hdr_class;
        }

        let deep = self.bit_depth.is_some_and(|d| d >= 10);
        let wide = [&self.color_space, &self.color_primaries]
            .into_iter()
            .flatten()
            .any(|s| s.contains("2020") || s.contains("2100"));

        if deep || wide {
            HdrClass::Hdr10
        } else {
            HdrClass::Unknown
        }
    }

    /// Duration to use for seek bounds, falling back to `fallback_secs`.
    pub fn seek_duration(&self, fallback_secs: f64) -> f64 {
        match self.duration_secs {
            Some(d) if d > 0.0 => d,
            _ => fallback_secs,
        }
    }
}
