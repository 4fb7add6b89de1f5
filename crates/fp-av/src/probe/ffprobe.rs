//! FFprobe-based [`Prober`] implementation.
//!
//! Rather than one verbose `-show_streams` dump, the prober issues narrow
//! queries (duration, codec, colour properties, HDR10+ side data). Each query
//! fails independently, so a broken colour query still leaves a usable
//! duration behind.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fp_core::{DoviVariant, HdrClass, MediaProfile};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::Prober;
use crate::command::{ProcessRunner, ToolCommand};

/// Side data type name of the Dolby Vision configuration record.
const DOVI_RECORD: &str = "DOVI configuration record";

/// Marker in frame side data for HDR10+ dynamic metadata.
const HDR10PLUS_MARKER: &str = "SMPTE2094-40";

/// Transfer characteristics that are standard dynamic range.
const SDR_TRANSFERS: &[&str] = &[
    "bt709",
    "smpte170m",
    "bt470m",
    "bt470bg",
    "smpte240m",
    "linear",
    "iec61966-2-1",
    "iec61966-2-4",
    "bt1361e",
    "bt2020-10",
    "bt2020-12",
    "gamma22",
    "gamma28",
];

/// A prober backed by the `ffprobe` CLI.
#[derive(Clone)]
pub struct FfprobeProber {
    /// Path to the ffprobe binary.
    ffprobe_path: PathBuf,
    runner: Arc<dyn ProcessRunner>,
    timeout: Duration,
    threads: usize,
}

impl std::fmt::Debug for FfprobeProber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfprobeProber")
            .field("ffprobe_path", &self.ffprobe_path)
            .field("timeout", &self.timeout)
            .field("threads", &self.threads)
            .finish()
    }
}

impl FfprobeProber {
    /// Create a new prober using the given ffprobe path and runner.
    pub fn new(ffprobe_path: PathBuf, runner: Arc<dyn ProcessRunner>, timeout: Duration) -> Self {
        Self {
            ffprobe_path,
            runner,
            timeout,
            threads: 1,
        }
    }

    /// Thread count requested from ffprobe (default 1).
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    async fn query(
        &self,
        what: &str,
        args: &[&str],
        path: &Path,
        cancel: &CancellationToken,
    ) -> fp_core::Result<Option<String>> {
        let mut cmd = ToolCommand::new(self.ffprobe_path.clone());
        cmd.args(["-v", "error", "-threads"]);
        cmd.arg(self.threads.to_string());
        cmd.args(args.iter().copied());
        cmd.arg(path.to_string_lossy().into_owned());
        cmd.timeout(self.timeout);

        match cmd.run(self.runner.as_ref(), cancel).await {
            Ok(out) if out.success() => Ok(Some(out.stdout)),
            Ok(out) => {
                tracing::warn!(
                    "ffprobe {what} query failed for {} (exit {:?}): {}",
                    path.display(),
                    out.exit_code,
                    out.stderr.trim()
                );
                Ok(None)
            }
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => {
                tracing::warn!("ffprobe {what} query failed for {}: {e}", path.display());
                Ok(None)
            }
        }
    }

    async fn probe_duration(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> fp_core::Result<Option<f64>> {
        let out = self
            .query(
                "duration",
                &[
                    "-show_entries",
                    "format=duration",
                    "-of",
                    "default=noprint_wrappers=1:nokey=1",
                ],
                path,
                cancel,
            )
            .await?;
        Ok(out.as_deref().and_then(parse_duration))
    }

    async fn probe_codec(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> fp_core::Result<Option<String>> {
        let out = self
            .query(
                "codec",
                &[
                    "-select_streams",
                    "v:0",
                    "-show_entries",
                    "stream=codec_name",
                    "-of",
                    "default=noprint_wrappers=1:nokey=1",
                ],
                path,
                cancel,
            )
            .await?;
        Ok(out.as_deref().and_then(first_token))
    }

    async fn probe_color(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> fp_core::Result<Option<ColorStream>> {
        let out = self
            .query(
                "color",
                &[
                    "-select_streams",
                    "v:0",
                    "-show_entries",
                    "stream=color_space,color_transfer,color_primaries,pix_fmt,bits_per_raw_sample\
                     :stream_side_data=side_data_type,dv_profile,el_present_flag,bl_present_flag,\
                     rpu_present_flag,dv_bl_signal_compatibility_id",
                    "-of",
                    "json",
                ],
                path,
                cancel,
            )
            .await?;

        Ok(out.and_then(|json| match serde_json::from_str::<ColorOutput>(&json) {
            Ok(parsed) => parsed.streams.into_iter().next(),
            Err(e) => {
                tracing::warn!("ffprobe color JSON parse error for {}: {e}", path.display());
                None
            }
        }))
    }

    async fn probe_hdr10plus(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> fp_core::Result<bool> {
        let out = self
            .query(
                "hdr10+",
                &[
                    "-select_streams",
                    "v:0",
                    "-read_intervals",
                    "%+#1",
                    "-show_entries",
                    "frame=side_data_list",
                    "-of",
                    "json",
                ],
                path,
                cancel,
            )
            .await?;
        Ok(out.is_some_and(|s| s.contains(HDR10PLUS_MARKER)))
    }
}

#[async_trait]
impl Prober for FfprobeProber {
    fn name(&self) -> &'static str {
        "ffprobe"
    }

    async fn probe(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> fp_core::Result<MediaProfile> {
        let mut profile = MediaProfile::unknown(path);
        profile.duration_secs = self.probe_duration(path, cancel).await?;
        profile.video_codec = self.probe_codec(path, cancel).await?;

        if let Some(color) = self.probe_color(path, cancel).await? {
            let is_pq = color.color_transfer.as_deref() == Some("smpte2084");
            let hdr10plus = is_pq && self.probe_hdr10plus(path, cancel).await?;

            profile.hdr_class = classify(&color, hdr10plus);
            profile.bit_depth = bit_depth(&color);
            profile.color_space = color.color_space;
            profile.color_transfer = color.color_transfer;
            profile.color_primaries = color.color_primaries;
            profile.pixel_format = color.pix_fmt;
        }

        if profile.duration_secs.is_none() {
            tracing::warn!("No duration reported for {}", path.display());
        }
        tracing::debug!(
            "Probed {}: codec={:?} class={} depth={:?}",
            path.display(),
            profile.video_codec,
            profile.hdr_class,
            profile.bit_depth
        );

        Ok(profile)
    }
}

// ---------------------------------------------------------------------------
// JSON structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ColorOutput {
    #[serde(default)]
    streams: Vec<ColorStream>,
}

#[derive(Debug, Default, Deserialize)]
struct ColorStream {
    color_space: Option<String>,
    color_transfer: Option<String>,
    color_primaries: Option<String>,
    pix_fmt: Option<String>,
    bits_per_raw_sample: Option<String>,
    #[serde(default)]
    side_data_list: Vec<SideData>,
}

#[derive(Debug, Default, Deserialize)]
struct SideData {
    side_data_type: Option<String>,
    dv_profile: Option<u8>,
    el_present_flag: Option<u8>,
    dv_bl_signal_compatibility_id: Option<u8>,
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

fn first_token(s: &str) -> Option<String> {
    s.split_whitespace().next().map(str::to_string)
}

fn parse_duration(s: &str) -> Option<f64> {
    s.trim()
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d > 0.0)
}

fn classify(stream: &ColorStream, hdr10plus: bool) -> HdrClass {
    if let Some(record) = stream
        .side_data_list
        .iter()
        .find(|sd| sd.side_data_type.as_deref() == Some(DOVI_RECORD))
    {
        return HdrClass::DolbyVision(dovi_variant(record, hdr10plus));
    }

    match stream.color_transfer.as_deref() {
        Some("smpte2084") if hdr10plus => HdrClass::Hdr10Plus,
        Some("smpte2084") => HdrClass::Hdr10,
        Some("arib-std-b67") => HdrClass::Hlg,
        Some(t) if SDR_TRANSFERS.contains(&t) => HdrClass::Sdr,
        _ => HdrClass::Unknown,
    }
}

fn dovi_variant(record: &SideData, hdr10plus: bool) -> DoviVariant {
    let el = record.el_present_flag == Some(1);
    let compat = record.dv_bl_signal_compatibility_id;

    match compat {
        Some(2) => DoviVariant::WithSdr,
        Some(4) => DoviVariant::WithHlg,
        _ if el && hdr10plus => DoviVariant::WithElHdr10Plus,
        _ if el => DoviVariant::WithEl,
        Some(1) | Some(6) if hdr10plus => DoviVariant::WithHdr10Plus,
        Some(1) | Some(6) => DoviVariant::WithHdr10,
        Some(0) if matches!(record.dv_profile, Some(5) | Some(10)) => DoviVariant::Plain,
        _ => DoviVariant::Invalid,
    }
}

fn bit_depth(stream: &ColorStream) -> Option<u8> {
    let raw = stream
        .bits_per_raw_sample
        .as_deref()
        .and_then(|s| s.trim().parse::<u8>().ok())
        .filter(|d| *d > 0);
    raw.or_else(|| stream.pix_fmt.as_deref().map(bit_depth_from_pix_fmt))
}

fn bit_depth_from_pix_fmt(pix_fmt: &str) -> u8 {
    if pix_fmt.contains("12le") || pix_fmt.contains("12be") || pix_fmt.starts_with("p012") {
        12
    } else if pix_fmt.contains("10le") || pix_fmt.contains("10be") || pix_fmt.starts_with("p010")
    {
        10
    } else {
        8
    }
}
