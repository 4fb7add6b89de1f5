//! Per-backend ffmpeg arguments and codec allow-lists.

use std::path::Path;

use fp_core::HwBackend;

/// Codecs each backend decodes reliably.
pub fn allowed_codecs(backend: HwBackend) -> &'static [&'static str] {
    match backend {
        HwBackend::None => &[],
        HwBackend::Vaapi | HwBackend::Qsv => &["h264", "hevc", "vp9", "av1", "mpeg2video"],
        HwBackend::Cuda => &["h264", "hevc", "vp9", "av1", "mpeg2video", "vc1"],
        HwBackend::Amf => &["h264", "hevc", "vp9"],
        HwBackend::VideoToolbox => &["h264", "hevc"],
    }
}

pub fn allows_codec(backend: HwBackend, codec: &str) -> bool {
    allowed_codecs(backend).contains(&codec)
}

/// Name given to the device created by `-init_hw_device`.
pub fn device_name(backend: HwBackend) -> Option<&'static str> {
    match backend {
        HwBackend::None => None,
        HwBackend::Vaapi => Some("va"),
        HwBackend::Qsv => Some("qs"),
        HwBackend::Cuda => Some("cu"),
        HwBackend::Amf => Some("dx"),
        HwBackend::VideoToolbox => Some("vt"),
    }
}

/// `-init_hw_device` arguments.
pub fn init_args(backend: HwBackend, vaapi_device: &Path) -> Vec<String> {
    let spec = match backend {
        HwBackend::None => return Vec::new(),
        HwBackend::Vaapi => format!("vaapi=va:{}", vaapi_device.display()),
        HwBackend::Qsv => "qsv=qs".to_string(),
        HwBackend::Cuda => "cuda=cu:0".to_string(),
        HwBackend::Amf => "d3d11va=dx".to_string(),
        HwBackend::VideoToolbox => "videotoolbox=vt".to_string(),
    };
    vec!["-init_hw_device".to_string(), spec]
}

/// Decoder `-hwaccel` arguments; frames stay in device memory.
pub fn accel_args(backend: HwBackend) -> Vec<String> {
    let args: &[&str] = match backend {
        HwBackend::None => &[],
        HwBackend::Vaapi => &[
            "-hwaccel",
            "vaapi",
            "-hwaccel_device",
            "va",
            "-hwaccel_output_format",
            "vaapi",
        ],
        HwBackend::Qsv => &["-hwaccel", "qsv", "-hwaccel_output_format", "qsv"],
        HwBackend::Cuda => &["-hwaccel", "cuda", "-hwaccel_output_format", "cuda"],
        HwBackend::Amf => &["-hwaccel", "d3d11va", "-hwaccel_output_format", "d3d11"],
        HwBackend::VideoToolbox => &[
            "-hwaccel",
            "videotoolbox",
            "-hwaccel_output_format",
            "videotoolbox_vld",
        ],
    };
    args.iter().map(|s| s.to_string()).collect()
}

/// Filter that tone-maps on the device, if the backend has one.
pub fn native_tonemap_filter(backend: HwBackend) -> Option<&'static str> {
    match backend {
        HwBackend::Vaapi => Some("tonemap_vaapi"),
        HwBackend::Qsv => Some("vpp_qsv"),
        HwBackend::Cuda => Some("tonemap_cuda"),
        HwBackend::VideoToolbox => Some("scale_vt"),
        HwBackend::Amf | HwBackend::None => None,
    }
}

/// Order in which host capability flags are considered.
pub const DETECTION_ORDER: [HwBackend; 5] = [
    HwBackend::Cuda,
    HwBackend::Qsv,
    HwBackend::Vaapi,
    HwBackend::VideoToolbox,
    HwBackend::Amf,
];
