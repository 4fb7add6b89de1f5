//! HDR to SDR tone-map planning.
//!
//! [`ToneMapPlanner::plan`] picks a strategy from the HDR class, the decode
//! backend and the filters the local ffmpeg offers, and returns it as typed
//! [`FilterStage`]s. Strings are only produced by [`render_chain`].

pub mod stages;

use std::sync::Arc;

use fp_av::FilterSupport;
use fp_core::config::ToneMapConfig;
use fp_core::{HdrClass, HwBackend, ToneMapAlgorithm, TransferFunction};

pub use self::stages::{download_stages, render_chain, FilterStage};
use crate::hwaccel::backend::native_tonemap_filter;

/// How a plan converts HDR to SDR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToneMapMethod {
    /// No conversion required.
    None,
    /// The decode backend's own tone-map filter, on the device.
    Native(HwBackend),
    /// Dolby Vision dynamic metadata applied by libplacebo.
    RpuAware,
    /// Linearize with zscale and apply a static tone curve.
    LinearLight,
}

/// An ordered filter chain plus the parameters it was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct ToneMapPlan {
    pub stages: Vec<FilterStage>,
    pub transfer: Option<TransferFunction>,
    pub algorithm: ToneMapAlgorithm,
    pub method: ToneMapMethod,
}

impl ToneMapPlan {
    pub fn empty(algorithm: ToneMapAlgorithm) -> Self {
        Self {
            stages: Vec::new(),
            transfer: None,
            algorithm,
            method: ToneMapMethod::None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Rendered `-vf` chain, or `None` for an empty plan.
    pub fn filter_chain(&self) -> Option<String> {
        (!self.stages.is_empty()).then(|| render_chain(&self.stages))
    }
}

/// Builds [`ToneMapPlan`]s for a fixed configuration and filter set.
#[derive(Debug, Clone)]
pub struct ToneMapPlanner {
    config: ToneMapConfig,
    filters: Arc<FilterSupport>,
}

impl ToneMapPlanner {
    pub fn new(config: ToneMapConfig, filters: Arc<FilterSupport>) -> Self {
        Self { config, filters }
    }

    /// Plan for frames decoded on `backend`, ending with the download to
    /// system memory.
    ///
    /// `source_bits` is the stream's bit depth; it decides the layout of
    /// the downloaded surface unless an on-device filter has already
    /// converted it to 8-bit.
    pub fn plan_device(
        &self,
        class: HdrClass,
        backend: HwBackend,
        source_bits: Option<u8>,
    ) -> fp_core::Result<ToneMapPlan> {
        let mut plan = self.plan(class, backend)?;
        let surface_bits = match plan.method {
            // scale_vt keeps the decoder's layout; the other native filters emit nv12.
            ToneMapMethod::Native(b) if b != HwBackend::VideoToolbox => 8,
            _ => source_bits.unwrap_or(8),
        };
        plan.stages.extend(download_stages(surface_bits));
        Ok(plan)
    }

    /// Plan the conversion of `class` decoded by `backend`.
    ///
    /// Native plans stop on the device; see [`plan_device`](Self::plan_device).
    ///
    /// Fails with [`fp_core::Error::ToneMap`] when no acceptable strategy
    /// exists, e.g. Dolby Vision profile 5 without libplacebo.
    pub fn plan(&self, class: HdrClass, backend: HwBackend) -> fp_core::Result<ToneMapPlan> {
        let algorithm = self.config.algorithm;
        if !self.config.enabled || !class.requires_tone_mapping() {
            return Ok(ToneMapPlan::empty(algorithm));
        }
        let Some(transfer) = class.transfer() else {
            return Ok(ToneMapPlan::empty(algorithm));
        };

        if let HdrClass::DolbyVision(variant) = class {
            if self.filters.has("libplacebo") && !backend.is_hardware() {
                return Ok(ToneMapPlan {
                    stages: vec![self.libplacebo_stage()],
                    transfer: Some(transfer),
                    algorithm,
                    method: ToneMapMethod::RpuAware,
                });
            }
            if variant.requires_rpu_mapping() {
                if !self.config.allow_static_dovi_fallback {
                    return Err(fp_core::Error::ToneMap(
                        "Dolby Vision without an HDR10 base layer needs libplacebo".into(),
                    ));
                }
                tracing::warn!("Mapping Dolby Vision profile 5 with a static curve");
            }
        }

        if let Some(filter) = native_tonemap_filter(backend) {
            if self.filters.has(filter) {
                return Ok(ToneMapPlan {
                    stages: vec![self.native_stage(backend, filter)],
                    transfer: Some(transfer),
                    algorithm,
                    method: ToneMapMethod::Native(backend),
                });
            }
        }
        if backend.is_hardware() {
            return Err(fp_core::Error::ToneMap(format!(
                "{backend} has no native tone-map filter in this ffmpeg build"
            )));
        }

        if !self.filters.has("zscale") || !self.filters.has("tonemap") {
            return Err(fp_core::Error::ToneMap(
                "ffmpeg lacks the zscale and tonemap filters".into(),
            ));
        }
        Ok(ToneMapPlan {
            stages: self.linear_light_stages(transfer),
            transfer: Some(transfer),
            algorithm,
            method: ToneMapMethod::LinearLight,
        })
    }

    fn libplacebo_stage(&self) -> FilterStage {
        FilterStage::new("libplacebo")
            .opt("tonemapping", self.config.algorithm.as_str())
            .opt("apply_dolbyvision", 1)
            .opt("colorspace", "bt709")
            .opt("color_primaries", "bt709")
            .opt("color_trc", "bt709")
            .opt("range", "tv")
            .opt("format", "yuv420p")
    }

    fn native_stage(&self, backend: HwBackend, filter: &str) -> FilterStage {
        let alg = self.config.algorithm.as_str();
        match backend {
            HwBackend::Qsv => FilterStage::new(filter)
                .opt("tonemap", 1)
                .opt("format", "nv12")
                .opt("out_color_primaries", "bt709")
                .opt("out_color_transfer", "bt709")
                .opt("out_color_matrix", "bt709"),
            HwBackend::Cuda => FilterStage::new(filter)
                .opt("format", "nv12")
                .opt("p", "bt709")
                .opt("t", "bt709")
                .opt("m", "bt709")
                .opt("tonemap", alg)
                .opt("peak", self.config.peak_luminance)
                .opt("desat", self.config.desaturation),
            HwBackend::VideoToolbox => FilterStage::new(filter)
                .opt("color_matrix", "bt709")
                .opt("color_primaries", "bt709")
                .opt("color_transfer", "bt709"),
            _ => FilterStage::new(filter)
                .opt("format", "nv12")
                .opt("p", "bt709")
                .opt("t", "bt709")
                .opt("m", "bt709"),
        }
    }

    fn linear_light_stages(&self, transfer: TransferFunction) -> Vec<FilterStage> {
        vec![
            FilterStage::new("zscale")
                .opt("tin", transfer.ffmpeg_name())
                .opt("pin", "bt2020")
                .opt("min", "bt2020nc")
                .opt("rin", "tv")
                .opt("t", "linear")
                .opt("npl", self.config.peak_luminance),
            FilterStage::pixel_format("gbrpf32le"),
            FilterStage::new("zscale").opt("p", "bt709"),
            FilterStage::new("tonemap")
                .opt("tonemap", self.config.algorithm.as_str())
                .opt("desat", self.config.desaturation),
            FilterStage::new("zscale")
                .opt("t", "bt709")
                .opt("m", "bt709")
                .opt("r", "tv"),
            FilterStage::pixel_format("yuv420p"),
        ]
    }
}
