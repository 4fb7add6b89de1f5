//! # fp-frame
//!
//! Poster-frame extraction for the framepick pipeline.
//!
//! - [`blackdetect`] samples the timeline for black scenes and caches them.
//! - [`hwaccel`] decides per file whether hardware decode is usable.
//! - [`tonemap`] plans the HDR to SDR filter chain.
//! - [`timestamp`] picks seek positions outside black scenes.
//! - [`extractor`] runs attempts with retry and software fallback.
//! - [`service`] ties them together behind [`PosterService`].

pub mod blackdetect;
pub mod extractor;
pub mod hwaccel;
pub mod service;
pub mod timestamp;
pub mod tonemap;

pub use blackdetect::{BlackInterval, BlackIntervalCache, BlackSceneDetector};
pub use extractor::{ExtractionAttempt, ExtractionOutcome, ExtractionRequest, FrameExtractor};
pub use hwaccel::{FailedCodecSet, HardwareDecision, HardwareResolver, Rejection};
pub use service::{BatchEntry, BatchReport, ExtractOptions, PosterService};
pub use timestamp::select_timestamp;
pub use tonemap::{FilterStage, ToneMapMethod, ToneMapPlan, ToneMapPlanner};
