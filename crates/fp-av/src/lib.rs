//! # fp-av
//!
//! External tool management and probing for the framepick pipeline.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache paths to ffmpeg
//!   and ffprobe, and list the filters the local ffmpeg build offers
//!   ([`FilterSupport`]).
//! - **Command execution** ([`ToolCommand`], [`ProcessRunner`]) -- async
//!   subprocess execution with captured output, timeout, and cancellation.
//!   Non-zero exits are returned as data in [`ToolOutput`].
//! - **Bounded concurrency** ([`BoundedRunner`]) -- a permit pool capping the
//!   number of simultaneous subprocesses.
//! - **Probing** ([`FfprobeProber`]) -- narrow ffprobe queries that build a
//!   [`fp_core::MediaProfile`].

pub mod command;
pub mod probe;
pub mod tools;

// ---- Re-exports for convenience ----

pub use command::{BoundedRunner, ProcessRunner, SystemRunner, ToolCommand, ToolOutput};
pub use probe::{FfprobeProber, Prober};
pub use tools::{FilterSupport, ToolConfig, ToolInfo, ToolRegistry};
