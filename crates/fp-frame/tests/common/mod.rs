//! Shared harness for pipeline integration tests.
//!
//! [`FakeTools`] stands in for ffmpeg and ffprobe: it answers probe queries
//! from a scripted media description, reports black scenes, passes or fails
//! the hardware validation decode, and writes (or refuses to write) the
//! output image named by an extraction's last argument.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use fp_av::{FilterSupport, ProcessRunner, ToolCommand, ToolOutput, ToolRegistry};
use fp_core::config::{Config, HostCapabilities};
use fp_frame::PosterService;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// What a recorded invocation was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Probe,
    Validation,
    BlackDetect,
    FilterList,
    Extract,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub kind: Kind,
    pub args: Vec<String>,
}

impl Call {
    pub fn joined(&self) -> String {
        self.args.join(" ")
    }

    pub fn value_of(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }

    pub fn uses_hardware(&self) -> bool {
        self.args.iter().any(|a| a == "-hwaccel")
    }
}

/// Scripted media file plus tool behaviour.
pub struct FakeTools {
    pub duration: Option<f64>,
    pub codec: &'static str,
    pub transfer: &'static str,
    pub pix_fmt: &'static str,
    pub validation_ok: bool,
    pub hardware_extract_ok: bool,
    pub software_extract_ok: bool,
    /// Stderr returned by every blackdetect window.
    pub black_stderr: &'static str,
    pub calls: Mutex<Vec<Call>>,
}

impl FakeTools {
    pub fn sdr_h264(duration: f64) -> Self {
        Self {
            duration: Some(duration),
            codec: "h264",
            transfer: "bt709",
            pix_fmt: "yuv420p",
            validation_ok: true,
            hardware_extract_ok: true,
            software_extract_ok: true,
            black_stderr: "",
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn hdr10_hevc(duration: f64) -> Self {
        Self {
            codec: "hevc",
            transfer: "smpte2084",
            pix_fmt: "yuv420p10le",
            ..Self::sdr_h264(duration)
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn calls_of(&self, kind: Kind) -> Vec<Call> {
        self.calls.lock().iter().filter(|c| c.kind == kind).cloned().collect()
    }

    pub fn count(&self, kind: Kind) -> usize {
        self.calls_of(kind).len()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    fn classify(command: &ToolCommand) -> Kind {
        let args = command.arg_list();
        if command.program_name() == "ffprobe" {
            Kind::Probe
        } else if args.iter().any(|a| a == "lavfi") {
            Kind::Validation
        } else if args.iter().any(|a| a.contains("blackdetect")) {
            Kind::BlackDetect
        } else if args.iter().any(|a| a == "-filters") {
            Kind::FilterList
        } else {
            Kind::Extract
        }
    }

    fn probe_answer(&self, args: &[String]) -> ToolOutput {
        let joined = args.join(" ");
        let stdout = if joined.contains("format=duration") {
            match self.duration {
                Some(d) => format!("{d:.6}\n"),
                None => "N/A\n".to_string(),
            }
        } else if joined.contains("stream=codec_name") {
            format!("{}\n", self.codec)
        } else if joined.contains("frame=side_data_list") {
            r#"{"frames":[{}]}"#.to_string()
        } else {
            format!(
                r#"{{"streams":[{{"color_transfer":"{}","pix_fmt":"{}"}}]}}"#,
                self.transfer, self.pix_fmt
            )
        };
        ok(stdout, String::new())
    }
}

fn ok(stdout: String, stderr: String) -> ToolOutput {
    ToolOutput {
        exit_code: Some(0),
        stdout,
        stderr,
    }
}

fn failed(stderr: &str) -> ToolOutput {
    ToolOutput {
        exit_code: Some(1),
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

#[async_trait]
impl ProcessRunner for FakeTools {
    async fn run(
        &self,
        command: &ToolCommand,
        cancel: &CancellationToken,
    ) -> fp_core::Result<ToolOutput> {
        if cancel.is_cancelled() {
            return Err(fp_core::Error::Cancelled);
        }
        let kind = Self::classify(command);
        let args = command.arg_list().to_vec();
        self.calls.lock().push(Call {
            kind,
            args: args.clone(),
        });

        Ok(match kind {
            Kind::Probe => self.probe_answer(&args),
            Kind::Validation if self.validation_ok => ok(String::new(), String::new()),
            Kind::Validation => failed("Failed to initialise VAAPI connection: -1 (unknown libva error)."),
            Kind::BlackDetect => ok(String::new(), self.black_stderr.to_string()),
            Kind::FilterList => failed("Segmentation fault"),
            Kind::Extract => {
                let hardware = args.iter().any(|a| a == "-hwaccel");
                let succeed = if hardware {
                    self.hardware_extract_ok
                } else {
                    self.software_extract_ok
                };
                let out = args.last().cloned().unwrap_or_default();
                if succeed {
                    std::fs::write(&out, b"\xFF\xD8\xFF fake jpeg")?;
                    ok(String::new(), String::new())
                } else {
                    // Leave a truncated file behind, as a crashing encoder would.
                    std::fs::write(&out, b"")?;
                    failed("Error while decoding stream #0:0: Invalid data found")
                }
            }
        })
    }
}

/// A temp workspace with one source file and an output directory.
pub struct Harness {
    pub dir: tempfile::TempDir,
    pub source: PathBuf,
    pub output_dir: PathBuf,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("film.mkv");
        std::fs::write(&source, b"not really matroska").unwrap();
        let output_dir = dir.path().join("out");
        Self {
            dir,
            source,
            output_dir,
        }
    }

    pub fn add_source(&self, name: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, b"more fake media").unwrap();
        path
    }

    pub fn config(&self, vaapi: bool) -> Config {
        let mut config = Config::default();
        config.hardware.flags = HostCapabilities {
            vaapi,
            ..Default::default()
        };
        config.extraction.output_dir = self.output_dir.clone();
        config.extraction.max_concurrency = 4;
        config
    }

    pub fn service(&self, config: &Config, tools: Arc<FakeTools>) -> PosterService {
        self.service_with_filters(config, tools, FilterSupport::all())
    }

    pub fn service_with_filters(
        &self,
        config: &Config,
        tools: Arc<FakeTools>,
        filters: FilterSupport,
    ) -> PosterService {
        PosterService::new(
            config,
            &ToolRegistry::with_paths("ffmpeg", "ffprobe"),
            tools,
            filters,
        )
        .with_seed(1234)
    }

    pub fn output_files(&self) -> Vec<PathBuf> {
        match std::fs::read_dir(&self.output_dir) {
            Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
            Err(_) => Vec::new(),
        }
    }
}

pub fn touch_bigger(path: &Path) {
    let mut contents = std::fs::read(path).unwrap();
    contents.extend_from_slice(b" changed");
    std::fs::write(path, contents).unwrap();
}
