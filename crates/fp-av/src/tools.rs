//! External tool detection and filter capability discovery.
//!
//! The [`ToolRegistry`] discovers and caches the locations of ffmpeg and
//! ffprobe. [`FilterSupport`] records which filters the discovered ffmpeg
//! build was compiled with, so tone-mapping strategies are only chosen when
//! their filters exist.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::command::{ProcessRunner, ToolCommand};

/// Default tool timeout: 5 minutes.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Known tool names that the registry manages.
const KNOWN_TOOLS: &[&str] = &["ffmpeg", "ffprobe"];

/// Filters whose presence changes how frames are converted.
pub const KNOWN_FILTERS: &[&str] = &[
    "zscale",
    "tonemap",
    "libplacebo",
    "tonemap_vaapi",
    "vpp_qsv",
    "tonemap_cuda",
    "scale_vt",
    "blackdetect",
    "hwdownload",
];

/// Filters shipped by any stock ffmpeg build with zimg, assumed present
/// when the filter listing cannot be read.
pub const STANDARD_FILTERS: &[&str] = &["zscale", "tonemap", "blackdetect", "hwdownload"];

/// Configuration for a single external tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Human-readable tool name (e.g. "ffmpeg").
    pub name: String,
    /// Resolved path to the executable.
    pub path: PathBuf,
    /// Maximum execution time before the tool is killed.
    #[serde(
        default = "default_timeout",
        with = "duration_secs",
        skip_serializing_if = "is_default_timeout"
    )]
    pub timeout: Duration,
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn is_default_timeout(d: &Duration) -> bool {
    *d == DEFAULT_TIMEOUT
}

/// Serde helpers to (de)serialize `Duration` as whole seconds.
mod duration_secs {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Availability information for a tool, returned by [`ToolRegistry::check_all`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Tool name.
    pub name: String,
    /// Whether the tool was found.
    pub available: bool,
    /// Version string (first line of `-version` output), if available.
    pub version: Option<String>,
    /// Resolved path to the executable.
    pub path: Option<PathBuf>,
}

/// Registry holding discovered tool configurations.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolConfig>,
}

impl ToolRegistry {
    /// Discover tools by searching `PATH` (or using overrides from config).
    ///
    /// A configured path is used when it exists; otherwise [`which::which`]
    /// locates the tool. Tools that are not found are omitted.
    pub fn discover(tools_config: &fp_core::config::ToolsConfig) -> Self {
        let mut tools = HashMap::new();

        for &name in KNOWN_TOOLS {
            let custom_path = match name {
                "ffmpeg" => tools_config.ffmpeg_path.as_deref(),
                "ffprobe" => tools_config.ffprobe_path.as_deref(),
                _ => None,
            };

            let resolved = match custom_path {
                Some(p) if p.exists() => Some(p.to_path_buf()),
                Some(p) => {
                    tracing::warn!(
                        "Configured {name} path {} does not exist; searching PATH",
                        p.display()
                    );
                    which::which(name).ok()
                }
                None => which::which(name).ok(),
            };

            if let Some(path) = resolved {
                tools.insert(
                    name.to_string(),
                    ToolConfig {
                        name: name.to_string(),
                        path,
                        timeout: DEFAULT_TIMEOUT,
                    },
                );
            }
        }

        Self { tools }
    }

    /// A registry with fixed paths, bypassing discovery.
    pub fn with_paths(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        let mut tools = HashMap::new();
        for (name, path) in [("ffmpeg", ffmpeg.into()), ("ffprobe", ffprobe.into())] {
            tools.insert(
                name.to_string(),
                ToolConfig {
                    name: name.to_string(),
                    path,
                    timeout: DEFAULT_TIMEOUT,
                },
            );
        }
        Self { tools }
    }

    /// Return the [`ToolConfig`] for the given tool, or an
    /// [`fp_core::Error::Tool`] if the tool was not found during discovery.
    pub fn require(&self, name: &str) -> fp_core::Result<&ToolConfig> {
        self.tools.get(name).ok_or_else(|| {
            fp_core::Error::tool(name, format!("{name} not found; is it installed and in PATH?"))
        })
    }

    /// Path to a tool, or the bare tool name so spawning reports it missing.
    pub fn path_or_name(&self, name: &str) -> PathBuf {
        self.tools
            .get(name)
            .map(|t| t.path.clone())
            .unwrap_or_else(|| PathBuf::from(name))
    }

    /// Check all known tools and return availability information.
    pub fn check_all(&self) -> Vec<ToolInfo> {
        KNOWN_TOOLS
            .iter()
            .map(|&name| match self.tools.get(name) {
                Some(cfg) => ToolInfo {
                    name: name.to_string(),
                    available: true,
                    version: detect_version(&cfg.path),
                    path: Some(cfg.path.clone()),
                },
                None => ToolInfo {
                    name: name.to_string(),
                    available: false,
                    version: None,
                    path: None,
                },
            })
            .collect()
    }
}

/// Run `<tool> -version` and return the first line of stdout.
fn detect_version(path: &Path) -> Option<String> {
    let output = std::process::Command::new(path)
        .arg("-version")
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|s| s.to_string())
}

/// Filters available in the local ffmpeg build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSupport {
    names: BTreeSet<String>,
}

impl FilterSupport {
    /// No filters at all.
    pub fn none() -> Self {
        Self::default()
    }

    /// Every filter in [`KNOWN_FILTERS`].
    pub fn all() -> Self {
        Self::from_names(KNOWN_FILTERS.iter().copied())
    }

    /// The [`STANDARD_FILTERS`] only.
    pub fn standard() -> Self {
        Self::from_names(STANDARD_FILTERS.iter().copied())
    }

    pub fn from_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            names: names.into_iter().map(str::to_string).collect(),
        }
    }

    /// Parse the listing printed by `ffmpeg -filters`.
    ///
    /// Data rows look like ` TSC zscale  V->V  Apply resizing, ...`; legend
    /// rows have no `->` in the third column and are skipped.
    pub fn parse(listing: &str) -> Self {
        let names = listing
            .lines()
            .filter_map(|line| {
                let mut cols = line.split_whitespace();
                let _flags = cols.next()?;
                let name = cols.next()?;
                let io = cols.next()?;
                io.contains("->").then(|| name.to_string())
            })
            .collect();
        Self { names }
    }

    /// Query ffmpeg for its filter list.
    ///
    /// A failed query yields [`FilterSupport::standard`]: software tone
    /// mapping stays available and a missing filter surfaces as a failed
    /// extraction attempt. Native device filters and libplacebo are only
    /// used when the listing confirms them.
    pub async fn detect(
        ffmpeg: &Path,
        runner: &dyn ProcessRunner,
        cancel: &CancellationToken,
    ) -> Self {
        let mut cmd = ToolCommand::new(ffmpeg.to_path_buf());
        cmd.args(["-hide_banner", "-filters"]);
        cmd.timeout(Duration::from_secs(15));

        match cmd.run(runner, cancel).await {
            Ok(out) if out.success() => {
                let support = Self::parse(&out.stdout);
                tracing::debug!("ffmpeg reports {} filters", support.names.len());
                support
            }
            Ok(out) => {
                tracing::warn!(
                    "ffmpeg -filters exited with {:?}; assuming standard filters",
                    out.exit_code
                );
                Self::standard()
            }
            Err(e) => {
                tracing::warn!("Failed to list ffmpeg filters: {e}; assuming standard filters");
                Self::standard()
            }
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.names.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ToolOutput;
    use fp_core::config::ToolsConfig;

    #[test]
    fn discover_with_default_config() {
        let registry = ToolRegistry::discover(&ToolsConfig::default());
        // We cannot guarantee any tool is installed in CI,
        // but the call itself must not panic.
        let _ = registry.check_all();
    }

    #[test]
    fn require_missing_tool_returns_error() {
        let registry = ToolRegistry::default();
        let result = registry.require("ffmpeg");
        assert!(result.is_err());
        assert_eq!(registry.path_or_name("ffmpeg"), PathBuf::from("ffmpeg"));
    }

    #[test]
    fn with_paths_registers_both_tools() {
        let registry = ToolRegistry::with_paths("/opt/ff/ffmpeg", "/opt/ff/ffprobe");
        assert_eq!(
            registry.require("ffprobe").unwrap().path,
            PathBuf::from("/opt/ff/ffprobe")
        );
        assert_eq!(registry.path_or_name("ffmpeg"), PathBuf::from("/opt/ff/ffmpeg"));
    }

    #[test]
    fn check_all_returns_known_tools() {
        let registry = ToolRegistry::default();
        let infos = registry.check_all();
        let names: Vec<&str> = infos.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["ffmpeg", "ffprobe"]);
        assert!(infos.iter().all(|i| !i.available));
    }

    #[test]
    fn tool_config_serialization() {
        let cfg = ToolConfig {
            name: "ffmpeg".to_string(),
            path: PathBuf::from("/usr/bin/ffmpeg"),
            timeout: DEFAULT_TIMEOUT,
        };
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(!json.contains("timeout"));
        let back: ToolConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name, "ffmpeg");
        assert_eq!(back.timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn parse_filter_listing() {
        let listing = "\
Filters:
  T.. = Timeline support
  .S. = Slice threading
  ..C = Command support
  A = Audio input/output
  V = Video input/output
 ... abench            A->A       Benchmark part of a filtergraph.
 T.C blackdetect       V->V       Detect video intervals that are (almost) black.
 .S. zscale            V->V       Apply resizing, colorspace and bit depth conversion.
 ... tonemap_vaapi     V->V       VAAPI VPP for tone-mapping
 ... testsrc2          |->V       Generate another test pattern.
";
        let support = FilterSupport::parse(listing);
        assert!(support.has("zscale"));
        assert!(support.has("blackdetect"));
        assert!(support.has("tonemap_vaapi"));
        assert!(support.has("testsrc2"));
        assert!(!support.has("libplacebo"));
        assert!(!support.has("="));
        assert!(!support.has("Timeline"));
    }

    #[test]
    fn all_contains_known_filters() {
        let support = FilterSupport::all();
        for name in KNOWN_FILTERS {
            assert!(support.has(name));
        }
        assert!(!FilterSupport::none().has("zscale"));
    }

    struct ExitRunner(Option<i32>);

    #[async_trait::async_trait]
    impl ProcessRunner for ExitRunner {
        async fn run(
            &self,
            command: &ToolCommand,
            _cancel: &CancellationToken,
        ) -> fp_core::Result<ToolOutput> {
            match self.0 {
                Some(code) => Ok(ToolOutput {
                    exit_code: Some(code),
                    stdout: " T.. zscale V->V Apply resizing\n".into(),
                    ..Default::default()
                }),
                None => Err(fp_core::Error::tool(command.program_name(), "timed out")),
            }
        }
    }

    #[tokio::test]
    async fn detect_parses_successful_listing() {
        let support =
            FilterSupport::detect(Path::new("ffmpeg"), &ExitRunner(Some(0)), &CancellationToken::new())
                .await;
        assert!(support.has("zscale"));
        assert!(!support.has("tonemap"));
    }

    #[tokio::test]
    async fn detect_failure_assumes_standard_filters() {
        let cancel = CancellationToken::new();
        for runner in [ExitRunner(Some(1)), ExitRunner(None)] {
            let support = FilterSupport::detect(Path::new("ffmpeg"), &runner, &cancel).await;
            assert_eq!(support, FilterSupport::standard());
            assert!(support.has("zscale"));
            assert!(support.has("tonemap"));
            assert!(!support.has("libplacebo"));
            assert!(!support.has("tonemap_vaapi"));
        }
    }
}
