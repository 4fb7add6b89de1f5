mod cli;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use fp_av::{FfprobeProber, Prober, SystemRunner, ToolRegistry};
use fp_core::config::Config;
use fp_frame::{ExtractOptions, PosterService};
use tokio_util::sync::CancellationToken;

/// Cancel `token` on Ctrl-C so running subprocesses are killed.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; cancelling");
            token.cancel();
        }
    });
}

async fn extract_files(
    files: Vec<PathBuf>,
    mut config: Config,
    output_dir: Option<PathBuf>,
    options: ExtractOptions,
) -> Result<()> {
    if let Some(dir) = output_dir {
        config.extraction.output_dir = dir;
    }
    for warning in config.validate() {
        tracing::warn!("Config: {warning}");
    }

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let service = PosterService::start(&config, &cancel).await?;
    let report = service.extract_batch(&files, options, &cancel).await;

    for entry in &report.outputs {
        match &entry.output {
            Some(out) => println!("✓ {} -> {}", entry.source.display(), out.display()),
            None => println!("✗ {}: no frame extracted", entry.source.display()),
        }
    }
    println!("\n{} succeeded, {} failed", report.succeeded, report.failed);

    let disabled = service.failed_codecs().snapshot();
    if !disabled.is_empty() {
        tracing::warn!("Hardware decode disabled this run for: {}", disabled.join(", "));
    }

    if report.all_failed() {
        anyhow::bail!("no frame could be extracted from any input");
    }
    Ok(())
}

async fn probe_file(file: &Path, config: &Config, json: bool) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let tools = ToolRegistry::discover(&config.tools);
    let ffprobe = tools.require("ffprobe")?.path.clone();
    let prober = FfprobeProber::new(
        ffprobe,
        Arc::new(SystemRunner),
        Duration::from_secs(config.extraction.probe_timeout_secs),
    )
    .with_threads(config.extraction.threads_per_process);
    let profile = prober.probe(file, &CancellationToken::new()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&profile)?);
        return Ok(());
    }

    println!("File: {}", profile.path.display());
    match profile.duration_secs {
        Some(d) => {
            let secs = d as u64;
            println!(
                "Duration: {:02}:{:02}:{:02}",
                secs / 3600,
                (secs / 60) % 60,
                secs % 60
            );
        }
        None => println!("Duration: unknown"),
    }
    println!(
        "Codec: {}",
        profile.video_codec.as_deref().unwrap_or("unknown")
    );
    let show = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
    println!(
        "Color: space={} transfer={} primaries={}",
        show(&profile.color_space),
        show(&profile.color_transfer),
        show(&profile.color_primaries)
    );
    println!("Pixel format: {}", show(&profile.pixel_format));
    if let Some(bits) = profile.bit_depth {
        println!("Bit depth: {bits}");
    }
    let effective = profile.effective_hdr_class();
    if effective == profile.hdr_class {
        println!("Dynamic range: {}", profile.hdr_class);
    } else {
        println!("Dynamic range: {} (treated as {effective})", profile.hdr_class);
    }
    println!(
        "Tone mapping: {}",
        if effective.requires_tone_mapping() {
            "required"
        } else {
            "not required"
        }
    );
    Ok(())
}

fn check_tools(config: &Config) -> Result<()> {
    println!("Checking external tools...\n");

    let tools = ToolRegistry::discover(&config.tools).check_all();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({version})");
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install ffmpeg to extract frames.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let contents = std::fs::read_to_string(p)?;
            let config = Config::from_json(&contents)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    let e = &config.extraction;
    println!("  Output: {} ({})", e.output_dir.display(), e.output_format);
    println!("  Attempts: {}", e.max_attempts);
    println!(
        "  Concurrency: {} processes x {} threads",
        e.max_concurrency, e.threads_per_process
    );
    println!(
        "  Tone mapping: {} ({}, peak {})",
        if config.tone_mapping.enabled { "on" } else { "off" },
        config.tone_mapping.algorithm,
        config.tone_mapping.peak_luminance
    );
    println!(
        "  Black detection: {}",
        if config.black_detect.enabled { "on" } else { "off" }
    );

    let warnings = config.validate();
    if !warnings.is_empty() {
        println!("\nWarnings:");
        for warning in &warnings {
            println!("  - {warning}");
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise pick levels from the verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "framepick=debug,fp_frame=debug,fp_av=debug,fp_core=debug".to_string()
        } else {
            "framepick=info,fp_frame=info,fp_av=info,fp_core=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load_or_default(cli.config.as_deref());

    match cli.command {
        Commands::Extract {
            files,
            output_dir,
            timestamp,
            duration,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            let options = ExtractOptions {
                duration_hint: duration,
                preferred_timestamp: timestamp,
            };
            rt.block_on(extract_files(files, config, output_dir, options))
        }
        Commands::Probe { file, json } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(probe_file(&file, &config, json))
        }
        Commands::CheckTools => check_tools(&config),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("framepick {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
