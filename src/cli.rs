use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "framepick")]
#[command(author, version, about = "Extract poster frames from video files")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract one poster frame from each file
    Extract {
        /// Video files to process
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Directory for extracted images (overrides config)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Seek position in seconds for the first attempt
        #[arg(short, long)]
        timestamp: Option<f64>,

        /// Known duration in seconds, skipping the duration probe result
        #[arg(long)]
        duration: Option<f64>,
    },

    /// Probe a media file and display its profile
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
