use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "vid2audio")]
#[command(author, version, about = "Convert uploaded video to audio through an ordered job queue")]
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
    /// Start the server
    Start {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config and PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Convert a single file to audio without starting the server
    Convert {
        /// Input media file
        #[arg(required = true)]
        input: PathBuf,

        /// Trim start in seconds
        #[arg(long)]
        start: Option<String>,

        /// Trim end in seconds
        #[arg(long)]
        end: Option<String>,

        /// Directory to write the audio to (defaults to the input's directory)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Check availability of external tools
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate
        config: Option<PathBuf>,
    },

    /// Show version information
    Version,
}
