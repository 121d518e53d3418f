use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mp3forge")]
#[command(author, version, about = "Convert videos to MP3 in batches")]
pub struct Cli {
    /// Path to config file (defaults to ./mp3forge.json when present)
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
    /// Start the conversion web service
    Start {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Convert video files, or every supported video in a folder, to MP3
    Convert {
        /// Video files or folders
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output folder (defaults to each video's own folder)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// MP3 bitrate, e.g. 192k (overrides config)
        #[arg(short, long)]
        bitrate: Option<String>,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses --config or the default if not specified)
        file: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
