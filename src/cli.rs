use clap::{Parser, Subcommand};
use std::path::PathBuf;
use vodforge_core::VideoCategory;

#[derive(Parser)]
#[command(name = "vodforge")]
#[command(author, version, about = "HLS transcoding and delivery service")]
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
    /// Start the HTTP server and the transcode workers
    Start {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Register an uploaded video and queue its transcode
    Register {
        /// Display title
        #[arg(long)]
        title: String,

        /// One of: drama, romance, comedy, action, documentary
        #[arg(long)]
        category: VideoCategory,

        /// Path to the uploaded source file
        #[arg(long)]
        source: PathBuf,

        #[arg(long, default_value = "")]
        description: String,
    },

    /// Queue a transcode for an existing video
    Enqueue {
        /// Video ID
        video_id: i64,
    },

    /// List transcode jobs
    Jobs {
        /// Only show jobs in this state (queued, running, succeeded,
        /// partially_succeeded, failed)
        #[arg(long)]
        status: Option<String>,
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
