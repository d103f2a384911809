use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "yt-translate",
    about = "yt-translate - Download, transcribe and translate YouTube videos through a pipeline server",
    version,
    long_about = "Submits a YouTube URL to a pipeline server that downloads the audio, transcribes it to SRT and translates the subtitles. Streams the server's output as it arrives and shows overall progress."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Configuration file (defaults to ./config.yaml or the user config directory)
    #[arg(long, global = true, value_name = "FILE", env = "YT_TRANSLATE_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the download, transcribe and translate pipeline for a video
    Run {
        /// YouTube watch URL (must carry a `v` query parameter)
        #[arg(value_name = "URL")]
        url: String,

        /// Translation model id (uses the configured default if not specified)
        #[arg(short, long, value_name = "MODEL")]
        model: Option<String>,

        /// Output file path (prints to console if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Start even if the transcription service reports unavailable
        #[arg(long)]
        skip_status_check: bool,

        /// Print the raw stage output above the progress bar
        #[arg(long)]
        show_log: bool,
    },

    /// List available translation models
    Models,

    /// Check whether the transcription service is available
    Status {
        /// Keep polling and print every result until interrupted
        #[arg(short, long)]
        watch: bool,
    },

    /// Show configuration
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },
}
