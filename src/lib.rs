//! yt-translate - A Rust CLI that turns a YouTube URL into a translated transcript
//!
//! This library drives a three-stage pipeline (audio download, transcription, translation)
//! exposed by a server as streaming HTTP endpoints, maps the streamed chunks onto a single
//! 0-100 progress scale and filters in-band error lines out of the final translation.

pub mod api;
pub mod cli;
pub mod config;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod status;
pub mod stream;
pub mod utils;

pub use api::{HttpApi, ModelDescriptor, PipelineApi, StatusProbe};
pub use cli::{Cli, Commands};
pub use config::Config;
pub use pipeline::{Orchestrator, PipelineEvent, PipelineOutcome, PipelineRequest, PipelineState, Stage};
pub use status::{PollerHandle, ServiceStatus};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Network or stream failure while talking to the pipeline server
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: String, status: u16 },

    #[error("Stream interrupted: {0}")]
    Stream(String),
}

/// Error types surfaced by a pipeline run
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("Invalid video URL: {0}")]
    MalformedInput(String),

    #[error("{stage} stage failed: {source}")]
    Transport {
        stage: Stage,
        #[source]
        source: TransportError,
    },

    #[error("A pipeline run is already in progress")]
    AlreadyRunning,

    #[error("Pipeline run cancelled")]
    Cancelled,
}
