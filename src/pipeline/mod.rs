use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tracing::Instrument;
use uuid::Uuid;

use crate::api::PipelineApi;
use crate::output::sanitize_translation;
use crate::progress::{ProgressState, StageProgress, StageRange, DEFAULT_CHUNK_ESTIMATE};
use crate::stream::{ByteStream, StreamReader};
use crate::{PipelineError, TransportError};

/// One sequential step of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Download,
    Transcribe,
    Translate,
}

impl Stage {
    /// All stages in execution order
    pub const ALL: [Stage; 3] = [Stage::Download, Stage::Transcribe, Stage::Translate];

    /// Fixed share of the overall progress scale; contiguous and covering [0, 100]
    pub fn range(self) -> StageRange {
        match self {
            Stage::Download => StageRange::new(0.0, 20.0),
            Stage::Transcribe => StageRange::new(20.0, 60.0),
            Stage::Translate => StageRange::new(60.0, 100.0),
        }
    }

    /// Progress log line written when the stage starts
    pub fn banner(self) -> &'static str {
        match self {
            Stage::Download => "Downloading audio...\n",
            Stage::Transcribe => "Transcribing audio... wait...\n",
            Stage::Translate => "\nTranslating text... wait...\n",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Download => "download",
            Stage::Transcribe => "transcribe",
            Stage::Translate => "translate",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    Idle,
    Downloading,
    Transcribing,
    Translating,
    Done,
    Failed,
}

impl PipelineState {
    pub fn for_stage(stage: Stage) -> Self {
        match stage {
            Stage::Download => PipelineState::Downloading,
            Stage::Transcribe => PipelineState::Transcribing,
            Stage::Translate => PipelineState::Translating,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Idle => "idle",
            PipelineState::Downloading => "downloading",
            PipelineState::Transcribing => "transcribing",
            PipelineState::Translating => "translating",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Input of a pipeline run, fixed for the run's duration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRequest {
    pub video_id: String,
    pub model: String,
}

impl PipelineRequest {
    pub fn new(video_id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            model: model.into(),
        }
    }

    /// Build a request from a watch URL, rejecting URLs without a `v` parameter
    pub fn from_url(url: &str, model: &str) -> Result<Self, PipelineError> {
        let video_id = crate::utils::extract_video_id(url)?;
        Ok(Self::new(video_id, model))
    }
}

/// Accumulated output of one stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: Stage,

    /// Concatenation of every decoded fragment, in arrival order
    pub full_text: String,

    pub succeeded: bool,
}

/// Progress notifications of a running pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// The run entered a new state
    StateChanged { state: PipelineState, progress: f64 },

    /// A line for the human-readable progress log
    Log(String),

    /// A decoded piece of a stage's response body
    Fragment { stage: Stage, text: String, progress: f64 },

    /// A stage's stream completed
    StageCompleted { stage: Stage, progress: f64 },

    /// The run stopped on a transport error; progress stays where it was
    Failed { stage: Stage, error: String, progress: f64 },
}

impl PipelineEvent {
    pub fn progress(&self) -> Option<f64> {
        match self {
            PipelineEvent::StateChanged { progress, .. }
            | PipelineEvent::Fragment { progress, .. }
            | PipelineEvent::StageCompleted { progress, .. }
            | PipelineEvent::Failed { progress, .. } => Some(*progress),
            PipelineEvent::Log(_) => None,
        }
    }
}

/// Summary of a finished run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutcome {
    pub run_id: Uuid,
    pub request: PipelineRequest,
    pub state: PipelineState,

    /// Sanitized translation, absent when transcription produced nothing
    pub result: Option<String>,

    pub stages: Vec<StageResult>,
    pub progress: f64,

    /// Stage banners and every fragment, as shown in the progress view
    pub log: String,

    pub elapsed: Duration,
    pub finished_at: DateTime<Utc>,
}

/// Sequences the download, transcribe and translate stages
#[derive(Clone)]
pub struct Orchestrator {
    api: Arc<dyn PipelineApi>,
    chunk_estimate: u32,
    run_guard: Arc<Mutex<()>>,
}

impl Orchestrator {
    pub fn new(api: Arc<dyn PipelineApi>) -> Self {
        Self {
            api,
            chunk_estimate: DEFAULT_CHUNK_ESTIMATE,
            run_guard: Arc::new(Mutex::new(())),
        }
    }

    /// Override the assumed number of chunks per stage
    pub fn with_chunk_estimate(mut self, chunk_estimate: u32) -> Self {
        self.chunk_estimate = chunk_estimate.max(1);
        self
    }

    /// Whether a run is currently in progress
    pub fn is_running(&self) -> bool {
        self.run_guard.try_lock().is_err()
    }

    /// Validate a submitted URL and run the pipeline for it
    pub async fn submit(
        &self,
        url: &str,
        model: &str,
        events: mpsc::Sender<PipelineEvent>,
    ) -> Result<PipelineOutcome, PipelineError> {
        let request = PipelineRequest::from_url(url, model)?;
        self.run(request, events).await
    }

    /// Run all stages for a request, publishing progress on `events`
    ///
    /// Only one run may be active per orchestrator; a concurrent call fails with
    /// [`PipelineError::AlreadyRunning`]. Dropping the receiving end of `events` stops
    /// the run at its next notification and drops the in-flight response.
    pub async fn run(
        &self,
        request: PipelineRequest,
        events: mpsc::Sender<PipelineEvent>,
    ) -> Result<PipelineOutcome, PipelineError> {
        let _guard = self
            .run_guard
            .clone()
            .try_lock_owned()
            .map_err(|_| PipelineError::AlreadyRunning)?;

        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("pipeline", %run_id, video_id = %request.video_id);

        let run = Run::new(run_id, request, events, self.chunk_estimate);
        self.drive(run).instrument(span).await
    }

    async fn drive(&self, mut run: Run) -> Result<PipelineOutcome, PipelineError> {
        let result = self.execute(&mut run).await;

        match result {
            Ok(translation) => Ok(run.finish(translation)),
            Err(PipelineError::Transport { stage, source }) => {
                run.state = PipelineState::Failed;
                tracing::error!(
                    "{} stage failed at {:.0}%: {}",
                    stage,
                    run.progress.value(),
                    source
                );
                // The receiver may already be gone; the error is returned either way
                let _ = run
                    .events
                    .send(PipelineEvent::Failed {
                        stage,
                        error: source.to_string(),
                        progress: run.progress.value(),
                    })
                    .await;
                Err(PipelineError::Transport { stage, source })
            }
            Err(e) => {
                tracing::warn!("Pipeline stopped: {}", e);
                Err(e)
            }
        }
    }

    async fn execute(&self, run: &mut Run) -> Result<Option<String>, PipelineError> {
        let video_id = run.request.video_id.clone();
        let model = run.request.model.clone();

        tracing::info!("Starting pipeline with model {}", model);

        run.enter(Stage::Download).await?;
        let opened = self.api.download_audio(&video_id).await;
        run.stream_stage(Stage::Download, opened).await?;

        run.enter(Stage::Transcribe).await?;
        let opened = self.api.transcribe(&video_id).await;
        let transcript = run.stream_stage(Stage::Transcribe, opened).await?;

        if !transcript.succeeded {
            tracing::warn!("Transcription produced no usable output, skipping translation");
            run.log_line("\nNo transcript available.\n").await?;
            run.done().await?;
            return Ok(None);
        }

        run.enter(Stage::Translate).await?;
        let opened = self.api.translate(&transcript.full_text, &model).await;
        let translated = run.stream_stage(Stage::Translate, opened).await?;

        let result = sanitize_translation(&translated.full_text);
        run.log_line("\nDone!\n").await?;
        run.done().await?;

        Ok(Some(result))
    }
}

/// State of one pipeline run, owned by the orchestrator for the run's duration
struct Run {
    id: Uuid,
    request: PipelineRequest,
    events: mpsc::Sender<PipelineEvent>,
    chunk_estimate: u32,
    state: PipelineState,
    progress: ProgressState,
    stages: Vec<StageResult>,
    log: String,
    started: Instant,
}

impl Run {
    fn new(
        id: Uuid,
        request: PipelineRequest,
        events: mpsc::Sender<PipelineEvent>,
        chunk_estimate: u32,
    ) -> Self {
        Self {
            id,
            request,
            events,
            chunk_estimate,
            state: PipelineState::Idle,
            progress: ProgressState::new(),
            stages: Vec::with_capacity(Stage::ALL.len()),
            log: String::new(),
            started: Instant::now(),
        }
    }

    async fn emit(&self, event: PipelineEvent) -> Result<(), PipelineError> {
        self.events
            .send(event)
            .await
            .map_err(|_| PipelineError::Cancelled)
    }

    async fn set_state(&mut self, state: PipelineState) -> Result<(), PipelineError> {
        tracing::info!("{} -> {}", self.state, state);
        self.state = state;
        self.emit(PipelineEvent::StateChanged {
            state,
            progress: self.progress.value(),
        })
        .await
    }

    async fn enter(&mut self, stage: Stage) -> Result<(), PipelineError> {
        self.set_state(PipelineState::for_stage(stage)).await?;
        self.log_line(stage.banner()).await
    }

    async fn done(&mut self) -> Result<(), PipelineError> {
        self.progress.advance(crate::progress::PROGRESS_MAX);
        self.set_state(PipelineState::Done).await
    }

    async fn log_line(&mut self, line: &str) -> Result<(), PipelineError> {
        self.log.push_str(line);
        self.emit(PipelineEvent::Log(line.to_string())).await
    }

    /// Consume one stage's response body, one fragment at a time
    async fn stream_stage(
        &mut self,
        stage: Stage,
        opened: Result<ByteStream, TransportError>,
    ) -> Result<StageResult, PipelineError> {
        let body = opened.map_err(|source| PipelineError::Transport { stage, source })?;

        let mut mapper = StageProgress::new(stage.range(), self.chunk_estimate);
        let mut reader = StreamReader::new(body);
        let mut full_text = String::new();

        while let Some(fragment) = reader.next_fragment().await {
            let text = fragment.map_err(|source| PipelineError::Transport { stage, source })?;
            full_text.push_str(&text);
            self.log.push_str(&text);

            let progress = self.progress.advance(mapper.on_chunk());
            self.emit(PipelineEvent::Fragment {
                stage,
                text,
                progress,
            })
            .await?;
        }

        let chunks = mapper.chunks();
        let progress = self.progress.advance(mapper.complete());
        tracing::debug!(
            "{} stage completed: {} chunks, {} chars",
            stage,
            chunks,
            full_text.chars().count()
        );
        self.emit(PipelineEvent::StageCompleted { stage, progress })
            .await?;

        let succeeded = match stage {
            Stage::Transcribe => !full_text.is_empty(),
            Stage::Download | Stage::Translate => true,
        };

        let result = StageResult {
            stage,
            full_text,
            succeeded,
        };
        self.stages.push(result.clone());
        Ok(result)
    }

    fn finish(self, result: Option<String>) -> PipelineOutcome {
        let elapsed = self.started.elapsed();
        tracing::info!(
            "Pipeline finished in {}",
            crate::utils::format_duration(elapsed.as_secs_f64())
        );

        PipelineOutcome {
            run_id: self.id,
            request: self.request,
            state: self.state,
            result,
            stages: self.stages,
            progress: self.progress.value(),
            log: self.log,
            elapsed,
            finished_at: Utc::now(),
        }
    }
}
