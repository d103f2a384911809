use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;

use crate::pipeline::{PipelineEvent, PipelineOutcome, PipelineState};

/// Prefix the translator puts on lines it could not translate
pub const ERROR_MARKER: &str = "[Error]";

/// Drop every line starting with the error marker, keeping the rest in order
pub fn sanitize_translation(text: &str) -> String {
    text.split('\n')
        .filter(|line| !line.starts_with(ERROR_MARKER))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Terminal rendering of pipeline events
pub struct ProgressDisplay {
    bar: Option<ProgressBar>,
    show_log: bool,
}

impl ProgressDisplay {
    pub fn new(quiet: bool, show_log: bool) -> Self {
        let bar = if quiet {
            None
        } else {
            let bar = ProgressBar::new(100);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% / 100% {msg}")
                    .unwrap()
                    .progress_chars("#>-"),
            );
            Some(bar)
        };

        Self { bar, show_log }
    }

    /// Apply one pipeline event to the display
    pub fn handle(&self, event: &PipelineEvent) {
        if let Some(progress) = event.progress() {
            self.set_progress(progress);
        }

        match event {
            PipelineEvent::StateChanged { state, .. } => {
                self.set_message(state_message(*state));
            }
            PipelineEvent::Log(line) | PipelineEvent::Fragment { text: line, .. } => {
                if self.show_log {
                    self.print(line);
                }
            }
            PipelineEvent::StageCompleted { stage, .. } => {
                tracing::debug!("{} stage finished", stage);
            }
            PipelineEvent::Failed { stage, error, .. } => {
                self.set_message(&format!("{} failed: {}", stage, error));
            }
        }
    }

    fn set_progress(&self, progress: f64) {
        if let Some(bar) = &self.bar {
            bar.set_position(progress.round() as u64);
        }
    }

    fn set_message(&self, message: &str) {
        if let Some(bar) = &self.bar {
            bar.set_message(message.to_string());
        }
    }

    fn print(&self, text: &str) {
        let text = text.trim_end_matches('\n');
        if text.is_empty() {
            return;
        }
        match &self.bar {
            Some(bar) => bar.println(text),
            None => eprintln!("{}", text),
        }
    }

    /// Leave the bar on screen at its last position
    pub fn finish(&self, message: &str) {
        if let Some(bar) = &self.bar {
            bar.abandon_with_message(message.to_string());
        }
    }
}

fn state_message(state: PipelineState) -> &'static str {
    match state {
        PipelineState::Idle => "Waiting...",
        PipelineState::Downloading => "Downloading audio...",
        PipelineState::Transcribing => "Transcribing audio...",
        PipelineState::Translating => "Translating text...",
        PipelineState::Done => "Done",
        PipelineState::Failed => "Failed",
    }
}

/// Save the translated result to a file
pub async fn save_to_file(outcome: &PipelineOutcome, path: &Path) -> Result<()> {
    let content = outcome.result.as_deref().unwrap_or_default();

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs_err::create_dir_all(parent)?;
    }

    fs_err::write(path, content).context("Failed to write result file")?;
    Ok(())
}

/// Print the translated result to the console
pub fn print_to_console(outcome: &PipelineOutcome) {
    match outcome.result.as_deref() {
        Some(text) => println!("{}", text),
        None => eprintln!("No transcript was produced for video {}", outcome.request.video_id),
    }
}
