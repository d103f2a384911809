use anyhow::Result;
use clap::Parser;
use console::style;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use yt_translate::cli::{Cli, Commands};
use yt_translate::config::Config;
use yt_translate::output::{self, ProgressDisplay};
use yt_translate::pipeline::{Orchestrator, PipelineRequest};
use yt_translate::status::{self, ServiceStatus};
use yt_translate::{api, HttpApi};

fn init_tracing(verbose: bool, json: bool) {
    let default_filter = if verbose {
        "yt_translate=debug"
    } else {
        "yt_translate=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(json.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
        }))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}

fn styled_status(status: ServiceStatus) -> String {
    match status {
        ServiceStatus::Checking => style("checking").dim().to_string(),
        ServiceStatus::Available => style("available").green().to_string(),
        ServiceStatus::Unavailable => style("unavailable").red().to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let config = Config::load(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Run {
            url,
            model,
            output,
            skip_status_check,
            show_log,
        } => {
            let model = model.unwrap_or_else(|| config.pipeline.default_model.clone());
            let request = PipelineRequest::from_url(&url, &model)?;
            let api = Arc::new(HttpApi::new(&config.server.base_url, config.connect_timeout())?);

            if config.status.require_available && !skip_status_check {
                let mut poller = status::activate(api.clone(), config.poll_interval(), |status| {
                    tracing::debug!("Transcription service is {}", status);
                });
                let status = poller.resolved().await;
                poller.deactivate();

                if !status.allows_start() {
                    anyhow::bail!(
                        "Transcription service is unavailable (use --skip-status-check to start anyway)"
                    );
                }
            }

            let orchestrator = Orchestrator::new(api.clone())
                .with_chunk_estimate(config.pipeline.chunk_estimate);

            let (tx, mut rx) = mpsc::channel(config.pipeline.event_buffer);
            let display = ProgressDisplay::new(cli.quiet, show_log);
            let renderer = tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    display.handle(&event);
                }
                display
            });

            tracing::info!("Starting pipeline for video: {}", request.video_id);

            let result = tokio::select! {
                result = orchestrator.run(request, tx) => result,
                _ = tokio::signal::ctrl_c() => {
                    // Dropping the run future aborts the in-flight request
                    let display = renderer.await?;
                    display.finish("Cancelled");
                    anyhow::bail!("Interrupted");
                }
            };
            let display = renderer.await?;

            let outcome = match result {
                Ok(outcome) => outcome,
                Err(e) => {
                    display.finish("Failed");
                    return Err(e.into());
                }
            };
            display.finish("Done");

            tracing::info!(
                "Run {} finished in {}",
                outcome.run_id,
                yt_translate::utils::format_duration(outcome.elapsed.as_secs_f64())
            );

            match output {
                Some(path) => {
                    output::save_to_file(&outcome, &path).await?;
                    println!("Translation saved to: {}", path.display());
                }
                None => output::print_to_console(&outcome),
            }
        }
        Commands::Models => {
            let client = HttpApi::new(&config.server.base_url, config.connect_timeout())?;
            let models = api::load_models(&client).await;

            println!("Available models:");
            for model in models {
                let marker = if model.id == config.pipeline.default_model { "*" } else { " " };
                println!("{} {} ({})", marker, style(&model.id).bold(), model.display_name);
                if let Some(description) = model.description.filter(|d| !d.is_empty()) {
                    println!("    {}", style(description).dim());
                }
            }
        }
        Commands::Status { watch } => {
            let api = Arc::new(HttpApi::new(&config.server.base_url, config.connect_timeout())?);

            if watch {
                let mut poller = status::activate(api, config.poll_interval(), |status| {
                    println!(
                        "[{}] Transcription service: {}",
                        chrono::Local::now().format("%H:%M:%S"),
                        styled_status(status)
                    );
                });
                tokio::signal::ctrl_c().await?;
                poller.deactivate();
            } else {
                let status = status::check_once(api.as_ref()).await;
                println!("Transcription service: {}", styled_status(status));
                if !status.allows_start() {
                    anyhow::bail!("Transcription service is not available");
                }
            }
        }
        Commands::Config { show } => {
            if show {
                config.display();
            } else {
                match cli.config {
                    Some(path) => println!("Config file: {}", path.display()),
                    None => println!("Config file: {}", Config::config_path()?.display()),
                }
                println!("Use --show to print the current configuration.");
            }
        }
    }

    Ok(())
}
