mod api;
mod config;
mod terminal_output;

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use labelscan_config::{redact, validate, LabelScanConfig};
use labelscan_core::{AnalysisMode, ImageOrigin, Phase, ProgressPhase};
use labelscan_logging::init_logger;
use labelscan_media::ImageSource;
use labelscan_pipeline::{PipelineController, RunOutcome};

use api::AppState;
use terminal_output as out;

const PROGRESS_WIDTH: usize = 30;

#[derive(Parser)]
#[command(name = "labelscan")]
#[command(about = "Extract text from nutrition labels and get an LLM health assessment")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ~/.labelscan/config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Detailed,
    Quick,
}

impl From<ModeArg> for AnalysisMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Detailed => AnalysisMode::Detailed,
            ModeArg::Quick => AnalysisMode::Quick,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Extract the text of a label image and analyze it
    Analyze {
        /// Image file (PNG, JPEG, BMP, GIF, WebP, TIFF)
        image: PathBuf,
        /// Analysis depth; defaults to the configured mode
        #[arg(short, long, value_enum)]
        mode: Option<ModeArg>,
        /// Print the final pipeline state as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start the HTTP API
    Serve {
        /// Port to bind the HTTP server to
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Print the effective configuration with secrets masked
    Config {
        /// Only print the config file location
        #[arg(long)]
        path: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let (path, cfg) = match config::load(cli.config.as_deref()).await {
        Ok(loaded) => loaded,
        Err(e) => {
            out::note_error(&format!("{e:#}"));
            return ExitCode::from(2);
        }
    };

    init_logger(&config::logger_options(&cfg, cli.json_logs));
    for warning in validate(&cfg).warnings {
        warn!(path = %warning.path, message = %warning.message, "Config warning");
    }

    let result = match cli.command {
        Commands::Analyze { image, mode, json } => {
            analyze(&cfg, image, mode.map(Into::into), json).await
        }
        Commands::Serve { port } => serve(&cfg, port).await.map(|_| ExitCode::SUCCESS),
        Commands::Config { path: only_path } => {
            show_config(&cfg, &path, only_path).map(|_| ExitCode::SUCCESS)
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!(error = ?e, "Command failed");
            out::note_error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}

async fn analyze(
    cfg: &LabelScanConfig,
    image: PathBuf,
    mode: Option<AnalysisMode>,
    json: bool,
) -> Result<ExitCode> {
    let controller = config::build_controller(cfg)?;
    if let Some(mode) = mode {
        controller.set_mode(mode);
    }

    out::note_info(&format!("Initializing {} OCR engine...", cfg.ocr.engine()));
    if let Err(e) = controller.start().await {
        controller.shutdown().await;
        return Err(e).context("OCR engine is unavailable");
    }

    if let Err(e) = controller
        .select_image(ImageSource::Path(image.clone()), ImageOrigin::Select)
        .await
    {
        controller.shutdown().await;
        return Err(e).with_context(|| format!("Cannot use {}", image.display()));
    }

    let printer =
        (!json && std::io::stderr().is_terminal()).then(|| spawn_progress_printer(&controller));

    let outcome = controller.run_extract_and_analyze().await;
    if let Some(printer) = printer {
        printer.abort();
        eprintln!();
    }
    let state = controller.state();
    controller.shutdown().await;
    let outcome = outcome?;

    if json {
        let body = serde_json::json!({ "outcome": outcome, "state": state });
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        if let Some(ocr) = &state.ocr_result {
            println!("{}\n{}\n", out::heading("Extracted text"), ocr.text);
        }
        if let Some(analysis) = &state.analysis_result {
            println!("{}\n{}", out::heading("Analysis"), analysis.text);
        }
        eprint!(
            "{}",
            out::render_summary(&state, cfg.analysis.provider(), cfg.ocr.engine())
        );
    }

    Ok(match outcome {
        RunOutcome::Done => match &state.analysis_result {
            Some(analysis) if analysis.succeeded => {
                out::note_success("Analysis complete");
                ExitCode::SUCCESS
            }
            _ => {
                out::note_warn("The LLM did not answer; showing the fallback message");
                ExitCode::from(3)
            }
        },
        RunOutcome::Failed => {
            if let Some(message) = &state.message {
                out::note_error(message);
            }
            ExitCode::FAILURE
        }
        RunOutcome::Superseded => {
            out::note_warn("Run was superseded");
            ExitCode::FAILURE
        }
    })
}

fn spawn_progress_printer(controller: &Arc<PipelineController>) -> tokio::task::JoinHandle<()> {
    let mut rx = controller.subscribe();
    tokio::spawn(async move {
        let mut stderr = std::io::stderr();
        while rx.changed().await.is_ok() {
            let line = {
                let state = rx.borrow_and_update();
                match state.phase {
                    Phase::Recognizing => out::render_progress(&state.progress, PROGRESS_WIDTH),
                    Phase::Analyzing => format!(
                        "{} analyzing ({})",
                        out::render_progress(&state.progress, PROGRESS_WIDTH),
                        state.mode
                    ),
                    _ if state.progress.phase == ProgressPhase::Error => {
                        out::render_progress(&state.progress, PROGRESS_WIDTH)
                    }
                    _ => continue,
                }
            };
            if out::write_progress_line(&mut stderr, &line).is_err() {
                break;
            }
        }
    })
}

async fn serve(cfg: &LabelScanConfig, port: Option<u16>) -> Result<()> {
    let controller = config::build_controller(cfg)?;

    if let Err(e) = controller.start().await {
        warn!(error = %e, "OCR engine unavailable; extraction stays disabled");
    }

    let app_state = Arc::new(AppState {
        controller: Arc::clone(&controller),
    });
    let app = api::build_router(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("{}:{}", cfg.server.bind(), port.unwrap_or(cfg.server.port()));
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(addr = %addr, "HTTP API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    controller.shutdown().await;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

fn show_config(cfg: &LabelScanConfig, path: &std::path::Path, only_path: bool) -> Result<()> {
    if only_path {
        println!("{}", path.display());
        return Ok(());
    }
    let masked = redact(&serde_json::to_value(cfg)?);
    print!("# {}\n{}", path.display(), serde_yaml::to_string(&masked)?);
    Ok(())
}
