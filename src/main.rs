//! paragraph-narrator: reads long text aloud, one paragraph at a time.

mod config;
mod error;
mod narrator;

use clap::Parser;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use narrator::controller::{EngineSettings, NarrationController};
use narrator::history::NarrationHistory;
use narrator::playback::RodioOutput;
use narrator::session::{NarrationOptions, NarrationState};

#[derive(Parser, Debug)]
#[command(name = "paragraph-narrator", about = "Paragraph-by-paragraph text narration")]
struct Args {
    /// Path to config.yaml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Narrate this file once and exit ("-" reads stdin)
    #[arg(short, long, conflicts_with = "text")]
    file: Option<PathBuf>,

    /// Narrate this text once and exit
    #[arg(short, long)]
    text: Option<String>,

    /// Voice identifier passed to the synthesis service
    #[arg(long)]
    voice: Option<String>,

    /// Print the session report for a date (YYYY-MM-DD or "today") and exit
    #[arg(long, value_name = "DATE")]
    report: Option<String>,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,
}

fn read_input(args: &Args) -> std::io::Result<Option<String>> {
    if let Some(text) = &args.text {
        return Ok(Some(text.clone()));
    }
    match &args.file {
        Some(path) if path.as_os_str() == "-" => {
            let mut input = String::new();
            std::io::stdin().read_to_string(&mut input)?;
            Ok(Some(input))
        }
        Some(path) => std::fs::read_to_string(path).map(Some),
        None => Ok(None),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging (suppress noisy http/decoder internals)
    let filter = if args.verbose {
        EnvFilter::new("debug,hyper=info,reqwest=info,symphonia=warn")
    } else {
        EnvFilter::new("info,hyper=warn,reqwest=warn,symphonia=warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("paragraph-narrator starting");

    let config = config::Config::load(args.config.as_deref());

    if let Some(date) = &args.report {
        let date = if date == "today" {
            chrono::Local::now().format("%Y-%m-%d").to_string()
        } else {
            date.clone()
        };
        let history = NarrationHistory::new(config.history_dir());
        println!("{}", narrator::history::generate_report(&history, &date));
        return Ok(());
    }

    let input = read_input(&args)?;

    let synthesizer = narrator::synthesis::create_synthesizer(&config.synthesis)?;
    let output = Arc::new(RodioOutput::new(&config.playback)?);

    let history = if config.history.enabled {
        let dir = config.history_dir();
        info!("Recording narration history in {}", dir.display());
        Some(NarrationHistory::new(dir))
    } else {
        None
    };

    let controller = NarrationController::spawn(
        synthesizer,
        output,
        EngineSettings {
            default_voice: config.synthesis.voice_id.clone(),
            volume: config.playback.volume,
            history,
        },
    );

    match input {
        Some(text) => narrate_once(&controller, &text, args.voice).await,
        None => serve(&controller, &config).await,
    }
}

/// Narrate one text to the end, or until Ctrl-C.
async fn narrate_once(
    controller: &NarrationController,
    text: &str,
    voice: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut options = NarrationOptions::new()
        .with_progress(|index, total| info!("Paragraph {}/{}", index + 1, total));
    if let Some(voice) = voice {
        options = options.with_voice(voice);
    }
    let session = controller.start_narration(text, options)?;

    let status = tokio::select! {
        status = controller.wait_for_session(session) => status?,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, stopping narration");
            controller.stop_narration()?;
            controller.wait_for_session(session).await?
        }
    };

    match status.state {
        NarrationState::Failed => {
            let message = status.error.unwrap_or_else(|| "narration failed".into());
            Err(message.into())
        }
        state => {
            info!("Narration finished: {state}");
            Ok(())
        }
    }
}

/// Run the control API until Ctrl-C.
async fn serve(
    controller: &NarrationController,
    config: &config::Config,
) -> Result<(), Box<dyn std::error::Error>> {
    if !config.api.enabled {
        warn!("Nothing to narrate and the control API is disabled (api.enabled: false)");
        return Ok(());
    }

    let Some(server) = narrator::api::start_api(controller.clone(), config.api.port).await else {
        return Err(format!("could not bind control API on port {}", config.api.port).into());
    };

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    controller.stop_narration()?;
    server.abort();
    Ok(())
}
