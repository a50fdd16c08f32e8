//! narrate-ctl: command-line client for the paragraph-narrator control API.
//!
//! Sends one HTTP request per invocation and prints the JSON answer.

use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use reqwest::Client;
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "narrate-ctl", about = "Control a running paragraph-narrator")]
struct Args {
    /// Control API port
    #[arg(short, long, default_value_t = 8768)]
    port: u16,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Narrate text from an argument, a file, or stdin
    Say {
        /// Text to narrate (reads stdin when neither text nor --file is given)
        text: Option<String>,
        #[arg(short, long, conflicts_with = "text")]
        file: Option<PathBuf>,
        #[arg(long)]
        voice: Option<String>,
    },
    Pause,
    Resume,
    Stop,
    /// Set playback volume (0.0 - 1.0)
    Volume { volume: f32 },
    /// Show the current narration status
    Status,
}

// --- Control API request bodies ---

#[derive(Serialize)]
struct NarrateRequest {
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice_id: Option<String>,
}

#[derive(Serialize)]
struct VolumeRequest {
    volume: f32,
}

// --- Control API responses ---

#[derive(Deserialize)]
struct SimpleResponse {
    status: String,
    error: Option<String>,
}

#[derive(Deserialize)]
struct StatusResponse {
    state: String,
    current_paragraph: usize,
    total_paragraphs: usize,
    error: Option<String>,
}

fn read_text(text: Option<String>, file: Option<PathBuf>) -> Result<String, String> {
    if let Some(text) = text {
        return Ok(text);
    }
    if let Some(path) = file {
        return std::fs::read_to_string(&path)
            .map_err(|e| format!("Failed to read {}: {e}", path.display()));
    }
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .map_err(|e| format!("Failed to read stdin: {e}"))?;
    Ok(input)
}

fn describe_status(status: &StatusResponse) -> String {
    let mut line = if status.total_paragraphs == 0 {
        status.state.clone()
    } else {
        format!(
            "{} (paragraph {}/{})",
            status.state,
            status.current_paragraph + 1,
            status.total_paragraphs
        )
    };
    if let Some(error) = &status.error {
        line.push_str(&format!(" error: {error}"));
    }
    line
}

async fn post<T: Serialize>(
    client: &Client,
    url: &str,
    body: Option<&T>,
) -> Result<String, String> {
    let mut request = client.post(url);
    if let Some(body) = body {
        request = request.json(body);
    }
    let resp = request
        .send()
        .await
        .map_err(|e| format!("Control API unreachable: {e}"))?;
    let answer: SimpleResponse = resp
        .json()
        .await
        .map_err(|e| format!("Unexpected control API response: {e}"))?;
    match answer.error {
        Some(error) => Err(error),
        None => Ok(answer.status),
    }
}

async fn run(args: Args) -> Result<String, String> {
    let base = format!("http://127.0.0.1:{}", args.port);
    let client = Client::builder()
        .connect_timeout(Duration::from_millis(300))
        .timeout(Duration::from_secs(3))
        .build()
        .unwrap_or_else(|_| Client::new());

    match args.command {
        Command::Say { text, file, voice } => {
            let text = read_text(text, file)?;
            let body = NarrateRequest {
                text,
                voice_id: voice,
            };
            post(&client, &format!("{base}/narrate"), Some(&body)).await
        }
        Command::Pause => post::<()>(&client, &format!("{base}/pause"), None).await,
        Command::Resume => post::<()>(&client, &format!("{base}/resume"), None).await,
        Command::Stop => post::<()>(&client, &format!("{base}/stop"), None).await,
        Command::Volume { volume } => {
            post(&client, &format!("{base}/volume"), Some(&VolumeRequest { volume })).await
        }
        Command::Status => {
            let resp = client
                .get(format!("{base}/status"))
                .send()
                .await
                .map_err(|e| format!("Control API unreachable: {e}"))?;
            let status: StatusResponse = resp
                .json()
                .await
                .map_err(|e| format!("Unexpected control API response: {e}"))?;
            Ok(describe_status(&status))
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    match run(Args::parse()).await {
        Ok(line) => {
            println!("{line}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("narrate-ctl: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_idle() {
        let status = StatusResponse {
            state: "idle".into(),
            current_paragraph: 0,
            total_paragraphs: 0,
            error: None,
        };
        assert_eq!(describe_status(&status), "idle");
    }

    #[test]
    fn test_describe_progress_and_error() {
        let status = StatusResponse {
            state: "failed".into(),
            current_paragraph: 1,
            total_paragraphs: 3,
            error: Some("TTS request failed: 502".into()),
        };
        assert_eq!(
            describe_status(&status),
            "failed (paragraph 2/3) error: TTS request failed: 502"
        );
    }

    #[test]
    fn test_narrate_body_omits_missing_voice() {
        let body = NarrateRequest {
            text: "Om Shanti.".into(),
            voice_id: None,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"text": "Om Shanti."})
        );
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "narrate-ctl",
            "-p",
            "9000",
            "say",
            "--voice",
            "calm",
            "hello",
        ])
        .unwrap();
        assert_eq!(args.port, 9000);
        match args.command {
            Command::Say { text, voice, file } => {
                assert_eq!(text.as_deref(), Some("hello"));
                assert_eq!(voice.as_deref(), Some("calm"));
                assert!(file.is_none());
            }
            _ => panic!("expected say"),
        }
    }
}
