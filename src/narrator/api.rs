//! HTTP control API for the narrator.
//!
//! Runs on 127.0.0.1 (port 8768 by default) using axum. Used by
//! `narrate-ctl` and anything else that wants to drive narration locally.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::controller::NarrationController;
use super::session::{NarrationOptions, NarrationStatus};
use crate::error::Result;

// --- Request/Response types ---

#[derive(Deserialize)]
struct NarrateRequest {
    text: String,
    #[serde(default)]
    voice_id: Option<String>,
}

#[derive(Deserialize)]
struct VolumeRequest {
    volume: f32,
}

#[derive(Debug, Serialize)]
struct SimpleResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    paragraphs: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl SimpleResponse {
    fn ok(status: &str) -> Self {
        Self {
            status: status.into(),
            paragraphs: None,
            error: None,
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            status: "error".into(),
            paragraphs: None,
            error: Some(message.into()),
        }
    }

    fn from_result(status: &str, result: Result<()>) -> Self {
        match result {
            Ok(()) => Self::ok(status),
            Err(e) => Self::err(e.to_string()),
        }
    }
}

/// Build the axum router.
pub fn router(controller: NarrationController) -> Router {
    Router::new()
        .route("/status", get(handle_status))
        .route("/narrate", post(handle_narrate))
        .route("/pause", post(handle_pause))
        .route("/resume", post(handle_resume))
        .route("/stop", post(handle_stop))
        .route("/volume", post(handle_volume))
        .with_state(controller)
}

/// Start the control API as a background tokio task.
pub async fn start_api(controller: NarrationController, port: u16) -> Option<JoinHandle<()>> {
    let app = router(controller);
    let addr = format!("127.0.0.1:{port}");
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            warn!("Failed to bind narration API on {addr}: {e}");
            return None;
        }
    };
    info!("Narration API listening on {addr}");

    Some(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            warn!("Narration API server error: {e}");
        }
    }))
}

// --- Handlers ---

async fn handle_status(State(controller): State<NarrationController>) -> Json<NarrationStatus> {
    Json(controller.status())
}

async fn handle_narrate(
    State(controller): State<NarrationController>,
    Json(req): Json<NarrateRequest>,
) -> Json<SimpleResponse> {
    let paragraphs = super::paragraphs::split_paragraphs(&req.text).len();
    if paragraphs == 0 {
        return Json(SimpleResponse::err("empty text"));
    }

    let preview: String = req.text.chars().take(80).collect();
    info!(
        "HTTP /narrate: \"{}{}\" ({} chars, {paragraphs} paragraphs)",
        preview.replace('\n', " "),
        if req.text.chars().count() > 80 { "..." } else { "" },
        req.text.len(),
    );

    let mut options = NarrationOptions::new();
    options.voice_id = req.voice_id;

    match controller.start_narration(&req.text, options) {
        Ok(_session) => Json(SimpleResponse {
            paragraphs: Some(paragraphs),
            ..SimpleResponse::ok("narrating")
        }),
        Err(e) => Json(SimpleResponse::err(e.to_string())),
    }
}

async fn handle_pause(State(controller): State<NarrationController>) -> Json<SimpleResponse> {
    Json(SimpleResponse::from_result("paused", controller.pause_narration()))
}

async fn handle_resume(State(controller): State<NarrationController>) -> Json<SimpleResponse> {
    Json(SimpleResponse::from_result("resumed", controller.resume_narration()))
}

async fn handle_stop(State(controller): State<NarrationController>) -> Json<SimpleResponse> {
    Json(SimpleResponse::from_result("stopped", controller.stop_narration()))
}

async fn handle_volume(
    State(controller): State<NarrationController>,
    Json(req): Json<VolumeRequest>,
) -> Json<SimpleResponse> {
    Json(SimpleResponse::from_result("ok", controller.set_volume(req.volume)))
}
