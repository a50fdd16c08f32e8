//! Paragraph narrator: long text read aloud one paragraph at a time.
//!
//! Components:
//! - `paragraphs`: blank-line paragraph splitting
//! - `synthesis`: HTTP speech synthesis client with optional clip cache
//! - `playback`: rodio clip playback with pause/resume/release
//! - `session`: the narration state machine and its observable status
//! - `controller`: engine task that drives a session from commands and completions
//! - `api`: Axum HTTP control server
//! - `history`: finished-session log

pub mod api;
pub mod controller;
pub mod history;
pub mod paragraphs;
pub mod playback;
pub mod session;
pub mod synthesis;

#[cfg(test)]
pub mod testing;
