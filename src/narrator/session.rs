//! Narration session state.
//!
//! Idle → Loading(i) → Playing(i) ⇄ Paused(i)
//! Playing(i) → Loading(i+1) on clip end, → Done after the last paragraph.
//! Loading/Playing → Failed on error; anything → Stopped on stop.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::paragraphs::{is_blank, split_paragraphs};
use super::playback::AudioHandle;
use super::synthesis::SynthesisRequest;
use crate::error::NarrationError;

/// Called with `(paragraph index, total paragraphs)` when a paragraph starts playing.
pub type ProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

#[derive(Clone, Default)]
pub struct NarrationOptions {
    pub voice_id: Option<String>,
    pub on_progress: Option<ProgressCallback>,
}

impl NarrationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_voice(mut self, voice_id: impl Into<String>) -> Self {
        self.voice_id = Some(voice_id.into());
        self
    }

    pub fn with_progress(
        mut self,
        callback: impl Fn(usize, usize) + Send + Sync + 'static,
    ) -> Self {
        self.on_progress = Some(Arc::new(callback));
        self
    }
}

impl fmt::Debug for NarrationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NarrationOptions")
            .field("voice_id", &self.voice_id)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrationState {
    Idle,
    Loading,
    Playing,
    Paused,
    Stopped,
    Done,
    Failed,
}

impl NarrationState {
    /// Whether the session has ended and needs a new start to do anything.
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Stopped | Self::Done | Self::Failed)
    }
}

impl fmt::Display for NarrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Loading => write!(f, "LOADING"),
            Self::Playing => write!(f, "PLAYING"),
            Self::Paused => write!(f, "PAUSED"),
            Self::Stopped => write!(f, "STOPPED"),
            Self::Done => write!(f, "DONE"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// Observable narration state.
///
/// `is_loading`, `is_playing` and `is_paused` mirror `state` and are never
/// true together: a paused clip reports `is_playing: false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrationStatus {
    /// Number of sessions started so far; the status belongs to this one.
    pub session: u64,
    pub state: NarrationState,
    pub is_loading: bool,
    pub is_playing: bool,
    pub is_paused: bool,
    pub current_paragraph: usize,
    pub total_paragraphs: usize,
    pub error: Option<String>,
}

impl Default for NarrationStatus {
    fn default() -> Self {
        NarrationSession::new().status()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    Done,
    Stopped,
    Failed,
}

/// What a finished session did, for the history log.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub outcome: SessionOutcome,
    pub paragraphs_played: usize,
    pub total_paragraphs: usize,
    pub text_chars: usize,
    pub voice_id: Option<String>,
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

/// Next thing the engine has to do after a transition.
#[derive(Debug, PartialEq)]
pub enum Step {
    Request {
        generation: u64,
        index: usize,
        request: SynthesisRequest,
    },
    Finished(SessionSummary),
    Nothing,
}

pub struct NarrationSession {
    paragraphs: Vec<String>,
    index: usize,
    total: usize,
    state: NarrationState,
    stopped: bool,
    error: Option<String>,
    /// Bumped on every start and stop; continuations from older generations are stale.
    generation: u64,
    sessions: u64,
    voice_id: Option<String>,
    on_progress: Option<ProgressCallback>,
    audio: Option<Box<dyn AudioHandle>>,
    started_at: Option<Instant>,
    text_chars: usize,
    played: usize,
}

impl Default for NarrationSession {
    fn default() -> Self {
        Self::new()
    }
}

impl NarrationSession {
    pub fn new() -> Self {
        Self {
            paragraphs: Vec::new(),
            index: 0,
            total: 0,
            state: NarrationState::Idle,
            stopped: false,
            error: None,
            generation: 0,
            sessions: 0,
            voice_id: None,
            on_progress: None,
            audio: None,
            started_at: None,
            text_chars: 0,
            played: 0,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn status(&self) -> NarrationStatus {
        NarrationStatus {
            session: self.sessions,
            state: self.state,
            is_loading: self.state == NarrationState::Loading,
            is_playing: self.state == NarrationState::Playing,
            is_paused: self.state == NarrationState::Paused,
            current_paragraph: self.index,
            total_paragraphs: self.total,
            error: self.error.clone(),
        }
    }

    /// Begin a new session, abandoning whatever was running.
    ///
    /// Returns the previous session's summary (if one was still running)
    /// and the first step of the new one.
    pub fn start(
        &mut self,
        text: &str,
        options: NarrationOptions,
    ) -> (Option<SessionSummary>, Step) {
        let superseded = if self.is_active() {
            info!("New narration supersedes the running one");
            Some(self.summary(SessionOutcome::Stopped))
        } else {
            None
        };
        self.release_audio();

        self.generation += 1;
        self.sessions += 1;
        self.paragraphs = split_paragraphs(text);
        self.total = self.paragraphs.len();
        self.index = 0;
        self.stopped = false;
        self.error = None;
        self.voice_id = options.voice_id;
        self.on_progress = options.on_progress;
        self.started_at = Some(Instant::now());
        self.text_chars = self.paragraphs.iter().map(|p| p.chars().count()).sum();
        self.played = 0;

        info!(
            "Narration started: {} paragraphs, {} chars (voice: {})",
            self.total,
            self.text_chars,
            self.voice_id.as_deref().unwrap_or("default")
        );
        (superseded, self.advance_to(0))
    }

    /// Move to paragraph `index`, skipping blank ones without a request.
    fn advance_to(&mut self, mut index: usize) -> Step {
        while index < self.paragraphs.len() && is_blank(&self.paragraphs[index]) {
            debug!("Skipping blank paragraph {}/{}", index + 1, self.total);
            index += 1;
        }

        if index >= self.paragraphs.len() {
            return self.finish_done();
        }

        self.index = index;
        self.state = NarrationState::Loading;
        debug!("State: → LOADING paragraph {}/{}", index + 1, self.total);
        Step::Request {
            generation: self.generation,
            index,
            request: SynthesisRequest::new(self.paragraphs[index].clone(), self.voice_id.clone()),
        }
    }

    /// Whether a synthesis result for (`generation`, `index`) is still wanted.
    pub fn awaits_clip(&self, generation: u64, index: usize) -> bool {
        !self.stopped
            && generation == self.generation
            && index == self.index
            && self.state == NarrationState::Loading
    }

    /// Whether a playback event for (`generation`, `index`) belongs to the current clip.
    pub fn owns_clip(&self, generation: u64, index: usize) -> bool {
        !self.stopped
            && generation == self.generation
            && index == self.index
            && matches!(self.state, NarrationState::Playing | NarrationState::Paused)
    }

    /// Release the previous clip so a new one can be created.
    pub fn release_audio(&mut self) {
        if let Some(mut audio) = self.audio.take() {
            audio.release();
        }
    }

    /// Install the clip for the current paragraph. It is already playing.
    pub fn begin_playback(&mut self, audio: Box<dyn AudioHandle>) {
        self.release_audio();
        self.audio = Some(audio);
        self.state = NarrationState::Playing;
        self.played += 1;
        info!("Playing paragraph {}/{}", self.index + 1, self.total);

        if let Some(on_progress) = &self.on_progress {
            on_progress(self.index, self.total);
        }
    }

    /// The current clip finished; move on to the next paragraph.
    pub fn clip_ended(&mut self) -> Step {
        self.release_audio();
        if self.stopped {
            return Step::Nothing;
        }
        self.advance_to(self.index + 1)
    }

    pub fn pause(&mut self) -> bool {
        if self.state != NarrationState::Playing {
            debug!("Pause ignored in state {}", self.state);
            return false;
        }
        let Some(audio) = self.audio.as_mut() else {
            return false;
        };
        audio.pause();
        self.state = NarrationState::Paused;
        info!("Paused at paragraph {}/{}", self.index + 1, self.total);
        true
    }

    pub fn resume(&mut self) -> bool {
        if self.state != NarrationState::Paused {
            debug!("Resume ignored in state {}", self.state);
            return false;
        }
        let Some(audio) = self.audio.as_mut() else {
            return false;
        };
        audio.resume();
        self.state = NarrationState::Playing;
        info!("Resumed at paragraph {}/{}", self.index + 1, self.total);
        true
    }

    pub fn set_volume(&mut self, volume: f32) {
        if let Some(audio) = self.audio.as_mut() {
            audio.set_volume(volume);
        }
    }

    /// Stop from any state and reset to a clean slate. The last error stays visible.
    pub fn stop(&mut self) -> Option<SessionSummary> {
        let summary = self.is_active().then(|| self.summary(SessionOutcome::Stopped));

        self.stopped = true;
        self.generation += 1;
        self.release_audio();
        self.paragraphs.clear();
        self.index = 0;
        self.total = 0;
        self.state = NarrationState::Stopped;
        self.on_progress = None;
        self.started_at = None;

        if summary.is_some() {
            info!("Narration stopped");
        }
        summary
    }

    /// Halt the session on a synthesis or playback error.
    pub fn fail(&mut self, error: NarrationError) -> SessionSummary {
        warn!(
            "Narration failed at paragraph {}/{}: {error}",
            self.index + 1,
            self.total
        );
        self.release_audio();
        self.error = Some(error.to_string());
        self.state = NarrationState::Failed;
        self.paragraphs.clear();
        self.on_progress = None;
        let summary = self.summary(SessionOutcome::Failed);
        self.started_at = None;
        summary
    }

    fn finish_done(&mut self) -> Step {
        self.release_audio();
        self.state = NarrationState::Done;
        self.paragraphs.clear();
        self.on_progress = None;
        info!("Narration complete ({} paragraphs)", self.total);
        let summary = self.summary(SessionOutcome::Done);
        self.started_at = None;
        Step::Finished(summary)
    }

    fn is_active(&self) -> bool {
        matches!(
            self.state,
            NarrationState::Loading | NarrationState::Playing | NarrationState::Paused
        )
    }

    fn summary(&self, outcome: SessionOutcome) -> SessionSummary {
        SessionSummary {
            outcome,
            paragraphs_played: self.played,
            total_paragraphs: self.total,
            text_chars: self.text_chars,
            voice_id: self.voice_id.clone(),
            error: self.error.clone(),
            elapsed_ms: self
                .started_at
                .map(|t| u64::try_from(t.elapsed().as_millis()).unwrap_or(u64::MAX))
                .unwrap_or(0),
        }
    }
}

#[cfg(test)]
impl NarrationSession {
    pub fn state(&self) -> NarrationState {
        self.state
    }

    pub fn paragraphs(&self) -> &[String] {
        &self.paragraphs
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }
}
