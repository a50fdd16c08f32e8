//! Narration controller.
//!
//! One engine task owns the [`NarrationSession`] and handles, in order,
//! caller commands, synthesis completions and playback completions. Every
//! completion is tagged with the session generation it was issued under and
//! is dropped if the session has moved on since.

use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info};

use super::history::{NarrationHistory, NarrationRecord};
use super::playback::{clamp_volume, AudioOutput, PlaybackEvent};
use super::session::{NarrationOptions, NarrationSession, NarrationStatus, SessionSummary, Step};
use super::synthesis::{SpeechSynthesizer, SynthesisRequest};
use crate::error::{NarrationError, Result};

#[derive(Debug)]
enum Command {
    Start {
        text: String,
        options: NarrationOptions,
    },
    Pause,
    Resume,
    Stop,
    SetVolume(f32),
}

#[derive(Debug)]
enum Completion {
    Synthesized {
        generation: u64,
        index: usize,
        result: Result<Vec<u8>>,
    },
    Playback {
        generation: u64,
        index: usize,
        event: PlaybackEvent,
    },
}

/// Engine settings that are not per-session.
pub struct EngineSettings {
    pub default_voice: Option<String>,
    pub volume: f32,
    pub history: Option<NarrationHistory>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_voice: None,
            volume: 1.0,
            history: None,
        }
    }
}

/// Cloneable handle to a running narration engine.
#[derive(Clone)]
pub struct NarrationController {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<NarrationStatus>,
    /// Sessions started through any handle. Held while a start is sent so
    /// the engine sees starts in numbering order.
    started: Arc<Mutex<u64>>,
}

impl NarrationController {
    /// Spawn the engine on the current tokio runtime.
    ///
    /// The engine exits once every controller handle has been dropped.
    pub fn spawn(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        output: Arc<dyn AudioOutput>,
        settings: EngineSettings,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(NarrationStatus::default());

        let engine = NarrationEngine {
            session: NarrationSession::new(),
            synthesizer,
            output,
            default_voice: settings.default_voice,
            volume: clamp_volume(settings.volume),
            history: settings.history,
            completions: completion_tx,
            status: status_tx,
        };
        tokio::spawn(engine.run(command_rx, completion_rx));

        Self {
            commands: command_tx,
            status: status_rx,
            started: Arc::new(Mutex::new(0)),
        }
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| NarrationError::EngineClosed)
    }

    /// Narrate `text` paragraph by paragraph, replacing any running narration.
    ///
    /// Returns the session number that [`NarrationStatus::session`] will carry
    /// once the engine has picked the start up.
    pub fn start_narration(&self, text: &str, options: NarrationOptions) -> Result<u64> {
        let mut started = self.started.lock().unwrap();
        self.send(Command::Start {
            text: text.to_string(),
            options,
        })?;
        *started += 1;
        Ok(*started)
    }

    pub fn pause_narration(&self) -> Result<()> {
        self.send(Command::Pause)
    }

    pub fn resume_narration(&self) -> Result<()> {
        self.send(Command::Resume)
    }

    pub fn stop_narration(&self) -> Result<()> {
        self.send(Command::Stop)
    }

    pub fn set_volume(&self, volume: f32) -> Result<()> {
        self.send(Command::SetVolume(volume))
    }

    pub fn status(&self) -> NarrationStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<NarrationStatus> {
        self.status.clone()
    }

    /// Wait until the most recently started session has finished (done,
    /// stopped or failed).
    pub async fn wait_until_finished(&self) -> Result<NarrationStatus> {
        let latest = *self.started.lock().unwrap();
        self.wait_for_session(latest).await
    }

    /// Wait until `session`, or a later one that replaced it, has finished.
    pub async fn wait_for_session(&self, session: u64) -> Result<NarrationStatus> {
        let mut status = self.subscribe();
        let finished = status
            .wait_for(|s| s.session >= session && s.state.is_finished())
            .await
            .map_err(|_| NarrationError::EngineClosed)?
            .clone();
        Ok(finished)
    }
}

struct NarrationEngine {
    session: NarrationSession,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    output: Arc<dyn AudioOutput>,
    default_voice: Option<String>,
    volume: f32,
    history: Option<NarrationHistory>,
    completions: mpsc::UnboundedSender<Completion>,
    status: watch::Sender<NarrationStatus>,
}

impl NarrationEngine {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
    ) {
        debug!("Narration engine running");

        loop {
            tokio::select! {
                // Commands first, so a stop is seen before completions queued behind it
                biased;
                command = commands.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => break,
                },
                Some(completion) = completions.recv() => self.on_completion(completion),
            }
            self.publish();
        }

        if let Some(summary) = self.session.stop() {
            self.record(summary);
        }
        self.publish();
        debug!("Narration engine exited");
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Start { text, mut options } => {
                if options.voice_id.is_none() {
                    options.voice_id = self.default_voice.clone();
                }
                let (superseded, step) = self.session.start(&text, options);
                if let Some(summary) = superseded {
                    self.record(summary);
                }
                self.execute(step);
            }
            Command::Pause => {
                self.session.pause();
            }
            Command::Resume => {
                self.session.resume();
            }
            Command::Stop => {
                if let Some(summary) = self.session.stop() {
                    self.record(summary);
                }
            }
            Command::SetVolume(volume) => {
                self.volume = clamp_volume(volume);
                self.session.set_volume(self.volume);
                info!("Volume set to {:.2}", self.volume);
            }
        }
    }

    fn on_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Synthesized {
                generation,
                index,
                result,
            } => {
                if !self.session.awaits_clip(generation, index) {
                    debug!(
                        "Dropping stale synthesis result for paragraph {} (generation {generation}, current {})",
                        index + 1,
                        self.session.generation()
                    );
                    return;
                }
                match result {
                    Ok(audio) => self.start_clip(generation, index, audio),
                    Err(e) => {
                        let summary = self.session.fail(e);
                        self.record(summary);
                    }
                }
            }
            Completion::Playback {
                generation,
                index,
                event,
            } => {
                if !self.session.owns_clip(generation, index) {
                    debug!(
                        "Dropping stale playback event for paragraph {} (generation {generation}, current {})",
                        index + 1,
                        self.session.generation()
                    );
                    return;
                }
                match event {
                    PlaybackEvent::Ended => {
                        let step = self.session.clip_ended();
                        self.execute(step);
                    }
                    PlaybackEvent::Failed(message) => {
                        let summary = self.session.fail(NarrationError::Playback(message));
                        self.record(summary);
                    }
                }
            }
        }
    }

    fn execute(&mut self, step: Step) {
        match step {
            Step::Request {
                generation,
                index,
                request,
            } => self.request_clip(generation, index, request),
            Step::Finished(summary) => self.record(summary),
            Step::Nothing => {}
        }
    }

    /// Issue the synthesis request for one paragraph. Never aborted: a stale
    /// result is dropped when it comes back.
    fn request_clip(&self, generation: u64, index: usize, request: SynthesisRequest) {
        let synthesizer = self.synthesizer.clone();
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let result = synthesizer.synthesize(&request).await;
            let _ = completions.send(Completion::Synthesized {
                generation,
                index,
                result,
            });
        });
    }

    fn start_clip(&mut self, generation: u64, index: usize, audio: Vec<u8>) {
        // Free the previous clip before decoding the next one
        self.session.release_audio();

        let (done_tx, done_rx) = oneshot::channel();
        match self.output.play(audio, self.volume, done_tx) {
            Ok(handle) => {
                self.session.begin_playback(handle);
                let completions = self.completions.clone();
                tokio::spawn(async move {
                    // Released clips drop their sender too; the engine discards those as stale
                    let event = done_rx.await.unwrap_or_else(|_| {
                        PlaybackEvent::Failed("audio output stopped unexpectedly".into())
                    });
                    let _ = completions.send(Completion::Playback {
                        generation,
                        index,
                        event,
                    });
                });
            }
            Err(e) => {
                let summary = self.session.fail(e);
                self.record(summary);
            }
        }
    }

    fn record(&self, summary: SessionSummary) {
        if let Some(history) = &self.history {
            history.save(&NarrationRecord::from_summary(summary));
        }
    }

    fn publish(&self) {
        let status = self.session.status();
        self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }
}
