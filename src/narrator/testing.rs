//! Test doubles for the synthesis service and the audio device.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{oneshot, Semaphore};

use super::playback::{AudioHandle, AudioOutput, PlaybackEvent};
use super::synthesis::{SpeechSynthesizer, SynthesisRequest};
use crate::error::{NarrationError, Result};

/// Synthesizer that answers with the paragraph text as "audio".
pub struct ScriptedSynthesizer {
    requests: Mutex<Vec<SynthesisRequest>>,
    call_count: AtomicUsize,
    failures: HashMap<String, String>,
    /// When set, every call waits for a permit released by the test.
    gate: Option<Semaphore>,
}

impl ScriptedSynthesizer {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
            failures: HashMap::new(),
            gate: None,
        }
    }

    /// Fail with `message` (HTTP 500) whenever `text` is requested.
    pub fn fail_on(mut self, text: &str, message: &str) -> Self {
        self.failures.insert(text.to_string(), message.to_string());
        self
    }

    /// Hold every response until [`ScriptedSynthesizer::release`] is called.
    pub fn gated(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    pub fn release(&self, responses: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(responses);
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn requested_texts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.text.clone())
            .collect()
    }

    pub fn requests(&self) -> Vec<SynthesisRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechSynthesizer for ScriptedSynthesizer {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        match self.failures.get(&request.text) {
            Some(message) => Err(NarrationError::synthesis_status(500, message.clone())),
            None => Ok(request.text.as_bytes().to_vec()),
        }
    }
}

#[derive(Debug, Default)]
struct ProbeState {
    paused: bool,
    released: bool,
    volume: Option<f32>,
}

/// Shared view into a [`ProbeHandle`] after it has been moved into a session.
#[derive(Clone, Default)]
pub struct HandleProbe(Arc<Mutex<ProbeState>>);

impl HandleProbe {
    pub fn paused(&self) -> bool {
        self.0.lock().unwrap().paused
    }

    pub fn released(&self) -> bool {
        self.0.lock().unwrap().released
    }

    pub fn volume(&self) -> Option<f32> {
        self.0.lock().unwrap().volume
    }
}

pub struct ProbeHandle {
    probe: HandleProbe,
}

impl ProbeHandle {
    pub fn new(probe: HandleProbe) -> Self {
        Self { probe }
    }
}

impl AudioHandle for ProbeHandle {
    fn pause(&mut self) {
        self.probe.0.lock().unwrap().paused = true;
    }

    fn resume(&mut self) {
        self.probe.0.lock().unwrap().paused = false;
    }

    fn set_volume(&mut self, volume: f32) {
        self.probe.0.lock().unwrap().volume = Some(volume);
    }

    fn release(&mut self) {
        self.probe.0.lock().unwrap().released = true;
    }
}

struct PlayedClip {
    text: String,
    probe: HandleProbe,
    done: Option<oneshot::Sender<PlaybackEvent>>,
}

/// Audio output whose clips only end when the test says so.
#[derive(Default)]
pub struct ManualOutput {
    clips: Mutex<Vec<PlayedClip>>,
    auto_finish: bool,
    undecodable: Option<String>,
}

impl ManualOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// End every clip as soon as it starts.
    pub fn auto_finish() -> Self {
        Self {
            auto_finish: true,
            ..Self::default()
        }
    }

    /// Refuse to decode the clip synthesized from `text`.
    pub fn reject(mut self, text: &str) -> Self {
        self.undecodable = Some(text.to_string());
        self
    }

    pub fn play_count(&self) -> usize {
        self.clips.lock().unwrap().len()
    }

    pub fn played_texts(&self) -> Vec<String> {
        self.clips.lock().unwrap().iter().map(|c| c.text.clone()).collect()
    }

    pub fn probe(&self, clip: usize) -> HandleProbe {
        self.clips.lock().unwrap()[clip].probe.clone()
    }

    /// Report that clip `clip` reached its end.
    pub fn finish(&self, clip: usize) {
        self.send(clip, PlaybackEvent::Ended);
    }

    /// Report a device error for clip `clip`.
    pub fn fail(&self, clip: usize, message: &str) {
        self.send(clip, PlaybackEvent::Failed(message.to_string()));
    }

    fn send(&self, clip: usize, event: PlaybackEvent) {
        if let Some(done) = self.clips.lock().unwrap()[clip].done.take() {
            let _ = done.send(event);
        }
    }
}

impl AudioOutput for ManualOutput {
    fn play(
        &self,
        audio: Vec<u8>,
        volume: f32,
        done: oneshot::Sender<PlaybackEvent>,
    ) -> Result<Box<dyn AudioHandle>> {
        let text = String::from_utf8_lossy(&audio).to_string();
        if self.undecodable.as_deref() == Some(text.as_str()) {
            return Err(NarrationError::Playback("could not decode clip".into()));
        }

        let probe = HandleProbe::default();
        probe.0.lock().unwrap().volume = Some(volume);

        let done = if self.auto_finish {
            let _ = done.send(PlaybackEvent::Ended);
            None
        } else {
            Some(done)
        };

        self.clips.lock().unwrap().push(PlayedClip {
            text,
            probe: probe.clone(),
            done,
        });
        Ok(Box::new(ProbeHandle::new(probe)))
    }
}
