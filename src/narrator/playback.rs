//! Clip playback.
//!
//! An [`AudioOutput`] turns synthesized bytes into an [`AudioHandle`] that
//! is already playing. Completion is reported once through a oneshot
//! channel: `Ended` when the clip drains, `Failed` if the device gives up.
//! A released handle reports nothing.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink};
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::config::PlaybackConfig;
use crate::error::{NarrationError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    Ended,
    Failed(String),
}

/// A playing (or paused) clip. Exclusively owned by the narration session.
pub trait AudioHandle: Send {
    fn pause(&mut self);
    fn resume(&mut self);
    fn set_volume(&mut self, volume: f32);
    /// Halt playback and free the decoded clip. Safe to call more than once.
    fn release(&mut self);
}

pub trait AudioOutput: Send + Sync {
    /// Decode `audio` and start playing it at `volume`.
    fn play(
        &self,
        audio: Vec<u8>,
        volume: f32,
        done: oneshot::Sender<PlaybackEvent>,
    ) -> Result<Box<dyn AudioHandle>>;
}

pub fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        return 1.0;
    }
    volume.clamp(0.0, 1.0)
}

/// Plays clips on the default output device.
pub struct RodioOutput {
    // In rodio 0.21, OutputStream is the handle; it must outlive every sink.
    stream: OutputStream,
    poll_interval: Duration,
}

impl RodioOutput {
    pub fn new(config: &PlaybackConfig) -> Result<Self> {
        let stream = OutputStreamBuilder::open_default_stream()
            .map_err(|e| NarrationError::Playback(format!("Failed to open audio output: {e}")))?;
        info!("Audio output opened");

        Ok(Self {
            stream,
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
        })
    }
}

impl AudioOutput for RodioOutput {
    fn play(
        &self,
        audio: Vec<u8>,
        volume: f32,
        done: oneshot::Sender<PlaybackEvent>,
    ) -> Result<Box<dyn AudioHandle>> {
        let size = audio.len();
        let source = Decoder::new(Cursor::new(audio))
            .map_err(|e| NarrationError::Playback(format!("could not decode clip: {e}")))?;

        let sink = Arc::new(Sink::connect_new(self.stream.mixer()));
        sink.set_volume(clamp_volume(volume));
        sink.append(source);
        debug!("Playing clip ({size} bytes)");

        let released = Arc::new(AtomicBool::new(false));
        let handle = RodioHandle {
            sink: sink.clone(),
            released: released.clone(),
        };

        // Poll for completion or release
        let poll_interval = self.poll_interval;
        tokio::task::spawn_blocking(move || loop {
            if released.load(Ordering::Relaxed) {
                return;
            }
            if sink.empty() {
                let _ = done.send(PlaybackEvent::Ended);
                return;
            }
            std::thread::sleep(poll_interval);
        });

        Ok(Box::new(handle))
    }
}

struct RodioHandle {
    sink: Arc<Sink>,
    released: Arc<AtomicBool>,
}

impl AudioHandle for RodioHandle {
    fn pause(&mut self) {
        self.sink.pause();
    }

    fn resume(&mut self) {
        self.sink.play();
    }

    fn set_volume(&mut self, volume: f32) {
        self.sink.set_volume(clamp_volume(volume));
    }

    fn release(&mut self) {
        if !self.released.swap(true, Ordering::Relaxed) {
            self.sink.stop();
        }
    }
}

impl Drop for RodioHandle {
    fn drop(&mut self) {
        self.release();
    }
}
