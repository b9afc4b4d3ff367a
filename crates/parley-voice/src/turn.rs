//! Turn-taking for live capture
//!
//! Detects when the user has finished speaking from per-chunk VAD results: a turn is
//! committed after `silence_threshold` of silence following at least
//! `min_speech_duration` of speech.

use crate::error::{VoiceError, VoiceResult};
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Events emitted by the turn manager
#[derive(Debug, Clone)]
pub enum TurnEvent {
    /// User started speaking
    SpeechStarted { timestamp: DateTime<Utc> },

    /// User stopped speaking and the turn is ready for transcription
    TurnCommitted {
        timestamp: DateTime<Utc>,
        total_speech_duration: Duration,
        audio_samples: Vec<f32>,
    },
}

/// Configuration for turn detection
#[derive(Debug, Clone)]
pub struct TurnConfig {
    /// Silence duration before committing a turn (default: 800ms)
    pub silence_threshold: Duration,

    /// Minimum speech duration to be considered a valid turn (default: 200ms)
    pub min_speech_duration: Duration,

    /// Maximum turn duration before auto-commit (default: 30s)
    pub max_turn_duration: Duration,

    /// Sample rate for audio (default: 16000 Hz)
    pub sample_rate: u32,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            silence_threshold: Duration::from_millis(800),
            min_speech_duration: Duration::from_millis(200),
            max_turn_duration: Duration::from_secs(30),
            sample_rate: 16000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum TurnState {
    Idle,
    Speaking,
    SilenceDetected,
}

/// Manages turn boundaries based on VAD signals
pub struct TurnManager {
    config: TurnConfig,
    state: TurnState,

    speech_start: Option<Instant>,
    last_speech_time: Option<Instant>,

    audio_buffer: Vec<f32>,

    event_tx: mpsc::UnboundedSender<TurnEvent>,
}

impl TurnManager {
    pub fn new(config: TurnConfig) -> (Self, mpsc::UnboundedReceiver<TurnEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let manager = Self {
            config,
            state: TurnState::Idle,
            speech_start: None,
            last_speech_time: None,
            audio_buffer: Vec::new(),
            event_tx,
        };

        (manager, event_rx)
    }

    pub fn config(&self) -> &TurnConfig {
        &self.config
    }

    /// Process a VAD detection result for a chunk captured now
    pub fn process_vad_result(&mut self, is_speech: bool, audio_chunk: &[f32]) -> VoiceResult<()> {
        self.process_at(is_speech, audio_chunk, Instant::now())
    }

    /// Process a VAD detection result for a chunk captured at `now`
    pub fn process_at(
        &mut self,
        is_speech: bool,
        audio_chunk: &[f32],
        now: Instant,
    ) -> VoiceResult<()> {
        match (self.state, is_speech) {
            (TurnState::Idle, true) => {
                debug!("speech started");
                self.state = TurnState::Speaking;
                self.speech_start = Some(now);
                self.last_speech_time = Some(now);
                self.audio_buffer.clear();
                self.audio_buffer.extend_from_slice(audio_chunk);

                self.emit_event(TurnEvent::SpeechStarted {
                    timestamp: Utc::now(),
                })?;
            }

            (TurnState::Speaking, true) => {
                self.last_speech_time = Some(now);
                self.audio_buffer.extend_from_slice(audio_chunk);

                if let Some(start) = self.speech_start {
                    if now.duration_since(start) >= self.config.max_turn_duration {
                        warn!("max turn duration reached, auto-committing");
                        return self.commit_turn(now);
                    }
                }
            }

            (TurnState::Speaking, false) => {
                self.state = TurnState::SilenceDetected;
                // trailing silence stays in the clip
                self.audio_buffer.extend_from_slice(audio_chunk);
            }

            (TurnState::SilenceDetected, true) => {
                self.state = TurnState::Speaking;
                self.last_speech_time = Some(now);
                self.audio_buffer.extend_from_slice(audio_chunk);
            }

            (TurnState::SilenceDetected, false) => {
                self.audio_buffer.extend_from_slice(audio_chunk);
                if let Some(last_speech) = self.last_speech_time {
                    if now.duration_since(last_speech) >= self.config.silence_threshold {
                        return self.commit_turn(now);
                    }
                }
            }

            (TurnState::Idle, false) => {}
        }

        Ok(())
    }

    fn commit_turn(&mut self, now: Instant) -> VoiceResult<()> {
        if self.state == TurnState::Idle {
            return Ok(());
        }

        let duration = self
            .speech_start
            .map(|start| now.duration_since(start))
            .unwrap_or_default();

        if duration < self.config.min_speech_duration {
            debug!(?duration, "speech too short, ignoring");
            self.reset();
            return Ok(());
        }

        info!(?duration, samples = self.audio_buffer.len(), "turn committed");

        let audio_samples = std::mem::take(&mut self.audio_buffer);
        self.emit_event(TurnEvent::TurnCommitted {
            timestamp: Utc::now(),
            total_speech_duration: duration,
            audio_samples,
        })?;

        self.reset();
        Ok(())
    }

    /// Hand back whatever has been buffered so far (manual stop) and go idle.
    pub fn take_buffer(&mut self) -> Vec<f32> {
        let samples = std::mem::take(&mut self.audio_buffer);
        self.reset();
        samples
    }

    fn reset(&mut self) {
        self.state = TurnState::Idle;
        self.speech_start = None;
        self.last_speech_time = None;
        self.audio_buffer.clear();
    }

    fn emit_event(&self, event: TurnEvent) -> VoiceResult<()> {
        self.event_tx
            .send(event)
            .map_err(|e| VoiceError::ChannelSend(e.to_string()))
    }

    /// Current state name (for logging)
    pub fn state(&self) -> &str {
        match self.state {
            TurnState::Idle => "idle",
            TurnState::Speaking => "speaking",
            TurnState::SilenceDetected => "silence_detected",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TurnConfig {
        TurnConfig {
            silence_threshold: Duration::from_millis(100),
            min_speech_duration: Duration::from_millis(50),
            ..Default::default()
        }
    }

    #[test]
    fn commits_after_silence_threshold() {
        let (mut manager, mut rx) = TurnManager::new(config());
        let chunk = vec![0.5f32; 480];
        let t0 = Instant::now();

        manager.process_at(true, &chunk, t0).unwrap();
        assert!(matches!(rx.try_recv().unwrap(), TurnEvent::SpeechStarted { .. }));
        manager
            .process_at(true, &chunk, t0 + Duration::from_millis(60))
            .unwrap();
        manager
            .process_at(false, &chunk, t0 + Duration::from_millis(90))
            .unwrap();
        assert_eq!(manager.state(), "silence_detected");
        manager
            .process_at(false, &chunk, t0 + Duration::from_millis(120))
            .unwrap();
        assert!(rx.try_recv().is_err());

        manager
            .process_at(false, &chunk, t0 + Duration::from_millis(170))
            .unwrap();
        match rx.try_recv().unwrap() {
            TurnEvent::TurnCommitted { audio_samples, .. } => {
                assert_eq!(audio_samples.len(), 480 * 5)
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(manager.state(), "idle");
    }

    #[test]
    fn blips_shorter_than_minimum_are_dropped() {
        let (mut manager, mut rx) = TurnManager::new(TurnConfig {
            min_speech_duration: Duration::from_millis(500),
            ..config()
        });
        let chunk = vec![0.5f32; 480];
        let t0 = Instant::now();
        manager.process_at(true, &chunk, t0).unwrap();
        manager
            .process_at(false, &chunk, t0 + Duration::from_millis(30))
            .unwrap();
        manager
            .process_at(false, &chunk, t0 + Duration::from_millis(200))
            .unwrap();

        assert!(matches!(rx.try_recv().unwrap(), TurnEvent::SpeechStarted { .. }));
        assert!(rx.try_recv().is_err());
        assert_eq!(manager.state(), "idle");
    }

    #[test]
    fn take_buffer_returns_partial_turn() {
        let (mut manager, _rx) = TurnManager::new(config());
        manager.process_vad_result(true, &[0.1; 10]).unwrap();
        assert_eq!(manager.take_buffer().len(), 10);
        assert_eq!(manager.state(), "idle");
    }
}
