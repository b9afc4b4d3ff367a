//! Voice activity detection for live capture, backed by WebRTC VAD.

use crate::error::{VoiceError, VoiceResult};
use tracing::info;
use webrtc_vad::{SampleRate, Vad, VadMode};

#[derive(Debug, Clone)]
pub struct VadConfig {
    /// 8000, 16000, 32000 or 48000 Hz
    pub sample_rate: u32,

    /// Aggressiveness 0-3, where 3 is most aggressive
    pub mode: u8,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            mode: 3,
        }
    }
}

/// Classifies 30 ms frames as speech or silence.
pub struct VadDetector {
    vad: Vad,
    config: VadConfig,
    chunk_size: usize,
}

fn build_vad(config: &VadConfig) -> VoiceResult<Vad> {
    let sample_rate = match config.sample_rate {
        8000 => SampleRate::Rate8kHz,
        16000 => SampleRate::Rate16kHz,
        32000 => SampleRate::Rate32kHz,
        48000 => SampleRate::Rate48kHz,
        other => {
            return Err(VoiceError::Config(format!(
                "WebRTC VAD only supports 8000, 16000, 32000, or 48000 Hz, got {}",
                other
            )))
        }
    };
    let mode = match config.mode {
        0 => VadMode::Quality,
        1 => VadMode::LowBitrate,
        2 => VadMode::Aggressive,
        3 => VadMode::VeryAggressive,
        other => {
            return Err(VoiceError::Config(format!(
                "VAD mode must be 0-3, got {}",
                other
            )))
        }
    };
    let mut vad = Vad::new();
    vad.set_mode(mode);
    vad.set_sample_rate(sample_rate);
    Ok(vad)
}

impl VadDetector {
    pub fn new(config: VadConfig) -> VoiceResult<Self> {
        let vad = build_vad(&config)?;
        let chunk_size = (config.sample_rate as usize * 30) / 1000;
        info!(sample_rate = config.sample_rate, mode = config.mode, chunk_size, "VAD ready");
        Ok(Self {
            vad,
            config,
            chunk_size,
        })
    }

    /// Whether `audio` (exactly `chunk_size` samples) contains speech.
    pub fn is_speech(&mut self, audio: &[f32]) -> VoiceResult<bool> {
        if audio.len() != self.chunk_size {
            return Err(VoiceError::VadProcessing(format!(
                "Expected {} samples, got {}",
                self.chunk_size,
                audio.len()
            )));
        }
        let audio_i16: Vec<i16> = audio
            .iter()
            .map(|&sample| (sample.clamp(-1.0, 1.0) * 32767.0) as i16)
            .collect();
        self.vad
            .is_voice_segment(&audio_i16)
            .map_err(|e| VoiceError::VadProcessing(format!("VAD processing failed: {:?}", e)))
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    /// WebRTC VAD has no reset; rebuild it.
    pub fn reset(&mut self) -> VoiceResult<()> {
        self.vad = build_vad(&self.config)?;
        Ok(())
    }
}
