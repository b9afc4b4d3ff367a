//! **Text-to-Speech**: synthesize reply text into an `AudioClip`.

use crate::audio::AudioClip;
use crate::error::{VoiceError, VoiceResult};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

/// Backend that turns text into playable audio.
#[async_trait]
pub trait TtsBackend: Send + Sync {
    /// Synthesize `text`. An empty clip means there is nothing to play.
    async fn synthesize(&self, text: &str) -> VoiceResult<AudioClip>;
}

/// MIME type for an OpenAI `response_format`.
fn content_type_for(format: &str) -> &'static str {
    match format {
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "opus" => "audio/ogg",
        "aac" => "audio/aac",
        "flac" => "audio/flac",
        "pcm" => "audio/pcm",
        _ => "application/octet-stream",
    }
}

/// OpenAI-compatible speech API (`{base_url}/audio/speech`).
#[derive(Debug, Clone)]
pub struct OpenAiTts {
    /// Base URL without trailing slash (e.g. https://api.openai.com/v1).
    pub base_url: String,
    api_key: String,
    /// TTS model: tts-1 (fast) or tts-1-hd (higher quality).
    pub model: String,
    pub voice: String,
    pub speed: f32,
    /// mp3, wav, opus, aac, flac or pcm.
    pub format: String,
    client: reqwest::Client,
}

impl OpenAiTts {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> VoiceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VoiceError::Tts(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into().trim().to_string(),
            model: model.into(),
            voice: "alloy".to_string(),
            speed: 1.0,
            format: "mp3".to_string(),
            client,
        })
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }

    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }
}

#[async_trait]
impl TtsBackend for OpenAiTts {
    async fn synthesize(&self, text: &str) -> VoiceResult<AudioClip> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(AudioClip::empty());
        }
        let url = format!("{}/audio/speech", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
            "voice": self.voice,
            "response_format": self.format,
            "speed": self.speed,
        });
        debug!(chars = text.len(), voice = %self.voice, "speech request");
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| VoiceError::Tts(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            warn!(%status, "speech synthesis failed");
            return Err(VoiceError::Tts(format!("TTS API error {}: {}", status, body)));
        }
        let content_type = res
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| v.starts_with("audio/"))
            .map(str::to_string)
            .unwrap_or_else(|| content_type_for(&self.format).to_string());
        let bytes = res.bytes().await.map_err(|e| VoiceError::Tts(e.to_string()))?;
        debug!(bytes = bytes.len(), "speech synthesis done");
        Ok(AudioClip::new(bytes.to_vec(), content_type))
    }
}
