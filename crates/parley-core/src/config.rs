//! Layered runtime configuration.
//!
//! Precedence: built-in defaults < TOML file (`PARLEY_CONFIG`, default `config/parley.toml`)
//! < environment variables prefixed `PARLEY__` with `__` between path segments, e.g.
//! `PARLEY__OPENAI__CHAT_MODEL=gpt-4o`.

use crate::error::CoreResult;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_PATH: &str = "config/parley.toml";

/// How a case-filing request is recognised. Several triggers may be enabled at once;
/// any one of them firing counts as a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseTrigger {
    /// The user's utterance contains one of `case_phrases`.
    Phrase,
    /// The assistant reply starts with the open-case marker.
    Directive,
    /// A separate yes/no intent call over the transcript answers yes.
    Analyze,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParleyConfig {
    pub openai: OpenAiConfig,
    pub ticketing: TicketingConfig,
    pub conversation: ConversationConfig,
    pub storage: StorageConfig,
    pub gateway: GatewayConfig,
}

/// Speech-to-text, chat and text-to-speech endpoints (OpenAI-compatible).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    /// Base URL without trailing slash.
    pub endpoint: String,
    pub chat_model: String,
    pub transcription_model: String,
    pub speech_model: String,
    pub voice: String,
    pub speed: f32,
    /// `response_format` sent to the speech endpoint (mp3, wav, opus...).
    pub speech_format: String,
    /// Token limit for conversational replies.
    pub reply_max_tokens: u32,
    pub request_timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            chat_model: "gpt-4".to_string(),
            transcription_model: "whisper-1".to_string(),
            speech_model: "tts-1".to_string(),
            voice: "alloy".to_string(),
            speed: 1.0,
            speech_format: "mp3".to_string(),
            reply_max_tokens: 4096,
            request_timeout_secs: 60,
        }
    }
}

/// Ticketing instance layout. The base URL is derived from the instance name in the
/// user's settings unless `base_url` pins it explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TicketingConfig {
    /// `https://{instance}.{instance_domain}/api/now/table`
    pub instance_domain: String,
    pub base_url: Option<String>,
    pub identity_table: String,
    pub interaction_table: String,
    pub case_table: String,
    pub link_table: String,
    /// Surname recorded on every created identity.
    pub identity_last_name: String,
    pub request_timeout_secs: u64,
}

impl Default for TicketingConfig {
    fn default() -> Self {
        Self {
            instance_domain: "service-now.com".to_string(),
            base_url: None,
            identity_table: "sys_user".to_string(),
            interaction_table: "interaction".to_string(),
            case_table: "sn_hr_core_case".to_string(),
            link_table: "interaction_related_record".to_string(),
            identity_last_name: "Caller".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl TicketingConfig {
    /// Table API root for the given instance.
    pub fn table_api_url(&self, instance_name: &str) -> String {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!(
                "https://{}.{}/api/now/table",
                instance_name.trim(),
                self.instance_domain
            ),
        }
    }
}

/// Fixed phrases, markers and policies of the conversation itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    pub greeting: String,
    /// `{name}` is replaced with the extracted display name.
    pub acknowledgement: String,
    /// Reply prefix that ends the session.
    pub end_marker: String,
    /// Reply prefix that asks for a case to be filed.
    pub open_case_marker: String,
    pub case_phrases: Vec<String>,
    pub case_triggers: Vec<CaseTrigger>,
    pub case_interstitial: String,
    /// `{number}` is replaced with the case number (or id when the lookup fails).
    pub case_opened_message: String,
    pub case_apology: String,
    /// Utterances above this size are rejected before transcription.
    pub max_audio_bytes: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            greeting: "Hi, I'm Parley. To start off, please say your name.".to_string(),
            acknowledgement: "Nice to meet you, {name}. How can I assist you today?".to_string(),
            end_marker: "[END_CONVERSATION]".to_string(),
            open_case_marker: "[OPEN_CASE]".to_string(),
            case_phrases: vec!["open a case".to_string()],
            case_triggers: vec![CaseTrigger::Phrase, CaseTrigger::Directive],
            case_interstitial: "Sure, I'm opening a case for you now. This will only take a moment."
                .to_string(),
            case_opened_message: "Your case has been opened. Your case number is {number}."
                .to_string(),
            case_apology:
                "I'm sorry, there was an error creating your case. Please try again later."
                    .to_string(),
            max_audio_bytes: 25 * 1024 * 1024,
        }
    }
}

impl ConversationConfig {
    pub fn acknowledgement_for(&self, name: &str) -> String {
        self.acknowledgement.replace("{name}", name)
    }

    pub fn case_opened_for(&self, number: &str) -> String {
        self.case_opened_message.replace("{number}", number)
    }
}

/// Where settings and history are persisted between restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub state_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("./data/parley"),
        }
    }
}

/// HTTP gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub bind: String,
    /// Directory with a browser UI to serve at `/`.
    pub static_dir: Option<PathBuf>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
            static_dir: None,
        }
    }
}

impl ParleyConfig {
    /// Load from `PARLEY_CONFIG` (or `config/parley.toml`) and the process environment.
    pub fn load() -> CoreResult<Self> {
        let path = std::env::var("PARLEY_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Some(Path::new(&path)), environment())
    }

    /// Load from an explicit file (skipped when it does not exist) and environment source.
    pub fn load_from(path: Option<&Path>, env: config::Environment) -> CoreResult<Self> {
        let builder = config::Config::builder();
        let builder = match path {
            Some(p) if p.exists() => builder.add_source(config::File::from(p)),
            _ => builder,
        };
        let built = builder.add_source(env).build()?;
        Ok(built.try_deserialize()?)
    }
}

/// The `PARLEY__*` environment source.
pub fn environment() -> config::Environment {
    config::Environment::with_prefix("PARLEY")
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}
