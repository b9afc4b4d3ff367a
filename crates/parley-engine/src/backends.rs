//! Remote collaborators, built from the user's credentials.

use crate::error::{ConversationError, ConversationResult};
use parley_core::{Credentials, OpenAiReasoner, ParleyConfig, Reasoner};
use parley_ticketing::{TableClient, TicketingBackend};
use parley_voice::{OpenAiStt, OpenAiTts, SttBackend, TtsBackend};
use std::sync::Arc;
use std::time::Duration;

/// Everything a turn may call out to.
#[derive(Clone)]
pub struct Backends {
    pub stt: Arc<dyn SttBackend>,
    pub tts: Arc<dyn TtsBackend>,
    pub reasoner: Arc<dyn Reasoner>,
    pub ticketing: Arc<dyn TicketingBackend>,
}

/// Builds [`Backends`] once credentials are known.
pub trait BackendFactory: Send + Sync {
    fn build(&self, credentials: &Credentials) -> ConversationResult<Backends>;
}

/// OpenAI-compatible audio/chat endpoints plus the ticketing table API.
pub struct HttpBackendFactory {
    config: Arc<ParleyConfig>,
}

impl HttpBackendFactory {
    pub fn new(config: Arc<ParleyConfig>) -> Self {
        Self { config }
    }
}

impl BackendFactory for HttpBackendFactory {
    fn build(&self, credentials: &Credentials) -> ConversationResult<Backends> {
        let openai = &self.config.openai;
        let timeout = Duration::from_secs(openai.request_timeout_secs);

        let stt = OpenAiStt::new(
            &openai.endpoint,
            &credentials.api_key,
            &openai.transcription_model,
            timeout,
        )
        .map_err(|e| ConversationError::Backend(e.to_string()))?;
        let tts = OpenAiTts::new(
            &openai.endpoint,
            &credentials.api_key,
            &openai.speech_model,
            timeout,
        )
        .map_err(|e| ConversationError::Backend(e.to_string()))?
        .with_voice(&openai.voice)
        .with_speed(openai.speed)
        .with_format(&openai.speech_format);
        let reasoner = OpenAiReasoner::new(&credentials.api_key, openai)
            .map_err(|e| ConversationError::Backend(e.to_string()))?;

        let ticketing = &self.config.ticketing;
        let table = TableClient::new(
            ticketing.table_api_url(&credentials.instance_name),
            &credentials.instance_user,
            &credentials.instance_password,
            Duration::from_secs(ticketing.request_timeout_secs),
        )
        .map_err(|e| ConversationError::Backend(e.to_string()))?;

        Ok(Backends {
            stt: Arc::new(stt),
            tts: Arc::new(tts),
            reasoner: Arc::new(reasoner),
            ticketing: Arc::new(table),
        })
    }
}
