//! Conversation failures and the single place they become user-visible status text.

use parley_core::{CoreError, ReasoningError};
use parley_ticketing::SagaError;
use parley_voice::VoiceError;
use serde::Serialize;
use thiserror::Error;

pub type ConversationResult<T> = Result<T, ConversationError>;

/// How a failure is treated by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing credentials or unusable settings. Not retried.
    Configuration,
    /// A remote call failed. The turn is abandoned, no automatic retry.
    Transient,
    /// A reset overtook the request. Never reported.
    Cancelled,
    /// Case filing stopped part way. Earlier records are kept.
    PartialSaga,
}

#[derive(Error, Debug)]
pub enum ConversationError {
    #[error("settings: {0}")]
    Settings(#[from] CoreError),

    #[error("backend setup failed: {0}")]
    Backend(String),

    #[error("transcription failed: {0}")]
    Transcription(#[source] VoiceError),

    #[error("speech synthesis failed: {0}")]
    Synthesis(#[source] VoiceError),

    #[error("playback failed: {0}")]
    Playback(#[source] VoiceError),

    #[error("audio capture failed: {0}")]
    Capture(#[source] VoiceError),

    #[error("recording of {size} bytes exceeds the {limit} byte limit")]
    AudioTooLarge { size: usize, limit: usize },

    #[error("reasoning failed: {0}")]
    Reasoning(#[source] ReasoningError),

    #[error("could not prepare case fields: {0}")]
    CaseDerivation(#[source] ReasoningError),

    #[error(transparent)]
    CaseFiling(#[from] SagaError),

    #[error("request cancelled")]
    Cancelled,

    #[error("conversation service has stopped")]
    ServiceClosed,
}

impl ConversationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConversationError::Settings(_) | ConversationError::Backend(_) => {
                ErrorKind::Configuration
            }
            ConversationError::CaseFiling(_) => ErrorKind::PartialSaga,
            ConversationError::Cancelled => ErrorKind::Cancelled,
            ConversationError::Transcription(_)
            | ConversationError::Synthesis(_)
            | ConversationError::Playback(_)
            | ConversationError::Capture(_)
            | ConversationError::AudioTooLarge { .. }
            | ConversationError::Reasoning(_)
            | ConversationError::CaseDerivation(_)
            | ConversationError::ServiceClosed => ErrorKind::Transient,
        }
    }

    /// Status line for the user. `None` for cancellation, which is not a failure.
    pub fn status_message(&self) -> Option<String> {
        let message = match self {
            ConversationError::Cancelled => return None,
            ConversationError::Settings(CoreError::MissingSettings(fields)) => format!(
                "Please enter all required settings (missing: {}).",
                fields.join(", ")
            ),
            ConversationError::Settings(_) | ConversationError::Backend(_) => {
                "Settings could not be used. Please check them and try again.".to_string()
            }
            ConversationError::Transcription(_) => {
                "Error occurred during transcription. Please try again.".to_string()
            }
            ConversationError::Reasoning(_) => {
                "Error occurred while generating a response. Please try again.".to_string()
            }
            ConversationError::Synthesis(_) | ConversationError::Playback(_) => {
                "Error occurred during text-to-speech. Please check the logs for details."
                    .to_string()
            }
            ConversationError::Capture(_) => {
                "Could not record audio. Please check the microphone.".to_string()
            }
            ConversationError::AudioTooLarge { limit, .. } => format!(
                "The recording is too long. Please keep it under {} MB.",
                limit / (1024 * 1024)
            ),
            ConversationError::CaseDerivation(_) | ConversationError::CaseFiling(_) => {
                "There was an error creating your case.".to_string()
            }
            ConversationError::ServiceClosed => {
                "The conversation service is not running.".to_string()
            }
        };
        Some(message)
    }
}
