//! Reasoning Client: conversational replies and short derivations over an
//! OpenAI-compatible chat completions endpoint.

use crate::config::{ConversationConfig, OpenAiConfig};
use crate::conversation::{ConversationTurn, Speaker};
use crate::prompts;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

pub type ReasoningResult<T> = Result<T, ReasoningError>;

#[derive(Error, Debug)]
pub enum ReasoningError {
    #[error("Reasoning request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Reasoning service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Reasoning service returned no choices")]
    EmptyResponse,
}

/// One role-tagged message as sent to the chat endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Input for a conversational reply.
#[derive(Debug, Clone)]
pub struct ReplyRequest {
    /// Fully built system prompt (see [`prompts::assistant_system_prompt`]).
    pub system_prompt: String,
    pub instance_name: String,
    pub customer_name: String,
    /// Turns before the current utterance, in order.
    pub history: Vec<ConversationTurn>,
    pub utterance: String,
}

impl ReplyRequest {
    /// System prompt, instance context, history, then the new utterance.
    pub fn messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.history.len() + 3);
        messages.push(ChatMessage::system(self.system_prompt.clone()));
        messages.push(ChatMessage::system(format!(
            "Instance Name: {}\nCustomer Name: {}",
            self.instance_name, self.customer_name
        )));
        for turn in &self.history {
            messages.push(match turn.speaker {
                Speaker::User(_) => ChatMessage::user(turn.text.clone()),
                Speaker::Assistant => ChatMessage::assistant(turn.text.clone()),
            });
        }
        messages.push(ChatMessage::user(self.utterance.clone()));
        messages
    }
}

/// Short single-purpose calls made outside the main thread of conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivationTask {
    FirstName,
    ShortDescription,
    TranslateToEnglish,
    Summary,
    ContactEmail,
    CaseIntent,
}

impl DerivationTask {
    pub fn system_prompt(self) -> &'static str {
        match self {
            DerivationTask::FirstName => prompts::FIRST_NAME_SYSTEM,
            DerivationTask::ShortDescription => prompts::SHORT_DESCRIPTION_SYSTEM,
            DerivationTask::TranslateToEnglish => prompts::TRANSLATE_SYSTEM,
            DerivationTask::Summary => prompts::SUMMARY_SYSTEM,
            DerivationTask::ContactEmail => prompts::CONTACT_EMAIL_SYSTEM,
            DerivationTask::CaseIntent => prompts::CASE_INTENT_SYSTEM,
        }
    }

    pub fn max_tokens(self) -> u32 {
        match self {
            DerivationTask::FirstName
            | DerivationTask::ShortDescription
            | DerivationTask::ContactEmail => 50,
            DerivationTask::TranslateToEnglish => 1000,
            DerivationTask::Summary => 300,
            DerivationTask::CaseIntent => 5,
        }
    }

    pub fn messages(self, input: &str) -> Vec<ChatMessage> {
        let user = match self {
            // Nothing to derive from; the instruction doubles as the user turn.
            DerivationTask::ContactEmail => self.system_prompt().to_string(),
            _ => input.to_string(),
        };
        vec![ChatMessage::system(self.system_prompt()), ChatMessage::user(user)]
    }
}

#[async_trait]
pub trait Reasoner: Send + Sync {
    /// Next assistant reply for the conversation, raw (markers not yet stripped).
    async fn reply(&self, request: &ReplyRequest) -> ReasoningResult<String>;

    /// Run one derivation over `input`.
    async fn derive(&self, task: DerivationTask, input: &str) -> ReasoningResult<String>;
}

/// Control directive a reply may open with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Directive {
    EndConversation,
    OpenCase,
}

#[derive(Debug, Clone)]
pub struct ReplyMarkers {
    pub end_conversation: String,
    pub open_case: String,
}

impl ReplyMarkers {
    pub fn from_config(config: &ConversationConfig) -> Self {
        Self {
            end_conversation: config.end_marker.clone(),
            open_case: config.open_case_marker.clone(),
        }
    }
}

/// A reply split into its directive (if any) and the text to speak.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReasonerReply {
    pub directive: Option<Directive>,
    pub text: String,
}

impl ReasonerReply {
    pub fn parse(raw: &str, markers: &ReplyMarkers) -> Self {
        let trimmed = raw.trim();
        let candidates = [
            (markers.end_conversation.as_str(), Directive::EndConversation),
            (markers.open_case.as_str(), Directive::OpenCase),
        ];
        for (marker, directive) in candidates {
            if marker.is_empty() {
                continue;
            }
            if let Some(rest) = trimmed.strip_prefix(marker) {
                return Self {
                    directive: Some(directive),
                    text: rest.trim().to_string(),
                };
            }
        }
        Self {
            directive: None,
            text: trimmed.to_string(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: String,
}

/// Reasoner backed by `{endpoint}/chat/completions`.
pub struct OpenAiReasoner {
    api_key: String,
    endpoint: String,
    model: String,
    reply_max_tokens: u32,
    client: reqwest::Client,
}

impl OpenAiReasoner {
    pub fn new(api_key: &str, config: &OpenAiConfig) -> ReasoningResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            api_key: api_key.trim().to_string(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.chat_model.clone(),
            reply_max_tokens: config.reply_max_tokens,
            client,
        })
    }

    async fn complete(&self, messages: &[ChatMessage], max_tokens: u32) -> ReasoningResult<String> {
        let url = format!("{}/chat/completions", self.endpoint);
        let body = ChatRequest {
            model: &self.model,
            messages,
            max_tokens: Some(max_tokens),
        };
        debug!(model = %self.model, messages = messages.len(), "chat completion request");

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            warn!(status, "chat completion failed");
            return Err(ReasoningError::Status { status, body });
        }

        let parsed: ChatResponse = res.json().await?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .ok_or(ReasoningError::EmptyResponse)?;
        debug!(chars = text.len(), "chat completion done");
        Ok(text)
    }
}

#[async_trait]
impl Reasoner for OpenAiReasoner {
    async fn reply(&self, request: &ReplyRequest) -> ReasoningResult<String> {
        self.complete(&request.messages(), self.reply_max_tokens).await
    }

    async fn derive(&self, task: DerivationTask, input: &str) -> ReasoningResult<String> {
        self.complete(&task.messages(input), task.max_tokens()).await
    }
}
