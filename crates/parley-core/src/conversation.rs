//! Conversation data model: speakers, turns and the per-session record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Who said a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum Speaker {
    User(String),
    Assistant,
}

impl Speaker {
    /// Display label: the user's name, or `assistant`.
    pub fn label(&self) -> &str {
        match self {
            Speaker::User(name) => name,
            Speaker::Assistant => "assistant",
        }
    }

    pub fn is_assistant(&self) -> bool {
        matches!(self, Speaker::Assistant)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub speaker: Speaker,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            speaker,
            text: text.into(),
            at: Utc::now(),
        }
    }
}

/// Where the conversation currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    #[default]
    Idle,
    AssistantTalking,
    UserTalking,
    Processing,
}

impl fmt::Display for ConversationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConversationState::Idle => "idle",
            ConversationState::AssistantTalking => "assistant_talking",
            ConversationState::UserTalking => "user_talking",
            ConversationState::Processing => "processing",
        };
        f.write_str(s)
    }
}

/// One conversation, from "start" until reset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationSession {
    /// Empty until the first utterance has been turned into a name.
    pub user_name: String,
    turns: Vec<ConversationTurn>,
    pub state: ConversationState,
    case_opened: bool,
}

impl ConversationSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a session around previously persisted turns.
    pub fn with_history(turns: Vec<ConversationTurn>) -> Self {
        let user_name = turns
            .iter()
            .find_map(|t| match &t.speaker {
                Speaker::User(name) => Some(name.clone()),
                Speaker::Assistant => None,
            })
            .unwrap_or_default();
        Self {
            user_name,
            turns,
            ..Self::default()
        }
    }

    pub fn has_name(&self) -> bool {
        !self.user_name.is_empty()
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn history_len(&self) -> usize {
        self.turns.len()
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        let speaker = Speaker::User(self.user_name.clone());
        self.turns.push(ConversationTurn::new(speaker, text));
    }

    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.turns.push(ConversationTurn::new(Speaker::Assistant, text));
    }

    pub fn case_opened(&self) -> bool {
        self.case_opened
    }

    /// Mark the session's case as filed. Returns `false` if one was already filed.
    pub fn open_case(&mut self) -> bool {
        if self.case_opened {
            return false;
        }
        self.case_opened = true;
        true
    }

    /// Forget everything: name, turns, flag, back to idle.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Plain-text transcript, one `label: text` line per turn.
    pub fn transcript(&self) -> String {
        self.turns
            .iter()
            .map(|t| format!("{}: {}", t.speaker.label(), t.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
