//! What the orchestrator tells the outside world.

use parley_core::{ConversationState, ConversationTurn};
use serde::Serialize;

/// Published on a broadcast channel as the conversation moves.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationEvent {
    StateChanged {
        from: ConversationState,
        to: ConversationState,
    },
    Turn {
        turn: ConversationTurn,
    },
    Status {
        message: String,
    },
    CaseOpened {
        case_id: String,
        case_number: String,
    },
    Reset,
}

/// Point-in-time view of the conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConversationSnapshot {
    pub state: ConversationState,
    pub user_name: String,
    pub case_opened: bool,
    pub history: Vec<ConversationTurn>,
    pub status: Option<String>,
    pub paused: bool,
}
