//! parley-core: shared building blocks for the Parley voice agent.
//!
//! Holds the layered configuration, user-supplied settings, prompt templates, the
//! conversation data model (speakers, turns, session, response cache) and the
//! Reasoning Client used for replies and for every derived text field.

mod cache;
mod config;
mod conversation;
mod error;
mod persist;
pub mod prompts;
pub mod reasoning;
mod settings;

pub use cache::ResponseCache;
pub use crate::config::{
    CaseTrigger, ConversationConfig, GatewayConfig, OpenAiConfig, ParleyConfig, StorageConfig,
    TicketingConfig,
};
pub use conversation::{ConversationSession, ConversationState, ConversationTurn, Speaker};
pub use error::{CoreError, CoreResult};
pub use persist::write_atomic;
pub use reasoning::{
    ChatMessage, DerivationTask, Directive, OpenAiReasoner, Reasoner, ReasonerReply,
    ReasoningError, ReasoningResult, ReplyMarkers, ReplyRequest,
};
pub use settings::{Credentials, Settings, REDACTED};
