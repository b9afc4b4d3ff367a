//! parley-engine: the conversation loop.
//!
//! The [`Orchestrator`] owns one session and drives it through
//! `idle → assistant_talking → user_talking → processing`. It is run as an actor by
//! [`spawn`]; callers talk to it through a cloneable [`ConversationHandle`].

pub mod backends;
pub mod cancel;
pub mod error;
pub mod events;
pub mod intent;
pub mod orchestrator;
pub mod service;
pub mod store;

pub use backends::{BackendFactory, Backends, HttpBackendFactory};
pub use cancel::{RequestKind, RequestTracker, ResetHandle};
pub use error::{ConversationError, ConversationResult, ErrorKind};
pub use events::{ConversationEvent, ConversationSnapshot};
pub use intent::{CaseDecision, CasePolicy, IntentSignals};
pub use orchestrator::{Orchestrator, TurnOutcome};
pub use service::{spawn, ConversationHandle};
pub use store::SessionStore;
