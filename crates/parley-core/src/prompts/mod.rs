//! Prompt templates for the assistant and for the derivation calls around case filing.

pub mod assistant;
pub mod derivation;

pub use assistant::{assistant_system_prompt, ASSISTANT_SYSTEM, MESSAGE_THREAD_HEADER};
pub use derivation::{
    CASE_INTENT_SYSTEM, CONTACT_EMAIL_SYSTEM, FIRST_NAME_SYSTEM, SHORT_DESCRIPTION_SYSTEM,
    SUMMARY_SYSTEM, TRANSLATE_SYSTEM,
};
