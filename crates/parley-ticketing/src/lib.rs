//! parley-ticketing: files a support case in a ticketing instance.
//!
//! [`TableClient`] speaks the instance's REST table API; [`CaseFiler`] runs the four
//! dependent inserts (identity, interaction, case, link) in order and stops at the first
//! failure without retracting earlier records.

mod client;
mod error;
mod saga;

pub use client::{TableClient, TableRecord, TicketingBackend};
pub use error::{SagaError, SagaStep, TicketingError, TicketingResult};
pub use saga::{CaseDraft, CaseFiler, CaseRecord};
