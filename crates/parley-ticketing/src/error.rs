//! Ticketing error types.

use std::fmt;
use thiserror::Error;

pub type TicketingResult<T> = Result<T, TicketingError>;

#[derive(Error, Debug)]
pub enum TicketingError {
    #[error("Ticketing request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Ticketing table {table} returned {status}: {body}")]
    Status {
        table: String,
        status: u16,
        body: String,
    },

    #[error("Ticketing table {table} response has no {field}")]
    MissingField { table: String, field: &'static str },
}

/// The four inserts of a case filing, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaStep {
    CreateIdentity,
    CreateInteraction,
    CreateCase,
    LinkRecords,
}

impl SagaStep {
    pub fn as_str(self) -> &'static str {
        match self {
            SagaStep::CreateIdentity => "create_identity",
            SagaStep::CreateInteraction => "create_interaction",
            SagaStep::CreateCase => "create_case",
            SagaStep::LinkRecords => "link_records",
        }
    }
}

impl fmt::Display for SagaStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A filing that stopped at `step`. Records from earlier steps still exist.
#[derive(Error, Debug)]
#[error("case filing failed at {step}: {source}")]
pub struct SagaError {
    pub step: SagaStep,
    #[source]
    pub source: TicketingError,
}
