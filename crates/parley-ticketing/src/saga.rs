//! The case filing saga: identity → interaction → case → link.
//!
//! Each step needs an id produced by an earlier one, so the steps run strictly in order
//! and the first failure ends the filing. Nothing is rolled back.

use crate::client::{TableRecord, TicketingBackend};
use crate::error::{SagaError, SagaStep, TicketingResult};
use parley_core::TicketingConfig;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Field values for one filing, derived from the conversation beforehand.
#[derive(Debug, Clone, Default)]
pub struct CaseDraft {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub short_description: String,
    /// Summary of the conversation, stored as the case description.
    pub description: String,
    /// English transcript, stored on the interaction.
    pub work_notes: String,
}

/// Ids of the four records a successful filing created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseRecord {
    pub identity_id: String,
    pub interaction_id: String,
    pub case_id: String,
    pub link_id: String,
    /// Case number if the insert response already carried it.
    pub case_number: Option<String>,
}

pub struct CaseFiler {
    backend: Arc<dyn TicketingBackend>,
    tables: TicketingConfig,
}

impl CaseFiler {
    pub fn new(backend: Arc<dyn TicketingBackend>, tables: TicketingConfig) -> Self {
        Self { backend, tables }
    }

    async fn step(
        &self,
        step: SagaStep,
        table: &str,
        body: serde_json::Value,
    ) -> Result<TableRecord, SagaError> {
        match self.backend.insert(table, body).await {
            Ok(record) => {
                info!(step = step.as_str(), table, sys_id = %record.sys_id, "case filing step done");
                Ok(record)
            }
            Err(source) => {
                warn!(step = step.as_str(), table, error = %source, "case filing step failed");
                Err(SagaError { step, source })
            }
        }
    }

    /// Run all four inserts in order.
    pub async fn file(&self, draft: &CaseDraft) -> Result<CaseRecord, SagaError> {
        let t = &self.tables;

        let identity = self
            .step(
                SagaStep::CreateIdentity,
                &t.identity_table,
                json!({
                    "first_name": draft.first_name,
                    "last_name": draft.last_name,
                    "email": draft.email,
                }),
            )
            .await?;

        let interaction = self
            .step(
                SagaStep::CreateInteraction,
                &t.interaction_table,
                json!({
                    "opened_for": identity.sys_id,
                    "short_description": draft.short_description,
                    "work_notes": draft.work_notes,
                }),
            )
            .await?;

        let case = self
            .step(
                SagaStep::CreateCase,
                &t.case_table,
                json!({
                    "opened_for": identity.sys_id,
                    "short_description": draft.short_description,
                    "description": draft.description,
                }),
            )
            .await?;

        let link = self
            .step(
                SagaStep::LinkRecords,
                &t.link_table,
                json!({
                    "interaction": interaction.sys_id,
                    "document_id": case.sys_id,
                    "document_table": t.case_table,
                }),
            )
            .await?;

        Ok(CaseRecord {
            identity_id: identity.sys_id,
            interaction_id: interaction.sys_id,
            case_id: case.sys_id,
            link_id: link.sys_id,
            case_number: case.number,
        })
    }

    /// Look up the human-readable number of a filed case.
    pub async fn case_number(&self, case_id: &str) -> TicketingResult<Option<String>> {
        let record = self.backend.fetch(&self.tables.case_table, case_id).await?;
        Ok(record.number)
    }
}
