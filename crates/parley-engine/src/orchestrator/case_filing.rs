//! Turning a conversation into a ticket.
//!
//! Case fields are derived from the transcript first. Only when every field is ready does
//! the four-step filing run. A failure anywhere apologises to the user and keeps the
//! session going with `case_opened` still false.

use super::{Halt, Orchestrator, Step, TurnOutcome};
use crate::backends::Backends;
use crate::cancel::RequestKind;
use crate::error::ConversationError;
use crate::events::ConversationEvent;
use parley_core::{ConversationState, DerivationTask};
use parley_ticketing::{CaseDraft, CaseFiler, CaseRecord};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

impl Orchestrator {
    pub(super) async fn file_case(
        &mut self,
        epoch: u64,
        backends: &Backends,
        reply_text: &str,
    ) -> Step<TurnOutcome> {
        self.speak(epoch, backends, reply_text).await?;
        let interstitial = self.config.conversation.case_interstitial.clone();
        self.set_status("Opening a case...");
        self.speak(epoch, backends, &interstitial).await?;
        self.transition(ConversationState::Processing);

        let draft = match self.draft_case(epoch, backends).await {
            Ok(draft) => draft,
            Err(Halt::Failed(e)) => return self.apologise(epoch, backends, e).await,
            Err(Halt::Cancelled) => return Err(Halt::Cancelled),
        };

        let filer = CaseFiler::new(Arc::clone(&backends.ticketing), self.config.ticketing.clone());
        let record = match self
            .call(
                epoch,
                RequestKind::CaseFiling,
                filer.file(&draft),
                ConversationError::CaseFiling,
            )
            .await
        {
            Ok(record) => record,
            Err(Halt::Failed(e)) => return self.apologise(epoch, backends, e).await,
            Err(Halt::Cancelled) => return Err(Halt::Cancelled),
        };

        if !self.session.open_case() {
            warn!(case_id = %record.case_id, "session already had a case");
        }
        let number = self.lookup_number(epoch, &filer, &record).await?;
        info!(case_id = %record.case_id, case_number = %number, "case opened");
        self.status = None;
        self.emit(ConversationEvent::CaseOpened {
            case_id: record.case_id.clone(),
            case_number: number.clone(),
        });

        let message = self.config.conversation.case_opened_for(&number);
        self.push_assistant(&message);
        self.speak(epoch, backends, &message).await?;
        self.listen().await
    }

    async fn draft_case(&self, epoch: u64, backends: &Backends) -> Step<CaseDraft> {
        let transcript = self.session.transcript();
        let short_description = self
            .derive_field(epoch, backends, DerivationTask::ShortDescription, &transcript)
            .await?;
        let work_notes = self
            .derive_field(epoch, backends, DerivationTask::TranslateToEnglish, &transcript)
            .await?;
        let description = self
            .derive_field(epoch, backends, DerivationTask::Summary, &transcript)
            .await?;
        let email = self.contact_email(epoch, backends).await?;

        debug!(%short_description, %email, "case fields ready");
        Ok(CaseDraft {
            first_name: self.session.user_name.clone(),
            last_name: self.config.ticketing.identity_last_name.clone(),
            email,
            short_description,
            description,
            work_notes,
        })
    }

    async fn derive_field(
        &self,
        epoch: u64,
        backends: &Backends,
        task: DerivationTask,
        input: &str,
    ) -> Step<String> {
        let raw = self
            .call(
                epoch,
                RequestKind::Derivation,
                backends.reasoner.derive(task, input),
                ConversationError::CaseDerivation,
            )
            .await?;
        Ok(raw.trim().to_string())
    }

    /// A plausible address from the reasoner, or a generated placeholder.
    async fn contact_email(&self, epoch: u64, backends: &Backends) -> Step<String> {
        let derived = self
            .call(
                epoch,
                RequestKind::Derivation,
                backends.reasoner.derive(DerivationTask::ContactEmail, ""),
                ConversationError::CaseDerivation,
            )
            .await;
        match derived {
            Ok(raw) => {
                let candidate = raw.trim().trim_matches(|c: char| c == '"' || c == '<' || c == '>');
                if looks_like_email(candidate) {
                    Ok(candidate.to_string())
                } else {
                    debug!(raw = %raw.trim(), "unusable contact email, generating one");
                    Ok(placeholder_email())
                }
            }
            Err(Halt::Cancelled) => Err(Halt::Cancelled),
            Err(Halt::Failed(e)) => {
                warn!(error = %e, "contact email derivation failed, generating one");
                Ok(placeholder_email())
            }
        }
    }

    /// Number from a fresh read, else the one returned on insert, else the record id.
    async fn lookup_number(
        &self,
        epoch: u64,
        filer: &CaseFiler,
        record: &CaseRecord,
    ) -> Step<String> {
        let fallback = || {
            record
                .case_number
                .clone()
                .unwrap_or_else(|| record.case_id.clone())
        };
        match self
            .tracker
            .run(epoch, RequestKind::CaseFiling, filer.case_number(&record.case_id))
            .await
        {
            None => Err(Halt::Cancelled),
            Some(Ok(Some(number))) => Ok(number),
            Some(Ok(None)) => Ok(fallback()),
            Some(Err(e)) => {
                warn!(error = %e, case_id = %record.case_id, "case number lookup failed");
                Ok(fallback())
            }
        }
    }

    async fn apologise(
        &mut self,
        epoch: u64,
        backends: &Backends,
        error: ConversationError,
    ) -> Step<TurnOutcome> {
        warn!(error = %error, kind = ?error.kind(), "case filing abandoned");
        if let Some(status) = error.status_message() {
            self.set_status(status);
        }
        let apology = self.config.conversation.case_apology.clone();
        self.push_assistant(&apology);
        self.speak(epoch, backends, &apology).await?;
        self.listen().await
    }
}

fn looks_like_email(candidate: &str) -> bool {
    if candidate.chars().any(char::is_whitespace) {
        return false;
    }
    match candidate.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

fn placeholder_email() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("caller-{}@example.com", &id[..8])
}
