//! The conversation state machine.
//!
//! ```text
//! idle ─start─> assistant_talking ─playback done─> user_talking ─utterance─> processing
//!   ^                  ^                                                         │
//!   │                  └──────────────── reply / acknowledgement ────────────────┤
//!   └──────────────── end directive, failure, reset (from anywhere) ─────────────┘
//! ```
//!
//! Each public method runs one transition to completion and returns a [`TurnOutcome`].
//! Remote calls go through the [`RequestTracker`] so a reset issued through a
//! [`ResetHandle`] aborts them; an aborted call ends the turn silently with a local reset.

mod case_filing;

use crate::backends::{BackendFactory, Backends};
use crate::cancel::{RequestKind, RequestTracker, ResetHandle};
use crate::error::{ConversationError, ConversationResult, ErrorKind};
use crate::events::{ConversationEvent, ConversationSnapshot};
use crate::intent::{parse_yes_no, CaseDecision, CasePolicy, IntentSignals};
use crate::store::SessionStore;
use parley_core::prompts::{assistant_system_prompt, ASSISTANT_SYSTEM};
use parley_core::{
    ConversationSession, ConversationState, DerivationTask, Directive, ParleyConfig,
    ReasonerReply, ReplyMarkers, ReplyRequest, ResponseCache, Settings,
};
use parley_voice::{AudioClip, CaptureDriver, PlaybackDriver};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 64;

/// Result of one call into the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TurnOutcome {
    /// The conversation moved on and is now in `state`.
    Advanced { state: ConversationState },
    /// Not applicable in the current state; nothing changed.
    Ignored,
    /// A reset overtook the turn.
    Cancelled,
    /// The assistant ended the conversation.
    Ended,
    /// The turn failed and the conversation is idle.
    Failed { status: String, kind: ErrorKind },
}

/// Why a turn stopped early.
enum Halt {
    Cancelled,
    Failed(ConversationError),
}

impl From<ConversationError> for Halt {
    fn from(error: ConversationError) -> Self {
        match error {
            ConversationError::Cancelled => Halt::Cancelled,
            other => Halt::Failed(other),
        }
    }
}

type Step<T> = Result<T, Halt>;

pub struct Orchestrator {
    config: Arc<ParleyConfig>,
    factory: Arc<dyn BackendFactory>,
    backends: Option<Backends>,
    capture: Arc<dyn CaptureDriver>,
    playback: Arc<dyn PlaybackDriver>,
    settings: Settings,
    session: ConversationSession,
    cache: ResponseCache,
    tracker: RequestTracker,
    policy: CasePolicy,
    markers: ReplyMarkers,
    paused: bool,
    status: Option<String>,
    store: Option<SessionStore>,
    events: broadcast::Sender<ConversationEvent>,
    snapshot_tx: watch::Sender<ConversationSnapshot>,
    settings_tx: watch::Sender<Settings>,
}

impl Orchestrator {
    pub fn new(
        config: Arc<ParleyConfig>,
        factory: Arc<dyn BackendFactory>,
        capture: Arc<dyn CaptureDriver>,
        playback: Arc<dyn PlaybackDriver>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (snapshot_tx, _) = watch::channel(ConversationSnapshot::default());
        let (settings_tx, _) = watch::channel(Settings::default());
        Self {
            policy: CasePolicy::from_config(&config.conversation),
            markers: ReplyMarkers::from_config(&config.conversation),
            config,
            factory,
            backends: None,
            capture,
            playback,
            settings: Settings::default(),
            session: ConversationSession::new(),
            cache: ResponseCache::new(),
            tracker: RequestTracker::new(),
            paused: false,
            status: None,
            store: None,
            events,
            snapshot_tx,
            settings_tx,
        }
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self.settings_tx.send_replace(self.settings.clone());
        self
    }

    /// Attach persistence, restoring saved settings and history.
    pub fn with_store(mut self, store: SessionStore) -> ConversationResult<Self> {
        self.settings = store.load_settings()?;
        let history = store.load_history().unwrap_or_else(|e| {
            warn!(error = %e, "persisted history unreadable, starting empty");
            Vec::new()
        });
        info!(dir = %store.dir().display(), turns = history.len(), "session state restored");
        self.session = ConversationSession::with_history(history);
        self.store = Some(store);
        self.settings_tx.send_replace(self.settings.clone());
        self.publish();
        Ok(self)
    }

    pub fn state(&self) -> ConversationState {
        self.session.state
    }

    pub fn session(&self) -> &ConversationSession {
        &self.session
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn snapshot(&self) -> ConversationSnapshot {
        ConversationSnapshot {
            state: self.session.state,
            user_name: self.session.user_name.clone(),
            case_opened: self.session.case_opened(),
            history: self.session.turns().to_vec(),
            status: self.status.clone(),
            paused: self.paused,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConversationEvent> {
        self.events.subscribe()
    }

    pub fn event_sender(&self) -> broadcast::Sender<ConversationEvent> {
        self.events.clone()
    }

    pub fn watch_snapshot(&self) -> watch::Receiver<ConversationSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn watch_settings(&self) -> watch::Receiver<Settings> {
        self.settings_tx.subscribe()
    }

    /// Interrupt handle that works while a turn is being awaited.
    pub fn reset_handle(&self) -> ResetHandle {
        ResetHandle::new(self.tracker.clone(), Arc::clone(&self.playback))
    }

    // ----------------------------------------------------------------------------------
    // Transitions
    // ----------------------------------------------------------------------------------

    /// `idle --start--> assistant_talking`: clear the session, greet, then listen.
    pub async fn start(&mut self) -> TurnOutcome {
        if self.session.state != ConversationState::Idle {
            debug!(state = %self.session.state, "start ignored");
            return TurnOutcome::Ignored;
        }
        let backends = match self.backends() {
            Ok(backends) => backends,
            Err(e) => return self.fail(e).await,
        };

        self.session.clear();
        self.cache.clear();
        self.paused = false;
        self.status = None;
        self.persist_history();
        info!("conversation started");

        let epoch = self.tracker.epoch();
        let greeting = self.config.conversation.greeting.clone();
        let result = self.greet(epoch, &backends, &greeting).await;
        self.conclude(result).await
    }

    async fn greet(&mut self, epoch: u64, backends: &Backends, greeting: &str) -> Step<TurnOutcome> {
        self.speak(epoch, backends, greeting).await?;
        self.listen().await
    }

    /// An utterance recorded outside the capture driver (uploaded by a client).
    pub async fn handle_utterance(&mut self, clip: AudioClip) -> TurnOutcome {
        if self.session.state != ConversationState::UserTalking {
            debug!(state = %self.session.state, "utterance ignored");
            return TurnOutcome::Ignored;
        }
        // the uploaded clip supersedes anything the driver buffered
        if self.capture.is_recording() {
            if let Err(e) = self.capture.stop().await {
                warn!(error = %e, "capture stop failed");
            }
        }
        self.process(clip).await
    }

    /// `user_talking --user stops--> processing` with whatever the driver captured.
    pub async fn stop_recording(&mut self) -> TurnOutcome {
        if self.session.state != ConversationState::UserTalking || !self.capture.is_recording() {
            return TurnOutcome::Ignored;
        }
        match self.capture.stop().await {
            Ok(Some(clip)) => self.process(clip).await,
            Ok(None) => {
                self.set_status("No audio was captured.");
                if !self.paused {
                    if let Err(e) = self.capture.start().await {
                        return self.fail(ConversationError::Capture(e)).await;
                    }
                }
                TurnOutcome::Ignored
            }
            Err(e) => self.fail(ConversationError::Capture(e)).await,
        }
    }

    pub async fn pause(&mut self) -> TurnOutcome {
        if self.session.state == ConversationState::Idle || self.paused {
            return TurnOutcome::Ignored;
        }
        self.paused = true;
        self.stop_capture().await;
        self.set_status("Conversation paused.");
        TurnOutcome::Advanced {
            state: self.session.state,
        }
    }

    pub async fn resume(&mut self) -> TurnOutcome {
        if self.session.state == ConversationState::Idle || !self.paused {
            return TurnOutcome::Ignored;
        }
        self.paused = false;
        if self.session.state == ConversationState::UserTalking && !self.capture.is_recording() {
            if let Err(e) = self.capture.start().await {
                return self.fail(ConversationError::Capture(e)).await;
            }
        }
        self.set_status("Conversation resumed.");
        TurnOutcome::Advanced {
            state: self.session.state,
        }
    }

    /// Any state `--reset--> idle`.
    pub async fn reset(&mut self) {
        info!(from = %self.session.state, "conversation reset");
        self.reset_local().await;
    }

    // ----------------------------------------------------------------------------------
    // Settings and rules
    // ----------------------------------------------------------------------------------

    /// Replace credentials and customer name. Custom rules are kept.
    pub fn update_settings(&mut self, mut settings: Settings) -> ConversationResult<()> {
        settings.keep_secrets_from(&self.settings);
        settings.require_complete()?;
        settings.custom_rules = std::mem::take(&mut self.settings.custom_rules);
        self.settings = settings;
        self.backends = None;
        info!(settings = ?self.settings, "settings updated");
        self.settings_changed()
    }

    pub fn add_rule(&mut self, rule: &str) -> ConversationResult<Vec<String>> {
        self.settings.add_rule(rule)?;
        self.settings_changed()?;
        Ok(self.settings.custom_rules.clone())
    }

    pub fn replace_rules(&mut self, text: &str) -> ConversationResult<Vec<String>> {
        self.settings.replace_rules(text);
        self.settings_changed()?;
        Ok(self.settings.custom_rules.clone())
    }

    pub fn rules(&self) -> &[String] {
        &self.settings.custom_rules
    }

    fn settings_changed(&mut self) -> ConversationResult<()> {
        self.settings_tx.send_replace(self.settings.clone());
        if let Some(store) = &self.store {
            store.save_settings(&self.settings)?;
        }
        Ok(())
    }

    // ----------------------------------------------------------------------------------
    // Turn processing
    // ----------------------------------------------------------------------------------

    async fn process(&mut self, clip: AudioClip) -> TurnOutcome {
        // epoch first: an interrupt seen after the transition must cancel this turn
        let epoch = self.tracker.epoch();
        self.transition(ConversationState::Processing);
        let result = self.run_turn(epoch, clip).await;
        self.conclude(result).await
    }

    async fn run_turn(&mut self, epoch: u64, clip: AudioClip) -> Step<TurnOutcome> {
        let backends = self.backends()?;
        let limit = self.config.conversation.max_audio_bytes;
        if clip.len() > limit {
            return Err(ConversationError::AudioTooLarge {
                size: clip.len(),
                limit,
            }
            .into());
        }

        let transcript = self
            .call(
                epoch,
                RequestKind::Transcription,
                backends.stt.transcribe(&clip),
                ConversationError::Transcription,
            )
            .await?;
        let transcript = transcript.trim().to_string();
        if transcript.is_empty() {
            debug!("empty transcript, listening again");
            return self.listen().await;
        }

        if self.session.has_name() {
            self.converse(epoch, &backends, transcript).await
        } else {
            self.capture_name(epoch, &backends, transcript).await
        }
    }

    /// First utterance of a session: always the user's name.
    async fn capture_name(
        &mut self,
        epoch: u64,
        backends: &Backends,
        transcript: String,
    ) -> Step<TurnOutcome> {
        let extracted = self
            .call(
                epoch,
                RequestKind::Derivation,
                backends.reasoner.derive(DerivationTask::FirstName, &transcript),
                ConversationError::Reasoning,
            )
            .await;
        let name = match extracted {
            Ok(raw) => clean_name(&raw).unwrap_or_else(|| transcript.clone()),
            Err(Halt::Cancelled) => return Err(Halt::Cancelled),
            Err(Halt::Failed(e)) => {
                warn!(error = %e, "name extraction failed, using transcript");
                transcript.clone()
            }
        };

        info!(user = %name, "user name captured");
        self.session.user_name = name.clone();
        self.push_user(&transcript);
        let acknowledgement = self.config.conversation.acknowledgement_for(&name);
        self.push_assistant(&acknowledgement);
        self.speak(epoch, backends, &acknowledgement).await?;
        self.listen().await
    }

    /// One reasoning turn. The reply cache is keyed by the utterance and the history length
    /// before it, and history only grows within a session, so the lookup is defensive: a
    /// repeated question later in the conversation is answered afresh with the longer thread.
    async fn converse(
        &mut self,
        epoch: u64,
        backends: &Backends,
        transcript: String,
    ) -> Step<TurnOutcome> {
        let position = self.session.history_len();
        let request = ReplyRequest {
            system_prompt: self.system_prompt(),
            instance_name: self.settings.instance_name.trim().to_string(),
            customer_name: self.settings.customer_name.trim().to_string(),
            history: self.session.turns().to_vec(),
            utterance: transcript.clone(),
        };
        self.push_user(&transcript);

        let cached = self.cache.get(&transcript, position).map(str::to_string);
        let raw = match cached {
            Some(hit) => {
                debug!(position, "reply cache hit");
                hit
            }
            None => {
                let raw = self
                    .call(
                        epoch,
                        RequestKind::Reasoning,
                        backends.reasoner.reply(&request),
                        ConversationError::Reasoning,
                    )
                    .await?;
                self.cache.insert(&transcript, position, raw.clone());
                raw
            }
        };

        let reply = ReasonerReply::parse(&raw, &self.markers);
        if !reply.text.is_empty() {
            self.push_assistant(&reply.text);
        }

        if reply.directive == Some(Directive::EndConversation) {
            self.speak(epoch, backends, &reply.text).await?;
            info!("conversation ended by assistant");
            self.reset_local().await;
            return Ok(TurnOutcome::Ended);
        }

        match self
            .case_decision(epoch, backends, &transcript, reply.directive)
            .await?
        {
            CaseDecision::File => self.file_case(epoch, backends, &reply.text).await,
            CaseDecision::AlreadyOpen | CaseDecision::NotRequested => {
                self.speak(epoch, backends, &reply.text).await?;
                self.listen().await
            }
        }
    }

    async fn case_decision(
        &self,
        epoch: u64,
        backends: &Backends,
        utterance: &str,
        directive: Option<Directive>,
    ) -> Step<CaseDecision> {
        let mut signals = IntentSignals {
            phrase: self.policy.phrase_matches(utterance),
            directive: directive == Some(Directive::OpenCase),
            analysis: false,
        };
        let opened = self.session.case_opened();
        if self.policy.wants_analysis(signals, opened) {
            let transcript = self.session.transcript();
            match self
                .call(
                    epoch,
                    RequestKind::Derivation,
                    backends.reasoner.derive(DerivationTask::CaseIntent, &transcript),
                    ConversationError::Reasoning,
                )
                .await
            {
                Ok(answer) => signals.analysis = parse_yes_no(&answer),
                Err(Halt::Cancelled) => return Err(Halt::Cancelled),
                Err(Halt::Failed(e)) => warn!(error = %e, "intent analysis failed, treating as no"),
            }
        }
        let decision = self.policy.decide(signals, opened);
        debug!(?signals, ?decision, "case intent");
        Ok(decision)
    }

    // ----------------------------------------------------------------------------------
    // Helpers
    // ----------------------------------------------------------------------------------

    fn backends(&mut self) -> ConversationResult<Backends> {
        let credentials = self.settings.require_complete()?;
        if let Some(backends) = &self.backends {
            return Ok(backends.clone());
        }
        let built = self.factory.build(&credentials)?;
        self.backends = Some(built.clone());
        Ok(built)
    }

    fn system_prompt(&self) -> String {
        let c = &self.config.conversation;
        assistant_system_prompt(
            ASSISTANT_SYSTEM,
            &self.settings.custom_rules,
            &c.end_marker,
            &c.open_case_marker,
        )
    }

    /// Run `fut` as the current request and map its error with `wrap`.
    async fn call<T, E, F>(
        &self,
        epoch: u64,
        kind: RequestKind,
        fut: F,
        wrap: fn(E) -> ConversationError,
    ) -> Step<T>
    where
        F: Future<Output = Result<T, E>>,
    {
        match self.tracker.run(epoch, kind, fut).await {
            Some(Ok(value)) => Ok(value),
            Some(Err(e)) => Err(Halt::Failed(wrap(e))),
            None => {
                debug!(?kind, "request abandoned after reset");
                Err(Halt::Cancelled)
            }
        }
    }

    /// Synthesize and play `text`, ending in `assistant_talking`.
    async fn speak(&mut self, epoch: u64, backends: &Backends, text: &str) -> Step<()> {
        self.transition(ConversationState::AssistantTalking);
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        let clip = self
            .call(
                epoch,
                RequestKind::Synthesis,
                backends.tts.synthesize(text),
                ConversationError::Synthesis,
            )
            .await?;
        if clip.is_empty() {
            return Ok(());
        }
        let playback = Arc::clone(&self.playback);
        self.call(
            epoch,
            RequestKind::Playback,
            playback.play(clip),
            ConversationError::Playback,
        )
        .await
    }

    /// `assistant_talking --playback complete--> user_talking`.
    async fn listen(&mut self) -> Step<TurnOutcome> {
        self.transition(ConversationState::UserTalking);
        if self.paused {
            debug!("paused, capture not restarted");
        } else {
            self.capture
                .start()
                .await
                .map_err(ConversationError::Capture)?;
        }
        Ok(TurnOutcome::Advanced {
            state: ConversationState::UserTalking,
        })
    }

    async fn conclude(&mut self, result: Step<TurnOutcome>) -> TurnOutcome {
        match result {
            Ok(outcome) => outcome,
            Err(Halt::Cancelled) => {
                self.reset_local().await;
                TurnOutcome::Cancelled
            }
            Err(Halt::Failed(error)) => self.fail(error).await,
        }
    }

    /// Abandon the turn: idle, status surfaced, history kept.
    async fn fail(&mut self, error: ConversationError) -> TurnOutcome {
        let kind = error.kind();
        if kind == ErrorKind::Cancelled {
            self.reset_local().await;
            return TurnOutcome::Cancelled;
        }
        warn!(error = %error, ?kind, state = %self.session.state, "turn failed");
        self.playback.stop();
        self.stop_capture().await;
        self.transition(ConversationState::Idle);
        let status = error.status_message().unwrap_or_default();
        self.set_status(status.clone());
        TurnOutcome::Failed { status, kind }
    }

    async fn reset_local(&mut self) {
        self.tracker.cancel_all();
        self.playback.stop();
        self.stop_capture().await;

        let from = self.session.state;
        self.session.clear();
        self.cache.clear();
        self.paused = false;
        self.status = None;
        if let Some(store) = &self.store {
            if let Err(e) = store.clear_history() {
                warn!(error = %e, "could not clear persisted history");
            }
        }
        if from != ConversationState::Idle {
            info!(%from, to = %ConversationState::Idle, "conversation state");
            self.emit(ConversationEvent::StateChanged {
                from,
                to: ConversationState::Idle,
            });
        }
        self.emit(ConversationEvent::Reset);
    }

    async fn stop_capture(&self) {
        if !self.capture.is_recording() {
            return;
        }
        match self.capture.stop().await {
            Ok(Some(clip)) => debug!(bytes = clip.len(), "discarded buffered audio"),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "capture stop failed"),
        }
    }

    fn transition(&mut self, to: ConversationState) {
        let from = self.session.state;
        if from == to {
            return;
        }
        self.session.state = to;
        info!(%from, %to, "conversation state");
        self.emit(ConversationEvent::StateChanged { from, to });
    }

    fn push_user(&mut self, text: &str) {
        self.session.push_user(text);
        self.turn_added();
    }

    fn push_assistant(&mut self, text: &str) {
        self.session.push_assistant(text);
        self.turn_added();
    }

    fn turn_added(&mut self) {
        self.persist_history();
        if let Some(turn) = self.session.turns().last().cloned() {
            self.emit(ConversationEvent::Turn { turn });
        }
    }

    fn set_status(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.status = Some(message.clone());
        self.emit(ConversationEvent::Status { message });
    }

    fn persist_history(&self) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save_history(self.session.turns()) {
                warn!(error = %e, "could not persist history");
            }
        }
    }

    fn emit(&self, event: ConversationEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
        self.publish();
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
    }
}

/// Strip quotes and trailing punctuation from an extracted name.
fn clean_name(raw: &str) -> Option<String> {
    let name = raw
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '.' || c == ',')
        .trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}
