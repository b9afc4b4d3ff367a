//! The orchestrator as an actor.
//!
//! Commands are handled one at a time, so a session never sees two transitions at once.
//! Reset is the exception: the handle interrupts the in-flight request directly, then
//! queues the reset itself.

use crate::cancel::ResetHandle;
use crate::error::{ConversationError, ConversationResult};
use crate::events::{ConversationEvent, ConversationSnapshot};
use crate::orchestrator::{Orchestrator, TurnOutcome};
use parley_core::Settings;
use parley_voice::AudioClip;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info};

const COMMAND_BUFFER: usize = 32;

enum Command {
    Start(oneshot::Sender<TurnOutcome>),
    Utterance(AudioClip, oneshot::Sender<TurnOutcome>),
    StopRecording(oneshot::Sender<TurnOutcome>),
    Pause(oneshot::Sender<TurnOutcome>),
    Resume(oneshot::Sender<TurnOutcome>),
    Reset(oneshot::Sender<()>),
    UpdateSettings(Settings, oneshot::Sender<ConversationResult<()>>),
    AddRule(String, oneshot::Sender<ConversationResult<Vec<String>>>),
    ReplaceRules(String, oneshot::Sender<ConversationResult<Vec<String>>>),
}

#[derive(Clone)]
pub struct ConversationHandle {
    commands: mpsc::Sender<Command>,
    interrupt: ResetHandle,
    snapshot: watch::Receiver<ConversationSnapshot>,
    settings: watch::Receiver<Settings>,
    events: broadcast::Sender<ConversationEvent>,
}

/// Run `orchestrator` on its own task.
pub fn spawn(orchestrator: Orchestrator) -> ConversationHandle {
    let (commands, rx) = mpsc::channel(COMMAND_BUFFER);
    let handle = ConversationHandle {
        commands,
        interrupt: orchestrator.reset_handle(),
        snapshot: orchestrator.watch_snapshot(),
        settings: orchestrator.watch_settings(),
        events: orchestrator.event_sender(),
    };
    tokio::spawn(run(orchestrator, rx));
    handle
}

async fn run(mut orchestrator: Orchestrator, mut commands: mpsc::Receiver<Command>) {
    info!("conversation service started");
    while let Some(command) = commands.recv().await {
        // a dropped reply means the caller went away; the transition still happened
        match command {
            Command::Start(reply) => {
                let _ = reply.send(orchestrator.start().await);
            }
            Command::Utterance(clip, reply) => {
                debug!(bytes = clip.len(), "utterance received");
                let _ = reply.send(orchestrator.handle_utterance(clip).await);
            }
            Command::StopRecording(reply) => {
                let _ = reply.send(orchestrator.stop_recording().await);
            }
            Command::Pause(reply) => {
                let _ = reply.send(orchestrator.pause().await);
            }
            Command::Resume(reply) => {
                let _ = reply.send(orchestrator.resume().await);
            }
            Command::Reset(reply) => {
                orchestrator.reset().await;
                let _ = reply.send(());
            }
            Command::UpdateSettings(settings, reply) => {
                let _ = reply.send(orchestrator.update_settings(settings));
            }
            Command::AddRule(rule, reply) => {
                let _ = reply.send(orchestrator.add_rule(&rule));
            }
            Command::ReplaceRules(text, reply) => {
                let _ = reply.send(orchestrator.replace_rules(&text));
            }
        }
    }
    orchestrator.reset().await;
    info!("conversation service stopped");
}

impl ConversationHandle {
    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> ConversationResult<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .await
            .map_err(|_| ConversationError::ServiceClosed)?;
        rx.await.map_err(|_| ConversationError::ServiceClosed)
    }

    pub async fn start(&self) -> ConversationResult<TurnOutcome> {
        self.request(Command::Start).await
    }

    /// Hand over a recorded utterance.
    pub async fn submit_audio(&self, clip: AudioClip) -> ConversationResult<TurnOutcome> {
        self.request(|tx| Command::Utterance(clip, tx)).await
    }

    pub async fn stop_recording(&self) -> ConversationResult<TurnOutcome> {
        self.request(Command::StopRecording).await
    }

    pub async fn pause(&self) -> ConversationResult<TurnOutcome> {
        self.request(Command::Pause).await
    }

    pub async fn resume(&self) -> ConversationResult<TurnOutcome> {
        self.request(Command::Resume).await
    }

    /// Abort whatever is in flight, then clear the session.
    pub async fn reset(&self) -> ConversationResult<()> {
        self.interrupt.interrupt();
        self.request(Command::Reset).await
    }

    pub async fn update_settings(&self, settings: Settings) -> ConversationResult<()> {
        self.request(|tx| Command::UpdateSettings(settings, tx))
            .await?
    }

    pub async fn add_rule(&self, rule: impl Into<String>) -> ConversationResult<Vec<String>> {
        let rule = rule.into();
        self.request(|tx| Command::AddRule(rule, tx)).await?
    }

    pub async fn replace_rules(&self, text: impl Into<String>) -> ConversationResult<Vec<String>> {
        let text = text.into();
        self.request(|tx| Command::ReplaceRules(text, tx)).await?
    }

    pub fn snapshot(&self) -> ConversationSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Current settings with secrets masked.
    pub fn settings(&self) -> Settings {
        self.settings.borrow().redacted()
    }

    pub fn rules(&self) -> Vec<String> {
        self.settings.borrow().custom_rules.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConversationEvent> {
        self.events.subscribe()
    }

    /// Resolves once the snapshot changes.
    pub async fn changed(&mut self) -> ConversationResult<ConversationSnapshot> {
        self.snapshot
            .changed()
            .await
            .map_err(|_| ConversationError::ServiceClosed)?;
        Ok(self.snapshot.borrow_and_update().clone())
    }
}
