//! Scripted collaborators for driving the orchestrator without a network.

#![allow(dead_code)]

use async_trait::async_trait;
use parley_core::{
    Credentials, DerivationTask, ParleyConfig, Reasoner, ReasoningError, ReasoningResult,
    ReplyRequest, Settings,
};
use parley_engine::{BackendFactory, Backends, ConversationResult, Orchestrator};
use parley_ticketing::{TableRecord, TicketingBackend, TicketingError, TicketingResult};
use parley_voice::{
    AudioClip, MemoryCapture, MemoryPlayback, SttBackend, TtsBackend, VoiceError, VoiceResult,
};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub enum Heard {
    Text(&'static str),
    Fail,
    /// Never answers; only a reset gets the turn out.
    Hang,
}

#[derive(Default)]
pub struct ScriptedStt {
    script: Mutex<VecDeque<Heard>>,
    pub calls: AtomicUsize,
}

impl ScriptedStt {
    pub fn push(&self, heard: Heard) {
        self.script.lock().unwrap().push_back(heard);
    }
}

#[async_trait]
impl SttBackend for ScriptedStt {
    async fn transcribe(&self, _clip: &AudioClip) -> VoiceResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Heard::Text(text)) => Ok(text.to_string()),
            Some(Heard::Fail) => Err(VoiceError::Stt("STT API error 500: boom".to_string())),
            Some(Heard::Hang) => std::future::pending().await,
            None => Ok(String::new()),
        }
    }
}

/// Speaks text back as the clip bytes so tests can read what was said.
#[derive(Default)]
pub struct RecordingTts {
    pub spoken: Mutex<Vec<String>>,
}

impl RecordingTts {
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

#[async_trait]
impl TtsBackend for RecordingTts {
    async fn synthesize(&self, text: &str) -> VoiceResult<AudioClip> {
        self.spoken.lock().unwrap().push(text.to_string());
        Ok(AudioClip::new(text.as_bytes().to_vec(), "audio/mpeg"))
    }
}

#[derive(Default)]
pub struct ScriptedReasoner {
    replies: Mutex<VecDeque<String>>,
    derivations: Mutex<Vec<(DerivationTask, String)>>,
    failing: Mutex<Vec<DerivationTask>>,
    pub requests: Mutex<Vec<ReplyRequest>>,
    pub derived: Mutex<Vec<DerivationTask>>,
}

impl ScriptedReasoner {
    pub fn reply(&self, text: &str) {
        self.replies.lock().unwrap().push_back(text.to_string());
    }

    pub fn derive_as(&self, task: DerivationTask, answer: &str) {
        self.derivations
            .lock()
            .unwrap()
            .push((task, answer.to_string()));
    }

    pub fn fail(&self, task: DerivationTask) {
        self.failing.lock().unwrap().push(task);
    }

    pub fn reply_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn derived(&self) -> Vec<DerivationTask> {
        self.derived.lock().unwrap().clone()
    }
}

#[async_trait]
impl Reasoner for ScriptedReasoner {
    async fn reply(&self, request: &ReplyRequest) -> ReasoningResult<String> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(ReasoningError::EmptyResponse)
    }

    async fn derive(&self, task: DerivationTask, _input: &str) -> ReasoningResult<String> {
        self.derived.lock().unwrap().push(task);
        if self.failing.lock().unwrap().contains(&task) {
            return Err(ReasoningError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        self.derivations
            .lock()
            .unwrap()
            .iter()
            .find(|(t, _)| *t == task)
            .map(|(_, answer)| answer.clone())
            .ok_or(ReasoningError::EmptyResponse)
    }
}

/// Table API that numbers records `{table}-{n}` and can refuse one table.
#[derive(Default)]
pub struct FakeTicketing {
    pub inserts: Mutex<Vec<(String, Value)>>,
    pub fail_table: Mutex<Option<&'static str>>,
}

impl FakeTicketing {
    pub fn tables(&self) -> Vec<String> {
        self.inserts
            .lock()
            .unwrap()
            .iter()
            .map(|(t, _)| t.clone())
            .collect()
    }

    pub fn body(&self, index: usize) -> Value {
        self.inserts.lock().unwrap()[index].1.clone()
    }
}

#[async_trait]
impl TicketingBackend for FakeTicketing {
    async fn insert(&self, table: &str, body: Value) -> TicketingResult<TableRecord> {
        let n = {
            let mut inserts = self.inserts.lock().unwrap();
            inserts.push((table.to_string(), body));
            inserts.len()
        };
        if *self.fail_table.lock().unwrap() == Some(table) {
            return Err(TicketingError::Status {
                table: table.to_string(),
                status: 403,
                body: "denied".to_string(),
            });
        }
        Ok(TableRecord {
            sys_id: format!("{table}-{n}"),
            number: None,
        })
    }

    async fn fetch(&self, _table: &str, sys_id: &str) -> TicketingResult<TableRecord> {
        Ok(TableRecord {
            sys_id: sys_id.to_string(),
            number: Some("HRC0001001".to_string()),
        })
    }
}

pub struct FakeFactory {
    backends: Backends,
    pub builds: AtomicUsize,
}

impl BackendFactory for FakeFactory {
    fn build(&self, _credentials: &Credentials) -> ConversationResult<Backends> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        Ok(self.backends.clone())
    }
}

pub fn complete_settings() -> Settings {
    Settings {
        api_key: "sk-test".to_string(),
        instance_name: "acme".to_string(),
        instance_password: "secret".to_string(),
        customer_name: "Acme Corp".to_string(),
        ..Settings::default()
    }
}

pub struct Harness {
    pub stt: Arc<ScriptedStt>,
    pub tts: Arc<RecordingTts>,
    pub reasoner: Arc<ScriptedReasoner>,
    pub ticketing: Arc<FakeTicketing>,
    pub factory: Arc<FakeFactory>,
    pub capture: Arc<MemoryCapture>,
    pub playback: Arc<MemoryPlayback>,
    pub config: Arc<ParleyConfig>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ParleyConfig::default())
    }

    pub fn with_config(config: ParleyConfig) -> Self {
        let stt = Arc::new(ScriptedStt::default());
        let tts = Arc::new(RecordingTts::default());
        let reasoner = Arc::new(ScriptedReasoner::default());
        let ticketing = Arc::new(FakeTicketing::default());
        let factory = Arc::new(FakeFactory {
            backends: Backends {
                stt: stt.clone(),
                tts: tts.clone(),
                reasoner: reasoner.clone(),
                ticketing: ticketing.clone(),
            },
            builds: AtomicUsize::new(0),
        });
        Self {
            stt,
            tts,
            reasoner,
            ticketing,
            factory,
            capture: Arc::new(MemoryCapture::new()),
            playback: Arc::new(MemoryPlayback::new()),
            config: Arc::new(config),
        }
    }

    /// Orchestrator with no settings at all.
    pub fn bare(&self) -> Orchestrator {
        Orchestrator::new(
            self.config.clone(),
            self.factory.clone(),
            self.capture.clone(),
            self.playback.clone(),
        )
    }

    pub fn orchestrator(&self) -> Orchestrator {
        self.bare().with_settings(complete_settings())
    }
}

pub fn clip() -> AudioClip {
    AudioClip::new(vec![0u8; 64], "audio/webm")
}
