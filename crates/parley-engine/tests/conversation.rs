//! Conversation flows end to end against scripted backends.

mod support;

use parley_core::{ConversationState, DerivationTask, ParleyConfig, Settings, Speaker};
use parley_engine::{spawn, ErrorKind, SessionStore, TurnOutcome};
use parley_voice::{AudioClip, CaptureDriver};
use std::sync::atomic::Ordering;
use std::time::Duration;
use support::{clip, complete_settings, Harness, Heard};

const LISTENING: TurnOutcome = TurnOutcome::Advanced {
    state: ConversationState::UserTalking,
};

fn assert_turn(turn: &parley_core::ConversationTurn, speaker: Speaker, text: &str) {
    assert_eq!(turn.speaker, speaker);
    assert_eq!(turn.text, text);
}

#[tokio::test]
async fn greeting_then_name_capture() {
    let h = Harness::new();
    let mut orch = h.orchestrator();
    h.stt.push(Heard::Text("My name is Alex"));
    h.reasoner.derive_as(DerivationTask::FirstName, "Alex");

    assert_eq!(orch.start().await, LISTENING);
    assert!(h.capture.is_recording());
    assert!(orch.session().turns().is_empty());

    h.capture.push(b"audio", "audio/webm");
    assert_eq!(orch.stop_recording().await, LISTENING);

    let turns = orch.session().turns();
    assert_eq!(turns.len(), 2);
    assert_turn(&turns[0], Speaker::User("Alex".into()), "My name is Alex");
    assert_turn(
        &turns[1],
        Speaker::Assistant,
        "Nice to meet you, Alex. How can I assist you today?",
    );
    assert_eq!(
        h.tts.spoken(),
        vec![
            "Hi, I'm Parley. To start off, please say your name.".to_string(),
            "Nice to meet you, Alex. How can I assist you today?".to_string(),
        ]
    );
    // name capture never asks for a reply
    assert_eq!(h.reasoner.reply_count(), 0);
    assert!(h.capture.is_recording());
}

#[tokio::test]
async fn name_falls_back_to_transcript() {
    let h = Harness::new();
    let mut orch = h.orchestrator();
    h.stt.push(Heard::Text("Sam"));
    h.reasoner.fail(DerivationTask::FirstName);

    orch.start().await;
    assert_eq!(orch.handle_utterance(clip()).await, LISTENING);
    assert_eq!(orch.session().user_name, "Sam");
}

async fn named(h: &Harness) -> parley_engine::Orchestrator {
    let mut orch = h.orchestrator();
    h.stt.push(Heard::Text("My name is Alex"));
    h.reasoner.derive_as(DerivationTask::FirstName, "Alex");
    orch.start().await;
    orch.handle_utterance(clip()).await;
    orch
}

fn script_case_fields(h: &Harness) {
    h.reasoner
        .derive_as(DerivationTask::ShortDescription, "Laptop screen broken");
    h.reasoner.derive_as(
        DerivationTask::TranslateToEnglish,
        "Alex: my laptop screen is broken",
    );
    h.reasoner
        .derive_as(DerivationTask::Summary, "Alex reports a broken laptop screen.");
    h.reasoner
        .derive_as(DerivationTask::ContactEmail, "I don't know");
}

#[tokio::test]
async fn reply_carries_history_and_settings() {
    let h = Harness::new();
    let mut orch = named(&h).await;
    h.stt.push(Heard::Text("What are your hours?"));
    h.reasoner.reply("We are open nine to five.");

    assert_eq!(orch.handle_utterance(clip()).await, LISTENING);

    let requests = h.reasoner.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].history.len(), 2);
    assert_eq!(requests[0].utterance, "What are your hours?");
    assert_eq!(requests[0].instance_name, "acme");
    assert_eq!(requests[0].customer_name, "Acme Corp");
    assert!(requests[0].system_prompt.ends_with("MESSAGE THREAD:"));

    let turns = orch.session().turns();
    assert_eq!(turns.len(), 4);
    assert_turn(&turns[3], Speaker::Assistant, "We are open nine to five.");
    assert!(h.ticketing.tables().is_empty());
}

#[tokio::test]
async fn repeated_words_later_in_the_session_get_a_fresh_reply() {
    let h = Harness::new();
    let mut orch = named(&h).await;
    h.stt.push(Heard::Text("What are your hours?"));
    h.stt.push(Heard::Text("What are your hours?"));
    h.reasoner.reply("We are open nine to five.");
    h.reasoner.reply("Still nine to five.");

    orch.handle_utterance(clip()).await;
    orch.handle_utterance(clip()).await;

    assert_eq!(h.reasoner.reply_count(), 2);
    let requests = h.reasoner.requests.lock().unwrap().clone();
    assert_eq!(requests[1].history.len(), 4);
    let turns = orch.session().turns();
    assert_turn(&turns[5], Speaker::Assistant, "Still nine to five.");
}

#[tokio::test]
async fn custom_rules_reach_the_prompt() {
    let h = Harness::new();
    let mut orch = named(&h).await;
    orch.add_rule("Always answer in one sentence.").unwrap();
    h.stt.push(Heard::Text("Hello"));
    h.reasoner.reply("Hi.");

    orch.handle_utterance(clip()).await;
    let prompt = h.reasoner.requests.lock().unwrap()[0].system_prompt.clone();
    assert!(prompt.contains("\n- Always answer in one sentence."));
}

#[tokio::test]
async fn open_case_runs_the_filing_in_order() {
    let h = Harness::new();
    let mut orch = named(&h).await;
    let mut events = orch.subscribe();
    script_case_fields(&h);
    h.stt
        .push(Heard::Text("Please open a case, my laptop screen is broken"));
    h.reasoner.reply("I can help with that.");

    assert_eq!(orch.handle_utterance(clip()).await, LISTENING);

    assert_eq!(
        h.ticketing.tables(),
        vec!["sys_user", "interaction", "sn_hr_core_case", "interaction_related_record"]
    );
    let identity = h.ticketing.body(0);
    assert_eq!(identity["first_name"], "Alex");
    assert_eq!(identity["last_name"], "Caller");
    let email = identity["email"].as_str().unwrap();
    assert!(email.starts_with("caller-") && email.ends_with("@example.com"));
    assert_eq!(h.ticketing.body(1)["opened_for"], "sys_user-1");
    assert_eq!(h.ticketing.body(1)["short_description"], "Laptop screen broken");
    assert_eq!(h.ticketing.body(2)["description"], "Alex reports a broken laptop screen.");
    assert_eq!(h.ticketing.body(3)["document_id"], "sn_hr_core_case-3");

    assert!(orch.session().case_opened());
    let last = orch.session().turns().last().unwrap();
    assert_turn(
        last,
        Speaker::Assistant,
        "Your case has been opened. Your case number is HRC0001001.",
    );
    let spoken = h.tts.spoken();
    assert!(spoken.contains(&"I can help with that.".to_string()));
    assert!(spoken
        .contains(&"Sure, I'm opening a case for you now. This will only take a moment.".to_string()));

    let mut opened = None;
    while let Ok(event) = events.try_recv() {
        if let parley_engine::ConversationEvent::CaseOpened { case_number, .. } = event {
            opened = Some(case_number);
        }
    }
    assert_eq!(opened.as_deref(), Some("HRC0001001"));
}

#[tokio::test]
async fn directive_opens_a_case_once_per_session() {
    let h = Harness::new();
    let mut orch = named(&h).await;
    script_case_fields(&h);
    h.stt.push(Heard::Text("My badge stopped working"));
    h.reasoner.reply("[OPEN_CASE] Let me file that for you.");
    h.stt.push(Heard::Text("Can you open a case for the printer too?"));
    h.reasoner.reply("[OPEN_CASE] Your case is already open.");

    orch.handle_utterance(clip()).await;
    assert!(orch.session().case_opened());
    assert_eq!(h.ticketing.tables().len(), 4);

    assert_eq!(orch.handle_utterance(clip()).await, LISTENING);
    assert_eq!(h.ticketing.tables().len(), 4);
    let last = orch.session().turns().last().unwrap();
    assert_turn(last, Speaker::Assistant, "Your case is already open.");
}

#[tokio::test]
async fn failed_step_apologises_and_leaves_case_closed() {
    let h = Harness::new();
    let mut orch = named(&h).await;
    script_case_fields(&h);
    *h.ticketing.fail_table.lock().unwrap() = Some("interaction");
    h.stt.push(Heard::Text("open a case please"));
    h.reasoner.reply("Okay.");

    assert_eq!(orch.handle_utterance(clip()).await, LISTENING);

    // identity created, interaction refused, nothing after
    assert_eq!(h.ticketing.tables(), vec!["sys_user", "interaction"]);
    assert!(!orch.session().case_opened());
    let last = orch.session().turns().last().unwrap();
    assert_turn(
        last,
        Speaker::Assistant,
        "I'm sorry, there was an error creating your case. Please try again later.",
    );
    assert!(orch.snapshot().status.is_some());
}

#[tokio::test]
async fn derivation_failure_files_nothing() {
    let h = Harness::new();
    let mut orch = named(&h).await;
    script_case_fields(&h);
    h.reasoner.fail(DerivationTask::Summary);
    h.stt.push(Heard::Text("open a case"));
    h.reasoner.reply("Sure.");

    assert_eq!(orch.handle_utterance(clip()).await, LISTENING);
    assert!(h.ticketing.tables().is_empty());
    assert!(!orch.session().case_opened());
}

#[tokio::test]
async fn end_marker_says_goodbye_and_resets() {
    let h = Harness::new();
    let mut orch = named(&h).await;
    h.stt.push(Heard::Text("That's all, thanks"));
    h.reasoner.reply("[END_CONVERSATION] Goodbye, Alex!");

    assert_eq!(orch.handle_utterance(clip()).await, TurnOutcome::Ended);

    assert_eq!(h.tts.spoken().last().map(String::as_str), Some("Goodbye, Alex!"));
    assert_eq!(orch.state(), ConversationState::Idle);
    assert!(orch.session().turns().is_empty());
    assert!(!orch.session().has_name());
    assert!(!h.capture.is_recording());
}

#[tokio::test]
async fn missing_settings_keep_the_conversation_idle() {
    let h = Harness::new();
    let mut orch = h.bare();

    match orch.start().await {
        TurnOutcome::Failed { status, kind } => {
            assert_eq!(kind, ErrorKind::Configuration);
            assert!(status.contains("api_key"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(orch.state(), ConversationState::Idle);
    assert!(h.tts.spoken().is_empty());
    assert_eq!(h.factory.builds.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn transcription_failure_goes_idle_and_keeps_history() {
    let h = Harness::new();
    let mut orch = named(&h).await;
    h.stt.push(Heard::Fail);

    match orch.handle_utterance(clip()).await {
        TurnOutcome::Failed { kind, .. } => assert_eq!(kind, ErrorKind::Transient),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(orch.state(), ConversationState::Idle);
    assert_eq!(orch.session().turns().len(), 2);
    assert!(orch.snapshot().status.is_some());
}

#[tokio::test]
async fn oversized_audio_is_rejected_before_transcription() {
    let mut config = ParleyConfig::default();
    config.conversation.max_audio_bytes = 16;
    let h = Harness::with_config(config);
    let mut orch = h.orchestrator();
    orch.start().await;

    let big = AudioClip::new(vec![0u8; 17], "audio/webm");
    assert!(matches!(
        orch.handle_utterance(big).await,
        TurnOutcome::Failed { .. }
    ));
    assert_eq!(h.stt.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn silence_goes_back_to_listening() {
    let h = Harness::new();
    let mut orch = h.orchestrator();
    orch.start().await;
    h.stt.push(Heard::Text("   "));

    assert_eq!(orch.handle_utterance(clip()).await, LISTENING);
    assert!(orch.session().turns().is_empty());
}

#[tokio::test]
async fn transitions_outside_their_state_are_ignored() {
    let h = Harness::new();
    let mut orch = h.orchestrator();

    assert_eq!(orch.stop_recording().await, TurnOutcome::Ignored);
    assert_eq!(orch.handle_utterance(clip()).await, TurnOutcome::Ignored);
    assert_eq!(orch.pause().await, TurnOutcome::Ignored);
    assert_eq!(orch.resume().await, TurnOutcome::Ignored);

    orch.start().await;
    assert_eq!(orch.start().await, TurnOutcome::Ignored);
    // recording but nothing pushed: keep listening
    assert_eq!(orch.stop_recording().await, TurnOutcome::Ignored);
    assert!(h.capture.is_recording());
    assert_eq!(h.tts.spoken().len(), 1);
}

#[tokio::test]
async fn pause_and_resume_toggle_capture() {
    let h = Harness::new();
    let mut orch = h.orchestrator();
    orch.start().await;
    assert!(h.capture.is_recording());

    assert_eq!(orch.pause().await, LISTENING);
    assert!(orch.is_paused());
    assert!(!h.capture.is_recording());
    assert_eq!(orch.pause().await, TurnOutcome::Ignored);

    assert_eq!(orch.resume().await, LISTENING);
    assert!(!orch.is_paused());
    assert!(h.capture.is_recording());
}

#[tokio::test]
async fn reset_clears_everything() {
    let h = Harness::new();
    let mut orch = named(&h).await;
    orch.pause().await;

    orch.reset().await;
    let snapshot = orch.snapshot();
    assert_eq!(snapshot.state, ConversationState::Idle);
    assert!(snapshot.history.is_empty());
    assert!(snapshot.user_name.is_empty());
    assert!(!snapshot.paused);
    assert!(!h.capture.is_recording());
    assert!(h.playback.stop_count() > 0);
    // the next start begins a fresh session
    assert_eq!(orch.start().await, LISTENING);
}

#[tokio::test]
async fn settings_update_keeps_rules_and_rebuilds_backends() {
    let h = Harness::new();
    let mut orch = h.orchestrator();
    orch.replace_rules("Be brief.\n\nBe kind.").unwrap();
    orch.start().await;
    assert_eq!(h.factory.builds.load(Ordering::SeqCst), 1);

    let mut next = complete_settings();
    next.customer_name = "Globex".to_string();
    orch.update_settings(next).unwrap();
    assert_eq!(orch.rules(), ["Be brief.", "Be kind."]);
    assert_eq!(orch.settings().customer_name, "Globex");

    assert!(orch.update_settings(Settings::default()).is_err());
    assert_eq!(orch.settings().customer_name, "Globex");

    orch.reset().await;
    orch.start().await;
    assert_eq!(h.factory.builds.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn history_and_settings_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let h = Harness::new();
    {
        let mut orch = h
            .bare()
            .with_store(SessionStore::new(dir.path()))
            .unwrap();
        orch.update_settings(complete_settings()).unwrap();
        h.stt.push(Heard::Text("I'm Alex"));
        h.reasoner.derive_as(DerivationTask::FirstName, "Alex");
        orch.start().await;
        orch.handle_utterance(clip()).await;
    }

    let restored = h
        .bare()
        .with_store(SessionStore::new(dir.path()))
        .unwrap();
    assert_eq!(restored.settings().api_key, "sk-test");
    assert_eq!(restored.session().user_name, "Alex");
    assert_eq!(restored.session().turns().len(), 2);
    assert_eq!(restored.state(), ConversationState::Idle);
}

#[tokio::test]
async fn corrupt_history_starts_empty_and_keeps_settings() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path());
    store.save_settings(&complete_settings()).unwrap();
    std::fs::write(dir.path().join("history.json"), "[{\"speaker\": {\"User\": \"Al").unwrap();

    let h = Harness::new();
    let mut orch = h.bare().with_store(SessionStore::new(dir.path())).unwrap();
    assert!(orch.session().turns().is_empty());
    assert_eq!(orch.settings().customer_name, complete_settings().customer_name);

    // the next write replaces the damaged file
    h.stt.push(Heard::Text("I'm Alex"));
    h.reasoner.derive_as(DerivationTask::FirstName, "Alex");
    orch.start().await;
    orch.handle_utterance(clip()).await;
    assert_eq!(store.load_history().unwrap().len(), 2);
}

#[tokio::test]
async fn reset_aborts_a_hanging_transcription() {
    let h = Harness::new();
    let handle = spawn(h.orchestrator());
    assert_eq!(handle.start().await.unwrap(), LISTENING);

    h.stt.push(Heard::Hang);
    let submitter = handle.clone();
    let pending = tokio::spawn(async move { submitter.submit_audio(clip()).await });

    let mut watcher = handle.clone();
    while watcher.snapshot().state != ConversationState::Processing {
        tokio::time::timeout(Duration::from_secs(5), watcher.changed())
            .await
            .expect("turn never started")
            .unwrap();
    }

    handle.reset().await.unwrap();
    let outcome = tokio::time::timeout(Duration::from_secs(5), pending)
        .await
        .expect("transcription was not aborted")
        .unwrap()
        .unwrap();
    assert_eq!(outcome, TurnOutcome::Cancelled);

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.state, ConversationState::Idle);
    assert!(snapshot.history.is_empty());
    assert!(snapshot.status.is_none());
}

#[tokio::test]
async fn handle_exposes_redacted_settings_and_rules() {
    let h = Harness::new();
    let handle = spawn(h.orchestrator());

    assert_eq!(
        handle.add_rule("Never promise refunds.").await.unwrap(),
        vec!["Never promise refunds.".to_string()]
    );
    assert!(handle.add_rule("   ").await.is_err());
    assert_eq!(handle.rules(), vec!["Never promise refunds.".to_string()]);

    let shown = handle.settings();
    assert_ne!(shown.api_key, "sk-test");
    assert_eq!(shown.customer_name, "Acme Corp");
}
