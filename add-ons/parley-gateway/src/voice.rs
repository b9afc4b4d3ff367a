//! Local voice mode (`--voice`): microphone capture with turn detection and speaker
//! playback, wired into the same conversation service the HTTP routes use.

use crate::AppState;
use parley_core::ParleyConfig;
use parley_engine::{
    spawn, ConversationError, ConversationResult, HttpBackendFactory, Orchestrator, SessionStore,
};
use parley_voice::{DeviceCapture, DevicePlayback, TurnConfig, VadConfig};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub fn device_state(
    config: Arc<ParleyConfig>,
    factory: Arc<HttpBackendFactory>,
    store: SessionStore,
) -> ConversationResult<AppState> {
    let (capture, mut utterances) = DeviceCapture::new(VadConfig::default(), TurnConfig::default());
    let playback = DevicePlayback::new().map_err(ConversationError::Playback)?;
    let orchestrator = Orchestrator::new(
        config.clone(),
        factory,
        Arc::new(capture),
        Arc::new(playback),
    )
    .with_store(store)?;
    let conversation = spawn(orchestrator);

    // committed turns from the microphone become utterances
    let forward = conversation.clone();
    tokio::spawn(async move {
        while let Some(clip) = utterances.recv().await {
            match forward.submit_audio(clip).await {
                Ok(outcome) => debug!(target: "parley::voice", ?outcome, "utterance handled"),
                Err(e) => {
                    warn!(target: "parley::voice", error = %e, "conversation service gone");
                    break;
                }
            }
        }
    });

    info!(target: "parley::voice", "local microphone and speakers enabled");
    Ok(AppState {
        conversation,
        speech: None,
        config,
    })
}
