//! # parley-voice
//!
//! Audio in and out for the Parley conversation engine.
//!
//! ```text
//!  capture driver ──> AudioClip ──> SttBackend ──> transcript
//!  reply text ──> TtsBackend ──> AudioClip ──> playback driver
//! ```
//!
//! The drivers are traits so the engine can run against in-memory drivers (HTTP gateway,
//! tests) or, with the `device` feature, the local microphone and speakers.

pub mod audio;
pub mod error;
pub mod stt;
pub mod turn;
pub mod voice_output;

#[cfg(feature = "device")]
pub mod device;
#[cfg(feature = "device")]
pub mod vad;

pub use audio::{
    AudioClip, CaptureDriver, MemoryCapture, MemoryPlayback, PlaybackDriver, CLIP_BACKLOG,
};
pub use error::{VoiceError, VoiceResult};
pub use stt::{OpenAiStt, SttBackend};
pub use turn::{TurnConfig, TurnEvent, TurnManager};
pub use voice_output::{OpenAiTts, TtsBackend};

#[cfg(feature = "device")]
pub use device::{DeviceCapture, DevicePlayback};
#[cfg(feature = "device")]
pub use vad::{VadConfig, VadDetector};
