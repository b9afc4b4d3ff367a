//! Audio clips and the capture/playback driver seam.
//!
//! Capture and playback are exclusive resources: starting capture while already capturing
//! does nothing, and starting playback replaces whatever is playing.

use crate::error::VoiceResult;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// One encoded piece of audio (a recorded utterance or synthesized speech).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub bytes: Vec<u8>,
    /// MIME type, e.g. `audio/webm` or `audio/mpeg`.
    pub content_type: String,
}

impl AudioClip {
    pub fn new(bytes: Vec<u8>, content_type: impl Into<String>) -> Self {
        Self {
            bytes,
            content_type: content_type.into(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), "application/octet-stream")
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Upload file name matching the content type (transcription APIs sniff the extension).
    pub fn file_name(&self) -> &'static str {
        let mime = self
            .content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim();
        match mime {
            "audio/wav" | "audio/x-wav" | "audio/wave" => "recording.wav",
            "audio/mpeg" | "audio/mp3" => "recording.mp3",
            "audio/ogg" => "recording.ogg",
            "audio/mp4" | "audio/m4a" | "audio/x-m4a" => "recording.m4a",
            "audio/flac" => "recording.flac",
            _ => "recording.webm",
        }
    }

    /// Encode mono f32 PCM as 16-bit WAV.
    pub fn wav_from_pcm(samples: &[f32], sample_rate: u32) -> VoiceResult<Self> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
            for &s in samples {
                let clamped = s.clamp(-1.0, 1.0);
                writer.write_sample((clamped * 32767.0).round() as i16)?;
            }
            writer.finalize()?;
        }
        Ok(Self::new(cursor.into_inner(), "audio/wav"))
    }
}

/// Microphone side.
#[async_trait]
pub trait CaptureDriver: Send + Sync {
    /// Begin recording. No-op when already recording.
    async fn start(&self) -> VoiceResult<()>;

    /// Stop recording and hand back whatever was buffered. `None` when not recording or
    /// nothing was captured.
    async fn stop(&self) -> VoiceResult<Option<AudioClip>>;

    fn is_recording(&self) -> bool;
}

/// Speaker side.
#[async_trait]
pub trait PlaybackDriver: Send + Sync {
    /// Play `clip`, replacing anything currently playing. Resolves when playback finishes
    /// or is stopped.
    async fn play(&self, clip: AudioClip) -> VoiceResult<()>;

    fn stop(&self);

    fn is_playing(&self) -> bool;
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
struct CaptureBuffer {
    recording: bool,
    bytes: Vec<u8>,
    content_type: Option<String>,
}

/// Capture driver fed from outside (an HTTP upload, a test). Audio pushed while not
/// recording is dropped.
#[derive(Debug, Default)]
pub struct MemoryCapture {
    inner: Mutex<CaptureBuffer>,
}

impl MemoryCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append recorded bytes. Returns `false` when the driver is not recording.
    pub fn push(&self, bytes: &[u8], content_type: &str) -> bool {
        let mut buf = lock(&self.inner);
        if !buf.recording {
            return false;
        }
        buf.bytes.extend_from_slice(bytes);
        buf.content_type.get_or_insert_with(|| content_type.to_string());
        true
    }
}

#[async_trait]
impl CaptureDriver for MemoryCapture {
    async fn start(&self) -> VoiceResult<()> {
        let mut buf = lock(&self.inner);
        if buf.recording {
            return Ok(());
        }
        buf.recording = true;
        buf.bytes.clear();
        buf.content_type = None;
        debug!("memory capture started");
        Ok(())
    }

    async fn stop(&self) -> VoiceResult<Option<AudioClip>> {
        let mut buf = lock(&self.inner);
        if !buf.recording {
            return Ok(None);
        }
        buf.recording = false;
        let bytes = std::mem::take(&mut buf.bytes);
        let content_type = buf
            .content_type
            .take()
            .unwrap_or_else(|| "audio/webm".to_string());
        debug!(bytes = bytes.len(), "memory capture stopped");
        if bytes.is_empty() {
            return Ok(None);
        }
        Ok(Some(AudioClip::new(bytes, content_type)))
    }

    fn is_recording(&self) -> bool {
        lock(&self.inner).recording
    }
}

/// Clips kept for remote clients before the oldest is dropped.
pub const CLIP_BACKLOG: usize = 32;

/// Playback driver that "plays" instantly and queues each clip, numbered in order, for a
/// remote client to fetch and play itself. Stopping does not drop queued clips: a goodbye
/// spoken right before a reset still has to reach the client.
#[derive(Debug, Default)]
pub struct MemoryPlayback {
    clips: Mutex<VecDeque<(u64, AudioClip)>>,
    seq: AtomicU64,
    stops: AtomicU64,
    playing: AtomicBool,
}

impl MemoryPlayback {
    pub fn new() -> Self {
        Self::default()
    }

    /// The first queued clip numbered after `after`, with the count of clips still queued
    /// behind it. Sequence numbers start at 1.
    pub fn clip_after(&self, after: u64) -> Option<(u64, AudioClip, usize)> {
        let clips = lock(&self.clips);
        let index = clips.iter().position(|(seq, _)| *seq > after)?;
        let (seq, clip) = clips[index].clone();
        Some((seq, clip, clips.len() - index - 1))
    }

    /// Sequence number of the newest clip, 0 before anything was played.
    pub fn latest_seq(&self) -> u64 {
        self.seq.load(Ordering::SeqCst)
    }

    /// Queued clips, oldest first.
    pub fn played(&self) -> Vec<AudioClip> {
        lock(&self.clips).iter().map(|(_, clip)| clip.clone()).collect()
    }

    pub fn stop_count(&self) -> u64 {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlaybackDriver for MemoryPlayback {
    async fn play(&self, clip: AudioClip) -> VoiceResult<()> {
        self.playing.store(true, Ordering::SeqCst);
        {
            let mut clips = lock(&self.clips);
            let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
            clips.push_back((seq, clip));
            if clips.len() > CLIP_BACKLOG {
                clips.pop_front();
            }
        }
        self.playing.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.playing.store(false, Ordering::SeqCst);
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }
}
