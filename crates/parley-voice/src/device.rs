//! Local microphone and speaker drivers.
//!
//! cpal and rodio streams are not `Send`, so each driver owns a dedicated thread that
//! holds the stream and talks to the async side over channels.

use crate::audio::{AudioClip, CaptureDriver, PlaybackDriver};
use crate::error::{VoiceError, VoiceResult};
use crate::turn::{TurnConfig, TurnEvent, TurnManager};
use crate::vad::{VadConfig, VadDetector};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use rodio::{OutputStream, OutputStreamHandle, Sink, Source};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self as std_mpsc, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

const POLL: Duration = Duration::from_millis(20);

struct CaptureWorker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<VoiceResult<Option<AudioClip>>>,
}

/// Microphone capture with VAD turn detection. A committed turn is sent on the
/// utterance channel and capture ends; `stop` returns the partial turn instead.
pub struct DeviceCapture {
    vad_config: VadConfig,
    turn_config: TurnConfig,
    utterances: mpsc::UnboundedSender<AudioClip>,
    recording: Arc<AtomicBool>,
    worker: Mutex<Option<CaptureWorker>>,
}

impl DeviceCapture {
    pub fn new(
        vad_config: VadConfig,
        turn_config: TurnConfig,
    ) -> (Self, mpsc::UnboundedReceiver<AudioClip>) {
        let (utterances, rx) = mpsc::unbounded_channel();
        let capture = Self {
            vad_config,
            turn_config,
            utterances,
            recording: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        };
        (capture, rx)
    }

    fn take_worker(&self) -> Option<CaptureWorker> {
        self.worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

#[async_trait]
impl CaptureDriver for DeviceCapture {
    async fn start(&self) -> VoiceResult<()> {
        if self.recording.load(Ordering::SeqCst) {
            return Ok(());
        }
        // reap a worker that finished on its own after committing a turn
        if let Some(old) = self.take_worker() {
            old.stop.store(true, Ordering::SeqCst);
            let _ = tokio::task::spawn_blocking(move || old.handle.join()).await;
        }

        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = oneshot::channel();
        let ctx = CaptureContext {
            stop: stop.clone(),
            recording: self.recording.clone(),
            vad_config: self.vad_config.clone(),
            turn_config: self.turn_config.clone(),
            utterances: self.utterances.clone(),
        };
        self.recording.store(true, Ordering::SeqCst);
        let handle = std::thread::Builder::new()
            .name("parley-capture".to_string())
            .spawn(move || ctx.run(ready_tx))?;
        *self
            .worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(CaptureWorker { stop, handle });

        match ready_rx.await {
            Ok(result) => result,
            Err(_) => Err(VoiceError::AudioDevice(
                "capture thread exited during setup".to_string(),
            )),
        }
    }

    async fn stop(&self) -> VoiceResult<Option<AudioClip>> {
        let Some(worker) = self.take_worker() else {
            return Ok(None);
        };
        worker.stop.store(true, Ordering::SeqCst);
        let joined = tokio::task::spawn_blocking(move || worker.handle.join())
            .await
            .map_err(|e| VoiceError::AudioStream(e.to_string()))?;
        self.recording.store(false, Ordering::SeqCst);
        joined.map_err(|_| VoiceError::AudioStream("capture thread panicked".to_string()))?
    }

    fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }
}

struct CaptureContext {
    stop: Arc<AtomicBool>,
    recording: Arc<AtomicBool>,
    vad_config: VadConfig,
    turn_config: TurnConfig,
    utterances: mpsc::UnboundedSender<AudioClip>,
}

impl CaptureContext {
    fn run(self, ready: oneshot::Sender<VoiceResult<()>>) -> VoiceResult<Option<AudioClip>> {
        let result = self.capture(ready);
        self.recording.store(false, Ordering::SeqCst);
        result
    }

    fn capture(&self, ready: oneshot::Sender<VoiceResult<()>>) -> VoiceResult<Option<AudioClip>> {
        let (stream, chunks, mut vad) = match self.open_stream() {
            Ok(opened) => {
                let _ = ready.send(Ok(()));
                opened
            }
            Err(e) => {
                let _ = ready.send(Err(VoiceError::AudioDevice(e.to_string())));
                return Err(e);
            }
        };
        let sample_rate = vad.sample_rate();
        let (mut turns, mut events) = TurnManager::new(self.turn_config.clone());
        info!(sample_rate, "microphone capture started");

        loop {
            if self.stop.load(Ordering::SeqCst) {
                drop(stream);
                let samples = turns.take_buffer();
                debug!(samples = samples.len(), "microphone capture stopped");
                if samples.is_empty() {
                    return Ok(None);
                }
                return AudioClip::wav_from_pcm(&samples, sample_rate).map(Some);
            }

            let chunk = match chunks.recv_timeout(POLL) {
                Ok(chunk) => chunk,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(VoiceError::AudioStream("input stream closed".to_string()))
                }
            };
            let speech = vad.is_speech(&chunk)?;
            turns.process_vad_result(speech, &chunk)?;

            while let Ok(event) = events.try_recv() {
                if let TurnEvent::TurnCommitted { audio_samples, .. } = event {
                    drop(stream);
                    let clip = AudioClip::wav_from_pcm(&audio_samples, sample_rate)?;
                    self.utterances
                        .send(clip)
                        .map_err(|e| VoiceError::ChannelSend(e.to_string()))?;
                    return Ok(None);
                }
            }
        }
    }

    fn open_stream(&self) -> VoiceResult<(cpal::Stream, std_mpsc::Receiver<Vec<f32>>, VadDetector)> {
        let vad = VadDetector::new(self.vad_config.clone())?;
        let chunk_size = vad.chunk_size();

        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| VoiceError::AudioDevice("No input device available".to_string()))?;
        let stream_config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(vad.sample_rate()),
            buffer_size: cpal::BufferSize::Default,
        };

        let (chunk_tx, chunk_rx) = std_mpsc::channel();
        let mut pending: Vec<f32> = Vec::with_capacity(chunk_size);
        let stream = device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                for &sample in data {
                    pending.push(sample);
                    if pending.len() >= chunk_size {
                        let full = std::mem::replace(&mut pending, Vec::with_capacity(chunk_size));
                        if chunk_tx.send(full).is_err() {
                            return;
                        }
                    }
                }
            },
            move |err| {
                warn!(%err, "audio stream error");
            },
            None,
        )?;
        stream.play()?;
        Ok((stream, chunk_rx, vad))
    }
}

enum PlaybackCommand {
    Play(AudioClip, oneshot::Sender<VoiceResult<()>>),
    Stop,
}

/// Speaker output through rodio. A new clip stops the current one.
pub struct DevicePlayback {
    commands: Mutex<std_mpsc::Sender<PlaybackCommand>>,
    playing: Arc<AtomicBool>,
}

impl DevicePlayback {
    pub fn new() -> VoiceResult<Self> {
        let (tx, rx) = std_mpsc::channel();
        let (ready_tx, ready_rx) = std_mpsc::channel();
        let playing = Arc::new(AtomicBool::new(false));
        let flag = playing.clone();
        std::thread::Builder::new()
            .name("parley-playback".to_string())
            .spawn(move || playback_loop(rx, flag, ready_tx))?;
        ready_rx
            .recv()
            .map_err(|e| VoiceError::Playback(e.to_string()))??;
        info!("speaker output ready");
        Ok(Self {
            commands: Mutex::new(tx),
            playing,
        })
    }

    fn send(&self, cmd: PlaybackCommand) -> VoiceResult<()> {
        self.commands
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .send(cmd)
            .map_err(|_| VoiceError::Playback("playback thread has exited".to_string()))
    }
}

#[async_trait]
impl PlaybackDriver for DevicePlayback {
    async fn play(&self, clip: AudioClip) -> VoiceResult<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(PlaybackCommand::Play(clip, done_tx))?;
        done_rx
            .await
            .map_err(|_| VoiceError::Playback("playback thread dropped the clip".to_string()))?
    }

    fn stop(&self) {
        if self.send(PlaybackCommand::Stop).is_err() {
            warn!("stop requested but playback thread has exited");
        }
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }
}

fn open_sink(handle: &OutputStreamHandle, clip: AudioClip) -> VoiceResult<Sink> {
    let sink = Sink::try_new(handle).map_err(|e| VoiceError::Playback(e.to_string()))?;
    if !clip.is_empty() {
        let source = rodio::Decoder::new(Cursor::new(clip.bytes))
            .map_err(|e| VoiceError::Playback(format!("Decode failed: {}", e)))?;
        sink.append(source.convert_samples::<f32>());
    }
    Ok(sink)
}

fn playback_loop(
    commands: std_mpsc::Receiver<PlaybackCommand>,
    playing: Arc<AtomicBool>,
    ready: std_mpsc::Sender<VoiceResult<()>>,
) {
    let (_stream, handle) = match OutputStream::try_default() {
        Ok(pair) => {
            let _ = ready.send(Ok(()));
            pair
        }
        Err(e) => {
            let _ = ready.send(Err(VoiceError::Playback(e.to_string())));
            return;
        }
    };

    let mut next: Option<(AudioClip, oneshot::Sender<VoiceResult<()>>)> = None;
    loop {
        let (clip, done) = match next.take() {
            Some(queued) => queued,
            None => match commands.recv() {
                Ok(PlaybackCommand::Play(clip, done)) => (clip, done),
                Ok(PlaybackCommand::Stop) => continue,
                Err(_) => return,
            },
        };

        let sink = match open_sink(&handle, clip) {
            Ok(sink) => sink,
            Err(e) => {
                let _ = done.send(Err(e));
                continue;
            }
        };
        playing.store(true, Ordering::SeqCst);

        let mut closed = false;
        while !sink.empty() {
            match commands.recv_timeout(POLL) {
                Ok(PlaybackCommand::Stop) => {
                    sink.stop();
                    break;
                }
                Ok(PlaybackCommand::Play(clip, done)) => {
                    sink.stop();
                    next = Some((clip, done));
                    break;
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    sink.stop();
                    closed = true;
                    break;
                }
            }
        }

        playing.store(false, Ordering::SeqCst);
        let _ = done.send(Ok(()));
        if closed {
            return;
        }
    }
}
