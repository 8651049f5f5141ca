use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::{self, JoinHandle};

use log::{debug, error, info};

use crate::audio::backend::native::SymphoniaBackend;
use crate::audio::backend::MediaBackend;
use crate::audio::command::{command_queue, CommandReceiver, CommandSender, DecoderCommand};
use crate::audio::engine::{self, DecodeSession, Shared};
use crate::audio::source::{ByteSource, FileSource};
use crate::config::DecoderConfig;
use crate::error::{DecoderError, SetupError};
use crate::logging;
use crate::models::{DecodedFrame, DecoderState, DecoderStatus, OUTPUT_CHANNELS};

/// Everything `start()` consumes
struct PendingStart {
    source: Box<dyn ByteSource>,
    extension: Option<String>,
    backend: Arc<dyn MediaBackend>,
    commands: CommandReceiver<DecoderCommand>,
}

#[derive(Debug, Clone, Copy)]
struct StreamProperties {
    sample_rate: u32,
    duration_ms: f64,
}

/// Background decoder for one audio stream.
///
/// After [`StreamDecoder::start`] a dedicated thread keeps a small buffer of
/// normalized stereo frames filled; the consumer drains it with
/// [`StreamDecoder::drain_frames`]. All methods take `&self` so the decoder can be
/// shared behind an `Arc`.
pub struct StreamDecoder {
    shared: Arc<Shared>,
    commands: CommandSender<DecoderCommand>,
    pending: Mutex<Option<PendingStart>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    properties: OnceLock<StreamProperties>,
    config: DecoderConfig,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl StreamDecoder {
    /// Decode a local file
    pub fn open<P: AsRef<Path>>(path: P, config: DecoderConfig) -> Result<Self, DecoderError> {
        let path = path.as_ref();
        let source = FileSource::open(path)?;
        let extension = path.extension().and_then(|ext| ext.to_str());
        Self::from_source(Box::new(source), extension, config)
    }

    /// Decode any byte source; `extension` is a format hint such as `"flac"`
    pub fn from_source(
        source: Box<dyn ByteSource>,
        extension: Option<&str>,
        config: DecoderConfig,
    ) -> Result<Self, DecoderError> {
        Self::with_backend(source, extension, Arc::new(SymphoniaBackend::new()), config)
    }

    pub fn with_backend(
        source: Box<dyn ByteSource>,
        extension: Option<&str>,
        backend: Arc<dyn MediaBackend>,
        config: DecoderConfig,
    ) -> Result<Self, DecoderError> {
        config.validate()?;

        let (sender, receiver) = command_queue();
        Ok(Self {
            shared: Arc::new(Shared::new(&config)),
            commands: sender,
            pending: Mutex::new(Some(PendingStart {
                source,
                extension: extension.map(str::to_string),
                backend,
                commands: receiver,
            })),
            thread: Mutex::new(None),
            properties: OnceLock::new(),
            config,
        })
    }

    /// Open the input, select a decoder and launch the decode thread.
    ///
    /// Only the first call does anything. A setup fault leaves the decoder in
    /// `Faulted`; it has to be discarded.
    pub fn start(&self) -> Result<(), DecoderError> {
        let PendingStart {
            source,
            extension,
            backend,
            commands,
        } = lock(&self.pending).take().ok_or(SetupError::AlreadyStarted)?;

        let session = match DecodeSession::prepare(
            backend,
            source,
            extension.as_deref(),
            &self.config,
            self.shared.clone(),
            self.commands.clone(),
        ) {
            Ok(session) => session,
            Err(e) => {
                self.shared.set_state(DecoderState::Faulted);
                let err = DecoderError::from(e);
                logging::report("Failed to start decoding", err.severity(), &err);
                return Err(err);
            }
        };

        let _ = self.properties.set(StreamProperties {
            sample_rate: session.sample_rate(),
            duration_ms: session.duration_ms(),
        });

        let handle = thread::Builder::new()
            .name("audio-decode".to_string())
            .spawn(move || engine::run(session, commands))
            .map_err(|e| {
                self.shared.set_state(DecoderState::Faulted);
                error!("Failed to spawn decode thread: {}", e);
                e
            })?;
        *lock(&self.thread) = Some(handle);

        info!(
            "Decoding started ({} Hz, {:.1}s)",
            self.sample_rate(),
            self.duration_ms() / 1000.0
        );
        Ok(())
    }

    fn is_started(&self) -> bool {
        lock(&self.thread).is_some()
    }

    /// Move playback to `target_ms`.
    ///
    /// Buffered frames are dropped immediately. With `wait` the call returns only
    /// once the decode thread has repositioned, which requires a started decoder.
    pub fn seek(&self, target_ms: f64, wait: bool) -> Result<(), DecoderError> {
        if wait && !self.is_started() {
            return Err(DecoderError::NotStarted);
        }
        let target_ms = if target_ms.is_finite() { target_ms.max(0.0) } else { 0.0 };
        debug!("Seek to {:.1} ms requested (wait: {})", target_ms, wait);
        engine::request_seek(&self.shared, &self.commands, target_ms, wait)?;
        Ok(())
    }

    /// Take every buffered frame, oldest first
    pub fn drain_frames(&self) -> Vec<DecodedFrame> {
        self.shared.frames.drain()
    }

    /// Give back an unconsumed frame; it is appended after anything buffered
    pub fn return_frame(&self, frame: DecodedFrame) {
        self.shared.frames.push_back(frame);
    }

    pub fn return_frames(&self, frames: Vec<DecodedFrame>) {
        self.shared.frames.extend(frames);
    }

    /// Hand a consumed frame's storage back for reuse
    pub fn recycle_frame(&self, frame: DecodedFrame) {
        self.shared.pool.recycle(frame.into_samples());
    }

    pub fn state(&self) -> DecoderState {
        self.shared.state()
    }

    /// True only while packets are actively being decoded.
    ///
    /// A decoder parked on a full buffer or waiting for input is `Ready`,
    /// which does not count.
    pub fn is_running(&self) -> bool {
        self.state() == DecoderState::Running
    }

    /// Timestamp of the newest decoded frame, or the last seek target
    pub fn last_decoded_frame_ms(&self) -> f64 {
        self.shared.last_frame_ms()
    }

    pub fn duration_ms(&self) -> f64 {
        self.properties.get().map_or(0.0, |p| p.duration_ms)
    }

    pub fn sample_rate(&self) -> u32 {
        self.properties.get().map_or(0, |p| p.sample_rate)
    }

    /// Always stereo once a stream has been opened
    pub fn channel_count(&self) -> u16 {
        if self.properties.get().is_some() {
            OUTPUT_CHANNELS as u16
        } else {
            0
        }
    }

    pub fn buffered_frames(&self) -> usize {
        self.shared.frames.len()
    }

    pub fn buffer_capacity(&self) -> usize {
        self.shared.frames.capacity()
    }

    pub fn hw_decoding_allowed(&self) -> bool {
        self.shared.hw_allowed()
    }

    /// Whether a seek is still waiting to be applied by the decode thread
    pub fn is_discarding(&self) -> bool {
        self.shared.skip.is_discarding()
    }

    pub fn looping(&self) -> bool {
        self.shared.is_looping()
    }

    pub fn set_looping(&self, looping: bool) {
        self.shared.set_looping(looping);
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn status(&self) -> DecoderStatus {
        DecoderStatus {
            state: self.state(),
            last_decoded_frame_ms: self.last_decoded_frame_ms(),
            duration_ms: self.duration_ms(),
            sample_rate: self.sample_rate(),
            channels: self.channel_count(),
            buffered_frames: self.buffered_frames(),
            hw_decoding_allowed: self.hw_decoding_allowed(),
            looping: self.looping(),
        }
    }

    /// Stop the decode thread and wait for it to release its resources
    pub fn shutdown(&self) {
        self.shared.request_abort();
        let handle = lock(&self.thread).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Decode thread panicked");
            }
        }
    }
}

impl Drop for StreamDecoder {
    fn drop(&mut self) {
        self.shutdown();
    }
}
