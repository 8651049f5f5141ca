//! Background decode loop.
//!
//! One [`DecodeSession`] owns the demuxer and codec and runs on a dedicated
//! thread. Everything the consumer may touch concurrently lives in [`Shared`].

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use symphonia::core::formats::Packet;

use crate::audio::backend::{CodecContext, Demuxer, MediaBackend, StreamInfo, StreamKind};
use crate::audio::buffer::{FrameBuffer, FramePool};
use crate::audio::command::{CommandReceiver, CommandSender, DecoderCommand};
use crate::audio::normalizer::{into_output_samples, FrameNormalizer};
use crate::audio::selection::{available_decoders, HardwareKind};
use crate::audio::source::{ByteSource, MediaSourceAdapter};
use crate::config::DecoderConfig;
use crate::error::{BackendError, CommandError, ErrorSeverity, SetupError};
use crate::logging;
use crate::models::{DecodedFrame, DecoderState};

/// Frames decoded before a seek target, or while a seek is in flight, are dropped.
///
/// The threshold only moves on the decode thread; the discard flag is raised by
/// whichever thread requests a seek and lowered once the decode thread has
/// repositioned for the newest request. Each raise starts a new seek generation,
/// packed with the flag into one word (`generation << 1 | discarding`).
#[derive(Debug)]
pub struct SkipWindow {
    threshold_ms: AtomicU64,
    seek_state: AtomicU64,
}

impl Default for SkipWindow {
    fn default() -> Self {
        Self {
            threshold_ms: AtomicU64::new(f64::NEG_INFINITY.to_bits()),
            seek_state: AtomicU64::new(0),
        }
    }
}

impl SkipWindow {
    pub fn threshold_ms(&self) -> f64 {
        f64::from_bits(self.threshold_ms.load(Ordering::Acquire))
    }

    pub fn is_discarding(&self) -> bool {
        self.seek_state.load(Ordering::Acquire) & 1 == 1
    }

    /// Generation of the most recent seek request
    pub fn generation(&self) -> u64 {
        self.seek_state.load(Ordering::Acquire) >> 1
    }

    /// Start discarding under a new generation, which is returned
    fn raise_discard(&self) -> u64 {
        let previous = self.seek_state.fetch_add(2, Ordering::AcqRel);
        self.seek_state.fetch_or(1, Ordering::AcqRel);
        (previous >> 1).wrapping_add(1)
    }

    /// Repositioning for `generation` done: skip up to `target_ms` and stop
    /// discarding, unless a newer seek has been requested since.
    ///
    /// Returns false when the request was superseded.
    fn reposition(&self, target_ms: f64, generation: u64) -> bool {
        if self.generation() != generation {
            return false;
        }
        self.threshold_ms.store(target_ms.to_bits(), Ordering::Release);
        let raised = (generation << 1) | 1;
        let lowered = generation << 1;
        match self
            .seek_state
            .compare_exchange(raised, lowered, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => true,
            // Already lowered for this generation, e.g. a repeated command.
            Err(current) => current == lowered,
        }
    }

    /// Whether a frame at `time_ms` is kept; clears the threshold once passed
    fn admits(&self, time_ms: f64) -> bool {
        if self.is_discarding() || time_ms < self.threshold_ms() {
            return false;
        }
        self.threshold_ms
            .store(f64::NEG_INFINITY.to_bits(), Ordering::Release);
        true
    }
}

/// State shared between the decode thread and its owner
#[derive(Debug)]
pub struct Shared {
    pub frames: FrameBuffer,
    pub pool: FramePool,
    pub skip: SkipWindow,
    state: AtomicU8,
    last_frame_ms: AtomicU64,
    abort: AtomicBool,
    looping: AtomicBool,
    hw_allowed: AtomicBool,
}

impl Shared {
    pub fn new(config: &DecoderConfig) -> Self {
        Self {
            frames: FrameBuffer::new(config.buffer_capacity),
            pool: FramePool::new(config.buffer_capacity * 2),
            skip: SkipWindow::default(),
            state: AtomicU8::new(DecoderState::Ready as u8),
            last_frame_ms: AtomicU64::new(0f64.to_bits()),
            abort: AtomicBool::new(false),
            looping: AtomicBool::new(config.looping),
            hw_allowed: AtomicBool::new(config.hardware_decoding),
        }
    }

    pub fn state(&self) -> DecoderState {
        DecoderState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: DecoderState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn last_frame_ms(&self) -> f64 {
        f64::from_bits(self.last_frame_ms.load(Ordering::Acquire))
    }

    fn set_last_frame_ms(&self, ms: f64) {
        self.last_frame_ms.store(ms.to_bits(), Ordering::Release);
    }

    pub fn is_looping(&self) -> bool {
        self.looping.load(Ordering::Relaxed)
    }

    pub fn set_looping(&self, looping: bool) {
        self.looping.store(looping, Ordering::Relaxed);
    }

    pub fn hw_allowed(&self) -> bool {
        self.hw_allowed.load(Ordering::Acquire)
    }

    pub fn request_abort(&self) {
        self.abort.store(true, Ordering::Release);
    }

    fn aborted(&self) -> bool {
        self.abort.load(Ordering::Acquire)
    }

    /// Caller-side half of a seek: drop everything buffered and start discarding.
    ///
    /// Runs under the buffer lock so no stale frame can slip in afterwards.
    /// Returns the seek generation the decode thread must reposition for.
    pub fn begin_seek(&self, target_ms: f64) -> u64 {
        let mut generation = 0;
        let stale = self.frames.clear_with(|| {
            generation = self.skip.raise_discard();
            self.set_last_frame_ms(target_ms);
        });
        for frame in stale {
            self.pool.recycle(frame.into_samples());
        }
        generation
    }

    /// Queue a frame unless a seek started since it was decoded
    fn enqueue(&self, frame: DecodedFrame) {
        if let Err(frame) = self.frames.push_unless(frame, || self.skip.is_discarding()) {
            self.pool.recycle(frame.into_samples());
        }
    }
}

/// Seek on behalf of any thread: flush buffered output, then queue the reposition
pub fn request_seek(
    shared: &Shared,
    commands: &CommandSender<DecoderCommand>,
    target_ms: f64,
    wait: bool,
) -> Result<(), CommandError> {
    let generation = shared.begin_seek(target_ms);
    let command = DecoderCommand::Seek {
        target_ms,
        generation,
    };
    if wait {
        commands.push_and_sync(command)
    } else {
        commands.push(command)
    }
}

/// Demuxer, codec and conversion state for one opened stream
pub struct DecodeSession {
    backend: Arc<dyn MediaBackend>,
    demuxer: Box<dyn Demuxer>,
    stream: StreamInfo,
    codec: Option<Box<dyn CodecContext>>,
    normalizer: FrameNormalizer,
    hw_targets: Vec<HardwareKind>,
    pending: Option<Packet>,
    read_since_wrap: bool,
    shared: Arc<Shared>,
    commands: CommandSender<DecoderCommand>,
    active_poll: Duration,
    idle_poll: Duration,
    duration_ms: f64,
}

impl DecodeSession {
    /// Open the input, pick the audio stream and open a decoder for it
    pub fn prepare(
        backend: Arc<dyn MediaBackend>,
        source: Box<dyn ByteSource>,
        extension: Option<&str>,
        config: &DecoderConfig,
        shared: Arc<Shared>,
        commands: CommandSender<DecoderCommand>,
    ) -> Result<Self, SetupError> {
        let adapter = MediaSourceAdapter::new(source, config.io_buffer_size);
        let demuxer = backend
            .open_input(adapter, extension)
            .map_err(SetupError::OpenInput)?;

        if demuxer.streams().is_empty() {
            return Err(SetupError::NoStreamInfo("input has no streams".to_string()));
        }
        let stream = demuxer
            .streams()
            .iter()
            .find(|s| s.kind == StreamKind::Audio)
            .cloned()
            .ok_or(SetupError::NoAudioStream)?;

        let duration_ms = stream
            .duration_ms()
            .or_else(|| demuxer.duration_ms())
            .unwrap_or(0.0);
        debug!(
            "Using stream #{} ({:?}), {:.0} ms",
            stream.index,
            stream.codec(),
            duration_ms
        );

        let mut session = Self {
            backend,
            demuxer,
            stream,
            codec: None,
            normalizer: FrameNormalizer::new(),
            hw_targets: config.hardware_targets.clone(),
            pending: None,
            read_since_wrap: false,
            shared,
            commands,
            active_poll: config.active_poll(),
            idle_poll: config.idle_poll(),
            duration_ms,
        };
        session.open_codec()?;
        Ok(session)
    }

    pub fn duration_ms(&self) -> f64 {
        self.duration_ms
    }

    pub fn sample_rate(&self) -> u32 {
        self.stream.sample_rate().unwrap_or(0)
    }

    /// Replace the codec with the best candidate that opens
    fn open_codec(&mut self) -> Result<(), SetupError> {
        let targets: &[HardwareKind] = if self.shared.hw_allowed() {
            &self.hw_targets
        } else {
            &[]
        };
        let candidates = available_decoders(self.backend.as_ref(), self.stream.codec(), targets);

        self.codec = None;
        for candidate in &candidates {
            match self
                .backend
                .open_decoder(&candidate.descriptor, candidate.hardware, &self.stream.params)
            {
                Ok(codec) => {
                    info!("Successfully initialized audio decoder: {}", candidate.label());
                    self.codec = Some(codec);
                    return Ok(());
                }
                Err(e) => warn!("Could not open {}: {}", candidate.label(), e),
            }
        }

        Err(SetupError::NoDecoder {
            codec: format!("{:?}", self.stream.codec()),
        })
    }

    /// One iteration's worth of work while RUNNING or READY
    fn decode_next(&mut self) {
        let packet = match self.pending.take() {
            Some(packet) => packet,
            None => match self.demuxer.read_packet() {
                Ok(packet) => packet,
                Err(BackendError::EndOfStream) => {
                    self.finish_input();
                    return;
                }
                Err(BackendError::Again) => {
                    self.shared.set_state(DecoderState::Ready);
                    thread::sleep(self.active_poll);
                    return;
                }
                Err(e @ BackendError::Decode(_)) => {
                    logging::report("Failed to read packet", e.severity(), &e);
                    return;
                }
                Err(e) => {
                    logging::report("Input failed, stopping", e.severity(), &e);
                    self.drain_codec();
                    self.shared.set_state(DecoderState::EndOfStream);
                    return;
                }
            },
        };

        self.shared.set_state(DecoderState::Running);
        if packet.track_id() != self.stream.track_id {
            return;
        }
        self.read_since_wrap = true;

        match self.send(Some(&packet)) {
            Ok(()) => {}
            Err(BackendError::Again) => self.pending = Some(packet),
            Err(e) => {
                logging::report("Failed to send packet to decoder", e.severity(), &e);
                if self.fall_back_to_software(&e) {
                    self.pending = Some(packet);
                }
            }
        }
    }

    /// Submit to the codec and drain whatever it can produce
    fn send(&mut self, packet: Option<&Packet>) -> Result<(), BackendError> {
        let codec = self
            .codec
            .as_mut()
            .ok_or_else(|| BackendError::Unsupported("no decoder open".to_string()))?;
        let result = codec.send_packet(packet);
        if matches!(result, Ok(()) | Err(BackendError::Again)) {
            self.receive_frames();
        }
        result
    }

    fn receive_frames(&mut self) {
        let mut produced = 0usize;
        loop {
            let Some(codec) = self.codec.as_mut() else {
                return;
            };
            let raw = match codec.receive_frame() {
                Ok(raw) => raw,
                Err(BackendError::Again) => {
                    if produced == 0 {
                        self.shared.set_state(DecoderState::Ready);
                    }
                    return;
                }
                Err(BackendError::EndOfStream) => return,
                Err(e) => {
                    logging::report("Failed to receive frame from decoder", e.severity(), &e);
                    self.fall_back_to_software(&e);
                    return;
                }
            };
            produced += 1;

            let Some(ts) = raw.timestamp() else {
                debug!("Dropping frame without timestamp");
                continue;
            };
            let time_ms = self.stream.ts_to_ms(ts);
            if !self.shared.skip.admits(time_ms) {
                continue;
            }
            self.shared.set_last_frame_ms(time_ms);

            let normalized = match self.normalizer.normalize(raw, &self.shared.pool) {
                Ok(frame) => frame,
                Err(e) => {
                    logging::report("Failed to convert audio frame", e.severity(), &e);
                    continue;
                }
            };
            let samples = into_output_samples(normalized);
            self.shared.enqueue(DecodedFrame::new(time_ms, samples));
        }
    }

    /// Flush the codec and emit whatever it still holds
    fn drain_codec(&mut self) {
        if let Err(e) = self.send(None) {
            if !e.is_transient() {
                logging::report("Failed to flush decoder", e.severity(), &e);
            }
        }
        self.pending = None;
    }

    fn finish_input(&mut self) {
        self.drain_codec();
        if self.shared.is_looping() {
            // Nothing read since the last wrap: empty input or a seek that went nowhere.
            if !self.read_since_wrap {
                warn!("No audio read since looping to start, stopping");
                self.shared.set_state(DecoderState::EndOfStream);
                return;
            }
            self.read_since_wrap = false;
            debug!("End of input, looping to start");
            if let Err(e) = request_seek(&self.shared, &self.commands, 0.0, false) {
                logging::report("Failed to loop", ErrorSeverity::Error, &e);
                self.shared.set_state(DecoderState::EndOfStream);
            }
        } else {
            info!("Reached end of audio stream");
            self.shared.set_state(DecoderState::EndOfStream);
        }
    }

    /// Give up on hardware decoding after a codec failure; one-way.
    ///
    /// Returns true when a software codec will replace the current one.
    fn fall_back_to_software(&mut self, error: &BackendError) -> bool {
        let on_hardware = self.codec.as_ref().and_then(|c| c.hardware()).is_some();
        if !on_hardware || self.hw_targets.is_empty() || !self.shared.hw_allowed() {
            return false;
        }

        self.shared.hw_allowed.store(false, Ordering::Release);
        if matches!(error, BackendError::OutOfMemory) {
            info!("Disabling hardware decoding of audio due to a lack of memory");
            self.hw_targets.clear();
        } else {
            info!("Disabling hardware decoding of audio due to an unexpected error");
        }

        if let Err(e) = self.commands.push(DecoderCommand::RecreateCodec) {
            logging::report("Failed to queue decoder rebuild", ErrorSeverity::Error, &e);
            return false;
        }
        true
    }

    fn execute(&mut self, command: DecoderCommand) {
        match command {
            DecoderCommand::Seek {
                target_ms,
                generation,
            } => self.reposition(target_ms, generation),
            DecoderCommand::RecreateCodec => {
                if let Err(e) = self.open_codec() {
                    logging::report("Failed to recreate decoder", ErrorSeverity::Critical, &e);
                    self.shared.set_state(DecoderState::Faulted);
                }
            }
        }
    }

    /// Decode-thread half of a seek; superseded requests are skipped
    fn reposition(&mut self, target_ms: f64, generation: u64) {
        if self.shared.state().is_terminal() {
            return;
        }
        if self.shared.skip.generation() != generation {
            debug!("Skipping seek to {:.1} ms, superseded", target_ms);
            return;
        }
        let ts = self.stream.ms_to_ts(target_ms);
        if let Err(e) = self.demuxer.seek(&self.stream, ts) {
            logging::report("Failed to seek", e.severity(), &e);
        }
        if let Some(codec) = self.codec.as_mut() {
            codec.flush();
        }
        self.pending = None;
        if !self.shared.skip.reposition(target_ms, generation) {
            debug!("Seek to {:.1} ms superseded while repositioning", target_ms);
            return;
        }
        self.shared.set_state(DecoderState::Ready);
        debug!("Repositioned to {:.1} ms", target_ms);
    }
}

/// Body of the decode thread; returns once aborted or faulted
pub fn run(mut session: DecodeSession, commands: CommandReceiver<DecoderCommand>) {
    let shared = session.shared.clone();
    debug!("Decode loop started");

    while !shared.aborted() {
        match shared.state() {
            DecoderState::Ready | DecoderState::Running => {
                if shared.frames.has_room() {
                    session.decode_next();
                } else {
                    shared.set_state(DecoderState::Ready);
                    thread::sleep(session.active_poll);
                }
            }
            DecoderState::EndOfStream => thread::sleep(session.idle_poll),
            DecoderState::Faulted | DecoderState::Stopped => break,
        }

        commands.flush_pending(|command| session.execute(command));
    }

    drop(session);
    if shared.state() != DecoderState::Faulted {
        shared.set_state(DecoderState::Stopped);
    }
    debug!("Decode loop exited in state {}", shared.state());
}
