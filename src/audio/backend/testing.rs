//! Deterministic in-memory backend for exercising the decode loop.
//!
//! Packets carry no payload: the scripted codec synthesizes samples from the
//! packet timestamp, so every decoded frame can be traced back to its packet.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use symphonia::core::audio::Channels;
use symphonia::core::codecs::{CodecParameters, CodecType, CODEC_TYPE_AAC};
use symphonia::core::formats::Packet;
use symphonia::core::units::TimeBase;

use super::{
    CodecContext, Demuxer, MediaBackend, RawFrame, SampleData, SampleFormat, StreamInfo,
    StreamKind,
};
use crate::audio::selection::{DecoderDescriptor, HardwareKind};
use crate::audio::source::MediaSourceAdapter;
use crate::error::BackendError;

pub const AUDIO_TRACK: u32 = 0;
pub const SIDE_TRACK: u32 = 1;

/// Shape of the synthesized stream
#[derive(Debug, Clone)]
pub struct ScriptedStream {
    pub sample_rate: u32,
    pub channels: Channels,
    pub format: SampleFormat,
    pub planar: bool,
    pub frames_per_packet: usize,
    pub packets: usize,
    pub keyframe_interval: usize,
    pub start_ts: u64,
    /// Interleave packets of a non-audio stream
    pub side_stream: bool,
    /// Report only `pts`, leaving the best-effort timestamp unset
    pub pts_only: bool,
}

impl Default for ScriptedStream {
    fn default() -> Self {
        Self {
            sample_rate: 1000,
            channels: Channels::FRONT_LEFT | Channels::FRONT_RIGHT,
            format: SampleFormat::F32,
            planar: false,
            frames_per_packet: 10,
            packets: 100,
            keyframe_interval: 1,
            start_ts: 0,
            side_stream: false,
            pts_only: false,
        }
    }
}

impl ScriptedStream {
    fn params(&self) -> CodecParameters {
        let mut params = CodecParameters::new();
        params
            .for_codec(CODEC_TYPE_AAC)
            .with_sample_rate(self.sample_rate)
            .with_time_base(TimeBase::new(1, self.sample_rate))
            .with_n_frames((self.packets * self.frames_per_packet) as u64)
            .with_channels(self.channels);
        params.start_ts = self.start_ts;
        params
    }

    /// Timestamp of packet `index`
    pub fn packet_ts(&self, index: usize) -> u64 {
        self.start_ts + (index * self.frames_per_packet) as u64
    }

    /// Millisecond position of packet `index`
    pub fn packet_ms(&self, index: usize) -> f64 {
        (index * self.frames_per_packet) as f64 * 1000.0 / self.sample_rate as f64
    }

    pub fn packet_duration_ms(&self) -> f64 {
        self.packet_ms(1)
    }
}

/// Failure injected into a hardware-backed scripted codec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    OutOfMemory,
    Decode,
}

impl Failure {
    fn error(self) -> BackendError {
        match self {
            Failure::OutOfMemory => BackendError::OutOfMemory,
            Failure::Decode => BackendError::Decode("device lost".to_string()),
        }
    }
}

/// One decoder implementation offered by the scripted backend
#[derive(Debug, Clone)]
pub struct ScriptedDecoder {
    pub name: String,
    pub hardware: Vec<HardwareKind>,
    pub open_fails: bool,
    /// Refuse to open without a hardware device
    pub hardware_only: bool,
    /// When running on hardware, fail every send after this many accepted packets
    pub hardware_fails_after: Option<(usize, Failure)>,
    /// Refuse each packet once with `Again` before accepting it
    pub again_first: bool,
    pub delay: Option<Duration>,
}

impl ScriptedDecoder {
    pub fn software(name: &str) -> Self {
        Self {
            name: name.to_string(),
            hardware: Vec::new(),
            open_fails: false,
            hardware_only: false,
            hardware_fails_after: None,
            again_first: false,
            delay: None,
        }
    }

    pub fn hardware(name: &str, kinds: Vec<HardwareKind>) -> Self {
        Self {
            hardware: kinds,
            ..Self::software(name)
        }
    }

    pub fn failing_after(mut self, sends: usize, failure: Failure) -> Self {
        self.hardware_fails_after = Some((sends, failure));
        self
    }

    pub fn refusing_once(mut self) -> Self {
        self.again_first = true;
        self
    }

    pub fn without_software_mode(mut self) -> Self {
        self.hardware_only = true;
        self
    }

    pub fn broken(mut self) -> Self {
        self.open_fails = true;
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// What the backend observed, for assertions
#[derive(Debug, Default, Clone)]
pub struct BackendLog {
    pub opened: Vec<(String, Option<HardwareKind>)>,
    pub seeks: Vec<u64>,
    /// Timestamp and hardware kind of every accepted packet
    pub decoded: Vec<(u64, Option<HardwareKind>)>,
}

#[derive(Debug, Clone)]
pub struct ScriptedBackend {
    stream: ScriptedStream,
    decoders: Vec<ScriptedDecoder>,
    log: Arc<Mutex<BackendLog>>,
    input_fails: bool,
    no_streams: bool,
    no_audio: bool,
    seek_fails: bool,
}

impl ScriptedBackend {
    pub fn new(stream: ScriptedStream, decoders: Vec<ScriptedDecoder>) -> Self {
        Self {
            stream,
            decoders,
            log: Arc::new(Mutex::new(BackendLog::default())),
            input_fails: false,
            no_streams: false,
            no_audio: false,
            seek_fails: false,
        }
    }

    pub fn software(stream: ScriptedStream) -> Self {
        Self::new(stream, vec![ScriptedDecoder::software("scripted")])
    }

    pub fn failing_input(mut self) -> Self {
        self.input_fails = true;
        self
    }

    pub fn without_streams(mut self) -> Self {
        self.no_streams = true;
        self
    }

    pub fn without_audio(mut self) -> Self {
        self.no_audio = true;
        self
    }

    /// Demuxer logs seek requests but cannot reposition
    pub fn without_seeking(mut self) -> Self {
        self.seek_fails = true;
        self
    }

    pub fn log(&self) -> BackendLog {
        self.log.lock().unwrap().clone()
    }

    pub fn stream(&self) -> &ScriptedStream {
        &self.stream
    }
}

impl MediaBackend for ScriptedBackend {
    fn open_input(
        &self,
        _source: MediaSourceAdapter,
        _extension: Option<&str>,
    ) -> Result<Box<dyn Demuxer>, BackendError> {
        if self.input_fails {
            return Err(BackendError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                "scripted input missing",
            )));
        }

        let mut streams = Vec::new();
        if !self.no_streams {
            streams.push(StreamInfo {
                index: 0,
                track_id: AUDIO_TRACK,
                kind: if self.no_audio { StreamKind::Other } else { StreamKind::Audio },
                params: self.stream.params(),
            });
            if self.stream.side_stream {
                streams.push(StreamInfo {
                    index: 1,
                    track_id: SIDE_TRACK,
                    kind: StreamKind::Other,
                    params: CodecParameters::new(),
                });
            }
        }

        Ok(Box::new(ScriptedDemuxer {
            stream: self.stream.clone(),
            streams,
            next: 0,
            side_pending: false,
            seek_fails: self.seek_fails,
            log: self.log.clone(),
        }))
    }

    fn decoders_for(&self, codec: CodecType) -> Vec<DecoderDescriptor> {
        if codec != CODEC_TYPE_AAC {
            return Vec::new();
        }
        self.decoders
            .iter()
            .map(|d| DecoderDescriptor {
                name: d.name.clone(),
                codec,
                hardware: d.hardware.clone(),
            })
            .collect()
    }

    fn open_decoder(
        &self,
        descriptor: &DecoderDescriptor,
        hardware: Option<HardwareKind>,
        _params: &CodecParameters,
    ) -> Result<Box<dyn CodecContext>, BackendError> {
        let script = self
            .decoders
            .iter()
            .find(|d| d.name == descriptor.name)
            .ok_or_else(|| BackendError::Unsupported(descriptor.name.clone()))?;

        if script.open_fails {
            return Err(BackendError::Unsupported(format!("{} failed to open", script.name)));
        }
        match hardware {
            Some(kind) if !script.hardware.contains(&kind) => {
                return Err(BackendError::Unsupported(format!("{} lacks {}", script.name, kind)));
            }
            None if script.hardware_only => {
                return Err(BackendError::Unsupported(format!("{} needs a device", script.name)));
            }
            _ => {}
        }

        self.log.lock().unwrap().opened.push((script.name.clone(), hardware));
        Ok(Box::new(ScriptedCodec {
            script: script.clone(),
            stream: self.stream.clone(),
            hardware,
            queue: VecDeque::new(),
            draining: false,
            accepted: 0,
            deferred: None,
            log: self.log.clone(),
        }))
    }
}

struct ScriptedDemuxer {
    stream: ScriptedStream,
    streams: Vec<StreamInfo>,
    next: usize,
    side_pending: bool,
    seek_fails: bool,
    log: Arc<Mutex<BackendLog>>,
}

impl Demuxer for ScriptedDemuxer {
    fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    fn read_packet(&mut self) -> Result<Packet, BackendError> {
        if self.side_pending {
            self.side_pending = false;
            return Ok(Packet::new_from_slice(SIDE_TRACK, 0, 0, &[]));
        }
        if self.next >= self.stream.packets {
            return Err(BackendError::EndOfStream);
        }

        let ts = self.stream.packet_ts(self.next);
        self.next += 1;
        self.side_pending = self.stream.side_stream;
        Ok(Packet::new_from_slice(
            AUDIO_TRACK,
            ts,
            self.stream.frames_per_packet as u64,
            &[],
        ))
    }

    fn seek(&mut self, _stream: &StreamInfo, ts: u64) -> Result<(), BackendError> {
        self.log.lock().unwrap().seeks.push(ts);
        if self.seek_fails {
            return Err(BackendError::Unsupported("scripted input is not seekable".to_string()));
        }

        let index = (ts.saturating_sub(self.stream.start_ts) as usize) / self.stream.frames_per_packet;
        let keyframe = index - index % self.stream.keyframe_interval.max(1);
        self.next = keyframe.min(self.stream.packets);
        self.side_pending = false;
        Ok(())
    }
}

struct ScriptedCodec {
    script: ScriptedDecoder,
    stream: ScriptedStream,
    hardware: Option<HardwareKind>,
    queue: VecDeque<RawFrame>,
    draining: bool,
    accepted: usize,
    deferred: Option<u64>,
    log: Arc<Mutex<BackendLog>>,
}

impl ScriptedCodec {
    fn synthesize(&self, ts: u64) -> RawFrame {
        let channels = self.stream.channels.count();
        let frames = self.stream.frames_per_packet;
        let value = |frame: usize, channel: usize| -> f64 {
            let base = ((ts as usize + frame) % 100) as f64 / 100.0;
            if channel % 2 == 0 {
                base
            } else {
                -base
            }
        };

        let mut values = Vec::with_capacity(frames * channels);
        if self.stream.planar {
            for channel in 0..channels {
                for frame in 0..frames {
                    values.push(value(frame, channel));
                }
            }
        } else {
            for frame in 0..frames {
                for channel in 0..channels {
                    values.push(value(frame, channel));
                }
            }
        }

        let data = match self.stream.format {
            SampleFormat::U8 => {
                SampleData::U8(values.iter().map(|v| (v * 128.0 + 128.0) as u8).collect())
            }
            SampleFormat::S16 => {
                SampleData::S16(values.iter().map(|v| (v * 32_768.0) as i16).collect())
            }
            SampleFormat::S32 => {
                SampleData::S32(values.iter().map(|v| (v * 2_147_483_648.0) as i32).collect())
            }
            SampleFormat::F32 => SampleData::F32(values.iter().map(|v| *v as f32).collect()),
            SampleFormat::F64 => SampleData::F64(values),
        };

        let ts = ts as i64;
        RawFrame {
            pts: Some(ts),
            best_effort_timestamp: if self.stream.pts_only { None } else { Some(ts) },
            sample_rate: self.stream.sample_rate,
            channels: self.stream.channels,
            planar: self.stream.planar,
            data,
        }
    }
}

impl CodecContext for ScriptedCodec {
    fn name(&self) -> &str {
        &self.script.name
    }

    fn hardware(&self) -> Option<HardwareKind> {
        self.hardware
    }

    fn send_packet(&mut self, packet: Option<&Packet>) -> Result<(), BackendError> {
        let Some(packet) = packet else {
            self.draining = true;
            return Ok(());
        };
        if let Some(delay) = self.script.delay {
            thread::sleep(delay);
        }
        if !self.queue.is_empty() {
            return Err(BackendError::Again);
        }
        if self.script.again_first && self.deferred != Some(packet.ts()) {
            self.deferred = Some(packet.ts());
            return Err(BackendError::Again);
        }
        if let (Some(_), Some((after, failure))) = (self.hardware, self.script.hardware_fails_after) {
            if self.accepted >= after {
                return Err(failure.error());
            }
        }

        self.accepted += 1;
        self.log
            .lock()
            .unwrap()
            .decoded
            .push((packet.ts(), self.hardware));
        let frame = self.synthesize(packet.ts());
        self.queue.push_back(frame);
        Ok(())
    }

    fn receive_frame(&mut self) -> Result<RawFrame, BackendError> {
        match self.queue.pop_front() {
            Some(frame) => Ok(frame),
            None if self.draining => Err(BackendError::EndOfStream),
            None => Err(BackendError::Again),
        }
    }

    fn flush(&mut self) {
        self.queue.clear();
        self.draining = false;
        self.deferred = None;
    }
}
