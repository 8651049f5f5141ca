//! Demux/decode backend seam.
//!
//! The decode loop only talks to these traits. [`native::SymphoniaBackend`]
//! is the production binding; tests drive the loop with a scripted backend.

use symphonia::core::audio::Channels;
use symphonia::core::codecs::{CodecParameters, CodecType};
use symphonia::core::formats::Packet;
use symphonia::core::units::TimeBase;

use crate::audio::selection::{DecoderDescriptor, HardwareKind};
use crate::audio::source::MediaSourceAdapter;
use crate::error::BackendError;

pub mod native;

#[cfg(test)]
pub mod testing;

/// What a container stream carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Audio,
    Other,
}

/// A stream discovered while probing the container
#[derive(Debug, Clone)]
pub struct StreamInfo {
    pub index: usize,
    pub track_id: u32,
    pub kind: StreamKind,
    pub params: CodecParameters,
}

impl StreamInfo {
    pub fn time_base(&self) -> TimeBase {
        match (self.params.time_base, self.params.sample_rate) {
            (Some(tb), _) => tb,
            (None, Some(rate)) if rate > 0 => TimeBase::new(1, rate),
            _ => TimeBase::new(1, 1000),
        }
    }

    fn seconds_per_tick(&self) -> f64 {
        let tb = self.time_base();
        tb.numer as f64 / tb.denom as f64
    }

    /// Presentation time of `ts` in milliseconds, relative to the stream start
    pub fn ts_to_ms(&self, ts: i64) -> f64 {
        (ts - self.params.start_ts as i64) as f64 * self.seconds_per_tick() * 1000.0
    }

    /// Stream timestamp for a position in milliseconds
    pub fn ms_to_ts(&self, ms: f64) -> u64 {
        let ticks = (ms.max(0.0) / 1000.0 / self.seconds_per_tick()).round();
        self.params.start_ts.saturating_add(ticks as u64)
    }

    /// Stream length, when the container declares it
    pub fn duration_ms(&self) -> Option<f64> {
        let frames = self.params.n_frames?;
        Some(frames as f64 * self.seconds_per_tick() * 1000.0)
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.params.sample_rate
    }

    pub fn codec(&self) -> CodecType {
        self.params.codec
    }
}

/// Sample encoding of a raw frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    U8,
    S16,
    S32,
    F32,
    F64,
}

/// Sample storage of a raw frame
#[derive(Debug, Clone, PartialEq)]
pub enum SampleData {
    U8(Vec<u8>),
    S16(Vec<i16>),
    S32(Vec<i32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl SampleData {
    pub fn format(&self) -> SampleFormat {
        match self {
            SampleData::U8(_) => SampleFormat::U8,
            SampleData::S16(_) => SampleFormat::S16,
            SampleData::S32(_) => SampleFormat::S32,
            SampleData::F32(_) => SampleFormat::F32,
            SampleData::F64(_) => SampleFormat::F64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            SampleData::U8(s) => s.len(),
            SampleData::S16(s) => s.len(),
            SampleData::S32(s) => s.len(),
            SampleData::F32(s) => s.len(),
            SampleData::F64(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sample at `index` scaled to `[-1.0, 1.0]`
    pub fn sample_f32(&self, index: usize) -> f32 {
        match self {
            SampleData::U8(s) => (s[index] as f32 - 128.0) / 128.0,
            SampleData::S16(s) => s[index] as f32 / 32_768.0,
            SampleData::S32(s) => (s[index] as f64 / 2_147_483_648.0) as f32,
            SampleData::F32(s) => s[index],
            SampleData::F64(s) => s[index] as f32,
        }
    }
}

/// Decoder output before normalization
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    pub pts: Option<i64>,
    pub best_effort_timestamp: Option<i64>,
    pub sample_rate: u32,
    pub channels: Channels,
    /// One contiguous run per channel instead of interleaved samples
    pub planar: bool,
    pub data: SampleData,
}

impl RawFrame {
    /// Best-effort timestamp, falling back to the presentation timestamp
    pub fn timestamp(&self) -> Option<i64> {
        self.best_effort_timestamp.or(self.pts)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.count()
    }

    pub fn format(&self) -> SampleFormat {
        self.data.format()
    }
}

/// Opened container
pub trait Demuxer: Send {
    fn streams(&self) -> &[StreamInfo];

    /// Container-level duration when no stream declares one
    fn duration_ms(&self) -> Option<f64> {
        None
    }

    /// Next compressed packet of any stream.
    ///
    /// `BackendError::EndOfStream` when the input is exhausted.
    fn read_packet(&mut self) -> Result<Packet, BackendError>;

    /// Reposition so the next packet read is the keyframe at or before `ts` of `stream`
    fn seek(&mut self, stream: &StreamInfo, ts: u64) -> Result<(), BackendError>;
}

/// Stateful decoder instance.
///
/// Follows a send/receive protocol: `send_packet(None)` starts draining, after
/// which `receive_frame` reports `EndOfStream` once everything buffered is out.
pub trait CodecContext: Send {
    fn name(&self) -> &str;

    /// Hardware kind this context runs on, `None` for software
    fn hardware(&self) -> Option<HardwareKind>;

    /// `BackendError::Again` when output must be drained before more input is accepted
    fn send_packet(&mut self, packet: Option<&Packet>) -> Result<(), BackendError>;

    /// `BackendError::Again` when more input is needed
    fn receive_frame(&mut self) -> Result<RawFrame, BackendError>;

    /// Drop internal state so decoding can restart at a new position
    fn flush(&mut self);
}

/// Factory for demuxers and decoders
pub trait MediaBackend: Send + Sync {
    fn open_input(
        &self,
        source: MediaSourceAdapter,
        extension: Option<&str>,
    ) -> Result<Box<dyn Demuxer>, BackendError>;

    /// Every implementation that can decode `codec`, in preference order
    fn decoders_for(&self, codec: CodecType) -> Vec<DecoderDescriptor>;

    fn open_decoder(
        &self,
        descriptor: &DecoderDescriptor,
        hardware: Option<HardwareKind>,
        params: &CodecParameters,
    ) -> Result<Box<dyn CodecContext>, BackendError>;
}
