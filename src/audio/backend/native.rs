//! Symphonia-backed demuxer and software decoders.

use std::io;

use log::{debug, info};
use symphonia::core::audio::{AudioBufferRef, SampleBuffer, SignalSpec};
use symphonia::core::codecs::{CodecParameters, CodecType, Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::conv::ConvertibleSample;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::{CodecContext, Demuxer, MediaBackend, RawFrame, SampleData, StreamInfo, StreamKind};
use crate::audio::selection::{DecoderDescriptor, HardwareKind};
use crate::audio::source::MediaSourceAdapter;
use crate::error::BackendError;

/// Production backend built on symphonia's default format and codec registries
#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaBackend;

impl SymphoniaBackend {
    pub fn new() -> Self {
        Self
    }
}

fn map_error(err: SymphoniaError) -> BackendError {
    match err {
        SymphoniaError::IoError(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            BackendError::EndOfStream
        }
        SymphoniaError::IoError(e) => BackendError::Io(e),
        SymphoniaError::DecodeError(msg) => BackendError::Decode(msg.to_string()),
        SymphoniaError::SeekError(kind) => BackendError::Decode(format!("seek failed: {:?}", kind)),
        SymphoniaError::Unsupported(msg) => BackendError::Unsupported(msg.to_string()),
        SymphoniaError::LimitError(msg) => BackendError::Decode(format!("limit reached: {}", msg)),
        SymphoniaError::ResetRequired => {
            BackendError::Unsupported("stream parameters changed mid-stream".to_string())
        }
    }
}

impl MediaBackend for SymphoniaBackend {
    fn open_input(
        &self,
        source: MediaSourceAdapter,
        extension: Option<&str>,
    ) -> Result<Box<dyn Demuxer>, BackendError> {
        let stream = MediaSourceStream::new(Box::new(source), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = extension {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, stream, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(map_error)?;

        let format = probed.format;
        let streams = format
            .tracks()
            .iter()
            .enumerate()
            .map(|(index, track)| {
                let params = &track.codec_params;
                let is_audio = params.codec != CODEC_TYPE_NULL
                    && (params.sample_rate.is_some() || params.channels.is_some());
                StreamInfo {
                    index,
                    track_id: track.id,
                    kind: if is_audio { StreamKind::Audio } else { StreamKind::Other },
                    params: params.clone(),
                }
            })
            .collect::<Vec<_>>();

        debug!("Probed input with {} stream(s)", streams.len());
        Ok(Box::new(SymphoniaDemuxer { format, streams }))
    }

    fn decoders_for(&self, codec: CodecType) -> Vec<DecoderDescriptor> {
        symphonia::default::get_codecs()
            .get_codec(codec)
            .map(|descriptor| vec![DecoderDescriptor::software(descriptor.short_name, codec)])
            .unwrap_or_default()
    }

    fn open_decoder(
        &self,
        descriptor: &DecoderDescriptor,
        hardware: Option<HardwareKind>,
        params: &CodecParameters,
    ) -> Result<Box<dyn CodecContext>, BackendError> {
        if let Some(kind) = hardware {
            return Err(BackendError::Unsupported(format!(
                "{} has no {} device support",
                descriptor.name, kind
            )));
        }

        let decoder = symphonia::default::get_codecs()
            .make(params, &DecoderOptions::default())
            .map_err(map_error)?;

        info!("Opened {} decoder", descriptor.name);
        Ok(Box::new(SymphoniaCodec {
            decoder,
            name: descriptor.name.clone(),
            ready: None,
            draining: false,
        }))
    }
}

struct SymphoniaDemuxer {
    format: Box<dyn FormatReader>,
    streams: Vec<StreamInfo>,
}

impl Demuxer for SymphoniaDemuxer {
    fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    fn read_packet(&mut self) -> Result<Packet, BackendError> {
        self.format.next_packet().map_err(map_error)
    }

    fn seek(&mut self, stream: &StreamInfo, ts: u64) -> Result<(), BackendError> {
        let seeked = self
            .format
            .seek(
                SeekMode::Accurate,
                SeekTo::TimeStamp {
                    ts,
                    track_id: stream.track_id,
                },
            )
            .map_err(map_error)?;
        debug!("Seek to ts {} landed at ts {}", seeked.required_ts, seeked.actual_ts);
        Ok(())
    }
}

/// Wraps symphonia's one-shot `decode` in the send/receive protocol.
///
/// Each accepted packet yields at most one frame, held until received.
struct SymphoniaCodec {
    decoder: Box<dyn Decoder>,
    name: String,
    ready: Option<RawFrame>,
    draining: bool,
}

impl CodecContext for SymphoniaCodec {
    fn name(&self) -> &str {
        &self.name
    }

    fn hardware(&self) -> Option<HardwareKind> {
        None
    }

    fn send_packet(&mut self, packet: Option<&Packet>) -> Result<(), BackendError> {
        let Some(packet) = packet else {
            self.draining = true;
            return Ok(());
        };
        if self.ready.is_some() {
            return Err(BackendError::Again);
        }

        let frame = match self.decoder.decode(packet) {
            Ok(buffer) => raw_frame(buffer, packet.ts()),
            Err(err) => return Err(map_error(err)),
        };
        self.ready = frame;
        Ok(())
    }

    fn receive_frame(&mut self) -> Result<RawFrame, BackendError> {
        match self.ready.take() {
            Some(frame) => Ok(frame),
            None if self.draining => Err(BackendError::EndOfStream),
            None => Err(BackendError::Again),
        }
    }

    fn flush(&mut self) {
        self.decoder.reset();
        self.ready = None;
        self.draining = false;
    }
}

fn planar_samples<S: ConvertibleSample>(buffer: AudioBufferRef<'_>, spec: SignalSpec) -> Vec<S> {
    let mut samples = SampleBuffer::<S>::new(buffer.frames() as u64, spec);
    samples.copy_planar_ref(buffer);
    samples.samples().to_vec()
}

/// Copy a decoded buffer out as planar samples; `None` for an empty buffer
fn raw_frame(buffer: AudioBufferRef<'_>, ts: u64) -> Option<RawFrame> {
    let spec = *buffer.spec();
    if buffer.frames() == 0 {
        return None;
    }

    let data = match buffer {
        AudioBufferRef::U8(_) => SampleData::U8(planar_samples::<u8>(buffer, spec)),
        AudioBufferRef::S16(_) => SampleData::S16(planar_samples::<i16>(buffer, spec)),
        AudioBufferRef::F32(_) => SampleData::F32(planar_samples::<f32>(buffer, spec)),
        AudioBufferRef::F64(_) => SampleData::F64(planar_samples::<f64>(buffer, spec)),
        // Remaining integer widths are carried as 32-bit.
        _ => SampleData::S32(planar_samples::<i32>(buffer, spec)),
    };

    let ts = i64::try_from(ts).ok();
    Some(RawFrame {
        pts: ts,
        best_effort_timestamp: ts,
        sample_rate: spec.rate,
        channels: spec.channels,
        planar: true,
        data,
    })
}
