//! Conversion of raw decoder output to interleaved stereo `f32`.

use log::debug;
use symphonia::core::audio::Channels;

use crate::audio::backend::{RawFrame, SampleData, SampleFormat};
use crate::audio::buffer::FramePool;
use crate::error::NormalizeError;
use crate::models::OUTPUT_CHANNELS;

const CENTER_MIX: f32 = std::f32::consts::FRAC_1_SQRT_2;

/// Left/right contribution of a single speaker position
fn coefficients(position: Channels) -> [f32; 2] {
    if position == Channels::FRONT_LEFT {
        [1.0, 0.0]
    } else if position == Channels::FRONT_RIGHT {
        [0.0, 1.0]
    } else if position == Channels::FRONT_CENTRE {
        [CENTER_MIX, CENTER_MIX]
    } else if position == Channels::LFE1 {
        [0.0, 0.0]
    } else if position == Channels::REAR_LEFT
        || position == Channels::SIDE_LEFT
        || position == Channels::FRONT_LEFT_CENTRE
    {
        [CENTER_MIX, 0.0]
    } else if position == Channels::REAR_RIGHT
        || position == Channels::SIDE_RIGHT
        || position == Channels::FRONT_RIGHT_CENTRE
    {
        [0.0, CENTER_MIX]
    } else {
        [0.5, 0.5]
    }
}

/// Downmix matrix for `layout`, one row per channel in layout order
pub fn downmix_matrix(layout: Channels) -> Result<Vec<[f32; 2]>, NormalizeError> {
    let positions: Vec<Channels> = (0..32)
        .map(|bit| Channels::from_bits_truncate(1 << bit))
        .filter(|position| !position.is_empty() && layout.contains(*position))
        .collect();

    match positions.len() {
        0 => Err(NormalizeError::EmptyLayout),
        // Mono goes to both sides at full level.
        1 => Ok(vec![[1.0, 1.0]]),
        _ => {
            let mut matrix: Vec<[f32; 2]> = positions.into_iter().map(coefficients).collect();
            let left: f32 = matrix.iter().map(|row| row[0]).sum();
            let right: f32 = matrix.iter().map(|row| row[1]).sum();
            let peak = left.max(right);
            if peak == 0.0 {
                return Err(NormalizeError::UnsupportedLayout {
                    channels: matrix.len(),
                });
            }
            if peak > 1.0 {
                for row in &mut matrix {
                    row[0] /= peak;
                    row[1] /= peak;
                }
            }
            Ok(matrix)
        }
    }
}

/// Cached conversion setup for one input configuration
#[derive(Debug, Clone)]
struct RemixContext {
    channels: Channels,
    sample_rate: u32,
    format: SampleFormat,
    planar: bool,
    matrix: Vec<[f32; 2]>,
}

impl RemixContext {
    fn matches(&self, frame: &RawFrame) -> bool {
        self.channels == frame.channels
            && self.sample_rate == frame.sample_rate
            && self.format == frame.format()
            && self.planar == frame.planar
    }

    fn convert(&self, data: &SampleData, pool: &FramePool) -> Result<Vec<f32>, NormalizeError> {
        let channels = self.matrix.len();
        let total = data.len();
        if total % channels != 0 {
            return Err(NormalizeError::SampleCountMismatch {
                samples: total,
                channels,
            });
        }
        let frames = total / channels;

        let mut out = pool.take(frames * OUTPUT_CHANNELS);
        for frame in 0..frames {
            let (mut left, mut right) = (0.0f32, 0.0f32);
            for (channel, row) in self.matrix.iter().enumerate() {
                let index = if self.planar {
                    channel * frames + frame
                } else {
                    frame * channels + channel
                };
                let sample = data.sample_f32(index);
                left += sample * row[0];
                right += sample * row[1];
            }
            out.push(left);
            out.push(right);
        }
        Ok(out)
    }
}

/// Turns decoder frames into the fixed output format.
///
/// The remix setup is built on first use and rebuilt whenever the input layout,
/// rate or sample format changes.
#[derive(Debug, Default)]
pub struct FrameNormalizer {
    context: Option<RemixContext>,
}

impl FrameNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `frame` already is interleaved stereo `f32`
    pub fn is_output_format(frame: &RawFrame) -> bool {
        frame.format() == SampleFormat::F32 && !frame.planar && frame.channel_count() == OUTPUT_CHANNELS
    }

    /// Convert `frame`, passing it through untouched when already in output format
    pub fn normalize(&mut self, frame: RawFrame, pool: &FramePool) -> Result<RawFrame, NormalizeError> {
        if Self::is_output_format(&frame) {
            return Ok(frame);
        }

        let context = match self.context.take() {
            Some(context) if context.matches(&frame) => context,
            _ => {
                debug!(
                    "Building remix for {} channel(s), {:?}, {} Hz",
                    frame.channel_count(),
                    frame.format(),
                    frame.sample_rate
                );
                RemixContext {
                    channels: frame.channels,
                    sample_rate: frame.sample_rate,
                    format: frame.format(),
                    planar: frame.planar,
                    matrix: downmix_matrix(frame.channels)?,
                }
            }
        };

        let converted = context.convert(&frame.data, pool);
        self.context = Some(context);

        Ok(RawFrame {
            pts: frame.pts,
            best_effort_timestamp: frame.best_effort_timestamp,
            sample_rate: frame.sample_rate,
            channels: Channels::FRONT_LEFT | Channels::FRONT_RIGHT,
            planar: false,
            data: SampleData::F32(converted?),
        })
    }

    pub fn reset(&mut self) {
        self.context = None;
    }
}

/// Take the interleaved samples out of a normalized frame.
///
/// # Panics
///
/// If `frame` is not interleaved `f32`; normalized output never is.
pub fn into_output_samples(frame: RawFrame) -> Vec<f32> {
    assert!(!frame.planar, "normalized audio must be interleaved");
    match frame.data {
        SampleData::F32(samples) => samples,
        other => panic!("normalized audio must be f32, got {:?}", other.format()),
    }
}
