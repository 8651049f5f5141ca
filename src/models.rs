use serde::{Deserialize, Serialize};

/// Number of interleaved channels in every decoded frame
pub const OUTPUT_CHANNELS: usize = 2;

/// A unit of normalized PCM audio.
///
/// Samples are interleaved stereo `f32` (`L, R, L, R, ...`). The timestamp is the
/// presentation time in milliseconds relative to the start of the stream.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    time_ms: f64,
    samples: Vec<f32>,
}

impl DecodedFrame {
    pub fn new(time_ms: f64, samples: Vec<f32>) -> Self {
        Self { time_ms, samples }
    }

    /// Presentation time in milliseconds
    pub fn time_ms(&self) -> f64 {
        self.time_ms
    }

    /// Interleaved stereo samples
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Number of stereo sample frames carried
    pub fn sample_frames(&self) -> usize {
        self.samples.len() / OUTPUT_CHANNELS
    }

    /// Playback length of this frame at `sample_rate`
    pub fn duration_ms(&self, sample_rate: u32) -> f64 {
        if sample_rate == 0 {
            return 0.0;
        }
        self.sample_frames() as f64 * 1000.0 / sample_rate as f64
    }

    /// Give up the sample storage, e.g. for reuse by the frame pool
    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }
}

/// Lifecycle of the decode context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum DecoderState {
    /// Idle: buffer not full, nothing pending
    Ready = 0,
    /// Actively decoding
    Running = 1,
    /// Input exhausted and not looping
    EndOfStream = 2,
    /// Unrecoverable setup failure
    Faulted = 3,
    /// Decode context has exited
    Stopped = 4,
}

impl DecoderState {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => DecoderState::Ready,
            1 => DecoderState::Running,
            2 => DecoderState::EndOfStream,
            3 => DecoderState::Faulted,
            _ => DecoderState::Stopped,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DecoderState::Ready => "READY",
            DecoderState::Running => "RUNNING",
            DecoderState::EndOfStream => "END_OF_STREAM",
            DecoderState::Faulted => "FAULTED",
            DecoderState::Stopped => "STOPPED",
        }
    }

    /// `Faulted` and `Stopped` are never left
    pub fn is_terminal(&self) -> bool {
        matches!(self, DecoderState::Faulted | DecoderState::Stopped)
    }
}

impl std::fmt::Display for DecoderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a decoder, suitable for status output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecoderStatus {
    pub state: DecoderState,
    pub last_decoded_frame_ms: f64,
    pub duration_ms: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub buffered_frames: usize,
    pub hw_decoding_allowed: bool,
    pub looping: bool,
}

impl DecoderStatus {
    /// Human-readable one-line summary
    pub fn summary(&self) -> String {
        format!(
            "{} - {:.1}s / {:.1}s - {} Hz, {} ch - {} buffered{}",
            self.state,
            self.last_decoded_frame_ms / 1000.0,
            self.duration_ms / 1000.0,
            self.sample_rate,
            self.channels,
            self.buffered_frames,
            if self.looping { " - looping" } else { "" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoded_frame_accessors() {
        let frame = DecodedFrame::new(250.0, vec![0.1, 0.2, 0.3, 0.4]);

        assert_eq!(frame.time_ms(), 250.0);
        assert_eq!(frame.sample_frames(), 2);
        assert_eq!(frame.samples(), &[0.1, 0.2, 0.3, 0.4]);
        assert_eq!(frame.into_samples().len(), 4);
    }

    #[test]
    fn test_decoded_frame_duration() {
        let frame = DecodedFrame::new(0.0, vec![0.0; 2 * 441]);

        assert!((frame.duration_ms(44_100) - 10.0).abs() < 1e-9);
        assert_eq!(frame.duration_ms(0), 0.0);
    }

    #[test]
    fn test_decoder_state_round_trip_through_u8() {
        for state in [
            DecoderState::Ready,
            DecoderState::Running,
            DecoderState::EndOfStream,
            DecoderState::Faulted,
            DecoderState::Stopped,
        ] {
            assert_eq!(DecoderState::from_u8(state as u8), state);
        }
    }

    #[test]
    fn test_decoder_state_terminal() {
        assert!(DecoderState::Faulted.is_terminal());
        assert!(DecoderState::Stopped.is_terminal());
        assert!(!DecoderState::EndOfStream.is_terminal());
        assert_eq!(DecoderState::EndOfStream.to_string(), "END_OF_STREAM");
    }

    #[test]
    fn test_status_serializes_state_name() {
        let status = DecoderStatus {
            state: DecoderState::Running,
            last_decoded_frame_ms: 1500.0,
            duration_ms: 10_000.0,
            sample_rate: 44_100,
            channels: 2,
            buffered_frames: 3,
            hw_decoding_allowed: false,
            looping: true,
        };

        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"RUNNING\""));

        let summary = status.summary();
        assert!(summary.starts_with("RUNNING"));
        assert!(summary.contains("looping"));
    }
}
