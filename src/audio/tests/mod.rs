//! Scenario tests driving the full decode thread against the scripted backend.


use std::io::Cursor;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::audio::backend::testing::ScriptedBackend;
use crate::audio::source::{ByteSource, ReaderSource};
use crate::audio::StreamDecoder;
use crate::config::DecoderConfig;
use crate::models::{DecodedFrame, DecoderState};

const DEADLINE: Duration = Duration::from_secs(10);

fn empty_source() -> Box<dyn ByteSource> {
    Box::new(ReaderSource::new(Cursor::new(Vec::new())))
}

/// Build a decoder over `backend` without starting it
fn decoder_for(backend: &ScriptedBackend, config: DecoderConfig) -> StreamDecoder {
    StreamDecoder::with_backend(empty_source(), None, Arc::new(backend.clone()), config).unwrap()
}

fn started(backend: &ScriptedBackend, config: DecoderConfig) -> StreamDecoder {
    let decoder = decoder_for(backend, config);
    decoder.start().unwrap();
    decoder
}

/// Keep draining until `done` accepts everything collected so far
fn drain_until<F>(decoder: &StreamDecoder, mut done: F) -> Vec<DecodedFrame>
where
    F: FnMut(&[DecodedFrame]) -> bool,
{
    let deadline = Instant::now() + DEADLINE;
    let mut frames = Vec::new();
    loop {
        frames.extend(decoder.drain_frames());
        if done(&frames) {
            return frames;
        }
        assert!(
            Instant::now() < deadline,
            "gave up after {} frames in state {}",
            frames.len(),
            decoder.state()
        );
        thread::sleep(Duration::from_millis(1));
    }
}

/// Drain everything until the decoder parks at end of stream
fn drain_to_end(decoder: &StreamDecoder) -> Vec<DecodedFrame> {
    let mut frames = drain_until(decoder, |_| decoder.state() == DecoderState::EndOfStream);
    frames.extend(decoder.drain_frames());
    frames
}

fn wait_for_state(decoder: &StreamDecoder, state: DecoderState) -> bool {
    let deadline = Instant::now() + DEADLINE;
    while Instant::now() < deadline {
        if decoder.state() == state {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    false
}

fn times(frames: &[DecodedFrame]) -> Vec<f64> {
    frames.iter().map(DecodedFrame::time_ms).collect()
}

/// Frames start at `first_ms` and follow each other packet by packet
fn assert_contiguous(frames: &[DecodedFrame], first_ms: f64, step_ms: f64) {
    for (i, frame) in frames.iter().enumerate() {
        let expected = first_ms + i as f64 * step_ms;
        assert!(
            (frame.time_ms() - expected).abs() < 1e-6,
            "frame {} at {} ms, expected {} ms",
            i,
            frame.time_ms(),
            expected
        );
    }
}
