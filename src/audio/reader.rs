use std::collections::VecDeque;
use std::sync::Arc;

use log::debug;

use crate::audio::decoder::StreamDecoder;
use crate::models::{DecodedFrame, OUTPUT_CHANNELS};

/// Turns drained frames into a continuous interleaved stereo stream
pub struct FrameReader {
    decoder: Arc<StreamDecoder>,
    queue: VecDeque<DecodedFrame>,
    // Stereo frames already read from the front of `queue`.
    offset: usize,
    position_ms: f64,
    lenience_ms: f64,
}

impl FrameReader {
    pub fn new(decoder: Arc<StreamDecoder>) -> Self {
        let lenience_ms = decoder.config().seek_lenience_ms;
        Self {
            decoder,
            queue: VecDeque::new(),
            offset: 0,
            position_ms: 0.0,
            lenience_ms,
        }
    }

    pub fn decoder(&self) -> &Arc<StreamDecoder> {
        &self.decoder
    }

    /// Playback position of the next sample to be written
    pub fn position_ms(&self) -> f64 {
        self.position_ms
    }

    /// Frames held locally, including a partially read one
    pub fn queued_frames(&self) -> usize {
        self.queue.len()
    }

    /// Fill `out` with interleaved stereo samples.
    ///
    /// Returns the number of stereo frames written; the remainder of `out` is
    /// zeroed when the decoder has nothing more buffered.
    pub fn fill(&mut self, out: &mut [f32]) -> usize {
        let wanted = out.len() / OUTPUT_CHANNELS;
        let sample_rate = self.decoder.sample_rate();
        let mut written = 0;

        while written < wanted {
            if self.queue.is_empty() {
                self.queue.extend(self.decoder.drain_frames());
                if self.queue.is_empty() {
                    break;
                }
            }

            let Some(front) = self.queue.front() else {
                break;
            };
            if self.offset == 0 && (front.time_ms() - self.position_ms).abs() > self.lenience_ms {
                debug!(
                    "Resynchronising reader from {:.1} ms to {:.1} ms",
                    self.position_ms,
                    front.time_ms()
                );
                self.position_ms = front.time_ms();
            }

            let available = front.sample_frames() - self.offset;
            let count = available.min(wanted - written);
            let from = self.offset * OUTPUT_CHANNELS;
            let to = written * OUTPUT_CHANNELS;
            out[to..to + count * OUTPUT_CHANNELS]
                .copy_from_slice(&front.samples()[from..from + count * OUTPUT_CHANNELS]);

            written += count;
            self.offset += count;
            if sample_rate > 0 {
                self.position_ms = front.time_ms() + self.offset as f64 * 1000.0 / sample_rate as f64;
            }

            if self.offset >= front.sample_frames() {
                if let Some(done) = self.queue.pop_front() {
                    self.decoder.recycle_frame(done);
                }
                self.offset = 0;
            }
        }

        out[written * OUTPUT_CHANNELS..].fill(0.0);
        written
    }

    /// Hand every unread whole frame back to the decoder, in order
    pub fn release(&mut self) {
        if self.offset > 0 {
            if let Some(partial) = self.queue.pop_front() {
                self.decoder.recycle_frame(partial);
            }
            self.offset = 0;
        }
        let unread: Vec<DecodedFrame> = self.queue.drain(..).collect();
        if !unread.is_empty() {
            self.decoder.return_frames(unread);
        }
    }

    /// Drop local frames and reposition both the reader and the decoder
    pub fn seek(&mut self, target_ms: f64, wait: bool) -> Result<(), crate::error::DecoderError> {
        for frame in self.queue.drain(..) {
            self.decoder.recycle_frame(frame);
        }
        self.offset = 0;
        self.position_ms = target_ms.max(0.0);
        self.decoder.seek(target_ms, wait)
    }
}
