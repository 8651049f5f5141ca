pub mod backend;
pub mod buffer;
pub mod command;
pub mod decoder;
pub mod engine;
pub mod normalizer;
pub mod reader;
pub mod selection;
pub mod source;

#[cfg(test)]
mod tests;

// Re-export the consumer-facing types
pub use decoder::StreamDecoder;
pub use reader::FrameReader;

// Re-export input types
pub use source::{ByteSource, FileSource, ReadOutcome, ReaderSource, Whence};

// Re-export the backend seam
pub use backend::native::SymphoniaBackend;
pub use backend::{CodecContext, Demuxer, MediaBackend, RawFrame, SampleData, SampleFormat, StreamInfo};
pub use selection::{DecoderCandidate, DecoderDescriptor, HardwareKind};
