//! Byte source adapter.
//!
//! The decoder reads compressed input through [`ByteSource`], a minimal
//! read + seek + length contract. [`MediaSourceAdapter`] puts a fixed-size read buffer
//! in front of a source and exposes it to the demuxer as a symphonia `MediaSource`.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use symphonia::core::io::MediaSource;

/// Origin for [`ByteSource::seek`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    /// Absolute offset from the start
    Set,
    /// Relative to the current position
    Cur,
    /// Relative to the end
    End,
    /// Query the total length without moving
    Size,
}

/// Result of a single read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    Bytes(usize),
    Eof,
}

/// Seekable input of compressed bytes (local file or remote stream)
pub trait ByteSource: Send + Sync {
    /// Read up to `buf.len()` bytes
    fn read(&mut self, buf: &mut [u8]) -> io::Result<ReadOutcome>;

    /// Move the read position and return the new absolute position.
    ///
    /// With [`Whence::Size`] the offset is ignored and the total length is returned.
    fn seek(&mut self, offset: i64, whence: Whence) -> io::Result<u64>;

    /// Total length in bytes
    fn len(&mut self) -> io::Result<u64> {
        self.seek(0, Whence::Size)
    }

    fn is_seekable(&self) -> bool {
        true
    }
}

/// [`ByteSource`] over any seekable reader
pub struct ReaderSource<R> {
    inner: R,
    len: Option<u64>,
}

/// Byte source backed by a local file
pub type FileSource = ReaderSource<File>;

impl ReaderSource<File> {
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata().ok().map(|m| m.len());
        Ok(Self { inner: file, len })
    }
}

impl<R: Read + Seek> ReaderSource<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, len: None }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn stream_len(&mut self) -> io::Result<u64> {
        if let Some(len) = self.len {
            return Ok(len);
        }
        let current = self.inner.stream_position()?;
        let end = self.inner.seek(SeekFrom::End(0))?;
        self.inner.seek(SeekFrom::Start(current))?;
        self.len = Some(end);
        Ok(end)
    }
}

impl<R: Read + Seek + Send + Sync> ByteSource for ReaderSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<ReadOutcome> {
        if buf.is_empty() {
            return Ok(ReadOutcome::Bytes(0));
        }
        match self.inner.read(buf)? {
            0 => Ok(ReadOutcome::Eof),
            n => Ok(ReadOutcome::Bytes(n)),
        }
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> io::Result<u64> {
        match whence {
            Whence::Set => {
                let start = u64::try_from(offset).map_err(|_| {
                    io::Error::new(io::ErrorKind::InvalidInput, "negative absolute seek offset")
                })?;
                self.inner.seek(SeekFrom::Start(start))
            }
            Whence::Cur => self.inner.seek(SeekFrom::Current(offset)),
            Whence::End => self.inner.seek(SeekFrom::End(offset)),
            Whence::Size => self.stream_len(),
        }
    }
}

/// Buffered bridge from a [`ByteSource`] to the demuxer's `MediaSource`
pub struct MediaSourceAdapter {
    source: Box<dyn ByteSource>,
    buffer: Vec<u8>,
    pos: usize,
    filled: usize,
    // Absolute offset of `buffer[0]`.
    buffer_start: u64,
    byte_len: Option<u64>,
    seekable: bool,
}

impl MediaSourceAdapter {
    pub fn new(mut source: Box<dyn ByteSource>, buffer_size: usize) -> Self {
        let byte_len = source.len().ok();
        let seekable = source.is_seekable();
        Self {
            source,
            buffer: vec![0; buffer_size.max(1)],
            pos: 0,
            filled: 0,
            buffer_start: 0,
            byte_len,
            seekable,
        }
    }

    fn position(&self) -> u64 {
        self.buffer_start + self.pos as u64
    }

    fn refill(&mut self) -> io::Result<usize> {
        let next_start = self.buffer_start + self.filled as u64;
        match self.source.read(&mut self.buffer)? {
            ReadOutcome::Eof => {
                self.buffer_start = next_start;
                self.pos = 0;
                self.filled = 0;
                Ok(0)
            }
            ReadOutcome::Bytes(n) => {
                self.buffer_start = next_start;
                self.pos = 0;
                self.filled = n;
                Ok(n)
            }
        }
    }
}

impl Read for MediaSourceAdapter {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        if self.pos >= self.filled && self.refill()? == 0 {
            return Ok(0);
        }
        let n = out.len().min(self.filled - self.pos);
        out[..n].copy_from_slice(&self.buffer[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

impl Seek for MediaSourceAdapter {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset,
            SeekFrom::Current(delta) => {
                let current = self.position() as i64;
                u64::try_from(current + delta).map_err(|_| {
                    io::Error::new(io::ErrorKind::InvalidInput, "seek before start of stream")
                })?
            }
            SeekFrom::End(delta) => {
                let absolute = self.source.seek(delta, Whence::End)?;
                self.buffer_start = absolute;
                self.pos = 0;
                self.filled = 0;
                return Ok(absolute);
            }
        };

        // Stay inside the current buffer when possible.
        let buffer_end = self.buffer_start + self.filled as u64;
        if target >= self.buffer_start && target <= buffer_end {
            self.pos = (target - self.buffer_start) as usize;
            return Ok(target);
        }

        let offset = i64::try_from(target)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "seek offset overflow"))?;
        let absolute = self.source.seek(offset, Whence::Set)?;
        self.buffer_start = absolute;
        self.pos = 0;
        self.filled = 0;
        Ok(absolute)
    }
}

impl MediaSource for MediaSourceAdapter {
    fn is_seekable(&self) -> bool {
        self.seekable
    }

    fn byte_len(&self) -> Option<u64> {
        self.byte_len
    }
}
