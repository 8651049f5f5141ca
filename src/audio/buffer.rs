use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::models::DecodedFrame;

/// Bounded queue of decoded frames shared by the decode thread and the consumer.
///
/// One mutex guards the whole sequence and is only held for queue mutation, never
/// across a decode or conversion call. The capacity bounds how far the decode
/// thread runs ahead; frames handed back with [`FrameBuffer::push_back`] are not
/// counted against it.
#[derive(Debug)]
pub struct FrameBuffer {
    frames: Mutex<VecDeque<DecodedFrame>>,
    capacity: usize,
}

impl FrameBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<DecodedFrame>> {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Whether the producer may decode another frame
    pub fn has_room(&self) -> bool {
        self.lock().len() < self.capacity
    }

    /// Append `frame` unless `reject` says otherwise; evaluated under the lock.
    ///
    /// The rejected frame is handed back so its storage can be reused.
    pub fn push_unless<F>(&self, frame: DecodedFrame, reject: F) -> Result<(), DecodedFrame>
    where
        F: FnOnce() -> bool,
    {
        let mut frames = self.lock();
        if reject() {
            return Err(frame);
        }
        frames.push_back(frame);
        Ok(())
    }

    /// Append without any check (frames returned by the consumer)
    pub fn push_back(&self, frame: DecodedFrame) {
        self.lock().push_back(frame);
    }

    pub fn extend<I>(&self, frames: I)
    where
        I: IntoIterator<Item = DecodedFrame>,
    {
        self.lock().extend(frames);
    }

    /// Atomically empty the buffer and return its frames in order
    pub fn drain(&self) -> Vec<DecodedFrame> {
        self.lock().drain(..).collect()
    }

    /// Empty the buffer and run `then` before the lock is released
    pub fn clear_with<F>(&self, then: F) -> Vec<DecodedFrame>
    where
        F: FnOnce(),
    {
        let mut frames = self.lock();
        let cleared = frames.drain(..).collect();
        then();
        cleared
    }
}

/// Free-list of sample buffers handed back by the consumer
#[derive(Debug)]
pub struct FramePool {
    buffers: Mutex<Vec<Vec<f32>>>,
    max_pooled: usize,
}

impl FramePool {
    pub fn new(max_pooled: usize) -> Self {
        Self {
            buffers: Mutex::new(Vec::new()),
            max_pooled,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Vec<f32>>> {
        self.buffers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// An empty buffer with room for at least `samples` values
    pub fn take(&self, samples: usize) -> Vec<f32> {
        match self.lock().pop() {
            Some(mut buffer) => {
                buffer.clear();
                buffer.reserve(samples);
                buffer
            }
            None => Vec::with_capacity(samples),
        }
    }

    pub fn recycle(&self, buffer: Vec<f32>) {
        if buffer.capacity() == 0 {
            return;
        }
        let mut buffers = self.lock();
        if buffers.len() < self.max_pooled {
            buffers.push(buffer);
        }
    }

    pub fn pooled(&self) -> usize {
        self.lock().len()
    }
}
