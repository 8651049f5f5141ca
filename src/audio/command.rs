//! Work queue feeding the decode thread.
//!
//! Any thread may push; only the decode thread drains. A pushed command can
//! optionally carry a completion signal so the caller blocks until the decode
//! thread has executed it.

use std::sync::mpsc::{self, Receiver, Sender, SyncSender, TryRecvError};

use crate::error::CommandError;

/// Work items executed on the decode thread
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DecoderCommand {
    /// Reposition the demuxer and reset the codec.
    ///
    /// `generation` identifies the request; the decode thread skips any seek
    /// superseded by a newer one.
    Seek { target_ms: f64, generation: u64 },
    /// Rebuild the codec context, e.g. after hardware decoding was disabled
    RecreateCodec,
}

struct Envelope<C> {
    command: C,
    done: Option<SyncSender<()>>,
}

/// Producer half of a command queue
pub struct CommandSender<C> {
    tx: Sender<Envelope<C>>,
}

impl<C> Clone for CommandSender<C> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

/// Consumer half, owned by the decode thread
pub struct CommandReceiver<C> {
    rx: Receiver<Envelope<C>>,
}

/// Create an unbounded FIFO command queue
pub fn command_queue<C>() -> (CommandSender<C>, CommandReceiver<C>) {
    let (tx, rx) = mpsc::channel();
    (CommandSender { tx }, CommandReceiver { rx })
}

impl<C> CommandSender<C> {
    /// Enqueue without waiting
    pub fn push(&self, command: C) -> Result<(), CommandError> {
        self.tx
            .send(Envelope { command, done: None })
            .map_err(|_| CommandError::Disconnected)
    }

    /// Enqueue and block until the decode thread has executed the command.
    ///
    /// Must not be called from the decode thread itself.
    pub fn push_and_sync(&self, command: C) -> Result<(), CommandError> {
        let (done_tx, done_rx) = mpsc::sync_channel(1);
        self.tx
            .send(Envelope {
                command,
                done: Some(done_tx),
            })
            .map_err(|_| CommandError::Disconnected)?;

        // Dropped unexecuted if the decode thread exits first.
        done_rx.recv().map_err(|_| CommandError::Disconnected)
    }
}

impl<C> CommandReceiver<C> {
    /// Execute every queued command in FIFO order, signalling waiters after each.
    ///
    /// Returns the number of commands executed.
    pub fn flush_pending<F>(&self, mut execute: F) -> usize
    where
        F: FnMut(C),
    {
        let mut executed = 0;
        loop {
            match self.rx.try_recv() {
                Ok(envelope) => {
                    execute(envelope.command);
                    if let Some(done) = envelope.done {
                        // The waiter may have gone away; nothing to do then.
                        let _ = done.send(());
                    }
                    executed += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        executed
    }
}
