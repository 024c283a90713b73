//! Multiplexes a call's three arguments onto one ordered sequence of parts.
//!
//! Arguments are written strictly in order: writing to (or ending) arg N
//! ends every earlier argument. Each flush emits the pending parts as one
//! [`ArgEvent::Parts`] batch. A batch always opens with the chunk of the
//! argument that was current when the previous batch closed, so the last
//! part of a batch continues into the first part of the next. Ending arg3
//! emits the final batch and then [`ArgEvent::Finish`].

use bytes::{Bytes, BytesMut};
use std::fmt;
use tokio::sync::mpsc;
use tracing::trace;

/// One of the three logical byte streams of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArgIndex {
    Arg1,
    Arg2,
    Arg3,
}

impl ArgIndex {
    pub const ALL: [ArgIndex; 3] = [ArgIndex::Arg1, ArgIndex::Arg2, ArgIndex::Arg3];

    fn position(self) -> usize {
        match self {
            ArgIndex::Arg1 => 0,
            ArgIndex::Arg2 => 1,
            ArgIndex::Arg3 => 2,
        }
    }
}

impl fmt::Display for ArgIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "arg{}", self.position() + 1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArgStreamError {
    #[error("{arg} written after it ended")]
    WriteAfterEnd { arg: ArgIndex },

    #[error("{arg} ended twice")]
    AlreadyEnded { arg: ArgIndex },

    #[error("argument stream already finished")]
    Finished,
}

/// Notifications from an [`OutArgStream`] to the response driving it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgEvent {
    /// Parts ready to go out; `is_last` marks the final batch of the call.
    Parts { parts: Vec<Bytes>, is_last: bool },
    Error(ArgStreamError),
    /// All three arguments ended and were flushed.
    Finish,
}

#[derive(Debug)]
pub struct OutArgStream {
    // index of the open argument; 3 once arg3 has ended
    current: usize,
    pending: Vec<BytesMut>,
    dirty: bool,
    finished: bool,
    events: mpsc::UnboundedSender<ArgEvent>,
}

impl OutArgStream {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ArgEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let stream = Self {
            current: 0,
            pending: vec![BytesMut::new()],
            dirty: false,
            finished: false,
            events,
        };
        (stream, rx)
    }

    /// The argument currently accepting writes.
    pub fn current(&self) -> Option<ArgIndex> {
        ArgIndex::ALL.get(self.current).copied()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Appends `chunk` to `arg`, ending any earlier argument still open.
    pub fn write(&mut self, arg: ArgIndex, chunk: &[u8]) {
        if self.finished {
            return self.fail(ArgStreamError::Finished);
        }
        if arg.position() < self.current {
            return self.fail(ArgStreamError::WriteAfterEnd { arg });
        }
        self.advance_to(arg.position());
        if let Some(last) = self.pending.last_mut() {
            last.extend_from_slice(chunk);
        }
        self.dirty = true;
    }

    /// Ends `arg`. Ending arg3 flushes the final batch and finishes.
    pub fn end(&mut self, arg: ArgIndex) {
        if self.finished {
            return self.fail(ArgStreamError::Finished);
        }
        if arg.position() < self.current {
            return self.fail(ArgStreamError::AlreadyEnded { arg });
        }
        self.advance_to(arg.position());
        self.current += 1;
        if self.current < ArgIndex::ALL.len() {
            self.pending.push(BytesMut::new());
        }
        self.dirty = true;

        if self.current == ArgIndex::ALL.len() {
            self.flush_parts(true);
            self.finished = true;
            let _ = self.events.send(ArgEvent::Finish);
        }
    }

    /// Emits pending parts, if anything changed since the last flush.
    pub fn flush(&mut self) {
        if self.dirty && !self.finished {
            self.flush_parts(false);
        }
    }

    /// Ends every argument at once and drops whatever was pending.
    ///
    /// No further events are emitted; used when the response fails.
    pub fn finish_all(&mut self) {
        if self.finished {
            return;
        }
        trace!(
            open = ?self.current(),
            pending = self.pending.len(),
            "argument stream forced to finish"
        );
        self.current = ArgIndex::ALL.len();
        self.pending.clear();
        self.dirty = false;
        self.finished = true;
    }

    fn advance_to(&mut self, position: usize) {
        while self.current < position {
            self.current += 1;
            self.pending.push(BytesMut::new());
        }
    }

    fn flush_parts(&mut self, is_last: bool) {
        let next = if is_last {
            Vec::new()
        } else {
            vec![BytesMut::new()]
        };
        let parts = std::mem::replace(&mut self.pending, next)
            .into_iter()
            .map(BytesMut::freeze)
            .collect();
        self.dirty = false;
        let _ = self.events.send(ArgEvent::Parts { parts, is_last });
    }

    fn fail(&self, err: ArgStreamError) {
        let _ = self.events.send(ArgEvent::Error(err));
    }
}
