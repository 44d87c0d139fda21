//! Scripted socket and processor for state machine tests.

use std::collections::VecDeque;
use std::io;
use std::sync::{Mutex, PoisonError};

use super::processor::{CommandBuffer, CommandProcessor, Verdict};
use super::source::Source;

/// One scripted outcome of a `read` call.
#[derive(Debug, Clone)]
pub(crate) enum ReadStep {
    /// Bytes available; a chunk larger than the destination is split.
    Data(Vec<u8>),
    WouldBlock,
    Eof,
    Fail(io::ErrorKind),
}

/// One scripted outcome of a `write` call.
#[derive(Debug, Clone, Copy)]
pub(crate) enum WriteStep {
    /// Accept at most this many bytes.
    Accept(usize),
    WouldBlock,
    Fail(io::ErrorKind),
}

/// A socket driven by a script. Once the read script runs out every read
/// would block; once the write script runs out every write is accepted in
/// full.
#[derive(Debug, Default)]
pub(crate) struct MockSource {
    reads: VecDeque<ReadStep>,
    writes: VecDeque<WriteStep>,
    written: Vec<u8>,
    read_calls: usize,
}

impl MockSource {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_read(self, data: &[u8]) -> Self {
        self.with_step(ReadStep::Data(data.to_vec()))
    }

    pub(crate) fn with_step(mut self, step: ReadStep) -> Self {
        self.reads.push_back(step);
        self
    }

    pub(crate) fn with_write(mut self, step: WriteStep) -> Self {
        self.writes.push_back(step);
        self
    }

    /// Appends a read step to a source that is already in use.
    pub(crate) fn push_read(&mut self, step: ReadStep) {
        self.reads.push_back(step);
    }

    /// Appends a write step to a source that is already in use.
    pub(crate) fn push_write(&mut self, step: WriteStep) {
        self.writes.push_back(step);
    }

    /// Everything the state machine has written so far.
    pub(crate) fn written(&self) -> &[u8] {
        &self.written
    }

    pub(crate) fn read_calls(&self) -> usize {
        self.read_calls
    }
}

impl Source for MockSource {
    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        self.read_calls += 1;

        match self.reads.pop_front() {
            None | Some(ReadStep::WouldBlock) => Err(io::ErrorKind::WouldBlock.into()),
            Some(ReadStep::Eof) => Ok(0),
            Some(ReadStep::Fail(kind)) => Err(kind.into()),
            Some(ReadStep::Data(mut data)) => {
                let n = data.len().min(dst.len());
                dst[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    self.reads.push_front(ReadStep::Data(data.split_off(n)));
                }
                Ok(n)
            }
        }
    }

    fn write(&mut self, src: &[u8]) -> io::Result<usize> {
        match self.writes.pop_front() {
            None => {
                self.written.extend_from_slice(src);
                Ok(src.len())
            }
            Some(WriteStep::Accept(limit)) => {
                let n = limit.min(src.len());
                self.written.extend_from_slice(&src[..n]);
                Ok(n)
            }
            Some(WriteStep::WouldBlock) => Err(io::ErrorKind::WouldBlock.into()),
            Some(WriteStep::Fail(kind)) => Err(kind.into()),
        }
    }
}

/// A processor that returns a scripted sequence of verdicts and records the
/// bytes it was shown.
#[derive(Debug, Default)]
pub(crate) struct ScriptedProcessor {
    script: Mutex<VecDeque<(Verdict, Option<Vec<u8>>)>>,
    inputs: Mutex<Vec<Vec<u8>>>,
}

impl ScriptedProcessor {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn verdict(self, verdict: Verdict) -> Self {
        self.push(verdict, None)
    }

    pub(crate) fn respond(self, reply: &[u8]) -> Self {
        self.push(Verdict::ResponseReady, Some(reply.to_vec()))
    }

    pub(crate) fn incomplete(self) -> Self {
        self.verdict(Verdict::Incomplete)
    }

    pub(crate) fn malformed(self) -> Self {
        self.verdict(Verdict::Malformed)
    }

    fn push(self, verdict: Verdict, reply: Option<Vec<u8>>) -> Self {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back((verdict, reply));
        self
    }

    /// The buffer contents seen by each `process` call, in order.
    pub(crate) fn inputs(&self) -> Vec<Vec<u8>> {
        self.inputs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl CommandProcessor for ScriptedProcessor {
    fn process(&self, cmd: &mut CommandBuffer<'_>) -> Verdict {
        self.inputs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(cmd.received().to_vec());

        let (verdict, reply) = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .expect("processor called more often than scripted");

        if let Some(reply) = reply {
            cmd.reply(&reply).expect("scripted reply larger than the buffer");
        }
        verdict
    }
}
