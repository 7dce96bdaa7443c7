//! # Record Streams
//!
//! A [`Stream`] is a lazy pipeline over a record source. Combinators
//! accumulate in call order; nothing is read until [`Stream::iterate`]
//! drives the source. A stream is consumed by iteration and cannot be
//! restarted.
//!
//! Early exit (a satisfied LIMIT) uses the same mechanism as every scan in
//! the system: the callback returns the crate's stop marker, which the
//! initiating caller absorbs. Genuine callback errors propagate verbatim.

use super::Record;
use crate::errors::{absorb_stop, stop_scan};
use eyre::Result;

/// Anything that can push records through a callback.
pub trait RecordSource {
    fn iterate(&self, f: &mut dyn FnMut(&dyn Record) -> Result<()>) -> Result<()>;
}

impl<S: RecordSource + ?Sized> RecordSource for &S {
    fn iterate(&self, f: &mut dyn FnMut(&dyn Record) -> Result<()>) -> Result<()> {
        (**self).iterate(f)
    }
}

enum StreamOp<'a> {
    Filter(Box<dyn Fn(&dyn Record) -> Result<bool> + 'a>),
    Offset(usize),
    Limit(usize),
}

/// Lazy record pipeline.
pub struct Stream<'a> {
    source: Box<dyn RecordSource + 'a>,
    ops: Vec<StreamOp<'a>>,
}

impl<'a> Stream<'a> {
    pub fn new(source: impl RecordSource + 'a) -> Stream<'a> {
        Stream {
            source: Box::new(source),
            ops: Vec::new(),
        }
    }

    /// Keeps only records for which `pred` returns true.
    pub fn filter(mut self, pred: impl Fn(&dyn Record) -> Result<bool> + 'a) -> Stream<'a> {
        self.ops.push(StreamOp::Filter(Box::new(pred)));
        self
    }

    /// Skips the first `n` records that reach this stage.
    pub fn offset(mut self, n: usize) -> Stream<'a> {
        self.ops.push(StreamOp::Offset(n));
        self
    }

    /// Stops the pipeline after `n` records have been emitted.
    pub fn limit(mut self, n: usize) -> Stream<'a> {
        self.ops.push(StreamOp::Limit(n));
        self
    }

    /// Drives the pipeline, calling `f` for every surviving record.
    /// Consumes the stream; a stream is not restartable.
    pub fn iterate(self, f: &mut dyn FnMut(&dyn Record) -> Result<()>) -> Result<()> {
        let Stream { source, ops } = self;
        let mut counters = vec![0usize; ops.len()];

        let mut emit = |r: &dyn Record| -> Result<()> {
            for (op, seen) in ops.iter().zip(counters.iter_mut()) {
                match op {
                    StreamOp::Filter(pred) => {
                        if !pred(r)? {
                            return Ok(());
                        }
                    }
                    StreamOp::Offset(n) => {
                        if *seen < *n {
                            *seen += 1;
                            return Ok(());
                        }
                    }
                    StreamOp::Limit(n) => {
                        if *seen >= *n {
                            return Err(stop_scan());
                        }
                        *seen += 1;
                    }
                }
            }
            f(r)?;
            // Stop as soon as the last wanted record has been emitted, so a
            // LIMIT never touches the record after it.
            for (op, seen) in ops.iter().zip(counters.iter()) {
                if let StreamOp::Limit(n) = op {
                    if *seen >= *n {
                        return Err(stop_scan());
                    }
                }
            }
            Ok(())
        };

        absorb_stop(source.iterate(&mut emit))
    }
}
