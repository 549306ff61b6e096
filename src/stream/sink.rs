//! The destination-agnostic byte sink the framers write into.

use crate::error::Result;

/// A caller-owned destination for framed SSE bytes. Implementations are
/// expected to flush on every call: the kernel has no internal buffering
/// beyond one event's worth of text per block, so a sink that batches
/// writes defeats the point.
pub trait FrameSink {
    fn write_and_flush(&mut self, frame: &str) -> Result<()>;
}

/// An in-memory sink, useful for tests and for callers that want to collect
/// the full framed output before forwarding it.
#[derive(Debug, Default)]
pub struct VecSink(pub Vec<String>);

impl FrameSink for VecSink {
    fn write_and_flush(&mut self, frame: &str) -> Result<()> {
        self.0.push(frame.to_string());
        Ok(())
    }
}

impl VecSink {
    pub fn joined(&self) -> String {
        self.0.concat()
    }
}
