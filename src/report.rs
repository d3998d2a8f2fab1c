//! Delivery of final counts to an external sink.
//!
//! The core only produces the per-color counts; transporting them to a
//! remote endpoint is the host's business. A failed delivery is logged and
//! otherwise ignored, it never rolls back in-memory state.

use std::fmt;

/// Final tally for one color.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorCount {
    pub color: String,
    pub count: usize,
}

impl fmt::Display for ColorCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.color, self.count)
    }
}

/// Receiver of final counts; implemented by the host's transport.
pub trait ResultSink {
    /// Deliver one set of counts. Errors are reported as strings; the caller
    /// logs and drops them.
    fn deliver(&mut self, counts: &[ColorCount]) -> std::result::Result<(), String>;
}

/// Sink that only writes the counts to the log. Useful as a default and for
/// headless runs.
#[derive(Debug, Default)]
pub struct LogSink;

impl ResultSink for LogSink {
    fn deliver(&mut self, counts: &[ColorCount]) -> std::result::Result<(), String> {
        for count in counts {
            log::info!("count {}", count);
        }
        Ok(())
    }
}

/// Push counts to a sink, swallowing delivery failures.
pub fn report(sink: &mut dyn ResultSink, counts: &[ColorCount]) {
    if let Err(e) = sink.deliver(counts) {
        log::warn!("result delivery failed: {}", e);
    }
}
