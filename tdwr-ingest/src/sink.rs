//! JSON-lines output sink: one serialized `OutputMessage` per line.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use tdwr_core::{OutputMessage, OutputSink, Result, TdwrError};

pub struct JsonLinesSink<W: Write> {
    writer: W,
    pub messages: u64,
}

impl JsonLinesSink<Box<dyn Write>> {
    /// Open the output named on the command line; `-` is stdout.
    pub fn open(path: &Path) -> io::Result<Self> {
        let writer: Box<dyn Write> = if path == Path::new("-") {
            Box::new(BufWriter::new(io::stdout()))
        } else {
            Box::new(BufWriter::new(File::create(path)?))
        };
        Ok(JsonLinesSink::new(writer))
    }
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        JsonLinesSink {
            writer,
            messages: 0,
        }
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| TdwrError::Sink(format!("flush failed: {e}")))
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> OutputSink for JsonLinesSink<W> {
    fn send(&mut self, msg: &OutputMessage) -> Result<()> {
        serde_json::to_writer(&mut self.writer, msg)
            .map_err(|e| TdwrError::Sink(format!("{}: {e}", msg.kind())))?;
        self.writer
            .write_all(b"\n")
            .map_err(|e| TdwrError::Sink(format!("{}: {e}", msg.kind())))?;
        self.messages += 1;

        // Boundary messages are rare; push them out promptly for live readers.
        if !matches!(msg, OutputMessage::Beam(_)) {
            self.flush()?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
