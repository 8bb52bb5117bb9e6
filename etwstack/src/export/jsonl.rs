//! JSON-lines writer for resolved output

use std::io::Write;

use crate::domain::ExportError;
use crate::trace_data::TraceOutput;

/// Writes one serialized [`TraceOutput`] per line
pub struct JsonLinesWriter<W: Write> {
    writer: W,
    written: usize,
}

impl<W: Write> JsonLinesWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    /// # Errors
    /// Returns an error if serialization or the underlying write fails
    pub fn write(&mut self, output: &TraceOutput) -> Result<(), ExportError> {
        serde_json::to_writer(&mut self.writer, output)?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    /// # Errors
    /// Returns an error if the underlying writer fails to flush
    pub fn flush(&mut self) -> Result<(), ExportError> {
        self.writer.flush()?;
        Ok(())
    }

    #[must_use]
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
