//! JSONL state traces.
//!
//! A trace is one JSON [`StateRecord`] per line. Two runs with the same seed
//! and config produce byte-identical traces, which makes traces usable as
//! golden files. Blank lines and `#` comments are skipped when reading.

use crate::report::{ReportSink, StateRecord};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum TraceError {
    #[error("Failed to read trace file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse JSON at line {line}: {source}")]
    JsonParse {
        line: usize,
        source: serde_json::Error,
    },
}

/// Load a state trace from a file.
pub fn load_records(path: &Path) -> Result<Vec<StateRecord>, TraceError> {
    let file = File::open(path)?;
    parse_records(BufReader::new(file))
}

/// Parse a state trace from any reader.
pub fn parse_records<R: Read>(reader: BufReader<R>) -> Result<Vec<StateRecord>, TraceError> {
    let mut records = Vec::new();
    for (line_num, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let record: StateRecord =
            serde_json::from_str(trimmed).map_err(|e| TraceError::JsonParse {
                line: line_num + 1,
                source: e,
            })?;
        records.push(record);
    }
    Ok(records)
}

/// Sink that streams every state record as a JSON line.
///
/// The first write error is logged and the sink goes quiet afterwards.
#[derive(Debug)]
pub struct JsonlTraceSink<W: Write> {
    writer: Option<W>,
}

impl JsonlTraceSink<BufWriter<File>> {
    /// Create (or truncate) a trace file at `path`.
    pub fn create(path: &Path) -> io::Result<Self> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> JsonlTraceSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Some(writer),
        }
    }

    /// Recover the underlying writer (None if it failed earlier).
    pub fn into_inner(self) -> Option<W> {
        self.writer
    }
}

impl<W: Write> ReportSink for JsonlTraceSink<W> {
    fn record(&mut self, record: &StateRecord) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        let result = serde_json::to_writer(&mut *writer, record)
            .map_err(io::Error::from)
            .and_then(|_| writer.write_all(b"\n"));
        if let Err(e) = result {
            warn!(error = %e, "state trace write failed; disabling trace sink");
            self.writer = None;
        }
    }

    fn summary(&mut self, _summary: &crate::metrics::RunSummary) {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writer.flush() {
                warn!(error = %e, "state trace flush failed");
            }
        }
    }
}
