//! Result sinks and the human-readable run summary.
//!
//! Result records go to stdout as JSON lines; everything meant for people
//! (logs, the summary) goes to stderr.

mod summary;

pub use summary::SummaryPrinter;

use crate::error::Result;
use crate::models::BenchmarkResult;
use std::io::{self, Write};

/// Destination for completed result batches
pub trait ResultSink: Send {
    fn emit(&mut self, result: &BenchmarkResult) -> Result<()>;
}

/// Writes one JSON object per record and flushes after each
#[derive(Debug)]
pub struct JsonLineSink<W: Write + Send> {
    writer: W,
    pretty: bool,
}

impl<W: Write + Send> JsonLineSink<W> {
    pub fn new(writer: W, pretty: bool) -> Self {
        Self { writer, pretty }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl JsonLineSink<io::Stdout> {
    pub fn stdout(pretty: bool) -> Self {
        Self::new(io::stdout(), pretty)
    }
}

impl<W: Write + Send> ResultSink for JsonLineSink<W> {
    fn emit(&mut self, result: &BenchmarkResult) -> Result<()> {
        let record = result.to_json(self.pretty)?;
        writeln!(self.writer, "{}", record)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Keeps every record in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Vec<BenchmarkResult>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[BenchmarkResult] {
        &self.records
    }
}

impl ResultSink for MemorySink {
    fn emit(&mut self, result: &BenchmarkResult) -> Result<()> {
        self.records.push(result.clone());
        Ok(())
    }
}
