//! Structured logging for the benchmark orchestrator
//!
//! Loggers are plain values handed to every component at construction time;
//! there is no global logger. A component gets its own named logger through
//! [`Logger::named`] or [`LoggerFactory`], and all loggers derived from one
//! root share the session id and the output sink.
//!
//! Every entry goes to stderr. Stdout is reserved for result records.

use crate::error::AppError;
use crate::models::Config;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Log level enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    /// Plumbing commands and raw process output
    Trace = 0,
    /// Benchmark process output
    Debug = 1,
    Info = 2,
    /// Recoverable trial failures
    Warn = 3,
    Error = 4,
    /// Errors that end the run
    Fatal = 5,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
        }
    }

    /// ANSI color code for console output
    fn color_code(&self) -> &'static str {
        match self {
            LogLevel::Trace => "\x1b[37m",
            LogLevel::Debug => "\x1b[36m",
            LogLevel::Info => "\x1b[32m",
            LogLevel::Warn => "\x1b[33m",
            LogLevel::Error => "\x1b[31m",
            LogLevel::Fatal => "\x1b[35m",
        }
    }
}

const RESET_CODE: &str = "\x1b[0m";

/// Log entry structure for structured logging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    /// Component that logged the entry
    pub logger: String,
    pub fields: HashMap<String, serde_json::Value>,
    pub location: Option<LogLocation>,
}

/// Source code location, filled in by the logging macros
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLocation {
    pub file: String,
    pub line: u32,
    pub module: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogFormat {
    /// `<timestamp> <LEVEL> [<component>] <message> {fields}`
    Console,
    /// One JSON object per entry
    Json,
}

/// Where finished entries go
#[derive(Debug, Clone)]
pub enum LogOutput {
    Stderr,
    /// Retain entries in memory; used by tests and embedding callers
    Memory(Arc<Mutex<Vec<LogEntry>>>),
}

/// Logger handle; clones share the session and the output
#[derive(Debug, Clone)]
pub struct Logger {
    min_level: LogLevel,
    use_color: bool,
    include_location: bool,
    format: LogFormat,
    name: String,
    session_id: Option<Arc<str>>,
    output: LogOutput,
}

impl Logger {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            min_level: LogLevel::Info,
            use_color: true,
            include_location: false,
            format: LogFormat::Console,
            name: name.into(),
            session_id: None,
            output: LogOutput::Stderr,
        }
    }

    /// Level, colour and format follow the run configuration
    pub fn with_config<S: Into<String>>(name: S, config: &Config) -> Self {
        let min_level = if config.debug {
            LogLevel::Debug
        } else if config.verbose {
            LogLevel::Info
        } else {
            LogLevel::Warn
        };

        Self {
            min_level,
            use_color: config.enable_color,
            include_location: config.debug,
            format: if config.log_json { LogFormat::Json } else { LogFormat::Console },
            ..Self::new(name)
        }
    }

    /// A logger that records every entry in memory, for assertions
    pub fn capture<S: Into<String>>(name: S) -> (Self, LogCapture) {
        let entries = Arc::new(Mutex::new(Vec::new()));
        let logger = Self {
            min_level: LogLevel::Trace,
            use_color: false,
            output: LogOutput::Memory(entries.clone()),
            ..Self::new(name)
        };
        (logger, LogCapture { entries })
    }

    /// Derive a logger for another component, sharing session and output
    pub fn named<S: Into<String>>(&self, name: S) -> Self {
        let mut logger = self.clone();
        logger.name = name.into();
        logger
    }

    pub fn log(&self, level: LogLevel, message: &str) -> LogEntryBuilder<'_> {
        LogEntryBuilder::new(self, level, message.to_string())
    }

    pub fn trace(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Trace, message)
    }

    pub fn debug(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Debug, message)
    }

    pub fn info(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Info, message)
    }

    pub fn warn(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Warn, message)
    }

    pub fn error(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Error, message)
    }

    pub fn fatal(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Fatal, message)
    }

    fn write_entry(&self, mut entry: LogEntry) {
        if entry.level < self.min_level {
            return;
        }
        if let Some(session_id) = &self.session_id {
            entry
                .fields
                .insert("session_id".to_string(), serde_json::Value::String(session_id.to_string()));
        }

        match &self.output {
            LogOutput::Stderr => {
                let output = match self.format {
                    LogFormat::Console => self.format_console(&entry),
                    LogFormat::Json => self.format_json(&entry),
                };
                let _ = writeln!(io::stderr(), "{}", output);
            }
            LogOutput::Memory(entries) => {
                if let Ok(mut entries) = entries.lock() {
                    entries.push(entry);
                }
            }
        }
    }

    fn format_console(&self, entry: &LogEntry) -> String {
        let timestamp = entry.timestamp.format("%Y-%m-%d %H:%M:%S%.3f");
        let level = if self.use_color {
            format!("{}{:>5}{}", entry.level.color_code(), entry.level.as_str(), RESET_CODE)
        } else {
            format!("{:>5}", entry.level.as_str())
        };

        let mut output = format!("{} {} [{}] {}", timestamp, level, entry.logger, entry.message);

        // Session id is noise on the console
        let mut fields: Vec<String> = entry
            .fields
            .iter()
            .filter(|(k, _)| k.as_str() != "session_id")
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        if !fields.is_empty() {
            fields.sort();
            output.push_str(&format!(" {{{}}}", fields.join(", ")));
        }

        if self.include_location {
            if let Some(location) = &entry.location {
                output.push_str(&format!(" @ {}:{}", location.file, location.line));
            }
        }

        output
    }

    fn format_json(&self, entry: &LogEntry) -> String {
        match serde_json::to_string(entry) {
            Ok(json) => json,
            Err(_) => format!("{{\"error\": \"Failed to serialize log entry\", \"message\": \"{}\"}}", entry.message),
        }
    }
}

/// Handle onto the entries recorded by a [`Logger::capture`] logger
#[derive(Debug, Clone)]
pub struct LogCapture {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl LogCapture {
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn messages(&self, level: LogLevel) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|e| e.level == level)
            .map(|e| e.message)
            .collect()
    }

    pub fn contains(&self, level: LogLevel, needle: &str) -> bool {
        self.messages(level).iter().any(|m| m.contains(needle))
    }
}

/// Builder pattern for creating log entries
pub struct LogEntryBuilder<'a> {
    logger: &'a Logger,
    entry: LogEntry,
}

impl<'a> LogEntryBuilder<'a> {
    fn new(logger: &'a Logger, level: LogLevel, message: String) -> Self {
        Self {
            logger,
            entry: LogEntry {
                timestamp: Utc::now(),
                level,
                message,
                logger: logger.name.clone(),
                fields: HashMap::new(),
                location: None,
            },
        }
    }

    /// Add a structured field
    pub fn field<T: Serialize>(mut self, key: &str, value: T) -> Self {
        if let Ok(json_value) = serde_json::to_value(value) {
            self.entry.fields.insert(key.to_string(), json_value);
        }
        self
    }

    pub fn location(mut self, file: &str, line: u32, module: Option<&str>) -> Self {
        self.entry.location = Some(LogLocation {
            file: file.to_string(),
            line,
            module: module.map(String::from),
        });
        self
    }

    pub fn error_info(self, error: &AppError) -> Self {
        self.field("error_category", error.category())
            .field("error_recoverable", error.is_recoverable())
            .field("error_exit_code", error.exit_code())
    }

    pub async fn log(self) {
        self.logger.write_entry(self.entry);
    }
}

/// Times named phases (topology build, shaping, server start) of a run
pub struct PerformanceLogger {
    logger: Logger,
    start_times: HashMap<String, DateTime<Utc>>,
}

impl PerformanceLogger {
    pub fn new(logger: Logger) -> Self {
        Self {
            logger,
            start_times: HashMap::new(),
        }
    }

    pub async fn start_timing(&mut self, operation: &str) {
        self.start_times.insert(operation.to_string(), Utc::now());
        self.logger
            .debug(&format!("Started timing: {}", operation))
            .field("operation", operation)
            .log()
            .await;
    }

    /// End timing an operation and log the duration
    pub async fn end_timing(&mut self, operation: &str) -> Option<chrono::Duration> {
        match self.start_times.remove(operation) {
            Some(start_time) => {
                let duration = Utc::now() - start_time;
                self.logger
                    .info(&format!("Completed {} in {}ms", operation, duration.num_milliseconds()))
                    .field("operation", operation)
                    .field("duration_ms", duration.num_milliseconds())
                    .log()
                    .await;
                Some(duration)
            }
            None => {
                self.logger
                    .warn(&format!("Attempted to end timing for unknown operation: {}", operation))
                    .field("operation", operation)
                    .log()
                    .await;
                None
            }
        }
    }
}

/// Creates per-component loggers sharing one session
pub struct LoggerFactory {
    root: Logger,
    session_id: Arc<str>,
}

impl LoggerFactory {
    pub fn new(config: &Config) -> Self {
        Self::from_root(Logger::with_config("MAIN", config))
    }

    /// Build the factory on top of an existing root logger
    pub fn from_root(mut root: Logger) -> Self {
        let session_id: Arc<str> = Uuid::new_v4().to_string().into();
        root.session_id = Some(session_id.clone());
        Self { root, session_id }
    }

    pub fn create_logger(&self, name: &str) -> Logger {
        self.root.named(name)
    }

    pub fn create_performance_logger(&self) -> PerformanceLogger {
        PerformanceLogger::new(self.root.named("PERF"))
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

/// Log at INFO with the call site attached
#[macro_export]
macro_rules! log_info {
    ($logger:expr, $($arg:tt)*) => {
        $logger.info(&format!($($arg)*))
            .location(file!(), line!(), Some(module_path!()))
            .log()
            .await
    };
}

/// Log at WARN with the call site attached
#[macro_export]
macro_rules! log_warn {
    ($logger:expr, $($arg:tt)*) => {
        $logger.warn(&format!($($arg)*))
            .location(file!(), line!(), Some(module_path!()))
            .log()
            .await
    };
}
