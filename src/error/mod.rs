//! Error handling for the benchmark orchestrator

use thiserror::Error;

/// Error types raised while building topologies and running benchmarks
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation errors (out-of-range generator input, bad option values)
    #[error("Validation error: {0}")]
    Validation(String),

    /// I/O errors (logfiles, counter files, process pipes)
    #[error("I/O error: {0}")]
    Io(String),

    /// Parsing errors (sizes, kernel versions, JSON)
    #[error("Parsing error: {0}")]
    Parse(String),

    /// Topology construction errors (unknown hosts, duplicate links)
    #[error("Topology error: {0}")]
    Topology(String),

    /// A readiness marker did not appear before its deadline
    #[error("Setup timeout: {role} not ready after {timeout_secs}s")]
    SetupTimeout { role: String, timeout_secs: u64 },

    /// A command exited with a non-zero code other than the timeout sentinel
    #[error("Process error: `{command}` on {target} exited with code {code}")]
    ProcessExit {
        target: String,
        command: String,
        code: i32,
    },

    /// A client run produced no parseable result
    #[error("No output: {0}")]
    NoOutput(String),

    /// A client run produced more than one parseable result
    #[error("Ambiguous output: {count} results parsed")]
    AmbiguousOutput { count: usize },

    /// An interface counter could not be read
    #[error("Counter read error: {metric} on {iface}")]
    CounterRead { iface: String, metric: String },

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io(message.into())
    }

    /// Create a new parsing error
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse(message.into())
    }

    /// Create a new topology error
    pub fn topology<S: Into<String>>(message: S) -> Self {
        Self::Topology(message.into())
    }

    pub fn setup_timeout<S: Into<String>>(role: S, timeout: std::time::Duration) -> Self {
        Self::SetupTimeout {
            role: role.into(),
            timeout_secs: timeout.as_secs(),
        }
    }

    pub fn process_exit<T: Into<String>, C: Into<String>>(target: T, command: C, code: i32) -> Self {
        Self::ProcessExit {
            target: target.into(),
            command: command.into(),
            code,
        }
    }

    pub fn no_output<S: Into<String>>(message: S) -> Self {
        Self::NoOutput(message.into())
    }

    pub fn ambiguous_output(count: usize) -> Self {
        Self::AmbiguousOutput { count }
    }

    pub fn counter_read<I: Into<String>, M: Into<String>>(iface: I, metric: M) -> Self {
        Self::CounterRead {
            iface: iface.into(),
            metric: metric.into(),
        }
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Get error category for logging and reporting
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG",
            Self::Validation(_) => "VALIDATION",
            Self::Io(_) => "IO",
            Self::Parse(_) => "PARSE",
            Self::Topology(_) => "TOPOLOGY",
            Self::SetupTimeout { .. } => "SETUP",
            Self::ProcessExit { .. } => "PROCESS",
            Self::NoOutput(_) => "NO_OUTPUT",
            Self::AmbiguousOutput { .. } => "AMBIGUOUS",
            Self::CounterRead { .. } => "COUNTER",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Recoverable errors are absorbed into trial bookkeeping instead of
    /// aborting the run.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::NoOutput(_) | Self::AmbiguousOutput { .. } | Self::CounterRead { .. } => true,
            Self::Config(_) | Self::Validation(_) | Self::Parse(_) | Self::Topology(_) => false,
            Self::SetupTimeout { .. } | Self::ProcessExit { .. } | Self::Io(_) | Self::Internal(_) => false,
        }
    }

    /// Get user-friendly error message with suggestions
    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::Config(msg) => {
                format!("Configuration problem: {}\n\nSuggestion: Check your .env file, BENCH_* variables or command line arguments.", msg)
            }
            Self::Validation(msg) => {
                format!("Invalid input: {}\n\nSuggestion: Check the ranges of delay, loss and bandwidth options.", msg)
            }
            Self::Io(msg) => {
                format!("File operation failed: {}\n\nSuggestion: Check the log directory permissions and disk space.", msg)
            }
            Self::Parse(msg) => {
                format!("Failed to parse data: {}\n\nSuggestion: Check data sizes (e.g. 10K, 1M) and numeric options.", msg)
            }
            Self::Topology(msg) => {
                format!("Topology problem: {}\n\nSuggestion: Run as root with iproute2 installed, and remove stale namespaces with `ip netns del`.", msg)
            }
            Self::SetupTimeout { role, timeout_secs } => {
                format!("{} did not become ready within {}s\n\nSuggestion: Check {}.log in the log directory and that the binaries under the dependency directory are built.", role, timeout_secs, role)
            }
            Self::ProcessExit { target, command, code } => {
                format!("Command `{}` on {} failed with exit code {}\n\nSuggestion: Re-run with --debug to see the full command output.", command, target, code)
            }
            Self::NoOutput(msg) => {
                format!("Client produced no result: {}\n\nSuggestion: Increase --timeout or lower the data size.", msg)
            }
            Self::AmbiguousOutput { count } => {
                format!("Client produced {} results for one request\n\nSuggestion: Check the client binary version.", count)
            }
            Self::CounterRead { iface, metric } => {
                format!("Failed to read {} for {}\n\nSuggestion: Check that the interface still exists.", metric, iface)
            }
            Self::Internal(msg) => {
                format!("Internal error: {}\n\nThis is likely a bug. Please report this issue with the error details.", msg)
            }
        }
    }

    /// Get exit code for this error type
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Validation(_) | Self::Parse(_) => 1,  // Invalid configuration/usage
            Self::Topology(_) => 2,
            Self::SetupTimeout { .. } => 3,
            Self::ProcessExit { .. } => 4,
            Self::Io(_) => 5,
            Self::NoOutput(_) | Self::AmbiguousOutput { .. } | Self::CounterRead { .. } => 6,  // Trial bookkeeping
            Self::Internal(_) => 99,
        }
    }

    /// Format error for console display with color coding
    pub fn format_for_console(&self, use_color: bool) -> String {
        let category = self.category();
        let message = self.to_string();

        if use_color {
            use colored::Colorize;
            match self {
                Self::Config(_) | Self::Validation(_) | Self::Parse(_) => {
                    format!("[{}] {}", category.red().bold(), message.red())
                }
                Self::Topology(_) | Self::ProcessExit { .. } => {
                    format!("[{}] {}", category.yellow().bold(), message.yellow())
                }
                Self::SetupTimeout { .. } => {
                    format!("[{}] {}", category.blue().bold(), message.blue())
                }
                Self::NoOutput(_) | Self::AmbiguousOutput { .. } | Self::CounterRead { .. } => {
                    format!("[{}] {}", category.magenta().bold(), message.magenta())
                }
                Self::Io(_) => {
                    format!("[{}] {}", category.cyan().bold(), message.cyan())
                }
                Self::Internal(_) => {
                    format!("[{}] {}", category.bright_red().bold(), message.bright_red())
                }
            }
        } else {
            format!("[{}] {}", category, message)
        }
    }
}

// Standard library error conversions
impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::io(error.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::parse(format!("JSON parse error: {}", error))
    }
}

impl From<dotenv::Error> for AppError {
    fn from(error: dotenv::Error) -> Self {
        Self::config(format!("Environment file error: {}", error))
    }
}

impl From<std::num::ParseIntError> for AppError {
    fn from(error: std::num::ParseIntError) -> Self {
        Self::parse(format!("Integer parse error: {}", error))
    }
}

impl From<std::num::ParseFloatError> for AppError {
    fn from(error: std::num::ParseFloatError) -> Self {
        Self::parse(format!("Float parse error: {}", error))
    }
}

impl From<regex::Error> for AppError {
    fn from(error: regex::Error) -> Self {
        Self::internal(format!("Invalid pattern: {}", error))
    }
}

/// Custom Result type for the application
pub type Result<T> = std::result::Result<T, AppError>;

/// Error reporter for fatal errors surfaced by `main`
pub struct ErrorReporter {
    pub use_color: bool,
    pub verbose: bool,
}

impl ErrorReporter {
    pub fn new(use_color: bool, verbose: bool) -> Self {
        Self { use_color, verbose }
    }

    /// Report an error to the user
    pub fn report_error(&self, error: &AppError) {
        eprintln!("{}", error.format_for_console(self.use_color));

        if self.verbose {
            eprintln!();
            eprintln!("{}", error.user_friendly_message());
        }
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}
