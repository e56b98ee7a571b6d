//! Process supervision
//!
//! Every command the orchestrator runs, on the local machine or on a virtual
//! host, goes through [`ProcessSupervisor`]. Three modes are offered:
//!
//! - [`ProcessSupervisor::run_local`]: `sh -c` on the local machine, output
//!   captured as one string.
//! - [`ProcessSupervisor::run`]: synchronous on a target, optionally wrapped
//!   in `timeout(1)`, with both pipes drained line by line until exhausted.
//! - [`ProcessSupervisor::spawn`]: background on a target, drained by a
//!   dedicated task, retained in a registry until [`ProcessSupervisor::stop`].
//!
//! Each output line is independently echoed to the logger, appended to a
//! logfile and handed to a per-line callback, as configured in
//! [`OutputHandling`].

pub mod drain;
pub mod plan;
pub mod readiness;
pub mod substrate;

pub use drain::Stream;
pub use plan::{CommandPlan, PlannedCommand};
pub use readiness::{ReadinessPolicy, ReadyMarker};
pub use substrate::{DirectSubstrate, NetnsSubstrate, Substrate};

use crate::defaults::TIMEOUT_EXIT_CODE;
use crate::error::{AppError, Result};
use crate::logging::{LogLevel, Logger};
use drain::{drain_lines, LineHandler};
use readiness::{ready_signal, Readiness};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::process::Child;
use tokio::task::JoinHandle;

/// Per-line callback invoked by drain loops
pub type LineCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Where a command runs
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExecTarget {
    Local,
    Host(String),
}

impl ExecTarget {
    pub fn host<S: Into<String>>(name: S) -> Self {
        Self::Host(name.into())
    }
}

impl fmt::Display for ExecTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Host(name) => f.write_str(name),
        }
    }
}

/// An argument vector. Built from a string by splitting on whitespace; no
/// shell quoting is interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine(Vec<String>);

impl CommandLine {
    pub fn from_argv<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(argv.into_iter().map(Into::into).collect())
    }

    pub fn argv(&self) -> &[String] {
        &self.0
    }

    pub fn split_first(&self) -> Option<(&String, &[String])> {
        self.0.split_first()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Prepend `timeout <secs>s`
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let mut argv = vec!["timeout".to_string(), format!("{}s", timeout.as_secs_f64())];
        argv.extend(self.0.iter().cloned());
        Self(argv)
    }
}

impl From<&str> for CommandLine {
    fn from(s: &str) -> Self {
        Self(s.split_whitespace().map(String::from).collect())
    }
}

impl From<String> for CommandLine {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<Vec<String>> for CommandLine {
    fn from(argv: Vec<String>) -> Self {
        Self(argv)
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" "))
    }
}

/// Classification of a finished process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitClass {
    Completed,
    /// The timeout wrapper reported its sentinel exit code
    TimedOut,
    Failed(i32),
}

impl ExitClass {
    pub fn is_timed_out(&self) -> bool {
        matches!(self, Self::TimedOut)
    }
}

/// What happens to each line a process prints
#[derive(Clone)]
pub struct OutputHandling {
    pub echo_stdout: bool,
    pub echo_stderr: bool,
    pub echo_level: LogLevel,
    pub logfile: Option<PathBuf>,
    pub callback: Option<LineCallback>,
}

impl Default for OutputHandling {
    fn default() -> Self {
        Self {
            echo_stdout: false,
            echo_stderr: true,
            echo_level: LogLevel::Trace,
            logfile: None,
            callback: None,
        }
    }
}

impl fmt::Debug for OutputHandling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputHandling")
            .field("echo_stdout", &self.echo_stdout)
            .field("echo_stderr", &self.echo_stderr)
            .field("echo_level", &self.echo_level)
            .field("logfile", &self.logfile)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

impl OutputHandling {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn echo(mut self, level: LogLevel, stdout: bool, stderr: bool) -> Self {
        self.echo_level = level;
        self.echo_stdout = stdout;
        self.echo_stderr = stderr;
        self
    }

    pub fn logfile<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.logfile = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn on_line<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }

    pub fn callback(mut self, callback: LineCallback) -> Self {
        self.callback = Some(callback);
        self
    }
}

/// Options for a synchronous run on a target
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Enforced by an external `timeout` wrapper, never by killing the child
    pub timeout: Option<Duration>,
    /// Raise [`AppError::ProcessExit`] on a failing exit code
    pub raise_on_error: bool,
    /// Level at which the command itself is logged
    pub command_level: LogLevel,
    pub output: OutputHandling,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            raise_on_error: true,
            command_level: LogLevel::Trace,
            output: OutputHandling::default(),
        }
    }
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn allow_failure(mut self) -> Self {
        self.raise_on_error = false;
        self
    }

    pub fn command_level(mut self, level: LogLevel) -> Self {
        self.command_level = level;
        self
    }

    pub fn output(mut self, output: OutputHandling) -> Self {
        self.output = output;
        self
    }
}

/// Captured result of a local shell command
#[derive(Debug, Clone)]
pub struct LocalOutput {
    pub exit: ExitClass,
    /// stdout followed by stderr
    pub output: String,
}

/// Collects values parsed out of output lines
pub struct LineCollector<T> {
    values: Arc<Mutex<Vec<T>>>,
}

impl<T> Clone for LineCollector<T> {
    fn clone(&self) -> Self {
        Self {
            values: self.values.clone(),
        }
    }
}

impl<T: Send + 'static> LineCollector<T> {
    pub fn new() -> Self {
        Self {
            values: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A callback that stores `parse(line)` whenever it yields a value
    pub fn callback<F>(&self, parse: F) -> LineCallback
    where
        F: Fn(&str) -> Option<T> + Send + Sync + 'static,
    {
        let values = self.values.clone();
        Arc::new(move |line: &str| {
            if let Some(value) = parse(line) {
                if let Ok(mut values) = values.lock() {
                    values.push(value);
                }
            }
        })
    }

    pub fn take(&self) -> Vec<T> {
        self.values
            .lock()
            .map(|mut v| std::mem::take(&mut *v))
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.values.lock().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Send + 'static> Default for LineCollector<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle of a registered background process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessId(u64);

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct BackgroundProcess {
    id: ProcessId,
    label: String,
    child: Child,
    drain: JoinHandle<()>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    processes: Vec<BackgroundProcess>,
}

/// Grace period between SIGTERM and SIGKILL for background processes
const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// Runs commands on execution targets; owns the background registry.
///
/// Cheap to clone; clones share the registry.
#[derive(Clone)]
pub struct ProcessSupervisor {
    substrate: Arc<dyn Substrate>,
    logger: Logger,
    registry: Arc<tokio::sync::Mutex<Registry>>,
}

impl fmt::Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessSupervisor")
            .field("substrate", &self.substrate)
            .finish()
    }
}

impl ProcessSupervisor {
    pub fn new(substrate: Arc<dyn Substrate>, logger: Logger) -> Self {
        Self {
            substrate,
            logger,
            registry: Arc::new(tokio::sync::Mutex::new(Registry::default())),
        }
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn substrate(&self) -> &Arc<dyn Substrate> {
        &self.substrate
    }

    async fn log_command(&self, level: LogLevel, target: &ExecTarget, command: &str, background: bool) {
        let host = match target {
            ExecTarget::Local => String::new(),
            ExecTarget::Host(name) => format!("{} ", name),
        };
        let suffix = if background { " &" } else { "" };
        self.logger
            .log(level, &format!("{}{}{}", host, command, suffix))
            .log()
            .await;
    }

    /// Run `script` through `sh -c` locally and capture combined output
    pub async fn run_local(&self, script: &str, raise_on_error: bool) -> Result<LocalOutput> {
        self.log_command(LogLevel::Trace, &ExecTarget::Local, script, false).await;

        let output = self.substrate.shell(script).output().await?;
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        let exit = match output.status.code() {
            Some(0) => ExitClass::Completed,
            Some(code) => ExitClass::Failed(code),
            None => ExitClass::Failed(-1),
        };

        if let ExitClass::Failed(code) = exit {
            if raise_on_error {
                let error = AppError::process_exit("local", script, code);
                self.logger
                    .error(&format!("Local command failed: {}", script))
                    .field("exit_code", code)
                    .field("output", text.trim())
                    .error_info(&error)
                    .log()
                    .await;
                return Err(error);
            }
        }

        Ok(LocalOutput { exit, output: text })
    }

    /// Run a command to completion on `target`.
    ///
    /// Returns [`ExitClass::TimedOut`] when a timeout was requested and the
    /// wrapper fired. Other non-zero exits raise unless
    /// [`RunOptions::allow_failure`] was set.
    pub async fn run<C: Into<CommandLine>>(
        &self,
        target: &ExecTarget,
        command: C,
        options: RunOptions,
    ) -> Result<ExitClass> {
        let command = command.into();
        let wrapped = match options.timeout {
            Some(timeout) => command.with_timeout(timeout),
            None => command.clone(),
        };
        self.log_command(options.command_level, target, &wrapped.to_string(), false).await;

        let label = format!("{} {}", target, first_word(&command));
        let mut handler = LineHandler::open(label, self.logger.clone(), options.output).await?;
        let mut child = self
            .substrate
            .command(target, &wrapped)?
            .spawn()
            .map_err(|e| AppError::io(format!("Failed to start `{}` on {}: {}", command, target, e)))?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        if let (Some(stdout), Some(stderr)) = (stdout, stderr) {
            drain_lines(stdout, stderr, &mut handler).await;
        }

        let status = child.wait().await?;
        let exit = match status.code() {
            Some(0) => ExitClass::Completed,
            Some(TIMEOUT_EXIT_CODE) if options.timeout.is_some() => ExitClass::TimedOut,
            Some(code) => ExitClass::Failed(code),
            None => ExitClass::Failed(-1),
        };

        match exit {
            ExitClass::Failed(code) if options.raise_on_error => {
                let error = AppError::process_exit(target.to_string(), command.to_string(), code);
                self.logger
                    .error(&format!("Command failed on {}: {}", target, command))
                    .field("target", target.to_string())
                    .field("command", command.to_string())
                    .field("exit_code", code)
                    .error_info(&error)
                    .log()
                    .await;
                Err(error)
            }
            ExitClass::TimedOut => {
                self.logger
                    .debug(&format!("Command timed out on {}: {}", target, command))
                    .log()
                    .await;
                Ok(exit)
            }
            _ => Ok(exit),
        }
    }

    /// Start a command in the background on `target` and register it
    pub async fn spawn<C: Into<CommandLine>>(
        &self,
        target: &ExecTarget,
        command: C,
        output: OutputHandling,
        command_level: LogLevel,
    ) -> Result<ProcessId> {
        let command = command.into();
        self.log_command(command_level, target, &command.to_string(), true).await;

        let label = format!("{} {}", target, first_word(&command));
        let mut handler = LineHandler::open(label.clone(), self.logger.clone(), output).await?;

        let mut registry = self.registry.lock().await;
        let mut child = self
            .substrate
            .command(target, &command)?
            .spawn()
            .map_err(|e| AppError::io(format!("Failed to start `{}` on {}: {}", command, target, e)))?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let drain = tokio::spawn(async move {
            if let (Some(stdout), Some(stderr)) = (stdout, stderr) {
                drain_lines(stdout, stderr, &mut handler).await;
            }
        });

        registry.next_id += 1;
        let id = ProcessId(registry.next_id);
        self.logger
            .debug(&format!("Registered background process {}: {}", id, label))
            .field("pid", child.id())
            .log()
            .await;
        registry.processes.push(BackgroundProcess {
            id,
            label,
            child,
            drain,
        });
        Ok(id)
    }

    /// Start a background command and block until `marker` appears in its
    /// output or `timeout` elapses.
    pub async fn spawn_until_ready<C: Into<CommandLine>>(
        &self,
        role: &str,
        target: &ExecTarget,
        command: C,
        output: OutputHandling,
        marker: ReadyMarker,
        timeout: Duration,
        policy: ReadinessPolicy,
    ) -> Result<ProcessId> {
        let (signal, waiter) = ready_signal(marker.clone());
        let mut output = output;
        output.callback = Some(signal.wrap(output.callback.take()));

        let id = self.spawn(target, command, output, LogLevel::Debug).await?;

        match (waiter.wait(timeout).await, policy) {
            (Readiness::Ready, _) => {
                self.logger
                    .info(&format!("{} ready on {}", role, target))
                    .field("process", id.to_string())
                    .log()
                    .await;
                Ok(id)
            }
            (outcome, ReadinessPolicy::BestEffort) => {
                self.logger
                    .warn(&format!("{} on {} gave no readiness marker ({:?}); proceeding", role, target, outcome))
                    .field("marker", format!("{:?}", marker))
                    .log()
                    .await;
                Ok(id)
            }
            (outcome, ReadinessPolicy::Required) => {
                let error = AppError::setup_timeout(role, timeout);
                self.logger
                    .error(&format!("{} on {} not ready after {:?} ({:?})", role, target, timeout, outcome))
                    .error_info(&error)
                    .log()
                    .await;
                Err(error)
            }
        }
    }

    /// Number of registered background processes
    pub async fn active_count(&self) -> usize {
        self.registry.lock().await.processes.len()
    }

    async fn take(&self, id: ProcessId) -> Result<BackgroundProcess> {
        let mut registry = self.registry.lock().await;
        let index = registry
            .processes
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| AppError::internal(format!("No background process {}", id)))?;
        Ok(registry.processes.remove(index))
    }

    /// Wait for a background process to exit on its own and drain it
    pub async fn wait(&self, id: ProcessId) -> Result<ExitClass> {
        let mut process = self.take(id).await?;
        let status = process.child.wait().await?;
        let _ = (&mut process.drain).await;
        Ok(match status.code() {
            Some(0) => ExitClass::Completed,
            Some(code) => ExitClass::Failed(code),
            None => ExitClass::Failed(-1),
        })
    }

    /// Terminate one background process and wait for its drain task
    pub async fn terminate(&self, id: ProcessId) -> Result<()> {
        let process = self.take(id).await?;
        self.shutdown(process).await;
        Ok(())
    }

    async fn shutdown(&self, mut process: BackgroundProcess) {
        let exited = matches!(process.child.try_wait(), Ok(Some(_)));
        if !exited {
            if let Some(pid) = process.child.id() {
                let _ = self.substrate.signal(pid, "TERM").status().await;
            }
            if tokio::time::timeout(TERMINATE_GRACE, process.child.wait()).await.is_err() {
                self.logger
                    .debug(&format!("{} ignored SIGTERM, killing", process.label))
                    .log()
                    .await;
                let _ = process.child.start_kill();
                let _ = process.child.wait().await;
            }
        }
        // A grandchild may still hold the pipes open after the child exits
        match tokio::time::timeout(TERMINATE_GRACE, &mut process.drain).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.logger
                    .warn(&format!("Drain task for {} ended abnormally: {}", process.label, e))
                    .log()
                    .await;
            }
            Err(_) => {
                process.drain.abort();
                self.logger
                    .debug(&format!("Output of {} still open, detaching", process.label))
                    .log()
                    .await;
            }
        }
        self.logger
            .debug(&format!("Stopped background process {}: {}", process.id, process.label))
            .log()
            .await;
    }

    /// Terminate every registered background process and wait for every
    /// drain task. Processes are removed from the registry as they are
    /// taken, so repeated calls are no-ops.
    pub async fn stop(&self) {
        let processes = {
            let mut registry = self.registry.lock().await;
            std::mem::take(&mut registry.processes)
        };
        if processes.is_empty() {
            return;
        }
        self.logger
            .debug(&format!("Stopping {} background process(es)", processes.len()))
            .log()
            .await;
        futures::future::join_all(processes.into_iter().map(|p| self.shutdown(p))).await;
    }

    /// Run every command of a plan in order, stopping at the first failure
    pub async fn execute_plan(&self, plan: &CommandPlan) -> Result<()> {
        for step in plan.steps() {
            let options = RunOptions::new().command_level(plan.level());
            let options = if step.raise_on_error { options } else { options.allow_failure() };
            self.run(&step.target, step.command.clone(), options).await?;
        }
        Ok(())
    }
}

fn first_word(command: &CommandLine) -> String {
    command
        .argv()
        .first()
        .map(|program| {
            Path::new(program)
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| program.clone())
        })
        .unwrap_or_default()
}
