//! Benchmark trial engine.
//!
//! A [`ProtocolDriver`] starts a protocol's server and runs one client
//! request at a time. [`ProcessDriver`] implements it for any
//! [`ProtocolAdapter`], which only knows commands, readiness markers and how
//! to read a result line. [`runner::TrialRunner`] drives the multi-trial loop.

pub mod drivers;
pub mod runner;

pub use drivers::adapter_for;
pub use runner::{RunSummary, RunnerSettings, TrialRunner};

use crate::defaults::{CLIENT_LOGFILE, HTTP_TIMEOUT_STATUSCODE, SERVER_LOGFILE};
use crate::error::{AppError, Result};
use crate::logging::{LogLevel, Logger};
use crate::models::Config;
use crate::process::{
    CommandLine, ExecTarget, ExitClass, LineCollector, OutputHandling, ProcessId, ProcessSupervisor,
    ReadinessPolicy, ReadyMarker, RunOptions,
};
use crate::topology::addressing::{bare, host_ip, SERVER_DIGIT};
use crate::types::Protocol;
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// A parsed client result
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClientResult {
    pub status_code: u16,
    pub time_s: f64,
}

impl ClientResult {
    pub fn new(status_code: u16, time_s: f64) -> Self {
        Self { status_code, time_s }
    }

    /// Result synthesised when the timeout wrapper stopped the client
    pub fn timed_out(timeout: Duration) -> Self {
        Self::new(HTTP_TIMEOUT_STATUSCODE, timeout.as_secs_f64())
    }
}

/// What one client invocation produced
#[derive(Debug, Clone, PartialEq)]
pub enum ClientOutcome {
    Completed(ClientResult),
    /// Nothing parseable; the reason is for logs
    NoOutput(String),
    /// More than one result line, in output order
    Ambiguous(Vec<ClientResult>),
}

/// How a single output line was read
#[derive(Debug, Clone, PartialEq)]
pub enum LineVerdict {
    Result(ClientResult),
    /// The line reports a failure that invalidates the whole run
    Failed(String),
}

/// Capability contract the trial loop runs against
#[async_trait]
pub trait ProtocolDriver: Send {
    fn protocol(&self) -> Protocol;

    /// Whether the server is restarted after a client produced no output
    fn restarts_on_no_output(&self) -> bool {
        false
    }

    /// Start the server and block until it is ready or `timeout` elapses
    async fn start_server(&mut self, timeout: Duration) -> Result<()>;

    async fn stop_server(&mut self) -> Result<()>;

    async fn restart_server(&mut self, timeout: Duration) -> Result<()> {
        self.stop_server().await?;
        self.start_server(timeout).await
    }

    /// Run exactly one client request
    async fn run_client(&mut self, timeout: Option<Duration>) -> Result<ClientOutcome>;
}

/// Everything a protocol's commands are built from
#[derive(Debug, Clone)]
pub struct DriverContext {
    pub server: ExecTarget,
    pub client: ExecTarget,
    /// Server address without prefix length
    pub server_ip: String,
    pub deps_dir: PathBuf,
    pub certfile: String,
    pub keyfile: String,
    pub data_size: u64,
    pub cca: String,
    pub server_logfile: PathBuf,
    pub client_logfile: PathBuf,
}

impl DriverContext {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            server: ExecTarget::host("h2"),
            client: ExecTarget::host("h1"),
            server_ip: bare(&host_ip(SERVER_DIGIT)?).to_string(),
            deps_dir: config.deps_dir.clone(),
            certfile: config.certfile.clone(),
            keyfile: config.keyfile.clone(),
            data_size: config.data_size,
            cca: config.cca.clone(),
            server_logfile: config.logfile(SERVER_LOGFILE),
            client_logfile: config.logfile(CLIENT_LOGFILE),
        })
    }

    /// Path of a binary below the dependency directory
    pub fn dep(&self, relative: &str) -> String {
        self.deps_dir.join(relative).display().to_string()
    }

    /// Sibling directory of the dependency directory
    pub fn sibling(&self, relative: &str) -> String {
        let base = self.deps_dir.parent().unwrap_or_else(|| Path::new("."));
        let base = if base.as_os_str().is_empty() { Path::new(".") } else { base };
        base.join(relative).display().to_string()
    }
}

/// Per-protocol knowledge: commands, readiness and output format
pub trait ProtocolAdapter: Send + Sync + fmt::Debug {
    fn protocol(&self) -> Protocol;

    fn server_command(&self, ctx: &DriverContext) -> CommandLine;

    fn ready_marker(&self) -> ReadyMarker;

    fn readiness_policy(&self) -> ReadinessPolicy {
        ReadinessPolicy::Required
    }

    fn client_command(&self, ctx: &DriverContext) -> CommandLine;

    /// `None` for lines that carry no result
    fn parse_line(&self, line: &str) -> Option<LineVerdict>;

    fn restarts_on_no_output(&self) -> bool {
        false
    }

    /// Whether a failing client exit code is reported through the parsed
    /// output instead of aborting the run
    fn tolerates_client_failure(&self) -> bool {
        false
    }

    /// The endpoints use the kernel's TCP congestion control
    fn uses_kernel_congestion_control(&self) -> bool {
        false
    }
}

/// Reduce a client's parsed lines and exit class to one outcome
pub fn classify(verdicts: Vec<LineVerdict>, exit: ExitClass, timeout: Option<Duration>) -> ClientOutcome {
    let mut results = Vec::new();
    for verdict in verdicts {
        match verdict {
            LineVerdict::Failed(reason) => return ClientOutcome::NoOutput(reason),
            LineVerdict::Result(result) => results.push(result),
        }
    }

    if let (ExitClass::TimedOut, Some(timeout)) = (exit, timeout) {
        return ClientOutcome::Completed(ClientResult::timed_out(timeout));
    }

    match results.len() {
        0 => ClientOutcome::NoOutput("client returned no result".to_string()),
        1 => ClientOutcome::Completed(results[0]),
        _ => ClientOutcome::Ambiguous(results),
    }
}

/// Runs a protocol's server and client binaries through the supervisor
pub struct ProcessDriver {
    adapter: Arc<dyn ProtocolAdapter>,
    ctx: DriverContext,
    supervisor: ProcessSupervisor,
    logger: Logger,
    server: Option<ProcessId>,
}

impl fmt::Debug for ProcessDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessDriver")
            .field("adapter", &self.adapter)
            .field("server", &self.server)
            .finish()
    }
}

impl ProcessDriver {
    pub fn new(adapter: Arc<dyn ProtocolAdapter>, ctx: DriverContext, supervisor: ProcessSupervisor, logger: Logger) -> Self {
        Self {
            adapter,
            ctx,
            supervisor,
            logger,
            server: None,
        }
    }

    pub fn adapter(&self) -> &dyn ProtocolAdapter {
        self.adapter.as_ref()
    }

    pub fn context(&self) -> &DriverContext {
        &self.ctx
    }
}

#[async_trait]
impl ProtocolDriver for ProcessDriver {
    fn protocol(&self) -> Protocol {
        self.adapter.protocol()
    }

    fn restarts_on_no_output(&self) -> bool {
        self.adapter.restarts_on_no_output()
    }

    async fn start_server(&mut self, timeout: Duration) -> Result<()> {
        if self.server.is_some() {
            return Err(AppError::internal("Server is already running"));
        }
        let id = self
            .supervisor
            .spawn_until_ready(
                &format!("{} server", self.adapter.protocol().command()),
                &self.ctx.server,
                self.adapter.server_command(&self.ctx),
                OutputHandling::new()
                    .echo(LogLevel::Debug, false, true)
                    .logfile(&self.ctx.server_logfile),
                self.adapter.ready_marker(),
                timeout,
                self.adapter.readiness_policy(),
            )
            .await?;
        self.server = Some(id);
        Ok(())
    }

    async fn stop_server(&mut self) -> Result<()> {
        match self.server.take() {
            Some(id) => self.supervisor.terminate(id).await,
            None => Ok(()),
        }
    }

    async fn run_client(&mut self, timeout: Option<Duration>) -> Result<ClientOutcome> {
        let collector = LineCollector::new();
        let adapter = Arc::clone(&self.adapter);
        let callback = collector.callback(move |line| adapter.parse_line(line));

        let mut options = RunOptions::new()
            .timeout(timeout)
            .command_level(LogLevel::Debug)
            .output(
                OutputHandling::new()
                    .echo(LogLevel::Debug, false, true)
                    .logfile(&self.ctx.client_logfile)
                    .callback(callback),
            );
        if self.adapter.tolerates_client_failure() {
            options = options.allow_failure();
        }

        let exit = self
            .supervisor
            .run(&self.ctx.client, self.adapter.client_command(&self.ctx), options)
            .await?;

        let outcome = classify(collector.take(), exit, timeout);
        let protocol = self.adapter.protocol().name();
        match &outcome {
            ClientOutcome::NoOutput(reason) => {
                let error = AppError::no_output(format!("{} client: {}", protocol, reason));
                self.logger.warn(&error.to_string()).error_info(&error).log().await;
            }
            ClientOutcome::Ambiguous(results) => {
                let error = AppError::ambiguous_output(results.len());
                self.logger
                    .warn(&format!("{} client: {}", protocol, error))
                    .field("results", format!("{:?}", results))
                    .error_info(&error)
                    .log()
                    .await;
            }
            ClientOutcome::Completed(result) => {
                self.logger
                    .debug(&format!("status_code={} time_s={}", result.status_code, result.time_s))
                    .log()
                    .await;
            }
        }
        Ok(outcome)
    }
}
