//! Configuration data model and validation

use crate::defaults;
use crate::types::{AmbiguousPolicy, AppError, Protocol, QueuePolicy, Result, TopologyKind};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Number of client trials
    #[serde(default = "default_trials")]
    pub trials: u32,

    /// Per-client timeout; `None` lets the client run to completion
    #[serde(default)]
    pub timeout_seconds: Option<u64>,

    /// Deadline for readiness markers
    #[serde(default = "default_setup_timeout_secs")]
    pub setup_timeout_seconds: u64,

    #[serde(default = "default_label")]
    pub label: String,

    /// Directory holding server.log, client.log, router.log and captures
    #[serde(default = "default_logdir")]
    pub logdir: PathBuf,

    #[serde(default = "default_topology")]
    pub topology: TopologyKind,

    /// Attach per-interface counter deltas to every trial
    #[serde(default)]
    pub network_statistics: bool,

    /// Capture packets on every primary interface
    #[serde(default)]
    pub packet_capture: bool,

    /// Start the connection-splitting proxy on the router
    #[serde(default)]
    pub pep: bool,

    #[serde(default = "default_delay1")]
    pub delay1_ms: u32,
    #[serde(default = "default_delay2")]
    pub delay2_ms: u32,
    #[serde(default = "default_loss1")]
    pub loss1_percent: f64,
    #[serde(default = "default_loss2")]
    pub loss2_percent: f64,
    #[serde(default = "default_bw1")]
    pub bw1_mbps: u32,
    #[serde(default = "default_bw2")]
    pub bw2_mbps: u32,

    #[serde(default)]
    pub qdisc: QueuePolicy,

    #[serde(default = "default_protocol")]
    pub protocol: Protocol,

    /// Congestion-control algorithm at the endpoints
    #[serde(default = "default_cca")]
    pub cca: String,

    /// Application bytes requested per trial
    #[serde(default = "default_data_size")]
    pub data_size: u64,

    #[serde(default = "default_certfile")]
    pub certfile: String,
    #[serde(default = "default_keyfile")]
    pub keyfile: String,

    /// Root of the protocol binaries (quiche, chromium, picoquic, webserver)
    #[serde(default = "default_deps_dir")]
    pub deps_dir: PathBuf,

    /// Prefix for namespace names, so concurrent runs on one machine don't collide
    #[serde(default = "default_namespace_prefix")]
    pub namespace_prefix: String,

    /// Prefix namespace commands with `sudo -n`
    #[serde(default)]
    pub use_sudo: bool,

    /// Force fq pacing on endpoint interfaces
    #[serde(default)]
    pub pacing: bool,

    #[serde(default)]
    pub ambiguous_policy: AmbiguousPolicy,

    /// Accumulated trial time after which a result batch is emitted
    #[serde(default = "default_log_chunk_secs")]
    pub log_chunk_seconds: u64,

    /// Pretty-print result records
    #[serde(default)]
    pub pretty: bool,

    /// Emit log entries as JSON lines
    #[serde(default)]
    pub log_json: bool,

    /// Enable colored terminal output
    #[serde(default = "default_enable_color")]
    pub enable_color: bool,

    /// Enable verbose output
    #[serde(default)]
    pub verbose: bool,

    /// Enable debug output
    #[serde(default)]
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            trials: default_trials(),
            timeout_seconds: None,
            setup_timeout_seconds: default_setup_timeout_secs(),
            label: default_label(),
            logdir: default_logdir(),
            topology: default_topology(),
            network_statistics: false,
            packet_capture: false,
            pep: false,
            delay1_ms: default_delay1(),
            delay2_ms: default_delay2(),
            loss1_percent: default_loss1(),
            loss2_percent: default_loss2(),
            bw1_mbps: default_bw1(),
            bw2_mbps: default_bw2(),
            qdisc: QueuePolicy::default(),
            protocol: default_protocol(),
            cca: default_cca(),
            data_size: default_data_size(),
            certfile: default_certfile(),
            keyfile: default_keyfile(),
            deps_dir: default_deps_dir(),
            namespace_prefix: default_namespace_prefix(),
            use_sudo: false,
            pacing: false,
            ambiguous_policy: AmbiguousPolicy::default(),
            log_chunk_seconds: default_log_chunk_secs(),
            pretty: false,
            log_json: false,
            enable_color: default_enable_color(),
            verbose: false,
            debug: false,
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Client timeout as Duration
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds.map(Duration::from_secs)
    }

    pub fn setup_timeout(&self) -> Duration {
        Duration::from_secs(self.setup_timeout_seconds)
    }

    pub fn log_chunk(&self) -> Duration {
        Duration::from_secs(self.log_chunk_seconds)
    }

    /// Pacing is forced by the user or required by the protocol/CCA pair
    pub fn pacing_requested(&self) -> bool {
        self.pacing || self.protocol.requires_pacing(&self.cca)
    }

    /// Path of a per-role logfile inside the log directory
    pub fn logfile(&self, name: &str) -> PathBuf {
        self.logdir.join(name)
    }

    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Result<()> {
        if self.trials == 0 {
            return Err(AppError::config("Trial count must be greater than 0"));
        }

        if self.trials > 10_000 {
            return Err(AppError::config("Trial count cannot exceed 10000"));
        }

        if self.timeout_seconds == Some(0) {
            return Err(AppError::config("Timeout must be greater than 0"));
        }

        if self.setup_timeout_seconds == 0 {
            return Err(AppError::config("Setup timeout must be greater than 0"));
        }

        for (name, loss) in [("loss1", self.loss1_percent), ("loss2", self.loss2_percent)] {
            if !(0.0..=100.0).contains(&loss) {
                return Err(AppError::config(format!(
                    "{} must be between 0 and 100 percent, got {}",
                    name, loss
                )));
            }
        }

        if self.bw1_mbps == 0 || self.bw2_mbps == 0 {
            return Err(AppError::config("Bandwidth must be greater than 0 Mbps"));
        }

        if self.data_size == 0 {
            return Err(AppError::config("Data size must be greater than 0 bytes"));
        }

        if self.label.trim().is_empty() {
            return Err(AppError::config("Label cannot be empty"));
        }

        if self.pep && self.topology != TopologyKind::TwoSegment {
            return Err(AppError::config(
                "The connection-splitting proxy requires the two-segment topology",
            ));
        }

        // Linux interface names are limited to 15 bytes; "<prefix>h1" must fit
        if self.namespace_prefix.len() > 10 {
            return Err(AppError::config("Namespace prefix cannot exceed 10 characters"));
        }

        if self.namespace_prefix.contains(char::is_whitespace) {
            return Err(AppError::config("Namespace prefix cannot contain whitespace"));
        }

        self.protocol
            .validate_cca(&self.cca)
            .map_err(|e| AppError::config(e.to_string()))?;

        Ok(())
    }

    /// Merge `BENCH_*` environment variables into this configuration
    pub fn merge_from_env(&mut self) -> Result<()> {
        if let Ok(trials) = std::env::var("BENCH_TRIALS") {
            self.trials = trials.parse()
                .map_err(|e| AppError::config(format!("Invalid BENCH_TRIALS value '{}': {}", trials, e)))?;
        }

        if let Ok(timeout) = std::env::var("BENCH_TIMEOUT") {
            self.timeout_seconds = Some(timeout.parse()
                .map_err(|e| AppError::config(format!("Invalid BENCH_TIMEOUT value '{}': {}", timeout, e)))?);
        }

        if let Ok(timeout) = std::env::var("BENCH_SETUP_TIMEOUT") {
            self.setup_timeout_seconds = timeout.parse()
                .map_err(|e| AppError::config(format!("Invalid BENCH_SETUP_TIMEOUT value '{}': {}", timeout, e)))?;
        }

        if let Ok(label) = std::env::var("BENCH_LABEL") {
            self.label = label;
        }

        if let Ok(logdir) = std::env::var("BENCH_LOGDIR") {
            self.logdir = PathBuf::from(logdir);
        }

        if let Ok(deps_dir) = std::env::var("BENCH_DEPS_DIR") {
            self.deps_dir = PathBuf::from(deps_dir);
        }

        if let Ok(prefix) = std::env::var("BENCH_NAMESPACE_PREFIX") {
            self.namespace_prefix = prefix;
        }

        if let Ok(use_sudo) = std::env::var("BENCH_USE_SUDO") {
            self.use_sudo = use_sudo.parse()
                .map_err(|e| AppError::config(format!("Invalid BENCH_USE_SUDO value '{}': {}", use_sudo, e)))?;
        }

        if let Ok(qdisc) = std::env::var("BENCH_QDISC") {
            self.qdisc = qdisc.parse()
                .map_err(|e: AppError| AppError::config(format!("Invalid BENCH_QDISC value: {}", e)))?;
        }

        if let Ok(policy) = std::env::var("BENCH_AMBIGUOUS_POLICY") {
            self.ambiguous_policy = policy.parse()
                .map_err(|e: AppError| AppError::config(format!("Invalid BENCH_AMBIGUOUS_POLICY value: {}", e)))?;
        }

        if let Ok(chunk) = std::env::var("BENCH_LOG_CHUNK") {
            self.log_chunk_seconds = chunk.parse()
                .map_err(|e| AppError::config(format!("Invalid BENCH_LOG_CHUNK value '{}': {}", chunk, e)))?;
        }

        if let Ok(enable_color) = std::env::var("BENCH_ENABLE_COLOR") {
            self.enable_color = enable_color.parse()
                .map_err(|e| AppError::config(format!("Invalid BENCH_ENABLE_COLOR value '{}': {}", enable_color, e)))?;
        }

        Ok(())
    }
}

// Default value functions for serde
fn default_trials() -> u32 {
    defaults::DEFAULT_TRIALS
}

fn default_setup_timeout_secs() -> u64 {
    defaults::DEFAULT_SETUP_TIMEOUT.as_secs()
}

fn default_label() -> String {
    defaults::DEFAULT_LABEL.to_string()
}

fn default_logdir() -> PathBuf {
    PathBuf::from(defaults::DEFAULT_LOGDIR)
}

fn default_topology() -> TopologyKind {
    TopologyKind::TwoSegment
}

fn default_delay1() -> u32 {
    defaults::DEFAULT_DELAY1_MS
}

fn default_delay2() -> u32 {
    defaults::DEFAULT_DELAY2_MS
}

fn default_loss1() -> f64 {
    defaults::DEFAULT_LOSS1_PERCENT
}

fn default_loss2() -> f64 {
    defaults::DEFAULT_LOSS2_PERCENT
}

fn default_bw1() -> u32 {
    defaults::DEFAULT_BW1_MBPS
}

fn default_bw2() -> u32 {
    defaults::DEFAULT_BW2_MBPS
}

fn default_protocol() -> Protocol {
    Protocol::LinuxTcp
}

fn default_cca() -> String {
    defaults::DEFAULT_CCA.to_string()
}

fn default_data_size() -> u64 {
    defaults::DEFAULT_DATA_SIZE
}

fn default_certfile() -> String {
    defaults::DEFAULT_CERTFILE.to_string()
}

fn default_keyfile() -> String {
    defaults::DEFAULT_KEYFILE.to_string()
}

fn default_deps_dir() -> PathBuf {
    PathBuf::from(defaults::DEFAULT_DEPS_DIR)
}

fn default_namespace_prefix() -> String {
    defaults::DEFAULT_NAMESPACE_PREFIX.to_string()
}

fn default_log_chunk_secs() -> u64 {
    defaults::DEFAULT_LOG_CHUNK.as_secs()
}

fn default_enable_color() -> bool {
    defaults::DEFAULT_ENABLE_COLOR
}
