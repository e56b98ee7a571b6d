//! Command-line interface

use crate::error::AppError;
use crate::models::Config;
use crate::types::{parse_data_size, AmbiguousPolicy, Protocol, QueuePolicy, TopologyKind};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Transport Bench - emulate network paths and benchmark transport protocols across them
#[derive(Parser, Debug, Clone)]
#[command(name = "transport-bench")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Number of client trials
    #[arg(short = 't', long, global = true)]
    pub trials: Option<u32>,

    /// Client timeout in seconds (unbounded when omitted)
    #[arg(long, value_parser = parse_duration, global = true)]
    pub timeout: Option<u64>,

    /// Experiment label copied into every result record
    #[arg(long, global = true)]
    pub label: Option<String>,

    /// Directory for server, client and router logs
    #[arg(long, global = true)]
    pub logdir: Option<PathBuf>,

    /// Emulated path layout (direct, two-segment)
    #[arg(long, value_parser = parse_topology, global = true)]
    pub topology: Option<TopologyKind>,

    /// Attach per-interface counter deltas to every trial
    #[arg(long, global = true)]
    pub network_statistics: bool,

    /// Capture packets on every primary interface
    #[arg(long, global = true)]
    pub pcap: bool,

    /// Run the connection-splitting proxy on the router
    #[arg(long, global = true)]
    pub pep: bool,

    /// One-way delay of the client-side segment, in ms
    #[arg(long, global = true)]
    pub delay1: Option<u32>,

    /// One-way delay of the server-side segment, in ms
    #[arg(long, global = true)]
    pub delay2: Option<u32>,

    /// Loss of the client-side segment, in percent
    #[arg(long, global = true)]
    pub loss1: Option<f64>,

    /// Loss of the server-side segment, in percent
    #[arg(long, global = true)]
    pub loss2: Option<f64>,

    /// Bandwidth of the client-side segment, in Mbit/s
    #[arg(long, global = true)]
    pub bw1: Option<u32>,

    /// Bandwidth of the server-side segment, in Mbit/s
    #[arg(long, global = true)]
    pub bw2: Option<u32>,

    /// Queue policy on emulation nodes
    #[arg(long, value_parser = parse_qdisc, global = true)]
    pub qdisc: Option<QueuePolicy>,

    /// Force fq pacing on the endpoints
    #[arg(long, global = true)]
    pub pacing: bool,

    /// Directory holding the protocol binaries
    #[arg(long, global = true)]
    pub deps_dir: Option<PathBuf>,

    /// Prefix of namespace names
    #[arg(long, global = true)]
    pub namespace_prefix: Option<String>,

    /// Run namespace commands through `sudo -n`
    #[arg(long, global = true)]
    pub sudo: bool,

    /// What to do with multiple results from one client run (first, discard)
    #[arg(long, value_parser = parse_ambiguous, global = true)]
    pub ambiguous_policy: Option<AmbiguousPolicy>,

    /// Seconds of trial time per emitted result batch
    #[arg(long, global = true)]
    pub log_chunk: Option<u64>,

    /// Seconds to wait for servers to become ready
    #[arg(long, value_parser = parse_duration, global = true)]
    pub setup_timeout: Option<u64>,

    /// Pretty-print result records
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Emit log entries as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Enable verbose output
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Enable debug output
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: ProtocolCommand,
}

/// Transport under test
#[derive(Subcommand, Debug, Clone)]
pub enum ProtocolCommand {
    /// HTTP/1.1 over Linux kernel TCP
    Tcp(ProtocolArgs),
    /// HTTP/3 over Google's QUIC
    Google(ProtocolArgs),
    /// HTTP/3 over Cloudflare quiche
    Cloudflare(ProtocolArgs),
    /// picoquic sample client and server
    Picoquic(ProtocolArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct ProtocolArgs {
    /// Bytes to transfer per trial (1000, 10K, 1M, 1G)
    #[arg(short = 'n', long = "data-size", value_parser = parse_size)]
    pub data_size: Option<u64>,

    /// Congestion-control algorithm
    #[arg(long = "congestion-control", alias = "cca")]
    pub cca: Option<String>,

    /// Server certificate
    #[arg(long)]
    pub certfile: Option<String>,

    /// Server private key
    #[arg(long)]
    pub keyfile: Option<String>,
}

impl ProtocolCommand {
    pub fn protocol(&self) -> Protocol {
        match self {
            Self::Tcp(_) => Protocol::LinuxTcp,
            Self::Google(_) => Protocol::GoogleQuic,
            Self::Cloudflare(_) => Protocol::CloudflareQuic,
            Self::Picoquic(_) => Protocol::Picoquic,
        }
    }

    pub fn args(&self) -> &ProtocolArgs {
        match self {
            Self::Tcp(args) | Self::Google(args) | Self::Cloudflare(args) | Self::Picoquic(args) => args,
        }
    }
}

impl Cli {
    pub fn protocol(&self) -> Protocol {
        self.command.protocol()
    }

    /// Check if colors should be enabled
    pub fn use_colors(&self) -> bool {
        !self.no_color && supports_color()
    }

    /// Write every argument that was given onto `config`
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(trials) = self.trials {
            config.trials = trials;
        }
        if let Some(timeout) = self.timeout {
            config.timeout_seconds = Some(timeout);
        }
        if let Some(label) = &self.label {
            config.label = label.clone();
        }
        if let Some(logdir) = &self.logdir {
            config.logdir = logdir.clone();
        }
        if let Some(topology) = self.topology {
            config.topology = topology;
        }
        config.network_statistics |= self.network_statistics;
        config.packet_capture |= self.pcap;
        config.pep |= self.pep;

        if let Some(v) = self.delay1 {
            config.delay1_ms = v;
        }
        if let Some(v) = self.delay2 {
            config.delay2_ms = v;
        }
        if let Some(v) = self.loss1 {
            config.loss1_percent = v;
        }
        if let Some(v) = self.loss2 {
            config.loss2_percent = v;
        }
        if let Some(v) = self.bw1 {
            config.bw1_mbps = v;
        }
        if let Some(v) = self.bw2 {
            config.bw2_mbps = v;
        }
        if let Some(qdisc) = self.qdisc {
            config.qdisc = qdisc;
        }
        config.pacing |= self.pacing;

        if let Some(dir) = &self.deps_dir {
            config.deps_dir = dir.clone();
        }
        if let Some(prefix) = &self.namespace_prefix {
            config.namespace_prefix = prefix.clone();
        }
        config.use_sudo |= self.sudo;
        if let Some(policy) = self.ambiguous_policy {
            config.ambiguous_policy = policy;
        }
        if let Some(chunk) = self.log_chunk {
            config.log_chunk_seconds = chunk;
        }
        if let Some(timeout) = self.setup_timeout {
            config.setup_timeout_seconds = timeout;
        }

        config.pretty |= self.pretty;
        config.log_json |= self.log_json;
        if self.no_color {
            config.enable_color = false;
        }
        config.verbose = self.verbose;
        config.debug = self.debug;

        let protocol = self.protocol();
        let args = self.command.args();
        config.protocol = protocol;
        if let Some(size) = args.data_size {
            config.data_size = size;
        }
        if let Some(cca) = &args.cca {
            config.cca = cca.clone();
        }
        if let Some(certfile) = &args.certfile {
            config.certfile = certfile.clone();
        }
        match &args.keyfile {
            Some(keyfile) => config.keyfile = keyfile.clone(),
            None if protocol == Protocol::GoogleQuic && config.keyfile == crate::defaults::DEFAULT_KEYFILE => {
                config.keyfile = crate::defaults::DEFAULT_KEYFILE_GOOGLE.to_string();
            }
            None => {}
        }
    }

    /// Get configuration summary for display
    pub fn get_config_summary(&self) -> String {
        let mut summary = String::new();
        summary.push_str("Command line:\n");
        summary.push_str(&format!("  Protocol: {}\n", self.protocol()));
        if let Some(trials) = self.trials {
            summary.push_str(&format!("  Trials: {}\n", trials));
        }
        if let Some(timeout) = self.timeout {
            summary.push_str(&format!("  Timeout: {}s\n", timeout));
        }
        if let Some(topology) = self.topology {
            summary.push_str(&format!("  Topology: {}\n", topology));
        }
        summary.push_str(&format!("  Colored output: {}\n", self.use_colors()));
        summary
    }
}

fn parse_duration(s: &str) -> Result<u64, String> {
    if s.starts_with('+') {
        return Err(format!("Invalid duration: {}", s));
    }
    match s.parse::<u64>() {
        Ok(0) => Err("Duration must be greater than 0".to_string()),
        Ok(secs) => Ok(secs),
        Err(_) => Err(format!("Invalid duration: {}", s)),
    }
}

fn parse_size(s: &str) -> Result<u64, String> {
    parse_data_size(s).map_err(|e| e.to_string())
}

fn parse_topology(s: &str) -> Result<TopologyKind, String> {
    s.parse().map_err(|e: AppError| e.to_string())
}

fn parse_qdisc(s: &str) -> Result<QueuePolicy, String> {
    s.parse().map_err(|e: AppError| e.to_string())
}

fn parse_ambiguous(s: &str) -> Result<AmbiguousPolicy, String> {
    s.parse().map_err(|e: AppError| e.to_string())
}

/// Check if the terminal supports color output
fn supports_color() -> bool {
    if let Ok(term) = std::env::var("TERM") {
        if term == "dumb" {
            return false;
        }
    }
    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }
    if std::env::var("FORCE_COLOR").is_ok() {
        return true;
    }
    cfg!(unix)
}
