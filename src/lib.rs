//! Transport Bench
//!
//! Emulates multi-segment network paths (delay, loss, bandwidth, queueing
//! policy) inside Linux network namespaces and drives repeatable transport
//! protocol benchmarks across them, producing one structured result record
//! per run.

pub mod app;
pub mod benchmark;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod output;
pub mod process;
pub mod shaper;
pub mod stats;
pub mod topology;
pub mod types;

// Re-export commonly used types
pub use error::{AppError, Result};
pub use models::{BenchmarkResult, Config, TrialOutput};
pub use process::{ExecTarget, ExitClass, ProcessSupervisor};
pub use topology::Topology;
pub use types::{AmbiguousPolicy, Protocol, QueuePolicy, TopologyKind};

/// Application version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Default configuration values
pub mod defaults {
    use std::time::Duration;

    pub const DEFAULT_TRIALS: u32 = 1;
    pub const DEFAULT_SETUP_TIMEOUT: Duration = Duration::from_secs(30);
    pub const DEFAULT_LABEL: &str = "NO_LABEL";
    pub const DEFAULT_LOGDIR: &str = "/tmp/transport-bench-logs";
    pub const DEFAULT_DEPS_DIR: &str = "deps";
    pub const DEFAULT_NAMESPACE_PREFIX: &str = "tb-";

    // Near path segment (client side)
    pub const DEFAULT_DELAY1_MS: u32 = 1;
    pub const DEFAULT_LOSS1_PERCENT: f64 = 1.0;
    pub const DEFAULT_BW1_MBPS: u32 = 100;
    // Far path segment (server side)
    pub const DEFAULT_DELAY2_MS: u32 = 25;
    pub const DEFAULT_LOSS2_PERCENT: f64 = 0.0;
    pub const DEFAULT_BW2_MBPS: u32 = 10;

    pub const DEFAULT_DATA_SIZE: u64 = 10_000;
    pub const DEFAULT_CCA: &str = "cubic";
    pub const DEFAULT_CERTFILE: &str = "deps/certs/cert.pem";
    pub const DEFAULT_KEYFILE: &str = "deps/certs/key.pem";
    /// The chromium toy server wants a PKCS#8 key
    pub const DEFAULT_KEYFILE_GOOGLE: &str = "deps/certs/key.pkcs8";

    pub const DEFAULT_LOG_CHUNK: Duration = Duration::from_secs(600);
    pub const DEFAULT_ENABLE_COLOR: bool = true;

    pub const SERVER_LOGFILE: &str = "server.log";
    pub const CLIENT_LOGFILE: &str = "client.log";
    pub const ROUTER_LOGFILE: &str = "router.log";

    pub const HTTP_OK_STATUSCODE: u16 = 200;
    /// Synthesized when the timeout wrapper kills a client
    pub const HTTP_TIMEOUT_STATUSCODE: u16 = 408;
    /// Exit code `timeout(1)` reports when the wrapped command ran out of time
    pub const TIMEOUT_EXIT_CODE: i32 = 124;
}
