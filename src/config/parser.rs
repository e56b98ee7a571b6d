//! Configuration assembly from defaults, `.env`, environment and CLI

use crate::cli::Cli;
use crate::config::env::EnvManager;
use crate::error::Result;
use crate::models::Config;

/// Combines CLI arguments with environment variables
pub struct ConfigParser {
    cli: Cli,
}

impl ConfigParser {
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Defaults, then `.env`, then `BENCH_*` variables, then the command
    /// line; the result is validated.
    pub fn parse(&self) -> Result<Config> {
        let mut config = Config::default();
        EnvManager::load_env_file(self.cli.debug)?;
        config.merge_from_env()?;
        self.cli.apply_to(&mut config);
        config.validate()?;
        Ok(config)
    }
}

/// Convenience function to load complete configuration from CLI arguments
pub fn load_config(cli: Cli) -> Result<Config> {
    ConfigParser::new(cli).parse()
}

/// Display configuration summary for debug purposes
pub fn display_config_summary(config: &Config) -> String {
    let timeout = config
        .timeout_seconds
        .map(|t| format!("{}s", t))
        .unwrap_or_else(|| "none".to_string());
    let lines = [
        format!("Protocol: {} ({})", config.protocol, config.cca),
        format!("Data size: {} bytes", config.data_size),
        format!("Trials: {}", config.trials),
        format!("Timeout: {}", timeout),
        format!("Topology: {}", config.topology),
        format!(
            "Segment 1: {}ms {}% {}Mbit/s",
            config.delay1_ms, config.loss1_percent, config.bw1_mbps
        ),
        format!(
            "Segment 2: {}ms {}% {}Mbit/s",
            config.delay2_ms, config.loss2_percent, config.bw2_mbps
        ),
        format!("Queue policy: {}", config.qdisc),
        format!("Proxy: {}", config.pep),
        format!("Log directory: {}", config.logdir.display()),
    ];
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Protocol, TopologyKind};
    use clap::Parser;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_cli_overrides_environment() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("BENCH_TRIALS", "7");
        std::env::set_var("BENCH_LABEL", "from-env");

        let cli = Cli::parse_from(["transport-bench", "--label", "from-cli", "tcp"]);
        let config = ConfigParser::new(cli).parse();

        std::env::remove_var("BENCH_TRIALS");
        std::env::remove_var("BENCH_LABEL");

        let config = config.unwrap();
        assert_eq!(config.trials, 7);
        assert_eq!(config.label, "from-cli");
        assert_eq!(config.protocol, Protocol::LinuxTcp);
    }

    #[test]
    fn test_invalid_combination_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        let cli = Cli::parse_from(["transport-bench", "--topology", "direct", "--pep", "tcp"]);
        assert!(load_config(cli).is_err());

        let cli = Cli::parse_from(["transport-bench", "google", "--cca", "bbr2"]);
        assert!(load_config(cli).is_err());
    }

    #[test]
    fn test_summary() {
        let mut config = Config::default();
        config.topology = TopologyKind::Direct;
        let summary = display_config_summary(&config);
        assert!(summary.contains("Topology: direct"));
        assert!(summary.contains("Timeout: none"));
        assert!(summary.contains("Segment 2: 25ms 0% 10Mbit/s"));
    }
}
