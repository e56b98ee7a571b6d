//! Environment variable handling and .env file management

use crate::error::{AppError, Result};
use crate::types::{AmbiguousPolicy, QueuePolicy};
use std::path::Path;

/// Environment variable configuration manager
pub struct EnvManager;

impl EnvManager {
    /// Load `.env` from the working directory if it exists. Variables that
    /// are already set win over the file.
    pub fn load_env_file(debug: bool) -> Result<()> {
        Self::load_env_file_from(Path::new(".env"), debug)
    }

    pub fn load_env_file_from(path: &Path, debug: bool) -> Result<()> {
        if path.exists() {
            dotenv::from_path(path)
                .map_err(|e| AppError::config(format!("Failed to load {}: {}", path.display(), e)))?;
            if debug {
                eprintln!("Loaded configuration from {}", path.display());
            }
        } else if debug {
            eprintln!("No {} file found, using defaults and CLI arguments", path.display());
        }
        Ok(())
    }

    /// Create example .env file content
    pub fn create_example_env_content() -> String {
        let mut content = String::from(
            "# Transport Bench Configuration\n\
             #\n\
             # Values here are defaults; environment variables and command-line\n\
             # arguments override them.\n\n",
        );
        for (var, description, example) in Self::get_supported_env_vars() {
            content.push_str(&format!("# {}\n# {}={}\n\n", description, var, example));
        }
        content
    }

    /// Save example .env file to disk
    pub fn save_example_env_file(path: &Path) -> Result<()> {
        std::fs::write(path, Self::create_example_env_content())
            .map_err(|e| AppError::config(format!("Failed to write example .env file: {}", e)))
    }

    /// Validate one variable's format before it is merged
    pub fn validate_env_var(key: &str, value: &str) -> Result<()> {
        let invalid = |e: &dyn std::fmt::Display| AppError::config(format!("Invalid {} value '{}': {}", key, value, e));
        match key {
            "BENCH_TRIALS" => {
                let trials: u32 = value.parse().map_err(|e| invalid(&e))?;
                if trials == 0 || trials > 10_000 {
                    return Err(AppError::config(format!("BENCH_TRIALS must be between 1 and 10000, got: {}", trials)));
                }
            }
            "BENCH_TIMEOUT" | "BENCH_SETUP_TIMEOUT" => {
                let secs: u64 = value.parse().map_err(|e| invalid(&e))?;
                if secs == 0 {
                    return Err(AppError::config(format!("{} must be greater than 0", key)));
                }
            }
            "BENCH_LOG_CHUNK" => {
                value.parse::<u64>().map_err(|e| invalid(&e))?;
            }
            "BENCH_USE_SUDO" | "BENCH_ENABLE_COLOR" => {
                value.parse::<bool>().map_err(|e| invalid(&e))?;
            }
            "BENCH_QDISC" => {
                value.parse::<QueuePolicy>().map_err(|e| invalid(&e))?;
            }
            "BENCH_AMBIGUOUS_POLICY" => {
                value.parse::<AmbiguousPolicy>().map_err(|e| invalid(&e))?;
            }
            "BENCH_NAMESPACE_PREFIX" => {
                if value.len() > 10 || value.contains(char::is_whitespace) {
                    return Err(AppError::config(format!("Invalid BENCH_NAMESPACE_PREFIX '{}'", value)));
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Get list of all supported environment variables with descriptions
    pub fn get_supported_env_vars() -> Vec<(&'static str, &'static str, &'static str)> {
        vec![
            ("BENCH_TRIALS", "Number of client trials (1-10000)", "10"),
            ("BENCH_TIMEOUT", "Client timeout in seconds", "60"),
            ("BENCH_SETUP_TIMEOUT", "Server readiness deadline in seconds", "30"),
            ("BENCH_LABEL", "Experiment label", "baseline"),
            ("BENCH_LOGDIR", "Directory for process logs", "/tmp/transport-bench-logs"),
            ("BENCH_DEPS_DIR", "Directory holding protocol binaries", "deps"),
            ("BENCH_NAMESPACE_PREFIX", "Prefix of namespace names", "tb-"),
            ("BENCH_USE_SUDO", "Run namespace commands through sudo", "false"),
            ("BENCH_QDISC", "Queue policy on emulation nodes", "red"),
            ("BENCH_AMBIGUOUS_POLICY", "Handling of multiple client results", "first"),
            ("BENCH_LOG_CHUNK", "Seconds of trial time per result batch", "600"),
            ("BENCH_ENABLE_COLOR", "Enable colored output", "true"),
        ]
    }

    /// Display environment variable help
    pub fn display_env_help() -> String {
        let mut help = String::from("Supported Environment Variables:\n\n");
        for (var, description, example) in Self::get_supported_env_vars() {
            help.push_str(&format!("  {:<24} {}\n", var, description));
            help.push_str(&format!("  {:<24} Example: {}\n\n", "", example));
        }
        help.push_str("Configuration Priority (highest to lowest):\n");
        help.push_str("  1. Command-line arguments\n");
        help.push_str("  2. Environment variables\n");
        help.push_str("  3. .env file values\n");
        help.push_str("  4. Default values\n");
        help
    }

    /// Validate all currently set environment variables
    pub fn validate_current_env() -> Vec<String> {
        Self::get_supported_env_vars()
            .into_iter()
            .filter_map(|(var, _, _)| {
                let value = std::env::var(var).ok()?;
                Self::validate_env_var(var, &value).err().map(|e| format!("Warning: {}", e))
            })
            .collect()
    }

    /// Check an env file without loading it; `None` when it does not exist
    pub fn check_env_file(path: &Path) -> Result<Option<Vec<String>>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::config(format!("Failed to read {}: {}", path.display(), e)))?;

        let warnings = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| {
                let (key, value) = line.split_once('=')?;
                Self::validate_env_var(key.trim(), value.trim())
                    .err()
                    .map(|e| format!("Line '{}': {}", line, e))
            })
            .collect();
        Ok(Some(warnings))
    }
}
