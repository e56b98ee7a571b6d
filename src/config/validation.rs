//! Non-fatal configuration checks

use crate::error::Result;
use crate::models::Config;
use crate::shaper::qdisc::{calculate_bdp, MTU};
use crate::shaper::KernelVersion;
use crate::types::TopologyKind;
use std::path::Path;

/// Configuration validator with advisory rules
pub struct ConfigValidator;

impl ConfigValidator {
    /// Run [`Config::validate`], then collect advisory warnings. `kernel` is
    /// the running kernel, when known.
    pub fn validate_comprehensive(config: &Config, kernel: Option<KernelVersion>) -> Result<Vec<ValidationWarning>> {
        config.validate()?;

        let mut warnings = Vec::new();
        warnings.extend(Self::validate_path(config));
        warnings.extend(Self::validate_pacing(config, kernel));
        warnings.extend(Self::validate_files(config));
        warnings.extend(Self::validate_run_settings(config));
        Ok(warnings)
    }

    fn validate_path(config: &Config) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();

        for (name, loss) in [("loss1", config.loss1_percent), ("loss2", config.loss2_percent)] {
            if loss > 10.0 {
                warnings.push(ValidationWarning::new(
                    ValidationLevel::Warning,
                    format!("{} of {}% will make most transfers crawl", name, loss),
                ));
            }
        }

        let bdp = match config.topology {
            TopologyKind::Direct => calculate_bdp(config.delay1_ms, 0, config.bw1_mbps, config.bw1_mbps),
            TopologyKind::TwoSegment => {
                calculate_bdp(config.delay1_ms, config.delay2_ms, config.bw1_mbps, config.bw2_mbps)
            }
        };
        if bdp < (2 * MTU) as f64 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                format!("Bandwidth-delay product of {:.0} bytes is below two packets", bdp),
            ));
        }

        if config.topology == TopologyKind::Direct && (config.delay2_ms, config.bw2_mbps) != (25, 10) {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                "The direct topology ignores the second segment's settings".to_string(),
            ));
        }
        warnings
    }

    fn validate_pacing(config: &Config, kernel: Option<KernelVersion>) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();
        if let Some(kernel) = kernel {
            if config.cca.contains("bbr") && !config.pacing_requested() && !kernel.has_native_pacing() {
                warnings.push(ValidationWarning::new(
                    ValidationLevel::Info,
                    format!("Kernel {} has no native pacing; endpoints get fq pacing for {}", kernel, config.cca),
                ));
            }
        }
        warnings
    }

    fn validate_files(config: &Config) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();
        for (name, path) in [("certificate", &config.certfile), ("key", &config.keyfile)] {
            if !Path::new(path).exists() {
                warnings.push(ValidationWarning::new(
                    ValidationLevel::Warning,
                    format!("{} file '{}' not found", name, path),
                ));
            }
        }
        if !config.deps_dir.is_dir() {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                format!("Dependency directory '{}' not found", config.deps_dir.display()),
            ));
        }
        warnings
    }

    fn validate_run_settings(config: &Config) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();
        if config.trials > 1 && config.timeout_seconds.is_none() {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                "No client timeout: a stalled transfer blocks the run".to_string(),
            ));
        }
        if config.log_chunk_seconds == 0 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                "A zero logging chunk emits one record per trial".to_string(),
            ));
        }
        warnings
    }
}

/// Validation warning levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationLevel {
    Info,
    Warning,
}

impl ValidationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
        }
    }
}

/// Configuration validation warning
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub level: ValidationLevel,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(level: ValidationLevel, message: String) -> Self {
        Self { level, message }
    }

    pub fn format(&self) -> String {
        format!("[{}] {}", self.level.as_str(), self.message)
    }
}

/// Convenience function for comprehensive configuration validation
pub fn validate_config(config: &Config, kernel: Option<KernelVersion>) -> Result<Vec<ValidationWarning>> {
    ConfigValidator::validate_comprehensive(config, kernel)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(warnings: &[ValidationWarning]) -> Vec<String> {
        warnings.iter().map(ValidationWarning::format).collect()
    }

    #[test]
    fn test_invalid_config_is_error() {
        let mut config = Config::default();
        config.trials = 0;
        assert!(validate_config(&config, None).is_err());
    }

    #[test]
    fn test_high_loss_warns() {
        let mut config = Config::default();
        config.loss2_percent = 20.0;
        let warnings = messages(&validate_config(&config, None).unwrap());
        assert!(warnings.iter().any(|w| w.starts_with("[WARNING] loss2 of 20%")));
    }

    #[test]
    fn test_tiny_bdp_warns() {
        let mut config = Config::default();
        config.topology = TopologyKind::Direct;
        config.delay1_ms = 0;
        let warnings = messages(&validate_config(&config, None).unwrap());
        assert!(warnings.iter().any(|w| w.contains("below two packets")));
    }

    #[test]
    fn test_old_kernel_bbr_info() {
        let mut config = Config::default();
        config.cca = "bbr".to_string();
        let old = validate_config(&config, Some(KernelVersion::new(4, 19))).unwrap();
        assert!(messages(&old).iter().any(|w| w.contains("no native pacing")));
        let new = validate_config(&config, Some(KernelVersion::new(6, 1))).unwrap();
        assert!(!messages(&new).iter().any(|w| w.contains("no native pacing")));
    }

    #[test]
    fn test_missing_files_warn() {
        let mut config = Config::default();
        config.certfile = "/nonexistent/cert.pem".to_string();
        let warnings = messages(&validate_config(&config, None).unwrap());
        assert!(warnings.iter().any(|w| w.contains("certificate file '/nonexistent/cert.pem' not found")));
    }
}
