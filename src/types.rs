//! Shared enumerations used by configuration, topology and benchmark code

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// Re-export commonly used types
pub use crate::error::{AppError, Result};

/// Emulated path layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopologyKind {
    /// client - emulation node - server, one shaped segment
    Direct,
    /// client - emulation node - router - emulation node - server
    TwoSegment,
}

impl TopologyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::TwoSegment => "two_segment",
        }
    }
}

impl FromStr for TopologyKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "direct" | "one_segment" => Ok(Self::Direct),
            "two_segment" | "one_hop" => Ok(Self::TwoSegment),
            _ => Err(AppError::validation(format!(
                "Unknown topology '{}': expected direct or two-segment",
                s
            ))),
        }
    }
}

impl fmt::Display for TopologyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Queue-management policy attached below the rate limiter on emulation nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueuePolicy {
    #[serde(rename = "red")]
    Red,
    #[serde(rename = "bfifo-large")]
    BfifoLarge,
    #[serde(rename = "bfifo-small")]
    BfifoSmall,
    #[serde(rename = "pie")]
    Pie,
    #[serde(rename = "codel")]
    Codel,
    #[serde(rename = "policer")]
    Policer,
    #[serde(rename = "fq_codel")]
    FqCodel,
}

impl QueuePolicy {
    pub const ALL: [QueuePolicy; 7] = [
        Self::Red,
        Self::BfifoLarge,
        Self::BfifoSmall,
        Self::Pie,
        Self::Codel,
        Self::Policer,
        Self::FqCodel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Red => "red",
            Self::BfifoLarge => "bfifo-large",
            Self::BfifoSmall => "bfifo-small",
            Self::Pie => "pie",
            Self::Codel => "codel",
            Self::Policer => "policer",
            Self::FqCodel => "fq_codel",
        }
    }
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self::Red
    }
}

impl FromStr for QueuePolicy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.to_lowercase();
        Self::ALL
            .iter()
            .find(|policy| policy.as_str() == lowered)
            .copied()
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(|p| p.as_str()).collect();
                AppError::validation(format!(
                    "Unknown queue policy '{}': expected one of {}",
                    s,
                    names.join(", ")
                ))
            })
    }
}

impl fmt::Display for QueuePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport implementation under test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    /// HTTP/1.1 over Linux kernel TCP
    #[serde(rename = "LINUX_TCP")]
    LinuxTcp,
    /// HTTP/3 over Google's QUIC (chromium toy server/client)
    #[serde(rename = "GOOGLE_QUIC")]
    GoogleQuic,
    /// HTTP/3 over Cloudflare quiche
    #[serde(rename = "CLOUDFLARE_QUIC")]
    CloudflareQuic,
    /// picoquic sample server/client
    #[serde(rename = "PICOQUIC")]
    Picoquic,
}

impl Protocol {
    /// Name used in result records
    pub fn name(&self) -> &'static str {
        match self {
            Self::LinuxTcp => "LINUX_TCP",
            Self::GoogleQuic => "GOOGLE_QUIC",
            Self::CloudflareQuic => "CLOUDFLARE_QUIC",
            Self::Picoquic => "PICOQUIC",
        }
    }

    /// Subcommand name
    pub fn command(&self) -> &'static str {
        match self {
            Self::LinuxTcp => "tcp",
            Self::GoogleQuic => "google",
            Self::CloudflareQuic => "cloudflare",
            Self::Picoquic => "picoquic",
        }
    }

    /// Congestion-control algorithms the implementation accepts
    pub fn supported_ccas(&self) -> &'static [&'static str] {
        match self {
            Self::LinuxTcp => &["reno", "cubic", "bbr", "bbr2"],
            Self::GoogleQuic => &["cubic", "reno", "bbr1", "bbr"],
            Self::CloudflareQuic => &["cubic", "reno", "bbr2", "bbr"],
            Self::Picoquic => &["newreno", "cubic", "dcubic", "fast", "bbr", "prague", "bbr1"],
        }
    }

    pub fn validate_cca(&self, cca: &str) -> Result<()> {
        if self.supported_ccas().contains(&cca) {
            Ok(())
        } else {
            Err(AppError::validation(format!(
                "Congestion control '{}' is not supported by {} (expected one of {})",
                cca,
                self.command(),
                self.supported_ccas().join(", ")
            )))
        }
    }

    /// User-space BBR in quiche only works with kernel pacing underneath
    pub fn requires_pacing(&self, cca: &str) -> bool {
        matches!(self, Self::CloudflareQuic) && cca.contains("bbr")
    }
}

impl FromStr for Protocol {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "tcp" | "linux_tcp" => Ok(Self::LinuxTcp),
            "google" | "google_quic" => Ok(Self::GoogleQuic),
            "cloudflare" | "cloudflare_quic" => Ok(Self::CloudflareQuic),
            "picoquic" => Ok(Self::Picoquic),
            _ => Err(AppError::validation(format!("Unknown protocol '{}'", s))),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What to do when a client run yields more than one parseable result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguousPolicy {
    /// Log a warning and keep the first parsed result
    First,
    /// Log a warning and treat the run as producing no output
    Discard,
}

impl Default for AmbiguousPolicy {
    fn default() -> Self {
        Self::First
    }
}

impl FromStr for AmbiguousPolicy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "first" => Ok(Self::First),
            "discard" => Ok(Self::Discard),
            _ => Err(AppError::validation(format!(
                "Unknown ambiguous-output policy '{}': expected first or discard",
                s
            ))),
        }
    }
}

impl fmt::Display for AmbiguousPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::First => f.write_str("first"),
            Self::Discard => f.write_str("discard"),
        }
    }
}

/// Parse a byte count such as `1000`, `10K`, `1M` or `1G` (decimal multipliers)
pub fn parse_data_size(s: &str) -> Result<u64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(AppError::parse("Data size cannot be empty"));
    }

    let (digits, multiplier) = match trimmed.chars().last() {
        Some('K') | Some('k') => (&trimmed[..trimmed.len() - 1], 1_000),
        Some('M') | Some('m') => (&trimmed[..trimmed.len() - 1], 1_000_000),
        Some('G') | Some('g') => (&trimmed[..trimmed.len() - 1], 1_000_000_000),
        _ => (trimmed, 1),
    };

    let value: u64 = digits
        .parse()
        .map_err(|_| AppError::parse(format!("Invalid data size '{}'", s)))?;
    value
        .checked_mul(multiplier)
        .ok_or_else(|| AppError::parse(format!("Data size '{}' is too large", s)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_data_size() {
        assert_eq!(parse_data_size("1000").unwrap(), 1000);
        assert_eq!(parse_data_size("1K").unwrap(), 1000);
        assert_eq!(parse_data_size("10k").unwrap(), 10_000);
        assert_eq!(parse_data_size("1M").unwrap(), 1_000_000);
        assert_eq!(parse_data_size("1G").unwrap(), 1_000_000_000);
        assert!(parse_data_size("").is_err());
        assert!(parse_data_size("K").is_err());
        assert!(parse_data_size("1.5M").is_err());
        assert!(parse_data_size("abc").is_err());
    }

    #[test]
    fn test_queue_policy_roundtrip_names() {
        for policy in QueuePolicy::ALL {
            assert_eq!(policy.as_str().parse::<QueuePolicy>().unwrap(), policy);
        }
        assert_eq!(QueuePolicy::default(), QueuePolicy::Red);
        assert!("noqueue".parse::<QueuePolicy>().is_err());
    }

    #[test]
    fn test_topology_aliases() {
        assert_eq!("direct".parse::<TopologyKind>().unwrap(), TopologyKind::Direct);
        assert_eq!("two-segment".parse::<TopologyKind>().unwrap(), TopologyKind::TwoSegment);
        assert_eq!("one_hop".parse::<TopologyKind>().unwrap(), TopologyKind::TwoSegment);
        assert!("star".parse::<TopologyKind>().is_err());
    }

    #[test]
    fn test_protocol_cca_support() {
        assert!(Protocol::LinuxTcp.validate_cca("bbr2").is_ok());
        assert!(Protocol::LinuxTcp.validate_cca("bbr1").is_err());
        assert!(Protocol::GoogleQuic.validate_cca("bbr1").is_ok());
        assert!(Protocol::Picoquic.validate_cca("prague").is_ok());
    }

    #[test]
    fn test_pacing_requirement() {
        assert!(Protocol::CloudflareQuic.requires_pacing("bbr"));
        assert!(Protocol::CloudflareQuic.requires_pacing("bbr2"));
        assert!(!Protocol::CloudflareQuic.requires_pacing("cubic"));
        assert!(!Protocol::LinuxTcp.requires_pacing("bbr"));
    }

    #[test]
    fn test_protocol_serializes_as_record_name() {
        let json = serde_json::to_string(&Protocol::CloudflareQuic).unwrap();
        assert_eq!(json, "\"CLOUDFLARE_QUIC\"");
    }
}
