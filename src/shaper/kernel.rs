//! Running kernel version, as far as shaping and congestion control care

use crate::error::{AppError, Result};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

pub const OSRELEASE_PATH: &str = "/proc/sys/kernel/osrelease";

/// `major.minor` of the running kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KernelVersion {
    pub major: u32,
    pub minor: u32,
}

impl KernelVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// First release whose TCP stack paces without the `fq` qdisc
    pub const NATIVE_PACING: KernelVersion = KernelVersion::new(5, 0);

    /// First release that accepts a per-namespace congestion control
    pub const NAMESPACED_CCA: KernelVersion = KernelVersion::new(4, 15);

    pub async fn detect() -> Result<Self> {
        Self::read_from(OSRELEASE_PATH).await
    }

    pub async fn read_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let release = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AppError::io(format!("Failed to read {}: {}", path.display(), e)))?;
        release.parse()
    }

    pub fn has_native_pacing(&self) -> bool {
        *self >= Self::NATIVE_PACING
    }

    pub fn has_namespaced_cca(&self) -> bool {
        *self >= Self::NAMESPACED_CCA
    }
}

impl FromStr for KernelVersion {
    type Err = AppError;

    /// Accepts release strings like `5.15.0-91-generic` or `4.9`
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let mut parts = s.split(|c: char| !c.is_ascii_digit());
        let major = parts
            .next()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| AppError::parse(format!("Invalid kernel release: {:?}", s)))?
            .parse()?;
        let minor = parts
            .next()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| AppError::parse(format!("Invalid kernel release: {:?}", s)))?
            .parse()?;
        Ok(Self { major, minor })
    }
}

impl fmt::Display for KernelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_release_strings() {
        assert_eq!("5.15.0-91-generic".parse::<KernelVersion>().unwrap(), KernelVersion::new(5, 15));
        assert_eq!("4.9\n".parse::<KernelVersion>().unwrap(), KernelVersion::new(4, 9));
        assert_eq!("6.1.0".parse::<KernelVersion>().unwrap(), KernelVersion::new(6, 1));
        assert!("linux".parse::<KernelVersion>().is_err());
        assert!("5".parse::<KernelVersion>().is_err());
    }

    #[test]
    fn test_feature_thresholds() {
        assert!(!KernelVersion::new(4, 20).has_native_pacing());
        assert!(KernelVersion::new(5, 0).has_native_pacing());
        assert!(!KernelVersion::new(4, 14).has_namespaced_cca());
        assert!(KernelVersion::new(4, 15).has_namespaced_cca());
        assert!(KernelVersion::new(4, 9) < KernelVersion::new(4, 15));
    }

    #[tokio::test]
    async fn test_read_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("osrelease");
        std::fs::write(&path, "5.4.0-150-generic\n").unwrap();
        assert_eq!(KernelVersion::read_from(&path).await.unwrap(), KernelVersion::new(5, 4));
        assert!(KernelVersion::read_from(dir.path().join("missing")).await.is_err());
    }
}
