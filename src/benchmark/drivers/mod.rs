//! Per-protocol adapters, selected by [`Protocol`]

mod cloudflare;
mod google;
mod picoquic;
mod tcp;

pub use cloudflare::CloudflareQuic;
pub use google::GoogleQuic;
pub use picoquic::Picoquic;
pub use tcp::LinuxTcp;

use super::{ClientResult, LineVerdict, ProtocolAdapter};
use crate::error::Result;
use crate::types::Protocol;
use std::sync::Arc;

pub fn adapter_for(protocol: Protocol) -> Result<Arc<dyn ProtocolAdapter>> {
    Ok(match protocol {
        Protocol::LinuxTcp => Arc::new(LinuxTcp::new()),
        Protocol::GoogleQuic => Arc::new(GoogleQuic::new()),
        Protocol::CloudflareQuic => Arc::new(CloudflareQuic::new()?),
        Protocol::Picoquic => Arc::new(Picoquic::new()?),
    })
}

/// Parse `<tag> status_code=<int> time_s=<float><suffix>`.
///
/// Lines that start with the tag but do not fit the format are ignored.
pub(crate) fn parse_status_line(line: &str, tag: &str, time_suffix: &str) -> Option<LineVerdict> {
    let rest = line.trim_end().strip_prefix(tag)?;
    let mut fields = rest.split_whitespace().map(|kv| kv.split_once('='));

    let status_code = match fields.next()? {
        Some(("status_code", value)) => value.parse::<u16>().ok()?,
        _ => return None,
    };
    let time_s = match fields.next()? {
        Some(("time_s", value)) => value.strip_suffix(time_suffix).unwrap_or(value).parse::<f64>().ok()?,
        _ => return None,
    };
    Some(LineVerdict::Result(ClientResult::new(status_code, time_s)))
}
