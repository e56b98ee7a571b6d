//! HTTP/3 over Cloudflare quiche

use crate::benchmark::{ClientResult, DriverContext, LineVerdict, ProtocolAdapter};
use crate::defaults::HTTP_OK_STATUSCODE;
use crate::error::Result;
use crate::process::{CommandLine, ReadyMarker};
use crate::types::Protocol;
use regex::Regex;

const BIN_DIR: &str = "quiche/target/release";
const PORT: u16 = 4433;
const SUMMARY: &str = "response(s) received in ";

#[derive(Debug, Clone)]
pub struct CloudflareQuic {
    elapsed: Regex,
}

impl CloudflareQuic {
    pub fn new() -> Result<Self> {
        Ok(Self {
            elapsed: Regex::new(r"received in (\d+\.\d+)")?,
        })
    }
}

impl ProtocolAdapter for CloudflareQuic {
    fn protocol(&self) -> Protocol {
        Protocol::CloudflareQuic
    }

    fn server_command(&self, ctx: &DriverContext) -> CommandLine {
        CommandLine::from(format!(
            "{} --cert={} --key={} --cc-algorithm {} --listen {}:{}",
            ctx.dep(&format!("{}/quiche-server", BIN_DIR)),
            ctx.certfile,
            ctx.keyfile,
            ctx.cca,
            ctx.server_ip,
            PORT
        ))
    }

    fn ready_marker(&self) -> ReadyMarker {
        ReadyMarker::contains_ignore_case("listening")
    }

    fn client_command(&self, ctx: &DriverContext) -> CommandLine {
        CommandLine::from(format!(
            "{} --no-verify --method GET --cc-algorithm {} -- https://{}:{}/{}",
            ctx.dep(&format!("{}/quiche-client", BIN_DIR)),
            ctx.cca,
            ctx.server_ip,
            PORT,
            ctx.data_size
        ))
    }

    /// Only the summary line counts. A summary reporting an idle timeout
    /// means the transfer stalled, which is distinct from a slow transfer.
    fn parse_line(&self, line: &str) -> Option<LineVerdict> {
        if !line.contains(SUMMARY) || line.contains("Not found") {
            return None;
        }
        if line.contains("timed out") {
            return Some(LineVerdict::Failed("idle timeout".to_string()));
        }
        let time_s = self.elapsed.captures(line)?.get(1)?.as_str().parse::<f64>().ok()?;
        Some(LineVerdict::Result(ClientResult::new(HTTP_OK_STATUSCODE, time_s)))
    }

    fn restarts_on_no_output(&self) -> bool {
        true
    }

    fn tolerates_client_failure(&self) -> bool {
        true
    }
}
