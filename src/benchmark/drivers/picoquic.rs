//! HTTP/3 over picoquic's sample client and server

use crate::benchmark::{ClientResult, DriverContext, LineVerdict, ProtocolAdapter};
use crate::defaults::HTTP_OK_STATUSCODE;
use crate::error::Result;
use crate::process::{CommandLine, ReadyMarker};
use crate::types::Protocol;
use regex::Regex;

const SAMPLE: &str = "picoquic/picoquic_sample";
const PORT: u16 = 4433;

#[derive(Debug, Clone)]
pub struct Picoquic {
    complete: Regex,
}

impl Picoquic {
    pub fn new() -> Result<Self> {
        Ok(Self {
            complete: Regex::new(r"complete.*in ([\d.]+) seconds")?,
        })
    }
}

impl ProtocolAdapter for Picoquic {
    fn protocol(&self) -> Protocol {
        Protocol::Picoquic
    }

    fn server_command(&self, ctx: &DriverContext) -> CommandLine {
        CommandLine::from(format!(
            "{} server {} {} {} . {} {}",
            ctx.dep(SAMPLE),
            PORT,
            ctx.certfile,
            ctx.keyfile,
            ctx.data_size,
            ctx.cca
        ))
    }

    fn ready_marker(&self) -> ReadyMarker {
        ReadyMarker::starts_with("Serving")
    }

    fn client_command(&self, ctx: &DriverContext) -> CommandLine {
        CommandLine::from(format!(
            "{} client {} {} /tmp {} {}.html",
            ctx.dep(SAMPLE),
            ctx.server_ip,
            PORT,
            ctx.cca,
            ctx.data_size
        ))
    }

    fn parse_line(&self, line: &str) -> Option<LineVerdict> {
        let time_s = self.complete.captures(line)?.get(1)?.as_str().parse::<f64>().ok()?;
        Some(LineVerdict::Result(ClientResult::new(HTTP_OK_STATUSCODE, time_s)))
    }

    fn restarts_on_no_output(&self) -> bool {
        true
    }

    fn tolerates_client_failure(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Config;
    use std::path::PathBuf;

    #[test]
    fn test_commands() {
        let mut config = Config::default();
        config.deps_dir = PathBuf::from("deps");
        config.cca = "bbr".into();
        config.data_size = 1000;
        config.certfile = "c.pem".into();
        config.keyfile = "k.pem".into();
        let ctx = DriverContext::from_config(&config).unwrap();
        let pq = Picoquic::new().unwrap();
        assert_eq!(
            pq.server_command(&ctx).to_string(),
            "deps/picoquic/picoquic_sample server 4433 c.pem k.pem . 1000 bbr"
        );
        assert_eq!(
            pq.client_command(&ctx).to_string(),
            "deps/picoquic/picoquic_sample client 172.16.2.10 4433 /tmp bbr 1000.html"
        );
    }

    #[test]
    fn test_parse() {
        let pq = Picoquic::new().unwrap();
        assert_eq!(
            pq.parse_line("Client completed the transfer of 1 files in 0.734 seconds."),
            Some(LineVerdict::Result(ClientResult::new(200, 0.734)))
        );
        assert_eq!(pq.parse_line("Serving 1000.html"), None);
        assert!(pq.ready_marker().matches("Serving 1000 bytes on port 4433"));
        assert!(!pq.ready_marker().matches("Now Serving"));
    }
}
