//! HTTP/3 over Chromium's QUIC toy server and client

use super::parse_status_line;
use crate::benchmark::{DriverContext, LineVerdict, ProtocolAdapter};
use crate::process::{CommandLine, ReadyMarker};
use crate::types::Protocol;

const TAG: &str = "[QUIC_CLIENT]";
const BIN_DIR: &str = "chromium/src/out/Default";
const PORT: u16 = 6121;

/// QUIC connection option selecting each congestion controller
pub fn connection_option(cca: &str) -> Option<&'static str> {
    match cca {
        "cubic" => Some("BYTE"),
        "reno" => Some("RENO"),
        "bbr1" => Some("TBBR"),
        "bbr" => Some("B2ON"),
        _ => None,
    }
}

#[derive(Debug, Clone, Default)]
pub struct GoogleQuic;

impl GoogleQuic {
    pub fn new() -> Self {
        Self
    }
}

impl ProtocolAdapter for GoogleQuic {
    fn protocol(&self) -> Protocol {
        Protocol::GoogleQuic
    }

    fn server_command(&self, ctx: &DriverContext) -> CommandLine {
        CommandLine::from(format!(
            "{} --certificate_file={} --key_file={} --num_cached_bytes={}",
            ctx.dep(&format!("{}/quic_server", BIN_DIR)),
            ctx.certfile,
            ctx.keyfile,
            ctx.data_size
        ))
    }

    fn ready_marker(&self) -> ReadyMarker {
        ReadyMarker::contains("Serving")
    }

    fn client_command(&self, ctx: &DriverContext) -> CommandLine {
        let mut cmd = format!(
            "{} --allow_unknown_root_cert --host={} --port={} https://www.example.org/{}",
            ctx.dep(&format!("{}/quic_client", BIN_DIR)),
            ctx.server_ip,
            PORT,
            ctx.data_size
        );
        if let Some(option) = connection_option(&ctx.cca) {
            cmd.push_str(&format!(" --client_connection_options={0} --connection_options={0}", option));
        }
        CommandLine::from(cmd)
    }

    /// Time values carry a trailing `s`
    fn parse_line(&self, line: &str) -> Option<LineVerdict> {
        parse_status_line(line, TAG, "s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmark::ClientResult;
    use crate::models::Config;
    use std::path::PathBuf;

    #[test]
    fn test_client_command_carries_cca_option() {
        let mut config = Config::default();
        config.deps_dir = PathBuf::from("deps");
        config.cca = "bbr".to_string();
        config.data_size = 5000;
        let ctx = DriverContext::from_config(&config).unwrap();
        assert_eq!(
            GoogleQuic::new().client_command(&ctx).to_string(),
            "deps/chromium/src/out/Default/quic_client --allow_unknown_root_cert --host=172.16.2.10 --port=6121 \
             https://www.example.org/5000 --client_connection_options=B2ON --connection_options=B2ON"
        );
    }

    #[test]
    fn test_connection_options() {
        assert_eq!(connection_option("cubic"), Some("BYTE"));
        assert_eq!(connection_option("reno"), Some("RENO"));
        assert_eq!(connection_option("bbr1"), Some("TBBR"));
        assert_eq!(connection_option("newreno"), None);
    }

    #[test]
    fn test_parse() {
        assert_eq!(
            GoogleQuic::new().parse_line("[QUIC_CLIENT] status_code=200 time_s=2.5s"),
            Some(LineVerdict::Result(ClientResult::new(200, 2.5)))
        );
        assert_eq!(GoogleQuic::new().parse_line("[TCP_CLIENT] status_code=200 time_s=2.5"), None);
    }
}
