//! HTTP/1.1 over kernel TCP, using the Python web server and client

use super::parse_status_line;
use crate::benchmark::{DriverContext, LineVerdict, ProtocolAdapter};
use crate::process::{CommandLine, ReadyMarker};
use crate::types::Protocol;

const TAG: &str = "[TCP_CLIENT]";

#[derive(Debug, Clone, Default)]
pub struct LinuxTcp;

impl LinuxTcp {
    pub fn new() -> Self {
        Self
    }
}

impl ProtocolAdapter for LinuxTcp {
    fn protocol(&self) -> Protocol {
        Protocol::LinuxTcp
    }

    fn server_command(&self, ctx: &DriverContext) -> CommandLine {
        CommandLine::from(format!(
            "python3 {} --server-ip {} --certfile {} --keyfile {} -n {}",
            ctx.sibling("webserver/http_server.py"),
            ctx.server_ip,
            ctx.certfile,
            ctx.keyfile,
            ctx.data_size
        ))
    }

    fn ready_marker(&self) -> ReadyMarker {
        ReadyMarker::contains("Serving")
    }

    fn client_command(&self, ctx: &DriverContext) -> CommandLine {
        CommandLine::from(format!(
            "python3 {} --server-ip {} -n {}",
            ctx.sibling("webserver/http_client.py"),
            ctx.server_ip,
            ctx.data_size
        ))
    }

    fn parse_line(&self, line: &str) -> Option<LineVerdict> {
        parse_status_line(line, TAG, "")
    }

    fn uses_kernel_congestion_control(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmark::ClientResult;
    use crate::models::Config;
    use std::path::PathBuf;

    fn ctx() -> DriverContext {
        let mut config = Config::default();
        config.deps_dir = PathBuf::from("/srv/bench/deps");
        config.data_size = 1_000_000;
        DriverContext::from_config(&config).unwrap()
    }

    #[test]
    fn test_commands() {
        let tcp = LinuxTcp::new();
        assert_eq!(
            tcp.client_command(&ctx()).to_string(),
            "python3 /srv/bench/webserver/http_client.py --server-ip 172.16.2.10 -n 1000000"
        );
        let server = tcp.server_command(&ctx()).to_string();
        assert!(server.starts_with("python3 /srv/bench/webserver/http_server.py --server-ip 172.16.2.10 --certfile "));
        assert!(server.ends_with("-n 1000000"));
    }

    #[test]
    fn test_parse() {
        let tcp = LinuxTcp::new();
        assert_eq!(
            tcp.parse_line("[TCP_CLIENT] status_code=200 time_s=0.8123"),
            Some(LineVerdict::Result(ClientResult::new(200, 0.8123)))
        );
        assert_eq!(tcp.parse_line("Serving HTTPS on 172.16.2.10"), None);
        assert!(tcp.ready_marker().matches("Serving HTTPS on 172.16.2.10 port 443"));
        assert!(!tcp.restarts_on_no_output());
    }
}
