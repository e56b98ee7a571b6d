//! Connection-splitting TCP proxy on the router.
//!
//! Transparent interception uses TPROXY: marked packets are routed to the
//! local stack where `pepsal` accepts them on port 5000.

use super::two_segment::ROUTER;
use super::Topology;
use crate::error::{AppError, Result};
use crate::logging::LogLevel;
use crate::process::{CommandPlan, ExecTarget, OutputHandling, ProcessId};
use crate::types::TopologyKind;
use std::path::Path;
use std::time::Duration;

pub const PROXY_PORT: u16 = 5000;
pub const TPROXY_MARK: u32 = 1;
pub const TPROXY_TABLE: u32 = 100;
/// Time given to `pepsal` to bind its port before traffic flows
pub const PROXY_SETTLE: Duration = Duration::from_secs(1);

/// Settle delay after starting the proxy, never longer than `setup_timeout`
pub fn settle_time(setup_timeout: Duration) -> Duration {
    PROXY_SETTLE.min(setup_timeout)
}

/// Policy routing and mangle rules diverting TCP through the proxy
pub fn tproxy_plan(router: &ExecTarget, ifaces: &[&str]) -> CommandPlan {
    let mut plan = CommandPlan::logged_at(LogLevel::Debug);
    plan.push(router, format!("ip rule add fwmark {} lookup {}", TPROXY_MARK, TPROXY_TABLE));
    plan.push(router, format!("ip route add local 0.0.0.0/0 dev lo table {}", TPROXY_TABLE));
    plan.push(router, "iptables -t mangle -F");
    for iface in ifaces {
        plan.push(
            router,
            format!(
                "iptables -t mangle -A PREROUTING -i {} -p tcp -j TPROXY --on-port {} --tproxy-mark {}",
                iface, PROXY_PORT, TPROXY_MARK
            ),
        );
    }
    plan
}

impl Topology {
    /// Divert router traffic into `pepsal`, logging to `logfile`.
    ///
    /// `pepsal` prints nothing dependable at startup, so instead of waiting
    /// for a marker the proxy gets a short fixed settle delay.
    pub async fn start_tcp_proxy(&self, logfile: &Path, setup_timeout: Duration) -> Result<ProcessId> {
        if self.kind() != TopologyKind::TwoSegment {
            return Err(AppError::topology(format!(
                "The TCP proxy needs the two_segment topology, not {}",
                self.kind()
            )));
        }
        let router = ExecTarget::host(ROUTER);
        self.execute(&tproxy_plan(&router, &["r1-eth1", "r1-eth0"])).await?;

        self.logger().info("Starting TCP proxy on r1").log().await;
        let id = self
            .supervisor()
            .spawn(
                &router,
                "pepsal -v",
                OutputHandling::new().echo(LogLevel::Debug, false, true).logfile(logfile),
                LogLevel::Debug,
            )
            .await?;
        tokio::time::sleep(settle_time(setup_timeout)).await;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::test_support::unbuilt;

    #[test]
    fn test_tproxy_rules() {
        let router = ExecTarget::host("r1");
        let plan = tproxy_plan(&router, &["r1-eth1", "r1-eth0"]);
        assert_eq!(
            plan.lines(),
            [
                "ip rule add fwmark 1 lookup 100",
                "ip route add local 0.0.0.0/0 dev lo table 100",
                "iptables -t mangle -F",
                "iptables -t mangle -A PREROUTING -i r1-eth1 -p tcp -j TPROXY --on-port 5000 --tproxy-mark 1",
                "iptables -t mangle -A PREROUTING -i r1-eth0 -p tcp -j TPROXY --on-port 5000 --tproxy-mark 1",
            ]
        );
        assert!(plan.steps().iter().all(|s| s.target == router));
    }

    #[test]
    fn test_settle_time_is_short_and_bounded() {
        assert_eq!(settle_time(Duration::from_secs(30)), PROXY_SETTLE);
        assert_eq!(settle_time(Duration::from_millis(200)), Duration::from_millis(200));
        assert!(PROXY_SETTLE < Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_proxy_requires_two_segments() {
        let (topo, _) = unbuilt(TopologyKind::Direct);
        let err = topo
            .start_tcp_proxy(Path::new("/tmp/router.log"), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Topology(_)));
    }
}
