//! Per-interface traffic shaping.
//!
//! Emulation-node interfaces get a netem → htb → queue-policy chain; endpoint
//! interfaces get at most an `fq` pacing qdisc.

pub mod kernel;
pub mod qdisc;

pub use kernel::KernelVersion;
pub use qdisc::calculate_bdp;

use crate::error::Result;
use crate::logging::{LogLevel, Logger};
use crate::process::{CommandPlan, ExecTarget, ProcessSupervisor};
use crate::types::QueuePolicy;

/// Link characteristics applied on an emulation node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkShape {
    pub delay_ms: u32,
    pub loss_percent: f64,
    pub bw_mbps: u32,
    /// Bandwidth-delay product of the whole path, in bytes
    pub bdp: f64,
    pub qdisc: QueuePolicy,
}

/// What kind of node owns an interface
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InterfaceRole {
    /// Client, server or router: no shaping, optional pacing
    Endpoint { pacing: bool },
    EmulationNode(LinkShape),
}

/// Offload toggles applied to emulation-node interfaces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Offloads {
    pub gso: bool,
    pub tso: bool,
}

impl Default for Offloads {
    /// Both off, so packets on the wire are MTU sized
    fn default() -> Self {
        Self { gso: false, tso: false }
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

/// Commands configuring `iface` on `host` for `role`
pub fn plan_interface(
    host: &ExecTarget,
    iface: &str,
    role: InterfaceRole,
    offloads: Offloads,
    kernel: KernelVersion,
) -> CommandPlan {
    let mut plan = CommandPlan::logged_at(LogLevel::Debug);

    let shape = match role {
        InterfaceRole::Endpoint { pacing } => {
            if pacing || !kernel.has_native_pacing() {
                plan.push(host, format!("tc qdisc add dev {} root handle 2: fq pacing", iface));
            }
            return plan;
        }
        InterfaceRole::EmulationNode(shape) => shape,
    };

    let mut netem = format!("tc qdisc add dev {} root handle 2: netem delay {}ms", iface, shape.delay_ms);
    if shape.loss_percent > 0.0 {
        netem.push_str(&format!(" loss {}%", shape.loss_percent));
    }
    plan.push(host, netem);

    plan.push(host, format!("tc qdisc add dev {} parent 2: handle 3: htb default 10", iface));
    plan.push(
        host,
        format!(
            "tc class add dev {} parent 3: classid 10 htb rate {}Mbit quantum {}",
            iface,
            qdisc::htb_rate(shape.bw_mbps, shape.qdisc),
            qdisc::htb_quantum(shape.bw_mbps)
        ),
    );
    plan.push(host, qdisc::queue_command(iface, shape.qdisc, shape.bw_mbps, shape.bdp));

    plan.push(
        host,
        format!("ethtool -K {} gso {} tso {}", iface, on_off(offloads.gso), on_off(offloads.tso)),
    );
    plan
}

/// Applies [`plan_interface`] plans through the supervisor
#[derive(Debug, Clone)]
pub struct TrafficShaper {
    supervisor: ProcessSupervisor,
    logger: Logger,
    kernel: KernelVersion,
}

impl TrafficShaper {
    pub fn new(supervisor: ProcessSupervisor, logger: Logger, kernel: KernelVersion) -> Self {
        Self {
            supervisor,
            logger,
            kernel,
        }
    }

    pub fn kernel(&self) -> KernelVersion {
        self.kernel
    }

    pub async fn configure_interface(
        &self,
        host: &ExecTarget,
        iface: &str,
        role: InterfaceRole,
        offloads: Offloads,
    ) -> Result<()> {
        let plan = plan_interface(host, iface, role, offloads, self.kernel);
        match role {
            InterfaceRole::Endpoint { .. } if plan.is_empty() => {
                self.logger
                    .trace(&format!("{}: endpoint, no pacing needed on kernel {}", iface, self.kernel))
                    .log()
                    .await;
            }
            InterfaceRole::Endpoint { .. } => {
                self.logger.debug(&format!("{}: fq pacing", iface)).log().await;
            }
            InterfaceRole::EmulationNode(shape) => {
                self.logger
                    .debug(&format!(
                        "{}: {}ms delay, {}% loss, {} Mbit/s, {}",
                        iface, shape.delay_ms, shape.loss_percent, shape.bw_mbps, shape.qdisc
                    ))
                    .field("bdp", shape.bdp)
                    .log()
                    .await;
            }
        }
        self.supervisor.execute_plan(&plan).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODERN: KernelVersion = KernelVersion::new(5, 15);

    fn e1() -> ExecTarget {
        ExecTarget::host("e1")
    }

    fn shape(qdisc: QueuePolicy, loss: f64) -> InterfaceRole {
        InterfaceRole::EmulationNode(LinkShape {
            delay_ms: 20,
            loss_percent: loss,
            bw_mbps: 10,
            bdp: calculate_bdp(20, 10, 10, 1000),
            qdisc,
        })
    }

    #[test]
    fn test_emulation_node_chain() {
        let plan = plan_interface(&e1(), "e1-eth0", shape(QueuePolicy::Red, 1.0), Offloads::default(), MODERN);
        assert_eq!(
            plan.lines(),
            [
                "tc qdisc add dev e1-eth0 root handle 2: netem delay 20ms loss 1%",
                "tc qdisc add dev e1-eth0 parent 2: handle 3: htb default 10",
                "tc class add dev e1-eth0 parent 3: classid 10 htb rate 10Mbit quantum 125000",
                "tc qdisc add dev e1-eth0 parent 3:10 handle 11: red limit 300000 avpkt 1000 adaptive harddrop bandwidth 10Mbit burst 26",
                "ethtool -K e1-eth0 gso off tso off",
            ]
        );
        assert!(plan.steps().iter().all(|s| s.target == e1()));
    }

    #[test]
    fn test_zero_loss_omits_loss_clause() {
        let plan = plan_interface(&e1(), "e1-eth1", shape(QueuePolicy::Red, 0.0), Offloads::default(), MODERN);
        assert_eq!(plan.lines()[0], "tc qdisc add dev e1-eth1 root handle 2: netem delay 20ms");
    }

    #[test]
    fn test_policer_doubles_htb_rate() {
        let plan = plan_interface(&e1(), "e1-eth0", shape(QueuePolicy::Policer, 0.0), Offloads::default(), MODERN);
        let lines = plan.lines();
        assert!(lines[2].contains("htb rate 20Mbit"));
        assert!(lines[3].starts_with("tc filter add dev e1-eth0 parent 3:"));
        assert!(lines[3].contains("police rate 10mbit burst 12500"));
    }

    #[test]
    fn test_endpoint_pacing() {
        let h1 = ExecTarget::host("h1");
        let plan = plan_interface(&h1, "h1-eth0", InterfaceRole::Endpoint { pacing: false }, Offloads::default(), MODERN);
        assert!(plan.is_empty());

        let plan = plan_interface(&h1, "h1-eth0", InterfaceRole::Endpoint { pacing: true }, Offloads::default(), MODERN);
        assert_eq!(plan.lines(), ["tc qdisc add dev h1-eth0 root handle 2: fq pacing"]);

        let old = KernelVersion::new(4, 19);
        let plan = plan_interface(&h1, "h1-eth0", InterfaceRole::Endpoint { pacing: false }, Offloads::default(), old);
        assert_eq!(plan.len(), 1);
    }

    #[test]
    fn test_offloads_can_stay_on() {
        let offloads = Offloads { gso: true, tso: false };
        let plan = plan_interface(&e1(), "e1-eth0", shape(QueuePolicy::FqCodel, 0.0), offloads, MODERN);
        assert_eq!(plan.lines().last().unwrap(), "ethtool -K e1-eth0 gso on tso off");
    }
}
