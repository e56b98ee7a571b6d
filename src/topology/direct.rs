//! `h1 - e1 - h2`: one shaped segment between client and server.
//!
//! Both endpoints sit on the same bridged L2 segment with different /24s, so
//! each routes the other's subnet straight out of its only interface.

use super::addressing::{host_ip, host_mac, subnet, CLIENT_DIGIT, SERVER_DIGIT};
use super::{bridge_plan, neighbor_command, PathParams, ShapingStep, Topology};
use crate::error::Result;
use crate::process::{CommandPlan, ExecTarget};
use crate::shaper::{calculate_bdp, InterfaceRole, LinkShape};

pub fn declare(topology: &mut Topology) -> Result<()> {
    topology.add_host("h1", Some(&host_ip(CLIENT_DIGIT)?), Some(&host_mac(CLIENT_DIGIT)?))?;
    topology.add_host("h2", Some(&host_ip(SERVER_DIGIT)?), Some(&host_mac(SERVER_DIGIT)?))?;
    topology.add_host("e1", None, None)?;
    topology.add_link("h1", "e1")?;
    topology.add_link("e1", "h2")?;
    topology.set_primary_interfaces(&["h1-eth0", "h2-eth0"])
}

/// Bridging, routes and static neighbours
pub fn network_plan() -> Result<CommandPlan> {
    let mut plan = CommandPlan::new();
    let h1 = ExecTarget::host("h1");
    let h2 = ExecTarget::host("h2");

    bridge_plan(&mut plan, &ExecTarget::host("e1"), &["e1-eth0", "e1-eth1"]);

    plan.push(&h1, format!("ip route add {} dev h1-eth0", subnet(SERVER_DIGIT)?));
    plan.push(&h2, format!("ip route add {} dev h2-eth0", subnet(CLIENT_DIGIT)?));

    plan.push(&h1, neighbor_command(&host_ip(SERVER_DIGIT)?, &host_mac(SERVER_DIGIT)?, "h1-eth0"));
    plan.push(&h2, neighbor_command(&host_ip(CLIENT_DIGIT)?, &host_mac(CLIENT_DIGIT)?, "h2-eth0"));
    Ok(plan)
}

/// Segment 1 parameters on both emulator interfaces
pub fn shaping_steps(params: &PathParams) -> Vec<ShapingStep> {
    let bdp = calculate_bdp(params.delay1_ms, 0, params.bw1_mbps, params.bw1_mbps);
    let emulated = InterfaceRole::EmulationNode(LinkShape {
        delay_ms: params.delay1_ms,
        loss_percent: params.loss1_percent,
        bw_mbps: params.bw1_mbps,
        bdp,
        qdisc: params.qdisc,
    });
    let endpoint = InterfaceRole::Endpoint { pacing: params.pacing };

    [("h1-eth0", endpoint), ("h2-eth0", endpoint), ("e1-eth0", emulated), ("e1-eth1", emulated)]
        .into_iter()
        .map(|(iface, role)| ShapingStep {
            iface: iface.to_string(),
            role,
        })
        .collect()
}

pub async fn setup(topology: &mut Topology, params: &PathParams) -> Result<()> {
    declare(topology)?;
    topology.build().await?;
    topology.execute(&network_plan()?).await?;
    topology.apply_shaping(&shaping_steps(params), params.offloads).await
}
