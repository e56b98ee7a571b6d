//! `h1 - e1 - r1 - e2 - h2`: two independently shaped segments joined by a
//! forwarding router.

use super::addressing::{host_ip, host_mac, router_ip, router_mac, subnet, CLIENT_DIGIT, SERVER_DIGIT};
use super::{bridge_plan, neighbor_command, PathParams, ShapingStep, Topology};
use crate::error::Result;
use crate::process::{CommandPlan, ExecTarget};
use crate::shaper::{calculate_bdp, InterfaceRole, LinkShape};

pub const ROUTER: &str = "r1";

pub fn declare(topology: &mut Topology) -> Result<()> {
    topology.add_host("h1", Some(&host_ip(CLIENT_DIGIT)?), Some(&host_mac(CLIENT_DIGIT)?))?;
    topology.add_host("h2", Some(&host_ip(SERVER_DIGIT)?), Some(&host_mac(SERVER_DIGIT)?))?;
    topology.add_host(ROUTER, None, None)?;
    topology.add_host("e1", None, None)?;
    topology.add_host("e2", None, None)?;

    topology.add_link("h1", "e1")?;
    topology.add_link("e1", ROUTER)?;
    topology.add_link(ROUTER, "e2")?;
    topology.add_link("e2", "h2")?;

    topology.set_interface_address("r1-eth0", Some(&router_ip(CLIENT_DIGIT)?), Some(&router_mac(CLIENT_DIGIT)?))?;
    topology.set_interface_address("r1-eth1", Some(&router_ip(SERVER_DIGIT)?), Some(&router_mac(SERVER_DIGIT)?))?;
    topology.set_primary_interfaces(&["h1-eth0", "h2-eth0"])
}

/// Forwarding, bridging, routes and static neighbours
pub fn network_plan() -> Result<CommandPlan> {
    let mut plan = CommandPlan::new();
    let h1 = ExecTarget::host("h1");
    let h2 = ExecTarget::host("h2");
    let r1 = ExecTarget::host(ROUTER);

    plan.push(&r1, "sysctl -w net.ipv4.ip_forward=1");
    bridge_plan(&mut plan, &ExecTarget::host("e1"), &["e1-eth0", "e1-eth1"]);
    bridge_plan(&mut plan, &ExecTarget::host("e2"), &["e2-eth0", "e2-eth1"]);

    let gw1 = router_ip(CLIENT_DIGIT)?;
    let gw2 = router_ip(SERVER_DIGIT)?;
    plan.push(&h1, format!("ip route add {} via {}", subnet(SERVER_DIGIT)?, super::addressing::bare(&gw1)));
    plan.push(&h2, format!("ip route add {} via {}", subnet(CLIENT_DIGIT)?, super::addressing::bare(&gw2)));

    plan.push(&h1, neighbor_command(&gw1, &router_mac(CLIENT_DIGIT)?, "h1-eth0"));
    plan.push(&h2, neighbor_command(&gw2, &router_mac(SERVER_DIGIT)?, "h2-eth0"));
    plan.push(&r1, neighbor_command(&host_ip(CLIENT_DIGIT)?, &host_mac(CLIENT_DIGIT)?, "r1-eth0"));
    plan.push(&r1, neighbor_command(&host_ip(SERVER_DIGIT)?, &host_mac(SERVER_DIGIT)?, "r1-eth1"));
    Ok(plan)
}

/// Segment 1 on `e1`, segment 2 on `e2`, one BDP for the whole path
pub fn shaping_steps(params: &PathParams) -> Vec<ShapingStep> {
    let bdp = calculate_bdp(params.delay1_ms, params.delay2_ms, params.bw1_mbps, params.bw2_mbps);
    let segment1 = InterfaceRole::EmulationNode(LinkShape {
        delay_ms: params.delay1_ms,
        loss_percent: params.loss1_percent,
        bw_mbps: params.bw1_mbps,
        bdp,
        qdisc: params.qdisc,
    });
    let segment2 = InterfaceRole::EmulationNode(LinkShape {
        delay_ms: params.delay2_ms,
        loss_percent: params.loss2_percent,
        bw_mbps: params.bw2_mbps,
        bdp,
        qdisc: params.qdisc,
    });
    let endpoint = InterfaceRole::Endpoint { pacing: params.pacing };

    [
        ("h1-eth0", endpoint),
        ("r1-eth0", endpoint),
        ("r1-eth1", endpoint),
        ("h2-eth0", endpoint),
        ("e1-eth0", segment1),
        ("e1-eth1", segment1),
        ("e2-eth0", segment2),
        ("e2-eth1", segment2),
    ]
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
