//! Virtual topologies built from network namespaces and veth pairs.
//!
//! A [`Topology`] is declared first (hosts, links, interface addresses),
//! then materialised with [`Topology::build`]. Every command it issues goes
//! through the [`ProcessSupervisor`], which also owns the background
//! processes (servers, proxy, captures) started against it.

pub mod addressing;
pub mod direct;
pub mod proxy;
pub mod two_segment;

use crate::error::{AppError, Result};
use crate::logging::{LogLevel, Logger};
use crate::models::Config;
use crate::process::{
    CommandPlan, ExecTarget, OutputHandling, ProcessSupervisor, ReadinessPolicy, ReadyMarker, RunOptions,
};
use crate::shaper::{InterfaceRole, Offloads, TrafficShaper};
use crate::types::{QueuePolicy, TopologyKind};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// A namespace-backed host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualHost {
    pub name: String,
    pub ip: Option<String>,
    pub mac: Option<String>,
    /// Interfaces in creation order; `<name>-eth0` first
    pub interfaces: Vec<String>,
}

/// A veth pair; `a` and `b` are interface names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub a: String,
    pub b: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct InterfaceAddress {
    ip: Option<String>,
    mac: Option<String>,
}

/// Path characteristics for both segments
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathParams {
    pub delay1_ms: u32,
    pub delay2_ms: u32,
    pub loss1_percent: f64,
    pub loss2_percent: f64,
    pub bw1_mbps: u32,
    pub bw2_mbps: u32,
    pub qdisc: QueuePolicy,
    /// Pace endpoint interfaces regardless of kernel version
    pub pacing: bool,
    pub offloads: Offloads,
}

impl PathParams {
    pub fn from_config(config: &Config) -> Self {
        Self {
            delay1_ms: config.delay1_ms,
            delay2_ms: config.delay2_ms,
            loss1_percent: config.loss1_percent,
            loss2_percent: config.loss2_percent,
            bw1_mbps: config.bw1_mbps,
            bw2_mbps: config.bw2_mbps,
            qdisc: config.qdisc,
            pacing: config.pacing_requested(),
            offloads: Offloads::default(),
        }
    }
}

/// One interface's shaping assignment
#[derive(Debug, Clone, PartialEq)]
pub struct ShapingStep {
    pub iface: String,
    pub role: InterfaceRole,
}

/// `ip neigh` command pinning `ip` to `mac` on `iface`
pub fn neighbor_command(ip: &str, mac: &str, iface: &str) -> String {
    format!(
        "ip neigh replace {} lladdr {} dev {} nud permanent",
        addressing::bare(ip),
        mac,
        iface
    )
}

/// Commands turning `bridge_host` into a transparent bridge over `ifaces`
pub fn bridge_plan(plan: &mut CommandPlan, bridge_host: &ExecTarget, ifaces: &[&str]) {
    plan.push(bridge_host, "ip link add br0 type bridge");
    for iface in ifaces {
        plan.push(bridge_host, format!("ip link set {} master br0", iface));
    }
    plan.push(bridge_host, "ip link set dev br0 up");
}

pub struct Topology {
    kind: TopologyKind,
    prefix: String,
    hosts: Vec<VirtualHost>,
    links: Vec<Link>,
    iface_to_host: BTreeMap<String, String>,
    addresses: BTreeMap<String, InterfaceAddress>,
    primary: Vec<String>,
    supervisor: ProcessSupervisor,
    shaper: TrafficShaper,
    logger: Logger,
    built: bool,
    stopped: bool,
}

impl std::fmt::Debug for Topology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Topology")
            .field("kind", &self.kind)
            .field("hosts", &self.hosts)
            .field("links", &self.links)
            .field("built", &self.built)
            .finish()
    }
}

impl Topology {
    pub fn new<S: Into<String>>(
        kind: TopologyKind,
        prefix: S,
        supervisor: ProcessSupervisor,
        shaper: TrafficShaper,
        logger: Logger,
    ) -> Self {
        Self {
            kind,
            prefix: prefix.into(),
            hosts: Vec::new(),
            links: Vec::new(),
            iface_to_host: BTreeMap::new(),
            addresses: BTreeMap::new(),
            primary: Vec::new(),
            supervisor,
            shaper,
            logger,
            built: false,
            stopped: false,
        }
    }

    /// Declare, build, wire and shape a topology of `kind`
    pub async fn create<S: Into<String>>(
        kind: TopologyKind,
        prefix: S,
        supervisor: ProcessSupervisor,
        shaper: TrafficShaper,
        logger: Logger,
        params: &PathParams,
    ) -> Result<Self> {
        let mut topology = Self::new(kind, prefix, supervisor, shaper, logger);
        let result = match kind {
            TopologyKind::Direct => direct::setup(&mut topology, params).await,
            TopologyKind::TwoSegment => two_segment::setup(&mut topology, params).await,
        };
        if let Err(e) = result {
            topology.stop().await;
            return Err(e);
        }
        Ok(topology)
    }

    pub fn kind(&self) -> TopologyKind {
        self.kind
    }

    pub fn namespace(&self, host: &str) -> String {
        format!("{}{}", self.prefix, host)
    }

    pub fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn is_built(&self) -> bool {
        self.built
    }

    pub fn hosts(&self) -> &[VirtualHost] {
        &self.hosts
    }

    pub fn host(&self, name: &str) -> Option<&VirtualHost> {
        self.hosts.iter().find(|h| h.name == name)
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Every interface mapped to its owning host, sorted by interface name
    pub fn interfaces(&self) -> &BTreeMap<String, String> {
        &self.iface_to_host
    }

    /// Interfaces where measurements and captures are taken
    pub fn primary_interfaces(&self) -> &[String] {
        &self.primary
    }

    pub fn host_of(&self, iface: &str) -> Result<&str> {
        self.iface_to_host
            .get(iface)
            .map(String::as_str)
            .ok_or_else(|| AppError::topology(format!("Unknown interface: {}", iface)))
    }

    pub fn target_of(&self, iface: &str) -> Result<ExecTarget> {
        self.host_of(iface).map(ExecTarget::host)
    }

    fn require_host(&self, name: &str) -> Result<&VirtualHost> {
        self.host(name)
            .ok_or_else(|| AppError::topology(format!("Unknown host: {}", name)))
    }

    fn require_declaring(&self) -> Result<()> {
        if self.built {
            return Err(AppError::topology("Topology is already built"));
        }
        Ok(())
    }

    pub fn add_host(&mut self, name: &str, ip: Option<&str>, mac: Option<&str>) -> Result<()> {
        self.require_declaring()?;
        if name.is_empty() || name.chars().any(|c| !c.is_ascii_alphanumeric()) {
            return Err(AppError::validation(format!("Invalid host name: {:?}", name)));
        }
        if self.host(name).is_some() {
            return Err(AppError::topology(format!("Host {} already exists", name)));
        }
        self.hosts.push(VirtualHost {
            name: name.to_string(),
            ip: ip.map(String::from),
            mac: mac.map(String::from),
            interfaces: Vec::new(),
        });
        Ok(())
    }

    fn next_interface(&mut self, host: &str) -> Result<String> {
        let entry = self
            .hosts
            .iter_mut()
            .find(|h| h.name == host)
            .ok_or_else(|| AppError::topology(format!("Unknown host: {}", host)))?;
        let iface = format!("{}-eth{}", entry.name, entry.interfaces.len());
        if entry.interfaces.is_empty() && (entry.ip.is_some() || entry.mac.is_some()) {
            self.addresses.insert(
                iface.clone(),
                InterfaceAddress {
                    ip: entry.ip.clone(),
                    mac: entry.mac.clone(),
                },
            );
        }
        entry.interfaces.push(iface.clone());
        self.iface_to_host.insert(iface.clone(), host.to_string());
        Ok(iface)
    }

    /// Connect two hosts; returns the new interface on each side
    pub fn add_link(&mut self, a: &str, b: &str) -> Result<(String, String)> {
        self.require_declaring()?;
        if a == b {
            return Err(AppError::topology(format!("Cannot link {} to itself", a)));
        }
        self.require_host(a)?;
        self.require_host(b)?;
        let iface_a = self.next_interface(a)?;
        let iface_b = self.next_interface(b)?;
        self.links.push(Link {
            a: iface_a.clone(),
            b: iface_b.clone(),
        });
        Ok((iface_a, iface_b))
    }

    /// Assign an address and/or MAC to an interface before building
    pub fn set_interface_address(&mut self, iface: &str, ip: Option<&str>, mac: Option<&str>) -> Result<()> {
        self.require_declaring()?;
        self.host_of(iface)?;
        self.addresses.insert(
            iface.to_string(),
            InterfaceAddress {
                ip: ip.map(String::from),
                mac: mac.map(String::from),
            },
        );
        Ok(())
    }

    pub fn set_primary_interfaces(&mut self, ifaces: &[&str]) -> Result<()> {
        for iface in ifaces {
            self.host_of(iface)?;
        }
        self.primary = ifaces.iter().map(|s| s.to_string()).collect();
        Ok(())
    }

    /// Commands materialising the declared hosts and links
    pub fn build_plan(&self) -> CommandPlan {
        let mut plan = CommandPlan::new();
        let local = ExecTarget::Local;

        for host in &self.hosts {
            let ns = self.namespace(&host.name);
            plan.push_tolerant(&local, format!("ip netns del {}", ns));
            plan.push(&local, format!("ip netns add {}", ns));
            plan.push(&ExecTarget::host(&host.name), "ip link set lo up");
        }

        for link in &self.links {
            plan.push(&local, format!("ip link add {} type veth peer name {}", link.a, link.b));
            for iface in [&link.a, &link.b] {
                let host = &self.iface_to_host[iface];
                plan.push(&local, format!("ip link set {} netns {}", iface, self.namespace(host)));
            }
        }

        for host in &self.hosts {
            let target = ExecTarget::host(&host.name);
            for iface in &host.interfaces {
                if let Some(address) = self.addresses.get(iface) {
                    if let Some(mac) = &address.mac {
                        plan.push(&target, format!("ip link set dev {} address {}", iface, mac));
                    }
                    if let Some(ip) = &address.ip {
                        plan.push(&target, format!("ip addr add {} brd + dev {}", ip, iface));
                    }
                }
                plan.push(&target, format!("ip link set {} up", iface));
            }
        }
        plan
    }

    /// Commands releasing every namespace; veth pairs go with them
    pub fn teardown_plan(&self) -> CommandPlan {
        let mut plan = CommandPlan::new();
        for host in &self.hosts {
            plan.push_tolerant(&ExecTarget::Local, format!("ip netns del {}", self.namespace(&host.name)));
        }
        plan
    }

    pub async fn build(&mut self) -> Result<()> {
        self.require_declaring()?;
        if self.hosts.is_empty() {
            return Err(AppError::topology("Cannot build a topology without hosts"));
        }
        let plan = self.build_plan();
        self.logger
            .info(&format!(
                "Building {} topology: {} hosts, {} links",
                self.kind,
                self.hosts.len(),
                self.links.len()
            ))
            .field("commands", plan.len())
            .log()
            .await;
        self.built = true;
        self.supervisor.execute_plan(&plan).await
    }

    fn require_built(&self) -> Result<()> {
        if !self.built {
            return Err(AppError::topology("Topology has not been built"));
        }
        Ok(())
    }

    /// Pin a neighbour entry so no address resolution happens on the wire
    pub async fn set_static_neighbor(&self, host: &str, ip: &str, mac: &str, iface: &str) -> Result<()> {
        self.require_built()?;
        self.require_host(host)?;
        self.supervisor
            .run(
                &ExecTarget::host(host),
                neighbor_command(ip, mac, iface),
                RunOptions::new().command_level(LogLevel::Debug),
            )
            .await?;
        Ok(())
    }

    pub async fn execute(&self, plan: &CommandPlan) -> Result<()> {
        self.require_built()?;
        self.supervisor.execute_plan(plan).await
    }

    pub async fn configure_interface(&self, iface: &str, role: InterfaceRole, offloads: Offloads) -> Result<()> {
        self.require_built()?;
        let target = self.target_of(iface)?;
        self.shaper.configure_interface(&target, iface, role, offloads).await
    }

    pub async fn apply_shaping(&self, steps: &[ShapingStep], offloads: Offloads) -> Result<()> {
        for step in steps {
            self.configure_interface(&step.iface, step.role, offloads).await?;
        }
        Ok(())
    }

    /// Capture every primary interface to `<logdir>/<iface>.pcap`
    pub async fn start_packet_capture(&self, logdir: &Path, setup_timeout: Duration) -> Result<()> {
        self.require_built()?;
        for iface in &self.primary {
            let target = self.target_of(iface)?;
            let pcap = logdir.join(format!("{}.pcap", iface));
            let command = format!("tcpdump -i {} -w {}", iface, pcap.display());
            self.supervisor
                .spawn_until_ready(
                    "tcpdump",
                    &target,
                    command,
                    OutputHandling::new().echo(LogLevel::Debug, false, true),
                    ReadyMarker::contains("listening on"),
                    setup_timeout,
                    ReadinessPolicy::BestEffort,
                )
                .await?;
        }
        Ok(())
    }

    /// Set the TCP congestion control on every host.
    ///
    /// Older kernels refuse the per-namespace sysctl; there the host-wide
    /// setting is changed once and inherited.
    pub async fn set_tcp_congestion_control(&self, cca: &str) -> Result<()> {
        self.require_built()?;
        let command = format!("sysctl -w net.ipv4.tcp_congestion_control={}", cca);
        let kernel = self.shaper.kernel();
        if !kernel.has_namespaced_cca() {
            self.logger
                .debug(&format!("Kernel {} has no per-namespace congestion control", kernel))
                .log()
                .await;
            self.supervisor.run_local(&command, true).await?;
            return Ok(());
        }
        for host in &self.hosts {
            self.supervisor
                .run(
                    &ExecTarget::host(&host.name),
                    command.as_str(),
                    RunOptions::new()
                        .command_level(LogLevel::Debug)
                        .output(OutputHandling::new().echo(LogLevel::Debug, false, false)),
                )
                .await?;
        }
        Ok(())
    }

    /// Stop background processes and release every namespace. Safe to call
    /// more than once.
    pub async fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.supervisor.stop().await;
        if self.built {
            if let Err(e) = self.supervisor.execute_plan(&self.teardown_plan()).await {
                self.logger
                    .warn(&format!("Topology teardown incomplete: {}", e))
                    .log()
                    .await;
            }
        }
        self.logger.debug("Topology stopped").log().await;
    }
}
