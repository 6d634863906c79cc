use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info};

use crate::model::routing::{Route, RouteTable};
use crate::model::topology::{IfChangeFlags, IfId, L2Mode, NodeId, Topology};
use crate::protocols::spf::{SpfEngine, SpfRunSummary};
use crate::runtime::config::{EndpointConfig, InterfaceRef, TopologyConfig, TopologyEvent};

#[derive(Debug, Clone, Serialize)]
pub struct NexthopView {
    pub node: String,
    pub oif: String,
    pub gateway: Ipv4Addr,
    pub ref_count: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpfResultView {
    pub destination: String,
    pub metric: u32,
    pub nexthops: Vec<NexthopView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeSnapshot {
    pub node: String,
    pub loopback: Option<Ipv4Addr>,
    pub spf_results: Vec<SpfResultView>,
    pub routes: Vec<Route>,
}

/// A topology together with every router's routing table and the SPF engine
/// that fills them. All interface changes go through here so up/down
/// transitions can trigger a recompute.
#[derive(Debug)]
pub struct Network {
    topology: Topology,
    tables: BTreeMap<NodeId, RouteTable>,
    engine: SpfEngine,
}

impl Network {
    pub fn new(topology: Topology) -> Self {
        let mut tables = BTreeMap::new();
        for node_id in topology.node_ids() {
            let table: &mut RouteTable = tables.entry(node_id).or_default();
            let Some(node) = topology.node(node_id) else {
                continue;
            };
            if let Some(loopback) = node.loopback {
                table.add_direct_route(loopback, 32);
            }
            for intf in &node.interfaces {
                if let Some(address) = topology.interface(*intf).and_then(|i| i.address) {
                    table.add_direct_route(address.ip, address.mask);
                }
            }
        }
        Self {
            topology,
            tables,
            engine: SpfEngine::new(),
        }
    }

    pub fn from_config(cfg: &TopologyConfig) -> Result<Self> {
        let mut topology = Topology::new(cfg.name.as_str());
        for node in &cfg.nodes {
            let id = topology.add_node(&node.name)?;
            if let Some(loopback) = node.loopback {
                topology.set_loopback(id, loopback)?;
            }
        }
        for (idx, link) in cfg.links.iter().enumerate() {
            let node_a = lookup_node(&topology, &link.a.target.node)
                .with_context(|| format!("link {idx}"))?;
            let node_b = lookup_node(&topology, &link.b.target.node)
                .with_context(|| format!("link {idx}"))?;
            topology
                .add_link(
                    node_a,
                    &link.a.target.interface,
                    node_b,
                    &link.b.target.interface,
                    link.cost,
                )
                .with_context(|| format!("link {idx}"))?;
            configure_endpoint(&mut topology, &link.a).with_context(|| format!("link {idx}"))?;
            configure_endpoint(&mut topology, &link.b).with_context(|| format!("link {idx}"))?;
        }
        info!(
            "loaded topology {}: nodes={} links={}",
            topology.name(),
            topology.node_count(),
            cfg.links.len()
        );
        Ok(Self::new(topology))
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn engine(&self) -> &SpfEngine {
        &self.engine
    }

    pub fn routing_table(&self, node: NodeId) -> Option<&RouteTable> {
        self.tables.get(&node)
    }

    /// Start-up run over every router.
    pub fn init_spf(&mut self) -> Vec<SpfRunSummary> {
        info!("spf init: topology={}", self.topology.name());
        self.compute_spf_all()
    }

    pub fn compute_spf(&mut self, node: NodeId) -> SpfRunSummary {
        let table = self.tables.entry(node).or_default();
        self.engine.compute_spf(&self.topology, table, node)
    }

    pub fn compute_spf_all(&mut self) -> Vec<SpfRunSummary> {
        self.engine.compute_spf_all(&self.topology, &mut self.tables)
    }

    /// Returns the runs performed, if the change called for any.
    pub fn on_interface_update(
        &mut self,
        intf: IfId,
        flags: IfChangeFlags,
    ) -> Option<Vec<SpfRunSummary>> {
        if !SpfEngine::interface_update_requires_run(flags) {
            debug!("interface {} update flags={:?}: no spf run", self.interface_label(intf), flags);
            return None;
        }
        info!("interface {} changed state: recomputing spf", self.interface_label(intf));
        Some(self.compute_spf_all())
    }

    pub fn resolve_interface(&self, target: &InterfaceRef) -> Result<IfId> {
        let node = lookup_node(&self.topology, &target.node)?;
        self.topology
            .interface_by_name(node, &target.interface)
            .with_context(|| format!("unknown interface {}/{}", target.node, target.interface))
    }

    pub fn set_interface_up(&mut self, intf: IfId, is_up: bool) -> Result<IfChangeFlags> {
        let flags = self.topology.set_interface_up(intf, is_up)?;
        self.on_interface_update(intf, flags);
        Ok(flags)
    }

    pub fn set_link_cost(&mut self, intf: IfId, cost: u32) -> Result<IfChangeFlags> {
        let flags = self.topology.set_link_cost(intf, cost)?;
        self.on_interface_update(intf, flags);
        Ok(flags)
    }

    pub fn set_interface_ip(&mut self, intf: IfId, ip: Ipv4Addr, mask: u8) -> Result<IfChangeFlags> {
        let previous = self.current_address(intf)?;
        let flags = self.topology.set_interface_ip(intf, ip, mask)?;
        if flags.contains(IfChangeFlags::IP_ADDR) {
            let node = self.owner(intf)?;
            let table = self.tables.entry(node).or_default();
            if let Some((old_ip, old_mask)) = previous {
                table.remove_direct_route(old_ip, old_mask);
            }
            table.add_direct_route(ip, mask);
        }
        self.on_interface_update(intf, flags);
        Ok(flags)
    }

    pub fn set_interface_l2_mode(&mut self, intf: IfId, mode: L2Mode) -> Result<IfChangeFlags> {
        let previous = self.current_address(intf)?;
        let flags = self.topology.set_interface_l2_mode(intf, mode)?;
        if let Some((old_ip, old_mask)) = previous {
            let node = self.owner(intf)?;
            self.tables
                .entry(node)
                .or_default()
                .remove_direct_route(old_ip, old_mask);
        }
        self.on_interface_update(intf, flags);
        Ok(flags)
    }

    pub fn apply_event(&mut self, event: &TopologyEvent) -> Result<IfChangeFlags> {
        let target = event.target();
        let intf = self
            .resolve_interface(target)
            .with_context(|| format!("event {}", event.action()))?;
        info!("event {} on {}/{}", event.action(), target.node, target.interface);
        match event {
            TopologyEvent::Shutdown(_) => self.set_interface_up(intf, false),
            TopologyEvent::NoShutdown(_) => self.set_interface_up(intf, true),
            TopologyEvent::Cost { cost, .. } => self.set_link_cost(intf, *cost),
            TopologyEvent::Ip { ip, mask, .. } => self.set_interface_ip(intf, *ip, *mask),
            TopologyEvent::L2Mode { mode, .. } => self.set_interface_l2_mode(intf, *mode),
        }
    }

    /// Read-only view of the last results and routing table of `root`.
    pub fn snapshot(&self, root: NodeId) -> Option<NodeSnapshot> {
        let node = self.topology.node(root)?;
        let spf_results = self
            .engine
            .results(root)
            .map(|table| {
                table
                    .entries()
                    .iter()
                    .map(|entry| SpfResultView {
                        destination: self.node_name(entry.node),
                        metric: entry.metric,
                        nexthops: entry
                            .nexthops
                            .iter()
                            .filter_map(|id| {
                                let nexthop = self.engine.nexthop(id)?;
                                Some(NexthopView {
                                    node: self.peer_node_name(nexthop.oif),
                                    oif: self.interface_label(nexthop.oif),
                                    gateway: nexthop.gateway,
                                    ref_count: self.engine.nexthop_ref_count(id).unwrap_or(0),
                                })
                            })
                            .collect(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Some(NodeSnapshot {
            node: node.name.clone(),
            loopback: node.loopback,
            spf_results,
            routes: self
                .tables
                .get(&root)
                .map(|table| table.routes().to_vec())
                .unwrap_or_default(),
        })
    }

    pub fn snapshots(&self) -> Vec<NodeSnapshot> {
        self.topology
            .node_ids()
            .filter_map(|node| self.snapshot(node))
            .collect()
    }

    fn current_address(&self, intf: IfId) -> Result<Option<(Ipv4Addr, u8)>> {
        let interface = self
            .topology
            .interface(intf)
            .with_context(|| format!("unknown {intf}"))?;
        Ok(interface.address.map(|address| (address.ip, address.mask)))
    }

    fn owner(&self, intf: IfId) -> Result<NodeId> {
        self.topology
            .interface(intf)
            .map(|interface| interface.node)
            .with_context(|| format!("unknown {intf}"))
    }

    fn node_name(&self, node: NodeId) -> String {
        self.topology
            .node(node)
            .map_or_else(|| node.to_string(), |node| node.name.clone())
    }

    fn peer_node_name(&self, intf: IfId) -> String {
        self.topology
            .peer_interface(intf)
            .and_then(|peer| self.topology.interface(peer))
            .map_or_else(|| "-".to_string(), |peer| self.node_name(peer.node))
    }

    fn interface_label(&self, intf: IfId) -> String {
        let Some(interface) = self.topology.interface(intf) else {
            return intf.to_string();
        };
        format!("{}/{}", self.node_name(interface.node), interface.name)
    }
}

fn lookup_node(topology: &Topology, name: &str) -> Result<NodeId> {
    topology
        .node_by_name(name)
        .with_context(|| format!("unknown node {name}"))
}

fn configure_endpoint(topology: &mut Topology, end: &EndpointConfig) -> Result<()> {
    let node = lookup_node(topology, &end.target.node)?;
    let intf = topology
        .interface_by_name(node, &end.target.interface)
        .with_context(|| format!("unknown interface {}", end.target.interface))?;
    if let Some((ip, mask)) = end.address {
        topology.set_interface_ip(intf, ip, mask)?;
    }
    if let Some(mode) = end.l2_mode {
        topology.set_interface_l2_mode(intf, mode)?;
    }
    topology.set_interface_up(intf, end.up)?;
    Ok(())
}
