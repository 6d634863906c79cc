//! Topology builders shared by unit tests.

use std::net::Ipv4Addr;

use crate::model::topology::{IfId, NodeId, Topology};

pub struct TopoBuilder {
    topo: Topology,
    next_subnet: u32,
}

impl TopoBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            topo: Topology::new(name),
            next_subnet: u32::from(Ipv4Addr::new(10, 0, 0, 0)),
        }
    }

    /// Adds a router with loopback 122.x.y.z derived from its index.
    pub fn node(mut self, name: &str) -> Self {
        let id = self.topo.add_node(name).expect("fixture node");
        let loopback = Ipv4Addr::from(u32::from(Ipv4Addr::new(122, 1, 0, 0)) + id.0 as u32 + 1);
        self.topo
            .set_loopback(id, loopback)
            .expect("fixture loopback");
        self
    }

    /// Adds an up/up L3 link in a fresh /30.
    pub fn link(mut self, a: &str, b: &str, cost: u32) -> Self {
        add_l3_link(&mut self.topo, &mut self.next_subnet, a, b, cost);
        self
    }

    pub fn build(self) -> Topology {
        self.topo
    }
}

pub fn add_l3_link(topo: &mut Topology, next_subnet: &mut u32, a: &str, b: &str, cost: u32) {
    let node_a = id(topo, a);
    let node_b = id(topo, b);
    let if_a = format!("eth{}", interface_count(topo, node_a));
    let if_b = format!("eth{}", interface_count(topo, node_b));
    topo.add_link(node_a, &if_a, node_b, &if_b, cost)
        .expect("fixture link");

    let subnet = *next_subnet;
    *next_subnet += 4;
    let end_a = topo.interface_by_name(node_a, &if_a).expect("end a");
    let end_b = topo.interface_by_name(node_b, &if_b).expect("end b");
    topo.set_interface_ip(end_a, Ipv4Addr::from(subnet + 1), 30)
        .expect("fixture ip a");
    topo.set_interface_ip(end_b, Ipv4Addr::from(subnet + 2), 30)
        .expect("fixture ip b");
}

fn interface_count(topo: &Topology, node: NodeId) -> usize {
    topo.node(node).map_or(0, |node| node.interfaces.len())
}

pub fn id(topo: &Topology, name: &str) -> NodeId {
    topo.node_by_name(name)
        .unwrap_or_else(|| panic!("fixture has no node {name}"))
}

/// Interfaces of `from` whose link lands on `to`, in creation order.
pub fn oifs_towards(topo: &Topology, from: &str, to: &str) -> Vec<IfId> {
    let to = id(topo, to);
    topo.neighbors(id(topo, from))
        .into_iter()
        .filter(|(neighbor, _)| *neighbor == to)
        .map(|(_, oif)| oif)
        .collect()
}

/// Deterministic generator for property-style tests.
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed.max(1))
    }

    pub fn next_u64(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1);
        self.0 >> 33
    }

    pub fn below(&mut self, bound: u64) -> u64 {
        self.next_u64() % bound.max(1)
    }
}

/// A connected topology: a random spanning tree plus `extra` random chords,
/// link costs in `1..=max_cost`.
pub fn random_topology(seed: u64, nodes: usize, extra: usize, max_cost: u32) -> Topology {
    let mut rng = Lcg::new(seed);
    let mut builder = TopoBuilder::new("random");
    for idx in 0..nodes {
        builder = builder.node(&format!("R{idx}"));
    }
    for idx in 1..nodes {
        let parent = rng.below(idx as u64) as usize;
        let cost = 1 + rng.below(u64::from(max_cost)) as u32;
        builder = builder.link(&format!("R{parent}"), &format!("R{idx}"), cost);
    }
    for _ in 0..extra {
        let a = rng.below(nodes as u64) as usize;
        let b = rng.below(nodes as u64) as usize;
        if a == b {
            continue;
        }
        let cost = 1 + rng.below(u64::from(max_cost)) as u32;
        builder = builder.link(&format!("R{a}"), &format!("R{b}"), cost);
    }
    builder.build()
}
