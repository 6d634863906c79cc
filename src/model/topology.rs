use std::fmt;
use std::net::Ipv4Addr;
use std::ops::{BitOr, BitOrAssign};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct IfId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct LinkId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

impl fmt::Display for IfId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "if#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum L2Mode {
    Access,
    Trunk,
}

/// What an interface mutation actually changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IfChangeFlags(u32);

impl IfChangeFlags {
    pub const UP_DOWN: Self = Self(1 << 0);
    pub const IP_ADDR: Self = Self(1 << 1);
    pub const L2_MODE: Self = Self(1 << 2);
    pub const METRIC: Self = Self(1 << 3);

    pub fn empty() -> Self {
        Self(0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0 && !other.is_empty()
    }
}

impl BitOr for IfChangeFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for IfChangeFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceAddress {
    pub ip: Ipv4Addr,
    pub mask: u8,
}

impl InterfaceAddress {
    pub fn new(ip: Ipv4Addr, mask: u8) -> Result<Self> {
        if mask > 32 {
            bail!("invalid mask length /{mask} for {ip}");
        }
        Ok(Self { ip, mask })
    }

    pub fn subnet(&self) -> Ipv4Addr {
        apply_mask(self.ip, self.mask)
    }

    pub fn contains(&self, other: Ipv4Addr) -> bool {
        apply_mask(other, self.mask) == self.subnet()
    }
}

pub fn apply_mask(ip: Ipv4Addr, mask: u8) -> Ipv4Addr {
    let bits = match mask {
        0 => 0,
        m if m >= 32 => u32::MAX,
        m => u32::MAX << (32 - u32::from(m)),
    };
    Ipv4Addr::from(u32::from(ip) & bits)
}

#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub loopback: Option<Ipv4Addr>,
    pub interfaces: Vec<IfId>,
}

#[derive(Debug, Clone)]
pub struct Interface {
    pub name: String,
    pub node: NodeId,
    pub link: LinkId,
    pub address: Option<InterfaceAddress>,
    pub l2_mode: Option<L2Mode>,
    pub is_up: bool,
}

impl Interface {
    fn is_l3_mode(&self) -> bool {
        self.l2_mode.is_none() && self.address.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct Link {
    pub ends: [IfId; 2],
    pub cost: u32,
}

/// Routers, their interfaces and the point-to-point links between them.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    name: String,
    nodes: Vec<Node>,
    interfaces: Vec<Interface>,
    links: Vec<Link>,
}

impl Topology {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_node(&mut self, name: &str) -> Result<NodeId> {
        if self.node_by_name(name).is_some() {
            bail!("duplicate node name {name}");
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            name: name.to_string(),
            loopback: None,
            interfaces: Vec::new(),
        });
        Ok(id)
    }

    pub fn add_link(
        &mut self,
        node_a: NodeId,
        if_a: &str,
        node_b: NodeId,
        if_b: &str,
        cost: u32,
    ) -> Result<LinkId> {
        self.check_free_interface_name(node_a, if_a)?;
        self.check_free_interface_name(node_b, if_b)?;
        if node_a == node_b && if_a == if_b {
            bail!("link cannot join interface {if_a} to itself");
        }

        let link = LinkId(self.links.len());
        let end_a = self.push_interface(node_a, if_a, link);
        let end_b = self.push_interface(node_b, if_b, link);
        self.links.push(Link {
            ends: [end_a, end_b],
            cost,
        });
        Ok(link)
    }

    fn check_free_interface_name(&self, node: NodeId, if_name: &str) -> Result<()> {
        let owner = self
            .nodes
            .get(node.0)
            .with_context(|| format!("unknown {node}"))?;
        if self.interface_by_name(node, if_name).is_some() {
            bail!("duplicate interface {if_name} on node {}", owner.name);
        }
        Ok(())
    }

    fn push_interface(&mut self, node: NodeId, name: &str, link: LinkId) -> IfId {
        let id = IfId(self.interfaces.len());
        self.interfaces.push(Interface {
            name: name.to_string(),
            node,
            link,
            address: None,
            l2_mode: None,
            is_up: true,
        });
        self.nodes[node.0].interfaces.push(id);
        id
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(NodeId)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, node: NodeId) -> Option<&Node> {
        self.nodes.get(node.0)
    }

    pub fn node_by_name(&self, name: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|node| node.name == name)
            .map(NodeId)
    }

    pub fn interface(&self, intf: IfId) -> Option<&Interface> {
        self.interfaces.get(intf.0)
    }

    pub fn interface_by_name(&self, node: NodeId, name: &str) -> Option<IfId> {
        self.nodes
            .get(node.0)?
            .interfaces
            .iter()
            .copied()
            .find(|intf| self.interfaces[intf.0].name == name)
    }

    /// The interface at the far end of `intf`'s link.
    pub fn peer_interface(&self, intf: IfId) -> Option<IfId> {
        let link = self.links.get(self.interfaces.get(intf.0)?.link.0)?;
        match link.ends {
            [a, b] if a == intf => Some(b),
            [a, b] if b == intf => Some(a),
            _ => None,
        }
    }

    /// Every (neighbor, local interface) pair reachable over one link from `node`.
    pub fn neighbors(&self, node: NodeId) -> Vec<(NodeId, IfId)> {
        let Some(owner) = self.nodes.get(node.0) else {
            return Vec::new();
        };
        owner
            .interfaces
            .iter()
            .filter_map(|intf| {
                let peer = self.peer_interface(*intf)?;
                Some((self.interfaces[peer.0].node, *intf))
            })
            .collect()
    }

    pub fn link_cost(&self, intf: IfId) -> Option<u32> {
        let link = self.interfaces.get(intf.0)?.link;
        self.links.get(link.0).map(|link| link.cost)
    }

    pub fn peer_gateway(&self, intf: IfId) -> Option<Ipv4Addr> {
        let peer = self.peer_interface(intf)?;
        self.interfaces[peer.0].address.map(|addr| addr.ip)
    }

    pub fn is_l3_bidirectional(&self, intf: IfId) -> bool {
        let Some(local) = self.interfaces.get(intf.0) else {
            return false;
        };
        let Some(remote) = self.peer_interface(intf).map(|peer| &self.interfaces[peer.0]) else {
            return false;
        };
        if !local.is_l3_mode() || !remote.is_l3_mode() {
            return false;
        }
        if !local.is_up || !remote.is_up {
            return false;
        }
        match (local.address, remote.address) {
            (Some(l), Some(r)) => l.contains(r.ip) && r.contains(l.ip),
            _ => false,
        }
    }

    pub fn set_loopback(&mut self, node: NodeId, ip: Ipv4Addr) -> Result<()> {
        let owner = self
            .nodes
            .get_mut(node.0)
            .with_context(|| format!("unknown {node}"))?;
        owner.loopback = Some(ip);
        Ok(())
    }

    pub fn set_interface_ip(&mut self, intf: IfId, ip: Ipv4Addr, mask: u8) -> Result<IfChangeFlags> {
        let address = InterfaceAddress::new(ip, mask)?;
        let interface = self.interface_mut(intf)?;
        let mut flags = IfChangeFlags::empty();
        if interface.l2_mode.take().is_some() {
            flags |= IfChangeFlags::L2_MODE;
        }
        if interface.address != Some(address) {
            interface.address = Some(address);
            flags |= IfChangeFlags::IP_ADDR;
        }
        Ok(flags)
    }

    pub fn set_interface_l2_mode(&mut self, intf: IfId, mode: L2Mode) -> Result<IfChangeFlags> {
        let interface = self.interface_mut(intf)?;
        let mut flags = IfChangeFlags::empty();
        if interface.address.take().is_some() {
            flags |= IfChangeFlags::IP_ADDR;
        }
        if interface.l2_mode != Some(mode) {
            interface.l2_mode = Some(mode);
            flags |= IfChangeFlags::L2_MODE;
        }
        Ok(flags)
    }

    pub fn set_interface_up(&mut self, intf: IfId, is_up: bool) -> Result<IfChangeFlags> {
        let interface = self.interface_mut(intf)?;
        if interface.is_up == is_up {
            return Ok(IfChangeFlags::empty());
        }
        interface.is_up = is_up;
        Ok(IfChangeFlags::UP_DOWN)
    }

    pub fn set_link_cost(&mut self, intf: IfId, cost: u32) -> Result<IfChangeFlags> {
        let link = self.interface_mut(intf)?.link;
        let link = &mut self.links[link.0];
        if link.cost == cost {
            return Ok(IfChangeFlags::empty());
        }
        link.cost = cost;
        Ok(IfChangeFlags::METRIC)
    }

    fn interface_mut(&mut self, intf: IfId) -> Result<&mut Interface> {
        self.interfaces
            .get_mut(intf.0)
            .with_context(|| format!("unknown {intf}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_routers() -> (Topology, IfId, IfId) {
        let mut topo = Topology::new("pair");
        let r1 = topo.add_node("R1").expect("add R1");
        let r2 = topo.add_node("R2").expect("add R2");
        topo.add_link(r1, "eth0/0", r2, "eth0/1", 1)
            .expect("add link");
        let a = topo.interface_by_name(r1, "eth0/0").expect("R1 eth0/0");
        let b = topo.interface_by_name(r2, "eth0/1").expect("R2 eth0/1");
        topo.set_interface_ip(a, Ipv4Addr::new(10, 1, 1, 1), 24)
            .expect("ip a");
        topo.set_interface_ip(b, Ipv4Addr::new(10, 1, 1, 2), 24)
            .expect("ip b");
        (topo, a, b)
    }

    #[test]
    fn configured_link_is_l3_bidirectional() {
        let (topo, a, b) = two_routers();
        assert!(topo.is_l3_bidirectional(a));
        assert!(topo.is_l3_bidirectional(b));
        assert_eq!(topo.peer_gateway(a), Some(Ipv4Addr::new(10, 1, 1, 2)));
        assert_eq!(topo.link_cost(b), Some(1));
    }

    #[test]
    fn shutdown_on_either_end_breaks_eligibility() {
        let (mut topo, a, b) = two_routers();
        let flags = topo.set_interface_up(b, false).expect("shutdown");
        assert!(flags.contains(IfChangeFlags::UP_DOWN));
        assert!(!topo.is_l3_bidirectional(a));
        assert!(topo.set_interface_up(b, false).expect("noop").is_empty());
    }

    #[test]
    fn subnet_mismatch_breaks_eligibility() {
        let (mut topo, a, b) = two_routers();
        topo.set_interface_ip(b, Ipv4Addr::new(10, 1, 2, 2), 24)
            .expect("ip b");
        assert!(!topo.is_l3_bidirectional(a));
        assert!(!topo.is_l3_bidirectional(b));
    }

    #[test]
    fn access_mode_clears_ip_and_breaks_eligibility() {
        let (mut topo, a, b) = two_routers();
        let flags = topo
            .set_interface_l2_mode(a, L2Mode::Access)
            .expect("l2 mode");
        assert!(flags.contains(IfChangeFlags::L2_MODE));
        assert!(flags.contains(IfChangeFlags::IP_ADDR));
        assert!(!flags.contains(IfChangeFlags::UP_DOWN));
        assert!(!topo.is_l3_bidirectional(b));
        assert_eq!(topo.peer_gateway(b), None);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let (mut topo, _, _) = two_routers();
        assert!(topo.add_node("R1").is_err());
        let r1 = topo.node_by_name("R1").expect("R1");
        let r2 = topo.node_by_name("R2").expect("R2");
        assert!(topo.add_link(r1, "eth0/0", r2, "eth0/9", 1).is_err());
    }

    #[test]
    fn mask_is_applied_per_prefix_length() {
        assert_eq!(
            apply_mask(Ipv4Addr::new(10, 1, 1, 77), 24),
            Ipv4Addr::new(10, 1, 1, 0)
        );
        assert_eq!(
            apply_mask(Ipv4Addr::new(10, 1, 1, 77), 32),
            Ipv4Addr::new(10, 1, 1, 77)
        );
        assert_eq!(apply_mask(Ipv4Addr::new(10, 1, 1, 77), 0), Ipv4Addr::UNSPECIFIED);
        assert!(InterfaceAddress::new(Ipv4Addr::LOCALHOST, 33).is_err());
    }
}
