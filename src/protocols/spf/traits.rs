use std::net::Ipv4Addr;

use crate::model::routing::Route;
use crate::model::topology::{IfId, NodeId, Topology};

/// One way out of a node: the neighbor reached, the local egress interface
/// and the neighbor's address on that link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Adjacency {
    pub neighbor: NodeId,
    pub oif: IfId,
    pub gateway: Option<Ipv4Addr>,
}

/// Read-only view of the graph an SPF run walks.
pub trait SpfTopology {
    fn spf_nodes(&self) -> Vec<NodeId>;
    fn adjacencies(&self, node: NodeId) -> Vec<Adjacency>;
    fn link_cost(&self, oif: IfId) -> u32;
    fn is_l3_eligible(&self, oif: IfId) -> bool;
    fn router_address(&self, node: NodeId) -> Option<Ipv4Addr>;
    fn node_label(&self, node: NodeId) -> String;
    fn interface_label(&self, oif: IfId) -> String;
}

/// Where the installer writes routes for one root.
pub trait RouteSink {
    fn clear_non_direct_routes(&mut self);
    fn add_route(&mut self, route: Route);
}

impl SpfTopology for Topology {
    fn spf_nodes(&self) -> Vec<NodeId> {
        self.node_ids().collect()
    }

    fn adjacencies(&self, node: NodeId) -> Vec<Adjacency> {
        self.neighbors(node)
            .into_iter()
            .map(|(neighbor, oif)| Adjacency {
                neighbor,
                oif,
                gateway: self.peer_gateway(oif),
            })
            .collect()
    }

    fn link_cost(&self, oif: IfId) -> u32 {
        Topology::link_cost(self, oif).unwrap_or(u32::MAX)
    }

    fn is_l3_eligible(&self, oif: IfId) -> bool {
        self.is_l3_bidirectional(oif)
    }

    fn router_address(&self, node: NodeId) -> Option<Ipv4Addr> {
        self.node(node).and_then(|node| node.loopback)
    }

    fn node_label(&self, node: NodeId) -> String {
        self.node(node)
            .map_or_else(|| node.to_string(), |node| node.name.clone())
    }

    fn interface_label(&self, oif: IfId) -> String {
        self.interface(oif)
            .map_or_else(|| oif.to_string(), |intf| intf.name.clone())
    }
}
