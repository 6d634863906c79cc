use std::net::Ipv4Addr;

use serde::Serialize;

use crate::model::topology::apply_mask;
use crate::protocols::spf::RouteSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteKind {
    Direct,
    Spf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    pub destination: Ipv4Addr,
    pub mask: u8,
    pub gateway: Option<Ipv4Addr>,
    pub oif: Option<String>,
    pub metric: u32,
    pub kind: RouteKind,
}

impl Route {
    pub fn new_direct(address: Ipv4Addr, mask: u8) -> Self {
        Self {
            destination: apply_mask(address, mask),
            mask,
            gateway: None,
            oif: None,
            metric: 0,
            kind: RouteKind::Direct,
        }
    }

    pub fn new_host(destination: Ipv4Addr, gateway: Ipv4Addr, oif: &str, metric: u32) -> Self {
        Self {
            destination,
            mask: 32,
            gateway: Some(gateway),
            oif: Some(oif.to_string()),
            metric,
            kind: RouteKind::Spf,
        }
    }

    pub fn is_direct(&self) -> bool {
        self.kind == RouteKind::Direct
    }
}

/// A router's L3 routing table. Entries are kept in insertion order and the
/// same destination may appear once per equal-cost nexthop.
#[derive(Debug, Default, Clone)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn add_direct_route(&mut self, address: Ipv4Addr, mask: u8) -> bool {
        let route = Route::new_direct(address, mask);
        if self.routes.contains(&route) {
            return false;
        }
        self.routes.push(route);
        true
    }

    pub fn remove_direct_route(&mut self, address: Ipv4Addr, mask: u8) -> bool {
        let route = Route::new_direct(address, mask);
        let before = self.routes.len();
        self.routes.retain(|existing| existing != &route);
        before != self.routes.len()
    }

    pub fn lookup(&self, destination: Ipv4Addr) -> Vec<&Route> {
        self.routes
            .iter()
            .filter(|route| route.destination == destination)
            .collect()
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl RouteSink for RouteTable {
    fn clear_non_direct_routes(&mut self) {
        self.routes.retain(Route::is_direct);
    }

    fn add_route(&mut self, route: Route) {
        self.routes.push(route);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_keeps_direct_routes() {
        let mut table = RouteTable::default();
        assert!(table.add_direct_route(Ipv4Addr::new(122, 1, 1, 1), 32));
        assert!(table.add_direct_route(Ipv4Addr::new(10, 1, 1, 1), 24));
        assert!(!table.add_direct_route(Ipv4Addr::new(10, 1, 1, 9), 24));
        table.add_route(Route::new_host(
            Ipv4Addr::new(122, 1, 1, 2),
            Ipv4Addr::new(10, 1, 1, 2),
            "eth0/0",
            1,
        ));
        assert_eq!(table.len(), 3);

        table.clear_non_direct_routes();
        assert_eq!(table.len(), 2);
        assert!(table.routes().iter().all(Route::is_direct));
        assert_eq!(
            table.lookup(Ipv4Addr::new(10, 1, 1, 0))[0].destination,
            Ipv4Addr::new(10, 1, 1, 0)
        );
    }

    #[test]
    fn ecmp_routes_share_destination() {
        let mut table = RouteTable::default();
        let dst = Ipv4Addr::new(122, 1, 1, 3);
        table.add_route(Route::new_host(dst, Ipv4Addr::new(10, 1, 1, 2), "eth0/0", 6));
        table.add_route(Route::new_host(dst, Ipv4Addr::new(10, 1, 2, 2), "eth0/1", 6));

        let hits = table.lookup(dst);
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|route| route.metric == 6 && route.mask == 32));
    }
}
