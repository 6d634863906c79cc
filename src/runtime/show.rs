use std::fmt::Write;

use crate::model::routing::RouteKind;
use crate::runtime::network::NodeSnapshot;

/// Per-destination SPF results of one root, one line per nexthop.
pub fn render_spf_results(snapshot: &NodeSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "SPF results for {}", snapshot.node);
    if snapshot.spf_results.is_empty() {
        let _ = writeln!(out, "  (no reachable destinations)");
        return out;
    }
    let _ = writeln!(
        out,
        "  {:<10} {:>8}  {:<10} {:<14} {:<16} {:>5}",
        "dest", "metric", "nexthop", "oif", "gateway", "refs"
    );
    for result in &snapshot.spf_results {
        let mut first = true;
        for nexthop in &result.nexthops {
            let (dest, metric) = if first {
                (result.destination.as_str(), result.metric.to_string())
            } else {
                ("", String::new())
            };
            first = false;
            let _ = writeln!(
                out,
                "  {:<10} {:>8}  {:<10} {:<14} {:<16} {:>5}",
                dest,
                metric,
                nexthop.node,
                nexthop.oif,
                nexthop.gateway.to_string(),
                nexthop.ref_count
            );
        }
    }
    out
}

pub fn render_routing_table(snapshot: &NodeSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Routing table of {}", snapshot.node);
    for route in &snapshot.routes {
        let prefix = format!("{}/{}", route.destination, route.mask);
        let gateway = route
            .gateway
            .map_or_else(|| "-".to_string(), |gw| gw.to_string());
        let kind = match route.kind {
            RouteKind::Direct => "direct",
            RouteKind::Spf => "spf",
        };
        let _ = writeln!(
            out,
            "  {:<18} {:<16} {:<10} {:>8}  {}",
            prefix,
            gateway,
            route.oif.as_deref().unwrap_or("-"),
            route.metric,
            kind
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::model::routing::Route;
    use crate::runtime::network::{NexthopView, SpfResultView};

    fn sample() -> NodeSnapshot {
        NodeSnapshot {
            node: "A".to_string(),
            loopback: Some(Ipv4Addr::new(122, 1, 1, 1)),
            spf_results: vec![SpfResultView {
                destination: "D".to_string(),
                metric: 2,
                nexthops: vec![
                    NexthopView {
                        node: "B".to_string(),
                        oif: "A/eth0".to_string(),
                        gateway: Ipv4Addr::new(10, 0, 0, 2),
                        ref_count: 3,
                    },
                    NexthopView {
                        node: "C".to_string(),
                        oif: "A/eth1".to_string(),
                        gateway: Ipv4Addr::new(10, 0, 0, 6),
                        ref_count: 3,
                    },
                ],
            }],
            routes: vec![
                Route::new_direct(Ipv4Addr::new(122, 1, 1, 1), 32),
                Route::new_host(Ipv4Addr::new(122, 1, 1, 4), Ipv4Addr::new(10, 0, 0, 2), "eth0", 2),
            ],
        }
    }

    #[test]
    fn spf_results_list_every_nexthop() {
        let text = render_spf_results(&sample());
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[2].contains("D") && lines[2].contains("10.0.0.2"));
        assert!(lines[3].contains("A/eth1") && !lines[3].contains(" D "));
    }

    #[test]
    fn empty_results_are_noted() {
        let mut snapshot = sample();
        snapshot.spf_results.clear();
        assert!(render_spf_results(&snapshot).contains("no reachable destinations"));
    }

    #[test]
    fn routing_table_marks_route_kind() {
        let text = render_routing_table(&sample());
        assert!(text.contains("122.1.1.1/32"));
        assert!(text.lines().nth(1).is_some_and(|line| line.ends_with("direct")));
        assert!(text.lines().nth(2).is_some_and(|line| line.ends_with("spf")));
    }
}
