use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::warn;

use crate::model::topology::L2Mode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    pub name: String,
    pub loopback: Option<Ipv4Addr>,
}

/// Names one interface of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceRef {
    pub node: String,
    pub interface: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    pub target: InterfaceRef,
    pub address: Option<(Ipv4Addr, u8)>,
    pub l2_mode: Option<L2Mode>,
    pub up: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    pub cost: u32,
    pub a: EndpointConfig,
    pub b: EndpointConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyEvent {
    Shutdown(InterfaceRef),
    NoShutdown(InterfaceRef),
    Cost {
        target: InterfaceRef,
        cost: u32,
    },
    Ip {
        target: InterfaceRef,
        ip: Ipv4Addr,
        mask: u8,
    },
    L2Mode {
        target: InterfaceRef,
        mode: L2Mode,
    },
}

impl TopologyEvent {
    pub fn target(&self) -> &InterfaceRef {
        match self {
            TopologyEvent::Shutdown(target) | TopologyEvent::NoShutdown(target) => target,
            TopologyEvent::Cost { target, .. }
            | TopologyEvent::Ip { target, .. }
            | TopologyEvent::L2Mode { target, .. } => target,
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            TopologyEvent::Shutdown(_) => "shutdown",
            TopologyEvent::NoShutdown(_) => "no_shutdown",
            TopologyEvent::Cost { .. } => "cost",
            TopologyEvent::Ip { .. } => "ip",
            TopologyEvent::L2Mode { .. } => "l2_mode",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyConfig {
    pub name: String,
    pub nodes: Vec<NodeConfig>,
    pub links: Vec<LinkConfig>,
    pub events: Vec<TopologyEvent>,
}

#[derive(Debug, Deserialize)]
struct RawNode {
    name: String,
    loopback: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawEndpoint {
    node: String,
    interface: String,
    ip: Option<String>,
    mask: Option<u8>,
    l2_mode: Option<L2Mode>,
    up: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RawLink {
    cost: Option<u32>,
    a: RawEndpoint,
    b: RawEndpoint,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    action: String,
    node: String,
    interface: String,
    cost: Option<u32>,
    ip: Option<String>,
    mask: Option<u8>,
    mode: Option<L2Mode>,
}

#[derive(Debug, Deserialize)]
struct RawTopologyConfig {
    topology: Option<String>,
    #[serde(default)]
    nodes: Vec<RawNode>,
    #[serde(default)]
    links: Vec<RawLink>,
    #[serde(default)]
    events: Vec<RawEvent>,
}

const DEFAULT_MASK: u8 = 24;

pub fn load_topology_config(path: &Path) -> Result<TopologyConfig> {
    let raw_text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    parse_topology_config(&raw_text)
        .with_context(|| format!("invalid topology config {}", path.display()))
}

pub fn parse_topology_config(text: &str) -> Result<TopologyConfig> {
    let raw_cfg: RawTopologyConfig =
        serde_yaml::from_str(text).context("failed to parse topology config yaml")?;

    let nodes = raw_cfg
        .nodes
        .into_iter()
        .map(|node| {
            let loopback = node
                .loopback
                .as_deref()
                .map(parse_ip)
                .transpose()
                .with_context(|| format!("node {}", node.name))?;
            Ok(NodeConfig {
                name: node.name.trim().to_string(),
                loopback,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let links = raw_cfg
        .links
        .into_iter()
        .enumerate()
        .map(|(idx, link)| {
            Ok(LinkConfig {
                cost: link.cost.unwrap_or(1),
                a: parse_endpoint(link.a).with_context(|| format!("link {idx} end a"))?,
                b: parse_endpoint(link.b).with_context(|| format!("link {idx} end b"))?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let events = raw_cfg
        .events
        .into_iter()
        .enumerate()
        .map(|(idx, event)| parse_event(event).with_context(|| format!("event {idx}")))
        .collect::<Result<Vec<_>>>()?;

    Ok(TopologyConfig {
        name: raw_cfg
            .topology
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "topology".to_string()),
        nodes,
        links,
        events,
    })
}

fn parse_endpoint(raw: RawEndpoint) -> Result<EndpointConfig> {
    let target = interface_ref(raw.node, raw.interface);
    let mut address = raw
        .ip
        .as_deref()
        .map(|ip| parse_ip(ip).map(|ip| (ip, raw.mask.unwrap_or(DEFAULT_MASK))))
        .transpose()?;
    if let Some((_, mask)) = address {
        if mask > 32 {
            bail!("mask /{mask} out of range on {}/{}", target.node, target.interface);
        }
    }
    if raw.l2_mode.is_some() && address.is_some() {
        warn!(
            "interface {}/{} has both ip and l2_mode, ip ignored",
            target.node, target.interface
        );
        address = None;
    }
    Ok(EndpointConfig {
        target,
        address,
        l2_mode: raw.l2_mode,
        up: raw.up.unwrap_or(true),
    })
}

fn parse_event(raw: RawEvent) -> Result<TopologyEvent> {
    let action = raw.action.trim().to_lowercase();
    let target = interface_ref(raw.node, raw.interface);
    let event = match action.as_str() {
        "shutdown" => TopologyEvent::Shutdown(target),
        "no_shutdown" => TopologyEvent::NoShutdown(target),
        "cost" => TopologyEvent::Cost {
            target,
            cost: raw.cost.context("cost event requires `cost`")?,
        },
        "ip" => {
            let ip = raw.ip.as_deref().context("ip event requires `ip`")?;
            let mask = raw.mask.unwrap_or(DEFAULT_MASK);
            if mask > 32 {
                bail!("mask /{mask} out of range");
            }
            TopologyEvent::Ip {
                target,
                ip: parse_ip(ip)?,
                mask,
            }
        }
        "l2_mode" => TopologyEvent::L2Mode {
            target,
            mode: raw.mode.context("l2_mode event requires `mode`")?,
        },
        other => bail!("unknown event action: {other}"),
    };
    Ok(event)
}

fn interface_ref(node: String, interface: String) -> InterfaceRef {
    InterfaceRef {
        node: node.trim().to_string(),
        interface: interface.trim().to_string(),
    }
}

fn parse_ip(text: &str) -> Result<Ipv4Addr> {
    text.trim()
        .parse::<Ipv4Addr>()
        .with_context(|| format!("invalid IPv4 address: {text}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
topology: lab
nodes:
  - { name: R1, loopback: 122.1.1.1 }
  - { name: R2, loopback: 122.1.1.2 }
  - { name: R3 }
links:
  - cost: 5
    a: { node: R1, interface: eth0/0, ip: 10.1.1.1 }
    b: { node: R2, interface: eth0/1, ip: 10.1.1.2, mask: 24 }
  - a: { node: R2, interface: eth0/2, ip: 10.2.2.1, mask: 30, up: false }
    b: { node: R3, interface: eth0/3, l2_mode: trunk }
events:
  - { action: shutdown, node: R1, interface: eth0/0 }
  - { action: cost, node: R1, interface: eth0/0, cost: 10 }
  - { action: ip, node: R3, interface: eth0/3, ip: 10.2.2.2, mask: 30 }
  - { action: l2_mode, node: R2, interface: eth0/1, mode: access }
  - { action: no_shutdown, node: R1, interface: eth0/0 }
"#;

    #[test]
    fn parses_sample_with_defaults() {
        let cfg = parse_topology_config(SAMPLE).expect("parse sample");
        assert_eq!(cfg.name, "lab");
        assert_eq!(cfg.nodes.len(), 3);
        assert_eq!(cfg.nodes[0].loopback, Some(Ipv4Addr::new(122, 1, 1, 1)));
        assert_eq!(cfg.nodes[2].loopback, None);

        let first = &cfg.links[0];
        assert_eq!(first.cost, 5);
        assert_eq!(first.a.address, Some((Ipv4Addr::new(10, 1, 1, 1), 24)));
        assert!(first.a.up);

        let second = &cfg.links[1];
        assert_eq!(second.cost, 1);
        assert!(!second.a.up);
        assert_eq!(second.a.address, Some((Ipv4Addr::new(10, 2, 2, 1), 30)));
        assert_eq!(second.b.l2_mode, Some(L2Mode::Trunk));
        assert_eq!(second.b.address, None);

        let actions: Vec<_> = cfg.events.iter().map(TopologyEvent::action).collect();
        assert_eq!(actions, ["shutdown", "cost", "ip", "l2_mode", "no_shutdown"]);
        assert_eq!(
            cfg.events[1],
            TopologyEvent::Cost {
                target: InterfaceRef {
                    node: "R1".to_string(),
                    interface: "eth0/0".to_string(),
                },
                cost: 10,
            }
        );
    }

    #[test]
    fn empty_document_fields_default() {
        let cfg = parse_topology_config("nodes: []\n").expect("parse");
        assert_eq!(cfg.name, "topology");
        assert!(cfg.links.is_empty());
        assert!(cfg.events.is_empty());
    }

    #[test]
    fn l2_mode_wins_over_ip() {
        let cfg = parse_topology_config(
            r#"
links:
  - a: { node: R1, interface: e0, ip: 10.0.0.1, l2_mode: access }
    b: { node: R2, interface: e1, ip: 10.0.0.2 }
"#,
        )
        .expect("parse");
        assert_eq!(cfg.links[0].a.address, None);
        assert_eq!(cfg.links[0].a.l2_mode, Some(L2Mode::Access));
    }

    #[test]
    fn rejects_invalid_input() {
        let bad_ip = parse_topology_config("nodes:\n  - { name: R1, loopback: 300.1.1.1 }\n")
            .expect_err("bad loopback");
        assert!(format!("{bad_ip:#}").contains("invalid IPv4 address"));

        let unknown = parse_topology_config(
            "events:\n  - { action: reboot, node: R1, interface: e0 }\n",
        )
        .expect_err("unknown action");
        assert!(format!("{unknown:#}").contains("unknown event action: reboot"));

        let missing = parse_topology_config(
            "events:\n  - { action: cost, node: R1, interface: e0 }\n",
        )
        .expect_err("missing cost");
        assert!(format!("{missing:#}").contains("requires `cost`"));

        let mask = parse_topology_config(
            "links:\n  - a: { node: R1, interface: e0, ip: 10.0.0.1, mask: 33 }\n    b: { node: R2, interface: e1 }\n",
        )
        .expect_err("mask range");
        assert!(format!("{mask:#}").contains("out of range"));
    }
}
