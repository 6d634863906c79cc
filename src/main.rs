use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use l3spf::model::topology::NodeId;
use l3spf::runtime::config::load_topology_config;
use l3spf::runtime::network::{Network, NodeSnapshot};
use l3spf::runtime::show::{render_routing_table, render_spf_results};
use serde_json::json;
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "spfd")]
#[command(about = "Compute SPF routing tables with ECMP for a static topology")]
struct Args {
    #[arg(long)]
    config: PathBuf,
    /// Only print results for this router.
    #[arg(long)]
    root: Option<String>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
    #[arg(long, default_value = "INFO")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    let cfg = load_topology_config(&args.config)?;
    let mut network = Network::from_config(&cfg)?;
    let root = args
        .root
        .as_deref()
        .map(|name| {
            network
                .topology()
                .node_by_name(name)
                .with_context(|| format!("--root names unknown node {name}"))
        })
        .transpose()?;

    network.init_spf();
    report(&network, root, args.format, "init")?;

    for event in &cfg.events {
        network.apply_event(event)?;
        let target = event.target();
        let stage = format!("{} {}/{}", event.action(), target.node, target.interface);
        report(&network, root, args.format, &stage)?;
    }
    Ok(())
}

fn report(network: &Network, root: Option<NodeId>, format: OutputFormat, stage: &str) -> Result<()> {
    let snapshots: Vec<NodeSnapshot> = match root {
        Some(node) => network.snapshot(node).into_iter().collect(),
        None => network.snapshots(),
    };
    match format {
        OutputFormat::Text => {
            println!("=== {stage} ===");
            for snapshot in &snapshots {
                print!("{}", render_spf_results(snapshot));
                print!("{}", render_routing_table(snapshot));
                println!();
            }
        }
        OutputFormat::Json => {
            let payload = json!({
                "topology": network.topology().name(),
                "stage": stage,
                "nodes": snapshots,
            });
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
    }
    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let level = level.parse::<Level>()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact()
        .init();
    Ok(())
}
