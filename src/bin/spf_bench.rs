use std::fs;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use l3spf::model::topology::Topology;
use l3spf::runtime::config::load_topology_config;
use l3spf::runtime::network::Network;
use serde_json::{json, Value};

#[derive(Debug, Parser)]
#[command(name = "spf_bench")]
#[command(about = "Benchmark full-topology SPF runs with ECMP")]
struct Args {
    #[arg(long, default_value_t = 100)]
    nodes: usize,
    #[arg(long, default_value_t = 0.04)]
    density: f64,
    #[arg(long, default_value_t = 4)]
    max_cost: u32,
    #[arg(long, default_value_t = 3)]
    seeds: usize,
    #[arg(long, default_value_t = 1)]
    start_seed: u64,
    #[arg(long, default_value_t = 5)]
    iterations: usize,
    /// Benchmark a YAML topology instead of generated ones.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    output_json: Option<PathBuf>,
}

#[derive(Debug, Clone)]
struct LcgRng {
    state: u64,
}

impl LcgRng {
    fn new(seed: u64) -> Self {
        Self { state: seed.max(1) }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1);
        self.state
    }

    fn next_f64(&mut self) -> f64 {
        let raw = self.next_u64() >> 11;
        (raw as f64) / ((1_u64 << 53) as f64)
    }

    fn cost(&mut self, max_cost: u32) -> u32 {
        1 + ((self.next_u64() >> 33) % u64::from(max_cost.max(1))) as u32
    }
}

fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let rank = (q.clamp(0.0, 1.0) * (n - 1) as f64).round() as usize;
    sorted[rank]
}

/// Ring of `nodes` routers plus random chords, every link a /30 with both ends up.
fn generate_topology(seed: u64, nodes: usize, density: f64, max_cost: u32) -> anyhow::Result<Topology> {
    let mut rng = LcgRng::new(seed);
    let mut topo = Topology::new(format!("ring-{nodes}-seed-{seed}"));
    let mut ids = Vec::with_capacity(nodes);
    for idx in 0..nodes {
        let id = topo.add_node(&format!("R{idx}"))?;
        let loopback = Ipv4Addr::from(u32::from(Ipv4Addr::new(122, 0, 0, 0)) + idx as u32 + 1);
        topo.set_loopback(id, loopback)?;
        ids.push(id);
    }

    let mut subnet = u32::from(Ipv4Addr::new(10, 0, 0, 0));
    let mut connect = |topo: &mut Topology, a: usize, b: usize, cost: u32| -> anyhow::Result<()> {
        let if_a = format!("eth{}", topo.node(ids[a]).map_or(0, |n| n.interfaces.len()));
        let if_b = format!("eth{}", topo.node(ids[b]).map_or(0, |n| n.interfaces.len()));
        topo.add_link(ids[a], &if_a, ids[b], &if_b, cost)?;
        let end_a = topo.interface_by_name(ids[a], &if_a).context("new link end a")?;
        let end_b = topo.interface_by_name(ids[b], &if_b).context("new link end b")?;
        topo.set_interface_ip(end_a, Ipv4Addr::from(subnet + 1), 30)?;
        topo.set_interface_ip(end_b, Ipv4Addr::from(subnet + 2), 30)?;
        subnet += 4;
        Ok(())
    };

    if nodes >= 2 {
        for idx in 0..nodes {
            let next = (idx + 1) % nodes;
            if nodes == 2 && idx == 1 {
                break;
            }
            let cost = rng.cost(max_cost);
            connect(&mut topo, idx, next, cost)?;
        }
    }

    let p = density.clamp(0.0, 1.0);
    for a in 0..nodes {
        for b in (a + 2)..nodes {
            if rng.next_f64() < p {
                let cost = rng.cost(max_cost);
                connect(&mut topo, a, b, cost)?;
            }
        }
    }
    Ok(topo)
}

fn bench_network(mut network: Network, iterations: usize) -> Value {
    let mut samples = Vec::with_capacity(iterations.max(1));
    let mut summaries = Vec::new();
    for _ in 0..iterations.max(1) {
        let start = Instant::now();
        summaries = network.compute_spf_all();
        samples.push(start.elapsed().as_secs_f64() * 1000.0);
    }
    samples.sort_by(|a, b| a.total_cmp(b));

    let finalized: usize = summaries.iter().map(|s| s.finalized).sum();
    let routes: usize = summaries.iter().map(|s| s.routes_installed).sum();
    let topology = network.topology();
    let roots = topology.node_count();
    let possible = roots * roots.saturating_sub(1);

    json!({
        "topology": topology.name(),
        "nodes": roots,
        "runtime_ms_mean": samples.iter().sum::<f64>() / samples.len() as f64,
        "runtime_ms_p50": percentile(&samples, 0.5),
        "runtime_ms_p95": percentile(&samples, 0.95),
        "reachable_ratio": if possible == 0 { 1.0 } else { finalized as f64 / possible as f64 },
        "mean_next_hops": if finalized == 0 { 0.0 } else { routes as f64 / finalized as f64 },
        "routes_installed": routes,
        "live_nexthops": network.engine().pool().live_count(),
    })
}

fn aggregate(rows: &[Value]) -> Value {
    let mut means: Vec<f64> = rows
        .iter()
        .filter_map(|row| row.get("runtime_ms_mean").and_then(Value::as_f64))
        .collect();
    means.sort_by(|a, b| a.total_cmp(b));
    json!({
        "runs": rows.len(),
        "runtime_ms_p50": percentile(&means, 0.5),
        "runtime_ms_max": means.last().copied().unwrap_or(f64::NAN),
    })
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut rows = Vec::new();
    if let Some(path) = &args.config {
        let cfg = load_topology_config(path)?;
        rows.push(bench_network(Network::from_config(&cfg)?, args.iterations));
    } else {
        for offset in 0..args.seeds.max(1) {
            let seed = args.start_seed + offset as u64;
            let topo = generate_topology(seed, args.nodes, args.density, args.max_cost)?;
            let mut row = bench_network(Network::new(topo), args.iterations);
            if let Some(map) = row.as_object_mut() {
                map.insert("seed".to_string(), json!(seed));
            }
            rows.push(row);
        }
    }

    println!("topology\tnodes\truntime_ms_mean\tp95_ms\tmean_next_hops");
    for row in &rows {
        println!(
            "{}\t{}\t{:.3}\t{:.3}\t{:.2}",
            row["topology"].as_str().unwrap_or("-"),
            row["nodes"],
            row["runtime_ms_mean"].as_f64().unwrap_or(f64::NAN),
            row["runtime_ms_p95"].as_f64().unwrap_or(f64::NAN),
            row["mean_next_hops"].as_f64().unwrap_or(0.0),
        );
    }

    let payload = json!({
        "config": {
            "nodes": args.nodes,
            "density": args.density,
            "max_cost": args.max_cost,
            "seeds": args.seeds,
            "start_seed": args.start_seed,
            "iterations": args.iterations,
            "config": args.config,
        },
        "runs": rows,
        "aggregate": aggregate(&rows),
    });

    if let Some(path) = args.output_json {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_vec_pretty(&payload)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&payload)?);
    }

    Ok(())
}
