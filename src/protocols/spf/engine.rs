use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info};

use crate::model::routing::Route;
use crate::model::topology::{IfChangeFlags, NodeId};

use super::frontier::RunQueue;
use super::nexthop::{Nexthop, NexthopId, NexthopPool, NexthopSet};
use super::traits::{Adjacency, RouteSink, SpfTopology};
use super::types::{SpfData, SpfResult, SpfResultTable, INFINITE_METRIC};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SpfRunSummary {
    pub root: NodeId,
    pub finalized: usize,
    pub routes_installed: usize,
}

/// Shortest-path-first computation with ECMP nexthop sets.
///
/// Per-node scratch state is shared by every root and reset at the start of
/// each run; taking `&mut self` keeps runs strictly one at a time. Result
/// tables are kept per root and stay untouched until that root runs again.
#[derive(Debug, Default)]
pub struct SpfEngine {
    pool: NexthopPool,
    scratch: Vec<Option<SpfData>>,
    results: BTreeMap<NodeId, SpfResultTable>,
}

impl SpfEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(&self, root: NodeId) -> Option<&SpfResultTable> {
        self.results.get(&root)
    }

    pub fn nexthop(&self, id: NexthopId) -> Option<&Nexthop> {
        self.pool.get(id)
    }

    pub fn nexthop_ref_count(&self, id: NexthopId) -> Option<u32> {
        self.pool.ref_count(id)
    }

    pub fn pool(&self) -> &NexthopPool {
        &self.pool
    }

    /// Interface transitions that invalidate every router's tree.
    pub fn interface_update_requires_run(flags: IfChangeFlags) -> bool {
        flags.contains(IfChangeFlags::UP_DOWN)
    }

    pub fn compute_spf<T, S>(&mut self, topo: &T, sink: &mut S, root: NodeId) -> SpfRunSummary
    where
        T: SpfTopology + ?Sized,
        S: RouteSink + ?Sized,
    {
        let root_label = topo.node_label(root);
        debug!("spf root={root_label}: run start");

        self.reset_node(root, true);
        self.results.entry(root).or_default();
        scratch_entry(&mut self.scratch, root).metric = 0;
        for node in topo.spf_nodes() {
            if node != root {
                self.reset_node(node, false);
            }
        }

        self.seed_neighbors(topo, root);
        self.relax(topo, root);
        self.release_working_sets();

        let finalized = self.results.get(&root).map_or(0, SpfResultTable::len);
        let routes_installed = self.install_routes(topo, sink, root);
        info!(
            "spf root={root_label}: finalized={finalized} routes_installed={routes_installed}"
        );

        SpfRunSummary {
            root,
            finalized,
            routes_installed,
        }
    }

    pub fn compute_spf_all<T, S>(
        &mut self,
        topo: &T,
        sinks: &mut BTreeMap<NodeId, S>,
    ) -> Vec<SpfRunSummary>
    where
        T: SpfTopology + ?Sized,
        S: RouteSink + Default,
    {
        topo.spf_nodes()
            .into_iter()
            .map(|root| {
                let sink = sinks.entry(root).or_default();
                self.compute_spf(topo, sink, root)
            })
            .collect()
    }

    /// Replaces every SPF route in `sink` with one host route per
    /// (result, nexthop) of `root`'s current table.
    pub fn install_routes<T, S>(&self, topo: &T, sink: &mut S, root: NodeId) -> usize
    where
        T: SpfTopology + ?Sized,
        S: RouteSink + ?Sized,
    {
        sink.clear_non_direct_routes();
        let Some(table) = self.results.get(&root) else {
            return 0;
        };

        let mut count = 0;
        for result in table.entries() {
            let Some(destination) = topo.router_address(result.node) else {
                debug!(
                    "spf root={}: no router address on {}, route skipped",
                    topo.node_label(root),
                    topo.node_label(result.node)
                );
                continue;
            };
            for id in result.nexthops.iter() {
                let Some(nexthop) = self.pool.get(id) else {
                    continue;
                };
                sink.add_route(Route::new_host(
                    destination,
                    nexthop.gateway,
                    &topo.interface_label(nexthop.oif),
                    result.metric,
                ));
                count += 1;
            }
        }
        count
    }

    fn reset_node(&mut self, node: NodeId, clear_results: bool) {
        if clear_results {
            if let Some(table) = self.results.get_mut(&node) {
                for mut result in table.drain() {
                    self.pool.flush(&mut result.nexthops);
                }
            }
        }
        let data = scratch_entry(&mut self.scratch, node);
        data.metric = INFINITE_METRIC;
        data.queued_at = None;
        self.pool.flush(&mut data.nexthops);
    }

    /// Fails when the far end of the link has no address to forward to.
    fn create_nexthop(&mut self, adj: &Adjacency) -> Option<NexthopId> {
        let gateway = adj.gateway?;
        Some(self.pool.create(adj.oif, gateway))
    }

    fn seed_neighbors<T>(&mut self, topo: &T, root: NodeId)
    where
        T: SpfTopology + ?Sized,
    {
        for adj in topo.adjacencies(root) {
            if adj.neighbor == root || !topo.is_l3_eligible(adj.oif) {
                continue;
            }
            let cost = topo.link_cost(adj.oif);
            if cost >= INFINITE_METRIC
                || cost > scratch_entry(&mut self.scratch, adj.neighbor).metric
            {
                continue;
            }
            let Some(nexthop) = self.create_nexthop(&adj) else {
                debug!(
                    "spf root={}: no gateway behind {}, neighbor {} not seeded",
                    topo.node_label(root),
                    topo.interface_label(adj.oif),
                    topo.node_label(adj.neighbor)
                );
                continue;
            };

            let data = scratch_entry(&mut self.scratch, adj.neighbor);
            if cost < data.metric {
                self.pool.flush(&mut data.nexthops);
                data.metric = cost;
            }
            if !self.pool.insert(&mut data.nexthops, nexthop) {
                self.pool.reclaim(nexthop);
                debug!(
                    "spf root={}: nexthop set of {} full, {} dropped",
                    topo.node_label(root),
                    topo.node_label(adj.neighbor),
                    topo.interface_label(adj.oif)
                );
            }
        }
    }

    fn relax<T>(&mut self, topo: &T, root: NodeId)
    where
        T: SpfTopology + ?Sized,
    {
        let mut queue = RunQueue::new();
        queue.push(scratch_entry(&mut self.scratch, root));

        while let Some(node) = queue.pop_min() {
            scratch_entry(&mut self.scratch, node).queued_at = None;

            if node == root {
                self.enqueue_direct_neighbors(topo, root, &mut queue);
                continue;
            }

            self.finalize(topo, root, node);
            self.explore_neighbors(topo, root, node, &mut queue);

            let data = scratch_entry(&mut self.scratch, node);
            self.pool.flush(&mut data.nexthops);
        }
    }

    fn enqueue_direct_neighbors<T>(&mut self, topo: &T, root: NodeId, queue: &mut RunQueue)
    where
        T: SpfTopology + ?Sized,
    {
        for adj in topo.adjacencies(root) {
            if adj.neighbor == root || !topo.is_l3_eligible(adj.oif) {
                continue;
            }
            let data = scratch_entry(&mut self.scratch, adj.neighbor);
            if data.metric == INFINITE_METRIC {
                continue;
            }
            queue.push(data);
        }
    }

    fn finalize<T>(&mut self, topo: &T, root: NodeId, node: NodeId)
    where
        T: SpfTopology + ?Sized,
    {
        let data = scratch_entry(&mut self.scratch, node);
        let metric = data.metric;
        let mut nexthops = NexthopSet::default();
        self.pool.union_into(&data.nexthops, &mut nexthops);

        debug!(
            "spf root={}: finalized {} metric={} nexthops=[{}]",
            topo.node_label(root),
            topo.node_label(node),
            metric,
            self.describe(topo, &nexthops)
        );
        self.results
            .entry(root)
            .or_default()
            .record(SpfResult {
                node,
                metric,
                nexthops,
            });
    }

    fn explore_neighbors<T>(&mut self, topo: &T, root: NodeId, node: NodeId, queue: &mut RunQueue)
    where
        T: SpfTopology + ?Sized,
    {
        let metric = scratch_entry(&mut self.scratch, node).metric;

        for adj in topo.adjacencies(node) {
            if adj.neighbor == node || !topo.is_l3_eligible(adj.oif) {
                continue;
            }
            let Some(candidate) = metric
                .checked_add(topo.link_cost(adj.oif))
                .filter(|candidate| *candidate < INFINITE_METRIC)
            else {
                continue;
            };

            scratch_entry(&mut self.scratch, adj.neighbor);
            let Some((current, next)) = pair_mut(&mut self.scratch, node, adj.neighbor) else {
                continue;
            };

            if candidate < next.metric {
                self.pool.flush(&mut next.nexthops);
                self.pool.union_into(&current.nexthops, &mut next.nexthops);
                next.metric = candidate;
                queue.push(next);
                debug!(
                    "spf root={}: {} improved to {} via {}",
                    topo.node_label(root),
                    topo.node_label(adj.neighbor),
                    candidate,
                    topo.node_label(node)
                );
            } else if candidate == next.metric {
                // A neighbor finalized earlier keeps its recorded result; the
                // union below only touches its working set.
                let added = self.pool.union_into(&current.nexthops, &mut next.nexthops);
                if added > 0 {
                    debug!(
                        "spf root={}: {} gained {} equal-cost nexthop(s) via {}",
                        topo.node_label(root),
                        topo.node_label(adj.neighbor),
                        added,
                        topo.node_label(node)
                    );
                }
            }
        }
    }

    /// Drops working-set references left on nodes after the queue drained.
    fn release_working_sets(&mut self) {
        for data in self.scratch.iter_mut().flatten() {
            self.pool.flush(&mut data.nexthops);
        }
    }

    fn describe<T>(&self, topo: &T, set: &NexthopSet) -> String
    where
        T: SpfTopology + ?Sized,
    {
        set.iter()
            .filter_map(|id| self.pool.get(id))
            .map(|nexthop| format!("{}@{}", nexthop.gateway, topo.interface_label(nexthop.oif)))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn scratch_entry(scratch: &mut Vec<Option<SpfData>>, node: NodeId) -> &mut SpfData {
    if scratch.len() <= node.0 {
        scratch.resize_with(node.0 + 1, || None);
    }
    scratch[node.0].get_or_insert_with(|| SpfData::new(node))
}

fn pair_mut(
    scratch: &mut [Option<SpfData>],
    src: NodeId,
    dst: NodeId,
) -> Option<(&SpfData, &mut SpfData)> {
    if src.0 < dst.0 {
        let (low, high) = scratch.split_at_mut(dst.0);
        Some((low.get(src.0)?.as_ref()?, high.first_mut()?.as_mut()?))
    } else if src.0 > dst.0 {
        let (low, high) = scratch.split_at_mut(src.0);
        Some((high.first()?.as_ref()?, low.get_mut(dst.0)?.as_mut()?))
    } else {
        None
    }
}
