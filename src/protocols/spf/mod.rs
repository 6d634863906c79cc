//! Shortest-path-first route computation with ECMP nexthop sets.

mod engine;
mod frontier;
mod nexthop;
mod traits;
mod types;

pub use engine::{SpfEngine, SpfRunSummary};
pub use frontier::RunQueue;
pub use nexthop::{Nexthop, NexthopId, NexthopPool, NexthopSet, MAX_NXT_HOPS};
pub use traits::{Adjacency, RouteSink, SpfTopology};
pub use types::{SpfData, SpfResult, SpfResultTable, INFINITE_METRIC};
