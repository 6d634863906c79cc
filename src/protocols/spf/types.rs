use crate::model::topology::NodeId;

use super::nexthop::NexthopSet;

pub const INFINITE_METRIC: u32 = u32::MAX;

#[derive(Debug)]
pub struct SpfData {
    pub node: NodeId,
    pub metric: u32,
    pub queued_at: Option<u32>,
    pub nexthops: NexthopSet,
}

impl SpfData {
    pub fn new(node: NodeId) -> Self {
        Self {
            node,
            metric: INFINITE_METRIC,
            queued_at: None,
            nexthops: NexthopSet::default(),
        }
    }
}

#[derive(Debug)]
pub struct SpfResult {
    pub node: NodeId,
    pub metric: u32,
    pub nexthops: NexthopSet,
}

#[derive(Debug, Default)]
pub struct SpfResultTable {
    entries: Vec<SpfResult>,
}

impl SpfResultTable {
    pub fn lookup(&self, node: NodeId) -> Option<&SpfResult> {
        self.entries.iter().find(|entry| entry.node == node)
    }

    pub fn entries(&self) -> &[SpfResult] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn record(&mut self, result: SpfResult) {
        assert!(
            self.lookup(result.node).is_none(),
            "{} finalized twice in one SPF run",
            result.node
        );
        self.entries.push(result);
    }

    pub(crate) fn drain(&mut self) -> std::vec::Drain<'_, SpfResult> {
        self.entries.drain(..)
    }
}
