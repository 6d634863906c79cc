use std::collections::BTreeSet;

use crate::model::topology::NodeId;

use super::types::SpfData;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct QueueEntry {
    metric: u32,
    node: NodeId,
}

/// A node's `queued_at` field mirrors its entry here. Order among equal
/// metrics is unspecified.
#[derive(Debug, Default)]
pub struct RunQueue {
    entries: BTreeSet<QueueEntry>,
}

impl RunQueue {
    pub fn new() -> Self {
        Self {
            entries: BTreeSet::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn push(&mut self, data: &mut SpfData) {
        self.remove(data);
        self.entries.insert(QueueEntry {
            metric: data.metric,
            node: data.node,
        });
        data.queued_at = Some(data.metric);
    }

    pub fn remove(&mut self, data: &mut SpfData) -> bool {
        let Some(metric) = data.queued_at.take() else {
            return false;
        };
        self.entries.remove(&QueueEntry {
            metric,
            node: data.node,
        })
    }

    /// Unlinks and returns the lowest-metric node. The caller clears the
    /// node's `queued_at` marker.
    pub fn pop_min(&mut self) -> Option<NodeId> {
        self.entries.pop_first().map(|entry| entry.node)
    }
}
