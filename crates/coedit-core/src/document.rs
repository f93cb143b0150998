//! The per-project sequence CRDT.
//!
//! Every node's `parent` defines a tree rooted at the document-start
//! sentinel. Siblings (nodes sharing a parent) are ordered by descending
//! priority: higher Lamport clock first, lower origin participant id on
//! ties. The stored flat sequence is the pre-order traversal of that tree
//! under this sibling order, so a node is immediately followed by its whole
//! subtree before the next sibling appears.
//!
//! Because placement depends only on `(parent, priority)`, both fixed at
//! node creation, merging the same set of concurrent operations in any
//! arrival order yields the same sequence at every replica.

use crate::{CoeditError, Result};
use coedit_types::{CharNode, NodeId, ParticipantId, Priority};
use std::collections::HashSet;

/// Ordered sequence of character nodes: the materialized linearization of
/// the parent/priority tree. Owned exclusively by its session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    nodes: Vec<CharNode>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a document from flat text at session bootstrap: each character
    /// is chained to the previous one, with clock 0 and the origin id
    /// reserved for bootstrap content.
    pub fn from_text(text: &str) -> Self {
        let mut nodes = Vec::new();
        let mut parent = None;
        for (i, value) in text.chars().enumerate() {
            let id = NodeId { site: ParticipantId::BOOTSTRAP, counter: i as u64 + 1 };
            nodes.push(CharNode {
                id,
                parent,
                priority: Priority { clock: 0, site: ParticipantId::BOOTSTRAP },
                value,
                deleted: false,
            });
            parent = Some(id);
        }
        Self { nodes }
    }

    /// The full node sequence, tombstones included.
    pub fn nodes(&self) -> &[CharNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Integrates a run of new nodes sharing one intended parent.
    ///
    /// The run's first node names the parent; each subsequent node must be
    /// parented on its predecessor, so the run is a chain that splices in as
    /// one contiguous block. Placement follows the sibling rule: skip the
    /// entire subtree of every existing sibling whose priority beats the run
    /// head's, then insert before the first sibling the head beats (or at
    /// the end of the sibling zone).
    ///
    /// Returns the highest Lamport clock carried by the run so the session
    /// can advance its own clock. Fails with `CausalDependencyMissing` when
    /// the named parent is nowhere in the sequence (the transport contract
    /// makes this unreachable for well-behaved clients) and with
    /// `ProtocolViolation` for runs that are empty, unchained, or reuse an
    /// existing node id.
    pub fn integrate_insert(&mut self, run: &[CharNode]) -> Result<u64> {
        let head = run
            .first()
            .ok_or_else(|| CoeditError::ProtocolViolation("empty insert run".into()))?;
        for pair in run.windows(2) {
            if pair[1].parent != Some(pair[0].id) {
                return Err(CoeditError::ProtocolViolation(format!(
                    "insert run is not a chain at node {}",
                    pair[1].id
                )));
            }
        }
        let mut run_ids = HashSet::with_capacity(run.len());
        for node in run {
            if self.position_of(&node.id).is_some() || !run_ids.insert(node.id) {
                return Err(CoeditError::ProtocolViolation(format!(
                    "duplicate node id {}",
                    node.id
                )));
            }
        }

        let scan_start = match head.parent {
            None => 0,
            Some(parent) => {
                self.position_of(&parent)
                    .ok_or(CoeditError::CausalDependencyMissing(parent))?
                    + 1
            }
        };

        // Walk the parent's sibling zone. Anything that is not a direct
        // sibling here is either the end of the parent's subtree or a node
        // past it, and in both cases the run belongs before it.
        let mut pos = scan_start;
        let mut i = scan_start;
        while i < self.nodes.len() {
            let node = &self.nodes[i];
            if node.parent != head.parent {
                break;
            }
            if node.priority.beats(&head.priority) {
                i = self.subtree_end(i);
                pos = i;
            } else {
                break;
            }
        }

        self.nodes.splice(pos..pos, run.iter().cloned());
        Ok(run.iter().map(|n| n.priority.clock).max().unwrap_or(0))
    }

    /// Tombstones every listed node. Ids that are absent or already deleted
    /// are silently skipped, making deletion idempotent. Nodes are never
    /// physically removed, so later causal references stay resolvable.
    pub fn apply_delete(&mut self, ids: &[NodeId]) {
        let pending: HashSet<&NodeId> = ids.iter().collect();
        for node in &mut self.nodes {
            if pending.contains(&node.id) {
                node.deleted = true;
            }
        }
    }

    /// The visible text: tombstone-filtered concatenation in sequence order.
    pub fn materialize(&self) -> String {
        self.nodes.iter().filter(|n| !n.deleted).map(|n| n.value).collect()
    }

    fn position_of(&self, id: &NodeId) -> Option<usize> {
        self.nodes.iter().position(|n| n.id == *id)
    }

    /// Index one past the subtree rooted at `root`: scans forward while each
    /// node's parent is already a member of the subtree.
    fn subtree_end(&self, root: usize) -> usize {
        let mut members = HashSet::new();
        members.insert(self.nodes[root].id);
        let mut i = root + 1;
        while i < self.nodes.len() {
            match self.nodes[i].parent {
                Some(parent) if members.contains(&parent) => {
                    members.insert(self.nodes[i].id);
                    i += 1;
                }
                _ => break,
            }
        }
        i
    }
}
