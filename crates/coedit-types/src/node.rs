//! CRDT data model: character nodes and their ordering keys.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-session identifier for a connected participant.
///
/// Id `0` is reserved for content imported from storage at session bootstrap;
/// live participants are assigned ids starting at `1`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ParticipantId(pub u32);

impl ParticipantId {
    /// Origin id reserved for document content seeded from storage.
    pub const BOOTSTRAP: ParticipantId = ParticipantId(0);
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Globally unique identity of one inserted character within a project.
///
/// Composed of the origin participant and a per-origin monotonically
/// increasing counter. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeId {
    pub site: ParticipantId,
    pub counter: u64,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.site, self.counter)
    }
}

/// Tie-break key for concurrent inserts sharing a parent, fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Priority {
    pub clock: u64,
    pub site: ParticipantId,
}

impl Priority {
    /// Sibling ordering: higher Lamport clock wins; equal clocks fall back to
    /// the lower origin participant id.
    pub fn beats(&self, other: &Priority) -> bool {
        self.clock > other.clock || (self.clock == other.clock && self.site < other.site)
    }
}

/// One inserted character in the shared document.
///
/// `parent = None` is the document-start sentinel. `deleted` is a tombstone
/// flag: it only ever transitions `false -> true`, and tombstoned nodes stay
/// in the sequence so later causal references to their id remain resolvable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharNode {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub priority: Priority,
    pub value: char,
    #[serde(default)]
    pub deleted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_higher_clock_wins() {
        let a = Priority { clock: 3, site: ParticipantId(5) };
        let b = Priority { clock: 2, site: ParticipantId(1) };
        assert!(a.beats(&b));
        assert!(!b.beats(&a));
    }

    #[test]
    fn priority_equal_clock_lower_site_wins() {
        let a = Priority { clock: 2, site: ParticipantId(1) };
        let b = Priority { clock: 2, site: ParticipantId(4) };
        assert!(a.beats(&b));
        assert!(!b.beats(&a));
    }

    #[test]
    fn priority_never_beats_itself() {
        let a = Priority { clock: 2, site: ParticipantId(1) };
        assert!(!a.beats(&a));
    }

    #[test]
    fn char_node_serde_shape() {
        let node = CharNode {
            id: NodeId { site: ParticipantId(1), counter: 7 },
            parent: None,
            priority: Priority { clock: 3, site: ParticipantId(1) },
            value: 'x',
            deleted: false,
        };
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["id"]["site"], 1);
        assert_eq!(json["id"]["counter"], 7);
        assert_eq!(json["parent"], serde_json::Value::Null);
        assert_eq!(json["value"], "x");

        let back: CharNode = serde_json::from_value(json).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn deleted_defaults_to_false() {
        let node: CharNode = serde_json::from_str(
            r#"{"id":{"site":2,"counter":1},"parent":{"site":0,"counter":3},
                "priority":{"clock":1,"site":2},"value":"a"}"#,
        )
        .unwrap();
        assert!(!node.deleted);
        assert_eq!(node.parent, Some(NodeId { site: ParticipantId(0), counter: 3 }));
    }
}
