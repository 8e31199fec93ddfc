//! Flow — a user-authored graph of trigger, condition, action and delay nodes.
//!
//! The graph is an arena: a flat list of nodes, each holding the ids of its
//! **outgoing** neighbours in `connections`. There are no edge objects.
//! For condition nodes the order of `connections` is meaningful:
//! `connections[0]` is followed when the condition holds and
//! `connections[1]` when it does not.
//!
//! Presentation metadata stored by graph editors (icons, positions, colours)
//! is not part of the model and is dropped on deserialisation.

mod validation;

pub use validation::{FlowIssue, ValidationReport};

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::id::{FlowId, NodeId};

/// The role a node plays in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Trigger,
    Condition,
    Action,
    Delay,
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Trigger => "trigger",
            Self::Condition => "condition",
            Self::Action => "action",
            Self::Delay => "delay",
        })
    }
}

/// One node of a [`Flow`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowNode {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub subtype: String,
    #[serde(default)]
    pub data: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub connections: Vec<NodeId>,
}

impl FlowNode {
    #[must_use]
    pub fn new(id: impl Into<NodeId>, node_type: NodeType, subtype: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type,
            subtype: subtype.into(),
            data: serde_json::Map::new(),
            connections: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_data(mut self, key: &str, value: serde_json::Value) -> Self {
        self.data.insert(key.to_string(), value);
        self
    }

    #[must_use]
    pub fn connect(mut self, target: impl Into<NodeId>) -> Self {
        self.connections.push(target.into());
        self
    }

    #[must_use]
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(serde_json::Value::as_str)
    }

    #[must_use]
    pub fn data_f64(&self, key: &str) -> Option<f64> {
        self.data.get(key).and_then(serde_json::Value::as_f64)
    }

    #[must_use]
    pub fn data_bool(&self, key: &str) -> Option<bool> {
        self.data.get(key).and_then(serde_json::Value::as_bool)
    }
}

/// A complete node graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    #[serde(default)]
    pub id: FlowId,
    #[serde(default)]
    pub name: String,
    pub nodes: Vec<FlowNode>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Flow {
    #[must_use]
    pub fn new(name: impl Into<String>, nodes: Vec<FlowNode>) -> Self {
        Self {
            id: FlowId::new(),
            name: name.into(),
            nodes,
            enabled: true,
        }
    }

    /// Look a node up by id. The first node wins if ids are duplicated.
    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&FlowNode> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    /// Number of incoming connections per node id.
    #[must_use]
    pub fn incoming_counts(&self) -> HashMap<&NodeId, usize> {
        let mut counts: HashMap<&NodeId, usize> =
            self.nodes.iter().map(|n| (&n.id, 0)).collect();
        for node in &self.nodes {
            for target in &node.connections {
                if let Some(count) = counts.get_mut(target) {
                    *count += 1;
                }
            }
        }
        counts
    }

    /// Trigger nodes without incoming connections, in declaration order.
    #[must_use]
    pub fn root_nodes(&self) -> Vec<&FlowNode> {
        let incoming = self.incoming_counts();
        self.nodes
            .iter()
            .filter(|n| n.node_type == NodeType::Trigger)
            .filter(|n| incoming.get(&n.id).copied().unwrap_or(0) == 0)
            .collect()
    }

    /// Run the structural checks.
    #[must_use]
    pub fn validate(&self) -> ValidationReport {
        validation::validate(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn should_find_trigger_roots_only() {
        let flow = Flow::new(
            "Roots",
            vec![
                FlowNode::new("t1", NodeType::Trigger, "manual").connect("a1"),
                FlowNode::new("a1", NodeType::Action, "light"),
                FlowNode::new("orphan", NodeType::Action, "light"),
            ],
        );
        let roots: Vec<&str> = flow.root_nodes().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(roots, vec!["t1"]);
    }

    #[test]
    fn should_not_treat_trigger_with_incoming_edge_as_root() {
        let flow = Flow::new(
            "Loop",
            vec![
                FlowNode::new("t1", NodeType::Trigger, "manual").connect("t2"),
                FlowNode::new("t2", NodeType::Trigger, "manual").connect("t1"),
            ],
        );
        assert!(flow.root_nodes().is_empty());
    }

    #[test]
    fn should_count_incoming_connections() {
        let flow = Flow::new(
            "Diamond",
            vec![
                FlowNode::new("t", NodeType::Trigger, "manual")
                    .connect("a")
                    .connect("b"),
                FlowNode::new("a", NodeType::Action, "light").connect("c"),
                FlowNode::new("b", NodeType::Action, "light").connect("c"),
                FlowNode::new("c", NodeType::Action, "light"),
            ],
        );
        let counts = flow.incoming_counts();
        assert_eq!(counts[&NodeId::from("c")], 2);
        assert_eq!(counts[&NodeId::from("t")], 0);
    }

    #[test]
    fn should_drop_presentation_fields_when_deserializing() {
        let node: FlowNode = serde_json::from_value(json!({
            "id": "n1",
            "type": "action",
            "subtype": "light",
            "icon": "lightbulb",
            "position": {"x": 10, "y": 20},
            "data": {"device_id": "d1", "action": "on"},
            "connections": ["n2"]
        }))
        .unwrap();
        assert_eq!(node.node_type, NodeType::Action);
        assert_eq!(node.data_str("device_id"), Some("d1"));
        assert_eq!(node.connections, vec![NodeId::from("n2")]);
    }

    #[test]
    fn should_read_typed_data() {
        let node = FlowNode::new("d", NodeType::Delay, "wait")
            .with_data("delay", json!(250))
            .with_data("expected", json!(true));
        assert_eq!(node.data_f64("delay"), Some(250.0));
        assert_eq!(node.data_bool("expected"), Some(true));
        assert_eq!(node.data_str("delay"), None);
    }
}
