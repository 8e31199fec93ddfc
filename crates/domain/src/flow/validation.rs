//! Structural checks for flows.
//!
//! Errors make a flow unrunnable. Disconnected nodes and cycles are only
//! warnings: the interpreter never revisits a node, so cycles terminate.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::Serialize;

use crate::id::NodeId;

use super::{Flow, NodeType};

/// A problem found while validating a flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FlowIssue {
    Empty,
    DuplicateNode { node: NodeId },
    NoTriggerRoot,
    UnknownConnection { from: NodeId, to: NodeId },
    Disconnected { node: NodeId },
    Cycle { path: Vec<NodeId> },
}

impl std::fmt::Display for FlowIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => f.write_str("flow has no nodes"),
            Self::DuplicateNode { node } => write!(f, "duplicate node id `{node}`"),
            Self::NoTriggerRoot => {
                f.write_str("flow needs a trigger node without incoming connections")
            }
            Self::UnknownConnection { from, to } => {
                write!(f, "node `{from}` connects to unknown node `{to}`")
            }
            Self::Disconnected { node } => {
                write!(f, "node `{node}` is not reachable from any trigger")
            }
            Self::Cycle { path } => {
                let path: Vec<&str> = path.iter().map(NodeId::as_str).collect();
                write!(f, "cycle: {}", path.join(" -> "))
            }
        }
    }
}

/// Outcome of [`Flow::validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<FlowIssue>,
    pub warnings: Vec<FlowIssue>,
}

impl ValidationReport {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    #[must_use]
    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }
}

pub(super) fn validate(flow: &Flow) -> ValidationReport {
    let mut report = ValidationReport::default();

    if flow.nodes.is_empty() {
        report.errors.push(FlowIssue::Empty);
        return report;
    }

    let mut index: HashMap<&NodeId, usize> = HashMap::with_capacity(flow.nodes.len());
    for (i, node) in flow.nodes.iter().enumerate() {
        if index.contains_key(&node.id) {
            report.errors.push(FlowIssue::DuplicateNode {
                node: node.id.clone(),
            });
        } else {
            index.insert(&node.id, i);
        }
    }

    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); flow.nodes.len()];
    let mut has_incoming = vec![false; flow.nodes.len()];
    for (i, node) in flow.nodes.iter().enumerate() {
        for target in &node.connections {
            match index.get(target) {
                Some(&j) => {
                    adjacency[i].push(j);
                    has_incoming[j] = true;
                }
                None => report.warnings.push(FlowIssue::UnknownConnection {
                    from: node.id.clone(),
                    to: target.clone(),
                }),
            }
        }
    }

    let roots: Vec<usize> = flow
        .nodes
        .iter()
        .enumerate()
        .filter(|(i, n)| n.node_type == NodeType::Trigger && !has_incoming[*i])
        .map(|(i, _)| i)
        .collect();
    if roots.is_empty() {
        report.errors.push(FlowIssue::NoTriggerRoot);
    }

    let reachable = reachable_from(&roots, &adjacency);
    for (i, node) in flow.nodes.iter().enumerate() {
        if !reachable.contains(&i) {
            report.warnings.push(FlowIssue::Disconnected {
                node: node.id.clone(),
            });
        }
    }

    for cycle in find_cycles(&adjacency) {
        report.warnings.push(FlowIssue::Cycle {
            path: cycle.into_iter().map(|i| flow.nodes[i].id.clone()).collect(),
        });
    }

    report
}

/// Breadth-first reachability from the given roots.
fn reachable_from(roots: &[usize], adjacency: &[Vec<usize>]) -> HashSet<usize> {
    let mut seen: HashSet<usize> = roots.iter().copied().collect();
    let mut queue: VecDeque<usize> = roots.iter().copied().collect();
    while let Some(node) = queue.pop_front() {
        for &next in &adjacency[node] {
            if seen.insert(next) {
                queue.push_back(next);
            }
        }
    }
    seen
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

/// Depth-first search with an explicit recursion stack. Every back edge
/// yields one cycle, closed by repeating its first node.
fn find_cycles(adjacency: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let mut marks = vec![Mark::Unvisited; adjacency.len()];
    let mut cycles = Vec::new();

    for start in 0..adjacency.len() {
        if marks[start] != Mark::Unvisited {
            continue;
        }
        marks[start] = Mark::OnStack;
        let mut stack: Vec<(usize, usize)> = vec![(start, 0)];

        while let Some(frame) = stack.last_mut() {
            let (node, child) = *frame;
            let Some(&target) = adjacency[node].get(child) else {
                marks[node] = Mark::Done;
                stack.pop();
                continue;
            };
            frame.1 += 1;

            match marks[target] {
                Mark::Unvisited => {
                    marks[target] = Mark::OnStack;
                    stack.push((target, 0));
                }
                Mark::OnStack => {
                    let begin = stack.iter().position(|(n, _)| *n == target).unwrap_or(0);
                    let mut cycle: Vec<usize> = stack[begin..].iter().map(|(n, _)| *n).collect();
                    cycle.push(target);
                    cycles.push(cycle);
                }
                Mark::Done => {}
            }
        }
    }

    cycles
}
