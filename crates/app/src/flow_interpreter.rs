//! Flow interpreter — runs user-authored node graphs.
//!
//! A run walks the graph depth-first from every trigger root using an
//! explicit work stack. Each node moves `pending → running → succeeded |
//! failed`; a failed node's connections are not followed, but the rest of
//! the graph still runs. Nodes are never revisited, so cyclic graphs
//! terminate. Only a structural problem (disabled flow, failed validation,
//! exceeding [`MAX_DEPTH`]) aborts the run as a whole.
//!
//! Condition nodes branch positionally: `connections[0]` is followed when
//! the condition holds, `connections[1]` when it does not.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value, json};
use tokio::time::Instant;

use homeflow_domain::automation::{Action, ActionKind, CompareOp};
use homeflow_domain::error::FlowError;
use homeflow_domain::event::{Event, EventType};
use homeflow_domain::flow::{Flow, FlowNode, NodeType, ValidationReport};
use homeflow_domain::id::{DeviceId, ExecutionId, FlowId, NodeId};
use homeflow_domain::time::{Timestamp, minute_of_day, now, parse_hhmm};

use crate::ports::{ActionRunner, EventPublisher, FlowInputs};

/// Longest root-to-node path a run may walk.
pub const MAX_DEPTH: usize = 100;

/// Wait applied by delay nodes without a `delay` field.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(1000);

/// Lifecycle of one node within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStatus {
    Succeeded,
    Failed,
}

/// Observation hooks for a run. Nothing pauses; hits are only recorded.
#[derive(Debug, Clone, Default)]
pub struct DebugOptions {
    pub breakpoints: HashSet<NodeId>,
    /// Record every status change in [`FlowExecutionResult::trace`].
    pub step_mode: bool,
}

impl DebugOptions {
    #[must_use]
    pub fn with_breakpoint(mut self, node: impl Into<NodeId>) -> Self {
        self.breakpoints.insert(node.into());
        self
    }

    #[must_use]
    pub fn stepping(mut self) -> Self {
        self.step_mode = true;
        self
    }
}

/// One status change seen in step mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceEntry {
    pub node_id: NodeId,
    pub status: NodeStatus,
    pub depth: usize,
    /// Time since the run started.
    pub elapsed: Duration,
}

/// Everything observed during one [`FlowInterpreter::execute_flow`] call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowExecutionResult {
    pub execution_id: ExecutionId,
    pub flow_id: FlowId,
    pub status: FlowStatus,
    /// Nodes in the order they ran, failed ones included.
    pub executed_nodes: Vec<NodeId>,
    pub failed_nodes: Vec<NodeId>,
    pub node_states: HashMap<NodeId, NodeStatus>,
    pub node_timings: HashMap<NodeId, Duration>,
    pub node_errors: HashMap<NodeId, String>,
    pub variables: Map<String, Value>,
    pub branch_conditions: HashMap<NodeId, bool>,
    pub breakpoint_hits: Vec<NodeId>,
    pub trace: Vec<TraceEntry>,
    /// Set when the run was aborted as a whole.
    pub error: Option<String>,
    pub duration: Duration,
    pub timestamp: Timestamp,
}

impl FlowExecutionResult {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == FlowStatus::Succeeded
    }
}

/// Per-run bookkeeping, discarded once the result is built.
struct Run<'d> {
    execution_id: ExecutionId,
    flow_id: FlowId,
    debug: &'d DebugOptions,
    started: Instant,
    timestamp: Timestamp,
    visited: HashSet<NodeId>,
    executed: Vec<NodeId>,
    failed: Vec<NodeId>,
    states: HashMap<NodeId, NodeStatus>,
    timings: HashMap<NodeId, Duration>,
    errors: HashMap<NodeId, String>,
    variables: Map<String, Value>,
    branches: HashMap<NodeId, bool>,
    breakpoint_hits: Vec<NodeId>,
    trace: Vec<TraceEntry>,
}

impl<'d> Run<'d> {
    fn new(flow: &Flow, debug: &'d DebugOptions) -> Self {
        Self {
            execution_id: ExecutionId::new(),
            flow_id: flow.id,
            debug,
            started: Instant::now(),
            timestamp: now(),
            visited: HashSet::new(),
            executed: Vec::new(),
            failed: Vec::new(),
            states: flow
                .nodes
                .iter()
                .map(|n| (n.id.clone(), NodeStatus::Pending))
                .collect(),
            timings: HashMap::new(),
            errors: HashMap::new(),
            variables: Map::new(),
            branches: HashMap::new(),
            breakpoint_hits: Vec::new(),
            trace: Vec::new(),
        }
    }

    fn set_status(&mut self, node: &NodeId, status: NodeStatus, depth: usize) {
        self.states.insert(node.clone(), status);
        if self.debug.step_mode {
            self.trace.push(TraceEntry {
                node_id: node.clone(),
                status,
                depth,
                elapsed: self.started.elapsed(),
            });
        }
    }

    fn stash_trigger(&mut self, node: &FlowNode) {
        self.variables.insert(
            "trigger".to_string(),
            json!({ "node": node.id, "subtype": node.subtype }),
        );
        self.variables
            .insert(node.id.to_string(), Value::Object(node.data.clone()));
    }

    fn finish(self, fatal: Option<FlowError>) -> FlowExecutionResult {
        let status = if fatal.is_none() && self.failed.is_empty() {
            FlowStatus::Succeeded
        } else {
            FlowStatus::Failed
        };
        FlowExecutionResult {
            execution_id: self.execution_id,
            flow_id: self.flow_id,
            status,
            executed_nodes: self.executed,
            failed_nodes: self.failed,
            node_states: self.states,
            node_timings: self.timings,
            node_errors: self.errors,
            variables: self.variables,
            branch_conditions: self.branches,
            breakpoint_hits: self.breakpoint_hits,
            trace: self.trace,
            error: fatal.map(|err| err.to_string()),
            duration: self.started.elapsed(),
            timestamp: self.timestamp,
        }
    }
}

/// Executes [`Flow`]s against an [`ActionRunner`] and live [`FlowInputs`].
pub struct FlowInterpreter<A, I, P> {
    actions: A,
    inputs: I,
    publisher: P,
}

impl<A, I, P> FlowInterpreter<A, I, P>
where
    A: ActionRunner + Sync,
    I: FlowInputs + Sync,
    P: EventPublisher + Sync,
{
    pub fn new(actions: A, inputs: I, publisher: P) -> Self {
        Self {
            actions,
            inputs,
            publisher,
        }
    }

    /// Structural checks without running anything.
    #[must_use]
    pub fn validate_flow(&self, flow: &Flow) -> ValidationReport {
        flow.validate()
    }

    pub async fn execute_flow(&self, flow: &Flow) -> FlowExecutionResult {
        self.execute_flow_with(flow, &DebugOptions::default()).await
    }

    /// Run `flow` once, recording breakpoint hits and step traces as
    /// requested by `debug`.
    ///
    /// Never fails: node failures and aborted runs are reported in the
    /// returned result and published as [`EventType::FlowFailed`].
    #[tracing::instrument(skip_all, fields(flow_id = %flow.id))]
    pub async fn execute_flow_with(
        &self,
        flow: &Flow,
        debug: &DebugOptions,
    ) -> FlowExecutionResult {
        let mut run = Run::new(flow, debug);
        let fatal = self.walk(flow, &mut run).await.err();
        if let Some(err) = &fatal {
            tracing::error!(%err, "flow run aborted");
        }
        let result = run.finish(fatal);

        let (event_type, verb) = if result.is_success() {
            (EventType::FlowCompleted, "completed")
        } else {
            (EventType::FlowFailed, "failed")
        };
        tracing::info!(
            execution_id = %result.execution_id,
            executed = result.executed_nodes.len(),
            failed = result.failed_nodes.len(),
            "flow run {verb}"
        );
        let _ = self
            .publisher
            .publish(Event::about(
                event_type,
                flow.id,
                json!({
                    "name": flow.name,
                    "execution_id": result.execution_id,
                    "executed_nodes": result.executed_nodes,
                    "failed_nodes": result.failed_nodes,
                    "error": result.error,
                }),
            ))
            .await;
        result
    }

    async fn walk(&self, flow: &Flow, run: &mut Run<'_>) -> Result<(), FlowError> {
        if !flow.enabled {
            return Err(FlowError::Disabled);
        }
        let report = flow.validate();
        for warning in &report.warnings {
            tracing::warn!(%warning, "flow validation warning");
        }
        if !report.is_valid() {
            return Err(FlowError::Invalid(report.error_messages()));
        }

        let mut stack: Vec<(&FlowNode, usize)> = flow
            .root_nodes()
            .into_iter()
            .rev()
            .map(|root| (root, 1))
            .collect();

        while let Some((node, depth)) = stack.pop() {
            if run.visited.contains(&node.id) {
                continue;
            }
            if depth > MAX_DEPTH {
                return Err(FlowError::MaxDepthExceeded(MAX_DEPTH));
            }
            run.visited.insert(node.id.clone());

            let next = self.step(node, depth, run).await;
            for target in next.into_iter().rev() {
                match flow.node(target) {
                    Some(child) => stack.push((child, depth + 1)),
                    None => tracing::debug!(from = %node.id, to = %target, "skipping unknown connection"),
                }
            }
        }
        Ok(())
    }

    /// Execute one node and return the connections to follow.
    async fn step<'f>(
        &self,
        node: &'f FlowNode,
        depth: usize,
        run: &mut Run<'_>,
    ) -> Vec<&'f NodeId> {
        if run.debug.breakpoints.contains(&node.id) {
            tracing::debug!(node_id = %node.id, "breakpoint hit");
            run.breakpoint_hits.push(node.id.clone());
        }
        run.set_status(&node.id, NodeStatus::Running, depth);

        let started = Instant::now();
        let outcome = self.execute_node(node, run).await;
        run.timings.insert(node.id.clone(), started.elapsed());
        run.executed.push(node.id.clone());

        match outcome {
            Ok(branch) => {
                run.set_status(&node.id, NodeStatus::Succeeded, depth);
                follow(node, branch)
            }
            Err(err) => {
                tracing::warn!(node_id = %node.id, %err, "node failed");
                run.errors.insert(node.id.clone(), err.to_string());
                run.failed.push(node.id.clone());
                run.set_status(&node.id, NodeStatus::Failed, depth);
                Vec::new()
            }
        }
    }

    /// Returns the branch taken for condition nodes, `None` otherwise.
    async fn execute_node(
        &self,
        node: &FlowNode,
        run: &mut Run<'_>,
    ) -> Result<Option<bool>, FlowError> {
        match node.node_type {
            NodeType::Trigger => {
                run.stash_trigger(node);
                Ok(None)
            }
            NodeType::Condition => {
                let met = self.evaluate_condition(node)?;
                tracing::debug!(node_id = %node.id, met, "condition evaluated");
                run.branches.insert(node.id.clone(), met);
                Ok(Some(met))
            }
            NodeType::Action => {
                let action = action_for(node)?;
                self.actions
                    .run_actions(std::slice::from_ref(&action))
                    .await
                    .map_err(|err| node_failed(node, err))?;
                run.variables.insert(
                    "last_action".to_string(),
                    json!({ "node": node.id, "device_id": action.device_id, "action": action.action }),
                );
                Ok(None)
            }
            NodeType::Delay => {
                tokio::time::sleep(delay_for(node)?).await;
                Ok(None)
            }
        }
    }

    fn evaluate_condition(&self, node: &FlowNode) -> Result<bool, FlowError> {
        let source = node.data_str("device_id").map(DeviceId::from);
        match node.subtype.as_str() {
            "time_range" => {
                let start = minute_field(node, "start")?;
                let end = minute_field(node, "end")?;
                Ok(in_window(self.inputs.minute_of_day(), start, end))
            }
            "temperature" => {
                let operator = node
                    .data
                    .get("operator")
                    .ok_or_else(|| missing(node, "operator"))?;
                let operator: CompareOp = serde_json::from_value(operator.clone())
                    .map_err(|_| node_failed(node, format!("unknown operator {operator}")))?;
                let threshold = node
                    .data_f64("threshold")
                    .ok_or_else(|| missing(node, "threshold"))?;
                let current = self
                    .inputs
                    .temperature(source.as_ref())
                    .ok_or_else(|| node_failed(node, "no temperature reading"))?;
                Ok(operator.compare(current, threshold))
            }
            "presence" => {
                let expected = node.data_bool("expected").unwrap_or(true);
                let present = self
                    .inputs
                    .presence(source.as_ref())
                    .ok_or_else(|| node_failed(node, "no presence reading"))?;
                Ok(present == expected)
            }
            _ => Err(unsupported(node)),
        }
    }
}

fn follow(node: &FlowNode, branch: Option<bool>) -> Vec<&NodeId> {
    match branch {
        None => node.connections.iter().collect(),
        Some(true) => node.connections.first().into_iter().collect(),
        Some(false) => node.connections.get(1).into_iter().collect(),
    }
}

/// `start` inclusive, `end` exclusive; wraps past midnight when `start > end`.
fn in_window(minute: u32, start: u32, end: u32) -> bool {
    if start <= end {
        start <= minute && minute < end
    } else {
        minute >= start || minute < end
    }
}

fn minute_field(node: &FlowNode, field: &'static str) -> Result<u32, FlowError> {
    let raw = node.data_str(field).ok_or_else(|| missing(node, field))?;
    let time = parse_hhmm(raw).map_err(|err| node_failed(node, err))?;
    Ok(minute_of_day(time))
}

fn action_for(node: &FlowNode) -> Result<Action, FlowError> {
    let device_id = node
        .data_str("device_id")
        .ok_or_else(|| missing(node, "device_id"))?;
    let mut action = Action::new(device_id, action_kind(node)?);
    if let Some(value) = node.data.get("value") {
        action = action.with_value(value.clone());
    }
    Ok(action)
}

/// Map `(subtype, data.action)` to a device command.
///
/// A canonical action name (`turn_on`, `set_brightness`, …) is accepted
/// for any subtype.
fn action_kind(node: &FlowNode) -> Result<ActionKind, FlowError> {
    let requested = node.data_str("action");
    if let Some(kind) = requested
        .and_then(|name| serde_json::from_value::<ActionKind>(Value::from(name)).ok())
    {
        return Ok(kind);
    }

    let kind = match (node.subtype.as_str(), requested) {
        ("light" | "switch", None) => return Err(missing(node, "action")),
        ("light" | "switch", Some("on")) => ActionKind::TurnOn,
        ("light" | "switch", Some("off")) => ActionKind::TurnOff,
        ("light" | "switch", Some("toggle")) => ActionKind::Toggle,
        ("light", Some("dim" | "brightness")) => ActionKind::SetBrightness,
        ("light", Some("color")) => ActionKind::SetColor,
        ("light" | "thermostat", Some("temperature")) | ("thermostat", None | Some("set")) => {
            ActionKind::SetTemperature
        }
        ("light" | "switch" | "thermostat", Some(other)) => {
            return Err(node_failed(node, format!("unknown action `{other}`")));
        }
        _ => return Err(unsupported(node)),
    };
    Ok(kind)
}

fn delay_for(node: &FlowNode) -> Result<Duration, FlowError> {
    let Some(raw) = node.data.get("delay") else {
        return Ok(DEFAULT_DELAY);
    };
    let millis = raw
        .as_f64()
        .ok_or_else(|| node_failed(node, "delay must be a number of milliseconds"))?;
    Duration::try_from_secs_f64(millis / 1000.0)
        .map_err(|_| node_failed(node, format!("invalid delay {millis}")))
}

fn missing(node: &FlowNode, field: &'static str) -> FlowError {
    FlowError::MissingData {
        node: node.id.to_string(),
        field,
    }
}

fn unsupported(node: &FlowNode) -> FlowError {
    FlowError::UnsupportedSubtype {
        node: node.id.to_string(),
        subtype: node.subtype.clone(),
    }
}

fn node_failed(node: &FlowNode, reason: impl std::fmt::Display) -> FlowError {
    FlowError::NodeFailed {
        node: node.id.to_string(),
        reason: reason.to_string(),
    }
}
