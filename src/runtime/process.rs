use std::sync::Arc;
use serde_json::Value;
use tracing::{debug, error, warn};
use crate::actions::{HandlerRegistry, TaskOutcome};
use crate::error::{FlowError, Result};
use crate::runtime::activity::{Activity, ActivityKind};
use crate::runtime::context::Scope;
use crate::runtime::flow::{ActivityIndex, FlowIndex, FlowState, Resolution, SequenceFlow};
use crate::runtime::gateway::{self, JoinOutcome};
use crate::runtime::graph::ProcessGraph;
use crate::runtime::listener::{Event, EventKind, Listener};
use crate::runtime::state::{FlowSnapshot, ProcessState, StateSnapshot};

/// A running process: the graph arena, its variables and its observers.
///
/// Every resolution is handled synchronously. A `take` or `discard`
/// returns once its whole downstream cascade has run, or stopped at a task
/// that waits for a signal.
pub struct ProcessInstance {
    graph: ProcessGraph,
    scope: Scope,
    handlers: Arc<HandlerRegistry>,
    listeners: Vec<Arc<dyn Listener>>,
    activated: bool,
}

impl ProcessInstance {
    pub fn new(graph: ProcessGraph, scope: Scope, handlers: Arc<HandlerRegistry>) -> Self {
        Self {
            graph,
            scope,
            handlers,
            listeners: Vec::new(),
            activated: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.graph.id
    }

    pub fn graph(&self) -> &ProcessGraph {
        &self.graph
    }

    pub fn activity(&self, id: &str) -> Option<&Activity> {
        self.graph.activity(id)
    }

    pub fn flow(&self, id: &str) -> Option<&SequenceFlow> {
        self.graph.flow(id)
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn variable(&self, key: &str) -> Option<&Value> {
        self.scope.get_var(key)
    }

    pub fn set_variable(&mut self, key: &str, value: Value) {
        self.scope.set_var(key, value);
    }

    pub fn subscribe(&mut self, listener: Arc<dyn Listener>) {
        self.listeners.push(listener);
    }

    pub fn is_activated(&self) -> bool {
        self.activated
    }

    pub fn waiting_activities(&self) -> Vec<String> {
        self.graph
            .activities()
            .iter()
            .filter(|a| a.waiting)
            .map(|a| a.id.clone())
            .collect()
    }

    // --- Activation & run ---

    /// Prepare pending-flow bookkeeping of every activity. Idempotent.
    pub fn activate(&mut self) {
        if self.activated {
            return;
        }
        for idx in 0..self.graph.activities().len() {
            self.ensure_activated(idx);
        }
        self.activated = true;
    }

    pub fn activate_activity(&mut self, id: &str) -> Result<()> {
        let idx = self.graph.activity_index(id)?;
        self.ensure_activated(idx);
        Ok(())
    }

    /// Run every activity without inbound flows, in declaration order.
    pub fn run(&mut self) -> Result<()> {
        self.activate();
        let roots: Vec<ActivityIndex> = self
            .graph
            .activities()
            .iter()
            .enumerate()
            .filter(|(_, a)| a.inbound.is_empty())
            .map(|(i, _)| i)
            .collect();
        // Roots are independent branches; a failure in one does not stop the rest
        let mut first_error = None;
        for idx in roots {
            if let Err(e) = self.run_at(idx) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Begin one activity's own work. A gateway with inbound flows only
    /// completes through inbound resolutions, so this is a no-op for it.
    pub fn run_activity(&mut self, id: &str) -> Result<()> {
        self.activate();
        let idx = self.graph.activity_index(id)?;
        self.run_at(idx)
    }

    fn run_at(&mut self, idx: ActivityIndex) -> Result<()> {
        self.ensure_activated(idx);
        let act = self.graph.activity_at(idx);
        if act.kind.is_gateway() && !act.inbound.is_empty() {
            debug!(activity = %act.id, pending_inbound = ?act.pending_inbound, "Gateway waits for inbound flows");
            return Ok(());
        }
        if act.busy || (act.entered && !act.is_complete()) {
            warn!(activity = %act.id, "Activity is already running, ignoring run");
            return Ok(());
        }
        if act.is_complete() {
            self.graph.begin_cycle(idx);
        }
        self.enter(idx)
    }

    // --- Flow actions ---

    pub fn take(&mut self, flow_id: &str) -> Result<()> {
        self.activate();
        let f = self.graph.flow_index(flow_id)?;
        self.resolve_flow(f, Resolution::Take)
    }

    pub fn discard(&mut self, flow_id: &str) -> Result<()> {
        self.activate();
        let f = self.graph.flow_index(flow_id)?;
        self.resolve_flow(f, Resolution::Discard)
    }

    /// Complete a task that is waiting for an external signal.
    pub fn signal(&mut self, activity_id: &str) -> Result<()> {
        let idx = self.graph.activity_index(activity_id)?;
        let act = self.graph.activity_at_mut(idx);
        if !act.waiting {
            return Err(FlowError::NotWaiting(activity_id.to_string()));
        }
        act.waiting = false;
        debug!(activity = activity_id, "Signal received");
        self.complete_with_token(idx)
    }

    fn resolve_flow(&mut self, f: FlowIndex, resolution: Resolution) -> Result<()> {
        let flow = self.graph.flow_at_mut(f);
        if !flow.resolve(resolution) {
            warn!(flow = %flow.id, state = ?flow.state(), "Sequence flow already resolved in this cycle, ignoring");
            return Ok(());
        }
        let id = flow.id.clone();
        let target = flow.target;
        let kind = match resolution {
            Resolution::Take => EventKind::Taken,
            Resolution::Discard => EventKind::Discarded,
        };
        self.emit(kind, &id);
        self.on_inbound(target, f, resolution)
    }

    // --- Inbound side ---

    fn on_inbound(&mut self, idx: ActivityIndex, f: FlowIndex, resolution: Resolution) -> Result<()> {
        self.ensure_activated(idx);
        let flow_id = self.graph.flow_at(f).id.clone();
        let act = self.graph.activity_at_mut(idx);

        if act.busy {
            debug!(activity = %act.id, flow = %flow_id, "Activity is resolving its outbound flows, deferring");
            act.deferred.push_back((f, resolution));
            return Ok(());
        }

        let is_gateway = act.kind.is_gateway();
        if act.is_complete() && (is_gateway || resolution == Resolution::Take) {
            debug!(activity = %act.id, flow = %flow_id, "Re-entered, starting a new cycle");
            self.graph.begin_cycle(idx);
        } else if !act.is_pending_inbound(&flow_id) {
            if resolution == Resolution::Take {
                warn!(activity = %act.id, flow = %flow_id, "Inbound flow already accounted for in this cycle, ignoring");
            } else {
                debug!(activity = %act.id, flow = %flow_id, "Discard after completion, ignoring");
            }
            return Ok(());
        }

        self.graph.activity_at_mut(idx).settle_inbound(&flow_id, resolution);

        if is_gateway {
            self.gateway_inbound(idx)
        } else {
            self.activity_inbound(idx, resolution)
        }
    }

    fn gateway_inbound(&mut self, idx: ActivityIndex) -> Result<()> {
        let act = self.graph.activity_at_mut(idx);
        let first = !act.entered;
        act.entered = true;
        if first && act.inbound.len() >= 2 {
            self.emit_activity(idx, EventKind::Start);
        }

        let act = self.graph.activity_at(idx);
        match gateway::join_outcome(act) {
            JoinOutcome::Waiting => {
                debug!(activity = %act.id, pending_inbound = ?act.pending_inbound, "Joining");
                Ok(())
            }
            JoinOutcome::Joined => self.complete_with_token(idx),
            JoinOutcome::Discarded => {
                let decisions = gateway::discard_outbound(act);
                self.resolve_outbound(idx, decisions, false)
            }
        }
    }

    /// Start/end events and tasks: every taken inbound runs the activity.
    fn activity_inbound(&mut self, idx: ActivityIndex, resolution: Resolution) -> Result<()> {
        let act = self.graph.activity_at(idx);
        match resolution {
            Resolution::Take if act.entered => {
                warn!(activity = %act.id, "Activity is still running, ignoring inbound token");
                Ok(())
            }
            Resolution::Take => self.enter(idx),
            Resolution::Discard if !act.entered && act.fully_discarded() => {
                let decisions = gateway::discard_outbound(act);
                self.resolve_outbound(idx, decisions, false)
            }
            Resolution::Discard => Ok(()),
        }
    }

    // --- Activity work ---

    fn enter(&mut self, idx: ActivityIndex) -> Result<()> {
        let act = self.graph.activity_at_mut(idx);
        act.entered = true;
        let kind = act.kind.clone();

        match kind {
            ActivityKind::StartEvent | ActivityKind::EndEvent => {
                self.emit_activity(idx, EventKind::Start);
                self.complete_with_token(idx)
            }
            ActivityKind::Task { handler: name, params } => {
                self.emit_activity(idx, EventKind::Start);
                let id = self.graph.activity_at(idx).id.clone();
                let Some(handler) = self.handlers.get(&name) else {
                    return Err(self.fail(idx, FlowError::UnknownHandler(name)));
                };
                let outcome = match handler.execute(&id, &params, &mut self.scope) {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        let err = FlowError::TaskFailed { activity: id, reason: format!("{:#}", e) };
                        return Err(self.fail(idx, err));
                    }
                };
                match outcome {
                    TaskOutcome::Complete => self.complete_with_token(idx),
                    TaskOutcome::Wait => {
                        self.graph.activity_at_mut(idx).waiting = true;
                        self.emit(EventKind::Wait, &id);
                        Ok(())
                    }
                }
            }
            ActivityKind::ParallelGateway | ActivityKind::InclusiveGateway => self.complete_with_token(idx),
        }
    }

    // --- Outbound side ---

    /// Completion with a live token: select outbound flows, then resolve them.
    fn complete_with_token(&mut self, idx: ActivityIndex) -> Result<()> {
        let decisions = match gateway::select_outbound(&self.graph, idx, &self.scope) {
            Ok(d) => d,
            Err(e) => return Err(self.fail(idx, e)),
        };
        self.resolve_outbound(idx, decisions, true)
    }

    /// Resolve outbound flows one at a time in the given order. `live` is
    /// false on the discard cascade, which ends in `leave` only.
    ///
    /// A failure downstream is fatal for that branch only: the remaining
    /// flows are still resolved, the activity still completes, and the
    /// first error is returned afterwards.
    fn resolve_outbound(&mut self, idx: ActivityIndex, decisions: Vec<(FlowIndex, Resolution)>, live: bool) -> Result<()> {
        self.graph.activity_at_mut(idx).busy = true;
        let mut first_error = self.resolve_each(idx, &decisions);
        self.graph.activity_at_mut(idx).busy = false;

        let act = self.graph.activity_at_mut(idx);
        act.pending_outbound = None;
        if live {
            act.taken = true;
            self.emit_activity(idx, EventKind::Start);
            self.emit_activity(idx, EventKind::End);
        }
        self.emit_activity(idx, EventKind::Leave);

        let deferred: Vec<_> = self.graph.activity_at_mut(idx).deferred.drain(..).collect();
        for (f, resolution) in deferred {
            if let Err(e) = self.on_inbound(idx, f, resolution) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn resolve_each(&mut self, idx: ActivityIndex, decisions: &[(FlowIndex, Resolution)]) -> Option<FlowError> {
        let mut first_error = None;
        for &(f, resolution) in decisions {
            let flow_id = self.graph.flow_at(f).id.clone();
            self.graph.activity_at_mut(idx).settle_outbound(&flow_id);
            if let Err(e) = self.resolve_flow(f, resolution) {
                debug!(activity = %self.graph.activity_at(idx).id, flow = %flow_id, error = %e, "Branch failed, resolving remaining flows");
                first_error.get_or_insert(e);
            }
            if resolution == Resolution::Take {
                self.emit_activity(idx, EventKind::Start);
            }
        }
        first_error
    }

    // --- State capture & resume ---

    pub fn activity_state(&self, id: &str) -> Result<StateSnapshot> {
        let idx = self.graph.activity_index(id)?;
        Ok(snapshot(self.graph.activity_at(idx)))
    }

    pub fn get_state(&self) -> ProcessState {
        ProcessState {
            id: self.graph.id.clone(),
            activated: self.activated,
            variables: self.scope.clone(),
            activities: self.graph.activities().iter().map(snapshot).collect(),
            flows: self
                .graph
                .flows()
                .iter()
                .filter(|f| f.is_resolved())
                .map(|f| FlowSnapshot { id: f.id.clone(), state: f.state() })
                .collect(),
        }
    }

    /// Rebuild the whole instance from `state`. Everything is matched by
    /// identifier and validated before anything is changed.
    pub fn resume(&mut self, state: &ProcessState) -> Result<()> {
        if state.id != self.graph.id {
            return Err(FlowError::Reconstruction {
                activity: state.id.clone(),
                reason: format!("state belongs to process `{}`, not `{}`", state.id, self.graph.id),
            });
        }

        let mut restored = Vec::with_capacity(state.activities.len());
        for snap in &state.activities {
            let idx = self.graph.activity_index(&snap.id).map_err(|_| FlowError::Reconstruction {
                activity: snap.id.clone(),
                reason: "no such activity in this graph".to_string(),
            })?;
            restored.push((idx, self.restore_sets(idx, snap)?));
        }
        let mut flows = Vec::with_capacity(state.flows.len());
        for fs in &state.flows {
            let f = self.graph.flow_index(&fs.id).map_err(|_| FlowError::Reconstruction {
                activity: state.id.clone(),
                reason: format!("no sequence flow `{}` in this graph", fs.id),
            })?;
            flows.push((f, fs.state));
        }

        self.scope = state.variables.clone();
        self.activated = state.activated;
        for idx in 0..self.graph.activities().len() {
            self.graph.begin_cycle(idx);
            if !state.activated {
                self.graph.activity_at_mut(idx).activated = false;
            }
        }
        for f in 0..self.graph.flows().len() {
            self.graph.flow_at_mut(f).restore(FlowState::Pending);
        }
        for (f, fs) in flows {
            self.graph.flow_at_mut(f).restore(fs);
        }
        if state.activated {
            for ((idx, sets), snap) in restored.into_iter().zip(&state.activities) {
                apply_snapshot(self.graph.activity_at_mut(idx), snap, sets);
            }
        }
        debug!(process = %state.id, "Resumed");
        Ok(())
    }

    /// Rebuild a single activity's bookkeeping from its snapshot.
    pub fn resume_activity(&mut self, snap: &StateSnapshot) -> Result<()> {
        let idx = self.graph.activity_index(&snap.id).map_err(|_| FlowError::Reconstruction {
            activity: snap.id.clone(),
            reason: "no such activity in this graph".to_string(),
        })?;
        let sets = self.restore_sets(idx, snap)?;
        apply_snapshot(self.graph.activity_at_mut(idx), snap, sets);
        Ok(())
    }

    /// Match snapshot flow ids against the activity's current flow lists.
    /// Pending sets come back in declaration order.
    fn restore_sets(&self, idx: ActivityIndex, snap: &StateSnapshot) -> Result<RestoredSets> {
        let act = self.graph.activity_at(idx);
        let inbound = self.graph.flow_ids_of(&act.inbound);
        let outbound = self.graph.flow_ids_of(&act.outbound);

        let check = |ids: &[String], allowed: &[String], side: &str| -> Result<()> {
            match ids.iter().find(|id| !allowed.contains(id)) {
                Some(unknown) => Err(FlowError::Reconstruction {
                    activity: snap.id.clone(),
                    reason: format!("`{}` is not an {} flow of this activity", unknown, side),
                }),
                None => Ok(()),
            }
        };

        let pending_inbound = match &snap.pending_inbound {
            Some(ids) => {
                check(ids, &inbound, "inbound")?;
                let set: Vec<String> = inbound.iter().filter(|f| ids.contains(f)).cloned().collect();
                if set.is_empty() { None } else { Some(set) }
            }
            None => None,
        };
        let discarded_inbound = match &snap.discarded_inbound {
            Some(ids) => {
                check(ids, &inbound, "inbound")?;
                ids.clone()
            }
            None => Vec::new(),
        };
        let pending_outbound = match &snap.pending_outbound {
            Some(ids) => {
                check(ids, &outbound, "outbound")?;
                Some(outbound.iter().filter(|f| ids.contains(f)).cloned().collect())
            }
            None => None,
        };

        Ok(RestoredSets { pending_inbound, discarded_inbound, pending_outbound })
    }

    // --- Events ---

    fn emit_activity(&mut self, idx: ActivityIndex, kind: EventKind) {
        let act = self.graph.activity_at_mut(idx);
        if act.mark_event(kind) {
            let id = act.id.clone();
            self.emit(kind, &id);
        }
    }

    fn emit(&self, kind: EventKind, element_id: &str) {
        debug!(event = ?kind, element = element_id, "Event");
        let event = Event::new(kind, element_id);
        for listener in &self.listeners {
            listener.on_event(&event);
        }
    }

    fn fail(&self, idx: ActivityIndex, err: FlowError) -> FlowError {
        let id = &self.graph.activity_at(idx).id;
        error!(activity = %id, error = %err, "Activity failed");
        self.emit(EventKind::Error, id);
        err
    }

    fn ensure_activated(&mut self, idx: ActivityIndex) {
        if !self.graph.activity_at(idx).activated {
            self.graph.begin_cycle(idx);
        }
    }
}

struct RestoredSets {
    pending_inbound: Option<Vec<String>>,
    discarded_inbound: Vec<String>,
    pending_outbound: Option<Vec<String>>,
}

fn snapshot(act: &Activity) -> StateSnapshot {
    StateSnapshot {
        id: act.id.clone(),
        entered: act.entered,
        taken: act.taken,
        started: act.started,
        waiting: act.waiting,
        pending_inbound: act.pending_inbound.clone(),
        discarded_inbound: if act.discarded_inbound.is_empty() {
            None
        } else {
            Some(act.discarded_inbound.clone())
        },
        pending_outbound: act.pending_outbound.clone(),
    }
}

fn apply_snapshot(act: &mut Activity, snap: &StateSnapshot, sets: RestoredSets) {
    act.activated = true;
    act.entered = snap.entered;
    act.taken = snap.taken;
    // Non-gateways and joining gateways announce `start` when entered, so an
    // entered snapshot without the flag has already delivered it
    let announces_on_entry = !act.kind.is_gateway() || act.inbound.len() >= 2;
    act.started = snap.started || (snap.entered && announces_on_entry);
    act.waiting = snap.waiting;
    act.pending_inbound = sets.pending_inbound;
    act.discarded_inbound = sets.discarded_inbound;
    act.pending_outbound = sets.pending_outbound;

    let done = !act.waiting && act.pending_outbound.is_none();
    act.ended = done && act.taken;
    act.left = done;
    act.busy = false;
    act.deferred.clear();
}
