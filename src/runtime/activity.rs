use std::collections::VecDeque;
use serde_json::Value;
use crate::runtime::flow::{FlowIndex, Resolution};
use crate::runtime::listener::EventKind;

/// Node kinds the runtime knows how to drive.
#[derive(Debug, Clone, PartialEq)]
pub enum ActivityKind {
    StartEvent,
    EndEvent,
    /// Work delegated to a registered `TaskHandler`.
    Task { handler: String, params: Value },
    ParallelGateway,
    InclusiveGateway,
}

impl ActivityKind {
    pub fn is_gateway(&self) -> bool {
        matches!(self, ActivityKind::ParallelGateway | ActivityKind::InclusiveGateway)
    }
}

/// One node of the process graph plus the bookkeeping of its current
/// activation cycle.
///
/// Pending sets hold flow ids rather than indices so a snapshot can be
/// taken and matched against a freshly compiled graph. `None` means the
/// phase is resolved (or never applies, e.g. inbound of a start event).
#[derive(Debug, Clone)]
pub struct Activity {
    pub id: String,
    pub kind: ActivityKind,
    pub(crate) inbound: Vec<FlowIndex>,
    pub(crate) outbound: Vec<FlowIndex>,

    pub(crate) activated: bool,
    pub(crate) entered: bool,
    pub(crate) taken: bool,
    pub(crate) waiting: bool,

    pub(crate) started: bool,
    pub(crate) ended: bool,
    pub(crate) left: bool,

    pub(crate) pending_inbound: Option<Vec<String>>,
    pub(crate) discarded_inbound: Vec<String>,
    pub(crate) pending_outbound: Option<Vec<String>>,

    /// Set while outbound flows are being resolved.
    pub(crate) busy: bool,
    /// Inbound resolutions that arrived while busy.
    pub(crate) deferred: VecDeque<(FlowIndex, Resolution)>,
}

impl Activity {
    pub fn new(id: &str, kind: ActivityKind) -> Self {
        Self {
            id: id.to_string(),
            kind,
            inbound: Vec::new(),
            outbound: Vec::new(),
            activated: false,
            entered: false,
            taken: false,
            waiting: false,
            started: false,
            ended: false,
            left: false,
            pending_inbound: None,
            discarded_inbound: Vec::new(),
            pending_outbound: None,
            busy: false,
            deferred: VecDeque::new(),
        }
    }

    pub fn is_activated(&self) -> bool {
        self.activated
    }

    pub fn is_entered(&self) -> bool {
        self.entered
    }

    pub fn is_taken(&self) -> bool {
        self.taken
    }

    pub fn is_waiting(&self) -> bool {
        self.waiting
    }

    pub fn pending_inbound(&self) -> Option<&[String]> {
        self.pending_inbound.as_deref()
    }

    pub fn discarded_inbound(&self) -> &[String] {
        &self.discarded_inbound
    }

    pub fn pending_outbound(&self) -> Option<&[String]> {
        self.pending_outbound.as_deref()
    }

    pub fn inbound_count(&self) -> usize {
        self.inbound.len()
    }

    pub fn outbound_count(&self) -> usize {
        self.outbound.len()
    }

    /// The current cycle is over: every outbound flow has been resolved,
    /// either by taking through the activity or by the discard cascade.
    pub fn is_complete(&self) -> bool {
        self.activated && !self.waiting && self.pending_outbound.is_none()
    }

    pub(crate) fn is_pending_inbound(&self, flow_id: &str) -> bool {
        self.pending_inbound
            .as_ref()
            .is_some_and(|p| p.iter().any(|f| f == flow_id))
    }

    /// Remove a flow from the pending inbound set, collapsing it to `None`
    /// once empty. Returns whether the flow was pending.
    pub(crate) fn settle_inbound(&mut self, flow_id: &str, resolution: Resolution) -> bool {
        let Some(pending) = self.pending_inbound.as_mut() else {
            return false;
        };
        let Some(pos) = pending.iter().position(|f| f == flow_id) else {
            return false;
        };
        pending.remove(pos);
        if pending.is_empty() {
            self.pending_inbound = None;
        }
        if resolution == Resolution::Discard {
            self.discarded_inbound.push(flow_id.to_string());
        }
        true
    }

    pub(crate) fn settle_outbound(&mut self, flow_id: &str) {
        if let Some(pending) = self.pending_outbound.as_mut() {
            pending.retain(|f| f != flow_id);
        }
    }

    /// Every inbound flow of this cycle has been resolved as discarded.
    pub(crate) fn fully_discarded(&self) -> bool {
        !self.inbound.is_empty()
            && self.pending_inbound.is_none()
            && self.discarded_inbound.len() == self.inbound.len()
    }

    /// Whether `kind` may still be delivered in this cycle; marks it
    /// delivered when it may.
    pub(crate) fn mark_event(&mut self, kind: EventKind) -> bool {
        let flag = match kind {
            EventKind::Start => &mut self.started,
            EventKind::End => &mut self.ended,
            EventKind::Leave => &mut self.left,
            _ => return true,
        };
        if *flag {
            return false;
        }
        *flag = true;
        true
    }

    /// Reset bookkeeping for a new activation cycle. The caller resets the
    /// outbound flows themselves.
    pub(crate) fn begin_cycle(&mut self, inbound_ids: Vec<String>, outbound_ids: Vec<String>) {
        self.activated = true;
        self.entered = false;
        self.taken = false;
        self.waiting = false;
        self.started = false;
        self.ended = false;
        self.left = false;
        self.pending_inbound = if inbound_ids.is_empty() { None } else { Some(inbound_ids) };
        self.discarded_inbound.clear();
        self.pending_outbound = Some(outbound_ids);
    }
}
