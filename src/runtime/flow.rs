use std::sync::Arc;
use serde::{Serialize, Deserialize};
use crate::runtime::condition::Condition;
use crate::runtime::context::Scope;

pub type ActivityIndex = usize;
pub type FlowIndex = usize;

/// Resolution state of a flow within the current activation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowState {
    #[default]
    Pending,
    Taken,
    Discarded,
}

/// What a source activity decided for one of its outbound flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Take,
    Discard,
}

impl Resolution {
    pub fn state(self) -> FlowState {
        match self {
            Resolution::Take => FlowState::Taken,
            Resolution::Discard => FlowState::Discarded,
        }
    }
}

/// Directed edge of the process graph.
///
/// Source and target are arena indices; the flow owns neither activity.
#[derive(Debug, Clone)]
pub struct SequenceFlow {
    pub id: String,
    pub source: ActivityIndex,
    pub target: ActivityIndex,
    pub condition: Option<Arc<dyn Condition>>,
    pub is_default: bool,
    state: FlowState,
    cycle: u32,
}

impl SequenceFlow {
    pub fn new(id: &str, source: ActivityIndex, target: ActivityIndex) -> Self {
        Self {
            id: id.to_string(),
            source,
            target,
            condition: None,
            is_default: false,
            state: FlowState::Pending,
            cycle: 0,
        }
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    pub fn is_resolved(&self) -> bool {
        self.state != FlowState::Pending
    }

    /// Number of activation cycles this flow has been reset for.
    pub fn cycle(&self) -> u32 {
        self.cycle
    }

    pub fn is_conditional(&self) -> bool {
        self.condition.is_some() || self.is_default
    }

    /// Record a resolution. Returns `false` when the flow was already
    /// resolved in this cycle; the caller must then not propagate.
    pub(crate) fn resolve(&mut self, resolution: Resolution) -> bool {
        if self.is_resolved() {
            return false;
        }
        self.state = resolution.state();
        true
    }

    /// Start a new activation cycle.
    pub(crate) fn reset(&mut self) {
        if self.is_resolved() {
            self.cycle += 1;
        }
        self.state = FlowState::Pending;
    }

    pub(crate) fn restore(&mut self, state: FlowState) {
        self.state = state;
    }

    /// Eligibility of a non-default flow: unconditioned flows always are,
    /// conditioned flows when their condition holds.
    pub fn is_eligible(&self, scope: &Scope) -> bool {
        match &self.condition {
            Some(cond) => cond.evaluate(scope),
            None => !self.is_default,
        }
    }
}
