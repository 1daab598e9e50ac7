use std::collections::HashMap;
use std::sync::Arc;
use crate::error::{FlowError, Result};
use crate::runtime::activity::{Activity, ActivityKind};
use crate::runtime::condition::Condition;
use crate::runtime::flow::{ActivityIndex, FlowIndex, SequenceFlow};

/// Arena of activities and flows addressed by index, with id lookup.
///
/// Flows hold indices of their endpoints and activities hold indices of
/// their flows, so there is no ownership cycle between the two.
#[derive(Debug, Clone, Default)]
pub struct ProcessGraph {
    pub id: String,
    activities: Vec<Activity>,
    flows: Vec<SequenceFlow>,
    activity_ids: HashMap<String, ActivityIndex>,
    flow_ids: HashMap<String, FlowIndex>,
}

impl ProcessGraph {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Default::default()
        }
    }

    pub fn add_activity(&mut self, id: &str, kind: ActivityKind) -> Result<ActivityIndex> {
        if self.activity_ids.contains_key(id) {
            return Err(FlowError::DuplicateActivity(id.to_string()));
        }
        let idx = self.activities.len();
        self.activities.push(Activity::new(id, kind));
        self.activity_ids.insert(id.to_string(), idx);
        Ok(idx)
    }

    /// Add a flow between two existing activities. Flow order per activity
    /// is the order in which flows are added.
    pub fn add_flow(
        &mut self,
        id: &str,
        source: &str,
        target: &str,
        condition: Option<Arc<dyn Condition>>,
        is_default: bool,
    ) -> Result<FlowIndex> {
        if self.flow_ids.contains_key(id) {
            return Err(FlowError::DuplicateFlow(id.to_string()));
        }
        let src = self.activity_index(source)?;
        let tgt = self.activity_index(target)?;

        let idx = self.flows.len();
        let mut flow = SequenceFlow::new(id, src, tgt);
        flow.condition = condition;
        flow.is_default = is_default;
        self.flows.push(flow);
        self.flow_ids.insert(id.to_string(), idx);

        self.activities[src].outbound.push(idx);
        self.activities[tgt].inbound.push(idx);
        Ok(idx)
    }

    pub fn activity_index(&self, id: &str) -> Result<ActivityIndex> {
        self.activity_ids
            .get(id)
            .copied()
            .ok_or_else(|| FlowError::UnknownActivity(id.to_string()))
    }

    pub fn flow_index(&self, id: &str) -> Result<FlowIndex> {
        self.flow_ids
            .get(id)
            .copied()
            .ok_or_else(|| FlowError::UnknownFlow(id.to_string()))
    }

    pub fn activity(&self, id: &str) -> Option<&Activity> {
        self.activity_ids.get(id).map(|&i| &self.activities[i])
    }

    pub fn flow(&self, id: &str) -> Option<&SequenceFlow> {
        self.flow_ids.get(id).map(|&i| &self.flows[i])
    }

    pub fn activities(&self) -> &[Activity] {
        &self.activities
    }

    pub fn flows(&self) -> &[SequenceFlow] {
        &self.flows
    }

    pub(crate) fn activity_at(&self, idx: ActivityIndex) -> &Activity {
        &self.activities[idx]
    }

    pub(crate) fn activity_at_mut(&mut self, idx: ActivityIndex) -> &mut Activity {
        &mut self.activities[idx]
    }

    pub(crate) fn flow_at(&self, idx: FlowIndex) -> &SequenceFlow {
        &self.flows[idx]
    }

    pub(crate) fn flow_at_mut(&mut self, idx: FlowIndex) -> &mut SequenceFlow {
        &mut self.flows[idx]
    }

    pub(crate) fn flow_ids_of(&self, flows: &[FlowIndex]) -> Vec<String> {
        flows.iter().map(|&f| self.flows[f].id.clone()).collect()
    }

    /// Reset an activity for a new activation cycle, including the state
    /// of its outbound flows.
    pub(crate) fn begin_cycle(&mut self, idx: ActivityIndex) {
        let inbound = self.flow_ids_of(&self.activities[idx].inbound);
        let outbound_idx = self.activities[idx].outbound.clone();
        let outbound = self.flow_ids_of(&outbound_idx);
        for f in outbound_idx {
            self.flows[f].reset();
        }
        self.activities[idx].begin_cycle(inbound, outbound);
    }
}
