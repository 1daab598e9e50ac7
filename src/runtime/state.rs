use serde::{Serialize, Deserialize};
use crate::runtime::context::Scope;
use crate::runtime::flow::FlowState;

fn is_false(b: &bool) -> bool {
    !*b
}

/// Serializable state of one activity.
///
/// A missing pending set means that phase is already resolved, never that
/// it should be recomputed on resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub id: String,
    pub entered: bool,
    pub taken: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub started: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub waiting: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_inbound: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discarded_inbound: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_outbound: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowSnapshot {
    pub id: String,
    pub state: FlowState,
}

/// Everything needed to rebuild an instance against a fresh graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessState {
    pub id: String,
    pub activated: bool,
    #[serde(default)]
    pub variables: Scope,
    pub activities: Vec<StateSnapshot>,
    /// Flows resolved in their current cycle; pending flows are omitted.
    #[serde(default)]
    pub flows: Vec<FlowSnapshot>,
}

impl ProcessState {
    pub fn activity(&self, id: &str) -> Option<&StateSnapshot> {
        self.activities.iter().find(|a| a.id == id)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
