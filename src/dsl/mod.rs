pub mod builder;

use std::collections::HashMap;
use serde::{Serialize, Deserialize};
use serde_json::Value;

/// 原始 DSL 定义的 Process
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessDefinition {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub variables: HashMap<String, Value>,
    pub activities: Vec<ActivityDefinition>,
    #[serde(default)]
    pub flows: Vec<FlowDefinition>,
}

/// DSL 中的节点类型
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ActivityType {
    StartEvent,
    EndEvent,
    Task {
        handler: String,
        #[serde(default)]
        params: HashMap<String, Value>,
    },
    ParallelGateway,
    InclusiveGateway,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityDefinition {
    pub id: String,
    #[serde(flatten)]
    pub kind: ActivityType,
}

/// DSL 中的边 (sequence flow)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlowDefinition {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default)]
    pub default: bool,
}
