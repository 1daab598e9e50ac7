use crate::dsl::{ProcessDefinition, ActivityDefinition, ActivityType, FlowDefinition};
use std::collections::HashMap;
use serde_json::Value;

pub struct ProcessBuilder {
    id: String,
    name: String,
    variables: HashMap<String, Value>,
    pub activities: Vec<ActivityDefinition>, // public so tests can tweak a definition in place
    flows: Vec<FlowDefinition>,
}

impl ProcessBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            variables: HashMap::new(),
            activities: Vec::new(),
            flows: Vec::new(),
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn var(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.variables.insert(key.to_string(), value.into());
        self
    }

    fn activity(mut self, id: &str, kind: ActivityType) -> Self {
        self.activities.push(ActivityDefinition {
            id: id.to_string(),
            kind,
        });
        self
    }

    pub fn start(self, id: &str) -> Self {
        self.activity(id, ActivityType::StartEvent)
    }

    pub fn end(self, id: &str) -> Self {
        self.activity(id, ActivityType::EndEvent)
    }

    pub fn parallel(self, id: &str) -> Self {
        self.activity(id, ActivityType::ParallelGateway)
    }

    pub fn inclusive(self, id: &str) -> Self {
        self.activity(id, ActivityType::InclusiveGateway)
    }

    pub fn task(self, id: &str, handler: &str) -> TaskBuilder {
        TaskBuilder {
            process_builder: self,
            id: id.to_string(),
            handler: handler.to_string(),
            params: HashMap::new(),
        }
    }

    /// Shorthand for a task using the built-in `user` handler.
    pub fn user_task(self, id: &str) -> Self {
        self.task(id, "user").build()
    }

    fn push_flow(mut self, id: &str, source: &str, target: &str, condition: Option<&str>, default: bool) -> Self {
        self.flows.push(FlowDefinition {
            id: id.to_string(),
            source: source.to_string(),
            target: target.to_string(),
            condition: condition.map(|c| c.to_string()),
            default,
        });
        self
    }

    pub fn flow(self, id: &str, source: &str, target: &str) -> Self {
        self.push_flow(id, source, target, None, false)
    }

    pub fn conditional_flow(self, id: &str, source: &str, target: &str, condition: &str) -> Self {
        self.push_flow(id, source, target, Some(condition), false)
    }

    pub fn default_flow(self, id: &str, source: &str, target: &str) -> Self {
        self.push_flow(id, source, target, None, true)
    }

    pub fn build(self) -> ProcessDefinition {
        ProcessDefinition {
            id: self.id,
            name: self.name,
            variables: self.variables,
            activities: self.activities,
            flows: self.flows,
        }
    }
}

pub struct TaskBuilder {
    process_builder: ProcessBuilder,
    id: String,
    handler: String,
    params: HashMap<String, Value>,
}

impl TaskBuilder {
    pub fn param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn build(self) -> ProcessBuilder {
        let TaskBuilder { process_builder, id, handler, params } = self;
        process_builder.activity(&id, ActivityType::Task { handler, params })
    }
}
