use crate::actions::HandlerRegistry;
use crate::dsl::{ActivityType, ProcessDefinition};
use crate::error::Result;
use crate::runtime::activity::ActivityKind;
use crate::runtime::condition::{ConditionParser, ExpressionParser};
use crate::runtime::context::Scope;
use crate::runtime::graph::ProcessGraph;
use crate::runtime::process::ProcessInstance;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Turns a `ProcessDefinition` into a `ProcessGraph` arena.
///
/// Only identifiers are checked (duplicates, dangling flow endpoints) and
/// condition text is parsed. Structural well-formedness is not validated.
pub struct Compiler {
    parser: Arc<dyn ConditionParser>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        Self {
            parser: Arc::new(ExpressionParser),
        }
    }

    pub fn with_parser(parser: Arc<dyn ConditionParser>) -> Self {
        Self { parser }
    }

    pub fn compile(&self, definition: &ProcessDefinition) -> Result<ProcessGraph> {
        let mut graph = ProcessGraph::new(&definition.id);

        // 1. Pass 1: Activities
        for activity in &definition.activities {
            let kind = match &activity.kind {
                ActivityType::StartEvent => ActivityKind::StartEvent,
                ActivityType::EndEvent => ActivityKind::EndEvent,
                ActivityType::Task { handler, params } => ActivityKind::Task {
                    handler: handler.clone(),
                    params: serde_json::to_value(params).unwrap_or(Value::Null),
                },
                ActivityType::ParallelGateway => ActivityKind::ParallelGateway,
                ActivityType::InclusiveGateway => ActivityKind::InclusiveGateway,
            };
            graph.add_activity(&activity.id, kind)?;
        }

        // 2. Pass 2: Flows, in declaration order
        for flow in &definition.flows {
            let condition = flow
                .condition
                .as_deref()
                .map(|c| self.parser.parse(c))
                .transpose()?;
            graph.add_flow(&flow.id, &flow.source, &flow.target, condition, flow.default)?;
        }

        debug!(process = %definition.id, activities = graph.activities().len(), flows = graph.flows().len(), "Compiled process graph");
        Ok(graph)
    }

    /// Compile and wrap in a fresh instance. `variables` override the
    /// definition's defaults.
    pub fn instantiate(
        &self,
        definition: &ProcessDefinition,
        handlers: Arc<HandlerRegistry>,
        variables: HashMap<String, Value>,
    ) -> Result<ProcessInstance> {
        let graph = self.compile(definition)?;
        let mut scope = Scope::with_variables(definition.variables.clone());
        scope.merge(variables);
        Ok(ProcessInstance::new(graph, scope, handlers))
    }
}
