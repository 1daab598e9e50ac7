use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use serde_json::Value;
use anyhow::Result;
use crate::runtime::context::Scope;

pub mod builtin;

/// What a task reports back after running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Work is done; the task takes its outbound flows right away.
    Complete,
    /// Suspend until `ProcessInstance::signal` is called for this task.
    Wait,
}

/// 插件接口：所有任务节点必须实现此 Trait
pub trait TaskHandler: Send + Sync + Debug {
    fn name(&self) -> &str;
    fn validate(&self, _params: &Value) -> Result<()> {
        Ok(())
    }
    fn execute(&self, activity_id: &str, params: &Value, scope: &mut Scope) -> Result<TaskOutcome>;
}

/// Task handlers keyed by name.
#[derive(Debug, Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `log`, `assign` and `user` already registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(builtin::LogAction));
        registry.register(Arc::new(builtin::AssignAction));
        registry.register(Arc::new(builtin::UserTask));
        registry
    }

    pub fn register(&mut self, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(handler.name().to_string(), handler);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(name).cloned()
    }
}
