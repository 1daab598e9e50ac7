use std::collections::HashMap;
use serde::{Serialize, Deserialize};
use serde_json::Value;

/// Variable scope of a process instance.
///
/// Conditions are evaluated against it and task handlers read and write it.
/// It is captured verbatim in `ProcessState` so a resumed instance sees the
/// same variables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope {
    variables: HashMap<String, Value>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_variables(variables: HashMap<String, Value>) -> Self {
        Self { variables }
    }

    pub fn get_var(&self, key: &str) -> Option<&Value> {
        self.variables.get(key)
    }

    pub fn set_var(&mut self, key: &str, value: Value) {
        self.variables.insert(key.to_string(), value);
    }

    pub fn remove_var(&mut self, key: &str) -> Option<Value> {
        self.variables.remove(key)
    }

    pub fn vars(&self) -> &HashMap<String, Value> {
        &self.variables
    }

    /// Overlay `other` on top of this scope; keys in `other` win.
    pub fn merge(&mut self, other: HashMap<String, Value>) {
        self.variables.extend(other);
    }
}
