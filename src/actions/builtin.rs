use serde_json::Value;
use crate::actions::{TaskHandler, TaskOutcome};
use crate::runtime::condition::{eval_context, from_eval_value};
use crate::runtime::context::Scope;
use anyhow::{Result, anyhow};
use std::fmt::Debug;
use evalexpr::{build_operator_tree, DefaultNumericTypes};
use tracing::info;

#[derive(Debug)]
pub struct LogAction;

impl TaskHandler for LogAction {
    fn name(&self) -> &str {
        "log"
    }

    fn execute(&self, activity_id: &str, params: &Value, _scope: &mut Scope) -> Result<TaskOutcome> {
        if let Some(msg) = params.get("msg").and_then(|v| v.as_str()) {
            info!(activity = activity_id, "[LOG] {}", msg);
        } else {
            info!(activity = activity_id, "[LOG] {:?}", params);
        }
        Ok(TaskOutcome::Complete)
    }
}

/// Writes into the scope.
///
/// Params: `output` names the target variable, `value` is a literal and
/// `expression` an `evalexpr` expression over the current scope. When both
/// are given the expression wins.
#[derive(Debug)]
pub struct AssignAction;

impl TaskHandler for AssignAction {
    fn name(&self) -> &str {
        "assign"
    }

    fn validate(&self, params: &Value) -> Result<()> {
        if params.get("output").and_then(|v| v.as_str()).is_none() {
            return Err(anyhow!("assign requires an `output` param"));
        }
        Ok(())
    }

    fn execute(&self, activity_id: &str, params: &Value, scope: &mut Scope) -> Result<TaskOutcome> {
        self.validate(params)?;
        let output = params.get("output").and_then(|v| v.as_str()).unwrap_or_default();

        let value = if let Some(expr) = params.get("expression").and_then(|v| v.as_str()) {
            let tree = build_operator_tree::<DefaultNumericTypes>(expr)
                .map_err(|e| anyhow!("invalid expression `{}`: {}", expr, e))?;
            let result = tree
                .eval_with_context(&eval_context(scope))
                .map_err(|e| anyhow!("expression `{}` failed: {}", expr, e))?;
            from_eval_value(result).ok_or_else(|| anyhow!("expression `{}` produced no assignable value", expr))?
        } else {
            params.get("value").cloned().unwrap_or(Value::Null)
        };

        info!(activity = activity_id, variable = output, "Assigning {}", value);
        scope.set_var(output, value);
        Ok(TaskOutcome::Complete)
    }
}

/// Stand-in for human work: always suspends until signalled.
#[derive(Debug)]
pub struct UserTask;

impl TaskHandler for UserTask {
    fn name(&self) -> &str {
        "user"
    }

    fn execute(&self, activity_id: &str, _params: &Value, _scope: &mut Scope) -> Result<TaskOutcome> {
        info!(activity = activity_id, "Waiting for signal");
        Ok(TaskOutcome::Wait)
    }
}
