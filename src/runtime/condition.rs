use std::fmt::{self, Debug};
use std::sync::Arc;
use evalexpr::{build_operator_tree, ContextWithMutableVariables, DefaultNumericTypes, HashMapContext, Node as EvalNode};
use serde_json::Value;
use tracing::warn;
use crate::error::{FlowError, Result};
use crate::runtime::context::Scope;

/// Guard on a sequence flow. The runtime only ever asks whether it holds.
pub trait Condition: Send + Sync + Debug {
    fn evaluate(&self, scope: &Scope) -> bool;
}

/// Closure-backed condition, for callers that bring their own predicate.
#[derive(Clone)]
pub struct Predicate {
    label: String,
    func: Arc<dyn Fn(&Scope) -> bool + Send + Sync>,
}

impl Predicate {
    pub fn new(label: &str, func: impl Fn(&Scope) -> bool + Send + Sync + 'static) -> Self {
        Self {
            label: label.to_string(),
            func: Arc::new(func),
        }
    }
}

impl Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Predicate").field(&self.label).finish()
    }
}

impl Condition for Predicate {
    fn evaluate(&self, scope: &Scope) -> bool {
        (self.func)(scope)
    }
}

/// Pre-compiled `evalexpr` expression such as `input <= 50`.
#[derive(Debug)]
pub struct Expression {
    raw: String,
    tree: EvalNode<DefaultNumericTypes>,
}

impl Expression {
    pub fn compile(source: &str) -> Result<Self> {
        // `${x}` placeholders are accepted for compatibility with task params
        let raw = strip_placeholders(source);
        let tree = build_operator_tree::<DefaultNumericTypes>(&raw).map_err(|e| FlowError::InvalidCondition {
            expression: source.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { raw, tree })
    }

    pub fn source(&self) -> &str {
        &self.raw
    }
}

impl Condition for Expression {
    fn evaluate(&self, scope: &Scope) -> bool {
        let ctx = eval_context(scope);
        self.tree.eval_boolean_with_context(&ctx).unwrap_or_else(|e| {
            warn!(expression = %self.raw, error = %e, "Condition evaluation failed, treating as false");
            false
        })
    }
}

/// Replace each `${name}` placeholder with `name`. Braces outside a
/// placeholder, e.g. inside string literals, are kept.
fn strip_placeholders(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let inner = &rest[start + 2..];
        match inner.find('}') {
            Some(end) => {
                out.push_str(&inner[..end]);
                rest = &inner[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Turns condition source text into a `Condition`.
pub trait ConditionParser: Send + Sync {
    fn parse(&self, source: &str) -> Result<Arc<dyn Condition>>;
}

#[derive(Debug, Default)]
pub struct ExpressionParser;

impl ConditionParser for ExpressionParser {
    fn parse(&self, source: &str) -> Result<Arc<dyn Condition>> {
        Ok(Arc::new(Expression::compile(source)?))
    }
}

/// Build an `evalexpr` context from the scalar variables of a scope.
/// Arrays, objects and nulls are not visible to expressions.
pub fn eval_context(scope: &Scope) -> HashMapContext<DefaultNumericTypes> {
    let mut ctx = HashMapContext::<DefaultNumericTypes>::new();
    for (k, v) in scope.vars() {
        if let Some(ev) = to_eval_value(v) {
            if let Err(e) = ctx.set_value(k.clone(), ev) {
                warn!(variable = %k, error = %e, "Variable not visible to expressions");
            }
        }
    }
    ctx
}

pub fn to_eval_value(v: &Value) -> Option<evalexpr::Value<DefaultNumericTypes>> {
    match v {
        Value::String(s) => Some(evalexpr::Value::String(s.clone())),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() { Some(evalexpr::Value::Int(i)) }
            else { n.as_f64().map(evalexpr::Value::Float) }
        }
        Value::Bool(b) => Some(evalexpr::Value::Boolean(*b)),
        _ => None,
    }
}

pub fn from_eval_value(v: evalexpr::Value<DefaultNumericTypes>) -> Option<Value> {
    match v {
        evalexpr::Value::String(s) => Some(Value::String(s)),
        evalexpr::Value::Int(i) => Some(Value::from(i)),
        evalexpr::Value::Float(f) => serde_json::Number::from_f64(f).map(Value::Number),
        evalexpr::Value::Boolean(b) => Some(Value::Bool(b)),
        _ => None,
    }
}
