use thiserror::Error;

pub type Result<T> = std::result::Result<T, FlowError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FlowError {
    #[error("unknown activity `{0}`")]
    UnknownActivity(String),

    #[error("unknown sequence flow `{0}`")]
    UnknownFlow(String),

    #[error("duplicate activity id `{0}`")]
    DuplicateActivity(String),

    #[error("duplicate sequence flow id `{0}`")]
    DuplicateFlow(String),

    /// Conditional fan-out found nothing to take and there is no default flow.
    #[error("activity `{activity}` has no eligible outbound flow and no default flow")]
    NoOutboundPath { activity: String },

    /// A snapshot no longer matches the graph it is resumed against.
    #[error("cannot resume `{activity}`: {reason}")]
    Reconstruction { activity: String, reason: String },

    #[error("no task handler registered under `{0}`")]
    UnknownHandler(String),

    #[error("task `{activity}` failed: {reason}")]
    TaskFailed { activity: String, reason: String },

    #[error("activity `{0}` is not waiting for a signal")]
    NotWaiting(String),

    #[error("invalid condition `{expression}`: {reason}")]
    InvalidCondition { expression: String, reason: String },
}
