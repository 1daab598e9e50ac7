//! Join-completion and fork-eligibility rules.
//!
//! The cascade in `process` is shared by every activity kind; the only
//! kind-specific decisions are made here: whether a join is done, and
//! which outbound flows a completed activity takes or discards.

use crate::error::{FlowError, Result};
use crate::runtime::activity::{Activity, ActivityKind};
use crate::runtime::context::Scope;
use crate::runtime::flow::{ActivityIndex, FlowIndex, Resolution};
use crate::runtime::graph::ProcessGraph;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Some inbound flows are still unresolved.
    Waiting,
    /// All inbound resolved, at least one taken.
    Joined,
    /// All inbound resolved as discarded.
    Discarded,
}

/// Width-based join rule shared by parallel and inclusive gateways. Which
/// inbound flows were taken does not matter, only that all have resolved.
pub fn join_outcome(activity: &Activity) -> JoinOutcome {
    if activity.pending_inbound.is_some() {
        JoinOutcome::Waiting
    } else if activity.fully_discarded() {
        JoinOutcome::Discarded
    } else {
        JoinOutcome::Joined
    }
}

/// Decide every outbound flow of an activity that completes with a live
/// token, in declaration order.
pub fn select_outbound(graph: &ProcessGraph, idx: ActivityIndex, scope: &Scope) -> Result<Vec<(FlowIndex, Resolution)>> {
    let activity = graph.activity_at(idx);
    let outbound = &activity.outbound;

    let conditional = match activity.kind {
        ActivityKind::ParallelGateway => false,
        ActivityKind::InclusiveGateway => true,
        _ => outbound.iter().any(|&f| graph.flow_at(f).is_conditional()),
    };

    if !conditional {
        return Ok(outbound.iter().map(|&f| (f, Resolution::Take)).collect());
    }

    let mut decisions = Vec::with_capacity(outbound.len());
    let mut default_flow = None;
    let mut matched = false;

    for &f in outbound {
        let flow = graph.flow_at(f);
        if flow.is_default {
            default_flow = Some(decisions.len());
            decisions.push((f, Resolution::Discard));
            continue;
        }
        if flow.is_eligible(scope) {
            matched = true;
            decisions.push((f, Resolution::Take));
        } else {
            decisions.push((f, Resolution::Discard));
        }
    }

    if !matched && !decisions.is_empty() {
        match default_flow {
            Some(pos) => decisions[pos].1 = Resolution::Take,
            None => {
                return Err(FlowError::NoOutboundPath {
                    activity: activity.id.clone(),
                })
            }
        }
    }

    Ok(decisions)
}

/// Discard fan-out: every outbound flow, in declaration order.
pub fn discard_outbound(activity: &Activity) -> Vec<(FlowIndex, Resolution)> {
    activity.outbound.iter().map(|&f| (f, Resolution::Discard)).collect()
}
