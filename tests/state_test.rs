use tokenflow::actions::HandlerRegistry;
use tokenflow::compiler::core::Compiler;
use tokenflow::dsl::builder::ProcessBuilder;
use tokenflow::dsl::ProcessDefinition;
use tokenflow::runtime::flow::FlowState;
use tokenflow::runtime::state::FlowSnapshot;
use tokenflow::{EventKind, EventLog, FlowError, ProcessInstance, ProcessState, StateSnapshot};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

fn instantiate(definition: &ProcessDefinition) -> (ProcessInstance, Arc<EventLog>) {
    let mut instance = Compiler::new()
        .instantiate(definition, Arc::new(HandlerRegistry::with_builtins()), HashMap::new())
        .expect("Compilation failed");
    let log = Arc::new(EventLog::new());
    instance.subscribe(log.clone());
    (instance, log)
}

/// start -> fork -> (review: user task, audit: user task) -> join -> end
fn review_process() -> ProcessDefinition {
    ProcessBuilder::new("review")
        .var("approved", false)
        .start("start")
        .parallel("fork")
        .user_task("review")
        .user_task("audit")
        .parallel("join")
        .end("end")
        .flow("f1", "start", "fork")
        .flow("f2", "fork", "review")
        .flow("f3", "fork", "audit")
        .flow("f4", "review", "join")
        .flow("f5", "audit", "join")
        .flow("f6", "join", "end")
        .build()
}

fn round_trip(state: &ProcessState) -> ProcessState {
    let json = state.to_json().expect("serialize");
    ProcessState::from_json(&json).expect("deserialize")
}

#[test]
fn test_snapshot_json_shape() {
    let (mut instance, _log) = instantiate(&review_process());
    instance.run().expect("run failed");
    instance.signal("review").expect("signal failed");

    let join = serde_json::to_value(instance.activity_state("join").expect("join")).expect("json");
    assert_eq!(
        join,
        json!({
            "id": "join",
            "entered": true,
            "taken": false,
            "started": true,
            "pendingInbound": ["f5"],
            "pendingOutbound": ["f6"]
        })
    );

    let audit = serde_json::to_value(instance.activity_state("audit").expect("audit")).expect("json");
    assert_eq!(
        audit,
        json!({
            "id": "audit",
            "entered": true,
            "taken": false,
            "started": true,
            "waiting": true,
            "pendingOutbound": ["f5"]
        })
    );

    let review = serde_json::to_value(instance.activity_state("review").expect("review")).expect("json");
    assert_eq!(
        review,
        json!({ "id": "review", "entered": true, "taken": true, "started": true })
    );
}

#[test]
fn test_state_captures_variables_and_flows() {
    let (mut instance, _log) = instantiate(&review_process());
    instance.run().expect("run failed");
    instance.set_variable("approved", json!(true));

    let state = instance.get_state();

    assert_eq!(state.id, "review");
    assert!(state.activated);
    assert_eq!(state.variables.get_var("approved"), Some(&json!(true)));
    assert_eq!(state.activities.len(), 6);
    assert_eq!(
        state.flows,
        vec![
            FlowSnapshot { id: "f1".to_string(), state: FlowState::Taken },
            FlowSnapshot { id: "f2".to_string(), state: FlowState::Taken },
            FlowSnapshot { id: "f3".to_string(), state: FlowState::Taken },
        ]
    );
    assert!(state.activity("start").is_some_and(|s| s.taken));
}

#[test]
fn test_waiting_task_survives_resume() {
    let (mut original, _log) = instantiate(&review_process());
    original.run().expect("run failed");
    let state = round_trip(&original.get_state());

    let (mut resumed, log) = instantiate(&review_process());
    resumed.resume(&state).expect("resume failed");

    assert_eq!(resumed.waiting_activities(), vec!["review", "audit"]);
    assert!(log.events().is_empty(), "resume must not emit events");

    resumed.signal("audit").expect("signal failed");
    assert_eq!(log.count(EventKind::Start, "join"), 1);
    assert_eq!(log.count(EventKind::End, "join"), 0);

    resumed.signal("review").expect("signal failed");
    assert_eq!(log.count(EventKind::End, "join"), 1);
    assert_eq!(log.count(EventKind::End, "end"), 1);
    assert!(resumed.waiting_activities().is_empty());
}

#[test]
fn test_resume_does_not_repeat_delivered_events() {
    let (mut original, _log) = instantiate(&review_process());
    original.run().expect("run failed");
    original.signal("review").expect("signal failed");
    let state = round_trip(&original.get_state());

    let (mut resumed, log) = instantiate(&review_process());
    resumed.resume(&state).expect("resume failed");
    resumed.signal("audit").expect("signal failed");

    // `join` already announced its start before the capture
    assert_eq!(log.count(EventKind::Start, "join"), 0);
    assert_eq!(log.count(EventKind::End, "join"), 1);
    assert_eq!(log.count(EventKind::Leave, "join"), 1);
    assert_eq!(log.count(EventKind::Start, "audit"), 0);
    assert_eq!(log.count(EventKind::End, "audit"), 1);
}

#[test]
fn test_resume_twice_is_idempotent() {
    let (mut original, _log) = instantiate(&review_process());
    original.run().expect("run failed");
    original.signal("audit").expect("signal failed");
    let state = round_trip(&original.get_state());

    let (mut resumed, _log) = instantiate(&review_process());
    resumed.resume(&state).expect("first resume failed");
    let first = resumed.get_state();
    resumed.resume(&state).expect("second resume failed");

    assert_eq!(first, resumed.get_state());
    assert_eq!(resumed.get_state(), state);
}

#[test]
fn test_resume_rejects_unknown_identifiers() {
    let (mut original, _log) = instantiate(&review_process());
    original.run().expect("run failed");
    let state = original.get_state();

    let (mut resumed, _log) = instantiate(&review_process());

    let mut foreign = state.clone();
    foreign.id = "other-process".to_string();
    assert!(matches!(resumed.resume(&foreign), Err(FlowError::Reconstruction { .. })));

    let mut ghost_activity = state.clone();
    ghost_activity.activities[0].id = "ghost".to_string();
    match resumed.resume(&ghost_activity) {
        Err(FlowError::Reconstruction { activity, .. }) => assert_eq!(activity, "ghost"),
        other => panic!("unexpected result: {:?}", other),
    }

    let mut ghost_flow = state.clone();
    ghost_flow.flows.push(FlowSnapshot { id: "f99".to_string(), state: FlowState::Taken });
    assert!(matches!(resumed.resume(&ghost_flow), Err(FlowError::Reconstruction { .. })));

    let mut wrong_side = state.clone();
    let join = wrong_side
        .activities
        .iter_mut()
        .find(|a| a.id == "join")
        .expect("join snapshot");
    join.pending_inbound = Some(vec!["f6".to_string()]);
    assert!(matches!(resumed.resume(&wrong_side), Err(FlowError::Reconstruction { .. })));

    // Nothing was applied by the failed attempts
    assert!(!resumed.is_activated());
    assert!(resumed.waiting_activities().is_empty());
}

#[test]
fn test_resume_single_activity() {
    let (mut instance, log) = instantiate(&review_process());
    instance.activate();

    let snapshot = StateSnapshot {
        id: "join".to_string(),
        entered: true,
        taken: false,
        started: true,
        waiting: false,
        pending_inbound: Some(vec!["f5".to_string()]),
        discarded_inbound: Some(vec!["f4".to_string()]),
        pending_outbound: Some(vec!["f6".to_string()]),
    };
    instance.resume_activity(&snapshot).expect("resume failed");
    assert_eq!(instance.activity_state("join").expect("join"), snapshot);

    instance.take("f5").expect("take failed");

    assert_eq!(log.count(EventKind::Start, "join"), 0);
    assert_eq!(log.count(EventKind::End, "join"), 1);
    assert_eq!(log.count(EventKind::End, "end"), 1);

    let unknown = StateSnapshot { id: "nowhere".to_string(), ..snapshot };
    assert!(matches!(instance.resume_activity(&unknown), Err(FlowError::Reconstruction { .. })));
}

#[test]
fn test_resume_of_unactivated_state() {
    let (fresh, _log) = instantiate(&review_process());
    let state = round_trip(&fresh.get_state());
    assert!(!state.activated);

    let (mut resumed, log) = instantiate(&review_process());
    resumed.resume(&state).expect("resume failed");
    assert!(!resumed.is_activated());

    resumed.run().expect("run failed");
    assert_eq!(resumed.waiting_activities(), vec!["review", "audit"]);
    assert_eq!(log.count(EventKind::Taken, "f1"), 1);
}

#[test]
fn test_missing_optional_fields_default() {
    let json = r#"{
        "id": "review",
        "activated": true,
        "activities": [
            {
                "id": "join",
                "entered": true,
                "taken": false,
                "pendingInbound": ["f5", "f4"],
                "pendingOutbound": ["f6"]
            }
        ]
    }"#;
    let state = ProcessState::from_json(json).expect("deserialize");
    assert!(state.flows.is_empty());
    assert!(state.variables.vars().is_empty());

    let (mut instance, log) = instantiate(&review_process());
    instance.resume(&state).expect("resume failed");

    // Pending sets come back in declaration order
    assert_eq!(
        instance.activity("join").and_then(|a| a.pending_inbound()),
        Some(&["f4".to_string(), "f5".to_string()][..])
    );

    instance.take("f4").expect("take failed");
    instance.take("f5").expect("take failed");
    // Already entered before the capture
    assert_eq!(log.count(EventKind::Start, "join"), 0);
    assert_eq!(log.count(EventKind::End, "join"), 1);
}

#[test]
fn test_entered_join_without_started_flag_does_not_restart() {
    // Minimal snapshot: no `started`, join already entered through f4
    let json = r#"{
        "id": "review",
        "activated": true,
        "activities": [
            {
                "id": "join",
                "entered": true,
                "taken": false,
                "pendingInbound": ["f5"],
                "pendingOutbound": ["f6"]
            }
        ],
        "flows": [{ "id": "f4", "state": "taken" }]
    }"#;
    let state = ProcessState::from_json(json).expect("deserialize");

    let (mut instance, log) = instantiate(&review_process());
    instance.resume(&state).expect("resume failed");
    assert!(instance.activity_state("join").expect("join").started);

    instance.take("f5").expect("take failed");

    assert_eq!(log.count(EventKind::Start, "join"), 0);
    assert_eq!(log.count(EventKind::End, "join"), 1);
    assert_eq!(log.count(EventKind::Leave, "join"), 1);
}
