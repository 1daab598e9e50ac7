use tokenflow::actions::HandlerRegistry;
use tokenflow::compiler::core::Compiler;
use tokenflow::dsl::builder::ProcessBuilder;
use tokenflow::dsl::ProcessDefinition;
use tokenflow::runtime::activity::ActivityKind;
use tokenflow::runtime::condition::Predicate;
use tokenflow::runtime::context::Scope;
use tokenflow::runtime::flow::FlowState;
use tokenflow::runtime::graph::ProcessGraph;
use tokenflow::{Event, EventKind, EventLog, FlowError, ProcessInstance};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

fn instantiate(definition: &ProcessDefinition) -> (ProcessInstance, Arc<EventLog>) {
    let mut instance = Compiler::new()
        .instantiate(definition, Arc::new(HandlerRegistry::with_builtins()), HashMap::new())
        .expect("Compilation failed");
    let log = Arc::new(EventLog::new());
    instance.subscribe(log.clone());
    (instance, log)
}

fn linear_process() -> ProcessDefinition {
    ProcessBuilder::new("linear")
        .start("start")
        .task("work", "log").param("msg", "working").build()
        .end("end")
        .flow("f1", "start", "work")
        .flow("f2", "work", "end")
        .build()
}

#[test]
fn test_take_delivers_token_downstream() {
    let (mut instance, log) = instantiate(&linear_process());

    instance.run().expect("run failed");

    assert_eq!(log.ids(EventKind::Taken), vec!["f1", "f2"]);
    for id in ["start", "work", "end"] {
        assert_eq!(log.count(EventKind::Start, id), 1, "{} start", id);
        assert_eq!(log.count(EventKind::End, id), 1, "{} end", id);
        assert_eq!(log.count(EventKind::Leave, id), 1, "{} leave", id);
        assert!(instance.activity(id).expect("activity").is_taken());
    }
}

#[test]
fn test_activity_events_fire_in_order() {
    let (mut instance, log) = instantiate(&linear_process());

    instance.run().expect("run failed");

    let work: Vec<EventKind> = log
        .events()
        .into_iter()
        .filter(|e| e.element_id == "work")
        .map(|e| e.kind)
        .collect();
    assert_eq!(work, vec![EventKind::Start, EventKind::End, EventKind::Leave]);
}

#[test]
fn test_discard_cascades_through_tasks() {
    let (mut instance, log) = instantiate(&linear_process());
    instance.activate();

    instance.discard("f1").expect("discard failed");

    assert_eq!(log.ids(EventKind::Discarded), vec!["f1", "f2"]);
    assert_eq!(log.count(EventKind::Start, "work"), 0);
    assert_eq!(log.count(EventKind::End, "work"), 0);
    assert_eq!(log.count(EventKind::Leave, "work"), 1);
    assert_eq!(log.count(EventKind::Leave, "end"), 1);
    assert!(!instance.activity("work").expect("work").is_taken());
    assert_eq!(instance.flow("f2").map(|f| f.state()), Some(FlowState::Discarded));
}

#[test]
fn test_resolving_twice_is_ignored() {
    let (mut instance, log) = instantiate(&linear_process());
    instance.activate();

    instance.discard("f2").expect("discard failed");
    instance.take("f2").expect("second resolution must be ignored");
    instance.discard("f2").expect("second resolution must be ignored");

    assert_eq!(instance.flow("f2").map(|f| f.state()), Some(FlowState::Discarded));
    assert_eq!(log.count(EventKind::Discarded, "f2"), 1);
    assert_eq!(log.count(EventKind::Taken, "f2"), 0);
    assert_eq!(log.count(EventKind::Start, "end"), 0);
}

#[test]
fn test_unknown_ids_are_reported() {
    let (mut instance, _log) = instantiate(&linear_process());

    assert_eq!(instance.take("nope"), Err(FlowError::UnknownFlow("nope".to_string())));
    assert_eq!(instance.discard("nope"), Err(FlowError::UnknownFlow("nope".to_string())));
    assert_eq!(instance.run_activity("ghost"), Err(FlowError::UnknownActivity("ghost".to_string())));
    assert!(matches!(instance.activity_state("ghost"), Err(FlowError::UnknownActivity(_))));
}

#[test]
fn test_loop_runs_activity_once_per_token() {
    let definition = ProcessBuilder::new("loop")
        .var("count", 0)
        .start("start")
        .task("work", "assign")
            .param("output", "count")
            .param("expression", "count + 1")
            .build()
        .inclusive("check")
        .end("end")
        .flow("f1", "start", "work")
        .flow("f2", "work", "check")
        .conditional_flow("f3", "check", "work", "count < 3")
        .default_flow("f4", "check", "end")
        .build();
    let (mut instance, log) = instantiate(&definition);

    instance.run().expect("run failed");

    assert_eq!(instance.variable("count"), Some(&json!(3)));
    assert_eq!(log.count(EventKind::Start, "work"), 3);
    assert_eq!(log.count(EventKind::End, "work"), 3);
    assert_eq!(log.count(EventKind::End, "check"), 3);
    assert_eq!(log.count(EventKind::Taken, "f3"), 2);
    assert_eq!(log.count(EventKind::End, "end"), 1);
    assert_eq!(instance.flow("f4").map(|f| f.state()), Some(FlowState::Taken));
    // Each new cycle of `work` resets its outbound flow
    assert_eq!(instance.flow("f2").map(|f| f.cycle()), Some(2));
}

#[test]
fn test_task_conditions_select_outbound() {
    let definition = ProcessBuilder::new("exclusive-ish")
        .var("amount", 500)
        .start("start")
        .task("review", "log").build()
        .end("approve")
        .end("escalate")
        .flow("f1", "start", "review")
        .conditional_flow("f2", "review", "escalate", "amount > 100")
        .default_flow("f3", "review", "approve")
        .build();
    let (mut instance, log) = instantiate(&definition);

    instance.run().expect("run failed");

    assert_eq!(log.count(EventKind::End, "escalate"), 1);
    assert_eq!(log.count(EventKind::End, "approve"), 0);
    assert_eq!(log.count(EventKind::Discarded, "f3"), 1);
}

#[test]
fn test_user_task_waits_for_signal() {
    let definition = ProcessBuilder::new("approval")
        .start("start")
        .user_task("approve")
        .end("end")
        .flow("f1", "start", "approve")
        .flow("f2", "approve", "end")
        .build();
    let (mut instance, log) = instantiate(&definition);

    instance.run().expect("run failed");

    assert_eq!(instance.waiting_activities(), vec!["approve"]);
    assert_eq!(log.count(EventKind::Wait, "approve"), 1);
    assert_eq!(log.count(EventKind::End, "approve"), 0);
    assert_eq!(instance.flow("f2").map(|f| f.state()), Some(FlowState::Pending));

    instance.signal("approve").expect("signal failed");

    assert!(instance.waiting_activities().is_empty());
    assert_eq!(log.count(EventKind::End, "approve"), 1);
    assert_eq!(log.count(EventKind::End, "end"), 1);

    assert_eq!(instance.signal("approve"), Err(FlowError::NotWaiting("approve".to_string())));
}

#[test]
fn test_failing_task_emits_error() {
    let definition = ProcessBuilder::new("broken")
        .start("start")
        .task("assign", "assign").param("value", 1).build()
        .end("end")
        .flow("f1", "start", "assign")
        .flow("f2", "assign", "end")
        .build();
    let (mut instance, log) = instantiate(&definition);

    let err = instance.run().expect_err("missing output should fail");

    match err {
        FlowError::TaskFailed { activity, reason } => {
            assert_eq!(activity, "assign");
            assert!(reason.contains("output"), "unexpected reason: {}", reason);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(log.count(EventKind::Error, "assign"), 1);
    assert_eq!(log.count(EventKind::End, "assign"), 0);
    assert_eq!(instance.flow("f2").map(|f| f.state()), Some(FlowState::Pending));
}

#[test]
fn test_unknown_handler_is_reported_at_run() {
    let definition = ProcessBuilder::new("unknown-handler")
        .start("start")
        .task("mystery", "does-not-exist").build()
        .flow("f1", "start", "mystery")
        .build();
    let (mut instance, log) = instantiate(&definition);

    let err = instance.run().expect_err("unknown handler should fail");

    assert_eq!(err, FlowError::UnknownHandler("does-not-exist".to_string()));
    assert_eq!(log.count(EventKind::Error, "mystery"), 1);
}

#[test]
fn test_graph_built_by_hand_with_predicate() {
    let mut graph = ProcessGraph::new("manual");
    graph.add_activity("fork", ActivityKind::InclusiveGateway).expect("fork");
    graph.add_activity("yes", ActivityKind::EndEvent).expect("yes");
    graph.add_activity("no", ActivityKind::EndEvent).expect("no");
    let flag = Predicate::new("flag is set", |scope: &Scope| {
        scope.get_var("flag").and_then(|v| v.as_bool()).unwrap_or(false)
    });
    graph.add_flow("to-yes", "fork", "yes", Some(Arc::new(flag)), false).expect("to-yes");
    graph.add_flow("to-no", "fork", "no", None, true).expect("to-no");

    let mut scope = Scope::new();
    scope.set_var("flag", json!(true));
    let mut instance = ProcessInstance::new(graph, scope, Arc::new(HandlerRegistry::new()));

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    instance.subscribe(Arc::new(move |event: &Event| {
        sink.lock().expect("lock").push(event.clone());
    }));

    instance.run().expect("run failed");

    let seen = seen.lock().expect("lock");
    assert!(seen.contains(&Event::new(EventKind::Taken, "to-yes")));
    assert!(seen.contains(&Event::new(EventKind::Discarded, "to-no")));
    assert!(seen.contains(&Event::new(EventKind::End, "yes")));
}

#[test]
fn test_task_failure_is_local_to_its_branch() {
    let definition = ProcessBuilder::new("fork-failure")
        .start("start")
        .parallel("fork")
        .task("broken", "assign").param("value", 1).build()
        .task("healthy", "log").param("msg", "still running").build()
        .end("end-broken")
        .end("end-healthy")
        .flow("f1", "start", "fork")
        .flow("f2", "fork", "broken")
        .flow("f3", "fork", "healthy")
        .flow("f4", "broken", "end-broken")
        .flow("f5", "healthy", "end-healthy")
        .build();
    let (mut instance, log) = instantiate(&definition);

    let err = instance.run().expect_err("broken task should fail");

    assert!(matches!(err, FlowError::TaskFailed { ref activity, .. } if activity == "broken"));
    assert_eq!(log.count(EventKind::Error, "broken"), 1);
    assert_eq!(instance.flow("f4").map(|f| f.state()), Some(FlowState::Pending));

    assert_eq!(log.count(EventKind::End, "healthy"), 1);
    assert_eq!(log.count(EventKind::End, "end-healthy"), 1);
    assert_eq!(log.count(EventKind::End, "fork"), 1);
    assert_eq!(log.count(EventKind::End, "start"), 1);
}

#[test]
fn test_failure_during_loop_still_replays_deferred_tokens() {
    // `check` loops back into `work` while `work` is still resolving its
    // outbound flow, and in the same pass `broken` fails
    let definition = ProcessBuilder::new("loop-failure")
        .var("count", 0)
        .start("start")
        .task("work", "assign")
            .param("output", "count")
            .param("expression", "count + 1")
            .build()
        .inclusive("check")
        .task("broken", "assign").param("value", 1).build()
        .flow("f1", "start", "work")
        .flow("f2", "work", "check")
        .conditional_flow("f3", "check", "work", "count < 2")
        .flow("f4", "check", "broken")
        .build();
    let (mut instance, log) = instantiate(&definition);

    let err = instance.run().expect_err("broken task should fail");

    assert!(matches!(err, FlowError::TaskFailed { ref activity, .. } if activity == "broken"));
    // The deferred loop-back token was still delivered
    assert_eq!(instance.variable("count"), Some(&json!(2)));
    assert_eq!(log.count(EventKind::End, "work"), 2);
    assert_eq!(log.count(EventKind::End, "check"), 2);
    assert_eq!(log.count(EventKind::Error, "broken"), 1);
    assert!(instance.activity("work").expect("work").is_complete());
}

#[test]
fn test_failing_root_does_not_block_other_roots() {
    let definition = ProcessBuilder::new("two-roots")
        .start("first")
        .start("second")
        .task("broken", "does-not-exist").build()
        .end("end")
        .flow("f1", "first", "broken")
        .flow("f2", "second", "end")
        .build();
    let (mut instance, log) = instantiate(&definition);

    let err = instance.run().expect_err("unknown handler should fail");

    assert_eq!(err, FlowError::UnknownHandler("does-not-exist".to_string()));
    assert_eq!(log.count(EventKind::End, "first"), 1);
    assert_eq!(log.count(EventKind::End, "end"), 1);
}
