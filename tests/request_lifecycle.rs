use reqprof::{
    ActionClassifier, CallOutcome, DiagnosticKind, FixedMemory, HookBinding, HookRegistry,
    LifecycleBinder, LifecycleEvent, ManualClock, MemorySink, Payload, ProfilerOptions,
    ProfilingSession, QueryLog, RawQuery, RequestMetadata, Severity, SlowSeverity, TracingSink,
    labels,
};

use std::sync::Arc;
use std::time::Duration;

const AJAX_HOOK: &str = "wp_ajax_form_submit";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn session(clock: &Arc<ManualClock>) -> Arc<ProfilingSession> {
    Arc::new(ProfilingSession::with_sources(
        ProfilerOptions::default(),
        clock.clone(),
        Arc::new(FixedMemory::new(8 * 1024 * 1024)),
    ))
}

#[test]
fn form_submission_flags_gap_and_late_checkpoint() {
    init_tracing();
    let clock = Arc::new(ManualClock::default());
    let sink = Arc::new(MemorySink::new());
    let binder = LifecycleBinder::new(
        session(&clock),
        ActionClassifier::new("form_submit"),
        RequestMetadata::for_action("form_submit"),
        [AJAX_HOOK],
    )
    .with_sink(sink.clone())
    .with_query_source(|| QueryLog::Absent);
    let mut registry = HookRegistry::new();
    binder.bind(&mut registry);

    registry.fire(AJAX_HOOK, &Payload::None);
    clock.advance(Duration::from_millis(100));
    registry.fire("init", &Payload::None);
    clock.advance(Duration::from_millis(50));
    registry.fire(
        "fluentform/validation_errors",
        &Payload::args([serde_json::json!([])]),
    );
    clock.advance(Duration::from_millis(2150));
    registry.fire("fluentform/before_form_actions_processing", &Payload::None);
    clock.advance(Duration::from_millis(50));
    registry.fire("fluentform/after_form_actions_processing", &Payload::None);
    registry.fire("shutdown", &Payload::None);

    let report = binder.report().expect("matching request is reported");
    let timeline: Vec<&str> = report.timeline.iter().map(|t| t.label.as_str()).collect();
    assert_eq!(
        timeline,
        vec![
            labels::SESSION_START,
            labels::OUTPUT_START,
            labels::INIT,
            labels::VALIDATION,
            labels::BEFORE_ACTIONS,
            labels::AFTER_ACTIONS,
            labels::OUTPUT_END,
        ]
    );
    assert_eq!(report.timeline[3].description, "Validation - 0 errors");

    assert_eq!(report.gaps.len(), 1);
    assert_eq!(report.gaps[0].from_label, labels::VALIDATION);
    assert_eq!(report.gaps[0].to_label, labels::BEFORE_ACTIONS);
    assert!((report.gaps[0].gap.as_secs_f64() - 2.15).abs() < 1e-9);

    assert_eq!(report.slow_operations.len(), 1);
    assert_eq!(report.slow_operations[0].label, labels::BEFORE_ACTIONS);
    assert_eq!(report.slow_operations[0].severity, SlowSeverity::VerySlow);

    assert!(report.diagnostic(DiagnosticKind::SlowToLateCheckpoint).is_some());
    assert!(report.diagnostic(DiagnosticKind::SlowAfterCheckpoint).is_none());
    assert!(report.diagnostic(DiagnosticKind::SlowToInit).is_none());
    assert_eq!(
        report.diagnostic(DiagnosticKind::Overall).map(|d| d.severity),
        Some(Severity::Warning)
    );
    assert_eq!(report.header.queue_delay, None);
    assert!(report.to_json().expect("json")["header"].get("queue_delay").is_none());

    assert!(sink.contains("SLOW OPERATIONS"));
    assert!(sink.contains("[warn]   Taking 2.3000s to reach BEFORE_ACTIONS"));
}

#[test]
fn non_matching_request_records_nothing() {
    init_tracing();
    let clock = Arc::new(ManualClock::default());
    let sink = Arc::new(MemorySink::new());
    let binder = LifecycleBinder::new(
        session(&clock),
        ActionClassifier::new("form_submit"),
        RequestMetadata::for_action("heartbeat"),
        [AJAX_HOOK],
    )
    .with_sink(sink.clone());
    let mut registry = HookRegistry::new();
    binder.bind(&mut registry);

    registry.fire(AJAX_HOOK, &Payload::None);
    for event in LifecycleEvent::ALL {
        if let HookBinding::Named(hook) = event.binding() {
            registry.fire(hook, &Payload::None);
        }
    }
    let session = binder.session();
    assert!(session.http_start("https://a.example", "GET").is_none());
    session.record("MANUAL", "");
    registry.fire("shutdown", &Payload::None);

    assert!(session.checkpoints().is_empty());
    assert!(session.finish().is_none());
    assert!(binder.report().is_none());
    assert!(sink.lines().is_empty());
}

#[test]
fn network_completion_may_arrive_on_another_thread() {
    init_tracing();
    let clock = Arc::new(ManualClock::default());
    let session = session(&clock);
    session.activate(RequestMetadata::for_action("form_submit"));

    let token = session
        .http_start("https://hooks.example.com/notify", "post")
        .expect("active session issues tokens");
    clock.advance(Duration::from_millis(700));

    let remote = Arc::clone(&session);
    let remote_token = token.clone();
    std::thread::spawn(move || {
        remote.http_end(&remote_token, CallOutcome::Success { status_code: Some(202) });
    })
    .join()
    .expect("completion thread");
    session.http_end(&token, CallOutcome::error("late duplicate"));
    session.http_end(&"never-issued".into(), CallOutcome::ok());

    session.collect_queries(&QueryLog::Entries(vec![
        RawQuery::new("SELECT 1", Duration::from_millis(600)),
        RawQuery::new("SELECT 2", Duration::from_millis(300)),
    ]));

    let report = session.finish_into(&TracingSink).expect("report");
    assert_eq!(report.network.count, 1);
    assert_eq!(report.network.top[0].status_code, Some(202));
    assert_eq!(report.network.errors, 0);

    let breakdown = report.breakdown.expect("breakdown");
    assert_eq!(breakdown.total, Duration::from_millis(700));
    assert_eq!(breakdown.other, Duration::ZERO);
    assert!(breakdown.queries_percent > 100.0);
}
