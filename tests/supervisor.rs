use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use stackvisor::{
    CauseToken, Event, EventKind, EventListener, Launch, Launcher, LogRecord, RuntimeError, Scope,
    Subscribe, SubsystemFn, SubsystemRef, Supervisor, SupervisorConfig, SupervisorState,
    TaskError,
};

#[derive(Default)]
struct Recorder {
    log: Mutex<Vec<String>>,
    after_startup: AtomicUsize,
    before_shutdown: AtomicUsize,
}

impl Recorder {
    fn push(&self, entry: impl Into<String>) {
        self.log.lock().unwrap().push(entry.into());
    }

    fn entries(&self, prefix: &str) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .cloned()
            .collect()
    }

    fn position(&self, entry: &str) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .position(|e| e == entry)
            .unwrap_or_else(|| panic!("missing {entry}"))
    }
}

impl EventListener for Recorder {
    fn log_with_prefix(&self, prefix: &str, record: &LogRecord) {
        self.push(format!("log [{prefix}] {}", record.message));
    }

    fn after_startup(&self) {
        self.after_startup.fetch_add(1, Ordering::SeqCst);
        self.push("after startup");
    }

    fn before_shutdown(&self) {
        self.before_shutdown.fetch_add(1, Ordering::SeqCst);
        self.push("before shutdown");
    }
}

fn supervisor(rec: &Arc<Recorder>, cfg: SupervisorConfig) -> Arc<Supervisor> {
    Supervisor::builder(cfg)
        .with_listener(rec.clone())
        .build()
}

/// Blocks until cancelled; records its stop.
fn blocking(name: &'static str, rec: &Arc<Recorder>) -> SubsystemRef {
    let rec = Arc::clone(rec);
    SubsystemFn::arc(name, move |scope: Scope| {
        let rec = Arc::clone(&rec);
        async move {
            let r = Arc::clone(&rec);
            scope.defer_close(format!("stop {name}"), move || r.push(format!("stop {name}")));
            scope.run_until_cancelled().await
        }
    })
}

/// Fails with `msg` after `delay`; records its stop.
fn failing(
    name: &'static str,
    delay: Duration,
    msg: &'static str,
    rec: &Arc<Recorder>,
) -> SubsystemRef {
    let rec = Arc::clone(rec);
    SubsystemFn::arc(name, move |scope: Scope| {
        let rec = Arc::clone(&rec);
        async move {
            let r = Arc::clone(&rec);
            scope.defer_close(format!("stop {name}"), move || r.push(format!("stop {name}")));
            tokio::time::sleep(delay).await;
            Err::<(), _>(TaskError::fail(msg))
        }
    })
}

#[tokio::test(start_paused = true)]
async fn first_failure_stops_the_group() {
    let rec = Arc::new(Recorder::default());
    let sup = supervisor(&rec, SupervisorConfig::default());

    let plan = vec![
        blocking("node", &rec),
        failing("proposer", Duration::from_millis(10), "boom", &rec),
        blocking("batcher", &rec),
    ];
    let err = sup.run(&CauseToken::new(), plan).await.unwrap_err();

    match &err {
        RuntimeError::Cancelled { cause, suppressed } => {
            assert_eq!(cause.to_string(), "execution failed: boom");
            assert!(suppressed.is_empty());
        }
        other => panic!("unexpected: {other:?}"),
    }
    let stops: BTreeSet<_> = rec.entries("stop").into_iter().collect();
    assert_eq!(
        stops,
        BTreeSet::from([
            "stop batcher".to_string(),
            "stop node".to_string(),
            "stop proposer".to_string(),
        ])
    );
    assert_eq!(rec.after_startup.load(Ordering::SeqCst), 1);
    assert_eq!(rec.before_shutdown.load(Ordering::SeqCst), 1);
    assert_eq!(sup.state(), SupervisorState::Stopped);
}

#[tokio::test]
async fn parent_cause_is_returned() {
    let rec = Arc::new(Recorder::default());
    let sup = supervisor(&rec, SupervisorConfig::default());
    assert_eq!(sup.state(), SupervisorState::Idle);
    let mut state = sup.watch_state();

    let parent = CauseToken::new();
    let run = {
        let sup = Arc::clone(&sup);
        let parent = parent.clone();
        let plan = vec![
            blocking("node", &rec),
            blocking("proposer", &rec),
            blocking("batcher", &rec),
        ];
        tokio::spawn(async move { sup.run(&parent, plan).await })
    };

    state
        .wait_for(|s| *s == SupervisorState::Running)
        .await
        .unwrap();
    parent.cancel_with(std::io::Error::other("shutdown requested"));

    let err = run.await.unwrap().unwrap_err();
    let cause = err.cause().expect("parent cause");
    assert_eq!(cause.to_string(), "shutdown requested");
    assert!(cause.downcast_ref::<std::io::Error>().is_some());
    assert_eq!(rec.entries("stop").len(), 3);
    assert_eq!(sup.state(), SupervisorState::Stopped);
}

struct FailingPlan(Arc<Recorder>);

#[async_trait]
impl Launch for FailingPlan {
    async fn launch(self, launcher: &mut Launcher) -> Result<(), TaskError> {
        launcher.spawn(blocking("node", &self.0));
        launcher
            .step("new l2 output submitter", async {
                Err::<(), _>(TaskError::fail("no rollup provider"))
            })
            .await?;
        launcher.spawn(blocking("proposer", &self.0));
        Ok(())
    }
}

#[tokio::test]
async fn construction_failure_skips_after_startup() {
    let rec = Arc::new(Recorder::default());
    let sup = supervisor(&rec, SupervisorConfig::default());

    let err = sup
        .run(&CauseToken::new(), FailingPlan(Arc::clone(&rec)))
        .await
        .unwrap_err();

    assert!(matches!(err, RuntimeError::Startup { .. }));
    assert_eq!(
        err.to_string(),
        "startup failed: new l2 output submitter: execution failed: no rollup provider"
    );
    assert_eq!(rec.after_startup.load(Ordering::SeqCst), 0);
    assert_eq!(rec.before_shutdown.load(Ordering::SeqCst), 1);
    assert_eq!(rec.entries("stop"), vec!["stop node"]);
}

struct PanickingPlan(Arc<Recorder>);

fn read_rollup_config() -> Result<(), TaskError> {
    panic!("rollup config missing")
}

#[async_trait]
impl Launch for PanickingPlan {
    async fn launch(self, launcher: &mut Launcher) -> Result<(), TaskError> {
        launcher.spawn(blocking("node", &self.0));
        read_rollup_config()?;
        launcher.spawn(blocking("proposer", &self.0));
        Ok(())
    }
}

#[tokio::test]
async fn launch_panic_is_a_startup_error() {
    let rec = Arc::new(Recorder::default());
    let sup = supervisor(&rec, SupervisorConfig::default());

    let err = sup
        .run(&CauseToken::new(), PanickingPlan(Arc::clone(&rec)))
        .await
        .unwrap_err();

    assert!(matches!(err, RuntimeError::Startup { .. }));
    assert_eq!(err.to_string(), "startup failed: panicked: rollup config missing");
    assert_eq!(rec.after_startup.load(Ordering::SeqCst), 0);
    assert_eq!(rec.before_shutdown.load(Ordering::SeqCst), 1);
    assert_eq!(rec.entries("stop"), vec!["stop node"]);
    assert_eq!(sup.state(), SupervisorState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn dropped_run_still_releases() {
    let rec = Arc::new(Recorder::default());
    let sup = supervisor(&rec, SupervisorConfig::default());

    let abandoned = tokio::time::timeout(
        Duration::from_millis(20),
        sup.run(&CauseToken::new(), vec![blocking("node", &rec)]),
    )
    .await;
    assert!(abandoned.is_err());
    assert_eq!(rec.before_shutdown.load(Ordering::SeqCst), 1);

    // The next run waits until the abandoned group finished its teardown.
    let parent = CauseToken::new();
    parent.cancel(None);
    sup.run(&parent, Vec::new()).await.unwrap();

    assert_eq!(rec.entries("stop"), vec!["stop node"]);
    assert_eq!(rec.before_shutdown.load(Ordering::SeqCst), 2);
    assert_eq!(sup.state(), SupervisorState::Stopped);
}

/// Takes the first event and never finishes with it.
struct Stalled;

#[async_trait]
impl Subscribe for Stalled {
    async fn on_event(&self, _event: &Event) {
        std::future::pending::<()>().await
    }

    fn name(&self) -> &'static str {
        "stalled"
    }

    fn queue_capacity(&self) -> usize {
        1
    }
}

#[tokio::test(start_paused = true)]
async fn subscriber_drops_are_visible_on_the_supervisor() {
    let rec = Arc::new(Recorder::default());
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(Stalled)];
    let sup = Supervisor::builder(SupervisorConfig::default())
        .with_listener(rec.clone())
        .with_subscribers(subs)
        .build();
    assert_eq!(sup.subscriber_drops(), vec![("stalled", 0)]);

    // Seven events: one handled forever, one queued, the rest dropped.
    sup.run(
        &CauseToken::new(),
        vec![failing("node", Duration::ZERO, "boom", &rec)],
    )
    .await
    .unwrap_err();

    tokio::time::timeout(Duration::from_secs(1), async {
        while sup.subscriber_drops()[0].1 < 5 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("drops were not counted");
}

#[tokio::test(start_paused = true)]
async fn after_startup_precedes_every_stop() {
    let rec = Arc::new(Recorder::default());
    let sup = supervisor(&rec, SupervisorConfig::default());

    // Fails before startup completes: its stop must still wait for after_startup.
    let plan = vec![
        failing("batcher", Duration::ZERO, "compressor closed", &rec),
        blocking("node", &rec),
    ];
    sup.run(&CauseToken::new(), plan).await.unwrap_err();

    let after_startup = rec.position("after startup");
    for stop in rec.entries("stop") {
        assert!(after_startup < rec.position(&stop), "{stop} ran before after_startup");
    }
    assert!(rec.position("before shutdown") > after_startup);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn simultaneous_failures_commit_exactly_one() {
    let candidates = ["a failed", "b failed", "c failed", "d failed"];
    for _ in 0..20 {
        let rec = Arc::new(Recorder::default());
        let sup = supervisor(&rec, SupervisorConfig::default());
        let plan: Vec<SubsystemRef> = candidates
            .iter()
            .map(|&msg| failing(msg, Duration::ZERO, msg, &rec))
            .collect();

        match sup.run(&CauseToken::new(), plan).await.unwrap_err() {
            RuntimeError::Cancelled { cause, suppressed } => {
                let mut seen: Vec<String> = suppressed.iter().map(|e| e.to_string()).collect();
                seen.push(cause.to_string());
                seen.sort();
                let expected: Vec<String> = candidates
                    .iter()
                    .map(|m| format!("execution failed: {m}"))
                    .collect();
                assert_eq!(seen, expected);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}

#[tokio::test]
async fn clean_cancel_without_cause_is_ok() {
    let rec = Arc::new(Recorder::default());
    let sup = supervisor(&rec, SupervisorConfig::default());

    let parent = CauseToken::new();
    parent.cancel(None);
    sup.run(&parent, vec![blocking("node", &rec), blocking("batcher", &rec)])
        .await
        .unwrap();

    assert_eq!(rec.entries("stop").len(), 2);
    assert_eq!(rec.after_startup.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn clean_exit_still_stops_the_group() {
    let rec = Arc::new(Recorder::default());
    let sup = supervisor(&rec, SupervisorConfig::default());
    let oneshot = SubsystemFn::arc("oneshot", |_scope: Scope| async { Ok::<(), TaskError>(()) });

    sup.run(&CauseToken::new(), vec![blocking("node", &rec), oneshot])
        .await
        .unwrap();
    assert_eq!(rec.entries("stop"), vec!["stop node"]);
}

#[tokio::test]
async fn releases_unwind_in_reverse_after_setup_error() {
    let rec = Arc::new(Recorder::default());
    let sup = supervisor(&rec, SupervisorConfig::default());

    let r = Arc::clone(&rec);
    let proposer: SubsystemRef = SubsystemFn::arc("proposer", move |scope: Scope| {
        let rec = Arc::clone(&r);
        async move {
            for step in ["close tx manager", "close dialer"] {
                let rec = Arc::clone(&rec);
                let token = scope.token().clone();
                scope.defer_close(step, move || {
                    assert!(token.is_cancelled());
                    rec.push(format!("stop {step}"));
                });
            }
            Err::<(), _>(TaskError::fail("invalid oracle").in_step("new l2 output submitter"))
        }
    });

    let err = sup.run(&CauseToken::new(), vec![proposer]).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "new l2 output submitter: execution failed: invalid oracle"
    );
    assert_eq!(
        rec.entries("stop"),
        vec!["stop close dialer", "stop close tx manager"]
    );
}

fn stuck_release(name: &'static str, outcome: Result<(), TaskError>) -> SubsystemRef {
    SubsystemFn::arc(name, move |scope: Scope| {
        let outcome = outcome.clone();
        async move {
            scope.defer(format!("stop {name}"), move || async move { outcome });
            scope.run_until_cancelled().await
        }
    })
}

#[tokio::test]
async fn release_errors_are_reported() {
    let rec = Arc::new(Recorder::default());
    let sup = supervisor(&rec, SupervisorConfig::default());

    // No cause: the stop failure is the error.
    let parent = CauseToken::new();
    parent.cancel(None);
    let err = sup
        .run(&parent, vec![stuck_release("node", Err(TaskError::fail("deadline")))])
        .await
        .unwrap_err();
    match &err {
        RuntimeError::Shutdown { errors } => {
            assert_eq!(errors.len(), 1);
            assert_eq!(errors[0].to_string(), "stop node: execution failed: deadline");
            assert_eq!(errors[0].as_label(), "task_stop_failed");
        }
        other => panic!("unexpected: {other:?}"),
    }

    // With a cause: the stop failure is attached, not dropped.
    let plan = vec![
        stuck_release("node", Err(TaskError::fail("deadline"))),
        failing("proposer", Duration::ZERO, "boom", &rec),
    ];
    let err = sup.run(&CauseToken::new(), plan).await.unwrap_err();
    assert_eq!(err.cause().unwrap().to_string(), "execution failed: boom");
    assert_eq!(
        err.to_string(),
        "execution failed: boom; stop node: execution failed: deadline"
    );
}

#[tokio::test(start_paused = true)]
async fn grace_exceeded_names_the_stuck_subsystem() {
    let rec = Arc::new(Recorder::default());
    let sup = supervisor(
        &rec,
        SupervisorConfig {
            grace: Duration::from_secs(1),
            ..SupervisorConfig::default()
        },
    );

    let batcher = SubsystemFn::arc("batcher", |scope: Scope| async move {
        scope.defer("stop batch submitting", || std::future::pending());
        scope.run_until_cancelled().await
    });
    let plan = vec![batcher, failing("node", Duration::from_millis(5), "boom", &rec)];
    let err = sup.run(&CauseToken::new(), plan).await.unwrap_err();

    match err {
        RuntimeError::GraceExceeded { grace, stuck, cause } => {
            assert_eq!(grace, Duration::from_secs(1));
            assert_eq!(stuck, vec!["batcher".to_string()]);
            assert_eq!(cause.unwrap().to_string(), "execution failed: boom");
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert_eq!(rec.before_shutdown.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn subsystem_logs_reach_the_listener() {
    let rec = Arc::new(Recorder::default());
    let sup = supervisor(&rec, SupervisorConfig::default());

    let node: SubsystemRef = SubsystemFn::arc("node", |scope: Scope| async move {
        scope.logger().info("started");
        scope.logger_for("node snapshotter").debug("snapshot");
        scope.logger_for("").warn("unnamed");
        Ok::<(), TaskError>(())
    });
    sup.run(&CauseToken::new(), vec![node]).await.unwrap();

    assert_eq!(
        rec.entries("log"),
        vec![
            "log [node] started",
            "log [node snapshotter] snapshot",
            "log [node] unnamed"
        ]
    );
}

#[tokio::test]
async fn run_events_are_published_in_order() {
    let rec = Arc::new(Recorder::default());
    let sup = supervisor(&rec, SupervisorConfig::default());
    let mut events = sup.subscribe();

    sup.run(
        &CauseToken::new(),
        vec![failing("node", Duration::ZERO, "boom", &rec)],
    )
    .await
    .unwrap_err();

    let mut run_kinds = Vec::new();
    let mut node_kinds = Vec::new();
    while let Ok(ev) = events.try_recv() {
        match ev.subsystem {
            Some(_) => node_kinds.push(ev.kind),
            None => run_kinds.push(ev.kind),
        }
    }
    assert_eq!(
        run_kinds,
        vec![
            EventKind::RunStarting,
            EventKind::StartupComplete,
            EventKind::ShutdownRequested,
            EventKind::AllStopped,
        ]
    );
    assert_eq!(
        node_kinds,
        vec![
            EventKind::SubsystemStarting,
            EventKind::SubsystemStopping,
            EventKind::SubsystemFailed,
        ]
    );
}
