use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use unitvisor::{
    ChildHandle, Config, Context, CustomProps, EventKind, Fault, FaultKind, Orchestrator,
    OrchestratorError, Phase, PhaseKind, PhaseTimeout, Props, Rejection, ReleaseOptions,
    UnitExports, UnitSpec, UnitStatus,
};

fn orchestrator() -> Arc<Orchestrator> {
    Orchestrator::builder(Config::default()).build()
}

fn path_is(path: &'static str) -> impl Fn(&Context) -> Result<bool, Rejection> + Send + Sync {
    move |ctx: &Context| Ok(ctx.get::<&'static str>() == Some(&path))
}

fn always(_ctx: &Context) -> Result<bool, Rejection> {
    Ok(true)
}

fn noop() -> Phase {
    Phase::new(|_p: Props| async { Ok::<(), Rejection>(()) })
}

fn counting(counter: &Arc<AtomicUsize>) -> Phase {
    let counter = Arc::clone(counter);
    Phase::new(move |_p: Props| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<(), Rejection>(())
        }
    })
}

fn traced(log: &Arc<Mutex<Vec<String>>>, label: &'static str, millis: u64) -> Phase {
    let log = Arc::clone(log);
    Phase::new(move |_p: Props| {
        let log = Arc::clone(&log);
        async move {
            log.lock().push(format!("{label}:start"));
            tokio::time::sleep(Duration::from_millis(millis)).await;
            log.lock().push(format!("{label}:end"));
            Ok::<(), Rejection>(())
        }
    })
}

fn basic() -> UnitExports {
    UnitExports::new().init(noop()).activate(noop()).deactivate(noop())
}

fn fault_sink(orch: &Orchestrator) -> Arc<Mutex<Vec<Fault>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    orch.add_fault_handler(move |f: &Fault| sink.lock().push(f.clone()));
    seen
}

#[tokio::test]
async fn only_units_relevant_to_the_context_are_active() {
    let orch = orchestrator();
    orch.register(UnitSpec::from_exports("A", basic(), path_is("/a"))).await.unwrap();
    orch.register(UnitSpec::from_exports("B", basic(), path_is("/b"))).await.unwrap();
    orch.register(UnitSpec::from_exports("C", basic(), always)).await.unwrap();

    let active = orch.start(Context::new("/a")).await.unwrap();
    assert_eq!(active, vec!["A", "C"]);
    assert_eq!(orch.status("B").await, Some(UnitStatus::Unloaded));

    let active = orch.trigger(Context::new("/b")).await.unwrap();
    assert_eq!(active, vec!["B", "C"]);
    assert_eq!(orch.status("A").await, Some(UnitStatus::Inactive));
    assert_eq!(orch.unit_names().await, vec!["A", "B", "C"]);
    assert_eq!(orch.check_activity(&Context::new("/a")).await, vec!["A", "C"]);
}

#[tokio::test]
async fn passes_before_start_only_load() {
    let orch = orchestrator();
    orch.register(UnitSpec::from_exports("A", basic(), always)).await.unwrap();

    let active = orch.trigger(Context::empty()).await.unwrap();
    assert!(active.is_empty());
    assert!(!orch.is_started());
    assert_eq!(orch.status("A").await, Some(UnitStatus::Uninitialized));

    let active = orch.start(Context::empty()).await.unwrap();
    assert_eq!(active, vec!["A"]);
}

#[tokio::test]
async fn registration_is_validated() {
    let orch = orchestrator();
    orch.register(UnitSpec::from_exports("A", basic(), always)).await.unwrap();

    let dup = orch.register(UnitSpec::from_exports("A", basic(), always)).await;
    assert!(matches!(dup, Err(OrchestratorError::Validation { .. })));
    let empty = orch.register(UnitSpec::from_exports("", basic(), always)).await;
    assert!(matches!(empty, Err(OrchestratorError::Validation { .. })));

    let unknown = orch.release("nope", ReleaseOptions::default()).await;
    assert!(matches!(unknown, Err(OrchestratorError::UnknownUnit { .. })));
}

#[tokio::test]
async fn triggers_during_a_pass_are_coalesced() {
    let orch = orchestrator();
    let mut rx = orch.subscribe();
    orch.register(UnitSpec::from_exports("A", basic(), path_is("/a"))).await.unwrap();
    orch.register(UnitSpec::from_exports("B", basic(), path_is("/b"))).await.unwrap();

    let first = orch.start(Context::new("/a"));
    let second = orch.trigger(Context::new("/a"));
    let third = orch.trigger(Context::new("/b"));

    let first = first.await.unwrap();
    let second = second.await.unwrap();
    let third = third.await.unwrap();
    assert_eq!(first, vec!["A"]);
    assert_eq!(second, third);
    assert_eq!(third, vec!["B"]);

    let mut before = 0;
    let mut complete = 0;
    while let Ok(ev) = rx.try_recv() {
        match ev.kind {
            EventKind::BeforePass => before += 1,
            EventKind::PassComplete => complete += 1,
            _ => {}
        }
    }
    assert_eq!(before, 2);
    assert_eq!(complete, 2);
}

#[tokio::test(start_paused = true)]
async fn fatal_activation_timeout_breaks_the_unit() {
    let orch = orchestrator();
    let hang = Phase::new(|_p: Props| std::future::pending::<Result<(), Rejection>>());
    let exports = basic()
        .name("D")
        .activate(hang)
        .timeout(PhaseKind::Activate, PhaseTimeout::new(50, true).unwrap());

    let child = orch.mount_child(exports, CustomProps::new());
    let fault = child.activated().await.unwrap_err();

    assert_eq!(fault.kind(), FaultKind::Timeout);
    assert_eq!(
        fault.message(),
        Some(
            "child-unit 'D' died in status ACTIVATING: activate for child-unit 'D' did not resolve or reject for 50 ms"
        )
    );
    assert_eq!(child.status(), UnitStatus::Broken);
    assert_eq!(child.fault().map(|f| f.kind()), Some(FaultKind::Timeout));
}

#[tokio::test]
async fn failing_child_deactivation_breaks_the_owner() {
    let orch = orchestrator();
    let faults = fault_sink(&orch);
    let children: Arc<Mutex<Vec<ChildHandle>>> = Arc::new(Mutex::new(Vec::new()));

    let stuck = Phase::new(|_p: Props| async {
        Err::<(), Rejection>(Rejection::message("E1 is stuck"))
    });
    let e1 = basic().name("E1").deactivate(stuck);
    let e2 = basic().name("E2");
    let mounted = Arc::clone(&children);
    let activate = Phase::new(move |p: Props| {
        mounted.lock().push(p.mount_child(e1.clone(), CustomProps::new()));
        mounted.lock().push(p.mount_child(e2.clone(), CustomProps::new()));
        async { Ok::<(), Rejection>(()) }
    });
    let owner = basic().activate(activate);
    orch.register(UnitSpec::from_exports("O", owner, path_is("/o"))).await.unwrap();

    assert_eq!(orch.start(Context::new("/o")).await.unwrap(), vec!["O"]);
    let handles = children.lock().clone();
    assert_eq!(handles.len(), 2);
    for child in &handles {
        child.activated().await.unwrap();
    }

    let active = orch.trigger(Context::new("/elsewhere")).await.unwrap();
    assert!(active.is_empty());

    assert_eq!(orch.status("O").await, Some(UnitStatus::Broken));
    assert_eq!(handles[0].status(), UnitStatus::Broken);
    assert_eq!(handles[1].status(), UnitStatus::Inactive);

    let fault = orch.fault("O").await.unwrap();
    assert_eq!(fault.kind(), FaultKind::AggregateChild);
    assert!(fault.to_string().contains("E1 is stuck"));
    assert_eq!(faults.lock().len(), 1);

    // Broken units are never scheduled again.
    let active = orch.trigger(Context::new("/o")).await.unwrap();
    assert!(active.is_empty());
    assert_eq!(orch.unit_names().await, vec!["O"]);
}

#[tokio::test]
async fn faulting_predicate_breaks_only_its_unit() {
    let orch = orchestrator();
    let faults = fault_sink(&orch);
    orch.register(UnitSpec::from_exports("bad", basic(), |_ctx: &Context| {
        Err(Rejection::message("predicate exploded"))
    }))
    .await
    .unwrap();
    orch.register(UnitSpec::from_exports("good", basic(), always)).await.unwrap();

    let active = orch.start(Context::empty()).await.unwrap();
    assert_eq!(active, vec!["good"]);
    assert_eq!(orch.status("bad").await, Some(UnitStatus::Broken));

    let seen = faults.lock().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(
        seen[0].message(),
        Some("unit 'bad' died in status UNLOADED: predicate exploded")
    );
}

#[tokio::test]
async fn panicking_predicate_breaks_only_its_unit() {
    let orch = orchestrator();
    let faults = fault_sink(&orch);
    orch.register(UnitSpec::from_exports(
        "bad",
        basic(),
        |_ctx: &Context| -> Result<bool, Rejection> { panic!("predicate exploded") },
    ))
    .await
    .unwrap();
    orch.register(UnitSpec::from_exports("good", basic(), always)).await.unwrap();

    assert_eq!(orch.start(Context::empty()).await.unwrap(), vec!["good"]);
    assert_eq!(orch.status("bad").await, Some(UnitStatus::Broken));
    assert_eq!(
        faults.lock()[0].message(),
        Some("unit 'bad' died in status UNLOADED: activation predicate panicked: predicate exploded")
    );

    // Later passes are still served.
    assert_eq!(orch.trigger(Context::empty()).await.unwrap(), vec!["good"]);
    assert_eq!(orch.check_activity(&Context::empty()).await, vec!["good"]);
}

#[tokio::test]
async fn panicking_loader_breaks_only_its_unit() {
    let orch = orchestrator();
    let faults = fault_sink(&orch);
    orch.register(UnitSpec::new(
        "bad",
        |_p: Props| async move {
            if true {
                panic!("loader exploded");
            }
            Ok::<UnitExports, Rejection>(basic())
        },
        always,
    ))
    .await
    .unwrap();
    orch.register(UnitSpec::from_exports("good", basic(), always)).await.unwrap();

    assert_eq!(orch.start(Context::empty()).await.unwrap(), vec!["good"]);
    assert_eq!(orch.status("bad").await, Some(UnitStatus::Broken));
    assert_eq!(orch.fault("bad").await.map(|f| f.kind()), Some(FaultKind::Load));
    assert_eq!(faults.lock().len(), 1);

    assert_eq!(orch.trigger(Context::empty()).await.unwrap(), vec!["good"]);
}

#[tokio::test(start_paused = true)]
async fn activations_wait_for_the_deactivations_of_their_pass() {
    let orch = orchestrator();
    let log = Arc::new(Mutex::new(Vec::new()));
    let a = basic().deactivate(traced(&log, "A-deact", 100));
    let b = basic()
        .init(traced(&log, "B-init", 30))
        .activate(traced(&log, "B-act", 10));
    orch.register(UnitSpec::from_exports("A", a, path_is("/a"))).await.unwrap();
    orch.register(UnitSpec::from_exports("B", b, path_is("/b"))).await.unwrap();

    assert_eq!(orch.start(Context::new("/a")).await.unwrap(), vec!["A"]);
    assert!(log.lock().is_empty());

    assert_eq!(orch.trigger(Context::new("/b")).await.unwrap(), vec!["B"]);
    let log = log.lock().clone();
    let at = |entry: &str| log.iter().position(|e| e == entry).unwrap();
    assert_eq!(log.len(), 6);
    // B initializes while A is still deactivating, but activates only afterwards.
    assert!(at("B-init:start") < at("A-deact:end"));
    assert!(at("B-init:end") < at("A-deact:end"));
    assert!(at("A-deact:end") < at("B-act:start"));
    assert_eq!(orch.status("A").await, Some(UnitStatus::Inactive));
}

#[tokio::test]
async fn concurrent_release_requests_share_one_completion() {
    let orch = orchestrator();
    let released = Arc::new(AtomicUsize::new(0));
    orch.register(UnitSpec::from_exports(
        "A",
        basic().release(counting(&released)),
        path_is("/a"),
    ))
    .await
    .unwrap();
    orch.start(Context::new("/a")).await.unwrap();
    orch.trigger(Context::new("/b")).await.unwrap();
    assert_eq!(orch.status("A").await, Some(UnitStatus::Inactive));

    let (a, b) = tokio::join!(
        orch.release("A", ReleaseOptions::default()),
        orch.release("A", ReleaseOptions::default()),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert!(a.ptr_eq(&b));

    a.await.unwrap();
    b.await.unwrap();
    assert_eq!(released.load(Ordering::SeqCst), 1);
    assert_eq!(orch.status("A").await, Some(UnitStatus::Unloaded));
}

#[tokio::test]
async fn deferred_release_happens_in_the_deactivating_pass() {
    let orch = orchestrator();
    let released = Arc::new(AtomicUsize::new(0));
    orch.register(UnitSpec::from_exports(
        "A",
        basic().release(counting(&released)),
        path_is("/a"),
    ))
    .await
    .unwrap();
    orch.start(Context::new("/a")).await.unwrap();

    let done = orch.release("A", ReleaseOptions::deferred()).await.unwrap();
    assert_eq!(orch.status("A").await, Some(UnitStatus::Active));
    assert_eq!(released.load(Ordering::SeqCst), 0);

    orch.trigger(Context::new("/b")).await.unwrap();
    done.await.unwrap();
    assert_eq!(released.load(Ordering::SeqCst), 1);
    assert_eq!(orch.status("A").await, Some(UnitStatus::Unloaded));
}
