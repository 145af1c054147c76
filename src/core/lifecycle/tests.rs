use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde_json::json;

use super::*;
use crate::config::Config;
use crate::error::{FaultKind, OrchestratorError, Rejection};
use crate::events::Bus;
use crate::units::{ChildMap, ChildSource, Context, CustomProps, Phase, Role, UnitExports};

fn harness() -> (Arc<Lifecycle>, Arc<FaultHandlers>, Arc<ReleaseRegistry>, Bus) {
    let bus = Bus::new(256);
    let faults = Arc::new(FaultHandlers::new(bus.clone()));
    let releases = ReleaseRegistry::new();
    let lc = Lifecycle::new(
        &Config::default(),
        bus.clone(),
        Arc::clone(&faults),
        Arc::clone(&releases),
    );
    (lc, faults, releases, bus)
}

fn top_level(lc: &Lifecycle, name: &str, source: impl Into<ChildSource>) -> Arc<Unit> {
    Unit::new(
        lc.next_id(),
        name.into(),
        Role::TopLevel {
            predicate: Arc::new(|_: &Context| Ok::<bool, Rejection>(true)),
        },
        source.into().into_loader(),
        CustomProps::new(),
        lc.defaults(),
    )
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

fn failing(msg: &'static str) -> Phase {
    Phase::new(move |_p: Props| async move { Err::<(), Rejection>(Rejection::message(msg)) })
}

fn basic() -> UnitExports {
    UnitExports::new().init(noop()).activate(noop()).deactivate(noop())
}

async fn bring_up(lc: &Arc<Lifecycle>, unit: Arc<Unit>) -> Arc<Unit> {
    let unit = lc.load(unit, FailureMode::Hard).await.unwrap();
    let unit = lc.init(unit, FailureMode::Hard).await.unwrap();
    lc.activate(unit, FailureMode::Hard).await.unwrap()
}

#[tokio::test]
async fn round_trip_ends_unloaded_without_phases() {
    let (lc, _faults, _releases, bus) = harness();
    let mut rx = bus.subscribe();
    let released = Arc::new(AtomicUsize::new(0));
    let unit = top_level(&lc, "nav", basic().release(counting(&released)));

    let unit = bring_up(&lc, unit).await;
    assert_eq!(unit.status(), UnitStatus::Active);

    let unit = lc.deactivate(unit, FailureMode::Hard).await.unwrap();
    let unit = lc.release(unit, FailureMode::Hard).await.unwrap();
    assert_eq!(unit.status(), UnitStatus::Unloaded);
    assert!(unit.with_state(|st| st.phases.is_none()));
    assert_eq!(released.load(Ordering::SeqCst), 1);

    let mut statuses = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        if ev.kind == EventKind::StatusChanged {
            statuses.push(ev.status.unwrap());
        }
    }
    use UnitStatus::*;
    assert_eq!(
        statuses,
        vec![
            LoadingCode,
            Uninitialized,
            Initializing,
            Inactive,
            Activating,
            Active,
            Deactivating,
            Inactive,
            Releasing,
            Unloaded,
        ]
    );
}

#[tokio::test]
async fn phases_outside_their_source_status_change_nothing() {
    let (lc, _faults, _releases, _bus) = harness();
    let loads = Arc::new(AtomicUsize::new(0));
    let activations = Arc::new(AtomicUsize::new(0));

    let exports = basic().activate(counting(&activations));
    let counter = Arc::clone(&loads);
    let unit = top_level(
        &lc,
        "nav",
        ChildSource::loader(move |_p: Props| {
            counter.fetch_add(1, Ordering::SeqCst);
            let exports = exports.clone();
            async move { Ok::<UnitExports, Rejection>(exports) }
        }),
    );

    let unit = lc.activate(unit, FailureMode::Hard).await.unwrap();
    let unit = lc.deactivate(unit, FailureMode::Hard).await.unwrap();
    let unit = lc.init(unit, FailureMode::Hard).await.unwrap();
    assert_eq!(unit.status(), UnitStatus::Unloaded);
    assert_eq!(activations.load(Ordering::SeqCst), 0);

    let unit = lc.load(unit, FailureMode::Hard).await.unwrap();
    let unit = lc.load(unit, FailureMode::Hard).await.unwrap();
    assert_eq!(unit.status(), UnitStatus::Uninitialized);
    assert_eq!(loads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn invalid_exports_are_a_load_fault() {
    let (lc, _faults, _releases, _bus) = harness();
    let unit = top_level(&lc, "nav", UnitExports::new().init(noop()).deactivate(noop()));

    let fault = lc.load(Arc::clone(&unit), FailureMode::Hard).await.unwrap_err();
    assert_eq!(fault.kind(), FaultKind::Load);
    assert_eq!(
        fault.message(),
        Some(
            "unit 'nav' died in status LOADING_CODE: 'nav' does not export an activate function or sequence of functions"
        )
    );
    assert_eq!(unit.status(), UnitStatus::Broken);
}

#[tokio::test]
async fn soft_faults_reach_the_handlers() {
    let (lc, faults, _releases, _bus) = harness();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    faults.add(Arc::new(move |f: &Fault| sink.lock().push(f.to_string())));

    let unit = top_level(&lc, "nav", basic().init(failing("nope")));
    let unit = lc.load(unit, FailureMode::Soft).await.unwrap();
    let unit = lc.init(unit, FailureMode::Soft).await.unwrap();

    assert_eq!(unit.status(), UnitStatus::Broken);
    assert_eq!(
        *seen.lock(),
        vec!["unit 'nav' died in status INITIALIZING: nope".to_string()]
    );
    assert!(unit.fault().is_some());
}

#[tokio::test]
async fn failed_activation_is_cleaned_up_before_breaking() {
    let (lc, _faults, _releases, _bus) = harness();
    let deactivations = Arc::new(AtomicUsize::new(0));
    let unit = top_level(
        &lc,
        "nav",
        basic()
            .activate(failing("boom"))
            .deactivate(counting(&deactivations)),
    );

    let unit = lc.load(unit, FailureMode::Hard).await.unwrap();
    let unit = lc.init(unit, FailureMode::Hard).await.unwrap();
    let fault = lc
        .activate(Arc::clone(&unit), FailureMode::Hard)
        .await
        .unwrap_err();

    assert_eq!(fault.kind(), FaultKind::Phase);
    assert_eq!(fault.message(), Some("unit 'nav' died in status ACTIVATING: boom"));
    assert_eq!(deactivations.load(Ordering::SeqCst), 1);
    assert_eq!(unit.status(), UnitStatus::Broken);

    let again = lc.activate(Arc::clone(&unit), FailureMode::Hard).await.unwrap();
    assert_eq!(again.status(), UnitStatus::Broken);
}

#[tokio::test]
async fn update_checks_status_and_capability() {
    let (lc, _faults, _releases, _bus) = harness();
    let themes = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&themes);
    let update = Phase::new(move |p: Props| {
        sink.lock().push(p.get("theme").cloned());
        async { Ok::<(), Rejection>(()) }
    });

    let plain = top_level(&lc, "plain", basic());
    let updatable = top_level(&lc, "themed", basic().update(update));

    let err = lc.update(Arc::clone(&updatable), None).await.unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::InvalidStatus { status: UnitStatus::Unloaded, action: "update", .. }
    ));

    let plain = bring_up(&lc, plain).await;
    let err = lc.update(plain, None).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Unsupported { capability: "update", .. }));

    let updatable = bring_up(&lc, updatable).await;
    let mut custom = CustomProps::new();
    custom.insert("theme".into(), json!("dark"));
    let updatable = lc.update(updatable, Some(custom)).await.unwrap();

    assert_eq!(updatable.status(), UnitStatus::Active);
    assert_eq!(*themes.lock(), vec![Some(json!("dark"))]);
}

#[tokio::test]
async fn rejected_update_keeps_previous_props() {
    let (lc, _faults, _releases, bus) = harness();
    let mut rx = bus.subscribe();
    let unit = top_level(&lc, "themed", basic().update(noop()));
    let unit = lc.load(unit, FailureMode::Hard).await.unwrap();
    let unit = lc.init(unit, FailureMode::Hard).await.unwrap();
    while rx.try_recv().is_ok() {}

    let mut custom = CustomProps::new();
    custom.insert("theme".into(), json!("dark"));
    let err = lc.update(Arc::clone(&unit), Some(custom)).await.unwrap_err();

    assert!(matches!(
        err,
        OrchestratorError::InvalidStatus { status: UnitStatus::Inactive, .. }
    ));
    assert_eq!(unit.with_state(|st| st.custom.get("theme").cloned()), None);
    assert_eq!(unit.status(), UnitStatus::Inactive);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn panicking_loader_is_a_load_fault() {
    let (lc, faults, _releases, _bus) = harness();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    faults.add(Arc::new(move |f: &Fault| sink.lock().push(f.clone())));

    let source = ChildSource::loader(|_p: Props| async move {
        if true {
            panic!("bundle missing");
        }
        Ok::<UnitExports, Rejection>(basic())
    });
    let unit = lc.load(top_level(&lc, "bad", source), FailureMode::Soft).await.unwrap();

    assert_eq!(unit.status(), UnitStatus::Broken);
    let seen = seen.lock().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].kind(), FaultKind::Load);
    assert_eq!(
        seen[0].message(),
        Some("unit 'bad' died in status LOADING_CODE: loader panicked: bundle missing")
    );
}

#[tokio::test]
async fn child_fault_during_deactivation_is_aggregated() {
    let (lc, _faults, _releases, _bus) = harness();
    let owner = bring_up(&lc, top_level(&lc, "O", basic())).await;

    let e2_deactivated = Arc::new(AtomicUsize::new(0));
    let e1 = lc.mount_child(
        Arc::clone(owner.children()),
        basic().name("E1").deactivate(failing("E1 is stuck")).into(),
        CustomProps::new(),
    );
    let e2 = lc.mount_child(
        Arc::clone(owner.children()),
        basic().name("E2").deactivate(counting(&e2_deactivated)).into(),
        CustomProps::new(),
    );
    e1.activated().await.unwrap();
    e2.activated().await.unwrap();
    assert_eq!(owner.children().len(), 2);
    assert_eq!(e1.parent_id(), Some(owner.id()));

    let fault = lc
        .deactivate(Arc::clone(&owner), FailureMode::Hard)
        .await
        .unwrap_err();

    assert_eq!(fault.kind(), FaultKind::AggregateChild);
    assert_eq!(
        fault.message(),
        Some(
            "unit 'O' died in status DEACTIVATING: child-unit 'E1' died in status DEACTIVATING: E1 is stuck"
        )
    );
    assert_eq!(owner.status(), UnitStatus::Broken);
    assert_eq!(e1.status(), UnitStatus::Broken);
    assert_eq!(e2.status(), UnitStatus::Inactive);
    assert_eq!(e2_deactivated.load(Ordering::SeqCst), 1);
    assert_eq!(owner.children().len(), 0);

    assert!(e1.deactivated().await.is_err());
    assert!(e2.deactivated().await.is_ok());
}

#[tokio::test]
async fn failed_child_mount_settles_every_completion() {
    let (lc, _faults, _releases, _bus) = harness();
    let root = Arc::new(ChildMap::new(None));
    let child = lc.mount_child(
        Arc::clone(&root),
        basic().init(failing("no init")).into(),
        CustomProps::new(),
    );

    assert!(child.loaded().await.is_ok());
    let err = child.initialized().await.unwrap_err();
    assert_eq!(
        err.message(),
        Some(&*format!("child-unit 'child-{}' died in status INITIALIZING: no init", child.id()))
    );
    assert!(child.activated().await.is_err());
    assert!(child.deactivated().await.is_err());
    assert_eq!(child.status(), UnitStatus::Broken);
    assert_eq!(child.parent_id(), None);
    assert!(!root.contains(child.id()));
}

#[tokio::test]
async fn child_can_be_reactivated_after_deactivation() {
    let (lc, _faults, _releases, _bus) = harness();
    let root = Arc::new(ChildMap::new(None));
    let child = lc.mount_child(Arc::clone(&root), basic().into(), CustomProps::new());
    child.activated().await.unwrap();

    child.deactivate().await.unwrap();
    assert_eq!(child.status(), UnitStatus::Inactive);
    assert!(!root.contains(child.id()));
    assert!(matches!(
        child.deactivate().await,
        Err(OrchestratorError::InvalidStatus { action: "deactivate", .. })
    ));

    child.activate().await.unwrap();
    assert_eq!(child.status(), UnitStatus::Active);
    assert!(root.contains(child.id()));
    assert!(child.deactivated().await.is_ok());
}

#[tokio::test]
async fn concurrent_releases_run_the_phase_once() {
    let (lc, _faults, releases, _bus) = harness();
    let released = Arc::new(AtomicUsize::new(0));
    let unit = top_level(&lc, "nav", basic().release(counting(&released)));
    let unit = lc.load(unit, FailureMode::Hard).await.unwrap();
    let unit = lc.init(unit, FailureMode::Hard).await.unwrap();

    let (completion, created) = releases.request(&unit);
    assert!(created);

    let (a, b) = tokio::join!(
        lc.release(Arc::clone(&unit), FailureMode::Soft),
        lc.release(Arc::clone(&unit), FailureMode::Soft),
    );
    assert!(a.is_ok() && b.is_ok());
    assert_eq!(released.load(Ordering::SeqCst), 1);
    assert_eq!(unit.status(), UnitStatus::Unloaded);
    assert!(completion.await.is_ok());
    assert!(!releases.is_pending(&unit));
}
