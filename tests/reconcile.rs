mod common;

use std::rc::Rc;

use cluster_harness::requirements::{FnRequirement, NumNodes, Requirement, RequirementSet};
use cluster_harness::{Acquisition, ClusterReconciler, HarnessError, SharedOutput};

use common::{plain_config, FakeCluster, FakeLauncher};

fn setting(key: &'static str, value: &'static str) -> Box<dyn Requirement<FakeCluster>> {
    Box::new(FnRequirement::new(
        format!("{}={}", key, value),
        move |c: &FakeCluster| c.setting(key) == Some(value),
        move |c: &mut FakeCluster, _out: &SharedOutput| {
            c.settings.insert(key.to_string(), value.to_string());
            Ok(())
        },
    ))
}

fn set(launcher: &Rc<FakeLauncher>, requirements: Vec<Box<dyn Requirement<FakeCluster>>>) -> RequirementSet<FakeCluster> {
    RequirementSet::new(requirements, launcher.clone())
}

#[test]
fn first_reconcile_creates_a_cluster() {
    let launcher = FakeLauncher::new();
    let (out, seen) = SharedOutput::buffer();
    let mut reconciler = ClusterReconciler::new(&plain_config(), out);

    let requirements = set(&launcher, vec![Box::new(NumNodes(2)), setting("services", "kv,n1ql")]);
    let cluster = reconciler.reconcile(&requirements, true).unwrap();
    assert_eq!(cluster.nodes.len(), 2);
    assert_eq!(cluster.setting("services"), Some("kv,n1ql"));
    assert_eq!(reconciler.last_acquisition(), Some(Acquisition::Created));
    assert_eq!(reconciler.hook().armed(), Some(0));
    assert_eq!(launcher.lifecycle.launches.get(), 1);

    let options = launcher.lifecycle.last_options.borrow().clone().unwrap();
    assert_eq!(options.num_nodes, 2);

    let text = seen.borrow().as_str().to_string();
    assert!(text.contains("Starting cluster to satisfy requirements: [NumNodes(2), services=kv,n1ql]"));
    assert!(text.contains("launching 2 nodes at index 0"));
}

#[test]
fn satisfied_cluster_is_reused_untouched() {
    let launcher = FakeLauncher::new();
    let mut reconciler = ClusterReconciler::new(&plain_config(), SharedOutput::null());
    let requirements = set(&launcher, vec![Box::new(NumNodes(1))]);

    reconciler.reconcile(&requirements, true).unwrap();
    reconciler.reconcile(&requirements, true).unwrap();

    assert_eq!(reconciler.last_acquisition(), Some(Acquisition::Reused));
    assert_eq!(launcher.lifecycle.launches.get(), 1);
    assert_eq!(launcher.lifecycle.teardowns.get(), 0);
    assert_eq!(reconciler.hook().armed(), Some(0));
}

#[test]
fn satisfiable_requirements_are_applied_in_place() {
    let launcher = FakeLauncher::new();
    let (out, seen) = SharedOutput::buffer();
    let mut reconciler = ClusterReconciler::new(&plain_config(), out);

    reconciler
        .reconcile(&set(&launcher, vec![Box::new(NumNodes(1))]), true)
        .unwrap();
    seen.borrow_mut().buffer.clear();

    let requirements = set(&launcher, vec![Box::new(NumNodes(1)), setting("encryption", "on")]);
    let cluster = reconciler.reconcile(&requirements, true).unwrap();
    assert_eq!(cluster.setting("encryption"), Some("on"));
    assert_eq!(reconciler.last_acquisition(), Some(Acquisition::Reconciled));
    assert_eq!(launcher.lifecycle.launches.get(), 1);
    assert_eq!(launcher.lifecycle.teardowns.get(), 0);
    // Mutation chatter is suppressed unless verbose.
    assert!(seen.borrow().as_str().is_empty());
}

#[test]
fn unsatisfiable_requirements_start_a_new_generation() {
    let launcher = FakeLauncher::new();
    let mut reconciler = ClusterReconciler::new(&plain_config(), SharedOutput::null());

    reconciler
        .reconcile(&set(&launcher, vec![Box::new(NumNodes(2))]), true)
        .unwrap();
    let cluster = reconciler
        .reconcile(&set(&launcher, vec![Box::new(NumNodes(3))]), true)
        .unwrap();

    assert_eq!(cluster.nodes.len(), 3);
    assert_eq!(cluster.index, 2);
    assert_eq!(reconciler.last_acquisition(), Some(Acquisition::Created));
    assert_eq!(launcher.lifecycle.launches.get(), 2);
    assert_eq!(launcher.lifecycle.teardowns.get(), 1);
    assert_eq!(reconciler.hook().armed(), Some(2));
}

#[test]
fn reuse_disabled_always_recreates() {
    let launcher = FakeLauncher::new();
    let mut reconciler = ClusterReconciler::new(&plain_config(), SharedOutput::null());
    let requirements = set(&launcher, vec![Box::new(NumNodes(1))]);

    reconciler.reconcile(&requirements, false).unwrap();
    let cluster = reconciler.reconcile(&requirements, false).unwrap();

    assert_eq!(cluster.index, 1);
    assert_eq!(launcher.lifecycle.launches.get(), 2);
    assert_eq!(launcher.lifecycle.teardowns.get(), 1);
}

#[test]
fn mutation_that_does_not_stick_is_internal() {
    let launcher = FakeLauncher::new();
    let mut reconciler = ClusterReconciler::new(&plain_config(), SharedOutput::null());
    reconciler
        .reconcile(&set(&launcher, vec![Box::new(NumNodes(1))]), true)
        .unwrap();

    let broken: Box<dyn Requirement<FakeCluster>> = Box::new(FnRequirement::new(
        "never",
        |_: &FakeCluster| false,
        |_: &mut FakeCluster, _: &SharedOutput| Ok(()),
    ));
    let err = reconciler
        .reconcile(&set(&launcher, vec![broken]), true)
        .unwrap_err();

    assert!(err.is_internal());
    assert!(matches!(err, HarnessError::UnmetAfterReconcile { ref unmet } if unmet == "never"));
}

#[test]
fn launch_failure_is_reported() {
    let launcher = FakeLauncher::new();
    launcher.fail.set(true);
    let mut reconciler = ClusterReconciler::new(&plain_config(), SharedOutput::null());

    let err = reconciler
        .reconcile(&set(&launcher, vec![Box::new(NumNodes(1))]), true)
        .unwrap_err();
    assert!(!err.is_internal());
    assert!(reconciler.cluster().is_none());
    assert_eq!(reconciler.hook().armed(), None);
}

#[test]
fn dropping_the_reconciler_tears_the_cluster_down() {
    let launcher = FakeLauncher::new();
    {
        let mut reconciler = ClusterReconciler::new(&plain_config(), SharedOutput::null());
        reconciler
            .reconcile(&set(&launcher, vec![Box::new(NumNodes(1))]), true)
            .unwrap();
        assert_eq!(launcher.lifecycle.teardowns.get(), 0);
    }
    assert_eq!(launcher.lifecycle.teardowns.get(), 1);
}

#[test]
fn release_disarms_the_hook() {
    let launcher = FakeLauncher::new();
    let mut reconciler = ClusterReconciler::new(&plain_config(), SharedOutput::null());
    reconciler
        .reconcile(&set(&launcher, vec![Box::new(NumNodes(1))]), true)
        .unwrap();

    reconciler.release();
    assert_eq!(reconciler.hook().armed(), None);
    assert!(reconciler.cluster().is_none());
    drop(reconciler);
    assert_eq!(launcher.lifecycle.teardowns.get(), 1);
}

#[test]
fn adopted_cluster_is_reused_and_owned() {
    let launcher = FakeLauncher::new();
    let existing = FakeCluster::new(1, 4, launcher.lifecycle.clone(), launcher.client.clone());
    let mut reconciler = ClusterReconciler::with_cluster(&plain_config(), SharedOutput::null(), existing);
    assert_eq!(reconciler.hook().armed(), Some(4));

    reconciler
        .reconcile(&set(&launcher, vec![Box::new(NumNodes(1))]), true)
        .unwrap();
    assert_eq!(reconciler.last_acquisition(), Some(Acquisition::Reused));
    assert_eq!(launcher.lifecycle.launches.get(), 0);
}
