mod common;

use std::io::Write as _;
use std::rc::Rc;

use miette::miette;

use cluster_harness::driver::CLUSTER_UNAVAILABLE;
use cluster_harness::requirements::{NumNodes, Requirement};
use cluster_harness::runner::{Progress, TestCase, TestContext, TestSet};
use cluster_harness::{test_cases, Driver, HarnessArgs, HarnessConfig, Seed, SharedOutput};

use clap::Parser;
use common::{plain_config, FakeCluster, FakeLauncher};

struct Single;

impl Single {
    fn test_passes(&mut self, _ctx: &mut TestContext<'_, FakeCluster>) -> miette::Result<()> {
        Ok(())
    }

    fn test_node_count(&mut self, ctx: &mut TestContext<'_, FakeCluster>) -> miette::Result<()> {
        cluster_harness::harness_assert!(ctx.cluster.nodes.len() == 1, "expected one node");
        Ok(())
    }
}

impl TestSet for Single {
    type Cluster = FakeCluster;

    fn new(_cluster: &FakeCluster) -> Self {
        Single
    }

    fn requirements() -> Vec<Box<dyn Requirement<FakeCluster>>> {
        vec![Box::new(NumNodes(1))]
    }

    fn tests() -> Vec<TestCase<Self>> {
        test_cases![test_passes, test_node_count]
    }

    fn setup(&mut self, _ctx: &mut TestContext<'_, FakeCluster>) -> miette::Result<()> {
        Ok(())
    }

    fn teardown(&mut self, _ctx: &mut TestContext<'_, FakeCluster>) -> miette::Result<()> {
        Ok(())
    }
}

struct Pair;

impl Pair {
    fn test_fails(&mut self, _ctx: &mut TestContext<'_, FakeCluster>) -> miette::Result<()> {
        Err(miette!("rebalance did not finish"))
    }
}

impl TestSet for Pair {
    type Cluster = FakeCluster;

    fn new(_cluster: &FakeCluster) -> Self {
        Pair
    }

    fn requirements() -> Vec<Box<dyn Requirement<FakeCluster>>> {
        vec![Box::new(NumNodes(2))]
    }

    fn tests() -> Vec<TestCase<Self>> {
        test_cases![test_fails]
    }

    fn setup(&mut self, _ctx: &mut TestContext<'_, FakeCluster>) -> miette::Result<()> {
        Ok(())
    }

    fn teardown(&mut self, _ctx: &mut TestContext<'_, FakeCluster>) -> miette::Result<()> {
        Ok(())
    }
}

fn driver(launcher: &Rc<FakeLauncher>, out: SharedOutput) -> Driver<FakeCluster> {
    Driver::new(plain_config(), out, launcher.clone(), Seed::from_u64(11))
}

#[test]
fn clusters_follow_testset_requirements() {
    let launcher = FakeLauncher::new();
    let (out, seen) = SharedOutput::buffer();
    let mut driver = driver(&launcher, out);

    let first = driver.run_testset::<Single>(Some(Progress { position: 1, total: 3 })).unwrap();
    assert!(first.passed());
    let second = driver.run_testset::<Single>(Some(Progress { position: 2, total: 3 })).unwrap();
    assert!(second.passed());
    assert_eq!(launcher.lifecycle.launches.get(), 1);

    let third = driver.run_testset::<Pair>(Some(Progress { position: 3, total: 3 })).unwrap();
    assert_eq!(third.errors.len(), 1);
    assert_eq!(launcher.lifecycle.launches.get(), 2);
    assert_eq!(launcher.lifecycle.teardowns.get(), 1);

    driver.print_summary();
    let summary = driver.finish();
    assert_eq!(summary.testsets, 3);
    assert_eq!(summary.executed, 5);
    assert_eq!(summary.errors.len(), 1);
    assert!(!summary.success());
    assert_eq!(launcher.lifecycle.teardowns.get(), 2);

    let text = seen.borrow().as_str().to_string();
    assert!(text.starts_with("Using seed 0b000000000000000000000000000000\n"));
    assert!(text.contains("Starting testset [3/3]: Pair..."));
    assert!(text.contains("Tests: 5 executed in 3 testsets"));
    assert!(text.contains("  - Pair.test_fails: rebalance did not finish"));
}

#[test]
fn unavailable_cluster_marks_tests_not_ran() {
    let launcher = FakeLauncher::new();
    launcher.fail.set(true);
    let mut driver = driver(&launcher, SharedOutput::null());

    let outcome = driver.run_testset::<Single>(None).unwrap();
    assert_eq!(outcome.executed, 0);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].name, "Single.cluster");
    assert_eq!(outcome.not_ran.len(), 2);
    assert!(outcome.not_ran.iter().all(|n| n.reason == CLUSTER_UNAVAILABLE));
}

#[test]
fn filter_and_no_reuse() {
    let launcher = FakeLauncher::new();
    let mut driver = driver(&launcher, SharedOutput::null())
        .without_reuse()
        .with_filter(Some("count".to_string()));

    let outcome = driver.run_testset::<Single>(None).unwrap();
    assert_eq!(outcome.executed, 1);
    driver.run_testset::<Single>(None).unwrap();
    assert_eq!(launcher.lifecycle.launches.get(), 2);
    assert_eq!(driver.reconciler().hook().armed(), Some(1));
}

#[test]
fn config_file_then_flags() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "verbose: true\nwidth: 100\nhttp_timeout_secs: 5\nauth:\n  username: admin\n  password: pw"
    )
    .unwrap();

    let loaded = HarnessConfig::from_yaml_file(file.path()).unwrap();
    assert!(loaded.verbose);
    assert_eq!(loaded.width, 100);
    assert_eq!(loaded.http_timeout().as_secs(), 5);
    assert_eq!(loaded.auth.username, "admin");
    assert!(!loaded.dry_run);

    let path = file.path().to_str().unwrap();
    let args = HarnessArgs::try_parse_from(["harness", "--config", path, "--width", "60", "--dry-run"]).unwrap();
    let (config, _seed) = args.resolve().unwrap();
    assert!(config.verbose);
    assert!(config.dry_run);
    assert_eq!(config.width, 60);
}
