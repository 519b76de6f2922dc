//! Test harness for clustered database integration tests.
//!
//! Testsets declare the cluster shape they need; the [`reconcile`] module reuses,
//! mutates or replaces the running cluster to match, and the [`runner`] executes
//! setup, tests and teardowns with output interception, failure containment and
//! reproducible per-phase randomness.

pub mod cli;
pub mod cluster;
pub mod config;
pub mod driver;
pub mod errors;
pub mod http;
pub mod output;
pub mod poll;
pub mod reconcile;
pub mod report;
pub mod requirements;
pub mod runner;
pub mod seed;

pub use crate::cli::HarnessArgs;
pub use crate::cluster::{Cluster, NodeHandle};
pub use crate::config::{Auth, HarnessConfig};
pub use crate::driver::{Driver, RunSummary};
pub use crate::errors::{ErrorType, HarnessError, Result};
pub use crate::output::{OutputSink, SharedOutput};
pub use crate::poll::poll_for_condition;
pub use crate::reconcile::{Acquisition, ClusterReconciler};
pub use crate::requirements::{ClusterLauncher, LaunchOptions, NumNodes, Requirement, RequirementSet, Requirements};
pub use crate::runner::{TestCase, TestContext, TestSet, TestsetOutcome, TestsetRunner};
pub use crate::seed::{PhaseRng, Seed, SeedChain};
