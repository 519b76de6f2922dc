//! Thin driver: acquire a cluster for each testset, run it, summarise.

use std::io::Write as _;
use std::rc::Rc;

use termcolor::{Buffer, Color, ColorSpec, WriteColor};
use tracing::warn;

use crate::cluster::Cluster;
use crate::config::HarnessConfig;
use crate::errors::Result;
use crate::output::SharedOutput;
use crate::reconcile::ClusterReconciler;
use crate::requirements::{ClusterLauncher, RequirementSet};
use crate::runner::{short_type_name, NotRan, Progress, TestError, TestSet, TestsetOutcome, TestsetRunner};
use crate::seed::Seed;

pub const CLUSTER_UNAVAILABLE: &str = "cluster could not be acquired";

/// Totals across every testset of a run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub testsets: usize,
    pub executed: usize,
    /// `(qualified name, message)` per failure.
    pub errors: Vec<(String, String)>,
    pub not_ran: Vec<NotRan>,
}

impl RunSummary {
    pub fn record(&mut self, outcome: &TestsetOutcome) {
        self.testsets += 1;
        self.executed += outcome.executed;
        self.errors.extend(
            outcome
                .errors
                .iter()
                .map(|e| (e.name.clone(), e.error.to_string())),
        );
        self.not_ran.extend(outcome.not_ran.iter().cloned());
    }

    pub fn success(&self) -> bool {
        self.errors.is_empty() && self.not_ran.is_empty()
    }
}

pub struct Driver<C: Cluster> {
    config: HarnessConfig,
    out: SharedOutput,
    reconciler: ClusterReconciler<C>,
    launcher: Rc<dyn ClusterLauncher<C>>,
    seed: Seed,
    reuse_allowed: bool,
    filter: Option<String>,
    summary: RunSummary,
}

impl<C: Cluster> Driver<C> {
    pub fn new(config: HarnessConfig, out: SharedOutput, launcher: Rc<dyn ClusterLauncher<C>>, seed: Seed) -> Self {
        out.line(&format!("Using seed {}", seed));
        let reconciler = ClusterReconciler::new(&config, out.clone());
        Self {
            config,
            out,
            reconciler,
            launcher,
            seed,
            reuse_allowed: true,
            filter: None,
            summary: RunSummary::default(),
        }
    }

    /// Always start a fresh cluster per testset.
    pub fn without_reuse(mut self) -> Self {
        self.reuse_allowed = false;
        self
    }

    /// Only run tests whose name contains `filter`.
    pub fn with_filter(mut self, filter: Option<String>) -> Self {
        self.filter = filter;
        self
    }

    pub fn reconciler(&self) -> &ClusterReconciler<C> {
        &self.reconciler
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    /// Acquire a cluster for `T` and run its tests.
    ///
    /// Only an internal harness error is returned as `Err`; a cluster that
    /// cannot be acquired for other reasons marks the testset as not ran.
    pub fn run_testset<T>(&mut self, progress: Option<Progress>) -> Result<TestsetOutcome>
    where
        T: TestSet<Cluster = C>,
    {
        let names: Vec<&'static str> = T::tests()
            .iter()
            .map(|case| case.name)
            .filter(|name| self.filter.as_deref().map_or(true, |f| name.contains(f)))
            .collect();

        let requirements = RequirementSet::new(T::requirements(), self.launcher.clone());
        let cluster = match self.reconciler.reconcile(&requirements, self.reuse_allowed) {
            Ok(cluster) => cluster,
            Err(err) if err.is_internal() => return Err(err),
            Err(err) => {
                let testset = short_type_name::<T>();
                warn!(%testset, error = %err, "cluster acquisition failed");
                let outcome = TestsetOutcome {
                    executed: 0,
                    errors: vec![TestError {
                        name: format!("{}.cluster", testset),
                        error: err.into(),
                    }],
                    not_ran: names
                        .iter()
                        .map(|name| NotRan {
                            name: name.to_string(),
                            reason: CLUSTER_UNAVAILABLE.to_string(),
                        })
                        .collect(),
                };
                self.summary.record(&outcome);
                return Ok(outcome);
            }
        };

        let mut testset = T::new(cluster);
        let runner = TestsetRunner::new(&self.config, &self.out);
        let outcome = runner.run(&mut testset, cluster, &names, true, self.seed, progress);
        self.summary.record(&outcome);
        Ok(outcome)
    }

    /// Print the run summary.
    pub fn print_summary(&self) {
        let mut buffer = if self.config.use_colors {
            Buffer::ansi()
        } else {
            Buffer::no_color()
        };
        // Writes into an in-memory buffer cannot fail.
        let _ = render_summary(&mut buffer, &self.summary);
        self.out.write(&String::from_utf8_lossy(buffer.as_slice()));
    }

    /// Release the cluster and return the totals.
    pub fn finish(mut self) -> RunSummary {
        self.reconciler.release();
        std::mem::take(&mut self.summary)
    }
}

fn render_summary(w: &mut impl WriteColor, summary: &RunSummary) -> std::io::Result<()> {
    writeln!(w)?;
    w.set_color(ColorSpec::new().set_bold(true))?;
    writeln!(
        w,
        "Tests: {} executed in {} testsets",
        summary.executed, summary.testsets
    )?;
    w.reset()?;

    if summary.errors.is_empty() {
        w.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
        writeln!(w, "No errors")?;
        w.reset()?;
    } else {
        w.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true))?;
        writeln!(w, "Errors ({}):", summary.errors.len())?;
        w.reset()?;
        for (name, message) in &summary.errors {
            writeln!(w, "  - {}: {}", name, message)?;
        }
    }

    if !summary.not_ran.is_empty() {
        w.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)))?;
        writeln!(w, "Not ran ({}):", summary.not_ran.len())?;
        w.reset()?;
        for not_ran in &summary.not_ran {
            writeln!(w, "  - {} ({})", not_ran.name, not_ran.reason)?;
        }
    }
    Ok(())
}
