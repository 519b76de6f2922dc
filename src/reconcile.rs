//! Cluster reconciliation.
//!
//! [`ClusterReconciler`] owns the running cluster between testsets. For each
//! testset it either reuses the cluster as is, mutates it in place until the
//! requirements hold, or tears it down and starts a fresh generation.
//!
//! The reconciler also owns cleanup: exactly one hook is armed for the cluster it
//! hands out, and dropping the reconciler with an armed hook tears the cluster
//! down.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info};

use crate::cluster::Cluster;
use crate::config::{Auth, HarnessConfig};
use crate::errors::{HarnessError, Result};
use crate::output::SharedOutput;
use crate::requirements::{LaunchOptions, Requirement, Requirements};

const RULE: &str = "================================================================================";

/// How the last `reconcile` call obtained its cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquisition {
    /// Existing cluster already satisfied every requirement.
    Reused,
    /// Existing cluster was mutated in place.
    Reconciled,
    /// A new cluster generation was started.
    Created,
}

/// Cleanup registration for the active cluster generation.
#[derive(Debug, Default)]
pub struct CleanupHook {
    armed: Option<usize>,
}

impl CleanupHook {
    /// Arm the hook for `index`, replacing whatever was armed before.
    fn register(&mut self, index: usize) {
        if let Some(previous) = self.armed.take() {
            debug!(previous, "replacing cleanup hook");
        }
        self.armed = Some(index);
    }

    fn deregister(&mut self) -> Option<usize> {
        self.armed.take()
    }

    /// Index of the generation the hook is armed for.
    pub fn armed(&self) -> Option<usize> {
        self.armed
    }
}

pub struct ClusterReconciler<C: Cluster> {
    cluster: Option<C>,
    next_index: usize,
    hook: CleanupHook,
    auth: Auth,
    cluster_dir: PathBuf,
    http_timeout: Duration,
    verbose: bool,
    out: SharedOutput,
    last: Option<Acquisition>,
}

impl<C: Cluster> ClusterReconciler<C> {
    pub fn new(config: &HarnessConfig, out: SharedOutput) -> Self {
        Self {
            cluster: None,
            next_index: 0,
            hook: CleanupHook::default(),
            auth: config.auth.clone(),
            cluster_dir: config.cluster_dir.clone(),
            http_timeout: config.http_timeout(),
            verbose: config.verbose,
            out,
            last: None,
        }
    }

    /// Start from an already running cluster.
    pub fn with_cluster(config: &HarnessConfig, out: SharedOutput, cluster: C) -> Self {
        let mut reconciler = Self::new(config, out);
        reconciler.hook.register(cluster.index());
        reconciler.next_index = cluster.index();
        reconciler.cluster = Some(cluster);
        reconciler
    }

    pub fn cluster(&self) -> Option<&C> {
        self.cluster.as_ref()
    }

    pub fn cluster_mut(&mut self) -> Option<&mut C> {
        self.cluster.as_mut()
    }

    pub fn hook(&self) -> &CleanupHook {
        &self.hook
    }

    pub fn last_acquisition(&self) -> Option<Acquisition> {
        self.last
    }

    /// Return a cluster satisfying `requirements`.
    ///
    /// With `reuse_allowed` unset the current cluster is always replaced. An
    /// error of type [`HarnessError::UnmetAfterReconcile`] means a requirement's
    /// mutation did not make it met; it is a harness bug, not a test failure.
    pub fn reconcile<R>(&mut self, requirements: &R, reuse_allowed: bool) -> Result<&mut C>
    where
        R: Requirements<C> + ?Sized,
    {
        let acquisition = if reuse_allowed {
            self.try_reuse(requirements)?
        } else {
            None
        };

        let acquisition = match acquisition {
            Some(acquisition) => acquisition,
            None => {
                self.replace(requirements)?;
                Acquisition::Created
            }
        };
        self.last = Some(acquisition);

        let cluster = self
            .cluster
            .as_mut()
            .ok_or_else(|| HarnessError::Cluster("no cluster after reconciliation".to_string()))?;
        if acquisition != Acquisition::Created {
            self.hook.register(cluster.index());
        }
        Ok(cluster)
    }

    /// Tear down the active cluster and disarm its hook.
    pub fn release(&mut self) {
        if let Some(mut cluster) = self.cluster.take() {
            info!(index = cluster.index(), "releasing cluster");
            cluster.teardown();
            self.hook.deregister();
        }
    }

    fn try_reuse<R>(&mut self, requirements: &R) -> Result<Option<Acquisition>>
    where
        R: Requirements<C> + ?Sized,
    {
        let Some(cluster) = self.cluster.as_mut() else {
            return Ok(None);
        };

        if requirements.get_unmet_requirements(cluster).is_empty() {
            debug!(index = cluster.index(), "reusing cluster unchanged");
            return Ok(Some(Acquisition::Reused));
        }

        let (satisfiable, unsatisfied) = requirements.is_satisfiable(cluster);
        if !satisfiable {
            debug!(
                unmet = %describe(&unsatisfied),
                "requirements not reachable from current cluster"
            );
            return Ok(None);
        }

        // TODO: order mutations by declared dependencies once requirements can
        // express them; declaration order is assumed to be safe for now.
        let sink = if self.verbose {
            self.out.clone()
        } else {
            SharedOutput::null()
        };
        for requirement in &unsatisfied {
            debug!(%requirement, "making requirement met");
            requirement.make_met(cluster, &sink)?;
        }

        let remaining = requirements.get_unmet_requirements(cluster);
        if !remaining.is_empty() {
            return Err(HarnessError::UnmetAfterReconcile {
                unmet: describe(&remaining),
            });
        }
        Ok(Some(Acquisition::Reconciled))
    }

    fn replace<R>(&mut self, requirements: &R) -> Result<()>
    where
        R: Requirements<C> + ?Sized,
    {
        if let Some(mut old) = self.cluster.take() {
            info!(index = old.index(), "tearing down cluster");
            old.teardown();
            self.hook.deregister();
            // New node indexes start past every process of the old generation.
            self.next_index = old.index() + old.process_count().max(1);
        }

        self.out.line(&format!(
            "Starting cluster to satisfy requirements: {}",
            requirements
        ));
        let base = LaunchOptions::new(&self.auth, self.next_index, &self.cluster_dir)
            .with_http_timeout(self.http_timeout);
        let cluster = requirements.create_cluster(base, &self.out)?;
        info!(index = cluster.index(), nodes = cluster.connected_nodes().len(), "cluster started");
        let cluster = self.cluster.insert(cluster);
        self.hook.register(cluster.index());

        let unmet = requirements.get_unmet_requirements(cluster);
        if !unmet.is_empty() {
            return Err(HarnessError::UnmetAfterReconcile {
                unmet: describe(&unmet),
            });
        }
        self.out.line(&format!("\n{}\n", RULE));
        Ok(())
    }
}

impl<C: Cluster> Drop for ClusterReconciler<C> {
    fn drop(&mut self) {
        if self.hook.armed().is_some() {
            self.release();
        }
    }
}

fn describe<C: Cluster>(requirements: &[&dyn Requirement<C>]) -> String {
    requirements
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
