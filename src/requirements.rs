//! Cluster requirements.
//!
//! A [`Requirement`] is a predicate over a cluster plus the mutation that makes
//! it true. Requirements are evaluated jointly: making one met may break
//! another, so callers re-check the whole set after mutating.
//!
//! [`RequirementSet`] is the stock [`Requirements`] implementation. It asks each
//! requirement to shape the [`LaunchOptions`] of a fresh cluster, hands those to
//! a [`ClusterLauncher`], then applies any requirement the launcher could not
//! express directly.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use crate::cluster::Cluster;
use crate::config::{Auth, DEFAULT_HTTP_TIMEOUT_SECS};
use crate::errors::{HarnessError, Result};
use crate::output::SharedOutput;

pub trait Requirement<C: Cluster>: fmt::Display {
    fn is_met(&self, cluster: &C) -> bool;

    /// Whether `make_met` can be applied to this cluster in place. Requirements
    /// that can only be satisfied by a fresh cluster return false.
    fn can_be_met(&self, _cluster: &C) -> bool {
        true
    }

    fn make_met(&self, cluster: &mut C, out: &SharedOutput) -> Result<()>;

    /// Shape the launch of a fresh cluster.
    fn configure(&self, _options: &mut LaunchOptions) {}
}

/// The requirement model consumed by the reconciler.
pub trait Requirements<C: Cluster>: fmt::Display {
    fn get_unmet_requirements(&self, cluster: &C) -> Vec<&dyn Requirement<C>>;

    /// Whether the whole set can be reached from `cluster`, and which
    /// requirements currently need their mutation applied.
    fn is_satisfiable(&self, cluster: &C) -> (bool, Vec<&dyn Requirement<C>>);

    /// Start a fresh cluster from `base`, shaped by every requirement.
    fn create_cluster(&self, base: LaunchOptions, out: &SharedOutput) -> Result<C>;
}

/// Parameters for starting a fresh cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    pub auth: Auth,
    pub index: usize,
    pub dir: PathBuf,
    pub num_nodes: usize,
    /// Default request timeout for the nodes' handles.
    pub http_timeout: Duration,
    /// Free-form settings contributed by requirements (services, edition, ...).
    pub settings: BTreeMap<String, String>,
}

impl LaunchOptions {
    pub fn new(auth: &Auth, index: usize, dir: &Path) -> Self {
        Self {
            auth: auth.clone(),
            index,
            dir: dir.to_path_buf(),
            num_nodes: 1,
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            settings: BTreeMap::new(),
        }
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }
}

/// Starts node processes for a new cluster generation.
pub trait ClusterLauncher<C: Cluster> {
    fn launch(&self, options: &LaunchOptions, out: &SharedOutput) -> Result<C>;
}

pub struct RequirementSet<C: Cluster> {
    requirements: Vec<Box<dyn Requirement<C>>>,
    launcher: Rc<dyn ClusterLauncher<C>>,
}

impl<C: Cluster> RequirementSet<C> {
    pub fn new(requirements: Vec<Box<dyn Requirement<C>>>, launcher: Rc<dyn ClusterLauncher<C>>) -> Self {
        Self {
            requirements,
            launcher,
        }
    }

    pub fn len(&self) -> usize {
        self.requirements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }
}

impl<C: Cluster> Requirements<C> for RequirementSet<C> {
    fn get_unmet_requirements(&self, cluster: &C) -> Vec<&dyn Requirement<C>> {
        self.requirements
            .iter()
            .map(|r| r.as_ref())
            .filter(|r| !r.is_met(cluster))
            .collect()
    }

    fn is_satisfiable(&self, cluster: &C) -> (bool, Vec<&dyn Requirement<C>>) {
        let unmet = self.get_unmet_requirements(cluster);
        let satisfiable = unmet.iter().all(|r| r.can_be_met(cluster));
        (satisfiable, unmet)
    }

    fn create_cluster(&self, base: LaunchOptions, out: &SharedOutput) -> Result<C> {
        let mut options = base;
        for requirement in &self.requirements {
            requirement.configure(&mut options);
        }
        let mut cluster = self.launcher.launch(&options, out)?;
        for requirement in &self.requirements {
            if !requirement.is_met(&cluster) {
                requirement.make_met(&mut cluster, out)?;
            }
        }
        Ok(cluster)
    }
}

impl<C: Cluster> fmt::Display for RequirementSet<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.requirements.iter().map(|r| r.to_string()).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

type Check<C> = Box<dyn Fn(&C) -> bool>;
type Apply<C> = Box<dyn Fn(&mut C, &SharedOutput) -> Result<()>>;

/// Requirement assembled from closures, for one-off needs that don't deserve
/// their own type.
pub struct FnRequirement<C> {
    name: String,
    is_met: Check<C>,
    can_be_met: Check<C>,
    make_met: Apply<C>,
}

impl<C> FnRequirement<C> {
    pub fn new(
        name: impl Into<String>,
        is_met: impl Fn(&C) -> bool + 'static,
        make_met: impl Fn(&mut C, &SharedOutput) -> Result<()> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            is_met: Box::new(is_met),
            can_be_met: Box::new(|_: &C| true),
            make_met: Box::new(make_met),
        }
    }

    pub fn only_fresh(mut self, can_be_met: impl Fn(&C) -> bool + 'static) -> Self {
        self.can_be_met = Box::new(can_be_met);
        self
    }
}

impl<C> fmt::Display for FnRequirement<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl<C: Cluster> Requirement<C> for FnRequirement<C> {
    fn is_met(&self, cluster: &C) -> bool {
        (self.is_met)(cluster)
    }

    fn can_be_met(&self, cluster: &C) -> bool {
        (self.can_be_met)(cluster)
    }

    fn make_met(&self, cluster: &mut C, out: &SharedOutput) -> Result<()> {
        (self.make_met)(cluster, out)
    }
}

/// The cluster must have exactly `n` connected nodes. Only satisfiable by a
/// fresh cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumNodes(pub usize);

impl fmt::Display for NumNodes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NumNodes({})", self.0)
    }
}

impl<C: Cluster> Requirement<C> for NumNodes {
    fn is_met(&self, cluster: &C) -> bool {
        cluster.connected_nodes().len() == self.0
    }

    fn can_be_met(&self, _cluster: &C) -> bool {
        false
    }

    fn make_met(&self, _cluster: &mut C, _out: &SharedOutput) -> Result<()> {
        Err(HarnessError::Cluster(format!(
            "{} requires a fresh cluster",
            self
        )))
    }

    fn configure(&self, options: &mut LaunchOptions) {
        options.num_nodes = self.0;
    }
}
