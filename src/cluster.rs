//! Cluster and node handles.
//!
//! The harness never spawns node processes itself. A [`Cluster`] implementation
//! owns them and exposes just what reconciliation, teardown and the HTTP
//! helpers need.

use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use crate::config::{Auth, DEFAULT_HTTP_TIMEOUT_SECS};
use crate::errors::Result;
use crate::http::HttpClient;

/// Connection details for one node of a running cluster.
#[derive(Clone)]
pub struct NodeHandle {
    pub index: usize,
    /// Base URL of the node's REST endpoint, without trailing slash.
    pub url: String,
    pub auth: Auth,
    /// Request timeout used when a call does not set its own.
    pub timeout: Duration,
    client: Rc<dyn HttpClient>,
}

impl NodeHandle {
    pub fn new(index: usize, url: impl Into<String>, auth: Auth, client: Rc<dyn HttpClient>) -> Self {
        Self {
            index,
            url: url.into(),
            auth,
            timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            client,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn client(&self) -> &dyn HttpClient {
        self.client.as_ref()
    }
}

impl fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeHandle")
            .field("index", &self.index)
            .field("url", &self.url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// A running cluster generation.
pub trait Cluster {
    /// Nodes currently joined to the cluster, in order.
    fn connected_nodes(&self) -> &[NodeHandle];

    fn auth(&self) -> &Auth;

    /// Generation index this cluster was started with.
    fn index(&self) -> usize;

    /// Number of node processes started for this cluster. The next generation
    /// starts past them.
    fn process_count(&self) -> usize;

    /// Stop every node process. Must be idempotent and must not fail on
    /// resources that are already released.
    fn teardown(&mut self);

    fn delete_bucket(&mut self, name: &str) -> Result<()>;
}
