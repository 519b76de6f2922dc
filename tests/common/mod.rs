//! In-process fakes shared by the integration tests: a cluster that records
//! its lifecycle, a launcher that builds it, and a scripted HTTP client.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use cluster_harness::cluster::{Cluster, NodeHandle};
use cluster_harness::config::{Auth, HarnessConfig};
use cluster_harness::errors::{HarnessError, Result};
use cluster_harness::http::{HttpClient, HttpRequest, HttpResponse, Method};
use cluster_harness::output::SharedOutput;
use cluster_harness::requirements::{ClusterLauncher, LaunchOptions};

// =============================================================================
// HTTP
// =============================================================================

/// Answers from a table keyed by method and URL; anything else gets a 404.
#[derive(Default)]
pub struct FakeHttpClient {
    routes: RefCell<HashMap<(Method, String), (u16, String)>>,
    pub requests: RefCell<Vec<HttpRequest>>,
}

impl FakeHttpClient {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn respond(&self, method: Method, url: &str, status: u16, body: &str) {
        self.routes
            .borrow_mut()
            .insert((method, url.to_string()), (status, body.to_string()));
    }

    pub fn sent(&self) -> Vec<(Method, String)> {
        self.requests
            .borrow()
            .iter()
            .map(|r| (r.method, r.url.clone()))
            .collect()
    }
}

impl HttpClient for FakeHttpClient {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let key = (request.method, request.url.clone());
        let (status, body) = self
            .routes
            .borrow()
            .get(&key)
            .cloned()
            .unwrap_or((404, "Not found".to_string()));
        let reason = match status {
            200 => "OK",
            400 => "Bad Request",
            404 => "Object Not Found",
            _ => "Error",
        };
        let response = HttpResponse {
            method: request.method,
            url: request.url.clone(),
            status,
            reason: reason.to_string(),
            body,
        };
        self.requests.borrow_mut().push(request);
        Ok(response)
    }
}

// =============================================================================
// CLUSTER
// =============================================================================

/// Counters shared between a launcher and every cluster it starts, so they
/// survive the clusters being dropped.
#[derive(Default)]
pub struct Lifecycle {
    pub launches: Cell<usize>,
    pub teardowns: Cell<usize>,
    pub last_options: RefCell<Option<LaunchOptions>>,
    pub events: RefCell<Vec<String>>,
}

impl Lifecycle {
    pub fn event(&self, event: impl Into<String>) {
        self.events.borrow_mut().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.borrow().clone()
    }
}

pub struct FakeCluster {
    pub nodes: Vec<NodeHandle>,
    pub auth: Auth,
    pub index: usize,
    pub settings: BTreeMap<String, String>,
    pub deleted_buckets: Vec<String>,
    pub torn_down: bool,
    pub lifecycle: Rc<Lifecycle>,
    pub client: Rc<FakeHttpClient>,
}

impl std::fmt::Debug for FakeCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeCluster")
            .field("nodes", &self.nodes.len())
            .field("index", &self.index)
            .field("settings", &self.settings)
            .field("deleted_buckets", &self.deleted_buckets)
            .field("torn_down", &self.torn_down)
            .finish_non_exhaustive()
    }
}

impl FakeCluster {
    pub fn new(num_nodes: usize, index: usize, lifecycle: Rc<Lifecycle>, client: Rc<FakeHttpClient>) -> Self {
        let auth = Auth::default();
        let nodes = (0..num_nodes)
            .map(|i| {
                NodeHandle::new(
                    index + i,
                    node_url(index + i),
                    auth.clone(),
                    client.clone() as Rc<dyn HttpClient>,
                )
            })
            .collect();
        Self {
            nodes,
            auth,
            index,
            settings: BTreeMap::new(),
            deleted_buckets: Vec::new(),
            torn_down: false,
            lifecycle,
            client,
        }
    }

    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(String::as_str)
    }
}

pub fn node_url(index: usize) -> String {
    format!("http://127.0.0.1:{}", 9000 + index)
}

impl Cluster for FakeCluster {
    fn connected_nodes(&self) -> &[NodeHandle] {
        &self.nodes
    }

    fn auth(&self) -> &Auth {
        &self.auth
    }

    fn index(&self) -> usize {
        self.index
    }

    fn process_count(&self) -> usize {
        self.nodes.len()
    }

    fn teardown(&mut self) {
        if !self.torn_down {
            self.torn_down = true;
            self.lifecycle.teardowns.set(self.lifecycle.teardowns.get() + 1);
        }
    }

    fn delete_bucket(&mut self, name: &str) -> Result<()> {
        self.deleted_buckets.push(name.to_string());
        Ok(())
    }
}

pub struct FakeLauncher {
    pub lifecycle: Rc<Lifecycle>,
    pub client: Rc<FakeHttpClient>,
    pub fail: Cell<bool>,
}

impl FakeLauncher {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            lifecycle: Rc::new(Lifecycle::default()),
            client: FakeHttpClient::new(),
            fail: Cell::new(false),
        })
    }
}

impl ClusterLauncher<FakeCluster> for FakeLauncher {
    fn launch(&self, options: &LaunchOptions, out: &SharedOutput) -> Result<FakeCluster> {
        if self.fail.get() {
            return Err(HarnessError::Cluster("nodes failed to start".to_string()));
        }
        out.line(&format!("launching {} nodes at index {}", options.num_nodes, options.index));
        self.lifecycle.launches.set(self.lifecycle.launches.get() + 1);
        *self.lifecycle.last_options.borrow_mut() = Some(options.clone());
        let mut cluster = FakeCluster::new(
            options.num_nodes,
            options.index,
            self.lifecycle.clone(),
            self.client.clone(),
        );
        cluster.settings = options.settings.clone();
        cluster.nodes = cluster
            .nodes
            .into_iter()
            .map(|node| node.with_timeout(options.http_timeout))
            .collect();
        Ok(cluster)
    }
}

/// Plain output, no alignment, so assertions can match exact lines.
pub fn plain_config() -> HarnessConfig {
    HarnessConfig::plain()
}
