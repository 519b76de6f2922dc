//! Control-plane HTTP helpers.
//!
//! Helpers take a [`Target`] (a cluster, addressed through its first connected
//! node, or a single node), a path and optionally an expected status code. A
//! status mismatch is an assertion failure carrying method, URL, actual and
//! expected codes, and the response body.
//!
//! The transport itself is behind [`HttpClient`]; credentials are injected from
//! the target unless [`RequestOptions::auth`] overrides them.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value as Json;
use tracing::trace;

use crate::cluster::{Cluster, NodeHandle};
use crate::config::Auth;
use crate::errors::{HarnessError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// Raw form body, e.g. an Erlang expression for `/diag/eval`.
    Data(String),
    Json(Json),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub auth: Auth,
    pub body: Option<Body>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub method: Method,
    pub url: String,
    pub status: u16,
    pub reason: String,
    pub body: String,
}

impl HttpResponse {
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_str(&self.body)
    }
}

/// Blocking transport used by every helper.
pub trait HttpClient {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// Something requests can be addressed to.
pub trait Target {
    fn endpoint(&self) -> Result<&NodeHandle>;
    fn default_auth(&self) -> &Auth;
}

impl<C: Cluster> Target for C {
    fn endpoint(&self) -> Result<&NodeHandle> {
        self.connected_nodes()
            .first()
            .ok_or(HarnessError::NoConnectedNodes)
    }

    fn default_auth(&self) -> &Auth {
        self.auth()
    }
}

impl Target for NodeHandle {
    fn endpoint(&self) -> Result<&NodeHandle> {
        Ok(self)
    }

    fn default_auth(&self) -> &Auth {
        &self.auth
    }
}

#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub auth: Option<Auth>,
    pub body: Option<Body>,
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn auth(mut self, auth: Auth) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn data(mut self, data: impl Into<String>) -> Self {
        self.body = Some(Body::Data(data.into()));
        self
    }

    pub fn json(mut self, json: Json) -> Self {
        self.body = Some(Body::Json(json));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

pub fn request<T: Target + ?Sized>(
    method: Method,
    target: &T,
    path: &str,
    expected_code: Option<u16>,
    opts: RequestOptions,
) -> Result<HttpResponse> {
    let node = target.endpoint()?;
    let request = HttpRequest {
        method,
        url: format!("{}{}", node.url, path),
        auth: opts.auth.unwrap_or_else(|| target.default_auth().clone()),
        body: opts.body,
        timeout: opts.timeout.unwrap_or(node.timeout),
    };
    trace!(%method, url = %request.url, "sending request");
    let res = node.client().send(request)?;
    if let Some(expected) = expected_code {
        assert_http_code(expected, &res)?;
    }
    Ok(res)
}

pub fn get<T: Target + ?Sized>(target: &T, path: &str, opts: RequestOptions) -> Result<HttpResponse> {
    request(Method::Get, target, path, None, opts)
}

pub fn get_succ<T: Target + ?Sized>(target: &T, path: &str, opts: RequestOptions) -> Result<HttpResponse> {
    request(Method::Get, target, path, Some(200), opts)
}

pub fn get_fail<T: Target + ?Sized>(
    target: &T,
    path: &str,
    expected_code: u16,
    opts: RequestOptions,
) -> Result<HttpResponse> {
    request(Method::Get, target, path, Some(expected_code), opts)
}

pub fn post<T: Target + ?Sized>(target: &T, path: &str, opts: RequestOptions) -> Result<HttpResponse> {
    request(Method::Post, target, path, None, opts)
}

pub fn post_succ<T: Target + ?Sized>(target: &T, path: &str, opts: RequestOptions) -> Result<HttpResponse> {
    request(Method::Post, target, path, Some(200), opts)
}

pub fn post_fail<T: Target + ?Sized>(
    target: &T,
    path: &str,
    expected_code: u16,
    opts: RequestOptions,
) -> Result<HttpResponse> {
    request(Method::Post, target, path, Some(expected_code), opts)
}

pub fn put_succ<T: Target + ?Sized>(target: &T, path: &str, opts: RequestOptions) -> Result<HttpResponse> {
    request(Method::Put, target, path, Some(200), opts)
}

pub fn delete<T: Target + ?Sized>(target: &T, path: &str, opts: RequestOptions) -> Result<HttpResponse> {
    request(Method::Delete, target, path, None, opts)
}

pub fn delete_succ<T: Target + ?Sized>(target: &T, path: &str, opts: RequestOptions) -> Result<HttpResponse> {
    request(Method::Delete, target, path, Some(200), opts)
}

/// DELETE that tolerates the resource already being gone.
pub fn ensure_deleted<T: Target + ?Sized>(target: &T, path: &str, opts: RequestOptions) -> Result<HttpResponse> {
    let res = delete(target, path, opts)?;
    if res.status == 200 || res.status == 404 {
        Ok(res)
    } else {
        Err(format_http_error(&res, &[200, 404]))
    }
}

pub fn assert_http_code(expected_code: u16, res: &HttpResponse) -> Result<()> {
    if res.status == expected_code {
        Ok(())
    } else {
        Err(format_http_error(res, &[expected_code]))
    }
}

pub fn format_http_error(res: &HttpResponse, expected_codes: &[u16]) -> HarnessError {
    let expected = expected_codes
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(" or ");
    HarnessError::HttpStatus {
        method: res.method,
        url: res.url.clone(),
        status: res.status,
        reason: res.reason.clone(),
        expected,
        body: res.body.clone(),
    }
}

/// Decode a JSON body, failing with `error` as the assertion message.
pub fn json_response(res: &HttpResponse, error: &str) -> Result<Json> {
    res.json().map_err(|_| HarnessError::JsonDecode {
        context: error.to_string(),
        body: res.body.clone(),
    })
}

pub fn assert_json_key<'a>(expected_key: &str, json: &'a Json, context: &str) -> Result<&'a Json> {
    json.get(expected_key)
        .ok_or_else(|| HarnessError::MissingJsonKey {
            key: expected_key.to_string(),
            context: context.to_string(),
            json: json.to_string(),
        })
}

pub fn delete_config_key<C: Cluster>(cluster: &C, key: &str) -> Result<HttpResponse> {
    post_succ(
        cluster,
        "/diag/eval",
        RequestOptions::new().data(format!("ns_config:delete({})", key)),
    )
}

pub fn delete_all_buckets<C: Cluster>(cluster: &mut C, opts: RequestOptions) -> Result<()> {
    let res = get_succ(&*cluster, "/pools/default/buckets", opts)?;
    let buckets = json_response(&res, "/pools/default/buckets response was not json")?;
    let names: Vec<String> = buckets
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|bucket| bucket.get("name").and_then(Json::as_str))
        .map(str::to_string)
        .collect();
    for name in names {
        cluster.delete_bucket(&name)?;
    }
    Ok(())
}

/// Map of node name to its Erlang OTP node name, from `/nodeStatuses`.
pub fn get_otp_nodes<C: Cluster>(cluster: &C) -> Result<BTreeMap<String, String>> {
    let info = json_response(
        &get(cluster, "/nodeStatuses", RequestOptions::new())?,
        "/nodeStatuses response was not json",
    )?;
    let Some(statuses) = info.as_object() else {
        return Err(HarnessError::JsonDecode {
            context: "/nodeStatuses response was not an object".to_string(),
            body: info.to_string(),
        });
    };
    statuses
        .iter()
        .map(|(node, status)| -> Result<(String, String)> {
            let otp = assert_json_key("otpNode", status, "/nodeStatuses")?;
            let otp = otp.as_str().ok_or_else(|| HarnessError::JsonDecode {
                context: format!("otpNode of {} is not a string", node),
                body: status.to_string(),
            })?;
            Ok((node.clone(), otp.to_string()))
        })
        .collect()
}
