//! Generic resource client for admin API collections.
//!
//! # Design
//! `ResourceClient<S, D>` binds one collection endpoint to a wire shape `S`
//! and a view shape `D`. Each operation is split the way the rest of the
//! crate is: a `build_*` method produces an `HttpRequest`, the configured
//! `Transport` executes it, and the shared pipeline interprets the
//! `HttpResponse`:
//!
//! ```text
//! success (2xx)          -> then  ─┐
//! transport error / non-2xx / then failed -> error ─┴─> parse -> D
//! ```
//!
//! `delete` is the exception: it reports success as a `bool` and runs no
//! hooks.
//!
//! The client caches its HTTP configuration (base headers, including the
//! `Authorization` header) stamped with the token manager's change counter
//! and rebuilds it whenever the counter moves, so a login or logout takes
//! effect on the next request without rebuilding the client.

use std::cell::RefCell;
use std::rc::Rc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::http::{check_success, HttpMethod, HttpRequest, HttpResponse, Transport};
use crate::options::{ClientOptions, ResolvedOptions};
use crate::types::{Page, PrimaryKey};

/// Base request configuration derived from the client's auth state.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpConfig {
    /// Token manager change counter this configuration was built at.
    pub version: u64,
    pub headers: Vec<(String, String)>,
}

struct Inner<S, D> {
    options: ClientOptions<S, D>,
    transport: Rc<dyn Transport>,
    http: RefCell<Option<HttpConfig>>,
}

/// Typed CRUD and custom-action client for one collection endpoint.
///
/// Cloning is cheap and clones share the same cached HTTP configuration.
pub struct ResourceClient<S, D = S> {
    inner: Rc<Inner<S, D>>,
}

impl<S, D> Clone for ResourceClient<S, D> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<S, D> ResourceClient<S, D>
where
    S: Clone + Serialize + DeserializeOwned + 'static,
    D: Clone + DeserializeOwned + 'static,
{
    pub fn new(options: ClientOptions<S, D>, transport: Rc<dyn Transport>) -> Self {
        Self {
            inner: Rc::new(Inner {
                options,
                transport,
                http: RefCell::new(None),
            }),
        }
    }

    /// The client-level options every call starts from.
    pub fn options(&self) -> &ClientOptions<S, D> {
        &self.inner.options
    }

    pub fn resolve(
        &self,
        action: &str,
        options: Option<&ClientOptions<S, D>>,
    ) -> Result<ResolvedOptions<S, D>, ApiError> {
        self.inner.options.resolve(action, options)
    }

    /// Current HTTP configuration, rebuilt if the token changed since the
    /// last call.
    pub fn http_config(&self) -> HttpConfig {
        let auth = self.inner.options.auth.as_ref();
        // Reading the token clears an expired one, which moves the counter.
        let header = auth.and_then(|a| a.authorization_header());
        let version = auth.map(|a| a.version()).unwrap_or(0);
        if let Some(config) = self.inner.http.borrow().as_ref() {
            if config.version == version {
                return config.clone();
            }
        }

        let config = HttpConfig {
            version,
            headers: header.into_iter().collect(),
        };
        debug!(
            version,
            authorized = !config.headers.is_empty(),
            "rebuilt http configuration"
        );
        *self.inner.http.borrow_mut() = Some(config.clone());
        config
    }

    // -- request builders ---------------------------------------------------

    pub fn build_list(&self, options: Option<&ClientOptions<S, D>>) -> Result<HttpRequest, ApiError> {
        let op = self.resolve("list", options)?;
        self.request(&op, HttpMethod::Get, op.endpoint.clone(), None)
    }

    pub fn build_retrieve(
        &self,
        pk: &PrimaryKey,
        options: Option<&ClientOptions<S, D>>,
    ) -> Result<HttpRequest, ApiError> {
        let op = self.resolve("retrieve", options)?;
        self.request(&op, HttpMethod::Get, item_url(&op.endpoint, pk), None)
    }

    pub fn build_create<B: Serialize>(
        &self,
        data: &B,
        options: Option<&ClientOptions<S, D>>,
    ) -> Result<HttpRequest, ApiError> {
        let op = self.resolve("post", options)?;
        self.request(&op, HttpMethod::Post, op.endpoint.clone(), Some(to_body(data)?))
    }

    pub fn build_replace<B: Serialize>(
        &self,
        pk: &PrimaryKey,
        data: &B,
        options: Option<&ClientOptions<S, D>>,
    ) -> Result<HttpRequest, ApiError> {
        let op = self.resolve("put", options)?;
        self.request(&op, HttpMethod::Put, item_url(&op.endpoint, pk), Some(to_body(data)?))
    }

    pub fn build_partial_update<B: Serialize>(
        &self,
        pk: &PrimaryKey,
        data: &B,
        options: Option<&ClientOptions<S, D>>,
    ) -> Result<HttpRequest, ApiError> {
        let op = self.resolve("patch", options)?;
        self.request(&op, HttpMethod::Patch, item_url(&op.endpoint, pk), Some(to_body(data)?))
    }

    pub fn build_delete(
        &self,
        pk: &PrimaryKey,
        options: Option<&ClientOptions<S, D>>,
    ) -> Result<HttpRequest, ApiError> {
        let op = self.resolve("delete", options)?;
        self.request(&op, HttpMethod::Delete, item_url(&op.endpoint, pk), None)
    }

    pub fn build_action(
        &self,
        name: &str,
        pk: Option<&PrimaryKey>,
        options: Option<&ClientOptions<S, D>>,
    ) -> Result<HttpRequest, ApiError> {
        let op = self.resolve(name, options)?;
        self.action_request(&op, name, pk)
    }

    // -- operations ---------------------------------------------------------

    /// `GET endpoint`, each result parsed with action `"list"`.
    pub fn list(&self, options: Option<&ClientOptions<S, D>>) -> Result<Page<D>, ApiError> {
        let op = self.resolve("list", options)?;
        let request = self.request(&op, HttpMethod::Get, op.endpoint.clone(), None)?;
        self.run_page(&op, &request)
    }

    pub fn retrieve(
        &self,
        pk: impl Into<PrimaryKey>,
        options: Option<&ClientOptions<S, D>>,
    ) -> Result<D, ApiError> {
        let op = self.resolve("retrieve", options)?;
        let request = self.request(&op, HttpMethod::Get, item_url(&op.endpoint, &pk.into()), None)?;
        self.run(&op, &request)
    }

    /// `POST endpoint` (action `"post"`).
    pub fn create<B: Serialize>(
        &self,
        data: &B,
        options: Option<&ClientOptions<S, D>>,
    ) -> Result<D, ApiError> {
        let op = self.resolve("post", options)?;
        let request = self.request(&op, HttpMethod::Post, op.endpoint.clone(), Some(to_body(data)?))?;
        self.run(&op, &request)
    }

    /// `PUT endpoint/{pk}/` (action `"put"`).
    pub fn replace<B: Serialize>(
        &self,
        pk: impl Into<PrimaryKey>,
        data: &B,
        options: Option<&ClientOptions<S, D>>,
    ) -> Result<D, ApiError> {
        let op = self.resolve("put", options)?;
        let url = item_url(&op.endpoint, &pk.into());
        let request = self.request(&op, HttpMethod::Put, url, Some(to_body(data)?))?;
        self.run(&op, &request)
    }

    /// `PATCH endpoint/{pk}/` (action `"patch"`).
    pub fn partial_update<B: Serialize>(
        &self,
        pk: impl Into<PrimaryKey>,
        data: &B,
        options: Option<&ClientOptions<S, D>>,
    ) -> Result<D, ApiError> {
        let op = self.resolve("patch", options)?;
        let url = item_url(&op.endpoint, &pk.into());
        let request = self.request(&op, HttpMethod::Patch, url, Some(to_body(data)?))?;
        self.run(&op, &request)
    }

    /// `DELETE endpoint/{pk}/`; `true` on any 2xx, `false` otherwise.
    pub fn delete(&self, pk: impl Into<PrimaryKey>, options: Option<&ClientOptions<S, D>>) -> bool {
        let pk = pk.into();
        let outcome = self
            .build_delete(&pk, options)
            .and_then(|request| self.send(&request));
        match outcome {
            Ok(_) => true,
            Err(e) => {
                warn!(%pk, error = %e, "delete failed");
                false
            }
        }
    }

    /// Custom action at `endpoint/{pk}/{name}/` (or `endpoint/{name}/`).
    /// Defaults to `GET`; `RequestConfig::method` overrides it.
    pub fn action(
        &self,
        name: &str,
        pk: Option<PrimaryKey>,
        options: Option<&ClientOptions<S, D>>,
    ) -> Result<D, ApiError> {
        let op = self.resolve(name, options)?;
        let request = self.action_request(&op, name, pk.as_ref())?;
        self.run(&op, &request)
    }

    /// Collection-level action whose response is a page of records.
    pub fn list_action(
        &self,
        name: &str,
        options: Option<&ClientOptions<S, D>>,
    ) -> Result<Page<D>, ApiError> {
        let op = self.resolve(name, options)?;
        let request = self.action_request(&op, name, None)?;
        self.run_page(&op, &request)
    }

    // -- pipeline -----------------------------------------------------------

    fn run(&self, op: &ResolvedOptions<S, D>, request: &HttpRequest) -> Result<D, ApiError> {
        let src = match self.send(request).and_then(|response| op.then(&response)) {
            Ok(src) => src,
            Err(e) => {
                warn!(action = %op.action, path = %request.path, error = %e, "request failed");
                op.error(&e)?
            }
        };
        op.parse(&src)
    }

    fn run_page(&self, op: &ResolvedOptions<S, D>, request: &HttpRequest) -> Result<Page<D>, ApiError> {
        let outcome = self.send(request).and_then(|response| {
            serde_json::from_str::<Page<S>>(&response.body)
                .map_err(|e| ApiError::DeserializationError(e.to_string()))
        });
        let page = match outcome {
            Ok(page) => page,
            Err(e) => {
                warn!(action = %op.action, path = %request.path, error = %e, "request failed");
                op.list_error(&e)?
            }
        };
        op.parse_page(page)
    }

    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        debug!(method = request.method.as_str(), path = %request.path, "issuing request");
        let response = self.inner.transport.execute(request)?;
        check_success(&response)?;
        Ok(response)
    }

    fn action_request(
        &self,
        op: &ResolvedOptions<S, D>,
        name: &str,
        pk: Option<&PrimaryKey>,
    ) -> Result<HttpRequest, ApiError> {
        let url = match pk {
            Some(pk) => format!("{}{name}/", item_url(&op.endpoint, pk)),
            None => format!("{}{name}/", with_slash(&op.endpoint)),
        };
        self.request(op, HttpMethod::Get, url, None)
    }

    fn request(
        &self,
        op: &ResolvedOptions<S, D>,
        default_method: HttpMethod,
        url: String,
        body: Option<String>,
    ) -> Result<HttpRequest, ApiError> {
        let mut headers = self.http_config().headers;
        for (name, value) in &op.request.headers {
            match headers.iter_mut().find(|(key, _)| key.eq_ignore_ascii_case(name)) {
                Some(slot) => slot.1 = value.clone(),
                None => headers.push((name.clone(), value.clone())),
            }
        }
        if body.is_some() && !headers.iter().any(|(key, _)| key.eq_ignore_ascii_case("content-type")) {
            headers.push(("content-type".to_string(), "application/json".to_string()));
        }

        Ok(HttpRequest {
            method: op.request.method.unwrap_or(default_method),
            path: with_query(url, &op.request.query)?,
            headers,
            body,
            timeout: op.request.timeout,
        })
    }
}

fn with_slash(endpoint: &str) -> String {
    if endpoint.ends_with('/') {
        endpoint.to_string()
    } else {
        format!("{endpoint}/")
    }
}

fn item_url(endpoint: &str, pk: &PrimaryKey) -> String {
    format!("{}{pk}/", with_slash(endpoint))
}

fn with_query(url: String, query: &[(String, String)]) -> Result<String, ApiError> {
    if query.is_empty() {
        return Ok(url);
    }
    let mut parsed = url::Url::parse(&url).map_err(|e| ApiError::InvalidUrl(format!("{url}: {e}")))?;
    parsed.query_pairs_mut().extend_pairs(query);
    Ok(parsed.into())
}

fn to_body<B: Serialize>(data: &B) -> Result<String, ApiError> {
    serde_json::to_string(data).map_err(|e| ApiError::SerializationError(e.to_string()))
}
