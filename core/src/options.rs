//! Resource client configuration and its resolution into callable hooks.
//!
//! # Design
//! `ClientOptions` is the "configuration with recognized options" record:
//! every field is optional so the same type serves as the client-level
//! (global) configuration and as a per-call override. `merge` layers a local
//! record over a global one field by field, and `RequestConfig` is itself
//! merged field by field (headers and query parameters per key) instead of
//! being replaced wholesale.
//!
//! `resolve` turns the merged record into `ResolvedOptions`: all defaults
//! filled in, manual-action hooks swapped for failing ones, and the parsed
//! placeholders computed up front so live bindings have a seed value.

use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::error;

use crate::auth::TokenManager;
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpResponse};
use crate::types::Page;

pub const DEFAULT_ENDPOINT: &str = "/";
pub const DEFAULT_LIST_PLACEHOLDER_COUNT: usize = 3;

/// Turns a successful response into a wire-shape record.
pub type ThenHook<S> = Rc<dyn Fn(&HttpResponse, &str) -> Result<S, ApiError>>;
/// Turns a failure into a wire-shape record (or re-raises it).
pub type ErrorHook<S> = Rc<dyn Fn(&ApiError, &str) -> Result<S, ApiError>>;
/// Turns a failed collection request into a page of wire-shape records.
pub type ListErrorHook<S> = Rc<dyn Fn(&ApiError, &str) -> Result<Page<S>, ApiError>>;
/// Reshapes a wire-shape record into a view-shape record.
pub type ParseHook<S, D> = Rc<dyn Fn(&S, &str) -> Result<D, ApiError>>;

/// HTTP-call configuration layered onto every request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestConfig {
    pub method: Option<HttpMethod>,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

impl RequestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: HttpMethod) -> Self {
        self.method = Some(method);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        upsert(&mut self.headers, name.into(), value.into(), true);
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        upsert(&mut self.query, name.into(), value.into(), false);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Layer `local` over `self`; `local` wins per field and per key.
    pub fn merge(&self, local: &RequestConfig) -> RequestConfig {
        let mut merged = self.clone();
        if local.method.is_some() {
            merged.method = local.method;
        }
        for (name, value) in &local.headers {
            upsert(&mut merged.headers, name.clone(), value.clone(), true);
        }
        for (name, value) in &local.query {
            upsert(&mut merged.query, name.clone(), value.clone(), false);
        }
        if local.timeout.is_some() {
            merged.timeout = local.timeout;
        }
        merged
    }
}

fn upsert(pairs: &mut Vec<(String, String)>, name: String, value: String, ignore_case: bool) {
    let existing = pairs.iter_mut().find(|(key, _)| {
        if ignore_case {
            key.eq_ignore_ascii_case(&name)
        } else {
            *key == name
        }
    });
    match existing {
        Some(slot) => slot.1 = value,
        None => pairs.push((name, value)),
    }
}

/// Client-level or per-call configuration of a resource client.
pub struct ClientOptions<S, D = S> {
    pub endpoint: Option<String>,
    pub auth: Option<Rc<TokenManager>>,
    /// Wire-shape value returned before (or instead of) a real response.
    pub placeholder: Option<S>,
    pub list_placeholder_count: Option<usize>,
    pub request: RequestConfig,
    /// Actions whose hooks must be supplied per call.
    pub manual_actions: Option<Vec<String>>,
    pub then: Option<ThenHook<S>>,
    pub error: Option<ErrorHook<S>>,
    pub list_error: Option<ListErrorHook<S>>,
    pub parse: Option<ParseHook<S, D>>,
}

impl<S, D> Default for ClientOptions<S, D> {
    fn default() -> Self {
        Self {
            endpoint: None,
            auth: None,
            placeholder: None,
            list_placeholder_count: None,
            request: RequestConfig::default(),
            manual_actions: None,
            then: None,
            error: None,
            list_error: None,
            parse: None,
        }
    }
}

impl<S: Clone, D> Clone for ClientOptions<S, D> {
    fn clone(&self) -> Self {
        Self {
            endpoint: self.endpoint.clone(),
            auth: self.auth.clone(),
            placeholder: self.placeholder.clone(),
            list_placeholder_count: self.list_placeholder_count,
            request: self.request.clone(),
            manual_actions: self.manual_actions.clone(),
            then: self.then.clone(),
            error: self.error.clone(),
            list_error: self.list_error.clone(),
            parse: self.parse.clone(),
        }
    }
}

impl<S: fmt::Debug, D> fmt::Debug for ClientOptions<S, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("endpoint", &self.endpoint)
            .field("auth", &self.auth.is_some())
            .field("placeholder", &self.placeholder)
            .field("list_placeholder_count", &self.list_placeholder_count)
            .field("request", &self.request)
            .field("manual_actions", &self.manual_actions)
            .field("then", &self.then.is_some())
            .field("error", &self.error.is_some())
            .field("list_error", &self.list_error.is_some())
            .field("parse", &self.parse.is_some())
            .finish()
    }
}

impl<S: Clone, D> ClientOptions<S, D> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn auth(mut self, auth: Rc<TokenManager>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn placeholder(mut self, placeholder: S) -> Self {
        self.placeholder = Some(placeholder);
        self
    }

    pub fn list_placeholder_count(mut self, count: usize) -> Self {
        self.list_placeholder_count = Some(count);
        self
    }

    pub fn request(mut self, request: RequestConfig) -> Self {
        self.request = request;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request = self.request.header(name, value);
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request = self.request.query(name, value);
        self
    }

    pub fn manual_actions<I, A>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.manual_actions = Some(actions.into_iter().map(Into::into).collect());
        self
    }

    pub fn then(mut self, hook: impl Fn(&HttpResponse, &str) -> Result<S, ApiError> + 'static) -> Self {
        self.then = Some(Rc::new(hook));
        self
    }

    pub fn error(mut self, hook: impl Fn(&ApiError, &str) -> Result<S, ApiError> + 'static) -> Self {
        self.error = Some(Rc::new(hook));
        self
    }

    pub fn list_error(
        mut self,
        hook: impl Fn(&ApiError, &str) -> Result<Page<S>, ApiError> + 'static,
    ) -> Self {
        self.list_error = Some(Rc::new(hook));
        self
    }

    pub fn parse(mut self, hook: impl Fn(&S, &str) -> Result<D, ApiError> + 'static) -> Self {
        self.parse = Some(Rc::new(hook));
        self
    }

    /// Layer `local` over `self`; any field set in `local` wins.
    pub fn merge(&self, local: &ClientOptions<S, D>) -> ClientOptions<S, D> {
        ClientOptions {
            endpoint: local.endpoint.clone().or_else(|| self.endpoint.clone()),
            auth: local.auth.clone().or_else(|| self.auth.clone()),
            placeholder: local.placeholder.clone().or_else(|| self.placeholder.clone()),
            list_placeholder_count: local.list_placeholder_count.or(self.list_placeholder_count),
            request: self.request.merge(&local.request),
            manual_actions: local
                .manual_actions
                .clone()
                .or_else(|| self.manual_actions.clone()),
            then: local.then.clone().or_else(|| self.then.clone()),
            error: local.error.clone().or_else(|| self.error.clone()),
            list_error: local.list_error.clone().or_else(|| self.list_error.clone()),
            parse: local.parse.clone().or_else(|| self.parse.clone()),
        }
    }

    pub fn is_manual(&self, action: &str) -> bool {
        self.manual_actions
            .as_ref()
            .is_some_and(|actions| actions.iter().any(|a| a == action))
    }

    /// A copy whose hooks all fail with `CallbackNotConfigured` for `action`.
    fn without_hooks(&self, action: &str) -> ClientOptions<S, D>
    where
        S: 'static,
        D: 'static,
    {
        let mut stripped = self.clone();
        let missing = |hook: &'static str| {
            let action = action.to_string();
            move || ApiError::CallbackNotConfigured {
                action: action.clone(),
                hook,
            }
        };
        let then = missing("then");
        let error = missing("error");
        let list_error = missing("error");
        let parse = missing("parse");
        stripped.then = Some(Rc::new(move |_: &HttpResponse, _: &str| -> Result<S, ApiError> {
            Err(then())
        }));
        stripped.error = Some(Rc::new(move |_: &ApiError, _: &str| -> Result<S, ApiError> {
            Err(error())
        }));
        stripped.list_error = Some(Rc::new(
            move |_: &ApiError, _: &str| -> Result<Page<S>, ApiError> { Err(list_error()) },
        ));
        stripped.parse = Some(Rc::new(move |_: &S, _: &str| -> Result<D, ApiError> {
            Err(parse())
        }));
        stripped
    }
}

impl<S, D> ClientOptions<S, D>
where
    S: Clone + Serialize + DeserializeOwned + 'static,
    D: DeserializeOwned + 'static,
{
    /// Resolve the options an operation tagged `action` runs with.
    ///
    /// `self` is the client-level configuration, `local` the per-call
    /// override. Manual actions lose their client-level hooks before the
    /// per-call override is applied, so a per-call hook still takes effect.
    pub fn resolve(
        &self,
        action: &str,
        local: Option<&ClientOptions<S, D>>,
    ) -> Result<ResolvedOptions<S, D>, ApiError> {
        let global = if self.is_manual(action) {
            self.without_hooks(action)
        } else {
            self.clone()
        };
        let merged = match local {
            Some(local) => global.merge(local),
            None => global,
        };

        let endpoint = merged
            .endpoint
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let placeholder = match merged.placeholder {
            Some(placeholder) => placeholder,
            None => empty_record()?,
        };
        let list_placeholder_count = merged
            .list_placeholder_count
            .unwrap_or(DEFAULT_LIST_PLACEHOLDER_COUNT);

        let parse = merged.parse;
        let parsed_placeholder = parse_with(parse.as_ref(), &endpoint, &placeholder, "retrieve")?;
        let parsed_list_placeholder = Page::repeat(&placeholder, list_placeholder_count)
            .try_map(|item| parse_with(parse.as_ref(), &endpoint, &item, "list"))?;

        Ok(ResolvedOptions {
            action: action.to_string(),
            endpoint,
            auth: merged.auth,
            placeholder,
            list_placeholder_count,
            request: merged.request,
            manual_actions: merged.manual_actions.unwrap_or_default(),
            then: merged.then,
            error: merged.error,
            list_error: merged.list_error,
            parse,
            parsed_placeholder,
            parsed_list_placeholder,
        })
    }
}

/// The wire shape's reading of `{}`: the stand-in placeholder when none is configured.
fn empty_record<S: DeserializeOwned>() -> Result<S, ApiError> {
    serde_json::from_value(serde_json::Value::Object(Default::default())).map_err(|e| {
        ApiError::DeserializationError(format!("no placeholder configured and {{}} is not a record: {e}"))
    })
}

/// Options with every default filled in, ready for one operation.
pub struct ResolvedOptions<S, D> {
    pub action: String,
    pub endpoint: String,
    pub auth: Option<Rc<TokenManager>>,
    pub placeholder: S,
    pub list_placeholder_count: usize,
    pub request: RequestConfig,
    pub manual_actions: Vec<String>,
    then: Option<ThenHook<S>>,
    error: Option<ErrorHook<S>>,
    list_error: Option<ListErrorHook<S>>,
    parse: Option<ParseHook<S, D>>,
    parsed_placeholder: D,
    parsed_list_placeholder: Page<D>,
}

impl<S, D> ResolvedOptions<S, D>
where
    S: Clone + Serialize + DeserializeOwned,
    D: DeserializeOwned,
{
    /// Default: decode the response body unchanged.
    pub fn then(&self, response: &HttpResponse) -> Result<S, ApiError> {
        match &self.then {
            Some(hook) => hook(response, &self.action),
            None => serde_json::from_str(&response.body)
                .map_err(|e| ApiError::DeserializationError(e.to_string())),
        }
    }

    /// Default: substitute the placeholder.
    pub fn error(&self, err: &ApiError) -> Result<S, ApiError> {
        match &self.error {
            Some(hook) => hook(err, &self.action),
            None => Ok(self.placeholder.clone()),
        }
    }

    /// Default: substitute the placeholder page.
    pub fn list_error(&self, err: &ApiError) -> Result<Page<S>, ApiError> {
        match &self.list_error {
            Some(hook) => hook(err, &self.action),
            None => Ok(self.placeholder_page()),
        }
    }

    /// Default: re-read the wire shape as the view shape.
    pub fn parse(&self, src: &S) -> Result<D, ApiError> {
        self.parse_as(src, &self.action)
    }

    pub fn parse_page(&self, page: Page<S>) -> Result<Page<D>, ApiError> {
        self.parse_page_as(page, &self.action)
    }

    pub fn placeholder_page(&self) -> Page<S> {
        Page::repeat(&self.placeholder, self.list_placeholder_count)
    }

    fn parse_as(&self, src: &S, action: &str) -> Result<D, ApiError> {
        parse_with(self.parse.as_ref(), &self.endpoint, src, action)
    }

    fn parse_page_as(&self, page: Page<S>, action: &str) -> Result<Page<D>, ApiError> {
        page.try_map(|item| self.parse_as(&item, action))
    }
}

/// Run `hook` (or the serde round-trip) and wrap any failure as a parse error.
fn parse_with<S, D>(
    hook: Option<&ParseHook<S, D>>,
    endpoint: &str,
    src: &S,
    action: &str,
) -> Result<D, ApiError>
where
    S: Serialize,
    D: DeserializeOwned,
{
    let result = match hook {
        Some(hook) => hook(src, action),
        None => serde_json::to_value(src)
            .and_then(serde_json::from_value)
            .map_err(|e| ApiError::DeserializationError(e.to_string())),
    };
    result.map_err(|e| {
        let raw = serde_json::to_string(src).unwrap_or_else(|_| "<unserializable>".to_string());
        error!(endpoint, action, src = %raw, error = %e, "parser failed");
        match e {
            ApiError::CallbackNotConfigured { .. } | ApiError::Parse { .. } => e,
            other => ApiError::Parse {
                endpoint: endpoint.to_string(),
                action: action.to_string(),
                message: other.to_string(),
            },
        }
    })
}

impl<S: fmt::Debug, D: fmt::Debug> fmt::Debug for ResolvedOptions<S, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedOptions")
            .field("action", &self.action)
            .field("endpoint", &self.endpoint)
            .field("auth", &self.auth.is_some())
            .field("placeholder", &self.placeholder)
            .field("list_placeholder_count", &self.list_placeholder_count)
            .field("request", &self.request)
            .field("manual_actions", &self.manual_actions)
            .field("then", &self.then.is_some())
            .field("error", &self.error.is_some())
            .field("list_error", &self.list_error.is_some())
            .field("parse", &self.parse.is_some())
            .field("parsed_placeholder", &self.parsed_placeholder)
            .finish()
    }
}

impl<S, D: Clone> ResolvedOptions<S, D> {
    /// `parse(placeholder)`, the seed of a live single-record binding.
    pub fn parsed_placeholder(&self) -> D {
        self.parsed_placeholder.clone()
    }

    /// `parse` of the placeholder page, the seed of a live list binding.
    pub fn parsed_list_placeholder(&self) -> Page<D> {
        self.parsed_list_placeholder.clone()
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::{json, Value};

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Wire {
        #[serde(default)]
        name: Option<String>,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct View {
        name: String,
    }

    fn response(body: &str) -> HttpResponse {
        HttpResponse {
            status: 200,
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    #[test]
    fn local_fields_override_global_fields() {
        let global: ClientOptions<Value> = ClientOptions::new()
            .endpoint("http://host/api/things/")
            .placeholder(json!({"id": -1}));
        let local: ClientOptions<Value> = ClientOptions::new().header("X-Trace", "abc");

        let resolved = global.resolve("retrieve", Some(&local)).unwrap();
        assert_eq!(resolved.endpoint, "http://host/api/things/");
        assert_eq!(resolved.placeholder, json!({"id": -1}));
        assert_eq!(
            resolved.request.headers,
            vec![("X-Trace".to_string(), "abc".to_string())]
        );
    }

    #[test]
    fn request_config_merges_per_key() {
        let global = RequestConfig::new()
            .header("Accept", "application/json")
            .header("X-Client", "admin")
            .query("limit", "10")
            .timeout(Duration::from_secs(5));
        let local = RequestConfig::new()
            .header("x-client", "live")
            .query("offset", "20")
            .method(HttpMethod::Post);

        let merged = global.merge(&local);
        assert_eq!(merged.method, Some(HttpMethod::Post));
        assert_eq!(merged.timeout, Some(Duration::from_secs(5)));
        assert_eq!(
            merged.headers,
            vec![
                ("Accept".to_string(), "application/json".to_string()),
                ("X-Client".to_string(), "live".to_string()),
            ]
        );
        assert_eq!(
            merged.query,
            vec![
                ("limit".to_string(), "10".to_string()),
                ("offset".to_string(), "20".to_string()),
            ]
        );
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let options: ClientOptions<Value> = ClientOptions::new();
        let resolved = options.resolve("list", None).unwrap();
        assert_eq!(resolved.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(resolved.placeholder, json!({}));
        assert_eq!(resolved.list_placeholder_count, DEFAULT_LIST_PLACEHOLDER_COUNT);
        assert_eq!(resolved.parsed_list_placeholder().results.len(), 3);
    }

    #[test]
    fn default_then_returns_body_and_default_error_returns_placeholder() {
        let options: ClientOptions<Value> = ClientOptions::new().placeholder(json!({"id": -1}));
        let resolved = options.resolve("retrieve", None).unwrap();

        assert_eq!(resolved.then(&response(r#"{"id":3}"#)).unwrap(), json!({"id": 3}));
        assert_eq!(
            resolved.error(&ApiError::Transport("refused".into())).unwrap(),
            json!({"id": -1})
        );
    }

    #[test]
    fn parse_hook_runs_with_action_tag() {
        let options: ClientOptions<Wire, View> = ClientOptions::new()
            .placeholder(Wire { name: None })
            .parse(|src: &Wire, action: &str| {
                Ok(View {
                    name: format!("{}:{action}", src.name.clone().unwrap_or_default()),
                })
            });
        let resolved = options.resolve("patch", None).unwrap();

        assert_eq!(resolved.parsed_placeholder().name, ":retrieve");
        let view = resolved.parse(&Wire { name: Some("a".into()) }).unwrap();
        assert_eq!(view.name, "a:patch");
    }

    #[test]
    fn parse_failure_is_reported_as_parse_error() {
        let options: ClientOptions<Wire, View> = ClientOptions::new()
            .placeholder(Wire { name: Some("ok".into()) })
            .parse(|src: &Wire, _: &str| match &src.name {
                Some(name) => Ok(View { name: name.clone() }),
                None => Err(ApiError::DeserializationError("name missing".into())),
            })
            .endpoint("http://host/api/things/");
        let resolved = options.resolve("retrieve", None).unwrap();

        let err = resolved.parse(&Wire { name: None }).unwrap_err();
        match err {
            ApiError::Parse { endpoint, action, .. } => {
                assert_eq!(endpoint, "http://host/api/things/");
                assert_eq!(action, "retrieve");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn identity_parse_fails_when_shapes_disagree() {
        let options: ClientOptions<Wire, View> =
            ClientOptions::new().placeholder(Wire { name: None });
        assert!(matches!(
            options.resolve("retrieve", None),
            Err(ApiError::Parse { .. })
        ));
    }

    #[test]
    fn manual_action_hooks_fail() {
        let options: ClientOptions<Value> = ClientOptions::new().manual_actions(["merge"]);

        let err = options.resolve("merge", None).unwrap_err();
        assert_eq!(
            err,
            ApiError::CallbackNotConfigured {
                action: "merge".to_string(),
                hook: "parse",
            }
        );
        assert!(options.resolve("retrieve", None).is_ok());
    }

    #[test]
    fn manual_action_accepts_per_call_hooks() {
        let options: ClientOptions<Value> = ClientOptions::new().manual_actions(["merge"]);
        let local: ClientOptions<Value> = ClientOptions::new()
            .parse(|src: &Value, _: &str| Ok(src.clone()))
            .error(|e: &ApiError, _: &str| Err(e.clone()));

        let resolved = options.resolve("merge", Some(&local)).unwrap();
        assert!(matches!(
            resolved.then(&response("{}")),
            Err(ApiError::CallbackNotConfigured { hook: "then", .. })
        ));
        assert!(matches!(
            resolved.error(&ApiError::NotFound),
            Err(ApiError::NotFound)
        ));
    }

    #[test]
    fn list_placeholder_count_is_configurable() {
        let options: ClientOptions<Value> = ClientOptions::new()
            .placeholder(json!({"id": -1}))
            .list_placeholder_count(5);
        let resolved = options.resolve("list", None).unwrap();
        let page = resolved.list_error(&ApiError::NotFound).unwrap();
        assert_eq!(page.count, 5);
        assert!(page.results.iter().all(|r| *r == json!({"id": -1})));
    }
}
