//! HTTP transport types for the host-does-IO pattern.
//!
//! # Design
//! These types describe HTTP requests and responses as plain data. The token
//! manager and the resource clients build `HttpRequest` values and interpret
//! `HttpResponse` values; a `Transport` is the only thing that touches the
//! network. `UreqTransport` is the blocking default, tests plug in scripted
//! transports.
//!
//! Non-2xx statuses are data, not transport errors: a transport returns
//! `Err` only when no response was received at all.

use std::time::Duration;

use tracing::debug;

use crate::error::ApiError;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// An HTTP request described as plain data.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    /// Look up a header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Executes `HttpRequest` values against the network.
pub trait Transport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError>;
}

/// Map non-success status codes to the appropriate `ApiError` variant.
pub fn check_success(response: &HttpResponse) -> Result<(), ApiError> {
    if response.is_success() {
        return Ok(());
    }
    if response.status == 404 {
        return Err(ApiError::NotFound);
    }
    Err(ApiError::HttpError {
        status: response.status,
        body: response.body.clone(),
    })
}

/// Blocking transport backed by a shared `ureq::Agent`.
///
/// Disables ureq's automatic status-code-as-error behavior so 4xx/5xx
/// responses come back as `HttpResponse` values.
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(timeout: Option<Duration>) -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(timeout)
            .build()
            .new_agent();
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Transport for UreqTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        debug!(method = request.method.as_str(), path = %request.path, "sending request");

        let body = request.body.as_deref().unwrap_or("");
        let result = match request.method {
            HttpMethod::Get => prepare(self.agent.get(&request.path), request).call(),
            HttpMethod::Delete => prepare(self.agent.delete(&request.path), request).call(),
            HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch => {
                let builder = match request.method {
                    HttpMethod::Post => self.agent.post(&request.path),
                    HttpMethod::Put => self.agent.put(&request.path),
                    _ => self.agent.patch(&request.path),
                };
                let builder = prepare(builder, request);
                if request.body.is_some() {
                    builder.send(body.as_bytes())
                } else {
                    builder.send_empty()
                }
            }
        };

        let mut response = result.map_err(|e| ApiError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Apply headers, and the request's own timeout when it has one. Without a
/// per-request timeout the agent's configured timeout stays in force.
fn prepare<B>(mut builder: ureq::RequestBuilder<B>, request: &HttpRequest) -> ureq::RequestBuilder<B> {
    for (key, value) in &request.headers {
        builder = builder.header(key.as_str(), value.as_str());
    }
    match request.timeout {
        Some(timeout) => builder.config().timeout_global(Some(timeout)).build(),
        None => builder,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: body.to_string(),
        }
    }

    #[test]
    fn any_2xx_is_success() {
        assert!(check_success(&response(200, "")).is_ok());
        assert!(check_success(&response(201, "")).is_ok());
        assert!(check_success(&response(204, "")).is_ok());
    }

    #[test]
    fn not_found_gets_dedicated_variant() {
        let err = check_success(&response(404, "")).unwrap_err();
        assert!(matches!(err, ApiError::NotFound));
    }

    #[test]
    fn other_statuses_keep_status_and_body() {
        let err = check_success(&response(401, "no credentials")).unwrap_err();
        assert_eq!(
            err,
            ApiError::HttpError {
                status: 401,
                body: "no credentials".to_string()
            }
        );
    }

    #[test]
    fn header_lookup_ignores_case() {
        assert_eq!(response(200, "").header("content-type"), Some("application/json"));
        assert_eq!(response(200, "").header("authorization"), None);
    }

    /// Accepts connections and holds them open without ever replying.
    fn silent_server() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            let mut held = Vec::new();
            for stream in listener.incoming().flatten() {
                held.push(stream);
            }
        });
        format!("http://{addr}/api/things/")
    }

    fn get(path: String, timeout: Option<Duration>) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            path,
            headers: Vec::new(),
            body: None,
            timeout,
        }
    }

    #[test]
    fn agent_timeout_applies_without_request_timeout() {
        let transport = UreqTransport::new(Some(Duration::from_millis(500)));
        let started = std::time::Instant::now();

        let err = transport.execute(&get(silent_server(), None)).unwrap_err();

        assert!(matches!(err, ApiError::Transport(_)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn request_timeout_overrides_agent() {
        let transport = UreqTransport::new(None);
        let started = std::time::Instant::now();

        let err = transport
            .execute(&get(silent_server(), Some(Duration::from_millis(500))))
            .unwrap_err();

        assert!(matches!(err, ApiError::Transport(_)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
