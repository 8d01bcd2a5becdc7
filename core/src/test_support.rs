//! Scripted transport and token helpers shared by the unit tests.

use std::cell::RefCell;
use std::collections::VecDeque;

use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::json;

use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse, Transport};

/// Replays queued outcomes in order and records every request it sees.
/// An empty queue behaves like an unreachable server.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    outcomes: RefCell<VecDeque<Result<HttpResponse, ApiError>>>,
    requests: RefCell<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn respond(&self, status: u16, body: &str) -> &Self {
        self.outcomes.borrow_mut().push_back(Ok(HttpResponse {
            status,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: body.to_string(),
        }));
        self
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.borrow().clone()
    }

    pub(crate) fn last_request(&self) -> HttpRequest {
        self.requests
            .borrow()
            .last()
            .cloned()
            .expect("no request was sent")
    }
}

impl Transport for ScriptedTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        self.requests.borrow_mut().push(request.clone());
        self.outcomes
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(ApiError::Transport("connection refused".to_string())))
    }
}

/// Sign a token carrying the claims the obtain endpoint issues.
pub(crate) fn mint_token(user_id: i64, iat: i64, exp: i64) -> String {
    let claims = json!({
        "user_id": user_id,
        "iat": iat,
        "exp": exp,
        "jti": "test-jti",
        "token_type": "access",
    });
    encode(&Header::default(), &claims, &EncodingKey::from_secret(b"test-secret"))
        .expect("token encodes")
}

/// A login response body as the obtain endpoint returns it.
pub(crate) fn login_body(token: &str) -> String {
    json!({
        "id": 7,
        "token": token,
        "username": "alice",
        "fullName": "Alice Liddell",
    })
    .to_string()
}
