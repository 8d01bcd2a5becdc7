//! JWT token lifecycle: obtain, persist, expire, clear.
//!
//! # Design
//! `TokenManager` exclusively owns the current `Token` and the storage entry
//! backing it. Every mutation (set or clear) bumps a change counter exposed as
//! an `Observable<u64>`; resource clients compare that counter against the
//! version stamped on their cached HTTP configuration to know when the
//! `Authorization` header must be rebuilt.
//!
//! Expiry is lazy: nothing polls the clock. Reading `token()` past the
//! expiry clears the state as a side effect and reports no token.
//!
//! Claims are decoded without verifying the signature. The client cannot
//! hold the server's key; it only needs `exp`, `iat` and `user_id` to drive
//! its own state machine.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::http::{check_success, HttpMethod, HttpRequest, Transport};
use crate::observable::Observable;
use crate::storage::Storage;

pub const DEFAULT_OBTAIN_PATH: &str = "obtain/";
pub const DEFAULT_STORAGE_KEY: &str = "jwt";

/// Source of "now" for expiry checks.
pub type Clock = Rc<dyn Fn() -> DateTime<Utc>>;

/// Body returned by the obtain-token endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObtainResponse {
    pub token: String,
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, rename = "fullName")]
    pub full_name: Option<String>,
}

/// Claims embedded in the credential string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub exp: i64,
    #[serde(alias = "orig_iat")]
    pub iat: i64,
    pub user_id: i64,
    #[serde(default)]
    pub jti: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// An authentication token and the fields derived from it.
///
/// Built once from the raw login response; the derived fields never change
/// independently of `value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    raw: String,
    value: String,
    issued_time: DateTime<Utc>,
    expired_time: DateTime<Utc>,
    user_id: i64,
    full_name: Option<String>,
    user_name: Option<String>,
}

impl Token {
    /// Decode a raw obtain-token response (as received or as persisted).
    pub fn from_raw(raw: &str) -> Result<Self, ApiError> {
        let response: ObtainResponse =
            serde_json::from_str(raw).map_err(|e| ApiError::TokenDecode(e.to_string()))?;
        let claims = decode_claims(&response.token)?;

        let issued_time = timestamp(claims.iat)?;
        let expired_time = timestamp(claims.exp)?;
        if issued_time >= expired_time {
            return Err(ApiError::TokenDecode(format!(
                "token expires ({expired_time}) before it is issued ({issued_time})"
            )));
        }

        Ok(Token {
            raw: raw.to_string(),
            value: response.token,
            issued_time,
            expired_time,
            user_id: claims.user_id,
            full_name: response.full_name,
            user_name: response.username,
        })
    }

    /// The credential string sent in the `Authorization` header.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// The login response this token was built from.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn issued_time(&self) -> DateTime<Utc> {
        self.issued_time
    }

    pub fn expired_time(&self) -> DateTime<Utc> {
        self.expired_time
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    /// Display name, when the backend sends one.
    pub fn full_name(&self) -> Option<&str> {
        self.full_name.as_deref()
    }

    /// Login name.
    pub fn user_name(&self) -> Option<&str> {
        self.user_name.as_deref()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expired_time < now
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

fn decode_claims(token: &str) -> Result<Claims, ApiError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims)
        .map_err(|e| ApiError::TokenDecode(e.to_string()))
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, ApiError> {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .ok_or_else(|| ApiError::TokenDecode(format!("timestamp {secs} out of range")))
}

/// Where the token manager talks to and persists to.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    /// Root of the JWT endpoints, e.g. `http://host/api/token/`.
    pub endpoint: String,
    /// Obtain path relative to `endpoint`.
    pub obtain_path: String,
    pub storage_key: String,
}

impl AuthSettings {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            obtain_path: DEFAULT_OBTAIN_PATH.to_string(),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
        }
    }

    /// Resolve `obtain_path` against `endpoint` with URL semantics.
    pub fn obtain_url(&self) -> Result<String, ApiError> {
        let base = url::Url::parse(&self.endpoint)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {e}", self.endpoint)))?;
        base.join(&self.obtain_path)
            .map(String::from)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {e}", self.obtain_path)))
    }
}

/// Owns the current token, its storage entry and the change counter.
pub struct TokenManager {
    obtain_url: String,
    storage_key: String,
    storage: Rc<dyn Storage>,
    transport: Rc<dyn Transport>,
    clock: Clock,
    token: RefCell<Option<Token>>,
    changes: Observable<u64>,
}

impl TokenManager {
    /// Build the manager and restore a previously persisted token, if any.
    ///
    /// A persisted entry that no longer decodes is discarded (and removed
    /// from storage) rather than failing construction.
    pub fn new(
        settings: AuthSettings,
        storage: Rc<dyn Storage>,
        transport: Rc<dyn Transport>,
    ) -> Result<Self, ApiError> {
        let manager = TokenManager {
            obtain_url: settings.obtain_url()?,
            storage_key: settings.storage_key,
            storage,
            transport,
            clock: Rc::new(Utc::now),
            token: RefCell::new(None),
            changes: Observable::new(1),
        };

        if let Some(raw) = manager.storage.get(&manager.storage_key)? {
            if !raw.is_empty() {
                match Token::from_raw(&raw) {
                    Ok(token) => {
                        debug!(user_id = token.user_id(), "restored persisted token");
                        manager.set_token(token)?;
                    }
                    Err(e) => {
                        warn!(key = %manager.storage_key, error = %e, "discarding malformed persisted token");
                        manager.clear()?;
                    }
                }
            }
        }
        Ok(manager)
    }

    /// Replace the clock used for expiry checks.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn obtain_url(&self) -> &str {
        &self.obtain_url
    }

    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    pub fn build_login(&self, username: &str, password: &str) -> Result<HttpRequest, ApiError> {
        let body = serde_json::to_string(&serde_json::json!({
            "username": username,
            "password": password,
        }))
        .map_err(|e| ApiError::SerializationError(e.to_string()))?;
        Ok(HttpRequest {
            method: HttpMethod::Post,
            path: self.obtain_url.clone(),
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: Some(body),
            timeout: None,
        })
    }

    /// Submit credentials. Returns whether a usable token is now held.
    ///
    /// Network failures, rejected credentials and undecodable responses all
    /// clear any existing token and yield `Ok(false)`; only storage failures
    /// surface as errors.
    pub fn login(&self, username: &str, password: &str) -> Result<bool, ApiError> {
        let request = self.build_login(username, password)?;
        let outcome = self.transport.execute(&request).and_then(|response| {
            check_success(&response)?;
            Token::from_raw(&response.body)
        });

        match outcome {
            Ok(token) => {
                self.storage.set(&self.storage_key, token.raw())?;
                info!(username, user_id = token.user_id(), "logged in");
                self.set_token(token)?;
            }
            Err(e) => {
                warn!(username, error = %e, "login failed");
                self.clear()?;
            }
        }
        Ok(self.is_logged_in())
    }

    pub fn logout(&self) -> Result<bool, ApiError> {
        info!("logged out");
        self.clear()?;
        Ok(true)
    }

    /// The current token, or `None` when absent or expired.
    pub fn token(&self) -> Option<Token> {
        let now = (self.clock)();
        let expired = match self.token.borrow().as_ref() {
            None => return None,
            Some(token) if !token.is_expired_at(now) => return Some(token.clone()),
            Some(token) => token.expired_time(),
        };

        warn!(%expired, "token expired, clearing");
        if let Err(e) = self.clear() {
            warn!(error = %e, "failed to remove expired token from storage");
        }
        None
    }

    /// A token is held and `now` is strictly before its expiry.
    pub fn is_logged_in(&self) -> bool {
        let now = (self.clock)();
        self.token().is_some_and(|token| now < token.expired_time())
    }

    /// `Authorization` header for the current token.
    pub fn authorization_header(&self) -> Option<(String, String)> {
        self.token()
            .map(|token| ("Authorization".to_string(), format!("JWT {}", token.value())))
    }

    /// Current value of the change counter.
    pub fn version(&self) -> u64 {
        self.changes.get()
    }

    /// The change counter as an observable; bumps on every set or clear.
    pub fn changes(&self) -> Observable<u64> {
        self.changes.clone()
    }

    fn set_token(&self, token: Token) -> Result<(), ApiError> {
        *self.token.borrow_mut() = Some(token);
        self.bump();
        Ok(())
    }

    fn clear(&self) -> Result<(), ApiError> {
        *self.token.borrow_mut() = None;
        let removed = self.storage.remove(&self.storage_key);
        self.bump();
        removed
    }

    fn bump(&self) {
        self.changes.update(|v| *v = v.wrapping_add(1));
    }
}

impl fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenManager")
            .field("obtain_url", &self.obtain_url)
            .field("storage_key", &self.storage_key)
            .field("version", &self.version())
            .field("token", &self.token.borrow().as_ref().map(Token::user_id))
            .finish()
    }
}
