//! Typed data-access layer for a REST admin API.
//!
//! # Overview
//! Three pieces, each a thin layer over a library:
//! - `TokenManager` owns one JWT's lifecycle (obtain, persist, lazily
//!   expire, clear) and publishes a change counter.
//! - `ResourceClient<S, D>` performs list/retrieve/create/update/delete and
//!   custom actions against one collection endpoint, running every response
//!   (or failure) through `then`/`error`/`parse` hooks, and offers live
//!   bindings that re-run when their inputs change.
//! - `Registry` is the fixed table of clients the application builds once.
//!
//! # Design
//! - Requests and responses are plain data (`HttpRequest`/`HttpResponse`);
//!   only a `Transport` touches the network, so every pipeline is testable
//!   with a scripted transport.
//! - Execution is single-threaded: shared state lives in `Rc`/`RefCell` and
//!   observable cells notify synchronously.
//! - Network failures are recovered into placeholders by default so callers
//!   always have a renderable value; parse failures always propagate.

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod live;
pub mod observable;
pub mod options;
pub mod registry;
pub mod resources;
pub mod storage;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use auth::{AuthSettings, Token, TokenManager};
pub use client::ResourceClient;
pub use config::Config;
pub use error::ApiError;
pub use http::{HttpMethod, HttpRequest, HttpResponse, Transport, UreqTransport};
pub use live::LiveBinding;
pub use observable::{Observable, Subscription};
pub use options::{ClientOptions, RequestConfig, ResolvedOptions};
pub use registry::Registry;
pub use resources::{Identification, IdentificationSrc, MergedImage, MergedImageSrc};
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use types::{Page, PrimaryKey};
