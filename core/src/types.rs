//! Shared DTOs for paginated admin API collections.
//!
//! # Design
//! `Page` mirrors the limit/offset envelope the backend uses for every
//! collection (`count`, `next`, `previous`, `results`). It is generic so the
//! same envelope carries wire-shape records before `parse` and view-shape
//! records after.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A page of records returned by a collection endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub count: usize,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T: Clone> Page<T> {
    /// A page of `count` copies of `item` with no neighbours.
    pub fn repeat(item: &T, count: usize) -> Self {
        Page {
            count,
            next: None,
            previous: None,
            results: vec![item.clone(); count],
        }
    }
}

impl<T> Page<T> {
    /// Transform every record, keeping the envelope.
    pub fn try_map<U, E>(self, mut f: impl FnMut(T) -> Result<U, E>) -> Result<Page<U>, E> {
        let results = self.results.into_iter().map(&mut f).collect::<Result<Vec<_>, E>>()?;
        Ok(Page {
            count: self.count,
            next: self.next,
            previous: self.previous,
            results,
        })
    }
}

/// Identifier of a single record, rendered as one URL path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PrimaryKey {
    Int(i64),
    Str(String),
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimaryKey::Int(id) => write!(f, "{id}"),
            PrimaryKey::Str(id) => write!(f, "{id}"),
        }
    }
}

impl From<i64> for PrimaryKey {
    fn from(id: i64) -> Self {
        PrimaryKey::Int(id)
    }
}

impl From<i32> for PrimaryKey {
    fn from(id: i32) -> Self {
        PrimaryKey::Int(id.into())
    }
}

impl From<&str> for PrimaryKey {
    fn from(id: &str) -> Self {
        PrimaryKey::Str(id.to_string())
    }
}

impl From<String> for PrimaryKey {
    fn from(id: String) -> Self {
        PrimaryKey::Str(id)
    }
}
