//! Open key/value form data.
//!
//! The field schema lives in the owning template; the engine never assumes
//! a fixed field set and treats values as opaque scalars/lists.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Form fields keyed by field id, in deterministic order.
pub type FormData = BTreeMap<String, FormValue>;

/// One form field value.
///
/// Untagged: values round-trip as plain JSON scalars/arrays. `Date` is
/// listed before `Text` so RFC 3339 strings deserialize as timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FormValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Date(DateTime<Utc>),
    Text(String),
    List(Vec<FormValue>),
}

impl From<&str> for FormValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FormValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for FormValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<f64> for FormValue {
    fn from(n: f64) -> Self {
        Self::Float(n)
    }
}

impl From<bool> for FormValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}
