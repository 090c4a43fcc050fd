//! Values that may only be known after the provider responds

use crate::error::{CloudError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Reference to a provider-computed attribute (e.g. a cluster endpoint)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PendingOutput {
    /// Resource id in `kind/name` form
    pub resource: String,
    pub attribute: String,
}

impl PendingOutput {
    pub fn new(resource: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            attribute: attribute.into(),
        }
    }

    /// Key used in the state file's `outputs` map
    pub fn key(&self) -> String {
        format!("{}.{}", self.resource, self.attribute)
    }
}

impl fmt::Display for PendingOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource, self.attribute)
    }
}

/// A value threaded from one resource into another
///
/// `Known` values are plain configuration or outputs recorded in state.
/// `Pending` values wait on the provider; anything derived from them with
/// [`Output::map`] or [`Output::zip`] stays pending on the same reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output<T> {
    Known(T),
    Pending(PendingOutput),
}

impl<T> Output<T> {
    pub fn known(value: T) -> Self {
        Output::Known(value)
    }

    pub fn pending(resource: impl Into<String>, attribute: impl Into<String>) -> Self {
        Output::Pending(PendingOutput::new(resource, attribute))
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Output::Known(_))
    }

    /// Borrow the value if known
    pub fn value(&self) -> Option<&T> {
        match self {
            Output::Known(v) => Some(v),
            Output::Pending(_) => None,
        }
    }

    /// The pending reference, if any
    pub fn pending_on(&self) -> Option<&PendingOutput> {
        match self {
            Output::Known(_) => None,
            Output::Pending(p) => Some(p),
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Output<U> {
        match self {
            Output::Known(v) => Output::Known(f(v)),
            Output::Pending(p) => Output::Pending(p),
        }
    }

    pub fn and_then<U, F: FnOnce(T) -> Output<U>>(self, f: F) -> Output<U> {
        match self {
            Output::Known(v) => f(v),
            Output::Pending(p) => Output::Pending(p),
        }
    }

    /// Combine two outputs; the first pending reference wins
    pub fn zip<U>(self, other: Output<U>) -> Output<(T, U)> {
        match (self, other) {
            (Output::Known(a), Output::Known(b)) => Output::Known((a, b)),
            (Output::Pending(p), _) | (_, Output::Pending(p)) => Output::Pending(p),
        }
    }

    /// The value, or a `PendingOutput` error naming what is missing
    pub fn require(self) -> Result<T> {
        match self {
            Output::Known(v) => Ok(v),
            Output::Pending(p) => Err(CloudError::PendingOutput {
                resource: p.resource,
                attribute: p.attribute,
            }),
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Output::Known(v) => Some(v),
            Output::Pending(_) => None,
        }
    }
}

impl<T> From<T> for Output<T> {
    fn from(value: T) -> Self {
        Output::Known(value)
    }
}

/// Look up a string output in a recorded `outputs` map
///
/// Null and empty-string entries count as not yet known.
pub fn lookup_output(
    outputs: &BTreeMap<String, serde_json::Value>,
    resource: &str,
    attribute: &str,
) -> Output<String> {
    let pending = PendingOutput::new(resource, attribute);
    match outputs.get(&pending.key()) {
        Some(serde_json::Value::String(s)) if !s.is_empty() => Output::Known(s.clone()),
        Some(serde_json::Value::Null) | Some(serde_json::Value::String(_)) | None => {
            Output::Pending(pending)
        }
        Some(other) => Output::Known(other.to_string()),
    }
}

/// Collect a list of outputs; pending if any element is pending
pub fn all<T>(outputs: impl IntoIterator<Item = Output<T>>) -> Output<Vec<T>> {
    let mut values = Vec::new();
    for output in outputs {
        match output {
            Output::Known(v) => values.push(v),
            Output::Pending(p) => return Output::Pending(p),
        }
    }
    Output::Known(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_keeps_pending_reference() {
        let endpoint: Output<String> = Output::pending("gke-cluster/app", "endpoint");
        let url = endpoint.map(|e| format!("https://{}", e));
        assert_eq!(
            url.pending_on(),
            Some(&PendingOutput::new("gke-cluster/app", "endpoint"))
        );
    }

    #[test]
    fn test_zip_known() {
        let a = Output::known(1);
        let b = Output::known("x");
        assert_eq!(a.zip(b), Output::Known((1, "x")));
    }

    #[test]
    fn test_zip_reports_first_pending() {
        let a: Output<i32> = Output::known(1);
        let b: Output<i32> = Output::pending("service/a", "address");
        let c: Output<i32> = Output::pending("service/b", "address");
        let zipped = a.zip(b).zip(c);
        assert_eq!(zipped.pending_on().map(|p| p.resource.as_str()), Some("service/a"));
    }

    #[test]
    fn test_require_pending_is_error() {
        let out: Output<String> = Output::pending("gke-cluster/app", "ca");
        let err = out.require().unwrap_err();
        assert!(err.to_string().contains("gke-cluster/app.ca"));
    }

    #[test]
    fn test_all() {
        let known = all(vec![Output::known(1), Output::known(2)]);
        assert_eq!(known, Output::Known(vec![1, 2]));

        let pending = all(vec![Output::known(1), Output::pending("x/y", "z")]);
        assert!(!pending.is_known());
    }
}
