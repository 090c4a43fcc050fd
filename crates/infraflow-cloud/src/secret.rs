//! Secret-marked values

use serde::{Serialize, Serializer};
use std::fmt;

const MASK: &str = "[secret]";

/// A value that must never be rendered in logs, diffs or display output
///
/// `Debug`, `Display` and `Serialize` all print `[secret]`.
/// [`Secret::expose`] is the only way to reach the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret<T>(T);

impl<T> Secret<T> {
    pub fn new(value: T) -> Self {
        Secret(value)
    }

    pub fn expose(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Secret<U> {
        Secret(f(self.0))
    }

    /// The mask shown in place of the value
    pub fn mask() -> &'static str {
        MASK
    }
}

impl<T> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(MASK)
    }
}

impl<T> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(MASK)
    }
}

impl<T> Serialize for Secret<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(MASK)
    }
}

impl From<String> for Secret<String> {
    fn from(value: String) -> Self {
        Secret(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_is_masked() {
        let secret = Secret::new("hunter22".to_string());
        assert_eq!(format!("{}", secret), "[secret]");
        assert_eq!(format!("{:?}", secret), "[secret]");
        assert_eq!(serde_json::to_string(&secret).unwrap(), "\"[secret]\"");
        assert_eq!(secret.expose(), "hunter22");
    }

    #[test]
    fn test_secret_inside_struct_debug() {
        #[derive(Debug, Serialize)]
        struct Login {
            user: String,
            password: Secret<String>,
        }
        let login = Login {
            user: "app".to_string(),
            password: Secret::new("p@ss".to_string()),
        };
        assert!(!format!("{:?}", login).contains("p@ss"));
        assert!(!serde_json::to_string(&login).unwrap().contains("p@ss"));
    }
}
