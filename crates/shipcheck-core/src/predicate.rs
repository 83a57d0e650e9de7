//! Response validation predicates.

use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::error::{Result, VerifyError};

type CheckFn = dyn Fn(u16, &str) -> bool + Send + Sync;

/// A pure `(status, body) -> bool` success criterion for the endpoint poller.
///
/// Cheap to clone; holds no state between evaluations.
#[derive(Clone)]
pub struct Predicate {
    description: String,
    check: Arc<CheckFn>,
}

impl Predicate {
    /// Wrap an arbitrary function.
    pub fn new<F>(description: impl Into<String>, check: F) -> Self
    where
        F: Fn(u16, &str) -> bool + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            check: Arc::new(check),
        }
    }

    pub fn status_is(expected: u16) -> Self {
        Self::new(format!("status == {}", expected), move |status, _| {
            status == expected
        })
    }

    pub fn body_contains(needle: impl Into<String>) -> Self {
        let needle = needle.into();
        Self::new(format!("body contains {:?}", needle), move |_, body| {
            body.contains(needle.as_str())
        })
    }

    /// Body matches a regular expression.
    pub fn body_matches(pattern: &str) -> Result<Self> {
        let re = Regex::new(pattern)
            .map_err(|e| VerifyError::InvalidPredicate(format!("{}: {}", pattern, e)))?;
        Ok(Self::new(format!("body matches /{}/", pattern), move |_, body| {
            re.is_match(body)
        }))
    }

    /// Exact status and a substring of the body.
    pub fn status_and_body_contains(expected: u16, needle: impl Into<String>) -> Self {
        Self::status_is(expected).and(Self::body_contains(needle))
    }

    /// Both predicates must hold.
    pub fn and(self, other: Predicate) -> Self {
        let description = format!("{} && {}", self.description, other.description);
        let (a, b) = (self.check, other.check);
        Self::new(description, move |status, body| a(status, body) && b(status, body))
    }

    pub fn evaluate(&self, status: u16, body: &str) -> bool {
        (self.check)(status, body)
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predicate")
            .field("description", &self.description)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_is() {
        let p = Predicate::status_is(200);
        assert!(p.evaluate(200, ""));
        assert!(!p.evaluate(503, ""));
        assert_eq!(p.description(), "status == 200");
    }

    #[test]
    fn test_status_and_body_contains() {
        let p = Predicate::status_and_body_contains(200, "deployment is working");
        assert!(p.evaluate(200, "<h1>Your deployment is working.</h1>"));
        assert!(!p.evaluate(200, "nginx default page"));
        assert!(!p.evaluate(502, "deployment is working"));
    }

    #[test]
    fn test_body_matches() {
        let p = Predicate::body_matches(r"version: \d+\.\d+").expect("regex");
        assert!(p.evaluate(500, "version: 1.4"));
        assert!(!p.evaluate(200, "version: beta"));
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let err = Predicate::body_matches("(unclosed").unwrap_err();
        assert!(err.to_string().contains("invalid predicate"));
    }

    #[test]
    fn test_custom_predicate_without_status_check() {
        let p = Predicate::new("any 2xx", |status, _| (200..300).contains(&status));
        assert!(p.evaluate(204, ""));
        assert!(!p.evaluate(404, ""));
    }
}
