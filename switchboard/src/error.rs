//! The switchboard error type.
//!

use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Display;

/// A single frame of a parsed stack trace, as attached to a
/// [`HandlerException`](Error::HandlerException).
///
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StackFrame {
    pub file: String,
    pub line: u32,
    pub char: u32,
    pub method: String,
}

/// switchboard's error type.
///
/// Mirrors the taxonomy of error-handling design: each variant is a
/// *named cause*, not a wrapped foreign error type. Adapters and the
/// lifecycle convert any of these into a [`Response`](crate::response::Response)
/// by way of [`to_response_parts`](Error::to_response_parts).
///
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// A plugin or config file could not be resolved and no default was
    /// supplied.
    ResolveFailure(String),

    /// An incoming body exceeded the configured size ceiling.
    BodyLimitExceeded(u64),

    /// No listener matched an emitted event and no body or code was set.
    RouteNotFound(String),

    /// A task raised an error; the message and an optional parsed stack
    /// are carried along for the `error` event.
    HandlerException {
        message: String,
        stack: Vec<StackFrame>,
    },

    /// An error with an explicit HTTP code and a structured per-field
    /// error map, propagated to the wire mostly as-is.
    FrameworkException {
        code: u16,
        errors: HashMap<String, Value>,
    },

    /// The input cannot be accepted.
    InvalidInput(String),

    /// Unspecified error.
    Other(String),

    /// An unexplainable bug; stop execution as gracefully as possible.
    ThisCannotHappen(String),
}

impl Error {
    pub fn resolve_failure<T: Display>(path: T) -> Self {
        Self::ResolveFailure(path.to_string())
    }

    pub fn body_limit_exceeded(limit: u64) -> Self {
        Self::BodyLimitExceeded(limit)
    }

    pub fn route_not_found<T: Display>(event: T) -> Self {
        Self::RouteNotFound(event.to_string())
    }

    pub fn handler_exception<T: Display>(message: T) -> Self {
        Self::HandlerException {
            message: message.to_string(),
            stack: Vec::new(),
        }
    }

    pub fn framework_exception(code: u16, errors: HashMap<String, Value>) -> Self {
        Self::FrameworkException { code, errors }
    }

    pub fn invalid_input<T: Display>(text: T) -> Self {
        Self::InvalidInput(text.to_string())
    }

    pub fn other<T: Display>(text: T) -> Self {
        Self::Other(text.to_string())
    }

    pub fn this_cannot_happen<T: Display>(text: T) -> Self {
        Self::ThisCannotHappen(text.to_string())
    }

    /// The `(code, status, error, errors)` tuple the error-interception
    /// wrapper writes onto a Response before re-emitting `"error"`.
    ///
    /// Non-framework errors always upgrade to `(500, "Internal Error")`;
    /// `FrameworkException` and `RouteNotFound` carry (or imply) their own
    /// code and status.
    ///
    pub fn to_response_parts(
        &self,
    ) -> (u16, &'static str, String, HashMap<String, Value>) {
        match self {
            Self::ResolveFailure(path) => (
                500,
                "Internal Error",
                format!("cannot resolve {}", path),
                HashMap::new(),
            ),
            Self::BodyLimitExceeded(limit) => (
                413,
                "Payload Too Large",
                format!("body exceeds {} bytes", limit),
                HashMap::new(),
            ),
            Self::RouteNotFound(event) => (
                404,
                "Not Found",
                format!("no listener matched {}", event),
                HashMap::new(),
            ),
            Self::HandlerException { message, .. } => {
                (500, "Internal Error", message.clone(), HashMap::new())
            }
            Self::FrameworkException { code, errors } => {
                let status = crate::status_reason_phrase(*code);
                (*code, status, String::new(), errors.clone())
            }
            Self::InvalidInput(text) => {
                (400, "Bad Request", text.clone(), HashMap::new())
            }
            Self::Other(text) => {
                (500, "Internal Error", text.clone(), HashMap::new())
            }
            Self::ThisCannotHappen(text) => {
                (500, "Internal Error", text.clone(), HashMap::new())
            }
        }
    }

    /// The stack frames to attach to the Response, if any.
    ///
    pub fn stack(&self) -> Vec<StackFrame> {
        match self {
            Self::HandlerException { stack, .. } => stack.clone(),
            _ => Vec::new(),
        }
    }
}

impl std::error::Error for Error {}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::ResolveFailure(path) => {
                write!(f, "resolve-failure: {}", path)
            }
            Self::BodyLimitExceeded(limit) => {
                write!(f, "body-limit-exceeded: {}", limit)
            }
            Self::RouteNotFound(event) => {
                write!(f, "route-not-found: {}", event)
            }
            Self::HandlerException { message, .. } => {
                write!(f, "handler-exception: {}", message)
            }
            Self::FrameworkException { code, .. } => {
                write!(f, "framework-exception: {}", code)
            }
            Self::InvalidInput(text) => write!(f, "invalid-input: {}", text),
            Self::Other(text) => write!(f, "other: {}", text),
            Self::ThisCannotHappen(text) => {
                write!(f, "this-cannot-happen: {}", text)
            }
        }
    }
}

impl From<&str> for Error {
    fn from(err: &str) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<String> for Error {
    fn from(err: String) -> Self {
        Self::Other(err)
    }
}

/// Simplify mapping another error type to this one.
///
/// Requires `$variant` to be one of `InvalidInput`, `Other`, or
/// `ThisCannotHappen`.
///
#[macro_export]
macro_rules! map_error {
    ($variant: ident, $result: expr $( , )? ) => {
        ($result).map_err(|e| $crate::Error::$variant(e.to_string()))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_not_found_upgrades_to_404() {
        let err = Error::route_not_found("GET /nowhere");
        let (code, status, _, _) = err.to_response_parts();
        assert_eq!(code, 404);
        assert_eq!(status, "Not Found");
    }

    #[test]
    fn handler_exception_upgrades_to_500() {
        let err = Error::handler_exception("boom");
        let (code, status, message, _) = err.to_response_parts();
        assert_eq!(code, 500);
        assert_eq!(status, "Internal Error");
        assert_eq!(message, "boom");
    }

    #[test]
    fn framework_exception_keeps_its_own_code() {
        let mut errors = HashMap::new();
        errors.insert("field".to_string(), Value::String("bad".to_string()));
        let err = Error::framework_exception(422, errors.clone());
        let (code, _, _, got) = err.to_response_parts();
        assert_eq!(code, 422);
        assert_eq!(got, errors);
    }
}
