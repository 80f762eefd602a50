//! Lifecycle outcome codes.
//!

use std::fmt::Display;

/// The outcome of running a [`PriorityQueue`](crate::queue::PriorityQueue)
/// or a [`RouteLifecycle`](crate::lifecycle::RouteLifecycle) phase.
///
/// `Abort` is a cooperative signal, not an exception: a task that returns
/// `false` makes the surrounding queue stop and report `Abort`. It is not
/// an HTTP-visible code by itself -- adapters decide what, if anything, to
/// write to the wire when a lifecycle phase aborts.
///
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Status {
    /// All tasks ran to completion without signalling abort.
    Ok,
    /// A task returned `false`; no further task in that queue ran.
    Abort,
    /// The queue that ran was empty, or no listener matched an emit.
    NotFound,
    /// A task raised an error that was not otherwise caught.
    Error,
}

impl Status {
    /// The HTTP status code associated with this outcome.
    ///
    /// `Abort` is given the source's placeholder code `309`; it is never
    /// meant to reach the wire unmodified, since adapters translate the
    /// lifecycle's eventual `Response.code` instead of this value.
    ///
    pub fn code(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::Abort => 309,
            Self::NotFound => 404,
            Self::Error => 500,
        }
    }

    /// A human readable label, independent of any particular Response.
    ///
    pub fn label(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Abort => "Abort",
            Self::NotFound => "Not Found",
            Self::Error => "Internal Error",
        }
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A reason phrase for an arbitrary HTTP status code, used wherever an
/// explicit code (e.g. from a `FrameworkException`) needs a `status`
/// string and none was supplied by the caller.
///
pub fn status_reason_phrase(code: u16) -> &'static str {
    match code {
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        409 => "Conflict",
        413 => "Payload Too Large",
        422 => "Unprocessable Entity",
        429 => "Too Many Requests",
        500 => "Internal Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_the_closed_sum() {
        assert_eq!(Status::Ok.code(), 200);
        assert_eq!(Status::Abort.code(), 309);
        assert_eq!(Status::NotFound.code(), 404);
        assert_eq!(Status::Error.code(), 500);
    }
}
