use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt::{self, Display};

/// The kind of error that occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The gateway could not be reached, or the transport failed.
    Connection,
    /// The tool is unknown, or the remote tool failed.
    ToolInvocation,
    /// The gateway answered with something that doesn't follow the
    /// protocol.
    Protocol,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Connection => write!(f, "Connection error"),
            ErrorKind::ToolInvocation => write!(f, "Tool invocation error"),
            ErrorKind::Protocol => write!(f, "Protocol error"),
        }
    }
}

/// Describes a tool gateway error.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Error {
    kind: ErrorKind,
    reason: Option<String>,
}

impl Error {
    /// Creates a new error with the `Connection` kind.
    #[inline]
    pub fn connection() -> Self {
        Self {
            kind: ErrorKind::Connection,
            reason: None,
        }
    }

    /// Creates a new error with the `ToolInvocation` kind.
    #[inline]
    pub fn tool_invocation() -> Self {
        Self {
            kind: ErrorKind::ToolInvocation,
            reason: None,
        }
    }

    /// Creates a new error with the `Protocol` kind.
    #[inline]
    pub fn protocol() -> Self {
        Self {
            kind: ErrorKind::Protocol,
            reason: None,
        }
    }

    /// Attaches a reason to the error.
    #[inline]
    pub fn with_reason<S: Into<String>>(self, reason: S) -> Self {
        Self {
            kind: self.kind,
            reason: Some(reason.into()),
        }
    }

    /// Returns the kind of this error.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the reason for the error.
    #[inline]
    pub fn reason(&self) -> Cow<'_, str> {
        match self.reason.as_deref() {
            Some(reason) => Cow::Borrowed(reason),
            None => Cow::Owned(format!("{}", self.kind)),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            Some(reason) => write!(f, "{}: {reason}", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl StdError for Error {}
