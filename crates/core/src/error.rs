use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt::{self, Display};

use tool_chat_gateway::{
    Error as GatewayError, ErrorKind as GatewayErrorKind,
};
use tool_chat_model::{ErrorKind as ModelErrorKind, ModelProviderError};

/// The kind of error that aborted a conversation loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The arguments of a tool request are not a JSON object.
    ArgumentParse,
    /// The model backend failed.
    ModelInvocation(ModelErrorKind),
    /// The tool gateway failed.
    Gateway(GatewayErrorKind),
    /// The loop ran past its iteration bound or its deadline.
    LoopExceeded,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::ArgumentParse => write!(f, "Argument parse error"),
            ErrorKind::ModelInvocation(kind) => {
                write!(f, "Model invocation error ({kind})")
            }
            ErrorKind::Gateway(kind) => write!(f, "{kind}"),
            ErrorKind::LoopExceeded => write!(f, "Loop exceeded"),
        }
    }
}

/// Describes why a conversation loop failed.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Error {
    kind: ErrorKind,
    reason: Option<String>,
}

impl Error {
    /// Creates a new error with the `ArgumentParse` kind.
    #[inline]
    pub fn argument_parse() -> Self {
        Self::new(ErrorKind::ArgumentParse)
    }

    /// Creates a new error with the `LoopExceeded` kind.
    #[inline]
    pub fn loop_exceeded() -> Self {
        Self::new(ErrorKind::LoopExceeded)
    }

    /// Creates a new error with the `ModelInvocation` kind.
    #[inline]
    pub fn model_invocation(kind: ModelErrorKind) -> Self {
        Self::new(ErrorKind::ModelInvocation(kind))
    }

    #[inline]
    pub(crate) fn from_model_error(err: &dyn ModelProviderError) -> Self {
        Self::new(ErrorKind::ModelInvocation(err.kind()))
            .with_reason(format!("{err}"))
    }

    #[inline]
    fn new(kind: ErrorKind) -> Self {
        Self { kind, reason: None }
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

impl From<GatewayError> for Error {
    fn from(err: GatewayError) -> Self {
        Self {
            kind: ErrorKind::Gateway(err.kind()),
            reason: Some(err.reason().into_owned()),
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
