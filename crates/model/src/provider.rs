use std::error::Error;

use crate::error::ErrorKind;
use crate::request::ModelRequest;
use crate::response::ModelResponse;

/// Errors a provider reports, classified by [`ErrorKind`] so callers can
/// tell authentication problems from rate limiting or garbage responses.
pub trait ModelProviderError: Error + Send + Sync + 'static {
    /// Classifies the error.
    fn kind(&self) -> ErrorKind;
}

/// A chat model backend.
///
/// Backends don't remember anything between requests. Every
/// [`ModelRequest`] carries the complete conversation and the tools the
/// model may ask for, and the provider itself holds only configuration.
pub trait ModelProvider: Send + Sync {
    /// Error returned when the request or its response fails.
    type Error: ModelProviderError;

    /// The streamed response.
    type Response: ModelResponse<Error = Self::Error>;

    /// Starts a request. The returned future does not borrow `self`, and
    /// resolves once the backend has accepted the request and the response
    /// starts streaming.
    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static;
}
