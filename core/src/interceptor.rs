//! Caller-supplied hooks consulted while a request is built and sent.
//!
//! Three slots exist on `Configuration`:
//! - a `ParamsInterceptor`, run on every request's parameters,
//! - a `MediaTypeInterceptor`, resolving the content type of uploads,
//! - an ordered list of `MessageInterceptor`s observing raw exchanges.
//!
//! Plain closures implement the first two.

use std::path::Path;

use crate::request::Params;
use crate::transport::TransportError;

/// Transforms or validates parameters before a request is built.
///
/// The interceptor owns its input: it is always a copy of the caller's map,
/// so whatever it does cannot leak back into the `RequestDescription`.
pub trait ParamsInterceptor: Send + Sync {
    fn intercept(&self, params: Params) -> Params;
}

impl<F> ParamsInterceptor for F
where
    F: Fn(Params) -> Params + Send + Sync,
{
    fn intercept(&self, params: Params) -> Params {
        self(params)
    }
}

/// Resolves the content type sent for an uploaded file.
pub trait MediaTypeInterceptor: Send + Sync {
    fn intercept(&self, path: &Path) -> String;
}

impl<F> MediaTypeInterceptor for F
where
    F: Fn(&Path) -> String + Send + Sync,
{
    fn intercept(&self, path: &Path) -> String {
        self(path)
    }
}

/// Extension-based content type lookup; `application/octet-stream` when the
/// extension is unknown.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtensionMediaType;

impl MediaTypeInterceptor for ExtensionMediaType {
    fn intercept(&self, path: &Path) -> String {
        mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    }
}

/// Observer of the raw exchange. Hooks run on the transport's worker, in
/// registration order, and should stay cheap.
pub trait MessageInterceptor: Send + Sync {
    fn on_request(&self, _request: &reqwest::Request) {}

    /// Called once response headers arrive, before the body is read.
    fn on_response(&self, _response: &reqwest::Response) {}

    fn on_failure(&self, _url: &str, _error: &TransportError) {}
}

/// Logs every exchange at `debug` under the `callway::http` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingInterceptor;

impl MessageInterceptor for LoggingInterceptor {
    fn on_request(&self, request: &reqwest::Request) {
        tracing::debug!(target: "callway::http", method=%request.method(), url=%request.url(), "sending request");
    }

    fn on_response(&self, response: &reqwest::Response) {
        tracing::debug!(target: "callway::http", url=%response.url(), status=%response.status().as_u16(), "response received");
    }

    fn on_failure(&self, url: &str, error: &TransportError) {
        tracing::debug!(target: "callway::http", url=%url, err=%error, "request failed");
    }
}
