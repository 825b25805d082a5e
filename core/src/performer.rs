//! Request execution: build, send, classify, deliver.
//!
//! # Design
//! Both entry points share one pipeline:
//!
//! 1. The url is checked. An invalid url yields `CHECK_URL` without touching
//!    the transport or the registry.
//! 2. The description is built into a protocol request. The only build
//!    failure, an empty upload path, is returned as `Error::InvalidArgument`
//!    before anything is registered.
//! 3. The call is registered under its tag through a `CallGuard`, then sent.
//! 4. The transport outcome is classified into a `ResultInfo`, the guard is
//!    released, and the result is returned (sync) or handed to the
//!    `ResultDispatcher` (async).
//!
//! No transport failure ever escapes as an `Err`.

use std::path::PathBuf;
use std::sync::Arc;

use crate::builder::RequestBuilder;
use crate::config::Configuration;
use crate::dispatcher::{ContextHandle, ResultDispatcher};
use crate::error::Error;
use crate::http::RawResponse;
use crate::registry::{CallGuard, CallHandle, CallRegistry};
use crate::request::{is_valid_url, RequestDescription};
use crate::result::{ResultInfo, ResultKind};
use crate::transport::TransportError;

/// Executes requests against the transport shared by one `Configuration`.
///
/// Cheap to clone; clones share the configuration and the registry.
#[derive(Debug, Clone)]
pub struct Performer {
    config: Arc<Configuration>,
    registry: Arc<CallRegistry>,
}

impl Performer {
    /// Uses the process-wide `CallRegistry`.
    pub fn new(config: Arc<Configuration>) -> Self {
        Self::with_registry(config, CallRegistry::global())
    }

    pub fn with_registry(config: Arc<Configuration>, registry: Arc<CallRegistry>) -> Self {
        Self { config, registry }
    }

    pub fn config(&self) -> &Arc<Configuration> {
        &self.config
    }

    pub fn registry(&self) -> &Arc<CallRegistry> {
        &self.registry
    }

    /// Cancels every in-flight call under `tag`. Each of them still produces
    /// exactly one (cancelled) result.
    pub fn cancel(&self, tag: &str) -> usize {
        self.registry.cancel(tag)
    }

    /// Executes `description` on the calling thread and returns its result.
    ///
    /// Must not be called on an execution context or from an async task;
    /// doing so yields `MAIN_THREAD_VIOLATION`. Blocking-pool threads such as
    /// `tokio::task::spawn_blocking` are fine.
    pub fn execute_sync(&self, description: &RequestDescription) -> Result<ResultInfo, Error> {
        let url = description.url();
        if !is_valid_url(url) {
            tracing::warn!(target: "callway::performer", url, "rejected invalid url");
            return Ok(ResultInfo::check_url(url));
        }

        let request = RequestBuilder::new(&self.config).build(description, description.request_method())?;
        let transport = self.config.transport()?;

        let guard = CallGuard::register(&self.registry, description.call_tag());
        tracing::debug!(target: "callway::performer", url, tag = description.call_tag(), id = %guard.handle().id(), "executing sync");
        let outcome = transport.execute_blocking(request, guard.handle().token());
        drop(guard);

        Ok(classify(url, outcome))
    }

    /// Submits `description` without blocking. `callback` runs exactly once,
    /// on `context`, with the classified result, including when the call is
    /// cancelled or the url is invalid.
    ///
    /// The returned handle cancels this call alone.
    pub fn execute_async<F>(
        &self,
        description: &RequestDescription,
        context: &ContextHandle,
        callback: F,
    ) -> Result<CallHandle, Error>
    where
        F: FnOnce(ResultInfo) + Send + 'static,
    {
        let url = description.url().to_string();
        if !is_valid_url(&url) {
            tracing::warn!(target: "callway::performer", %url, "rejected invalid url");
            ResultDispatcher::deliver(ResultInfo::check_url(&url), callback, context);
            return Ok(CallHandle::new(description.call_tag()));
        }

        let request = RequestBuilder::new(&self.config).build(description, description.request_method())?;
        let transport = self.config.transport()?;

        let guard = CallGuard::register(&self.registry, description.call_tag());
        let handle = guard.handle().clone();
        tracing::debug!(target: "callway::performer", %url, tag = description.call_tag(), id = %handle.id(), "executing async");

        let worker = Arc::clone(&transport);
        let context = context.clone();
        transport.spawn(async move {
            let token = guard.handle().token().clone();
            let outcome = worker.send_isolated(request, token).await;
            drop(guard);
            ResultDispatcher::deliver(classify(&url, outcome), callback, &context);
        });

        Ok(handle)
    }

    /// Saves the body of `result` under the configured save directory.
    pub fn save_result(&self, result: &ResultInfo, file_name: &str) -> Result<PathBuf, Error> {
        let dir = self.config.save_dir().ok_or(Error::NoSaveDir)?;
        result.save_into(dir, file_name)
    }
}

/// Maps a transport outcome onto the result taxonomy.
pub(crate) fn classify(url: &str, outcome: Result<RawResponse, TransportError>) -> ResultInfo {
    let result = match outcome {
        Ok(response) => ResultInfo::completed(url, response.status, response.headers, response.body),
        Err(TransportError::Cancelled) => ResultInfo::cancelled(url),
        Err(error) => {
            let kind = match &error {
                TransportError::Io(_) => ResultKind::NetFailure,
                TransportError::ConnectTimeout(_) => ResultKind::ConnectionTimeout,
                TransportError::Timeout(_) => ResultKind::ReadWriteTimeout,
                TransportError::BlockingForbidden => ResultKind::MainThreadViolation,
                TransportError::Other(_) | TransportError::Cancelled => ResultKind::UnclassifiedFailure,
            };
            ResultInfo::failure(url, kind, error.to_string())
        }
    };

    if result.is_success() {
        tracing::debug!(target: "callway::performer", url, status = ?result.http_status(), "call succeeded");
    } else {
        tracing::warn!(target: "callway::performer", url, kind = %result.kind(), message = ?result.message(), "call failed");
    }
    result
}
