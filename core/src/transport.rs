//! The shared HTTP engine: one `reqwest::Client` and the worker pool it runs
//! on.
//!
//! # Design
//! The transport owns a dedicated multi-thread tokio runtime. Asynchronous
//! calls are spawned onto it; synchronous calls block the calling thread on
//! it. Either way every call races its cancellation token, so cancelling a
//! handle finishes the call promptly with `TransportError::Cancelled`.
//!
//! Failures are reported with explicit phase indicators taken from
//! `reqwest::Error` (`is_timeout`, `is_connect`, ...), never from matching
//! message text.

use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use reqwest::header::{HeaderName, HeaderValue};
use reqwest::multipart::{Form, Part};
use thiserror::Error as ThisError;
use tokio::runtime::{Handle, Runtime};
use tokio_util::sync::CancellationToken;

use crate::config::Configuration;
use crate::dispatcher;
use crate::error::Error;
use crate::http::{BuiltRequest, RawResponse, RequestBody};
use crate::interceptor::MessageInterceptor;

#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum TransportError {
    /// Establishing the connection timed out.
    #[error("connect timed out: {0}")]
    ConnectTimeout(String),

    /// Any other phase (request write, response read) timed out.
    #[error("timed out: {0}")]
    Timeout(String),

    #[error("i/o failure: {0}")]
    Io(String),

    #[error("call cancelled")]
    Cancelled,

    /// A blocking call was made on a thread that must not block on network
    /// I/O.
    #[error("blocking network i/o is not allowed on this thread")]
    BlockingForbidden,

    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let detail = err.to_string();
        if err.is_timeout() {
            if err.is_connect() {
                TransportError::ConnectTimeout(detail)
            } else {
                TransportError::Timeout(detail)
            }
        } else if err.is_connect() || err.is_request() || err.is_body() {
            TransportError::Io(detail)
        } else {
            TransportError::Other(detail)
        }
    }
}

/// Whether the current thread is marked as forbidding blocking network I/O.
///
/// Threads driving async tasks are not covered here. Tokio refuses to block
/// on them, and `Transport::execute_blocking` reports that refusal as
/// `BlockingForbidden`. Blocking-pool threads and threads that merely hold a
/// runtime handle may block.
pub fn blocking_forbidden() -> bool {
    dispatcher::on_execution_context()
}

fn panic_detail(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

pub struct Transport {
    client: reqwest::Client,
    handle: Handle,
    runtime: Option<Runtime>,
    interceptors: Vec<Arc<dyn MessageInterceptor>>,
}

impl Transport {
    pub(crate) fn new(config: &Configuration) -> Result<Self, Error> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.worker_threads())
            .thread_name("callway-worker")
            .enable_all()
            .build()
            .map_err(Error::WorkerPool)?;

        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .read_timeout(config.read_timeout())
            .timeout(config.connect_timeout() + config.read_timeout() + config.write_timeout())
            .build()
            .map_err(Error::ClientBuild)?;

        tracing::debug!(
            target: "callway::transport",
            workers = config.worker_threads(),
            connect_timeout = ?config.connect_timeout(),
            read_timeout = ?config.read_timeout(),
            write_timeout = ?config.write_timeout(),
            "transport constructed"
        );

        Ok(Self {
            client,
            handle: runtime.handle().clone(),
            runtime: Some(runtime),
            interceptors: config.message_interceptors().to_vec(),
        })
    }

    /// Sends `request` and blocks the current thread until it completes, is
    /// cancelled through `token`, or times out.
    pub(crate) fn execute_blocking(
        &self,
        request: BuiltRequest,
        token: &CancellationToken,
    ) -> Result<RawResponse, TransportError> {
        if blocking_forbidden() {
            return Err(TransportError::BlockingForbidden);
        }

        // `block_on` panics before polling when the thread is already driving
        // a runtime. A panic after the first poll comes from the call itself.
        let polled = Cell::new(false);
        let call = async {
            polled.set(true);
            self.send(request, token).await
        };
        match panic::catch_unwind(AssertUnwindSafe(|| self.handle.block_on(call))) {
            Ok(outcome) => outcome,
            Err(_) if !polled.get() => Err(TransportError::BlockingForbidden),
            Err(payload) => Err(TransportError::Other(format!(
                "call panicked: {}",
                panic_detail(payload.as_ref())
            ))),
        }
    }

    /// Sends `request` as its own task on the worker pool. A panic while
    /// sending becomes `TransportError::Other` instead of tearing down the
    /// caller's task.
    pub(crate) async fn send_isolated(
        self: &Arc<Self>,
        request: BuiltRequest,
        token: CancellationToken,
    ) -> Result<RawResponse, TransportError> {
        let transport = Arc::clone(self);
        let task = self
            .handle
            .spawn(async move { transport.send(request, &token).await });
        match task.await {
            Ok(outcome) => outcome,
            Err(error) if error.is_panic() => Err(TransportError::Other(format!(
                "call panicked: {}",
                panic_detail(error.into_panic().as_ref())
            ))),
            Err(error) => Err(TransportError::Other(format!("call aborted: {error}"))),
        }
    }

    /// Runs `future` on the worker pool.
    pub(crate) fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(future);
    }

    pub(crate) async fn send(
        &self,
        request: BuiltRequest,
        token: &CancellationToken,
    ) -> Result<RawResponse, TransportError> {
        let url = request.url.clone();
        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => Err(TransportError::Cancelled),
            outcome = self.exchange(request) => outcome,
        };
        if let Err(error) = &outcome {
            for interceptor in &self.interceptors {
                interceptor.on_failure(&url, error);
            }
        }
        outcome
    }

    async fn exchange(&self, request: BuiltRequest) -> Result<RawResponse, TransportError> {
        let request = self.assemble(request).await?;
        for interceptor in &self.interceptors {
            interceptor.on_request(&request);
        }

        let response = self.client.execute(request).await?;
        for interceptor in &self.interceptors {
            interceptor.on_response(&response);
        }

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?;

        Ok(RawResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }

    /// Turns plain request data into a wire request. Upload files are read
    /// here.
    async fn assemble(&self, request: BuiltRequest) -> Result<reqwest::Request, TransportError> {
        let BuiltRequest {
            method,
            url,
            headers,
            body,
        } = request;

        let mut builder = self.client.request(method, url.as_str());
        builder = match body {
            RequestBody::Empty => builder,
            RequestBody::Form(pairs) => builder.form(&pairs),
            RequestBody::Multipart { fields, files } => {
                let mut form = Form::new();
                for (name, value) in fields {
                    form = form.text(name, value);
                }
                for file in files {
                    let bytes = tokio::fs::read(&file.path).await.map_err(|e| {
                        TransportError::Io(format!("failed to read {}: {e}", file.path.display()))
                    })?;
                    let part = Part::bytes(bytes)
                        .file_name(file.file_name)
                        .mime_str(&file.content_type)?;
                    form = form.part(file.field, part);
                }
                builder.multipart(form)
            }
        };

        // Caller headers go in last and replace anything the body set.
        let mut request = builder.build()?;
        for (name, value) in headers {
            let header = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::Other(format!("invalid header name {name:?}: {e}")))?;
            let value = HeaderValue::from_str(&value)
                .map_err(|e| TransportError::Other(format!("invalid value for header {name}: {e}")))?;
            request.headers_mut().insert(header, value);
        }

        Ok(request)
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("interceptors", &self.interceptors.len())
            .finish_non_exhaustive()
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        // Dropping a runtime blocks, which panics inside an async context.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
