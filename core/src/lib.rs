//! Unified HTTP request façade.
//!
//! # Overview
//! Callers describe a request abstractly with a `RequestDescription` (url,
//! method, parameters, headers, uploads, tag) and get back a classified
//! `ResultInfo`, either by blocking (`Performer::execute_sync`) or through a
//! callback delivered on an `ExecutionContext` of their choosing
//! (`Performer::execute_async`). Every transport failure is mapped onto a
//! small, stable `ResultKind` taxonomy; none escapes as a panic or an `Err`.
//!
//! # Design
//! - `Configuration` is built once and shared. It owns the `Transport`
//!   (a `reqwest` client on its own worker pool), built lazily exactly once.
//! - `RequestBuilder` is pure: description in, `BuiltRequest` data out.
//! - `CallRegistry` tracks in-flight calls by tag so a whole group can be
//!   cancelled; cancelled calls still report a result.
//! - `ResultDispatcher` posts async results to the caller's context instead
//!   of running callbacks on transport workers.

pub mod builder;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod http;
pub mod interceptor;
pub mod performer;
pub mod registry;
pub mod request;
pub mod result;
pub mod transport;

pub use builder::RequestBuilder;
pub use config::{Configuration, ConfigurationBuilder, TimeUnit};
pub use dispatcher::{ContextClosed, ContextHandle, ExecutionContext, ResultDispatcher};
pub use error::Error;
pub use http::{BuiltRequest, FilePart, RequestBody};
pub use interceptor::{ExtensionMediaType, LoggingInterceptor, MediaTypeInterceptor, MessageInterceptor, ParamsInterceptor};
pub use performer::Performer;
pub use registry::{CallHandle, CallRegistry};
pub use request::{Params, RequestDescription, RequestMethod, UploadFile};
pub use result::{ResultInfo, ResultKind};
pub use transport::{Transport, TransportError};
