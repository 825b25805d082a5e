//! Façade-wide settings.
//!
//! # Design
//! `Configuration` is assembled once through `ConfigurationBuilder` and is
//! read-only afterwards; callers share it as `Arc<Configuration>`. The one
//! piece of interior state is the shared `Transport`, constructed lazily by
//! the first call that needs it and then reused by every `Performer` built
//! on the same configuration.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;

use crate::error::Error;
use crate::interceptor::{ExtensionMediaType, MediaTypeInterceptor, MessageInterceptor, ParamsInterceptor};
use crate::transport::Transport;

const DEFAULT_TIMEOUT: u64 = 15;
const DEFAULT_CACHE_SIZE: u64 = 10 * 1024 * 1024;
const DEFAULT_WORKER_THREADS: usize = 2;

/// Unit applied to the three timeout values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimeUnit {
    Milliseconds,
    #[default]
    Seconds,
    Minutes,
}

impl TimeUnit {
    pub fn to_duration(self, amount: u64) -> Duration {
        match self {
            TimeUnit::Milliseconds => Duration::from_millis(amount),
            TimeUnit::Seconds => Duration::from_secs(amount),
            TimeUnit::Minutes => Duration::from_secs(amount.saturating_mul(60)),
        }
    }
}

pub struct Configuration {
    connect_timeout: u64,
    read_timeout: u64,
    write_timeout: u64,
    time_unit: TimeUnit,
    cache_file: Option<PathBuf>,
    cache_max_size: u64,
    save_dir: Option<PathBuf>,
    worker_threads: usize,
    params_interceptor: Option<Arc<dyn ParamsInterceptor>>,
    media_type_interceptor: Arc<dyn MediaTypeInterceptor>,
    message_interceptors: Vec<Arc<dyn MessageInterceptor>>,
    transport: OnceCell<Arc<Transport>>,
}

impl Configuration {
    pub fn builder() -> ConfigurationBuilder {
        ConfigurationBuilder::default()
    }

    pub fn connect_timeout(&self) -> Duration {
        self.time_unit.to_duration(self.connect_timeout)
    }

    pub fn read_timeout(&self) -> Duration {
        self.time_unit.to_duration(self.read_timeout)
    }

    pub fn write_timeout(&self) -> Duration {
        self.time_unit.to_duration(self.write_timeout)
    }

    pub fn time_unit(&self) -> TimeUnit {
        self.time_unit
    }

    pub fn cache_file(&self) -> Option<&Path> {
        self.cache_file.as_deref()
    }

    /// Zero when no cache size was ever configured.
    pub fn cache_max_size(&self) -> u64 {
        self.cache_max_size
    }

    pub fn save_dir(&self) -> Option<&Path> {
        self.save_dir.as_deref()
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    pub fn params_interceptor(&self) -> Option<&dyn ParamsInterceptor> {
        self.params_interceptor.as_deref()
    }

    pub fn media_type_interceptor(&self) -> &dyn MediaTypeInterceptor {
        self.media_type_interceptor.as_ref()
    }

    pub fn message_interceptors(&self) -> &[Arc<dyn MessageInterceptor>] {
        &self.message_interceptors
    }

    /// Returns the shared transport, building it on first use.
    ///
    /// Concurrent first callers race on a one-shot initializer: exactly one
    /// of them constructs the client, the rest wait and receive the same
    /// instance. Once initialized this is a plain atomic load.
    pub fn transport(&self) -> Result<Arc<Transport>, Error> {
        self.transport
            .get_or_try_init(|| Transport::new(self).map(Arc::new))
            .cloned()
    }

    /// Whether the shared transport has been constructed yet.
    pub fn has_transport(&self) -> bool {
        self.transport.get().is_some()
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("write_timeout", &self.write_timeout)
            .field("time_unit", &self.time_unit)
            .field("cache_file", &self.cache_file)
            .field("cache_max_size", &self.cache_max_size)
            .field("save_dir", &self.save_dir)
            .field("worker_threads", &self.worker_threads)
            .field("params_interceptor", &self.params_interceptor.is_some())
            .field("message_interceptors", &self.message_interceptors.len())
            .field("transport_built", &self.has_transport())
            .finish()
    }
}

/// Fluent builder for `Configuration`. Timeouts are validated by `build`.
pub struct ConfigurationBuilder {
    connect_timeout: u64,
    read_timeout: u64,
    write_timeout: u64,
    time_unit: TimeUnit,
    cache_file: Option<PathBuf>,
    cache_max_size: u64,
    save_dir: Option<PathBuf>,
    worker_threads: usize,
    params_interceptor: Option<Arc<dyn ParamsInterceptor>>,
    media_type_interceptor: Arc<dyn MediaTypeInterceptor>,
    message_interceptors: Vec<Arc<dyn MessageInterceptor>>,
}

impl Default for ConfigurationBuilder {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_TIMEOUT,
            read_timeout: DEFAULT_TIMEOUT,
            write_timeout: DEFAULT_TIMEOUT,
            time_unit: TimeUnit::Seconds,
            cache_file: None,
            cache_max_size: 0,
            save_dir: None,
            worker_threads: DEFAULT_WORKER_THREADS,
            params_interceptor: None,
            media_type_interceptor: Arc::new(ExtensionMediaType),
            message_interceptors: Vec::new(),
        }
    }
}

impl ConfigurationBuilder {
    pub fn connect_timeout(mut self, amount: u64) -> Self {
        self.connect_timeout = amount;
        self
    }

    pub fn read_timeout(mut self, amount: u64) -> Self {
        self.read_timeout = amount;
        self
    }

    pub fn write_timeout(mut self, amount: u64) -> Self {
        self.write_timeout = amount;
        self
    }

    pub fn time_unit(mut self, unit: TimeUnit) -> Self {
        self.time_unit = unit;
        self
    }

    /// Enables response caching at `path`. The cache size falls back to
    /// 10 MiB unless a positive size was already set.
    pub fn cache_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_file = Some(path.into());
        if self.cache_max_size == 0 {
            self.cache_max_size = DEFAULT_CACHE_SIZE;
        }
        self
    }

    /// Zero is ignored.
    pub fn cache_max_size(mut self, bytes: u64) -> Self {
        if bytes > 0 {
            self.cache_max_size = bytes;
        }
        self
    }

    pub fn save_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.save_dir = Some(dir.into());
        self
    }

    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    pub fn params_interceptor(mut self, interceptor: impl ParamsInterceptor + 'static) -> Self {
        self.params_interceptor = Some(Arc::new(interceptor));
        self
    }

    pub fn media_type_interceptor(mut self, interceptor: impl MediaTypeInterceptor + 'static) -> Self {
        self.media_type_interceptor = Arc::new(interceptor);
        self
    }

    /// Appends an observer; observers run in the order they were added.
    pub fn message_interceptor(mut self, interceptor: impl MessageInterceptor + 'static) -> Self {
        self.message_interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn build(self) -> Result<Configuration, Error> {
        for (name, value) in [
            ("connect_timeout", self.connect_timeout),
            ("read_timeout", self.read_timeout),
            ("write_timeout", self.write_timeout),
        ] {
            if value == 0 {
                return Err(Error::InvalidConfig(format!("{name} must be greater than zero")));
            }
        }
        if self.worker_threads == 0 {
            return Err(Error::InvalidConfig("worker_threads must be greater than zero".to_string()));
        }

        Ok(Configuration {
            connect_timeout: self.connect_timeout,
            read_timeout: self.read_timeout,
            write_timeout: self.write_timeout,
            time_unit: self.time_unit,
            cache_file: self.cache_file,
            cache_max_size: self.cache_max_size,
            save_dir: self.save_dir,
            worker_threads: self.worker_threads,
            params_interceptor: self.params_interceptor,
            media_type_interceptor: self.media_type_interceptor,
            message_interceptors: self.message_interceptors,
            transport: OnceCell::new(),
        })
    }
}
