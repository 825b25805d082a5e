//! Caller-facing description of a request.
//!
//! A `RequestDescription` says *what* to send (url, method, parameters,
//! headers, uploads) and which tag groups it for cancellation. It never
//! mentions the transport; `builder::RequestBuilder` turns it into an
//! `http::BuiltRequest`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Request parameters. A `None` value is an absent value and is sent as an
/// empty string rather than dropped.
pub type Params = BTreeMap<String, Option<String>>;

/// How parameters travel on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RequestMethod {
    /// Parameters appended to the query string.
    #[default]
    Get,
    /// Parameters sent as an `application/x-www-form-urlencoded` body.
    Post,
    /// Parameters and uploads sent as a `multipart/form-data` body.
    Form,
}

/// A file to send as one part of a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub absolute_path: PathBuf,
    pub form_field: String,
}

impl UploadFile {
    pub fn new(absolute_path: impl Into<PathBuf>, form_field: impl Into<String>) -> Self {
        Self {
            absolute_path: absolute_path.into(),
            form_field: form_field.into(),
        }
    }
}

/// Everything needed to issue one request.
///
/// Built fluently and then handed to a `Performer` by reference; the
/// performer copies what it needs and never mutates it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestDescription {
    url: String,
    method: RequestMethod,
    params: Params,
    headers: BTreeMap<String, String>,
    uploads: Vec<UploadFile>,
    tag: String,
}

impl RequestDescription {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn method(mut self, method: RequestMethod) -> Self {
        self.method = method;
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), Some(value.into()));
        self
    }

    /// Adds a parameter with no value; it is serialized as `key=`.
    pub fn absent_param(mut self, key: impl Into<String>) -> Self {
        self.params.insert(key.into(), None);
        self
    }

    pub fn params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn upload(mut self, absolute_path: impl Into<PathBuf>, form_field: impl Into<String>) -> Self {
        self.uploads.push(UploadFile::new(absolute_path, form_field));
        self
    }

    /// Groups this request with others for `CallRegistry::cancel`.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn request_method(&self) -> RequestMethod {
        self.method
    }

    pub fn param_map(&self) -> &Params {
        &self.params
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn uploads(&self) -> &[UploadFile] {
        &self.uploads
    }

    pub fn call_tag(&self) -> &str {
        &self.tag
    }
}

/// Basic validity check applied before any request is built: an absolute
/// `http`/`https` URL with a host.
pub fn is_valid_url(url: &str) -> bool {
    match reqwest::Url::parse(url) {
        Ok(parsed) => {
            matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some_and(|h| !h.is_empty())
        }
        Err(_) => false,
    }
}

/// File name sent in a multipart part, taken from the last path component.
pub(crate) fn upload_file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
