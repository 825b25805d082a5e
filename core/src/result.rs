//! Classified outcome of one request.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use crate::error::Error;

/// Stable taxonomy every request outcome is mapped onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultKind {
    Success,
    /// The url failed the validity check; nothing was sent.
    CheckUrl,
    /// The exchange failed with an I/O error, or was cancelled.
    NetFailure,
    ConnectionTimeout,
    ReadWriteTimeout,
    /// A blocking call was made on a thread that forbids network I/O.
    MainThreadViolation,
    UnclassifiedFailure,
}

impl ResultKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResultKind::Success => "SUCCESS",
            ResultKind::CheckUrl => "CHECK_URL",
            ResultKind::NetFailure => "NET_FAILURE",
            ResultKind::ConnectionTimeout => "CONNECTION_TIMEOUT",
            ResultKind::ReadWriteTimeout => "READ_WRITE_TIMEOUT",
            ResultKind::MainThreadViolation => "MAIN_THREAD_VIOLATION",
            ResultKind::UnclassifiedFailure => "UNCLASSIFIED_FAILURE",
        }
    }
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a caller receives for every submitted request, exactly once.
///
/// The body is present on success and on a completed exchange with a
/// non-2xx status; transport failures carry only a diagnostic message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultInfo {
    url: String,
    kind: ResultKind,
    http_status: Option<u16>,
    headers: Vec<(String, String)>,
    body: Option<Vec<u8>>,
    message: Option<String>,
    cancelled: bool,
}

impl ResultInfo {
    pub(crate) fn failure(url: &str, kind: ResultKind, message: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            kind,
            http_status: None,
            headers: Vec::new(),
            body: None,
            message: Some(message.into()),
            cancelled: false,
        }
    }

    pub(crate) fn check_url(url: &str) -> Self {
        Self::failure(url, ResultKind::CheckUrl, format!("invalid url: {url:?}"))
    }

    pub(crate) fn cancelled(url: &str) -> Self {
        Self {
            cancelled: true,
            ..Self::failure(url, ResultKind::NetFailure, "call cancelled")
        }
    }

    pub(crate) fn completed(url: &str, status: u16, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
        let success = (200..300).contains(&status);
        Self {
            url: url.to_string(),
            kind: if success {
                ResultKind::Success
            } else {
                ResultKind::UnclassifiedFailure
            },
            http_status: Some(status),
            headers,
            body: Some(body),
            message: (!success).then(|| format!("HTTP status {status}")),
            cancelled: false,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn kind(&self) -> ResultKind {
        self.kind
    }

    pub fn is_success(&self) -> bool {
        self.kind == ResultKind::Success
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn http_status(&self) -> Option<u16> {
        self.http_status
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// First header value named `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> Option<String> {
        self.body
            .as_deref()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        let body = self.body.as_deref().ok_or(Error::NoBody)?;
        Ok(serde_json::from_slice(body)?)
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Writes the body to `dir/file_name`, creating `dir` if needed.
    pub fn save_into(&self, dir: &Path, file_name: &str) -> Result<PathBuf, Error> {
        let body = self.body.as_deref().ok_or(Error::NoBody)?;
        fs::create_dir_all(dir)?;
        let path = dir.join(file_name);
        fs::write(&path, body)?;
        Ok(path)
    }
}
