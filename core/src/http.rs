//! Protocol-level request, described as plain data.
//!
//! # Design
//! `RequestBuilder` produces a `BuiltRequest` without touching the network
//! or the filesystem, which keeps request construction deterministic and
//! easy to test. The transport turns it into a wire request when the call is
//! actually sent; that is where upload files are read.

use std::path::PathBuf;

/// One file part of a multipart body, already resolved to a content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub field: String,
    pub path: PathBuf,
    pub file_name: String,
    pub content_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Empty,
    /// `application/x-www-form-urlencoded` pairs, encoded by the transport.
    Form(Vec<(String, String)>),
    Multipart {
        fields: Vec<(String, String)>,
        files: Vec<FilePart>,
    },
}

/// A request ready to be handed to the transport.
#[derive(Debug, Clone)]
pub struct BuiltRequest {
    pub method: reqwest::Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

/// A completed HTTP exchange as seen by the transport.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}
