//! Echo server used to exercise `callway-core` over real HTTP.
//!
//! Every route reflects what it received back as JSON so tests can assert on
//! the exact query string, form body, multipart parts and headers a request
//! carried on the wire.

use std::{collections::BTreeMap, time::Duration};

use axum::{
    extract::{Multipart, Path, Query},
    http::{HeaderMap, Method, StatusCode},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

/// What `/echo` and `/form` saw.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Echo {
    pub method: String,
    pub query: BTreeMap<String, String>,
    #[serde(default)]
    pub form: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
}

/// One file part received by `/upload`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub field: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub size: usize,
}

/// Everything `/upload` received, text fields and file parts separately.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadReport {
    pub fields: BTreeMap<String, String>,
    pub files: Vec<UploadedFile>,
}

#[derive(Deserialize)]
pub struct SlowParams {
    #[serde(default)]
    pub ms: u64,
}

pub fn app() -> Router {
    Router::new()
        .route("/echo", get(echo).post(echo))
        .route("/form", post(form))
        .route("/upload", post(upload))
        .route("/slow", get(slow))
        .route("/status/{code}", get(status))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// Repeated headers are joined with ", " so duplicates stay visible.
fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for (name, value) in headers {
        let Ok(value) = value.to_str() else { continue };
        map.entry(name.as_str().to_string())
            .and_modify(|joined: &mut String| {
                joined.push_str(", ");
                joined.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    map
}

async fn echo(
    method: Method,
    headers: HeaderMap,
    Query(query): Query<BTreeMap<String, String>>,
) -> Json<Echo> {
    Json(Echo {
        method: method.to_string(),
        query,
        form: BTreeMap::new(),
        headers: header_map(&headers),
    })
}

async fn form(
    method: Method,
    headers: HeaderMap,
    Query(query): Query<BTreeMap<String, String>>,
    Form(form): Form<BTreeMap<String, String>>,
) -> Json<Echo> {
    Json(Echo {
        method: method.to_string(),
        query,
        form,
        headers: header_map(&headers),
    })
}

async fn upload(mut multipart: Multipart) -> Result<Json<UploadReport>, StatusCode> {
    let mut report = UploadReport::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?
    {
        let name = field.name().unwrap_or_default().to_string();
        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?;
                report.files.push(UploadedFile {
                    field: name,
                    file_name,
                    content_type,
                    size: data.len(),
                });
            }
            None => {
                let text = field.text().await.map_err(|_| StatusCode::BAD_REQUEST)?;
                report.fields.insert(name, text);
            }
        }
    }
    Ok(Json(report))
}

async fn slow(Query(params): Query<SlowParams>) -> &'static str {
    tokio::time::sleep(Duration::from_millis(params.ms)).await;
    "done"
}

async fn status(Path(code): Path<u16>) -> (StatusCode, String) {
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST);
    (status, format!("status {}", status.as_u16()))
}
