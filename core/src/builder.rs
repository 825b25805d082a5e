//! Translation of a `RequestDescription` into a `BuiltRequest`.
//!
//! # Design
//! Building is pure apart from invoking the configured interceptors. The
//! caller's parameters are copied before the params interceptor sees them,
//! so an interceptor can never alter the description it came from.
//!
//! - `Get`: parameters are appended to the url's query string.
//! - `Post`: parameters become a form-encoded body.
//! - `Form`: parameters become multipart text fields and each upload becomes
//!   a file part typed by the media-type interceptor.
//!
//! Headers from the description are applied last, verbatim. Url validity is
//! checked by the `Performer` before building, not here.

use crate::config::Configuration;
use crate::error::Error;
use crate::http::{BuiltRequest, FilePart, RequestBody};
use crate::request::{upload_file_name, Params, RequestDescription, RequestMethod};

pub struct RequestBuilder<'a> {
    config: &'a Configuration,
}

impl<'a> RequestBuilder<'a> {
    pub fn new(config: &'a Configuration) -> Self {
        Self { config }
    }

    /// Builds the protocol request for `method`.
    ///
    /// Fails with `Error::InvalidArgument` only when `method` is `Form` and an
    /// upload has an empty path.
    pub fn build(&self, description: &RequestDescription, method: RequestMethod) -> Result<BuiltRequest, Error> {
        let params = self.intercepted_params(description);

        let (http_method, url, body) = match method {
            RequestMethod::Get => (
                reqwest::Method::GET,
                append_query(description.url(), &params),
                RequestBody::Empty,
            ),
            RequestMethod::Post => (
                reqwest::Method::POST,
                description.url().to_string(),
                RequestBody::Form(flatten(&params)),
            ),
            RequestMethod::Form => (
                reqwest::Method::POST,
                description.url().to_string(),
                self.multipart(description, &params)?,
            ),
        };

        let headers = description
            .headers()
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        Ok(BuiltRequest {
            method: http_method,
            url,
            headers,
            body,
        })
    }

    fn intercepted_params(&self, description: &RequestDescription) -> Params {
        let params = description.param_map().clone();
        match self.config.params_interceptor() {
            Some(interceptor) => interceptor.intercept(params),
            None => params,
        }
    }

    fn multipart(&self, description: &RequestDescription, params: &Params) -> Result<RequestBody, Error> {
        let media_types = self.config.media_type_interceptor();
        let files = description
            .uploads()
            .iter()
            .map(|upload| {
                if upload.absolute_path.as_os_str().is_empty() {
                    return Err(Error::InvalidArgument(format!(
                        "upload for field {:?} has an empty file path",
                        upload.form_field
                    )));
                }
                Ok(FilePart {
                    field: upload.form_field.clone(),
                    path: upload.absolute_path.clone(),
                    file_name: upload_file_name(&upload.absolute_path),
                    content_type: media_types.intercept(&upload.absolute_path),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RequestBody::Multipart {
            fields: flatten(params),
            files,
        })
    }
}

/// Pairs with absent values serialized as empty strings.
fn flatten(params: &Params) -> Vec<(String, String)> {
    params
        .iter()
        .map(|(key, value)| (key.clone(), value.clone().unwrap_or_default()))
        .collect()
}

/// Appends `params` to `url`'s query string.
///
/// A `?` is added only when the url has none. The first pair goes in
/// unprefixed when the url ends in `?`; every other pair is joined with `&`.
pub fn append_query(url: &str, params: &Params) -> String {
    let mut out = String::from(url);
    if params.is_empty() {
        return out;
    }
    if !out.contains('?') {
        out.push('?');
    }
    let mut first = out.ends_with('?');
    for (key, value) in params {
        if !first {
            out.push('&');
        }
        first = false;
        out.push_str(&urlencoding::encode(key));
        out.push('=');
        out.push_str(&urlencoding::encode(value.as_deref().unwrap_or_default()));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};

    fn config() -> Configuration {
        Configuration::builder().build().unwrap()
    }

    fn params(pairs: &[(&str, Option<&str>)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.map(str::to_string)))
            .collect()
    }

    #[test]
    fn get_appends_to_existing_query() {
        let url = append_query("http://x/a?b=1", &params(&[("c", Some("2"))]));
        assert_eq!(url, "http://x/a?b=1&c=2");
    }

    #[test]
    fn get_starts_query_when_missing() {
        let url = append_query("http://x/a", &params(&[("c", Some("2"))]));
        assert_eq!(url, "http://x/a?c=2");
    }

    #[test]
    fn get_with_trailing_question_mark_does_not_double_it() {
        let url = append_query("http://x/a?", &params(&[("c", Some("2")), ("d", Some("3"))]));
        assert_eq!(url, "http://x/a?c=2&d=3");
    }

    #[test]
    fn get_serializes_absent_value_as_empty() {
        let url = append_query("http://x/a", &params(&[("c", None)]));
        assert_eq!(url, "http://x/a?c=");
    }

    #[test]
    fn get_without_params_leaves_url_alone() {
        assert_eq!(append_query("http://x/a", &Params::new()), "http://x/a");
    }

    #[test]
    fn get_percent_encodes_pairs() {
        let url = append_query("http://x/a", &params(&[("q", Some("a b&c"))]));
        assert_eq!(url, "http://x/a?q=a%20b%26c");
    }

    #[test]
    fn build_get_request() {
        let config = config();
        let desc = RequestDescription::new("http://x/a")
            .param("c", "2")
            .header("x-h", "v");
        let req = RequestBuilder::new(&config).build(&desc, RequestMethod::Get).unwrap();

        assert_eq!(req.method, reqwest::Method::GET);
        assert_eq!(req.url, "http://x/a?c=2");
        assert_eq!(req.headers, vec![("x-h".to_string(), "v".to_string())]);
        assert_eq!(req.body, RequestBody::Empty);
    }

    #[test]
    fn build_post_request_uses_form_body() {
        let config = config();
        let desc = RequestDescription::new("http://x/a?keep=1")
            .param("name", "n")
            .absent_param("empty");
        let req = RequestBuilder::new(&config).build(&desc, RequestMethod::Post).unwrap();

        assert_eq!(req.method, reqwest::Method::POST);
        assert_eq!(req.url, "http://x/a?keep=1");
        assert_eq!(
            req.body,
            RequestBody::Form(vec![
                ("empty".to_string(), String::new()),
                ("name".to_string(), "n".to_string()),
            ])
        );
    }

    #[test]
    fn build_form_request_resolves_media_types() {
        let config = config();
        let desc = RequestDescription::new("http://x/upload")
            .param("owner", "me")
            .upload("/data/photo.png", "avatar")
            .upload("/data/report.bin", "attachment");
        let req = RequestBuilder::new(&config).build(&desc, RequestMethod::Form).unwrap();

        let RequestBody::Multipart { fields, files } = req.body else {
            panic!("expected multipart body");
        };
        assert_eq!(fields, vec![("owner".to_string(), "me".to_string())]);
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].field, "avatar");
        assert_eq!(files[0].file_name, "photo.png");
        assert_eq!(files[0].content_type, "image/png");
        assert_eq!(files[0].path, PathBuf::from("/data/photo.png"));
        assert_eq!(files[1].content_type, "application/octet-stream");
    }

    #[test]
    fn form_with_empty_upload_path_is_invalid_argument() {
        let config = config();
        let desc = RequestDescription::new("http://x/upload").upload("", "file");
        let err = RequestBuilder::new(&config)
            .build(&desc, RequestMethod::Form)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn uploads_are_ignored_outside_form() {
        let config = config();
        let desc = RequestDescription::new("http://x/a").upload("", "file");
        assert!(RequestBuilder::new(&config).build(&desc, RequestMethod::Get).is_ok());
        assert!(RequestBuilder::new(&config).build(&desc, RequestMethod::Post).is_ok());
    }

    #[test]
    fn custom_media_type_interceptor_is_consulted() {
        let config = Configuration::builder()
            .media_type_interceptor(|path: &Path| format!("custom/{}", path.display()))
            .build()
            .unwrap();
        let desc = RequestDescription::new("http://x/upload").upload("/f", "file");
        let req = RequestBuilder::new(&config).build(&desc, RequestMethod::Form).unwrap();

        let RequestBody::Multipart { files, .. } = req.body else {
            panic!("expected multipart body");
        };
        assert_eq!(files[0].content_type, "custom//f");
    }

    #[test]
    fn params_interceptor_gets_a_copy() {
        let seen = Arc::new(Mutex::new(None));
        let recorder = Arc::clone(&seen);
        let config = Configuration::builder()
            .params_interceptor(move |mut params: Params| {
                params.insert("c".to_string(), Some("tampered".to_string()));
                params.insert("sign".to_string(), Some("abc".to_string()));
                *recorder.lock().unwrap() = Some(params.clone());
                params
            })
            .build()
            .unwrap();
        let desc = RequestDescription::new("http://x/a").param("c", "2");
        let original = desc.param_map().clone();

        let req = RequestBuilder::new(&config).build(&desc, RequestMethod::Get).unwrap();

        assert_eq!(req.url, "http://x/a?c=tampered&sign=abc");
        assert_eq!(desc.param_map(), &original);
        assert_eq!(desc.param_map().get("c"), Some(&Some("2".to_string())));
        assert!(seen.lock().unwrap().as_ref().unwrap().contains_key("sign"));
    }

    #[test]
    fn multipart_fields_use_intercepted_params() {
        let config = Configuration::builder()
            .params_interceptor(|mut params: Params| {
                params.remove("secret");
                params
            })
            .build()
            .unwrap();
        let desc = RequestDescription::new("http://x/upload")
            .param("secret", "s")
            .param("kept", "k");
        let req = RequestBuilder::new(&config).build(&desc, RequestMethod::Form).unwrap();

        let RequestBody::Multipart { fields, files } = req.body else {
            panic!("expected multipart body");
        };
        assert_eq!(fields, vec![("kept".to_string(), "k".to_string())]);
        assert!(files.is_empty());
    }
}
