//! Blocking calls against the live mock server.
//!
//! Each test starts the mock server on a random port and drives
//! `Performer::execute_sync` over real HTTP, then checks both the classified
//! result and that the call left nothing behind in the registry.

mod common;

use std::io::Write;
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

use callway_core::{
    Configuration, MessageInterceptor, Params, RequestDescription, RequestMethod, ResultKind,
    TimeUnit,
};
use mock_server::{Echo, UploadReport};

use common::{default_performer, performer, start_server};

#[test]
fn get_appends_params_to_existing_query() {
    let addr = start_server();
    let performer = default_performer();
    let desc = RequestDescription::new(format!("http://{addr}/echo?b=1"))
        .param("c", "2")
        .absent_param("empty")
        .header("x-trace", "abc")
        .tag("get");

    let result = performer.execute_sync(&desc).unwrap();

    assert_eq!(result.kind(), ResultKind::Success, "{:?}", result.message());
    assert_eq!(result.http_status(), Some(200));
    let echo: Echo = result.json().unwrap();
    assert_eq!(echo.method, "GET");
    assert_eq!(echo.query.get("b").map(String::as_str), Some("1"));
    assert_eq!(echo.query.get("c").map(String::as_str), Some("2"));
    assert_eq!(echo.query.get("empty").map(String::as_str), Some(""));
    assert_eq!(echo.headers.get("x-trace").map(String::as_str), Some("abc"));
    assert!(performer.registry().is_empty());
}

#[test]
fn post_sends_form_body() {
    let addr = start_server();
    let performer = default_performer();
    let desc = RequestDescription::new(format!("http://{addr}/form"))
        .method(RequestMethod::Post)
        .param("name", "a b")
        .absent_param("note");

    let result = performer.execute_sync(&desc).unwrap();

    assert!(result.is_success(), "{:?}", result.message());
    let echo: Echo = result.json().unwrap();
    assert_eq!(echo.method, "POST");
    assert_eq!(echo.form.get("name").map(String::as_str), Some("a b"));
    assert_eq!(echo.form.get("note").map(String::as_str), Some(""));
    assert!(echo.query.is_empty());
}

#[test]
fn form_uploads_files_with_resolved_media_type() {
    let addr = start_server();
    let performer = default_performer();
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("avatar.png");
    std::fs::File::create(&image)
        .unwrap()
        .write_all(b"not really a png")
        .unwrap();

    let desc = RequestDescription::new(format!("http://{addr}/upload"))
        .method(RequestMethod::Form)
        .param("owner", "alice")
        .upload(&image, "avatar")
        .tag("upload");

    let result = performer.execute_sync(&desc).unwrap();

    assert!(result.is_success(), "{:?}", result.message());
    let report: UploadReport = result.json().unwrap();
    assert_eq!(report.fields.get("owner").map(String::as_str), Some("alice"));
    assert_eq!(report.files.len(), 1);
    assert_eq!(report.files[0].field, "avatar");
    assert_eq!(report.files[0].file_name, "avatar.png");
    assert_eq!(report.files[0].content_type.as_deref(), Some("image/png"));
    assert_eq!(report.files[0].size, b"not really a png".len());
    assert!(performer.registry().is_empty());
}

#[test]
fn missing_upload_file_is_net_failure() {
    let addr = start_server();
    let performer = default_performer();
    let desc = RequestDescription::new(format!("http://{addr}/upload"))
        .method(RequestMethod::Form)
        .upload("/no/such/dir/file.bin", "file")
        .tag("upload");

    let result = performer.execute_sync(&desc).unwrap();

    assert_eq!(result.kind(), ResultKind::NetFailure);
    assert!(performer.registry().is_empty());
}

#[test]
fn error_status_keeps_body() {
    let addr = start_server();
    let performer = default_performer();

    let result = performer
        .execute_sync(&RequestDescription::new(format!("http://{addr}/status/503")))
        .unwrap();

    assert_eq!(result.kind(), ResultKind::UnclassifiedFailure);
    assert_eq!(result.http_status(), Some(503));
    assert_eq!(result.text().as_deref(), Some("status 503"));
}

#[test]
fn slow_response_is_read_write_timeout() {
    let addr = start_server();
    let config = Configuration::builder()
        .connect_timeout(200)
        .read_timeout(200)
        .write_timeout(200)
        .time_unit(TimeUnit::Milliseconds)
        .build()
        .unwrap();
    let performer = performer(config);

    let result = performer
        .execute_sync(&RequestDescription::new(format!("http://{addr}/slow?ms=3000")).tag("slow"))
        .unwrap();

    assert_eq!(result.kind(), ResultKind::ReadWriteTimeout, "{:?}", result.message());
    assert!(performer.registry().is_empty());
}

#[test]
fn unanswered_connect_is_connection_timeout() {
    // Fill the accept backlog of a listener that never accepts, so further
    // handshakes stall instead of being refused.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let mut backlog = Vec::new();
    for _ in 0..1024 {
        match std::net::TcpStream::connect_timeout(&addr, Duration::from_millis(200)) {
            Ok(stream) => backlog.push(stream),
            Err(_) => break,
        }
    }

    let config = Configuration::builder()
        .connect_timeout(300)
        .read_timeout(5000)
        .write_timeout(5000)
        .time_unit(TimeUnit::Milliseconds)
        .build()
        .unwrap();
    let performer = performer(config);

    let result = performer
        .execute_sync(&RequestDescription::new(format!("http://{addr}/echo")).tag("stalled"))
        .unwrap();

    assert_eq!(result.kind(), ResultKind::ConnectionTimeout, "{:?}", result.message());
    assert!(!result.is_cancelled());
    assert!(performer.registry().is_empty());
    drop(backlog);
}

#[test]
fn sync_call_from_blocking_pool_succeeds() {
    let addr = start_server();
    let performer = default_performer();
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .build()
        .unwrap();

    let _guard = rt.enter();
    let worker = performer.clone();
    let result = rt
        .block_on(tokio::task::spawn_blocking(move || {
            worker.execute_sync(&RequestDescription::new(format!("http://{addr}/echo")).tag("pool"))
        }))
        .unwrap()
        .unwrap();

    assert_eq!(result.kind(), ResultKind::Success, "{:?}", result.message());
    assert!(performer.registry().is_empty());
}

#[test]
fn caller_content_type_replaces_form_default() {
    let addr = start_server();
    let performer = default_performer();
    let desc = RequestDescription::new(format!("http://{addr}/echo"))
        .method(RequestMethod::Post)
        .param("a", "1")
        .header("content-type", "text/plain");

    let result = performer.execute_sync(&desc).unwrap();

    let echo: Echo = result.json().unwrap();
    assert_eq!(echo.headers.get("content-type").map(String::as_str), Some("text/plain"));
}

#[test]
fn panicking_interceptor_is_unclassified_failure() {
    let addr = start_server();
    let config = Configuration::builder()
        .message_interceptor(Exploding)
        .build()
        .unwrap();
    let performer = performer(config);

    let result = performer
        .execute_sync(&RequestDescription::new(format!("http://{addr}/echo")).tag("boom"))
        .unwrap();

    assert_eq!(result.kind(), ResultKind::UnclassifiedFailure);
    assert!(result.message().unwrap().contains("interceptor blew up"));
    assert!(performer.registry().is_empty());
}

struct Exploding;

impl MessageInterceptor for Exploding {
    fn on_request(&self, _request: &reqwest::Request) {
        panic!("interceptor blew up");
    }
}

#[test]
fn refused_connection_is_net_failure() {
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let performer = default_performer();

    let result = performer
        .execute_sync(&RequestDescription::new(format!("http://{addr}/echo")).tag("refused"))
        .unwrap();

    assert_eq!(result.kind(), ResultKind::NetFailure, "{:?}", result.message());
    assert!(!result.is_cancelled());
    assert!(performer.registry().is_empty());
}

#[test]
fn malformed_urls_never_reach_transport() {
    let performer = default_performer();
    for url in ["", "not a url", "/relative", "ftp://example.com/x", "http://"] {
        let result = performer
            .execute_sync(&RequestDescription::new(url).tag("bad"))
            .unwrap();
        assert_eq!(result.kind(), ResultKind::CheckUrl, "{url}");
    }
    assert!(!performer.config().has_transport());
    assert!(performer.registry().is_empty());
}

#[test]
fn cancel_from_another_thread_unblocks_sync_call() {
    let addr = start_server();
    let performer = default_performer();
    let canceller = performer.clone();

    let cancel_thread = thread::spawn(move || {
        for _ in 0..200 {
            if canceller.registry().contains("blocking") {
                return canceller.cancel("blocking");
            }
            thread::sleep(Duration::from_millis(10));
        }
        0
    });

    let result = performer
        .execute_sync(&RequestDescription::new(format!("http://{addr}/slow?ms=5000")).tag("blocking"))
        .unwrap();

    assert_eq!(cancel_thread.join().unwrap(), 1);
    assert_eq!(result.kind(), ResultKind::NetFailure);
    assert!(result.is_cancelled());
    assert!(!performer.registry().contains("blocking"));
}

#[test]
fn params_interceptor_changes_wire_not_description() {
    let addr = start_server();
    let config = Configuration::builder()
        .params_interceptor(|mut params: Params| {
            params.insert("sign".to_string(), Some("s1".to_string()));
            params.insert("c".to_string(), Some("changed".to_string()));
            params
        })
        .build()
        .unwrap();
    let performer = performer(config);
    let desc = RequestDescription::new(format!("http://{addr}/echo")).param("c", "2");

    let result = performer.execute_sync(&desc).unwrap();

    let echo: Echo = result.json().unwrap();
    assert_eq!(echo.query.get("sign").map(String::as_str), Some("s1"));
    assert_eq!(echo.query.get("c").map(String::as_str), Some("changed"));
    assert_eq!(desc.param_map().get("c"), Some(&Some("2".to_string())));
    assert!(!desc.param_map().contains_key("sign"));
}

#[derive(Clone, Default)]
struct Recorder {
    events: Arc<Mutex<Vec<String>>>,
}

impl MessageInterceptor for Recorder {
    fn on_request(&self, request: &reqwest::Request) {
        self.events
            .lock()
            .unwrap()
            .push(format!("request {} {}", request.method(), request.url().path()));
    }

    fn on_response(&self, response: &reqwest::Response) {
        self.events
            .lock()
            .unwrap()
            .push(format!("response {}", response.status().as_u16()));
    }
}

#[test]
fn message_interceptors_see_raw_exchange() {
    let addr = start_server();
    let recorder = Recorder::default();
    let config = Configuration::builder()
        .message_interceptor(recorder.clone())
        .build()
        .unwrap();
    let performer = performer(config);

    let result = performer
        .execute_sync(&RequestDescription::new(format!("http://{addr}/status/201")))
        .unwrap();

    assert!(result.is_success());
    assert_eq!(
        *recorder.events.lock().unwrap(),
        vec!["request GET /status/201".to_string(), "response 201".to_string()]
    );
}

#[test]
fn concurrent_first_use_builds_one_transport() {
    let config = Arc::new(Configuration::builder().build().unwrap());
    let barrier = Arc::new(Barrier::new(8));

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let config = Arc::clone(&config);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                config.transport().unwrap()
            })
        })
        .collect();
    let transports: Vec<_> = workers.into_iter().map(|w| w.join().unwrap()).collect();

    let first = &transports[0];
    assert!(transports.iter().all(|t| Arc::ptr_eq(t, first)));
    assert!(Arc::ptr_eq(first, &config.transport().unwrap()));
}
