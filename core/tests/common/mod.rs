#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use callway_core::{CallRegistry, Configuration, Performer};

/// Start the mock server on a random port in a background thread with its
/// own runtime, and return its address.
pub fn start_server() -> SocketAddr {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
        .unwrap();
    });

    addr
}

/// A performer with its own registry so tests never see each other's calls.
pub fn performer(config: Configuration) -> Performer {
    Performer::with_registry(Arc::new(config), Arc::new(CallRegistry::new()))
}

pub fn default_performer() -> Performer {
    performer(Configuration::builder().build().unwrap())
}
