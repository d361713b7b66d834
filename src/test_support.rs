//! Local HTTP server for exercising the download and parcel clients.

use axum::http::{HeaderMap, StatusCode, Uri};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;

/// The parts of an incoming request the tests inspect.
#[derive(Debug, Clone)]
pub(crate) struct ReceivedRequest {
    /// Path and query, e.g. `/parcel?latitude=1&longitude=2`.
    pub uri: String,
    pub headers: HeaderMap,
}

impl ReceivedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Serves every request with `handler` on an ephemeral localhost port and returns
/// `http://127.0.0.1:<port>`.
pub(crate) async fn serve<F>(handler: F) -> String
where
    F: Fn(&ReceivedRequest) -> (StatusCode, Vec<u8>) + Send + Sync + 'static,
{
    let handler = Arc::new(handler);
    let app = Router::new().fallback(move |uri: Uri, headers: HeaderMap| {
        let handler = handler.clone();
        async move { handler(&ReceivedRequest { uri: uri.to_string(), headers }) }
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// A `reqwest` client that never routes through an environment proxy.
pub(crate) fn direct_client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}
