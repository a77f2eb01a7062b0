//! Router harness for HTTP tests.

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use darkpdf::server::{build_router, AppState, ServerConfig};
use darkpdf::{InversionConfig, Rasterizer};
use http_body_util::BodyExt;
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceExt;

const BOUNDARY: &str = "darkpdf-test-boundary";

/// The production router driven in-process.
pub struct TestApp {
    router: axum::Router,
}

impl TestApp {
    pub fn new(rasterizer: Arc<dyn Rasterizer>) -> Self {
        Self::with_static_dir(rasterizer, PathBuf::from("/nonexistent/darkpdf-static"))
    }

    pub fn with_static_dir(rasterizer: Arc<dyn Rasterizer>, static_dir: PathBuf) -> Self {
        let config = InversionConfig::builder()
            .scale_factor(1.0)
            .concurrency(2)
            .compress_output(false)
            .build()
            .expect("valid test config");
        let server = ServerConfig {
            static_dir,
            ..ServerConfig::default()
        };
        Self {
            router: build_router(AppState::new(rasterizer, config), &server),
        }
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.request(Request::get(path).body(Body::empty()).unwrap())
            .await
    }

    /// POST a multipart form with a single file field.
    pub async fn upload(
        &self,
        field: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> TestResponse {
        let body = multipart_body(field, file_name, bytes);
        let request = Request::post("/convert")
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();
        self.request(request).await
    }

    pub async fn request(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Request failed");

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes()
            .to_vec();

        TestResponse {
            status,
            headers,
            body,
        }
    }
}

/// Encode one file part as `multipart/form-data`.
pub fn multipart_body(field: &str, file_name: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/pdf\r\n\r\n");
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// Response captured for assertions.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("Failed to parse JSON response")
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}
