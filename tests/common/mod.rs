//! Shared fixtures for darkpdf integration tests.
//!
//! Each test file compiles its own copy of this module, so items may appear
//! unused from the perspective of a single test file.

#![allow(dead_code)]
#![allow(unused_imports)]

#[cfg(feature = "server")]
pub mod app;
pub mod fixtures;
pub mod pdf;

#[cfg(feature = "server")]
pub use app::{TestApp, TestResponse};
pub use fixtures::{FakeRasterizer, PageSpec, SyntheticDocument};

/// Route library logs to the test harness; `RUST_LOG=darkpdf=debug` to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
