#![allow(dead_code)]

pub mod mock_server;
pub mod tls;

/// Initialize test logging once per binary. Filter via `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("wraith=debug")),
        )
        .with_test_writer()
        .try_init();
}
