// Copyright (c) 2024 Mesh Overlay Contributors

//! Telemetry bootstrap.
//!
//! Every mesh crate logs through `tracing` directly — no logger instances
//! are threaded through call sites. Installing a subscriber is left to the
//! embedder; this module only provides a convenience initializer for
//! binaries and tests that want a reasonable default (`RUST_LOG`-driven
//! `tracing-subscriber` formatter).

use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Install a global `tracing-subscriber` formatter driven by `RUST_LOG`,
/// defaulting to `info` when the variable is unset. Safe to call more than
/// once; only the first call takes effect.
pub fn init() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .try_init();
    });
}

/// Same as [`init`] but forces a test-friendly writer so output interleaves
/// correctly with `cargo test`'s captured output.
#[cfg(any(test, feature = "test-support"))]
pub fn init_for_tests() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("debug"))
            .with_test_writer()
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init_for_tests();
        init_for_tests();
        tracing::info!("telemetry initialized twice without panicking");
    }
}
