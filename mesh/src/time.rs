// Copyright (c) 2024 Mesh Overlay Contributors

//! Wall-clock helper, duplicated per-crate the way the identity and pin
//! stores already do rather than introducing a shared dependency for one
//! function.

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
