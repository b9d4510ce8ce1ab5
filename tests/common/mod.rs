//! Common test utilities and fixtures for opswatch integration tests
//!
//! This module provides:
//! - `Fixture` for building watched directory trees in a temp dir
//! - `WsClient`, a small WebSocket client speaking the dashboard protocol
//! - Polling helpers with generous timeouts for filesystem-driven tests

#![allow(unused_imports)]
#![allow(dead_code)]

pub mod client;
pub mod fixture;

pub use client::WsClient;
pub use fixture::Fixture;

use std::time::{Duration, Instant};

/// Upper bound for anything driven by real filesystem notifications
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Poll `condition` until it holds or `timeout` elapses
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

/// Blocking variant of [`wait_until`] for tests without a runtime
pub fn wait_until_blocking<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    condition()
}
