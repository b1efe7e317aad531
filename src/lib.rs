//! Foreman library — job resolution, triggering and build tracking,
//! consumed by the `foreman` binary and the integration tests.

pub mod bot;
pub mod build;
pub mod channel;
pub mod config;
pub mod jenkins;
