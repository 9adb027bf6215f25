//! Shared helpers for unit tests that need a local HTTP server.

pub mod socket_guard;
