use std::net::TcpListener;
use std::panic::Location;

use wiremock::MockServer;

/// Env var that turns a skipped socket test into a hard failure (CI).
const REQUIRE_SOCKETS_ENV: &str = "BLOGCRAWL_REQUIRE_SOCKET_TESTS";

fn sockets_required() -> bool {
    std::env::var(REQUIRE_SOCKETS_ENV)
        .is_ok_and(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

/// Returns true (and explains why) when localhost cannot be bound, so
/// wiremock-based tests can bail out early inside sandboxes.
#[track_caller]
#[must_use]
pub fn localhost_unavailable() -> bool {
    if TcpListener::bind("127.0.0.1:0").is_ok() {
        return false;
    }

    let caller = Location::caller();
    let message = format!(
        "[socket-test] cannot bind 127.0.0.1 at {}:{}",
        caller.file(),
        caller.line()
    );
    assert!(!sockets_required(), "{message}; {REQUIRE_SOCKETS_ENV} is set");
    eprintln!("{message}; skipping");
    true
}

/// Starts a mock HTTP server, or returns `None` when sockets are unavailable.
pub async fn start_mock_server_or_skip() -> Option<MockServer> {
    if localhost_unavailable() {
        None
    } else {
        Some(MockServer::start().await)
    }
}
