//! Common test utilities for integration tests.
//!
//! Provides client configurations pointed at a mock server, canned access
//! token grants, and helpers for decoding the form bodies the client sends.
//!
//! # Example
//!
//! ```ignore
//! let server = MockServer::start().await;
//! mount_token_endpoint(&server, "tok-1").await;
//! let client = WonderPushClient::new(test_config(&server));
//! ```

use std::time::Duration;

use serde_json::Value;
use tracing_subscriber::EnvFilter;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use wonderpush::config::ClientConfig;

/// Routes client traces to the per-test output; `RUST_LOG` selects the level.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Client configuration pointed at `server`, with intervals small enough
/// for tests to observe timing behavior quickly.
pub fn test_config(server: &MockServer) -> ClientConfig {
    init_tracing();
    let mut config = ClientConfig::new("test-client-id")
        .with_client_secret("test-client-secret")
        .with_base_url(server.uri());
    config.device_platform = "test".to_string();
    config.device_model = "test-runner".to_string();
    config.token_retry_interval = Duration::from_millis(50);
    config.bad_auth_retry_interval = Duration::from_millis(10);
    config.properties_min_delay = Duration::from_millis(200);
    config.properties_max_delay = Duration::from_millis(400);
    config
}

/// Access token grant body in the shape the token endpoint returns.
#[allow(dead_code)]
pub fn token_grant(token: &str) -> Value {
    serde_json::json!({
        "token": token,
        "data": {
            "sid": "sid-1",
            "installationId": "inst-1"
        }
    })
}

/// Mounts a token endpoint that always grants `token`.
#[allow(dead_code)]
pub async fn mount_token_endpoint(server: &MockServer, token: &str) {
    Mock::given(method("POST"))
        .and(path("/authentication/accessToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_grant(token)))
        .mount(server)
        .await;
}

/// Decodes a form-encoded request body into name/value pairs.
#[allow(dead_code)]
pub fn form_pairs(body: &[u8]) -> Vec<(String, String)> {
    serde_urlencoded::from_bytes(body).expect("request body should be form encoded")
}

/// First value recorded under `name` in a form-encoded body.
#[allow(dead_code)]
pub fn form_value(body: &[u8], name: &str) -> Option<String> {
    form_pairs(body)
        .into_iter()
        .find(|(n, _)| n == name)
        .map(|(_, value)| value)
}

/// Extracts and parses the JSON `body` parameter of an installation write.
#[allow(dead_code)]
pub fn installation_body(body: &[u8]) -> Value {
    let raw = form_value(body, "body").expect("installation request should carry a body parameter");
    serde_json::from_str(&raw).expect("body parameter should be JSON")
}
