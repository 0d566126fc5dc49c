/*
[INPUT]:  Mock WebDriver server requirements
[OUTPUT]: Shared fixtures for WebDriver integration tests
[POS]:    Test infrastructure - shared across test modules
[UPDATE]: When adding new WebDriver endpoints under test
*/

//! Common test utilities for autotask-driver tests

use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const SESSION_ID: &str = "session-1";
pub const ELEMENT_KEY: &str = "element-6066-11e4-a6c3-4e5c6f0b4a68";

/// Start a mock server that accepts one new-session request
pub async fn setup_session_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/session"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": { "sessionId": SESSION_ID, "capabilities": { "browserName": "chrome" } }
        })))
        .expect(1)
        .mount(&server)
        .await;
    server
}

/// JSON reference to a web element
pub fn element_ref(id: &str) -> Value {
    let mut map = serde_json::Map::new();
    map.insert(ELEMENT_KEY.to_string(), Value::String(id.to_string()));
    Value::Object(map)
}

/// W3C error body
pub fn webdriver_error(error: &str, message: &str) -> Value {
    json!({ "value": { "error": error, "message": message, "stacktrace": "" } })
}
