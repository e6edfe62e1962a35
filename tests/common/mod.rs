//! Shared fixtures for the HTTP integration tests

use std::time::Duration;
use todo_tui::{ApiClient, Config};
use wiremock::MockServer;

pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

pub fn client_for(server: &MockServer) -> ApiClient {
    let config = Config {
        api_url: server.uri(),
        timeout: Duration::from_secs(5),
        ..Config::default()
    };
    ApiClient::new(&config).expect("client should build")
}

#[allow(dead_code)]
pub fn authed_client_for(server: &MockServer) -> ApiClient {
    let mut client = client_for(server);
    client.set_token(mock_token());
    client
}

pub fn mock_token() -> String {
    "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9.test.signature".to_string()
}
