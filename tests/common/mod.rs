//! Fixtures shared by the `httpmock`-backed integration suites.

#![allow(dead_code)]

// std
use std::sync::Arc;
// crates.io
use httpmock::MockServer;
use oauth2_events::{
	config::{PlatformConfig, RetryPolicy},
	platform::{Platform, ReqwestPlatform},
};
use serde_json::{Value, json};
use time::Duration;
use url::Url;

pub const CLIENT_ID: &str = "client-it";
pub const CLIENT_SECRET: &str = "secret-it";

pub fn url(server: &MockServer, path: &str) -> Url {
	Url::parse(&server.url(path)).expect("Mock server URL should parse.")
}

pub fn config(server: &MockServer) -> PlatformConfig {
	PlatformConfig::builder(CLIENT_ID)
		.client_secret(CLIENT_SECRET)
		.api_base(url(server, "/2.0"))
		.token_endpoint(url(server, "/oauth2/token"))
		.revocation_endpoint(url(server, "/oauth2/revoke"))
		.retry_policy(RetryPolicy::new(3, Duration::milliseconds(1), Duration::milliseconds(5)))
		.build()
		.expect("Mock platform configuration should be valid.")
}

pub fn platform(server: &MockServer) -> Arc<ReqwestPlatform> {
	Arc::new(Platform::new(config(server)))
}

pub fn token_body(access_token: &str, refresh_token: Option<&str>, expires_in: i64) -> Value {
	let mut body = json!({
		"access_token": access_token,
		"token_type": "bearer",
		"expires_in": expires_in,
	});

	if let Some(refresh_token) = refresh_token {
		body["refresh_token"] = json!(refresh_token);
	}

	body
}

pub fn events_body(first: usize, count: usize, next: &str) -> Value {
	let entries: Vec<_> = (first..first + count)
		.map(|idx| json!({ "event_id": format!("e-{idx}"), "event_type": "LOGIN" }))
		.collect();

	json!({ "chunk_size": count, "entries": entries, "next_stream_position": next })
}
