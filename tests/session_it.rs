mod common;

// std
use std::sync::Arc;
// crates.io
use httpmock::prelude::*;
use oauth2_events::{
	auth::{GrantKind, ScopeSet, Token},
	error::Error,
	grant::ExchangeOptions,
	session::Session,
	store::{MemoryStore, TokenStore},
};
use time::{Duration, OffsetDateTime};
// self
use common::*;

fn expired_token(access_token: &str, refresh_token: &str) -> Token {
	Token::builder(GrantKind::AuthorizationCode)
		.access_token(access_token)
		.refresh_token(refresh_token)
		.issued_at(OffsetDateTime::now_utc() - Duration::hours(2))
		.expires_in(Duration::hours(1))
		.build()
		.expect("Seed token should build.")
}

#[tokio::test]
async fn client_credentials_tokens_are_cached_and_coalesced() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/oauth2/token")
				.form_urlencoded_tuple("grant_type", "client_credentials")
				.form_urlencoded_tuple("client_id", CLIENT_ID);
			then.status(200).json_body(token_body("cc-token", None, 3600));
		})
		.await;
	let session = Session::anonymous(platform(&server));
	let (first, second, third) = tokio::join!(session.token(), session.token(), session.token());

	for token in [first, second, third] {
		assert_eq!(
			token.expect("Concurrent acquisition should succeed.").access_token.expose(),
			"cc-token"
		);
	}

	let cached = session.token().await.expect("Cached token should be returned.");

	assert_eq!(cached.acquired_via, GrantKind::ClientCredentials);

	mock.assert_calls_async(1).await;

	let metrics = session.manager().metrics();

	assert_eq!(metrics.exchanges(), 1);
	assert_eq!(metrics.coalesced(), 2);
	assert_eq!(metrics.cache_hits(), 1);
}

#[tokio::test]
async fn persistent_sessions_refresh_through_the_store() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/oauth2/token")
				.form_urlencoded_tuple("grant_type", "refresh_token")
				.form_urlencoded_tuple("refresh_token", "rt-1");
			then.status(200).json_body(token_body("at-2", Some("rt-2"), 3600));
		})
		.await;
	let store = MemoryStore::with_value(expired_token("at-1", "rt-1"));
	let shared: Arc<dyn TokenStore> = Arc::new(store.clone());
	let session = Session::persistent(platform(&server), None, Some(shared));
	let token = session.token().await.expect("Stored refresh token should be redeemed.");

	assert_eq!(token.access_token.expose(), "at-2");

	let stored = store.get().expect("Refreshed token should be persisted.");

	assert_eq!(stored.access_token.expose(), "at-2");
	assert_eq!(stored.refresh_token.as_ref().map(|rt| rt.expose()), Some("rt-2"));

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn invalid_grant_clears_the_store() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth2/token");
			then.status(400).json_body(serde_json::json!({
				"error": "invalid_grant",
				"error_description": "Refresh token has expired",
			}));
		})
		.await;
	let store = MemoryStore::with_value(expired_token("at-1", "rt-1"));
	let shared: Arc<dyn TokenStore> = Arc::new(store.clone());
	let session = Session::persistent(platform(&server), None, Some(shared));
	let err = session.token().await.expect_err("Rejected refresh should fail.");

	assert!(matches!(err, Error::InvalidGrant { .. }));
	assert!(store.get().is_none());
	assert!(session.manager().cached().is_none());

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn revoked_sessions_acquire_a_new_token() {
	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth2/token");
			then.status(200).json_body(token_body("cc-token", None, 3600));
		})
		.await;
	let revoke_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth2/revoke").form_urlencoded_tuple("token", "cc-token");
			then.status(200);
		})
		.await;
	let session = Session::anonymous(platform(&server));

	session.token().await.expect("Initial acquisition should succeed.");
	session.revoke().await.expect("Revocation should succeed.");

	assert!(session.manager().cached().is_none());

	session.token().await.expect("A fresh token should be acquired after revocation.");

	revoke_mock.assert_calls_async(1).await;
	token_mock.assert_calls_async(2).await;
}

#[tokio::test]
async fn downscoped_tokens_leave_the_parent_untouched() {
	let server = MockServer::start_async().await;
	let parent_mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/oauth2/token")
				.form_urlencoded_tuple("grant_type", "client_credentials");
			then.status(200).json_body(token_body("parent-token", None, 3600));
		})
		.await;
	let resource = url(&server, "/2.0/files/123");
	let exchange_mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/oauth2/token")
				.form_urlencoded_tuple("grant_type", "urn:ietf:params:oauth:grant-type:token-exchange")
				.form_urlencoded_tuple("subject_token", "parent-token")
				.form_urlencoded_tuple("scope", "item_preview")
				.form_urlencoded_tuple("resource", resource.as_str());
			then.status(200).json_body(token_body("child-token", None, 3600));
		})
		.await;
	let session = Session::anonymous(platform(&server));
	let child = session
		.exchange_token(
			ScopeSet::new(["item_preview"]).expect("Scope should be valid."),
			Some(resource.clone()),
			ExchangeOptions::default(),
		)
		.await
		.expect("Token exchange should succeed.");

	assert_eq!(child.access_token.expose(), "child-token");
	assert_eq!(child.acquired_via, GrantKind::TokenExchange);
	assert_eq!(
		session.manager().cached().map(|token| token.access_token.expose().to_owned()).as_deref(),
		Some("parent-token")
	);

	parent_mock.assert_calls_async(1).await;
	exchange_mock.assert_calls_async(1).await;
}
