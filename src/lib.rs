//! OAuth 2.0 sessions with single-flight token refresh, plus long-poll and interval-polling
//! consumers for a platform's append-only event log.
//!
//! A [`platform::Platform`] carries the injected configuration, transport, and clock. Sessions
//! built on top of it ([`session::Session`]) hand out valid bearer tokens through a
//! [`manager::TokenManager`], while [`events::EventStream`] and
//! [`events::EnterpriseEventStream`] drive the events endpoints on behalf of a session.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod grant;
pub mod http;
pub mod manager;
pub mod oauth;
pub mod obs;
pub mod platform;
pub mod session;
pub mod store;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for tests; enabled via `cfg(test)` or the `test` crate
	//! feature.

	pub use crate::_prelude::*;

	// self
	pub use crate::http::scripted::{
		RecordedRequest, ScriptedHttpClient, ScriptedReply, ScriptedTransportError,
		ScriptedTransportErrorMapper,
	};
	use crate::{
		clock::ManualClock,
		config::{PlatformConfig, RetryPolicy},
		platform::Platform,
	};

	/// Platform type alias used by scripted-transport tests.
	pub type ScriptedPlatform = Platform<ScriptedHttpClient, ScriptedTransportErrorMapper>;

	/// Base URL used by scripted fixtures.
	pub const SCRIPTED_BASE: &str = "https://platform.test";

	/// Retry policy with millisecond delays so retry paths stay fast under test.
	pub fn fast_retry_policy() -> RetryPolicy {
		RetryPolicy::new(3, Duration::milliseconds(1), Duration::milliseconds(5))
	}

	/// Builds a configuration that targets [`SCRIPTED_BASE`].
	pub fn scripted_config() -> PlatformConfig {
		PlatformConfig::builder("client-test")
			.client_secret("secret-test")
			.api_base(Url::parse(&format!("{SCRIPTED_BASE}/2.0")).expect("Scripted API base."))
			.token_endpoint(
				Url::parse(&format!("{SCRIPTED_BASE}/oauth2/token")).expect("Scripted token URL."),
			)
			.revocation_endpoint(
				Url::parse(&format!("{SCRIPTED_BASE}/oauth2/revoke"))
					.expect("Scripted revoke URL."),
			)
			.authorization_endpoint(
				Url::parse(&format!("{SCRIPTED_BASE}/oauth2/authorize"))
					.expect("Scripted authorize URL."),
			)
			.retry_policy(fast_retry_policy())
			.build()
			.expect("Scripted platform configuration should be valid.")
	}

	/// Builds a platform backed by a scripted transport and a manual clock.
	pub fn scripted_platform(
		config: PlatformConfig,
		client: ScriptedHttpClient,
		clock: ManualClock,
	) -> Arc<ScriptedPlatform> {
		Arc::new(
			Platform::with_http_client(config, client, ScriptedTransportErrorMapper)
				.with_clock(Arc::new(clock)),
		)
	}

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	#[cfg(feature = "reqwest")]
	pub fn test_reqwest_http_client() -> crate::http::ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		crate::http::ReqwestHttpClient::with_client(client)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap, VecDeque},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use {oauth2, url};
#[cfg(test)] use httpmock as _;
