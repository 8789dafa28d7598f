//! Platform configuration shared by every session and stream.
//!
//! A [`PlatformConfig`] is immutable once built; it is handed to a
//! [`Platform`](crate::platform::Platform) by value and never read from global state.

/// Builder API and validation for [`PlatformConfig`].
pub mod builder;
/// Platform-specific parameter names and toggles.
pub mod quirks;
/// Backoff policy for token exchanges.
pub mod retry;

pub use builder::*;
pub use quirks::*;
pub use retry::*;

// self
use crate::{
	_prelude::*,
	auth::{KeyId, TokenSecret},
	error::ConfigError,
};

/// Default lead time before expiry at which cached tokens are refreshed.
pub const DEFAULT_EXPIRY_MARGIN: Duration = Duration::seconds(60);
/// Default lifetime of signed JWT assertions.
pub const DEFAULT_ASSERTION_TTL: Duration = Duration::seconds(30);

/// Client authentication mode for token and revocation endpoint calls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
	#[default]
	/// Form POST body parameters for `client_id`/`client_secret`.
	ClientSecretPost,
	/// HTTP Basic with `client_id`/`client_secret`.
	ClientSecretBasic,
}

/// Endpoint set used by sessions and streams.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformEndpoints {
	/// Base URL of the REST API (events live at `{api_base}/events`).
	pub api_base: Url,
	/// Token endpoint used for every grant.
	pub token: Url,
	/// Optional revocation endpoint.
	pub revocation: Option<Url>,
	/// Optional authorization endpoint for the authorization code flow.
	pub authorization: Option<Url>,
}

/// Signing algorithm used for app-auth assertions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum JwtAlgorithm {
	#[default]
	/// RSASSA-PKCS1-v1_5 with SHA-256.
	RS256,
	/// RSASSA-PKCS1-v1_5 with SHA-384.
	RS384,
	/// RSASSA-PKCS1-v1_5 with SHA-512.
	RS512,
	/// ECDSA P-256 with SHA-256.
	ES256,
	/// ECDSA P-384 with SHA-384.
	ES384,
}
impl JwtAlgorithm {
	/// Returns `true` for RSA-based algorithms.
	pub fn is_rsa(self) -> bool {
		matches!(self, Self::RS256 | Self::RS384 | Self::RS512)
	}
}
impl From<JwtAlgorithm> for jsonwebtoken::Algorithm {
	fn from(value: JwtAlgorithm) -> Self {
		match value {
			JwtAlgorithm::RS256 => Self::RS256,
			JwtAlgorithm::RS384 => Self::RS384,
			JwtAlgorithm::RS512 => Self::RS512,
			JwtAlgorithm::ES256 => Self::ES256,
			JwtAlgorithm::ES384 => Self::ES384,
		}
	}
}

/// Key material for the JWT bearer (app auth) grant.
///
/// The private key is an unencrypted PEM document. It is never serialized.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppAuthConfig {
	/// Identifier of the public key registered with the platform (`kid` header).
	pub key_id: KeyId,
	/// PEM-encoded private key.
	pub private_key: TokenSecret,
	/// Signing algorithm.
	pub algorithm: JwtAlgorithm,
	/// Lifetime of each assertion (`exp - now`).
	pub assertion_ttl: Duration,
}
impl AppAuthConfig {
	/// Creates an RS256 configuration with the default assertion lifetime.
	pub fn new(key_id: KeyId, private_key_pem: impl Into<String>) -> Self {
		Self {
			key_id,
			private_key: TokenSecret::new(private_key_pem),
			algorithm: JwtAlgorithm::default(),
			assertion_ttl: DEFAULT_ASSERTION_TTL,
		}
	}

	/// Overrides the signing algorithm.
	pub fn with_algorithm(mut self, algorithm: JwtAlgorithm) -> Self {
		self.algorithm = algorithm;

		self
	}

	/// Overrides the assertion lifetime.
	pub fn with_assertion_ttl(mut self, ttl: Duration) -> Self {
		self.assertion_ttl = ttl;

		self
	}

	pub(crate) fn encoding_key(&self) -> Result<jsonwebtoken::EncodingKey, jsonwebtoken::errors::Error> {
		let pem = self.private_key.expose().as_bytes();

		if self.algorithm.is_rsa() {
			jsonwebtoken::EncodingKey::from_rsa_pem(pem)
		} else {
			jsonwebtoken::EncodingKey::from_ec_pem(pem)
		}
	}
}

/// Immutable, validated platform configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformConfig {
	/// OAuth client identifier.
	pub client_id: String,
	/// OAuth client secret, when the client is confidential.
	pub client_secret: Option<TokenSecret>,
	/// Endpoint definitions.
	pub endpoints: PlatformEndpoints,
	/// Client authentication mode at the token endpoint.
	pub client_auth_method: ClientAuthMethod,
	/// Backoff policy for retryable token exchange failures.
	pub retry_policy: RetryPolicy,
	/// Tokens closer than this to their expiry are refreshed proactively.
	pub expiry_margin: Duration,
	/// Platform-specific parameter names.
	pub quirks: PlatformQuirks,
	/// App-auth key material; excluded from serialization.
	#[serde(skip)]
	pub app_auth: Option<AppAuthConfig>,
}
impl PlatformConfig {
	/// Creates a new builder for the given client identifier.
	pub fn builder(client_id: impl Into<String>) -> PlatformConfigBuilder {
		PlatformConfigBuilder::new(client_id)
	}

	/// Returns the URL of the events collection.
	pub fn events_url(&self) -> Result<Url> {
		join_path(&self.endpoints.api_base, "events")
	}
}

pub(crate) fn join_path(base: &Url, segment: &str) -> Result<Url> {
	let mut url = base.clone();

	url.path_segments_mut()
		.map_err(|_| ConfigError::InvalidEndpoint { url: base.to_string() })?
		.pop_if_empty()
		.push(segment);

	Ok(url)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn events_url_extends_api_base() {
		let config = PlatformConfig::builder("client")
			.api_base(Url::parse("https://api.platform.test/2.0/").expect("API base should parse."))
			.token_endpoint(
				Url::parse("https://api.platform.test/oauth2/token").expect("Token URL should parse."),
			)
			.build()
			.expect("Configuration should build.");

		assert_eq!(
			config.events_url().expect("Events URL should be derivable.").as_str(),
			"https://api.platform.test/2.0/events"
		);
	}

	#[test]
	fn serialization_skips_app_auth_material() {
		let config = PlatformConfig::builder("client")
			.api_base(Url::parse("https://api.platform.test/2.0").expect("API base should parse."))
			.token_endpoint(
				Url::parse("https://api.platform.test/oauth2/token").expect("Token URL should parse."),
			)
			.build()
			.expect("Configuration should build.");
		let value = serde_json::to_value(&config).expect("Configuration should serialize.");

		assert!(value.get("app_auth").is_none());
		assert_eq!(value["client_auth_method"], "client_secret_post");
	}
}
