//! Crate-level error types shared across sessions, token managers, stores, and event streams.
//!
//! [`Error`] is `Clone` so a single refresh outcome can be handed to every caller waiting on it;
//! foreign error sources are therefore held behind [`Arc`].

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type SharedError = Arc<dyn StdError + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Clone, Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream failure; retry with backoff.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Upstream returned a body that could not be parsed into the expected shape.
	#[error("The {endpoint} endpoint returned a malformed response.")]
	MalformedResponse {
		/// Logical endpoint label (token, events, long-poll, ...).
		endpoint: &'static str,
		/// Structured parsing failure.
		#[source]
		source: Arc<serde_path_to_error::Error<serde_json::Error>>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},

	/// Requested scopes exceed what was granted.
	#[error("Token lacks the required scopes: {reason}.")]
	InsufficientScope {
		/// Platform- or client-supplied reason string.
		reason: String,
	},
	/// Platform rejected the grant (e.g., bad code or refresh token).
	#[error("Platform rejected the grant: {reason}.")]
	InvalidGrant {
		/// Platform- or client-supplied reason string.
		reason: String,
	},
	/// Client authentication failed or credentials are malformed.
	#[error("Client authentication failed: {reason}.")]
	InvalidClient {
		/// Platform- or client-supplied reason string.
		reason: String,
	},
	/// JWT assertion was rejected because its time claims disagree with the server clock.
	#[error("JWT assertion rejected due to clock skew: {reason}.")]
	ClockSkew {
		/// Platform-supplied reason string.
		reason: String,
		/// Server clock reported by the `Date` response header, when present.
		server_time: Option<OffsetDateTime>,
	},
	/// Token has been revoked and must not be reused.
	#[error("Token has been revoked.")]
	Revoked,
	/// Platform API answered with a non-retryable error status.
	#[error("Platform API returned HTTP {status}: {message}.")]
	Api {
		/// HTTP status code.
		status: u16,
		/// Body preview or error message.
		message: String,
	},
}
impl Error {
	/// Returns `true` for failures that are safe to retry with backoff.
	pub fn is_retryable(&self) -> bool {
		matches!(self, Self::Transient(_) | Self::Transport(_))
	}

	/// Returns `true` for terminal credential failures that require re-authentication.
	pub fn is_auth_failure(&self) -> bool {
		matches!(self, Self::InvalidGrant { .. } | Self::InvalidClient { .. } | Self::Revoked)
	}

	/// Returns the upstream `Retry-After` hint, if one accompanied the failure.
	pub fn retry_after(&self) -> Option<Duration> {
		match self {
			Self::Transient(TransientError::TokenEndpoint { retry_after, .. })
			| Self::Transient(TransientError::Api { retry_after, .. }) => *retry_after,
			_ => None,
		}
	}
}

/// Configuration and validation failures.
#[derive(Clone, Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: SharedError,
	},
	/// HTTP request construction failed.
	#[error("HTTP request could not be constructed.")]
	HttpRequest {
		/// Underlying request builder failure.
		#[source]
		source: Arc<oauth2::http::Error>,
	},
	/// An endpoint URL could not be derived from the configuration.
	#[error("Endpoint URL `{url}` cannot be extended with a path.")]
	InvalidEndpoint {
		/// Offending URL.
		url: String,
	},
	/// Redirect URI cannot be parsed.
	#[error("Redirect URI is invalid.")]
	InvalidRedirect {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A header name or value cannot be encoded.
	#[error("Header `{name}` cannot be encoded.")]
	InvalidHeader {
		/// Header name.
		name: String,
	},
	/// The configuration does not provide what the requested operation needs.
	#[error("Configuration does not support {operation}: {reason}.")]
	Unsupported {
		/// Operation label.
		operation: &'static str,
		/// Missing piece of configuration.
		reason: &'static str,
	},
	/// No token (or refresh token) is available; the session needs re-authentication.
	#[error("No refresh token is available for this session.")]
	MissingRefreshToken,
	/// JWT assertion could not be signed.
	#[error("JWT assertion could not be signed.")]
	AssertionSigning {
		/// Underlying signing failure.
		#[source]
		source: Arc<jsonwebtoken::errors::Error>,
	},
	/// Platform configuration failed validation.
	#[error(transparent)]
	Platform(#[from] crate::config::PlatformConfigError),
	/// Request scopes cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// Identifier validation failed.
	#[error("Identifier is invalid.")]
	InvalidIdentifier(#[from] crate::auth::IdentifierError),
	/// Token builder validation failed.
	#[error("Unable to build token.")]
	TokenBuild(#[from] crate::auth::TokenBuilderError),
	/// Event stream options failed validation.
	#[error("Event stream options are invalid: {reason}.")]
	InvalidStreamOptions {
		/// Description of the violated rule.
		reason: &'static str,
	},
	/// Timestamp could not be formatted for a query parameter.
	#[error("Timestamp cannot be formatted as RFC 3339.")]
	TimestampFormat {
		/// Underlying formatting failure.
		#[source]
		source: Arc<time::error::Format>,
	},
	/// Token endpoint response omitted `expires_in`.
	#[error("Token endpoint response is missing expires_in.")]
	MissingExpiresIn,
	/// Token endpoint returned an excessively large `expires_in`.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
	/// Token endpoint returned a non-positive duration.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::HttpClientBuild { source: Arc::new(src) }
	}
}
impl From<oauth2::http::Error> for ConfigError {
	fn from(e: oauth2::http::Error) -> Self {
		Self::HttpRequest { source: Arc::new(e) }
	}
}
impl From<time::error::Format> for ConfigError {
	fn from(e: time::error::Format) -> Self {
		Self::TimestampFormat { source: Arc::new(e) }
	}
}
impl From<jsonwebtoken::errors::Error> for ConfigError {
	fn from(e: jsonwebtoken::errors::Error) -> Self {
		Self::AssertionSigning { source: Arc::new(e) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary failure variants (safe to retry).
#[derive(Clone, Debug, ThisError)]
pub enum TransientError {
	/// Token endpoint returned an unexpected but non-fatal response.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	TokenEndpoint {
		/// Platform- or client-supplied message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// A platform API call failed with a retryable status (429 or 5xx) or timed out.
	#[error("The {endpoint} endpoint failed temporarily: {message}.")]
	Api {
		/// Logical endpoint label.
		endpoint: &'static str,
		/// Summary of the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
}

/// Transport-level failures (network, IO).
#[derive(Clone, Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the platform.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: SharedError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the platform.")]
	Io(#[source] Arc<std::io::Error>),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Network { source: Arc::new(src) }
	}
}
impl From<std::io::Error> for TransportError {
	fn from(e: std::io::Error) -> Self {
		Self::Io(Arc::new(e))
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
