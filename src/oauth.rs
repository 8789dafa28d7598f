//! Token and revocation endpoint plumbing: request construction, response parsing, and error
//! classification.
//!
//! Grants only produce form parameters; everything that touches the wire format (client
//! authentication, JSON parsing, mapping failures into [`Error`]) lives here so every grant
//! behaves the same way.

pub mod strategy;

pub use strategy::*;

// crates.io
use base64::{Engine, engine::general_purpose::STANDARD};
use oauth2::{
	HttpClientError, HttpRequest, HttpResponse, TokenResponse,
	basic::{BasicErrorResponse, BasicTokenResponse},
	http::{
		Method, Request,
		header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
	},
};
use serde::de::DeserializeOwned;
use url::form_urlencoded;
// self
use crate::{
	_prelude::*,
	auth::{GrantKind, ScopeSet, Token},
	config::{ClientAuthMethod, PlatformConfig},
	error::{ConfigError, TransientError, TransportError},
	http::ResponseMetadata,
};

/// Logical label of the token endpoint.
pub const TOKEN_ENDPOINT: &str = "token";
/// Logical label of the revocation endpoint.
pub const REVOKE_ENDPOINT: &str = "revoke";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const JSON_CONTENT_TYPE: &str = "application/json";

/// Maps HTTP transport failures into crate [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into a crate error.
	fn map_transport_error(
		&self,
		strategy: &dyn ErrorStrategy,
		endpoint: &'static str,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		_strategy: &dyn ErrorStrategy,
		endpoint: &'static str,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) => map_reqwest_error(endpoint, meta, *inner),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => TransportError::from(inner).into(),
			HttpClientError::Other(message) => map_generic_transport_error(endpoint, meta, message),
			_ => map_generic_transport_error(endpoint, meta, "unknown transport failure"),
		}
	}
}

/// Builds a form-encoded token endpoint request with client authentication applied.
pub(crate) fn token_request(
	config: &PlatformConfig,
	form: BTreeMap<String, String>,
) -> Result<HttpRequest> {
	form_request(config, &config.endpoints.token, form)
}

/// Builds a revocation request for `token`.
pub(crate) fn revocation_request(config: &PlatformConfig, url: &Url, token: &str) -> Result<HttpRequest> {
	form_request(config, url, BTreeMap::from([("token".to_owned(), token.to_owned())]))
}

fn form_request(
	config: &PlatformConfig,
	url: &Url,
	mut form: BTreeMap<String, String>,
) -> Result<HttpRequest> {
	let mut builder = Request::builder()
		.method(Method::POST)
		.uri(url.as_str())
		.header(CONTENT_TYPE, FORM_CONTENT_TYPE)
		.header(ACCEPT, JSON_CONTENT_TYPE);

	match config.client_auth_method {
		ClientAuthMethod::ClientSecretPost => {
			form.insert("client_id".into(), config.client_id.clone());

			if let Some(secret) = config.client_secret.as_ref() {
				form.insert("client_secret".into(), secret.expose().to_owned());
			}
		},
		ClientAuthMethod::ClientSecretBasic => {
			let secret = config.client_secret.as_ref().map(|s| s.expose()).unwrap_or_default();
			let credentials = format!("{}:{}", form_encode(&config.client_id), form_encode(secret));

			builder = builder.header(AUTHORIZATION, format!("Basic {}", STANDARD.encode(credentials)));
		},
	}

	let body = form_urlencoded::Serializer::new(String::new()).extend_pairs(form.iter()).finish();

	builder.body(body.into_bytes()).map_err(|e| ConfigError::from(e).into())
}

fn form_encode(value: &str) -> String {
	form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Parses a successful token endpoint response into a [`Token`].
///
/// Scopes echoed by the platform win; otherwise the requested scopes are recorded.
pub(crate) fn parse_token_response(
	grant: GrantKind,
	requested: &ScopeSet,
	response: &HttpResponse,
	issued_at: OffsetDateTime,
) -> Result<Token> {
	let body: BasicTokenResponse = parse_json(TOKEN_ENDPOINT, response)?;
	let expires_in = body.expires_in().ok_or(ConfigError::MissingExpiresIn)?.as_secs();
	let expires_in = i64::try_from(expires_in).map_err(|_| ConfigError::ExpiresInOutOfRange)?;

	if expires_in <= 0 {
		return Err(ConfigError::NonPositiveExpiresIn.into());
	}
	if issued_at.checked_add(Duration::seconds(expires_in)).is_none() {
		return Err(ConfigError::ExpiresInOutOfRange.into());
	}

	let scopes = match body.scopes() {
		Some(scopes) =>
			ScopeSet::new(scopes.iter().map(|scope| scope.as_str())).map_err(ConfigError::from)?,
		None => requested.clone(),
	};
	let mut builder = Token::builder(grant)
		.access_token(body.access_token().secret().to_owned())
		.token_type(body.token_type().as_ref())
		.scopes(scopes)
		.issued_at(issued_at)
		.expires_in(Duration::seconds(expires_in));

	if let Some(refresh) = body.refresh_token() {
		builder = builder.refresh_token(refresh.secret().to_owned());
	}

	builder.build().map_err(|e| ConfigError::from(e).into())
}

/// Parses a JSON body, reporting the failing path on mismatch.
pub(crate) fn parse_json<T>(endpoint: &'static str, response: &HttpResponse) -> Result<T>
where
	T: DeserializeOwned,
{
	let mut de = serde_json::Deserializer::from_slice(response.body());

	serde_path_to_error::deserialize(&mut de).map_err(|source| Error::MalformedResponse {
		endpoint,
		source: Arc::new(source),
		status: Some(response.status().as_u16()),
	})
}

/// Classifies an unsuccessful token or revocation endpoint response.
pub(crate) fn map_token_failure(
	strategy: &dyn ErrorStrategy,
	grant: Option<GrantKind>,
	meta: Option<&ResponseMetadata>,
	response: &HttpResponse,
) -> Error {
	let status = response.status().as_u16();
	let mut ctx = ErrorContext::new(grant).with_http_status(status);

	match serde_json::from_slice::<BasicErrorResponse>(response.body()) {
		Ok(body) => {
			ctx = ctx.with_oauth_error(body.error().as_ref());

			if let Some(description) = body.error_description() {
				ctx = ctx.with_error_description(description.clone());
			}
		},
		Err(_) => ctx = ctx.with_body_preview(String::from_utf8_lossy(response.body())),
	}

	let reason = ctx.summary();

	match strategy.classify_token_error(&ctx) {
		ErrorKind::InvalidGrant => Error::InvalidGrant { reason },
		ErrorKind::InvalidClient => Error::InvalidClient { reason },
		ErrorKind::InsufficientScope => Error::InsufficientScope { reason },
		ErrorKind::ClockSkew => Error::ClockSkew { reason, server_time: meta_date(meta) },
		ErrorKind::Transient => TransientError::TokenEndpoint {
			message: reason,
			status: Some(status),
			retry_after: meta_retry_after(meta),
		}
		.into(),
	}
}

/// Classifies an unsuccessful platform API response.
///
/// 429 and 5xx are retryable, 403 means the token lacks scopes, everything else is surfaced
/// verbatim.
pub(crate) fn map_api_failure(
	endpoint: &'static str,
	meta: Option<&ResponseMetadata>,
	response: &HttpResponse,
) -> Error {
	let status = response.status().as_u16();
	let message = ErrorContext::new(None)
		.with_http_status(status)
		.with_body_preview(String::from_utf8_lossy(response.body()))
		.summary();

	match status {
		429 | 500..=599 => TransientError::Api {
			endpoint,
			message,
			status: Some(status),
			retry_after: meta_retry_after(meta),
		}
		.into(),
		403 => Error::InsufficientScope { reason: message },
		_ => Error::Api { status, message },
	}
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(endpoint: &'static str, meta: Option<&ResponseMetadata>, err: ReqwestError) -> Error {
	if err.is_builder() {
		return ConfigError::from(err).into();
	}
	if err.is_timeout() {
		return TransientError::Api {
			endpoint,
			message: "request timed out".into(),
			status: meta_status(meta).or_else(|| err.status().map(|code| code.as_u16())),
			retry_after: meta_retry_after(meta),
		}
		.into();
	}

	TransportError::from(err).into()
}

#[cfg(feature = "reqwest")]
fn map_generic_transport_error(
	endpoint: &'static str,
	meta: Option<&ResponseMetadata>,
	message: impl Display,
) -> Error {
	TransientError::Api {
		endpoint,
		message: format!("HTTP client error: {message}"),
		status: meta_status(meta),
		retry_after: meta_retry_after(meta),
	}
	.into()
}

#[cfg(feature = "reqwest")]
fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}

fn meta_retry_after(meta: Option<&ResponseMetadata>) -> Option<Duration> {
	meta.and_then(|value| value.retry_after)
}

fn meta_date(meta: Option<&ResponseMetadata>) -> Option<OffsetDateTime> {
	meta.and_then(|value| value.date)
}

#[cfg(test)]
mod tests {
	// crates.io
	use oauth2::http::StatusCode;
	use time::macros;
	// self
	use super::*;
	use crate::_preludet::scripted_config;

	fn response(status: u16, body: serde_json::Value) -> HttpResponse {
		let mut response = HttpResponse::new(body.to_string().into_bytes());

		*response.status_mut() = StatusCode::from_u16(status).expect("Fixture status is valid.");

		response
	}

	fn decode_form(request: &HttpRequest) -> BTreeMap<String, String> {
		form_urlencoded::parse(request.body()).into_owned().collect()
	}

	#[test]
	fn client_secret_post_puts_credentials_in_form() {
		let config = scripted_config();
		let request = token_request(
			&config,
			BTreeMap::from([("grant_type".into(), "client_credentials".into())]),
		)
		.expect("Token request should build.");
		let form = decode_form(&request);

		assert_eq!(request.method(), Method::POST);
		assert_eq!(form.get("client_id").map(String::as_str), Some("client-test"));
		assert_eq!(form.get("client_secret").map(String::as_str), Some("secret-test"));
		assert!(request.headers().get(AUTHORIZATION).is_none());
	}

	#[test]
	fn client_secret_basic_uses_authorization_header() {
		let mut config = scripted_config();

		config.client_auth_method = ClientAuthMethod::ClientSecretBasic;

		let request = token_request(&config, BTreeMap::new()).expect("Token request should build.");
		let header = request
			.headers()
			.get(AUTHORIZATION)
			.and_then(|value| value.to_str().ok())
			.expect("Basic authorization header should be present.");

		assert_eq!(header, format!("Basic {}", STANDARD.encode("client-test:secret-test")));
		assert!(!decode_form(&request).contains_key("client_secret"));
	}

	#[test]
	fn token_responses_produce_tokens() {
		let issued = macros::datetime!(2025-01-01 00:00 UTC);
		let token = parse_token_response(
			GrantKind::RefreshToken,
			&ScopeSet::default(),
			&response(
				200,
				serde_json::json!({
					"access_token": "at-1",
					"refresh_token": "rt-2",
					"token_type": "bearer",
					"expires_in": 3600
				}),
			),
			issued,
		)
		.expect("Token response should parse.");

		assert_eq!(token.access_token.expose(), "at-1");
		assert_eq!(token.refresh_token.as_ref().map(|s| s.expose()), Some("rt-2"));
		assert_eq!(token.expires_at, macros::datetime!(2025-01-01 01:00 UTC));
		assert_eq!(token.acquired_via, GrantKind::RefreshToken);
	}

	#[test]
	fn malformed_token_responses_report_paths() {
		let err = parse_token_response(
			GrantKind::ClientCredentials,
			&ScopeSet::default(),
			&response(200, serde_json::json!({ "access_token": 7, "token_type": "bearer" })),
			OffsetDateTime::UNIX_EPOCH,
		)
		.expect_err("Numeric access tokens must be rejected.");

		match err {
			Error::MalformedResponse { endpoint, source, status } => {
				assert_eq!(endpoint, TOKEN_ENDPOINT);
				assert_eq!(status, Some(200));
				assert!(source.path().to_string().contains("access_token"));
			},
			other => panic!("Unexpected error: {other:?}"),
		}
	}

	#[test]
	fn oversized_expiry_is_rejected_without_panicking() {
		let err = parse_token_response(
			GrantKind::ClientCredentials,
			&ScopeSet::default(),
			&response(
				200,
				serde_json::json!({
					"access_token": "x",
					"token_type": "bearer",
					"expires_in": 9_000_000_000_000_000_u64
				}),
			),
			macros::datetime!(2025-01-01 00:00 UTC),
		)
		.expect_err("An expiry past the timestamp range must be rejected.");

		assert!(matches!(err, Error::Config(ConfigError::ExpiresInOutOfRange)), "{err:?}");
		assert!(!err.is_retryable());
	}

	#[test]
	fn token_failures_are_classified() {
		let strategy = DefaultErrorStrategy;
		let grant = map_token_failure(
			&strategy,
			Some(GrantKind::RefreshToken),
			None,
			&response(400, serde_json::json!({ "error": "invalid_grant" })),
		);

		assert!(matches!(grant, Error::InvalidGrant { .. }));

		let meta = ResponseMetadata {
			status: Some(400),
			retry_after: None,
			date: Some(macros::datetime!(2025-01-01 00:10 UTC)),
		};
		let skew = map_token_failure(
			&strategy,
			Some(GrantKind::JwtBearer),
			Some(&meta),
			&response(
				400,
				serde_json::json!({
					"error": "invalid_grant",
					"error_description": "Please check the 'exp' claim."
				}),
			),
		);

		assert!(matches!(
			skew,
			Error::ClockSkew { server_time: Some(t), .. } if t == macros::datetime!(2025-01-01 00:10 UTC)
		));

		let busy = map_token_failure(&strategy, None, None, &response(503, serde_json::json!({})));

		assert!(busy.is_retryable());
	}

	#[test]
	fn api_failures_split_retryable_and_terminal() {
		let meta = ResponseMetadata {
			status: Some(429),
			retry_after: Some(Duration::seconds(5)),
			date: None,
		};
		let throttled = map_api_failure("events", Some(&meta), &response(429, serde_json::json!({})));

		assert!(throttled.is_retryable());
		assert_eq!(throttled.retry_after(), Some(Duration::seconds(5)));
		assert!(matches!(
			map_api_failure("events", None, &response(404, serde_json::json!({}))),
			Error::Api { status: 404, .. }
		));
	}
}
