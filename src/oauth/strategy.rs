//! Error classification hooks for token endpoint responses.
//!
//! Implementations decorate outgoing token requests and normalize error mapping without tying
//! grants to any particular HTTP client.

// self
use crate::{_prelude::*, auth::GrantKind};

/// Strategy hook that allows platforms to decorate token requests and classify errors.
///
/// The hooks work on crate-owned data so downstream crates never depend on reqwest-specific
/// structures. `augment_token_request` has a default no-op implementation.
pub trait ErrorStrategy: Send + Sync {
	/// Maps an unsuccessful token endpoint response into the crate taxonomy.
	fn classify_token_error(&self, ctx: &ErrorContext) -> ErrorKind;

	/// Gives platforms a chance to add custom form parameters before dispatching.
	fn augment_token_request(&self, _grant: GrantKind, _form: &mut BTreeMap<String, String>) {}
}

/// Canonical error categories produced by strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
	/// Platform rejected the grant (bad code, refresh token, or assertion).
	InvalidGrant,
	/// Client authentication failed.
	InvalidClient,
	/// Requested scopes exceed what the client or token covers.
	InsufficientScope,
	/// JWT assertion time claims disagree with the server clock.
	ClockSkew,
	/// Failure is temporary and should be retried.
	Transient,
}

/// Context passed to strategies when classifying token errors.
///
/// Only primitive data (status codes, OAuth fields, body preview) is carried so strategies
/// stay decoupled from any HTTP client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorContext {
	/// Grant associated with the failing request; `None` for revocation calls.
	pub grant: Option<GrantKind>,
	/// HTTP status code returned by the platform, when available.
	pub http_status: Option<u16>,
	/// Platform-supplied OAuth `error` field.
	pub oauth_error: Option<String>,
	/// Platform-supplied OAuth `error_description` field.
	pub error_description: Option<String>,
	/// Preview of the response body for non-JSON payloads.
	pub body_preview: Option<String>,
}
impl ErrorContext {
	const BODY_PREVIEW_LIMIT: usize = 256;

	/// Creates a new context scoped to the provided grant.
	pub fn new(grant: Option<GrantKind>) -> Self {
		Self {
			grant,
			http_status: None,
			oauth_error: None,
			error_description: None,
			body_preview: None,
		}
	}

	/// Adds an HTTP status code (e.g., 400, 401, 500).
	pub fn with_http_status(mut self, status: u16) -> Self {
		self.http_status = Some(status);

		self
	}

	/// Adds the OAuth error code string returned by the platform.
	pub fn with_oauth_error(mut self, error: impl Into<String>) -> Self {
		self.oauth_error = Some(error.into());

		self
	}

	/// Adds the OAuth `error_description` field.
	pub fn with_error_description(mut self, description: impl Into<String>) -> Self {
		self.error_description = Some(description.into());

		self
	}

	/// Adds a body preview for responses that are not OAuth error documents.
	pub fn with_body_preview(mut self, body: impl Into<String>) -> Self {
		self.body_preview = Some(truncate_preview(body.into()));

		self
	}

	/// Human-readable summary used in error messages.
	pub fn summary(&self) -> String {
		match (&self.oauth_error, &self.error_description) {
			(Some(error), Some(description)) => format!("{error}: {description}"),
			(Some(error), None) => error.clone(),
			(None, Some(description)) => description.clone(),
			(None, None) => self
				.body_preview
				.clone()
				.filter(|preview| !preview.is_empty())
				.unwrap_or_else(|| match self.http_status {
					Some(status) => format!("HTTP {status}"),
					None => "unknown failure".into(),
				}),
		}
	}
}

/// Default strategy that applies RFC-guided heuristics.
///
/// Structured OAuth fields win, then body text hints, and finally the HTTP status code. A
/// rejected JWT bearer assertion whose description blames the `exp` claim is reported as clock
/// skew so the caller can re-sign with a corrected clock.
#[derive(Debug, Default)]
pub struct DefaultErrorStrategy;
impl Display for DefaultErrorStrategy {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("default-error-strategy")
	}
}
impl ErrorStrategy for DefaultErrorStrategy {
	fn classify_token_error(&self, ctx: &ErrorContext) -> ErrorKind {
		let kind = classify_oauth_error(ctx.oauth_error.as_deref(), ctx.error_description.as_deref())
			.or_else(|| classify_body(ctx.body_preview.as_deref()))
			.unwrap_or_else(|| classify_status(ctx.http_status));

		if kind == ErrorKind::InvalidGrant
			&& ctx.grant == Some(GrantKind::JwtBearer)
			&& ctx.http_status.is_none_or(|status| status == 400)
			&& mentions_exp_claim(ctx.error_description.as_deref())
		{
			return ErrorKind::ClockSkew;
		}

		kind
	}
}

fn truncate_preview(body: String) -> String {
	if body.chars().count() <= ErrorContext::BODY_PREVIEW_LIMIT {
		return body;
	}

	let mut buf = String::new();

	for (idx, ch) in body.chars().enumerate() {
		if idx >= ErrorContext::BODY_PREVIEW_LIMIT {
			buf.push('…');

			break;
		}
		buf.push(ch);
	}

	buf
}

fn mentions_exp_claim(description: Option<&str>) -> bool {
	description.is_some_and(|text| {
		text.to_ascii_lowercase()
			.split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
			.any(|word| word == "exp")
	})
}

fn classify_oauth_error(
	oauth_error: Option<&str>,
	error_description: Option<&str>,
) -> Option<ErrorKind> {
	oauth_error
		.and_then(match_exact_value)
		.or_else(|| error_description.and_then(match_exact_value))
		.or_else(|| classify_body(error_description))
}

fn match_exact_value(value: &str) -> Option<ErrorKind> {
	if value.eq_ignore_ascii_case("invalid_grant") || value.eq_ignore_ascii_case("access_denied") {
		Some(ErrorKind::InvalidGrant)
	} else if value.eq_ignore_ascii_case("invalid_client")
		|| value.eq_ignore_ascii_case("unauthorized_client")
	{
		Some(ErrorKind::InvalidClient)
	} else if value.eq_ignore_ascii_case("invalid_scope")
		|| value.eq_ignore_ascii_case("insufficient_scope")
	{
		Some(ErrorKind::InsufficientScope)
	} else if value.eq_ignore_ascii_case("temporarily_unavailable")
		|| value.eq_ignore_ascii_case("server_error")
	{
		Some(ErrorKind::Transient)
	} else {
		None
	}
}

fn classify_body(body: Option<&str>) -> Option<ErrorKind> {
	let lowered = body?.to_ascii_lowercase();

	match lowered.as_str() {
		text if text.contains("invalid_grant") => Some(ErrorKind::InvalidGrant),
		text if text.contains("invalid_client") => Some(ErrorKind::InvalidClient),
		text if text.contains("insufficient_scope") || text.contains("invalid_scope") =>
			Some(ErrorKind::InsufficientScope),
		text if text.contains("temporarily_unavailable") || text.contains("retry") =>
			Some(ErrorKind::Transient),
		_ => None,
	}
}

fn classify_status(status: Option<u16>) -> ErrorKind {
	match status {
		Some(400 | 404 | 410) => ErrorKind::InvalidGrant,
		Some(401) => ErrorKind::InvalidClient,
		Some(403) => ErrorKind::InsufficientScope,
		_ => ErrorKind::Transient,
	}
}
