//! Immutable token snapshots and their builder.

pub mod kind;
pub mod secret;

// self
use crate::{
	_prelude::*,
	auth::{GrantKind, ScopeSet, TokenSecret},
};

/// Errors produced by [`TokenBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum TokenBuilderError {
	/// Issued when the access token is missing or blank.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// Issued when no expiry (absolute or relative) was configured.
	#[error("Expiry must be supplied via expires_at or expires_in.")]
	MissingExpiry,
	/// Issued when `issued_at + expires_in` does not fit in a timestamp.
	#[error("Expiry is out of the representable range.")]
	ExpiryOutOfRange,
}

/// Immutable snapshot of issued credential material.
///
/// A refresh never mutates a token; it produces a new one that supersedes the old snapshot.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
	/// Access token secret; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Refresh token secret, if the platform issued one.
	pub refresh_token: Option<TokenSecret>,
	/// Token type reported by the platform (normally `bearer`).
	pub token_type: String,
	/// Normalized scopes granted to this token.
	pub scopes: ScopeSet,
	/// Grant that produced this token.
	pub acquired_via: GrantKind,
	/// Issued-at instant.
	pub issued_at: OffsetDateTime,
	/// Expiry instant (issued-at plus the server TTL).
	pub expires_at: OffsetDateTime,
}
impl Token {
	/// Returns a builder tagged with the grant that produced the token.
	pub fn builder(acquired_via: GrantKind) -> TokenBuilder {
		TokenBuilder::new(acquired_via)
	}

	/// Returns `true` when the token stays valid for at least `margin` past `now`.
	pub fn is_fresh_at(&self, now: OffsetDateTime, margin: Duration) -> bool {
		now < self.expires_at - margin
	}

	/// Returns `true` once `now` reached the expiry instant.
	pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
		now >= self.expires_at
	}

	/// Remaining lifetime at `now`, clamped at zero.
	pub fn remaining_at(&self, now: OffsetDateTime) -> Duration {
		(self.expires_at - now).max(Duration::ZERO)
	}

	/// Renders the `Authorization` header value.
	pub fn authorization_header(&self) -> String {
		format!("Bearer {}", self.access_token.expose())
	}
}
impl Debug for Token {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Token")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("token_type", &self.token_type)
			.field("scopes", &self.scopes)
			.field("acquired_via", &self.acquired_via)
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

/// Builder for [`Token`].
#[derive(Clone, Debug)]
pub struct TokenBuilder {
	acquired_via: GrantKind,
	scopes: ScopeSet,
	token_type: Option<String>,
	access_token: Option<TokenSecret>,
	refresh_token: Option<TokenSecret>,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
}
impl TokenBuilder {
	fn new(acquired_via: GrantKind) -> Self {
		Self {
			acquired_via,
			scopes: ScopeSet::default(),
			token_type: None,
			access_token: None,
			refresh_token: None,
			issued_at: None,
			expires_at: None,
			expires_in: None,
		}
	}

	/// Sets the granted scopes.
	pub fn scopes(mut self, scopes: ScopeSet) -> Self {
		self.scopes = scopes;

		self
	}

	/// Sets the token type; defaults to `bearer`.
	pub fn token_type(mut self, token_type: impl Into<String>) -> Self {
		self.token_type = Some(token_type.into());

		self
	}

	/// Sets the issued-at instant.
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Marks the token as never expiring (caller-managed tokens).
	pub fn never_expires(self) -> Self {
		self.expires_at(time::PrimitiveDateTime::MAX.assume_utc())
	}

	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(TokenSecret::new(token));

		self
	}

	/// Provides the refresh token value.
	pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(token));

		self
	}

	/// Provides an optional refresh token secret.
	pub fn maybe_refresh_token(mut self, token: Option<TokenSecret>) -> Self {
		self.refresh_token = token;

		self
	}

	/// Consumes the builder and produces a [`Token`].
	pub fn build(self) -> Result<Token, TokenBuilderError> {
		let access_token = self
			.access_token
			.filter(|secret| !secret.is_blank())
			.ok_or(TokenBuilderError::MissingAccessToken)?;
		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);
		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => instant,
			(None, Some(delta)) =>
				issued_at.checked_add(delta).ok_or(TokenBuilderError::ExpiryOutOfRange)?,
			(None, None) => return Err(TokenBuilderError::MissingExpiry),
		};

		Ok(Token {
			access_token,
			refresh_token: self.refresh_token,
			token_type: self.token_type.unwrap_or_else(|| "bearer".into()),
			scopes: self.scopes,
			acquired_via: self.acquired_via,
			issued_at,
			expires_at,
		})
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn freshness_honors_margin() {
		let issued = macros::datetime!(2025-01-01 00:00 UTC);
		let token = Token::builder(GrantKind::ClientCredentials)
			.access_token("access")
			.issued_at(issued)
			.expires_in(Duration::hours(1))
			.build()
			.expect("Token builder should succeed.");
		let margin = Duration::seconds(60);

		assert_eq!(token.expires_at, macros::datetime!(2025-01-01 01:00 UTC));
		assert!(token.is_fresh_at(issued + Duration::seconds(10), margin));
		assert!(!token.is_fresh_at(issued + Duration::seconds(3540), margin));
		assert!(!token.is_expired_at(issued + Duration::seconds(3540)));
		assert!(token.is_expired_at(issued + Duration::hours(1)));
		assert_eq!(token.remaining_at(issued + Duration::hours(2)), Duration::ZERO);
		assert_eq!(token.token_type, "bearer");
	}

	#[test]
	fn builder_requires_access_token_and_expiry() {
		let missing_access = Token::builder(GrantKind::RefreshToken)
			.expires_in(Duration::minutes(5))
			.build()
			.expect_err("Missing access token must be rejected.");

		assert_eq!(missing_access, TokenBuilderError::MissingAccessToken);

		let blank_access = Token::builder(GrantKind::Provided)
			.access_token(" ")
			.never_expires()
			.build()
			.expect_err("Blank access token must be rejected.");

		assert_eq!(blank_access, TokenBuilderError::MissingAccessToken);

		let missing_expiry = Token::builder(GrantKind::RefreshToken)
			.access_token("access")
			.build()
			.expect_err("Missing expiry must be rejected.");

		assert_eq!(missing_expiry, TokenBuilderError::MissingExpiry);

		let overflow = Token::builder(GrantKind::ClientCredentials)
			.access_token("access")
			.issued_at(macros::datetime!(2025-01-01 00:00 UTC))
			.expires_in(Duration::MAX)
			.build()
			.expect_err("Unrepresentable expiry must be rejected.");

		assert_eq!(overflow, TokenBuilderError::ExpiryOutOfRange);
	}

	#[test]
	fn provided_tokens_never_expire_and_debug_redacts() {
		let token = Token::builder(GrantKind::Provided)
			.access_token("developer-token")
			.refresh_token("refresh-secret")
			.never_expires()
			.build()
			.expect("Provided token should build.");

		assert!(token.is_fresh_at(macros::datetime!(2999-01-01 00:00 UTC), Duration::hours(1)));
		assert_eq!(token.authorization_header(), "Bearer developer-token");

		let rendered = format!("{token:?}");

		assert!(!rendered.contains("developer-token"));
		assert!(!rendered.contains("refresh-secret"));
	}
}
