//! Grant kind tags recorded on every issued token.

// self
use crate::_prelude::*;

/// Grant that produced a [`Token`](crate::auth::Token).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantKind {
	/// Authorization code exchange.
	AuthorizationCode,
	/// Refresh token rotation.
	RefreshToken,
	/// Signed JWT bearer assertion (app auth).
	JwtBearer,
	/// Client credentials, optionally bound to a subject.
	ClientCredentials,
	/// Token exchange (downscoping).
	TokenExchange,
	/// Token supplied by the caller and never refreshed.
	Provided,
}
impl GrantKind {
	/// Returns the `grant_type` form value, or `None` for caller-provided tokens.
	pub fn grant_type(self) -> Option<&'static str> {
		match self {
			Self::AuthorizationCode => Some("authorization_code"),
			Self::RefreshToken => Some("refresh_token"),
			Self::JwtBearer => Some("urn:ietf:params:oauth:grant-type:jwt-bearer"),
			Self::ClientCredentials => Some("client_credentials"),
			Self::TokenExchange => Some("urn:ietf:params:oauth:grant-type:token-exchange"),
			Self::Provided => None,
		}
	}

	/// Stable label used for logging and metrics.
	pub fn as_str(self) -> &'static str {
		match self {
			Self::AuthorizationCode => "authorization_code",
			Self::RefreshToken => "refresh_token",
			Self::JwtBearer => "jwt_bearer",
			Self::ClientCredentials => "client_credentials",
			Self::TokenExchange => "token_exchange",
			Self::Provided => "provided",
		}
	}

	/// Returns `true` when tokens of this kind can be revoked at the platform.
	pub fn supports_revocation(self) -> bool {
		!matches!(self, Self::Provided)
	}
}
impl Display for GrantKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
