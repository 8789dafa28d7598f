//! Grant strategies: pure builders of token endpoint form bodies.
//!
//! A [`Grant`] never touches the network. The [`Platform`](crate::platform::Platform) applies
//! client authentication, dispatches the form, and parses the response.

pub mod jwt;

pub use jwt::*;

// self
use crate::{
	_prelude::*,
	auth::{GrantKind, ScopeSet, Subject, TokenSecret},
	config::PlatformQuirks,
};

/// Token type URN for access tokens used in token exchange.
pub const ACCESS_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:access_token";
/// Token type URN for identity tokens used as actor tokens.
pub const ID_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:id_token";

/// Optional parameters for a downscoping token exchange.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExchangeOptions {
	/// Actor token to embed in the resulting token.
	pub actor_token: Option<TokenSecret>,
	/// Type of `actor_token`; defaults to [`ID_TOKEN_TYPE`].
	pub actor_token_type: Option<String>,
	/// Shared link the resulting token should be restricted to.
	pub shared_link: Option<Url>,
}
impl ExchangeOptions {
	/// Sets the actor token.
	pub fn actor_token(mut self, token: impl Into<String>) -> Self {
		self.actor_token = Some(TokenSecret::new(token));

		self
	}

	/// Sets the actor token type.
	pub fn actor_token_type(mut self, token_type: impl Into<String>) -> Self {
		self.actor_token_type = Some(token_type.into());

		self
	}

	/// Restricts the token to a shared link.
	pub fn shared_link(mut self, url: Url) -> Self {
		self.shared_link = Some(url);

		self
	}
}

/// Exchange recipe for one OAuth2-family grant type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Grant {
	/// Authorization code issued to `redirect_uri`.
	AuthorizationCode {
		/// One-time code returned on the redirect.
		code: TokenSecret,
		/// Redirect URI used in the authorization request, if any.
		redirect_uri: Option<Url>,
	},
	/// Refresh token rotation.
	RefreshToken {
		/// Current refresh token.
		refresh_token: TokenSecret,
	},
	/// Signed JWT bearer assertion.
	JwtBearer {
		/// Compact JWS produced by [`JwtSigner`].
		assertion: TokenSecret,
	},
	/// Client credentials, optionally acting as an enterprise or user.
	ClientCredentials {
		/// Subject the client authenticates as.
		subject: Option<Subject>,
	},
	/// Token exchange producing a downscoped token.
	TokenExchange {
		/// Token being exchanged.
		subject_token: TokenSecret,
		/// Target resource the new token is bound to.
		resource: Option<Url>,
		/// Additional exchange parameters.
		options: ExchangeOptions,
	},
}
impl Grant {
	/// Returns the grant kind tag recorded on resulting tokens.
	pub fn kind(&self) -> GrantKind {
		match self {
			Self::AuthorizationCode { .. } => GrantKind::AuthorizationCode,
			Self::RefreshToken { .. } => GrantKind::RefreshToken,
			Self::JwtBearer { .. } => GrantKind::JwtBearer,
			Self::ClientCredentials { .. } => GrantKind::ClientCredentials,
			Self::TokenExchange { .. } => GrantKind::TokenExchange,
		}
	}

	/// Builds the form body (without client authentication).
	pub fn form(&self, quirks: &PlatformQuirks, scopes: &ScopeSet) -> BTreeMap<String, String> {
		let mut form = BTreeMap::new();

		if let Some(grant_type) = self.kind().grant_type() {
			form.insert("grant_type".into(), grant_type.into());
		}
		if let Some(scope) = scopes.join(quirks.scope_delimiter) {
			form.insert("scope".into(), scope);
		}

		match self {
			Self::AuthorizationCode { code, redirect_uri } => {
				form.insert("code".into(), code.expose().into());

				if let Some(redirect) = redirect_uri {
					form.insert("redirect_uri".into(), redirect.to_string());
				}
			},
			Self::RefreshToken { refresh_token } => {
				form.insert("refresh_token".into(), refresh_token.expose().into());
			},
			Self::JwtBearer { assertion } => {
				form.insert("assertion".into(), assertion.expose().into());
			},
			Self::ClientCredentials { subject } =>
				if let Some(subject) = subject {
					form.insert(quirks.subject_type_param.clone(), subject.kind().into());
					form.insert(quirks.subject_id_param.clone(), subject.id().into());
				},
			Self::TokenExchange { subject_token, resource, options } => {
				form.insert("subject_token".into(), subject_token.expose().into());
				form.insert("subject_token_type".into(), ACCESS_TOKEN_TYPE.into());

				if let Some(resource) = resource {
					form.insert("resource".into(), resource.to_string());
				}
				if let Some(actor) = options.actor_token.as_ref() {
					form.insert("actor_token".into(), actor.expose().into());
					form.insert(
						"actor_token_type".into(),
						options.actor_token_type.clone().unwrap_or_else(|| ID_TOKEN_TYPE.into()),
					);
				}
				if let Some(link) = options.shared_link.as_ref() {
					form.insert("shared_link".into(), link.to_string());
				}
			},
		}

		form
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::auth::{EnterpriseId, UserId};

	fn get<'a>(form: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
		form.get(key).map(String::as_str)
	}

	#[test]
	fn client_credentials_carry_configurable_subject_params() {
		let quirks = PlatformQuirks {
			subject_type_param: "acct_subject_type".into(),
			subject_id_param: "acct_subject_id".into(),
			..Default::default()
		};
		let grant = Grant::ClientCredentials {
			subject: Some(Subject::Enterprise(
				EnterpriseId::new("9001").expect("Enterprise fixture should be valid."),
			)),
		};
		let form = grant.form(&quirks, &ScopeSet::default());

		assert_eq!(get(&form, "grant_type"), Some("client_credentials"));
		assert_eq!(get(&form, "acct_subject_type"), Some("enterprise"));
		assert_eq!(get(&form, "acct_subject_id"), Some("9001"));
		assert!(!form.contains_key("scope"));

		let anonymous = Grant::ClientCredentials { subject: None }.form(&quirks, &ScopeSet::default());

		assert_eq!(anonymous.len(), 1);
	}

	#[test]
	fn token_exchange_includes_scopes_and_options() {
		let scopes = ScopeSet::new(["item_preview", "item_download"]).expect("Scopes are valid.");
		let grant = Grant::TokenExchange {
			subject_token: TokenSecret::new("parent"),
			resource: Some(Url::parse("https://api.platform.test/2.0/files/123").expect("URL.")),
			options: ExchangeOptions::default()
				.actor_token("actor")
				.shared_link(Url::parse("https://share.platform.test/s/abc").expect("URL.")),
		};
		let form = grant.form(&PlatformQuirks::default(), &scopes);

		assert_eq!(get(&form, "grant_type"), Some("urn:ietf:params:oauth:grant-type:token-exchange"));
		assert_eq!(get(&form, "subject_token"), Some("parent"));
		assert_eq!(get(&form, "subject_token_type"), Some(ACCESS_TOKEN_TYPE));
		assert_eq!(get(&form, "scope"), Some("item_download item_preview"));
		assert_eq!(get(&form, "resource"), Some("https://api.platform.test/2.0/files/123"));
		assert_eq!(get(&form, "actor_token_type"), Some(ID_TOKEN_TYPE));
		assert_eq!(get(&form, "shared_link"), Some("https://share.platform.test/s/abc"));
	}

	#[test]
	fn code_refresh_and_assertion_grants_build_minimal_forms() {
		let quirks = PlatformQuirks::default();
		let code = Grant::AuthorizationCode {
			code: TokenSecret::new("c0de"),
			redirect_uri: Some(Url::parse("http://localhost:8080/cb").expect("URL.")),
		}
		.form(&quirks, &ScopeSet::default());

		assert_eq!(get(&code, "code"), Some("c0de"));
		assert_eq!(get(&code, "redirect_uri"), Some("http://localhost:8080/cb"));

		let refresh = Grant::RefreshToken { refresh_token: TokenSecret::new("rt") }
			.form(&quirks, &ScopeSet::default());

		assert_eq!(get(&refresh, "refresh_token"), Some("rt"));

		let jwt = Grant::JwtBearer { assertion: TokenSecret::new("a.b.c") };

		assert_eq!(jwt.kind(), GrantKind::JwtBearer);
		assert_eq!(get(&jwt.form(&quirks, &ScopeSet::default()), "assertion"), Some("a.b.c"));

		let user = Grant::ClientCredentials {
			subject: Some(Subject::User(UserId::new("77").expect("User fixture should be valid."))),
		}
		.form(&quirks, &ScopeSet::default());

		assert_eq!(get(&user, "subject_type"), Some("user"));
	}
}
