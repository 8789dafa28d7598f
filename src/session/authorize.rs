//! Authorization code helpers that bootstrap persistent sessions.

// crates.io
use rand::{Rng, distr::Alphanumeric};
// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, Token, TokenSecret},
	error::ConfigError,
	grant::Grant,
	http::PlatformHttpClient,
	oauth::TransportErrorMapper,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	platform::Platform,
};

const STATE_LEN: usize = 32;

/// Authorization URL plus the `state` value that must round-trip through the redirect.
#[derive(Clone, Debug)]
pub struct AuthorizationRequest {
	/// URL the end user should visit.
	pub url: Url,
	/// Opaque anti-forgery value embedded in `url`.
	pub state: String,
	/// Redirect URI embedded in `url`, if any.
	pub redirect_uri: Option<Url>,
}
impl AuthorizationRequest {
	/// Validates the `state` parameter returned on the redirect.
	pub fn validate_state(&self, returned_state: &str) -> Result<()> {
		if returned_state == self.state {
			Ok(())
		} else {
			Err(Error::InvalidGrant { reason: "Authorization state mismatch".into() })
		}
	}
}

impl<C, M> Platform<C, M>
where
	C: ?Sized + PlatformHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Builds the URL that starts the authorization code flow.
	pub fn authorize_url(
		&self,
		redirect_uri: Option<Url>,
		scopes: &ScopeSet,
	) -> Result<AuthorizationRequest> {
		let mut url = self.config.endpoints.authorization.clone().ok_or(ConfigError::Unsupported {
			operation: "authorization code flow",
			reason: "no authorization endpoint is configured",
		})?;
		let state: String =
			rand::rng().sample_iter(Alphanumeric).take(STATE_LEN).map(char::from).collect();
		let mut pairs = url.query_pairs_mut();

		pairs.append_pair("response_type", "code");
		pairs.append_pair("client_id", &self.config.client_id);

		if let Some(redirect) = redirect_uri.as_ref() {
			pairs.append_pair("redirect_uri", redirect.as_str());
		}
		if let Some(scope) = scopes.join(self.config.quirks.scope_delimiter) {
			pairs.append_pair("scope", &scope);
		}

		pairs.append_pair("state", &state);

		drop(pairs);

		Ok(AuthorizationRequest { url, state, redirect_uri })
	}

	/// Exchanges the code returned on the redirect for a token pair.
	///
	/// The token is returned as-is; seed a persistent session with it.
	pub async fn exchange_authorization_code(
		&self,
		code: impl Into<String>,
		redirect_uri: Option<Url>,
	) -> Result<Token> {
		let span = FlowSpan::new(FlowKind::Acquire, "authorization_code");
		let grant = Grant::AuthorizationCode { code: TokenSecret::new(code), redirect_uri };

		obs::record_flow_outcome(FlowKind::Acquire, FlowOutcome::Attempt);

		let outcome = span.instrument(self.exchange(&grant, &ScopeSet::default())).await;

		obs::record_flow_result(FlowKind::Acquire, &outcome);

		outcome
	}
}
