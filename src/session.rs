//! Session façade: the handle resource clients and event streams use to obtain bearer tokens.
//!
//! Every variant wraps a private [`TokenManager`]; they differ only in the [`Credential`] that
//! backs it. Cloning a session (or switching its impersonation target) shares the manager, so
//! all clones coalesce their refreshes.

pub mod authorize;

pub use authorize::AuthorizationRequest;

// crates.io
use oauth2::{
	HttpRequest, HttpResponse,
	http::{HeaderName, HeaderValue, Request, StatusCode, header::AUTHORIZATION},
};
// self
use crate::{
	_prelude::*,
	auth::{GrantKind, ScopeSet, Subject, Token, UserId},
	error::ConfigError,
	grant::{ExchangeOptions, Grant, JwtSigner},
	http::PlatformHttpClient,
	manager::{self, Credential, TokenManager},
	oauth::{self, TransportErrorMapper},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	platform::Platform,
	store::TokenStore,
};

/// Authenticated handle for one credential set.
pub struct Session<C, M>
where
	C: ?Sized + PlatformHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	manager: Arc<TokenManager<C, M>>,
	as_user: Option<UserId>,
}
impl<C, M> Session<C, M>
where
	C: ?Sized + PlatformHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Wraps a fully configured manager.
	pub fn from_manager(manager: TokenManager<C, M>) -> Self {
		Self { manager: Arc::new(manager), as_user: None }
	}

	/// Client-credentials session without a subject.
	pub fn anonymous(platform: Arc<Platform<C, M>>) -> Self {
		Self::from_manager(TokenManager::new(platform, Credential::ClientCredentials {
			subject: None,
		}))
	}

	/// Client-credentials session acting as an enterprise or user.
	pub fn client_credentials(platform: Arc<Platform<C, M>>, subject: Subject) -> Self {
		Self::from_manager(TokenManager::new(platform, Credential::ClientCredentials {
			subject: Some(subject),
		}))
	}

	/// App-auth session signing JWT assertions with the configured key.
	pub fn app_auth(platform: Arc<Platform<C, M>>, subject: Subject) -> Result<Self> {
		let signer = JwtSigner::from_config(&platform.config)?;

		Ok(Self::from_manager(TokenManager::new(platform, Credential::AppAuth { subject, signer })))
	}

	/// Session over a caller-supplied access token that is never refreshed.
	pub fn basic(platform: Arc<Platform<C, M>>, access_token: impl Into<String>) -> Result<Self> {
		let token = Token::builder(GrantKind::Provided)
			.access_token(access_token)
			.issued_at(platform.now())
			.never_expires()
			.build()
			.map_err(ConfigError::from)?;

		Ok(Self::from_manager(TokenManager::new(platform, Credential::Provided).with_token(token)))
	}

	/// Refreshable session seeded with `token` and optionally backed by `store`.
	///
	/// Without a seed token the session loads the stored one on first use.
	pub fn persistent(
		platform: Arc<Platform<C, M>>,
		token: Option<Token>,
		store: Option<Arc<dyn TokenStore>>,
	) -> Self {
		let mut manager = TokenManager::new(platform, Credential::RefreshToken);

		if let Some(token) = token {
			manager = manager.with_token(token);
		}
		if let Some(store) = store {
			manager = manager.with_store(store);
		}

		Self::from_manager(manager)
	}

	/// Underlying token manager.
	pub fn manager(&self) -> &TokenManager<C, M> {
		&self.manager
	}

	/// Shared platform handle.
	pub fn platform(&self) -> &Arc<Platform<C, M>> {
		self.manager.platform()
	}

	/// Returns a currently valid token.
	pub async fn token(&self) -> Result<Token> {
		self.manager.token().await
	}

	/// Forces a refresh.
	pub async fn refresh(&self) -> Result<Token> {
		self.manager.refresh().await
	}

	/// Invalidates the session's token.
	pub async fn revoke(&self) -> Result<()> {
		self.manager.revoke().await
	}

	/// Seeds and persists a token obtained out of band.
	pub async fn set_token(&self, token: Token) -> Result<()> {
		self.manager.set_token(token).await
	}

	/// Returns a session that acts on behalf of `user`.
	pub fn as_user(&self, user: UserId) -> Self {
		Self { manager: Arc::clone(&self.manager), as_user: Some(user) }
	}

	/// Returns a session that acts as itself again.
	pub fn as_self(&self) -> Self {
		Self { manager: Arc::clone(&self.manager), as_user: None }
	}

	/// User this session impersonates, if any.
	pub fn impersonating(&self) -> Option<&UserId> {
		self.as_user.as_ref()
	}

	/// Exchanges the session token for a narrower one.
	///
	/// The result is independent of the session: it is neither cached nor persisted, and the
	/// session keeps its own token.
	pub async fn exchange_token(
		&self,
		scopes: ScopeSet,
		resource: Option<Url>,
		options: ExchangeOptions,
	) -> Result<Token> {
		let span = FlowSpan::new(FlowKind::Exchange, "session");

		obs::record_flow_outcome(FlowKind::Exchange, FlowOutcome::Attempt);

		let outcome = span
			.instrument(async {
				let parent = self.token().await?;
				let grant =
					&Grant::TokenExchange { subject_token: parent.access_token, resource, options };
				let scopes = &scopes;
				let platform = self.platform();

				manager::with_retry(&platform.config.retry_policy, FlowKind::Exchange, move || {
					platform.exchange(grant, scopes)
				})
				.await
			})
			.await;

		obs::record_flow_result(FlowKind::Exchange, &outcome);

		outcome
	}

	/// Attaches the bearer token and impersonation header to `request`.
	pub async fn authorize(&self, request: &mut HttpRequest) -> Result<()> {
		let token = self.token().await?;

		self.apply(&token, request)
	}

	/// Authorizes and dispatches `request`, returning successful responses verbatim.
	///
	/// A `401` triggers one forced refresh and a single replay; other failures are classified
	/// into the crate taxonomy.
	pub async fn send(&self, endpoint: &'static str, request: HttpRequest) -> Result<HttpResponse> {
		let platform = self.platform();
		let mut first = clone_request(&request)?;
		let token = self.token().await?;

		self.apply(&token, &mut first)?;

		let (mut response, mut meta) = platform.execute(endpoint, first).await?;

		if response.status() == StatusCode::UNAUTHORIZED && self.manager.credential().is_refreshable() {
			let token = self.refresh().await?;
			let mut replay = request;

			self.apply(&token, &mut replay)?;

			(response, meta) = platform.execute(endpoint, replay).await?;
		}
		if response.status().is_success() {
			Ok(response)
		} else {
			Err(oauth::map_api_failure(endpoint, meta.as_ref(), &response))
		}
	}

	fn apply(&self, token: &Token, request: &mut HttpRequest) -> Result<()> {
		let headers = request.headers_mut();

		headers.insert(
			AUTHORIZATION,
			header_value(AUTHORIZATION.as_str(), &token.authorization_header())?,
		);

		let quirks = &self.platform().config.quirks;
		let name = HeaderName::try_from(quirks.impersonation_header.as_str())
			.map_err(|_| ConfigError::InvalidHeader { name: quirks.impersonation_header.clone() })?;

		match self.as_user.as_ref() {
			Some(user) => {
				headers.insert(name, header_value(&quirks.impersonation_header, user.as_ref())?);
			},
			None => {
				headers.remove(name);
			},
		}

		Ok(())
	}
}
impl<C, M> Clone for Session<C, M>
where
	C: ?Sized + PlatformHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn clone(&self) -> Self {
		Self { manager: Arc::clone(&self.manager), as_user: self.as_user.clone() }
	}
}
impl<C, M> Debug for Session<C, M>
where
	C: ?Sized + PlatformHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Session")
			.field("manager", &self.manager)
			.field("as_user", &self.as_user)
			.finish()
	}
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue> {
	HeaderValue::from_str(value).map_err(|_| ConfigError::InvalidHeader { name: name.into() }.into())
}

fn clone_request(request: &HttpRequest) -> Result<HttpRequest> {
	let mut builder = Request::builder()
		.method(request.method().clone())
		.uri(request.uri().clone())
		.version(request.version());

	if let Some(headers) = builder.headers_mut() {
		headers.extend(request.headers().iter().map(|(name, value)| (name.clone(), value.clone())));
	}

	builder.body(request.body().clone()).map_err(|e| ConfigError::from(e).into())
}
