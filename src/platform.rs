//! Shared platform handle: configuration, transport, error strategy, and clock.

// crates.io
use oauth2::{AsyncHttpClient, HttpRequest, HttpResponse};
// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, Token},
	clock::{Clock, SystemClock},
	config::PlatformConfig,
	error::ConfigError,
	grant::Grant,
	http::{PlatformHttpClient, ResponseMetadata, ResponseMetadataSlot},
	oauth::{
		self, DefaultErrorStrategy, ErrorStrategy, REVOKE_ENDPOINT, TOKEN_ENDPOINT,
		TransportErrorMapper,
	},
};
#[cfg(feature = "reqwest")]
use crate::{http::ReqwestHttpClient, oauth::ReqwestTransportErrorMapper};

/// Platform specialized for the crate's default reqwest transport stack.
#[cfg(feature = "reqwest")]
pub type ReqwestPlatform = Platform<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Everything sessions and streams need to talk to the platform.
///
/// A platform is constructed once and shared behind [`Arc`]; it holds no token state of its
/// own, so any number of sessions can reuse the same transport.
pub struct Platform<C, M>
where
	C: ?Sized + PlatformHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Validated configuration.
	pub config: PlatformConfig,
	/// HTTP client wrapper used for every outbound request.
	pub http_client: Arc<C>,
	/// Mapper applied to transport-layer errors before surfacing them to callers.
	pub transport_mapper: Arc<M>,
	/// Strategy responsible for token request adjustments and error classification.
	pub strategy: Arc<dyn ErrorStrategy>,
	/// Time source for expiry checks, assertion timestamps, and default stream bounds.
	pub clock: Arc<dyn Clock>,
}
impl<C, M> Platform<C, M>
where
	C: ?Sized + PlatformHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a platform that reuses the caller-provided transport + mapper pair.
	pub fn with_http_client(
		config: PlatformConfig,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Self {
		Self {
			config,
			http_client: http_client.into(),
			transport_mapper: mapper.into(),
			strategy: Arc::new(DefaultErrorStrategy),
			clock: Arc::new(SystemClock),
		}
	}

	/// Replaces the error strategy.
	pub fn with_strategy(mut self, strategy: Arc<dyn ErrorStrategy>) -> Self {
		self.strategy = strategy;

		self
	}

	/// Replaces the clock.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}

	/// Current instant according to the injected clock.
	pub fn now(&self) -> OffsetDateTime {
		self.clock.now()
	}

	/// Dispatches a request through the transport, returning the raw response regardless of
	/// its status together with any captured metadata.
	pub async fn execute(
		&self,
		endpoint: &'static str,
		request: HttpRequest,
	) -> Result<(HttpResponse, Option<ResponseMetadata>)> {
		let slot = ResponseMetadataSlot::default();
		let handle = self.http_client.with_metadata(slot.clone());
		let outcome = handle.call(request).await;
		let meta = slot.take();

		match outcome {
			Ok(response) => Ok((response, meta)),
			Err(e) => Err(self.transport_mapper.map_transport_error(
				self.strategy.as_ref(),
				endpoint,
				meta.as_ref(),
				e,
			)),
		}
	}

	/// Performs one token endpoint exchange for `grant`.
	///
	/// No retries happen here; callers layer their own policy on top.
	pub async fn exchange(&self, grant: &Grant, scopes: &ScopeSet) -> Result<Token> {
		let kind = grant.kind();
		let mut form = grant.form(&self.config.quirks, scopes);

		self.strategy.augment_token_request(kind, &mut form);

		let request = oauth::token_request(&self.config, form)?;
		let issued_at = self.now();
		let (response, meta) = self.execute(TOKEN_ENDPOINT, request).await?;

		if !response.status().is_success() {
			return Err(oauth::map_token_failure(
				self.strategy.as_ref(),
				Some(kind),
				meta.as_ref(),
				&response,
			));
		}

		oauth::parse_token_response(kind, scopes, &response, issued_at)
	}

	/// Revokes `token` at the configured revocation endpoint.
	pub async fn revoke(&self, token: &str) -> Result<()> {
		let url = self.config.endpoints.revocation.as_ref().ok_or(ConfigError::Unsupported {
			operation: "revoke",
			reason: "no revocation endpoint is configured",
		})?;
		let request = oauth::revocation_request(&self.config, url, token)?;
		let (response, meta) = self.execute(REVOKE_ENDPOINT, request).await?;

		if response.status().is_success() {
			Ok(())
		} else {
			Err(oauth::map_token_failure(self.strategy.as_ref(), None, meta.as_ref(), &response))
		}
	}
}
#[cfg(feature = "reqwest")]
impl Platform<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a platform backed by a default reqwest client.
	pub fn new(config: PlatformConfig) -> Self {
		Self::with_http_client(config, ReqwestHttpClient::default(), ReqwestTransportErrorMapper)
	}
}
impl<C, M> Debug for Platform<C, M>
where
	C: ?Sized + PlatformHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Platform")
			.field("client_id", &self.config.client_id)
			.field("client_secret_set", &self.config.client_secret.is_some())
			.field("endpoints", &self.config.endpoints)
			.finish()
	}
}
