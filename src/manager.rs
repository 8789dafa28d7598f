//! Token lifecycle: acquisition, caching, proactive refresh, and single-flight coordination.
//!
//! A [`TokenManager`] owns exactly one cached [`Token`]. Callers that find it fresh get a clone
//! without touching the network. Otherwise the first caller becomes the leader of a refresh and
//! every concurrent caller waits for the leader's outcome, so at most one token endpoint
//! exchange is outstanding per manager and all waiters observe the same token or the same
//! failure.

pub mod metrics;

mod flight;
mod retry;

pub use metrics::TokenMetrics;

pub(crate) use retry::{sleep, with_retry};

// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, Subject, Token},
	error::ConfigError,
	grant::{Grant, JwtSigner},
	http::PlatformHttpClient,
	manager::flight::{Flight, FlightGuard, ManagerState, Role},
	oauth::TransportErrorMapper,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	platform::Platform,
	store::TokenStore,
};

/// Long-lived secret material a manager uses to obtain new tokens.
#[derive(Clone, Debug)]
pub enum Credential {
	/// Client credentials grant, optionally bound to an enterprise or user.
	ClientCredentials {
		/// Subject the client authenticates as; `None` for anonymous sessions.
		subject: Option<Subject>,
	},
	/// JWT bearer assertions signed with the configured app-auth key.
	AppAuth {
		/// Enterprise or user the assertion is issued for.
		subject: Subject,
		/// Assertion signer.
		signer: JwtSigner,
	},
	/// Refresh token rotation; the refresh token lives on the cached or stored token.
	RefreshToken,
	/// Caller-provided token that can never be refreshed.
	Provided,
}
impl Credential {
	/// Returns `true` when new tokens can be obtained without caller input.
	pub fn is_self_renewing(&self) -> bool {
		matches!(self, Self::ClientCredentials { .. } | Self::AppAuth { .. })
	}

	/// Returns `true` unless the credential is a caller-provided token.
	pub fn is_refreshable(&self) -> bool {
		!matches!(self, Self::Provided)
	}
}

/// Single-flight token cache for one credential set.
pub struct TokenManager<C, M>
where
	C: ?Sized + PlatformHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	platform: Arc<Platform<C, M>>,
	credential: Credential,
	scopes: ScopeSet,
	store: Option<Arc<dyn TokenStore>>,
	state: Mutex<ManagerState>,
	store_lock: AsyncMutex<()>,
	metrics: Arc<TokenMetrics>,
	clock_offset: Mutex<Duration>,
}
impl<C, M> TokenManager<C, M>
where
	C: ?Sized + PlatformHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a manager with an empty cache.
	pub fn new(platform: Arc<Platform<C, M>>, credential: Credential) -> Self {
		Self {
			platform,
			credential,
			scopes: ScopeSet::default(),
			store: None,
			state: Mutex::new(ManagerState::default()),
			store_lock: AsyncMutex::new(()),
			metrics: Default::default(),
			clock_offset: Mutex::new(Duration::ZERO),
		}
	}

	/// Requests `scopes` on every exchange.
	pub fn with_scopes(mut self, scopes: ScopeSet) -> Self {
		self.scopes = scopes;

		self
	}

	/// Persists every new token to `store` and consults it before refreshing.
	pub fn with_store(mut self, store: Arc<dyn TokenStore>) -> Self {
		self.store = Some(store);

		self
	}

	/// Seeds the in-memory cache without persisting.
	pub fn with_token(self, token: Token) -> Self {
		self.state.lock().cached = Some(token);

		self
	}

	/// Shared platform handle.
	pub fn platform(&self) -> &Arc<Platform<C, M>> {
		&self.platform
	}

	/// Credential used for new exchanges.
	pub fn credential(&self) -> &Credential {
		&self.credential
	}

	/// Scopes requested on every exchange.
	pub fn scopes(&self) -> &ScopeSet {
		&self.scopes
	}

	/// Counters describing how callers were served.
	pub fn metrics(&self) -> Arc<TokenMetrics> {
		Arc::clone(&self.metrics)
	}

	/// Returns the cached token regardless of its freshness.
	pub fn cached(&self) -> Option<Token> {
		self.state.lock().cached.clone()
	}

	/// Returns a token that stays valid for at least the configured expiry margin.
	pub async fn token(&self) -> Result<Token> {
		self.obtain(false).await
	}

	/// Replaces the cached token even if it is still fresh.
	///
	/// Joins a refresh that is already in flight instead of starting a second one.
	pub async fn refresh(&self) -> Result<Token> {
		self.obtain(true).await
	}

	/// Seeds and persists `token`, superseding any refresh that is still in flight.
	pub async fn set_token(&self, token: Token) -> Result<()> {
		let _store_guard = self.store_lock.lock().await;

		if let Some(store) = self.store.as_ref() {
			store.write(token.clone()).await?;
		}

		let mut state = self.state.lock();

		state.epoch += 1;
		state.revoked = false;
		state.cached = Some(token);

		Ok(())
	}

	/// Drops the cached token, revokes it at the platform when possible, and clears the store.
	///
	/// Requests already dispatched with the token are not cancelled. A refresh in flight still
	/// answers its waiters but its result is neither cached nor persisted.
	pub async fn revoke(&self) -> Result<()> {
		let span = FlowSpan::new(FlowKind::Revoke, "token_manager");

		obs::record_flow_outcome(FlowKind::Revoke, FlowOutcome::Attempt);

		let outcome = span.instrument(self.revoke_inner()).await;

		obs::record_flow_result(FlowKind::Revoke, &outcome);

		outcome
	}

	async fn revoke_inner(&self) -> Result<()> {
		let cached = {
			let mut state = self.state.lock();

			state.epoch += 1;
			state.revoked = true;

			state.cached.take()
		};
		let _store_guard = self.store_lock.lock().await;
		let token = match (cached, self.store.as_ref()) {
			(Some(token), _) => Some(token),
			(None, Some(store)) => match store.read().await {
				Ok(token) => token,
				Err(e) => {
					if let Err(clear) = store.clear().await {
						obs::warn_stream_error(FlowKind::Revoke, "clear_store", &clear.into());
					}

					return Err(e.into());
				},
			},
			(None, None) => None,
		};
		let remote = match token {
			Some(token)
				if token.acquired_via.supports_revocation()
					&& self.platform.config.endpoints.revocation.is_some() =>
				self.platform.revoke(token.access_token.expose()).await,
			_ => Ok(()),
		};

		if let Some(store) = self.store.as_ref() {
			store.clear().await?;
		}

		remote
	}

	async fn obtain(&self, force: bool) -> Result<Token> {
		loop {
			let (role, previous) = {
				let mut state = self.state.lock();
				let now = self.platform.now();
				let fresh = state
					.cached
					.as_ref()
					.filter(|token| token.is_fresh_at(now, self.platform.config.expiry_margin));

				if let Some(token) = fresh.filter(|_| !force) {
					self.metrics.record_cache_hit();

					return Ok(token.clone());
				}
				if state.revoked && !self.credential.is_self_renewing() {
					return Err(Error::Revoked);
				}

				(state.join_or_lead(), state.cached.clone())
			};

			match role {
				Role::Leader(flight) => return self.lead(flight, previous).await,
				Role::Follower(receiver) => {
					self.metrics.record_coalesced();

					// A closed channel means the leader was cancelled; elect a new one.
					if let Some(outcome) = flight::wait_for_leader(receiver).await {
						return outcome;
					}
				},
			}
		}
	}

	async fn lead(&self, flight: Flight, previous: Option<Token>) -> Result<Token> {
		let mut guard = FlightGuard::new(&self.state, flight);
		let kind = if previous.is_some() { FlowKind::Refresh } else { FlowKind::Acquire };
		let span = FlowSpan::new(kind, "token_manager");

		obs::record_flow_outcome(kind, FlowOutcome::Attempt);

		let outcome = span.instrument(self.acquire(kind, previous)).await;
		let outcome = self.commit(&mut guard, outcome).await;

		if outcome.is_ok() {
			obs::record_flow_outcome(kind, FlowOutcome::Success);
		} else {
			self.metrics.record_failure();
			obs::record_flow_outcome(kind, FlowOutcome::Failure);
		}

		outcome
	}

	/// Persists or clears the store, then updates the cache and wakes followers under one lock.
	async fn commit(&self, guard: &mut FlightGuard<'_>, outcome: Result<Token>) -> Result<Token> {
		let _store_guard = self.store_lock.lock().await;
		let epoch = guard.epoch();
		let current = self.state.lock().epoch == epoch;
		let outcome = match (outcome, self.store.as_ref()) {
			(Ok(token), Some(store)) if current => match store.write(token.clone()).await {
				Ok(()) => Ok(token),
				Err(e) => {
					// Keep the rotated token in memory so this process can continue.
					self.cache_if_current(epoch, &token);

					Err(e.into())
				},
			},
			(Err(e), Some(store)) if current && e.is_auth_failure() => {
				if let Err(clear) = store.clear().await {
					obs::warn_stream_error(FlowKind::Refresh, "clear_store", &clear.into());
				}

				Err(e)
			},
			(outcome, _) => outcome,
		};
		let mut state = self.state.lock();

		if state.epoch == epoch {
			match &outcome {
				Ok(token) => state.cached = Some(token.clone()),
				Err(e) if e.is_auth_failure() => state.cached = None,
				Err(_) => (),
			}
		}
		if let Some(flight) = guard.take() {
			flight.complete(&mut state, outcome.clone());
		}

		outcome
	}

	fn cache_if_current(&self, epoch: u64, token: &Token) {
		let mut state = self.state.lock();

		if state.epoch == epoch {
			state.cached = Some(token.clone());
		}
	}

	async fn acquire(&self, kind: FlowKind, previous: Option<Token>) -> Result<Token> {
		let policy = &self.platform.config.retry_policy;

		match &self.credential {
			Credential::ClientCredentials { subject } => {
				let grant = &Grant::ClientCredentials { subject: subject.clone() };

				with_retry(policy, kind, move || self.exchange(grant)).await
			},
			Credential::AppAuth { subject, signer } => self.acquire_app_auth(kind, subject, signer).await,
			Credential::RefreshToken => self.acquire_refresh(kind, previous).await,
			Credential::Provided => Err(ConfigError::Unsupported {
				operation: "refresh",
				reason: "caller-provided tokens cannot be refreshed",
			}
			.into()),
		}
	}

	/// Signs a fresh assertion for every attempt and retries once on clock skew, shifting the
	/// assertion clock to the server's `Date`.
	async fn acquire_app_auth(
		&self,
		kind: FlowKind,
		subject: &Subject,
		signer: &JwtSigner,
	) -> Result<Token> {
		let policy = &self.platform.config.retry_policy;
		let mut skew_retried = false;

		loop {
			let outcome = with_retry(policy, kind, move || async move {
				let now = self.platform.now() + *self.clock_offset.lock();
				let assertion = signer.sign(subject, now)?;

				self.exchange(&Grant::JwtBearer { assertion }).await
			})
			.await;

			match outcome {
				Err(Error::ClockSkew { server_time, .. }) if !skew_retried => {
					let error = Error::ClockSkew { reason: "retrying with server time".into(), server_time };

					obs::warn_retry(kind, 1, Duration::ZERO, &error);

					if let Some(server_time) = server_time {
						*self.clock_offset.lock() = server_time - self.platform.now();
					}

					skew_retried = true;
				},
				// A second skew rejection means the key or clock is wrong; treat it as terminal.
				Err(Error::ClockSkew { reason, .. }) => return Err(Error::InvalidGrant { reason }),
				outcome => return outcome,
			}
		}
	}

	/// Rotates the refresh token, preferring a fresher token another process stored.
	async fn acquire_refresh(&self, kind: FlowKind, previous: Option<Token>) -> Result<Token> {
		let mut current = previous;

		if let Some(stored) = self.read_store().await? {
			let changed =
				current.as_ref().is_none_or(|token| token.access_token != stored.access_token);

			if changed
				&& stored.is_fresh_at(self.platform.now(), self.platform.config.expiry_margin)
			{
				return Ok(stored);
			}
			if changed {
				current = Some(stored);
			}
		}

		let refresh_token = current
			.and_then(|token| token.refresh_token)
			.ok_or(ConfigError::MissingRefreshToken)?;
		let grant = &Grant::RefreshToken { refresh_token: refresh_token.clone() };
		let policy = &self.platform.config.retry_policy;
		let token = with_retry(policy, kind, move || self.exchange(grant)).await?;

		if token.refresh_token.is_some() {
			Ok(token)
		} else {
			Ok(Token { refresh_token: Some(refresh_token), ..token })
		}
	}

	async fn read_store(&self) -> Result<Option<Token>> {
		match self.store.as_ref() {
			Some(store) => Ok(store.read().await?),
			None => Ok(None),
		}
	}

	async fn exchange(&self, grant: &Grant) -> Result<Token> {
		self.metrics.record_exchange();
		self.platform.exchange(grant, &self.scopes).await
	}
}
impl<C, M> Debug for TokenManager<C, M>
where
	C: ?Sized + PlatformHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let state = self.state.lock();

		f.debug_struct("TokenManager")
			.field("credential", &self.credential)
			.field("scopes", &self.scopes)
			.field("store_set", &self.store.is_some())
			.field("cached", &state.cached)
			.field("revoked", &state.revoked)
			.finish()
	}
}
