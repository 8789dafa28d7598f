//! Thread-safe in-memory store for local development and tests.

// self
use crate::{
	_prelude::*,
	auth::Token,
	events::StreamState,
	store::{StoreFuture, StreamStateStore, TokenStore},
};

/// Single-slot store that keeps its value in-process.
///
/// Clones share the same slot.
#[derive(Clone, Debug)]
pub struct MemoryStore<T>(Arc<RwLock<Option<T>>>);
impl<T> MemoryStore<T>
where
	T: Clone,
{
	/// Creates a store pre-seeded with `value`.
	pub fn with_value(value: T) -> Self {
		Self(Arc::new(RwLock::new(Some(value))))
	}

	/// Returns a copy of the stored value.
	pub fn get(&self) -> Option<T> {
		self.0.read().clone()
	}

	/// Replaces the stored value.
	pub fn set(&self, value: T) {
		*self.0.write() = Some(value);
	}

	/// Removes and returns the stored value.
	pub fn take(&self) -> Option<T> {
		self.0.write().take()
	}
}
impl<T> Default for MemoryStore<T> {
	fn default() -> Self {
		Self(Arc::new(RwLock::new(None)))
	}
}
impl TokenStore for MemoryStore<Token> {
	fn read(&self) -> StoreFuture<'_, Option<Token>> {
		Box::pin(async move { Ok(self.get()) })
	}

	fn write(&self, token: Token) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			self.set(token);

			Ok(())
		})
	}

	fn clear(&self) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			self.take();

			Ok(())
		})
	}
}
impl StreamStateStore for MemoryStore<StreamState> {
	fn read(&self) -> StoreFuture<'_, Option<StreamState>> {
		Box::pin(async move { Ok(self.get()) })
	}

	fn write(&self, state: StreamState) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			self.set(state);

			Ok(())
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::auth::GrantKind;

	#[tokio::test]
	async fn token_slot_reads_writes_and_clears() {
		let store = MemoryStore::<Token>::default();

		assert!(TokenStore::read(&store).await.expect("Read should succeed.").is_none());

		let token = Token::builder(GrantKind::RefreshToken)
			.access_token("at")
			.refresh_token("rt")
			.expires_in(Duration::hours(1))
			.build()
			.expect("Token fixture should build.");

		TokenStore::write(&store, token.clone()).await.expect("Write should succeed.");

		let handle = store.clone();

		assert_eq!(handle.get(), Some(token));

		store.clear().await.expect("Clear should succeed.");
		store.clear().await.expect("Clear is idempotent.");

		assert!(handle.get().is_none());
	}
}
