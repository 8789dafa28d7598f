//! Storage contracts and built-in single-slot stores for tokens and enterprise stream state.
//!
//! Both contracts only need single-key atomic read/write (and clear for tokens). `read` returns
//! `Ok(None)` when nothing is stored and `Err` when the backend failed, so callers can tell the
//! two apart. `write` and `clear` are idempotent.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{_prelude::*, auth::Token, events::StreamState};

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Durable persistence of one session's [`Token`].
pub trait TokenStore
where
	Self: Send + Sync,
{
	/// Loads the persisted token, if any.
	fn read(&self) -> StoreFuture<'_, Option<Token>>;

	/// Persists or replaces the token.
	fn write(&self, token: Token) -> StoreFuture<'_, ()>;

	/// Removes the persisted token.
	fn clear(&self) -> StoreFuture<'_, ()>;
}

/// Sink for enterprise event stream positions.
pub trait StreamStateStore
where
	Self: Send + Sync,
{
	/// Loads the persisted stream state, if any.
	fn read(&self) -> StoreFuture<'_, Option<StreamState>>;

	/// Persists or replaces the stream state.
	fn write(&self, state: StreamState) -> StoreFuture<'_, ()>;
}

/// Error type produced by store implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
