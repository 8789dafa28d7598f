//! File-backed store for lightweight deployments and bots.

// std
use std::{
	fs::{self, File},
	io::{ErrorKind, Write},
	path::{Path, PathBuf},
};
// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::Token,
	events::StreamState,
	store::{StoreError, StoreFuture, StreamStateStore, TokenStore},
};

/// Persists one JSON document per file, rewriting it atomically after each mutation.
///
/// The value is cached in memory, so reads never touch the disk after [`FileStore::open`].
#[derive(Clone, Debug)]
pub struct FileStore<T> {
	path: PathBuf,
	inner: Arc<RwLock<Option<T>>>,
}
impl<T> FileStore<T>
where
	T: Clone + Serialize + DeserializeOwned,
{
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		ensure_parent_exists(&path)?;

		let snapshot = load_snapshot(&path)?;

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)) })
	}

	/// Location of the backing file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn load(&self) -> Option<T> {
		self.inner.read().clone()
	}

	fn store(&self, value: T) -> Result<(), StoreError> {
		let mut guard = self.inner.write();

		persist(&self.path, &value)?;
		*guard = Some(value);

		Ok(())
	}

	fn remove(&self) -> Result<(), StoreError> {
		let mut guard = self.inner.write();

		match fs::remove_file(&self.path) {
			Ok(()) => {},
			Err(e) if e.kind() == ErrorKind::NotFound => {},
			Err(e) =>
				return Err(StoreError::Backend {
					message: format!("Failed to remove {}: {e}", self.path.display()),
				}),
		}

		*guard = None;

		Ok(())
	}
}
impl TokenStore for FileStore<Token> {
	fn read(&self) -> StoreFuture<'_, Option<Token>> {
		Box::pin(async move { Ok(self.load()) })
	}

	fn write(&self, token: Token) -> StoreFuture<'_, ()> {
		Box::pin(async move { self.store(token) })
	}

	fn clear(&self) -> StoreFuture<'_, ()> {
		Box::pin(async move { self.remove() })
	}
}
impl StreamStateStore for FileStore<StreamState> {
	fn read(&self) -> StoreFuture<'_, Option<StreamState>> {
		Box::pin(async move { Ok(self.load()) })
	}

	fn write(&self, state: StreamState) -> StoreFuture<'_, ()> {
		Box::pin(async move { self.store(state) })
	}
}

fn load_snapshot<T>(path: &Path) -> Result<Option<T>, StoreError>
where
	T: DeserializeOwned,
{
	let bytes = match fs::read(path) {
		Ok(bytes) => bytes,
		Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
		Err(e) =>
			return Err(StoreError::Backend {
				message: format!("Failed to read {}: {e}", path.display()),
			}),
	};

	if bytes.is_empty() {
		return Ok(None);
	}

	serde_json::from_slice(&bytes).map(Some).map_err(|e| StoreError::Serialization {
		message: format!("Failed to parse {}: {e}", path.display()),
	})
}

fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
	if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
		fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
			message: format!("Failed to create store directory {}: {e}", parent.display()),
		})?;
	}

	Ok(())
}

fn persist<T>(path: &Path, value: &T) -> Result<(), StoreError>
where
	T: Serialize,
{
	ensure_parent_exists(path)?;

	let serialized = serde_json::to_vec_pretty(value).map_err(|e| StoreError::Serialization {
		message: format!("Failed to serialize store snapshot: {e}"),
	})?;
	let mut tmp_path = path.to_path_buf();

	tmp_path.set_extension("tmp");

	{
		let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
			message: format!("Failed to create {}: {e}", tmp_path.display()),
		})?;

		file.write_all(&serialized).map_err(|e| StoreError::Backend {
			message: format!("Failed to write {}: {e}", tmp_path.display()),
		})?;
		file.sync_all().map_err(|e| StoreError::Backend {
			message: format!("Failed to sync {}: {e}", tmp_path.display()),
		})?;
	}

	fs::rename(&tmp_path, path).map_err(|e| StoreError::Backend {
		message: format!("Failed to replace {}: {e}", path.display()),
	})
}
