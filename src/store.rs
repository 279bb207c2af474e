//! Durable token storage over an async key-value backend.

pub mod file;
pub mod memory;

pub use file::FileKeyValueStore;
pub use memory::MemoryKeyValueStore;

// self
use crate::{_prelude::*, auth::Token};

/// Boxed future returned by [`KeyValueStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Async string key-value backend (keychain, secure storage, file, memory).
pub trait KeyValueStore
where
	Self: Send + Sync,
{
	/// Reads the value stored under `key`, if present.
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>>;

	/// Stores or replaces the value under `key`.
	fn set<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, ()>;

	/// Removes `key`; removing a missing key succeeds.
	fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;
}

/// Error type produced by [`KeyValueStore`] implementations and the [`TokenStore`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Stored data could not be encoded or decoded.
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

/// Storage key for the access token.
pub const ACCESS_TOKEN_KEY: &str = "setlogger.access_token";
/// Storage key for the access token expiry (epoch milliseconds).
pub const EXPIRES_AT_KEY: &str = "setlogger.expires_at_ms";
/// Storage key for the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "setlogger.refresh_token";

/// Persists the session [`Token`] as three keys of a [`KeyValueStore`].
///
/// Operations are serialized through an async mutex, so a concurrent `load` never observes a
/// token whose keys were written by two different `save` calls.
pub struct TokenStore {
	backend: Arc<dyn KeyValueStore>,
	guard: AsyncMutex<()>,
}
impl TokenStore {
	/// Creates a token store over the provided backend.
	pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
		Self { backend, guard: AsyncMutex::new(()) }
	}

	/// Loads the persisted token; a partially written key set loads as `None`.
	pub async fn load(&self) -> Result<Option<Token>, StoreError> {
		let _serial = self.guard.lock().await;
		let access = self.backend.get(ACCESS_TOKEN_KEY).await?;
		let expires = self.backend.get(EXPIRES_AT_KEY).await?;
		let refresh = self.backend.get(REFRESH_TOKEN_KEY).await?;
		let (Some(access), Some(expires), Some(refresh)) = (access, expires, refresh) else {
			return Ok(None);
		};
		let expires_ms = expires.trim().parse::<i64>().map_err(|e| StoreError::Serialization {
			message: format!("Stored expiry `{expires}` is not an epoch timestamp: {e}"),
		})?;

		Token::from_epoch_ms(access, refresh, expires_ms).map(Some).ok_or_else(|| {
			StoreError::Serialization {
				message: format!("Stored expiry {expires_ms} is out of range"),
			}
		})
	}

	/// Persists `token`, replacing any previous one.
	pub async fn save(&self, token: &Token) -> Result<(), StoreError> {
		let _serial = self.guard.lock().await;

		self.backend.set(ACCESS_TOKEN_KEY, token.access_token.expose().to_owned()).await?;
		self.backend.set(EXPIRES_AT_KEY, token.expires_at_epoch_ms().to_string()).await?;
		self.backend.set(REFRESH_TOKEN_KEY, token.refresh_token.expose().to_owned()).await
	}

	/// Removes every persisted token key.
	pub async fn clear(&self) -> Result<(), StoreError> {
		let _serial = self.guard.lock().await;

		self.backend.remove(ACCESS_TOKEN_KEY).await?;
		self.backend.remove(EXPIRES_AT_KEY).await?;
		self.backend.remove(REFRESH_TOKEN_KEY).await
	}
}
impl Debug for TokenStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("TokenStore(..)")
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn save_load_clear_round_trip() {
		let backend = Arc::new(MemoryKeyValueStore::default());
		let store = TokenStore::new(backend.clone());
		let token = Token::from_epoch_ms("access-a", "refresh-r", 1_900_000_000_000)
			.expect("Token fixture should be in range.");

		assert!(store.load().await.expect("Empty store should load.").is_none());

		store.save(&token).await.expect("Saving token should succeed.");

		assert_eq!(
			backend.get(EXPIRES_AT_KEY).await.expect("Backend read should succeed."),
			Some("1900000000000".into())
		);
		assert_eq!(store.load().await.expect("Load should succeed."), Some(token));

		store.clear().await.expect("Clearing token should succeed.");

		assert!(store.load().await.expect("Cleared store should load.").is_none());
	}

	#[tokio::test]
	async fn partial_key_set_loads_as_signed_out() {
		let backend = Arc::new(MemoryKeyValueStore::default());
		let store = TokenStore::new(backend.clone());

		backend.set(ACCESS_TOKEN_KEY, "orphan".into()).await.expect("Seeding should succeed.");

		assert!(store.load().await.expect("Partial store should load.").is_none());
	}

	#[tokio::test]
	async fn garbage_expiry_surfaces_serialization_error() {
		let backend = Arc::new(MemoryKeyValueStore::default());
		let store = TokenStore::new(backend.clone());

		backend.set(ACCESS_TOKEN_KEY, "a".into()).await.expect("Seeding should succeed.");
		backend.set(EXPIRES_AT_KEY, "tomorrow".into()).await.expect("Seeding should succeed.");
		backend.set(REFRESH_TOKEN_KEY, "r".into()).await.expect("Seeding should succeed.");

		let err = store.load().await.expect_err("Non-numeric expiry should fail to load.");

		assert!(matches!(err, StoreError::Serialization { .. }));
	}
}
