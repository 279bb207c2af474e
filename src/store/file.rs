//! File-backed [`KeyValueStore`] that snapshots every mutation to a JSON document.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	store::{KeyValueStore, StoreError, StoreFuture},
};

/// Persists entries to a JSON file, replacing it atomically after each mutation.
#[derive(Clone, Debug)]
pub struct FileKeyValueStore {
	path: PathBuf,
	inner: Arc<RwLock<BTreeMap<String, String>>>,
}
impl FileKeyValueStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = Self::load_snapshot(&path)?;

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)) })
	}

	/// Location of the backing file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn load_snapshot(path: &Path) -> Result<BTreeMap<String, String>, StoreError> {
		if !path.exists() {
			return Ok(BTreeMap::new());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		if bytes.is_empty() {
			return Ok(BTreeMap::new());
		}

		serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
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

	fn persist_locked(&self, contents: &BTreeMap<String, String>) -> Result<(), StoreError> {
		let serialized =
			serde_json::to_vec_pretty(contents).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize store snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

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

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}

	fn mutate(&self, apply: impl FnOnce(&mut BTreeMap<String, String>) -> bool) -> Result<(), StoreError> {
		let mut guard = self.inner.write();
		let mut next = guard.clone();

		if !apply(&mut next) {
			return Ok(());
		}

		// Memory only moves forward once the snapshot is durable.
		self.persist_locked(&next)?;
		*guard = next;

		Ok(())
	}
}
impl KeyValueStore for FileKeyValueStore {
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
		Box::pin(async move { Ok(self.inner.read().get(key).cloned()) })
	}

	fn set<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			self.mutate(|map| map.insert(key.to_owned(), value.clone()).as_ref() != Some(&value))
		})
	}

	fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
		Box::pin(async move { self.mutate(|map| map.remove(key).is_some()) })
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::{env, process};
	// self
	use super::*;
	use crate::{auth::Token, store::TokenStore};

	fn temp_path() -> PathBuf {
		let unique = format!(
			"setlogger_kv_store_{}_{}.json",
			process::id(),
			OffsetDateTime::now_utc().unix_timestamp_nanos(),
		);

		env::temp_dir().join(unique)
	}

	#[tokio::test]
	async fn token_survives_reopen() {
		let path = temp_path();
		let backend =
			Arc::new(FileKeyValueStore::open(&path).expect("Failed to open file store snapshot."));
		let tokens = TokenStore::new(backend);
		let token = Token::from_epoch_ms("access-file", "refresh-file", 1_900_000_000_000)
			.expect("Token fixture should be in range.");

		tokens.save(&token).await.expect("Failed to save token into file store.");
		drop(tokens);

		let reopened = Arc::new(
			FileKeyValueStore::open(&path).expect("Failed to reopen file store snapshot."),
		);
		let loaded = TokenStore::new(reopened.clone())
			.load()
			.await
			.expect("Failed to load token from reopened file store.")
			.expect("File store lost token after reopen.");

		assert_eq!(loaded, token);

		reopened.remove(crate::store::ACCESS_TOKEN_KEY).await.expect("Remove should succeed.");

		let after_remove = FileKeyValueStore::open(&path).expect("Failed to reopen file store.");

		assert_eq!(
			after_remove.get(crate::store::ACCESS_TOKEN_KEY).await.expect("Read should succeed."),
			None
		);

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary file store snapshot {}: {e}", path.display())
		});
	}
}
