use super::{KeyValueStore, StoreError};

use std::{
	collections::BTreeMap,
	io::ErrorKind,
	path::{Path, PathBuf},
	sync::Arc,
};

use async_trait::async_trait;
use tokio::{
	fs,
	sync::{Mutex, RwLock},
};
use tracing::{trace, warn};
use uuid::Uuid;

type Entries = BTreeMap<String, String>;

/// In-process store. Clones share the same entries, which is how tests put a foreground
/// monitor and a background evaluator on the same "disk".
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
	entries: Arc<RwLock<Entries>>,
}

impl MemoryStore {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub async fn len(&self) -> usize {
		self.entries.read().await.len()
	}

	pub async fn is_empty(&self) -> bool {
		self.entries.read().await.is_empty()
	}
}

#[async_trait]
impl KeyValueStore for MemoryStore {
	async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
		Ok(self.entries.read().await.get(key).cloned())
	}

	async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
		self.entries.write().await.insert(key.to_string(), value);
		Ok(())
	}

	async fn remove(&self, key: &str) -> Result<(), StoreError> {
		self.entries.write().await.remove(key);
		Ok(())
	}
}

/// A JSON object on disk. Every access goes back to the file so separate processes
/// observe each other's writes; writes go through a temporary file and a rename.
#[derive(Debug)]
pub struct FileStore {
	path: PathBuf,
	write_lock: Mutex<()>,
}

impl FileStore {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self {
			path: path.into(),
			write_lock: Mutex::new(()),
		}
	}

	#[must_use]
	pub fn path(&self) -> &Path {
		&self.path
	}

	async fn read_entries(&self) -> Result<Entries, StoreError> {
		match fs::read(&self.path).await {
			Ok(bytes) if bytes.is_empty() => Ok(Entries::new()),
			Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| StoreError::Decode {
				path: self.path.clone(),
				source,
			}),
			Err(e) if e.kind() == ErrorKind::NotFound => Ok(Entries::new()),
			Err(e) => Err(StoreError::io(&self.path, e)),
		}
	}

	async fn modify(&self, f: impl FnOnce(&mut Entries) + Send) -> Result<(), StoreError> {
		let _guard = self.write_lock.lock().await;

		let mut entries = match self.read_entries().await {
			Ok(entries) => entries,
			Err(e @ StoreError::Decode { .. }) => {
				warn!(?e, "Store file is unreadable, starting over with an empty store");
				Entries::new()
			}
			Err(e) => return Err(e),
		};

		f(&mut entries);

		if let Some(parent) = self.path.parent() {
			if !parent.as_os_str().is_empty() {
				fs::create_dir_all(parent)
					.await
					.map_err(|e| StoreError::io(parent, e))?;
			}
		}

		// Unique per writer, other instances may be writing the same file
		let tmp_path = self.path.with_extension(format!("{}.tmp", Uuid::new_v4()));
		fs::write(&tmp_path, serde_json::to_vec_pretty(&entries)?)
			.await
			.map_err(|e| StoreError::io(&tmp_path, e))?;
		fs::rename(&tmp_path, &self.path)
			.await
			.map_err(|e| StoreError::io(&self.path, e))?;

		trace!(path = %self.path.display(), "Store written");

		Ok(())
	}
}

#[async_trait]
impl KeyValueStore for FileStore {
	async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
		Ok(self.read_entries().await?.remove(key))
	}

	async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
		let key = key.to_string();
		self.modify(move |entries| {
			entries.insert(key, value);
		})
		.await
	}

	async fn remove(&self, key: &str) -> Result<(), StoreError> {
		self.modify(|entries| {
			entries.remove(key);
		})
		.await
	}
}
