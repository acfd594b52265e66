//! Local module cache.
//!
//! Restored content lives under `<root>/<scheme>/...`, one directory per
//! artifact. Writes go through a temp file and a rename so readers never see a
//! partially written artifact.

use std::io;
use std::path::{Path, PathBuf};

use uuid::Uuid;

/// File name of a restored module's entry point.
pub const ENTRY_POINT_FILE: &str = "main.json";

#[derive(Debug, Clone)]
pub struct ModuleCache {
	root: PathBuf,
}

impl ModuleCache {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into() }
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	/// Absolute path of a cache-relative location.
	pub fn path(&self, relative: &Path) -> PathBuf {
		self.root.join(relative)
	}

	pub fn contains(&self, relative: &Path) -> bool {
		self.path(relative).is_file()
	}

	/// Atomically stores `bytes` at `relative`, returning the absolute path.
	///
	/// # Errors
	///
	/// Propagates I/O errors from creating directories or writing the file.
	pub async fn store(&self, relative: &Path, bytes: &[u8]) -> io::Result<PathBuf> {
		let target = self.path(relative);
		let Some(parent) = target.parent() else {
			return Err(io::Error::new(io::ErrorKind::InvalidInput, "cache path has no parent"));
		};
		tokio::fs::create_dir_all(parent).await?;

		let file_name = target.file_name().and_then(|n| n.to_str()).unwrap_or(ENTRY_POINT_FILE);
		let staging = parent.join(format!(".{file_name}.{}.tmp", Uuid::new_v4()));
		tokio::fs::write(&staging, bytes).await?;
		if let Err(err) = tokio::fs::rename(&staging, &target).await {
			let _ = tokio::fs::remove_file(&staging).await;
			return Err(err);
		}

		tracing::debug!(path = %target.display(), bytes = bytes.len(), "module.cache.store");
		Ok(target)
	}
}

/// Makes one reference component safe to use as a directory name.
pub(crate) fn encode_segment(segment: &str) -> String {
	segment.replace(':', "$")
}
