//! Where registries fetch module content from.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use crate::restore::{RestoreFailure, RestoreFailureKind};

/// Transport-level failure of a single fetch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
	#[error("the artifact \"{0}\" was not found")]
	NotFound(String),
	#[error("access to \"{0}\" was denied")]
	Unauthorized(String),
	#[error("transport error: {0}")]
	Transport(String),
}

impl From<FetchError> for RestoreFailure {
	fn from(err: FetchError) -> Self {
		let kind = match &err {
			FetchError::NotFound(_) => RestoreFailureKind::NotFound,
			FetchError::Unauthorized(_) => RestoreFailureKind::Unauthorized,
			FetchError::Transport(_) => RestoreFailureKind::Transport,
		};
		RestoreFailure::new(kind, err.to_string())
	}
}

/// A source of artifact bytes addressed by a relative locator path.
///
/// Registries translate a reference into a locator; the source decides how
/// that locator is reached (directory mirror, HTTP, ...).
#[async_trait]
pub trait ContentSource: Send + Sync {
	/// Fetches the bytes stored under `locator`.
	///
	/// # Errors
	///
	/// Returns a [`FetchError`] whose variant identifies the failure class.
	async fn fetch(&self, locator: &Path) -> Result<Vec<u8>, FetchError>;
}

/// Content source backed by a local directory mirror.
#[derive(Debug, Clone)]
pub struct MirrorSource {
	root: PathBuf,
}

impl MirrorSource {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into() }
	}

	pub fn root(&self) -> &Path {
		&self.root
	}
}

#[async_trait]
impl ContentSource for MirrorSource {
	async fn fetch(&self, locator: &Path) -> Result<Vec<u8>, FetchError> {
		let path = self.root.join(locator);
		tracing::trace!(path = %path.display(), "module.source.mirror.read");
		tokio::fs::read(&path).await.map_err(|err| {
			let locator = locator.display().to_string();
			match err.kind() {
				io::ErrorKind::NotFound => FetchError::NotFound(locator),
				io::ErrorKind::PermissionDenied => FetchError::Unauthorized(locator),
				_ => FetchError::Transport(format!("{locator}: {err}")),
			}
		})
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[tokio::test]
	async fn mirror_reads_relative_locator() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
		std::fs::write(dir.path().join("a/b/main.json"), b"{}").unwrap();

		let source = MirrorSource::new(dir.path());
		assert_eq!(source.fetch(Path::new("a/b/main.json")).await.unwrap(), b"{}".to_vec());
	}

	#[tokio::test]
	async fn mirror_maps_missing_file_to_not_found() {
		let dir = tempfile::tempdir().unwrap();
		let source = MirrorSource::new(dir.path());
		let err = source.fetch(Path::new("missing/main.json")).await.unwrap_err();
		assert_eq!(err, FetchError::NotFound("missing/main.json".to_string()));

		let failure = RestoreFailure::from(err);
		assert_eq!(failure.kind(), RestoreFailureKind::NotFound);
	}
}
