//! Modules referenced by a path relative to the declaring file.
//!
//! Local references carry no scheme prefix: `module m './child.bicep' = {}`.
//! Their content is always local, so restoring is a no-op.

use async_trait::async_trait;
use bramble_diagnostics::{DiagnosticBuilder, catalog};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::restore::{RestoreOutcome, RestoreResults};
use crate::{ModuleReference, ModuleRegistry, ReferencePayload};

/// Scheme owned by the local registry.
pub const LOCAL_SCHEME: &str = "";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalModuleReference {
	path: String,
}

impl LocalModuleReference {
	/// Relative path with forward slashes.
	pub fn path(&self) -> &str {
		&self.path
	}
}

impl ReferencePayload for LocalModuleReference {
	fn unqualified_reference(&self) -> String {
		self.path.clone()
	}
}

fn validate_path(path: &str) -> Result<(), DiagnosticBuilder> {
	if path.is_empty() {
		return Err(catalog::empty_path());
	}
	if path.chars().any(|c| c.is_control() || catalog::FORBIDDEN_PATH_CHARS.contains(&c)) {
		return Err(catalog::invalid_path_characters());
	}
	if path.starts_with('/') {
		return Err(catalog::path_must_be_relative(path));
	}
	if path.ends_with(catalog::FORBIDDEN_PATH_TERMINATORS) {
		return Err(catalog::invalid_path_terminator());
	}
	Ok(())
}

/// Resolves `path` against the directory of `parent` as file path segments.
///
/// Each segment is percent-encoded when pushed, so `#` and `%` stay part
/// of the file name instead of being read as URL syntax.
fn join_relative(parent: &Url, path: &str) -> Option<Url> {
	let mut url = parent.clone();
	url.set_query(None);
	url.set_fragment(None);
	{
		let mut segments = url.path_segments_mut().ok()?;
		segments.pop();
		for segment in path.split('/') {
			match segment {
				"" | "." => {}
				".." => {
					segments.pop();
				}
				segment => {
					segments.push(segment);
				}
			}
		}
	}
	Some(url)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalModuleRegistry;

impl LocalModuleRegistry {
	pub const fn new() -> Self {
		Self
	}
}

#[async_trait]
impl ModuleRegistry for LocalModuleRegistry {
	fn scheme(&self) -> &str {
		LOCAL_SCHEME
	}

	fn try_parse_module_reference(&self, alias: Option<&str>, reference: &str) -> Result<ModuleReference, DiagnosticBuilder> {
		// The dispatcher never routes an alias to the empty scheme; this guards
		// direct callers of the registry.
		if let Some(alias) = alias {
			return Err(catalog::unknown_module_alias(alias, "local"));
		}
		validate_path(reference)?;
		Ok(ModuleReference::new(
			LOCAL_SCHEME,
			LocalModuleReference {
				path: reference.to_string(),
			},
		))
	}

	fn is_available_locally(&self, _reference: &ModuleReference) -> bool {
		true
	}

	fn try_get_local_entry_point(&self, parent: &Url, reference: &ModuleReference) -> Result<Url, DiagnosticBuilder> {
		let path = reference.unqualified_reference();
		join_relative(parent, path).ok_or_else(|| catalog::path_not_resolvable(path, parent.as_str()))
	}

	async fn restore_all(&self, references: Vec<ModuleReference>, _cancel: CancellationToken) -> RestoreResults {
		references
			.into_iter()
			.map(|reference| (reference, Ok(RestoreOutcome::AlreadyAvailable)))
			.collect()
	}
}
