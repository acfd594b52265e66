//! OCI artifact registry backend (`br:`).
//!
//! References name an artifact in a container registry:
//!
//! * `br:contoso.azurecr.io/bicep/storage:1.0.0`
//! * `br:contoso.azurecr.io/bicep/storage@sha256:<64 hex digits>`
//! * `br/<alias>:storage:1.0.0`, expanded through the configured alias
//!
//! Restored artifacts are cached under `br/<registry>/<repository>/<tag>/`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use bramble_diagnostics::{DiagnosticBuilder, catalog};
use regex::Regex;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::batch::{FetchSettings, restore_each};
use crate::cache::{ENTRY_POINT_FILE, ModuleCache, encode_segment};
use crate::config::OciAlias;
use crate::restore::{RestoreFailure, RestoreFailureKind, RestoreResults};
use crate::source::ContentSource;
use crate::{ModuleReference, ModuleRegistry, ReferencePayload};

pub const OCI_SCHEME: &str = "br";

const DIGEST_PREFIX: &str = "sha256:";

static REGISTRY_HOST: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9](?:[a-zA-Z0-9.-]*[a-zA-Z0-9])?(?::[0-9]{1,5})?$").expect("registry host regex"));
static PATH_SEGMENT: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"^[a-z0-9]+(?:[._-][a-z0-9]+)*$").expect("path segment regex"));
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9._-]*$").expect("tag regex"));
static DIGEST: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^sha256:[a-f0-9]{64}$").expect("digest regex"));

/// Tag or digest pinning an artifact version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArtifactVersion {
	Tag(String),
	Digest(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OciArtifactReference {
	registry: String,
	repository: String,
	version: ArtifactVersion,
}

impl OciArtifactReference {
	/// Parses `<registry>/<repository>(:<tag>|@<digest>)`.
	///
	/// `display` is the reference as written by the user and only appears in
	/// diagnostics.
	///
	/// # Errors
	///
	/// Returns the diagnostic of the first defect found.
	pub fn parse(raw: &str, display: &str) -> Result<Self, DiagnosticBuilder> {
		let Some((registry, rest)) = raw.split_once('/') else {
			return Err(catalog::invalid_oci_reference(display));
		};

		let (repository, version) = if let Some((repository, digest)) = rest.split_once('@') {
			(repository, ArtifactVersion::Digest(digest.to_string()))
		} else if let Some((repository, tag)) = rest.rsplit_once(':') {
			(repository, ArtifactVersion::Tag(tag.to_string()))
		} else {
			return Err(catalog::missing_oci_tag_or_digest(display));
		};

		if registry.is_empty() || repository.is_empty() {
			return Err(catalog::invalid_oci_reference(display));
		}
		if registry.len() > catalog::MAX_REGISTRY_LENGTH {
			return Err(catalog::oci_registry_too_long(display, registry));
		}
		if !REGISTRY_HOST.is_match(registry) {
			return Err(catalog::invalid_oci_registry(display, registry));
		}
		if repository.len() > catalog::MAX_REPOSITORY_LENGTH {
			return Err(catalog::oci_repository_too_long(display, repository));
		}
		if let Some(segment) = repository.split('/').find(|segment| !PATH_SEGMENT.is_match(segment)) {
			return Err(catalog::invalid_oci_path_segment(display, segment));
		}

		match &version {
			ArtifactVersion::Tag(tag) if tag.is_empty() => return Err(catalog::missing_oci_tag_or_digest(display)),
			ArtifactVersion::Tag(tag) if tag.len() > catalog::MAX_TAG_LENGTH => {
				return Err(catalog::oci_tag_too_long(display, tag));
			}
			ArtifactVersion::Tag(tag) if !TAG.is_match(tag) => return Err(catalog::invalid_oci_tag(display, tag)),
			ArtifactVersion::Digest(digest) if digest.is_empty() => {
				return Err(catalog::missing_oci_tag_or_digest(display));
			}
			ArtifactVersion::Digest(digest) if !DIGEST.is_match(digest) => {
				return Err(catalog::invalid_oci_digest(display, digest));
			}
			ArtifactVersion::Tag(_) | ArtifactVersion::Digest(_) => {}
		}

		Ok(Self {
			registry: registry.to_string(),
			repository: repository.to_string(),
			version,
		})
	}

	pub fn registry(&self) -> &str {
		&self.registry
	}

	pub fn repository(&self) -> &str {
		&self.repository
	}

	pub fn version(&self) -> &ArtifactVersion {
		&self.version
	}

	pub fn tag(&self) -> Option<&str> {
		match &self.version {
			ArtifactVersion::Tag(tag) => Some(tag),
			ArtifactVersion::Digest(_) => None,
		}
	}

	pub fn digest(&self) -> Option<&str> {
		match &self.version {
			ArtifactVersion::Digest(digest) => Some(digest),
			ArtifactVersion::Tag(_) => None,
		}
	}

	/// `<registry>/<repository>` without the version.
	pub fn artifact_id(&self) -> String {
		format!("{}/{}", self.registry, self.repository)
	}

	/// Location of the artifact's entry point relative to a mirror root:
	/// `<registry>/<repository>/<version>/main.json`.
	///
	/// The repository is folded into one directory (`/` becomes `$`, which
	/// path segments cannot contain) so every artifact sits at the same depth
	/// and no artifact's directory is another's file.
	fn locator(&self) -> PathBuf {
		let version = match &self.version {
			ArtifactVersion::Tag(tag) => tag.clone(),
			ArtifactVersion::Digest(digest) => encode_segment(digest),
		};
		[
			encode_segment(&self.registry).as_str(),
			self.repository.replace('/', "$").as_str(),
			version.as_str(),
			ENTRY_POINT_FILE,
		]
		.iter()
		.collect()
	}

	fn cache_path(&self) -> PathBuf {
		PathBuf::from(OCI_SCHEME).join(self.locator())
	}
}

impl ReferencePayload for OciArtifactReference {
	fn unqualified_reference(&self) -> String {
		match &self.version {
			ArtifactVersion::Tag(tag) => format!("{}/{}:{tag}", self.registry, self.repository),
			ArtifactVersion::Digest(digest) => format!("{}/{}@{digest}", self.registry, self.repository),
		}
	}
}

/// Registry for OCI artifacts, fetched through a [`ContentSource`].
pub struct OciModuleRegistry {
	cache: ModuleCache,
	source: Arc<dyn ContentSource>,
	settings: FetchSettings,
	aliases: BTreeMap<String, OciAlias>,
}

impl OciModuleRegistry {
	pub fn new(cache: ModuleCache, source: Arc<dyn ContentSource>) -> Self {
		Self {
			cache,
			source,
			settings: FetchSettings::default(),
			aliases: BTreeMap::new(),
		}
	}

	#[must_use]
	pub fn with_settings(mut self, settings: FetchSettings) -> Self {
		self.settings = settings;
		self
	}

	#[must_use]
	pub fn with_aliases(mut self, aliases: BTreeMap<String, OciAlias>) -> Self {
		self.aliases = aliases;
		self
	}

	fn expand_alias(&self, alias: &str, reference: &str) -> Result<String, DiagnosticBuilder> {
		let Some(target) = self.aliases.get(alias) else {
			return Err(catalog::unknown_module_alias(alias, OCI_SCHEME));
		};
		Ok(match target.module_path.as_deref().map(|p| p.trim_matches('/')) {
			Some(prefix) if !prefix.is_empty() => format!("{}/{prefix}/{reference}", target.registry),
			_ => format!("{}/{reference}", target.registry),
		})
	}
}

async fn fetch_artifact(
	source: Arc<dyn ContentSource>,
	cache: ModuleCache,
	reference: ModuleReference,
) -> Result<(), RestoreFailure> {
	let Some(artifact) = reference.payload::<OciArtifactReference>() else {
		return Err(RestoreFailure::new(
			RestoreFailureKind::Internal,
			format!("\"{reference}\" is not an OCI artifact reference"),
		));
	};

	let bytes = source.fetch(&artifact.locator()).await?;

	if let Some(expected) = artifact.digest() {
		let actual = format!("{DIGEST_PREFIX}{}", hex::encode(Sha256::digest(&bytes)));
		if actual != expected {
			return Err(RestoreFailure::new(
				RestoreFailureKind::InvalidContent,
				format!("the artifact digest {actual} does not match {expected}"),
			));
		}
	}
	if let Err(err) = serde_json::from_slice::<serde_json::Value>(&bytes) {
		return Err(RestoreFailure::new(
			RestoreFailureKind::InvalidContent,
			format!("the artifact content is not valid JSON: {err}"),
		));
	}

	cache
		.store(&artifact.cache_path(), &bytes)
		.await
		.map_err(|err| RestoreFailure::new(RestoreFailureKind::Storage, format!("failed to cache the artifact: {err}")))?;
	Ok(())
}

#[async_trait]
impl ModuleRegistry for OciModuleRegistry {
	fn scheme(&self) -> &str {
		OCI_SCHEME
	}

	fn try_parse_module_reference(&self, alias: Option<&str>, reference: &str) -> Result<ModuleReference, DiagnosticBuilder> {
		let display = match alias {
			Some(alias) => format!("{OCI_SCHEME}/{alias}:{reference}"),
			None => format!("{OCI_SCHEME}:{reference}"),
		};
		let raw = match alias {
			Some(alias) => self.expand_alias(alias, reference)?,
			None => reference.to_string(),
		};
		let artifact = OciArtifactReference::parse(&raw, &display)?;
		Ok(ModuleReference::new(OCI_SCHEME, artifact))
	}

	fn is_available_locally(&self, reference: &ModuleReference) -> bool {
		reference
			.payload::<OciArtifactReference>()
			.is_some_and(|artifact| self.cache.contains(&artifact.cache_path()))
	}

	fn try_get_local_entry_point(&self, _parent: &Url, reference: &ModuleReference) -> Result<Url, DiagnosticBuilder> {
		let fully_qualified = reference.fully_qualified_reference();
		let Some(artifact) = reference.payload::<OciArtifactReference>() else {
			return Err(catalog::invalid_oci_reference(fully_qualified));
		};
		if !self.is_available_locally(reference) {
			return Err(catalog::module_requires_restore(fully_qualified));
		}
		let path = self.cache.path(&artifact.cache_path());
		Url::from_file_path(&path).map_err(|()| catalog::path_not_resolvable(&path.display().to_string(), fully_qualified))
	}

	async fn restore_all(&self, references: Vec<ModuleReference>, cancel: CancellationToken) -> RestoreResults {
		tracing::debug!(count = references.len(), "module.restore.oci");
		restore_each(
			references,
			cancel,
			self.settings,
			|reference| self.is_available_locally(reference),
			|reference| fetch_artifact(Arc::clone(&self.source), self.cache.clone(), reference),
		)
		.await
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use rstest::rstest;

	use super::*;

	const DIGEST_HEX: &str = "a3f1c2d4e5b60718293a4b5c6d7e8f90a1b2c3d4e5f60718293a4b5c6d7e8f90";

	fn parse(raw: &str) -> Result<OciArtifactReference, DiagnosticBuilder> {
		OciArtifactReference::parse(raw, &format!("br:{raw}"))
	}

	#[test]
	fn parses_tagged_reference() {
		let artifact = parse("contoso.azurecr.io/bicep/modules/storage:1.0.0").unwrap();
		assert_eq!(artifact.registry(), "contoso.azurecr.io");
		assert_eq!(artifact.repository(), "bicep/modules/storage");
		assert_eq!(artifact.tag(), Some("1.0.0"));
		assert_eq!(artifact.digest(), None);
		assert_eq!(artifact.artifact_id(), "contoso.azurecr.io/bicep/modules/storage");
		assert_eq!(artifact.unqualified_reference(), "contoso.azurecr.io/bicep/modules/storage:1.0.0");
	}

	#[test]
	fn parses_digest_and_port() {
		let raw = format!("localhost:5000/storage@sha256:{DIGEST_HEX}");
		let artifact = parse(&raw).unwrap();
		assert_eq!(artifact.registry(), "localhost:5000");
		assert_eq!(artifact.digest(), Some(format!("sha256:{DIGEST_HEX}").as_str()));
		assert_eq!(artifact.unqualified_reference(), raw);
		assert_eq!(
			artifact.cache_path(),
			PathBuf::from(format!("br/localhost$5000/storage/sha256${DIGEST_HEX}/main.json"))
		);
	}

	#[test]
	fn nested_repositories_do_not_share_cache_directories() {
		let tagged = parse("a.io/b:1").unwrap();
		let nested = parse("a.io/b/1:main.json").unwrap();
		assert_eq!(tagged.cache_path(), PathBuf::from("br/a.io/b/1/main.json"));
		assert_eq!(nested.cache_path(), PathBuf::from("br/a.io/b$1/main.json/main.json"));
		assert_eq!(nested.locator(), PathBuf::from("a.io/b$1/main.json/main.json"));
	}

	#[rstest]
	#[case("no-slash:1.0", "BCP193")]
	#[case("/storage:1.0", "BCP193")]
	#[case("host.io/storage", "BCP196")]
	#[case("host.io/storage:", "BCP196")]
	#[case("host.io/storage@", "BCP196")]
	#[case("host.io/Storage:1.0", "BCP195")]
	#[case("host.io/a//b:1.0", "BCP195")]
	#[case("host.io/storage:.hidden", "BCP198")]
	#[case("host.io/storage:v1+2", "BCP198")]
	#[case("host.io/storage@sha256:abc", "BCP224")]
	#[case("host.io/storage@md5:abc", "BCP224")]
	#[case("-host.io/storage:1", "BCP201")]
	fn rejects_malformed_references(#[case] raw: &str, #[case] code: &str) {
		assert_eq!(parse(raw).unwrap_err().code(), code);
	}

	#[test]
	fn rejects_overlong_components() {
		let tag = "v".repeat(129);
		assert_eq!(parse(&format!("host.io/storage:{tag}")).unwrap_err().code(), "BCP197");

		let repository = "a".repeat(256);
		assert_eq!(parse(&format!("host.io/{repository}:1")).unwrap_err().code(), "BCP199");

		let registry = format!("{}.io", "r".repeat(256));
		assert_eq!(parse(&format!("{registry}/storage:1")).unwrap_err().code(), "BCP200");
	}

	#[test]
	fn diagnostics_quote_the_written_reference() {
		let err = parse("host.io/storage").unwrap_err();
		assert_eq!(
			err.message(),
			"The specified OCI artifact reference \"br:host.io/storage\" is not valid. The module tag or digest is missing."
		);
	}
}
