//! Registry configuration.
//!
//! Loaded from TOML, e.g.
//!
//! ```toml
//! cache_root = "/var/cache/bramble"
//!
//! [oci]
//! enabled = true
//! mirror = "/srv/mirror/oci"
//! timeout_secs = 30
//!
//! [oci.aliases.public]
//! registry = "mcr.microsoft.com"
//! module_path = "bicep"
//!
//! [template_spec]
//! enabled = true
//! mirror = "/srv/mirror/template-specs"
//!
//! [template_spec.aliases.shared]
//! subscription = "00000000-0000-0000-0000-000000000000"
//! resource_group = "shared-specs"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{fs, io};

use serde::Deserialize;
use thiserror::Error;

use crate::batch::FetchSettings;

/// Errors from loading registry configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("failed to read {}: {source}", path.display())]
	Read {
		path: PathBuf,
		#[source]
		source: io::Error,
	},
	#[error("failed to parse registry configuration: {0}")]
	Parse(#[from] toml::de::Error),
	#[error("the {scheme} registry is enabled but has no content mirror configured")]
	MissingMirror { scheme: &'static str },
}

/// Which registries are enabled and how they reach their content.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryConfig {
	/// Root of the local module cache. Defaults to the platform cache dir.
	pub cache_root: Option<PathBuf>,
	pub local: LocalConfig,
	pub oci: OciConfig,
	pub template_spec: TemplateSpecConfig,
}

impl RegistryConfig {
	/// Parses configuration from TOML text.
	///
	/// # Errors
	///
	/// Returns [`ConfigError::Parse`] on malformed TOML or unknown keys.
	pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
		Ok(toml::from_str(input)?)
	}

	/// Reads and parses a configuration file.
	///
	/// # Errors
	///
	/// Returns [`ConfigError::Read`] if the file cannot be read, otherwise as
	/// [`from_toml_str`](Self::from_toml_str).
	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let input = fs::read_to_string(path).map_err(|source| ConfigError::Read {
			path: path.to_path_buf(),
			source,
		})?;
		Self::from_toml_str(&input)
	}

	/// Resolved cache root.
	pub fn cache_root(&self) -> PathBuf {
		self.cache_root.clone().unwrap_or_else(default_cache_root)
	}
}

fn default_cache_root() -> PathBuf {
	dirs::cache_dir()
		.unwrap_or_else(std::env::temp_dir)
		.join("bramble")
		.join("modules")
}

const fn default_true() -> bool {
	true
}

const fn default_timeout_secs() -> u64 {
	60
}

const fn default_max_concurrency() -> usize {
	4
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LocalConfig {
	#[serde(default = "default_true")]
	pub enabled: bool,
}

impl Default for LocalConfig {
	fn default() -> Self {
		Self { enabled: true }
	}
}

/// OCI artifact registry (`br:`) settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OciConfig {
	pub enabled: bool,
	/// Directory mirroring registry content, laid out as
	/// `<registry>/<repository>/<tag-or-digest>/main.json`, with `/` in the
	/// repository and `:` in the registry or digest written as `$`.
	pub mirror: Option<PathBuf>,
	pub timeout_secs: u64,
	pub max_concurrency: usize,
	/// `br/<alias>:` prefixes.
	pub aliases: BTreeMap<String, OciAlias>,
}

impl Default for OciConfig {
	fn default() -> Self {
		Self {
			enabled: false,
			mirror: None,
			timeout_secs: default_timeout_secs(),
			max_concurrency: default_max_concurrency(),
			aliases: BTreeMap::new(),
		}
	}
}

impl OciConfig {
	pub fn fetch_settings(&self) -> FetchSettings {
		FetchSettings::new(Duration::from_secs(self.timeout_secs), self.max_concurrency)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OciAlias {
	pub registry: String,
	/// Repository prefix prepended to the module path.
	pub module_path: Option<String>,
}

/// Template spec registry (`ts:`) settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TemplateSpecConfig {
	pub enabled: bool,
	/// Directory mirroring template spec versions, laid out as
	/// `<subscription>/<resource-group>/<name>/<version>/main.json`.
	pub mirror: Option<PathBuf>,
	pub timeout_secs: u64,
	pub max_concurrency: usize,
	/// `ts/<alias>:` prefixes.
	pub aliases: BTreeMap<String, TemplateSpecAlias>,
}

impl Default for TemplateSpecConfig {
	fn default() -> Self {
		Self {
			enabled: false,
			mirror: None,
			timeout_secs: default_timeout_secs(),
			max_concurrency: default_max_concurrency(),
			aliases: BTreeMap::new(),
		}
	}
}

impl TemplateSpecConfig {
	pub fn fetch_settings(&self) -> FetchSettings {
		FetchSettings::new(Duration::from_secs(self.timeout_secs), self.max_concurrency)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateSpecAlias {
	pub subscription: String,
	pub resource_group: Option<String>,
}
