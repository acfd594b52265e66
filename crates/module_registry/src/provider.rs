//! The configured set of registries a dispatcher routes to.

use std::sync::Arc;

use rustc_hash::FxHashSet;
use thiserror::Error;

use crate::ModuleRegistry;
use crate::backends::{LocalModuleRegistry, OciModuleRegistry, TemplateSpecModuleRegistry};
use crate::cache::ModuleCache;
use crate::config::{ConfigError, RegistryConfig};
use crate::source::MirrorSource;

/// Errors from assembling a provider.
#[derive(Debug, Error)]
pub enum ProviderError {
	/// Two registries claim the same scheme.
	#[error("duplicate module registry scheme {scheme:?}")]
	DuplicateScheme { scheme: String },

	#[error(transparent)]
	Config(#[from] ConfigError),
}

/// Ordered collection of registry backends, assembled once at startup.
pub trait RegistryProvider: Send + Sync {
	fn registries(&self) -> &[Arc<dyn ModuleRegistry>];
}

/// Provider over a fixed list of registries with distinct schemes.
#[derive(Clone, Default)]
pub struct DefaultRegistryProvider {
	registries: Vec<Arc<dyn ModuleRegistry>>,
}

impl DefaultRegistryProvider {
	/// # Errors
	///
	/// Returns [`ProviderError::DuplicateScheme`] if two registries share a
	/// scheme.
	pub fn new(registries: Vec<Arc<dyn ModuleRegistry>>) -> Result<Self, ProviderError> {
		let mut seen = FxHashSet::default();
		for registry in &registries {
			if !seen.insert(registry.scheme()) {
				return Err(ProviderError::DuplicateScheme {
					scheme: registry.scheme().to_string(),
				});
			}
		}
		Ok(Self { registries })
	}

	/// A provider with no registries; every reference validates to BCP189.
	pub fn empty() -> Self {
		Self::default()
	}

	/// Builds the enabled built-in registries.
	///
	/// Remote registries share one cache rooted at
	/// [`RegistryConfig::cache_root`] and read from their configured mirror.
	///
	/// # Errors
	///
	/// Returns [`ConfigError::MissingMirror`] when a remote registry is enabled
	/// without a mirror.
	pub fn from_config(config: &RegistryConfig) -> Result<Self, ProviderError> {
		let cache = ModuleCache::new(config.cache_root());
		let mut registries: Vec<Arc<dyn ModuleRegistry>> = Vec::new();

		if config.local.enabled {
			registries.push(Arc::new(LocalModuleRegistry::new()));
		}

		if config.oci.enabled {
			let Some(mirror) = &config.oci.mirror else {
				return Err(ConfigError::MissingMirror { scheme: "br" }.into());
			};
			registries.push(Arc::new(
				OciModuleRegistry::new(cache.clone(), Arc::new(MirrorSource::new(mirror)))
					.with_settings(config.oci.fetch_settings())
					.with_aliases(config.oci.aliases.clone()),
			));
		}

		if config.template_spec.enabled {
			let Some(mirror) = &config.template_spec.mirror else {
				return Err(ConfigError::MissingMirror { scheme: "ts" }.into());
			};
			registries.push(Arc::new(
				TemplateSpecModuleRegistry::new(cache, Arc::new(MirrorSource::new(mirror)))
					.with_settings(config.template_spec.fetch_settings())
					.with_aliases(config.template_spec.aliases.clone()),
			));
		}

		tracing::debug!(
			schemes = ?registries.iter().map(|r| r.scheme().to_string()).collect::<Vec<_>>(),
			cache_root = %config.cache_root().display(),
			"module.provider.configured"
		);
		Self::new(registries)
	}
}

impl RegistryProvider for DefaultRegistryProvider {
	fn registries(&self) -> &[Arc<dyn ModuleRegistry>] {
		&self.registries
	}
}
