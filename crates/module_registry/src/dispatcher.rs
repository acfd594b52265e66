//! Routes module declarations to the registry owning their scheme.
//!
//! Only [`ModuleDispatcher::available_schemes`] and
//! [`ModuleDispatcher::validate_module_reference`] accept arbitrary input. Every
//! other operation requires a declaration that validates successfully and
//! panics with [`NOT_VALIDATED_MESSAGE`] otherwise: calling them with an
//! unvalidated reference is a bug in the caller, not a user error.

use std::sync::Arc;

use bramble_diagnostics::{DiagnosticBuilder, catalog};
use bramble_module_syntax::ModuleDeclarationSyntax;
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::restore::{RestoreFailure, RestoreFailureKind, RestoreResults, RestoreSummary};
use crate::{ModuleReference, ModuleRegistry, RegistryProvider};

/// Panic message of gated operations called with an unvalidated reference.
pub const NOT_VALIDATED_MESSAGE: &str = "The specified module is not valid. Call ValidateModuleReference() first.";

/// Whether a validated module can be used without restoring it first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleAvailability {
	Available,
	/// Content is missing locally; carries the diagnostic to report.
	RestoreRequired(DiagnosticBuilder),
}

impl ModuleAvailability {
	pub const fn is_available(&self) -> bool {
		matches!(self, Self::Available)
	}
}

/// Reference text split at its scheme token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SchemeParts<'a> {
	scheme: &'a str,
	alias: Option<&'a str>,
	rest: &'a str,
}

/// Splits `br:x`, `br/alias:x` and bare local paths.
///
/// The token before the first `:` counts as a scheme only when it is made of
/// ASCII alphanumerics, `-` and `_`, with at most one `/` introducing an
/// alias. Anything else is a local path with the empty scheme.
fn split_scheme(text: &str) -> SchemeParts<'_> {
	let local = SchemeParts {
		scheme: "",
		alias: None,
		rest: text,
	};
	let Some((token, rest)) = text.split_once(':') else {
		return local;
	};

	let is_token = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
	match token.split_once('/') {
		Some((scheme, alias)) if is_token(scheme) && is_token(alias) => SchemeParts {
			scheme,
			alias: Some(alias),
			rest,
		},
		None if is_token(token) => SchemeParts {
			scheme: token,
			alias: None,
			rest,
		},
		_ => local,
	}
}

/// Immutable scheme → registry routing table.
///
/// Cheap to share between tasks; it holds no mutable state after
/// construction.
pub struct ModuleDispatcher {
	registries: FxHashMap<String, Arc<dyn ModuleRegistry>>,
	/// Schemes in provider order.
	schemes: Vec<String>,
}

impl ModuleDispatcher {
	/// Builds the routing table from `provider`.
	///
	/// # Panics
	///
	/// Panics if two registries share a scheme. [`DefaultRegistryProvider`]
	/// rejects that at construction.
	///
	/// [`DefaultRegistryProvider`]: crate::DefaultRegistryProvider
	pub fn new(provider: &dyn RegistryProvider) -> Self {
		let mut registries = FxHashMap::default();
		let mut schemes = Vec::new();
		for registry in provider.registries() {
			let scheme = registry.scheme().to_string();
			if registries.insert(scheme.clone(), Arc::clone(registry)).is_some() {
				panic!("duplicate module registry scheme {scheme:?}");
			}
			schemes.push(scheme);
		}
		tracing::debug!(?schemes, "module.dispatcher.created");
		Self { registries, schemes }
	}

	/// Schemes of all configured registries; empty when none are configured.
	pub fn available_schemes(&self) -> impl Iterator<Item = &str> {
		self.schemes.iter().map(String::as_str)
	}

	/// Resolves a declaration's reference through the registry owning its
	/// scheme.
	///
	/// # Errors
	///
	/// Returns `BCP189` when no registry owns the scheme, including when no
	/// registries are configured at all. Otherwise returns the owning
	/// registry's own diagnostic for a malformed reference.
	pub fn validate_module_reference(&self, module: &ModuleDeclarationSyntax) -> Result<ModuleReference, DiagnosticBuilder> {
		self.resolve(module).map(|(_, reference)| reference)
	}

	/// Checks whether a validated module's content is already local.
	///
	/// # Panics
	///
	/// Panics with [`NOT_VALIDATED_MESSAGE`] if `module` does not validate.
	pub fn is_module_available(&self, module: &ModuleDeclarationSyntax) -> ModuleAvailability {
		let (registry, reference) = self.resolve_validated(module);
		if registry.is_available_locally(&reference) {
			ModuleAvailability::Available
		} else {
			ModuleAvailability::RestoreRequired(catalog::module_requires_restore(reference.fully_qualified_reference()))
		}
	}

	/// Resolves the local entry point of a validated module declared in the
	/// file at `parent`.
	///
	/// # Errors
	///
	/// Returns the owning registry's diagnostic, e.g. `BCP190` when the module
	/// has not been restored.
	///
	/// # Panics
	///
	/// Panics with [`NOT_VALIDATED_MESSAGE`] if `module` does not validate.
	pub fn try_get_local_module_entry_point(&self, parent: &Url, module: &ModuleDeclarationSyntax) -> Result<Url, DiagnosticBuilder> {
		let (registry, reference) = self.resolve_validated(module);
		registry.try_get_local_entry_point(parent, &reference)
	}

	/// Restores every module, one registry call per scheme.
	///
	/// Partitions run concurrently and report into disjoint maps, so a failing
	/// registry never affects another partition. Duplicate references are
	/// restored once. The summary holds exactly one result per distinct
	/// reference; fetch failures are results, never errors.
	///
	/// Must be called within a tokio runtime.
	///
	/// # Panics
	///
	/// Panics with [`NOT_VALIDATED_MESSAGE`] if any module does not validate.
	/// All modules are checked before any restore work starts. A panic inside
	/// a registry is propagated.
	pub async fn restore_modules<'a, I>(&self, modules: I, cancel: &CancellationToken) -> RestoreSummary
	where
		I: IntoIterator<Item = &'a ModuleDeclarationSyntax>,
	{
		let mut partitions: FxHashMap<&str, (Arc<dyn ModuleRegistry>, Vec<ModuleReference>)> = FxHashMap::default();
		let mut requested = Vec::new();
		let mut seen = FxHashSet::default();

		for module in modules {
			let (registry, reference) = self.resolve_validated(module);
			if !seen.insert(reference.clone()) {
				continue;
			}
			requested.push(reference.clone());
			partitions
				.entry(registry.scheme())
				.or_insert_with(|| (Arc::clone(registry), Vec::new()))
				.1
				.push(reference);
		}

		tracing::info!(
			references = requested.len(),
			partitions = partitions.len(),
			"module.restore.start"
		);

		let mut tasks = JoinSet::new();
		for (_, (registry, references)) in partitions {
			let cancel = cancel.child_token();
			tasks.spawn(async move { registry.restore_all(references, cancel).await });
		}

		let mut merged = RestoreResults::with_capacity(requested.len());
		while let Some(joined) = tasks.join_next().await {
			match joined {
				Ok(results) => merged.extend(results),
				Err(err) => match err.try_into_panic() {
					Ok(payload) => std::panic::resume_unwind(payload),
					Err(err) => tracing::error!(error = %err, "module.restore.partition_lost"),
				},
			}
		}

		let mut results = RestoreResults::with_capacity(requested.len());
		for reference in requested {
			let result = merged.remove(&reference).unwrap_or_else(|| {
				tracing::warn!(reference = %reference, "module.restore.missing_result");
				Err(RestoreFailure::new(
					RestoreFailureKind::Internal,
					"the registry did not report a result for this module",
				))
			});
			results.insert(reference, result);
		}
		if !merged.is_empty() {
			tracing::debug!(extra = merged.len(), "module.restore.unrequested_results");
		}

		let summary = RestoreSummary::new(results);
		tracing::info!(
			succeeded = summary.succeeded().count(),
			failed = summary.failed().count(),
			"module.restore.complete"
		);
		summary
	}

	fn resolve(&self, module: &ModuleDeclarationSyntax) -> Result<(&Arc<dyn ModuleRegistry>, ModuleReference), DiagnosticBuilder> {
		let parts = split_scheme(module.reference_text());
		let Some(registry) = self.registries.get(parts.scheme) else {
			tracing::trace!(scheme = parts.scheme, "module.validate.unsupported");
			return Err(catalog::modules_not_supported());
		};
		let reference = registry.try_parse_module_reference(parts.alias, parts.rest)?;
		Ok((registry, reference))
	}

	fn resolve_validated(&self, module: &ModuleDeclarationSyntax) -> (&Arc<dyn ModuleRegistry>, ModuleReference) {
		match self.resolve(module) {
			Ok(resolved) => resolved,
			Err(_) => panic!("{NOT_VALIDATED_MESSAGE}"),
		}
	}
}
