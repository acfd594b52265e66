//! Template spec registry backend (`ts:`).
//!
//! References name one version of a template spec resource:
//! `ts:<subscription-id>/<resource-group>/<name>:<version>`, or
//! `ts/<alias>:<name>:<version>` when the alias pins the subscription and
//! resource group.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bramble_diagnostics::{DiagnosticBuilder, catalog};
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

use crate::batch::{FetchSettings, restore_each};
use crate::cache::{ENTRY_POINT_FILE, ModuleCache};
use crate::config::TemplateSpecAlias;
use crate::restore::{RestoreFailure, RestoreFailureKind, RestoreResults};
use crate::source::ContentSource;
use crate::{ModuleReference, ModuleRegistry, ReferencePayload};

pub const TEMPLATE_SPEC_SCHEME: &str = "ts";

const MAX_NAME_LENGTH: usize = 90;

/// Key of the deployable template inside a template spec version document.
const MAIN_TEMPLATE_KEY: &str = "mainTemplate";

fn is_name_char(c: char) -> bool {
	c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '(' | ')')
}

/// Resource group, template spec and version names.
///
/// Each becomes one cache directory, so a trailing `.` (and with it `.` and
/// `..`) is rejected.
fn is_valid_name(value: &str) -> bool {
	!value.is_empty()
		&& !value.ends_with('.')
		&& value.chars().count() <= MAX_NAME_LENGTH
		&& value.chars().all(is_name_char)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSpecModuleReference {
	subscription_id: Uuid,
	resource_group: String,
	name: String,
	version: String,
}

impl TemplateSpecModuleReference {
	/// Parses `<subscription-id>/<resource-group>/<name>:<version>`.
	///
	/// # Errors
	///
	/// Returns the diagnostic of the first defect found; `display` is quoted
	/// in messages.
	pub fn parse(raw: &str, display: &str) -> Result<Self, DiagnosticBuilder> {
		let segments: Vec<&str> = raw.split('/').collect();
		let [subscription, resource_group, name_and_version] = segments.as_slice() else {
			return Err(catalog::invalid_template_spec_reference(display));
		};
		let Some((name, version)) = name_and_version.split_once(':') else {
			return Err(catalog::invalid_template_spec_reference(display));
		};

		let Ok(subscription_id) = Uuid::parse_str(subscription) else {
			return Err(catalog::invalid_template_spec_subscription(display, subscription));
		};
		if !is_valid_name(resource_group) {
			return Err(catalog::invalid_template_spec_resource_group(display, resource_group));
		}
		if !is_valid_name(name) {
			return Err(catalog::invalid_template_spec_name(display, name));
		}
		if !is_valid_name(version) {
			return Err(catalog::invalid_template_spec_version(display, version));
		}

		Ok(Self {
			subscription_id,
			resource_group: (*resource_group).to_string(),
			name: name.to_string(),
			version: version.to_string(),
		})
	}

	pub const fn subscription_id(&self) -> Uuid {
		self.subscription_id
	}

	pub fn resource_group(&self) -> &str {
		&self.resource_group
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn version(&self) -> &str {
		&self.version
	}

	/// ARM resource id of the template spec version.
	pub fn resource_id(&self) -> String {
		format!(
			"/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Resources/templateSpecs/{}/versions/{}",
			self.subscription_id, self.resource_group, self.name, self.version
		)
	}

	fn locator(&self) -> PathBuf {
		[
			self.subscription_id.to_string().as_str(),
			self.resource_group.as_str(),
			self.name.as_str(),
			self.version.as_str(),
			ENTRY_POINT_FILE,
		]
		.iter()
		.collect()
	}

	fn cache_path(&self) -> PathBuf {
		PathBuf::from(TEMPLATE_SPEC_SCHEME).join(self.locator())
	}
}

impl ReferencePayload for TemplateSpecModuleReference {
	fn unqualified_reference(&self) -> String {
		format!(
			"{}/{}/{}:{}",
			self.subscription_id, self.resource_group, self.name, self.version
		)
	}
}

/// Registry for template spec versions, fetched through a [`ContentSource`].
pub struct TemplateSpecModuleRegistry {
	cache: ModuleCache,
	source: Arc<dyn ContentSource>,
	settings: FetchSettings,
	aliases: BTreeMap<String, TemplateSpecAlias>,
}

impl TemplateSpecModuleRegistry {
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
	pub fn with_aliases(mut self, aliases: BTreeMap<String, TemplateSpecAlias>) -> Self {
		self.aliases = aliases;
		self
	}

	fn expand_alias(&self, alias: &str, reference: &str) -> Result<String, DiagnosticBuilder> {
		let Some(target) = self.aliases.get(alias) else {
			return Err(catalog::unknown_module_alias(alias, TEMPLATE_SPEC_SCHEME));
		};
		Ok(match &target.resource_group {
			Some(resource_group) => format!("{}/{resource_group}/{reference}", target.subscription),
			None => format!("{}/{reference}", target.subscription),
		})
	}
}

async fn fetch_template_spec(
	source: Arc<dyn ContentSource>,
	cache: ModuleCache,
	reference: ModuleReference,
) -> Result<(), RestoreFailure> {
	let Some(spec) = reference.payload::<TemplateSpecModuleReference>() else {
		return Err(RestoreFailure::new(
			RestoreFailureKind::Internal,
			format!("\"{reference}\" is not a template spec reference"),
		));
	};

	let bytes = source.fetch(&spec.locator()).await?;
	let document: serde_json::Value = serde_json::from_slice(&bytes).map_err(|err| {
		RestoreFailure::new(
			RestoreFailureKind::InvalidContent,
			format!("the template spec version is not valid JSON: {err}"),
		)
	})?;
	let Some(template) = document.get(MAIN_TEMPLATE_KEY).filter(|t| t.is_object()) else {
		return Err(RestoreFailure::new(
			RestoreFailureKind::InvalidContent,
			format!("the template spec version {} has no {MAIN_TEMPLATE_KEY} object", spec.resource_id()),
		));
	};

	let content = serde_json::to_vec_pretty(template)
		.map_err(|err| RestoreFailure::new(RestoreFailureKind::InvalidContent, err.to_string()))?;
	cache
		.store(&spec.cache_path(), &content)
		.await
		.map_err(|err| RestoreFailure::new(RestoreFailureKind::Storage, format!("failed to cache the template spec: {err}")))?;
	Ok(())
}

#[async_trait]
impl ModuleRegistry for TemplateSpecModuleRegistry {
	fn scheme(&self) -> &str {
		TEMPLATE_SPEC_SCHEME
	}

	fn try_parse_module_reference(&self, alias: Option<&str>, reference: &str) -> Result<ModuleReference, DiagnosticBuilder> {
		let display = match alias {
			Some(alias) => format!("{TEMPLATE_SPEC_SCHEME}/{alias}:{reference}"),
			None => format!("{TEMPLATE_SPEC_SCHEME}:{reference}"),
		};
		let raw = match alias {
			Some(alias) => self.expand_alias(alias, reference)?,
			None => reference.to_string(),
		};
		let spec = TemplateSpecModuleReference::parse(&raw, &display)?;
		Ok(ModuleReference::new(TEMPLATE_SPEC_SCHEME, spec))
	}

	fn is_available_locally(&self, reference: &ModuleReference) -> bool {
		reference
			.payload::<TemplateSpecModuleReference>()
			.is_some_and(|spec| self.cache.contains(&spec.cache_path()))
	}

	fn try_get_local_entry_point(&self, _parent: &Url, reference: &ModuleReference) -> Result<Url, DiagnosticBuilder> {
		let fully_qualified = reference.fully_qualified_reference();
		let Some(spec) = reference.payload::<TemplateSpecModuleReference>() else {
			return Err(catalog::invalid_template_spec_reference(fully_qualified));
		};
		if !self.is_available_locally(reference) {
			return Err(catalog::module_requires_restore(fully_qualified));
		}
		let path = self.cache.path(&spec.cache_path());
		Url::from_file_path(&path).map_err(|()| catalog::path_not_resolvable(&path.display().to_string(), fully_qualified))
	}

	async fn restore_all(&self, references: Vec<ModuleReference>, cancel: CancellationToken) -> RestoreResults {
		tracing::debug!(count = references.len(), "module.restore.template_spec");
		restore_each(
			references,
			cancel,
			self.settings,
			|reference| self.is_available_locally(reference),
			|reference| fetch_template_spec(Arc::clone(&self.source), self.cache.clone(), reference),
		)
		.await
	}
}
