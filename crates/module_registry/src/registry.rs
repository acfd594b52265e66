use async_trait::async_trait;
use bramble_diagnostics::DiagnosticBuilder;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{ModuleReference, RestoreResults};

/// A module backend owning one reference scheme.
///
/// Implementations must be cheap to query from many threads: everything except
/// [`restore_all`](Self::restore_all) is expected to answer from local state.
#[async_trait]
pub trait ModuleRegistry: Send + Sync {
	/// Scheme prefix this registry owns (`br`, `ts`, or empty for local paths).
	fn scheme(&self) -> &str;

	/// Parses and validates the part of a reference after the scheme token.
	///
	/// `alias` is set for references written as `<scheme>/<alias>:<rest>`.
	///
	/// # Errors
	///
	/// Returns the registry's own diagnostic describing the first defect found.
	fn try_parse_module_reference(&self, alias: Option<&str>, reference: &str) -> Result<ModuleReference, DiagnosticBuilder>;

	/// Returns `true` when the module's content is already stored locally.
	fn is_available_locally(&self, reference: &ModuleReference) -> bool;

	/// Resolves the local location of the module's entry point.
	///
	/// `parent` is the location of the file declaring the module and anchors
	/// relative references.
	///
	/// # Errors
	///
	/// Fails when the module is not available locally or cannot be resolved.
	fn try_get_local_entry_point(&self, parent: &Url, reference: &ModuleReference) -> Result<Url, DiagnosticBuilder>;

	/// Fetches every reference into local storage.
	///
	/// The returned map holds exactly one entry per input reference. A failure
	/// of one reference never prevents the others from being attempted.
	async fn restore_all(&self, references: Vec<ModuleReference>, cancel: CancellationToken) -> RestoreResults;
}
