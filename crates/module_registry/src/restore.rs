//! Per-reference restore results.

use std::collections::HashMap;
use std::fmt;

use bramble_diagnostics::{DiagnosticBuilder, catalog};
use thiserror::Error;

use crate::ModuleReference;

/// Successful terminal state of one reference in a restore batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
	/// Content was fetched and stored locally.
	Restored,
	/// Content was already local; nothing was fetched.
	AlreadyAvailable,
}

/// Why a reference could not be restored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RestoreFailureKind {
	NotFound,
	Unauthorized,
	Transport,
	Timeout,
	Cancelled,
	/// Fetched content failed verification (digest mismatch, malformed payload).
	InvalidContent,
	/// Writing to the local module cache failed.
	Storage,
	/// The registry did not produce a result for the reference.
	Internal,
}

impl RestoreFailureKind {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::NotFound => "not_found",
			Self::Unauthorized => "unauthorized",
			Self::Transport => "transport",
			Self::Timeout => "timeout",
			Self::Cancelled => "cancelled",
			Self::InvalidContent => "invalid_content",
			Self::Storage => "storage",
			Self::Internal => "internal",
		}
	}
}

impl fmt::Display for RestoreFailureKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Failed terminal state of one reference in a restore batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RestoreFailure {
	kind: RestoreFailureKind,
	message: String,
}

impl RestoreFailure {
	pub fn new(kind: RestoreFailureKind, message: impl Into<String>) -> Self {
		Self {
			kind,
			message: message.into(),
		}
	}

	pub fn cancelled() -> Self {
		Self::new(RestoreFailureKind::Cancelled, "the restore was cancelled")
	}

	pub const fn kind(&self) -> RestoreFailureKind {
		self.kind
	}

	pub fn message(&self) -> &str {
		&self.message
	}
}

/// Terminal result of restoring one reference.
pub type RestoreResult = Result<RestoreOutcome, RestoreFailure>;

/// Results of one registry's `restore_all`, keyed by reference.
pub type RestoreResults = HashMap<ModuleReference, RestoreResult>;

/// Aggregate result of a dispatcher-level restore across all registries.
#[derive(Debug, Clone, Default)]
pub struct RestoreSummary {
	results: RestoreResults,
}

impl RestoreSummary {
	pub(crate) fn new(results: RestoreResults) -> Self {
		Self { results }
	}

	/// Number of distinct references in the batch.
	pub fn len(&self) -> usize {
		self.results.len()
	}

	pub fn is_empty(&self) -> bool {
		self.results.is_empty()
	}

	/// Returns `true` when every reference restored or was already available.
	pub fn is_success(&self) -> bool {
		self.results.values().all(Result::is_ok)
	}

	pub fn get(&self, reference: &ModuleReference) -> Option<&RestoreResult> {
		self.results.get(reference)
	}

	pub fn iter(&self) -> impl Iterator<Item = (&ModuleReference, &RestoreResult)> {
		self.results.iter()
	}

	pub fn succeeded(&self) -> impl Iterator<Item = (&ModuleReference, RestoreOutcome)> {
		self.results
			.iter()
			.filter_map(|(reference, result)| result.as_ref().ok().map(|outcome| (reference, *outcome)))
	}

	pub fn failed(&self) -> impl Iterator<Item = (&ModuleReference, &RestoreFailure)> {
		self.results
			.iter()
			.filter_map(|(reference, result)| result.as_ref().err().map(|failure| (reference, failure)))
	}

	/// Diagnostic describing why `reference` failed to restore, if it did.
	pub fn failure_diagnostic(&self, reference: &ModuleReference) -> Option<DiagnosticBuilder> {
		let failure = self.results.get(reference)?.as_ref().err()?;
		Some(catalog::module_restore_failed(reference.fully_qualified_reference(), failure.message()))
	}

	pub fn into_results(self) -> RestoreResults {
		self.results
	}
}
