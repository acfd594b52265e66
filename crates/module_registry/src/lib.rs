//! Module reference resolution and restore.
//!
//! A [`ModuleDispatcher`] routes `module` declarations to the
//! [`ModuleRegistry`] owning their scheme (`br:` OCI artifacts, `ts:` template
//! specs, bare relative paths for local files). Validation turns raw text into
//! a [`ModuleReference`] or a diagnostic; restore fetches remote content into
//! the local [`ModuleCache`] and reports one result per reference.
//!
//! ```no_run
//! # async fn run(file: &bramble_module_syntax::SourceFile) -> Result<(), bramble_module_registry::ProviderError> {
//! use bramble_module_registry::{DefaultRegistryProvider, ModuleDispatcher, RegistryConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let provider = DefaultRegistryProvider::from_config(&RegistryConfig::default())?;
//! let dispatcher = ModuleDispatcher::new(&provider);
//! let valid: Vec<_> = file
//! 	.declarations()
//! 	.iter()
//! 	.filter(|m| dispatcher.validate_module_reference(m).is_ok())
//! 	.collect();
//! let summary = dispatcher.restore_modules(valid, &CancellationToken::new()).await;
//! assert!(summary.is_success());
//! # Ok(())
//! # }
//! ```

pub mod backends;
mod batch;
pub mod cache;
pub mod config;
mod dispatcher;
mod provider;
mod reference;
mod registry;
mod restore;
pub mod source;

pub use batch::FetchSettings;
pub use cache::ModuleCache;
pub use config::{ConfigError, RegistryConfig};
pub use dispatcher::{ModuleAvailability, ModuleDispatcher, NOT_VALIDATED_MESSAGE};
pub use provider::{DefaultRegistryProvider, ProviderError, RegistryProvider};
pub use reference::{ModuleReference, ReferencePayload};
pub use registry::ModuleRegistry;
pub use restore::{RestoreFailure, RestoreFailureKind, RestoreOutcome, RestoreResult, RestoreResults, RestoreSummary};
pub use source::{ContentSource, FetchError, MirrorSource};
