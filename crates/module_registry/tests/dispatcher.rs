use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bramble_diagnostics::{DiagnosticBuilder, DiagnosticLevel, TextSpan};
use bramble_module_registry::{
	DefaultRegistryProvider, ModuleAvailability, ModuleDispatcher, ModuleReference, ModuleRegistry, NOT_VALIDATED_MESSAGE,
	ReferencePayload, RestoreFailure, RestoreFailureKind, RestoreOutcome, RestoreResults,
};
use bramble_module_syntax::ModuleDeclarationSyntax;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;
use url::Url;

#[derive(Debug)]
struct FakeReference(String);

impl ReferencePayload for FakeReference {
	fn unqualified_reference(&self) -> String {
		self.0.clone()
	}
}

/// In-memory registry.
///
/// References containing `bad` fail to parse, `fail` fail to restore,
/// `forget` get no result and `hang` block until cancelled.
struct FakeRegistry {
	scheme: &'static str,
	restored: Mutex<BTreeSet<String>>,
	batches: Mutex<Vec<Vec<String>>>,
}

impl FakeRegistry {
	fn new(scheme: &'static str) -> Arc<Self> {
		Arc::new(Self {
			scheme,
			restored: Mutex::new(BTreeSet::new()),
			batches: Mutex::new(Vec::new()),
		})
	}

	fn batches(&self) -> Vec<Vec<String>> {
		self.batches.lock().clone()
	}
}

#[async_trait]
impl ModuleRegistry for FakeRegistry {
	fn scheme(&self) -> &str {
		self.scheme
	}

	fn try_parse_module_reference(&self, alias: Option<&str>, reference: &str) -> Result<ModuleReference, DiagnosticBuilder> {
		if alias.is_some() || reference.contains("bad") {
			return Err(DiagnosticBuilder::error("FAKE001", format!("bad reference {reference}")));
		}
		Ok(ModuleReference::new(self.scheme, FakeReference(reference.to_string())))
	}

	fn is_available_locally(&self, reference: &ModuleReference) -> bool {
		self.restored.lock().contains(reference.unqualified_reference())
	}

	fn try_get_local_entry_point(&self, _parent: &Url, reference: &ModuleReference) -> Result<Url, DiagnosticBuilder> {
		if !self.is_available_locally(reference) {
			return Err(DiagnosticBuilder::error("FAKE002", "not restored"));
		}
		Url::parse(&format!("memory:///{}/{}", self.scheme, reference.unqualified_reference()))
			.map_err(|err| DiagnosticBuilder::error("FAKE003", err.to_string()))
	}

	async fn restore_all(&self, references: Vec<ModuleReference>, cancel: CancellationToken) -> RestoreResults {
		let mut names: Vec<String> = references.iter().map(|r| r.unqualified_reference().to_string()).collect();
		names.sort();
		self.batches.lock().push(names);

		let mut results = RestoreResults::new();
		for reference in references {
			let name = reference.unqualified_reference().to_string();
			let result = if name.contains("fail") {
				Err(RestoreFailure::new(RestoreFailureKind::NotFound, format!("{name} not found")))
			} else if name.contains("forget") {
				continue;
			} else if name.contains("hang") {
				tokio::select! {
					() = cancel.cancelled() => Err(RestoreFailure::cancelled()),
					() = tokio::time::sleep(Duration::from_secs(60)) => Ok(RestoreOutcome::Restored),
				}
			} else if self.restored.lock().contains(&name) {
				Ok(RestoreOutcome::AlreadyAvailable)
			} else {
				self.restored.lock().insert(name);
				Ok(RestoreOutcome::Restored)
			};
			results.insert(reference, result);
		}
		results
	}
}

fn module(reference: &str) -> ModuleDeclarationSyntax {
	let span = TextSpan::new(7, reference.len() + 2);
	ModuleDeclarationSyntax::new("test", reference, span, span)
}

fn dispatcher(registries: &[Arc<FakeRegistry>]) -> ModuleDispatcher {
	let registries = registries.iter().map(|r| Arc::clone(r) as Arc<dyn ModuleRegistry>).collect();
	ModuleDispatcher::new(&DefaultRegistryProvider::new(registries).unwrap())
}

fn parent() -> Url {
	Url::parse("file:///work/main.bicep").unwrap()
}

#[test]
fn no_registries_means_no_schemes() {
	let dispatcher = ModuleDispatcher::new(&DefaultRegistryProvider::empty());
	assert_eq!(dispatcher.available_schemes().count(), 0);
}

#[test]
fn no_registries_rejects_every_reference_with_bcp189() {
	let dispatcher = ModuleDispatcher::new(&DefaultRegistryProvider::empty());
	for reference in ["fakeScheme:fakeModule", "./local.bicep", "br:host/repo:1.0", ""] {
		let err = dispatcher.validate_module_reference(&module(reference)).unwrap_err();
		assert_eq!(err.code(), "BCP189");
		assert_eq!(err.level(), DiagnosticLevel::Error);
		assert_eq!(err.message(), "Module references are not supported in this context.");
	}
}

#[test]
#[should_panic(expected = "The specified module is not valid. Call ValidateModuleReference() first.")]
fn availability_requires_validation() {
	let dispatcher = ModuleDispatcher::new(&DefaultRegistryProvider::empty());
	dispatcher.is_module_available(&module("fakeScheme:fakeModule"));
}

#[test]
#[should_panic(expected = "The specified module is not valid. Call ValidateModuleReference() first.")]
fn entry_point_requires_validation() {
	let dispatcher = ModuleDispatcher::new(&DefaultRegistryProvider::empty());
	let _ = dispatcher.try_get_local_module_entry_point(&parent(), &module("fakeScheme:fakeModule"));
}

#[tokio::test]
#[should_panic(expected = "The specified module is not valid. Call ValidateModuleReference() first.")]
async fn restore_requires_validation() {
	let dispatcher = ModuleDispatcher::new(&DefaultRegistryProvider::empty());
	let declaration = module("fakeScheme:fakeModule");
	assert!(dispatcher.validate_module_reference(&declaration).is_err());
	dispatcher.restore_modules([&declaration], &CancellationToken::new()).await;
}

#[test]
fn panic_message_is_stable() {
	assert_eq!(
		NOT_VALIDATED_MESSAGE,
		"The specified module is not valid. Call ValidateModuleReference() first."
	);
}

#[test]
fn available_schemes_match_registries() {
	let dispatcher = dispatcher(&[FakeRegistry::new("first"), FakeRegistry::new("second")]);
	let schemes: BTreeSet<&str> = dispatcher.available_schemes().collect();
	assert_eq!(schemes, BTreeSet::from(["first", "second"]));
}

#[test]
fn unknown_scheme_is_bcp189_however_malformed() {
	let dispatcher = dispatcher(&[FakeRegistry::new("first"), FakeRegistry::new("second")]);
	for reference in ["third:anything", "third:bad bad bad", "Third:x"] {
		let err = dispatcher.validate_module_reference(&module(reference)).unwrap_err();
		assert_eq!(err.code(), "BCP189");
	}
}

#[test]
fn known_scheme_surfaces_registry_diagnostic() {
	let dispatcher = dispatcher(&[FakeRegistry::new("first")]);
	let err = dispatcher.validate_module_reference(&module("first:bad")).unwrap_err();
	assert_eq!(err.code(), "FAKE001");

	let err = dispatcher.validate_module_reference(&module("first/alias:x")).unwrap_err();
	assert_eq!(err.code(), "FAKE001");
}

#[test]
fn validation_is_idempotent() {
	let dispatcher = dispatcher(&[FakeRegistry::new("first")]);
	let declaration = module("first:mod-a");
	let a = dispatcher.validate_module_reference(&declaration).unwrap();
	let b = dispatcher.validate_module_reference(&declaration).unwrap();
	assert_eq!(a, b);
	assert_eq!(a.fully_qualified_reference(), "first:mod-a");
	assert_eq!(a.unqualified_reference(), "mod-a");
	assert_eq!(a.scheme(), "first");
}

#[test]
fn delegates_availability_and_entry_point() {
	let first = FakeRegistry::new("first");
	let dispatcher = dispatcher(&[Arc::clone(&first)]);
	let declaration = module("first:mod-a");

	match dispatcher.is_module_available(&declaration) {
		ModuleAvailability::RestoreRequired(diagnostic) => assert_eq!(diagnostic.code(), "BCP190"),
		ModuleAvailability::Available => panic!("module should not be available yet"),
	}
	assert_eq!(
		dispatcher.try_get_local_module_entry_point(&parent(), &declaration).unwrap_err().code(),
		"FAKE002"
	);

	first.restored.lock().insert("mod-a".to_string());
	assert!(dispatcher.is_module_available(&declaration).is_available());
	assert_eq!(
		dispatcher.try_get_local_module_entry_point(&parent(), &declaration).unwrap().as_str(),
		"memory:///first/mod-a"
	);
}

#[tokio::test]
async fn restore_partitions_by_scheme_and_dedupes() {
	let first = FakeRegistry::new("first");
	let second = FakeRegistry::new("second");
	let dispatcher = dispatcher(&[Arc::clone(&first), Arc::clone(&second)]);
	let modules = [module("first:a"), module("second:b"), module("first:c"), module("first:a")];

	let summary = dispatcher.restore_modules(&modules, &CancellationToken::new()).await;

	assert_eq!(summary.len(), 3);
	assert!(summary.is_success());
	assert_eq!(first.batches(), vec![vec!["a".to_string(), "c".to_string()]]);
	assert_eq!(second.batches(), vec![vec!["b".to_string()]]);

	let again = dispatcher.restore_modules(&modules, &CancellationToken::new()).await;
	assert!(again.succeeded().all(|(_, outcome)| outcome == RestoreOutcome::AlreadyAvailable));
}

#[tokio::test]
async fn one_failure_does_not_affect_the_rest() {
	let first = FakeRegistry::new("first");
	let second = FakeRegistry::new("second");
	let dispatcher = dispatcher(&[first, second]);
	let modules = [
		module("first:fail-1"),
		module("first:ok-1"),
		module("first:ok-2"),
		module("second:ok-3"),
	];

	let summary = dispatcher.restore_modules(&modules, &CancellationToken::new()).await;

	assert_eq!(summary.len(), 4);
	assert_eq!(summary.succeeded().count(), 3);
	let failed: Vec<_> = summary.failed().collect();
	assert_eq!(failed.len(), 1);
	assert_eq!(failed[0].0.fully_qualified_reference(), "first:fail-1");
	assert_eq!(failed[0].1.kind(), RestoreFailureKind::NotFound);

	let diagnostic = summary.failure_diagnostic(failed[0].0).unwrap();
	assert_eq!(diagnostic.code(), "BCP192");
	assert!(diagnostic.message().contains("first:fail-1"));
}

#[tokio::test]
async fn unreported_references_become_internal_failures() {
	let dispatcher = dispatcher(&[FakeRegistry::new("first")]);
	let modules = [module("first:forget-me"), module("first:kept")];

	let summary = dispatcher.restore_modules(&modules, &CancellationToken::new()).await;

	assert_eq!(summary.len(), 2);
	let forgotten = dispatcher.validate_module_reference(&modules[0]).unwrap();
	assert_eq!(
		summary.get(&forgotten).unwrap().as_ref().unwrap_err().kind(),
		RestoreFailureKind::Internal
	);
}

#[tokio::test]
async fn cancellation_stops_hanging_fetches() {
	let dispatcher = dispatcher(&[FakeRegistry::new("first"), FakeRegistry::new("second")]);
	let modules = [module("first:ok"), module("second:hang")];
	let cancel = CancellationToken::new();
	let trigger = cancel.clone();
	tokio::spawn(async move {
		tokio::time::sleep(Duration::from_millis(20)).await;
		trigger.cancel();
	});

	let summary = tokio::time::timeout(Duration::from_secs(10), dispatcher.restore_modules(&modules, &cancel))
		.await
		.unwrap();

	let ok = dispatcher.validate_module_reference(&modules[0]).unwrap();
	let hung = dispatcher.validate_module_reference(&modules[1]).unwrap();
	assert_eq!(summary.get(&ok), Some(&Ok(RestoreOutcome::Restored)));
	assert_eq!(
		summary.get(&hung).unwrap().as_ref().unwrap_err().kind(),
		RestoreFailureKind::Cancelled
	);
}

#[tokio::test]
#[should_panic(expected = "The specified module is not valid. Call ValidateModuleReference() first.")]
async fn restore_checks_every_module_before_fetching() {
	let first = FakeRegistry::new("first");
	let dispatcher = dispatcher(&[Arc::clone(&first)]);
	let modules = [module("first:ok"), module("first:bad")];
	dispatcher.restore_modules(&modules, &CancellationToken::new()).await;
}

#[test]
#[should_panic(expected = "duplicate module registry scheme")]
fn dispatcher_rejects_duplicate_schemes_from_custom_providers() {
	struct Duplicates(Vec<Arc<dyn ModuleRegistry>>);

	impl bramble_module_registry::RegistryProvider for Duplicates {
		fn registries(&self) -> &[Arc<dyn ModuleRegistry>] {
			&self.0
		}
	}

	let a: Arc<dyn ModuleRegistry> = FakeRegistry::new("first");
	let b: Arc<dyn ModuleRegistry> = FakeRegistry::new("first");
	let provider = Duplicates(vec![a, b]);
	ModuleDispatcher::new(&provider);
}
