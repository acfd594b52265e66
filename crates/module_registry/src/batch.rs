//! Bounded, cancellable fan-out of per-reference fetches.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::restore::{RestoreFailure, RestoreFailureKind, RestoreOutcome, RestoreResult, RestoreResults};
use crate::ModuleReference;

/// Per-registry fetch limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchSettings {
	timeout: Duration,
	max_concurrency: usize,
}

impl FetchSettings {
	/// Creates settings; a concurrency of zero is treated as one.
	pub fn new(timeout: Duration, max_concurrency: usize) -> Self {
		Self {
			timeout,
			max_concurrency: max_concurrency.max(1),
		}
	}

	pub const fn timeout(&self) -> Duration {
		self.timeout
	}

	pub const fn max_concurrency(&self) -> usize {
		self.max_concurrency
	}
}

impl Default for FetchSettings {
	fn default() -> Self {
		Self::new(Duration::from_secs(60), 4)
	}
}

/// Restores each distinct reference, producing exactly one result per reference.
///
/// References for which `is_available` holds are reported as
/// [`RestoreOutcome::AlreadyAvailable`] without fetching. The rest run
/// concurrently (bounded by `settings`), each raced against `cancel` and the
/// configured timeout. Fetches that have not finished when `cancel` fires
/// report [`RestoreFailureKind::Cancelled`]; finished ones keep their result.
///
/// A panicking fetch is re-raised on the caller.
pub(crate) async fn restore_each<A, F, Fut>(
	references: Vec<ModuleReference>,
	cancel: CancellationToken,
	settings: FetchSettings,
	is_available: A,
	fetch: F,
) -> RestoreResults
where
	A: Fn(&ModuleReference) -> bool,
	F: Fn(ModuleReference) -> Fut,
	Fut: Future<Output = Result<(), RestoreFailure>> + Send + 'static,
{
	let mut results = RestoreResults::with_capacity(references.len());
	let mut pending = HashSet::new();
	let semaphore = Arc::new(Semaphore::new(settings.max_concurrency));
	let mut tasks = JoinSet::new();

	for reference in references {
		if results.contains_key(&reference) || pending.contains(&reference) {
			continue;
		}
		if is_available(&reference) {
			results.insert(reference, Ok(RestoreOutcome::AlreadyAvailable));
			continue;
		}

		let fetch = fetch(reference.clone());
		let semaphore = Arc::clone(&semaphore);
		let cancel = cancel.clone();
		let timeout = settings.timeout;
		pending.insert(reference.clone());

		tasks.spawn(async move {
			let result = tokio::select! {
				biased;
				() = cancel.cancelled() => Err(RestoreFailure::cancelled()),
				result = run_fetch(semaphore, timeout, fetch) => result,
			};
			(reference, result)
		});
	}

	while let Some(joined) = tasks.join_next().await {
		match joined {
			Ok((reference, result)) => {
				match &result {
					Ok(outcome) => tracing::debug!(reference = %reference, ?outcome, "module.restore.reference"),
					Err(failure) => tracing::warn!(
						reference = %reference,
						kind = %failure.kind(),
						error = %failure,
						"module.restore.reference_failed"
					),
				}
				pending.remove(&reference);
				results.insert(reference, result);
			}
			Err(err) => match err.try_into_panic() {
				Ok(payload) => std::panic::resume_unwind(payload),
				Err(err) => tracing::error!(error = %err, "module.restore.task_lost"),
			},
		}
	}

	for reference in pending {
		results.insert(
			reference,
			Err(RestoreFailure::new(RestoreFailureKind::Internal, "the restore task did not complete")),
		);
	}

	results
}

async fn run_fetch<Fut>(semaphore: Arc<Semaphore>, timeout: Duration, fetch: Fut) -> RestoreResult
where
	Fut: Future<Output = Result<(), RestoreFailure>>,
{
	let Ok(_permit) = semaphore.acquire_owned().await else {
		return Err(RestoreFailure::cancelled());
	};

	match tokio::time::timeout(timeout, fetch).await {
		Ok(Ok(())) => Ok(RestoreOutcome::Restored),
		Ok(Err(failure)) => Err(failure),
		Err(_) => Err(RestoreFailure::new(
			RestoreFailureKind::Timeout,
			format!("the fetch did not complete within {}s", timeout.as_secs()),
		)),
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};

	use pretty_assertions::assert_eq;

	use super::*;
	use crate::ReferencePayload;

	#[derive(Debug)]
	struct Key(String);

	impl ReferencePayload for Key {
		fn unqualified_reference(&self) -> String {
			self.0.clone()
		}
	}

	fn reference(name: &str) -> ModuleReference {
		ModuleReference::new("test", Key(name.to_string()))
	}

	#[tokio::test]
	async fn every_reference_gets_one_result() {
		let refs = vec![reference("ok"), reference("missing"), reference("ok"), reference("local")];
		let results = restore_each(
			refs,
			CancellationToken::new(),
			FetchSettings::default(),
			|r| r.unqualified_reference() == "local",
			|r| async move {
				if r.unqualified_reference() == "missing" {
					Err(RestoreFailure::new(RestoreFailureKind::NotFound, "gone"))
				} else {
					Ok(())
				}
			},
		)
		.await;

		assert_eq!(results.len(), 3);
		assert_eq!(results[&reference("ok")], Ok(RestoreOutcome::Restored));
		assert_eq!(results[&reference("local")], Ok(RestoreOutcome::AlreadyAvailable));
		assert_eq!(
			results[&reference("missing")].as_ref().unwrap_err().kind(),
			RestoreFailureKind::NotFound
		);
	}

	#[tokio::test]
	async fn concurrency_is_bounded() {
		let active = Arc::new(AtomicUsize::new(0));
		let peak = Arc::new(AtomicUsize::new(0));
		let refs = (0..8).map(|i| reference(&i.to_string())).collect();

		let results = restore_each(
			refs,
			CancellationToken::new(),
			FetchSettings::new(Duration::from_secs(5), 2),
			|_| false,
			|_| {
				let active = Arc::clone(&active);
				let peak = Arc::clone(&peak);
				async move {
					let now = active.fetch_add(1, Ordering::SeqCst) + 1;
					peak.fetch_max(now, Ordering::SeqCst);
					tokio::time::sleep(Duration::from_millis(10)).await;
					active.fetch_sub(1, Ordering::SeqCst);
					Ok(())
				}
			},
		)
		.await;

		assert_eq!(results.len(), 8);
		assert!(peak.load(Ordering::SeqCst) <= 2);
	}

	#[tokio::test]
	async fn slow_fetch_times_out() {
		let results = restore_each(
			vec![reference("slow")],
			CancellationToken::new(),
			FetchSettings::new(Duration::from_millis(20), 1),
			|_| false,
			|_| async {
				tokio::time::sleep(Duration::from_secs(30)).await;
				Ok(())
			},
		)
		.await;

		assert_eq!(
			results[&reference("slow")].as_ref().unwrap_err().kind(),
			RestoreFailureKind::Timeout
		);
	}

	#[tokio::test]
	async fn cancellation_reports_unfinished_references() {
		let cancel = CancellationToken::new();
		let trigger = cancel.clone();
		let refs = vec![reference("fast"), reference("slow")];

		let results = restore_each(
			refs,
			cancel,
			FetchSettings::default(),
			|_| false,
			move |r| {
				let trigger = trigger.clone();
				async move {
					if r.unqualified_reference() == "fast" {
						trigger.cancel();
						return Ok(());
					}
					tokio::time::sleep(Duration::from_secs(30)).await;
					Ok(())
				}
			},
		)
		.await;

		assert_eq!(results.len(), 2);
		assert_eq!(
			results[&reference("slow")].as_ref().unwrap_err().kind(),
			RestoreFailureKind::Cancelled
		);
	}

	#[tokio::test]
	async fn already_cancelled_batch_fetches_nothing() {
		let cancel = CancellationToken::new();
		cancel.cancel();
		let calls = Arc::new(AtomicUsize::new(0));

		let results = restore_each(
			vec![reference("a"), reference("b")],
			cancel,
			FetchSettings::default(),
			|_| false,
			|_| {
				let calls = Arc::clone(&calls);
				async move {
					calls.fetch_add(1, Ordering::SeqCst);
					Ok(())
				}
			},
		)
		.await;

		assert_eq!(calls.load(Ordering::SeqCst), 0);
		assert!(results.values().all(|r| r.as_ref().unwrap_err().kind() == RestoreFailureKind::Cancelled));
	}
}
