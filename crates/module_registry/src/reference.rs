//! Strongly typed module references.

use std::any::Any;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Scheme-specific parsed fields of a [`ModuleReference`].
///
/// Implemented once per registry backend. The payload only formats itself;
/// parsing and validation belong to the owning registry.
pub trait ReferencePayload: fmt::Debug + Send + Sync + 'static {
	/// Canonical reference text without the scheme prefix.
	fn unqualified_reference(&self) -> String;
}

/// Immutable, scheme-qualified identifier of one module.
///
/// Equality, hashing and ordering use the fully qualified reference only, so a
/// reference can key maps regardless of which payload type backs it.
#[derive(Clone)]
pub struct ModuleReference {
	scheme: Arc<str>,
	fully_qualified: Arc<str>,
	/// Byte offset of the unqualified part inside `fully_qualified`.
	unqualified_start: usize,
	payload: Arc<dyn ErasedPayload>,
}

/// Object-safe view of a payload that can still be downcast.
trait ErasedPayload: fmt::Debug + Send + Sync {
	fn as_any(&self) -> &dyn Any;
}

impl<P: ReferencePayload> ErasedPayload for P {
	fn as_any(&self) -> &dyn Any {
		self
	}
}

impl ModuleReference {
	/// Wraps a parsed payload under `scheme`.
	///
	/// The empty scheme belongs to local paths, which are written without a
	/// prefix; its fully qualified form is the bare unqualified text.
	pub fn new<P: ReferencePayload>(scheme: &str, payload: P) -> Self {
		let unqualified = payload.unqualified_reference();
		let (fully_qualified, unqualified_start) = if scheme.is_empty() {
			(unqualified, 0)
		} else {
			(format!("{scheme}:{unqualified}"), scheme.len() + 1)
		};

		Self {
			scheme: Arc::from(scheme),
			fully_qualified: Arc::from(fully_qualified),
			unqualified_start,
			payload: Arc::new(payload),
		}
	}

	/// Scheme of the registry that produced this reference.
	pub fn scheme(&self) -> &str {
		&self.scheme
	}

	/// Reference including the scheme prefix, e.g. `br:host/repo:tag`.
	pub fn fully_qualified_reference(&self) -> &str {
		&self.fully_qualified
	}

	/// Reference without the scheme prefix, e.g. `host/repo:tag`.
	pub fn unqualified_reference(&self) -> &str {
		&self.fully_qualified[self.unqualified_start..]
	}

	/// Returns the scheme-specific payload if it is of type `P`.
	pub fn payload<P: ReferencePayload>(&self) -> Option<&P> {
		self.payload.as_any().downcast_ref::<P>()
	}
}

impl fmt::Debug for ModuleReference {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ModuleReference")
			.field("reference", &self.fully_qualified)
			.field("payload", &self.payload)
			.finish()
	}
}

impl fmt::Display for ModuleReference {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.fully_qualified)
	}
}

impl PartialEq for ModuleReference {
	fn eq(&self, other: &Self) -> bool {
		self.fully_qualified == other.fully_qualified
	}
}

impl Eq for ModuleReference {}

impl Hash for ModuleReference {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.fully_qualified.hash(state);
	}
}

impl PartialOrd for ModuleReference {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for ModuleReference {
	fn cmp(&self, other: &Self) -> Ordering {
		self.fully_qualified.cmp(&other.fully_qualified)
	}
}
