//! Built-in registry backends.

pub mod local;
pub mod oci;
pub mod template_spec;

pub use local::{LOCAL_SCHEME, LocalModuleReference, LocalModuleRegistry};
pub use oci::{ArtifactVersion, OCI_SCHEME, OciArtifactReference, OciModuleRegistry};
pub use template_spec::{TEMPLATE_SPEC_SCHEME, TemplateSpecModuleReference, TemplateSpecModuleRegistry};
