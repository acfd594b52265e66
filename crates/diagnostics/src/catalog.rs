//! Stable diagnostic codes of the module resolution layer.
//!
//! Codes and message texts are part of the public contract: tooling matches on
//! them, so existing entries must not change.

use crate::DiagnosticBuilder;

/// Characters rejected anywhere in a local module path.
pub const FORBIDDEN_PATH_CHARS: &[char] = &['\\', ':', '*', '?', '"', '<', '>', '|'];

/// Characters rejected as the last character of a local module path.
pub const FORBIDDEN_PATH_TERMINATORS: &[char] = &['.', ' ', '/'];

/// Maximum length of an OCI tag.
pub const MAX_TAG_LENGTH: usize = 128;

/// Maximum length of an OCI registry host or repository path.
pub const MAX_REGISTRY_LENGTH: usize = 255;
pub const MAX_REPOSITORY_LENGTH: usize = 255;

fn join_chars(chars: &[char]) -> String {
	chars.iter().map(|c| format!("\"{c}\"")).collect::<Vec<_>>().join(", ")
}

fn invalid_oci(reference: &str, clause: &str) -> String {
	format!("The specified OCI artifact reference \"{reference}\" is not valid. {clause}")
}

fn invalid_template_spec(reference: &str, clause: &str) -> String {
	format!("The specified template spec reference \"{reference}\" is not valid. {clause}")
}

pub fn invalid_path_characters() -> DiagnosticBuilder {
	DiagnosticBuilder::error(
		"BCP085",
		format!(
			"The specified file path contains one or more invalid path characters. The following are not permitted: {}.",
			join_chars(FORBIDDEN_PATH_CHARS)
		),
	)
}

pub fn invalid_path_terminator() -> DiagnosticBuilder {
	DiagnosticBuilder::error(
		"BCP086",
		format!(
			"The specified file path ends with an invalid character. The following are not permitted: {}.",
			join_chars(FORBIDDEN_PATH_TERMINATORS)
		),
	)
}

pub fn empty_path() -> DiagnosticBuilder {
	DiagnosticBuilder::error("BCP087", "The specified file path is empty.")
}

pub fn path_must_be_relative(path: &str) -> DiagnosticBuilder {
	DiagnosticBuilder::error("BCP088", format!("The specified file path \"{path}\" must be relative."))
}

pub fn path_not_resolvable(path: &str, parent: &str) -> DiagnosticBuilder {
	DiagnosticBuilder::error(
		"BCP093",
		format!("File path \"{path}\" could not be resolved relative to \"{parent}\"."),
	)
}

/// Emitted when no configured registry owns the reference's scheme.
pub fn modules_not_supported() -> DiagnosticBuilder {
	DiagnosticBuilder::error("BCP189", "Module references are not supported in this context.")
}

pub fn module_requires_restore(reference: &str) -> DiagnosticBuilder {
	DiagnosticBuilder::error(
		"BCP190",
		format!("The module with reference \"{reference}\" has not been restored."),
	)
}

pub fn module_restore_failed(reference: &str, detail: &str) -> DiagnosticBuilder {
	DiagnosticBuilder::error(
		"BCP192",
		format!("Unable to restore the module with reference \"{reference}\": {detail}"),
	)
}

pub fn invalid_oci_reference(reference: &str) -> DiagnosticBuilder {
	DiagnosticBuilder::error(
		"BCP193",
		format!(
			"\"{reference}\" is not a valid OCI artifact reference. Specify a reference in the format of \"br:<artifact-uri>:<tag>\" or \"br/<module-alias>:<module-name-or-path>:<tag>\"."
		),
	)
}

pub fn invalid_oci_path_segment(reference: &str, segment: &str) -> DiagnosticBuilder {
	DiagnosticBuilder::error(
		"BCP195",
		invalid_oci(
			reference,
			&format!(
				"The artifact path segment \"{segment}\" is not valid. Each artifact name path segment must be a lowercase alphanumeric string optionally separated by a \".\", \"_\", or \"-\"."
			),
		),
	)
}

pub fn missing_oci_tag_or_digest(reference: &str) -> DiagnosticBuilder {
	DiagnosticBuilder::error("BCP196", invalid_oci(reference, "The module tag or digest is missing."))
}

pub fn oci_tag_too_long(reference: &str, tag: &str) -> DiagnosticBuilder {
	DiagnosticBuilder::error(
		"BCP197",
		invalid_oci(
			reference,
			&format!("The tag \"{tag}\" exceeds the maximum length of {MAX_TAG_LENGTH} characters."),
		),
	)
}

pub fn invalid_oci_tag(reference: &str, tag: &str) -> DiagnosticBuilder {
	DiagnosticBuilder::error(
		"BCP198",
		invalid_oci(
			reference,
			&format!(
				"The tag \"{tag}\" is not valid. Valid characters are alphanumeric, \".\", \"_\", or \"-\" but the tag cannot begin with \".\", \"_\", or \"-\"."
			),
		),
	)
}

pub fn oci_repository_too_long(reference: &str, repository: &str) -> DiagnosticBuilder {
	DiagnosticBuilder::error(
		"BCP199",
		invalid_oci(
			reference,
			&format!("Module path \"{repository}\" exceeds maximum length of {MAX_REPOSITORY_LENGTH} characters."),
		),
	)
}

pub fn oci_registry_too_long(reference: &str, registry: &str) -> DiagnosticBuilder {
	DiagnosticBuilder::error(
		"BCP200",
		invalid_oci(
			reference,
			&format!("The registry \"{registry}\" exceeds the maximum length of {MAX_REGISTRY_LENGTH} characters."),
		),
	)
}

pub fn invalid_oci_registry(reference: &str, registry: &str) -> DiagnosticBuilder {
	DiagnosticBuilder::error(
		"BCP201",
		invalid_oci(reference, &format!("The registry \"{registry}\" is not a valid host name.")),
	)
}

pub fn unknown_module_alias(alias: &str, scheme: &str) -> DiagnosticBuilder {
	DiagnosticBuilder::error(
		"BCP213",
		format!("The module alias \"{alias}\" does not exist in the {scheme} configuration."),
	)
}

pub fn invalid_oci_digest(reference: &str, digest: &str) -> DiagnosticBuilder {
	DiagnosticBuilder::error(
		"BCP224",
		invalid_oci(
			reference,
			&format!(
				"The digest \"{digest}\" is not valid. The valid format is a string \"sha256:\" followed by exactly 64 lowercase hexadecimal digits."
			),
		),
	)
}

pub fn invalid_template_spec_reference(reference: &str) -> DiagnosticBuilder {
	DiagnosticBuilder::error(
		"BCP218",
		format!(
			"\"{reference}\" is not a valid template spec reference. Specify a reference in the format of \"ts:<subscription-ID>/<resource-group-name>/<template-spec-name>:<version>\" or \"ts/<module-alias>:<template-spec-name>:<version>\"."
		),
	)
}

pub fn invalid_template_spec_subscription(reference: &str, subscription: &str) -> DiagnosticBuilder {
	DiagnosticBuilder::error(
		"BCP219",
		invalid_template_spec(
			reference,
			&format!("The subscription ID \"{subscription}\" is not a GUID."),
		),
	)
}

pub fn invalid_template_spec_resource_group(reference: &str, resource_group: &str) -> DiagnosticBuilder {
	DiagnosticBuilder::error(
		"BCP220",
		invalid_template_spec(
			reference,
			&format!(
				"The resource group name \"{resource_group}\" exceeds the maximum length of 90 characters, contains invalid characters, or ends with \".\"."
			),
		),
	)
}

pub fn invalid_template_spec_name(reference: &str, name: &str) -> DiagnosticBuilder {
	DiagnosticBuilder::error(
		"BCP221",
		invalid_template_spec(
			reference,
			&format!("The template spec name \"{name}\" exceeds the maximum length of 90 characters, contains invalid characters or ends with a period."),
		),
	)
}

pub fn invalid_template_spec_version(reference: &str, version: &str) -> DiagnosticBuilder {
	DiagnosticBuilder::error(
		"BCP222",
		invalid_template_spec(
			reference,
			&format!("The template spec version \"{version}\" exceeds the maximum length of 90 characters, contains invalid characters or ends with a period."),
		),
	)
}
