//! Diagnostic values shared by the module resolution layer.
//!
//! A [`DiagnosticBuilder`] is a span-less failure: it carries the stable code,
//! severity and message of a defect, and is turned into a positioned
//! [`Diagnostic`] by whoever knows where the offending syntax lives.
//!
//! Every code emitted by the layer is constructed through [`catalog`] so the
//! code/message pairs stay stable.

pub mod catalog;

use std::fmt;

use serde::Serialize;

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
	Info,
	Warning,
	Error,
}

impl DiagnosticLevel {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Info => "info",
			Self::Warning => "warning",
			Self::Error => "error",
		}
	}
}

impl fmt::Display for DiagnosticLevel {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Byte range in a source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct TextSpan {
	/// Byte offset of the first character.
	pub start: usize,
	/// Length in bytes.
	pub len: usize,
}

impl TextSpan {
	pub const fn new(start: usize, len: usize) -> Self {
		Self { start, len }
	}

	/// Exclusive end offset.
	pub const fn end(self) -> usize {
		self.start + self.len
	}
}

/// A positioned diagnostic ready to be reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
	pub span: TextSpan,
	pub level: DiagnosticLevel,
	pub code: &'static str,
	pub message: String,
}

impl fmt::Display for Diagnostic {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} {}: {}", self.level, self.code, self.message)
	}
}

/// A diagnostic that has not been attached to a location yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DiagnosticBuilder {
	code: &'static str,
	level: DiagnosticLevel,
	message: String,
}

impl DiagnosticBuilder {
	pub fn new(code: &'static str, level: DiagnosticLevel, message: impl Into<String>) -> Self {
		Self {
			code,
			level,
			message: message.into(),
		}
	}

	/// Creates an error-level builder.
	pub fn error(code: &'static str, message: impl Into<String>) -> Self {
		Self::new(code, DiagnosticLevel::Error, message)
	}

	pub const fn code(&self) -> &'static str {
		self.code
	}

	pub const fn level(&self) -> DiagnosticLevel {
		self.level
	}

	pub fn message(&self) -> &str {
		&self.message
	}

	/// Attaches the builder to a location.
	pub fn build(self, span: TextSpan) -> Diagnostic {
		Diagnostic {
			span,
			level: self.level,
			code: self.code,
			message: self.message,
		}
	}
}

impl fmt::Display for DiagnosticBuilder {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} {}: {}", self.level, self.code, self.message)
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn build_keeps_code_level_and_message() {
		let diagnostic = DiagnosticBuilder::error("BCP999", "broken").build(TextSpan::new(4, 3));
		assert_eq!(
			diagnostic,
			Diagnostic {
				span: TextSpan::new(4, 3),
				level: DiagnosticLevel::Error,
				code: "BCP999",
				message: "broken".to_string(),
			}
		);
		assert_eq!(diagnostic.span.end(), 7);
	}

	#[test]
	fn display_includes_level_and_code() {
		let builder = DiagnosticBuilder::new("BCP001", DiagnosticLevel::Warning, "careful");
		assert_eq!(builder.to_string(), "warning BCP001: careful");
	}

	#[test]
	fn levels_order_by_severity() {
		assert!(DiagnosticLevel::Error > DiagnosticLevel::Warning);
		assert!(DiagnosticLevel::Warning > DiagnosticLevel::Info);
	}
}
