//! Module declaration syntax.
//!
//! The module resolution layer only needs a narrow view of a source file: the
//! module declarations it contains, each with the raw reference text and the
//! spans diagnostics are attributed to. [`SourceFile::parse`] extracts that
//! view from text of the form
//!
//! ```text
//! module storage 'br:contoso.azurecr.io/bicep/storage:1.0.0' = {
//!   name: 'storage'
//! }
//! ```
//!
//! Everything other than `module <name> '<reference>'` is skipped.

mod scanner;

use bramble_diagnostics::TextSpan;
use thiserror::Error;
use url::Url;

/// Errors produced while scanning module declarations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyntaxError {
	#[error("unterminated string literal starting at offset {offset}")]
	UnterminatedString { offset: usize },
	#[error("unterminated block comment starting at offset {offset}")]
	UnterminatedComment { offset: usize },
	#[error("invalid escape sequence '\\{escape}' at offset {offset}")]
	InvalidEscape { escape: char, offset: usize },
	#[error("expected a module name at offset {offset}")]
	ExpectedName { offset: usize },
	#[error("expected a module path string at offset {offset}")]
	ExpectedPath { offset: usize },
	#[error("string interpolation is not allowed in module paths (offset {offset})")]
	InterpolatedPath { offset: usize },
}

/// A `module <name> '<reference>'` declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleDeclarationSyntax {
	name: String,
	reference: String,
	reference_span: TextSpan,
	span: TextSpan,
}

impl ModuleDeclarationSyntax {
	/// Creates a declaration node.
	///
	/// `reference` is the unescaped content of the path literal and
	/// `reference_span` covers the literal including its quotes.
	pub fn new(name: impl Into<String>, reference: impl Into<String>, reference_span: TextSpan, span: TextSpan) -> Self {
		Self {
			name: name.into(),
			reference: reference.into(),
			reference_span,
			span,
		}
	}

	/// Symbolic name of the module.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Raw module reference text, e.g. `br:host/path:tag` or `./child.bicep`.
	pub fn reference_text(&self) -> &str {
		&self.reference
	}

	/// Span of the reference literal; module reference diagnostics point here.
	pub const fn reference_span(&self) -> TextSpan {
		self.reference_span
	}

	/// Span of the whole declaration head.
	pub const fn span(&self) -> TextSpan {
		self.span
	}
}

/// A source file reduced to its module declarations.
#[derive(Debug, Clone)]
pub struct SourceFile {
	uri: Url,
	text: String,
	declarations: Vec<ModuleDeclarationSyntax>,
}

impl SourceFile {
	/// Scans `text` for module declarations.
	///
	/// # Errors
	///
	/// Returns a [`SyntaxError`] for unterminated literals or comments and for
	/// malformed declaration heads.
	pub fn parse(uri: Url, text: impl Into<String>) -> Result<Self, SyntaxError> {
		let text = text.into();
		let declarations = scanner::scan(&text)?;
		Ok(Self { uri, text, declarations })
	}

	pub fn uri(&self) -> &Url {
		&self.uri
	}

	pub fn text(&self) -> &str {
		&self.text
	}

	pub fn declarations(&self) -> &[ModuleDeclarationSyntax] {
		&self.declarations
	}

	/// Returns the source text covered by `span`.
	pub fn slice(&self, span: TextSpan) -> Option<&str> {
		self.text.get(span.start..span.end())
	}
}
