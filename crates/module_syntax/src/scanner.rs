use bramble_diagnostics::TextSpan;

use crate::{ModuleDeclarationSyntax, SyntaxError};

const MODULE_KEYWORD: &str = "module";

pub(crate) fn scan(text: &str) -> Result<Vec<ModuleDeclarationSyntax>, SyntaxError> {
	let mut scanner = Scanner { text, pos: 0 };
	let mut declarations = Vec::new();

	loop {
		scanner.skip_trivia()?;
		let Some(c) = scanner.peek() else {
			break;
		};

		if c == '\'' {
			scanner.string(true)?;
		} else if is_word_char(c) {
			let start = scanner.pos;
			let word = scanner.word();
			if word == MODULE_KEYWORD && scanner.starts_statement(start) {
				scanner.skip_trivia()?;
				// `module: ...` is an object key, not a declaration.
				if scanner.peek() != Some(':') {
					declarations.push(scanner.module_declaration(start)?);
				}
			}
		} else {
			scanner.bump();
		}
	}

	Ok(declarations)
}

fn is_word_char(c: char) -> bool {
	c.is_ascii_alphanumeric() || c == '_'
}

struct Scanner<'a> {
	text: &'a str,
	pos: usize,
}

impl Scanner<'_> {
	fn peek(&self) -> Option<char> {
		self.text[self.pos..].chars().next()
	}

	fn peek_second(&self) -> Option<char> {
		self.text[self.pos..].chars().nth(1)
	}

	fn bump(&mut self) -> Option<char> {
		let c = self.peek()?;
		self.pos += c.len_utf8();
		Some(c)
	}

	fn skip_trivia(&mut self) -> Result<(), SyntaxError> {
		loop {
			match (self.peek(), self.peek_second()) {
				(Some(c), _) if c.is_whitespace() => {
					self.bump();
				}
				(Some('/'), Some('/')) => {
					while let Some(c) = self.bump() {
						if c == '\n' {
							break;
						}
					}
				}
				(Some('/'), Some('*')) => {
					let offset = self.pos;
					self.pos += 2;
					match self.text[self.pos..].find("*/") {
						Some(end) => self.pos += end + 2,
						None => return Err(SyntaxError::UnterminatedComment { offset }),
					}
				}
				_ => return Ok(()),
			}
		}
	}

	/// Whether only blanks separate `offset` from the start of its line.
	fn starts_statement(&self, offset: usize) -> bool {
		let before = self.text[..offset].trim_end_matches([' ', '\t', '\r']);
		before.is_empty() || before.ends_with('\n')
	}

	fn word(&mut self) -> &str {
		let start = self.pos;
		while self.peek().is_some_and(is_word_char) {
			self.bump();
		}
		&self.text[start..self.pos]
	}

	fn module_declaration(&mut self, start: usize) -> Result<ModuleDeclarationSyntax, SyntaxError> {
		self.skip_trivia()?;
		let name_offset = self.pos;
		if !self.peek().is_some_and(|c| c.is_ascii_alphabetic() || c == '_') {
			return Err(SyntaxError::ExpectedName { offset: name_offset });
		}
		let name = self.word().to_string();

		self.skip_trivia()?;
		if self.peek() != Some('\'') {
			return Err(SyntaxError::ExpectedPath { offset: self.pos });
		}
		let (reference, reference_span) = self.string(false)?;

		Ok(ModuleDeclarationSyntax::new(
			name,
			reference,
			reference_span,
			TextSpan::new(start, reference_span.end() - start),
		))
	}

	/// Reads a single-quoted literal starting at the current position.
	fn string(&mut self, allow_interpolation: bool) -> Result<(String, TextSpan), SyntaxError> {
		let start = self.pos;
		self.bump();
		let mut value = String::new();

		loop {
			let offset = self.pos;
			match self.bump() {
				None | Some('\n') => return Err(SyntaxError::UnterminatedString { offset: start }),
				Some('\'') => break,
				Some('\\') => {
					let escaped = match self.bump() {
						Some('\'') => '\'',
						Some('\\') => '\\',
						Some('n') => '\n',
						Some('r') => '\r',
						Some('t') => '\t',
						Some('$') => '$',
						Some(escape) => return Err(SyntaxError::InvalidEscape { escape, offset }),
						None => return Err(SyntaxError::UnterminatedString { offset: start }),
					};
					value.push(escaped);
				}
				Some('$') if self.peek() == Some('{') => {
					if !allow_interpolation {
						return Err(SyntaxError::InterpolatedPath { offset });
					}
					while let Some(c) = self.bump() {
						if c == '}' {
							break;
						}
					}
				}
				Some(c) => value.push(c),
			}
		}

		Ok((value, TextSpan::new(start, self.pos - start)))
	}
}
