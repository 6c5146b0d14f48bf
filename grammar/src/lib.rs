pub mod ast;
pub mod chars;
mod grammar_parser;
mod validate;

pub use crate::ast::{
  CharClass, ClassRange, Elem, ElemKind, Grammar, Modifier, Quantifier, Rule,
  Spanned,
};
pub use crate::grammar_parser::{parse, ParseError, ParseErrorKind};
pub use crate::validate::{validate, ValidateError, ValidateErrorKind};

use codespan_reporting::diagnostic::{Diagnostic, Label};
use codespan_reporting::files::SimpleFile;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrammarError {
  pub kind: GrammarErrorKind,
  pub message: String,
  pub span: (usize, usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrammarErrorKind {
  SyntaxError,
  DuplicateRule,
  UndefinedRule,
  UnreachableRule,
  InvalidRange,
  InvalidEscape,
}

/// Parses and validates a grammar; on success the result is ready for
/// emission.
pub fn build(text: &str) -> Result<Grammar, GrammarError> {
  let grammar = grammar_parser::parse(text)?;
  validate::validate(&grammar)?;
  Ok(grammar)
}

impl From<ParseError> for GrammarError {
  fn from(err: ParseError) -> Self {
    let kind = match err.kind {
      ParseErrorKind::Syntax => GrammarErrorKind::SyntaxError,
      ParseErrorKind::DuplicateRule(_) => GrammarErrorKind::DuplicateRule,
      ParseErrorKind::InvalidEscape => GrammarErrorKind::InvalidEscape,
    };
    GrammarError {
      kind,
      message: err.to_string(),
      span: err.span,
    }
  }
}

impl From<ValidateError> for GrammarError {
  fn from(err: ValidateError) -> Self {
    let (kind, message) = match &err.kind {
      ValidateErrorKind::UndefinedRule(name) => (
        GrammarErrorKind::UndefinedRule,
        format!("undefined rule '{}'", name),
      ),
      ValidateErrorKind::UnreachableRule(name) => (
        GrammarErrorKind::UnreachableRule,
        format!("unreachable rule '{}'", name),
      ),
      ValidateErrorKind::InvalidRange(lo, hi) => (
        GrammarErrorKind::InvalidRange,
        format!("invalid range [{}-{}]: '{}' is not < '{}'", lo, hi, lo, hi),
      ),
      ValidateErrorKind::InvalidEscape(tok) => (
        GrammarErrorKind::InvalidEscape,
        format!("invalid escape '{}'", tok),
      ),
    };
    GrammarError {
      kind,
      message,
      span: err.span,
    }
  }
}

pub fn report_error(path: &str, input: &str, error: &GrammarError) {
  let writer = StandardStream::stderr(ColorChoice::Auto);
  let config = term::Config::default();
  let files = SimpleFile::new(path, input);

  let diagnostic = Diagnostic::error()
    .with_message(match error.kind {
      GrammarErrorKind::SyntaxError => "syntax error",
      GrammarErrorKind::DuplicateRule => "duplicate rule",
      GrammarErrorKind::UndefinedRule => "undefined rule",
      GrammarErrorKind::UnreachableRule => "unreachable rule",
      GrammarErrorKind::InvalidRange => "invalid character range",
      GrammarErrorKind::InvalidEscape => "invalid escape",
    })
    .with_labels(vec![
      Label::primary((), error.span.0..error.span.1)
        .with_message(&error.message),
    ]);

  term::emit(&mut writer.lock(), &config, &files, &diagnostic).unwrap();
}
