//! Static well-formedness checks, run after parsing and before emission:
//! every referenced rule is defined, every defined rule is reachable from
//! the root, and every character-class range is ordered.

use indexmap::IndexSet;

use crate::ast::{CharClass, Elem, ElemKind, Grammar, Spanned};
use crate::chars;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidateError {
  pub kind: ValidateErrorKind,
  pub span: (usize, usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidateErrorKind {
  UndefinedRule(String),
  UnreachableRule(String),
  InvalidRange(String, String),
  InvalidEscape(String),
}

type Validate = Result<(), ValidateError>;

pub fn validate(grammar: &Grammar) -> Validate {
  check_references(grammar)?;
  check_reachability(grammar)?;
  check_ranges(grammar)?;
  Ok(())
}

fn check_references(grammar: &Grammar) -> Validate {
  for rule in grammar.rules.values() {
    for elem in &rule.alts {
      check_elem_references(grammar, elem)?;
    }
  }
  Ok(())
}

fn check_elem_references(grammar: &Grammar, elem: &Elem) -> Validate {
  match &elem.kind {
    ElemKind::Name(name) => {
      if !grammar.rules.contains_key(&name.1) {
        return Err(ValidateError {
          kind: ValidateErrorKind::UndefinedRule(name.1.clone()),
          span: name.0,
        });
      }
      Ok(())
    }
    ElemKind::Alt(elems) | ElemKind::Group(elems) => {
      for child in elems {
        check_elem_references(grammar, child)?;
      }
      Ok(())
    }
    ElemKind::Str(_) | ElemKind::Class(_) => Ok(()),
  }
}

fn check_reachability(grammar: &Grammar) -> Validate {
  let mut visited = IndexSet::new();
  let mut frontier = IndexSet::new();
  frontier.insert(grammar.root().to_string());

  while let Some(name) = frontier.pop() {
    if !visited.insert(name.clone()) {
      continue;
    }
    if let Some(rule) = grammar.rule(&name) {
      for elem in &rule.alts {
        collect_names(elem, &mut frontier);
      }
    }
  }

  for (name, rule) in &grammar.rules {
    if !visited.contains(name) {
      return Err(ValidateError {
        kind: ValidateErrorKind::UnreachableRule(name.clone()),
        span: rule.name.0,
      });
    }
  }
  Ok(())
}

fn collect_names(elem: &Elem, frontier: &mut IndexSet<String>) {
  match &elem.kind {
    ElemKind::Name(name) => {
      frontier.insert(name.1.clone());
    }
    ElemKind::Alt(elems) | ElemKind::Group(elems) => {
      for child in elems {
        collect_names(child, frontier);
      }
    }
    ElemKind::Str(_) | ElemKind::Class(_) => {}
  }
}

fn check_ranges(grammar: &Grammar) -> Validate {
  for rule in grammar.rules.values() {
    for elem in &rule.alts {
      check_elem_ranges(elem)?;
    }
  }
  Ok(())
}

fn check_elem_ranges(elem: &Elem) -> Validate {
  match &elem.kind {
    ElemKind::Class(class) => check_class(class),
    ElemKind::Alt(elems) | ElemKind::Group(elems) => {
      for child in elems {
        check_elem_ranges(child)?;
      }
      Ok(())
    }
    ElemKind::Name(_) | ElemKind::Str(_) => Ok(()),
  }
}

fn check_class(class: &CharClass) -> Validate {
  for item in &class.items {
    let lo = decode_endpoint(&item.lo)?;
    if let Some(hi_tok) = &item.hi {
      let hi = decode_endpoint(hi_tok)?;
      if lo >= hi {
        let (lo_span, lo_text) = &item.lo;
        let (hi_span, hi_text) = hi_tok;
        return Err(ValidateError {
          kind: ValidateErrorKind::InvalidRange(
            lo_text.clone(),
            hi_text.clone()),
          span: (lo_span.0, hi_span.1),
        });
      }
    }
  }
  Ok(())
}

fn decode_endpoint(tok: &Spanned<String>) -> Result<i32, ValidateError> {
  match chars::decode_to_int32(&tok.1) {
    Some((cp, _)) if (0..=0x10ffff).contains(&cp) => Ok(cp),
    _ => Err(ValidateError {
      kind: ValidateErrorKind::InvalidEscape(tok.1.clone()),
      span: tok.0,
    }),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::grammar_parser::parse;

  fn check(source: &str) -> Validate {
    validate(&parse(source).unwrap())
  }

  #[test]
  fn valid_grammar() {
    assert_eq!(
      check(r#"root : (a | b)+ [0-9]; a : "x"; b inline : [a-z];"#),
      Ok(()));
  }

  #[test]
  fn undefined_rule() {
    let err = check(r#"root : nope;"#).unwrap_err();
    assert_eq!(err.kind, ValidateErrorKind::UndefinedRule("nope".to_string()));
    assert_eq!(err.span, (7, 11));
  }

  #[test]
  fn undefined_rule_inside_group() {
    let err = check(r#"root : ( "x" | deep* );"#).unwrap_err();
    assert_eq!(err.kind, ValidateErrorKind::UndefinedRule("deep".to_string()));
  }

  #[test]
  fn unreachable_rule() {
    let err = check(r#"root : "x"; orphan : "y";"#).unwrap_err();
    assert_eq!(
      err.kind,
      ValidateErrorKind::UnreachableRule("orphan".to_string()));
  }

  #[test]
  fn reachability_is_transitive() {
    assert_eq!(
      check(r#"root : mid; mid : leaf+; leaf : [a-z];"#),
      Ok(()));
  }

  #[test]
  fn cycles_do_not_loop() {
    assert_eq!(
      check(r#"root : "(" root ")" | [0-9];"#),
      Ok(()));
  }

  #[test]
  fn invalid_range() {
    let err = check(r#"root : [z-a];"#).unwrap_err();
    assert_eq!(
      err.kind,
      ValidateErrorKind::InvalidRange("z".to_string(), "a".to_string()));
  }

  #[test]
  fn equal_range_endpoints() {
    let err = check(r#"root : [a-a];"#).unwrap_err();
    assert_eq!(
      err.kind,
      ValidateErrorKind::InvalidRange("a".to_string(), "a".to_string()));
  }

  #[test]
  fn escaped_range_endpoints() {
    assert_eq!(check(r#"root : [\u0041-\u005A];"#), Ok(()));
  }

  #[test]
  fn escaped_range_order_checked_after_decode() {
    let err = check(r#"root : [\u005A-\u0041];"#).unwrap_err();
    assert!(matches!(err.kind, ValidateErrorKind::InvalidRange(_, _)));
  }

  #[test]
  fn out_of_range_codepoint() {
    let err = check(r#"root : [\U00110000];"#).unwrap_err();
    assert_eq!(
      err.kind,
      ValidateErrorKind::InvalidEscape(r"\U00110000".to_string()));
  }

  #[test]
  fn subtractive_ranges_are_checked() {
    let err = check(r#"root : [a-z!9-0];"#).unwrap_err();
    assert!(matches!(err.kind, ValidateErrorKind::InvalidRange(_, _)));
  }
}
