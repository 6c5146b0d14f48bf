use std::fmt::{self, Display};

use indexmap::IndexMap;

pub type Spanned<T> = ((usize, usize), T);

/// Rules in declaration order; the first rule is the root of the grammar.
#[derive(Debug, Default)]
pub struct Grammar {
  pub rules: IndexMap<String, Rule>,
}

impl Grammar {
  pub fn root(&self) -> &str {
    self.rules.get_index(0)
      .map(|(name, _)| name.as_str())
      .unwrap_or("")
  }

  pub fn rule(&self, name: &str) -> Option<&Rule> {
    self.rules.get(name)
  }
}

impl Display for Grammar {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    for rule in self.rules.values() {
      writeln!(f, "{}", rule)?;
    }
    Ok(())
  }
}

#[derive(Debug)]
pub struct Rule {
  pub name: Spanned<String>,
  pub modifier: Modifier,
  pub alts: Vec<Elem>,
}

impl Display for Rule {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "{}", self.name.1)?;
    match self.modifier {
      Modifier::None => {}
      Modifier::Discard => write!(f, " discard")?,
      Modifier::Inline => write!(f, " inline")?,
      Modifier::Mergeup => write!(f, " mergeup")?,
    }
    write!(f, " : ")?;
    write_alts(f, &self.alts)?;
    write!(f, " ;")
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
  None,
  Discard,
  Inline,
  Mergeup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
  One,
  ZeroOrOne,
  ZeroOrMore,
  OneOrMore,
}

impl Quantifier {
  pub fn suffix(self) -> &'static str {
    match self {
      Quantifier::One => "",
      Quantifier::ZeroOrOne => "?",
      Quantifier::ZeroOrMore => "*",
      Quantifier::OneOrMore => "+",
    }
  }
}

#[derive(Debug)]
pub struct Elem {
  pub kind: ElemKind,
  pub quantifier: Quantifier,
}

impl Elem {
  pub fn new(kind: ElemKind) -> Self {
    Self {
      kind,
      quantifier: Quantifier::One,
    }
  }
}

#[derive(Debug)]
pub enum ElemKind {
  /// Reference to another rule.
  Name(Spanned<String>),
  /// One branch of an alternation; always has quantifier `One`.
  Alt(Vec<Elem>),
  /// Parenthesised sub-alternation; children are `Alt` elements.
  Group(Vec<Elem>),
  /// String literal, kept verbatim including the surrounding quotes.
  Str(Spanned<String>),
  Class(CharClass),
}

impl Display for Elem {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match &self.kind {
      ElemKind::Name(name) => write!(f, "{}", name.1)?,
      ElemKind::Alt(elems) => {
        let mut first = true;
        for elem in elems {
          if !first {
            write!(f, " ")?;
          }
          write!(f, "{}", elem)?;
          first = false;
        }
      }
      ElemKind::Group(alts) => {
        write!(f, "( ")?;
        write_alts(f, alts)?;
        write!(f, " )")?;
      }
      ElemKind::Str(raw) => write!(f, "{}", raw.1)?,
      ElemKind::Class(class) => write!(f, "{}", class)?,
    }
    write!(f, "{}", self.quantifier.suffix())
  }
}

fn write_alts(f: &mut fmt::Formatter, alts: &[Elem]) -> fmt::Result {
  let mut first = true;
  for alt in alts {
    if !first {
      write!(f, " | ")?;
    }
    write!(f, "{}", alt)?;
    first = false;
  }
  Ok(())
}

/// `[ (^)? range (!? range)* ]`; endpoints keep the raw source text with
/// escapes unresolved, so the class can be re-rendered and decoded later.
#[derive(Debug)]
pub struct CharClass {
  pub negated: bool,
  pub items: Vec<ClassRange>,
  pub span: (usize, usize),
}

impl Display for CharClass {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "[")?;
    if self.negated {
      write!(f, "^")?;
    }
    for item in &self.items {
      if item.subtract {
        write!(f, "!")?;
      }
      write!(f, "{}", item.lo.1)?;
      if let Some(hi) = &item.hi {
        write!(f, "-{}", hi.1)?;
      }
    }
    write!(f, "]")
  }
}

#[derive(Debug)]
pub struct ClassRange {
  pub subtract: bool,
  pub lo: Spanned<String>,
  pub hi: Option<Spanned<String>>,
}

#[cfg(test)]
mod tests {
  use super::*;
  use insta::assert_snapshot;

  fn span() -> (usize, usize) {
    (0, 0)
  }

  #[test]
  fn rule_rendering() {
    let rule = Rule {
      name: (span(), "doc".to_string()),
      modifier: Modifier::None,
      alts: vec![
        Elem::new(ElemKind::Alt(vec![
          Elem {
            kind: ElemKind::Name((span(), "word".to_string())),
            quantifier: Quantifier::OneOrMore,
          },
        ])),
        Elem::new(ElemKind::Alt(vec![
          Elem::new(ElemKind::Str((span(), "\"-\"".to_string()))),
        ])),
      ],
    };

    assert_snapshot!(rule.to_string(), @r#"doc : word+ | "-" ;"#);
  }

  #[test]
  fn class_rendering() {
    let class = CharClass {
      negated: true,
      items: vec![
        ClassRange {
          subtract: false,
          lo: (span(), "a".to_string()),
          hi: Some((span(), "z".to_string())),
        },
        ClassRange {
          subtract: true,
          lo: (span(), "\\n".to_string()),
          hi: None,
        },
      ],
      span: span(),
    };

    assert_snapshot!(class.to_string(), @r"[^a-z!\n]");
  }

  #[test]
  fn modifier_rendering() {
    let rule = Rule {
      name: (span(), "ws".to_string()),
      modifier: Modifier::Discard,
      alts: vec![
        Elem::new(ElemKind::Alt(vec![
          Elem {
            kind: ElemKind::Class(CharClass {
              negated: false,
              items: vec![ClassRange {
                subtract: false,
                lo: (span(), " ".to_string()),
                hi: None,
              }],
              span: span(),
            }),
            quantifier: Quantifier::ZeroOrMore,
          },
        ])),
      ],
    };

    assert_snapshot!(rule.to_string(), @"ws discard : [ ]* ;");
  }
}
