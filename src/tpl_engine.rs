use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static PARAM_REGEX: Lazy<Regex> = Lazy::new(||
  Regex::new(r#"(?x) (?:  \#\[ __ \( ([\w_]+) \) \]  |  __ \(  ([\w_]+)  \) )"#).unwrap());

/// Substitutes every `__(name)` or `#[__(name)]` placeholder in `template`
/// with the value the provider returns for `name`.
pub fn process<F, S>(template: &str, mut provider: F) -> String
  where
    F: FnMut(&str) -> S,
    S: ToString,
{
  PARAM_REGEX.replace_all(template, |captures: &Captures| {
    let name = captures.get(1)
      .unwrap_or_else(|| captures.get(2).unwrap())
      .as_str();
    provider(name).to_string()
  }).into_owned()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn substitutes_both_forms() {
    let out = process("fn __(name)() {\n#[__(body)]\n}", |name| {
      match name {
        "name" => "run",
        "body" => "  work();",
        _ => panic!("unknown param: {}", name),
      }
    });
    assert_eq!(out, "fn run() {\n  work();\n}");
  }

  #[test]
  fn placeholder_flush_against_text() {
    let out = process("self.parse___(root)(node)", |_| "start");
    assert_eq!(out, "self.parse_start(node)");
  }

  #[test]
  fn replacement_is_literal() {
    // '$' in the replacement must not be treated as a capture reference
    let out = process("__(x)", |_| "a$1b");
    assert_eq!(out, "a$1b");
  }
}
