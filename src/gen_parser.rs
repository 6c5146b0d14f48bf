//! Emits the source text of a stand-alone recursive-descent parser for a
//! validated grammar. The static scaffold (AST node, cursor bookkeeping,
//! UTF-8 decoding, driver `main`) lives in `templates/parser.tpl.rs`; this
//! module generates one `parse_<rule>` method per grammar rule.
//!
//! Generated locals and labels carry a monotonically increasing depth
//! index (`ok0`, `mark3`, `'b1`, ...) so nested groups never shadow the
//! state of an enclosing level.

use std::fmt::Write;

use grammar::ast::{CharClass, Elem, ElemKind, Grammar, Modifier, Quantifier, Rule};
use grammar::chars;
use itertools::Itertools;

use crate::indent_writer::IndentWriter;
use crate::tpl_engine;

static TEMPLATE: &str = include_str!("templates/parser.tpl.rs");

/// Emission is a pure function of the grammar model: equal grammars
/// produce byte-identical source.
pub fn gen(grammar: &Grammar) -> String {
  let mut w = IndentWriter::new(String::new());
  w.indent();
  for rule in grammar.rules.values() {
    gen_rule(&mut w, grammar, rule);
  }
  let rule_fns = w.into_inner();

  tpl_engine::process(TEMPLATE, |name| {
    match name {
      "root" => grammar.root().to_string(),
      "rule_fns" => rule_fns.clone(),
      _ => panic!("unknown param: {}", name),
    }
  })
}

type Writer = IndentWriter<String>;

fn gen_rule(w: &mut Writer, grammar: &Grammar, rule: &Rule) {
  let name = &rule.name.1;
  let mut counter = 0usize;

  writeln!(w).unwrap();
  writeln!(w, "// {}", rule).unwrap();
  writeln!(w, "fn parse_{}(&mut self, parent: &mut AstNode) -> Ret {{", name).unwrap();
  w.indent();

  writeln!(w, "let mark = self.mark();").unwrap();
  // a mergeup rule hoists its children straight into the caller's node
  let target = if rule.modifier == Modifier::Mergeup {
    "parent"
  } else {
    writeln!(w, "let mut astn = AstNode::new(self.pos, \"{}\");", name).unwrap();
    "astn"
  };
  writeln!(w).unwrap();

  let depth = counter;
  counter += 1;
  gen_alts(w, grammar, &rule.alts, depth, &mut counter, target);

  writeln!(w).unwrap();
  writeln!(w, "if !ok{} {{", depth).unwrap();
  w.indent();
  writeln!(w, "self.reset(mark);").unwrap();
  writeln!(w, "return Ret::Fail;").unwrap();
  w.dedent();
  writeln!(w, "}}").unwrap();

  match rule.modifier {
    Modifier::None => {
      writeln!(w, "parent.add_child(astn);").unwrap();
      writeln!(w, "Ret::Ok").unwrap();
    }
    Modifier::Discard | Modifier::Mergeup => {
      writeln!(w, "Ret::Ok").unwrap();
    }
    Modifier::Inline => {
      writeln!(w, "Ret::Inline").unwrap();
    }
  }

  w.dedent();
  writeln!(w, "}}").unwrap();
}

/// Ordered choice: each alternative starts from the saved cursor and
/// collects children into its own temporary node; only the winning
/// alternative's children are merged into `target`.
fn gen_alts(
  w: &mut Writer,
  grammar: &Grammar,
  alts: &[Elem],
  depth: usize,
  counter: &mut usize,
  target: &str,
) {
  writeln!(w, "let mut ok{} = false;", depth).unwrap();
  writeln!(w, "let mark{} = self.mark();", depth).unwrap();
  writeln!(w, "'a{}: {{", depth).unwrap();
  w.indent();

  for alt in alts {
    let elems = match &alt.kind {
      ElemKind::Alt(elems) => elems,
      _ => unreachable!("rule bodies contain alternatives only"),
    };

    writeln!(w, "// | {}", alt).unwrap();
    writeln!(w, "{{").unwrap();
    w.indent();
    writeln!(w, "let mut node{} = AstNode::new(self.pos, String::new());", depth).unwrap();
    writeln!(w, "'b{}: {{", depth).unwrap();
    w.indent();

    for elem in elems {
      gen_elem(w, grammar, elem, depth, counter);
    }

    writeln!(w, "{}.children.append(&mut node{}.children);", target, depth).unwrap();
    writeln!(w, "ok{} = true;", depth).unwrap();
    w.dedent();
    writeln!(w, "}}").unwrap();
    writeln!(w, "if ok{} {{", depth).unwrap();
    w.indent();
    writeln!(w, "break 'a{};", depth).unwrap();
    w.dedent();
    writeln!(w, "}}").unwrap();
    writeln!(w, "self.reset(mark{});", depth).unwrap();
    w.dedent();
    writeln!(w, "}}").unwrap();
  }

  w.dedent();
  writeln!(w, "}}").unwrap();
}

fn gen_elem(
  w: &mut Writer,
  grammar: &Grammar,
  elem: &Elem,
  depth: usize,
  counter: &mut usize,
) {
  let e = *counter;
  *counter += 1;

  writeln!(w, "// {}", elem).unwrap();

  match elem.quantifier {
    Quantifier::One => {
      gen_elem_inner(w, grammar, elem, depth, e, counter);
      writeln!(w, "if !ok{} {{", e).unwrap();
      w.indent();
      writeln!(w, "break 'b{};", depth).unwrap();
      w.dedent();
      writeln!(w, "}}").unwrap();
    }
    Quantifier::ZeroOrOne => {
      // failure is absorbed
      gen_elem_inner(w, grammar, elem, depth, e, counter);
    }
    Quantifier::ZeroOrMore => {
      writeln!(w, "loop {{").unwrap();
      w.indent();
      writeln!(w, "let rep{} = self.pos;", e).unwrap();
      gen_elem_inner(w, grammar, elem, depth, e, counter);
      // stop when the body fails or stops consuming
      writeln!(w, "if !ok{e} || self.pos == rep{e} {{", e = e).unwrap();
      w.indent();
      writeln!(w, "break;").unwrap();
      w.dedent();
      writeln!(w, "}}").unwrap();
      w.dedent();
      writeln!(w, "}}").unwrap();
    }
    Quantifier::OneOrMore => {
      writeln!(w, "let mut count{} = 0;", e).unwrap();
      writeln!(w, "loop {{").unwrap();
      w.indent();
      writeln!(w, "let rep{} = self.pos;", e).unwrap();
      gen_elem_inner(w, grammar, elem, depth, e, counter);
      writeln!(w, "if !ok{} {{", e).unwrap();
      w.indent();
      writeln!(w, "break;").unwrap();
      w.dedent();
      writeln!(w, "}}").unwrap();
      writeln!(w, "count{} += 1;", e).unwrap();
      // a zero-width match still counts, but cannot repeat
      writeln!(w, "if self.pos == rep{} {{", e).unwrap();
      w.indent();
      writeln!(w, "break;").unwrap();
      w.dedent();
      writeln!(w, "}}").unwrap();
      w.dedent();
      writeln!(w, "}}").unwrap();
      writeln!(w, "if count{} == 0 {{", e).unwrap();
      w.indent();
      writeln!(w, "break 'b{};", depth).unwrap();
      w.dedent();
      writeln!(w, "}}").unwrap();
    }
  }
}

/// Emits the single-attempt matcher for an element; the generated code
/// declares and sets `ok<e>` and attaches any produced nodes to
/// `node<depth>`.
fn gen_elem_inner(
  w: &mut Writer,
  grammar: &Grammar,
  elem: &Elem,
  depth: usize,
  e: usize,
  counter: &mut usize,
) {
  match &elem.kind {
    ElemKind::Name(name) => {
      let inline = matches!(
        grammar.rule(&name.1).map(|rule| rule.modifier),
        Some(Modifier::Inline));

      writeln!(w, "let mut ok{} = false;", e).unwrap();
      if inline {
        writeln!(w, "let start{} = self.pos;", e).unwrap();
      }
      writeln!(w, "if self.parse_{}(&mut node{}) != Ret::Fail {{", name.1, depth).unwrap();
      w.indent();
      if inline {
        // an inline rule contributes one leaf spanning its whole match
        writeln!(
          w,
          "let text = String::from_utf8_lossy(&self.text[start{e}..self.pos]).into_owned();",
          e = e).unwrap();
        writeln!(w, "node{}.add_child(AstNode::new(start{}, text));", depth, e).unwrap();
      }
      writeln!(w, "ok{} = true;", e).unwrap();
      w.dedent();
      writeln!(w, "}}").unwrap();
    }
    ElemKind::Str(raw) => {
      let lit = chars::decode_str_literal(&raw.1);
      writeln!(w, "let mut ok{} = false;", e).unwrap();
      writeln!(w, "let lit{} = \"{}\";", e, lit.escape_default()).unwrap();
      writeln!(w, "let mark{} = self.mark();", e).unwrap();
      writeln!(w, "let bytes{e} = lit{e}.as_bytes();", e = e).unwrap();
      writeln!(w, "let mut i{} = 0;", e).unwrap();
      writeln!(
        w,
        "while i{e} < bytes{e}.len() && self.pos < self.text.len() \
         && self.text[self.pos] == bytes{e}[i{e}] {{",
        e = e).unwrap();
      w.indent();
      writeln!(w, "self.pos += 1;").unwrap();
      writeln!(w, "self.col += 1;").unwrap();
      writeln!(w, "self.note_ok();").unwrap();
      writeln!(w, "i{} += 1;", e).unwrap();
      w.dedent();
      writeln!(w, "}}").unwrap();
      writeln!(w, "if i{e} == bytes{e}.len() {{", e = e).unwrap();
      w.indent();
      writeln!(
        w,
        "node{}.add_child(AstNode::new(mark{}.0, lit{}.to_string()));",
        depth, e, e).unwrap();
      writeln!(w, "ok{} = true;", e).unwrap();
      w.dedent();
      writeln!(w, "}} else {{").unwrap();
      w.indent();
      writeln!(w, "self.reset(mark{});", e).unwrap();
      w.dedent();
      writeln!(w, "}}").unwrap();
    }
    ElemKind::Class(class) => {
      writeln!(w, "let mut ok{} = false;", e).unwrap();
      writeln!(w, "if let Some((cp, len)) = self.utf8_to_int32() {{").unwrap();
      w.indent();
      writeln!(w, "if {} {{", class_expr(class)).unwrap();
      w.indent();
      writeln!(w, "let start{} = self.pos;", e).unwrap();
      writeln!(w, "self.pos += len;").unwrap();
      writeln!(w, "self.col += len as u32;").unwrap();
      writeln!(w, "if cp == 10 {{").unwrap();
      w.indent();
      writeln!(w, "self.line += 1;").unwrap();
      writeln!(w, "self.col = 1;").unwrap();
      w.dedent();
      writeln!(w, "}}").unwrap();
      writeln!(w, "self.note_ok();").unwrap();
      writeln!(
        w,
        "let text = String::from_utf8_lossy(&self.text[start{e}..self.pos]).into_owned();",
        e = e).unwrap();
      writeln!(w, "node{}.add_child(AstNode::new(start{}, text));", depth, e).unwrap();
      writeln!(w, "ok{} = true;", e).unwrap();
      w.dedent();
      writeln!(w, "}}").unwrap();
      w.dedent();
      writeln!(w, "}}").unwrap();
    }
    ElemKind::Group(alts) => {
      gen_alts(w, grammar, alts, e, counter, &format!("node{}", depth));
    }
    ElemKind::Alt(_) => unreachable!("alternatives are not elements"),
  }
}

/// Builds the boolean codepoint test for a character class:
/// `[!]( subtractive-conjunction && (additive-disjunction) )`.
fn class_expr(class: &CharClass) -> String {
  let mut subs = vec![];
  let mut adds = vec![];

  for item in &class.items {
    let lo = decode_cp(&item.lo.1);
    let term = match &item.hi {
      Some(hi_tok) => {
        let hi = decode_cp(&hi_tok.1);
        if item.subtract {
          format!("!(cp >= {} && cp <= {})", lo, hi)
        } else {
          format!("(cp >= {} && cp <= {})", lo, hi)
        }
      }
      None => {
        if item.subtract {
          format!("cp != {}", lo)
        } else {
          format!("cp == {}", lo)
        }
      }
    };
    if item.subtract {
      subs.push(term);
    } else {
      adds.push(term);
    }
  }

  // the first range is mandatory and additive, so `adds` is never empty
  let adds = adds.iter().join(" || ");
  let core = if subs.is_empty() {
    format!("({})", adds)
  } else {
    format!("{} && ({})", subs.iter().join(" && "), adds)
  };

  if class.negated {
    format!("!({})", core)
  } else {
    core
  }
}

fn decode_cp(token: &str) -> i32 {
  chars::decode_to_int32(token)
    .map(|(cp, _)| cp)
    .expect("class endpoints were validated")
}

#[cfg(test)]
mod tests {
  use super::*;

  fn emit(source: &str) -> String {
    let grammar = grammar::build(source).unwrap();
    gen(&grammar)
  }

  #[test]
  fn deterministic() {
    let source = r#"root : a | b; a : "x"; b : [0-9]+;"#;
    assert_eq!(emit(source), emit(source));
  }

  #[test]
  fn emits_one_function_per_rule_and_root_dispatch() {
    let out = emit(r#"doc : item+; item : "x";"#);
    assert!(out.contains("fn parse_doc(&mut self, parent: &mut AstNode) -> Ret {"));
    assert!(out.contains("fn parse_item(&mut self, parent: &mut AstNode) -> Ret {"));
    assert!(out.contains("self.parse_doc(root)"));
  }

  #[test]
  fn plain_rule_attaches_node() {
    let out = emit(r#"root : "hi";"#);
    assert!(out.contains("let mut astn = AstNode::new(self.pos, \"root\");"));
    assert!(out.contains("parent.add_child(astn);"));
    assert!(out.contains("Ret::Ok"));
  }

  #[test]
  fn discard_rule_drops_node() {
    let out = emit(r#"root : ws "x"; ws discard : " ";"#);
    let body = fn_body(&out, "parse_ws");
    assert!(body.contains("let mut astn = AstNode::new(self.pos, \"ws\");"));
    assert!(!body.contains("parent.add_child(astn);"));
    assert!(body.contains("Ret::Ok"));
  }

  #[test]
  fn inline_rule_returns_inline_and_is_wrapped_at_call_site() {
    let out = emit(r#"doc : word+; word inline : [A-Za-z]+;"#);

    let word = fn_body(&out, "parse_word");
    assert!(word.contains("Ret::Inline"));
    assert!(!word.contains("parent.add_child"));

    let doc = fn_body(&out, "parse_doc");
    assert!(doc.contains("let start1 = self.pos;"));
    assert!(doc.contains(
      "let text = String::from_utf8_lossy(&self.text[start1..self.pos]).into_owned();"));
  }

  #[test]
  fn non_inline_reference_is_not_wrapped() {
    let out = emit(r#"doc : item; item : "x";"#);
    let doc = fn_body(&out, "parse_doc");
    assert!(!doc.contains("String::from_utf8_lossy"));
  }

  #[test]
  fn mergeup_rule_targets_parent() {
    let out = emit(r#"root : pair; pair mergeup : "a" "b";"#);
    let pair = fn_body(&out, "parse_pair");
    assert!(pair.contains("parent.children.append(&mut node0.children);"));
    assert!(!pair.contains("AstNode::new(self.pos, \"pair\")"));
  }

  #[test]
  fn class_expression_shapes() {
    let out = emit(r#"root : [A-Za-z];"#);
    assert!(out.contains("if ((cp >= 65 && cp <= 90) || (cp >= 97 && cp <= 122)) {"));

    let out = emit(r#"root : [^\n];"#);
    assert!(out.contains("if !((cp == 10)) {"));

    let out = emit(r#"root : [a-z!c];"#);
    assert!(out.contains("if cp != 99 && ((cp >= 97 && cp <= 122)) {"));
  }

  #[test]
  fn class_advances_line_on_newline() {
    let out = emit(r#"root : [\n];"#);
    assert!(out.contains("if cp == 10 {"));
    assert!(out.contains("self.line += 1;"));
  }

  #[test]
  fn string_literal_is_reescaped() {
    let out = emit("root : \"a\\nb\";");
    assert!(out.contains(r#"let lit1 = "a\nb";"#));

    let out = emit(r#"root : "say \"hi\"";"#);
    assert!(out.contains(r#"let lit1 = "say \"hi\"";"#));
  }

  #[test]
  fn quantifier_loops() {
    let out = emit(r#"root : "a"* "b"+ "c"?;"#);
    // the star and plus loops both carry a progress guard
    assert!(out.contains("if !ok1 || self.pos == rep1 {"));
    assert!(out.contains("let mut count2 = 0;"));
    assert!(out.contains("if count2 == 0 {"));
  }

  #[test]
  fn groups_nest_with_fresh_depth_indices() {
    let out = emit(r#"root : ( "a" ( "b" | "c" )+ | "d" );"#);
    let body = fn_body(&out, "parse_root");
    // rule alternation at depth 0, group at the element index, inner group deeper
    assert!(body.contains("'a0: {"));
    assert!(body.contains("'a1: {"));
    assert!(body.contains("'a3: {"));
    assert!(body.contains("node0.children.append(&mut node1.children);"));
  }

  #[test]
  fn alternation_resets_between_branches() {
    let out = emit(r#"root : "ab" | "ac";"#);
    let body = fn_body(&out, "parse_root");
    assert!(body.contains("self.reset(mark0);"));
    assert!(body.matches("if ok0 {").count() >= 2);
  }

  #[test]
  fn rule_comments_carry_canonical_text() {
    let out = emit(r#"root : item | "x"; item : [0-9];"#);
    assert!(out.contains(r#"// root : item | "x" ;"#));
    assert!(out.contains("// item : [0-9] ;"));
  }

  fn fn_body<'a>(out: &'a str, name: &str) -> &'a str {
    let start = out.find(&format!("fn {}(", name))
      .unwrap_or_else(|| panic!("missing {}", name));
    let rest = &out[start..];
    let end = rest.find("\n  fn ").unwrap_or(rest.len());
    &rest[..end]
  }
}
