//! Hand-written recursive-descent parser for the grammar meta-language.
//!
//! ```text
//! rules    : ws (comment ws)* rule+
//! rule     : id ws modifier? ws ':' ws alts ws ';' ws (comment ws)*
//! modifier : "discard" | "inline" | "mergeup"
//! alts     : alt (ws '|' ws alt)*
//! alt      : elem (ws elem)*
//! elem     : (group | id | ch_class | string) [?*+]?
//! group    : '(' ws alts ws ')'
//! string   : '"' char* '"'
//! ch_class : '[' '^'? range ('!'? range)* ']'
//! range    : char ('-' char)?
//! id       : [A-Za-z][0-9A-Za-z_]*
//! ws       : [ \t\r\n]*
//! comment  : '#' [^\r\n]*
//! ```
//!
//! Every sub-parser restores the cursor on failure, so ordered choice never
//! needs pre-scanning. Two extra cursors record the furthest successful
//! advance and the furthest failed attempt for diagnostics.

use std::fmt;

use crate::ast::{
  CharClass, ClassRange, Elem, ElemKind, Grammar, Modifier, Quantifier, Rule,
  Spanned,
};
use crate::chars;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
  pub kind: ParseErrorKind,
  /// Byte span of the failure; for syntax errors this is the furthest
  /// failed position.
  pub span: (usize, usize),
  pub line: u32,
  pub col: u32,
  /// Cursor of the furthest successful advance before the failure.
  pub pos_ok: usize,
  pub line_ok: u32,
  pub col_ok: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
  Syntax,
  DuplicateRule(String),
  InvalidEscape,
}

impl fmt::Display for ParseError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match &self.kind {
      ParseErrorKind::Syntax => write!(
        f,
        "syntax error near byte {} (line {} column {}); \
         last complete match ended at byte {} (line {} column {})",
        self.span.0, self.line, self.col,
        self.pos_ok, self.line_ok, self.col_ok),
      ParseErrorKind::DuplicateRule(name) => write!(
        f,
        "duplicate rule name '{}' at line {} column {}",
        name, self.line, self.col),
      ParseErrorKind::InvalidEscape => write!(
        f,
        "invalid escape sequence at line {} column {}",
        self.line, self.col),
    }
  }
}

pub fn parse(text: &str) -> Result<Grammar, ParseError> {
  Parser::new(text).parse_rules()
}

type Parse<T> = Result<T, Flow>;

enum Flow {
  /// Ordinary match failure; the attempting parser has restored the cursor.
  Miss,
  /// Unrecoverable error; aborts the whole parse.
  Fatal(ParseError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cursor {
  pos: usize,
  line: u32,
  col: u32,
}

impl Cursor {
  fn start() -> Self {
    Self { pos: 0, line: 1, col: 1 }
  }
}

struct Parser<'a> {
  text: &'a [u8],
  cur: Cursor,
  ok: Cursor,
  fail: Cursor,
}

impl<'a> Parser<'a> {
  fn new(text: &'a str) -> Self {
    Self {
      text: text.as_bytes(),
      cur: Cursor::start(),
      ok: Cursor::start(),
      fail: Cursor::start(),
    }
  }

  // rules : ws (comment ws)* rule+
  fn parse_rules(mut self) -> Result<Grammar, ParseError> {
    self.ws();
    self.comments();

    let mut grammar = Grammar::default();
    while !self.at_end() {
      match self.rule(&mut grammar) {
        Ok(()) => {}
        Err(Flow::Miss) => return Err(self.syntax_error()),
        Err(Flow::Fatal(err)) => return Err(err),
      }
    }

    if grammar.rules.is_empty() {
      return Err(self.syntax_error());
    }

    Ok(grammar)
  }

  // rule : id ws modifier? ws ':' ws alts ws ';' ws (comment ws)*
  fn rule(&mut self, grammar: &mut Grammar) -> Parse<()> {
    let saved = self.mark();
    self.ws();

    let name_at = self.mark();
    let name = match self.ident() {
      Some(name) => name,
      None => return self.miss(saved),
    };

    if grammar.rules.contains_key(&name.1) {
      return self.fatal_at(
        ParseErrorKind::DuplicateRule(name.1.clone()),
        name.0,
        name_at);
    }

    self.ws();

    // modifier : "discard" | "inline" | "mergeup"
    let modifier = match self.ident() {
      Some((_, word)) => match word.as_str() {
        "discard" => Modifier::Discard,
        "inline" => Modifier::Inline,
        "mergeup" => Modifier::Mergeup,
        _ => return self.miss(saved),
      },
      None => Modifier::None,
    };

    self.ws();
    if !self.eat(b':') {
      return self.miss(saved);
    }
    self.ws();

    let alts = match self.alts() {
      Ok(alts) => alts,
      Err(Flow::Miss) => return self.miss(saved),
      Err(Flow::Fatal(err)) => return Err(Flow::Fatal(err)),
    };

    self.ws();
    if !self.eat(b';') {
      return self.miss(saved);
    }

    self.ws();
    self.comments();

    grammar.rules.insert(name.1.clone(), Rule { name, modifier, alts });
    Ok(())
  }

  // alts : alt (ws '|' ws alt)*
  fn alts(&mut self) -> Parse<Vec<Elem>> {
    let saved = self.mark();
    let mut alts = vec![self.alt()?];

    loop {
      self.ws();
      if !self.eat(b'|') {
        break;
      }
      self.ws();
      match self.alt() {
        Ok(alt) => alts.push(alt),
        // a trailing '|' fails the whole list
        Err(Flow::Miss) => return self.miss(saved),
        Err(Flow::Fatal(err)) => return Err(Flow::Fatal(err)),
      }
    }

    Ok(alts)
  }

  // alt : elem (ws elem)*
  fn alt(&mut self) -> Parse<Elem> {
    let saved = self.mark();
    let mut elems = vec![];

    loop {
      match self.element() {
        Ok(elem) => {
          elems.push(elem);
          self.ws();
        }
        Err(Flow::Miss) => break,
        Err(Flow::Fatal(err)) => return Err(Flow::Fatal(err)),
      }
    }

    if elems.is_empty() {
      return self.miss(saved);
    }

    Ok(Elem::new(ElemKind::Alt(elems)))
  }

  // elem : (group | id | ch_class | string) [?*+]?
  fn element(&mut self) -> Parse<Elem> {
    let saved = self.mark();

    let kind = match self.peek() {
      Some(b'(') => self.group()?,
      Some(b'[') => self.ch_class()?,
      Some(b'"') => self.string()?,
      Some(b) if b.is_ascii_alphabetic() => {
        // cannot miss, the leading byte is alphabetic
        ElemKind::Name(self.ident().unwrap())
      }
      _ => return self.miss(saved),
    };

    self.ws();
    let quantifier = match self.peek() {
      Some(b'?') => {
        self.bump();
        self.note_ok();
        Quantifier::ZeroOrOne
      }
      Some(b'*') => {
        self.bump();
        self.note_ok();
        Quantifier::ZeroOrMore
      }
      Some(b'+') => {
        self.bump();
        self.note_ok();
        Quantifier::OneOrMore
      }
      _ => Quantifier::One,
    };

    Ok(Elem { kind, quantifier })
  }

  // group : '(' ws alts ws ')'
  fn group(&mut self) -> Parse<ElemKind> {
    let saved = self.mark();
    self.bump();
    self.note_ok();
    self.ws();

    let alts = match self.alts() {
      Ok(alts) => alts,
      Err(Flow::Miss) => return self.miss(saved),
      Err(Flow::Fatal(err)) => return Err(Flow::Fatal(err)),
    };

    self.ws();
    if !self.eat(b')') {
      return self.miss(saved);
    }

    Ok(ElemKind::Group(alts))
  }

  // string : '"' char* '"'
  fn string(&mut self) -> Parse<ElemKind> {
    let saved = self.mark();
    self.bump();
    let mut escaped = false;

    loop {
      match self.peek() {
        None => return self.miss(saved),
        Some(b) if b < 0x20 => return self.miss(saved),
        Some(b'\\') if !escaped => {
          escaped = true;
          self.bump();
        }
        Some(b'"') if !escaped => {
          self.bump();
          self.note_ok();
          return Ok(ElemKind::Str(self.spanned_from(saved)));
        }
        Some(_) => {
          escaped = false;
          self.bump();
        }
      }
    }
  }

  // ch_class : '[' '^'? range ('!'? range)* ']'
  fn ch_class(&mut self) -> Parse<ElemKind> {
    let saved = self.mark();
    self.bump();
    self.note_ok();

    let negated = self.eat(b'^');

    // the first range is required and is always additive
    let mut items = vec![];
    match self.class_range(false) {
      Ok(item) => items.push(item),
      Err(Flow::Miss) => return self.miss(saved),
      Err(Flow::Fatal(err)) => return Err(Flow::Fatal(err)),
    }

    loop {
      if self.peek() == Some(b']') {
        break;
      }
      let range_saved = self.mark();
      let subtract = self.eat(b'!');
      match self.class_range(subtract) {
        Ok(item) => items.push(item),
        Err(Flow::Miss) => {
          self.cur = range_saved;
          break;
        }
        Err(Flow::Fatal(err)) => return Err(Flow::Fatal(err)),
      }
    }

    if !self.eat(b']') {
      return self.miss(saved);
    }

    Ok(ElemKind::Class(CharClass {
      negated,
      items,
      span: (saved.pos, self.cur.pos),
    }))
  }

  // range : char ('-' char)?
  //
  // Range ordering (`c1 < c2`) is left to the validator; only the shape is
  // checked here.
  fn class_range(&mut self, subtract: bool) -> Parse<ClassRange> {
    let saved = self.mark();

    let lo = self.class_char()?;

    let hi = if self.peek() == Some(b'-') {
      self.bump();
      self.note_ok();
      // a class cannot end with a dangling '-'
      if self.peek() == Some(b']') {
        return self.miss(saved);
      }
      match self.class_char() {
        Ok(hi) => Some(hi),
        Err(Flow::Miss) => return self.miss(saved),
        Err(Flow::Fatal(err)) => return Err(Flow::Fatal(err)),
      }
    } else {
      None
    };

    Ok(ClassRange { subtract, lo, hi })
  }

  // char : any byte >= 0x20 (UTF-8), or '\' escape
  //
  // The reserved characters ! - [ \ ] ^ must be escaped to appear as
  // literal endpoints.
  fn class_char(&mut self) -> Parse<Spanned<String>> {
    let saved = self.mark();

    let b = match self.peek() {
      Some(b) => b,
      None => return self.miss(saved),
    };

    if b < 0x20 {
      return self.miss(saved);
    }

    if b >= 0x80 {
      return match chars::utf8_to_int32(&self.text[self.cur.pos..]) {
        Some((_, len)) => {
          for _ in 0..len {
            self.bump();
          }
          self.note_ok();
          Ok(self.spanned_from(saved))
        }
        None => self.miss(saved),
      };
    }

    if b == b'\\' {
      self.bump();
      let e = match self.peek() {
        Some(e) => e,
        None => {
          return self.fatal_at(
            ParseErrorKind::InvalidEscape,
            (saved.pos, self.cur.pos),
            saved);
        }
      };
      return match e {
        b'a' | b'b' | b'f' | b'n' | b'r' | b't' | b'v'
        | b'!' | b'-' | b'[' | b'\\' | b']' | b'^' => {
          self.bump();
          self.note_ok();
          Ok(self.spanned_from(saved))
        }
        b'u' => {
          self.bump();
          self.hex_digits(4, saved)?;
          Ok(self.spanned_from(saved))
        }
        b'U' => {
          self.bump();
          self.hex_digits(8, saved)?;
          Ok(self.spanned_from(saved))
        }
        _ => self.fatal_at(
          ParseErrorKind::InvalidEscape,
          (saved.pos, self.cur.pos),
          saved),
      };
    }

    // unescaped reserved characters structure or terminate the class
    if matches!(b, b'!' | b'-' | b'[' | b']' | b'^') {
      return self.miss(saved);
    }

    self.bump();
    self.note_ok();
    Ok(self.spanned_from(saved))
  }

  fn hex_digits(&mut self, n: usize, saved: Cursor) -> Parse<()> {
    for _ in 0..n {
      match self.peek() {
        Some(b) if b.is_ascii_hexdigit() => self.bump(),
        _ => {
          return self.fatal_at(
            ParseErrorKind::InvalidEscape,
            (saved.pos, self.cur.pos),
            saved);
        }
      }
    }
    self.note_ok();
    Ok(())
  }

  // id : [A-Za-z][0-9A-Za-z_]*
  fn ident(&mut self) -> Option<Spanned<String>> {
    let start = self.cur.pos;
    match self.peek() {
      Some(b) if b.is_ascii_alphabetic() => self.bump(),
      _ => return None,
    }
    while let Some(b) = self.peek() {
      if b == b'_' || b.is_ascii_alphanumeric() {
        self.bump();
      } else {
        break;
      }
    }
    self.note_ok();
    let name =
      String::from_utf8_lossy(&self.text[start..self.cur.pos]).into_owned();
    Some(((start, self.cur.pos), name))
  }

  // ws : [ \t\r\n]*
  fn ws(&mut self) {
    while let Some(b' ' | b'\t' | b'\r' | b'\n') = self.peek() {
      self.bump();
    }
  }

  // comment : '#' [^\r\n]*
  fn comment(&mut self) {
    if self.peek() != Some(b'#') {
      return;
    }
    while let Some(b) = self.peek() {
      if b == b'\r' || b == b'\n' {
        break;
      }
      self.bump();
    }
  }

  // (comment ws)*
  fn comments(&mut self) {
    loop {
      let before = self.cur.pos;
      self.comment();
      self.ws();
      if self.cur.pos == before {
        break;
      }
    }
  }

  fn at_end(&self) -> bool {
    self.cur.pos >= self.text.len()
  }

  fn peek(&self) -> Option<u8> {
    self.text.get(self.cur.pos).copied()
  }

  // '\n' starts a new line, '\r' advances the offset only, and UTF-8
  // continuation bytes do not count as columns
  fn bump(&mut self) {
    let b = self.text[self.cur.pos];
    self.cur.pos += 1;
    match b {
      b'\n' => {
        self.cur.line += 1;
        self.cur.col = 1;
      }
      b'\r' => {}
      b if b & 0xc0 == 0x80 => {}
      _ => self.cur.col += 1,
    }
  }

  fn eat(&mut self, b: u8) -> bool {
    if self.peek() == Some(b) {
      self.bump();
      self.note_ok();
      true
    } else {
      false
    }
  }

  fn mark(&self) -> Cursor {
    self.cur
  }

  fn note_ok(&mut self) {
    if self.cur.pos > self.ok.pos {
      self.ok = self.cur;
    }
  }

  /// Records the failed position, restores the cursor and reports a miss.
  fn miss<T>(&mut self, saved: Cursor) -> Parse<T> {
    if self.cur.pos >= self.fail.pos {
      self.fail = self.cur;
    }
    self.cur = saved;
    Err(Flow::Miss)
  }

  fn fatal_at<T>(
    &self,
    kind: ParseErrorKind,
    span: (usize, usize),
    at: Cursor,
  ) -> Parse<T> {
    Err(Flow::Fatal(ParseError {
      kind,
      span,
      line: at.line,
      col: at.col,
      pos_ok: self.ok.pos,
      line_ok: self.ok.line,
      col_ok: self.ok.col,
    }))
  }

  fn syntax_error(&self) -> ParseError {
    ParseError {
      kind: ParseErrorKind::Syntax,
      span: (self.fail.pos, self.fail.pos),
      line: self.fail.line,
      col: self.fail.col,
      pos_ok: self.ok.pos,
      line_ok: self.ok.line,
      col_ok: self.ok.col,
    }
  }

  fn spanned_from(&self, saved: Cursor) -> Spanned<String> {
    let raw =
      String::from_utf8_lossy(&self.text[saved.pos..self.cur.pos]).into_owned();
    ((saved.pos, self.cur.pos), raw)
  }
}
