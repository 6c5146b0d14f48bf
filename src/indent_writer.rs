use std::fmt::{self, Write};

/// `fmt::Write` wrapper that prefixes every non-empty line with the current
/// indentation (two spaces per level).
pub struct IndentWriter<W> {
  inner: W,
  bol: bool,
  indent: usize,
}

impl<W: Write> IndentWriter<W> {
  pub fn new(inner: W) -> Self {
    Self {
      inner,
      bol: true,
      indent: 0,
    }
  }

  pub fn indent(&mut self) {
    self.indent += 1;
  }

  pub fn dedent(&mut self) {
    assert!(self.indent > 0);
    self.indent -= 1;
  }

  pub fn into_inner(self) -> W {
    self.inner
  }

  fn write_indent(&mut self) -> fmt::Result {
    write!(&mut self.inner, "{:1$}", "", self.indent * 2)
  }
}

impl<W: Write> Write for IndentWriter<W> {
  fn write_str(&mut self, s: &str) -> fmt::Result {
    let mut first = true;
    for line in s.split('\n') {
      if !first {
        self.inner.write_char('\n')?;
        self.bol = true;
      }
      if self.bol && !line.is_empty() {
        self.write_indent()?;
        self.bol = false;
      }
      self.inner.write_str(line)?;
      first = false;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn indents_blocks() {
    let mut w = IndentWriter::new(String::new());
    writeln!(&mut w, "fn f() {{").unwrap();
    w.indent();
    writeln!(&mut w, "a;").unwrap();
    writeln!(&mut w, "b;\nc;").unwrap();
    w.dedent();
    writeln!(&mut w, "}}").unwrap();

    assert_eq!(w.into_inner(), "fn f() {\n  a;\n  b;\n  c;\n}\n");
  }

  #[test]
  fn blank_lines_stay_blank() {
    let mut w = IndentWriter::new(String::new());
    w.indent();
    writeln!(&mut w, "a;").unwrap();
    writeln!(&mut w).unwrap();
    writeln!(&mut w, "b;").unwrap();

    assert_eq!(w.into_inner(), "  a;\n\n  b;\n");
  }
}
