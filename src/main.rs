use std::env;
use std::fs;
use std::process;

use getopts::Options;

fn main() {
  let args = env::args().collect::<Vec<_>>();
  let prog = args[0].clone();
  let mut opts = Options::new();
  opts.optflag("d", "debug", "Dump the parsed rules to stderr before emitting");
  opts.optflag("h", "help", "Print this message");

  let matches = match opts.parse(&args[1..]) {
    Ok(m) => m,
    Err(err) => {
      eprintln!("{}", err);
      process::exit(1);
    }
  };

  if matches.opt_present("h") {
    print_usage(prog, opts);
    return;
  }

  let path = if matches.free.len() == 1 {
    matches.free[0].clone()
  } else {
    print_usage(prog, opts);
    process::exit(1);
  };

  let text = match fs::read_to_string(&path) {
    Ok(text) => text,
    Err(err) => {
      eprintln!("ERROR: cannot read '{}': {}", path, err);
      process::exit(1);
    }
  };

  let grammar = match grammar::build(&text) {
    Ok(grammar) => grammar,
    Err(err) => {
      grammar::report_error(&path, &text, &err);
      process::exit(1);
    }
  };

  if matches.opt_present("d") {
    for rule in grammar.rules.values() {
      eprintln!("{}", rule);
    }
  }

  print!("{}", peggen::gen(&grammar));
}

fn print_usage(prog: String, opts: Options) {
  let brief = format!("Usage: {} [options] GRAMMAR-FILE", prog);
  print!("{}", opts.usage(&brief));
}
