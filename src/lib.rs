mod gen_parser;
mod indent_writer;
mod tpl_engine;

pub use crate::gen_parser::gen;
