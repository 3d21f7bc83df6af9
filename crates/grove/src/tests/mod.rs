//! Crate-level unit and behaviour tests, plus helpers shared with the
//! per-module test suites.

mod behaviour;
mod unit;

use crate::{Grammar, Parser, Tree};

/// The bundled Python grammar.
pub(crate) fn python_grammar() -> Grammar {
    Grammar::try_from(tree_sitter::Language::new(tree_sitter_python::LANGUAGE))
        .unwrap_or_else(|err| panic!("python grammar: {err}"))
}

/// The bundled Rust grammar.
pub(crate) fn rust_grammar() -> Grammar {
    Grammar::try_from(tree_sitter::Language::new(tree_sitter_rust::LANGUAGE))
        .unwrap_or_else(|err| panic!("rust grammar: {err}"))
}

/// A parser configured for `grammar`.
pub(crate) fn parser_for(grammar: Grammar) -> Parser {
    let mut parser = Parser::new().unwrap_or_else(|err| panic!("parser: {err}"));
    parser
        .set_language(grammar)
        .unwrap_or_else(|err| panic!("set language: {err}"));
    parser
}

/// Parses Python `source` from scratch.
pub(crate) fn python_tree(source: &str) -> Tree {
    parser_for(python_grammar())
        .parse_str(None, source)
        .unwrap_or_else(|err| panic!("parse: {err}"))
        .unwrap_or_else(|| panic!("parse of {source:?} produced no tree"))
}
