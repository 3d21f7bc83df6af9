//! Safe, reference-counted bindings over the tree-sitter parsing engine.
//!
//! The engine hands out raw pointers with strict lifetime rules: nodes are
//! views into a tree, cursors borrow trees, and queries must outlive the
//! cursors running them. This crate turns those rules into ownership:
//!
//! - [`Handle`] owns one native resource and frees it exactly once.
//! - [`TreeRegistry`] counts every alias of a native tree (the [`Tree`]
//!   itself, its clones, its [`Node`]s and its cursors) and frees the tree
//!   when the last alias goes away.
//! - [`TreeCursor`] and [`QueryCursor`] pin what they traverse, so a tree
//!   or [`Query`] dropped by the caller mid-iteration stays alive.
//! - [`Input`] and [`Logger`] bridge engine callbacks into Rust closures,
//!   converting panics into a clean abort of the parse.
//!
//! # Example
//!
//! ```
//! use grove::{Grammar, Parser, Query, QueryCursor};
//!
//! let grammar = Grammar::try_from(tree_sitter::Language::new(tree_sitter_python::LANGUAGE))?;
//! let mut parser = Parser::new()?;
//! parser.set_language(grammar)?;
//!
//! let source = "total = price * count\n";
//! let tree = parser.parse_str(None, source)?.expect("a language is set");
//!
//! let query = Query::new(grammar, "(identifier) @id")?;
//! let mut cursor = QueryCursor::new()?;
//! for found in cursor.matches(&query, &tree.root_node(), source.as_bytes()) {
//!     for capture in &found.captures {
//!         let _ = capture.node.utf8_text(source);
//!     }
//! }
//! # Ok::<(), grove::BindingError>(())
//! ```
//!
//! # Grammars
//!
//! Grammars linked into the program are adopted with
//! [`Grammar::try_from`]. Shared libraries are found by [`GrammarLoader`],
//! which searches the directories named by `TREE_SITTER_PARSERS` before the
//! built-in defaults.
//!
//! # Telemetry
//!
//! Everything logs through `tracing`. [`telemetry::initialise`] installs a
//! subscriber configured from [`Config`] for programs that do not bring
//! their own.

mod config;
mod error;
mod handle;
mod input;
mod language;
mod loader;
mod logger;
mod node;
mod parser;
mod position;
mod query;
mod registry;
pub mod telemetry;
mod tree;
mod tree_cursor;

pub use config::{Config, ConfigError, LOG_FILTER_ENV, LOG_FORMAT_ENV, LogFormat};
pub use error::{BindingError, LoadError, QueryCompileError, QueryErrorKind, Result};
pub use handle::{Handle, Resource};
pub use input::{Chunk, Input, SourceInput};
pub use language::{ABI_VERSION, Grammar, MIN_COMPATIBLE_ABI_VERSION, SymbolType, check_abi_version};
pub use loader::{GrammarLoader, PARSERS_ENV, load_library, symbol_name};
pub use logger::{DEFAULT_FORMAT, LogSink, LogType, Logger, TracingSink, WriteSink};
pub use node::Node;
pub use parser::{InputEncoding, Parser};
pub use position::{InputEdit, Point, Range};
pub use query::{
    GeneralPredicate, PredicateArg, PredicateStep, Quantifier, Query, QueryCapture, QueryCaptures,
    QueryCursor, QueryMatch, QueryMatches, TextPredicate,
};
pub use registry::TreeRegistry;
pub use tree::{DetachedTree, Tree};
pub use tree_cursor::{TreeCursor, Walk};

#[cfg(test)]
mod tests;
