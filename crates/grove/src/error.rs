//! Error types for the binding layer.
//!
//! Configuration, compile, and bounds failures are surfaced as errors. Soft
//! "not found" outcomes (a missing sibling, an exhausted cursor, a parse that
//! timed out) are ordinary `Option`/`bool` results and never appear here.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T, E = BindingError> = std::result::Result<T, E>;

/// Errors raised by the binding layer.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BindingError {
    /// A native constructor returned a null or otherwise unusable value.
    #[error("failed to allocate native {resource}")]
    Allocation {
        /// Name of the resource that failed to allocate.
        resource: &'static str,
    },

    /// The handle was already released.
    #[error("native {resource} was already released")]
    Released {
        /// Name of the released resource.
        resource: &'static str,
    },

    /// The tree registry observed an impossible state.
    #[error("tree registry inconsistency at {address:#x}: {detail}")]
    RegistryConsistency {
        /// Address of the native tree involved.
        address: usize,
        /// Description of the inconsistency.
        detail: String,
    },

    /// An index fell outside the declared count.
    #[error("{what} index {index} out of range (len = {len})")]
    IndexOutOfRange {
        /// What was being indexed.
        what: &'static str,
        /// Requested index.
        index: u32,
        /// Number of valid entries.
        len: u32,
    },

    /// A byte or point range was rejected by the engine.
    #[error("invalid range: {message}")]
    InvalidRange {
        /// Description of the rejected range.
        message: String,
    },

    /// Source text exceeds what the engine can address.
    #[error("input of {len} bytes exceeds the engine's 4 GiB limit")]
    InputTooLarge {
        /// Length of the rejected input.
        len: usize,
    },

    /// The grammar's ABI version is outside the supported window.
    #[error("incompatible grammar ABI version {version} (supported: {min}..={max})")]
    IncompatibleGrammar {
        /// Version reported by the grammar.
        version: u32,
        /// Minimum compatible version.
        min: u32,
        /// Maximum supported version.
        max: u32,
    },

    /// No shared library for the named grammar was found on the search path.
    #[error("no grammar library found for `{name}` (searched: {})", display_paths(searched))]
    GrammarNotFound {
        /// Grammar name that was looked up.
        name: String,
        /// Directories that were searched, in order.
        searched: Vec<PathBuf>,
    },

    /// Loading a grammar from a shared library failed.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Query source failed to compile.
    #[error(transparent)]
    QueryCompile(#[from] QueryCompileError),

    /// A query predicate was malformed.
    #[error("query predicate error on line {row}: {message}")]
    Predicate {
        /// Zero-based row of the pattern that holds the predicate.
        row: usize,
        /// Description of the problem.
        message: String,
    },

    /// Writing diagnostic output failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl BindingError {
    /// Creates an allocation error.
    #[must_use]
    pub const fn allocation(resource: &'static str) -> Self {
        Self::Allocation { resource }
    }

    /// Creates a released-handle error.
    #[must_use]
    pub const fn released(resource: &'static str) -> Self {
        Self::Released { resource }
    }

    /// Creates a registry consistency error.
    #[must_use]
    pub fn registry(address: usize, detail: impl Into<String>) -> Self {
        Self::RegistryConsistency {
            address,
            detail: detail.into(),
        }
    }

    /// Creates an index bounds error.
    #[must_use]
    pub const fn index_out_of_range(what: &'static str, index: u32, len: u32) -> Self {
        Self::IndexOutOfRange { what, index, len }
    }

    /// Creates an invalid range error.
    #[must_use]
    pub fn invalid_range(message: impl Into<String>) -> Self {
        Self::InvalidRange {
            message: message.into(),
        }
    }

    /// Creates a predicate error.
    #[must_use]
    pub fn predicate(row: usize, message: impl Into<String>) -> Self {
        Self::Predicate {
            row,
            message: message.into(),
        }
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Failures while loading a grammar from a shared library.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoadError {
    /// The shared object could not be opened.
    #[error("failed to load grammar library {}: {source}", path.display())]
    Library {
        /// Path that was opened.
        path: PathBuf,
        /// Loader failure.
        #[source]
        source: libloading::Error,
    },

    /// The library does not export the grammar's factory symbol.
    #[error("symbol `{symbol}` not found in {}", path.display())]
    SymbolNotFound {
        /// Symbol that was looked up.
        symbol: String,
        /// Library that was searched.
        path: PathBuf,
    },

    /// The factory symbol returned a null grammar.
    #[error("`{symbol}` returned a null grammar")]
    NullLanguage {
        /// Factory that was invoked.
        symbol: String,
    },

    /// The grammar was generated for an unsupported ABI.
    #[error("grammar ABI version {version} is not supported (supported: {min}..={max})")]
    IncompatibleVersion {
        /// Version reported by the grammar.
        version: u32,
        /// Minimum compatible version.
        min: u32,
        /// Maximum supported version.
        max: u32,
    },
}

/// Category of a query compilation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum QueryErrorKind {
    /// Malformed query syntax.
    Syntax,
    /// Reference to a node type the grammar does not define.
    NodeType,
    /// Reference to a field the grammar does not define.
    Field,
    /// Reference to an undeclared capture in a predicate.
    Capture,
    /// A pattern that can never match given the grammar's structure.
    Structure,
    /// The grammar is incompatible with the query engine.
    Language,
}

impl fmt::Display for QueryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Syntax => "syntax",
            Self::NodeType => "node type",
            Self::Field => "field",
            Self::Capture => "capture",
            Self::Structure => "structure",
            Self::Language => "language",
        };
        f.write_str(label)
    }
}

/// A query failed to compile.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} error at {row}:{column} (byte {offset}): {message}")]
pub struct QueryCompileError {
    /// Failure category.
    pub kind: QueryErrorKind,
    /// Byte offset into the query source where compilation stopped.
    pub offset: usize,
    /// Zero-based row of `offset`.
    pub row: usize,
    /// Zero-based byte column of `offset`.
    pub column: usize,
    /// The offending token, or the source line for syntax errors.
    pub message: String,
}
