//! Dynamic grammar loading.
//!
//! Grammars compiled as shared libraries export a single factory function,
//! `tree_sitter_<name>`, that returns the grammar's static tables. The
//! library is never unloaded once a grammar has been taken from it.

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};
use tree_sitter::ffi;

use crate::error::{BindingError, LoadError, Result};
use crate::language::{Grammar, check_abi_version};

/// Environment variable holding extra grammar directories, separated like
/// `PATH`.
pub const PARSERS_ENV: &str = "TREE_SITTER_PARSERS";

#[cfg(target_os = "macos")]
const LIBRARY_EXTENSIONS: &[&str] = &["dylib", "so"];
#[cfg(not(target_os = "macos"))]
const LIBRARY_EXTENSIONS: &[&str] = &["so", "dylib"];

const DEFAULT_DIRS: &[&str] = &[
    ".vendor/parsers",
    ".vendor/tree-sitter-parsers",
    "vendor/parsers",
    "vendor/tree-sitter-parsers",
    "parsers",
    "tree-sitter-parsers",
    "/opt/local/lib",
    "/opt/lib",
    "/usr/local/lib",
    "/usr/lib",
];

type LanguageFn = unsafe extern "C" fn() -> *const ffi::TSLanguage;

/// Name of the factory symbol exported for grammar `name`.
#[must_use]
pub fn symbol_name(name: &str) -> String {
    format!("tree_sitter_{}", name.replace('-', "_"))
}

/// Opens the shared library at `path` and pulls grammar `name` out of it.
///
/// # Errors
///
/// Returns a [`LoadError`] when the library cannot be opened, the factory
/// symbol is missing, the factory returns null, or the grammar's ABI is out
/// of range.
pub fn load_library(name: &str, path: &Path) -> Result<Grammar, LoadError> {
    let symbol = symbol_name(name);
    // SAFETY: loading a grammar runs no initialisers beyond the platform
    // loader's own; grammar libraries are plain data plus lexer functions.
    let library = unsafe { Library::new(path) }.map_err(|source| LoadError::Library {
        path: path.to_path_buf(),
        source,
    })?;

    let raw = {
        // SAFETY: grammar factories take no arguments and return a pointer
        // to static tables.
        let factory: Symbol<'_, LanguageFn> = unsafe { library.get(symbol.as_bytes()) }
            .map_err(|_| LoadError::SymbolNotFound {
                symbol: symbol.clone(),
                path: path.to_path_buf(),
            })?;
        // SAFETY: as above.
        unsafe { factory() }
    };

    let grammar = Grammar::from_raw(raw).ok_or_else(|| LoadError::NullLanguage {
        symbol: symbol.clone(),
    })?;
    check_abi_version(grammar.abi_version())?;

    tracing::debug!(name, path = %path.display(), %symbol, "loaded grammar");
    // The grammar's tables live inside the library mapping.
    std::mem::forget(library);
    Ok(grammar)
}

/// Finds grammar libraries on a search path and loads them by name.
///
/// Directories are searched in order: those from [`PARSERS_ENV`], then any
/// added with [`GrammarLoader::with_dirs`], then the vendored and system
/// defaults. Relative defaults resolve against the working directory.
#[derive(Debug, Clone, Default)]
pub struct GrammarLoader {
    dirs: Vec<PathBuf>,
}

impl GrammarLoader {
    /// Loader whose search path starts with [`PARSERS_ENV`].
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_parsers_var(env::var_os(PARSERS_ENV))
    }

    fn from_parsers_var(value: Option<OsString>) -> Self {
        let dirs = value
            .map(|paths| env::split_paths(&paths).collect())
            .unwrap_or_default();
        Self { dirs }
    }

    /// Appends `dirs` to the search path, ahead of the defaults.
    #[must_use]
    pub fn with_dirs<I, P>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.dirs.extend(dirs.into_iter().map(Into::into));
        self
    }

    /// Full search path, including defaults.
    #[must_use]
    pub fn search_path(&self) -> Vec<PathBuf> {
        self.dirs
            .iter()
            .cloned()
            .chain(DEFAULT_DIRS.iter().map(PathBuf::from))
            .collect()
    }

    /// First existing library file for `name` on the search path.
    #[must_use]
    pub fn locate(&self, name: &str) -> Option<PathBuf> {
        self.search_path()
            .iter()
            .flat_map(|dir| candidates(dir, name))
            .find(|path| path.is_file())
    }

    /// Locates and loads grammar `name`.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::GrammarNotFound`] when no candidate file
    /// exists, or [`BindingError::Load`] when the file cannot be loaded.
    pub fn load(&self, name: &str) -> Result<Grammar> {
        let Some(path) = self.locate(name) else {
            return Err(BindingError::GrammarNotFound {
                name: name.to_owned(),
                searched: self.search_path(),
            });
        };
        Ok(load_library(name, &path)?)
    }
}

/// Candidate library paths for `name` inside `dir`.
fn candidates(dir: &Path, name: &str) -> Vec<PathBuf> {
    let stems = [
        name.to_owned(),
        format!("tree-sitter-{name}"),
        format!("libtree-sitter-{name}"),
    ];
    let mut paths = Vec::with_capacity(stems.len() * LIBRARY_EXTENSIONS.len() * 2);
    for base in [dir.to_path_buf(), dir.join(name)] {
        for stem in &stems {
            for ext in LIBRARY_EXTENSIONS {
                paths.push(base.join(format!("{stem}.{ext}")));
            }
        }
    }
    paths
}
