//! Grammar handles and introspection.

use std::ffi::c_char;
use std::fmt;
use std::path::Path;
use std::ptr::NonNull;

use tree_sitter::ffi;

use crate::error::{BindingError, LoadError, Result};
use crate::node::static_str;

/// Oldest grammar ABI the engine can run.
pub const MIN_COMPATIBLE_ABI_VERSION: u32 = ffi::TREE_SITTER_MIN_COMPATIBLE_LANGUAGE_VERSION;

/// Newest grammar ABI the engine understands.
pub const ABI_VERSION: u32 = ffi::TREE_SITTER_LANGUAGE_VERSION;

/// Checks that `version` lies within the supported ABI window.
///
/// # Errors
///
/// Returns [`LoadError::IncompatibleVersion`] otherwise.
pub const fn check_abi_version(version: u32) -> Result<(), LoadError> {
    if version < MIN_COMPATIBLE_ABI_VERSION || version > ABI_VERSION {
        Err(LoadError::IncompatibleVersion {
            version,
            min: MIN_COMPATIBLE_ABI_VERSION,
            max: ABI_VERSION,
        })
    } else {
        Ok(())
    }
}

/// Classification of grammar symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolType {
    /// A named rule.
    Regular,
    /// An anonymous token such as `"+"`.
    Anonymous,
    /// A supertype grouping other rules.
    Supertype,
    /// A hidden helper rule.
    Auxiliary,
}

/// An immutable grammar shared by parsers, trees, and queries.
///
/// Grammars are never freed: statically linked ones live in the binary and
/// dynamically loaded ones keep their library mapped for the life of the
/// process.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Grammar {
    raw: NonNull<ffi::TSLanguage>,
}

// SAFETY: grammars are immutable tables that the engine reads concurrently.
unsafe impl Send for Grammar {}
// SAFETY: as above.
unsafe impl Sync for Grammar {}

impl Grammar {
    pub(crate) fn from_raw(raw: *const ffi::TSLanguage) -> Option<Self> {
        NonNull::new(raw.cast_mut()).map(|raw| Self { raw })
    }

    pub(crate) const fn as_ptr(self) -> *const ffi::TSLanguage {
        self.raw.as_ptr().cast_const()
    }

    /// Loads the grammar `name` from the shared library at `path`.
    ///
    /// The entry point is `tree_sitter_<name>` with dashes replaced by
    /// underscores. The library stays loaded for the rest of the process.
    ///
    /// # Errors
    ///
    /// Returns a [`LoadError`] when the library cannot be opened, lacks the
    /// entry point, returns a null grammar, or targets an unsupported ABI.
    pub fn load(name: &str, path: impl AsRef<Path>) -> Result<Self, LoadError> {
        crate::loader::load_library(name, path.as_ref())
    }

    /// ABI version the grammar was generated for.
    #[must_use]
    pub fn abi_version(self) -> u32 {
        // SAFETY: grammars are valid for the life of the process.
        unsafe { ffi::ts_language_abi_version(self.as_ptr()) }
    }

    /// Name recorded in the grammar, if any.
    #[must_use]
    pub fn name(self) -> Option<&'static str> {
        // SAFETY: grammars are valid for the life of the process.
        static_str(unsafe { ffi::ts_language_name(self.as_ptr()) })
    }

    /// Number of symbols.
    #[must_use]
    pub fn symbol_count(self) -> u32 {
        // SAFETY: grammars are valid for the life of the process.
        unsafe { ffi::ts_language_symbol_count(self.as_ptr()) }
    }

    /// Name of `symbol`.
    #[must_use]
    pub fn symbol_name(self, symbol: u16) -> Option<&'static str> {
        // SAFETY: grammars are valid for the life of the process.
        static_str(unsafe { ffi::ts_language_symbol_name(self.as_ptr(), symbol) })
    }

    /// Symbol for `name`; `named` selects named or anonymous nodes.
    #[must_use]
    pub fn symbol_for_name(self, name: &str, named: bool) -> Option<u16> {
        let len = u32::try_from(name.len()).ok()?;
        // SAFETY: the pointer and length describe `name`.
        let symbol = unsafe {
            ffi::ts_language_symbol_for_name(
                self.as_ptr(),
                name.as_ptr().cast::<c_char>(),
                len,
                named,
            )
        };
        (symbol != 0).then_some(symbol)
    }

    /// Classification of `symbol`.
    #[must_use]
    pub fn symbol_type(self, symbol: u16) -> SymbolType {
        // SAFETY: grammars are valid for the life of the process.
        match unsafe { ffi::ts_language_symbol_type(self.as_ptr(), symbol) } {
            ffi::TSSymbolTypeAnonymous => SymbolType::Anonymous,
            ffi::TSSymbolTypeSupertype => SymbolType::Supertype,
            ffi::TSSymbolTypeAuxiliary => SymbolType::Auxiliary,
            _ => SymbolType::Regular,
        }
    }

    /// Number of fields.
    #[must_use]
    pub fn field_count(self) -> u32 {
        // SAFETY: grammars are valid for the life of the process.
        unsafe { ffi::ts_language_field_count(self.as_ptr()) }
    }

    /// Name of the field with id `field_id`.
    #[must_use]
    pub fn field_name_for_id(self, field_id: u16) -> Option<&'static str> {
        // SAFETY: grammars are valid for the life of the process.
        static_str(unsafe { ffi::ts_language_field_name_for_id(self.as_ptr(), field_id) })
    }

    /// Id of the field called `name`.
    #[must_use]
    pub fn field_id_for_name(self, name: &str) -> Option<u16> {
        let len = u32::try_from(name.len()).ok()?;
        // SAFETY: the pointer and length describe `name`.
        let id = unsafe {
            ffi::ts_language_field_id_for_name(self.as_ptr(), name.as_ptr().cast::<c_char>(), len)
        };
        (id != 0).then_some(id)
    }
}

impl TryFrom<tree_sitter::Language> for Grammar {
    type Error = BindingError;

    fn try_from(language: tree_sitter::Language) -> Result<Self> {
        let grammar = Self::from_raw(language.into_raw())
            .ok_or_else(|| BindingError::allocation("grammar"))?;
        check_abi_version(grammar.abi_version())?;
        Ok(grammar)
    }
}

impl fmt::Debug for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grammar")
            .field("name", &self.name())
            .field("abi_version", &self.abi_version())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(MIN_COMPATIBLE_ABI_VERSION)]
    #[case(ABI_VERSION)]
    fn supported_abi_versions_pass(#[case] version: u32) {
        assert!(check_abi_version(version).is_ok());
    }

    #[rstest]
    #[case(0)]
    #[case(MIN_COMPATIBLE_ABI_VERSION - 1)]
    #[case(ABI_VERSION + 1)]
    fn unsupported_abi_versions_fail(#[case] version: u32) {
        let Err(LoadError::IncompatibleVersion { version: seen, .. }) = check_abi_version(version)
        else {
            panic!("expected an ABI error for {version}");
        };
        assert_eq!(seen, version);
    }
}
