//! Compiled queries.
//!
//! A [`Query`] is compiled once against a [`Grammar`] and then executed any
//! number of times through a [`QueryCursor`]. Capture names, string literals,
//! and predicates are read out of the engine at construction time so that
//! lookups never cross the FFI boundary again.

mod cursor;
mod predicate;


use std::ffi::c_char;
use std::fmt;
use std::ptr;
use std::rc::Rc;
use std::slice;

use tree_sitter::ffi;

use crate::error::{BindingError, QueryCompileError, QueryErrorKind, Result};
use crate::handle::{Handle, Resource};
use crate::language::Grammar;
use crate::position::row_column;

pub use cursor::{QueryCapture, QueryCaptures, QueryCursor, QueryMatch, QueryMatches};
pub use predicate::{GeneralPredicate, PredicateArg, TextPredicate};

use predicate::{Names, PatternPredicates};

/// Native query.
pub(crate) struct NativeQuery;

impl Resource for NativeQuery {
    type Raw = *mut ffi::TSQuery;
    const NAME: &'static str = "query";

    fn is_valid(raw: &Self::Raw) -> bool {
        !raw.is_null()
    }

    unsafe fn destroy(raw: &mut Self::Raw) {
        // SAFETY: upheld by `Handle`.
        unsafe { ffi::ts_query_delete(*raw) };
    }
}

/// How often a capture may occur within one match of a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantifier {
    /// The capture does not occur in the pattern.
    Zero,
    /// `?`
    ZeroOrOne,
    /// `*`
    ZeroOrMore,
    /// Exactly once.
    One,
    /// `+`
    OneOrMore,
}

impl From<ffi::TSQuantifier> for Quantifier {
    fn from(raw: ffi::TSQuantifier) -> Self {
        match raw {
            ffi::TSQuantifierZeroOrOne => Self::ZeroOrOne,
            ffi::TSQuantifierZeroOrMore => Self::ZeroOrMore,
            ffi::TSQuantifierOne => Self::One,
            ffi::TSQuantifierOneOrMore => Self::OneOrMore,
            _ => Self::Zero,
        }
    }
}

/// One step of a pattern's predicate list, as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PredicateStep {
    /// Ends the current predicate.
    Done,
    /// A capture, by id.
    Capture(u32),
    /// A string literal, by id.
    String(u32),
}

impl From<&ffi::TSQueryPredicateStep> for PredicateStep {
    fn from(raw: &ffi::TSQueryPredicateStep) -> Self {
        match raw.type_ {
            ffi::TSQueryPredicateStepTypeCapture => Self::Capture(raw.value_id),
            ffi::TSQueryPredicateStepTypeString => Self::String(raw.value_id),
            _ => Self::Done,
        }
    }
}

pub(crate) struct QueryInner {
    handle: Handle<NativeQuery>,
    grammar: Grammar,
    pattern_count: u32,
    capture_names: Vec<String>,
    string_values: Vec<String>,
    predicates: Vec<PatternPredicates>,
}

impl QueryInner {
    pub(crate) fn as_ptr(&self) -> *mut ffi::TSQuery {
        self.handle.borrow().copied().unwrap_or(ptr::null_mut())
    }
}

/// A compiled set of patterns bound to one grammar.
pub struct Query {
    inner: Rc<QueryInner>,
}

impl Query {
    /// Compiles `source` for `grammar`.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::QueryCompile`] when the engine rejects the
    /// source, [`BindingError::Predicate`] when a predicate is malformed, and
    /// [`BindingError::InputTooLarge`] for sources beyond 4 GiB.
    pub fn new(grammar: Grammar, source: &str) -> Result<Self> {
        let len = u32::try_from(source.len())
            .map_err(|_| BindingError::InputTooLarge { len: source.len() })?;
        let mut error_offset = 0_u32;
        let mut error_kind = ffi::TSQueryErrorNone;
        // SAFETY: `source` is valid for `len` bytes and both out-pointers are
        // live locals.
        let raw = unsafe {
            ffi::ts_query_new(
                grammar.as_ptr(),
                source.as_ptr().cast::<c_char>(),
                len,
                &mut error_offset,
                &mut error_kind,
            )
        };
        if raw.is_null() {
            let offset = usize::try_from(error_offset).unwrap_or(usize::MAX);
            return Err(compile_error(source, offset, error_kind).into());
        }
        let handle = Handle::<NativeQuery>::allocate(raw)?;
        let query = raw;

        // SAFETY: `query` is live for the rest of this function.
        let (pattern_count, capture_count, string_count) = unsafe {
            (
                ffi::ts_query_pattern_count(query),
                ffi::ts_query_capture_count(query),
                ffi::ts_query_string_count(query),
            )
        };
        let capture_names = (0..capture_count)
            // SAFETY: `id` is below the capture count.
            .map(|id| read_name(|len| unsafe { ffi::ts_query_capture_name_for_id(query, id, len) }))
            .collect::<Vec<_>>();
        let string_values = (0..string_count)
            // SAFETY: `id` is below the string count.
            .map(|id| read_name(|len| unsafe { ffi::ts_query_string_value_for_id(query, id, len) }))
            .collect::<Vec<_>>();

        let names = Names {
            captures: &capture_names,
            strings: &string_values,
        };
        let mut predicates = Vec::with_capacity(usize::try_from(pattern_count).unwrap_or(0));
        for pattern in 0..pattern_count {
            let steps = raw_steps(query, pattern);
            // SAFETY: `pattern` is below the pattern count.
            let start = unsafe { ffi::ts_query_start_byte_for_pattern(query, pattern) };
            let (row, _) = row_column(source.as_bytes(), usize::try_from(start).unwrap_or(0));
            predicates.push(predicate::compile(&steps, &names, row)?);
        }

        tracing::debug!(
            patterns = pattern_count,
            captures = capture_count,
            strings = string_count,
            "compiled query"
        );
        Ok(Self {
            inner: Rc::new(QueryInner {
                handle,
                grammar,
                pattern_count,
                capture_names,
                string_values,
                predicates,
            }),
        })
    }

    pub(crate) const fn inner(&self) -> &Rc<QueryInner> {
        &self.inner
    }

    fn raw(&self) -> *mut ffi::TSQuery {
        self.inner.as_ptr()
    }

    fn check_pattern(&self, index: u32) -> Result<()> {
        if index < self.inner.pattern_count {
            Ok(())
        } else {
            Err(BindingError::index_out_of_range(
                "pattern",
                index,
                self.inner.pattern_count,
            ))
        }
    }

    /// Grammar the query was compiled for.
    #[must_use]
    pub fn grammar(&self) -> Grammar {
        self.inner.grammar
    }

    /// Number of patterns.
    #[must_use]
    pub fn pattern_count(&self) -> u32 {
        self.inner.pattern_count
    }

    /// Number of distinct capture names.
    #[must_use]
    pub fn capture_count(&self) -> u32 {
        count(self.inner.capture_names.len())
    }

    /// Number of distinct string literals.
    #[must_use]
    pub fn string_count(&self) -> u32 {
        count(self.inner.string_values.len())
    }

    /// All capture names, indexed by capture id.
    #[must_use]
    pub fn capture_names(&self) -> &[String] {
        &self.inner.capture_names
    }

    /// Id of the capture called `name`.
    #[must_use]
    pub fn capture_index_for_name(&self, name: &str) -> Option<u32> {
        self.inner
            .capture_names
            .iter()
            .position(|candidate| candidate == name)
            .and_then(|index| u32::try_from(index).ok())
    }

    /// Name of capture `id`.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::IndexOutOfRange`] if `id` is not below
    /// [`Query::capture_count`].
    pub fn capture_name_for_id(&self, id: u32) -> Result<&str> {
        lookup(&self.inner.capture_names, id, "capture")
    }

    /// Value of string literal `id`.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::IndexOutOfRange`] if `id` is not below
    /// [`Query::string_count`].
    pub fn string_value_for_id(&self, id: u32) -> Result<&str> {
        lookup(&self.inner.string_values, id, "string")
    }

    /// Quantifier of `capture` within `pattern`.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::IndexOutOfRange`] if either index is out of
    /// bounds.
    pub fn capture_quantifier_for_id(&self, pattern: u32, capture: u32) -> Result<Quantifier> {
        self.check_pattern(pattern)?;
        if capture >= self.capture_count() {
            return Err(BindingError::index_out_of_range(
                "capture",
                capture,
                self.capture_count(),
            ));
        }
        // SAFETY: both indices were checked against the query's counts.
        let raw = unsafe { ffi::ts_query_capture_quantifier_for_id(self.raw(), pattern, capture) };
        Ok(raw.into())
    }

    /// Raw predicate steps of `pattern`.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::IndexOutOfRange`] for an unknown pattern.
    pub fn predicates_for_pattern(&self, pattern: u32) -> Result<Vec<PredicateStep>> {
        self.check_pattern(pattern)?;
        Ok(raw_steps(self.raw(), pattern))
    }

    /// Text predicates compiled for `pattern`; empty for an unknown pattern.
    #[must_use]
    pub fn text_predicates(&self, pattern: u32) -> &[TextPredicate] {
        self.pattern_predicates(pattern)
            .map_or(&[], |predicates| predicates.text.as_slice())
    }

    /// Predicates of `pattern` this crate does not evaluate.
    #[must_use]
    pub fn general_predicates(&self, pattern: u32) -> &[GeneralPredicate] {
        self.pattern_predicates(pattern)
            .map_or(&[], |predicates| predicates.general.as_slice())
    }

    fn pattern_predicates(&self, pattern: u32) -> Option<&PatternPredicates> {
        usize::try_from(pattern)
            .ok()
            .and_then(|index| self.inner.predicates.get(index))
    }

    /// Byte offset in the query source where `pattern` starts.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::IndexOutOfRange`] for an unknown pattern.
    pub fn start_byte_for_pattern(&self, pattern: u32) -> Result<u32> {
        self.check_pattern(pattern)?;
        // SAFETY: `pattern` was bounds checked.
        Ok(unsafe { ffi::ts_query_start_byte_for_pattern(self.raw(), pattern) })
    }

    /// Byte offset in the query source where `pattern` ends.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::IndexOutOfRange`] for an unknown pattern.
    pub fn end_byte_for_pattern(&self, pattern: u32) -> Result<u32> {
        self.check_pattern(pattern)?;
        // SAFETY: `pattern` was bounds checked.
        Ok(unsafe { ffi::ts_query_end_byte_for_pattern(self.raw(), pattern) })
    }

    /// Whether `pattern` has a single root node.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::IndexOutOfRange`] for an unknown pattern.
    pub fn is_pattern_rooted(&self, pattern: u32) -> Result<bool> {
        self.check_pattern(pattern)?;
        // SAFETY: `pattern` was bounds checked.
        Ok(unsafe { ffi::ts_query_is_pattern_rooted(self.raw(), pattern) })
    }

    /// Whether `pattern` can match starting at more than one node.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::IndexOutOfRange`] for an unknown pattern.
    pub fn is_pattern_non_local(&self, pattern: u32) -> Result<bool> {
        self.check_pattern(pattern)?;
        // SAFETY: `pattern` was bounds checked.
        Ok(unsafe { ffi::ts_query_is_pattern_non_local(self.raw(), pattern) })
    }

    /// Whether a match is guaranteed once the step at `byte_offset` in the
    /// query source has matched.
    #[must_use]
    pub fn is_pattern_guaranteed_at_step(&self, byte_offset: u32) -> bool {
        // SAFETY: the engine treats unknown offsets as "not guaranteed".
        unsafe { ffi::ts_query_is_pattern_guaranteed_at_step(self.raw(), byte_offset) }
    }

    /// Stops reporting captures named `name`. This cannot be undone.
    pub fn disable_capture(&mut self, name: &str) {
        let Ok(len) = u32::try_from(name.len()) else {
            return;
        };
        // SAFETY: `name` is valid for `len` bytes.
        unsafe { ffi::ts_query_disable_capture(self.raw(), name.as_ptr().cast::<c_char>(), len) };
    }

    /// Stops matching `pattern`. This cannot be undone.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::IndexOutOfRange`] for an unknown pattern.
    pub fn disable_pattern(&mut self, pattern: u32) -> Result<()> {
        self.check_pattern(pattern)?;
        // SAFETY: `pattern` was bounds checked.
        unsafe { ffi::ts_query_disable_pattern(self.raw(), pattern) };
        Ok(())
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("patterns", &self.inner.pattern_count)
            .field("captures", &self.inner.capture_names)
            .finish_non_exhaustive()
    }
}

fn count(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

fn lookup<'a>(values: &'a [String], id: u32, what: &'static str) -> Result<&'a str> {
    usize::try_from(id)
        .ok()
        .and_then(|index| values.get(index))
        .map(String::as_str)
        .ok_or_else(|| BindingError::index_out_of_range(what, id, count(values.len())))
}

fn read_name(f: impl FnOnce(*mut u32) -> *const c_char) -> String {
    let mut len = 0_u32;
    let name = f(&mut len);
    if name.is_null() {
        return String::new();
    }
    let size = usize::try_from(len).unwrap_or(0);
    // SAFETY: the engine reports the length of the name it returned.
    let bytes = unsafe { slice::from_raw_parts(name.cast::<u8>(), size) };
    String::from_utf8_lossy(bytes).into_owned()
}

fn raw_steps(query: *const ffi::TSQuery, pattern: u32) -> Vec<PredicateStep> {
    let mut len = 0_u32;
    // SAFETY: callers pass a live query and an in-range pattern.
    let steps = unsafe { ffi::ts_query_predicates_for_pattern(query, pattern, &mut len) };
    if steps.is_null() {
        return Vec::new();
    }
    let size = usize::try_from(len).unwrap_or(0);
    // SAFETY: the engine owns `size` steps at `steps` for the query's lifetime.
    unsafe { slice::from_raw_parts(steps, size) }
        .iter()
        .map(PredicateStep::from)
        .collect()
}

fn compile_error(source: &str, offset: usize, raw_kind: ffi::TSQueryError) -> QueryCompileError {
    let (row, column) = row_column(source.as_bytes(), offset);
    let kind = match raw_kind {
        ffi::TSQueryErrorNodeType => QueryErrorKind::NodeType,
        ffi::TSQueryErrorField => QueryErrorKind::Field,
        ffi::TSQueryErrorCapture => QueryErrorKind::Capture,
        ffi::TSQueryErrorStructure => QueryErrorKind::Structure,
        ffi::TSQueryErrorLanguage => QueryErrorKind::Language,
        _ => QueryErrorKind::Syntax,
    };
    let message = match kind {
        QueryErrorKind::NodeType | QueryErrorKind::Field | QueryErrorKind::Capture => {
            let rest = source.get(offset..).unwrap_or_default();
            rest.split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-'))
                .next()
                .unwrap_or_default()
                .to_owned()
        }
        _ => source.lines().nth(row).unwrap_or_default().to_owned(),
    };
    tracing::debug!(%kind, row, column, "query failed to compile");
    QueryCompileError {
        kind,
        offset,
        row,
        column,
        message,
    }
}
