//! Executing queries.

use std::fmt;
use std::mem::MaybeUninit;
use std::ops::Range;
use std::rc::Rc;
use std::slice;

use tree_sitter::ffi;

use super::{Query, QueryInner};
use crate::error::{BindingError, Result};
use crate::handle::{Handle, Resource};
use crate::node::Node;
use crate::position::Point;
use crate::tree::Tree;

pub(crate) struct NativeQueryCursor;

impl Resource for NativeQueryCursor {
    type Raw = *mut ffi::TSQueryCursor;
    const NAME: &'static str = "query cursor";

    fn is_valid(raw: &Self::Raw) -> bool {
        !raw.is_null()
    }

    unsafe fn destroy(raw: &mut Self::Raw) {
        // SAFETY: upheld by `Handle`.
        unsafe { ffi::ts_query_cursor_delete(*raw) };
    }
}

/// One captured node.
#[derive(Debug, Clone)]
pub struct QueryCapture {
    /// The captured node.
    pub node: Node,
    /// Capture id within the query.
    pub index: u32,
}

/// A snapshot of one match.
///
/// Snapshots own their nodes and stay valid after the cursor moves on.
#[derive(Debug, Clone)]
pub struct QueryMatch {
    /// Engine-assigned id, usable with [`QueryCursor::remove_match`].
    pub id: u32,
    /// Pattern that matched.
    pub pattern_index: u32,
    /// Captured nodes in pattern order.
    pub captures: Vec<QueryCapture>,
}

impl QueryMatch {
    fn from_raw(raw: &ffi::TSQueryMatch, tree: &Tree) -> Self {
        let captures = if raw.captures.is_null() {
            &[][..]
        } else {
            // SAFETY: the engine reports `capture_count` captures at
            // `captures`, valid until the cursor advances.
            unsafe { slice::from_raw_parts(raw.captures, usize::from(raw.capture_count)) }
        };
        Self {
            id: raw.id,
            pattern_index: u32::from(raw.pattern_index),
            captures: captures
                .iter()
                .map(|capture| QueryCapture {
                    node: Node::new(capture.node, tree),
                    index: capture.index,
                })
                .collect(),
        }
    }

    /// Nodes captured under capture id `index`.
    pub fn nodes_for_capture_index(&self, index: u32) -> impl Iterator<Item = &Node> + '_ {
        self.captures
            .iter()
            .filter(move |capture| capture.index == index)
            .map(|capture| &capture.node)
    }

    /// Whether this match passes every text predicate of its pattern.
    #[must_use]
    pub fn satisfies_text_predicates(&self, query: &Query, source: &[u8]) -> bool {
        query
            .text_predicates(self.pattern_index)
            .iter()
            .all(|predicate| predicate.is_satisfied(&self.captures, source))
    }
}

enum State {
    Idle,
    Executing {
        // Pins the query and the tree until the run ends.
        _query: Rc<QueryInner>,
        tree: Tree,
    },
    Exhausted,
}

impl State {
    const fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Executing { .. } => "executing",
            Self::Exhausted => "exhausted",
        }
    }
}

/// Runs a [`Query`] over a subtree.
///
/// A cursor is idle until [`QueryCursor::exec`], executing until it runs out
/// of results, and then exhausted until the next `exec`. Idle and exhausted
/// cursors return `None` without consulting the engine.
pub struct QueryCursor {
    handle: Handle<NativeQueryCursor>,
    state: State,
}

impl QueryCursor {
    /// Creates an idle cursor.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::Allocation`] if the engine cannot create a
    /// cursor.
    pub fn new() -> Result<Self> {
        // SAFETY: no preconditions.
        let raw = unsafe { ffi::ts_query_cursor_new() };
        Ok(Self {
            handle: Handle::allocate(raw)?,
            state: State::Idle,
        })
    }

    fn raw(&self) -> *mut ffi::TSQueryCursor {
        self.handle
            .borrow()
            .copied()
            .unwrap_or(std::ptr::null_mut())
    }

    /// Starts running `query` on `node`, discarding any earlier run.
    pub fn exec(&mut self, query: &Query, node: &Node) {
        let raw = self.raw();
        if raw.is_null() {
            return;
        }
        // SAFETY: the cursor and query are live, and the state below keeps
        // both the query and the node's tree alive during the run.
        unsafe { ffi::ts_query_cursor_exec(raw, query.inner().as_ptr(), node.raw()) };
        self.state = State::Executing {
            _query: Rc::clone(query.inner()),
            tree: node.tree().clone(),
        };
    }

    /// Whether the cursor is between `exec` and exhaustion.
    #[must_use]
    pub const fn is_executing(&self) -> bool {
        matches!(self.state, State::Executing { .. })
    }

    /// Next complete match, in completion order.
    pub fn next_match(&mut self) -> Option<QueryMatch> {
        let raw = self.raw();
        let State::Executing { tree, .. } = &self.state else {
            return None;
        };
        let mut current = MaybeUninit::<ffi::TSQueryMatch>::uninit();
        // SAFETY: the cursor is executing, so the query and tree are pinned.
        if unsafe { ffi::ts_query_cursor_next_match(raw, current.as_mut_ptr()) } {
            // SAFETY: the engine filled in the match.
            let filled = unsafe { current.assume_init() };
            Some(QueryMatch::from_raw(&filled, tree))
        } else {
            self.finish();
            None
        }
    }

    /// Next capture in start-position order, with the match it belongs to
    /// and its position within that match.
    pub fn next_capture(&mut self) -> Option<(QueryMatch, u32)> {
        let raw = self.raw();
        let State::Executing { tree, .. } = &self.state else {
            return None;
        };
        let mut current = MaybeUninit::<ffi::TSQueryMatch>::uninit();
        let mut capture_index = 0_u32;
        // SAFETY: the cursor is executing, so the query and tree are pinned.
        if unsafe { ffi::ts_query_cursor_next_capture(raw, current.as_mut_ptr(), &mut capture_index) }
        {
            // SAFETY: the engine filled in the match.
            let filled = unsafe { current.assume_init() };
            Some((QueryMatch::from_raw(&filled, tree), capture_index))
        } else {
            self.finish();
            None
        }
    }

    fn finish(&mut self) {
        tracing::trace!(
            exceeded_match_limit = self.did_exceed_match_limit(),
            "query cursor exhausted"
        );
        self.state = State::Exhausted;
    }

    /// Runs `query` on `node` and iterates the matches that pass their text
    /// predicates against `source`.
    pub fn matches<'a>(
        &'a mut self,
        query: &'a Query,
        node: &Node,
        source: &'a [u8],
    ) -> QueryMatches<'a> {
        self.exec(query, node);
        QueryMatches {
            cursor: self,
            query,
            source,
        }
    }

    /// Runs `query` on `node` and iterates captures whose matches pass their
    /// text predicates against `source`.
    pub fn captures<'a>(
        &'a mut self,
        query: &'a Query,
        node: &Node,
        source: &'a [u8],
    ) -> QueryCaptures<'a> {
        self.exec(query, node);
        QueryCaptures {
            cursor: self,
            query,
            source,
        }
    }

    /// Discards an in-progress match.
    pub fn remove_match(&mut self, id: u32) {
        let raw = self.raw();
        if !raw.is_null() {
            // SAFETY: the cursor is live; unknown ids are ignored.
            unsafe { ffi::ts_query_cursor_remove_match(raw, id) };
        }
    }

    /// Maximum number of in-progress matches.
    #[must_use]
    pub fn match_limit(&self) -> u32 {
        let raw = self.raw();
        if raw.is_null() {
            return u32::MAX;
        }
        // SAFETY: the cursor is live.
        unsafe { ffi::ts_query_cursor_match_limit(raw) }
    }

    /// Caps the number of in-progress matches.
    pub fn set_match_limit(&mut self, limit: u32) {
        let raw = self.raw();
        if !raw.is_null() {
            // SAFETY: the cursor is live.
            unsafe { ffi::ts_query_cursor_set_match_limit(raw, limit) };
        }
    }

    /// Whether matches were dropped because the match limit was reached.
    #[must_use]
    pub fn did_exceed_match_limit(&self) -> bool {
        let raw = self.raw();
        // SAFETY: the cursor is live.
        !raw.is_null() && unsafe { ffi::ts_query_cursor_did_exceed_match_limit(raw) }
    }

    /// Limits the search to nodes overlapping `range`.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::InvalidRange`] when the range is reversed or
    /// does not fit the engine's 32-bit offsets.
    pub fn set_byte_range(&mut self, range: Range<usize>) -> Result<()> {
        let invalid = || BindingError::invalid_range(format!("byte range {range:?}"));
        let start = u32::try_from(range.start).map_err(|_| invalid())?;
        let end = u32::try_from(range.end).map_err(|_| invalid())?;
        let raw = self.handle.borrow().copied()?;
        // SAFETY: the cursor is live.
        if unsafe { ffi::ts_query_cursor_set_byte_range(raw, start, end) } {
            Ok(())
        } else {
            Err(invalid())
        }
    }

    /// Limits the search to nodes overlapping `range`.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::InvalidRange`] when the range is reversed.
    pub fn set_point_range(&mut self, range: Range<Point>) -> Result<()> {
        let raw = self.handle.borrow().copied()?;
        // SAFETY: the cursor is live.
        if unsafe { ffi::ts_query_cursor_set_point_range(raw, range.start.into(), range.end.into()) }
        {
            Ok(())
        } else {
            Err(BindingError::invalid_range(format!(
                "point range {}..{}",
                range.start, range.end
            )))
        }
    }

    /// Restricts where matches may start; `None` removes the limit.
    pub fn set_max_start_depth(&mut self, depth: Option<u32>) {
        let raw = self.raw();
        if !raw.is_null() {
            // SAFETY: the cursor is live.
            unsafe { ffi::ts_query_cursor_set_max_start_depth(raw, depth.unwrap_or(u32::MAX)) };
        }
    }

    /// Maximum time a run may take, in microseconds; zero means unlimited.
    #[must_use]
    pub fn timeout_micros(&self) -> u64 {
        let raw = self.raw();
        if raw.is_null() {
            return 0;
        }
        // SAFETY: the cursor is live.
        unsafe { ffi::ts_query_cursor_timeout_micros(raw) }
    }

    /// Sets the maximum run time in microseconds.
    pub fn set_timeout_micros(&mut self, timeout_micros: u64) {
        let raw = self.raw();
        if !raw.is_null() {
            // SAFETY: the cursor is live.
            unsafe { ffi::ts_query_cursor_set_timeout_micros(raw, timeout_micros) };
        }
    }
}

impl fmt::Debug for QueryCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCursor")
            .field("state", &self.state.label())
            .field("match_limit", &self.match_limit())
            .finish()
    }
}

/// Matches passing their text predicates. See [`QueryCursor::matches`].
pub struct QueryMatches<'a> {
    cursor: &'a mut QueryCursor,
    query: &'a Query,
    source: &'a [u8],
}

impl Iterator for QueryMatches<'_> {
    type Item = QueryMatch;

    fn next(&mut self) -> Option<QueryMatch> {
        loop {
            let found = self.cursor.next_match()?;
            if found.satisfies_text_predicates(self.query, self.source) {
                return Some(found);
            }
        }
    }
}

/// Captures whose matches pass their text predicates. See
/// [`QueryCursor::captures`].
pub struct QueryCaptures<'a> {
    cursor: &'a mut QueryCursor,
    query: &'a Query,
    source: &'a [u8],
}

impl Iterator for QueryCaptures<'_> {
    type Item = (QueryMatch, u32);

    fn next(&mut self) -> Option<(QueryMatch, u32)> {
        loop {
            let (found, index) = self.cursor.next_capture()?;
            if found.satisfies_text_predicates(self.query, self.source) {
                return Some((found, index));
            }
            self.cursor.remove_match(found.id);
        }
    }
}
