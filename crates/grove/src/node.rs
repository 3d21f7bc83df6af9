//! Syntax nodes.
//!
//! A [`Node`] is a small value copied out of the engine plus an alias of the
//! tree it came from. The alias is what keeps the native tree alive: every
//! node derived from another node pins the tree independently, so a chain of
//! `parent()`/`child()` calls can outlive the `Tree` it started from.

use std::collections::BTreeSet;
use std::ffi::{CStr, c_char};
use std::fmt;

use tree_sitter::ffi;

use crate::error::{BindingError, Result};
use crate::language::Grammar;
use crate::position::{InputEdit, Point, Range};
use crate::tree::Tree;
use crate::tree_cursor::{TreeCursor, Walk};

/// A node within a parse tree.
#[derive(Clone)]
pub struct Node {
    raw: ffi::TSNode,
    tree: Tree,
}

/// Converts an engine-owned, NUL-terminated grammar string.
///
/// Grammar strings live as long as the grammar, and grammars are never
/// unloaded.
pub(crate) fn static_str(ptr: *const c_char) -> Option<&'static str> {
    if ptr.is_null() {
        return None;
    }
    // SAFETY: the engine returns NUL-terminated strings owned by the
    // grammar, which outlives the process.
    unsafe { CStr::from_ptr(ptr) }.to_str().ok()
}

impl Node {
    /// Wraps a node known to be non-null.
    pub(crate) fn new(raw: ffi::TSNode, tree: &Tree) -> Self {
        Self {
            raw,
            tree: tree.clone(),
        }
    }

    /// Wraps `raw`, mapping the engine's null node to `None`.
    pub(crate) fn from_raw(raw: ffi::TSNode, tree: &Tree) -> Option<Self> {
        // SAFETY: reading a node value never dereferences the tree.
        if unsafe { ffi::ts_node_is_null(raw) } {
            None
        } else {
            Some(Self::new(raw, tree))
        }
    }

    pub(crate) const fn raw(&self) -> ffi::TSNode {
        self.raw
    }

    fn derive(&self, raw: ffi::TSNode) -> Option<Self> {
        Self::from_raw(raw, &self.tree)
    }

    /// Tree this node belongs to.
    #[must_use]
    pub const fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Opaque identifier, unique among nodes of the same tree.
    #[must_use]
    pub fn id(&self) -> usize {
        self.raw.id as usize
    }

    /// Grammar the node was parsed with.
    #[must_use]
    pub fn grammar(&self) -> Option<Grammar> {
        // SAFETY: the tree alias keeps the node's storage alive.
        Grammar::from_raw(unsafe { ffi::ts_node_language(self.raw) })
    }

    // ---------------------------------------------------------------------
    // Kind
    // ---------------------------------------------------------------------

    /// Node type, for example `"identifier"`.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        // SAFETY: the tree alias keeps the node's storage alive.
        static_str(unsafe { ffi::ts_node_type(self.raw) }).unwrap_or_default()
    }

    /// Numeric symbol of [`Node::kind`].
    #[must_use]
    pub fn kind_id(&self) -> u16 {
        // SAFETY: the tree alias keeps the node's storage alive.
        unsafe { ffi::ts_node_symbol(self.raw) }
    }

    /// Node type as it appears in the grammar, ignoring aliases.
    #[must_use]
    pub fn grammar_kind(&self) -> &'static str {
        // SAFETY: the tree alias keeps the node's storage alive.
        static_str(unsafe { ffi::ts_node_grammar_type(self.raw) }).unwrap_or_default()
    }

    /// Numeric symbol of [`Node::grammar_kind`].
    #[must_use]
    pub fn grammar_kind_id(&self) -> u16 {
        // SAFETY: the tree alias keeps the node's storage alive.
        unsafe { ffi::ts_node_grammar_symbol(self.raw) }
    }

    /// Parse state at this node.
    #[must_use]
    pub fn parse_state(&self) -> u16 {
        // SAFETY: the tree alias keeps the node's storage alive.
        unsafe { ffi::ts_node_parse_state(self.raw) }
    }

    /// Parse state after this node.
    #[must_use]
    pub fn next_parse_state(&self) -> u16 {
        // SAFETY: the tree alias keeps the node's storage alive.
        unsafe { ffi::ts_node_next_parse_state(self.raw) }
    }

    /// Whether the node is named in the grammar.
    #[must_use]
    pub fn is_named(&self) -> bool {
        // SAFETY: the tree alias keeps the node's storage alive.
        unsafe { ffi::ts_node_is_named(self.raw) }
    }

    /// Whether the parser inserted this node to recover from an error.
    #[must_use]
    pub fn is_missing(&self) -> bool {
        // SAFETY: the tree alias keeps the node's storage alive.
        unsafe { ffi::ts_node_is_missing(self.raw) }
    }

    /// Whether the node is an extra such as a comment.
    #[must_use]
    pub fn is_extra(&self) -> bool {
        // SAFETY: the tree alias keeps the node's storage alive.
        unsafe { ffi::ts_node_is_extra(self.raw) }
    }

    /// Whether the node was edited since it was parsed.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        // SAFETY: the tree alias keeps the node's storage alive.
        unsafe { ffi::ts_node_has_changes(self.raw) }
    }

    /// Whether the node is or contains a syntax error.
    #[must_use]
    pub fn has_error(&self) -> bool {
        // SAFETY: the tree alias keeps the node's storage alive.
        unsafe { ffi::ts_node_has_error(self.raw) }
    }

    /// Whether the node is a syntax error.
    #[must_use]
    pub fn is_error(&self) -> bool {
        // SAFETY: the tree alias keeps the node's storage alive.
        unsafe { ffi::ts_node_is_error(self.raw) }
    }

    // ---------------------------------------------------------------------
    // Position
    // ---------------------------------------------------------------------

    /// Offset of the node's first byte.
    #[must_use]
    pub fn start_byte(&self) -> u32 {
        // SAFETY: the tree alias keeps the node's storage alive.
        unsafe { ffi::ts_node_start_byte(self.raw) }
    }

    /// Offset one past the node's last byte.
    #[must_use]
    pub fn end_byte(&self) -> u32 {
        // SAFETY: the tree alias keeps the node's storage alive.
        unsafe { ffi::ts_node_end_byte(self.raw) }
    }

    /// Position of the node's first byte.
    #[must_use]
    pub fn start_point(&self) -> Point {
        // SAFETY: the tree alias keeps the node's storage alive.
        unsafe { ffi::ts_node_start_point(self.raw) }.into()
    }

    /// Position one past the node's last byte.
    #[must_use]
    pub fn end_point(&self) -> Point {
        // SAFETY: the tree alias keeps the node's storage alive.
        unsafe { ffi::ts_node_end_point(self.raw) }.into()
    }

    /// Byte and point span of the node.
    #[must_use]
    pub fn range(&self) -> Range {
        Range {
            start_point: self.start_point(),
            end_point: self.end_point(),
            start_byte: self.start_byte(),
            end_byte: self.end_byte(),
        }
    }

    /// Byte span as a slice range.
    #[must_use]
    pub fn byte_range(&self) -> std::ops::Range<usize> {
        (self.start_byte() as usize)..(self.end_byte() as usize)
    }

    /// The node's bytes within `source`.
    ///
    /// Returns an empty slice when `source` is shorter than the tree's text.
    #[must_use]
    pub fn text<'s>(&self, source: &'s [u8]) -> &'s [u8] {
        source.get(self.byte_range()).unwrap_or_default()
    }

    /// The node's text within `source`, if the span lies on character
    /// boundaries.
    #[must_use]
    pub fn utf8_text<'s>(&self, source: &'s str) -> Option<&'s str> {
        source.get(self.byte_range())
    }

    /// Applies an edit to this node value only; the tree is not changed.
    pub fn edit(&mut self, edit: &InputEdit) {
        let raw_edit = ffi::TSInputEdit::from(*edit);
        // SAFETY: the node is a plain value owned by `self`.
        unsafe { ffi::ts_node_edit(&mut self.raw, &raw_edit) };
    }

    // ---------------------------------------------------------------------
    // Children by index
    // ---------------------------------------------------------------------

    /// Number of children.
    #[must_use]
    pub fn child_count(&self) -> u32 {
        // SAFETY: the tree alias keeps the node's storage alive.
        unsafe { ffi::ts_node_child_count(self.raw) }
    }

    /// Number of named children.
    #[must_use]
    pub fn named_child_count(&self) -> u32 {
        // SAFETY: the tree alias keeps the node's storage alive.
        unsafe { ffi::ts_node_named_child_count(self.raw) }
    }

    /// Number of nodes in the subtree rooted here, including this node.
    #[must_use]
    pub fn descendant_count(&self) -> u32 {
        // SAFETY: the tree alias keeps the node's storage alive.
        unsafe { ffi::ts_node_descendant_count(self.raw) }
    }

    /// Child at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::IndexOutOfRange`] unless
    /// `index < child_count()`.
    pub fn child(&self, index: u32) -> Result<Self> {
        let len = self.child_count();
        if index >= len {
            return Err(BindingError::index_out_of_range("child", index, len));
        }
        // SAFETY: the tree alias keeps the node's storage alive.
        self.derive(unsafe { ffi::ts_node_child(self.raw, index) })
            .ok_or_else(|| BindingError::index_out_of_range("child", index, len))
    }

    /// Named child at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::IndexOutOfRange`] unless
    /// `index < named_child_count()`.
    pub fn named_child(&self, index: u32) -> Result<Self> {
        let len = self.named_child_count();
        if index >= len {
            return Err(BindingError::index_out_of_range("named child", index, len));
        }
        // SAFETY: the tree alias keeps the node's storage alive.
        self.derive(unsafe { ffi::ts_node_named_child(self.raw, index) })
            .ok_or_else(|| BindingError::index_out_of_range("named child", index, len))
    }

    /// Field name of the child at `index`, if it has one.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::IndexOutOfRange`] unless
    /// `index < child_count()`.
    pub fn field_name_for_child(&self, index: u32) -> Result<Option<&'static str>> {
        let len = self.child_count();
        if index >= len {
            return Err(BindingError::index_out_of_range("child", index, len));
        }
        // SAFETY: the tree alias keeps the node's storage alive.
        Ok(static_str(unsafe {
            ffi::ts_node_field_name_for_child(self.raw, index)
        }))
    }

    /// Field name of the named child at `index`, if it has one.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::IndexOutOfRange`] unless
    /// `index < named_child_count()`.
    pub fn field_name_for_named_child(&self, index: u32) -> Result<Option<&'static str>> {
        let len = self.named_child_count();
        if index >= len {
            return Err(BindingError::index_out_of_range("named child", index, len));
        }
        // SAFETY: the tree alias keeps the node's storage alive.
        Ok(static_str(unsafe {
            ffi::ts_node_field_name_for_named_child(self.raw, index)
        }))
    }

    /// All children, in order.
    pub fn children(&self) -> impl Iterator<Item = Self> + '_ {
        (0..self.child_count()).filter_map(|index| self.child(index).ok())
    }

    /// Named children, in order.
    pub fn named_children(&self) -> impl Iterator<Item = Self> + '_ {
        (0..self.named_child_count()).filter_map(|index| self.named_child(index).ok())
    }

    /// Children that are assigned to a field, paired with the field name.
    #[must_use]
    pub fn field_children(&self) -> Vec<(&'static str, Self)> {
        (0..self.child_count())
            .filter_map(|index| {
                let field = self.field_name_for_child(index).ok().flatten()?;
                let child = self.child(index).ok()?;
                Some((field, child))
            })
            .collect()
    }

    /// Names of the fields present on this node's children.
    #[must_use]
    pub fn fields(&self) -> BTreeSet<&'static str> {
        (0..self.child_count())
            .filter_map(|index| self.field_name_for_child(index).ok().flatten())
            .collect()
    }

    /// Whether any child is assigned to `field`.
    #[must_use]
    pub fn has_field(&self, field: &str) -> bool {
        self.fields().contains(field)
    }

    /// The first child for each of `fields`, in request order, with `None`
    /// for fields that are absent. Repeated names yield one slot.
    #[must_use]
    pub fn fetch_all(&self, fields: &[&str]) -> Vec<Option<Self>> {
        let mut unique: Vec<&str> = Vec::with_capacity(fields.len());
        for &field in fields {
            if !unique.contains(&field) {
                unique.push(field);
            }
        }
        let found = self.field_children();
        unique
            .into_iter()
            .map(|wanted| {
                found
                    .iter()
                    .find(|(field, _)| *field == wanted)
                    .map(|(_, child)| child.clone())
            })
            .collect()
    }

    /// Like [`Node::fetch_all`], dropping absent fields.
    #[must_use]
    pub fn fetch(&self, fields: &[&str]) -> Vec<Self> {
        self.fetch_all(fields).into_iter().flatten().collect()
    }

    // ---------------------------------------------------------------------
    // Relationships
    // ---------------------------------------------------------------------

    /// Child assigned to the field `name`.
    #[must_use]
    pub fn child_by_field_name(&self, name: &str) -> Option<Self> {
        let len = u32::try_from(name.len()).ok()?;
        // SAFETY: the pointer and length describe `name`; the engine does
        // not require NUL termination.
        let raw = unsafe {
            ffi::ts_node_child_by_field_name(self.raw, name.as_ptr().cast::<c_char>(), len)
        };
        self.derive(raw)
    }

    /// Child assigned to the field with numeric id `field_id`.
    #[must_use]
    pub fn child_by_field_id(&self, field_id: u16) -> Option<Self> {
        // SAFETY: the tree alias keeps the node's storage alive.
        self.derive(unsafe { ffi::ts_node_child_by_field_id(self.raw, field_id) })
    }

    /// Parent node, or `None` at the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        // SAFETY: the tree alias keeps the node's storage alive.
        self.derive(unsafe { ffi::ts_node_parent(self.raw) })
    }

    /// The child of this node that contains `descendant`.
    #[must_use]
    pub fn child_with_descendant(&self, descendant: &Self) -> Option<Self> {
        // SAFETY: both tree aliases keep their storage alive.
        self.derive(unsafe { ffi::ts_node_child_with_descendant(self.raw, descendant.raw) })
    }

    /// Next sibling.
    #[must_use]
    pub fn next_sibling(&self) -> Option<Self> {
        // SAFETY: the tree alias keeps the node's storage alive.
        self.derive(unsafe { ffi::ts_node_next_sibling(self.raw) })
    }

    /// Previous sibling.
    #[must_use]
    pub fn prev_sibling(&self) -> Option<Self> {
        // SAFETY: the tree alias keeps the node's storage alive.
        self.derive(unsafe { ffi::ts_node_prev_sibling(self.raw) })
    }

    /// Next named sibling.
    #[must_use]
    pub fn next_named_sibling(&self) -> Option<Self> {
        // SAFETY: the tree alias keeps the node's storage alive.
        self.derive(unsafe { ffi::ts_node_next_named_sibling(self.raw) })
    }

    /// Previous named sibling.
    #[must_use]
    pub fn prev_named_sibling(&self) -> Option<Self> {
        // SAFETY: the tree alias keeps the node's storage alive.
        self.derive(unsafe { ffi::ts_node_prev_named_sibling(self.raw) })
    }

    /// First child that extends beyond `byte`.
    #[must_use]
    pub fn first_child_for_byte(&self, byte: u32) -> Option<Self> {
        // SAFETY: the tree alias keeps the node's storage alive.
        self.derive(unsafe { ffi::ts_node_first_child_for_byte(self.raw, byte) })
    }

    /// First named child that extends beyond `byte`.
    #[must_use]
    pub fn first_named_child_for_byte(&self, byte: u32) -> Option<Self> {
        // SAFETY: the tree alias keeps the node's storage alive.
        self.derive(unsafe { ffi::ts_node_first_named_child_for_byte(self.raw, byte) })
    }

    /// Smallest node within this one spanning `start..end` bytes.
    #[must_use]
    pub fn descendant_for_byte_range(&self, start: u32, end: u32) -> Option<Self> {
        // SAFETY: the tree alias keeps the node's storage alive.
        self.derive(unsafe { ffi::ts_node_descendant_for_byte_range(self.raw, start, end) })
    }

    /// Smallest named node within this one spanning `start..end` bytes.
    #[must_use]
    pub fn named_descendant_for_byte_range(&self, start: u32, end: u32) -> Option<Self> {
        // SAFETY: the tree alias keeps the node's storage alive.
        self.derive(unsafe { ffi::ts_node_named_descendant_for_byte_range(self.raw, start, end) })
    }

    /// Smallest node within this one spanning `start..end`.
    #[must_use]
    pub fn descendant_for_point_range(&self, start: Point, end: Point) -> Option<Self> {
        // SAFETY: the tree alias keeps the node's storage alive.
        self.derive(unsafe {
            ffi::ts_node_descendant_for_point_range(self.raw, start.into(), end.into())
        })
    }

    /// Smallest named node within this one spanning `start..end`.
    #[must_use]
    pub fn named_descendant_for_point_range(&self, start: Point, end: Point) -> Option<Self> {
        // SAFETY: the tree alias keeps the node's storage alive.
        self.derive(unsafe {
            ffi::ts_node_named_descendant_for_point_range(self.raw, start.into(), end.into())
        })
    }

    // ---------------------------------------------------------------------
    // Traversal and rendering
    // ---------------------------------------------------------------------

    /// Depth-first, pre-order walk over this node's subtree.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::Allocation`] if the engine cannot create the
    /// underlying cursor.
    pub fn walk(&self) -> Result<Walk> {
        TreeCursor::new(self).map(Walk::new)
    }

    /// S-expression rendering of the subtree.
    #[must_use]
    pub fn to_sexp(&self) -> String {
        // SAFETY: the tree alias keeps the node's storage alive.
        let rendered = unsafe { ffi::ts_node_string(self.raw) };
        if rendered.is_null() {
            return String::new();
        }
        // SAFETY: the engine returns a NUL-terminated, heap-allocated string
        // that the caller owns.
        let text = unsafe { CStr::from_ptr(rendered) }
            .to_string_lossy()
            .into_owned();
        // SAFETY: allocated with the engine's default allocator.
        unsafe { libc::free(rendered.cast()) };
        text
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        // SAFETY: both tree aliases keep their storage alive.
        unsafe { ffi::ts_node_eq(self.raw, other.raw) }
    }
}

impl Eq for Node {}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{Node {} {} - {}}}",
            self.kind(),
            self.start_point(),
            self.end_point()
        )
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sexp())
    }
}
