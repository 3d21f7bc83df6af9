//! Stateful walking over a tree.

use std::fmt;
use std::ptr;

use tree_sitter::ffi;

use crate::error::Result;
use crate::handle::{Handle, Resource};
use crate::node::{Node, static_str};
use crate::position::Point;
use crate::tree::Tree;

/// Native tree cursor, stored inline.
pub(crate) struct NativeTreeCursor;

impl Resource for NativeTreeCursor {
    type Raw = ffi::TSTreeCursor;
    const NAME: &'static str = "tree cursor";

    fn is_valid(raw: &Self::Raw) -> bool {
        !raw.tree.is_null()
    }

    unsafe fn destroy(raw: &mut Self::Raw) {
        // SAFETY: upheld by `Handle`.
        unsafe { ffi::ts_tree_cursor_delete(raw) };
    }
}

/// A mutable, single-owner walker positioned on one node at a time.
///
/// Failed moves leave the cursor where it was. The cursor cannot climb above
/// the node it was created or last reset at.
pub struct TreeCursor {
    handle: Handle<NativeTreeCursor>,
    tree: Tree,
    /// Nodes below and including the starting node.
    descendant_count: u32,
}

impl TreeCursor {
    /// Creates a cursor starting at `node`.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::Allocation`](crate::BindingError::Allocation)
    /// if the engine hands back an unusable cursor.
    pub fn new(node: &Node) -> Result<Self> {
        // SAFETY: the node's tree alias keeps its storage alive.
        let raw = unsafe { ffi::ts_tree_cursor_new(node.raw()) };
        Ok(Self {
            handle: Handle::allocate(raw)?,
            tree: node.tree().clone(),
            descendant_count: node.descendant_count(),
        })
    }

    /// Independent cursor at the same position.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails to copy the cursor.
    pub fn copy(&self) -> Result<Self> {
        let current = self.handle.borrow()?;
        // SAFETY: `current` is a live cursor.
        let raw = unsafe { ffi::ts_tree_cursor_copy(current) };
        Ok(Self {
            handle: Handle::allocate(raw)?,
            tree: self.tree.clone(),
            descendant_count: self.descendant_count,
        })
    }

    fn read<T>(&self, f: impl FnOnce(*const ffi::TSTreeCursor) -> T) -> Option<T> {
        self.handle.borrow().ok().map(|raw| f(ptr::from_ref(raw)))
    }

    fn step(&mut self, f: impl FnOnce(*mut ffi::TSTreeCursor) -> bool) -> bool {
        self.handle.borrow_mut().is_ok_and(|raw| f(ptr::from_mut(raw)))
    }

    /// Tree the cursor walks.
    #[must_use]
    pub const fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Node under the cursor.
    #[must_use]
    pub fn node(&self) -> Option<Node> {
        // SAFETY: the cursor and its tree alias are live.
        let raw = self.read(|cursor| unsafe { ffi::ts_tree_cursor_current_node(cursor) })?;
        Node::from_raw(raw, &self.tree)
    }

    /// Field name of the current node within its parent.
    #[must_use]
    pub fn field_name(&self) -> Option<&'static str> {
        // SAFETY: the cursor is live.
        self.read(|cursor| static_str(unsafe { ffi::ts_tree_cursor_current_field_name(cursor) }))
            .flatten()
    }

    /// Field id of the current node within its parent.
    #[must_use]
    pub fn field_id(&self) -> Option<u16> {
        // SAFETY: the cursor is live.
        self.read(|cursor| unsafe { ffi::ts_tree_cursor_current_field_id(cursor) })
            .filter(|&id| id != 0)
    }

    /// Depth below the node the cursor started at.
    #[must_use]
    pub fn depth(&self) -> u32 {
        // SAFETY: the cursor is live.
        self.read(|cursor| unsafe { ffi::ts_tree_cursor_current_depth(cursor) })
            .unwrap_or(0)
    }

    /// Pre-order index of the current node below the starting node.
    #[must_use]
    pub fn descendant_index(&self) -> u32 {
        // SAFETY: the cursor is live.
        self.read(|cursor| unsafe { ffi::ts_tree_cursor_current_descendant_index(cursor) })
            .unwrap_or(0)
    }

    /// Moves to the parent.
    pub fn goto_parent(&mut self) -> bool {
        // SAFETY: the cursor is live.
        self.step(|cursor| unsafe { ffi::ts_tree_cursor_goto_parent(cursor) })
    }

    /// Moves to the first child.
    pub fn goto_first_child(&mut self) -> bool {
        // SAFETY: the cursor is live.
        self.step(|cursor| unsafe { ffi::ts_tree_cursor_goto_first_child(cursor) })
    }

    /// Moves to the last child.
    pub fn goto_last_child(&mut self) -> bool {
        // SAFETY: the cursor is live.
        self.step(|cursor| unsafe { ffi::ts_tree_cursor_goto_last_child(cursor) })
    }

    /// Moves to the next sibling.
    pub fn goto_next_sibling(&mut self) -> bool {
        // SAFETY: the cursor is live.
        self.step(|cursor| unsafe { ffi::ts_tree_cursor_goto_next_sibling(cursor) })
    }

    /// Moves to the previous sibling.
    pub fn goto_previous_sibling(&mut self) -> bool {
        // SAFETY: the cursor is live.
        self.step(|cursor| unsafe { ffi::ts_tree_cursor_goto_previous_sibling(cursor) })
    }

    /// Moves to the first child that extends past `byte`, returning its index.
    pub fn goto_first_child_for_byte(&mut self, byte: u32) -> Option<u32> {
        let cursor = self.handle.borrow_mut().ok()?;
        // SAFETY: the cursor is live.
        let index = unsafe { ffi::ts_tree_cursor_goto_first_child_for_byte(cursor, byte) };
        u32::try_from(index).ok()
    }

    /// Moves to the first child that extends past `point`, returning its
    /// index.
    pub fn goto_first_child_for_point(&mut self, point: Point) -> Option<u32> {
        let cursor = self.handle.borrow_mut().ok()?;
        // SAFETY: the cursor is live.
        let index = unsafe { ffi::ts_tree_cursor_goto_first_child_for_point(cursor, point.into()) };
        u32::try_from(index).ok()
    }

    /// Moves to the descendant with pre-order index `index`, counted from
    /// the starting node.
    ///
    /// Indices past the last descendant leave the cursor in place.
    pub fn goto_descendant(&mut self, index: u32) -> bool {
        if index >= self.descendant_count {
            return false;
        }
        self.step(|cursor| {
            // SAFETY: the cursor is live and `index` names a descendant.
            unsafe { ffi::ts_tree_cursor_goto_descendant(cursor, index) };
            true
        })
    }

    /// Restarts the cursor at `node`, which may belong to another tree.
    pub fn reset(&mut self, node: &Node) {
        if let Ok(cursor) = self.handle.borrow_mut() {
            // SAFETY: the cursor is live and the node's alias keeps its tree
            // alive.
            unsafe { ffi::ts_tree_cursor_reset(cursor, node.raw()) };
            self.tree = node.tree().clone();
            self.descendant_count = node.descendant_count();
        }
    }

    /// Moves this cursor to the position of `other`.
    pub fn reset_to(&mut self, other: &Self) {
        let Ok(source) = other.handle.borrow() else {
            return;
        };
        if let Ok(cursor) = self.handle.borrow_mut() {
            // SAFETY: both cursors are live.
            unsafe { ffi::ts_tree_cursor_reset_to(cursor, source) };
            self.tree = other.tree.clone();
            self.descendant_count = other.descendant_count;
        }
    }
}

impl fmt::Debug for TreeCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeCursor")
            .field("node", &self.node())
            .field("depth", &self.depth())
            .finish()
    }
}

/// Depth-first, pre-order iterator over a subtree.
pub struct Walk {
    cursor: TreeCursor,
    done: bool,
}

impl Walk {
    /// Walks the subtree rooted at the cursor's current node.
    #[must_use]
    pub const fn new(cursor: TreeCursor) -> Self {
        Self {
            cursor,
            done: false,
        }
    }

    /// Advances past the current node, returning `false` when the walk has
    /// left the subtree.
    fn advance(&mut self) -> bool {
        if self.cursor.goto_first_child() {
            return true;
        }
        loop {
            if self.cursor.goto_next_sibling() {
                return true;
            }
            if !self.cursor.goto_parent() {
                return false;
            }
        }
    }
}

impl Iterator for Walk {
    type Item = Node;

    fn next(&mut self) -> Option<Node> {
        if self.done {
            return None;
        }
        let node = self.cursor.node();
        if node.is_none() || !self.advance() {
            self.done = true;
        }
        node
    }
}
