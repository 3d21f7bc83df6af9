//! Parse trees.

use std::fmt;
#[cfg(unix)]
use std::fs::File;
#[cfg(unix)]
use std::os::fd::AsRawFd;
#[cfg(unix)]
use std::path::Path;
use std::ptr::NonNull;

use tree_sitter::ffi;

use crate::error::{BindingError, Result};
use crate::language::Grammar;
use crate::node::Node;
use crate::position::{InputEdit, Point, Range};
use crate::registry::TreeRegistry;
use crate::tree_cursor::{TreeCursor, Walk};

/// An alias of one native parse tree.
///
/// `Clone` yields another alias of the *same* native tree; the tree is freed
/// once every alias (including nodes and cursors) has been dropped. Use
/// [`Tree::copy`] for an independent native tree.
pub struct Tree {
    ptr: NonNull<ffi::TSTree>,
    registry: TreeRegistry,
}

impl Tree {
    /// Wraps a tree that the engine has just returned.
    pub(crate) fn adopt(raw: *mut ffi::TSTree, registry: &TreeRegistry) -> Result<Self> {
        let ptr = NonNull::new(raw).ok_or_else(|| BindingError::allocation("tree"))?;
        if let Err(error) = registry.adopt(raw) {
            // SAFETY: the caller handed over `raw` and no alias refers to it.
            unsafe { ffi::ts_tree_delete(raw) };
            return Err(error);
        }
        Ok(Self {
            ptr,
            registry: registry.clone(),
        })
    }

    pub(crate) const fn as_ptr(&self) -> *mut ffi::TSTree {
        self.ptr.as_ptr()
    }

    /// Registry tracking this tree's aliases.
    #[must_use]
    pub fn tree_registry(&self) -> TreeRegistry {
        self.registry.clone()
    }

    /// Root node of the tree.
    #[must_use]
    pub fn root_node(&self) -> Node {
        // SAFETY: this alias keeps the native tree alive.
        let raw = unsafe { ffi::ts_tree_root_node(self.as_ptr()) };
        Node::new(raw, self)
    }

    /// Root node with its position shifted by `offset_bytes` and
    /// `offset_extent`.
    #[must_use]
    pub fn root_node_with_offset(&self, offset_bytes: u32, offset_extent: Point) -> Node {
        // SAFETY: this alias keeps the native tree alive.
        let raw = unsafe {
            ffi::ts_tree_root_node_with_offset(self.as_ptr(), offset_bytes, offset_extent.into())
        };
        Node::new(raw, self)
    }

    /// Grammar the tree was parsed with.
    #[must_use]
    pub fn grammar(&self) -> Option<Grammar> {
        // SAFETY: this alias keeps the native tree alive.
        let raw = unsafe { ffi::ts_tree_language(self.as_ptr()) };
        Grammar::from_raw(raw)
    }

    /// Asks the engine for a shallow copy, registered as a separate tree.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails to allocate the copy.
    pub fn copy(&self) -> Result<Self> {
        // SAFETY: this alias keeps the native tree alive.
        let raw = unsafe { ffi::ts_tree_copy(self.as_ptr()) };
        Self::adopt(raw, &self.registry)
    }

    /// Makes an unregistered copy that can be sent to another thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails to allocate the copy.
    pub fn detach(&self) -> Result<DetachedTree> {
        // SAFETY: this alias keeps the native tree alive.
        let raw = unsafe { ffi::ts_tree_copy(self.as_ptr()) };
        let ptr = NonNull::new(raw).ok_or_else(|| BindingError::allocation("tree"))?;
        Ok(DetachedTree { ptr })
    }

    /// Applies an edit to the tree in place.
    ///
    /// Every alias observes the edit, since they share one native tree.
    pub fn edit(&mut self, edit: &InputEdit) {
        let raw = ffi::TSInputEdit::from(*edit);
        // SAFETY: this alias keeps the native tree alive.
        unsafe { ffi::ts_tree_edit(self.as_ptr(), &raw) };
    }

    /// Ranges that were included when the tree was parsed.
    #[must_use]
    pub fn included_ranges(&self) -> Vec<Range> {
        let mut count = 0_u32;
        // SAFETY: this alias keeps the native tree alive; the returned array
        // is heap allocated for the caller.
        let ranges = unsafe { ffi::ts_tree_included_ranges(self.as_ptr(), &mut count) };
        // SAFETY: the engine hands over ownership of the array.
        unsafe { take_ranges(ranges, count) }
    }

    /// Ranges whose syntactic structure differs between `old` (edited to
    /// match this tree's source) and this tree.
    #[must_use]
    pub fn changed_ranges(&self, old: &Self) -> Vec<Range> {
        let mut count = 0_u32;
        // SAFETY: both aliases keep their native trees alive.
        let ranges =
            unsafe { ffi::ts_tree_get_changed_ranges(old.as_ptr(), self.as_ptr(), &mut count) };
        // SAFETY: the engine hands over ownership of the array.
        unsafe { take_ranges(ranges, count) }
    }

    /// Depth-first, pre-order walk over every node in the tree.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::Allocation`] if the engine cannot create the
    /// underlying cursor.
    pub fn walk(&self) -> Result<Walk> {
        TreeCursor::new(&self.root_node()).map(Walk::new)
    }

    /// Writes a DOT graph describing the tree to `file`.
    #[cfg(unix)]
    pub fn print_dot_graph(&self, file: &File) {
        // SAFETY: this alias keeps the native tree alive; the engine
        // duplicates the descriptor before writing.
        unsafe { ffi::ts_tree_print_dot_graph(self.as_ptr(), file.as_raw_fd()) };
    }

    /// Writes a DOT graph describing the tree to the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::Io`] when the file cannot be created.
    #[cfg(unix)]
    pub fn write_dot_graph_to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path)?;
        self.print_dot_graph(&file);
        Ok(())
    }
}

/// Copies and frees an engine-allocated range array.
///
/// # Safety
///
/// `ranges` must be null or point to `count` ranges allocated with the
/// engine's allocator, which the caller owns.
unsafe fn take_ranges(ranges: *mut ffi::TSRange, count: u32) -> Vec<Range> {
    if ranges.is_null() {
        return Vec::new();
    }
    let len = usize::try_from(count).unwrap_or(0);
    // SAFETY: guaranteed by the caller.
    let copied = unsafe { std::slice::from_raw_parts(ranges, len) }
        .iter()
        .copied()
        .map(Range::from)
        .collect();
    // SAFETY: the array came from the engine's default allocator.
    unsafe { libc::free(ranges.cast()) };
    copied
}

impl Clone for Tree {
    fn clone(&self) -> Self {
        if let Err(error) = self.registry.register(self.as_ptr()) {
            tracing::error!(%error, "failed to register tree alias");
        }
        Self {
            ptr: self.ptr,
            registry: self.registry.clone(),
        }
    }
}

impl Drop for Tree {
    fn drop(&mut self) {
        if let Err(error) = self.registry.release(self.as_ptr()) {
            tracing::error!(%error, "failed to release tree alias");
        }
    }
}

impl fmt::Debug for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tree")
            .field("address", &self.ptr)
            .field("root", &self.root_node().to_sexp())
            .finish()
    }
}

/// A native tree outside any registry, safe to move across threads.
///
/// Obtained from [`Tree::detach`]; call [`DetachedTree::attach`] on the
/// receiving thread to use it.
pub struct DetachedTree {
    ptr: NonNull<ffi::TSTree>,
}

// SAFETY: a detached tree is an independent engine copy with no other Rust
// aliases, so moving it to another thread cannot race.
unsafe impl Send for DetachedTree {}

impl DetachedTree {
    /// Registers the tree in `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::RegistryConsistency`] if the address is
    /// already registered.
    pub fn attach(self, registry: &TreeRegistry) -> Result<Tree> {
        let raw = self.ptr.as_ptr();
        std::mem::forget(self);
        Tree::adopt(raw, registry)
    }
}

impl Drop for DetachedTree {
    fn drop(&mut self) {
        // SAFETY: the detached tree is owned exclusively by this value.
        unsafe { ffi::ts_tree_delete(self.ptr.as_ptr()) };
    }
}

impl fmt::Debug for DetachedTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetachedTree")
            .field("address", &self.ptr)
            .finish()
    }
}
