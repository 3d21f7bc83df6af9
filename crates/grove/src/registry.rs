//! Reference-counted registry of native trees.
//!
//! Every [`Tree`](crate::Tree), [`Node`](crate::Node), and
//! [`TreeCursor`](crate::TreeCursor) that refers to a native tree holds one
//! alias in a [`TreeRegistry`]. The native tree is freed when the last alias
//! is released, and only then.
//!
//! The registry is an explicit context object rather than process-wide
//! state. Parsers own one and hand clones to everything they produce;
//! callers that want several parsers to share bookkeeping pass the same
//! registry to [`Parser::with_registry`](crate::Parser::with_registry).

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tree_sitter::ffi;

use crate::error::{BindingError, Result};
use crate::handle::{Handle, Resource};

/// Raw tree pointer owned by the registry.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TreePtr(pub(crate) *mut ffi::TSTree);

// SAFETY: the registry only moves tree pointers between threads to free
// them; the engine allows a tree to be deleted from any thread.
unsafe impl Send for TreePtr {}

impl TreePtr {
    fn address(self) -> usize {
        self.0 as usize
    }
}

/// Native tree resource.
pub(crate) struct NativeTree;

impl Resource for NativeTree {
    type Raw = TreePtr;
    const NAME: &'static str = "tree";

    fn is_valid(raw: &Self::Raw) -> bool {
        !raw.0.is_null()
    }

    unsafe fn destroy(raw: &mut Self::Raw) {
        // SAFETY: upheld by `Handle`, which calls this once for a non-null
        // pointer returned by the engine.
        unsafe { ffi::ts_tree_delete(raw.0) };
    }
}

struct Slot {
    aliases: usize,
    handle: Handle<NativeTree>,
}

#[derive(Default)]
struct State {
    slots: HashMap<usize, Slot>,
    destroyed: u64,
}

/// Tracks live aliases of native trees.
///
/// Cloning a registry yields another reference to the same bookkeeping.
#[derive(Clone, Default)]
pub struct TreeRegistry {
    state: Arc<Mutex<State>>,
}

impl TreeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records one more alias of `tree`, taking ownership of the native tree
    /// when it is not yet registered.
    ///
    /// Returns the alias count after the increment.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::Allocation`] when `tree` is null.
    pub(crate) fn register(&self, tree: *mut ffi::TSTree) -> Result<usize> {
        let ptr = TreePtr(tree);
        let mut state = self.lock();
        match state.slots.entry(ptr.address()) {
            Entry::Occupied(mut occupied) => {
                let slot = occupied.get_mut();
                slot.aliases = slot.aliases.saturating_add(1);
                Ok(slot.aliases)
            }
            Entry::Vacant(vacant) => {
                let handle = Handle::allocate(ptr)?;
                vacant.insert(Slot { aliases: 1, handle });
                tracing::trace!(address = ptr.address(), "registered tree");
                Ok(1)
            }
        }
    }

    /// Registers a tree the engine has just produced.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::RegistryConsistency`] when the address is
    /// still registered, which means a stale entry survived the free of an
    /// earlier tree at the same address. Returns
    /// [`BindingError::Allocation`] when `tree` is null.
    pub(crate) fn adopt(&self, tree: *mut ffi::TSTree) -> Result<()> {
        let ptr = TreePtr(tree);
        let mut state = self.lock();
        if let Some(slot) = state.slots.get(&ptr.address()) {
            return Err(BindingError::registry(
                ptr.address(),
                format!("fresh tree collides with {} live aliases", slot.aliases),
            ));
        }
        let handle = Handle::allocate(ptr)?;
        state.slots.insert(ptr.address(), Slot { aliases: 1, handle });
        tracing::trace!(address = ptr.address(), "adopted tree");
        Ok(())
    }

    /// Drops one alias of `tree`, freeing the native tree when it was the
    /// last one.
    ///
    /// Returns whether the native tree was destroyed by this call.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::RegistryConsistency`] when `tree` has no
    /// live aliases.
    pub(crate) fn release(&self, tree: *mut ffi::TSTree) -> Result<bool> {
        let address = TreePtr(tree).address();
        let mut state = self.lock();
        let Some(slot) = state.slots.get_mut(&address) else {
            return Err(BindingError::registry(address, "release of unregistered tree"));
        };
        slot.aliases = slot.aliases.saturating_sub(1);
        if slot.aliases > 0 {
            return Ok(false);
        }
        // The entry leaves the map before the native free so a new tree
        // allocated at the same address can never observe it.
        let Some(mut removed) = state.slots.remove(&address) else {
            return Ok(false);
        };
        let destroyed = removed.handle.release();
        if destroyed {
            state.destroyed = state.destroyed.saturating_add(1);
            tracing::trace!(address, "destroyed tree");
        }
        Ok(destroyed)
    }

    /// Number of live aliases of `tree`; zero once it has been destroyed.
    #[must_use]
    pub fn alive_count(&self, tree: &crate::Tree) -> usize {
        self.aliases_of(tree.as_ptr())
    }

    pub(crate) fn aliases_of(&self, tree: *const ffi::TSTree) -> usize {
        self.lock()
            .slots
            .get(&(tree as usize))
            .map_or(0, |slot| slot.aliases)
    }

    /// Number of distinct native trees currently alive.
    #[must_use]
    pub fn live_trees(&self) -> usize {
        self.lock().slots.len()
    }

    /// Number of native trees this registry has freed so far.
    #[must_use]
    pub fn destroyed(&self) -> u64 {
        self.lock().destroyed
    }
}

impl fmt::Debug for TreeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("TreeRegistry")
            .field("live_trees", &state.slots.len())
            .field("destroyed", &state.destroyed)
            .finish()
    }
}
