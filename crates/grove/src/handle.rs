//! Owned native resources.
//!
//! [`Handle`] is the substrate every owning type in this crate is built on.
//! It holds one native value, refuses to arm its destructor for a value the
//! engine failed to produce, and runs that destructor exactly once.

use std::fmt;

use crate::error::{BindingError, Result};

/// A native resource kind that a [`Handle`] can own.
pub trait Resource {
    /// The native value held by the handle: usually a pointer, sometimes an
    /// inline struct.
    type Raw;

    /// Human-readable name used in errors and logs.
    const NAME: &'static str;

    /// Whether `raw` refers to a successfully constructed resource.
    fn is_valid(raw: &Self::Raw) -> bool;

    /// Frees the native resource.
    ///
    /// # Safety
    ///
    /// `raw` must satisfy [`Resource::is_valid`] and must not have been
    /// destroyed before. [`Handle`] upholds both.
    unsafe fn destroy(raw: &mut Self::Raw);
}

/// Owns exactly one native resource.
pub struct Handle<R: Resource> {
    slot: Option<R::Raw>,
}

impl<R: Resource> Handle<R> {
    /// Takes ownership of `raw`.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::Allocation`] when `raw` is not a valid
    /// resource (for example a null pointer from a failed constructor). No
    /// destructor is ever run for a rejected value.
    pub fn allocate(raw: R::Raw) -> Result<Self> {
        if R::is_valid(&raw) {
            Ok(Self { slot: Some(raw) })
        } else {
            Err(BindingError::allocation(R::NAME))
        }
    }

    /// Read-only access to the native value.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::Released`] after [`Handle::release`].
    pub fn borrow(&self) -> Result<&R::Raw> {
        self.slot
            .as_ref()
            .ok_or_else(|| BindingError::released(R::NAME))
    }

    /// Mutable access to the native value.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::Released`] after [`Handle::release`].
    pub fn borrow_mut(&mut self) -> Result<&mut R::Raw> {
        self.slot
            .as_mut()
            .ok_or_else(|| BindingError::released(R::NAME))
    }

    /// Gives up ownership without running the destructor.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::Released`] after [`Handle::release`].
    pub fn consume(mut self) -> Result<R::Raw> {
        self.slot.take().ok_or_else(|| BindingError::released(R::NAME))
    }

    /// Runs the destructor if it has not run yet.
    ///
    /// Returns `true` when this call freed the resource. Further calls are
    /// no-ops that return `false`.
    pub fn release(&mut self) -> bool {
        match self.slot.take() {
            Some(mut raw) => {
                // SAFETY: the slot only ever holds values accepted by
                // `is_valid`, and `take` guarantees this runs once.
                unsafe { R::destroy(&mut raw) };
                tracing::trace!(resource = R::NAME, "released native resource");
                true
            }
            None => false,
        }
    }

    /// Whether the resource has been released.
    #[must_use]
    pub const fn is_released(&self) -> bool {
        self.slot.is_none()
    }
}

impl<R: Resource> Drop for Handle<R> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<R: Resource> fmt::Debug for Handle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("resource", &R::NAME)
            .field("released", &self.is_released())
            .finish()
    }
}
