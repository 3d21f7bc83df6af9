//! Pull-based source input.
//!
//! The engine asks for text one chunk at a time through a C callback. The
//! [`InputBridge`] adapts that callback to the [`Input`] trait and owns the
//! most recently returned chunk until the engine asks for the next one, so
//! the pointer it hands back is always backed by live storage.

use std::any::Any;
use std::ffi::{c_char, c_void};
use std::fmt;
use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::Arc;

use tree_sitter::ffi;

use crate::position::Point;

/// One chunk of source text handed to the engine.
#[derive(Clone)]
pub enum Chunk {
    /// Borrowed from static storage.
    Static(&'static [u8]),
    /// Owned bytes.
    Owned(Vec<u8>),
    /// A window onto a shared buffer.
    Shared {
        /// Whole buffer.
        bytes: Arc<[u8]>,
        /// Window within `bytes`.
        range: Range<usize>,
    },
}

impl Chunk {
    /// Bytes of the chunk. An out-of-bounds shared window reads as empty.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Static(bytes) => bytes,
            Self::Owned(bytes) => bytes,
            Self::Shared { bytes, range } => bytes.get(range.clone()).unwrap_or_default(),
        }
    }

    /// Length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Whether the chunk holds no bytes, which the engine reads as end of
    /// input.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk").field("len", &self.len()).finish()
    }
}

impl From<&'static [u8]> for Chunk {
    fn from(bytes: &'static [u8]) -> Self {
        Self::Static(bytes)
    }
}

impl From<&'static str> for Chunk {
    fn from(text: &'static str) -> Self {
        Self::Static(text.as_bytes())
    }
}

impl From<Vec<u8>> for Chunk {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Owned(bytes)
    }
}

impl From<String> for Chunk {
    fn from(text: String) -> Self {
        Self::Owned(text.into_bytes())
    }
}

impl From<Arc<[u8]>> for Chunk {
    fn from(bytes: Arc<[u8]>) -> Self {
        let range = 0..bytes.len();
        Self::Shared { bytes, range }
    }
}

/// Supplies source text to a parse on demand.
///
/// Returning `None` or an empty chunk ends the input.
pub trait Input {
    /// Produces the text starting at `byte_offset`, which lies at `position`.
    fn read(&mut self, byte_offset: usize, position: Point) -> Option<Chunk>;
}

impl<F> Input for F
where
    F: FnMut(usize, Point) -> Option<Chunk>,
{
    fn read(&mut self, byte_offset: usize, position: Point) -> Option<Chunk> {
        self(byte_offset, position)
    }
}

/// An in-memory [`Input`] that serves fixed-size chunks and counts how
/// often it was asked.
#[derive(Debug, Clone)]
pub struct SourceInput {
    bytes: Arc<[u8]>,
    chunk_len: usize,
    reads: usize,
}

impl SourceInput {
    /// Serves `bytes` in chunks of at most `chunk_len` bytes.
    ///
    /// A `chunk_len` of zero serves the whole remainder in one chunk.
    #[must_use]
    pub fn new(bytes: impl Into<Arc<[u8]>>, chunk_len: usize) -> Self {
        Self {
            bytes: bytes.into(),
            chunk_len,
            reads: 0,
        }
    }

    /// Number of times the engine asked for text.
    #[must_use]
    pub const fn reads(&self) -> usize {
        self.reads
    }

    /// Forgets the read count.
    pub const fn reset_reads(&mut self) {
        self.reads = 0;
    }
}

impl Input for SourceInput {
    fn read(&mut self, byte_offset: usize, _position: Point) -> Option<Chunk> {
        self.reads = self.reads.saturating_add(1);
        let len = self.bytes.len();
        if byte_offset >= len {
            return None;
        }
        let end = if self.chunk_len == 0 {
            len
        } else {
            byte_offset.saturating_add(self.chunk_len).min(len)
        };
        Some(Chunk::Shared {
            bytes: Arc::clone(&self.bytes),
            range: byte_offset..end,
        })
    }
}

static END_OF_INPUT: [u8; 1] = [0];

/// Adapter between the engine's read callback and an [`Input`].
///
/// The bridge must stay at a fixed address while the engine holds the
/// [`ffi::TSInput`] built from it.
pub(crate) struct InputBridge<'a> {
    input: &'a mut dyn Input,
    retained: Option<Chunk>,
    panic: Option<Box<dyn Any + Send>>,
    reads: usize,
}

impl<'a> InputBridge<'a> {
    pub(crate) fn new(input: &'a mut dyn Input) -> Self {
        Self {
            input,
            retained: None,
            panic: None,
            reads: 0,
        }
    }

    /// Callback table pointing at this bridge.
    pub(crate) fn as_ts_input(&mut self, encoding: ffi::TSInputEncoding) -> ffi::TSInput {
        ffi::TSInput {
            payload: ptr::from_mut(self).cast::<c_void>(),
            read: Some(read_chunk),
            encoding,
            decode: None,
        }
    }

    /// Number of callbacks served.
    pub(crate) const fn reads(&self) -> usize {
        self.reads
    }

    /// Ends the bridge, re-raising any panic caught inside [`Input::read`].
    pub(crate) fn finish(self) {
        if let Some(payload) = self.panic {
            panic::resume_unwind(payload);
        }
    }

    fn next_chunk(&mut self, byte_offset: u32, position: Point) -> (*const c_char, u32) {
        // The engine has finished with the previous chunk once it asks again.
        self.retained = None;
        if self.panic.is_some() {
            return end_of_input();
        }
        self.reads = self.reads.saturating_add(1);

        let offset = usize::try_from(byte_offset).unwrap_or(usize::MAX);
        let input = &mut *self.input;
        match panic::catch_unwind(AssertUnwindSafe(|| input.read(offset, position))) {
            Ok(chunk) => {
                self.retained = chunk.filter(|chunk| !chunk.is_empty());
                self.retained.as_ref().map_or_else(end_of_input, |chunk| {
                    let bytes = chunk.as_bytes();
                    let len = u32::try_from(bytes.len()).unwrap_or(u32::MAX);
                    (bytes.as_ptr().cast::<c_char>(), len)
                })
            }
            Err(payload) => {
                self.panic = Some(payload);
                end_of_input()
            }
        }
    }
}

fn end_of_input() -> (*const c_char, u32) {
    (END_OF_INPUT.as_ptr().cast::<c_char>(), 0)
}

unsafe extern "C" fn read_chunk(
    payload: *mut c_void,
    byte_index: u32,
    position: ffi::TSPoint,
    bytes_read: *mut u32,
) -> *const c_char {
    // SAFETY: `payload` was produced by `InputBridge::as_ts_input` and the
    // bridge outlives the parse call that invokes this callback.
    let bridge = unsafe { &mut *payload.cast::<InputBridge<'_>>() };
    let (chunk, len) = bridge.next_chunk(byte_index, position.into());
    // SAFETY: the engine passes a valid out-pointer.
    unsafe { bytes_read.write(len) };
    chunk
}
