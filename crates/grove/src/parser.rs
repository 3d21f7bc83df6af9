//! Parser configuration and parsing.

use std::fmt;
#[cfg(unix)]
use std::fs::File;
#[cfg(unix)]
use std::os::fd::AsRawFd;
#[cfg(unix)]
use std::path::Path;
use std::ptr;
use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tree_sitter::ffi;

use crate::error::{BindingError, Result};
use crate::handle::{Handle, Resource};
use crate::input::{Input, InputBridge};
use crate::language::{ABI_VERSION, Grammar, MIN_COMPATIBLE_ABI_VERSION, check_abi_version};
use crate::logger::{Logger, log_event};
use crate::position::Range;
use crate::registry::TreeRegistry;
use crate::tree::Tree;

/// Text encoding of parser input.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputEncoding {
    /// UTF-8.
    #[default]
    Utf8,
    /// UTF-16, little endian.
    Utf16Le,
    /// UTF-16, big endian.
    Utf16Be,
}

impl From<InputEncoding> for ffi::TSInputEncoding {
    fn from(encoding: InputEncoding) -> Self {
        match encoding {
            InputEncoding::Utf8 => ffi::TSInputEncodingUTF8,
            InputEncoding::Utf16Le => ffi::TSInputEncodingUTF16LE,
            InputEncoding::Utf16Be => ffi::TSInputEncodingUTF16BE,
        }
    }
}

pub(crate) struct NativeParser;

impl Resource for NativeParser {
    type Raw = *mut ffi::TSParser;
    const NAME: &'static str = "parser";

    fn is_valid(raw: &Self::Raw) -> bool {
        !raw.is_null()
    }

    unsafe fn destroy(raw: &mut Self::Raw) {
        // SAFETY: upheld by `Handle`. Deleting a parser leaves its DOT graph
        // stream open, so close it first.
        unsafe {
            ffi::ts_parser_print_dot_graphs(*raw, -1);
            ffi::ts_parser_delete(*raw);
        }
    }
}

/// Owns one native parser and its configuration.
///
/// Trees do not keep their parser alive, and a parser may be dropped while
/// trees it produced are still in use.
pub struct Parser {
    // Declared first so the native parser goes before the state it points at.
    handle: Handle<NativeParser>,
    registry: TreeRegistry,
    logger: Option<Arc<Mutex<Logger>>>,
    cancellation: Option<Arc<AtomicUsize>>,
}

impl Parser {
    /// Creates a parser with its own tree registry.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::Allocation`] if the engine cannot create a
    /// parser.
    pub fn new() -> Result<Self> {
        Self::with_registry(TreeRegistry::new())
    }

    /// Creates a parser that records its trees in `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::Allocation`] if the engine cannot create a
    /// parser.
    pub fn with_registry(registry: TreeRegistry) -> Result<Self> {
        // SAFETY: no preconditions.
        let raw = unsafe { ffi::ts_parser_new() };
        Ok(Self {
            handle: Handle::allocate(raw)?,
            registry,
            logger: None,
            cancellation: None,
        })
    }

    fn raw(&self) -> Result<*mut ffi::TSParser> {
        self.handle.borrow().copied()
    }

    /// Registry receiving the trees this parser produces.
    #[must_use]
    pub const fn registry(&self) -> &TreeRegistry {
        &self.registry
    }

    /// Assigns the grammar used by subsequent parses. This also resets any
    /// halted parse.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::IncompatibleGrammar`] when the grammar's ABI
    /// version is outside the supported window.
    pub fn set_language(&mut self, grammar: Grammar) -> Result<()> {
        let version = grammar.abi_version();
        let incompatible = || BindingError::IncompatibleGrammar {
            version,
            min: MIN_COMPATIBLE_ABI_VERSION,
            max: ABI_VERSION,
        };
        check_abi_version(version).map_err(|_| incompatible())?;
        let parser = self.raw()?;
        // SAFETY: the parser is live and grammars are never freed.
        if unsafe { ffi::ts_parser_set_language(parser, grammar.as_ptr()) } {
            Ok(())
        } else {
            Err(incompatible())
        }
    }

    /// Grammar currently assigned.
    #[must_use]
    pub fn language(&self) -> Option<Grammar> {
        let parser = self.raw().ok()?;
        // SAFETY: the parser is live.
        Grammar::from_raw(unsafe { ffi::ts_parser_language(parser) })
    }

    /// Restricts parsing to `ranges`. An empty slice parses whole documents.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::InvalidRange`] when the ranges overlap or are
    /// out of order; the previous ranges stay in effect.
    pub fn set_included_ranges(&mut self, ranges: &[Range]) -> Result<()> {
        let parser = self.raw()?;
        let raw: Vec<ffi::TSRange> = ranges.iter().copied().map(Into::into).collect();
        let count = u32::try_from(raw.len())
            .map_err(|_| BindingError::invalid_range("too many included ranges"))?;
        // SAFETY: the parser is live and copies the ranges.
        if unsafe { ffi::ts_parser_set_included_ranges(parser, raw.as_ptr(), count) } {
            Ok(())
        } else {
            Err(BindingError::invalid_range(
                "included ranges must be ordered and must not overlap",
            ))
        }
    }

    /// Ranges the parser is restricted to.
    #[must_use]
    pub fn included_ranges(&self) -> Vec<Range> {
        let Ok(parser) = self.raw() else {
            return Vec::new();
        };
        let mut count = 0_u32;
        // SAFETY: the parser is live; the array is owned by the parser.
        let ranges = unsafe { ffi::ts_parser_included_ranges(parser, &mut count) };
        if ranges.is_null() {
            return Vec::new();
        }
        let len = usize::try_from(count).unwrap_or(0);
        // SAFETY: the engine reports `count` ranges at `ranges`.
        unsafe { std::slice::from_raw_parts(ranges, len) }
            .iter()
            .copied()
            .map(Range::from)
            .collect()
    }

    /// Limits how long one parse call may run; zero means no limit.
    pub fn set_timeout_micros(&mut self, timeout_micros: u64) {
        if let Ok(parser) = self.raw() {
            // SAFETY: the parser is live.
            unsafe { ffi::ts_parser_set_timeout_micros(parser, timeout_micros) };
        }
    }

    /// Current timeout in microseconds.
    #[must_use]
    pub fn timeout_micros(&self) -> u64 {
        // SAFETY: the parser is live.
        self.raw()
            .map_or(0, |parser| unsafe { ffi::ts_parser_timeout_micros(parser) })
    }

    /// Installs a flag that halts parsing once another thread stores a
    /// non-zero value in it. `None` removes the flag.
    pub fn set_cancellation_flag(&mut self, flag: Option<Arc<AtomicUsize>>) {
        let Ok(parser) = self.raw() else {
            return;
        };
        let raw = flag
            .as_ref()
            .map_or(ptr::null(), |flag| flag.as_ptr().cast_const());
        // SAFETY: the parser is live and `self.cancellation` keeps the flag
        // alive for as long as it is installed.
        unsafe { ffi::ts_parser_set_cancellation_flag(parser, raw) };
        self.cancellation = flag;
    }

    /// Installed cancellation flag.
    #[must_use]
    pub fn cancellation_flag(&self) -> Option<Arc<AtomicUsize>> {
        self.cancellation.clone()
    }

    /// Routes the engine's debug log to `logger`, returning the previous one.
    pub fn set_logger(&mut self, logger: Logger) -> Option<Logger> {
        let installed = Arc::new(Mutex::new(logger));
        self.install_logger(ffi::TSLogger {
            payload: Arc::as_ptr(&installed).cast_mut().cast(),
            log: Some(log_event),
        });
        self.logger.replace(installed).and_then(unwrap_logger)
    }

    /// Stops logging, returning the logger that was installed.
    pub fn clear_logger(&mut self) -> Option<Logger> {
        self.install_logger(ffi::TSLogger {
            payload: ptr::null_mut(),
            log: None,
        });
        self.logger.take().and_then(unwrap_logger)
    }

    /// Installed logger.
    #[must_use]
    pub fn logger(&self) -> Option<MutexGuard<'_, Logger>> {
        self.logger
            .as_ref()
            .map(|logger| logger.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn install_logger(&mut self, logger: ffi::TSLogger) {
        if let Ok(parser) = self.raw() {
            // SAFETY: the parser is live; the payload, when present, is kept
            // alive by `self.logger` until it is replaced.
            unsafe { ffi::ts_parser_set_logger(parser, logger) };
        }
    }

    /// Parses UTF-8 text pulled from `input`.
    ///
    /// Pass the previous tree, edited to match the new text, as `old` to
    /// reuse its unchanged parts. Returns `Ok(None)` when the parse halted on
    /// the timeout or cancellation flag; calling again with the same
    /// arguments resumes it, and [`Parser::reset`] abandons it.
    ///
    /// # Errors
    ///
    /// Returns an error if the produced tree cannot be registered.
    ///
    /// # Panics
    ///
    /// Re-raises a panic from [`Input::read`] once the engine has returned.
    pub fn parse(&mut self, old: Option<&Tree>, input: &mut dyn Input) -> Result<Option<Tree>> {
        self.parse_with_encoding(old, input, InputEncoding::Utf8)
    }

    /// Like [`Parser::parse`] for input in `encoding`.
    ///
    /// # Errors
    ///
    /// Returns an error if the produced tree cannot be registered.
    ///
    /// # Panics
    ///
    /// Re-raises a panic from [`Input::read`] once the engine has returned.
    pub fn parse_with_encoding(
        &mut self,
        old: Option<&Tree>,
        input: &mut dyn Input,
        encoding: InputEncoding,
    ) -> Result<Option<Tree>> {
        let parser = self.raw()?;
        let mut bridge = InputBridge::new(input);
        let table = bridge.as_ts_input(encoding.into());
        // SAFETY: the parser is live, `old` keeps its tree alive, and the
        // bridge stays in place until the call returns.
        let raw = unsafe { ffi::ts_parser_parse(parser, old_tree(old), table) };
        tracing::trace!(reads = bridge.reads(), complete = !raw.is_null(), "parse call returned");
        let result = self.adopt(raw);
        bridge.finish();
        result
    }

    /// Parses a complete UTF-8 string.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::InputTooLarge`] for input the engine cannot
    /// address, or an error if the tree cannot be registered.
    pub fn parse_str(&mut self, old: Option<&Tree>, source: &str) -> Result<Option<Tree>> {
        self.parse_bytes(old, source.as_bytes(), InputEncoding::Utf8)
    }

    /// Parses a complete buffer in `encoding`.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::InputTooLarge`] for input the engine cannot
    /// address, or an error if the tree cannot be registered.
    pub fn parse_bytes(
        &mut self,
        old: Option<&Tree>,
        source: &[u8],
        encoding: InputEncoding,
    ) -> Result<Option<Tree>> {
        let parser = self.raw()?;
        let len = u32::try_from(source.len())
            .map_err(|_| BindingError::InputTooLarge { len: source.len() })?;
        // SAFETY: the parser is live, `old` keeps its tree alive, and the
        // buffer outlives the call.
        let raw = unsafe {
            ffi::ts_parser_parse_string_encoding(
                parser,
                old_tree(old),
                source.as_ptr().cast(),
                len,
                encoding.into(),
            )
        };
        self.adopt(raw)
    }

    fn adopt(&self, raw: *mut ffi::TSTree) -> Result<Option<Tree>> {
        if raw.is_null() {
            tracing::debug!("parse halted before completing a tree");
            return Ok(None);
        }
        Tree::adopt(raw, &self.registry).map(Some)
    }

    /// Abandons a halted parse so the next call starts from scratch.
    pub fn reset(&mut self) {
        if let Ok(parser) = self.raw() {
            // SAFETY: the parser is live.
            unsafe { ffi::ts_parser_reset(parser) };
        }
    }

    /// Streams DOT graphs of the parser's stack to `file` during subsequent
    /// parses; `None` stops and closes the stream.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::Io`] when the descriptor cannot be duplicated.
    #[cfg(unix)]
    pub fn print_dot_graphs(&mut self, file: Option<&File>) -> Result<()> {
        let parser = self.raw()?;
        let fd = match file {
            Some(file) => {
                // SAFETY: duplicating a live descriptor; the engine takes
                // ownership of the duplicate.
                let fd = unsafe { libc::dup(file.as_raw_fd()) };
                if fd < 0 {
                    return Err(std::io::Error::last_os_error().into());
                }
                fd
            }
            None => -1,
        };
        // SAFETY: the parser is live and owns `fd` from here on.
        unsafe { ffi::ts_parser_print_dot_graphs(parser, fd) };
        Ok(())
    }

    /// Streams DOT graphs to a new file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::Io`] when the file cannot be created.
    #[cfg(unix)]
    pub fn print_dot_graphs_to_path(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path)?;
        self.print_dot_graphs(Some(&file))
    }
}

fn old_tree(old: Option<&Tree>) -> *const ffi::TSTree {
    old.map_or(ptr::null(), |tree| tree.as_ptr().cast_const())
}

fn unwrap_logger(logger: Arc<Mutex<Logger>>) -> Option<Logger> {
    Arc::try_unwrap(logger)
        .ok()
        .map(|logger| logger.into_inner().unwrap_or_else(PoisonError::into_inner))
}

impl fmt::Debug for Parser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parser")
            .field("language", &self.language())
            .field("timeout_micros", &self.timeout_micros())
            .field("has_logger", &self.logger.is_some())
            .finish_non_exhaustive()
    }
}
