//! Forwarding the engine's debug log.
//!
//! A [`Logger`] pairs a [`LogSink`] with a message template. Installing one
//! on a [`Parser`](crate::Parser) makes the engine report every parse and
//! lex step through it.

use std::ffi::{CStr, c_char, c_void};
use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, PoisonError};

use tree_sitter::ffi;

/// Default message template.
pub const DEFAULT_FORMAT: &str = "{type} {message}";

/// Which engine phase produced a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogType {
    /// Parser actions: shifts, reductions, recoveries.
    Parse,
    /// Lexer actions.
    Lex,
}

impl LogType {
    /// Fixed-width label used in formatted messages.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Parse => "Parse:",
            Self::Lex => "Lex  :",
        }
    }

    const fn from_raw(raw: ffi::TSLogType) -> Self {
        if raw == ffi::TSLogTypeLex {
            Self::Lex
        } else {
            Self::Parse
        }
    }
}

impl fmt::Display for LogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Destination for formatted log messages.
pub trait LogSink: Send {
    /// Receives one formatted message.
    fn write(&mut self, message: &str);
}

impl<F> LogSink for F
where
    F: FnMut(&str) + Send,
{
    fn write(&mut self, message: &str) {
        self(message);
    }
}

/// Emits each message as a `tracing` event at `TRACE` level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn write(&mut self, message: &str) {
        tracing::trace!(target: "grove::engine", "{message}");
    }
}

/// Writes each message as one line to an [`io::Write`].
#[derive(Debug)]
pub struct WriteSink<W> {
    writer: W,
}

impl<W: io::Write + Send> WriteSink<W> {
    /// Wraps `writer`.
    #[must_use]
    pub const fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Returns the wrapped writer.
    #[must_use]
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: io::Write + Send> LogSink for WriteSink<W> {
    fn write(&mut self, message: &str) {
        if let Err(error) = writeln!(self.writer, "{message}") {
            tracing::debug!(%error, "dropped parser log line");
        }
    }
}

/// A sink plus the template used to format messages for it.
///
/// The template substitutes `{type}` with the [`LogType`] label and
/// `{message}` with the engine's text.
pub struct Logger {
    sink: Option<Box<dyn LogSink>>,
    format: String,
}

impl Logger {
    /// Logger writing to `sink` with [`DEFAULT_FORMAT`].
    #[must_use]
    pub fn new(sink: impl LogSink + 'static) -> Self {
        Self {
            sink: Some(Box::new(sink)),
            format: DEFAULT_FORMAT.to_owned(),
        }
    }

    /// Logger that discards everything.
    #[must_use]
    pub fn silent() -> Self {
        Self {
            sink: None,
            format: DEFAULT_FORMAT.to_owned(),
        }
    }

    /// Replaces the message template.
    #[must_use]
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    /// Current message template.
    #[must_use]
    pub const fn format(&self) -> &str {
        self.format.as_str()
    }

    /// Whether messages go anywhere.
    #[must_use]
    pub const fn has_sink(&self) -> bool {
        self.sink.is_some()
    }

    /// Formats `message` and hands it to the sink.
    pub fn log(&mut self, kind: LogType, message: &str) {
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        let line = self
            .format
            .replace("{type}", kind.label())
            .replace("{message}", message);
        sink.write(&line);
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(TracingSink)
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("format", &self.format)
            .field("has_sink", &self.has_sink())
            .finish()
    }
}

/// Engine log callback; `payload` points at a `Mutex<Logger>`.
pub(crate) unsafe extern "C" fn log_event(
    payload: *mut c_void,
    log_type: ffi::TSLogType,
    buffer: *const c_char,
) {
    if payload.is_null() || buffer.is_null() {
        return;
    }
    // SAFETY: the parser keeps the logger alive while it is installed.
    let logger = unsafe { &*payload.cast::<Mutex<Logger>>() };
    // SAFETY: the engine passes a NUL-terminated message.
    let message = unsafe { CStr::from_ptr(buffer) }.to_string_lossy();
    let kind = LogType::from_raw(log_type);

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        logger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .log(kind, &message);
    }));
    if outcome.is_err() {
        tracing::warn!(%kind, "discarded panic from parser log sink");
    }
}

#[cfg(test)]
mod tests {
    #![expect(clippy::expect_used, reason = "tests use expect for clarity")]

    use std::sync::Arc;

    use rstest::rstest;

    use super::*;

    fn explode(_: &str) {
        panic!("sink failure");
    }

    fn collecting() -> (Arc<Mutex<Vec<String>>>, Logger) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lines);
        let logger = Logger::new(move |message: &str| {
            sink.lock().expect("lines").push(message.to_owned());
        });
        (lines, logger)
    }

    #[rstest]
    #[case(LogType::Parse, DEFAULT_FORMAT, "Parse: shift state:3")]
    #[case(LogType::Lex, DEFAULT_FORMAT, "Lex  : shift state:3")]
    #[case(LogType::Lex, "[{type}] <{message}>", "[Lex  :] <shift state:3>")]
    #[case(LogType::Parse, "{message}", "shift state:3")]
    fn messages_follow_the_template(
        #[case] kind: LogType,
        #[case] format: &str,
        #[case] expected: &str,
    ) {
        let (lines, plain) = collecting();
        let mut logger = plain.with_format(format);
        logger.log(kind, "shift state:3");
        assert_eq!(*lines.lock().expect("lines"), [expected.to_owned()]);
    }

    #[test]
    fn silent_logger_is_a_no_op() {
        let mut logger = Logger::silent();
        assert!(!logger.has_sink());
        logger.log(LogType::Parse, "ignored");
    }

    #[test]
    fn write_sink_appends_newlines() {
        let mut sink = WriteSink::new(Vec::new());
        sink.write("one");
        sink.write("two");
        assert_eq!(sink.into_inner(), b"one\ntwo\n");
    }

    #[test]
    fn callback_decodes_type_and_swallows_panics() {
        let (lines, logger) = collecting();
        let installed = Mutex::new(logger);
        let payload = std::ptr::from_ref(&installed).cast_mut().cast::<c_void>();
        // SAFETY: `payload` points at a live `Mutex<Logger>` and the message
        // is NUL-terminated.
        unsafe { log_event(payload, ffi::TSLogTypeLex, c"skip character:' '".as_ptr()) };
        assert_eq!(
            *lines.lock().expect("lines"),
            ["Lex  : skip character:' '".to_owned()]
        );

        let panicking = Mutex::new(Logger::new(explode));
        let payload = std::ptr::from_ref(&panicking).cast_mut().cast::<c_void>();
        // SAFETY: as above.
        unsafe { log_event(payload, ffi::TSLogTypeParse, c"reduce".as_ptr()) };
    }
}
