//! Bounded diagnostic log queue
//!
//! The render thread may not call into the `log` facade (formatting, locking
//! and I/O all live behind it), so it appends short [`LogLine`]s here instead.
//! Lines are fixed-size `Copy` buffers and the queue is a preallocated
//! [`ArrayQueue`], so a push never allocates and never blocks. When the queue
//! is full the new line is dropped and counted.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::queue::ArrayQueue;

/// Maximum bytes per log line; longer text is truncated at a char boundary
pub const LOG_LINE_CAPACITY: usize = 120;

/// Default number of lines a mixer's queue holds
pub const DEFAULT_LOG_CAPACITY: usize = 256;

/// A short fixed-capacity text line
#[derive(Clone, Copy)]
pub struct LogLine {
    len: u8,
    bytes: [u8; LOG_LINE_CAPACITY],
}

impl LogLine {
    /// Empty line
    pub const fn new() -> Self {
        Self {
            len: 0,
            bytes: [0; LOG_LINE_CAPACITY],
        }
    }

    /// Line holding `text`, truncated if needed
    pub fn from_text(text: &str) -> Self {
        let mut line = Self::new();
        line.append(text);
        line
    }

    /// Line built from format arguments without allocating
    pub fn from_args(args: fmt::Arguments<'_>) -> Self {
        let mut line = Self::new();
        // Truncation is silent, so writing never fails
        let _ = fmt::write(&mut line, args);
        line
    }

    /// Line contents
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn append(&mut self, text: &str) {
        let used = self.len as usize;
        let mut take = text.len().min(LOG_LINE_CAPACITY - used);
        while !text.is_char_boundary(take) {
            take -= 1;
        }
        self.bytes[used..used + take].copy_from_slice(&text.as_bytes()[..take]);
        self.len = (used + take) as u8;
    }
}

impl Default for LogLine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Write for LogLine {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.append(s);
        Ok(())
    }
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LogLine").field(&self.as_str()).finish()
    }
}

impl PartialEq<&str> for LogLine {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

/// Multi-producer, multi-consumer bounded queue of log lines
pub struct LogQueue {
    lines: ArrayQueue<LogLine>,
    dropped: AtomicU64,
}

impl LogQueue {
    /// Create a queue holding `capacity` lines (at least one)
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: ArrayQueue::new(capacity.max(1)),
            dropped: AtomicU64::new(0),
        }
    }

    /// Append a line; returns false (and counts the drop) when full
    pub fn push(&self, line: LogLine) -> bool {
        match self.lines.push(line) {
            Ok(()) => true,
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Append formatted text
    pub fn push_fmt(&self, args: fmt::Arguments<'_>) -> bool {
        self.push(LogLine::from_args(args))
    }

    /// Oldest queued line, if any
    pub fn pop(&self) -> Option<LogLine> {
        self.lines.pop()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.lines.capacity()
    }

    /// Lines rejected because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for LogQueue {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}
