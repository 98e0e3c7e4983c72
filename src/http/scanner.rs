//! Line scanning over a connection's input buffer.
//!
//! Lines are located in place: the terminator bytes are overwritten with NUL
//! and the caller receives a range into the buffer rather than a copy.

use std::ops::Range;

/// Result of scanning the unscanned region for the next line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineStatus {
    /// A complete line. The range excludes the terminator.
    Ready(Range<usize>),
    /// No terminator yet; wait for the next readable event.
    Incomplete,
    /// A `\r` not followed by `\n`, or a `\n` at the very start of the buffer.
    Malformed,
}

/// Fixed-capacity input buffer with the three cursors the parser needs.
///
/// `checked <= filled <= capacity` holds at all times.
pub struct ReadBuffer {
    data: Box<[u8]>,
    /// Bytes received so far.
    filled: usize,
    /// Bytes already examined by [`ReadBuffer::scan_line`].
    checked: usize,
    /// Offset where the line currently being assembled begins.
    line_start: usize,
}

impl ReadBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity].into_boxed_slice(),
            filled: 0,
            checked: 0,
            line_start: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn len(&self) -> usize {
        self.filled
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    pub fn is_full(&self) -> bool {
        self.filled >= self.data.len()
    }

    pub fn checked(&self) -> usize {
        self.checked
    }

    pub fn line_start(&self) -> usize {
        self.line_start
    }

    /// Bytes received since the start of the current line.
    pub fn since_line_start(&self) -> usize {
        self.filled - self.line_start
    }

    /// Space left after the current line start.
    pub fn room_after_line_start(&self) -> usize {
        self.data.len() - self.line_start
    }

    /// The writable tail of the buffer. Follow with [`ReadBuffer::advance`].
    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.filled..]
    }

    /// Marks `n` more bytes of the spare region as received.
    pub fn advance(&mut self, n: usize) {
        debug_assert!(n <= self.data.len() - self.filled);
        self.filled = (self.filled + n).min(self.data.len());
    }

    /// Copies as much of `bytes` as fits and returns how many were taken.
    pub fn extend_from_slice(&mut self, bytes: &[u8]) -> usize {
        let spare = self.spare_mut();
        let n = bytes.len().min(spare.len());
        spare[..n].copy_from_slice(&bytes[..n]);
        self.advance(n);
        n
    }

    pub fn scanned(&self) -> &[u8] {
        &self.data[..self.checked]
    }

    pub fn unscanned(&self) -> &[u8] {
        &self.data[self.checked..self.filled]
    }

    /// The partial line between the current line start and the checked cursor.
    pub fn current_line(&self) -> &[u8] {
        &self.data[self.line_start..self.checked]
    }

    pub fn slice(&self, range: Range<usize>) -> &[u8] {
        &self.data[range]
    }

    /// Scans forward from the checked cursor for a CRLF or bare LF terminator.
    pub fn scan_line(&mut self) -> LineStatus {
        while self.checked < self.filled {
            match self.data[self.checked] {
                b'\r' => {
                    if self.checked + 1 == self.filled {
                        return LineStatus::Incomplete;
                    }
                    if self.data[self.checked + 1] != b'\n' {
                        return LineStatus::Malformed;
                    }
                    let end = self.checked;
                    self.data[end] = 0;
                    self.data[end + 1] = 0;
                    self.checked += 2;
                    return self.finish_line(end);
                }
                b'\n' => {
                    // No preceding byte to inspect.
                    if self.checked == 0 {
                        return LineStatus::Malformed;
                    }
                    let end = self.checked;
                    self.data[end] = 0;
                    self.checked += 1;
                    return self.finish_line(end);
                }
                _ => self.checked += 1,
            }
        }
        LineStatus::Incomplete
    }

    fn finish_line(&mut self, end: usize) -> LineStatus {
        let line = self.line_start..end;
        self.line_start = self.checked;
        LineStatus::Ready(line)
    }

    /// Clears received bytes and rewinds every cursor.
    pub fn reset(&mut self) {
        self.data[..self.filled].fill(0);
        self.filled = 0;
        self.checked = 0;
        self.line_start = 0;
    }
}
