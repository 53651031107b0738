//! Fixed-size, reusable read buffer with a pull-based cursor.
//!
//! The cursor hides refills behind [`StreamCursor::peek`] and the scanning
//! helpers. Callers that need the raw bytes of what they scanned (the FASTQ
//! record being emitted) open a *span*: while the span is held, every refill
//! first moves the span's bytes out of the buffer into a carry vector, so the
//! span survives any number of refills.
//!
//! The byte after the valid region is always NUL. Identifier decoding relies on
//! it to stop at the end of the loaded bytes without a bounds check per byte.

use std::io::{self, Read};

use crate::bignum::{decode_digit, BigNum, HexDigit};
use crate::error::{Error, Result};

/// Default buffer capacity (64 KiB).
pub const DEFAULT_CAPACITY: usize = 64 * 1024;

/// How a line scan ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineEnd {
    /// A `\n` was consumed.
    Newline,
    /// Input ran out after `consumed` bytes of the line.
    Eof { consumed: usize },
}

/// Result of decoding one identifier run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HexRun {
    /// Bytes consumed, terminator excluded.
    pub len: usize,
    /// Hex digits accepted into the identifier.
    pub digits: usize,
}

pub struct StreamCursor<R> {
    reader: R,
    /// `capacity` bytes of data plus the NUL terminator.
    buf: Box<[u8]>,
    pos: usize,
    filled: usize,
    eof: bool,
    /// 1-based line number of `pos`.
    line: u64,
    /// Start of the open span inside `buf`.
    mark: usize,
    /// Span bytes that were moved out of `buf` by earlier refills.
    carry: Vec<u8>,
    holding: bool,
}

impl<R: Read> StreamCursor<R> {
    pub fn new(reader: R) -> Self {
        Self::with_capacity(reader, DEFAULT_CAPACITY)
    }

    /// `capacity` is clamped to at least one byte.
    pub fn with_capacity(reader: R, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            reader,
            buf: vec![0u8; capacity + 1].into_boxed_slice(),
            pos: 0,
            filled: 0,
            eof: false,
            line: 1,
            mark: 0,
            carry: Vec::new(),
            holding: false,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.len() - 1
    }

    #[inline]
    pub fn line(&self) -> u64 {
        self.line
    }

    /// Load the next chunk. Only called once every loaded byte is consumed.
    fn refill(&mut self) -> Result<bool> {
        debug_assert_eq!(self.pos, self.filled);
        if self.holding && self.mark < self.filled {
            reserve_carry(&mut self.carry, self.filled - self.mark)?;
            self.carry
                .extend_from_slice(&self.buf[self.mark..self.filled]);
        }
        self.mark = 0;
        self.pos = 0;
        self.filled = 0;
        self.buf[0] = 0;
        if self.eof {
            return Ok(false);
        }

        let capacity = self.capacity();
        let n = loop {
            match self.reader.read(&mut self.buf[..capacity]) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        };
        self.filled = n;
        self.buf[n] = 0;
        if n == 0 {
            self.eof = true;
        }
        Ok(n != 0)
    }

    /// Next byte without consuming it; `None` at end of input.
    #[inline]
    pub fn peek(&mut self) -> Result<Option<u8>> {
        if self.pos == self.filled && !self.refill()? {
            return Ok(None);
        }
        Ok(Some(self.buf[self.pos]))
    }

    /// Consume the byte returned by the last [`StreamCursor::peek`].
    #[inline]
    pub fn advance(&mut self) {
        debug_assert!(self.pos < self.filled);
        if self.buf[self.pos] == b'\n' {
            self.line += 1;
        }
        self.pos += 1;
    }

    /// Skip bytes `<= 0x20` and return the first other byte, unconsumed.
    pub fn skip_whitespace(&mut self) -> Result<Option<u8>> {
        while let Some(byte) = self.peek()? {
            if byte > b' ' {
                return Ok(Some(byte));
            }
            self.advance();
        }
        Ok(None)
    }

    /// Consume through the next `\n`.
    pub fn skip_line(&mut self) -> Result<LineEnd> {
        let mut consumed = 0;
        loop {
            if self.pos == self.filled && !self.refill()? {
                return Ok(LineEnd::Eof { consumed });
            }
            match self.buf[self.pos..self.filled].iter().position(|&b| b == b'\n') {
                Some(i) => {
                    self.pos += i + 1;
                    self.line += 1;
                    return Ok(LineEnd::Newline);
                }
                None => {
                    consumed += self.filled - self.pos;
                    self.pos = self.filled;
                }
            }
        }
    }

    /// Decode hex digits into `id` up to the next terminator byte, which is left
    /// unconsumed. Partial state survives refills.
    pub fn read_hex_run(&mut self, id: &mut BigNum) -> Result<HexRun> {
        let mut run = HexRun { len: 0, digits: 0 };
        loop {
            // buf[filled] is NUL, so the scan always stops inside the buffer.
            match decode_digit(self.buf[self.pos]) {
                HexDigit::Value(v) => {
                    id.push_digit(v)?;
                    run.digits += 1;
                }
                HexDigit::Skip => {}
                HexDigit::Terminator => {
                    if self.pos == self.filled && self.refill()? {
                        continue;
                    }
                    return Ok(run);
                }
            }
            self.pos += 1;
            run.len += 1;
        }
    }

    // -------------------------------------------------------------------------
    // Spans
    // -------------------------------------------------------------------------

    /// Start recording at the current position. `hold` selects whether bytes
    /// are kept across refills.
    pub fn open_span(&mut self, hold: bool) {
        self.carry.clear();
        self.mark = self.pos;
        self.holding = hold;
    }

    /// Change whether the open span keeps its bytes across refills. Dropping
    /// the hold discards whatever is later refilled over.
    pub fn hold_span(&mut self, hold: bool) {
        self.holding = hold;
    }

    /// The span's bytes: the carried prefix followed by what is still buffered.
    pub fn span(&self) -> (&[u8], &[u8]) {
        (&self.carry, &self.buf[self.mark..self.pos])
    }

    /// Drop the span and stop holding.
    pub fn close_span(&mut self) {
        self.carry.clear();
        self.mark = self.pos;
        self.holding = false;
    }
}

/// Grow the span carry, reporting failure as out of memory rather than I/O.
fn reserve_carry(carry: &mut Vec<u8>, additional: usize) -> Result<()> {
    carry
        .try_reserve(additional)
        .map_err(|_| Error::OutOfMemory("record buffer"))
}

/// Reads one identifier per line from a filter list.
///
/// Leading blanks are skipped, only the first whitespace-delimited run of each
/// line is decoded, and lines without a single hex digit are ignored.
pub struct IdListReader<R> {
    cursor: StreamCursor<R>,
    ignored: u64,
}

impl<R: Read> IdListReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_capacity(reader, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(reader: R, capacity: usize) -> Self {
        Self {
            cursor: StreamCursor::with_capacity(reader, capacity),
            ignored: 0,
        }
    }

    /// Non-blank lines that produced no identifier so far.
    pub fn ignored_lines(&self) -> u64 {
        self.ignored
    }

    pub fn next_id(&mut self) -> Result<Option<BigNum>> {
        loop {
            if self.cursor.skip_whitespace()?.is_none() {
                return Ok(None);
            }
            let mut id = BigNum::new();
            let run = self.cursor.read_hex_run(&mut id)?;
            self.cursor.skip_line()?;
            if run.digits > 0 {
                return Ok(Some(id));
            }
            self.ignored += 1;
        }
    }
}

impl<R: Read> Iterator for IdListReader<R> {
    type Item = Result<BigNum>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_id().transpose()
    }
}
