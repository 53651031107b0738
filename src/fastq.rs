//! Streaming FASTQ tokenizer.
//!
//! Records are read through one fixed-size buffer. For each record the reader
//! decodes the header identifier straight into a [`BigNum`] and hands back a
//! [`Record`] guard; the caller then either emits the record verbatim or skips
//! it. Both paths walk the record with the same boundary logic:
//!
//! 1. header: the leading character (normally `@`), the identifier up to the
//!    first whitespace, then the rest of the line
//! 2. sequence: every line up to the first one starting with `+`, counted
//! 3. spacer: the `+` line, comment text ignored
//! 4. quality: exactly as many lines as the sequence had
//!
//! Emission is staged per record, so the output only ever receives whole
//! records. A record cut short by the end of input is an
//! [`Error::InvalidFastq`].
//!
//! # Example
//!
//! ```
//! use fqsieve::fastq::FastqReader;
//!
//! # fn main() -> fqsieve::Result<()> {
//! let input = b"@read1\nACGT\nACGT\n+\nIIII\nIIII\n@read2\nAC\n+\nII\n";
//! let mut reader = FastqReader::new(&input[..]);
//! let mut out = Vec::new();
//!
//! while let Some(record) = reader.next_record()? {
//!     if record.id().to_string() == "EAD1" {
//!         record.emit(&mut out)?;
//!     } else {
//!         record.skip()?;
//!     }
//! }
//! assert_eq!(out, b"@read1\nACGT\nACGT\n+\nIIII\nIIII\n");
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::io::{Read, Write};

use crate::bignum::BigNum;
use crate::cursor::{LineEnd, StreamCursor, DEFAULT_CAPACITY};
use crate::error::{Error, Result};

/// The part of a record the tokenizer is working through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseState {
    Header,
    Sequence,
    Spacer,
    Quality,
}

impl fmt::Display for ParseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ParseState::Header => "header",
            ParseState::Sequence => "sequence",
            ParseState::Spacer => "spacer line",
            ParseState::Quality => "quality",
        })
    }
}

/// Pull-based FASTQ reader over any byte source.
pub struct FastqReader<R> {
    cursor: StreamCursor<R>,
    id: BigNum,
    /// A header was handed out and its record has not been walked yet.
    pending: bool,
    require_marker: bool,
    /// 1-based ordinal of the current record.
    record: u64,
    /// Line on which the current record starts.
    record_line: u64,
}

impl<R: Read> FastqReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_capacity(reader, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(reader: R, capacity: usize) -> Self {
        Self {
            cursor: StreamCursor::with_capacity(reader, capacity),
            id: BigNum::new(),
            pending: false,
            require_marker: false,
            record: 0,
            record_line: 0,
        }
    }

    /// Reject records whose first byte is not `@`.
    pub fn require_header_marker(mut self, yes: bool) -> Self {
        self.require_marker = yes;
        self
    }

    /// Records started so far.
    pub fn records_read(&self) -> u64 {
        self.record
    }

    /// Parse the next header. `None` is a clean end of input; trailing
    /// whitespace after the last record counts as clean.
    ///
    /// If the previous [`Record`] was dropped without being emitted or skipped,
    /// it is skipped first.
    pub fn next_record(&mut self) -> Result<Option<Record<'_, R>>> {
        if self.pending {
            self.walk_body(None)?;
        }

        let Some(first) = self.cursor.skip_whitespace()? else {
            return Ok(None);
        };
        self.record += 1;
        self.record_line = self.cursor.line();
        if self.require_marker && first != b'@' {
            return Err(Error::MissingHeaderMarker {
                record: self.record,
                line: self.record_line,
            });
        }

        // The header is held until the caller decides what to do with it.
        self.cursor.open_span(true);
        self.cursor.advance();
        self.id.clear();
        self.cursor.read_hex_run(&mut self.id)?;
        if let LineEnd::Eof { .. } = self.cursor.skip_line()? {
            return Err(self.truncated(ParseState::Header));
        }

        self.pending = true;
        Ok(Some(Record { reader: self }))
    }

    fn truncated(&self, state: ParseState) -> Error {
        Error::InvalidFastq {
            state,
            record: self.record,
            line: self.record_line,
        }
    }

    /// Walk sequence, spacer and quality of the pending record, writing the
    /// whole record to `out` once it is complete.
    fn walk_body(&mut self, out: Option<&mut dyn Write>) -> Result<()> {
        self.pending = false;
        self.cursor.hold_span(out.is_some());

        let lines = self.walk_sequence()?;
        self.walk_spacer()?;
        self.walk_quality(lines)?;

        if let Some(out) = out {
            let (carry, tail) = self.cursor.span();
            out.write_all(carry)?;
            out.write_all(tail)?;
        }
        self.cursor.close_span();
        Ok(())
    }

    fn walk_sequence(&mut self) -> Result<u64> {
        let mut lines = 0;
        loop {
            match self.cursor.peek()? {
                None => return Err(self.truncated(ParseState::Sequence)),
                Some(b'+') => return Ok(lines),
                Some(_) => {}
            }
            match self.cursor.skip_line()? {
                LineEnd::Newline => lines += 1,
                LineEnd::Eof { .. } => return Err(self.truncated(ParseState::Sequence)),
            }
        }
    }

    fn walk_spacer(&mut self) -> Result<()> {
        match self.cursor.skip_line()? {
            LineEnd::Newline => Ok(()),
            LineEnd::Eof { .. } => Err(self.truncated(ParseState::Spacer)),
        }
    }

    fn walk_quality(&mut self, lines: u64) -> Result<()> {
        for i in 0..lines {
            match self.cursor.skip_line()? {
                LineEnd::Newline => {}
                // The very last line of the input may lack its newline.
                LineEnd::Eof { consumed } if consumed > 0 && i + 1 == lines => {}
                LineEnd::Eof { .. } => return Err(self.truncated(ParseState::Quality)),
            }
        }
        Ok(())
    }
}

/// A record whose header has been parsed. Finish it with [`Record::emit`] or
/// [`Record::skip`]; dropping it skips the record on the next read.
pub struct Record<'a, R> {
    reader: &'a mut FastqReader<R>,
}

impl<'a, R: Read> Record<'a, R> {
    /// The header identifier.
    pub fn id(&self) -> &BigNum {
        &self.reader.id
    }

    /// 1-based record ordinal.
    pub fn number(&self) -> u64 {
        self.reader.record
    }

    /// Write the record to `out` exactly as it appeared in the input.
    pub fn emit<W: Write>(self, out: &mut W) -> Result<()> {
        self.reader.walk_body(Some(out))
    }

    /// Advance past the record without writing anything.
    pub fn skip(self) -> Result<()> {
        self.reader.walk_body(None)
    }
}
