//! # fqsieve
//!
//! Extract (or drop) FASTQ records whose read identifier appears in a list of
//! filter identifiers.
//!
//! Identifiers are read as hexadecimal numbers of arbitrary length and kept
//! in a self-balancing search tree, optionally split across the buckets of a
//! multiplicative hash table. The FASTQ input is streamed through a fixed-size
//! buffer, so records and identifiers may be longer than the buffer and the
//! input may be a pipe.
//!
//! ## Example
//!
//! ```rust
//! use fqsieve::{extract, ExtractConfig, IdIndex};
//!
//! let config = ExtractConfig::default();
//! let index = IdIndex::read(&b"read1\nread3\n"[..], &config).unwrap();
//!
//! let fastq = b"@read1\nACGT\n+\nIIII\n@read2\nCCCC\n+\nJJJJ\n@read3\nGG\n+\nKK\n";
//! let mut out = Vec::new();
//! let stats = extract(&index, &fastq[..], &mut out, &config).unwrap();
//!
//! assert_eq!(out, b"@read1\nACGT\n+\nIIII\n@read3\nGG\n+\nKK\n");
//! assert_eq!(stats.emitted, 2);
//! ```

#![warn(clippy::all)]

pub mod avl;
pub mod bignum;
pub mod cursor;
pub mod error;
pub mod extract;
pub mod fastq;
pub mod hash;

pub use avl::{IdTree, NodeArena, NodeRef};
pub use bignum::BigNum;
pub use cursor::{IdListReader, StreamCursor};
pub use error::{Error, FileRole, Result};
pub use extract::{extract, extract_paths, ExtractStats, IdIndex};
pub use fastq::{FastqReader, ParseState, Record};
pub use hash::{HashMode, IdHashTable};

/// Configuration for an extraction pass.
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    /// Index the filter identifiers in a hash table of trees instead of a
    /// single tree
    pub use_hash: bool,
    /// Emit the records whose identifier is *not* in the filter list
    pub keep_complement: bool,
    /// Which limbs of an identifier feed the hash
    pub hash_mode: HashMode,
    /// Size of the streaming read buffer, in bytes
    pub buffer_capacity: usize,
    /// Reject records whose header does not start with `@`
    pub require_header_marker: bool,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            use_hash: true,
            keep_complement: false,
            hash_mode: HashMode::TrailingLimb,
            buffer_capacity: cursor::DEFAULT_CAPACITY,
            require_header_marker: false,
        }
    }
}

impl ExtractConfig {
    /// Select the hash-table index (`true`) or the single tree (`false`).
    pub fn with_hash(mut self, yes: bool) -> Self {
        self.use_hash = yes;
        self
    }

    /// Select the complement polarity.
    pub fn with_complement(mut self, yes: bool) -> Self {
        self.keep_complement = yes;
        self
    }

    /// Set the hash input.
    pub fn with_hash_mode(mut self, mode: HashMode) -> Self {
        self.hash_mode = mode;
        self
    }

    /// Set the read buffer size. Values below 1 are raised to 1.
    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity.max(1);
        self
    }

    /// Require every record header to start with `@`.
    pub fn with_header_marker(mut self, yes: bool) -> Self {
        self.require_header_marker = yes;
        self
    }
}


#[cfg(test)]
mod proptests;
