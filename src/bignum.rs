//! Read identifiers as arbitrary-precision unsigned integers.
//!
//! Identifiers are decoded one hexadecimal digit at a time straight out of the
//! input buffer. Bytes outside the hex alphabet that are still printable are
//! skipped, so `read1` and `EAD1` name the same read.
//!
//! Limbs always hold the numeric value, least significant limb first, so
//! leading zeros never change an identifier. The price is that each appended
//! digit shifts every limb by one nibble: decoding an `L`-digit identifier
//! costs `O(L^2 / 8)` limb operations. Read names are a few dozen digits, where
//! this stays well below the cost of scanning the record.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{Error, Result};

/// One limb of a [`BigNum`].
pub type Limb = u32;

/// Width of a [`Limb`] in bits.
pub const LIMB_BITS: u32 = Limb::BITS;

const TOP_NIBBLE_SHIFT: u32 = LIMB_BITS - 4;

// =============================================================================
// Digit decoding
// =============================================================================

/// Classification of one input byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HexDigit {
    /// `0-9`, `A-F` or `a-f`, with its nibble value.
    Value(u8),
    /// Printable but outside the hex alphabet; ignored.
    Skip,
    /// Whitespace, control bytes and NUL (`<= 0x20`); ends the identifier.
    Terminator,
}

const TERMINATOR: u8 = 0xFF;
const SKIP: u8 = 0xFE;

const HEX_TABLE: [u8; 256] = build_hex_table();

const fn build_hex_table() -> [u8; 256] {
    let mut table = [SKIP; 256];
    let mut b = 0usize;
    while b <= 0x20 {
        table[b] = TERMINATOR;
        b += 1;
    }
    let mut d = 0u8;
    while d < 10 {
        table[(b'0' + d) as usize] = d;
        d += 1;
    }
    let mut d = 0u8;
    while d < 6 {
        table[(b'A' + d) as usize] = 10 + d;
        table[(b'a' + d) as usize] = 10 + d;
        d += 1;
    }
    table
}

/// Decode a single byte.
#[inline]
pub fn decode_digit(byte: u8) -> HexDigit {
    match HEX_TABLE[byte as usize] {
        TERMINATOR => HexDigit::Terminator,
        SKIP => HexDigit::Skip,
        value => HexDigit::Value(value),
    }
}

// =============================================================================
// BigNum
// =============================================================================

/// Unsigned integer of arbitrary size, little-limb-first.
///
/// The limb vector never carries zero limbs at the top, so two numbers are
/// equal exactly when their limb vectors are equal. `00F` and `F` are the same
/// identifier. The digit count is kept for diagnostics only and does not take
/// part in comparison.
#[derive(Clone, Default)]
pub struct BigNum {
    limbs: Vec<Limb>,
    digits: usize,
}

impl BigNum {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `text` up to its first terminator byte.
    pub fn from_hex(text: &[u8]) -> Result<Self> {
        let mut n = Self::new();
        for &byte in text {
            match decode_digit(byte) {
                HexDigit::Value(v) => n.push_digit(v)?,
                HexDigit::Skip => {}
                HexDigit::Terminator => break,
            }
        }
        Ok(n)
    }

    /// Append one hex digit: `self = self * 16 + value`.
    pub fn push_digit(&mut self, value: u8) -> Result<()> {
        debug_assert!(value < 16);
        self.digits += 1;

        let Some(&top) = self.limbs.last() else {
            if value != 0 {
                self.grow()?;
                self.limbs.push(Limb::from(value));
            }
            return Ok(());
        };

        if top >> TOP_NIBBLE_SHIFT != 0 {
            self.grow()?;
        }

        let mut carry = Limb::from(value);
        for limb in &mut self.limbs {
            let out = *limb >> TOP_NIBBLE_SHIFT;
            *limb = (*limb << 4) | carry;
            carry = out;
        }
        if carry != 0 {
            self.limbs.push(carry);
        }
        Ok(())
    }

    fn grow(&mut self) -> Result<()> {
        self.limbs
            .try_reserve(1)
            .map_err(|_| Error::OutOfMemory("identifier"))
    }

    /// Reset to zero, keeping the allocation.
    pub fn clear(&mut self) {
        self.limbs.clear();
        self.digits = 0;
    }

    /// Number of limbs in use.
    #[inline]
    pub fn used(&self) -> usize {
        self.limbs.len()
    }

    #[inline]
    pub fn limbs(&self) -> &[Limb] {
        &self.limbs
    }

    /// Accepted hex digits, leading zeros included.
    #[inline]
    pub fn digits(&self) -> usize {
        self.digits
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.limbs.is_empty()
    }

    /// The limb holding the most recently read digits, or 0.
    #[inline]
    pub fn trailing_limb(&self) -> Limb {
        self.limbs.first().copied().unwrap_or(0)
    }

    /// The two limbs holding the most recently read digits, packed high-to-low
    /// into one word.
    #[inline]
    pub fn trailing_two_limbs(&self) -> u64 {
        match *self.limbs.as_slice() {
            [] => 0,
            [low] => u64::from(low),
            [low, high, ..] => (u64::from(high) << LIMB_BITS) | u64::from(low),
        }
    }

    pub fn memory_usage(&self) -> usize {
        self.limbs.capacity() * std::mem::size_of::<Limb>()
    }
}

impl PartialEq for BigNum {
    fn eq(&self, other: &Self) -> bool {
        self.limbs == other.limbs
    }
}

impl Eq for BigNum {}

impl Hash for BigNum {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.limbs.hash(state);
    }
}

impl Ord for BigNum {
    fn cmp(&self, other: &Self) -> Ordering {
        self.limbs
            .len()
            .cmp(&other.limbs.len())
            .then_with(|| self.limbs.iter().rev().cmp(other.limbs.iter().rev()))
    }
}

impl PartialOrd for BigNum {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for BigNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some((top, rest)) = self.limbs.split_last() else {
            return f.write_str("0");
        };
        write!(f, "{top:X}")?;
        for limb in rest.iter().rev() {
            write!(f, "{limb:08X}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for BigNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BigNum(0x{self})")
    }
}
