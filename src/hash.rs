//! Knuth multiplicative hash table whose buckets are AVL trees.
//!
//! The table is sized to the next power of two at or above twice the expected
//! identifier count, so most buckets hold at most one node and lookups cost one
//! multiply and one comparison. Colliding identifiers go into a per-bucket AVL
//! tree, which bounds the worst case at `O(log n)` per bucket.

use crate::avl::{Insertion, NodeArena, NodeRef};
use crate::bignum::{BigNum, LIMB_BITS};
use crate::error::{Error, Result};

/// `2^64 / phi`, the fractional digits of the golden ratio scaled to 64 bits.
pub const GOLDEN_RATIO_MAGIC: u64 = 0x9E37_79B9_7F4A_7C15;

/// Upper bound on the table's index width.
const MAX_BITS: u32 = 48;

/// Which part of an identifier feeds the hash.
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HashMode {
    /// The limb holding the last eight digits read. Read names share their
    /// run and instrument prefix and differ in the tile and coordinate
    /// fields at the end, which land here.
    #[default]
    TrailingLimb,
    /// The two trailing limbs as one 64-bit word.
    TrailingTwoLimbs,
}

impl HashMode {
    #[inline]
    fn word(self, id: &BigNum) -> u64 {
        match self {
            HashMode::TrailingLimb => u64::from(id.trailing_limb()),
            HashMode::TrailingTwoLimbs => id.trailing_two_limbs(),
        }
    }
}

/// Index width for `count` identifiers: `ceil(log2(count)) + 1`, at least 1.
pub fn table_bits(count: usize) -> u32 {
    let count = count.max(1);
    let ceil_log2 = usize::BITS - (count - 1).leading_zeros();
    (ceil_log2 + 1).min(MAX_BITS)
}

/// Top `bits` bits of `word * magic`.
#[inline]
pub fn bucket_index(word: u64, magic: u64, bits: u32) -> usize {
    debug_assert!((1..=MAX_BITS).contains(&bits));
    (word.wrapping_mul(magic) >> (u64::BITS - bits)) as usize
}

/// Hash an identifier into one of `2^bits` buckets.
#[inline]
pub fn hash(id: &BigNum, magic: u64, bits: u32, mode: HashMode) -> usize {
    bucket_index(mode.word(id), magic, bits)
}

/// A set of identifiers: hash buckets over AVL trees.
#[derive(Clone)]
pub struct IdHashTable {
    arena: NodeArena,
    /// `2^bits` bucket roots followed by one terminator slot that is never
    /// addressed.
    buckets: Vec<NodeRef>,
    bits: u32,
    magic: u64,
    mode: HashMode,
}

impl IdHashTable {
    /// An empty table sized for `expected` identifiers.
    pub fn with_capacity(expected: usize, mode: HashMode) -> Result<Self> {
        Self::with_magic(expected, mode, GOLDEN_RATIO_MAGIC)
    }

    /// Same as [`IdHashTable::with_capacity`] with a caller-chosen multiplier.
    pub fn with_magic(expected: usize, mode: HashMode, magic: u64) -> Result<Self> {
        let bits = table_bits(expected);
        let slots = (1usize << bits) + 1;

        let mut buckets = Vec::new();
        buckets
            .try_reserve_exact(slots)
            .map_err(|_| Error::OutOfMemory("hash bucket array"))?;
        buckets.resize(slots, NodeRef::NULL);

        Ok(Self {
            arena: NodeArena::with_capacity(expected)?,
            buckets,
            bits,
            magic,
            mode,
        })
    }

    /// Build from a list: count, size, then insert every identifier.
    pub fn from_ids(ids: Vec<BigNum>, mode: HashMode) -> Result<Self> {
        let mut table = Self::with_capacity(ids.len(), mode)?;
        for id in ids {
            table.insert(id)?;
        }
        Ok(table)
    }

    #[inline]
    fn bucket_of(&self, id: &BigNum) -> usize {
        hash(id, self.magic, self.bits, self.mode)
    }

    /// Insert `id`; `false` if it was already present. An empty bucket takes
    /// the node as its root directly.
    pub fn insert(&mut self, id: BigNum) -> Result<bool> {
        let b = self.bucket_of(&id);
        let node = self.arena.alloc(id)?;
        match self.arena.insert_distinct(&mut self.buckets[b], node) {
            Insertion::Inserted(_) => Ok(true),
            Insertion::Duplicate(_) => {
                self.arena.release(node);
                Ok(false)
            }
        }
    }

    pub fn lookup(&self, id: &BigNum) -> Option<NodeRef> {
        let root = self.buckets[self.bucket_of(id)];
        self.arena.search(root, id)
    }

    #[inline]
    pub fn contains(&self, id: &BigNum) -> bool {
        self.lookup(id).is_some()
    }

    pub fn get(&self, node: NodeRef) -> &BigNum {
        self.arena.id(node)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.arena.live()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Addressable buckets (`2^bits`).
    pub fn bucket_count(&self) -> usize {
        self.buckets.len() - 1
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    pub fn magic(&self) -> u64 {
        self.magic
    }

    pub fn mode(&self) -> HashMode {
        self.mode
    }

    pub fn occupied_buckets(&self) -> usize {
        self.addressable().iter().filter(|r| !r.is_null()).count()
    }

    /// Deepest bucket tree, counted in nodes (0 when the table is empty).
    pub fn max_bucket_depth(&self) -> usize {
        self.addressable()
            .iter()
            .map(|&r| (self.arena.height(r) + 1) as usize)
            .max()
            .unwrap_or(0)
    }

    fn addressable(&self) -> &[NodeRef] {
        &self.buckets[..self.bucket_count()]
    }

    /// Iterate every identifier, bucket by bucket.
    pub fn iter(&self) -> impl Iterator<Item = &BigNum> + '_ {
        self.addressable()
            .iter()
            .flat_map(move |&root| self.arena.iter(root))
    }

    /// Release every bucket tree; the bucket array keeps its size.
    pub fn clear(&mut self) {
        let mut buckets = std::mem::take(&mut self.buckets);
        for root in buckets.iter_mut() {
            self.arena.free_all(root);
        }
        self.buckets = buckets;
        self.arena.reset();
    }

    pub fn memory_usage(&self) -> usize {
        self.buckets.capacity() * std::mem::size_of::<NodeRef>() + self.arena.memory_usage()
    }

    #[cfg(test)]
    pub(crate) fn bucket_roots(&self) -> (&NodeArena, &[NodeRef]) {
        (&self.arena, self.addressable())
    }
}

impl std::fmt::Debug for IdHashTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdHashTable")
            .field("len", &self.len())
            .field("buckets", &self.bucket_count())
            .field("mode", &self.mode)
            .finish()
    }
}

const _: () = assert!(2 * LIMB_BITS == u64::BITS);

#[cfg(test)]
mod tests {
    use super::*;

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::HashSet;

    fn n(s: &str) -> BigNum {
        BigNum::from_hex(s.as_bytes()).unwrap()
    }

    fn random_ids(rng: &mut StdRng, count: usize) -> Vec<(u128, BigNum)> {
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(count);
        while out.len() < count {
            let v: u128 = rng.gen::<u128>() >> rng.gen_range(0..100u32);
            if seen.insert(v) {
                out.push((v, n(&format!("{v:x}"))));
            }
        }
        out
    }

    #[test]
    fn test_table_bits() {
        assert_eq!(table_bits(0), 1);
        assert_eq!(table_bits(1), 1);
        assert_eq!(table_bits(2), 2);
        assert_eq!(table_bits(3), 3);
        assert_eq!(table_bits(4), 3);
        assert_eq!(table_bits(5), 4);
        assert_eq!(table_bits(1000), 11);
        assert_eq!(table_bits(1024), 11);
        assert_eq!(table_bits(1025), 12);
    }

    #[test]
    fn test_sizing() {
        let t = IdHashTable::with_capacity(10_000, HashMode::TrailingLimb).unwrap();
        assert_eq!(t.bits(), 15);
        assert_eq!(t.bucket_count(), 1 << 15);
        assert!(t.bucket_count() >= 2 * 10_000);
        assert_eq!(t.magic(), GOLDEN_RATIO_MAGIC);
        assert!(t.is_empty());
        assert_eq!(t.max_bucket_depth(), 0);
    }

    #[test]
    fn test_bucket_index_is_top_bits_of_product() {
        assert_eq!(bucket_index(0, GOLDEN_RATIO_MAGIC, 8), 0);
        assert_eq!(bucket_index(1, GOLDEN_RATIO_MAGIC, 8), 0x9E);
        assert_eq!(bucket_index(1, GOLDEN_RATIO_MAGIC, 16), 0x9E37);
        assert_eq!(bucket_index(2, GOLDEN_RATIO_MAGIC, 4), 0x3);
        for bits in 1..=20 {
            for w in [0u64, 1, 0xEAD1, u64::from(u32::MAX), u64::MAX] {
                let b = bucket_index(w, GOLDEN_RATIO_MAGIC, bits);
                assert!(b < (1 << bits));
                assert_eq!(b, bucket_index(w, GOLDEN_RATIO_MAGIC, bits));
            }
        }
    }

    #[test]
    fn test_modes_read_different_limbs() {
        let a = n("0000000112345678");
        let b = n("0000000212345678");
        let ha = |mode| hash(&a, GOLDEN_RATIO_MAGIC, 20, mode);
        let hb = |mode| hash(&b, GOLDEN_RATIO_MAGIC, 20, mode);
        assert_eq!(ha(HashMode::TrailingLimb), hb(HashMode::TrailingLimb));
        assert_ne!(ha(HashMode::TrailingTwoLimbs), hb(HashMode::TrailingTwoLimbs));
    }

    #[test]
    fn test_basic_and_duplicates() {
        let mut t = IdHashTable::with_capacity(3, HashMode::TrailingLimb).unwrap();
        assert!(t.insert(n("read1")).unwrap());
        assert!(t.insert(n("read3")).unwrap());
        assert!(!t.insert(n("0EAD1")).unwrap());
        assert_eq!(t.len(), 2);
        assert!(t.contains(&n("read1")));
        assert!(t.contains(&n("read3")));
        assert!(!t.contains(&n("read2")));
        let node = t.lookup(&n("ead3")).unwrap();
        assert_eq!(t.get(node).to_string(), "EAD3");
    }

    #[test]
    fn test_no_false_negatives_or_positives() {
        for mode in [HashMode::TrailingLimb, HashMode::TrailingTwoLimbs] {
            let mut rng = StdRng::seed_from_u64(11);
            let ids = random_ids(&mut rng, 20_000);
            let (inserted, probes) = ids.split_at(10_000);

            let t = IdHashTable::from_ids(inserted.iter().map(|(_, id)| id.clone()).collect(), mode)
                .unwrap();
            assert_eq!(t.len(), 10_000);
            for (_, id) in inserted {
                assert!(t.contains(id), "{id:?} missing");
            }
            for (_, id) in probes {
                assert!(!t.contains(id), "{id:?} found but never inserted");
            }
            assert_eq!(t.iter().count(), 10_000);
        }
    }

    #[test]
    fn test_all_collisions_fall_back_to_tree() {
        let mut rng = StdRng::seed_from_u64(5);
        let ids = random_ids(&mut rng, 2_000);
        let mut t = IdHashTable::with_magic(ids.len(), HashMode::TrailingLimb, 0).unwrap();
        for (_, id) in &ids {
            assert!(t.insert(id.clone()).unwrap());
        }
        assert_eq!(t.occupied_buckets(), 1);
        // One AVL tree of 2000 nodes: height at most 1.44 * log2(2000).
        assert!(t.max_bucket_depth() <= 16, "{}", t.max_bucket_depth());
        for (_, id) in &ids {
            assert!(t.contains(id));
        }
        let mut sorted: Vec<u128> = ids.iter().map(|(v, _)| *v).collect();
        sorted.sort_unstable();
        let got: Vec<String> = t.iter().map(|id| id.to_string()).collect();
        let expected: Vec<String> = sorted.iter().map(|v| format!("{v:X}")).collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn test_sparse_buckets() {
        let mut rng = StdRng::seed_from_u64(9);
        let ids = random_ids(&mut rng, 4096);
        let t = IdHashTable::from_ids(ids.into_iter().map(|(_, id)| id).collect(), HashMode::TrailingTwoLimbs)
            .unwrap();
        assert_eq!(t.bucket_count(), 8192);
        assert!(t.occupied_buckets() > 2048);
        assert!(t.max_bucket_depth() <= 6);
    }

    #[test]
    fn test_read_names_spread_over_buckets() {
        // Instrument, run, flowcell, lane and tile are shared; only the
        // x:y coordinates vary.
        let mut rng = StdRng::seed_from_u64(3);
        let mut seen = HashSet::new();
        let mut names = Vec::new();
        while names.len() < 10_000 {
            let (x, y) = (rng.gen_range(1000..10_000u32), rng.gen_range(1000..10_000u32));
            if seen.insert((x, y)) {
                names.push(format!("M00123:45:000000000-A1B2C:1:1101:{x}:{y}"));
            }
        }

        for mode in [HashMode::TrailingLimb, HashMode::TrailingTwoLimbs] {
            let t = IdHashTable::from_ids(names.iter().map(|s| n(s)).collect(), mode).unwrap();
            assert_eq!(t.len(), 10_000);
            assert_eq!(t.bucket_count(), 1 << 15);
            assert!(
                t.occupied_buckets() > 4_000,
                "{mode:?}: {} buckets used",
                t.occupied_buckets()
            );
            assert!(t.max_bucket_depth() <= 8, "{mode:?}: depth {}", t.max_bucket_depth());
            for s in &names {
                assert!(t.contains(&n(s)));
            }
        }
    }

    #[test]
    fn test_clear() {
        let mut t = IdHashTable::from_ids(
            (1..=100u64).map(|v| n(&format!("{v:x}"))).collect(),
            HashMode::TrailingLimb,
        )
        .unwrap();
        let buckets = t.bucket_count();
        t.clear();
        assert!(t.is_empty());
        assert_eq!(t.occupied_buckets(), 0);
        assert_eq!(t.bucket_count(), buckets);
        assert!(!t.contains(&n("1")));
        assert!(t.insert(n("1")).unwrap());
        assert!(t.contains(&n("1")));
    }
}
