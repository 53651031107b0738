use super::*;

use proptest::prelude::*;
use std::collections::BTreeSet;

use crate::avl::Insertion;
use crate::cursor::IdListReader;

/// Walk the tree and check order, stored heights, balance and node count.
fn validate_tree(arena: &NodeArena, root: NodeRef) -> usize {
    // (node, lower bound, upper bound), bounds exclusive.
    let mut stack: Vec<(NodeRef, Option<&BigNum>, Option<&BigNum>)> = Vec::new();
    if !root.is_null() {
        stack.push((root, None, None));
    }

    let mut count = 0usize;
    while let Some((node, lo, hi)) = stack.pop() {
        count += 1;
        let id = arena.id(node);
        if let Some(lo) = lo {
            assert!(lo < id, "left subtree holds {id} >= {lo}");
        }
        if let Some(hi) = hi {
            assert!(id < hi, "right subtree holds {id} <= {hi}");
        }

        let left = arena.left(node);
        let right = arena.right(node);
        let (hl, hr) = (arena.height(left), arena.height(right));
        assert_eq!(
            arena.height(node),
            1 + hl.max(hr),
            "stored height must match children"
        );
        assert!((hl - hr).abs() <= 1, "node {id} is out of balance");

        if !left.is_null() {
            stack.push((left, lo, Some(id)));
        }
        if !right.is_null() {
            stack.push((right, Some(id), hi));
        }
    }
    count
}

fn hex_strategy() -> impl Strategy<Value = String> + Clone {
    // Leading zeros and mixed case are part of the input space.
    "[0-9a-fA-F]{0,40}"
}

/// Reference value for a hex string: digits without leading zeros, uppercased.
fn canonical(s: &str) -> String {
    let trimmed = s.trim_start_matches('0').to_ascii_uppercase();
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed
    }
}

fn reference_cmp(a: &str, b: &str) -> std::cmp::Ordering {
    let (a, b) = (canonical(a), canonical(b));
    a.len().cmp(&b.len()).then_with(|| a.cmp(&b))
}

fn big(s: &str) -> BigNum {
    BigNum::from_hex(s.as_bytes()).unwrap()
}

#[derive(Clone, Debug)]
enum Op {
    Insert(u64),
    Contains(u64),
    Clear,
}

fn ops_strategy() -> impl Strategy<Value = Vec<Op>> {
    // Small key space so duplicates and hits are common.
    let key = 0u64..512;
    let op = prop_oneof![
        60 => key.clone().prop_map(Op::Insert),
        39 => key.prop_map(Op::Contains),
        1 => Just(Op::Clear),
    ];
    prop::collection::vec(op, 0..=1500)
}

fn wide(k: u64) -> BigNum {
    // Spread small keys over several limbs.
    big(&format!("{:x}{:016x}", k, k.wrapping_mul(0x9E37_79B9)))
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        max_shrink_iters: 50_000,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_compare_is_numeric(a in hex_strategy(), b in hex_strategy()) {
        let (x, y) = (big(&a), big(&b));
        prop_assert_eq!(x.cmp(&y), reference_cmp(&a, &b));
        prop_assert_eq!(y.cmp(&x), reference_cmp(&b, &a));
        prop_assert_eq!(x == y, canonical(&a) == canonical(&b));
        prop_assert_eq!(x.to_string(), canonical(&a));
    }

    #[test]
    fn prop_tree_equivalence(ops in ops_strategy()) {
        let mut t = IdTree::new();
        let mut m: BTreeSet<u64> = BTreeSet::new();

        for op in ops {
            match op {
                Op::Insert(k) => {
                    prop_assert_eq!(t.insert(wide(k)).unwrap(), m.insert(k));
                }
                Op::Contains(k) => {
                    prop_assert_eq!(t.contains(&wide(k)), m.contains(&k));
                }
                Op::Clear => {
                    t.clear();
                    m.clear();
                }
            }
            prop_assert_eq!(t.len(), m.len());
        }

        prop_assert_eq!(validate_tree(t.arena(), t.root()), m.len());
        let mut expected: Vec<BigNum> = m.iter().map(|&k| wide(k)).collect();
        expected.sort();
        let got: Vec<BigNum> = t.iter().cloned().collect();
        prop_assert_eq!(got, expected);
    }

    #[test]
    fn prop_hash_membership(
        mode in any::<HashMode>(),
        members in prop::collection::vec(hex_strategy(), 0..300),
        probes in prop::collection::vec(hex_strategy(), 0..300),
    ) {
        let table = IdHashTable::from_ids(members.iter().map(|s| big(s)).collect(), mode).unwrap();
        let reference: BTreeSet<String> = members.iter().map(|s| canonical(s)).collect();

        prop_assert_eq!(table.len(), reference.len());
        for s in members.iter().chain(&probes) {
            prop_assert_eq!(table.contains(&big(s)), reference.contains(&canonical(s)));
        }
    }

    #[test]
    fn prop_id_list_independent_of_capacity(
        lines in prop::collection::vec("[ \t]{0,2}[0-9a-fg-z]{0,24}[ \t]{0,2}", 0..60),
        capacity in 1usize..48,
    ) {
        let text = lines.join("\n");
        let read = |cap: usize| -> Vec<BigNum> {
            IdListReader::with_capacity(text.as_bytes(), cap)
                .collect::<Result<Vec<_>>>()
                .unwrap()
        };
        prop_assert_eq!(read(capacity), read(cursor::DEFAULT_CAPACITY));
    }
}

/// Calls `f` once per ordering of `items` (Heap's algorithm, no recursion).
fn for_each_permutation<T: Clone>(items: &[T], mut f: impl FnMut(Vec<T>)) {
    let mut order = items.to_vec();
    let mut counters = vec![0usize; order.len()];
    f(order.clone());

    let mut i = 1;
    while i < order.len() {
        if counters[i] < i {
            let j = if i % 2 == 0 { 0 } else { counters[i] };
            order.swap(j, i);
            f(order.clone());
            counters[i] += 1;
            i = 1;
        } else {
            counters[i] = 0;
            i += 1;
        }
    }
}

#[test]
fn permutations_visit_every_order_once() {
    let mut seen = BTreeSet::new();
    let mut calls = 0;
    for_each_permutation(&[1u8, 2, 3, 4, 5], |perm| {
        calls += 1;
        seen.insert(perm);
    });
    assert_eq!(calls, 120);
    assert_eq!(seen.len(), 120);

    let mut empty_calls = 0;
    let none: [u8; 0] = [];
    for_each_permutation(&none, |perm| {
        assert!(perm.is_empty());
        empty_calls += 1;
    });
    assert_eq!(empty_calls, 1);
}

#[test]
fn exhaustive_insert_order_small_set() {
    let ids: Vec<&str> = vec!["1", "2", "3", "10", "ff", "100", "0ff"];

    for_each_permutation(&ids, |perm| {
        let mut t = IdTree::new();
        let mut seen: Vec<String> = Vec::new();

        for s in perm {
            let fresh = !seen.contains(&canonical(s));
            assert_eq!(t.insert(big(s)).unwrap(), fresh);
            if fresh {
                seen.push(canonical(s));
            }
            validate_tree(t.arena(), t.root());
        }

        // "ff" and "0ff" are the same identifier.
        assert_eq!(t.len(), 6);
        let got: Vec<String> = t.iter().map(|id| id.to_string()).collect();
        assert_eq!(got, ["1", "2", "3", "10", "FF", "100"]);
    });
}

#[test]
fn exhaustive_distinct_insert_keeps_first() {
    let ids: Vec<&str> = vec!["a", "b", "c", "a", "0b"];

    for_each_permutation(&ids, |perm| {
        let mut t = IdTree::new();
        let mut first: Vec<(String, NodeRef)> = Vec::new();

        for s in perm {
            let node = t.make_node(big(s)).unwrap();
            match t.insert_distinct(node) {
                Insertion::Inserted(r) => {
                    assert_eq!(r, node);
                    first.push((canonical(s), r));
                }
                Insertion::Duplicate(existing) => {
                    let (_, r) = first.iter().find(|(c, _)| *c == canonical(s)).unwrap();
                    assert_eq!(existing, *r);
                    t.discard(node);
                }
            }
        }

        assert_eq!(validate_tree(t.arena(), t.root()), 3);
        assert_eq!(t.len(), 3);
    });
}
