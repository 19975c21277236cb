// This software is licensed under a dual license model:
//
// GNU Affero General Public License v3 (AGPLv3): You may use, modify, and
// distribute this software under the terms of the AGPLv3.
//
// Elastic License v2 (ELv2): You may also use, modify, and distribute this
// software under the Elastic License v2, which has specific restrictions.
//
// We welcome any commercial collaboration or support. For inquiries
// regarding the licenses, please contact us at:
// vectorchord-inquiry@tensorchord.ai
//
// Copyright (c) 2025 TensorChord Inc.

use crate::ProxyComparable;

/// Rank of every pivot by closeness to the object, cut at `prefix`.
///
/// `positions[i]` is the rank of pivot `i`; every pivot ranked at or beyond
/// the prefix shares the rank `prefix`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Permutation {
    prefix: u16,
    positions: Box<[u16]>,
}

impl Permutation {
    /// Ranks pivots by ascending distance, ties by pivot index.
    pub fn from_distances<D: Ord>(distances: &[D], prefix: u16) -> Self {
        assert!(distances.len() <= u16::MAX as usize, "too many pivots");
        let prefix = prefix.min(distances.len() as u16);
        let mut order = (0..distances.len()).collect::<Vec<_>>();
        order.sort_by(|&a, &b| distances[a].cmp(&distances[b]));
        let mut positions = vec![prefix; distances.len()];
        for (rank, &pivot) in order.iter().take(prefix as usize).enumerate() {
            positions[pivot] = rank as u16;
        }
        Self {
            prefix,
            positions: positions.into(),
        }
    }

    /// Checks that every rank below the prefix is taken exactly once.
    pub fn from_parts(prefix: u16, positions: Vec<u16>) -> Option<Self> {
        if prefix as usize > positions.len() {
            return None;
        }
        let mut seen = vec![false; prefix as usize];
        for &position in positions.iter() {
            if position > prefix {
                return None;
            }
            if position < prefix {
                if seen[position as usize] {
                    return None;
                }
                seen[position as usize] = true;
            }
        }
        if seen.iter().any(|&x| !x) {
            return None;
        }
        Some(Self {
            prefix,
            positions: positions.into(),
        })
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn prefix(&self) -> u16 {
        self.prefix
    }

    pub fn positions(&self) -> &[u16] {
        &self.positions
    }

    /// Pivots of the prefix, closest first.
    pub fn order(&self) -> Vec<u16> {
        let mut order = vec![0u16; self.prefix as usize];
        for (pivot, &position) in self.positions.iter().enumerate() {
            if position < self.prefix {
                order[position as usize] = pivot as u16;
            }
        }
        order
    }

    /// The same ranking cut at `level` (no finer than the current prefix).
    pub fn coarsen(&self, level: u16) -> Self {
        let prefix = level.min(self.prefix);
        Self {
            prefix,
            positions: self.positions.iter().map(|&x| x.min(prefix)).collect(),
        }
    }
}

impl ProxyComparable for Permutation {
    /// Spearman footrule with location parameter `prefix`.
    ///
    /// Each term is at most `prefix <= u16::MAX` and there are at most
    /// `u16::MAX` terms, so the sum fits in `u32`.
    fn proxy_distance(&self, other: &Self) -> u32 {
        assert_eq!(self.len(), other.len(), "mismatched projections");
        assert_eq!(self.prefix, other.prefix, "mismatched projections");
        let mut sum = 0u32;
        for (&a, &b) in self.positions.iter().zip(other.positions.iter()) {
            sum += a.abs_diff(b) as u32;
        }
        sum
    }
}

#[test]
fn test_ranks() {
    let x = Permutation::from_distances(&[30u32, 10, 20, 10], 4);
    assert_eq!(x.positions(), &[3, 0, 2, 1]);
    assert_eq!(x.order(), vec![1, 3, 2, 0]);
    let x = Permutation::from_distances(&[30u32, 10, 20, 10], 2);
    assert_eq!(x.positions(), &[2, 0, 2, 1]);
    assert_eq!(x.order(), vec![1, 3]);
    let x = Permutation::from_distances(&[5u32], 9);
    assert_eq!(x.prefix(), 1);
    assert_eq!(x.positions(), &[0]);
}

#[test]
fn test_footrule() {
    let a = Permutation::from_distances(&[1u32, 2, 3], 3);
    let b = Permutation::from_distances(&[3u32, 2, 1], 3);
    assert_eq!(a.proxy_distance(&a), 0);
    assert_eq!(a.proxy_distance(&b), 4);
    assert_eq!(b.proxy_distance(&a), 4);
    let c = Permutation::from_distances(&[2u32, 1, 3], 3);
    assert_eq!(a.proxy_distance(&c), 2);
    // agreeing prefixes are the same projection
    let d = Permutation::from_distances(&[1u32, 2, 9, 8], 2);
    let e = Permutation::from_distances(&[1u32, 2, 8, 9], 2);
    assert_eq!(d, e);
    assert_eq!(d.proxy_distance(&e), 0);
}

#[test]
fn test_footrule_bound() {
    for _ in 0..200 {
        let n = rand::random_range(1..200usize);
        let prefix = rand::random_range(1..=n as u16);
        let a = (0..n).map(|_| rand::random::<u32>()).collect::<Vec<_>>();
        let b = (0..n).map(|_| rand::random::<u32>()).collect::<Vec<_>>();
        let a = Permutation::from_distances(&a, prefix);
        let b = Permutation::from_distances(&b, prefix);
        let d = a.proxy_distance(&b);
        assert_eq!(d, b.proxy_distance(&a));
        assert!(d <= n as u32 * prefix as u32);
        assert_eq!(d == 0, a == b);
    }
}

#[test]
fn test_coarsen() {
    let x = Permutation::from_distances(&[4u32, 3, 2, 1], 4);
    let y = x.coarsen(2);
    assert_eq!(y.prefix(), 2);
    assert_eq!(y.positions(), &[2, 2, 1, 0]);
    assert_eq!(y.order(), vec![3, 2]);
    assert_eq!(x.coarsen(9), x);
    let flat = x.coarsen(0);
    assert_eq!(flat.positions(), &[0, 0, 0, 0]);
    assert_eq!(flat, Permutation::from_distances(&[1u32, 2, 3, 4], 1).coarsen(0));
}

#[test]
fn test_from_parts() {
    assert!(Permutation::from_parts(2, vec![2, 0, 1]).is_some());
    assert!(Permutation::from_parts(2, vec![0, 0, 1]).is_none());
    assert!(Permutation::from_parts(2, vec![2, 2, 1]).is_none());
    assert!(Permutation::from_parts(2, vec![3, 0, 1]).is_none());
    assert!(Permutation::from_parts(0, vec![0, 0]).is_some());
}
