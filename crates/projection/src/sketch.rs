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

/// A bit string with one generalized-hyperplane bit per pivot pair.
///
/// Bit `i` lives in `words[i / 64]` at position `i % 64`; bits at or beyond
/// `bits` are always zero.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Sketch {
    bits: u16,
    words: Box<[u64]>,
}

impl Sketch {
    /// Bit `i` is set when the object is strictly closer to pivot `2i` than
    /// to pivot `2i + 1`.
    pub fn from_pairs<D: Ord>(distances: &[D]) -> Self {
        assert!(distances.len() % 2 == 0, "sketch needs pivot pairs");
        assert!(distances.len() / 2 <= u16::MAX as usize, "too many pivots");
        let bits = (distances.len() / 2) as u16;
        let mut words = vec![0u64; (bits as usize).div_ceil(64)];
        for (i, pair) in distances.chunks_exact(2).enumerate() {
            if pair[0] < pair[1] {
                words[i / 64] |= 1 << (i % 64);
            }
        }
        Self {
            bits,
            words: words.into(),
        }
    }

    pub fn from_parts(bits: u16, words: Vec<u64>) -> Option<Self> {
        if words.len() != (bits as usize).div_ceil(64) {
            return None;
        }
        if let Some(&last) = words.last()
            && bits % 64 != 0
            && last >> (bits % 64) != 0
        {
            return None;
        }
        Some(Self {
            bits,
            words: words.into(),
        })
    }

    pub fn bits(&self) -> u16 {
        self.bits
    }

    pub fn words(&self) -> &[u64] {
        &self.words
    }

    pub fn get(&self, i: u16) -> bool {
        assert!(i < self.bits);
        self.words[i as usize / 64] >> (i % 64) & 1 != 0
    }

    /// The first `level` bits (no more than the current width).
    pub fn truncate(&self, level: u16) -> Self {
        let bits = level.min(self.bits);
        let mut words = self.words[..(bits as usize).div_ceil(64)].to_vec();
        if bits % 64 != 0
            && let Some(last) = words.last_mut()
        {
            *last &= (1u64 << (bits % 64)) - 1;
        }
        Self {
            bits,
            words: words.into(),
        }
    }
}

impl ProxyComparable for Sketch {
    /// Hamming distance.
    fn proxy_distance(&self, other: &Self) -> u32 {
        assert_eq!(self.bits, other.bits, "mismatched projections");
        let mut sum = 0u32;
        for (&a, &b) in self.words.iter().zip(other.words.iter()) {
            sum += (a ^ b).count_ones();
        }
        sum
    }
}

#[test]
fn test_pairs() {
    let x = Sketch::from_pairs(&[1u32, 2, 2, 1, 5, 5, 0, 9]);
    assert_eq!(x.bits(), 4);
    assert_eq!(x.words(), &[0b1001]);
    assert!(x.get(0));
    assert!(!x.get(1));
    assert!(!x.get(2));
    assert!(x.get(3));
    let wide = Sketch::from_pairs(&(0..260u32).map(|i| i % 3).collect::<Vec<_>>());
    assert_eq!(wide.bits(), 130);
    assert_eq!(wide.words().len(), 3);
    assert_eq!(wide.words()[2] >> 2, 0);
}

#[test]
fn test_hamming() {
    for _ in 0..200 {
        let n = rand::random_range(1..300usize);
        let a = (0..2 * n).map(|_| rand::random_range(0..4u8)).collect::<Vec<_>>();
        let b = (0..2 * n).map(|_| rand::random_range(0..4u8)).collect::<Vec<_>>();
        let a = Sketch::from_pairs(&a);
        let b = Sketch::from_pairs(&b);
        let d = a.proxy_distance(&b);
        let naive = (0..n as u16).filter(|&i| a.get(i) != b.get(i)).count() as u32;
        assert_eq!(d, naive);
        assert_eq!(a.proxy_distance(&a), 0);
        assert_eq!(d == 0, a == b);
    }
}

#[test]
fn test_truncate() {
    let x = Sketch::from_pairs(&(0..200u32).map(|i| (i * 7) % 5).collect::<Vec<_>>());
    for level in [0u16, 1, 63, 64, 65, 100, 500] {
        let y = x.truncate(level);
        assert_eq!(y.bits(), level.min(100));
        for i in 0..y.bits() {
            assert_eq!(y.get(i), x.get(i));
        }
        assert!(Sketch::from_parts(y.bits(), y.words().to_vec()).is_some());
    }
    assert_eq!(x.truncate(0).words().len(), 0);
}

#[test]
fn test_from_parts() {
    assert!(Sketch::from_parts(3, vec![0b111]).is_some());
    assert!(Sketch::from_parts(3, vec![0b1000]).is_none());
    assert!(Sketch::from_parts(64, vec![u64::MAX]).is_some());
    assert!(Sketch::from_parts(65, vec![u64::MAX]).is_none());
    assert!(Sketch::from_parts(0, vec![]).is_some());
}
