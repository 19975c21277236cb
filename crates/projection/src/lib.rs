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

mod permutation;
mod projector;
mod sketch;

pub use permutation::Permutation;
pub use projector::{Policy, PolicyError, Projector};
pub use sketch::Sketch;

use bitset::{BitsetError, Encodable};
use zerocopy::IntoBytes;
use zerocopy::byteorder::little_endian::U16;

/// A cheap stand-in for the real distance, computed from projections only.
pub trait ProxyComparable {
    /// Zero exactly when both sides are identical.
    fn proxy_distance(&self, other: &Self) -> u32;
}

/// What an object looks like from the pivots.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Projection {
    Permutation(Permutation),
    Sketch(Sketch),
}

impl Projection {
    /// Number of values, one per pivot or per sketch bit.
    pub fn len(&self) -> usize {
        match self {
            Projection::Permutation(x) => x.len(),
            Projection::Sketch(x) => x.bits() as usize,
        }
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// A coarser projection shared by every object that agrees up to `level`.
    pub fn coarsen(&self, level: u16) -> Projection {
        match self {
            Projection::Permutation(x) => Projection::Permutation(x.coarsen(level)),
            Projection::Sketch(x) => Projection::Sketch(x.truncate(level)),
        }
    }
}

impl ProxyComparable for Projection {
    fn proxy_distance(&self, other: &Self) -> u32 {
        match (self, other) {
            (Projection::Permutation(a), Projection::Permutation(b)) => a.proxy_distance(b),
            (Projection::Sketch(a), Projection::Sketch(b)) => a.proxy_distance(b),
            _ => panic!("mismatched projections"),
        }
    }
}

const TAG_PERMUTATION: u8 = 0;
const TAG_SKETCH: u8 = 1;

// [tag: u8][len: u16][param: u16][payload], little endian
impl Encodable for Projection {
    type Context = ();

    fn encode(&self, out: &mut Vec<u8>) -> Result<(), BitsetError> {
        match self {
            Projection::Permutation(x) => {
                out.push(TAG_PERMUTATION);
                out.extend_from_slice(U16::new(x.len() as u16).as_bytes());
                out.extend_from_slice(U16::new(x.prefix()).as_bytes());
                for &position in x.positions() {
                    out.extend_from_slice(U16::new(position).as_bytes());
                }
            }
            Projection::Sketch(x) => {
                out.push(TAG_SKETCH);
                out.extend_from_slice(U16::new(x.words().len() as u16).as_bytes());
                out.extend_from_slice(U16::new(x.bits()).as_bytes());
                for &word in x.words() {
                    out.extend_from_slice(&word.to_le_bytes());
                }
            }
        }
        Ok(())
    }

    fn decode((): (), bytes: &[u8]) -> Result<Self, BitsetError> {
        let corrupted = || BitsetError::Corrupted("malformed projection");
        let (&tag, rest) = bytes.split_first().ok_or_else(corrupted)?;
        let (len, rest) = rest.split_at_checked(2).ok_or_else(corrupted)?;
        let (param, payload) = rest.split_at_checked(2).ok_or_else(corrupted)?;
        let len = u16::from_le_bytes([len[0], len[1]]) as usize;
        let param = u16::from_le_bytes([param[0], param[1]]);
        match tag {
            TAG_PERMUTATION => {
                if payload.len() != len * 2 {
                    return Err(corrupted());
                }
                let positions = payload
                    .chunks_exact(2)
                    .map(|x| u16::from_le_bytes([x[0], x[1]]))
                    .collect();
                Permutation::from_parts(param, positions)
                    .map(Projection::Permutation)
                    .ok_or_else(corrupted)
            }
            TAG_SKETCH => {
                if payload.len() != len * 8 {
                    return Err(corrupted());
                }
                let words = payload
                    .chunks_exact(8)
                    .map(|x| u64::from_le_bytes(x.try_into().expect("chunk of eight")))
                    .collect();
                Sketch::from_parts(param, words)
                    .map(Projection::Sketch)
                    .ok_or_else(corrupted)
            }
            _ => Err(corrupted()),
        }
    }
}

#[test]
fn test_projection_bytes() {
    let permutation = Projection::Permutation(Permutation::from_distances(&[9u32, 1, 5], 2));
    let bytes = permutation.to_bytes().unwrap();
    assert_eq!(bytes, vec![0, 3, 0, 2, 0, 2, 0, 0, 0, 1, 0]);
    assert_eq!(Projection::decode((), &bytes).unwrap(), permutation);

    let sketch = Projection::Sketch(Sketch::from_pairs(&[1u32, 2, 2, 1, 3, 3]));
    let bytes = sketch.to_bytes().unwrap();
    assert_eq!(bytes, vec![1, 1, 0, 3, 0, 1, 0, 0, 0, 0, 0, 0, 0]);
    assert_eq!(Projection::decode((), &bytes).unwrap(), sketch);

    assert!(Projection::decode((), &[]).is_err());
    assert!(Projection::decode((), &[0, 3, 0, 2, 0, 2, 0]).is_err());
    assert!(Projection::decode((), &[7, 0, 0, 0, 0]).is_err());
    // a position beyond the prefix
    assert!(Projection::decode((), &[0, 1, 0, 2, 0, 3, 0]).is_err());
    // a bit beyond the width
    assert!(Projection::decode((), &[1, 1, 0, 1, 0, 2, 0, 0, 0, 0, 0, 0, 0]).is_err());
}

#[test]
#[should_panic(expected = "mismatched projections")]
fn test_mismatched_kinds() {
    let a = Projection::Permutation(Permutation::from_distances(&[1u32, 2], 2));
    let b = Projection::Sketch(Sketch::from_pairs(&[1u32, 2]));
    a.proxy_distance(&b);
}
