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

use crate::bits::{BitReader, BitWriter};
use crate::{BitsetError, Encodable, GapCode, ObjectId};
use distance::Scalar;
use std::num::NonZero;
use topk::BoundedTopK;
use zerocopy::byteorder::little_endian::{I64, U32};
use zerocopy::{FromBytes, IntoBytes};

const HEADER: usize = size_of::<I64>();
const TRAILER: usize = size_of::<U32>();

#[derive(Debug, Clone)]
enum State {
    Building(Vec<ObjectId>),
    Committed(Committed),
}

#[derive(Debug, Clone)]
struct Committed {
    first: ObjectId,
    len: u32,
    stream: Box<[u8]>,
}

/// A set of identifiers, append-only until [`commit`](Self::commit) and
/// read-only afterwards.
///
/// Adding the same identifier twice is a caller error. It is not rejected;
/// the duplicate is encoded as a zero gap and decoded back as is.
///
/// Byte image: `[first: i64 LE][gap bit stream, zero-padded][len: u32 LE]`.
/// An empty set stores `first = 0` and no stream.
#[derive(Debug, Clone)]
pub struct CompressedBucketSet {
    code: GapCode,
    state: State,
}

impl CompressedBucketSet {
    pub fn new(code: GapCode) -> Result<Self, BitsetError> {
        code.check()?;
        Ok(Self {
            code,
            state: State::Building(Vec::new()),
        })
    }

    pub fn code(&self) -> GapCode {
        self.code
    }

    pub fn is_committed(&self) -> bool {
        matches!(self.state, State::Committed(_))
    }

    pub fn len(&self) -> usize {
        match &self.state {
            State::Building(buffer) => buffer.len(),
            State::Committed(committed) => committed.len as usize,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn add(&mut self, id: ObjectId) -> Result<(), BitsetError> {
        match &mut self.state {
            State::Building(buffer) => {
                buffer.push(id);
                Ok(())
            }
            State::Committed(_) => Err(BitsetError::InvalidState("add after commit")),
        }
    }

    /// Sorts and encodes the buffer. On failure nothing is committed.
    pub fn commit(&mut self) -> Result<(), BitsetError> {
        let State::Building(buffer) = &mut self.state else {
            return Err(BitsetError::InvalidState("commit after commit"));
        };
        let len = u32::try_from(buffer.len()).map_err(|_| BitsetError::EncodingOverflow {
            value: buffer.len() as u64,
            width: 32,
        })?;
        buffer.sort_unstable();
        let mut writer = BitWriter::new();
        for pair in buffer.windows(2) {
            // the true difference of two sorted i64 lies in 0..2^64
            let gap = (pair[1] as u64).wrapping_sub(pair[0] as u64);
            self.code.encode(&mut writer, gap)?;
        }
        let first = buffer.first().copied().unwrap_or(0);
        self.state = State::Committed(Committed {
            first,
            len,
            stream: writer.finish().into_boxed_slice(),
        });
        Ok(())
    }

    /// Streams the identifiers in ascending order.
    pub fn iter(&self) -> Result<Iter<'_>, BitsetError> {
        let State::Committed(committed) = &self.state else {
            return Err(BitsetError::InvalidState("read before commit"));
        };
        Ok(Iter {
            code: self.code,
            reader: BitReader::new(&committed.stream),
            current: committed.first,
            index: 0,
            len: committed.len,
        })
    }

    pub fn decode_all(&self) -> Result<Vec<ObjectId>, BitsetError> {
        Ok(self.iter()?.collect())
    }

    /// Keeps the `k` identifiers with the smallest proxy distance to `query`.
    ///
    /// Identifiers are decoded one by one; one whose proxy distance cannot
    /// enter the current top `k` is dropped before reaching the heap.
    pub fn search_bounded<Q: ?Sized, P: Scalar>(
        &self,
        query: &Q,
        k: NonZero<usize>,
        mut proxy: impl FnMut(&Q, ObjectId) -> P,
    ) -> Result<Vec<(ObjectId, P)>, BitsetError> {
        let mut results = BoundedTopK::new(k);
        for id in self.iter()? {
            let distance = proxy(query, id);
            if results.admits(distance) {
                results.add(id, distance);
            }
        }
        Ok(results.into_sorted_vec())
    }

    /// Size of the byte image, or of the raw buffer while building.
    pub fn encoded_bytes(&self) -> usize {
        match &self.state {
            State::Building(buffer) => buffer.len() * size_of::<ObjectId>(),
            State::Committed(committed) => HEADER + committed.stream.len() + TRAILER,
        }
    }
}

impl Encodable for CompressedBucketSet {
    type Context = GapCode;

    fn encode(&self, out: &mut Vec<u8>) -> Result<(), BitsetError> {
        let State::Committed(committed) = &self.state else {
            return Err(BitsetError::InvalidState("encode before commit"));
        };
        out.extend_from_slice(I64::new(committed.first).as_bytes());
        out.extend_from_slice(&committed.stream);
        out.extend_from_slice(U32::new(committed.len).as_bytes());
        Ok(())
    }

    fn decode(code: GapCode, bytes: &[u8]) -> Result<Self, BitsetError> {
        code.check()?;
        let (first, rest) =
            I64::read_from_prefix(bytes).map_err(|_| BitsetError::Corrupted("missing header"))?;
        let (stream, len) =
            U32::read_from_suffix(rest).map_err(|_| BitsetError::Corrupted("missing trailer"))?;
        let (first, len) = (first.get(), len.get());
        if len == 0 && (first != 0 || !stream.is_empty()) {
            return Err(BitsetError::Corrupted("empty set with payload"));
        }
        let mut reader = BitReader::new(stream);
        let mut current = first as i128;
        for _ in 1..len {
            let gap = code
                .decode(&mut reader)
                .ok_or(BitsetError::Corrupted("truncated stream"))?;
            current += gap as i128;
            if current > ObjectId::MAX as i128 {
                return Err(BitsetError::Corrupted("identifier out of range"));
            }
        }
        if reader.remaining() >= 8 {
            return Err(BitsetError::Corrupted("trailing bytes"));
        }
        Ok(Self {
            code,
            state: State::Committed(Committed {
                first,
                len,
                stream: stream.into(),
            }),
        })
    }
}

/// Sequential decoder over a committed set.
#[derive(Debug, Clone)]
pub struct Iter<'a> {
    code: GapCode,
    reader: BitReader<'a>,
    current: ObjectId,
    index: u32,
    len: u32,
}

impl Iterator for Iter<'_> {
    type Item = ObjectId;

    fn next(&mut self) -> Option<ObjectId> {
        if self.index >= self.len {
            return None;
        }
        if self.index > 0 {
            let gap = self.code.decode(&mut self.reader).expect("data corruption");
            self.current = self.current.wrapping_add(gap as i64);
        }
        self.index += 1;
        Some(self.current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let rest = (self.len - self.index) as usize;
        (rest, Some(rest))
    }
}

impl ExactSizeIterator for Iter<'_> {}

#[cfg(test)]
fn committed(code: GapCode, ids: &[ObjectId]) -> CompressedBucketSet {
    let mut set = CompressedBucketSet::new(code).unwrap();
    for &id in ids {
        set.add(id).unwrap();
    }
    set.commit().unwrap();
    set
}

#[test]
fn test_round_trip() {
    use rand::seq::SliceRandom;
    for code in [GapCode::Gamma, GapCode::Delta, GapCode::Fixed(64)] {
        for _ in 0..50 {
            let n = rand::random_range(0..3000);
            let spread = rand::random_range(1..=63u32);
            let mut ids = (0..n)
                .map(|_| rand::random::<i64>() >> spread)
                .collect::<std::collections::BTreeSet<_>>()
                .into_iter()
                .collect::<Vec<_>>();
            let sorted = ids.clone();
            ids.shuffle(&mut rand::rng());
            let set = committed(code, &ids);
            assert_eq!(set.len(), sorted.len());
            assert_eq!(set.decode_all().unwrap(), sorted);
            let image = set.to_bytes().unwrap();
            assert_eq!(image.len(), set.encoded_bytes());
            let restored = CompressedBucketSet::decode(code, &image).unwrap();
            assert_eq!(restored.decode_all().unwrap(), sorted);
        }
    }
}

#[test]
fn test_extreme_identifiers() {
    let set = committed(GapCode::Fixed(64), &[ObjectId::MAX, ObjectId::MIN, 0]);
    assert_eq!(
        set.decode_all().unwrap(),
        vec![ObjectId::MIN, 0, ObjectId::MAX]
    );
    let set = committed(GapCode::Delta, &[ObjectId::MAX, ObjectId::MIN, -1]);
    assert_eq!(
        set.decode_all().unwrap(),
        vec![ObjectId::MIN, -1, ObjectId::MAX]
    );
    let mut set = CompressedBucketSet::new(GapCode::Delta).unwrap();
    set.add(ObjectId::MAX).unwrap();
    set.add(ObjectId::MIN).unwrap();
    assert_eq!(
        set.commit(),
        Err(BitsetError::EncodingOverflow {
            value: u64::MAX,
            width: 64
        })
    );
    assert!(!set.is_committed());
    let mut set = CompressedBucketSet::new(GapCode::Fixed(8)).unwrap();
    set.add(0).unwrap();
    set.add(256).unwrap();
    assert_eq!(
        set.commit(),
        Err(BitsetError::EncodingOverflow {
            value: 256,
            width: 8
        })
    );
}

#[test]
fn test_lifecycle() {
    let mut set = CompressedBucketSet::new(GapCode::Gamma).unwrap();
    set.add(3).unwrap();
    assert!(matches!(set.iter(), Err(BitsetError::InvalidState(_))));
    assert!(matches!(set.to_bytes(), Err(BitsetError::InvalidState(_))));
    set.commit().unwrap();
    assert_eq!(set.add(4), Err(BitsetError::InvalidState("add after commit")));
    assert_eq!(
        set.commit(),
        Err(BitsetError::InvalidState("commit after commit"))
    );
    assert_eq!(set.decode_all().unwrap(), vec![3]);
    assert!(matches!(
        CompressedBucketSet::new(GapCode::Fixed(0)),
        Err(BitsetError::InvalidWidth(0))
    ));
}

#[test]
fn test_byte_image() {
    let set = committed(GapCode::Gamma, &[5, 1, 42]);
    assert_eq!(
        set.to_bytes().unwrap(),
        vec![1, 0, 0, 0, 0, 0, 0, 0, 0x28, 0x26, 3, 0, 0, 0]
    );
    let set = committed(GapCode::Delta, &[5, 1, 42]);
    assert_eq!(
        set.to_bytes().unwrap(),
        vec![1, 0, 0, 0, 0, 0, 0, 0, 0x69, 0x8C, 3, 0, 0, 0]
    );
    let empty = committed(GapCode::Delta, &[]);
    assert_eq!(empty.to_bytes().unwrap(), vec![0; 12]);
    assert_eq!(empty.decode_all().unwrap(), Vec::<ObjectId>::new());
}

#[test]
fn test_corrupted_images() {
    let image = committed(GapCode::Gamma, &[1, 5, 42]).to_bytes().unwrap();
    let decode = |bytes: &[u8]| CompressedBucketSet::decode(GapCode::Gamma, bytes);
    assert!(decode(&image).is_ok());
    assert_eq!(
        decode(&image[..7]).unwrap_err(),
        BitsetError::Corrupted("missing header")
    );
    assert_eq!(
        decode(&image[..10]).unwrap_err(),
        BitsetError::Corrupted("missing trailer")
    );
    let mut dropped = image[..9].to_vec();
    dropped.extend_from_slice(&image[10..]);
    assert_eq!(
        decode(&dropped).unwrap_err(),
        BitsetError::Corrupted("truncated stream")
    );
    let mut padded = image[..10].to_vec();
    padded.push(0);
    padded.extend_from_slice(&image[10..]);
    assert_eq!(
        decode(&padded).unwrap_err(),
        BitsetError::Corrupted("trailing bytes")
    );
}

#[test]
fn test_duplicates_survive() {
    let set = committed(GapCode::Gamma, &[7, 7, 2]);
    assert_eq!(set.decode_all().unwrap(), vec![2, 7, 7]);
}

#[test]
fn test_search_bounded_matches_linear_scan() {
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};
    let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(20250101);
    let mut ids = std::collections::HashSet::with_capacity(1_000_000);
    while ids.len() < 1_000_000 {
        ids.insert(rng.random::<i64>());
    }
    let mut ids = ids.into_iter().collect::<Vec<_>>();
    ids.shuffle(&mut rng);
    let set = committed(GapCode::Delta, &ids);
    let decoded = set.decode_all().unwrap();
    ids.sort_unstable();
    assert_eq!(decoded, ids);
    assert!(set.encoded_bytes() < ids.len() * size_of::<ObjectId>());

    let proxy =
        |query: &u64, id: ObjectId| ((id as u64 ^ query).wrapping_mul(0x9E37_79B9_7F4A_7C15) >> 44) as u32;
    let query = rng.random::<u64>();
    let k = 1000;
    let answer = {
        let mut all = ids.iter().map(|&id| (id, proxy(&query, id))).collect::<Vec<_>>();
        all.sort_by_key(|&(_, d)| d);
        all.truncate(k);
        all
    };
    let result = set
        .search_bounded(&query, NonZero::new(k).unwrap(), proxy)
        .unwrap();
    assert_eq!(result, answer);
}
