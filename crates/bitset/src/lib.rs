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

//! Succinct storage of sorted object identifiers.
//!
//! A [`CompressedBucketSet`] is filled in any order, committed once and read
//! many times. Committed sets keep the first identifier raw and every later
//! one as the gap to its predecessor in a variable-length bit code.

pub mod bits;
mod code;
mod set;

pub use code::GapCode;
pub use set::{CompressedBucketSet, Iter};

pub type ObjectId = i64;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BitsetError {
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
    #[error("value {value} cannot be represented in {width} bits")]
    EncodingOverflow { value: u64, width: u32 },
    #[error("fixed gap width {0} is outside 1..=64")]
    InvalidWidth(u8),
    #[error("data corruption: {0}")]
    Corrupted(&'static str),
}

/// A value with a stable byte image.
pub trait Encodable: Sized {
    /// What `decode` needs besides the bytes.
    type Context: Copy;

    fn encode(&self, out: &mut Vec<u8>) -> Result<(), BitsetError>;

    fn decode(context: Self::Context, bytes: &[u8]) -> Result<Self, BitsetError>;

    fn to_bytes(&self) -> Result<Vec<u8>, BitsetError> {
        let mut out = Vec::new();
        self.encode(&mut out)?;
        Ok(out)
    }
}
