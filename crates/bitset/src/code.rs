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

use crate::BitsetError;
use crate::bits::{BitReader, BitWriter};
use serde::{Deserialize, Serialize};

/// Variable-length code for the gap between consecutive identifiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapCode {
    /// Elias gamma of `gap + 1`.
    Gamma,
    /// Elias delta of `gap + 1`.
    #[default]
    Delta,
    /// `gap` in exactly this many bits.
    Fixed(u8),
}

impl GapCode {
    pub fn check(self) -> Result<(), BitsetError> {
        match self {
            GapCode::Fixed(width) if !(1..=64).contains(&width) => {
                Err(BitsetError::InvalidWidth(width))
            }
            _ => Ok(()),
        }
    }

    pub fn encode(self, writer: &mut BitWriter, gap: u64) -> Result<(), BitsetError> {
        match self {
            GapCode::Gamma => {
                let value = shifted(gap)?;
                write_gamma(writer, value);
            }
            GapCode::Delta => {
                let value = shifted(gap)?;
                write_delta(writer, value);
            }
            GapCode::Fixed(width) => {
                let width = width as u32;
                if width < 64 && gap >> width != 0 {
                    return Err(BitsetError::EncodingOverflow { value: gap, width });
                }
                writer.push_bits(gap, width);
            }
        }
        Ok(())
    }

    pub fn decode(self, reader: &mut BitReader<'_>) -> Option<u64> {
        match self {
            GapCode::Gamma => read_gamma(reader).map(|value| value - 1),
            GapCode::Delta => read_delta(reader).map(|value| value - 1),
            GapCode::Fixed(width) => reader.read_bits(width as u32),
        }
    }

    /// Number of bits `encode` spends on `gap`, if it is representable.
    pub fn cost(self, gap: u64) -> Option<u32> {
        match self {
            GapCode::Gamma => {
                let n = significant(gap.checked_add(1)?);
                Some(2 * n + 1)
            }
            GapCode::Delta => {
                let n = significant(gap.checked_add(1)?);
                Some(2 * significant((n + 1) as u64) + 1 + n)
            }
            GapCode::Fixed(width) => {
                let width = width as u32;
                (width >= 64 || gap >> width == 0).then_some(width)
            }
        }
    }
}

fn shifted(gap: u64) -> Result<u64, BitsetError> {
    gap.checked_add(1)
        .ok_or(BitsetError::EncodingOverflow { value: gap, width: 64 })
}

// floor(log2(value)), the number of bits after the leading one
#[inline]
fn significant(value: u64) -> u32 {
    debug_assert!(value != 0);
    63 - value.leading_zeros()
}

fn write_gamma(writer: &mut BitWriter, value: u64) {
    let n = significant(value);
    writer.push_bits(0, n);
    writer.push_bits(value, n + 1);
}

fn read_gamma(reader: &mut BitReader<'_>) -> Option<u64> {
    let n = reader.read_unary(63)?;
    let low = reader.read_bits(n)?;
    Some((1u64 << n) | low)
}

fn write_delta(writer: &mut BitWriter, value: u64) {
    let n = significant(value);
    write_gamma(writer, (n + 1) as u64);
    writer.push_bits(value & ((1u64 << n) - 1), n);
}

fn read_delta(reader: &mut BitReader<'_>) -> Option<u64> {
    let length = read_gamma(reader)?;
    if !(1..=64).contains(&length) {
        return None;
    }
    let n = (length - 1) as u32;
    let low = reader.read_bits(n)?;
    Some((1u64 << n) | low)
}

#[test]
fn test_gap_codes_round_trip() {
    let mut gaps = vec![0, 1, 2, 3, 7, 8, 255, 256, u64::MAX - 1, 1 << 63];
    gaps.extend((0..1000).map(|_| rand::random::<u64>() >> rand::random_range(0..64u32)));
    for code in [GapCode::Gamma, GapCode::Delta, GapCode::Fixed(64)] {
        let mut writer = BitWriter::new();
        let mut expected = 0u64;
        for &gap in gaps.iter() {
            code.encode(&mut writer, gap).unwrap();
            expected += code.cost(gap).unwrap() as u64;
        }
        assert_eq!(writer.bits(), expected);
        let bytes = writer.finish();
        let mut reader = BitReader::new(&bytes);
        for &gap in gaps.iter() {
            assert_eq!(code.decode(&mut reader), Some(gap), "{code:?}");
        }
    }
}

#[test]
fn test_gap_code_words() {
    let mut writer = BitWriter::new();
    GapCode::Gamma.encode(&mut writer, 4).unwrap();
    assert_eq!(writer.bits(), 5);
    assert_eq!(writer.finish(), vec![0b0010_1000]);
    let mut writer = BitWriter::new();
    GapCode::Delta.encode(&mut writer, 4).unwrap();
    assert_eq!(writer.finish(), vec![0b0110_1000]);
    let mut writer = BitWriter::new();
    GapCode::Gamma.encode(&mut writer, 0).unwrap();
    assert_eq!(writer.finish(), vec![0b1000_0000]);
}

#[test]
fn test_gap_code_overflow() {
    let mut writer = BitWriter::new();
    assert_eq!(
        GapCode::Gamma.encode(&mut writer, u64::MAX),
        Err(BitsetError::EncodingOverflow {
            value: u64::MAX,
            width: 64
        })
    );
    assert!(GapCode::Delta.encode(&mut writer, u64::MAX).is_err());
    assert!(GapCode::Fixed(4).encode(&mut writer, 15).is_ok());
    assert_eq!(
        GapCode::Fixed(4).encode(&mut writer, 16),
        Err(BitsetError::EncodingOverflow {
            value: 16,
            width: 4
        })
    );
    assert!(GapCode::Fixed(64).encode(&mut writer, u64::MAX).is_ok());
    assert_eq!(GapCode::Fixed(4).cost(16), None);
    assert_eq!(GapCode::Fixed(0).check(), Err(BitsetError::InvalidWidth(0)));
    assert_eq!(GapCode::Fixed(65).check(), Err(BitsetError::InvalidWidth(65)));
    assert_eq!(GapCode::Delta.check(), Ok(()));
}
