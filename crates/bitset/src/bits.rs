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

/// Appends bits, most significant first, into a zero-padded byte buffer.
#[derive(Debug, Default)]
pub struct BitWriter {
    bytes: Vec<u8>,
    len: u64,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn bits(&self) -> u64 {
        self.len
    }
    pub fn push_bit(&mut self, bit: bool) {
        self.push_bits(bit as u64, 1);
    }
    /// Appends the low `width` bits of `value`.
    pub fn push_bits(&mut self, value: u64, width: u32) {
        assert!(width <= 64);
        debug_assert!(width == 64 || value >> width == 0);
        let mut remaining = width;
        while remaining > 0 {
            let offset = (self.len % 8) as u32;
            if offset == 0 {
                self.bytes.push(0);
            }
            let room = 8 - offset;
            let take = room.min(remaining);
            let chunk = ((value >> (remaining - take)) & ((1u64 << take) - 1)) as u8;
            let last = self.bytes.len() - 1;
            self.bytes[last] |= chunk << (room - take);
            remaining -= take;
            self.len += take as u64;
        }
    }
    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }
}

/// Reads bits written by [`BitWriter`].
///
/// Every read returns `None` instead of running past the end of the buffer.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    bytes: &'a [u8],
    position: u64,
}

impl<'a> BitReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }
    pub fn position(&self) -> u64 {
        self.position
    }
    pub fn remaining(&self) -> u64 {
        self.bytes.len() as u64 * 8 - self.position
    }
    pub fn read_bit(&mut self) -> Option<bool> {
        self.read_bits(1).map(|bit| bit != 0)
    }
    pub fn read_bits(&mut self, width: u32) -> Option<u64> {
        assert!(width <= 64);
        if self.remaining() < width as u64 {
            return None;
        }
        let mut value = 0u64;
        let mut remaining = width;
        while remaining > 0 {
            let byte = self.bytes[(self.position / 8) as usize];
            let offset = (self.position % 8) as u32;
            let room = 8 - offset;
            let take = room.min(remaining);
            let chunk = (byte as u64 >> (room - take)) & ((1u64 << take) - 1);
            value = (value << take) | chunk;
            remaining -= take;
            self.position += take as u64;
        }
        Some(value)
    }
    /// Consumes a run of zeros and the one that ends it, returning the run length.
    pub fn read_unary(&mut self, limit: u32) -> Option<u32> {
        let mut zeros = 0;
        loop {
            if self.read_bit()? {
                return Some(zeros);
            }
            zeros += 1;
            if zeros > limit {
                return None;
            }
        }
    }
}

#[test]
fn test_bits_round_trip() {
    let mut writer = BitWriter::new();
    let fields = (0..2000)
        .map(|_| {
            let width = rand::random_range(0..=64u32);
            let value = if width == 64 {
                rand::random::<u64>()
            } else {
                rand::random::<u64>() & ((1u64 << width) - 1)
            };
            (value, width)
        })
        .collect::<Vec<_>>();
    for &(value, width) in fields.iter() {
        writer.push_bits(value, width);
    }
    let total = writer.bits();
    let bytes = writer.finish();
    assert_eq!(bytes.len() as u64, total.div_ceil(8));
    let mut reader = BitReader::new(&bytes);
    for &(value, width) in fields.iter() {
        assert_eq!(reader.read_bits(width), Some(value));
    }
    assert!(reader.remaining() < 8);
}

#[test]
fn test_bits_are_msb_first() {
    let mut writer = BitWriter::new();
    writer.push_bit(true);
    writer.push_bits(0b011, 3);
    writer.push_bits(0b1_1111, 5);
    assert_eq!(writer.finish(), vec![0b1011_1111, 0b1000_0000]);
}

#[test]
fn test_reader_stops_at_end() {
    let bytes = [0b0000_0001u8];
    let mut reader = BitReader::new(&bytes);
    assert_eq!(reader.read_unary(63), Some(7));
    assert_eq!(reader.read_bit(), None);
    let zeros = [0u8; 2];
    assert_eq!(BitReader::new(&zeros).read_unary(63), None);
    assert_eq!(BitReader::new(&zeros).read_unary(3), None);
}
