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

use std::fmt::Debug;
use std::ops::Add;

/// A value that can be used as a distance.
///
/// Ordering decides ranking, `ZERO` is the distance of an object to itself
/// and `MAX` is the sentinel for "no bound yet".
pub trait Scalar: Copy + Ord + Debug + Send + Sync + Add<Output = Self> + 'static {
    const ZERO: Self;
    const MAX: Self;
}

macro_rules! impl_scalar {
    ($($t:ty),*) => {
        $(
            impl Scalar for $t {
                const ZERO: Self = 0;
                const MAX: Self = <$t>::MAX;
            }
        )*
    };
}

impl_scalar!(u8, u16, u32, u64, i8, i16, i32, i64);

/// A totally ordered 32-bit float distance.
///
/// The raw `i32` ordering agrees with the float ordering, so the value can be
/// compared, hashed and sorted without `partial_cmp`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Distance(i32);

impl Distance {
    pub const ZERO: Self = Distance::from_f32(0.0f32);
    pub const INFINITY: Self = Distance::from_f32(f32::INFINITY);
    pub const NEG_INFINITY: Self = Distance::from_f32(f32::NEG_INFINITY);
    pub const NAN: Self = Distance::from_f32(f32::NAN);

    #[inline(always)]
    pub const fn from_f32(value: f32) -> Self {
        let bits = value.to_bits() as i32;
        let mask = ((bits >> 31) as u32) >> 1;
        let res = bits ^ (mask as i32);
        Self(res)
    }

    #[inline(always)]
    pub const fn to_f32(self) -> f32 {
        let bits = self.0;
        let mask = ((bits >> 31) as u32) >> 1;
        let res = bits ^ (mask as i32);
        f32::from_bits(res as u32)
    }

    #[inline(always)]
    pub const fn to_i32(self) -> i32 {
        self.0
    }
}

impl Add for Distance {
    type Output = Distance;

    #[inline(always)]
    fn add(self, rhs: Self) -> Self::Output {
        Distance::from_f32(self.to_f32() + rhs.to_f32())
    }
}

impl Scalar for Distance {
    const ZERO: Self = Distance::ZERO;
    // NaN sorts above infinity, so a real distance never reaches the sentinel.
    const MAX: Self = Distance(i32::MAX);
}

impl From<f32> for Distance {
    #[inline(always)]
    fn from(value: f32) -> Self {
        Distance::from_f32(value)
    }
}

impl From<Distance> for f32 {
    #[inline(always)]
    fn from(value: Distance) -> Self {
        Distance::to_f32(value)
    }
}

#[test]
fn distance_conversions() {
    assert_eq!(Distance::from(0.0f32), Distance::ZERO);
    assert_eq!(Distance::from(f32::INFINITY), Distance::INFINITY);
    assert_eq!(Distance::from(f32::NEG_INFINITY), Distance::NEG_INFINITY);
    for i in -100..100 {
        let val = (i as f32) * 0.1;
        assert_eq!(f32::from(Distance::from(val)).to_bits(), val.to_bits());
    }
    assert_eq!(
        f32::from(Distance::from(-0.0f32)).to_bits(),
        (-0.0f32).to_bits()
    );
    assert_eq!(
        f32::from(Distance::from(f32::NAN)).to_bits(),
        f32::NAN.to_bits()
    );
}

#[test]
fn distance_order_follows_floats() {
    let mut values = (-50..50).map(|i| i as f32 * 0.37).collect::<Vec<_>>();
    values.push(f32::INFINITY);
    values.push(f32::NEG_INFINITY);
    let mut by_float = values.clone();
    by_float.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mut by_distance = values.clone();
    by_distance.sort_by_key(|&x| Distance::from(x));
    assert_eq!(by_float, by_distance);
    assert!(Distance::INFINITY < <Distance as Scalar>::MAX);
}

#[test]
fn distance_addition() {
    let x = Distance::from(1.5f32) + Distance::from(2.25f32);
    assert_eq!(x.to_f32(), 3.75);
    assert_eq!(Distance::ZERO + Distance::from(4.0f32), Distance::from(4.0f32));
    assert_eq!(<u32 as Scalar>::ZERO + 7, 7);
}
