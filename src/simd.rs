//! Lane-wise views of 128-bit vectors.
//!
//! A `v128` is kept as a plain `u128`, little-endian lane order: lane 0 occupies the lowest
//! bits. Every helper here takes the lane type explicitly, so an opcode always states how it
//! slices the vector.

use crate::{
    ops::{BinOp, UnOp},
    trap::Trap,
};

/// A scalar type that can occupy a lane of a `v128`.
pub(crate) trait Lane: Copy {
    const BITS: u32;
    const COUNT: usize = (128 / Self::BITS) as usize;

    /// Takes the low `BITS` bits of `bits`.
    fn from_bits(bits: u128) -> Self;

    /// Returns the bit pattern of this lane, zero extended.
    fn to_bits(self) -> u128;
}

macro_rules! impl_int_lane {
    ($($T:ty => $U:ty),*) => {
        $(
            impl Lane for $T {
                const BITS: u32 = <$U>::BITS;

                #[inline(always)]
                fn from_bits(bits: u128) -> Self {
                    bits as $U as $T
                }

                #[inline(always)]
                fn to_bits(self) -> u128 {
                    self as $U as u128
                }
            }
        )*
    };
}

impl_int_lane! {
    i8 => u8, u8 => u8, i16 => u16, u16 => u16, i32 => u32, u32 => u32, i64 => u64, u64 => u64
}

impl Lane for f32 {
    const BITS: u32 = 32;

    #[inline(always)]
    fn from_bits(bits: u128) -> Self {
        f32::from_bits(bits as u32)
    }

    #[inline(always)]
    fn to_bits(self) -> u128 {
        f32::to_bits(self) as u128
    }
}

impl Lane for f64 {
    const BITS: u32 = 64;

    #[inline(always)]
    fn from_bits(bits: u128) -> Self {
        f64::from_bits(bits as u64)
    }

    #[inline(always)]
    fn to_bits(self) -> u128 {
        f64::to_bits(self) as u128
    }
}

#[inline(always)]
fn lane_mask<T: Lane>() -> u128 {
    u128::MAX >> (128 - T::BITS)
}

/// Reads lane `idx` of `v`.
#[inline]
pub(crate) fn lane<T: Lane>(v: u128, idx: usize) -> T {
    T::from_bits(v >> (idx as u32 * T::BITS))
}

/// Returns `v` with lane `idx` replaced by `x`.
#[inline]
pub(crate) fn replace_lane<T: Lane>(v: u128, idx: usize, x: T) -> u128 {
    let shift = idx as u32 * T::BITS;
    (v & !(lane_mask::<T>() << shift)) | (x.to_bits() << shift)
}

pub(crate) fn splat<T: Lane>(x: T) -> u128 {
    (0..T::COUNT).fold(0, |v, idx| replace_lane(v, idx, x))
}

/// Applies `f` to every lane of `v`. When `U` has more lanes than `T`, the extra lanes of the
/// result are zero.
pub(crate) fn map<T: Lane, U: Lane>(v: u128, f: impl Fn(T) -> U) -> u128 {
    (0..T::COUNT).fold(0, |out, idx| replace_lane(out, idx, f(lane(v, idx))))
}

pub(crate) fn zip_map<T: Lane>(a: u128, b: u128, f: impl Fn(T, T) -> T) -> u128 {
    (0..T::COUNT).fold(0, |out, idx| replace_lane(out, idx, f(lane(a, idx), lane(b, idx))))
}

pub(crate) fn un_op<T, O>(v: u128) -> Result<u128, Trap>
where
    T: Lane,
    O: UnOp<T, Output = T>,
{
    let mut out = 0;
    for idx in 0..T::COUNT {
        out = replace_lane(out, idx, O::un_op(lane(v, idx))?);
    }
    Ok(out)
}

pub(crate) fn bin_op<T, O>(a: u128, b: u128) -> Result<u128, Trap>
where
    T: Lane,
    O: BinOp<T, Output = T>,
{
    let mut out = 0;
    for idx in 0..T::COUNT {
        out = replace_lane(out, idx, O::bin_op(lane(a, idx), lane(b, idx))?);
    }
    Ok(out)
}

/// Compares lane-wise. A lane of the result is all ones where the relation holds.
pub(crate) fn rel_op<T, O>(a: u128, b: u128) -> Result<u128, Trap>
where
    T: Lane,
    O: BinOp<T, Output = bool>,
{
    let mut out = 0;
    for idx in 0..T::COUNT {
        if O::bin_op(lane(a, idx), lane(b, idx))? {
            out |= lane_mask::<T>() << (idx as u32 * T::BITS);
        }
    }
    Ok(out)
}

/// Widens half of the lanes of `v`: the low half, or the high half if `high` is set.
pub(crate) fn extend<T: Lane, U: Lane>(v: u128, high: bool, f: impl Fn(T) -> U) -> u128 {
    let offset = if high { U::COUNT } else { 0 };
    (0..U::COUNT).fold(0, |out, idx| replace_lane(out, idx, f(lane(v, offset + idx))))
}

/// Multiplies widened halves of `a` and `b` lane-wise.
pub(crate) fn ext_mul<T: Lane, U: Lane>(a: u128, b: u128, high: bool, f: impl Fn(T, T) -> U) -> u128 {
    let offset = if high { U::COUNT } else { 0 };
    (0..U::COUNT).fold(0, |out, idx| {
        replace_lane(out, idx, f(lane(a, offset + idx), lane(b, offset + idx)))
    })
}

/// Combines adjacent lane pairs of `v` into one wider lane each.
pub(crate) fn pairwise<T: Lane, U: Lane>(v: u128, f: impl Fn(T, T) -> U) -> u128 {
    (0..U::COUNT).fold(0, |out, idx| {
        replace_lane(out, idx, f(lane(v, 2 * idx), lane(v, 2 * idx + 1)))
    })
}

/// Narrows the lanes of `a` followed by those of `b` into one vector.
pub(crate) fn narrow<T: Lane, U: Lane>(a: u128, b: u128, f: impl Fn(T) -> U) -> u128 {
    (0..T::COUNT).fold(0, |out, idx| {
        let out = replace_lane(out, idx, f(lane(a, idx)));
        replace_lane(out, T::COUNT + idx, f(lane(b, idx)))
    })
}

pub(crate) fn dot_i16x8(a: u128, b: u128) -> u128 {
    (0..4).fold(0, |out, idx| {
        let lo = lane::<i16>(a, 2 * idx) as i32 * lane::<i16>(b, 2 * idx) as i32;
        let hi = lane::<i16>(a, 2 * idx + 1) as i32 * lane::<i16>(b, 2 * idx + 1) as i32;
        replace_lane(out, idx, lo.wrapping_add(hi))
    })
}

pub(crate) fn q15_mulr_sat(a: i16, b: i16) -> i16 {
    let product = (a as i32 * b as i32 + 0x4000) >> 15;
    product.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

pub(crate) fn all_true<T: Lane>(v: u128) -> bool {
    (0..T::COUNT).all(|idx| lane::<T>(v, idx).to_bits() != 0)
}

/// Collects the sign bit of every lane.
pub(crate) fn bitmask<T: Lane>(v: u128) -> u32 {
    (0..T::COUNT).fold(0, |mask, idx| {
        let sign = (lane::<T>(v, idx).to_bits() >> (T::BITS - 1)) as u32 & 1;
        mask | (sign << idx)
    })
}

pub(crate) fn swizzle(a: u128, s: u128) -> u128 {
    (0..16).fold(0, |out, idx| {
        let select = lane::<u8>(s, idx) as usize;
        let byte = if select < 16 { lane::<u8>(a, select) } else { 0 };
        replace_lane(out, idx, byte)
    })
}

pub(crate) fn shuffle(a: u128, b: u128, lanes: &[u8; 16]) -> u128 {
    lanes.iter().enumerate().fold(0, |out, (idx, &select)| {
        let select = select as usize;
        let byte = if select < 16 {
            lane::<u8>(a, select)
        } else {
            lane::<u8>(b, select - 16)
        };
        replace_lane(out, idx, byte)
    })
}

pub(crate) fn bitselect(v1: u128, v2: u128, c: u128) -> u128 {
    (v1 & c) | (v2 & !c)
}

#[cfg(test)]
mod tests {
    use {super::*, crate::ops::{Add, AddSat, Lt}};

    #[test]
    fn lanes_are_little_endian() {
        let v = 0x0F0E0D0C_0B0A0908_07060504_03020100u128;
        assert_eq!(lane::<u8>(v, 0), 0x00);
        assert_eq!(lane::<u8>(v, 15), 0x0F);
        assert_eq!(lane::<u32>(v, 1), 0x07060504);
        assert_eq!(replace_lane::<u16>(v, 0, 0xBEEF) & 0xFFFF_FFFF, 0x0302BEEF);
        assert_eq!(splat::<i16>(-1), u128::MAX);
    }

    #[test]
    fn lane_arithmetic_wraps_or_saturates_per_lane() {
        let a = splat::<u8>(250);
        let b = splat::<u8>(10);
        assert_eq!(bin_op::<u8, Add>(a, b), Ok(splat::<u8>(4)));
        assert_eq!(bin_op::<u8, AddSat>(a, b), Ok(splat::<u8>(255)));
        assert_eq!(bin_op::<i8, AddSat>(splat::<i8>(100), splat::<i8>(100)), Ok(splat::<i8>(127)));
    }

    #[test]
    fn comparisons_produce_lane_masks() {
        let a = replace_lane::<i32>(splat::<i32>(5), 2, -7);
        let mask = rel_op::<i32, Lt>(a, splat::<i32>(0)).unwrap();
        assert_eq!(lane::<u32>(mask, 2), u32::MAX);
        assert_eq!(lane::<u32>(mask, 0), 0);
        assert_eq!(bitmask::<i32>(mask), 0b0100);
        assert!(!all_true::<i32>(mask));
    }

    #[test]
    fn narrowing_saturates_both_halves() {
        let a = splat::<i16>(300);
        let b = splat::<i16>(-300);
        let v = narrow::<i16, i8>(a, b, |x| x.clamp(i8::MIN as i16, i8::MAX as i16) as i8);
        assert_eq!(lane::<i8>(v, 0), 127);
        assert_eq!(lane::<i8>(v, 15), -128);
    }

    #[test]
    fn shuffle_and_swizzle_select_bytes() {
        let a = 0x0F0E0D0C_0B0A0908_07060504_03020100u128;
        let b = splat::<u8>(0xAA);
        let mut lanes = [0u8; 16];
        lanes[0] = 15;
        lanes[1] = 16;
        let v = shuffle(a, b, &lanes);
        assert_eq!(lane::<u8>(v, 0), 0x0F);
        assert_eq!(lane::<u8>(v, 1), 0xAA);
        assert_eq!(lane::<u8>(swizzle(a, splat::<u8>(200)), 3), 0);
        assert_eq!(q15_mulr_sat(i16::MIN, i16::MIN), i16::MAX);
    }
}
