//! Scalar numeric semantics.
//!
//! Every operation is a zero-sized type implementing [`UnOp`] or [`BinOp`] for the operand types
//! it supports. The interpreter and the lane-wise SIMD helpers share these implementations, so
//! a scalar `i32.add` and an `i32x4.add` lane compute exactly the same thing.

use {crate::trap::Trap, std::marker::PhantomData};

pub(crate) trait UnOp<T> {
    type Output;

    fn un_op(x: T) -> Result<Self::Output, Trap>;
}

pub(crate) trait BinOp<T> {
    type Output;

    fn bin_op(x0: T, x1: T) -> Result<Self::Output, Trap>;
}

pub(crate) struct Eqz;
pub(crate) struct Eq;
pub(crate) struct Ne;
pub(crate) struct Lt;
pub(crate) struct Gt;
pub(crate) struct Le;
pub(crate) struct Ge;
pub(crate) struct Clz;
pub(crate) struct Ctz;
pub(crate) struct Popcnt;
pub(crate) struct Add;
pub(crate) struct Sub;
pub(crate) struct Mul;
pub(crate) struct Div;
pub(crate) struct Rem;
pub(crate) struct And;
pub(crate) struct Or;
pub(crate) struct Xor;
pub(crate) struct Shl;
pub(crate) struct Shr;
pub(crate) struct Rotl;
pub(crate) struct Rotr;
pub(crate) struct Abs;
pub(crate) struct Neg;
pub(crate) struct Ceil;
pub(crate) struct Floor;
pub(crate) struct Trunc;
pub(crate) struct Nearest;
pub(crate) struct Sqrt;
pub(crate) struct Min;
pub(crate) struct Max;
pub(crate) struct PMin;
pub(crate) struct PMax;
pub(crate) struct Copysign;
pub(crate) struct AddSat;
pub(crate) struct SubSat;
pub(crate) struct Avgr;

pub(crate) struct WrapTo<T>(PhantomData<T>);
pub(crate) struct ExtendTo<T>(PhantomData<T>);
pub(crate) struct TruncTo<T>(PhantomData<T>);
pub(crate) struct TruncSatTo<T>(PhantomData<T>);
pub(crate) struct ConvertTo<T>(PhantomData<T>);
pub(crate) struct DemoteTo<T>(PhantomData<T>);
pub(crate) struct PromoteTo<T>(PhantomData<T>);
pub(crate) struct ReinterpretTo<T>(PhantomData<T>);
pub(crate) struct ExtendFrom<T>(PhantomData<T>);

macro_rules! impl_rel_ops {
    ($($T:ty)*) => {
        $(
            impl BinOp<$T> for Eq {
                type Output = bool;

                fn bin_op(x0: $T, x1: $T) -> Result<Self::Output, Trap> {
                    Ok(x0 == x1)
                }
            }

            impl BinOp<$T> for Ne {
                type Output = bool;

                fn bin_op(x0: $T, x1: $T) -> Result<Self::Output, Trap> {
                    Ok(x0 != x1)
                }
            }

            impl BinOp<$T> for Lt {
                type Output = bool;

                fn bin_op(x0: $T, x1: $T) -> Result<Self::Output, Trap> {
                    Ok(x0 < x1)
                }
            }

            impl BinOp<$T> for Gt {
                type Output = bool;

                fn bin_op(x0: $T, x1: $T) -> Result<Self::Output, Trap> {
                    Ok(x0 > x1)
                }
            }

            impl BinOp<$T> for Le {
                type Output = bool;

                fn bin_op(x0: $T, x1: $T) -> Result<Self::Output, Trap> {
                    Ok(x0 <= x1)
                }
            }

            impl BinOp<$T> for Ge {
                type Output = bool;

                fn bin_op(x0: $T, x1: $T) -> Result<Self::Output, Trap> {
                    Ok(x0 >= x1)
                }
            }
        )*
    }
}

impl_rel_ops! { i8 u8 i16 u16 i32 u32 i64 u64 f32 f64 }

/// Operations shared by scalar integers and SIMD integer lanes.
macro_rules! impl_lane_int_ops {
    ($($T:ty)*) => {
        $(
            impl BinOp<$T> for Add {
                type Output = $T;

                fn bin_op(x0: $T, x1: $T) -> Result<Self::Output, Trap> {
                    Ok(x0.wrapping_add(x1))
                }
            }

            impl BinOp<$T> for Sub {
                type Output = $T;

                fn bin_op(x0: $T, x1: $T) -> Result<Self::Output, Trap> {
                    Ok(x0.wrapping_sub(x1))
                }
            }

            impl BinOp<$T> for Mul {
                type Output = $T;

                fn bin_op(x0: $T, x1: $T) -> Result<Self::Output, Trap> {
                    Ok(x0.wrapping_mul(x1))
                }
            }

            impl BinOp<$T> for Min {
                type Output = $T;

                fn bin_op(x0: $T, x1: $T) -> Result<Self::Output, Trap> {
                    Ok(x0.min(x1))
                }
            }

            impl BinOp<$T> for Max {
                type Output = $T;

                fn bin_op(x0: $T, x1: $T) -> Result<Self::Output, Trap> {
                    Ok(x0.max(x1))
                }
            }

            impl BinOp<$T> for AddSat {
                type Output = $T;

                fn bin_op(x0: $T, x1: $T) -> Result<Self::Output, Trap> {
                    Ok(x0.saturating_add(x1))
                }
            }

            impl BinOp<$T> for SubSat {
                type Output = $T;

                fn bin_op(x0: $T, x1: $T) -> Result<Self::Output, Trap> {
                    Ok(x0.saturating_sub(x1))
                }
            }

            impl UnOp<$T> for Neg {
                type Output = $T;

                fn un_op(x: $T) -> Result<Self::Output, Trap> {
                    Ok(x.wrapping_neg())
                }
            }
        )*
    }
}

impl_lane_int_ops! { i8 u8 i16 u16 i32 u32 i64 u64 }

macro_rules! impl_lane_abs {
    ($($T:ty)*) => {
        $(
            impl UnOp<$T> for Abs {
                type Output = $T;

                fn un_op(x: $T) -> Result<Self::Output, Trap> {
                    Ok(x.wrapping_abs())
                }
            }
        )*
    }
}

impl_lane_abs! { i8 i16 i32 i64 }

macro_rules! impl_avgr {
    ($($T:ty => $Wide:ty)*) => {
        $(
            impl BinOp<$T> for Avgr {
                type Output = $T;

                fn bin_op(x0: $T, x1: $T) -> Result<Self::Output, Trap> {
                    Ok(((x0 as $Wide + x1 as $Wide + 1) / 2) as $T)
                }
            }
        )*
    }
}

impl_avgr! { u8 => u16 u16 => u32 }

macro_rules! impl_int_ops {
    ($($T:ty)*) => {
        $(
            impl UnOp<$T> for Eqz {
                type Output = bool;

                fn un_op(x: $T) -> Result<Self::Output, Trap> {
                    Ok(x == 0)
                }
            }

            impl UnOp<$T> for Clz {
                type Output = $T;

                fn un_op(x: $T) -> Result<Self::Output, Trap> {
                    Ok(x.leading_zeros() as $T)
                }
            }

            impl UnOp<$T> for Ctz {
                type Output = $T;

                fn un_op(x: $T) -> Result<Self::Output, Trap> {
                    Ok(x.trailing_zeros() as $T)
                }
            }

            impl UnOp<$T> for Popcnt {
                type Output = $T;

                fn un_op(x: $T) -> Result<Self::Output, Trap> {
                    Ok(x.count_ones() as $T)
                }
            }

            impl BinOp<$T> for Div {
                type Output = $T;

                fn bin_op(x0: $T, x1: $T) -> Result<Self::Output, Trap> {
                    if x1 == 0 {
                        return Err(Trap::IntegerDivideByZero);
                    }
                    match x0.overflowing_div(x1) {
                        (result, false) => Ok(result),
                        (_, true) => Err(Trap::IntegerOverflow),
                    }
                }
            }

            impl BinOp<$T> for Rem {
                type Output = $T;

                fn bin_op(x0: $T, x1: $T) -> Result<Self::Output, Trap> {
                    if x1 == 0 {
                        return Err(Trap::IntegerDivideByZero);
                    }
                    Ok(x0.wrapping_rem(x1))
                }
            }

            impl BinOp<$T> for And {
                type Output = $T;

                fn bin_op(x0: $T, x1: $T) -> Result<Self::Output, Trap> {
                    Ok(x0 & x1)
                }
            }

            impl BinOp<$T> for Or {
                type Output = $T;

                fn bin_op(x0: $T, x1: $T) -> Result<Self::Output, Trap> {
                    Ok(x0 | x1)
                }
            }

            impl BinOp<$T> for Xor {
                type Output = $T;

                fn bin_op(x0: $T, x1: $T) -> Result<Self::Output, Trap> {
                    Ok(x0 ^ x1)
                }
            }

            // Shift and rotate counts are taken modulo the bit width.
            impl BinOp<$T> for Shl {
                type Output = $T;

                fn bin_op(x0: $T, x1: $T) -> Result<Self::Output, Trap> {
                    Ok(x0.wrapping_shl(x1 as u32))
                }
            }

            impl BinOp<$T> for Shr {
                type Output = $T;

                fn bin_op(x0: $T, x1: $T) -> Result<Self::Output, Trap> {
                    Ok(x0.wrapping_shr(x1 as u32))
                }
            }

            impl BinOp<$T> for Rotl {
                type Output = $T;

                fn bin_op(x0: $T, x1: $T) -> Result<Self::Output, Trap> {
                    Ok(x0.rotate_left((x1 as u32) % <$T>::BITS))
                }
            }

            impl BinOp<$T> for Rotr {
                type Output = $T;

                fn bin_op(x0: $T, x1: $T) -> Result<Self::Output, Trap> {
                    Ok(x0.rotate_right((x1 as u32) % <$T>::BITS))
                }
            }
        )*
    }
}

impl_int_ops! { i32 u32 i64 u64 }

macro_rules! impl_float_ops {
    ($($T:ty)*) => {
        $(
            impl UnOp<$T> for Abs {
                type Output = $T;

                fn un_op(x: $T) -> Result<Self::Output, Trap> {
                    Ok(x.abs())
                }
            }

            impl UnOp<$T> for Neg {
                type Output = $T;

                fn un_op(x: $T) -> Result<Self::Output, Trap> {
                    Ok(-x)
                }
            }

            impl UnOp<$T> for Ceil {
                type Output = $T;

                fn un_op(x: $T) -> Result<Self::Output, Trap> {
                    Ok(x.ceil())
                }
            }

            impl UnOp<$T> for Floor {
                type Output = $T;

                fn un_op(x: $T) -> Result<Self::Output, Trap> {
                    Ok(x.floor())
                }
            }

            impl UnOp<$T> for Trunc {
                type Output = $T;

                fn un_op(x: $T) -> Result<Self::Output, Trap> {
                    Ok(x.trunc())
                }
            }

            impl UnOp<$T> for Nearest {
                type Output = $T;

                fn un_op(x: $T) -> Result<Self::Output, Trap> {
                    Ok(x.round_ties_even())
                }
            }

            impl UnOp<$T> for Sqrt {
                type Output = $T;

                fn un_op(x: $T) -> Result<Self::Output, Trap> {
                    Ok(x.sqrt())
                }
            }

            impl BinOp<$T> for Add {
                type Output = $T;

                fn bin_op(x0: $T, x1: $T) -> Result<Self::Output, Trap> {
                    Ok(x0 + x1)
                }
            }

            impl BinOp<$T> for Sub {
                type Output = $T;

                fn bin_op(x0: $T, x1: $T) -> Result<Self::Output, Trap> {
                    Ok(x0 - x1)
                }
            }

            impl BinOp<$T> for Mul {
                type Output = $T;

                fn bin_op(x0: $T, x1: $T) -> Result<Self::Output, Trap> {
                    Ok(x0 * x1)
                }
            }

            impl BinOp<$T> for Div {
                type Output = $T;

                fn bin_op(x0: $T, x1: $T) -> Result<Self::Output, Trap> {
                    Ok(x0 / x1)
                }
            }

            // NaN propagates, and -0.0 is less than +0.0.
            impl BinOp<$T> for Min {
                type Output = $T;

                fn bin_op(x0: $T, x1: $T) -> Result<Self::Output, Trap> {
                    if x0 < x1 {
                        Ok(x0)
                    } else if x1 < x0 {
                        Ok(x1)
                    } else if x0 == x1 {
                        Ok(if x0.is_sign_negative() { x0 } else { x1 })
                    } else {
                        Ok(x0 + x1)
                    }
                }
            }

            impl BinOp<$T> for Max {
                type Output = $T;

                fn bin_op(x0: $T, x1: $T) -> Result<Self::Output, Trap> {
                    if x0 > x1 {
                        Ok(x0)
                    } else if x1 > x0 {
                        Ok(x1)
                    } else if x0 == x1 {
                        Ok(if x0.is_sign_positive() { x0 } else { x1 })
                    } else {
                        Ok(x0 + x1)
                    }
                }
            }

            // The pseudo-minimum of SIMD: `x1 < x0 ? x1 : x0`.
            impl BinOp<$T> for PMin {
                type Output = $T;

                fn bin_op(x0: $T, x1: $T) -> Result<Self::Output, Trap> {
                    Ok(if x1 < x0 { x1 } else { x0 })
                }
            }

            impl BinOp<$T> for PMax {
                type Output = $T;

                fn bin_op(x0: $T, x1: $T) -> Result<Self::Output, Trap> {
                    Ok(if x0 < x1 { x1 } else { x0 })
                }
            }

            impl BinOp<$T> for Copysign {
                type Output = $T;

                fn bin_op(x0: $T, x1: $T) -> Result<Self::Output, Trap> {
                    Ok(x0.copysign(x1))
                }
            }
        )*
    }
}

impl_float_ops! { f32 f64 }

macro_rules! impl_wrap_to {
    ($($Src:ty => $Dst:ty)*) => {
        $(
            impl UnOp<$Src> for WrapTo<$Dst> {
                type Output = $Dst;

                fn un_op(x: $Src) -> Result<Self::Output, Trap> {
                    Ok(x as Self::Output)
                }
            }
        )*
    };
}

impl_wrap_to! {
    i64 => i32
}

macro_rules! impl_extend_to {
    ($($Src:ty => $Dst:ty)*) => {
        $(
            impl UnOp<$Src> for ExtendTo<$Dst> {
                type Output = $Dst;

                fn un_op(x: $Src) -> Result<Self::Output, Trap> {
                    Ok(x as Self::Output)
                }
            }
        )*
    };
}

impl_extend_to! {
    i32 => i64
    u32 => u64
}

// The bounds are the largest floats that truncate out of range, exclusive on both ends.
macro_rules! impl_trunc_to {
    ($($Src:ty => $Dst:ty: ($MIN:literal, $MAX:literal))*) => {
        $(
            impl UnOp<$Src> for TruncTo<$Dst> {
                type Output = $Dst;

                fn un_op(x: $Src) -> Result<Self::Output, Trap> {
                    if x.is_nan() {
                        return Err(Trap::InvalidConversionToInteger);
                    }
                    if x <= $MIN || x >= $MAX {
                        return Err(Trap::IntegerOverflow);
                    }
                    Ok(x as Self::Output)
                }
            }

            impl UnOp<$Src> for TruncSatTo<$Dst> {
                type Output = $Dst;

                fn un_op(x: $Src) -> Result<Self::Output, Trap> {
                    // `as` saturates and maps NaN to zero.
                    Ok(x as Self::Output)
                }
            }
        )*
    };
}

impl_trunc_to! {
    f32 => i32: (-2147483904f32, 2147483648f32)
    f32 => u32: (-1f32, 4294967296f32)
    f64 => i32: (-2147483649f64, 2147483648f64)
    f64 => u32: (-1f64, 4294967296f64)
    f32 => i64: (-9223373136366403584f32, 9223372036854775808f32)
    f32 => u64: (-1f32, 18446744073709551616f32)
    f64 => i64: (-9223372036854777856f64, 9223372036854775808f64)
    f64 => u64: (-1f64, 18446744073709551616f64)
}

macro_rules! impl_convert_to {
    ($($Src:ty => $Dst:ty)*) => {
        $(
            impl UnOp<$Src> for ConvertTo<$Dst> {
                type Output = $Dst;

                fn un_op(x: $Src) -> Result<Self::Output, Trap> {
                    Ok(x as Self::Output)
                }
            }
        )*
    };
}

impl_convert_to! {
    i32 => f32
    u32 => f32
    i64 => f32
    u64 => f32
    i32 => f64
    u32 => f64
    i64 => f64
    u64 => f64
}

impl UnOp<f64> for DemoteTo<f32> {
    type Output = f32;

    fn un_op(x: f64) -> Result<Self::Output, Trap> {
        Ok(x as f32)
    }
}

impl UnOp<f32> for PromoteTo<f64> {
    type Output = f64;

    fn un_op(x: f32) -> Result<Self::Output, Trap> {
        Ok(x as f64)
    }
}

macro_rules! impl_reinterpret_to {
    ($($Src:ty => $Dst:ty: $f:expr)*) => {
        $(
            impl UnOp<$Src> for ReinterpretTo<$Dst> {
                type Output = $Dst;

                fn un_op(x: $Src) -> Result<Self::Output, Trap> {
                    Ok($f(x))
                }
            }
        )*
    };
}

impl_reinterpret_to! {
    f32 => i32: |x: f32| x.to_bits() as i32
    f64 => i64: |x: f64| x.to_bits() as i64
    i32 => f32: |x: i32| f32::from_bits(x as u32)
    i64 => f64: |x: i64| f64::from_bits(x as u64)
}

macro_rules! impl_extend_from {
    ($($Src:ty => $Dst:ty)*) => {
        $(
            impl UnOp<$Dst> for ExtendFrom<$Src> {
                type Output = $Dst;

                fn un_op(x: $Dst) -> Result<Self::Output, Trap> {
                    Ok(x as $Src as Self::Output)
                }
            }
        )*
    };
}

impl_extend_from! {
    i8 => i32
    i16 => i32
    i8 => i64
    i16 => i64
    i32 => i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_division_traps() {
        assert_eq!(<Div as BinOp<i32>>::bin_op(1, 0), Err(Trap::IntegerDivideByZero));
        assert_eq!(<Div as BinOp<i32>>::bin_op(i32::MIN, -1), Err(Trap::IntegerOverflow));
        assert_eq!(<Rem as BinOp<i32>>::bin_op(i32::MIN, -1), Ok(0));
        assert_eq!(<Div as BinOp<u32>>::bin_op(7, 2), Ok(3));
    }

    #[test]
    fn lane_abs_wraps_at_the_minimum() {
        assert_eq!(<Abs as UnOp<i8>>::un_op(i8::MIN), Ok(i8::MIN));
        assert_eq!(<Abs as UnOp<i8>>::un_op(-5), Ok(5));
        assert_eq!(<Abs as UnOp<i64>>::un_op(i64::MIN + 1), Ok(i64::MAX));
    }

    #[test]
    fn float_min_max_follow_wasm_rules() {
        assert!(<Min as BinOp<f32>>::bin_op(f32::NAN, 1.0).unwrap().is_nan());
        assert!(<Min as BinOp<f64>>::bin_op(0.0, -0.0).unwrap().is_sign_negative());
        assert!(<Max as BinOp<f64>>::bin_op(-0.0, 0.0).unwrap().is_sign_positive());
        assert_eq!(<Nearest as UnOp<f32>>::un_op(2.5), Ok(2.0));
        assert_eq!(<Nearest as UnOp<f32>>::un_op(-3.5), Ok(-4.0));
    }

    #[test]
    fn truncation_bounds() {
        assert_eq!(<TruncTo<i32> as UnOp<f32>>::un_op(-2147483648.0), Ok(i32::MIN));
        assert_eq!(<TruncTo<i32> as UnOp<f32>>::un_op(2147483648.0), Err(Trap::IntegerOverflow));
        assert_eq!(
            <TruncTo<u32> as UnOp<f64>>::un_op(f64::NAN),
            Err(Trap::InvalidConversionToInteger)
        );
        assert_eq!(<TruncTo<u32> as UnOp<f64>>::un_op(-0.9), Ok(0));
        assert_eq!(<TruncSatTo<u64> as UnOp<f32>>::un_op(-5.0), Ok(0));
        assert_eq!(<TruncSatTo<i64> as UnOp<f64>>::un_op(f64::INFINITY), Ok(i64::MAX));
    }

    #[test]
    fn shifts_and_rotates_wrap_their_count() {
        assert_eq!(<Shl as BinOp<i32>>::bin_op(1, 33), Ok(2));
        assert_eq!(<Shr as BinOp<u32>>::bin_op(0x8000_0000, 31), Ok(1));
        assert_eq!(<Rotl as BinOp<u64>>::bin_op(1, 65), Ok(2));
    }
}
