use {
    crate::{
        decode::{Decode, Decoder, ParseError},
        store::{ExternAddr, FuncAddr},
    },
    std::fmt,
};

/// The type of a [`Val`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ValType {
    I32,
    I64,
    F32,
    F64,
    V128,
    FuncRef,
    ExternRef,
}

/// The kind of a [`ValType`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ValTypeKind {
    Num,
    Vec,
    Ref,
}

impl ValType {
    pub fn kind(self) -> ValTypeKind {
        match self {
            Self::I32 | Self::I64 | Self::F32 | Self::F64 => ValTypeKind::Num,
            Self::V128 => ValTypeKind::Vec,
            Self::FuncRef | Self::ExternRef => ValTypeKind::Ref,
        }
    }

    /// Returns `true` if this is a numeric type.
    pub fn is_num(self) -> bool {
        self.kind() == ValTypeKind::Num
    }

    /// Returns `true` if this is a vector type.
    pub fn is_vec(self) -> bool {
        self.kind() == ValTypeKind::Vec
    }

    /// Returns `true` if this is a reference type.
    pub fn is_ref(self) -> bool {
        self.kind() == ValTypeKind::Ref
    }

    /// Returns the [`RefType`] for this type, if it is a reference type.
    pub fn to_ref(self) -> Option<RefType> {
        match self {
            Self::FuncRef => Some(RefType::FuncRef),
            Self::ExternRef => Some(RefType::ExternRef),
            _ => None,
        }
    }

    /// Returns the zero value of this type. References default to null.
    pub fn default_val(self) -> Val {
        match self {
            Self::I32 => Val::I32(0),
            Self::I64 => Val::I64(0),
            Self::F32 => Val::F32(0.0),
            Self::F64 => Val::F64(0.0),
            Self::V128 => Val::V128(0),
            Self::FuncRef => Val::FuncRef(None),
            Self::ExternRef => Val::ExternRef(None),
        }
    }

    pub(crate) fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x7F => Some(Self::I32),
            0x7E => Some(Self::I64),
            0x7D => Some(Self::F32),
            0x7C => Some(Self::F64),
            0x7B => Some(Self::V128),
            0x70 => Some(Self::FuncRef),
            0x6F => Some(Self::ExternRef),
            _ => None,
        }
    }
}

impl Decode for ValType {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self, ParseError> {
        Self::from_byte(decoder.read_byte()?).ok_or(ParseError::InvalidType)
    }
}

impl From<RefType> for ValType {
    fn from(type_: RefType) -> Self {
        match type_ {
            RefType::FuncRef => Self::FuncRef,
            RefType::ExternRef => Self::ExternRef,
        }
    }
}

impl fmt::Display for ValType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::V128 => "v128",
            Self::FuncRef => "funcref",
            Self::ExternRef => "externref",
        })
    }
}

/// The type of a [`Ref`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum RefType {
    FuncRef,
    ExternRef,
}

impl Decode for RefType {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self, ParseError> {
        match decoder.read_byte()? {
            0x70 => Ok(Self::FuncRef),
            0x6F => Ok(Self::ExternRef),
            _ => Err(ParseError::InvalidType),
        }
    }
}

impl fmt::Display for RefType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        ValType::from(*self).fmt(f)
    }
}

/// A Wasm value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Val {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    V128(u128),
    FuncRef(Option<FuncAddr>),
    ExternRef(Option<ExternAddr>),
}

impl Val {
    /// Returns the [`ValType`] of this [`Val`].
    pub fn type_(self) -> ValType {
        match self {
            Self::I32(_) => ValType::I32,
            Self::I64(_) => ValType::I64,
            Self::F32(_) => ValType::F32,
            Self::F64(_) => ValType::F64,
            Self::V128(_) => ValType::V128,
            Self::FuncRef(_) => ValType::FuncRef,
            Self::ExternRef(_) => ValType::ExternRef,
        }
    }

    pub fn to_i32(self) -> Option<i32> {
        match self {
            Self::I32(val) => Some(val),
            _ => None,
        }
    }

    pub fn to_i64(self) -> Option<i64> {
        match self {
            Self::I64(val) => Some(val),
            _ => None,
        }
    }

    pub fn to_f32(self) -> Option<f32> {
        match self {
            Self::F32(val) => Some(val),
            _ => None,
        }
    }

    pub fn to_f64(self) -> Option<f64> {
        match self {
            Self::F64(val) => Some(val),
            _ => None,
        }
    }

    pub fn to_v128(self) -> Option<u128> {
        match self {
            Self::V128(val) => Some(val),
            _ => None,
        }
    }

    pub fn to_ref(self) -> Option<Ref> {
        match self {
            Self::FuncRef(addr) => Some(Ref::Func(addr)),
            Self::ExternRef(addr) => Some(Ref::Extern(addr)),
            _ => None,
        }
    }

    /// Returns `true` if both values have the same type and the same bit pattern.
    ///
    /// Unlike `==`, this distinguishes NaN payloads and treats identical NaNs as equal.
    pub fn bitwise_eq(self, other: Val) -> bool {
        self.type_() == other.type_() && self.to_value() == other.to_value()
    }

    pub(crate) fn to_value(self) -> Value {
        match self {
            Self::I32(val) => Value::from(val),
            Self::I64(val) => Value::from(val),
            Self::F32(val) => Value::from(val),
            Self::F64(val) => Value::from(val),
            Self::V128(val) => Value::from(val),
            Self::FuncRef(addr) => Value::from(addr),
            Self::ExternRef(addr) => Value::from(addr),
        }
    }

    pub(crate) fn from_value(type_: ValType, value: Value) -> Self {
        match type_ {
            ValType::I32 => Self::I32(value.into()),
            ValType::I64 => Self::I64(value.into()),
            ValType::F32 => Self::F32(value.into()),
            ValType::F64 => Self::F64(value.into()),
            ValType::V128 => Self::V128(value.into()),
            ValType::FuncRef => Self::FuncRef(value.into()),
            ValType::ExternRef => Self::ExternRef(value.into()),
        }
    }
}

impl From<Ref> for Val {
    fn from(ref_: Ref) -> Self {
        match ref_ {
            Ref::Func(addr) => Self::FuncRef(addr),
            Ref::Extern(addr) => Self::ExternRef(addr),
        }
    }
}

impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I32(val) => write!(f, "i32.const {}", val),
            Self::I64(val) => write!(f, "i64.const {}", val),
            Self::F32(val) => write!(f, "f32.const {}", val),
            Self::F64(val) => write!(f, "f64.const {}", val),
            Self::V128(val) => write!(f, "v128.const i32x4 {:#010x} {:#010x} {:#010x} {:#010x}",
                *val as u32,
                (*val >> 32) as u32,
                (*val >> 64) as u32,
                (*val >> 96) as u32,
            ),
            Self::FuncRef(None) => write!(f, "ref.null func"),
            Self::FuncRef(Some(addr)) => write!(f, "ref.func {}", addr),
            Self::ExternRef(None) => write!(f, "ref.null extern"),
            Self::ExternRef(Some(addr)) => write!(f, "ref.extern {}", addr),
        }
    }
}

/// A reference to a function or to a host object.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Ref {
    Func(Option<FuncAddr>),
    Extern(Option<ExternAddr>),
}

impl Ref {
    /// Returns a null [`Ref`] of the given [`RefType`].
    pub fn null(type_: RefType) -> Self {
        match type_ {
            RefType::FuncRef => Self::Func(None),
            RefType::ExternRef => Self::Extern(None),
        }
    }

    /// Returns the [`RefType`] of this [`Ref`].
    pub fn type_(self) -> RefType {
        match self {
            Self::Func(_) => RefType::FuncRef,
            Self::Extern(_) => RefType::ExternRef,
        }
    }

    pub fn is_null(self) -> bool {
        matches!(self, Self::Func(None) | Self::Extern(None))
    }

    pub(crate) fn to_value(self) -> Value {
        Val::from(self).to_value()
    }

    pub(crate) fn from_value(type_: RefType, value: Value) -> Self {
        match type_ {
            RefType::FuncRef => Self::Func(value.into()),
            RefType::ExternRef => Self::Extern(value.into()),
        }
    }
}

/// An untyped operand cell, wide enough for any [`Val`].
///
/// Validation guarantees the type of every cell statically, so the interpreter stores raw
/// bits and converts at the edges.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[repr(transparent)]
pub(crate) struct Value(pub(crate) u128);

macro_rules! impl_value_conversions {
    ($($T:ty => |$val:ident| $to_value:expr, |$bits:ident| $from_value:expr;)*) => {
        $(
            impl From<$T> for Value {
                #[inline(always)]
                fn from($val: $T) -> Self {
                    Self($to_value)
                }
            }

            impl From<Value> for $T {
                #[inline(always)]
                fn from(value: Value) -> Self {
                    let $bits = value.0;
                    $from_value
                }
            }
        )*
    };
}

impl_value_conversions! {
    i32 => |val| val as u32 as u128, |bits| bits as u32 as i32;
    u32 => |val| val as u128, |bits| bits as u32;
    i64 => |val| val as u64 as u128, |bits| bits as u64 as i64;
    u64 => |val| val as u128, |bits| bits as u64;
    f32 => |val| val.to_bits() as u128, |bits| f32::from_bits(bits as u32);
    f64 => |val| val.to_bits() as u128, |bits| f64::from_bits(bits as u64);
    u128 => |val| val, |bits| bits;
    Option<FuncAddr> => |val| val.map_or(0, |addr| addr.to_u32() as u128 + 1),
        |bits| (bits as u64).checked_sub(1).map(|addr| FuncAddr::new(addr as u32));
    Option<ExternAddr> => |val| val.map_or(0, |addr| addr.to_u32() as u128 + 1),
        |bits| (bits as u64).checked_sub(1).map(|addr| ExternAddr::new(addr as u32));
}

impl From<bool> for Value {
    #[inline(always)]
    fn from(val: bool) -> Self {
        Self(val as u128)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_and_non_null_references_are_distinct() {
        let null = Value::from(None::<FuncAddr>);
        let first = Value::from(Some(FuncAddr::new(0)));
        assert_ne!(null, first);
        assert_eq!(Option::<FuncAddr>::from(null), None);
        assert_eq!(Option::<FuncAddr>::from(first), Some(FuncAddr::new(0)));
    }

    #[test]
    fn nan_payloads_survive_the_value_cell() {
        let nan = f32::from_bits(0x7FA0_0001);
        assert_eq!(f32::from(Value::from(nan)).to_bits(), 0x7FA0_0001);
        assert!(Val::F32(nan).bitwise_eq(Val::F32(nan)));
        assert!(!Val::F32(nan).bitwise_eq(Val::F32(f32::from_bits(0x7FC0_0000))));
    }
}
