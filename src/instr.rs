//! Instructions, their immediates, and the opcode table.
//!
//! Every opcode is listed once in the table below, together with its binary encoding, its text
//! name, the shape of its immediate, and, for instructions with a fixed stack effect, its
//! signature. Decoding, validation and the compiler are all driven from this table.

use {
    crate::{
        compile::{stack_effect, try_compile_instructions, CompiledInstructions},
        decode::{Decode, Decoder, ParseError},
        index::{DataIdx, ElemIdx, FuncIdx, GlobalIdx, LabelIdx, LocalIdx, MemIdx, TableIdx, TagIdx, TypeIdx},
        val::{RefType, ValType},
    },
    std::{fmt, sync::OnceLock},
};

/// The shape of the immediate an opcode carries.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub(crate) enum Imm {
    Empty,
    Block,
    TryTable,
    Label,
    BrTable,
    Func,
    CallIndirect,
    Local,
    Global,
    Table,
    TableInit,
    TableCopy,
    Elem,
    Data,
    Tag,
    MemArg,
    Mem,
    MemCopy,
    MemInit,
    I32,
    I64,
    F32,
    F64,
    V128,
    RefType,
    Select,
    Lane,
    MemLane,
    Shuffle,
    LocalPair,
    LocalConst,
    LocalMemArg,
}

/// The fixed stack effect of an instruction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct Signature {
    pub(crate) params: &'static [ValType],
    pub(crate) results: &'static [ValType],
}

macro_rules! signature {
    (special) => {
        None
    };
    (($($param:ident)* -> $($result:ident)*)) => {
        Some(Signature {
            params: &[$(ValType::$param),*],
            results: &[$(ValType::$result),*],
        })
    };
}

macro_rules! define_opcodes {
    ($($Name:ident = ($prefix:literal, $code:literal), $text:literal, $imm:ident, $sig:tt;)*) => {
        /// An instruction opcode.
        ///
        /// Opcodes in the `0xFC` and `0xFD` spaces are reached through a prefix byte followed by
        /// a LEB128 encoded secondary opcode. Opcodes with the reserved prefix `0xFF` are
        /// synthetic: they never occur in a binary and are only produced by the compiler.
        #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
        #[repr(u16)]
        pub enum Opcode {
            $($Name,)*
        }

        impl Opcode {
            pub(crate) const ALL: &'static [Opcode] = &[$(Opcode::$Name,)*];

            /// Returns the opcode with the given encoding. A prefix of 0 means no prefix.
            pub fn from_encoding(prefix: u8, code: u32) -> Option<Self> {
                match (prefix, code) {
                    $(($prefix, $code) => Some(Self::$Name),)*
                    _ => None,
                }
            }

            /// Returns the prefix byte (0 for none) and the opcode.
            pub fn encoding(self) -> (u8, u32) {
                match self {
                    $(Self::$Name => ($prefix, $code),)*
                }
            }

            /// Returns the text format name of this opcode.
            pub fn name(self) -> &'static str {
                match self {
                    $(Self::$Name => $text,)*
                }
            }

            pub(crate) fn imm(self) -> Imm {
                match self {
                    $(Self::$Name => Imm::$imm,)*
                }
            }

            /// Returns the stack effect of this opcode, if it does not depend on the context.
            pub(crate) fn signature(self) -> Option<Signature> {
                match self {
                    $(Self::$Name => signature!($sig),)*
                }
            }
        }
    };
}

define_opcodes! {
    Unreachable = (0x00, 0x00), "unreachable", Empty, special;
    Nop = (0x00, 0x01), "nop", Empty, ( -> );
    Block = (0x00, 0x02), "block", Block, special;
    Loop = (0x00, 0x03), "loop", Block, special;
    If = (0x00, 0x04), "if", Block, special;
    Else = (0x00, 0x05), "else", Empty, special;
    Throw = (0x00, 0x08), "throw", Tag, special;
    End = (0x00, 0x0B), "end", Empty, special;
    Br = (0x00, 0x0C), "br", Label, special;
    BrIf = (0x00, 0x0D), "br_if", Label, special;
    BrTable = (0x00, 0x0E), "br_table", BrTable, special;
    Return = (0x00, 0x0F), "return", Empty, special;
    Call = (0x00, 0x10), "call", Func, special;
    CallIndirect = (0x00, 0x11), "call_indirect", CallIndirect, special;
    Drop = (0x00, 0x1A), "drop", Empty, special;
    Select = (0x00, 0x1B), "select", Empty, special;
    SelectTyped = (0x00, 0x1C), "select", Select, special;
    TryTable = (0x00, 0x1F), "try_table", TryTable, special;
    LocalGet = (0x00, 0x20), "local.get", Local, special;
    LocalSet = (0x00, 0x21), "local.set", Local, special;
    LocalTee = (0x00, 0x22), "local.tee", Local, special;
    GlobalGet = (0x00, 0x23), "global.get", Global, special;
    GlobalSet = (0x00, 0x24), "global.set", Global, special;
    TableGet = (0x00, 0x25), "table.get", Table, special;
    TableSet = (0x00, 0x26), "table.set", Table, special;
    I32Load = (0x00, 0x28), "i32.load", MemArg, (I32 -> I32);
    I64Load = (0x00, 0x29), "i64.load", MemArg, (I32 -> I64);
    F32Load = (0x00, 0x2A), "f32.load", MemArg, (I32 -> F32);
    F64Load = (0x00, 0x2B), "f64.load", MemArg, (I32 -> F64);
    I32Load8S = (0x00, 0x2C), "i32.load8_s", MemArg, (I32 -> I32);
    I32Load8U = (0x00, 0x2D), "i32.load8_u", MemArg, (I32 -> I32);
    I32Load16S = (0x00, 0x2E), "i32.load16_s", MemArg, (I32 -> I32);
    I32Load16U = (0x00, 0x2F), "i32.load16_u", MemArg, (I32 -> I32);
    I64Load8S = (0x00, 0x30), "i64.load8_s", MemArg, (I32 -> I64);
    I64Load8U = (0x00, 0x31), "i64.load8_u", MemArg, (I32 -> I64);
    I64Load16S = (0x00, 0x32), "i64.load16_s", MemArg, (I32 -> I64);
    I64Load16U = (0x00, 0x33), "i64.load16_u", MemArg, (I32 -> I64);
    I64Load32S = (0x00, 0x34), "i64.load32_s", MemArg, (I32 -> I64);
    I64Load32U = (0x00, 0x35), "i64.load32_u", MemArg, (I32 -> I64);
    I32Store = (0x00, 0x36), "i32.store", MemArg, (I32 I32 -> );
    I64Store = (0x00, 0x37), "i64.store", MemArg, (I32 I64 -> );
    F32Store = (0x00, 0x38), "f32.store", MemArg, (I32 F32 -> );
    F64Store = (0x00, 0x39), "f64.store", MemArg, (I32 F64 -> );
    I32Store8 = (0x00, 0x3A), "i32.store8", MemArg, (I32 I32 -> );
    I32Store16 = (0x00, 0x3B), "i32.store16", MemArg, (I32 I32 -> );
    I64Store8 = (0x00, 0x3C), "i64.store8", MemArg, (I32 I64 -> );
    I64Store16 = (0x00, 0x3D), "i64.store16", MemArg, (I32 I64 -> );
    I64Store32 = (0x00, 0x3E), "i64.store32", MemArg, (I32 I64 -> );
    MemorySize = (0x00, 0x3F), "memory.size", Mem, ( -> I32);
    MemoryGrow = (0x00, 0x40), "memory.grow", Mem, (I32 -> I32);
    I32Const = (0x00, 0x41), "i32.const", I32, ( -> I32);
    I64Const = (0x00, 0x42), "i64.const", I64, ( -> I64);
    F32Const = (0x00, 0x43), "f32.const", F32, ( -> F32);
    F64Const = (0x00, 0x44), "f64.const", F64, ( -> F64);
    I32Eqz = (0x00, 0x45), "i32.eqz", Empty, (I32 -> I32);
    I32Eq = (0x00, 0x46), "i32.eq", Empty, (I32 I32 -> I32);
    I32Ne = (0x00, 0x47), "i32.ne", Empty, (I32 I32 -> I32);
    I32LtS = (0x00, 0x48), "i32.lt_s", Empty, (I32 I32 -> I32);
    I32LtU = (0x00, 0x49), "i32.lt_u", Empty, (I32 I32 -> I32);
    I32GtS = (0x00, 0x4A), "i32.gt_s", Empty, (I32 I32 -> I32);
    I32GtU = (0x00, 0x4B), "i32.gt_u", Empty, (I32 I32 -> I32);
    I32LeS = (0x00, 0x4C), "i32.le_s", Empty, (I32 I32 -> I32);
    I32LeU = (0x00, 0x4D), "i32.le_u", Empty, (I32 I32 -> I32);
    I32GeS = (0x00, 0x4E), "i32.ge_s", Empty, (I32 I32 -> I32);
    I32GeU = (0x00, 0x4F), "i32.ge_u", Empty, (I32 I32 -> I32);
    I64Eqz = (0x00, 0x50), "i64.eqz", Empty, (I64 -> I32);
    I64Eq = (0x00, 0x51), "i64.eq", Empty, (I64 I64 -> I32);
    I64Ne = (0x00, 0x52), "i64.ne", Empty, (I64 I64 -> I32);
    I64LtS = (0x00, 0x53), "i64.lt_s", Empty, (I64 I64 -> I32);
    I64LtU = (0x00, 0x54), "i64.lt_u", Empty, (I64 I64 -> I32);
    I64GtS = (0x00, 0x55), "i64.gt_s", Empty, (I64 I64 -> I32);
    I64GtU = (0x00, 0x56), "i64.gt_u", Empty, (I64 I64 -> I32);
    I64LeS = (0x00, 0x57), "i64.le_s", Empty, (I64 I64 -> I32);
    I64LeU = (0x00, 0x58), "i64.le_u", Empty, (I64 I64 -> I32);
    I64GeS = (0x00, 0x59), "i64.ge_s", Empty, (I64 I64 -> I32);
    I64GeU = (0x00, 0x5A), "i64.ge_u", Empty, (I64 I64 -> I32);
    F32Eq = (0x00, 0x5B), "f32.eq", Empty, (F32 F32 -> I32);
    F32Ne = (0x00, 0x5C), "f32.ne", Empty, (F32 F32 -> I32);
    F32Lt = (0x00, 0x5D), "f32.lt", Empty, (F32 F32 -> I32);
    F32Gt = (0x00, 0x5E), "f32.gt", Empty, (F32 F32 -> I32);
    F32Le = (0x00, 0x5F), "f32.le", Empty, (F32 F32 -> I32);
    F32Ge = (0x00, 0x60), "f32.ge", Empty, (F32 F32 -> I32);
    F64Eq = (0x00, 0x61), "f64.eq", Empty, (F64 F64 -> I32);
    F64Ne = (0x00, 0x62), "f64.ne", Empty, (F64 F64 -> I32);
    F64Lt = (0x00, 0x63), "f64.lt", Empty, (F64 F64 -> I32);
    F64Gt = (0x00, 0x64), "f64.gt", Empty, (F64 F64 -> I32);
    F64Le = (0x00, 0x65), "f64.le", Empty, (F64 F64 -> I32);
    F64Ge = (0x00, 0x66), "f64.ge", Empty, (F64 F64 -> I32);
    I32Clz = (0x00, 0x67), "i32.clz", Empty, (I32 -> I32);
    I32Ctz = (0x00, 0x68), "i32.ctz", Empty, (I32 -> I32);
    I32Popcnt = (0x00, 0x69), "i32.popcnt", Empty, (I32 -> I32);
    I32Add = (0x00, 0x6A), "i32.add", Empty, (I32 I32 -> I32);
    I32Sub = (0x00, 0x6B), "i32.sub", Empty, (I32 I32 -> I32);
    I32Mul = (0x00, 0x6C), "i32.mul", Empty, (I32 I32 -> I32);
    I32DivS = (0x00, 0x6D), "i32.div_s", Empty, (I32 I32 -> I32);
    I32DivU = (0x00, 0x6E), "i32.div_u", Empty, (I32 I32 -> I32);
    I32RemS = (0x00, 0x6F), "i32.rem_s", Empty, (I32 I32 -> I32);
    I32RemU = (0x00, 0x70), "i32.rem_u", Empty, (I32 I32 -> I32);
    I32And = (0x00, 0x71), "i32.and", Empty, (I32 I32 -> I32);
    I32Or = (0x00, 0x72), "i32.or", Empty, (I32 I32 -> I32);
    I32Xor = (0x00, 0x73), "i32.xor", Empty, (I32 I32 -> I32);
    I32Shl = (0x00, 0x74), "i32.shl", Empty, (I32 I32 -> I32);
    I32ShrS = (0x00, 0x75), "i32.shr_s", Empty, (I32 I32 -> I32);
    I32ShrU = (0x00, 0x76), "i32.shr_u", Empty, (I32 I32 -> I32);
    I32Rotl = (0x00, 0x77), "i32.rotl", Empty, (I32 I32 -> I32);
    I32Rotr = (0x00, 0x78), "i32.rotr", Empty, (I32 I32 -> I32);
    I64Clz = (0x00, 0x79), "i64.clz", Empty, (I64 -> I64);
    I64Ctz = (0x00, 0x7A), "i64.ctz", Empty, (I64 -> I64);
    I64Popcnt = (0x00, 0x7B), "i64.popcnt", Empty, (I64 -> I64);
    I64Add = (0x00, 0x7C), "i64.add", Empty, (I64 I64 -> I64);
    I64Sub = (0x00, 0x7D), "i64.sub", Empty, (I64 I64 -> I64);
    I64Mul = (0x00, 0x7E), "i64.mul", Empty, (I64 I64 -> I64);
    I64DivS = (0x00, 0x7F), "i64.div_s", Empty, (I64 I64 -> I64);
    I64DivU = (0x00, 0x80), "i64.div_u", Empty, (I64 I64 -> I64);
    I64RemS = (0x00, 0x81), "i64.rem_s", Empty, (I64 I64 -> I64);
    I64RemU = (0x00, 0x82), "i64.rem_u", Empty, (I64 I64 -> I64);
    I64And = (0x00, 0x83), "i64.and", Empty, (I64 I64 -> I64);
    I64Or = (0x00, 0x84), "i64.or", Empty, (I64 I64 -> I64);
    I64Xor = (0x00, 0x85), "i64.xor", Empty, (I64 I64 -> I64);
    I64Shl = (0x00, 0x86), "i64.shl", Empty, (I64 I64 -> I64);
    I64ShrS = (0x00, 0x87), "i64.shr_s", Empty, (I64 I64 -> I64);
    I64ShrU = (0x00, 0x88), "i64.shr_u", Empty, (I64 I64 -> I64);
    I64Rotl = (0x00, 0x89), "i64.rotl", Empty, (I64 I64 -> I64);
    I64Rotr = (0x00, 0x8A), "i64.rotr", Empty, (I64 I64 -> I64);
    F32Abs = (0x00, 0x8B), "f32.abs", Empty, (F32 -> F32);
    F32Neg = (0x00, 0x8C), "f32.neg", Empty, (F32 -> F32);
    F32Ceil = (0x00, 0x8D), "f32.ceil", Empty, (F32 -> F32);
    F32Floor = (0x00, 0x8E), "f32.floor", Empty, (F32 -> F32);
    F32Trunc = (0x00, 0x8F), "f32.trunc", Empty, (F32 -> F32);
    F32Nearest = (0x00, 0x90), "f32.nearest", Empty, (F32 -> F32);
    F32Sqrt = (0x00, 0x91), "f32.sqrt", Empty, (F32 -> F32);
    F32Add = (0x00, 0x92), "f32.add", Empty, (F32 F32 -> F32);
    F32Sub = (0x00, 0x93), "f32.sub", Empty, (F32 F32 -> F32);
    F32Mul = (0x00, 0x94), "f32.mul", Empty, (F32 F32 -> F32);
    F32Div = (0x00, 0x95), "f32.div", Empty, (F32 F32 -> F32);
    F32Min = (0x00, 0x96), "f32.min", Empty, (F32 F32 -> F32);
    F32Max = (0x00, 0x97), "f32.max", Empty, (F32 F32 -> F32);
    F32Copysign = (0x00, 0x98), "f32.copysign", Empty, (F32 F32 -> F32);
    F64Abs = (0x00, 0x99), "f64.abs", Empty, (F64 -> F64);
    F64Neg = (0x00, 0x9A), "f64.neg", Empty, (F64 -> F64);
    F64Ceil = (0x00, 0x9B), "f64.ceil", Empty, (F64 -> F64);
    F64Floor = (0x00, 0x9C), "f64.floor", Empty, (F64 -> F64);
    F64Trunc = (0x00, 0x9D), "f64.trunc", Empty, (F64 -> F64);
    F64Nearest = (0x00, 0x9E), "f64.nearest", Empty, (F64 -> F64);
    F64Sqrt = (0x00, 0x9F), "f64.sqrt", Empty, (F64 -> F64);
    F64Add = (0x00, 0xA0), "f64.add", Empty, (F64 F64 -> F64);
    F64Sub = (0x00, 0xA1), "f64.sub", Empty, (F64 F64 -> F64);
    F64Mul = (0x00, 0xA2), "f64.mul", Empty, (F64 F64 -> F64);
    F64Div = (0x00, 0xA3), "f64.div", Empty, (F64 F64 -> F64);
    F64Min = (0x00, 0xA4), "f64.min", Empty, (F64 F64 -> F64);
    F64Max = (0x00, 0xA5), "f64.max", Empty, (F64 F64 -> F64);
    F64Copysign = (0x00, 0xA6), "f64.copysign", Empty, (F64 F64 -> F64);
    I32WrapI64 = (0x00, 0xA7), "i32.wrap_i64", Empty, (I64 -> I32);
    I32TruncF32S = (0x00, 0xA8), "i32.trunc_f32_s", Empty, (F32 -> I32);
    I32TruncF32U = (0x00, 0xA9), "i32.trunc_f32_u", Empty, (F32 -> I32);
    I32TruncF64S = (0x00, 0xAA), "i32.trunc_f64_s", Empty, (F64 -> I32);
    I32TruncF64U = (0x00, 0xAB), "i32.trunc_f64_u", Empty, (F64 -> I32);
    I64ExtendI32S = (0x00, 0xAC), "i64.extend_i32_s", Empty, (I32 -> I64);
    I64ExtendI32U = (0x00, 0xAD), "i64.extend_i32_u", Empty, (I32 -> I64);
    I64TruncF32S = (0x00, 0xAE), "i64.trunc_f32_s", Empty, (F32 -> I64);
    I64TruncF32U = (0x00, 0xAF), "i64.trunc_f32_u", Empty, (F32 -> I64);
    I64TruncF64S = (0x00, 0xB0), "i64.trunc_f64_s", Empty, (F64 -> I64);
    I64TruncF64U = (0x00, 0xB1), "i64.trunc_f64_u", Empty, (F64 -> I64);
    F32ConvertI32S = (0x00, 0xB2), "f32.convert_i32_s", Empty, (I32 -> F32);
    F32ConvertI32U = (0x00, 0xB3), "f32.convert_i32_u", Empty, (I32 -> F32);
    F32ConvertI64S = (0x00, 0xB4), "f32.convert_i64_s", Empty, (I64 -> F32);
    F32ConvertI64U = (0x00, 0xB5), "f32.convert_i64_u", Empty, (I64 -> F32);
    F32DemoteF64 = (0x00, 0xB6), "f32.demote_f64", Empty, (F64 -> F32);
    F64ConvertI32S = (0x00, 0xB7), "f64.convert_i32_s", Empty, (I32 -> F64);
    F64ConvertI32U = (0x00, 0xB8), "f64.convert_i32_u", Empty, (I32 -> F64);
    F64ConvertI64S = (0x00, 0xB9), "f64.convert_i64_s", Empty, (I64 -> F64);
    F64ConvertI64U = (0x00, 0xBA), "f64.convert_i64_u", Empty, (I64 -> F64);
    F64PromoteF32 = (0x00, 0xBB), "f64.promote_f32", Empty, (F32 -> F64);
    I32ReinterpretF32 = (0x00, 0xBC), "i32.reinterpret_f32", Empty, (F32 -> I32);
    I64ReinterpretF64 = (0x00, 0xBD), "i64.reinterpret_f64", Empty, (F64 -> I64);
    F32ReinterpretI32 = (0x00, 0xBE), "f32.reinterpret_i32", Empty, (I32 -> F32);
    F64ReinterpretI64 = (0x00, 0xBF), "f64.reinterpret_i64", Empty, (I64 -> F64);
    I32Extend8S = (0x00, 0xC0), "i32.extend8_s", Empty, (I32 -> I32);
    I32Extend16S = (0x00, 0xC1), "i32.extend16_s", Empty, (I32 -> I32);
    I64Extend8S = (0x00, 0xC2), "i64.extend8_s", Empty, (I64 -> I64);
    I64Extend16S = (0x00, 0xC3), "i64.extend16_s", Empty, (I64 -> I64);
    I64Extend32S = (0x00, 0xC4), "i64.extend32_s", Empty, (I64 -> I64);
    RefNull = (0x00, 0xD0), "ref.null", RefType, special;
    RefIsNull = (0x00, 0xD1), "ref.is_null", Empty, special;
    RefFunc = (0x00, 0xD2), "ref.func", Func, special;

    I32TruncSatF32S = (0xFC, 0), "i32.trunc_sat_f32_s", Empty, (F32 -> I32);
    I32TruncSatF32U = (0xFC, 1), "i32.trunc_sat_f32_u", Empty, (F32 -> I32);
    I32TruncSatF64S = (0xFC, 2), "i32.trunc_sat_f64_s", Empty, (F64 -> I32);
    I32TruncSatF64U = (0xFC, 3), "i32.trunc_sat_f64_u", Empty, (F64 -> I32);
    I64TruncSatF32S = (0xFC, 4), "i64.trunc_sat_f32_s", Empty, (F32 -> I64);
    I64TruncSatF32U = (0xFC, 5), "i64.trunc_sat_f32_u", Empty, (F32 -> I64);
    I64TruncSatF64S = (0xFC, 6), "i64.trunc_sat_f64_s", Empty, (F64 -> I64);
    I64TruncSatF64U = (0xFC, 7), "i64.trunc_sat_f64_u", Empty, (F64 -> I64);
    MemoryInit = (0xFC, 8), "memory.init", MemInit, (I32 I32 I32 -> );
    DataDrop = (0xFC, 9), "data.drop", Data, ( -> );
    MemoryCopy = (0xFC, 10), "memory.copy", MemCopy, (I32 I32 I32 -> );
    MemoryFill = (0xFC, 11), "memory.fill", Mem, (I32 I32 I32 -> );
    TableInit = (0xFC, 12), "table.init", TableInit, (I32 I32 I32 -> );
    ElemDrop = (0xFC, 13), "elem.drop", Elem, ( -> );
    TableCopy = (0xFC, 14), "table.copy", TableCopy, (I32 I32 I32 -> );
    TableGrow = (0xFC, 15), "table.grow", Table, special;
    TableSize = (0xFC, 16), "table.size", Table, ( -> I32);
    TableFill = (0xFC, 17), "table.fill", Table, special;

    V128Load = (0xFD, 0), "v128.load", MemArg, (I32 -> V128);
    V128Load8x8S = (0xFD, 1), "v128.load8x8_s", MemArg, (I32 -> V128);
    V128Load8x8U = (0xFD, 2), "v128.load8x8_u", MemArg, (I32 -> V128);
    V128Load16x4S = (0xFD, 3), "v128.load16x4_s", MemArg, (I32 -> V128);
    V128Load16x4U = (0xFD, 4), "v128.load16x4_u", MemArg, (I32 -> V128);
    V128Load32x2S = (0xFD, 5), "v128.load32x2_s", MemArg, (I32 -> V128);
    V128Load32x2U = (0xFD, 6), "v128.load32x2_u", MemArg, (I32 -> V128);
    V128Load8Splat = (0xFD, 7), "v128.load8_splat", MemArg, (I32 -> V128);
    V128Load16Splat = (0xFD, 8), "v128.load16_splat", MemArg, (I32 -> V128);
    V128Load32Splat = (0xFD, 9), "v128.load32_splat", MemArg, (I32 -> V128);
    V128Load64Splat = (0xFD, 10), "v128.load64_splat", MemArg, (I32 -> V128);
    V128Store = (0xFD, 11), "v128.store", MemArg, (I32 V128 -> );
    V128Const = (0xFD, 12), "v128.const", V128, ( -> V128);
    I8x16Shuffle = (0xFD, 13), "i8x16.shuffle", Shuffle, (V128 V128 -> V128);
    I8x16Swizzle = (0xFD, 14), "i8x16.swizzle", Empty, (V128 V128 -> V128);
    I8x16Splat = (0xFD, 15), "i8x16.splat", Empty, (I32 -> V128);
    I16x8Splat = (0xFD, 16), "i16x8.splat", Empty, (I32 -> V128);
    I32x4Splat = (0xFD, 17), "i32x4.splat", Empty, (I32 -> V128);
    I64x2Splat = (0xFD, 18), "i64x2.splat", Empty, (I64 -> V128);
    F32x4Splat = (0xFD, 19), "f32x4.splat", Empty, (F32 -> V128);
    F64x2Splat = (0xFD, 20), "f64x2.splat", Empty, (F64 -> V128);
    I8x16ExtractLaneS = (0xFD, 21), "i8x16.extract_lane_s", Lane, (V128 -> I32);
    I8x16ExtractLaneU = (0xFD, 22), "i8x16.extract_lane_u", Lane, (V128 -> I32);
    I8x16ReplaceLane = (0xFD, 23), "i8x16.replace_lane", Lane, (V128 I32 -> V128);
    I16x8ExtractLaneS = (0xFD, 24), "i16x8.extract_lane_s", Lane, (V128 -> I32);
    I16x8ExtractLaneU = (0xFD, 25), "i16x8.extract_lane_u", Lane, (V128 -> I32);
    I16x8ReplaceLane = (0xFD, 26), "i16x8.replace_lane", Lane, (V128 I32 -> V128);
    I32x4ExtractLane = (0xFD, 27), "i32x4.extract_lane", Lane, (V128 -> I32);
    I32x4ReplaceLane = (0xFD, 28), "i32x4.replace_lane", Lane, (V128 I32 -> V128);
    I64x2ExtractLane = (0xFD, 29), "i64x2.extract_lane", Lane, (V128 -> I64);
    I64x2ReplaceLane = (0xFD, 30), "i64x2.replace_lane", Lane, (V128 I64 -> V128);
    F32x4ExtractLane = (0xFD, 31), "f32x4.extract_lane", Lane, (V128 -> F32);
    F32x4ReplaceLane = (0xFD, 32), "f32x4.replace_lane", Lane, (V128 F32 -> V128);
    F64x2ExtractLane = (0xFD, 33), "f64x2.extract_lane", Lane, (V128 -> F64);
    F64x2ReplaceLane = (0xFD, 34), "f64x2.replace_lane", Lane, (V128 F64 -> V128);
    I8x16Eq = (0xFD, 35), "i8x16.eq", Empty, (V128 V128 -> V128);
    I8x16Ne = (0xFD, 36), "i8x16.ne", Empty, (V128 V128 -> V128);
    I8x16LtS = (0xFD, 37), "i8x16.lt_s", Empty, (V128 V128 -> V128);
    I8x16LtU = (0xFD, 38), "i8x16.lt_u", Empty, (V128 V128 -> V128);
    I8x16GtS = (0xFD, 39), "i8x16.gt_s", Empty, (V128 V128 -> V128);
    I8x16GtU = (0xFD, 40), "i8x16.gt_u", Empty, (V128 V128 -> V128);
    I8x16LeS = (0xFD, 41), "i8x16.le_s", Empty, (V128 V128 -> V128);
    I8x16LeU = (0xFD, 42), "i8x16.le_u", Empty, (V128 V128 -> V128);
    I8x16GeS = (0xFD, 43), "i8x16.ge_s", Empty, (V128 V128 -> V128);
    I8x16GeU = (0xFD, 44), "i8x16.ge_u", Empty, (V128 V128 -> V128);
    I16x8Eq = (0xFD, 45), "i16x8.eq", Empty, (V128 V128 -> V128);
    I16x8Ne = (0xFD, 46), "i16x8.ne", Empty, (V128 V128 -> V128);
    I16x8LtS = (0xFD, 47), "i16x8.lt_s", Empty, (V128 V128 -> V128);
    I16x8LtU = (0xFD, 48), "i16x8.lt_u", Empty, (V128 V128 -> V128);
    I16x8GtS = (0xFD, 49), "i16x8.gt_s", Empty, (V128 V128 -> V128);
    I16x8GtU = (0xFD, 50), "i16x8.gt_u", Empty, (V128 V128 -> V128);
    I16x8LeS = (0xFD, 51), "i16x8.le_s", Empty, (V128 V128 -> V128);
    I16x8LeU = (0xFD, 52), "i16x8.le_u", Empty, (V128 V128 -> V128);
    I16x8GeS = (0xFD, 53), "i16x8.ge_s", Empty, (V128 V128 -> V128);
    I16x8GeU = (0xFD, 54), "i16x8.ge_u", Empty, (V128 V128 -> V128);
    I32x4Eq = (0xFD, 55), "i32x4.eq", Empty, (V128 V128 -> V128);
    I32x4Ne = (0xFD, 56), "i32x4.ne", Empty, (V128 V128 -> V128);
    I32x4LtS = (0xFD, 57), "i32x4.lt_s", Empty, (V128 V128 -> V128);
    I32x4LtU = (0xFD, 58), "i32x4.lt_u", Empty, (V128 V128 -> V128);
    I32x4GtS = (0xFD, 59), "i32x4.gt_s", Empty, (V128 V128 -> V128);
    I32x4GtU = (0xFD, 60), "i32x4.gt_u", Empty, (V128 V128 -> V128);
    I32x4LeS = (0xFD, 61), "i32x4.le_s", Empty, (V128 V128 -> V128);
    I32x4LeU = (0xFD, 62), "i32x4.le_u", Empty, (V128 V128 -> V128);
    I32x4GeS = (0xFD, 63), "i32x4.ge_s", Empty, (V128 V128 -> V128);
    I32x4GeU = (0xFD, 64), "i32x4.ge_u", Empty, (V128 V128 -> V128);
    F32x4Eq = (0xFD, 65), "f32x4.eq", Empty, (V128 V128 -> V128);
    F32x4Ne = (0xFD, 66), "f32x4.ne", Empty, (V128 V128 -> V128);
    F32x4Lt = (0xFD, 67), "f32x4.lt", Empty, (V128 V128 -> V128);
    F32x4Gt = (0xFD, 68), "f32x4.gt", Empty, (V128 V128 -> V128);
    F32x4Le = (0xFD, 69), "f32x4.le", Empty, (V128 V128 -> V128);
    F32x4Ge = (0xFD, 70), "f32x4.ge", Empty, (V128 V128 -> V128);
    F64x2Eq = (0xFD, 71), "f64x2.eq", Empty, (V128 V128 -> V128);
    F64x2Ne = (0xFD, 72), "f64x2.ne", Empty, (V128 V128 -> V128);
    F64x2Lt = (0xFD, 73), "f64x2.lt", Empty, (V128 V128 -> V128);
    F64x2Gt = (0xFD, 74), "f64x2.gt", Empty, (V128 V128 -> V128);
    F64x2Le = (0xFD, 75), "f64x2.le", Empty, (V128 V128 -> V128);
    F64x2Ge = (0xFD, 76), "f64x2.ge", Empty, (V128 V128 -> V128);
    V128Not = (0xFD, 77), "v128.not", Empty, (V128 -> V128);
    V128And = (0xFD, 78), "v128.and", Empty, (V128 V128 -> V128);
    V128AndNot = (0xFD, 79), "v128.andnot", Empty, (V128 V128 -> V128);
    V128Or = (0xFD, 80), "v128.or", Empty, (V128 V128 -> V128);
    V128Xor = (0xFD, 81), "v128.xor", Empty, (V128 V128 -> V128);
    V128Bitselect = (0xFD, 82), "v128.bitselect", Empty, (V128 V128 V128 -> V128);
    V128AnyTrue = (0xFD, 83), "v128.any_true", Empty, (V128 -> I32);
    V128Load8Lane = (0xFD, 84), "v128.load8_lane", MemLane, (I32 V128 -> V128);
    V128Load16Lane = (0xFD, 85), "v128.load16_lane", MemLane, (I32 V128 -> V128);
    V128Load32Lane = (0xFD, 86), "v128.load32_lane", MemLane, (I32 V128 -> V128);
    V128Load64Lane = (0xFD, 87), "v128.load64_lane", MemLane, (I32 V128 -> V128);
    V128Store8Lane = (0xFD, 88), "v128.store8_lane", MemLane, (I32 V128 -> );
    V128Store16Lane = (0xFD, 89), "v128.store16_lane", MemLane, (I32 V128 -> );
    V128Store32Lane = (0xFD, 90), "v128.store32_lane", MemLane, (I32 V128 -> );
    V128Store64Lane = (0xFD, 91), "v128.store64_lane", MemLane, (I32 V128 -> );
    V128Load32Zero = (0xFD, 92), "v128.load32_zero", MemArg, (I32 -> V128);
    V128Load64Zero = (0xFD, 93), "v128.load64_zero", MemArg, (I32 -> V128);
    F32x4DemoteF64x2Zero = (0xFD, 94), "f32x4.demote_f64x2_zero", Empty, (V128 -> V128);
    F64x2PromoteLowF32x4 = (0xFD, 95), "f64x2.promote_low_f32x4", Empty, (V128 -> V128);
    I8x16Abs = (0xFD, 96), "i8x16.abs", Empty, (V128 -> V128);
    I8x16Neg = (0xFD, 97), "i8x16.neg", Empty, (V128 -> V128);
    I8x16Popcnt = (0xFD, 98), "i8x16.popcnt", Empty, (V128 -> V128);
    I8x16AllTrue = (0xFD, 99), "i8x16.all_true", Empty, (V128 -> I32);
    I8x16Bitmask = (0xFD, 100), "i8x16.bitmask", Empty, (V128 -> I32);
    I8x16NarrowI16x8S = (0xFD, 101), "i8x16.narrow_i16x8_s", Empty, (V128 V128 -> V128);
    I8x16NarrowI16x8U = (0xFD, 102), "i8x16.narrow_i16x8_u", Empty, (V128 V128 -> V128);
    F32x4Ceil = (0xFD, 103), "f32x4.ceil", Empty, (V128 -> V128);
    F32x4Floor = (0xFD, 104), "f32x4.floor", Empty, (V128 -> V128);
    F32x4Trunc = (0xFD, 105), "f32x4.trunc", Empty, (V128 -> V128);
    F32x4Nearest = (0xFD, 106), "f32x4.nearest", Empty, (V128 -> V128);
    I8x16Shl = (0xFD, 107), "i8x16.shl", Empty, (V128 I32 -> V128);
    I8x16ShrS = (0xFD, 108), "i8x16.shr_s", Empty, (V128 I32 -> V128);
    I8x16ShrU = (0xFD, 109), "i8x16.shr_u", Empty, (V128 I32 -> V128);
    I8x16Add = (0xFD, 110), "i8x16.add", Empty, (V128 V128 -> V128);
    I8x16AddSatS = (0xFD, 111), "i8x16.add_sat_s", Empty, (V128 V128 -> V128);
    I8x16AddSatU = (0xFD, 112), "i8x16.add_sat_u", Empty, (V128 V128 -> V128);
    I8x16Sub = (0xFD, 113), "i8x16.sub", Empty, (V128 V128 -> V128);
    I8x16SubSatS = (0xFD, 114), "i8x16.sub_sat_s", Empty, (V128 V128 -> V128);
    I8x16SubSatU = (0xFD, 115), "i8x16.sub_sat_u", Empty, (V128 V128 -> V128);
    F64x2Ceil = (0xFD, 116), "f64x2.ceil", Empty, (V128 -> V128);
    F64x2Floor = (0xFD, 117), "f64x2.floor", Empty, (V128 -> V128);
    I8x16MinS = (0xFD, 118), "i8x16.min_s", Empty, (V128 V128 -> V128);
    I8x16MinU = (0xFD, 119), "i8x16.min_u", Empty, (V128 V128 -> V128);
    I8x16MaxS = (0xFD, 120), "i8x16.max_s", Empty, (V128 V128 -> V128);
    I8x16MaxU = (0xFD, 121), "i8x16.max_u", Empty, (V128 V128 -> V128);
    F64x2Trunc = (0xFD, 122), "f64x2.trunc", Empty, (V128 -> V128);
    I8x16AvgrU = (0xFD, 123), "i8x16.avgr_u", Empty, (V128 V128 -> V128);
    I16x8ExtAddPairwiseI8x16S = (0xFD, 124), "i16x8.extadd_pairwise_i8x16_s", Empty, (V128 -> V128);
    I16x8ExtAddPairwiseI8x16U = (0xFD, 125), "i16x8.extadd_pairwise_i8x16_u", Empty, (V128 -> V128);
    I32x4ExtAddPairwiseI16x8S = (0xFD, 126), "i32x4.extadd_pairwise_i16x8_s", Empty, (V128 -> V128);
    I32x4ExtAddPairwiseI16x8U = (0xFD, 127), "i32x4.extadd_pairwise_i16x8_u", Empty, (V128 -> V128);
    I16x8Abs = (0xFD, 128), "i16x8.abs", Empty, (V128 -> V128);
    I16x8Neg = (0xFD, 129), "i16x8.neg", Empty, (V128 -> V128);
    I16x8Q15MulrSatS = (0xFD, 130), "i16x8.q15mulr_sat_s", Empty, (V128 V128 -> V128);
    I16x8AllTrue = (0xFD, 131), "i16x8.all_true", Empty, (V128 -> I32);
    I16x8Bitmask = (0xFD, 132), "i16x8.bitmask", Empty, (V128 -> I32);
    I16x8NarrowI32x4S = (0xFD, 133), "i16x8.narrow_i32x4_s", Empty, (V128 V128 -> V128);
    I16x8NarrowI32x4U = (0xFD, 134), "i16x8.narrow_i32x4_u", Empty, (V128 V128 -> V128);
    I16x8ExtendLowI8x16S = (0xFD, 135), "i16x8.extend_low_i8x16_s", Empty, (V128 -> V128);
    I16x8ExtendHighI8x16S = (0xFD, 136), "i16x8.extend_high_i8x16_s", Empty, (V128 -> V128);
    I16x8ExtendLowI8x16U = (0xFD, 137), "i16x8.extend_low_i8x16_u", Empty, (V128 -> V128);
    I16x8ExtendHighI8x16U = (0xFD, 138), "i16x8.extend_high_i8x16_u", Empty, (V128 -> V128);
    I16x8Shl = (0xFD, 139), "i16x8.shl", Empty, (V128 I32 -> V128);
    I16x8ShrS = (0xFD, 140), "i16x8.shr_s", Empty, (V128 I32 -> V128);
    I16x8ShrU = (0xFD, 141), "i16x8.shr_u", Empty, (V128 I32 -> V128);
    I16x8Add = (0xFD, 142), "i16x8.add", Empty, (V128 V128 -> V128);
    I16x8AddSatS = (0xFD, 143), "i16x8.add_sat_s", Empty, (V128 V128 -> V128);
    I16x8AddSatU = (0xFD, 144), "i16x8.add_sat_u", Empty, (V128 V128 -> V128);
    I16x8Sub = (0xFD, 145), "i16x8.sub", Empty, (V128 V128 -> V128);
    I16x8SubSatS = (0xFD, 146), "i16x8.sub_sat_s", Empty, (V128 V128 -> V128);
    I16x8SubSatU = (0xFD, 147), "i16x8.sub_sat_u", Empty, (V128 V128 -> V128);
    F64x2Nearest = (0xFD, 148), "f64x2.nearest", Empty, (V128 -> V128);
    I16x8Mul = (0xFD, 149), "i16x8.mul", Empty, (V128 V128 -> V128);
    I16x8MinS = (0xFD, 150), "i16x8.min_s", Empty, (V128 V128 -> V128);
    I16x8MinU = (0xFD, 151), "i16x8.min_u", Empty, (V128 V128 -> V128);
    I16x8MaxS = (0xFD, 152), "i16x8.max_s", Empty, (V128 V128 -> V128);
    I16x8MaxU = (0xFD, 153), "i16x8.max_u", Empty, (V128 V128 -> V128);
    I16x8AvgrU = (0xFD, 155), "i16x8.avgr_u", Empty, (V128 V128 -> V128);
    I16x8ExtMulLowI8x16S = (0xFD, 156), "i16x8.extmul_low_i8x16_s", Empty, (V128 V128 -> V128);
    I16x8ExtMulHighI8x16S = (0xFD, 157), "i16x8.extmul_high_i8x16_s", Empty, (V128 V128 -> V128);
    I16x8ExtMulLowI8x16U = (0xFD, 158), "i16x8.extmul_low_i8x16_u", Empty, (V128 V128 -> V128);
    I16x8ExtMulHighI8x16U = (0xFD, 159), "i16x8.extmul_high_i8x16_u", Empty, (V128 V128 -> V128);
    I32x4Abs = (0xFD, 160), "i32x4.abs", Empty, (V128 -> V128);
    I32x4Neg = (0xFD, 161), "i32x4.neg", Empty, (V128 -> V128);
    I32x4AllTrue = (0xFD, 163), "i32x4.all_true", Empty, (V128 -> I32);
    I32x4Bitmask = (0xFD, 164), "i32x4.bitmask", Empty, (V128 -> I32);
    I32x4ExtendLowI16x8S = (0xFD, 167), "i32x4.extend_low_i16x8_s", Empty, (V128 -> V128);
    I32x4ExtendHighI16x8S = (0xFD, 168), "i32x4.extend_high_i16x8_s", Empty, (V128 -> V128);
    I32x4ExtendLowI16x8U = (0xFD, 169), "i32x4.extend_low_i16x8_u", Empty, (V128 -> V128);
    I32x4ExtendHighI16x8U = (0xFD, 170), "i32x4.extend_high_i16x8_u", Empty, (V128 -> V128);
    I32x4Shl = (0xFD, 171), "i32x4.shl", Empty, (V128 I32 -> V128);
    I32x4ShrS = (0xFD, 172), "i32x4.shr_s", Empty, (V128 I32 -> V128);
    I32x4ShrU = (0xFD, 173), "i32x4.shr_u", Empty, (V128 I32 -> V128);
    I32x4Add = (0xFD, 174), "i32x4.add", Empty, (V128 V128 -> V128);
    I32x4Sub = (0xFD, 177), "i32x4.sub", Empty, (V128 V128 -> V128);
    I32x4Mul = (0xFD, 181), "i32x4.mul", Empty, (V128 V128 -> V128);
    I32x4MinS = (0xFD, 182), "i32x4.min_s", Empty, (V128 V128 -> V128);
    I32x4MinU = (0xFD, 183), "i32x4.min_u", Empty, (V128 V128 -> V128);
    I32x4MaxS = (0xFD, 184), "i32x4.max_s", Empty, (V128 V128 -> V128);
    I32x4MaxU = (0xFD, 185), "i32x4.max_u", Empty, (V128 V128 -> V128);
    I32x4DotI16x8S = (0xFD, 186), "i32x4.dot_i16x8_s", Empty, (V128 V128 -> V128);
    I32x4ExtMulLowI16x8S = (0xFD, 188), "i32x4.extmul_low_i16x8_s", Empty, (V128 V128 -> V128);
    I32x4ExtMulHighI16x8S = (0xFD, 189), "i32x4.extmul_high_i16x8_s", Empty, (V128 V128 -> V128);
    I32x4ExtMulLowI16x8U = (0xFD, 190), "i32x4.extmul_low_i16x8_u", Empty, (V128 V128 -> V128);
    I32x4ExtMulHighI16x8U = (0xFD, 191), "i32x4.extmul_high_i16x8_u", Empty, (V128 V128 -> V128);
    I64x2Abs = (0xFD, 192), "i64x2.abs", Empty, (V128 -> V128);
    I64x2Neg = (0xFD, 193), "i64x2.neg", Empty, (V128 -> V128);
    I64x2AllTrue = (0xFD, 195), "i64x2.all_true", Empty, (V128 -> I32);
    I64x2Bitmask = (0xFD, 196), "i64x2.bitmask", Empty, (V128 -> I32);
    I64x2ExtendLowI32x4S = (0xFD, 199), "i64x2.extend_low_i32x4_s", Empty, (V128 -> V128);
    I64x2ExtendHighI32x4S = (0xFD, 200), "i64x2.extend_high_i32x4_s", Empty, (V128 -> V128);
    I64x2ExtendLowI32x4U = (0xFD, 201), "i64x2.extend_low_i32x4_u", Empty, (V128 -> V128);
    I64x2ExtendHighI32x4U = (0xFD, 202), "i64x2.extend_high_i32x4_u", Empty, (V128 -> V128);
    I64x2Shl = (0xFD, 203), "i64x2.shl", Empty, (V128 I32 -> V128);
    I64x2ShrS = (0xFD, 204), "i64x2.shr_s", Empty, (V128 I32 -> V128);
    I64x2ShrU = (0xFD, 205), "i64x2.shr_u", Empty, (V128 I32 -> V128);
    I64x2Add = (0xFD, 206), "i64x2.add", Empty, (V128 V128 -> V128);
    I64x2Sub = (0xFD, 209), "i64x2.sub", Empty, (V128 V128 -> V128);
    I64x2Mul = (0xFD, 213), "i64x2.mul", Empty, (V128 V128 -> V128);
    I64x2Eq = (0xFD, 214), "i64x2.eq", Empty, (V128 V128 -> V128);
    I64x2Ne = (0xFD, 215), "i64x2.ne", Empty, (V128 V128 -> V128);
    I64x2LtS = (0xFD, 216), "i64x2.lt_s", Empty, (V128 V128 -> V128);
    I64x2GtS = (0xFD, 217), "i64x2.gt_s", Empty, (V128 V128 -> V128);
    I64x2LeS = (0xFD, 218), "i64x2.le_s", Empty, (V128 V128 -> V128);
    I64x2GeS = (0xFD, 219), "i64x2.ge_s", Empty, (V128 V128 -> V128);
    I64x2ExtMulLowI32x4S = (0xFD, 220), "i64x2.extmul_low_i32x4_s", Empty, (V128 V128 -> V128);
    I64x2ExtMulHighI32x4S = (0xFD, 221), "i64x2.extmul_high_i32x4_s", Empty, (V128 V128 -> V128);
    I64x2ExtMulLowI32x4U = (0xFD, 222), "i64x2.extmul_low_i32x4_u", Empty, (V128 V128 -> V128);
    I64x2ExtMulHighI32x4U = (0xFD, 223), "i64x2.extmul_high_i32x4_u", Empty, (V128 V128 -> V128);
    F32x4Abs = (0xFD, 224), "f32x4.abs", Empty, (V128 -> V128);
    F32x4Neg = (0xFD, 225), "f32x4.neg", Empty, (V128 -> V128);
    F32x4Sqrt = (0xFD, 227), "f32x4.sqrt", Empty, (V128 -> V128);
    F32x4Add = (0xFD, 228), "f32x4.add", Empty, (V128 V128 -> V128);
    F32x4Sub = (0xFD, 229), "f32x4.sub", Empty, (V128 V128 -> V128);
    F32x4Mul = (0xFD, 230), "f32x4.mul", Empty, (V128 V128 -> V128);
    F32x4Div = (0xFD, 231), "f32x4.div", Empty, (V128 V128 -> V128);
    F32x4Min = (0xFD, 232), "f32x4.min", Empty, (V128 V128 -> V128);
    F32x4Max = (0xFD, 233), "f32x4.max", Empty, (V128 V128 -> V128);
    F32x4PMin = (0xFD, 234), "f32x4.pmin", Empty, (V128 V128 -> V128);
    F32x4PMax = (0xFD, 235), "f32x4.pmax", Empty, (V128 V128 -> V128);
    F64x2Abs = (0xFD, 236), "f64x2.abs", Empty, (V128 -> V128);
    F64x2Neg = (0xFD, 237), "f64x2.neg", Empty, (V128 -> V128);
    F64x2Sqrt = (0xFD, 239), "f64x2.sqrt", Empty, (V128 -> V128);
    F64x2Add = (0xFD, 240), "f64x2.add", Empty, (V128 V128 -> V128);
    F64x2Sub = (0xFD, 241), "f64x2.sub", Empty, (V128 V128 -> V128);
    F64x2Mul = (0xFD, 242), "f64x2.mul", Empty, (V128 V128 -> V128);
    F64x2Div = (0xFD, 243), "f64x2.div", Empty, (V128 V128 -> V128);
    F64x2Min = (0xFD, 244), "f64x2.min", Empty, (V128 V128 -> V128);
    F64x2Max = (0xFD, 245), "f64x2.max", Empty, (V128 V128 -> V128);
    F64x2PMin = (0xFD, 246), "f64x2.pmin", Empty, (V128 V128 -> V128);
    F64x2PMax = (0xFD, 247), "f64x2.pmax", Empty, (V128 V128 -> V128);
    I32x4TruncSatF32x4S = (0xFD, 248), "i32x4.trunc_sat_f32x4_s", Empty, (V128 -> V128);
    I32x4TruncSatF32x4U = (0xFD, 249), "i32x4.trunc_sat_f32x4_u", Empty, (V128 -> V128);
    F32x4ConvertI32x4S = (0xFD, 250), "f32x4.convert_i32x4_s", Empty, (V128 -> V128);
    F32x4ConvertI32x4U = (0xFD, 251), "f32x4.convert_i32x4_u", Empty, (V128 -> V128);
    I32x4TruncSatF64x2SZero = (0xFD, 252), "i32x4.trunc_sat_f64x2_s_zero", Empty, (V128 -> V128);
    I32x4TruncSatF64x2UZero = (0xFD, 253), "i32x4.trunc_sat_f64x2_u_zero", Empty, (V128 -> V128);
    F64x2ConvertLowI32x4S = (0xFD, 254), "f64x2.convert_low_i32x4_s", Empty, (V128 -> V128);
    F64x2ConvertLowI32x4U = (0xFD, 255), "f64x2.convert_low_i32x4_u", Empty, (V128 -> V128);

    I32Add2Local = (0xFF, 0), "synthetic:i32.add2local", LocalPair, ( -> I32);
    I32AddConstLocal = (0xFF, 1), "synthetic:i32.addconstlocal", LocalConst, ( -> I32);
    I32AndConstLocal = (0xFF, 2), "synthetic:i32.andconstlocal", LocalConst, ( -> I32);
    I32StoreLocal = (0xFF, 3), "synthetic:i32.storelocal", LocalMemArg, (I32 -> );
    I64StoreLocal = (0xFF, 4), "synthetic:i64.storelocal", LocalMemArg, (I32 -> );
    LocalSetI32Const = (0xFF, 5), "synthetic:local.seti32_const", LocalConst, ( -> );
}

impl Opcode {
    /// Returns `true` for opcodes that the compiler synthesizes.
    pub fn is_synthetic(self) -> bool {
        self.encoding().0 == 0xFF
    }

    /// Returns the base 2 logarithm of the natural alignment of a memory access.
    pub(crate) fn max_align(self) -> u32 {
        use Opcode::*;
        match self {
            I32Load8S | I32Load8U | I64Load8S | I64Load8U | I32Store8 | I64Store8
            | V128Load8Splat | V128Load8Lane | V128Store8Lane => 0,
            I32Load16S | I32Load16U | I64Load16S | I64Load16U | I32Store16 | I64Store16
            | V128Load16Splat | V128Load16Lane | V128Store16Lane => 1,
            I32Load | F32Load | I64Load32S | I64Load32U | I32Store | F32Store | I64Store32
            | V128Load32Splat | V128Load32Zero | V128Load32Lane | V128Store32Lane
            | I32StoreLocal => 2,
            I64Load | F64Load | I64Store | F64Store | V128Load8x8S | V128Load8x8U
            | V128Load16x4S | V128Load16x4U | V128Load32x2S | V128Load32x2U
            | V128Load64Splat | V128Load64Zero | V128Load64Lane | V128Store64Lane
            | I64StoreLocal => 3,
            _ => 4,
        }
    }

    /// Returns the number of lanes a lane immediate of this opcode indexes into.
    pub(crate) fn lane_count(self) -> u8 {
        use Opcode::*;
        match self {
            I8x16ExtractLaneS | I8x16ExtractLaneU | I8x16ReplaceLane | V128Load8Lane
            | V128Store8Lane => 16,
            I16x8ExtractLaneS | I16x8ExtractLaneU | I16x8ReplaceLane | V128Load16Lane
            | V128Store16Lane => 8,
            I32x4ExtractLane | I32x4ReplaceLane | F32x4ExtractLane | F32x4ReplaceLane
            | V128Load32Lane | V128Store32Lane => 4,
            _ => 2,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The type of a structured instruction.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum BlockType {
    Empty,
    Val(ValType),
    Type(TypeIdx),
}

impl Decode for BlockType {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self, ParseError> {
        let byte = decoder.peek_byte()?;
        if byte == 0x40 {
            decoder.read_byte()?;
            return Ok(Self::Empty);
        }
        if let Some(type_) = ValType::from_byte(byte) {
            decoder.read_byte()?;
            return Ok(Self::Val(type_));
        }
        let idx = decoder
            .read_s33()
            .map_err(|_| decoder.with_eof_check(ParseError::ExpectedIndex))?;
        let idx = u32::try_from(idx).map_err(|_| ParseError::InvalidIndex)?;
        Ok(Self::Type(TypeIdx::new(idx)))
    }
}

/// The immediate of `block`, `loop`, `if` and `try_table`, with precomputed jump targets.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct StructuredArgs {
    pub block_type: BlockType,
    /// The index of the matching `end`.
    pub end_ip: u32,
    /// The index of the matching `else`, for an `if` that has one.
    pub else_ip: Option<u32>,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum CatchKind {
    Catch(TagIdx),
    CatchRef(TagIdx),
    CatchAll,
    CatchAllRef,
}

/// A handler clause of a `try_table`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Catch {
    pub kind: CatchKind,
    pub label: LabelIdx,
}

impl Decode for Catch {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self, ParseError> {
        let kind = match decoder.read_byte()? {
            0x00 => CatchKind::Catch(decoder.decode()?),
            0x01 => CatchKind::CatchRef(decoder.decode()?),
            0x02 => CatchKind::CatchAll,
            0x03 => CatchKind::CatchAllRef,
            _ => return Err(ParseError::InvalidImmediate),
        };
        Ok(Self {
            kind,
            label: decoder.decode()?,
        })
    }
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct TryTableArgs {
    pub structured: StructuredArgs,
    pub catches: Box<[Catch]>,
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct BrTableArgs {
    pub labels: Box<[LabelIdx]>,
    pub default: LabelIdx,
}

/// The immediate of a memory access.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct MemArg {
    /// The base 2 logarithm of the alignment hint.
    pub align: u32,
    pub offset: u32,
    pub mem_idx: MemIdx,
}

impl Decode for MemArg {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self, ParseError> {
        let flags = decoder.read_u32().map_err(|_| decoder.with_eof_check(ParseError::ExpectedIndex))?;
        // Bit 6 announces an explicit memory index.
        let (align, mem_idx) = if flags & 0x40 != 0 {
            (flags & !0x40, decoder.decode()?)
        } else {
            (flags, MemIdx::new(0))
        };
        let offset = decoder.read_u32().map_err(|_| decoder.with_eof_check(ParseError::ExpectedIndex))?;
        Ok(Self {
            align,
            offset,
            mem_idx,
        })
    }
}

/// The payload of an [`Instruction`]. Which variant is active is determined by the opcode.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Args {
    None,
    Structured(StructuredArgs),
    TryTable(Box<TryTableArgs>),
    Label(LabelIdx),
    BrTable(Box<BrTableArgs>),
    Func(FuncIdx),
    CallIndirect(TypeIdx, TableIdx),
    Local(LocalIdx),
    Global(GlobalIdx),
    Table(TableIdx),
    TableInit(ElemIdx, TableIdx),
    TableCopy(TableIdx, TableIdx),
    Elem(ElemIdx),
    Data(DataIdx),
    Tag(TagIdx),
    MemArg(MemArg),
    Mem(MemIdx),
    MemCopy(MemIdx, MemIdx),
    MemInit(DataIdx, MemIdx),
    I32(i32),
    I64(i64),
    F32(u32),
    F64(u64),
    V128(u128),
    RefType(RefType),
    Select(Box<[ValType]>),
    Lane(u8),
    MemLane(MemArg, u8),
    Shuffle([u8; 16]),
    LocalPair(LocalIdx, LocalIdx),
    LocalConst(LocalIdx, i32),
    LocalMemArg(LocalIdx, MemArg),
}

/// A single instruction: an opcode and its immediate.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Instruction {
    opcode: Opcode,
    args: Args,
}

macro_rules! accessors {
    ($($(#[$attr:meta])* $name:ident -> $T:ty { $($pattern:pat => $value:expr),* $(,)? })*) => {
        $(
            $(#[$attr])*
            pub fn $name(&self) -> $T {
                match &self.args {
                    $($pattern => $value,)*
                    _ => self.mismatch(stringify!($name)),
                }
            }
        )*
    };
}

impl Instruction {
    pub(crate) fn new(opcode: Opcode, args: Args) -> Self {
        Self { opcode, args }
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn args(&self) -> &Args {
        &self.args
    }

    #[cold]
    fn mismatch(&self, expected: &str) -> ! {
        panic!("`{}` has no {} immediate", self.opcode, expected)
    }

    accessors! {
        /// Returns the jump targets of a structured instruction.
        structured -> &StructuredArgs {
            Args::Structured(args) => args,
            Args::TryTable(args) => &args.structured
        }
        try_table -> &TryTableArgs { Args::TryTable(args) => args }
        label_idx -> LabelIdx { Args::Label(idx) => *idx }
        br_table -> &BrTableArgs { Args::BrTable(args) => args }
        func_idx -> FuncIdx { Args::Func(idx) => *idx }
        call_indirect -> (TypeIdx, TableIdx) { Args::CallIndirect(type_idx, table_idx) => (*type_idx, *table_idx) }
        local_idx -> LocalIdx { Args::Local(idx) => *idx }
        global_idx -> GlobalIdx { Args::Global(idx) => *idx }
        table_idx -> TableIdx { Args::Table(idx) => *idx }
        table_init -> (ElemIdx, TableIdx) { Args::TableInit(elem_idx, table_idx) => (*elem_idx, *table_idx) }
        table_copy -> (TableIdx, TableIdx) { Args::TableCopy(dst, src) => (*dst, *src) }
        elem_idx -> ElemIdx { Args::Elem(idx) => *idx }
        data_idx -> DataIdx { Args::Data(idx) => *idx }
        tag_idx -> TagIdx { Args::Tag(idx) => *idx }
        mem_arg -> MemArg {
            Args::MemArg(arg) => *arg,
            Args::MemLane(arg, _) => *arg,
            Args::LocalMemArg(_, arg) => *arg
        }
        mem_idx -> MemIdx { Args::Mem(idx) => *idx }
        mem_copy -> (MemIdx, MemIdx) { Args::MemCopy(dst, src) => (*dst, *src) }
        mem_init -> (DataIdx, MemIdx) { Args::MemInit(data_idx, mem_idx) => (*data_idx, *mem_idx) }
        i32 -> i32 { Args::I32(val) => *val }
        i64 -> i64 { Args::I64(val) => *val }
        f32_bits -> u32 { Args::F32(bits) => *bits }
        f64_bits -> u64 { Args::F64(bits) => *bits }
        v128 -> u128 { Args::V128(val) => *val }
        ref_type -> RefType { Args::RefType(type_) => *type_ }
        select_types -> &[ValType] { Args::Select(types) => types }
        lane -> u8 {
            Args::Lane(lane) => *lane,
            Args::MemLane(_, lane) => *lane
        }
        shuffle -> &[u8; 16] { Args::Shuffle(lanes) => lanes }
        local_pair -> (LocalIdx, LocalIdx) { Args::LocalPair(a, b) => (*a, *b) }
        local_const -> (LocalIdx, i32) { Args::LocalConst(idx, val) => (*idx, *val) }
        local_mem_arg -> LocalIdx { Args::LocalMemArg(idx, _) => *idx }
    }

    pub(crate) fn structured_mut(&mut self) -> &mut StructuredArgs {
        let opcode = self.opcode;
        match &mut self.args {
            Args::Structured(args) => args,
            Args::TryTable(args) => &mut args.structured,
            _ => panic!("`{}` has no structured immediate", opcode),
        }
    }
}

impl Decode for Instruction {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self, ParseError> {
        let byte = decoder
            .read_byte()
            .map_err(|_| decoder.with_eof_check(ParseError::ExpectedValueOrTerminator))?;
        let (prefix, code) = match byte {
            0xFC | 0xFD => (
                byte,
                decoder
                    .read_u32()
                    .map_err(|_| decoder.with_eof_check(ParseError::UnknownInstruction))?,
            ),
            _ => (0x00, u32::from(byte)),
        };
        let opcode = Opcode::from_encoding(prefix, code).ok_or(ParseError::UnknownInstruction)?;
        let args = match opcode.imm() {
            Imm::Empty => Args::None,
            Imm::Block => Args::Structured(StructuredArgs {
                block_type: decoder.decode()?,
                end_ip: 0,
                else_ip: None,
            }),
            Imm::TryTable => Args::TryTable(Box::new(TryTableArgs {
                structured: StructuredArgs {
                    block_type: decoder.decode()?,
                    end_ip: 0,
                    else_ip: None,
                },
                catches: decoder.decode_vec::<Catch>()?.into_boxed_slice(),
            })),
            Imm::Label => Args::Label(decoder.decode()?),
            Imm::BrTable => Args::BrTable(Box::new(BrTableArgs {
                labels: decoder.decode_vec::<LabelIdx>()?.into_boxed_slice(),
                default: decoder.decode()?,
            })),
            Imm::Func => Args::Func(decoder.decode()?),
            Imm::CallIndirect => Args::CallIndirect(decoder.decode()?, decoder.decode()?),
            Imm::Local => Args::Local(decoder.decode()?),
            Imm::Global => Args::Global(decoder.decode()?),
            Imm::Table => Args::Table(decoder.decode()?),
            Imm::TableInit => Args::TableInit(decoder.decode()?, decoder.decode()?),
            Imm::TableCopy => Args::TableCopy(decoder.decode()?, decoder.decode()?),
            Imm::Elem => Args::Elem(decoder.decode()?),
            Imm::Data => Args::Data(decoder.decode()?),
            Imm::Tag => Args::Tag(decoder.decode()?),
            Imm::MemArg => Args::MemArg(decoder.decode()?),
            Imm::Mem => Args::Mem(decoder.decode()?),
            Imm::MemCopy => Args::MemCopy(decoder.decode()?, decoder.decode()?),
            Imm::MemInit => Args::MemInit(decoder.decode()?, decoder.decode()?),
            Imm::I32 => Args::I32(decoder.read_i32()?),
            Imm::I64 => Args::I64(decoder.read_i64()?),
            Imm::F32 => Args::F32(decoder.read_f32_bits()?),
            Imm::F64 => Args::F64(decoder.read_f64_bits()?),
            Imm::V128 => Args::V128(u128::from_le_bytes(
                decoder
                    .read_bytes_array()
                    .map_err(|_| decoder.with_eof_check(ParseError::InvalidImmediate))?,
            )),
            Imm::RefType => Args::RefType(decoder.decode()?),
            Imm::Select => {
                let types: Vec<ValType> = decoder.decode_vec()?;
                if types.len() != 1 {
                    return Err(ParseError::InvalidImmediate);
                }
                Args::Select(types.into_boxed_slice())
            }
            Imm::Lane => Args::Lane(decoder.read_byte()?),
            Imm::MemLane => {
                let arg = decoder.decode()?;
                Args::MemLane(arg, decoder.read_byte()?)
            }
            Imm::Shuffle => Args::Shuffle(
                decoder
                    .read_bytes_array()
                    .map_err(|_| decoder.with_eof_check(ParseError::InvalidImmediate))?,
            ),
            Imm::LocalPair | Imm::LocalConst | Imm::LocalMemArg => {
                return Err(ParseError::UnknownInstruction)
            }
        };
        Ok(Self { opcode, args })
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode)?;
        match &self.args {
            Args::None => Ok(()),
            Args::Structured(args) => write_structured(f, args),
            Args::TryTable(args) => {
                write_structured(f, &args.structured)?;
                for catch in args.catches.iter() {
                    match catch.kind {
                        CatchKind::Catch(tag) => write!(f, " (catch {} {})", tag, catch.label)?,
                        CatchKind::CatchRef(tag) => write!(f, " (catch_ref {} {})", tag, catch.label)?,
                        CatchKind::CatchAll => write!(f, " (catch_all {})", catch.label)?,
                        CatchKind::CatchAllRef => write!(f, " (catch_all_ref {})", catch.label)?,
                    }
                }
                Ok(())
            }
            Args::Label(idx) => write!(f, " {}", idx),
            Args::BrTable(args) => {
                for label in args.labels.iter() {
                    write!(f, " {}", label)?;
                }
                write!(f, " {}", args.default)
            }
            Args::Func(idx) => write!(f, " {}", idx),
            Args::CallIndirect(type_idx, table_idx) => write!(f, " {} (type {})", table_idx, type_idx),
            Args::Local(idx) => write!(f, " {}", idx),
            Args::Global(idx) => write!(f, " {}", idx),
            Args::Table(idx) => write!(f, " {}", idx),
            Args::TableInit(elem_idx, table_idx) => write!(f, " {} {}", table_idx, elem_idx),
            Args::TableCopy(dst, src) => write!(f, " {} {}", dst, src),
            Args::Elem(idx) => write!(f, " {}", idx),
            Args::Data(idx) => write!(f, " {}", idx),
            Args::Tag(idx) => write!(f, " {}", idx),
            Args::MemArg(arg) => write_mem_arg(f, arg),
            Args::Mem(idx) => write!(f, " {}", idx),
            Args::MemCopy(dst, src) => write!(f, " {} {}", dst, src),
            Args::MemInit(data_idx, mem_idx) => write!(f, " {} {}", mem_idx, data_idx),
            Args::I32(val) => write!(f, " {}", val),
            Args::I64(val) => write!(f, " {}", val),
            Args::F32(bits) => write!(f, " {}", f32::from_bits(*bits)),
            Args::F64(bits) => write!(f, " {}", f64::from_bits(*bits)),
            Args::V128(val) => write!(f, " i64x2 {:#x} {:#x}", *val as u64, (*val >> 64) as u64),
            Args::RefType(type_) => write!(f, " {}", type_),
            Args::Select(types) => {
                for type_ in types.iter() {
                    write!(f, " (result {})", type_)?;
                }
                Ok(())
            }
            Args::Lane(lane) => write!(f, " {}", lane),
            Args::MemLane(arg, lane) => {
                write_mem_arg(f, arg)?;
                write!(f, " {}", lane)
            }
            Args::Shuffle(lanes) => {
                for lane in lanes {
                    write!(f, " {}", lane)?;
                }
                Ok(())
            }
            Args::LocalPair(a, b) => write!(f, " {} {}", a, b),
            Args::LocalConst(idx, val) => write!(f, " {} {}", idx, val),
            Args::LocalMemArg(idx, arg) => {
                write!(f, " {}", idx)?;
                write_mem_arg(f, arg)
            }
        }
    }
}

fn write_structured(f: &mut fmt::Formatter<'_>, args: &StructuredArgs) -> fmt::Result {
    match args.block_type {
        BlockType::Empty => {}
        BlockType::Val(type_) => write!(f, " (result {})", type_)?,
        BlockType::Type(idx) => write!(f, " (type {})", idx)?,
    }
    write!(f, " ;; end={}", args.end_ip)?;
    if let Some(else_ip) = args.else_ip {
        write!(f, " else={}", else_ip)?;
    }
    Ok(())
}

fn write_mem_arg(f: &mut fmt::Formatter<'_>, arg: &MemArg) -> fmt::Result {
    if arg.mem_idx.value() != 0 {
        write!(f, " {}", arg.mem_idx)?;
    }
    write!(f, " offset={} align={}", arg.offset, 1u64 << arg.align.min(63))
}

/// A sequence of instructions: a function body or an initializer, terminated by `end`.
///
/// Besides the instructions, an expression caches data the interpreter derives from them on
/// first use. The caches are set at most once and never affect behavior.
#[derive(Debug, Default)]
pub struct Expression {
    instrs: Vec<Instruction>,
    stack_usage_hint: OnceLock<usize>,
    frame_usage_hint: OnceLock<usize>,
    compiled: OnceLock<Option<CompiledInstructions>>,
}

impl Expression {
    pub fn new(instrs: Vec<Instruction>) -> Self {
        Self {
            instrs,
            ..Self::default()
        }
    }

    pub fn instrs(&self) -> &[Instruction] {
        &self.instrs
    }

    /// Returns how many operand stack slots this expression needs at most, counted from the
    /// height at which it starts.
    ///
    /// `control_effect` supplies what the instruction alone cannot tell: the `(params, results)`
    /// of a block, loop, if or try_table, and the `(pops, pushes)` of every other instruction
    /// with no fixed stack effect. The result is computed on the first call and reused after.
    pub(crate) fn stack_usage_hint(
        &self,
        control_effect: impl Fn(&Instruction) -> (usize, usize),
    ) -> usize {
        *self.stack_usage_hint.get_or_init(|| {
            use Opcode::*;
            let mut height = 0usize;
            let mut max_height = 0usize;
            // Height below the params, param count and result count of each open block.
            let mut blocks: Vec<(usize, usize, usize)> = Vec::new();
            for instr in &self.instrs {
                match instr.opcode {
                    opcode @ (Block | Loop | If | TryTable) => {
                        if opcode == If {
                            height = height.saturating_sub(1);
                        }
                        let (params, results) = control_effect(instr);
                        blocks.push((height.saturating_sub(params), params, results));
                    }
                    Else => {
                        if let Some(&(base, params, _)) = blocks.last() {
                            height = base + params;
                        }
                    }
                    End => {
                        if let Some((base, _, results)) = blocks.pop() {
                            height = base + results;
                        }
                    }
                    _ => {
                        let (pops, pushes) = stack_effect(instr)
                            .unwrap_or_else(|| control_effect(instr));
                        height = height.saturating_sub(pops) + pushes;
                    }
                }
                max_height = max_height.max(height);
            }
            max_height
        })
    }

    /// Returns the deepest nesting of structured instructions in this expression.
    pub(crate) fn frame_usage_hint(&self) -> usize {
        *self.frame_usage_hint.get_or_init(|| {
            let mut depth = 0usize;
            let mut max_depth = 0usize;
            for instr in &self.instrs {
                match instr.opcode {
                    Opcode::Block | Opcode::Loop | Opcode::If | Opcode::TryTable => {
                        depth += 1;
                        max_depth = max_depth.max(depth);
                    }
                    Opcode::End => depth = depth.saturating_sub(1),
                    _ => {}
                }
            }
            max_depth
        })
    }

    /// Returns the compiled form of this expression, if it has been compiled already.
    pub fn compiled(&self) -> Option<&CompiledInstructions> {
        self.compiled.get().and_then(Option::as_ref)
    }

    /// Compiles this expression on first use and returns the cached result.
    ///
    /// Returns `None` if the expression cannot be lowered to compiled dispatch, in which case it
    /// is always interpreted directly.
    pub fn compile(&self) -> Option<&CompiledInstructions> {
        self.compiled
            .get_or_init(|| try_compile_instructions(self))
            .as_ref()
    }
}

impl Clone for Expression {
    fn clone(&self) -> Self {
        Self::new(self.instrs.clone())
    }
}

impl PartialEq for Expression {
    fn eq(&self, other: &Self) -> bool {
        self.instrs == other.instrs
    }
}

impl Eq for Expression {}

impl Decode for Expression {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self, ParseError> {
        let mut instrs: Vec<Instruction> = Vec::new();
        let mut open_blocks: Vec<usize> = Vec::new();
        loop {
            let instr: Instruction = decoder.decode()?;
            let ip = instrs.len();
            match instr.opcode {
                Opcode::Block | Opcode::Loop | Opcode::If | Opcode::TryTable => open_blocks.push(ip),
                Opcode::Else => {
                    let block = open_blocks
                        .last()
                        .map(|&block| &mut instrs[block])
                        .filter(|block| block.opcode == Opcode::If)
                        .ok_or(ParseError::InvalidInput)?;
                    let args = block.structured_mut();
                    if args.else_ip.is_some() {
                        return Err(ParseError::InvalidInput);
                    }
                    args.else_ip = Some(ip as u32);
                }
                Opcode::End => match open_blocks.pop() {
                    Some(block) => instrs[block].structured_mut().end_ip = ip as u32,
                    None => {
                        instrs.push(instr);
                        return Ok(Self::new(instrs));
                    }
                },
                _ => {}
            }
            instrs.push(instr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_encodings_are_unique_and_round_trip() {
        for &opcode in Opcode::ALL {
            let (prefix, code) = opcode.encoding();
            assert_eq!(Opcode::from_encoding(prefix, code), Some(opcode));
        }
        assert_eq!(Opcode::from_encoding(0x00, 0x06), None);
        assert_eq!(Opcode::from_encoding(0xFD, 154), None);
    }

    #[test]
    fn decodes_jump_targets() {
        // block (result i32) i32.const 1 if else end end end
        let bytes = [0x02, 0x7F, 0x41, 0x01, 0x04, 0x40, 0x05, 0x0B, 0x0B, 0x0B];
        let expr = Expression::decode(&mut Decoder::new(&bytes)).unwrap();
        let instrs = expr.instrs();
        assert_eq!(instrs.len(), 7);
        assert_eq!(
            *instrs[0].structured(),
            StructuredArgs {
                block_type: BlockType::Val(ValType::I32),
                end_ip: 5,
                else_ip: None,
            }
        );
        assert_eq!(instrs[2].structured().end_ip, 4);
        assert_eq!(instrs[2].structured().else_ip, Some(3));
        assert_eq!(instrs[6].opcode(), Opcode::End);
    }

    #[test]
    fn else_outside_if_is_malformed() {
        let bytes = [0x02, 0x40, 0x05, 0x0B, 0x0B];
        assert_eq!(
            Expression::decode(&mut Decoder::new(&bytes)),
            Err(ParseError::InvalidInput)
        );
    }

    #[test]
    fn missing_end_expects_terminator() {
        let bytes = [0x41, 0x01];
        assert_eq!(
            Expression::decode(&mut Decoder::new(&bytes)),
            Err(ParseError::ExpectedValueOrTerminator)
        );
    }

    #[test]
    fn mem_arg_with_memory_index() {
        // i32.load with bit 6 set, memory 1, offset 8
        let bytes = [0x28, 0x42, 0x01, 0x08, 0x0B];
        let expr = Expression::decode(&mut Decoder::new(&bytes)).unwrap();
        assert_eq!(
            expr.instrs()[0].mem_arg(),
            MemArg {
                align: 2,
                offset: 8,
                mem_idx: MemIdx::new(1),
            }
        );
    }

    #[test]
    fn usage_hints_follow_blocks_and_calls() {
        // call 0 (five results) drop*5
        // i32.const 1 i32.const 2
        // block (result i32) i32.const 3 i32.const 4 i32.add end
        // if (result i32) i32.const 5 else i32.const 6 end drop end
        let bytes = [
            0x10, 0x00, 0x1A, 0x1A, 0x1A, 0x1A, 0x1A, 0x41, 0x01, 0x41, 0x02, 0x02, 0x7F, 0x41,
            0x03, 0x41, 0x04, 0x6A, 0x0B, 0x04, 0x7F, 0x41, 0x05, 0x05, 0x41, 0x06, 0x0B, 0x1A,
            0x0B,
        ];
        let expr = Expression::decode(&mut Decoder::new(&bytes)).unwrap();
        let control_effect = |instr: &Instruction| match instr.opcode() {
            Opcode::Call => (0, 5),
            Opcode::Block | Opcode::If => (0, 1),
            opcode => panic!("unexpected `{}`", opcode),
        };
        assert_eq!(expr.stack_usage_hint(control_effect), 5);
        assert_eq!(expr.frame_usage_hint(), 1);

        let bytes = [
            0x41, 0x01, 0x41, 0x02, 0x02, 0x7F, 0x41, 0x03, 0x41, 0x04, 0x6A, 0x0B, 0x1A, 0x1A,
            0x0B,
        ];
        let expr = Expression::decode(&mut Decoder::new(&bytes)).unwrap();
        assert_eq!(expr.stack_usage_hint(|_| (0, 1)), 4);
    }

    #[test]
    #[should_panic]
    fn payload_accessors_check_the_opcode() {
        Instruction::new(Opcode::I32Const, Args::I32(1)).local_idx();
    }
}
