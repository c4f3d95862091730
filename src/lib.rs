//! A WebAssembly abstract machine: decoding, validation, linking, instantiation and execution
//! of WebAssembly modules, with an interpreter that can lower hot function bodies to a
//! register-assigned dispatch form.

mod compile;
mod config;
mod data;
mod decode;
mod elem;
mod error;
mod exec;
mod extern_val;
mod func;
mod global;
mod hook;
mod index;
mod instance;
mod instr;
mod limits;
mod linker;
mod machine;
mod mem;
mod module;
mod ops;
mod print;
mod simd;
mod store;
mod table;
mod tag;
mod trap;
mod val;
mod validate;

pub mod wasi;

pub use self::{
    compile::{try_compile_instructions, CompiledInstructions, Dispatch, InstrRef, Reg},
    config::{Config, DispatchMode},
    data::{Data, DataInst, DataMode},
    decode::ParseError,
    elem::{ElemInst, ElemMode, Element},
    error::Error,
    extern_val::{ExportDesc, ExternType, ExternVal, ImportDesc},
    func::{Caller, FuncInst, FuncType, HostFunc, WasmFunc},
    global::{GlobalError, GlobalInst, GlobalType, Mut},
    hook::{HookAction, InstructionHook, Step},
    index::{
        DataIdx, ElemIdx, FuncIdx, GlobalIdx, LabelIdx, LocalIdx, MemIdx, TableIdx, TagIdx,
        TypeIdx,
    },
    instance::ModuleInstance,
    instr::{
        Args, BlockType, BrTableArgs, Catch, CatchKind, Expression, Instruction, MemArg, Opcode,
        StructuredArgs, TryTableArgs,
    },
    limits::Limits,
    linker::{ImportName, LinkError, Linker, ResolutionPolicy},
    machine::{AbstractMachine, InstantiationError, InstantiationErrorSource},
    mem::{MemInst, MemType, MAX_PAGES, PAGE_SIZE},
    module::{Code, CustomSection, Export, Global, Import, Module, ValidationStatus},
    print::CompiledListing,
    store::{
        DataAddr, ElemAddr, ExternAddr, FuncAddr, GlobalAddr, MemAddr, Store, TableAddr, TagAddr,
    },
    table::{TableError, TableInst, TableType},
    tag::{TagInst, TagType, EXCEPTION_ATTRIBUTE},
    trap::Trap,
    val::{Ref, RefType, Val, ValType, ValTypeKind},
    validate::ValidationError,
};
