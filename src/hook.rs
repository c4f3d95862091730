//! Observing execution one instruction at a time.

use {
    crate::{
        instr::Instruction,
        store::{FuncAddr, Store},
        trap::Trap,
        val::Value,
    },
    std::fmt,
};

/// What an [`InstructionHook`] decides before an instruction runs.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum HookAction {
    Continue,
    /// Stop the invocation with [`Trap::Aborted`].
    Abort,
}

/// Called around every instruction the interpreter executes.
///
/// A hook is installed with [`Config::instruction_hook`](crate::Config::instruction_hook). Under
/// compiled dispatch, the hook sees one step per dispatch record, so fused instructions are
/// reported once under their synthetic opcode.
pub trait InstructionHook: Send + Sync {
    fn before(&self, step: &Step<'_>) -> HookAction;

    /// Called once the instruction has run, with the trap it raised, if any.
    fn after(&self, step: &Step<'_>, trap: Option<&Trap>) {
        let _ = (step, trap);
    }
}

/// A view of the machine at an instruction boundary.
pub struct Step<'a> {
    pub(crate) store: &'a Store,
    pub(crate) func: FuncAddr,
    pub(crate) ip: usize,
    pub(crate) instr: &'a Instruction,
    pub(crate) depth: usize,
    pub(crate) operands: &'a [Value],
    pub(crate) locals: &'a [Value],
}

impl<'a> Step<'a> {
    pub fn store(&self) -> &'a Store {
        self.store
    }

    /// Returns the function whose body is running.
    pub fn func(&self) -> FuncAddr {
        self.func
    }

    /// Returns the position of the instruction in the body, in the form the body currently runs.
    pub fn ip(&self) -> usize {
        self.ip
    }

    pub fn instr(&self) -> &'a Instruction {
        self.instr
    }

    /// Returns how many Wasm frames are active, counting the current one.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Returns the raw bits of the operands of the current frame, bottom first.
    ///
    /// Scalars occupy the low bits of each cell. Operands held in registers under compiled
    /// dispatch are not included.
    pub fn operands(&self) -> impl Iterator<Item = u128> + 'a {
        self.operands.iter().map(|value| value.0)
    }

    /// Returns the raw bits of the locals of the current frame, parameters first.
    pub fn locals(&self) -> impl Iterator<Item = u128> + 'a {
        self.locals.iter().map(|value| value.0)
    }
}

impl fmt::Debug for Step<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("func", &self.func)
            .field("ip", &self.ip)
            .field("instr", &self.instr)
            .field("depth", &self.depth)
            .finish_non_exhaustive()
    }
}
