//! Lowering of function bodies to compiled dispatch.
//!
//! A compiled body is a list of [`Dispatch`] records, one per executed instruction. Lowering
//! makes three changes to the original instruction list:
//!
//! - Short instruction sequences that read locals are fused into synthetic instructions, and
//!   `nop`s are dropped.
//! - Structured instructions are copied into extra storage with their jump targets rewritten
//!   to dispatch indices.
//! - Operands that are produced and consumed between two control instructions are assigned
//!   one of eight registers instead of the operand stack.
//!
//! Control instructions (blocks, branches, calls, `throw` and `unreachable`) are barriers.
//! Every operand that is live across a barrier stays on the stack, so the stack layout at each
//! label is the same as under naive interpretation.

use {
    crate::instr::{Args, Expression, Instruction, Opcode},
    std::fmt,
    tracing::debug,
};

/// Where an operand of a [`Dispatch`] lives.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Reg {
    R0,
    R1,
    R2,
    R3,
    R4,
    R5,
    R6,
    R7,
    /// The operand stack.
    Stack,
}

impl Reg {
    pub(crate) const COUNT: usize = 8;

    const ALL: [Reg; Self::COUNT] = [
        Reg::R0,
        Reg::R1,
        Reg::R2,
        Reg::R3,
        Reg::R4,
        Reg::R5,
        Reg::R6,
        Reg::R7,
    ];

    /// Returns the register number, or `None` for [`Reg::Stack`].
    pub fn idx(self) -> Option<usize> {
        match self {
            Self::Stack => None,
            reg => Some(reg as usize),
        }
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.idx() {
            Some(idx) => write!(f, "r{}", idx),
            None => f.write_str("stack"),
        }
    }
}

/// Locates the instruction a [`Dispatch`] executes.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum InstrRef {
    /// An index into the instructions of the original [`Expression`].
    Original(u32),
    /// An index into the extra storage of the [`CompiledInstructions`].
    Extra(u32),
}

/// One step of compiled dispatch.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Dispatch {
    pub opcode: Opcode,
    pub instr: InstrRef,
    /// The operands, top of stack first. Unused slots are [`Reg::Stack`].
    pub sources: [Reg; 3],
    pub destination: Reg,
    /// The number of original instructions this dispatch stands for: the instructions it
    /// fuses plus the dropped `nop`s right before it.
    pub cost: u32,
}

/// The compiled form of an [`Expression`].
#[derive(Clone, Debug, Default)]
pub struct CompiledInstructions {
    dispatches: Vec<Dispatch>,
    extra: Vec<Instruction>,
}

impl CompiledInstructions {
    pub fn dispatches(&self) -> &[Dispatch] {
        &self.dispatches
    }

    /// Returns the instructions that were synthesized or rewritten during compilation.
    pub fn extra(&self) -> &[Instruction] {
        &self.extra
    }

    /// Resolves the instruction of `dispatch`, given the instructions it was compiled from.
    #[inline]
    pub fn instr<'a>(&'a self, original: &'a [Instruction], dispatch: &Dispatch) -> &'a Instruction {
        match dispatch.instr {
            InstrRef::Original(idx) => &original[idx as usize],
            InstrRef::Extra(idx) => &self.extra[idx as usize],
        }
    }

    /// Returns a [`fmt::Display`] adapter that lists every dispatch with its registers.
    pub fn display<'a>(&'a self, expr: &'a Expression) -> impl fmt::Display + 'a {
        DisplayCompiled {
            compiled: self,
            original: expr.instrs(),
        }
    }
}

struct DisplayCompiled<'a> {
    compiled: &'a CompiledInstructions,
    original: &'a [Instruction],
}

impl fmt::Display for DisplayCompiled<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, dispatch) in self.compiled.dispatches.iter().enumerate() {
            let instr = self.compiled.instr(self.original, dispatch);
            write!(f, "{:>6}: {}", idx, instr)?;
            match stack_effect(instr) {
                Some((pops, pushes)) => {
                    if pops > 0 {
                        f.write_str(" <-")?;
                        for source in &dispatch.sources[..pops] {
                            write!(f, " {}", source)?;
                        }
                    }
                    if pushes > 0 {
                        write!(f, " -> {}", dispatch.destination)?;
                    }
                }
                None => f.write_str(" [barrier]")?,
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Returns how many operands a non-control instruction pops and pushes, or `None` if the
/// instruction is a barrier.
pub(crate) fn stack_effect(instr: &Instruction) -> Option<(usize, usize)> {
    use Opcode::*;
    match instr.opcode() {
        Unreachable | Block | Loop | If | Else | End | TryTable | Throw | Br | BrIf | BrTable
        | Return | Call | CallIndirect => None,
        Drop => Some((1, 0)),
        Select | SelectTyped => Some((3, 1)),
        LocalGet | GlobalGet | RefNull | RefFunc => Some((0, 1)),
        LocalSet | GlobalSet => Some((1, 0)),
        LocalTee | RefIsNull | TableGet => Some((1, 1)),
        TableSet => Some((2, 0)),
        TableGrow => Some((2, 1)),
        TableFill => Some((3, 0)),
        opcode => opcode
            .signature()
            .map(|signature| (signature.params.len(), signature.results.len())),
    }
}

/// Tries to fuse the instructions starting at `ip`. Returns the fused instruction and the number
/// of original instructions it replaces.
fn fuse(instrs: &[Instruction], ip: usize) -> Option<(Instruction, usize)> {
    use Opcode::*;
    let instr = |offset: usize| instrs.get(ip + offset);
    let opcode = |offset: usize| instr(offset).map(Instruction::opcode);
    match (opcode(0)?, opcode(1), opcode(2)) {
        (LocalGet, Some(LocalGet), Some(I32Add)) => Some((
            Instruction::new(
                I32Add2Local,
                Args::LocalPair(instr(0)?.local_idx(), instr(1)?.local_idx()),
            ),
            3,
        )),
        (LocalGet, Some(I32Const), Some(op @ (I32Add | I32And))) => Some((
            Instruction::new(
                local_const_opcode(op),
                Args::LocalConst(instr(0)?.local_idx(), instr(1)?.i32()),
            ),
            3,
        )),
        (I32Const, Some(LocalGet), Some(op @ (I32Add | I32And))) => Some((
            Instruction::new(
                local_const_opcode(op),
                Args::LocalConst(instr(1)?.local_idx(), instr(0)?.i32()),
            ),
            3,
        )),
        (LocalGet, Some(op @ (I32Store | I64Store)), _) => {
            let fused = if op == I32Store {
                I32StoreLocal
            } else {
                I64StoreLocal
            };
            Some((
                Instruction::new(
                    fused,
                    Args::LocalMemArg(instr(0)?.local_idx(), instr(1)?.mem_arg()),
                ),
                2,
            ))
        }
        (I32Const, Some(LocalSet), _) => Some((
            Instruction::new(
                LocalSetI32Const,
                Args::LocalConst(instr(1)?.local_idx(), instr(0)?.i32()),
            ),
            2,
        )),
        _ => None,
    }
}

fn local_const_opcode(op: Opcode) -> Opcode {
    match op {
        Opcode::I32Add => Opcode::I32AddConstLocal,
        _ => Opcode::I32AndConstLocal,
    }
}

/// Lowers `expr` to compiled dispatch.
///
/// Returns `None` if the expression is too long to be indexed by dispatch records.
pub fn try_compile_instructions(expr: &Expression) -> Option<CompiledInstructions> {
    let instrs = expr.instrs();
    u32::try_from(instrs.len()).ok()?;

    let mut lowered: Vec<InstrRef> = Vec::with_capacity(instrs.len());
    let mut costs: Vec<u32> = Vec::with_capacity(instrs.len());
    let mut nops = 0;
    let mut extra: Vec<Instruction> = Vec::new();
    // Maps every original index to the index of the dispatch that replaces it. A dropped `nop`
    // maps to the dispatch that follows it.
    let mut ip_map = vec![0u32; instrs.len() + 1];
    let mut fused_count = 0usize;
    let mut ip = 0;
    while ip < instrs.len() {
        let idx = lowered.len() as u32;
        if let Some((fused, len)) = fuse(instrs, ip) {
            ip_map[ip..ip + len].fill(idx);
            lowered.push(InstrRef::Extra(extra.len() as u32));
            costs.push(len as u32 + nops);
            nops = 0;
            extra.push(fused);
            fused_count += 1;
            ip += len;
            continue;
        }
        ip_map[ip] = idx;
        if instrs[ip].opcode() == Opcode::Nop {
            nops += 1;
        } else {
            lowered.push(InstrRef::Original(ip as u32));
            costs.push(1 + nops);
            nops = 0;
        }
        ip += 1;
    }
    ip_map[instrs.len()] = lowered.len() as u32;

    for instr_ref in &mut lowered {
        let InstrRef::Original(ip) = *instr_ref else {
            continue;
        };
        let instr = &instrs[ip as usize];
        if !matches!(
            instr.opcode(),
            Opcode::Block | Opcode::Loop | Opcode::If | Opcode::TryTable
        ) {
            continue;
        }
        let mut instr = instr.clone();
        let args = instr.structured_mut();
        args.end_ip = ip_map[args.end_ip as usize];
        args.else_ip = args.else_ip.map(|else_ip| ip_map[else_ip as usize]);
        *instr_ref = InstrRef::Extra(extra.len() as u32);
        extra.push(instr);
    }

    let resolved: Vec<&Instruction> = lowered
        .iter()
        .map(|instr_ref| match *instr_ref {
            InstrRef::Original(idx) => &instrs[idx as usize],
            InstrRef::Extra(idx) => &extra[idx as usize],
        })
        .collect();
    let slots = assign_registers(&resolved);
    let dispatches: Vec<Dispatch> = resolved
        .iter()
        .zip(&lowered)
        .zip(slots)
        .zip(costs)
        .map(|(((instr, &instr_ref), (sources, destination)), cost)| Dispatch {
            opcode: instr.opcode(),
            instr: instr_ref,
            sources,
            destination,
            cost,
        })
        .collect();
    debug!(
        instr_count = instrs.len(),
        dispatch_count = dispatches.len(),
        fused_count,
        "compiled function body"
    );
    Some(CompiledInstructions { dispatches, extra })
}

#[derive(Clone, Copy, Debug, Default)]
struct Operand {
    consumer: Option<usize>,
    /// Live across a barrier, so it must be on the stack.
    pinned: bool,
}

/// Assigns a source and destination slot to every dispatch.
fn assign_registers(instrs: &[&Instruction]) -> Vec<([Reg; 3], Reg)> {
    // Simulate the operands produced since the last barrier. Pops past the bottom of the
    // simulated stack read operands that are already on the real stack.
    let mut operands: Vec<Operand> = Vec::new();
    let mut produced: Vec<Option<usize>> = vec![None; instrs.len()];
    let mut consumed: Vec<[Option<usize>; 3]> = vec![[None; 3]; instrs.len()];
    let mut live: Vec<usize> = Vec::new();
    for (idx, instr) in instrs.iter().enumerate() {
        let Some((pops, pushes)) = stack_effect(instr) else {
            for operand in live.drain(..) {
                operands[operand].pinned = true;
            }
            continue;
        };
        for slot in consumed[idx].iter_mut().take(pops) {
            *slot = live.pop();
            if let Some(operand) = *slot {
                operands[operand].consumer = Some(idx);
            }
        }
        if pushes > 0 {
            produced[idx] = Some(operands.len());
            live.push(operands.len());
            operands.push(Operand::default());
        }
    }

    let mut busy_until = [0usize; Reg::COUNT];
    let mut assigned = vec![Reg::Stack; operands.len()];
    let mut slots = Vec::with_capacity(instrs.len());
    for idx in 0..instrs.len() {
        let mut sources = [Reg::Stack; 3];
        for (source, operand) in sources.iter_mut().zip(consumed[idx]) {
            if let Some(operand) = operand {
                *source = assigned[operand];
            }
        }
        let mut destination = Reg::Stack;
        if let Some(operand) = produced[idx] {
            let Operand { consumer, pinned } = operands[operand];
            if let (Some(consumer), false) = (consumer, pinned) {
                if let Some(reg) = busy_until.iter().position(|&until| until <= idx) {
                    busy_until[reg] = consumer;
                    destination = Reg::ALL[reg];
                    assigned[operand] = destination;
                }
            }
        }
        slots.push((sources, destination));
    }
    slots
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            index::LocalIdx,
            instr::{BlockType, StructuredArgs},
        },
    };

    fn local_get(idx: u32) -> Instruction {
        Instruction::new(Opcode::LocalGet, Args::Local(LocalIdx::new(idx)))
    }

    fn simple(opcode: Opcode) -> Instruction {
        Instruction::new(opcode, Args::None)
    }

    fn block(end_ip: u32) -> Instruction {
        Instruction::new(
            Opcode::Block,
            Args::Structured(StructuredArgs {
                block_type: BlockType::Empty,
                end_ip,
                else_ip: None,
            }),
        )
    }

    #[test]
    fn fuses_local_reads_and_assigns_registers() {
        let expr = Expression::new(vec![
            local_get(0),
            local_get(1),
            simple(Opcode::I32Add),
            local_get(2),
            simple(Opcode::I32Mul),
            Instruction::new(Opcode::I32Const, Args::I32(1)),
            simple(Opcode::I32Sub),
            simple(Opcode::End),
        ]);
        let compiled = try_compile_instructions(&expr).unwrap();
        let dispatches = compiled.dispatches();
        assert_eq!(dispatches.len(), 6);
        assert_eq!(dispatches[0].opcode, Opcode::I32Add2Local);
        assert_eq!(dispatches[0].destination, Reg::R0);
        assert_eq!(dispatches[1].destination, Reg::R1);
        assert_eq!(dispatches[2].opcode, Opcode::I32Mul);
        assert_eq!(dispatches[2].sources[..2], [Reg::R1, Reg::R0]);
        // A register is free again once its consumer has read it.
        assert_eq!(dispatches[2].destination, Reg::R0);
        assert_eq!(dispatches[3].destination, Reg::R1);
        assert_eq!(dispatches[4].sources[..2], [Reg::R1, Reg::R0]);
        // The result is live at `end`, so it stays on the stack.
        assert_eq!(dispatches[4].destination, Reg::Stack);
        assert_eq!(dispatches[5].sources, [Reg::Stack; 3]);
    }

    #[test]
    fn operands_live_across_a_barrier_stay_on_the_stack() {
        let expr = Expression::new(vec![
            Instruction::new(Opcode::I32Const, Args::I32(7)),
            block(2),
            simple(Opcode::End),
            simple(Opcode::Drop),
            simple(Opcode::End),
        ]);
        let compiled = try_compile_instructions(&expr).unwrap();
        let dispatches = compiled.dispatches();
        assert_eq!(dispatches[0].destination, Reg::Stack);
        assert_eq!(dispatches[3].sources[0], Reg::Stack);
    }

    #[test]
    fn dropping_nops_rewrites_jump_targets() {
        let expr = Expression::new(vec![
            simple(Opcode::Nop),
            block(3),
            simple(Opcode::Nop),
            simple(Opcode::End),
            simple(Opcode::End),
        ]);
        let compiled = try_compile_instructions(&expr).unwrap();
        assert_eq!(compiled.dispatches().len(), 3);
        let block = compiled.instr(expr.instrs(), &compiled.dispatches()[0]);
        assert_eq!(block.structured().end_ip, 1);
        assert!(matches!(compiled.dispatches()[0].instr, InstrRef::Extra(_)));
    }

    #[test]
    fn dispatch_costs_cover_fused_instructions_and_dropped_nops() {
        let expr = Expression::new(vec![
            simple(Opcode::Nop),
            simple(Opcode::Nop),
            local_get(0),
            local_get(1),
            simple(Opcode::I32Add),
            simple(Opcode::Nop),
            simple(Opcode::Drop),
            simple(Opcode::End),
        ]);
        let compiled = try_compile_instructions(&expr).unwrap();
        let costs: Vec<u32> = compiled.dispatches().iter().map(|dispatch| dispatch.cost).collect();
        assert_eq!(costs, vec![5, 2, 1]);
        assert_eq!(costs.iter().sum::<u32>() as usize, expr.instrs().len());
    }

    #[test]
    fn constant_stores_to_locals_are_fused() {
        let expr = Expression::new(vec![
            Instruction::new(Opcode::I32Const, Args::I32(5)),
            Instruction::new(Opcode::LocalSet, Args::Local(LocalIdx::new(1))),
            simple(Opcode::End),
        ]);
        let compiled = try_compile_instructions(&expr).unwrap();
        let fused = compiled.instr(expr.instrs(), &compiled.dispatches()[0]);
        assert_eq!(fused.opcode(), Opcode::LocalSetI32Const);
        assert_eq!(fused.local_const(), (LocalIdx::new(1), 5));
        assert!(compiled.display(&expr).to_string().contains("synthetic:local.seti32_const"));
    }
}
