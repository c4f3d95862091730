//! The interpreter.
//!
//! Execution never recurses on the host stack. Every Wasm call pushes a [`Frame`], and the
//! locals, labels and operands of all frames share three vectors. A frame either interprets
//! the decoded instructions directly, with every operand on the stack, or runs the
//! [`CompiledInstructions`] of its body, where operands may also live in registers. Both paths
//! go through the same [`Execution::step`], so they share every numeric semantic.

use {
    crate::{
        compile::{CompiledInstructions, Reg},
        config::{Config, DispatchMode},
        func::{Caller, FuncInst},
        hook::{HookAction, Step},
        index::{LabelIdx, LocalIdx, MemIdx, TableIdx},
        instance::ModuleInstance,
        instr::{BlockType, CatchKind, Instruction, MemArg, Opcode},
        mem::MemInst,
        ops::*,
        simd::{self, Lane},
        store::{FuncAddr, Store, TagAddr},
        table::TableInst,
        trap::Trap,
        val::{Ref, Val, Value},
    },
    std::sync::Arc,
    tracing::trace,
};

/// Calls the function at `func` with `args` and runs it to completion.
///
/// # Errors
///
/// If the arguments do not match the function type, or if execution traps.
pub(crate) fn invoke(store: &mut Store, config: &Config, func: FuncAddr, args: &[Val]) -> Result<Vec<Val>, Trap> {
    let type_ = store
        .func(func)
        .ok_or_else(|| Trap::InvalidArguments(format!("unknown function {}", func)))?
        .type_()
        .clone();
    if args.len() != type_.params().len() {
        return Err(Trap::InvalidArguments(format!(
            "expected {} arguments, got {}",
            type_.params().len(),
            args.len()
        )));
    }
    for (idx, (arg, &param)) in args.iter().zip(type_.params()).enumerate() {
        if arg.type_() != param {
            return Err(Trap::InvalidArguments(format!(
                "argument {} has type {}, expected {}",
                idx,
                arg.type_(),
                param
            )));
        }
    }
    let mut execution = Execution::new(store, config);
    execution.stack.extend(args.iter().map(|arg| arg.to_value()));
    if execution.call(func)? {
        execution.run()?;
    }
    let results_start = execution.stack.len() - type_.results().len();
    Ok(type_
        .results()
        .iter()
        .zip(&execution.stack[results_start..])
        .map(|(&type_, &value)| Val::from_value(type_, value))
        .collect())
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum LabelKind {
    Block,
    Loop,
    /// The index of the `try_table` that pushed the label.
    TryTable(usize),
}

#[derive(Clone, Copy, Debug)]
struct Label {
    /// The stack height below the operands of the block.
    height: usize,
    /// The number of operands a branch to this label carries.
    arity: usize,
    target: usize,
    kind: LabelKind,
}

#[derive(Debug)]
struct Frame {
    func: FuncAddr,
    instance: Arc<ModuleInstance>,
    code_idx: usize,
    compiled: bool,
    /// Where execution resumes once the frame is on top again.
    ip: usize,
    stack_base: usize,
    locals_base: usize,
    labels_base: usize,
    arity: usize,
    saved_regs: [Value; Reg::COUNT],
}

#[derive(Debug)]
struct Exception {
    tag: TagAddr,
    payload: Vec<Value>,
}

enum Flow {
    Next,
    Jump(usize),
    Call(FuncAddr),
    Return,
    Throw(Exception),
}

const STACK_ONLY: [Reg; 3] = [Reg::Stack; 3];

/// The instructions of a function body, in the form the current frame runs them.
#[derive(Clone, Copy)]
enum Body<'a> {
    Naive(&'a [Instruction]),
    Compiled(&'a [Instruction], &'a CompiledInstructions),
}

impl<'a> Body<'a> {
    fn new(instance: &'a ModuleInstance, code_idx: usize, compiled: bool) -> Self {
        let expr = &instance.module().code()[code_idx].body;
        match expr.compiled() {
            Some(compiled_instrs) if compiled => Self::Compiled(expr.instrs(), compiled_instrs),
            _ => Self::Naive(expr.instrs()),
        }
    }

    fn len(self) -> usize {
        match self {
            Self::Naive(instrs) => instrs.len(),
            Self::Compiled(_, compiled) => compiled.dispatches().len(),
        }
    }

    /// Returns how many original instructions executing `ip` accounts for.
    #[inline(always)]
    fn cost(self, ip: usize) -> u64 {
        match self {
            Self::Naive(_) => 1,
            Self::Compiled(_, compiled) => u64::from(compiled.dispatches()[ip].cost),
        }
    }

    #[inline(always)]
    fn fetch(self, ip: usize) -> (&'a Instruction, [Reg; 3], Reg) {
        match self {
            Self::Naive(instrs) => (&instrs[ip], STACK_ONLY, Reg::Stack),
            Self::Compiled(instrs, compiled) => {
                let dispatch = &compiled.dispatches()[ip];
                (
                    compiled.instr(instrs, dispatch),
                    dispatch.sources,
                    dispatch.destination,
                )
            }
        }
    }
}

fn block_arity(instance: &ModuleInstance, block_type: BlockType) -> (usize, usize) {
    match block_type {
        BlockType::Empty => (0, 0),
        BlockType::Val(_) => (0, 1),
        BlockType::Type(idx) => {
            let type_ = instance.type_(idx).expect("block type is defined");
            (type_.params().len(), type_.results().len())
        }
    }
}

/// Returns the stack effect of an instruction that depends on the module: the `(params, results)`
/// of a block, or the `(pops, pushes)` of a call, branch or throw.
fn control_effect(instance: &ModuleInstance, instr: &Instruction) -> (usize, usize) {
    use Opcode::*;
    match instr.opcode() {
        Block | Loop | If | TryTable => block_arity(instance, instr.structured().block_type),
        Call => instance
            .func_type(instr.func_idx())
            .map_or((0, 0), |type_| (type_.params().len(), type_.results().len())),
        CallIndirect => instance
            .type_(instr.call_indirect().0)
            .map_or((1, 0), |type_| (type_.params().len() + 1, type_.results().len())),
        Throw => instance
            .tag_type(instr.tag_idx())
            .map_or((0, 0), |type_| (type_.params().len(), 0)),
        BrIf | BrTable => (1, 0),
        _ => (0, 0),
    }
}

struct Execution<'a> {
    store: &'a mut Store,
    config: &'a Config,
    stack: Vec<Value>,
    locals: Vec<Value>,
    labels: Vec<Label>,
    frames: Vec<Frame>,
    regs: [Value; Reg::COUNT],
    locals_base: usize,
    executed: u64,
}

impl<'a> Execution<'a> {
    fn new(store: &'a mut Store, config: &'a Config) -> Self {
        Self {
            store,
            config,
            stack: Vec::new(),
            locals: Vec::new(),
            labels: Vec::new(),
            frames: Vec::new(),
            regs: [Value::default(); Reg::COUNT],
            locals_base: 0,
            executed: 0,
        }
    }

    fn run(&mut self) -> Result<(), Trap> {
        let config = self.config;
        while let Some(frame) = self.frames.last() {
            let instance = frame.instance.clone();
            let body = Body::new(&instance, frame.code_idx, frame.compiled);
            let mut ip = frame.ip;
            self.locals_base = frame.locals_base;
            loop {
                if ip >= body.len() {
                    self.return_from_frame();
                    break;
                }
                self.tick(body.cost(ip))?;
                let (instr, sources, destination) = body.fetch(ip);
                let flow = match config.hook.as_deref() {
                    None => self.step(&instance, instr, ip, sources, destination)?,
                    Some(hook) => {
                        if hook.before(&self.view(instr, ip)) == HookAction::Abort {
                            return Err(Trap::Aborted);
                        }
                        let flow = self.step(&instance, instr, ip, sources, destination);
                        hook.after(&self.view(instr, ip), flow.as_ref().err());
                        flow?
                    }
                };
                match flow {
                    Flow::Next => ip += 1,
                    Flow::Jump(target) => ip = target,
                    Flow::Call(func) => {
                        if let Some(frame) = self.frames.last_mut() {
                            frame.ip = ip + 1;
                        }
                        if self.call(func)? {
                            break;
                        }
                        ip += 1;
                    }
                    Flow::Return => {
                        self.return_from_frame();
                        break;
                    }
                    Flow::Throw(exception) => {
                        self.unwind(exception)?;
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    fn view<'b>(&'b self, instr: &'b Instruction, ip: usize) -> Step<'b> {
        let frame = self.frames.last().expect("a frame is active");
        Step {
            store: &*self.store,
            func: frame.func,
            ip,
            instr,
            depth: self.frames.len(),
            operands: &self.stack[frame.stack_base..],
            locals: &self.locals[frame.locals_base..],
        }
    }

    #[inline(always)]
    fn tick(&mut self, cost: u64) -> Result<(), Trap> {
        if let Some(limit) = self.config.instruction_limit {
            self.executed += cost;
            if self.executed > limit {
                return Err(Trap::InstructionLimitExceeded);
            }
        }
        Ok(())
    }

    /// Calls `func` with its arguments on top of the stack.
    ///
    /// Returns `true` if a new frame was pushed. A host function runs to completion instead,
    /// leaving its results on the stack.
    fn call(&mut self, func: FuncAddr) -> Result<bool, Trap> {
        let func_inst = self.store.func_mut(func).expect("function is allocated");
        let type_ = func_inst.type_().clone();
        match func_inst {
            FuncInst::Wasm(wasm_func) => {
                if self.frames.len() >= self.config.max_call_depth {
                    return Err(Trap::CallStackExhausted);
                }
                let prior_calls = wasm_func.record_call();
                let instance = wasm_func.instance().clone();
                let code_idx = wasm_func.code_idx();
                let code = &instance.module().code()[code_idx];
                let compiled = self.config.dispatch == DispatchMode::Compiled
                    && prior_calls >= self.config.compile_threshold
                    && code.body.compile().is_some();
                trace!(%func, compiled, "entering function");
                let body_len = Body::new(&instance, code_idx, compiled).len();
                let local_count = code.locals.len();
                let arity = type_.results().len();
                self.stack
                    .reserve(code.body.stack_usage_hint(|instr| control_effect(&instance, instr)));
                self.labels.reserve(code.body.frame_usage_hint() + 1);

                let locals_base = self.locals.len();
                let args_start = self.stack.len() - type_.params().len();
                self.locals.extend(self.stack.drain(args_start..));
                self.locals
                    .extend(std::iter::repeat(Value::default()).take(local_count));
                let stack_base = self.stack.len();
                let labels_base = self.labels.len();
                self.labels.push(Label {
                    height: stack_base,
                    arity,
                    target: body_len,
                    kind: LabelKind::Block,
                });
                self.frames.push(Frame {
                    func,
                    instance,
                    code_idx,
                    compiled,
                    ip: 0,
                    stack_base,
                    locals_base,
                    labels_base,
                    arity,
                    saved_regs: self.regs,
                });
                Ok(true)
            }
            FuncInst::Host(host_func) => {
                let callback = host_func.callback();
                trace!(%func, name = host_func.name(), "calling host function");
                let args_start = self.stack.len() - type_.params().len();
                let args: Vec<Val> = type_
                    .params()
                    .iter()
                    .zip(&self.stack[args_start..])
                    .map(|(&type_, &value)| Val::from_value(type_, value))
                    .collect();
                self.stack.truncate(args_start);
                let instance = self.frames.last().map(|frame| frame.instance.clone());
                let results = callback(&mut Caller::new(&mut *self.store, instance), &args)?;
                let results_match = results.len() == type_.results().len()
                    && results
                        .iter()
                        .zip(type_.results())
                        .all(|(result, &type_)| result.type_() == type_);
                if !results_match {
                    return Err(Trap::host(format!(
                        "host function returned results that do not match {}",
                        type_
                    )));
                }
                self.stack.extend(results.iter().map(|result| result.to_value()));
                Ok(false)
            }
        }
    }

    fn return_from_frame(&mut self) {
        let frame = self.frames.pop().expect("a frame is active");
        let results_start = self.stack.len() - frame.arity;
        self.stack.drain(frame.stack_base..results_start);
        self.locals.truncate(frame.locals_base);
        self.labels.truncate(frame.labels_base);
        self.regs = frame.saved_regs;
    }

    /// Unwinds to the innermost `try_table` with a clause matching `exception`.
    fn unwind(&mut self, exception: Exception) -> Result<(), Trap> {
        while let Some(frame) = self.frames.last() {
            let instance = frame.instance.clone();
            let body = Body::new(&instance, frame.code_idx, frame.compiled);
            let labels_base = frame.labels_base;
            while self.labels.len() > labels_base {
                let Some(label) = self.labels.pop() else {
                    break;
                };
                let LabelKind::TryTable(ip) = label.kind else {
                    continue;
                };
                let (try_table, _, _) = body.fetch(ip);
                for catch in try_table.try_table().catches.iter() {
                    let with_payload = match catch.kind {
                        CatchKind::Catch(tag_idx) if instance.tag_addr(tag_idx) == Some(exception.tag) => true,
                        CatchKind::CatchAll => false,
                        _ => continue,
                    };
                    trace!(tag = %exception.tag, "caught exception");
                    self.stack.truncate(label.height);
                    if with_payload {
                        self.stack.extend_from_slice(&exception.payload);
                    }
                    let target = self.branch(catch.label);
                    if let Some(frame) = self.frames.last_mut() {
                        frame.ip = target;
                    }
                    return Ok(());
                }
            }
            let frame = self.frames.pop().expect("a frame is active");
            self.stack.truncate(frame.stack_base);
            self.locals.truncate(frame.locals_base);
            self.labels.truncate(frame.labels_base);
            self.regs = frame.saved_regs;
        }
        Err(Trap::UncaughtException)
    }

    /// Branches to the label at `label_idx` and returns the jump target.
    fn branch(&mut self, label_idx: LabelIdx) -> usize {
        let idx = self.labels.len() - 1 - label_idx.to_usize();
        let label = self.labels[idx];
        let results_start = self.stack.len() - label.arity;
        self.stack.drain(label.height..results_start);
        if label.kind == LabelKind::Loop {
            self.labels.truncate(idx + 1);
        } else {
            self.labels.truncate(idx);
        }
        label.target
    }

    #[inline(always)]
    fn pop(&mut self, source: Reg) -> Value {
        match source.idx() {
            Some(reg) => self.regs[reg],
            None => self.stack.pop().expect("operand stack underflow"),
        }
    }

    #[inline(always)]
    fn push(&mut self, destination: Reg, value: Value) {
        match destination.idx() {
            Some(reg) => self.regs[reg] = value,
            None => self.stack.push(value),
        }
    }

    #[inline(always)]
    fn local(&self, idx: LocalIdx) -> Value {
        self.locals[self.locals_base + idx.to_usize()]
    }

    #[inline(always)]
    fn local_mut(&mut self, idx: LocalIdx) -> &mut Value {
        &mut self.locals[self.locals_base + idx.to_usize()]
    }

    fn mem(&self, instance: &ModuleInstance, idx: MemIdx) -> &MemInst {
        let addr = instance.mem_addr(idx).expect("memory is defined");
        self.store.mem(addr).expect("memory is allocated")
    }

    fn mem_mut(&mut self, instance: &ModuleInstance, idx: MemIdx) -> &mut MemInst {
        let addr = instance.mem_addr(idx).expect("memory is defined");
        self.store.mem_mut(addr).expect("memory is allocated")
    }

    fn table(&self, instance: &ModuleInstance, idx: TableIdx) -> &TableInst {
        let addr = instance.table_addr(idx).expect("table is defined");
        self.store.table(addr).expect("table is allocated")
    }

    fn table_mut(&mut self, instance: &ModuleInstance, idx: TableIdx) -> &mut TableInst {
        let addr = instance.table_addr(idx).expect("table is defined");
        self.store.table_mut(addr).expect("table is allocated")
    }

    #[inline(always)]
    fn unary<T, U>(&mut self, s: [Reg; 3], d: Reg, f: impl FnOnce(T) -> Result<U, Trap>) -> Result<Flow, Trap>
    where
        T: From<Value>,
        Value: From<U>,
    {
        let x = T::from(self.pop(s[0]));
        let y = f(x)?;
        self.push(d, Value::from(y));
        Ok(Flow::Next)
    }

    #[inline(always)]
    fn binary<T, U>(&mut self, s: [Reg; 3], d: Reg, f: impl FnOnce(T, T) -> Result<U, Trap>) -> Result<Flow, Trap>
    where
        T: From<Value>,
        Value: From<U>,
    {
        let x1 = T::from(self.pop(s[0]));
        let x0 = T::from(self.pop(s[1]));
        let y = f(x0, x1)?;
        self.push(d, Value::from(y));
        Ok(Flow::Next)
    }

    /// Like [`Self::binary`], for operands of different types.
    #[inline(always)]
    fn mixed<A, B, U>(&mut self, s: [Reg; 3], d: Reg, f: impl FnOnce(A, B) -> U) -> Result<Flow, Trap>
    where
        A: From<Value>,
        B: From<Value>,
        Value: From<U>,
    {
        let x1 = B::from(self.pop(s[0]));
        let x0 = A::from(self.pop(s[1]));
        self.push(d, Value::from(f(x0, x1)));
        Ok(Flow::Next)
    }

    #[inline(always)]
    fn un_op<T, O>(&mut self, s: [Reg; 3], d: Reg) -> Result<Flow, Trap>
    where
        T: From<Value>,
        O: UnOp<T>,
        Value: From<O::Output>,
    {
        self.unary(s, d, O::un_op)
    }

    #[inline(always)]
    fn bin_op<T, O>(&mut self, s: [Reg; 3], d: Reg) -> Result<Flow, Trap>
    where
        T: From<Value>,
        O: BinOp<T>,
        Value: From<O::Output>,
    {
        self.binary(s, d, O::bin_op)
    }

    fn load<const N: usize, U>(
        &mut self,
        instance: &ModuleInstance,
        arg: MemArg,
        s: [Reg; 3],
        d: Reg,
        f: impl FnOnce([u8; N]) -> U,
    ) -> Result<Flow, Trap>
    where
        Value: From<U>,
    {
        let addr = u32::from(self.pop(s[0]));
        let bytes = self.mem(instance, arg.mem_idx).load::<N>(addr, arg.offset)?;
        self.push(d, Value::from(f(bytes)));
        Ok(Flow::Next)
    }

    fn store_to<const N: usize, T>(
        &mut self,
        instance: &ModuleInstance,
        arg: MemArg,
        s: [Reg; 3],
        f: impl FnOnce(T) -> [u8; N],
    ) -> Result<Flow, Trap>
    where
        T: From<Value>,
    {
        let value = T::from(self.pop(s[0]));
        let addr = u32::from(self.pop(s[1]));
        self.mem_mut(instance, arg.mem_idx)
            .store(addr, arg.offset, f(value))?;
        Ok(Flow::Next)
    }

    fn load_lane<T: Lane, const N: usize>(
        &mut self,
        instance: &ModuleInstance,
        instr: &Instruction,
        s: [Reg; 3],
        d: Reg,
        f: impl FnOnce([u8; N]) -> T,
    ) -> Result<Flow, Trap> {
        let arg = instr.mem_arg();
        let v = u128::from(self.pop(s[0]));
        let addr = u32::from(self.pop(s[1]));
        let bytes = self.mem(instance, arg.mem_idx).load::<N>(addr, arg.offset)?;
        let v = simd::replace_lane(v, instr.lane() as usize, f(bytes));
        self.push(d, Value::from(v));
        Ok(Flow::Next)
    }

    fn store_lane<T: Lane, const N: usize>(
        &mut self,
        instance: &ModuleInstance,
        instr: &Instruction,
        s: [Reg; 3],
        f: impl FnOnce(T) -> [u8; N],
    ) -> Result<Flow, Trap> {
        let arg = instr.mem_arg();
        let v = u128::from(self.pop(s[0]));
        let addr = u32::from(self.pop(s[1]));
        let bytes = f(simd::lane::<T>(v, instr.lane() as usize));
        self.mem_mut(instance, arg.mem_idx)
            .store(addr, arg.offset, bytes)?;
        Ok(Flow::Next)
    }

    /// Pops the `(destination, source, count)` operands of a bulk instruction.
    fn pop_bulk(&mut self, s: [Reg; 3]) -> (u32, u32, u32) {
        let count = u32::from(self.pop(s[0]));
        let src = u32::from(self.pop(s[1]));
        let dst = u32::from(self.pop(s[2]));
        (dst, src, count)
    }

    fn step(
        &mut self,
        instance: &ModuleInstance,
        instr: &Instruction,
        ip: usize,
        s: [Reg; 3],
        d: Reg,
    ) -> Result<Flow, Trap> {
        use Opcode::*;
        match instr.opcode() {
            Unreachable => Err(Trap::Unreachable),
            Nop => Ok(Flow::Next),
            opcode @ (Block | TryTable) => {
                let args = instr.structured();
                let (param_count, result_count) = block_arity(instance, args.block_type);
                let kind = if opcode == Block {
                    LabelKind::Block
                } else {
                    LabelKind::TryTable(ip)
                };
                self.labels.push(Label {
                    height: self.stack.len() - param_count,
                    arity: result_count,
                    target: args.end_ip as usize + 1,
                    kind,
                });
                Ok(Flow::Next)
            }
            Loop => {
                let (param_count, _) = block_arity(instance, instr.structured().block_type);
                self.labels.push(Label {
                    height: self.stack.len() - param_count,
                    arity: param_count,
                    target: ip + 1,
                    kind: LabelKind::Loop,
                });
                Ok(Flow::Next)
            }
            If => {
                let cond = u32::from(self.pop(s[0]));
                let args = instr.structured();
                let (param_count, result_count) = block_arity(instance, args.block_type);
                let label = Label {
                    height: self.stack.len() - param_count,
                    arity: result_count,
                    target: args.end_ip as usize + 1,
                    kind: LabelKind::Block,
                };
                if cond != 0 {
                    self.labels.push(label);
                    Ok(Flow::Next)
                } else if let Some(else_ip) = args.else_ip {
                    self.labels.push(label);
                    Ok(Flow::Jump(else_ip as usize + 1))
                } else {
                    Ok(Flow::Jump(args.end_ip as usize + 1))
                }
            }
            Else => {
                let label = self.labels.pop().expect("`else` closes a block");
                Ok(Flow::Jump(label.target))
            }
            End => {
                self.labels.pop();
                Ok(Flow::Next)
            }
            Throw => {
                let tag_idx = instr.tag_idx();
                let tag = instance.tag_addr(tag_idx).expect("tag is defined");
                let payload_len = instance
                    .tag_type(tag_idx)
                    .expect("tag is defined")
                    .params()
                    .len();
                let payload = self.stack.split_off(self.stack.len() - payload_len);
                Ok(Flow::Throw(Exception { tag, payload }))
            }
            Br => Ok(Flow::Jump(self.branch(instr.label_idx()))),
            BrIf => {
                if u32::from(self.pop(s[0])) != 0 {
                    Ok(Flow::Jump(self.branch(instr.label_idx())))
                } else {
                    Ok(Flow::Next)
                }
            }
            BrTable => {
                let idx = u32::from(self.pop(s[0])) as usize;
                let args = instr.br_table();
                let label_idx = args.labels.get(idx).copied().unwrap_or(args.default);
                Ok(Flow::Jump(self.branch(label_idx)))
            }
            Return => Ok(Flow::Return),
            Call => Ok(Flow::Call(
                instance
                    .func_addr(instr.func_idx())
                    .expect("function is defined"),
            )),
            CallIndirect => {
                let (type_idx, table_idx) = instr.call_indirect();
                let elem_idx = u32::from(self.pop(s[0]));
                let func = match self.table(instance, table_idx).get(elem_idx) {
                    None => return Err(Trap::UndefinedElement),
                    Some(Ref::Func(Some(func))) => func,
                    Some(_) => return Err(Trap::UninitializedElement),
                };
                let expected = instance.type_(type_idx).expect("type is defined");
                let actual = self.store.func(func).expect("function is allocated").type_();
                if actual != expected {
                    return Err(Trap::IndirectCallTypeMismatch);
                }
                Ok(Flow::Call(func))
            }
            Drop => {
                self.pop(s[0]);
                Ok(Flow::Next)
            }
            Select | SelectTyped => {
                let cond = u32::from(self.pop(s[0]));
                let x1 = self.pop(s[1]);
                let x0 = self.pop(s[2]);
                self.push(d, if cond != 0 { x0 } else { x1 });
                Ok(Flow::Next)
            }
            LocalGet => {
                let value = self.local(instr.local_idx());
                self.push(d, value);
                Ok(Flow::Next)
            }
            LocalSet => {
                let value = self.pop(s[0]);
                *self.local_mut(instr.local_idx()) = value;
                Ok(Flow::Next)
            }
            LocalTee => {
                let value = self.pop(s[0]);
                *self.local_mut(instr.local_idx()) = value;
                self.push(d, value);
                Ok(Flow::Next)
            }
            GlobalGet => {
                let addr = instance
                    .global_addr(instr.global_idx())
                    .expect("global is defined");
                let value = self.store.global(addr).expect("global is allocated").value();
                self.push(d, value);
                Ok(Flow::Next)
            }
            GlobalSet => {
                let addr = instance
                    .global_addr(instr.global_idx())
                    .expect("global is defined");
                let value = self.pop(s[0]);
                self.store
                    .global_mut(addr)
                    .expect("global is allocated")
                    .set_value(value);
                Ok(Flow::Next)
            }
            TableGet => {
                let idx = u32::from(self.pop(s[0]));
                let ref_ = self
                    .table(instance, instr.table_idx())
                    .get(idx)
                    .ok_or(Trap::TableOutOfBounds)?;
                self.push(d, ref_.to_value());
                Ok(Flow::Next)
            }
            TableSet => {
                let value = self.pop(s[0]);
                let idx = u32::from(self.pop(s[1]));
                let table = self.table_mut(instance, instr.table_idx());
                let ref_ = Ref::from_value(table.type_().elem, value);
                table.set(idx, ref_).map_err(|_| Trap::TableOutOfBounds)?;
                Ok(Flow::Next)
            }
            TableSize => {
                let size = self.table(instance, instr.table_idx()).size();
                self.push(d, Value::from(size));
                Ok(Flow::Next)
            }
            TableGrow => {
                let count = u32::from(self.pop(s[0]));
                let init = self.pop(s[1]);
                let table = self.table_mut(instance, instr.table_idx());
                let init = Ref::from_value(table.type_().elem, init);
                let old_size = table.grow(count, init).map_or(-1, |old_size| old_size as i32);
                self.push(d, Value::from(old_size));
                Ok(Flow::Next)
            }
            TableFill => {
                let count = u32::from(self.pop(s[0]));
                let value = self.pop(s[1]);
                let dst = u32::from(self.pop(s[2]));
                let table = self.table_mut(instance, instr.table_idx());
                let value = Ref::from_value(table.type_().elem, value);
                table.fill(dst, value, count)?;
                Ok(Flow::Next)
            }
            TableInit => {
                let (dst, src, count) = self.pop_bulk(s);
                let (elem_idx, table_idx) = instr.table_init();
                let table_addr = instance.table_addr(table_idx).expect("table is defined");
                let elem_addr = instance.elem_addr(elem_idx).expect("element segment is defined");
                let (table, elem) = self
                    .store
                    .table_and_elem_mut(table_addr, elem_addr)
                    .expect("table and element segment are allocated");
                table.init(dst, elem.refs(), src, count)?;
                Ok(Flow::Next)
            }
            ElemDrop => {
                let addr = instance
                    .elem_addr(instr.elem_idx())
                    .expect("element segment is defined");
                self.store
                    .elem_mut(addr)
                    .expect("element segment is allocated")
                    .drop_refs();
                Ok(Flow::Next)
            }
            TableCopy => {
                let (dst, src, count) = self.pop_bulk(s);
                let (dst_idx, src_idx) = instr.table_copy();
                let dst_addr = instance.table_addr(dst_idx).expect("table is defined");
                let src_addr = instance.table_addr(src_idx).expect("table is defined");
                if dst_addr == src_addr {
                    self.table_mut(instance, dst_idx).copy_within(dst, src, count)?;
                } else {
                    let (dst_table, src_table) = self
                        .store
                        .table_pair_mut(dst_addr, src_addr)
                        .expect("tables are allocated");
                    dst_table.copy_from(dst, src_table, src, count)?;
                }
                Ok(Flow::Next)
            }
            I32Load => self.load(instance, instr.mem_arg(), s, d, i32::from_le_bytes),
            I64Load => self.load(instance, instr.mem_arg(), s, d, i64::from_le_bytes),
            F32Load => self.load(instance, instr.mem_arg(), s, d, f32::from_le_bytes),
            F64Load => self.load(instance, instr.mem_arg(), s, d, f64::from_le_bytes),
            I32Load8S => self.load(instance, instr.mem_arg(), s, d, |b| i8::from_le_bytes(b) as i32),
            I32Load8U => self.load(instance, instr.mem_arg(), s, d, |b| u8::from_le_bytes(b) as u32),
            I32Load16S => self.load(instance, instr.mem_arg(), s, d, |b| i16::from_le_bytes(b) as i32),
            I32Load16U => self.load(instance, instr.mem_arg(), s, d, |b| u16::from_le_bytes(b) as u32),
            I64Load8S => self.load(instance, instr.mem_arg(), s, d, |b| i8::from_le_bytes(b) as i64),
            I64Load8U => self.load(instance, instr.mem_arg(), s, d, |b| u8::from_le_bytes(b) as u64),
            I64Load16S => self.load(instance, instr.mem_arg(), s, d, |b| i16::from_le_bytes(b) as i64),
            I64Load16U => self.load(instance, instr.mem_arg(), s, d, |b| u16::from_le_bytes(b) as u64),
            I64Load32S => self.load(instance, instr.mem_arg(), s, d, |b| i32::from_le_bytes(b) as i64),
            I64Load32U => self.load(instance, instr.mem_arg(), s, d, |b| u32::from_le_bytes(b) as u64),
            I32Store => self.store_to(instance, instr.mem_arg(), s, i32::to_le_bytes),
            I64Store => self.store_to(instance, instr.mem_arg(), s, i64::to_le_bytes),
            F32Store => self.store_to(instance, instr.mem_arg(), s, f32::to_le_bytes),
            F64Store => self.store_to(instance, instr.mem_arg(), s, f64::to_le_bytes),
            I32Store8 => self.store_to(instance, instr.mem_arg(), s, |x: u32| (x as u8).to_le_bytes()),
            I32Store16 => self.store_to(instance, instr.mem_arg(), s, |x: u32| (x as u16).to_le_bytes()),
            I64Store8 => self.store_to(instance, instr.mem_arg(), s, |x: u64| (x as u8).to_le_bytes()),
            I64Store16 => self.store_to(instance, instr.mem_arg(), s, |x: u64| (x as u16).to_le_bytes()),
            I64Store32 => self.store_to(instance, instr.mem_arg(), s, |x: u64| (x as u32).to_le_bytes()),
            MemorySize => {
                let size = self.mem(instance, instr.mem_idx()).size();
                self.push(d, Value::from(size));
                Ok(Flow::Next)
            }
            MemoryGrow => {
                let count = u32::from(self.pop(s[0]));
                let old_size = self
                    .mem_mut(instance, instr.mem_idx())
                    .grow(count)
                    .map_or(-1, |old_size| old_size as i32);
                self.push(d, Value::from(old_size));
                Ok(Flow::Next)
            }
            MemoryInit => {
                let (dst, src, count) = self.pop_bulk(s);
                let (data_idx, mem_idx) = instr.mem_init();
                let mem_addr = instance.mem_addr(mem_idx).expect("memory is defined");
                let data_addr = instance.data_addr(data_idx).expect("data segment is defined");
                let (mem, data) = self
                    .store
                    .mem_and_data_mut(mem_addr, data_addr)
                    .expect("memory and data segment are allocated");
                mem.init(dst, data.bytes(), src, count)?;
                Ok(Flow::Next)
            }
            DataDrop => {
                let addr = instance
                    .data_addr(instr.data_idx())
                    .expect("data segment is defined");
                self.store
                    .data_mut(addr)
                    .expect("data segment is allocated")
                    .drop_bytes();
                Ok(Flow::Next)
            }
            MemoryCopy => {
                let (dst, src, count) = self.pop_bulk(s);
                let (dst_idx, src_idx) = instr.mem_copy();
                let dst_addr = instance.mem_addr(dst_idx).expect("memory is defined");
                let src_addr = instance.mem_addr(src_idx).expect("memory is defined");
                if dst_addr == src_addr {
                    self.mem_mut(instance, dst_idx).copy_within(dst, src, count)?;
                } else {
                    let (dst_mem, src_mem) = self
                        .store
                        .mem_pair_mut(dst_addr, src_addr)
                        .expect("memories are allocated");
                    dst_mem.init(dst, src_mem.bytes(), src, count)?;
                }
                Ok(Flow::Next)
            }
            MemoryFill => {
                let count = u32::from(self.pop(s[0]));
                let val = u32::from(self.pop(s[1])) as u8;
                let dst = u32::from(self.pop(s[2]));
                self.mem_mut(instance, instr.mem_idx()).fill(dst, val, count)?;
                Ok(Flow::Next)
            }
            I32Const => {
                self.push(d, Value::from(instr.i32()));
                Ok(Flow::Next)
            }
            I64Const => {
                self.push(d, Value::from(instr.i64()));
                Ok(Flow::Next)
            }
            F32Const => {
                self.push(d, Value::from(instr.f32_bits()));
                Ok(Flow::Next)
            }
            F64Const => {
                self.push(d, Value::from(instr.f64_bits()));
                Ok(Flow::Next)
            }
            V128Const => {
                self.push(d, Value::from(instr.v128()));
                Ok(Flow::Next)
            }
            RefNull => {
                self.push(d, Ref::null(instr.ref_type()).to_value());
                Ok(Flow::Next)
            }
            RefIsNull => self.unary(s, d, |ref_: u128| Ok(ref_ == 0)),
            RefFunc => {
                let func = instance.func_addr(instr.func_idx());
                self.push(d, Value::from(func));
                Ok(Flow::Next)
            }

            I32Eqz => self.un_op::<i32, Eqz>(s, d),
            I32Eq => self.bin_op::<i32, Eq>(s, d),
            I32Ne => self.bin_op::<i32, Ne>(s, d),
            I32LtS => self.bin_op::<i32, Lt>(s, d),
            I32LtU => self.bin_op::<u32, Lt>(s, d),
            I32GtS => self.bin_op::<i32, Gt>(s, d),
            I32GtU => self.bin_op::<u32, Gt>(s, d),
            I32LeS => self.bin_op::<i32, Le>(s, d),
            I32LeU => self.bin_op::<u32, Le>(s, d),
            I32GeS => self.bin_op::<i32, Ge>(s, d),
            I32GeU => self.bin_op::<u32, Ge>(s, d),
            I64Eqz => self.un_op::<i64, Eqz>(s, d),
            I64Eq => self.bin_op::<i64, Eq>(s, d),
            I64Ne => self.bin_op::<i64, Ne>(s, d),
            I64LtS => self.bin_op::<i64, Lt>(s, d),
            I64LtU => self.bin_op::<u64, Lt>(s, d),
            I64GtS => self.bin_op::<i64, Gt>(s, d),
            I64GtU => self.bin_op::<u64, Gt>(s, d),
            I64LeS => self.bin_op::<i64, Le>(s, d),
            I64LeU => self.bin_op::<u64, Le>(s, d),
            I64GeS => self.bin_op::<i64, Ge>(s, d),
            I64GeU => self.bin_op::<u64, Ge>(s, d),
            F32Eq => self.bin_op::<f32, Eq>(s, d),
            F32Ne => self.bin_op::<f32, Ne>(s, d),
            F32Lt => self.bin_op::<f32, Lt>(s, d),
            F32Gt => self.bin_op::<f32, Gt>(s, d),
            F32Le => self.bin_op::<f32, Le>(s, d),
            F32Ge => self.bin_op::<f32, Ge>(s, d),
            F64Eq => self.bin_op::<f64, Eq>(s, d),
            F64Ne => self.bin_op::<f64, Ne>(s, d),
            F64Lt => self.bin_op::<f64, Lt>(s, d),
            F64Gt => self.bin_op::<f64, Gt>(s, d),
            F64Le => self.bin_op::<f64, Le>(s, d),
            F64Ge => self.bin_op::<f64, Ge>(s, d),
            I32Clz => self.un_op::<i32, Clz>(s, d),
            I32Ctz => self.un_op::<i32, Ctz>(s, d),
            I32Popcnt => self.un_op::<i32, Popcnt>(s, d),
            I32Add => self.bin_op::<i32, Add>(s, d),
            I32Sub => self.bin_op::<i32, Sub>(s, d),
            I32Mul => self.bin_op::<i32, Mul>(s, d),
            I32DivS => self.bin_op::<i32, Div>(s, d),
            I32DivU => self.bin_op::<u32, Div>(s, d),
            I32RemS => self.bin_op::<i32, Rem>(s, d),
            I32RemU => self.bin_op::<u32, Rem>(s, d),
            I32And => self.bin_op::<i32, And>(s, d),
            I32Or => self.bin_op::<i32, Or>(s, d),
            I32Xor => self.bin_op::<i32, Xor>(s, d),
            I32Shl => self.bin_op::<i32, Shl>(s, d),
            I32ShrS => self.bin_op::<i32, Shr>(s, d),
            I32ShrU => self.bin_op::<u32, Shr>(s, d),
            I32Rotl => self.bin_op::<i32, Rotl>(s, d),
            I32Rotr => self.bin_op::<i32, Rotr>(s, d),
            I64Clz => self.un_op::<i64, Clz>(s, d),
            I64Ctz => self.un_op::<i64, Ctz>(s, d),
            I64Popcnt => self.un_op::<i64, Popcnt>(s, d),
            I64Add => self.bin_op::<i64, Add>(s, d),
            I64Sub => self.bin_op::<i64, Sub>(s, d),
            I64Mul => self.bin_op::<i64, Mul>(s, d),
            I64DivS => self.bin_op::<i64, Div>(s, d),
            I64DivU => self.bin_op::<u64, Div>(s, d),
            I64RemS => self.bin_op::<i64, Rem>(s, d),
            I64RemU => self.bin_op::<u64, Rem>(s, d),
            I64And => self.bin_op::<i64, And>(s, d),
            I64Or => self.bin_op::<i64, Or>(s, d),
            I64Xor => self.bin_op::<i64, Xor>(s, d),
            I64Shl => self.bin_op::<i64, Shl>(s, d),
            I64ShrS => self.bin_op::<i64, Shr>(s, d),
            I64ShrU => self.bin_op::<u64, Shr>(s, d),
            I64Rotl => self.bin_op::<i64, Rotl>(s, d),
            I64Rotr => self.bin_op::<i64, Rotr>(s, d),
            F32Abs => self.un_op::<f32, Abs>(s, d),
            F32Neg => self.un_op::<f32, Neg>(s, d),
            F32Ceil => self.un_op::<f32, Ceil>(s, d),
            F32Floor => self.un_op::<f32, Floor>(s, d),
            F32Trunc => self.un_op::<f32, Trunc>(s, d),
            F32Nearest => self.un_op::<f32, Nearest>(s, d),
            F32Sqrt => self.un_op::<f32, Sqrt>(s, d),
            F32Add => self.bin_op::<f32, Add>(s, d),
            F32Sub => self.bin_op::<f32, Sub>(s, d),
            F32Mul => self.bin_op::<f32, Mul>(s, d),
            F32Div => self.bin_op::<f32, Div>(s, d),
            F32Min => self.bin_op::<f32, Min>(s, d),
            F32Max => self.bin_op::<f32, Max>(s, d),
            F32Copysign => self.bin_op::<f32, Copysign>(s, d),
            F64Abs => self.un_op::<f64, Abs>(s, d),
            F64Neg => self.un_op::<f64, Neg>(s, d),
            F64Ceil => self.un_op::<f64, Ceil>(s, d),
            F64Floor => self.un_op::<f64, Floor>(s, d),
            F64Trunc => self.un_op::<f64, Trunc>(s, d),
            F64Nearest => self.un_op::<f64, Nearest>(s, d),
            F64Sqrt => self.un_op::<f64, Sqrt>(s, d),
            F64Add => self.bin_op::<f64, Add>(s, d),
            F64Sub => self.bin_op::<f64, Sub>(s, d),
            F64Mul => self.bin_op::<f64, Mul>(s, d),
            F64Div => self.bin_op::<f64, Div>(s, d),
            F64Min => self.bin_op::<f64, Min>(s, d),
            F64Max => self.bin_op::<f64, Max>(s, d),
            F64Copysign => self.bin_op::<f64, Copysign>(s, d),
            I32WrapI64 => self.un_op::<i64, WrapTo<i32>>(s, d),
            I32TruncF32S => self.un_op::<f32, TruncTo<i32>>(s, d),
            I32TruncF32U => self.un_op::<f32, TruncTo<u32>>(s, d),
            I32TruncF64S => self.un_op::<f64, TruncTo<i32>>(s, d),
            I32TruncF64U => self.un_op::<f64, TruncTo<u32>>(s, d),
            I64ExtendI32S => self.un_op::<i32, ExtendTo<i64>>(s, d),
            I64ExtendI32U => self.un_op::<u32, ExtendTo<u64>>(s, d),
            I64TruncF32S => self.un_op::<f32, TruncTo<i64>>(s, d),
            I64TruncF32U => self.un_op::<f32, TruncTo<u64>>(s, d),
            I64TruncF64S => self.un_op::<f64, TruncTo<i64>>(s, d),
            I64TruncF64U => self.un_op::<f64, TruncTo<u64>>(s, d),
            F32ConvertI32S => self.un_op::<i32, ConvertTo<f32>>(s, d),
            F32ConvertI32U => self.un_op::<u32, ConvertTo<f32>>(s, d),
            F32ConvertI64S => self.un_op::<i64, ConvertTo<f32>>(s, d),
            F32ConvertI64U => self.un_op::<u64, ConvertTo<f32>>(s, d),
            F32DemoteF64 => self.un_op::<f64, DemoteTo<f32>>(s, d),
            F64ConvertI32S => self.un_op::<i32, ConvertTo<f64>>(s, d),
            F64ConvertI32U => self.un_op::<u32, ConvertTo<f64>>(s, d),
            F64ConvertI64S => self.un_op::<i64, ConvertTo<f64>>(s, d),
            F64ConvertI64U => self.un_op::<u64, ConvertTo<f64>>(s, d),
            F64PromoteF32 => self.un_op::<f32, PromoteTo<f64>>(s, d),
            I32ReinterpretF32 => self.un_op::<f32, ReinterpretTo<i32>>(s, d),
            I64ReinterpretF64 => self.un_op::<f64, ReinterpretTo<i64>>(s, d),
            F32ReinterpretI32 => self.un_op::<i32, ReinterpretTo<f32>>(s, d),
            F64ReinterpretI64 => self.un_op::<i64, ReinterpretTo<f64>>(s, d),
            I32Extend8S => self.un_op::<i32, ExtendFrom<i8>>(s, d),
            I32Extend16S => self.un_op::<i32, ExtendFrom<i16>>(s, d),
            I64Extend8S => self.un_op::<i64, ExtendFrom<i8>>(s, d),
            I64Extend16S => self.un_op::<i64, ExtendFrom<i16>>(s, d),
            I64Extend32S => self.un_op::<i64, ExtendFrom<i32>>(s, d),
            I32TruncSatF32S => self.un_op::<f32, TruncSatTo<i32>>(s, d),
            I32TruncSatF32U => self.un_op::<f32, TruncSatTo<u32>>(s, d),
            I32TruncSatF64S => self.un_op::<f64, TruncSatTo<i32>>(s, d),
            I32TruncSatF64U => self.un_op::<f64, TruncSatTo<u32>>(s, d),
            I64TruncSatF32S => self.un_op::<f32, TruncSatTo<i64>>(s, d),
            I64TruncSatF32U => self.un_op::<f32, TruncSatTo<u64>>(s, d),
            I64TruncSatF64S => self.un_op::<f64, TruncSatTo<i64>>(s, d),
            I64TruncSatF64U => self.un_op::<f64, TruncSatTo<u64>>(s, d),

            V128Load => self.load(instance, instr.mem_arg(), s, d, u128::from_le_bytes),
            V128Load8x8S => self.load(instance, instr.mem_arg(), s, d, |b| {
                simd::extend::<i8, i16>(u64::from_le_bytes(b) as u128, false, i16::from)
            }),
            V128Load8x8U => self.load(instance, instr.mem_arg(), s, d, |b| {
                simd::extend::<u8, u16>(u64::from_le_bytes(b) as u128, false, u16::from)
            }),
            V128Load16x4S => self.load(instance, instr.mem_arg(), s, d, |b| {
                simd::extend::<i16, i32>(u64::from_le_bytes(b) as u128, false, i32::from)
            }),
            V128Load16x4U => self.load(instance, instr.mem_arg(), s, d, |b| {
                simd::extend::<u16, u32>(u64::from_le_bytes(b) as u128, false, u32::from)
            }),
            V128Load32x2S => self.load(instance, instr.mem_arg(), s, d, |b| {
                simd::extend::<i32, i64>(u64::from_le_bytes(b) as u128, false, i64::from)
            }),
            V128Load32x2U => self.load(instance, instr.mem_arg(), s, d, |b| {
                simd::extend::<u32, u64>(u64::from_le_bytes(b) as u128, false, u64::from)
            }),
            V128Load8Splat => self.load(instance, instr.mem_arg(), s, d, |b| simd::splat(u8::from_le_bytes(b))),
            V128Load16Splat => self.load(instance, instr.mem_arg(), s, d, |b| simd::splat(u16::from_le_bytes(b))),
            V128Load32Splat => self.load(instance, instr.mem_arg(), s, d, |b| simd::splat(u32::from_le_bytes(b))),
            V128Load64Splat => self.load(instance, instr.mem_arg(), s, d, |b| simd::splat(u64::from_le_bytes(b))),
            V128Load32Zero => self.load(instance, instr.mem_arg(), s, d, |b| u32::from_le_bytes(b) as u128),
            V128Load64Zero => self.load(instance, instr.mem_arg(), s, d, |b| u64::from_le_bytes(b) as u128),
            V128Store => self.store_to(instance, instr.mem_arg(), s, u128::to_le_bytes),
            V128Load8Lane => self.load_lane(instance, instr, s, d, u8::from_le_bytes),
            V128Load16Lane => self.load_lane(instance, instr, s, d, u16::from_le_bytes),
            V128Load32Lane => self.load_lane(instance, instr, s, d, u32::from_le_bytes),
            V128Load64Lane => self.load_lane(instance, instr, s, d, u64::from_le_bytes),
            V128Store8Lane => self.store_lane(instance, instr, s, u8::to_le_bytes),
            V128Store16Lane => self.store_lane(instance, instr, s, u16::to_le_bytes),
            V128Store32Lane => self.store_lane(instance, instr, s, u32::to_le_bytes),
            V128Store64Lane => self.store_lane(instance, instr, s, u64::to_le_bytes),
            I8x16Shuffle => {
                let lanes = instr.shuffle();
                self.binary(s, d, |a: u128, b: u128| Ok(simd::shuffle(a, b, lanes)))
            }
            I8x16Swizzle => self.binary(s, d, |a: u128, b: u128| Ok(simd::swizzle(a, b))),
            I8x16Splat => self.unary(s, d, |x: u32| Ok(simd::splat(x as u8))),
            I16x8Splat => self.unary(s, d, |x: u32| Ok(simd::splat(x as u16))),
            I32x4Splat => self.unary(s, d, |x: u32| Ok(simd::splat(x))),
            I64x2Splat => self.unary(s, d, |x: u64| Ok(simd::splat(x))),
            F32x4Splat => self.unary(s, d, |x: f32| Ok(simd::splat(x))),
            F64x2Splat => self.unary(s, d, |x: f64| Ok(simd::splat(x))),
            I8x16ExtractLaneS => {
                let lane = instr.lane() as usize;
                self.unary(s, d, |v: u128| Ok(simd::lane::<i8>(v, lane) as i32))
            }
            I8x16ExtractLaneU => {
                let lane = instr.lane() as usize;
                self.unary(s, d, |v: u128| Ok(simd::lane::<u8>(v, lane) as u32))
            }
            I16x8ExtractLaneS => {
                let lane = instr.lane() as usize;
                self.unary(s, d, |v: u128| Ok(simd::lane::<i16>(v, lane) as i32))
            }
            I16x8ExtractLaneU => {
                let lane = instr.lane() as usize;
                self.unary(s, d, |v: u128| Ok(simd::lane::<u16>(v, lane) as u32))
            }
            I32x4ExtractLane => {
                let lane = instr.lane() as usize;
                self.unary(s, d, |v: u128| Ok(simd::lane::<u32>(v, lane)))
            }
            I64x2ExtractLane => {
                let lane = instr.lane() as usize;
                self.unary(s, d, |v: u128| Ok(simd::lane::<u64>(v, lane)))
            }
            F32x4ExtractLane => {
                let lane = instr.lane() as usize;
                self.unary(s, d, |v: u128| Ok(simd::lane::<f32>(v, lane)))
            }
            F64x2ExtractLane => {
                let lane = instr.lane() as usize;
                self.unary(s, d, |v: u128| Ok(simd::lane::<f64>(v, lane)))
            }
            I8x16ReplaceLane => {
                let lane = instr.lane() as usize;
                self.mixed(s, d, |v: u128, x: u32| simd::replace_lane(v, lane, x as u8))
            }
            I16x8ReplaceLane => {
                let lane = instr.lane() as usize;
                self.mixed(s, d, |v: u128, x: u32| simd::replace_lane(v, lane, x as u16))
            }
            I32x4ReplaceLane => {
                let lane = instr.lane() as usize;
                self.mixed(s, d, |v: u128, x: u32| simd::replace_lane(v, lane, x))
            }
            I64x2ReplaceLane => {
                let lane = instr.lane() as usize;
                self.mixed(s, d, |v: u128, x: u64| simd::replace_lane(v, lane, x))
            }
            F32x4ReplaceLane => {
                let lane = instr.lane() as usize;
                self.mixed(s, d, |v: u128, x: f32| simd::replace_lane(v, lane, x))
            }
            F64x2ReplaceLane => {
                let lane = instr.lane() as usize;
                self.mixed(s, d, |v: u128, x: f64| simd::replace_lane(v, lane, x))
            }

            I8x16Eq => self.binary(s, d, simd::rel_op::<i8, Eq>),
            I8x16Ne => self.binary(s, d, simd::rel_op::<i8, Ne>),
            I8x16LtS => self.binary(s, d, simd::rel_op::<i8, Lt>),
            I8x16LtU => self.binary(s, d, simd::rel_op::<u8, Lt>),
            I8x16GtS => self.binary(s, d, simd::rel_op::<i8, Gt>),
            I8x16GtU => self.binary(s, d, simd::rel_op::<u8, Gt>),
            I8x16LeS => self.binary(s, d, simd::rel_op::<i8, Le>),
            I8x16LeU => self.binary(s, d, simd::rel_op::<u8, Le>),
            I8x16GeS => self.binary(s, d, simd::rel_op::<i8, Ge>),
            I8x16GeU => self.binary(s, d, simd::rel_op::<u8, Ge>),
            I16x8Eq => self.binary(s, d, simd::rel_op::<i16, Eq>),
            I16x8Ne => self.binary(s, d, simd::rel_op::<i16, Ne>),
            I16x8LtS => self.binary(s, d, simd::rel_op::<i16, Lt>),
            I16x8LtU => self.binary(s, d, simd::rel_op::<u16, Lt>),
            I16x8GtS => self.binary(s, d, simd::rel_op::<i16, Gt>),
            I16x8GtU => self.binary(s, d, simd::rel_op::<u16, Gt>),
            I16x8LeS => self.binary(s, d, simd::rel_op::<i16, Le>),
            I16x8LeU => self.binary(s, d, simd::rel_op::<u16, Le>),
            I16x8GeS => self.binary(s, d, simd::rel_op::<i16, Ge>),
            I16x8GeU => self.binary(s, d, simd::rel_op::<u16, Ge>),
            I32x4Eq => self.binary(s, d, simd::rel_op::<i32, Eq>),
            I32x4Ne => self.binary(s, d, simd::rel_op::<i32, Ne>),
            I32x4LtS => self.binary(s, d, simd::rel_op::<i32, Lt>),
            I32x4LtU => self.binary(s, d, simd::rel_op::<u32, Lt>),
            I32x4GtS => self.binary(s, d, simd::rel_op::<i32, Gt>),
            I32x4GtU => self.binary(s, d, simd::rel_op::<u32, Gt>),
            I32x4LeS => self.binary(s, d, simd::rel_op::<i32, Le>),
            I32x4LeU => self.binary(s, d, simd::rel_op::<u32, Le>),
            I32x4GeS => self.binary(s, d, simd::rel_op::<i32, Ge>),
            I32x4GeU => self.binary(s, d, simd::rel_op::<u32, Ge>),
            I64x2Eq => self.binary(s, d, simd::rel_op::<i64, Eq>),
            I64x2Ne => self.binary(s, d, simd::rel_op::<i64, Ne>),
            I64x2LtS => self.binary(s, d, simd::rel_op::<i64, Lt>),
            I64x2GtS => self.binary(s, d, simd::rel_op::<i64, Gt>),
            I64x2LeS => self.binary(s, d, simd::rel_op::<i64, Le>),
            I64x2GeS => self.binary(s, d, simd::rel_op::<i64, Ge>),
            F32x4Eq => self.binary(s, d, simd::rel_op::<f32, Eq>),
            F32x4Ne => self.binary(s, d, simd::rel_op::<f32, Ne>),
            F32x4Lt => self.binary(s, d, simd::rel_op::<f32, Lt>),
            F32x4Gt => self.binary(s, d, simd::rel_op::<f32, Gt>),
            F32x4Le => self.binary(s, d, simd::rel_op::<f32, Le>),
            F32x4Ge => self.binary(s, d, simd::rel_op::<f32, Ge>),
            F64x2Eq => self.binary(s, d, simd::rel_op::<f64, Eq>),
            F64x2Ne => self.binary(s, d, simd::rel_op::<f64, Ne>),
            F64x2Lt => self.binary(s, d, simd::rel_op::<f64, Lt>),
            F64x2Gt => self.binary(s, d, simd::rel_op::<f64, Gt>),
            F64x2Le => self.binary(s, d, simd::rel_op::<f64, Le>),
            F64x2Ge => self.binary(s, d, simd::rel_op::<f64, Ge>),

            V128Not => self.unary(s, d, |v: u128| Ok(!v)),
            V128And => self.binary(s, d, |a: u128, b: u128| Ok(a & b)),
            V128AndNot => self.binary(s, d, |a: u128, b: u128| Ok(a & !b)),
            V128Or => self.binary(s, d, |a: u128, b: u128| Ok(a | b)),
            V128Xor => self.binary(s, d, |a: u128, b: u128| Ok(a ^ b)),
            V128Bitselect => {
                let c = u128::from(self.pop(s[0]));
                let v2 = u128::from(self.pop(s[1]));
                let v1 = u128::from(self.pop(s[2]));
                self.push(d, Value::from(simd::bitselect(v1, v2, c)));
                Ok(Flow::Next)
            }
            V128AnyTrue => self.unary(s, d, |v: u128| Ok(v != 0)),

            F32x4DemoteF64x2Zero => self.unary(s, d, |v: u128| Ok(simd::map::<f64, f32>(v, |x| x as f32))),
            F64x2PromoteLowF32x4 => {
                self.unary(s, d, |v: u128| Ok(simd::extend::<f32, f64>(v, false, f64::from)))
            }

            I8x16Abs => self.unary(s, d, simd::un_op::<i8, Abs>),
            I8x16Neg => self.unary(s, d, simd::un_op::<i8, Neg>),
            I8x16Popcnt => self.unary(s, d, |v: u128| Ok(simd::map::<u8, u8>(v, |x| x.count_ones() as u8))),
            I8x16AllTrue => self.unary(s, d, |v: u128| Ok(simd::all_true::<u8>(v))),
            I8x16Bitmask => self.unary(s, d, |v: u128| Ok(simd::bitmask::<u8>(v))),
            I8x16NarrowI16x8S => self.binary(s, d, |a: u128, b: u128| {
                Ok(simd::narrow::<i16, i8>(a, b, |x| {
                    x.clamp(i8::MIN as i16, i8::MAX as i16) as i8
                }))
            }),
            I8x16NarrowI16x8U => self.binary(s, d, |a: u128, b: u128| {
                Ok(simd::narrow::<i16, u8>(a, b, |x| x.clamp(0, u8::MAX as i16) as u8))
            }),
            F32x4Ceil => self.unary(s, d, simd::un_op::<f32, Ceil>),
            F32x4Floor => self.unary(s, d, simd::un_op::<f32, Floor>),
            F32x4Trunc => self.unary(s, d, simd::un_op::<f32, Trunc>),
            F32x4Nearest => self.unary(s, d, simd::un_op::<f32, Nearest>),
            I8x16Shl => self.mixed(s, d, |v: u128, n: u32| simd::map::<u8, u8>(v, |x| x.wrapping_shl(n))),
            I8x16ShrS => self.mixed(s, d, |v: u128, n: u32| simd::map::<i8, i8>(v, |x| x.wrapping_shr(n))),
            I8x16ShrU => self.mixed(s, d, |v: u128, n: u32| simd::map::<u8, u8>(v, |x| x.wrapping_shr(n))),
            I8x16Add => self.binary(s, d, simd::bin_op::<u8, Add>),
            I8x16AddSatS => self.binary(s, d, simd::bin_op::<i8, AddSat>),
            I8x16AddSatU => self.binary(s, d, simd::bin_op::<u8, AddSat>),
            I8x16Sub => self.binary(s, d, simd::bin_op::<u8, Sub>),
            I8x16SubSatS => self.binary(s, d, simd::bin_op::<i8, SubSat>),
            I8x16SubSatU => self.binary(s, d, simd::bin_op::<u8, SubSat>),
            F64x2Ceil => self.unary(s, d, simd::un_op::<f64, Ceil>),
            F64x2Floor => self.unary(s, d, simd::un_op::<f64, Floor>),
            I8x16MinS => self.binary(s, d, simd::bin_op::<i8, Min>),
            I8x16MinU => self.binary(s, d, simd::bin_op::<u8, Min>),
            I8x16MaxS => self.binary(s, d, simd::bin_op::<i8, Max>),
            I8x16MaxU => self.binary(s, d, simd::bin_op::<u8, Max>),
            F64x2Trunc => self.unary(s, d, simd::un_op::<f64, Trunc>),
            I8x16AvgrU => self.binary(s, d, simd::bin_op::<u8, Avgr>),
            I16x8ExtAddPairwiseI8x16S => self.unary(s, d, |v: u128| {
                Ok(simd::pairwise::<i8, i16>(v, |a, b| i16::from(a) + i16::from(b)))
            }),
            I16x8ExtAddPairwiseI8x16U => self.unary(s, d, |v: u128| {
                Ok(simd::pairwise::<u8, u16>(v, |a, b| u16::from(a) + u16::from(b)))
            }),
            I32x4ExtAddPairwiseI16x8S => self.unary(s, d, |v: u128| {
                Ok(simd::pairwise::<i16, i32>(v, |a, b| i32::from(a) + i32::from(b)))
            }),
            I32x4ExtAddPairwiseI16x8U => self.unary(s, d, |v: u128| {
                Ok(simd::pairwise::<u16, u32>(v, |a, b| u32::from(a) + u32::from(b)))
            }),

            I16x8Abs => self.unary(s, d, simd::un_op::<i16, Abs>),
            I16x8Neg => self.unary(s, d, simd::un_op::<i16, Neg>),
            I16x8Q15MulrSatS => {
                self.binary(s, d, |a: u128, b: u128| Ok(simd::zip_map::<i16>(a, b, simd::q15_mulr_sat)))
            }
            I16x8AllTrue => self.unary(s, d, |v: u128| Ok(simd::all_true::<u16>(v))),
            I16x8Bitmask => self.unary(s, d, |v: u128| Ok(simd::bitmask::<u16>(v))),
            I16x8NarrowI32x4S => self.binary(s, d, |a: u128, b: u128| {
                Ok(simd::narrow::<i32, i16>(a, b, |x| {
                    x.clamp(i16::MIN as i32, i16::MAX as i32) as i16
                }))
            }),
            I16x8NarrowI32x4U => self.binary(s, d, |a: u128, b: u128| {
                Ok(simd::narrow::<i32, u16>(a, b, |x| x.clamp(0, u16::MAX as i32) as u16))
            }),
            I16x8ExtendLowI8x16S => self.unary(s, d, |v: u128| Ok(simd::extend::<i8, i16>(v, false, i16::from))),
            I16x8ExtendHighI8x16S => self.unary(s, d, |v: u128| Ok(simd::extend::<i8, i16>(v, true, i16::from))),
            I16x8ExtendLowI8x16U => self.unary(s, d, |v: u128| Ok(simd::extend::<u8, u16>(v, false, u16::from))),
            I16x8ExtendHighI8x16U => self.unary(s, d, |v: u128| Ok(simd::extend::<u8, u16>(v, true, u16::from))),
            I16x8Shl => self.mixed(s, d, |v: u128, n: u32| simd::map::<u16, u16>(v, |x| x.wrapping_shl(n))),
            I16x8ShrS => self.mixed(s, d, |v: u128, n: u32| simd::map::<i16, i16>(v, |x| x.wrapping_shr(n))),
            I16x8ShrU => self.mixed(s, d, |v: u128, n: u32| simd::map::<u16, u16>(v, |x| x.wrapping_shr(n))),
            I16x8Add => self.binary(s, d, simd::bin_op::<u16, Add>),
            I16x8AddSatS => self.binary(s, d, simd::bin_op::<i16, AddSat>),
            I16x8AddSatU => self.binary(s, d, simd::bin_op::<u16, AddSat>),
            I16x8Sub => self.binary(s, d, simd::bin_op::<u16, Sub>),
            I16x8SubSatS => self.binary(s, d, simd::bin_op::<i16, SubSat>),
            I16x8SubSatU => self.binary(s, d, simd::bin_op::<u16, SubSat>),
            F64x2Nearest => self.unary(s, d, simd::un_op::<f64, Nearest>),
            I16x8Mul => self.binary(s, d, simd::bin_op::<u16, Mul>),
            I16x8MinS => self.binary(s, d, simd::bin_op::<i16, Min>),
            I16x8MinU => self.binary(s, d, simd::bin_op::<u16, Min>),
            I16x8MaxS => self.binary(s, d, simd::bin_op::<i16, Max>),
            I16x8MaxU => self.binary(s, d, simd::bin_op::<u16, Max>),
            I16x8AvgrU => self.binary(s, d, simd::bin_op::<u16, Avgr>),
            I16x8ExtMulLowI8x16S => self.binary(s, d, |a: u128, b: u128| {
                Ok(simd::ext_mul::<i8, i16>(a, b, false, |x, y| i16::from(x) * i16::from(y)))
            }),
            I16x8ExtMulHighI8x16S => self.binary(s, d, |a: u128, b: u128| {
                Ok(simd::ext_mul::<i8, i16>(a, b, true, |x, y| i16::from(x) * i16::from(y)))
            }),
            I16x8ExtMulLowI8x16U => self.binary(s, d, |a: u128, b: u128| {
                Ok(simd::ext_mul::<u8, u16>(a, b, false, |x, y| u16::from(x) * u16::from(y)))
            }),
            I16x8ExtMulHighI8x16U => self.binary(s, d, |a: u128, b: u128| {
                Ok(simd::ext_mul::<u8, u16>(a, b, true, |x, y| u16::from(x) * u16::from(y)))
            }),

            I32x4Abs => self.unary(s, d, simd::un_op::<i32, Abs>),
            I32x4Neg => self.unary(s, d, simd::un_op::<i32, Neg>),
            I32x4AllTrue => self.unary(s, d, |v: u128| Ok(simd::all_true::<u32>(v))),
            I32x4Bitmask => self.unary(s, d, |v: u128| Ok(simd::bitmask::<u32>(v))),
            I32x4ExtendLowI16x8S => self.unary(s, d, |v: u128| Ok(simd::extend::<i16, i32>(v, false, i32::from))),
            I32x4ExtendHighI16x8S => self.unary(s, d, |v: u128| Ok(simd::extend::<i16, i32>(v, true, i32::from))),
            I32x4ExtendLowI16x8U => self.unary(s, d, |v: u128| Ok(simd::extend::<u16, u32>(v, false, u32::from))),
            I32x4ExtendHighI16x8U => self.unary(s, d, |v: u128| Ok(simd::extend::<u16, u32>(v, true, u32::from))),
            I32x4Shl => self.mixed(s, d, |v: u128, n: u32| simd::map::<u32, u32>(v, |x| x.wrapping_shl(n))),
            I32x4ShrS => self.mixed(s, d, |v: u128, n: u32| simd::map::<i32, i32>(v, |x| x.wrapping_shr(n))),
            I32x4ShrU => self.mixed(s, d, |v: u128, n: u32| simd::map::<u32, u32>(v, |x| x.wrapping_shr(n))),
            I32x4Add => self.binary(s, d, simd::bin_op::<u32, Add>),
            I32x4Sub => self.binary(s, d, simd::bin_op::<u32, Sub>),
            I32x4Mul => self.binary(s, d, simd::bin_op::<u32, Mul>),
            I32x4MinS => self.binary(s, d, simd::bin_op::<i32, Min>),
            I32x4MinU => self.binary(s, d, simd::bin_op::<u32, Min>),
            I32x4MaxS => self.binary(s, d, simd::bin_op::<i32, Max>),
            I32x4MaxU => self.binary(s, d, simd::bin_op::<u32, Max>),
            I32x4DotI16x8S => self.binary(s, d, |a: u128, b: u128| Ok(simd::dot_i16x8(a, b))),
            I32x4ExtMulLowI16x8S => self.binary(s, d, |a: u128, b: u128| {
                Ok(simd::ext_mul::<i16, i32>(a, b, false, |x, y| i32::from(x) * i32::from(y)))
            }),
            I32x4ExtMulHighI16x8S => self.binary(s, d, |a: u128, b: u128| {
                Ok(simd::ext_mul::<i16, i32>(a, b, true, |x, y| i32::from(x) * i32::from(y)))
            }),
            I32x4ExtMulLowI16x8U => self.binary(s, d, |a: u128, b: u128| {
                Ok(simd::ext_mul::<u16, u32>(a, b, false, |x, y| u32::from(x) * u32::from(y)))
            }),
            I32x4ExtMulHighI16x8U => self.binary(s, d, |a: u128, b: u128| {
                Ok(simd::ext_mul::<u16, u32>(a, b, true, |x, y| u32::from(x) * u32::from(y)))
            }),

            I64x2Abs => self.unary(s, d, simd::un_op::<i64, Abs>),
            I64x2Neg => self.unary(s, d, simd::un_op::<i64, Neg>),
            I64x2AllTrue => self.unary(s, d, |v: u128| Ok(simd::all_true::<u64>(v))),
            I64x2Bitmask => self.unary(s, d, |v: u128| Ok(simd::bitmask::<u64>(v))),
            I64x2ExtendLowI32x4S => self.unary(s, d, |v: u128| Ok(simd::extend::<i32, i64>(v, false, i64::from))),
            I64x2ExtendHighI32x4S => self.unary(s, d, |v: u128| Ok(simd::extend::<i32, i64>(v, true, i64::from))),
            I64x2ExtendLowI32x4U => self.unary(s, d, |v: u128| Ok(simd::extend::<u32, u64>(v, false, u64::from))),
            I64x2ExtendHighI32x4U => self.unary(s, d, |v: u128| Ok(simd::extend::<u32, u64>(v, true, u64::from))),
            I64x2Shl => self.mixed(s, d, |v: u128, n: u32| simd::map::<u64, u64>(v, |x| x.wrapping_shl(n))),
            I64x2ShrS => self.mixed(s, d, |v: u128, n: u32| simd::map::<i64, i64>(v, |x| x.wrapping_shr(n))),
            I64x2ShrU => self.mixed(s, d, |v: u128, n: u32| simd::map::<u64, u64>(v, |x| x.wrapping_shr(n))),
            I64x2Add => self.binary(s, d, simd::bin_op::<u64, Add>),
            I64x2Sub => self.binary(s, d, simd::bin_op::<u64, Sub>),
            I64x2Mul => self.binary(s, d, simd::bin_op::<u64, Mul>),
            I64x2ExtMulLowI32x4S => self.binary(s, d, |a: u128, b: u128| {
                Ok(simd::ext_mul::<i32, i64>(a, b, false, |x, y| i64::from(x) * i64::from(y)))
            }),
            I64x2ExtMulHighI32x4S => self.binary(s, d, |a: u128, b: u128| {
                Ok(simd::ext_mul::<i32, i64>(a, b, true, |x, y| i64::from(x) * i64::from(y)))
            }),
            I64x2ExtMulLowI32x4U => self.binary(s, d, |a: u128, b: u128| {
                Ok(simd::ext_mul::<u32, u64>(a, b, false, |x, y| u64::from(x) * u64::from(y)))
            }),
            I64x2ExtMulHighI32x4U => self.binary(s, d, |a: u128, b: u128| {
                Ok(simd::ext_mul::<u32, u64>(a, b, true, |x, y| u64::from(x) * u64::from(y)))
            }),

            F32x4Abs => self.unary(s, d, simd::un_op::<f32, Abs>),
            F32x4Neg => self.unary(s, d, simd::un_op::<f32, Neg>),
            F32x4Sqrt => self.unary(s, d, simd::un_op::<f32, Sqrt>),
            F32x4Add => self.binary(s, d, simd::bin_op::<f32, Add>),
            F32x4Sub => self.binary(s, d, simd::bin_op::<f32, Sub>),
            F32x4Mul => self.binary(s, d, simd::bin_op::<f32, Mul>),
            F32x4Div => self.binary(s, d, simd::bin_op::<f32, Div>),
            F32x4Min => self.binary(s, d, simd::bin_op::<f32, Min>),
            F32x4Max => self.binary(s, d, simd::bin_op::<f32, Max>),
            F32x4PMin => self.binary(s, d, simd::bin_op::<f32, PMin>),
            F32x4PMax => self.binary(s, d, simd::bin_op::<f32, PMax>),
            F64x2Abs => self.unary(s, d, simd::un_op::<f64, Abs>),
            F64x2Neg => self.unary(s, d, simd::un_op::<f64, Neg>),
            F64x2Sqrt => self.unary(s, d, simd::un_op::<f64, Sqrt>),
            F64x2Add => self.binary(s, d, simd::bin_op::<f64, Add>),
            F64x2Sub => self.binary(s, d, simd::bin_op::<f64, Sub>),
            F64x2Mul => self.binary(s, d, simd::bin_op::<f64, Mul>),
            F64x2Div => self.binary(s, d, simd::bin_op::<f64, Div>),
            F64x2Min => self.binary(s, d, simd::bin_op::<f64, Min>),
            F64x2Max => self.binary(s, d, simd::bin_op::<f64, Max>),
            F64x2PMin => self.binary(s, d, simd::bin_op::<f64, PMin>),
            F64x2PMax => self.binary(s, d, simd::bin_op::<f64, PMax>),
            I32x4TruncSatF32x4S => self.unary(s, d, |v: u128| Ok(simd::map::<f32, i32>(v, |x| x as i32))),
            I32x4TruncSatF32x4U => self.unary(s, d, |v: u128| Ok(simd::map::<f32, u32>(v, |x| x as u32))),
            F32x4ConvertI32x4S => self.unary(s, d, |v: u128| Ok(simd::map::<i32, f32>(v, |x| x as f32))),
            F32x4ConvertI32x4U => self.unary(s, d, |v: u128| Ok(simd::map::<u32, f32>(v, |x| x as f32))),
            I32x4TruncSatF64x2SZero => self.unary(s, d, |v: u128| Ok(simd::map::<f64, i32>(v, |x| x as i32))),
            I32x4TruncSatF64x2UZero => self.unary(s, d, |v: u128| Ok(simd::map::<f64, u32>(v, |x| x as u32))),
            F64x2ConvertLowI32x4S => self.unary(s, d, |v: u128| Ok(simd::extend::<i32, f64>(v, false, f64::from))),
            F64x2ConvertLowI32x4U => self.unary(s, d, |v: u128| Ok(simd::extend::<u32, f64>(v, false, f64::from))),

            I32Add2Local => {
                let (a, b) = instr.local_pair();
                let sum = i32::from(self.local(a)).wrapping_add(i32::from(self.local(b)));
                self.push(d, Value::from(sum));
                Ok(Flow::Next)
            }
            I32AddConstLocal => {
                let (idx, c) = instr.local_const();
                let sum = i32::from(self.local(idx)).wrapping_add(c);
                self.push(d, Value::from(sum));
                Ok(Flow::Next)
            }
            I32AndConstLocal => {
                let (idx, c) = instr.local_const();
                self.push(d, Value::from(i32::from(self.local(idx)) & c));
                Ok(Flow::Next)
            }
            I32StoreLocal => {
                let value = i32::from(self.local(instr.local_mem_arg()));
                let arg = instr.mem_arg();
                let addr = u32::from(self.pop(s[0]));
                self.mem_mut(instance, arg.mem_idx)
                    .store(addr, arg.offset, value.to_le_bytes())?;
                Ok(Flow::Next)
            }
            I64StoreLocal => {
                let value = i64::from(self.local(instr.local_mem_arg()));
                let arg = instr.mem_arg();
                let addr = u32::from(self.pop(s[0]));
                self.mem_mut(instance, arg.mem_idx)
                    .store(addr, arg.offset, value.to_le_bytes())?;
                Ok(Flow::Next)
            }
            LocalSetI32Const => {
                let (idx, c) = instr.local_const();
                *self.local_mut(idx) = Value::from(c);
                Ok(Flow::Next)
            }
        }
    }
}
