use {
    crate::{
        data::DataMode,
        elem::ElemMode,
        extern_val::{ExportDesc, ImportDesc},
        func::FuncType,
        global::{GlobalType, Mut},
        index::{DataIdx, ElemIdx, FuncIdx, GlobalIdx, LabelIdx, LocalIdx, MemIdx, TableIdx, TagIdx, TypeIdx},
        instr::{BlockType, CatchKind, Expression, Imm, Instruction, Opcode},
        mem::MemType,
        module::{Module, ValidationStatus},
        table::TableType,
        val::{RefType, ValType},
    },
    std::{collections::HashSet, mem, ops::Deref},
    thiserror::Error,
    tracing::debug,
};

/// An error that can occur when validating a [`Module`].
#[derive(Clone, Debug, Eq, Error, Hash, PartialEq)]
#[error("{message}")]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Proof that a validation status comes from the validator. Only this module can create one.
#[derive(Debug)]
pub(crate) struct ValidationToken(());

#[derive(Clone, Debug, Default)]
pub(crate) struct Validator {
    locals: Vec<ValType>,
    blocks: Vec<Block>,
    opds: Vec<OpdType>,
    aux_opds: Vec<OpdType>,
}

impl Validator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Validates `module` and records the outcome in its validation status.
    pub(crate) fn validate(&mut self, module: &Module) -> Result<(), ValidationError> {
        let result = self.validate_module(module);
        let status = match &result {
            Ok(()) => ValidationStatus::Valid,
            Err(error) => {
                debug!(%error, "module is invalid");
                ValidationStatus::Invalid(error.clone())
            }
        };
        module.set_validation_status(status, ValidationToken(()));
        result
    }

    fn validate_module(&mut self, module: &Module) -> Result<(), ValidationError> {
        let ctx = ModuleContext::new(module)?;
        // A global initializer may only read the globals before it.
        for (idx, global) in module.globals().iter().enumerate() {
            let global_count = ctx.imported_global_count + idx;
            ctx.validate_const_expr(&global.init, global.type_.val, global_count)?;
        }
        let mut export_names = HashSet::new();
        for export in module.exports() {
            if !export_names.insert(export.name.as_str()) {
                return Err(ValidationError::new("duplicate export name"));
            }
            match export.desc {
                ExportDesc::Func(idx) => {
                    ctx.func(idx)?;
                }
                ExportDesc::Table(idx) => {
                    ctx.table(idx)?;
                }
                ExportDesc::Mem(idx) => {
                    ctx.mem(idx)?;
                }
                ExportDesc::Global(idx) => {
                    ctx.global(idx)?;
                }
                ExportDesc::Tag(idx) => {
                    ctx.tag(idx)?;
                }
            }
        }
        if let Some(start) = module.start() {
            let type_ = ctx.func(start)?;
            if !type_.params().is_empty() || !type_.results().is_empty() {
                return Err(ValidationError::new("start function"));
            }
        }
        for elem in module.elements() {
            for init in &elem.init {
                ctx.validate_const_expr(init, elem.type_.into(), ctx.globals.len())?;
            }
            if let ElemMode::Active { table, offset } = &elem.mode {
                if ctx.table(*table)?.elem != elem.type_ {
                    return Err(ValidationError::new("type mismatch"));
                }
                ctx.validate_const_expr(offset, ValType::I32, ctx.globals.len())?;
            }
        }
        for data in module.data() {
            if let DataMode::Active { mem, offset } = &data.mode {
                ctx.mem(*mem)?;
                ctx.validate_const_expr(offset, ValType::I32, ctx.globals.len())?;
            }
        }
        for (type_idx, code) in module.functions().iter().zip(module.code()) {
            let type_ = ctx.type_(*type_idx)?;
            self.validate_func(&ctx, type_, &code.locals, &code.body)?;
        }
        debug!(functions = module.code().len(), "validated module");
        Ok(())
    }

    fn validate_func(
        &mut self,
        ctx: &ModuleContext<'_>,
        type_: &FuncType,
        locals: &[ValType],
        body: &Expression,
    ) -> Result<(), ValidationError> {
        self.locals.clear();
        self.blocks.clear();
        self.opds.clear();
        let mut validation = Validation {
            ctx,
            locals: &mut self.locals,
            blocks: &mut self.blocks,
            opds: &mut self.opds,
            aux_opds: &mut self.aux_opds,
        };
        validation.locals.extend(type_.params().iter().copied());
        validation.locals.extend(locals.iter().copied());
        validation.push_block(
            BlockKind::Block,
            FuncType::new([], type_.results().iter().copied()),
        );
        for instr in body.instrs() {
            if validation.blocks.is_empty() {
                return Err(ValidationError::new("operators remaining after end of function"));
            }
            validation.validate_instr(instr)?;
        }
        if !validation.blocks.is_empty() {
            return Err(ValidationError::new("unexpected end"));
        }
        Ok(())
    }
}

/// The index spaces of a module, imports first.
#[derive(Debug)]
struct ModuleContext<'a> {
    module: &'a Module,
    funcs: Vec<TypeIdx>,
    tables: Vec<TableType>,
    mems: Vec<MemType>,
    tags: Vec<TypeIdx>,
    globals: Vec<GlobalType>,
    imported_global_count: usize,
    refs: HashSet<FuncIdx>,
}

impl<'a> ModuleContext<'a> {
    fn new(module: &'a Module) -> Result<Self, ValidationError> {
        let mut ctx = Self {
            module,
            funcs: Vec::new(),
            tables: Vec::new(),
            mems: Vec::new(),
            tags: Vec::new(),
            globals: Vec::new(),
            imported_global_count: 0,
            refs: HashSet::new(),
        };
        for import in module.imports() {
            match import.desc {
                ImportDesc::Func(type_idx) => {
                    ctx.type_(type_idx)?;
                    ctx.funcs.push(type_idx);
                }
                ImportDesc::Table(type_) => ctx.push_table(type_)?,
                ImportDesc::Mem(type_) => ctx.push_mem(type_)?,
                ImportDesc::Global(type_) => ctx.globals.push(type_),
                ImportDesc::Tag(type_) => ctx.push_tag(type_.type_idx)?,
            }
        }
        ctx.imported_global_count = ctx.globals.len();
        for &type_idx in module.functions() {
            ctx.type_(type_idx)?;
            ctx.funcs.push(type_idx);
        }
        for &type_ in module.tables() {
            ctx.push_table(type_)?;
        }
        for &type_ in module.memories() {
            ctx.push_mem(type_)?;
        }
        for tag in module.tags() {
            ctx.push_tag(tag.type_idx)?;
        }
        ctx.globals.extend(module.globals().iter().map(|global| global.type_));

        // Functions referenced outside of function bodies may be used with `ref.func`.
        let global_inits = module.globals().iter().map(|global| &global.init);
        let elem_inits = module.elements().iter().flat_map(|elem| elem.init.iter());
        for expr in global_inits.chain(elem_inits) {
            for instr in expr.instrs() {
                if instr.opcode() == Opcode::RefFunc {
                    ctx.refs.insert(instr.func_idx());
                }
            }
        }
        for export in module.exports() {
            if let ExportDesc::Func(idx) = export.desc {
                ctx.refs.insert(idx);
            }
        }
        Ok(ctx)
    }

    fn push_table(&mut self, type_: TableType) -> Result<(), ValidationError> {
        if !type_.is_valid() {
            return Err(ValidationError::new("size minimum must not be greater than maximum"));
        }
        self.tables.push(type_);
        Ok(())
    }

    fn push_mem(&mut self, type_: MemType) -> Result<(), ValidationError> {
        if !type_.is_valid() {
            return Err(ValidationError::new("memory size must be at most 65536 pages (4GiB)"));
        }
        self.mems.push(type_);
        Ok(())
    }

    fn push_tag(&mut self, type_idx: TypeIdx) -> Result<(), ValidationError> {
        if !self.type_(type_idx)?.results().is_empty() {
            return Err(ValidationError::new("non-empty tag result type"));
        }
        self.tags.push(type_idx);
        Ok(())
    }

    fn type_(&self, idx: TypeIdx) -> Result<&'a FuncType, ValidationError> {
        self.module
            .types()
            .get(idx.to_usize())
            .ok_or_else(|| ValidationError::new(format!("unknown type {}", idx)))
    }

    fn func(&self, idx: FuncIdx) -> Result<&'a FuncType, ValidationError> {
        let type_idx = self
            .funcs
            .get(idx.to_usize())
            .ok_or_else(|| ValidationError::new(format!("unknown function {}", idx)))?;
        self.type_(*type_idx)
    }

    fn table(&self, idx: TableIdx) -> Result<TableType, ValidationError> {
        self.tables
            .get(idx.to_usize())
            .copied()
            .ok_or_else(|| ValidationError::new(format!("unknown table {}", idx)))
    }

    fn mem(&self, idx: MemIdx) -> Result<MemType, ValidationError> {
        self.mems
            .get(idx.to_usize())
            .copied()
            .ok_or_else(|| ValidationError::new(format!("unknown memory {}", idx)))
    }

    fn global(&self, idx: GlobalIdx) -> Result<GlobalType, ValidationError> {
        self.globals
            .get(idx.to_usize())
            .copied()
            .ok_or_else(|| ValidationError::new(format!("unknown global {}", idx)))
    }

    fn tag(&self, idx: TagIdx) -> Result<&'a FuncType, ValidationError> {
        let type_idx = self
            .tags
            .get(idx.to_usize())
            .ok_or_else(|| ValidationError::new(format!("unknown tag {}", idx)))?;
        self.type_(*type_idx)
    }

    fn elem(&self, idx: ElemIdx) -> Result<RefType, ValidationError> {
        self.module
            .elements()
            .get(idx.to_usize())
            .map(|elem| elem.type_)
            .ok_or_else(|| ValidationError::new(format!("unknown elem segment {}", idx)))
    }

    fn data(&self, idx: DataIdx) -> Result<(), ValidationError> {
        let count = self
            .module
            .data_count()
            .ok_or_else(|| ValidationError::new("data count section required"))?;
        if idx.value() >= count {
            return Err(ValidationError::new(format!("unknown data segment {}", idx)));
        }
        Ok(())
    }

    fn validate_const_expr(
        &self,
        expr: &Expression,
        expected: ValType,
        global_count: usize,
    ) -> Result<(), ValidationError> {
        let mut opds = Vec::new();
        for instr in expr.instrs() {
            match instr.opcode() {
                Opcode::I32Const => opds.push(ValType::I32),
                Opcode::I64Const => opds.push(ValType::I64),
                Opcode::F32Const => opds.push(ValType::F32),
                Opcode::F64Const => opds.push(ValType::F64),
                Opcode::V128Const => opds.push(ValType::V128),
                Opcode::RefNull => opds.push(instr.ref_type().into()),
                Opcode::RefFunc => {
                    self.func(instr.func_idx())?;
                    opds.push(ValType::FuncRef);
                }
                Opcode::GlobalGet => {
                    let idx = instr.global_idx();
                    if idx.to_usize() >= global_count {
                        return Err(ValidationError::new(format!("unknown global {}", idx)));
                    }
                    let type_ = self.global(idx)?;
                    if type_.mut_ != Mut::Const {
                        return Err(ValidationError::new("constant expression required"));
                    }
                    opds.push(type_.val);
                }
                opcode @ (Opcode::I32Add | Opcode::I32Sub | Opcode::I32Mul | Opcode::I64Add | Opcode::I64Sub | Opcode::I64Mul) => {
                    let type_ = if matches!(opcode, Opcode::I32Add | Opcode::I32Sub | Opcode::I32Mul) {
                        ValType::I32
                    } else {
                        ValType::I64
                    };
                    for _ in 0..2 {
                        if opds.pop() != Some(type_) {
                            return Err(ValidationError::new("type mismatch"));
                        }
                    }
                    opds.push(type_);
                }
                Opcode::End => break,
                _ => return Err(ValidationError::new("constant expression required")),
            }
        }
        if opds != [expected] {
            return Err(ValidationError::new("type mismatch"));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct Validation<'a> {
    ctx: &'a ModuleContext<'a>,
    locals: &'a mut Vec<ValType>,
    blocks: &'a mut Vec<Block>,
    opds: &'a mut Vec<OpdType>,
    aux_opds: &'a mut Vec<OpdType>,
}

impl<'a> Validation<'a> {
    fn validate_instr(&mut self, instr: &Instruction) -> Result<(), ValidationError> {
        let opcode = instr.opcode();
        match opcode {
            Opcode::Nop => {}
            Opcode::Unreachable => self.set_unreachable(),
            Opcode::Block | Opcode::Loop | Opcode::If | Opcode::TryTable => {
                let type_ = self.resolve_block_type(instr.structured().block_type)?;
                if opcode == Opcode::If {
                    self.pop_opd()?.check(ValType::I32)?;
                }
                for start_type in type_.params().iter().rev().copied() {
                    self.pop_opd()?.check(start_type)?;
                }
                if opcode == Opcode::TryTable {
                    self.validate_catches(instr)?;
                }
                let kind = match opcode {
                    Opcode::Loop => BlockKind::Loop,
                    Opcode::If => BlockKind::If,
                    _ => BlockKind::Block,
                };
                self.push_block(kind, type_);
            }
            Opcode::Else => {
                let block = self.pop_block()?;
                if block.kind != BlockKind::If {
                    return Err(ValidationError::new("unexpected else opcode"));
                }
                self.push_block(BlockKind::Else, block.type_);
            }
            Opcode::End => {
                let block = self.pop_block()?;
                let block = if block.kind == BlockKind::If {
                    self.push_block(BlockKind::Else, block.type_);
                    self.pop_block()?
                } else {
                    block
                };
                for end_type in block.type_.results().iter().copied() {
                    self.push_opd(end_type);
                }
            }
            Opcode::Throw => {
                let type_ = self.ctx.tag(instr.tag_idx())?;
                for param_type in type_.params().iter().rev().copied() {
                    self.pop_opd()?.check(param_type)?;
                }
                self.set_unreachable();
            }
            Opcode::Br => self.validate_br(instr.label_idx())?,
            Opcode::BrIf => {
                let label_idx = instr.label_idx();
                self.pop_opd()?.check(ValType::I32)?;
                self.label(label_idx)?;
                for label_type in self.block(label_idx).label_types().iter().rev().copied() {
                    self.pop_opd()?.check(label_type)?;
                }
                for label_type in self.block(label_idx).label_types().iter().copied() {
                    self.push_opd(label_type);
                }
            }
            Opcode::BrTable => self.validate_br_table(instr)?,
            Opcode::Return => self.validate_br(LabelIdx::new(self.blocks.len() as u32 - 1))?,
            Opcode::Call => {
                let type_ = self.ctx.func(instr.func_idx())?;
                self.apply_func_type(type_)?;
            }
            Opcode::CallIndirect => {
                let (type_idx, table_idx) = instr.call_indirect();
                if self.ctx.table(table_idx)?.elem != RefType::FuncRef {
                    return Err(ValidationError::new("type mismatch"));
                }
                let type_ = self.ctx.type_(type_idx)?;
                self.pop_opd()?.check(ValType::I32)?;
                self.apply_func_type(type_)?;
            }
            Opcode::Drop => {
                self.pop_opd()?;
            }
            Opcode::Select => self.validate_select(None)?,
            Opcode::SelectTyped => self.validate_select(Some(instr.select_types()[0]))?,
            Opcode::LocalGet => {
                let type_ = self.local(instr.local_idx())?;
                self.push_opd(type_);
            }
            Opcode::LocalSet => {
                let type_ = self.local(instr.local_idx())?;
                self.pop_opd()?.check(type_)?;
            }
            Opcode::LocalTee => {
                let type_ = self.local(instr.local_idx())?;
                self.pop_opd()?.check(type_)?;
                self.push_opd(type_);
            }
            Opcode::GlobalGet => {
                let type_ = self.ctx.global(instr.global_idx())?;
                self.push_opd(type_.val);
            }
            Opcode::GlobalSet => {
                let type_ = self.ctx.global(instr.global_idx())?;
                if type_.mut_ != Mut::Var {
                    return Err(ValidationError::new("global is immutable"));
                }
                self.pop_opd()?.check(type_.val)?;
            }
            Opcode::TableGet => {
                let type_ = self.ctx.table(instr.table_idx())?;
                self.pop_opd()?.check(ValType::I32)?;
                self.push_opd(type_.elem);
            }
            Opcode::TableSet => {
                let type_ = self.ctx.table(instr.table_idx())?;
                self.pop_opd()?.check(type_.elem)?;
                self.pop_opd()?.check(ValType::I32)?;
            }
            Opcode::TableGrow => {
                let type_ = self.ctx.table(instr.table_idx())?;
                self.pop_opd()?.check(ValType::I32)?;
                self.pop_opd()?.check(type_.elem)?;
                self.push_opd(ValType::I32);
            }
            Opcode::TableFill => {
                let type_ = self.ctx.table(instr.table_idx())?;
                self.pop_opd()?.check(ValType::I32)?;
                self.pop_opd()?.check(type_.elem)?;
                self.pop_opd()?.check(ValType::I32)?;
            }
            Opcode::RefNull => self.push_opd(instr.ref_type()),
            Opcode::RefIsNull => {
                if !self.pop_opd()?.is_ref() {
                    return Err(ValidationError::new("type mismatch"));
                }
                self.push_opd(ValType::I32);
            }
            Opcode::RefFunc => {
                let idx = instr.func_idx();
                self.ctx.func(idx)?;
                if !self.ctx.refs.contains(&idx) {
                    return Err(ValidationError::new("undeclared function reference"));
                }
                self.push_opd(ValType::FuncRef);
            }
            _ => {
                self.validate_imm(instr)?;
                let signature = opcode
                    .signature()
                    .ok_or_else(|| ValidationError::new(format!("unsupported instruction {}", opcode)))?;
                for &param_type in signature.params.iter().rev() {
                    self.pop_opd()?.check(param_type)?;
                }
                for &result_type in signature.results {
                    self.push_opd(result_type);
                }
            }
        }
        Ok(())
    }

    /// Checks the immediate of an instruction whose stack effect is fixed.
    fn validate_imm(&self, instr: &Instruction) -> Result<(), ValidationError> {
        let opcode = instr.opcode();
        match opcode.imm() {
            Imm::MemArg | Imm::MemLane => {
                let arg = instr.mem_arg();
                self.ctx.mem(arg.mem_idx)?;
                if arg.align > opcode.max_align() {
                    return Err(ValidationError::new("alignment must not be larger than natural"));
                }
                if opcode.imm() == Imm::MemLane && instr.lane() >= opcode.lane_count() {
                    return Err(ValidationError::new("invalid lane index"));
                }
            }
            Imm::Lane => {
                if instr.lane() >= opcode.lane_count() {
                    return Err(ValidationError::new("invalid lane index"));
                }
            }
            Imm::Shuffle => {
                if instr.shuffle().iter().any(|&lane| lane >= 32) {
                    return Err(ValidationError::new("invalid lane index"));
                }
            }
            Imm::Mem => {
                self.ctx.mem(instr.mem_idx())?;
            }
            Imm::MemCopy => {
                let (dst, src) = instr.mem_copy();
                self.ctx.mem(dst)?;
                self.ctx.mem(src)?;
            }
            Imm::MemInit => {
                let (data_idx, mem_idx) = instr.mem_init();
                self.ctx.mem(mem_idx)?;
                self.ctx.data(data_idx)?;
            }
            Imm::Data => self.ctx.data(instr.data_idx())?,
            Imm::Table => {
                self.ctx.table(instr.table_idx())?;
            }
            Imm::TableInit => {
                let (elem_idx, table_idx) = instr.table_init();
                if self.ctx.table(table_idx)?.elem != self.ctx.elem(elem_idx)? {
                    return Err(ValidationError::new("type mismatch"));
                }
            }
            Imm::TableCopy => {
                let (dst, src) = instr.table_copy();
                if self.ctx.table(dst)?.elem != self.ctx.table(src)?.elem {
                    return Err(ValidationError::new("type mismatch"));
                }
            }
            Imm::Elem => {
                self.ctx.elem(instr.elem_idx())?;
            }
            _ => {}
        }
        Ok(())
    }

    fn validate_catches(&self, instr: &Instruction) -> Result<(), ValidationError> {
        for catch in instr.try_table().catches.iter() {
            self.label(catch.label)?;
            let label_types = self.block(catch.label).label_types();
            match catch.kind {
                CatchKind::Catch(tag_idx) => {
                    let type_ = self.ctx.tag(tag_idx)?;
                    if type_.params() != &*label_types {
                        return Err(ValidationError::new("type mismatch"));
                    }
                }
                CatchKind::CatchAll => {
                    if !label_types.is_empty() {
                        return Err(ValidationError::new("type mismatch"));
                    }
                }
                CatchKind::CatchRef(_) | CatchKind::CatchAllRef => {
                    return Err(ValidationError::new("exception references are not supported"));
                }
            }
        }
        Ok(())
    }

    fn validate_br(&mut self, label_idx: LabelIdx) -> Result<(), ValidationError> {
        self.label(label_idx)?;
        for label_type in self.block(label_idx).label_types().iter().rev().copied() {
            self.pop_opd()?.check(label_type)?;
        }
        self.set_unreachable();
        Ok(())
    }

    fn validate_br_table(&mut self, instr: &Instruction) -> Result<(), ValidationError> {
        let args = instr.br_table();
        self.pop_opd()?.check(ValType::I32)?;
        self.label(args.default)?;
        let arity = self.block(args.default).label_types().len();
        for &label_idx in args.labels.iter() {
            self.label(label_idx)?;
            if self.block(label_idx).label_types().len() != arity {
                return Err(ValidationError::new("type mismatch"));
            }
            let mut aux_opds = mem::take(self.aux_opds);
            for label_type in self.block(label_idx).label_types().iter().rev().copied() {
                let opd = self.pop_opd()?;
                opd.check(label_type)?;
                aux_opds.push(opd);
            }
            while let Some(opd) = aux_opds.pop() {
                self.push_opd(opd);
            }
            *self.aux_opds = aux_opds;
        }
        for label_type in self.block(args.default).label_types().iter().rev().copied() {
            self.pop_opd()?.check(label_type)?;
        }
        self.set_unreachable();
        Ok(())
    }

    fn validate_select(&mut self, type_: Option<ValType>) -> Result<(), ValidationError> {
        self.pop_opd()?.check(ValType::I32)?;
        if let Some(type_) = type_ {
            self.pop_opd()?.check(type_)?;
            self.pop_opd()?.check(type_)?;
            self.push_opd(type_);
            return Ok(());
        }
        let input_type_1 = self.pop_opd()?;
        let input_type_0 = self.pop_opd()?;
        if !(input_type_0.is_num_or_vec() && input_type_1.is_num_or_vec()) {
            return Err(ValidationError::new("type mismatch"));
        }
        if let OpdType::ValType(input_type_1) = input_type_1 {
            input_type_0.check(input_type_1)?;
        }
        self.push_opd(if input_type_0.is_unknown() {
            input_type_1
        } else {
            input_type_0
        });
        Ok(())
    }

    fn apply_func_type(&mut self, type_: &FuncType) -> Result<(), ValidationError> {
        for param_type in type_.params().iter().rev().copied() {
            self.pop_opd()?.check(param_type)?;
        }
        for result_type in type_.results().iter().copied() {
            self.push_opd(result_type);
        }
        Ok(())
    }

    fn resolve_block_type(&self, type_: BlockType) -> Result<FuncType, ValidationError> {
        match type_ {
            BlockType::Empty => Ok(FuncType::new([], [])),
            BlockType::Val(val_type) => Ok(FuncType::new([], [val_type])),
            BlockType::Type(idx) => self.ctx.type_(idx).cloned(),
        }
    }

    fn local(&self, idx: LocalIdx) -> Result<ValType, ValidationError> {
        self.locals
            .get(idx.to_usize())
            .copied()
            .ok_or_else(|| ValidationError::new(format!("unknown local {}", idx)))
    }

    fn label(&self, idx: LabelIdx) -> Result<(), ValidationError> {
        if idx.to_usize() >= self.blocks.len() {
            return Err(ValidationError::new(format!("unknown label {}", idx)));
        }
        Ok(())
    }

    fn block(&self, idx: LabelIdx) -> &Block {
        &self.blocks[self.blocks.len() - 1 - idx.to_usize()]
    }

    fn push_block(&mut self, kind: BlockKind, type_: FuncType) {
        self.blocks.push(Block {
            kind,
            type_,
            is_unreachable: false,
            height: self.opds.len(),
        });
        for start_type in self.block(LabelIdx::new(0)).type_.clone().params().iter().copied() {
            self.push_opd(start_type);
        }
    }

    fn pop_block(&mut self) -> Result<Block, ValidationError> {
        for end_type in self.block(LabelIdx::new(0)).type_.clone().results().iter().rev().copied() {
            self.pop_opd()?.check(end_type)?;
        }
        if self.opds.len() != self.block(LabelIdx::new(0)).height {
            return Err(ValidationError::new("type mismatch"));
        }
        Ok(self.blocks.pop().expect("block stack is not empty"))
    }

    fn set_unreachable(&mut self) {
        let height = self.block(LabelIdx::new(0)).height;
        self.opds.truncate(height);
        if let Some(block) = self.blocks.last_mut() {
            block.is_unreachable = true;
        }
    }

    fn push_opd(&mut self, type_: impl Into<OpdType>) {
        self.opds.push(type_.into());
    }

    fn pop_opd(&mut self) -> Result<OpdType, ValidationError> {
        let block = self.block(LabelIdx::new(0));
        if self.opds.len() == block.height {
            if !block.is_unreachable {
                return Err(ValidationError::new("type mismatch"));
            }
            return Ok(OpdType::Unknown);
        }
        Ok(self.opds.pop().expect("operand stack is not empty"))
    }
}

#[derive(Clone, Debug)]
struct Block {
    kind: BlockKind,
    type_: FuncType,
    is_unreachable: bool,
    height: usize,
}

impl Block {
    fn label_types(&self) -> LabelTypes {
        LabelTypes {
            kind: self.kind,
            type_: self.type_.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum BlockKind {
    Block,
    Loop,
    If,
    Else,
}

/// The types a branch to a block carries: its results, or its parameters for a loop.
#[derive(Clone, Debug)]
struct LabelTypes {
    kind: BlockKind,
    type_: FuncType,
}

impl Deref for LabelTypes {
    type Target = [ValType];

    fn deref(&self) -> &Self::Target {
        match self.kind {
            BlockKind::Block | BlockKind::If | BlockKind::Else => self.type_.results(),
            BlockKind::Loop => self.type_.params(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum OpdType {
    ValType(ValType),
    Unknown,
}

impl OpdType {
    fn is_num_or_vec(self) -> bool {
        match self {
            OpdType::ValType(type_) => type_.is_num() || type_.is_vec(),
            OpdType::Unknown => true,
        }
    }

    fn is_ref(self) -> bool {
        match self {
            OpdType::ValType(type_) => type_.is_ref(),
            OpdType::Unknown => true,
        }
    }

    fn is_unknown(self) -> bool {
        matches!(self, OpdType::Unknown)
    }

    fn check(self, expected_type: impl Into<ValType>) -> Result<(), ValidationError> {
        let expected_type = expected_type.into();
        match self {
            OpdType::ValType(actual_type) if actual_type != expected_type => {
                Err(ValidationError::new("type mismatch"))
            }
            _ => Ok(()),
        }
    }
}

impl From<RefType> for OpdType {
    fn from(type_: RefType) -> Self {
        OpdType::ValType(type_.into())
    }
}

impl From<ValType> for OpdType {
    fn from(type_: ValType) -> Self {
        OpdType::ValType(type_)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // (func (export "add") (param i32 i32) (result i32) local.get 0 local.get <idx> i32.add)
    fn add_module(second_local: u8) -> Vec<u8> {
        let mut bytes = b"\0asm\x01\0\0\0".to_vec();
        bytes.extend_from_slice(&[0x01, 0x07, 0x01, 0x60, 0x02, 0x7F, 0x7F, 0x01, 0x7F]);
        bytes.extend_from_slice(&[0x03, 0x02, 0x01, 0x00]);
        bytes.extend_from_slice(&[0x07, 0x07, 0x01, 0x03, b'a', b'd', b'd', 0x00, 0x00]);
        bytes.extend_from_slice(&[
            0x0A, 0x09, 0x01, 0x07, 0x00, 0x20, 0x00, 0x20, second_local, 0x6A, 0x0B,
        ]);
        bytes
    }

    #[test]
    fn accepts_well_typed_function() {
        let module = Module::parse(&add_module(1)).unwrap();
        assert_eq!(module.validate(), Ok(()));
        assert_eq!(module.validation_status(), ValidationStatus::Valid);
    }

    #[test]
    fn rejects_out_of_range_local() {
        let module = Module::parse(&add_module(2)).unwrap();
        let error = module.validate().unwrap_err();
        assert_eq!(error.message(), "unknown local 2");
        assert!(matches!(module.validation_status(), ValidationStatus::Invalid(_)));
    }

    #[test]
    fn operand_types_follow_unreachable() {
        let module = Module::default();
        let ctx = ModuleContext::new(&module).unwrap();
        let mut validator = Validator::new();
        // unreachable i32.add end, with result i32
        let body = Expression::new(vec![
            Instruction::new(Opcode::Unreachable, crate::instr::Args::None),
            Instruction::new(Opcode::I32Add, crate::instr::Args::None),
            Instruction::new(Opcode::End, crate::instr::Args::None),
        ]);
        let type_ = FuncType::new([], [ValType::I32]);
        assert_eq!(validator.validate_func(&ctx, &type_, &[], &body), Ok(()));
        let type_ = FuncType::new([], [ValType::I64]);
        assert!(validator.validate_func(&ctx, &type_, &[], &body).is_err());
    }
}
