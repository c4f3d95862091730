use {
    crate::{
        extern_val::{ExportDesc, ExternVal, ImportDesc},
        func::FuncType,
        index::{DataIdx, ElemIdx, FuncIdx, GlobalIdx, MemIdx, TableIdx, TagIdx, TypeIdx},
        instr::{Expression, Opcode},
        module::Module,
        store::{DataAddr, ElemAddr, FuncAddr, GlobalAddr, MemAddr, Store, TableAddr, TagAddr},
        val::{Ref, Val},
    },
    std::sync::Arc,
};

/// The runtime counterpart of a [`Module`].
///
/// Every namespace holds the addresses of the imported objects first, followed by those of the
/// objects the module defines. The objects themselves live in a [`Store`].
#[derive(Debug)]
pub struct ModuleInstance {
    module: Arc<Module>,
    func_types: Vec<FuncType>,
    tag_types: Vec<FuncType>,
    addrs: InstanceAddrs,
    exports: Vec<(String, ExternVal)>,
}

/// The address vectors of a [`ModuleInstance`], in namespace order.
#[derive(Clone, Debug, Default)]
pub(crate) struct InstanceAddrs {
    pub(crate) funcs: Vec<FuncAddr>,
    pub(crate) tables: Vec<TableAddr>,
    pub(crate) mems: Vec<MemAddr>,
    pub(crate) globals: Vec<GlobalAddr>,
    pub(crate) tags: Vec<TagAddr>,
    pub(crate) elems: Vec<ElemAddr>,
    pub(crate) datas: Vec<DataAddr>,
}

impl ModuleInstance {
    pub(crate) fn new(module: Arc<Module>, addrs: InstanceAddrs) -> Self {
        let types = module.types();
        let func_types = module
            .func_type_idxs()
            .map(|idx| types[idx.to_usize()].clone())
            .collect();
        let imported_tags = module.imports().iter().filter_map(|import| match import.desc {
            ImportDesc::Tag(type_) => Some(type_),
            _ => None,
        });
        let tag_types = imported_tags
            .chain(module.tags().iter().copied())
            .map(|type_| types[type_.type_idx.to_usize()].clone())
            .collect();
        let exports = module
            .exports()
            .iter()
            .map(|export| {
                let val = match export.desc {
                    ExportDesc::Func(idx) => ExternVal::Func(addrs.funcs[idx.to_usize()]),
                    ExportDesc::Table(idx) => ExternVal::Table(addrs.tables[idx.to_usize()]),
                    ExportDesc::Mem(idx) => ExternVal::Mem(addrs.mems[idx.to_usize()]),
                    ExportDesc::Global(idx) => ExternVal::Global(addrs.globals[idx.to_usize()]),
                    ExportDesc::Tag(idx) => ExternVal::Tag(addrs.tags[idx.to_usize()]),
                };
                (export.name.clone(), val)
            })
            .collect();
        Self {
            module,
            func_types,
            tag_types,
            addrs,
            exports,
        }
    }

    /// Returns the [`Module`] this instance was created from.
    pub fn module(&self) -> &Arc<Module> {
        &self.module
    }

    pub fn type_(&self, idx: TypeIdx) -> Option<&FuncType> {
        self.module.types().get(idx.to_usize())
    }

    /// Returns the type of the function with the given index.
    pub fn func_type(&self, idx: FuncIdx) -> Option<&FuncType> {
        self.func_types.get(idx.to_usize())
    }

    /// Returns the payload type of the tag with the given index.
    pub fn tag_type(&self, idx: TagIdx) -> Option<&FuncType> {
        self.tag_types.get(idx.to_usize())
    }

    pub fn func_addr(&self, idx: FuncIdx) -> Option<FuncAddr> {
        self.addrs.funcs.get(idx.to_usize()).copied()
    }

    pub fn table_addr(&self, idx: TableIdx) -> Option<TableAddr> {
        self.addrs.tables.get(idx.to_usize()).copied()
    }

    pub fn mem_addr(&self, idx: MemIdx) -> Option<MemAddr> {
        self.addrs.mems.get(idx.to_usize()).copied()
    }

    pub fn global_addr(&self, idx: GlobalIdx) -> Option<GlobalAddr> {
        self.addrs.globals.get(idx.to_usize()).copied()
    }

    pub fn tag_addr(&self, idx: TagIdx) -> Option<TagAddr> {
        self.addrs.tags.get(idx.to_usize()).copied()
    }

    pub(crate) fn elem_addr(&self, idx: ElemIdx) -> Option<ElemAddr> {
        self.addrs.elems.get(idx.to_usize()).copied()
    }

    pub(crate) fn data_addr(&self, idx: DataIdx) -> Option<DataAddr> {
        self.addrs.datas.get(idx.to_usize()).copied()
    }

    pub(crate) fn addrs(&self) -> &InstanceAddrs {
        &self.addrs
    }

    pub fn func_addrs(&self) -> &[FuncAddr] {
        &self.addrs.funcs
    }

    pub fn table_addrs(&self) -> &[TableAddr] {
        &self.addrs.tables
    }

    pub fn mem_addrs(&self) -> &[MemAddr] {
        &self.addrs.mems
    }

    pub fn global_addrs(&self) -> &[GlobalAddr] {
        &self.addrs.globals
    }

    pub fn tag_addrs(&self) -> &[TagAddr] {
        &self.addrs.tags
    }

    /// Returns the exports of this instance, in declaration order.
    pub fn exports(&self) -> impl Iterator<Item = (&str, ExternVal)> {
        self.exports.iter().map(|(name, val)| (name.as_str(), *val))
    }

    /// Returns the export with the given name, if any.
    pub fn export(&self, name: &str) -> Option<ExternVal> {
        self.exports
            .iter()
            .find(|(export_name, _)| export_name == name)
            .map(|(_, val)| *val)
    }

    /// Returns the function exported under the given name, if any.
    pub fn func_export(&self, name: &str) -> Option<FuncAddr> {
        self.export(name)?.to_func()
    }
}

/// Evaluates constant expressions against the addresses an instance has so far.
///
/// Validation restricts constant expressions to constants, `ref.func`, reads of earlier
/// immutable globals and integer `add`, `sub` and `mul`, so evaluation cannot fail.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ConstEvaluator<'a> {
    pub(crate) store: &'a Store,
    pub(crate) funcs: &'a [FuncAddr],
    pub(crate) globals: &'a [GlobalAddr],
}

impl ConstEvaluator<'_> {
    pub(crate) fn eval(&self, expr: &Expression) -> Val {
        let mut stack = Vec::with_capacity(2);
        for instr in expr.instrs() {
            let val = match instr.opcode() {
                Opcode::I32Const => Val::I32(instr.i32()),
                Opcode::I64Const => Val::I64(instr.i64()),
                Opcode::F32Const => Val::F32(f32::from_bits(instr.f32_bits())),
                Opcode::F64Const => Val::F64(f64::from_bits(instr.f64_bits())),
                Opcode::V128Const => Val::V128(instr.v128()),
                Opcode::RefNull => Ref::null(instr.ref_type()).into(),
                Opcode::RefFunc => Val::FuncRef(Some(self.funcs[instr.func_idx().to_usize()])),
                Opcode::GlobalGet => {
                    let addr = self.globals[instr.global_idx().to_usize()];
                    self.store.global(addr).expect("global is allocated").get()
                }
                opcode @ (Opcode::I32Add | Opcode::I32Sub | Opcode::I32Mul) => {
                    let (x1, x0) = (pop_i32(&mut stack), pop_i32(&mut stack));
                    Val::I32(match opcode {
                        Opcode::I32Add => x0.wrapping_add(x1),
                        Opcode::I32Sub => x0.wrapping_sub(x1),
                        _ => x0.wrapping_mul(x1),
                    })
                }
                opcode @ (Opcode::I64Add | Opcode::I64Sub | Opcode::I64Mul) => {
                    let (x1, x0) = (pop_i64(&mut stack), pop_i64(&mut stack));
                    Val::I64(match opcode {
                        Opcode::I64Add => x0.wrapping_add(x1),
                        Opcode::I64Sub => x0.wrapping_sub(x1),
                        _ => x0.wrapping_mul(x1),
                    })
                }
                Opcode::End => break,
                opcode => panic!("`{}` is not a constant instruction", opcode),
            };
            stack.push(val);
        }
        stack.pop().expect("constant expression yields a value")
    }
}

fn pop_i32(stack: &mut Vec<Val>) -> i32 {
    stack.pop().and_then(Val::to_i32).expect("operand is an i32")
}

fn pop_i64(stack: &mut Vec<Val>) -> i64 {
    stack.pop().and_then(Val::to_i64).expect("operand is an i64")
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            global::{GlobalType, Mut},
            instr::{Args, Instruction},
            val::ValType,
        },
    };

    #[test]
    fn evaluates_extended_constant_expressions() {
        let mut store = Store::new();
        let global = store
            .alloc_global(GlobalType::new(ValType::I32, Mut::Const), Val::I32(40))
            .unwrap();
        let expr = Expression::new(vec![
            Instruction::new(Opcode::GlobalGet, Args::Global(GlobalIdx::new(0))),
            Instruction::new(Opcode::I32Const, Args::I32(3)),
            Instruction::new(Opcode::I32Sub, Args::None),
            Instruction::new(Opcode::I32Const, Args::I32(5)),
            Instruction::new(Opcode::I32Add, Args::None),
            Instruction::new(Opcode::End, Args::None),
        ]);
        let evaluator = ConstEvaluator {
            store: &store,
            funcs: &[],
            globals: &[global],
        };
        assert_eq!(evaluator.eval(&expr), Val::I32(42));
    }
}
