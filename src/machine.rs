use {
    crate::{
        config::Config,
        data::{DataInst, DataMode},
        elem::{ElemInst, ElemMode},
        exec,
        extern_val::ExternVal,
        func::{FuncInst, WasmFunc},
        instance::{ConstEvaluator, InstanceAddrs, ModuleInstance},
        instr::Expression,
        module::Module,
        store::{FuncAddr, Store},
        trap::Trap,
        val::{Ref, Val},
    },
    std::{error, fmt, sync::Arc},
    tracing::debug,
};

/// The phase of instantiation that failed.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum InstantiationErrorSource {
    /// The module or its imports were rejected, or an active segment did not fit.
    Linking,
    /// The start function trapped.
    StartFunction,
}

/// An error returned by [`AbstractMachine::instantiate`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstantiationError {
    pub source: InstantiationErrorSource,
    pub message: String,
    /// The trap that caused the failure, if any.
    pub trap: Option<Trap>,
}

impl InstantiationError {
    fn linking(message: impl Into<String>) -> Self {
        Self {
            source: InstantiationErrorSource::Linking,
            message: message.into(),
            trap: None,
        }
    }

    fn trapped(source: InstantiationErrorSource, trap: Trap) -> Self {
        Self {
            source,
            message: trap.reason(),
            trap: Some(trap),
        }
    }
}

impl fmt::Display for InstantiationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.source {
            InstantiationErrorSource::Linking => write!(f, "linking failed: {}", self.message),
            InstantiationErrorSource::StartFunction => {
                write!(f, "start function failed: {}", self.message)
            }
        }
    }
}

impl error::Error for InstantiationError {}

/// A [`Store`] together with the [`Config`] that governs execution against it.
///
/// This is the entry point for running modules: instantiate them with
/// [`instantiate`](Self::instantiate), then call their functions with [`invoke`](Self::invoke).
#[derive(Debug, Default)]
pub struct AbstractMachine {
    store: Store,
    config: Config,
}

impl AbstractMachine {
    /// Creates an [`AbstractMachine`] with an empty [`Store`] and the default [`Config`].
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            store: Store::new(),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }

    /// Instantiates `module` against `imports`, one value per import in declaration order.
    ///
    /// Objects are allocated in namespace order: imports first, then the functions, tables,
    /// memories, globals and tags the module defines. Active segments are copied afterwards,
    /// and the start function runs last.
    ///
    /// # Errors
    ///
    /// - [`InstantiationErrorSource::Linking`] if the module is invalid, if an import does not
    ///   match the type the module requires, or if an active segment is out of bounds. In the
    ///   last case, everything allocated up to that point stays in the [`Store`].
    /// - [`InstantiationErrorSource::StartFunction`] if the start function traps.
    pub fn instantiate(
        &mut self,
        module: &Arc<Module>,
        imports: &[ExternVal],
    ) -> Result<Arc<ModuleInstance>, InstantiationError> {
        module
            .validate()
            .map_err(|error| InstantiationError::linking(format!("invalid module: {}", error)))?;
        if imports.len() != module.imports().len() {
            return Err(InstantiationError::linking(format!(
                "expected {} imports, got {}",
                module.imports().len(),
                imports.len()
            )));
        }

        let mut addrs = InstanceAddrs::default();
        for (import, &val) in module.imports().iter().zip(imports) {
            let matches = match (self.store.extern_type(val), module.import_type(&import.desc)) {
                (Some(actual), Some(required)) => actual.matches(&required),
                _ => false,
            };
            if !matches {
                return Err(InstantiationError::linking(format!(
                    "incompatible import type for {}::{}",
                    import.module, import.name
                )));
            }
            match val {
                ExternVal::Func(addr) => addrs.funcs.push(addr),
                ExternVal::Table(addr) => addrs.tables.push(addr),
                ExternVal::Mem(addr) => addrs.mems.push(addr),
                ExternVal::Global(addr) => addrs.globals.push(addr),
                ExternVal::Tag(addr) => addrs.tags.push(addr),
            }
        }

        // Defined functions can only be allocated once the instance exists, but constant
        // expressions may already refer to them.
        let first_func = self.store.func_count();
        addrs.funcs.extend(
            (0..module.functions().len()).map(|idx| FuncAddr::new((first_func + idx) as u32)),
        );
        for &type_ in module.tables() {
            let addr = self
                .store
                .alloc_table(type_, Ref::null(type_.elem))
                .map_err(|error| InstantiationError::linking(error.to_string()))?;
            addrs.tables.push(addr);
        }
        for &type_ in module.memories() {
            addrs.mems.push(self.store.alloc_mem(type_));
        }
        for global in module.globals() {
            let val = self.evaluator(&addrs).eval(&global.init);
            let addr = self
                .store
                .alloc_global(global.type_, val)
                .map_err(|error| InstantiationError::linking(error.to_string()))?;
            addrs.globals.push(addr);
        }
        for tag in module.tags() {
            let type_ = module.types()[tag.type_idx.to_usize()].clone();
            addrs.tags.push(self.store.alloc_tag(tag.attribute, type_));
        }
        for element in module.elements() {
            let evaluator = self.evaluator(&addrs);
            let refs = element
                .init
                .iter()
                .map(|expr| {
                    evaluator
                        .eval(expr)
                        .to_ref()
                        .expect("element expression yields a reference")
                })
                .collect();
            addrs
                .elems
                .push(self.store.alloc_elem(ElemInst::new(element.type_, refs)));
        }
        for data in module.data() {
            addrs
                .datas
                .push(self.store.alloc_data(DataInst::new(data.init.clone())));
        }

        let instance = Arc::new(ModuleInstance::new(module.clone(), addrs));
        for (code_idx, type_idx) in module.functions().iter().enumerate() {
            let type_ = module.types()[type_idx.to_usize()].clone();
            self.store.alloc_func(FuncInst::Wasm(WasmFunc::new(
                type_,
                instance.clone(),
                code_idx,
            )));
        }

        self.init_elems(module, &instance)?;
        self.init_datas(module, &instance)?;
        debug!(
            imports = imports.len(),
            funcs = module.functions().len(),
            "instantiated module"
        );

        if let Some(start) = module.start() {
            let func = instance.func_addr(start).expect("start function is defined");
            self.invoke(func, &[])
                .map_err(|trap| InstantiationError::trapped(InstantiationErrorSource::StartFunction, trap))?;
        }
        Ok(instance)
    }

    fn evaluator<'a>(&'a self, addrs: &'a InstanceAddrs) -> ConstEvaluator<'a> {
        ConstEvaluator {
            store: &self.store,
            funcs: &addrs.funcs,
            globals: &addrs.globals,
        }
    }

    fn offset(&self, instance: &ModuleInstance, expr: &Expression) -> u32 {
        let evaluator = ConstEvaluator {
            store: &self.store,
            funcs: instance.func_addrs(),
            globals: instance.global_addrs(),
        };
        evaluator
            .eval(expr)
            .to_i32()
            .expect("offset expression yields an i32") as u32
    }

    fn init_elems(&mut self, module: &Module, instance: &ModuleInstance) -> Result<(), InstantiationError> {
        for (idx, element) in module.elements().iter().enumerate() {
            let elem_addr = instance.addrs().elems[idx];
            match &element.mode {
                ElemMode::Active { table, offset } => {
                    let offset = self.offset(instance, offset);
                    let table_addr = instance.table_addr(*table).expect("table is defined");
                    let (table, elem) = self
                        .store
                        .table_and_elem_mut(table_addr, elem_addr)
                        .expect("table and element segment are allocated");
                    let count = elem.refs().len() as u32;
                    table
                        .init(offset, elem.refs(), 0, count)
                        .map_err(|trap| InstantiationError::trapped(InstantiationErrorSource::Linking, trap))?;
                }
                ElemMode::Declarative => {}
                ElemMode::Passive => continue,
            }
            self.store
                .elem_mut(elem_addr)
                .expect("element segment is allocated")
                .drop_refs();
        }
        Ok(())
    }

    fn init_datas(&mut self, module: &Module, instance: &ModuleInstance) -> Result<(), InstantiationError> {
        for (idx, data) in module.data().iter().enumerate() {
            let DataMode::Active { mem, offset } = &data.mode else {
                continue;
            };
            let data_addr = instance.addrs().datas[idx];
            let offset = self.offset(instance, offset);
            let mem_addr = instance.mem_addr(*mem).expect("memory is defined");
            let (mem, data) = self
                .store
                .mem_and_data_mut(mem_addr, data_addr)
                .expect("memory and data segment are allocated");
            let count = data.bytes().len() as u32;
            mem.init(offset, data.bytes(), 0, count)
                .map_err(|trap| InstantiationError::trapped(InstantiationErrorSource::Linking, trap))?;
            self.store
                .data_mut(data_addr)
                .expect("data segment is allocated")
                .drop_bytes();
        }
        Ok(())
    }

    /// Calls the function at `func` with `args` and returns its results.
    ///
    /// # Errors
    ///
    /// If the arguments do not match the function type, or if execution traps.
    pub fn invoke(&mut self, func: FuncAddr, args: &[Val]) -> Result<Vec<Val>, Trap> {
        exec::invoke(&mut self.store, &self.config, func, args)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            func::FuncType,
            global::{GlobalType, Mut},
            val::ValType,
        },
    };

    #[test]
    fn host_functions_can_be_invoked_directly() {
        let mut machine = AbstractMachine::new();
        let type_ = FuncType::new([ValType::I32, ValType::I32], [ValType::I32]);
        let add = machine.store_mut().alloc_host_func("add", type_, |_, args| {
            let (x, y) = (args[0].to_i32().unwrap_or(0), args[1].to_i32().unwrap_or(0));
            Ok(vec![Val::I32(x.wrapping_add(y))])
        });
        assert_eq!(machine.invoke(add, &[Val::I32(40), Val::I32(2)]), Ok(vec![Val::I32(42)]));
    }

    #[test]
    fn invoke_rejects_mismatched_arguments() {
        let mut machine = AbstractMachine::new();
        let type_ = FuncType::new([ValType::I32], []);
        let func = machine
            .store_mut()
            .alloc_host_func("f", type_, |_, _| Ok(Vec::new()));
        assert!(matches!(
            machine.invoke(func, &[Val::I64(1)]),
            Err(Trap::InvalidArguments(_))
        ));
        assert!(matches!(machine.invoke(func, &[]), Err(Trap::InvalidArguments(_))));
    }

    #[test]
    fn host_results_are_type_checked() {
        let mut machine = AbstractMachine::new();
        let type_ = FuncType::new([], [ValType::I32]);
        let func = machine
            .store_mut()
            .alloc_host_func("f", type_, |_, _| Ok(vec![Val::F32(1.0)]));
        assert!(matches!(machine.invoke(func, &[]), Err(Trap::Host(_))));
    }

    #[test]
    fn import_count_must_match() {
        let mut machine = AbstractMachine::new();
        let global = machine
            .store_mut()
            .alloc_global(GlobalType::new(ValType::I32, Mut::Const), Val::I32(0))
            .unwrap();
        let module = Arc::new(Module::default());
        let error = machine
            .instantiate(&module, &[ExternVal::Global(global)])
            .unwrap_err();
        assert_eq!(error.source, InstantiationErrorSource::Linking);
    }
}
