#![no_main]

use {
    libfuzzer_sys::fuzz_target,
    std::sync::Arc,
    wasm_machine::{
        AbstractMachine, Config, DispatchMode, ExternVal, Linker, Module, ModuleInstance, Trap,
        Val,
    },
};

fn instantiate(
    module: &Arc<Module>,
    dispatch: DispatchMode,
) -> Option<(AbstractMachine, Arc<ModuleInstance>)> {
    let mut machine = AbstractMachine::with_config(
        Config::new()
            .dispatch(dispatch)
            .compile_threshold(0)
            .instruction_limit(Some(100_000)),
    );
    let imports = Linker::new(module).finish().ok()?;
    let instance = machine.instantiate(module, &imports).ok()?;
    Some((machine, instance))
}

fn same_outcome(naive: &Result<Vec<Val>, Trap>, compiled: &Result<Vec<Val>, Trap>) -> bool {
    match (naive, compiled) {
        (Ok(naive), Ok(compiled)) => {
            naive.len() == compiled.len()
                && naive
                    .iter()
                    .zip(compiled)
                    .all(|(&naive, &compiled)| naive.bitwise_eq(compiled))
        }
        (Err(naive), Err(compiled)) => naive.reason() == compiled.reason(),
        _ => false,
    }
}

fuzz_target!(|module: wasm_smith::Module| {
    let bytes = module.to_bytes();
    let Ok(module) = Module::parse(&bytes) else {
        return;
    };
    if module.validate().is_err() {
        return;
    }
    let module = Arc::new(module);
    let naive = instantiate(&module, DispatchMode::Naive);
    let compiled = instantiate(&module, DispatchMode::Compiled);
    let (Some((mut naive, instance)), Some((mut compiled, _))) = (naive, compiled) else {
        assert!(
            instantiate(&module, DispatchMode::Naive).is_none()
                && instantiate(&module, DispatchMode::Compiled).is_none(),
            "instantiation succeeded in only one dispatch mode"
        );
        return;
    };
    // Both machines allocate in the same order, so one instance's addresses are valid in both.
    for (name, export) in instance.exports() {
        let ExternVal::Func(func) = export else {
            continue;
        };
        let Some(params) = naive
            .store()
            .func(func)
            .map(|func| func.type_().params().to_vec())
        else {
            continue;
        };
        let args: Vec<Val> = params.iter().map(|type_| type_.default_val()).collect();
        let naive_outcome = naive.invoke(func, &args);
        let compiled_outcome = compiled.invoke(func, &args);
        assert!(
            same_outcome(&naive_outcome, &compiled_outcome),
            "`{}` returned {:?} under naive dispatch but {:?} compiled",
            name,
            naive_outcome,
            compiled_outcome
        );
    }
    for (name, export) in instance.exports() {
        if let ExternVal::Mem(mem) = export {
            let naive_bytes = naive.store().mem(mem).map(|mem| mem.bytes());
            let compiled_bytes = compiled.store().mem(mem).map(|mem| mem.bytes());
            assert!(naive_bytes == compiled_bytes, "memory `{}` differs", name);
        }
    }
});
