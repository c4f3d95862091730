use {
    std::{collections::HashMap, sync::Arc},
    wasm_machine::{
        wasi::{self, Wasi},
        AbstractMachine, ExternVal, FuncType, ImportName, InstantiationErrorSource, Linker,
        Module, ModuleInstance, ResolutionPolicy, Trap, Val, ValType,
    },
    wast::{parser, parser::ParseBuffer, Wat},
};

fn module(text: &str) -> Arc<Module> {
    let buf = ParseBuffer::new(text).unwrap();
    let mut wat = parser::parse::<Wat>(&buf).unwrap();
    Arc::new(Module::parse(&wat.encode().unwrap()).unwrap())
}

fn constant(machine: &mut AbstractMachine, val: i32) -> ExternVal {
    let func = machine.store_mut().alloc_host_func(
        "constant",
        FuncType::new([], [ValType::I32]),
        move |_, _| Ok(vec![Val::I32(val)]),
    );
    ExternVal::Func(func)
}

fn instantiate_linked(
    machine: &mut AbstractMachine,
    module: &Arc<Module>,
    instances: &[(&str, &ModuleInstance)],
) -> Arc<ModuleInstance> {
    let mut linker = Linker::new(module);
    for (name, instance) in instances {
        linker.link_instance(machine.store(), name, instance);
    }
    let imports = linker.finish().unwrap();
    machine.instantiate(module, &imports).unwrap()
}

#[test]
fn later_link_calls_fill_remaining_imports() {
    let module = module(r#"
        (module (import "wasi_snapshot_preview1" "fd_write"
          (func (param i32 i32 i32 i32) (result i32))))
    "#);
    let mut machine = AbstractMachine::new();
    let mut linker = Linker::new(&module);
    linker.link(machine.store(), &HashMap::new());
    let error = linker.finish().unwrap_err();
    assert_eq!(
        error.missing_imports,
        vec![ImportName::new("wasi_snapshot_preview1", "fd_write")]
    );

    let externs = Wasi::new().link(machine.store_mut());
    linker.link(machine.store(), &externs);
    let imports = linker.finish().unwrap();
    assert_eq!(
        imports,
        vec![externs[&ImportName::new("wasi_snapshot_preview1", "fd_write")]]
    );
}

#[test]
fn resolution_policy_breaks_ties() {
    let module = module(r#"(module (import "env" "f" (func (result i32))))"#);
    let mut machine = AbstractMachine::new();
    let first = constant(&mut machine, 1);
    let second = constant(&mut machine, 2);
    let name = ImportName::new("env", "f");
    let first_map = HashMap::from([(name.clone(), first)]);
    let second_map = HashMap::from([(name, second)]);

    let mut linker = Linker::new(&module);
    linker.link(machine.store(), &first_map);
    linker.link(machine.store(), &second_map);
    assert_eq!(linker.finish().unwrap(), vec![first]);

    let mut linker = Linker::new(&module).with_policy(ResolutionPolicy::PreferLatest);
    linker.link(machine.store(), &first_map);
    linker.link(machine.store(), &second_map);
    assert_eq!(linker.finish().unwrap(), vec![second]);
}

#[test]
fn candidates_of_the_wrong_type_are_skipped() {
    let module = module(r#"(module (import "env" "f" (func (param i64))))"#);
    let mut machine = AbstractMachine::new();
    let wrong = constant(&mut machine, 1);
    let mut linker = Linker::new(&module);
    linker.link(machine.store(), &HashMap::from([(ImportName::new("env", "f"), wrong)]));
    let unresolved: Vec<_> = linker.unresolved_imports().map(|(name, _)| name.clone()).collect();
    assert_eq!(unresolved, vec![ImportName::new("env", "f")]);
}

#[test]
fn instantiation_rejects_mismatched_imports() {
    let module = module(r#"(module (import "env" "f" (func (param i64))))"#);
    let mut machine = AbstractMachine::new();
    let wrong = constant(&mut machine, 1);
    let error = machine.instantiate(&module, &[wrong]).unwrap_err();
    assert_eq!(error.source, InstantiationErrorSource::Linking);
    assert!(error.trap.is_none());
}

#[test]
fn invalid_modules_fail_to_instantiate() {
    let module = module(r#"(module (func (result i32) (i64.const 0)))"#);
    let mut machine = AbstractMachine::new();
    let error = machine.instantiate(&module, &[]).unwrap_err();
    assert_eq!(error.source, InstantiationErrorSource::Linking);
    assert!(error.message.starts_with("invalid module"));
}

#[test]
fn start_function_traps_are_reported_as_such() {
    let module = module(r#"(module (func $start (unreachable)) (start $start))"#);
    let mut machine = AbstractMachine::new();
    let error = machine.instantiate(&module, &[]).unwrap_err();
    assert_eq!(error.source, InstantiationErrorSource::StartFunction);
    assert_eq!(error.trap, Some(Trap::Unreachable));
}

#[test]
fn instances_share_memory_and_tables() {
    let lib = module(r#"
        (module
          (memory (export "mem") 1)
          (table (export "tab") 2 funcref)
          (func $seven (result i32) (i32.const 7))
          (elem (i32.const 0) func $seven)
          (func (export "peek") (result i32) (i32.load (i32.const 0))))
    "#);
    let main = module(r#"
        (module
          (import "lib" "mem" (memory 1))
          (import "lib" "tab" (table 2 funcref))
          (type $r (func (result i32)))
          (func (export "run") (result i32)
            (i32.store (i32.const 0) (call_indirect (type $r) (i32.const 0)))
            (i32.const 0)
            (i32.load)))
    "#);
    let mut machine = AbstractMachine::new();
    let lib = instantiate_linked(&mut machine, &lib, &[]);
    let main = instantiate_linked(&mut machine, &main, &[("lib", &*lib)]);
    let run = main.func_export("run").unwrap();
    assert_eq!(machine.invoke(run, &[]), Ok(vec![Val::I32(7)]));
    let peek = lib.func_export("peek").unwrap();
    assert_eq!(machine.invoke(peek, &[]), Ok(vec![Val::I32(7)]));
}

#[test]
fn imported_tags_catch_exceptions_across_instances() {
    let lib = module(r#"
        (module
          (tag $e (export "e") (param i32))
          (func (export "raise") (param i32) (throw $e (local.get 0))))
    "#);
    let main = module(r#"
        (module
          (import "lib" "e" (tag $e (param i32)))
          (import "lib" "raise" (func $raise (param i32)))
          (func (export "run") (param i32) (result i32)
            (block $h (result i32)
              (try_table (catch $e $h) (call $raise (local.get 0)))
              (i32.const 0))))
    "#);
    let mut machine = AbstractMachine::new();
    let lib = instantiate_linked(&mut machine, &lib, &[]);
    let main = instantiate_linked(&mut machine, &main, &[("lib", &*lib)]);
    let run = main.func_export("run").unwrap();
    assert_eq!(machine.invoke(run, &[Val::I32(9)]), Ok(vec![Val::I32(9)]));

    let mismatched = module(r#"(module (import "lib" "e" (tag (param i64))))"#);
    let mut linker = Linker::new(&mismatched);
    linker.link_instance(machine.store(), "lib", &lib);
    assert!(linker.finish().is_err());
}

#[test]
fn wasi_arguments_and_exit() {
    let module = module(r#"
        (module
          (import "wasi_snapshot_preview1" "args_sizes_get" (func $sizes (param i32 i32) (result i32)))
          (import "wasi_snapshot_preview1" "proc_exit" (func $exit (param i32)))
          (memory (export "memory") 1)
          (func (export "argc") (result i32)
            (drop (call $sizes (i32.const 0) (i32.const 4)))
            (i32.load (i32.const 0)))
          (func (export "quit") (call $exit (i32.const 3))))
    "#);
    let mut machine = AbstractMachine::new();
    let externs = Wasi::new()
        .args(["prog", "a", "b"])
        .link(machine.store_mut());
    let mut linker = Linker::new(&module);
    linker.link(machine.store(), &externs);
    let imports = linker.finish().unwrap();
    let instance = machine.instantiate(&module, &imports).unwrap();

    let argc = instance.func_export("argc").unwrap();
    assert_eq!(machine.invoke(argc, &[]), Ok(vec![Val::I32(3)]));
    let quit = instance.func_export("quit").unwrap();
    let trap = machine.invoke(quit, &[]).unwrap_err();
    assert_eq!(wasi::exit_code(&trap), Some(3));
}

#[test]
fn wasi_calls_without_memory_fault() {
    let module = module(r#"
        (module
          (import "wasi_snapshot_preview1" "random_get" (func $random (param i32 i32) (result i32)))
          (func (export "run") (result i32) (call $random (i32.const 0) (i32.const 8))))
    "#);
    let mut machine = AbstractMachine::new();
    let externs = Wasi::new().link(machine.store_mut());
    let mut linker = Linker::new(&module);
    linker.link(machine.store(), &externs);
    let instance = machine
        .instantiate(&module, &linker.finish().unwrap())
        .unwrap();
    let run = instance.func_export("run").unwrap();
    assert_eq!(machine.invoke(run, &[]), Ok(vec![Val::I32(21)]));
}
