use {
    std::{collections::HashMap, sync::Arc},
    wasm_machine::{
        AbstractMachine, Config, DispatchMode, Error, ExternAddr, ExternVal, FuncType,
        GlobalType, ImportName, Linker, MemType, Module, ModuleInstance, Mut, Ref, RefType,
        TableType, Val, ValType,
    },
    wast::{
        core::{HeapType, NanPattern, V128Pattern, WastArgCore, WastRetCore},
        parser,
        parser::ParseBuffer,
        QuoteWat, Wast, WastArg, WastDirective, WastExecute, WastInvoke, WastRet, Wat,
    },
};

pub struct WastRunner {
    machine: AbstractMachine,
    registered: HashMap<ImportName, ExternVal>,
    instances_by_name: HashMap<String, Arc<ModuleInstance>>,
    current_instance: Option<Arc<ModuleInstance>>,
}

impl WastRunner {
    pub fn new(config: Config) -> Self {
        let mut machine = AbstractMachine::with_config(config);
        let store = machine.store_mut();
        let mut registered = HashMap::new();
        let mut define = |name: &str, val: ExternVal| {
            registered.insert(ImportName::new("spectest", name), val);
        };
        for (name, params) in [
            ("print", vec![]),
            ("print_i32", vec![ValType::I32]),
            ("print_i64", vec![ValType::I64]),
            ("print_f32", vec![ValType::F32]),
            ("print_f64", vec![ValType::F64]),
            ("print_i32_f32", vec![ValType::I32, ValType::F32]),
            ("print_f64_f64", vec![ValType::F64, ValType::F64]),
        ] {
            let func = store.alloc_host_func(name, FuncType::new(params, []), |_, args| {
                let args: Vec<String> = args.iter().map(ToString::to_string).collect();
                println!("{}", args.join(" "));
                Ok(Vec::new())
            });
            define(name, ExternVal::Func(func));
        }
        let table = store
            .alloc_table(
                TableType::new(RefType::FuncRef, 10, Some(20)),
                Ref::null(RefType::FuncRef),
            )
            .unwrap();
        define("table", ExternVal::Table(table));
        let memory = store.alloc_mem(MemType::new(1, Some(2)));
        define("memory", ExternVal::Mem(memory));
        for (name, val) in [
            ("global_i32", Val::I32(666)),
            ("global_i64", Val::I64(666)),
            ("global_f32", Val::F32(666.6)),
            ("global_f64", Val::F64(666.6)),
        ] {
            let global = store
                .alloc_global(GlobalType::new(val.type_(), Mut::Const), val)
                .unwrap();
            define(name, ExternVal::Global(global));
        }
        WastRunner {
            machine,
            registered,
            instances_by_name: HashMap::new(),
            current_instance: None,
        }
    }

    pub fn run(&mut self, string: &str) {
        let buf = ParseBuffer::new(string).unwrap();
        let wast = parser::parse::<Wast>(&buf).unwrap();
        for directive in wast.directives {
            match directive {
                WastDirective::Wat(QuoteWat::Wat(Wat::Module(mut module))) => {
                    let name = module.id.map(|id| id.name());
                    let bytes = module.encode().unwrap();
                    self.create_instance(name, &bytes).unwrap();
                }
                WastDirective::Wat(mut wat @ QuoteWat::QuoteModule(_, _)) => {
                    let bytes = wat.encode().unwrap();
                    self.create_instance(None, &bytes).unwrap();
                }
                WastDirective::AssertMalformed {
                    module: mut wat, ..
                } => {
                    if let Ok(bytes) = wat.encode() {
                        let error = self.create_instance(None, &bytes).unwrap_err();
                        assert!(matches!(error, Error::Parse(_)), "{}", error);
                    }
                }
                WastDirective::AssertInvalid {
                    module: mut wat, ..
                } => {
                    let bytes = wat.encode().unwrap();
                    let error = self.create_instance(None, &bytes).unwrap_err();
                    assert!(matches!(error, Error::Validation(_)), "{}", error);
                }
                WastDirective::AssertUnlinkable {
                    module: Wat::Module(mut module),
                    ..
                } => {
                    let bytes = module.encode().unwrap();
                    self.create_instance(None, &bytes).unwrap_err();
                }
                WastDirective::Register { name, module, .. } => {
                    let instance = self
                        .get_instance(module.map(|module| module.name()))
                        .unwrap()
                        .clone();
                    self.register(name, instance);
                }
                WastDirective::Invoke(invoke) => {
                    self.invoke(invoke).unwrap();
                }
                WastDirective::AssertTrap { exec, message, .. } => {
                    let error = self.execute(exec).unwrap_err();
                    assert!(
                        error.to_string().contains(message),
                        "expected trap {:?}, got {}",
                        message,
                        error
                    );
                }
                WastDirective::AssertExhaustion { call, message, .. } => {
                    let error = self.invoke(call).unwrap_err();
                    assert!(error.to_string().contains(message), "{}", error);
                }
                WastDirective::AssertException { exec, .. } => {
                    let error = self.execute(exec).unwrap_err();
                    assert!(error.to_string().contains("uncaught exception"), "{}", error);
                }
                WastDirective::AssertReturn {
                    exec,
                    results: expected_results,
                    ..
                } => {
                    let actual_results = self.execute(exec).unwrap();
                    assert_eq!(actual_results.len(), expected_results.len());
                    for (actual, expected) in actual_results.into_iter().zip(expected_results) {
                        assert_result(actual, expected);
                    }
                }
                _ => {}
            }
        }
    }

    fn get_instance(&self, name: Option<&str>) -> Option<&Arc<ModuleInstance>> {
        name.map_or_else(
            || self.current_instance.as_ref(),
            |name| self.instances_by_name.get(name),
        )
    }

    fn create_instance(&mut self, name: Option<&str>, bytes: &[u8]) -> Result<(), Error> {
        let module = Arc::new(Module::parse(bytes)?);
        module.validate()?;
        let mut linker = Linker::new(&module);
        linker.link(self.machine.store(), &self.registered);
        let imports = linker.finish()?;
        let instance = self.machine.instantiate(&module, &imports)?;
        if let Some(name) = name {
            self.instances_by_name
                .insert(name.to_string(), instance.clone());
        }
        self.current_instance = Some(instance);
        Ok(())
    }

    fn execute(&mut self, exec: WastExecute<'_>) -> Result<Vec<Val>, Error> {
        match exec {
            WastExecute::Invoke(invoke) => self.invoke(invoke),
            WastExecute::Wat(Wat::Module(mut module)) => {
                let bytes = module.encode().unwrap();
                self.create_instance(None, &bytes)?;
                Ok(vec![])
            }
            WastExecute::Get { module, global, .. } => {
                let instance = self
                    .get_instance(module.map(|module| module.name()))
                    .unwrap();
                let Some(ExternVal::Global(addr)) = instance.export(global) else {
                    panic!("no global export {:?}", global);
                };
                Ok(vec![self.machine.store().global(addr).unwrap().get()])
            }
            _ => unimplemented!(),
        }
    }

    fn invoke(&mut self, invoke: WastInvoke<'_>) -> Result<Vec<Val>, Error> {
        let name = invoke.module.map(|module| module.name());
        let func = self
            .get_instance(name)
            .unwrap()
            .func_export(invoke.name)
            .unwrap();
        let args: Vec<Val> = invoke
            .args
            .into_iter()
            .map(|arg| match arg {
                WastArg::Core(arg) => match arg {
                    WastArgCore::I32(arg) => Val::I32(arg),
                    WastArgCore::I64(arg) => Val::I64(arg),
                    WastArgCore::F32(arg) => Val::F32(f32::from_bits(arg.bits)),
                    WastArgCore::F64(arg) => Val::F64(f64::from_bits(arg.bits)),
                    WastArgCore::V128(arg) => Val::V128(u128::from_le_bytes(arg.to_le_bytes())),
                    WastArgCore::RefNull(HeapType::Func) => Val::FuncRef(None),
                    WastArgCore::RefNull(HeapType::Extern) => Val::ExternRef(None),
                    WastArgCore::RefExtern(val) => Val::ExternRef(Some(ExternAddr::new(val))),
                    _ => unimplemented!(),
                },
                _ => unimplemented!(),
            })
            .collect();
        Ok(self.machine.invoke(func, &args)?)
    }

    fn register(&mut self, name: &str, instance: Arc<ModuleInstance>) {
        for (export_name, export_val) in instance.exports() {
            self.registered
                .insert(ImportName::new(name, export_name), export_val);
        }
        self.current_instance = Some(instance);
    }
}

fn assert_f32(actual: f32, expected: &NanPattern<wast::token::Float32>) {
    let bits = actual.to_bits();
    match expected {
        NanPattern::CanonicalNan => assert_eq!(bits & 0x7fff_ffff, 0x7fc0_0000),
        NanPattern::ArithmeticNan => assert!(bits & 0x7fff_ffff >= 0x7fc0_0000),
        NanPattern::Value(expected) => assert_eq!(bits, expected.bits),
    }
}

fn assert_f64(actual: f64, expected: &NanPattern<wast::token::Float64>) {
    let bits = actual.to_bits();
    match expected {
        NanPattern::CanonicalNan => {
            assert_eq!(bits & 0x7fff_ffff_ffff_ffff, 0x7ff8_0000_0000_0000)
        }
        NanPattern::ArithmeticNan => {
            assert!(bits & 0x7fff_ffff_ffff_ffff >= 0x7ff8_0000_0000_0000)
        }
        NanPattern::Value(expected) => assert_eq!(bits, expected.bits),
    }
}

fn assert_result(actual: Val, expected: WastRet<'_>) {
    match expected {
        WastRet::Core(expected) => match expected {
            WastRetCore::I32(expected) => assert_eq!(actual.to_i32().unwrap(), expected),
            WastRetCore::I64(expected) => assert_eq!(actual.to_i64().unwrap(), expected),
            WastRetCore::F32(expected) => assert_f32(actual.to_f32().unwrap(), &expected),
            WastRetCore::F64(expected) => assert_f64(actual.to_f64().unwrap(), &expected),
            WastRetCore::V128(expected) => {
                let bytes = actual.to_v128().unwrap().to_le_bytes();
                match expected {
                    V128Pattern::I8x16(lanes) => {
                        assert_eq!(bytes, lanes.map(|lane| lane as u8));
                    }
                    V128Pattern::I16x8(lanes) => {
                        for (idx, lane) in lanes.iter().enumerate() {
                            let actual = i16::from_le_bytes([bytes[2 * idx], bytes[2 * idx + 1]]);
                            assert_eq!(actual, *lane);
                        }
                    }
                    V128Pattern::I32x4(lanes) => {
                        for (idx, lane) in lanes.iter().enumerate() {
                            let chunk: [u8; 4] = bytes[4 * idx..4 * idx + 4].try_into().unwrap();
                            assert_eq!(i32::from_le_bytes(chunk), *lane);
                        }
                    }
                    V128Pattern::I64x2(lanes) => {
                        for (idx, lane) in lanes.iter().enumerate() {
                            let chunk: [u8; 8] = bytes[8 * idx..8 * idx + 8].try_into().unwrap();
                            assert_eq!(i64::from_le_bytes(chunk), *lane);
                        }
                    }
                    V128Pattern::F32x4(lanes) => {
                        for (idx, lane) in lanes.iter().enumerate() {
                            let chunk: [u8; 4] = bytes[4 * idx..4 * idx + 4].try_into().unwrap();
                            assert_f32(f32::from_le_bytes(chunk), lane);
                        }
                    }
                    V128Pattern::F64x2(lanes) => {
                        for (idx, lane) in lanes.iter().enumerate() {
                            let chunk: [u8; 8] = bytes[8 * idx..8 * idx + 8].try_into().unwrap();
                            assert_f64(f64::from_le_bytes(chunk), lane);
                        }
                    }
                }
            }
            WastRetCore::RefNull(Some(HeapType::Func)) => assert_eq!(actual, Val::FuncRef(None)),
            WastRetCore::RefNull(Some(HeapType::Extern)) => {
                assert_eq!(actual, Val::ExternRef(None))
            }
            WastRetCore::RefNull(None) => assert!(actual.to_ref().unwrap().is_null()),
            WastRetCore::RefExtern(expected) => assert_eq!(
                actual,
                Val::ExternRef(expected.map(ExternAddr::new)),
            ),
            WastRetCore::RefFunc(_) => assert!(matches!(actual, Val::FuncRef(Some(_)))),
            _ => unimplemented!(),
        },
        _ => unimplemented!(),
    }
}

fn run(script: &str) {
    for config in [
        Config::new().dispatch(DispatchMode::Naive),
        Config::new()
            .dispatch(DispatchMode::Compiled)
            .compile_threshold(0),
        Config::new().dispatch(DispatchMode::Compiled),
    ] {
        WastRunner::new(config).run(script);
    }
}

#[test]
fn integer_arithmetic() {
    run(r#"
        (module
          (func (export "add") (param i32 i32) (result i32) (i32.add (local.get 0) (local.get 1)))
          (func (export "div_s") (param i32 i32) (result i32) (i32.div_s (local.get 0) (local.get 1)))
          (func (export "rem_s") (param i32 i32) (result i32) (i32.rem_s (local.get 0) (local.get 1)))
          (func (export "rotl") (param i64 i64) (result i64) (i64.rotl (local.get 0) (local.get 1)))
          (func (export "clz") (param i32) (result i32) (i32.clz (local.get 0)))
          (func (export "extend8") (param i32) (result i32) (i32.extend8_s (local.get 0)))
          (func (export "wrap") (param i64) (result i32) (i32.wrap_i64 (local.get 0)))
        )
        (assert_return (invoke "add" (i32.const 1) (i32.const 2)) (i32.const 3))
        (assert_return (invoke "add" (i32.const 0x7fffffff) (i32.const 1)) (i32.const 0x80000000))
        (assert_return (invoke "div_s" (i32.const -7) (i32.const 2)) (i32.const -3))
        (assert_trap (invoke "div_s" (i32.const 1) (i32.const 0)) "integer divide by zero")
        (assert_trap (invoke "div_s" (i32.const 0x80000000) (i32.const -1)) "integer overflow")
        (assert_return (invoke "rem_s" (i32.const 0x80000000) (i32.const -1)) (i32.const 0))
        (assert_return (invoke "rotl" (i64.const 1) (i64.const 65)) (i64.const 2))
        (assert_return (invoke "clz" (i32.const 1)) (i32.const 31))
        (assert_return (invoke "clz" (i32.const 0)) (i32.const 32))
        (assert_return (invoke "extend8" (i32.const 0x80)) (i32.const -128))
        (assert_return (invoke "wrap" (i64.const 0x100000005)) (i32.const 5))
    "#);
}

#[test]
fn float_arithmetic_and_conversions() {
    run(r#"
        (module
          (func (export "min") (param f32 f32) (result f32) (f32.min (local.get 0) (local.get 1)))
          (func (export "nearest") (param f64) (result f64) (f64.nearest (local.get 0)))
          (func (export "div") (param f64 f64) (result f64) (f64.div (local.get 0) (local.get 1)))
          (func (export "trunc") (param f32) (result i32) (i32.trunc_f32_s (local.get 0)))
          (func (export "trunc_sat") (param f32) (result i32) (i32.trunc_sat_f32_s (local.get 0)))
          (func (export "convert") (param i64) (result f32) (f32.convert_i64_u (local.get 0)))
        )
        (assert_return (invoke "min" (f32.const -0.0) (f32.const 0.0)) (f32.const -0.0))
        (assert_return (invoke "min" (f32.const nan) (f32.const 1.0)) (f32.const nan:canonical))
        (assert_return (invoke "nearest" (f64.const 2.5)) (f64.const 2.0))
        (assert_return (invoke "nearest" (f64.const -3.5)) (f64.const -4.0))
        (assert_return (invoke "div" (f64.const 1.0) (f64.const 0.0)) (f64.const inf))
        (assert_return (invoke "trunc" (f32.const -1.9)) (i32.const -1))
        (assert_trap (invoke "trunc" (f32.const nan)) "invalid conversion to integer")
        (assert_trap (invoke "trunc" (f32.const 3e9)) "integer overflow")
        (assert_return (invoke "trunc_sat" (f32.const 3e9)) (i32.const 0x7fffffff))
        (assert_return (invoke "trunc_sat" (f32.const nan)) (i32.const 0))
        (assert_return (invoke "convert" (i64.const -1)) (f32.const 18446744073709551616.0))
    "#);
}

#[test]
fn structured_control_flow() {
    run(r#"
        (module
          (func (export "fac") (param i64) (result i64)
            (if (result i64) (i64.eqz (local.get 0))
              (then (i64.const 1))
              (else (i64.mul (local.get 0) (call 0 (i64.sub (local.get 0) (i64.const 1)))))))
          (func (export "sum") (param i32) (result i32) (local i32)
            (block
              (loop
                (br_if 1 (i32.eqz (local.get 0)))
                (local.set 1 (i32.add (local.get 1) (local.get 0)))
                (local.set 0 (i32.sub (local.get 0) (i32.const 1)))
                (br 0)))
            (local.get 1))
          (func (export "switch") (param i32) (result i32)
            (block (block (block
              (br_table 0 1 2 (local.get 0)))
              (return (i32.const 10)))
              (return (i32.const 11)))
            (i32.const 12))
          (func (export "multi") (result i32 i32)
            (block (result i32 i32) (i32.const 1) (i32.const 2)))
          (func (export "unreachable") (unreachable))
        )
        (assert_return (invoke "fac" (i64.const 20)) (i64.const 2432902008176640000))
        (assert_return (invoke "sum" (i32.const 100)) (i32.const 5050))
        (assert_return (invoke "switch" (i32.const 0)) (i32.const 10))
        (assert_return (invoke "switch" (i32.const 1)) (i32.const 11))
        (assert_return (invoke "switch" (i32.const 7)) (i32.const 12))
        (assert_return (invoke "multi") (i32.const 1) (i32.const 2))
        (assert_trap (invoke "unreachable") "unreachable")
    "#);
}

#[test]
fn deep_recursion_exhausts_the_call_stack() {
    run(r#"
        (module (func (export "loop") (call 0)))
        (assert_exhaustion (invoke "loop") "call stack exhausted")
    "#);
}

#[test]
fn memory_access_and_growth() {
    run(r#"
        (module
          (memory 1 2)
          (data (i32.const 8) "\01\02\03\04")
          (func (export "load") (param i32) (result i32) (i32.load (local.get 0)))
          (func (export "load8_s") (param i32) (result i32) (i32.load8_s offset=1 (local.get 0)))
          (func (export "store") (param i32 i64) (i64.store (local.get 0) (local.get 1)))
          (func (export "load64") (param i32) (result i64) (i64.load (local.get 0)))
          (func (export "grow") (param i32) (result i32) (memory.grow (local.get 0)))
          (func (export "size") (result i32) (memory.size))
          (func (export "fill") (param i32 i32 i32) (memory.fill (local.get 0) (local.get 1) (local.get 2)))
          (func (export "copy") (param i32 i32 i32) (memory.copy (local.get 0) (local.get 1) (local.get 2)))
        )
        (assert_return (invoke "load" (i32.const 8)) (i32.const 0x04030201))
        (assert_return (invoke "load8_s" (i32.const 7)) (i32.const 1))
        (assert_trap (invoke "load" (i32.const 65533)) "out of bounds memory access")
        (invoke "store" (i32.const 16) (i64.const -2))
        (assert_return (invoke "load64" (i32.const 16)) (i64.const -2))
        (assert_return (invoke "size") (i32.const 1))
        (assert_return (invoke "grow" (i32.const 1)) (i32.const 1))
        (assert_return (invoke "grow" (i32.const 1)) (i32.const -1))
        (assert_return (invoke "size") (i32.const 2))
        (assert_return (invoke "load" (i32.const 65536)) (i32.const 0))
        (invoke "fill" (i32.const 100) (i32.const 0xff) (i32.const 4))
        (assert_return (invoke "load" (i32.const 100)) (i32.const -1))
        (invoke "copy" (i32.const 9) (i32.const 8) (i32.const 4))
        (assert_return (invoke "load" (i32.const 8)) (i32.const 0x03020101))
        (assert_trap (invoke "fill" (i32.const 131070) (i32.const 0) (i32.const 3)) "out of bounds memory access")
    "#);
}

#[test]
fn passive_segments() {
    run(r#"
        (module
          (memory 1)
          (data $d "hello")
          (func (export "init") (param i32 i32 i32) (memory.init $d (local.get 0) (local.get 1) (local.get 2)))
          (func (export "drop") (data.drop $d))
          (func (export "load8") (param i32) (result i32) (i32.load8_u (local.get 0)))
        )
        (invoke "init" (i32.const 0) (i32.const 1) (i32.const 4))
        (assert_return (invoke "load8" (i32.const 0)) (i32.const 0x65))
        (assert_return (invoke "load8" (i32.const 3)) (i32.const 0x6f))
        (invoke "drop")
        (assert_trap (invoke "init" (i32.const 0) (i32.const 0) (i32.const 1)) "out of bounds memory access")
        (invoke "init" (i32.const 0) (i32.const 0) (i32.const 0))
    "#);
}

#[test]
fn tables_and_indirect_calls() {
    run(r#"
        (module
          (type $i2i (func (param i32) (result i32)))
          (table $t 4 funcref)
          (elem (table $t) (i32.const 1) func $double $square)
          (func $double (type $i2i) (i32.mul (local.get 0) (i32.const 2)))
          (func $square (type $i2i) (i32.mul (local.get 0) (local.get 0)))
          (func $nullary (result i32) (i32.const 0))
          (elem declare func $nullary)
          (func (export "call") (param i32 i32) (result i32)
            (call_indirect $t (type $i2i) (local.get 1) (local.get 0)))
          (func (export "size") (result i32) (table.size $t))
          (func (export "grow") (param i32) (result i32) (table.grow $t (ref.null func) (local.get 0)))
          (func (export "set_nullary") (param i32) (table.set $t (local.get 0) (ref.func $nullary)))
          (func (export "is_null") (param i32) (result i32) (ref.is_null (table.get $t (local.get 0))))
        )
        (assert_return (invoke "call" (i32.const 1) (i32.const 5)) (i32.const 10))
        (assert_return (invoke "call" (i32.const 2) (i32.const 5)) (i32.const 25))
        (assert_trap (invoke "call" (i32.const 0) (i32.const 5)) "uninitialized element")
        (assert_trap (invoke "call" (i32.const 9) (i32.const 5)) "undefined element")
        (invoke "set_nullary" (i32.const 3))
        (assert_trap (invoke "call" (i32.const 3) (i32.const 5)) "indirect call type mismatch")
        (assert_return (invoke "is_null" (i32.const 0)) (i32.const 1))
        (assert_return (invoke "is_null" (i32.const 1)) (i32.const 0))
        (assert_return (invoke "grow" (i32.const 2)) (i32.const 4))
        (assert_return (invoke "size") (i32.const 6))
        (assert_trap (invoke "is_null" (i32.const 6)) "out of bounds table access")
    "#);
}

#[test]
fn globals_and_extended_constants() {
    run(r#"
        (module
          (global $base i32 (i32.const 40))
          (global $sum i32 (i32.add (global.get $base) (i32.const 2)))
          (global $counter (mut i64) (i64.mul (i64.const 3) (i64.const 5)))
          (global (export "sum") i32 (global.get $sum))
          (func (export "bump") (result i64)
            (global.set $counter (i64.add (global.get $counter) (i64.const 1)))
            (global.get $counter))
        )
        (assert_return (get "sum") (i32.const 42))
        (assert_return (invoke "bump") (i64.const 16))
        (assert_return (invoke "bump") (i64.const 17))
    "#);
}

#[test]
fn registered_modules_satisfy_imports() {
    run(r#"
        (module $lib
          (memory (export "mem") 1)
          (global (export "g") i32 (i32.const 7))
          (func (export "inc") (param i32) (result i32) (i32.add (local.get 0) (i32.const 1)))
        )
        (register "lib" $lib)
        (module
          (import "lib" "inc" (func $inc (param i32) (result i32)))
          (import "lib" "g" (global $g i32))
          (import "lib" "mem" (memory 1))
          (import "spectest" "print_i32" (func $print (param i32)))
          (func (export "run") (result i32)
            (call $print (global.get $g))
            (i32.store (i32.const 0) (call $inc (global.get $g)))
            (i32.load (i32.const 0)))
        )
        (assert_return (invoke "run") (i32.const 8))
        (assert_unlinkable
          (module (import "lib" "inc" (func (param i64))))
          "incompatible import type")
        (assert_unlinkable
          (module (import "lib" "missing" (func)))
          "unknown import")
    "#);
}

#[test]
fn start_functions_and_segment_traps() {
    run(r#"
        (module
          (global $g (mut i32) (i32.const 0))
          (func $start (global.set $g (i32.const 5)))
          (start $start)
          (func (export "get") (result i32) (global.get $g))
        )
        (assert_return (invoke "get") (i32.const 5))
        (assert_trap
          (module (func $start (unreachable)) (start $start))
          "unreachable")
        (assert_trap
          (module (memory 1) (data (i32.const 65535) "ab"))
          "out of bounds memory access")
    "#);
}

#[test]
fn exceptions() {
    run(r#"
        (module
          (tag $e (param i32))
          (func $throw (param i32) (throw $e (local.get 0)))
          (func (export "catch") (param i32) (result i32)
            (block $h (result i32)
              (try_table (catch $e $h)
                (call $throw (local.get 0)))
              (i32.const -1)))
          (func (export "catch_all") (result i32)
            (block $h
              (try_table (catch_all $h)
                (call $throw (i32.const 3)))
              (return (i32.const 0)))
            (i32.const 1))
          (func (export "uncaught") (call $throw (i32.const 1)))
        )
        (assert_return (invoke "catch" (i32.const 42)) (i32.const 42))
        (assert_return (invoke "catch_all") (i32.const 1))
        (assert_exception (invoke "uncaught"))
    "#);
}

#[test]
fn fixed_width_simd() {
    run(r#"
        (module
          (func (export "add") (param v128 v128) (result v128) (i32x4.add (local.get 0) (local.get 1)))
          (func (export "splat") (param i32) (result v128) (i16x8.splat (local.get 0)))
          (func (export "extract") (param v128) (result i32) (i8x16.extract_lane_s 15 (local.get 0)))
          (func (export "shuffle") (param v128 v128) (result v128)
            (i8x16.shuffle 16 17 18 19 0 1 2 3 20 21 22 23 4 5 6 7 (local.get 0) (local.get 1)))
          (func (export "any_true") (param v128) (result i32) (v128.any_true (local.get 0)))
          (func (export "fmul") (param v128 v128) (result v128) (f32x4.mul (local.get 0) (local.get 1)))
        )
        (assert_return
          (invoke "add" (v128.const i32x4 1 2 3 0xffffffff) (v128.const i32x4 10 20 30 1))
          (v128.const i32x4 11 22 33 0))
        (assert_return (invoke "splat" (i32.const 0x10005)) (v128.const i16x8 5 5 5 5 5 5 5 5))
        (assert_return
          (invoke "extract" (v128.const i8x16 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0xff))
          (i32.const -1))
        (assert_return
          (invoke "shuffle" (v128.const i32x4 1 2 3 4) (v128.const i32x4 5 6 7 8))
          (v128.const i32x4 5 1 6 2))
        (assert_return (invoke "any_true" (v128.const i64x2 0 0)) (i32.const 0))
        (assert_return (invoke "any_true" (v128.const i64x2 0 1)) (i32.const 1))
        (assert_return
          (invoke "fmul" (v128.const f32x4 1.5 2 -3 0) (v128.const f32x4 2 0.5 3 -1))
          (v128.const f32x4 3 1 -9 -0))
    "#);
}

#[test]
fn references() {
    run(r#"
        (module
          (func $f)
          (elem declare func $f)
          (func (export "null_extern") (result externref) (ref.null extern))
          (func (export "pass") (param externref) (result externref) (local.get 0))
          (func (export "func_ref") (result funcref) (ref.func $f))
          (func (export "select") (param i32) (result externref)
            (select (result externref) (ref.null extern) (ref.null extern) (local.get 0)))
        )
        (assert_return (invoke "null_extern") (ref.null extern))
        (assert_return (invoke "pass" (ref.extern 3)) (ref.extern 3))
        (assert_return (invoke "func_ref") (ref.func))
        (assert_return (invoke "select" (i32.const 1)) (ref.null extern))
    "#);
}

#[test]
fn invalid_and_malformed_modules() {
    run(r#"
        (assert_invalid
          (module (func (result i32) (i64.const 0)))
          "type mismatch")
        (assert_invalid
          (module (func (call 7)))
          "unknown function")
        (assert_invalid
          (module (memory 1) (func (drop (i32.load align=8 (i32.const 0)))))
          "alignment must not be larger than natural")
        (assert_malformed
          (module binary "\00asm\02\00\00\00")
          "unknown binary version")
        (assert_malformed
          (module binary "\00asm\01\00\00\00\01")
          "unexpected end")
    "#);
}
