use {
    parking_lot::Mutex,
    std::{any::TypeId, sync::Arc},
    wasm_machine::{
        AbstractMachine, Config, DispatchMode, ExternVal, FuncIdx, HookAction, InstructionHook,
        InstantiationErrorSource, Module, Opcode, ParseError, Step, TableIdx, Trap, Val,
    },
    wast::{parser, parser::ParseBuffer, Wat},
};

fn wat(text: &str) -> Vec<u8> {
    let buf = ParseBuffer::new(text).unwrap();
    let mut wat = parser::parse::<Wat>(&buf).unwrap();
    wat.encode().unwrap()
}

fn with_header(sections: &[u8]) -> Vec<u8> {
    let mut bytes = b"\0asm\x01\0\0\0".to_vec();
    bytes.extend_from_slice(sections);
    bytes
}

#[test]
fn parsing_is_deterministic() {
    let bytes = wat(r#"
        (module
          (type (func (param i32) (result i32)))
          (memory 1)
          (global (mut i64) (i64.const 3))
          (func (export "f") (type 0)
            (block (result i32) (local.get 0) (br_if 0 (i32.const 1))))
          (data (i32.const 0) "abc"))
    "#);
    let first = Module::parse(&bytes).unwrap();
    let second = Module::parse(&bytes).unwrap();
    assert_eq!(format!("{:?}", first), format!("{:?}", second));
    assert_eq!(first.to_string(), second.to_string());
}

#[test]
fn validator_accepts_add_and_rejects_unknown_local() {
    let valid = Module::parse(&wat(r#"
        (module (func (export "add") (param i32 i32) (result i32)
          (i32.add (local.get 0) (local.get 1))))
    "#))
    .unwrap();
    assert!(valid.validate().is_ok());

    let invalid = Module::parse(&wat(r#"
        (module (func (export "add") (param i32 i32) (result i32)
          (i32.add (local.get 0) (local.get 2))))
    "#))
    .unwrap();
    assert!(invalid.validate().is_err());
    // The outcome is cached.
    assert!(invalid.validate().is_err());
}

#[test]
fn index_kinds_are_distinct_types() {
    assert_ne!(TypeId::of::<FuncIdx>(), TypeId::of::<TableIdx>());
    assert_eq!(FuncIdx::new(3).value(), TableIdx::new(3).value());
}

#[test]
fn truncated_index_in_a_section_is_expected_index() {
    // A type section with one `() -> ()` type, then a function section whose single type
    // index is a lone continuation byte.
    let bytes = with_header(&[0x01, 0x04, 0x01, 0x60, 0x00, 0x00, 0x03, 0x02, 0x01, 0x80]);
    assert_eq!(Module::parse(&bytes).unwrap_err(), ParseError::ExpectedIndex);
}

#[test]
fn names_must_be_strict_utf8() {
    // Overlong NUL.
    let bytes = with_header(&[0x00, 0x03, 0x02, 0xC0, 0x80]);
    assert_eq!(Module::parse(&bytes).unwrap_err(), ParseError::InvalidUtf8);
    // UTF-16 surrogate.
    let bytes = with_header(&[0x00, 0x04, 0x03, 0xED, 0xA0, 0x80]);
    assert_eq!(Module::parse(&bytes).unwrap_err(), ParseError::InvalidUtf8);
    // An import with a surrogate in its item name.
    let bytes = with_header(&[
        0x02, 0x0A, 0x01, 0x01, b'm', 0x03, 0xED, 0xA0, 0x80, 0x02, 0x00, 0x01,
    ]);
    assert_eq!(Module::parse(&bytes).unwrap_err(), ParseError::InvalidUtf8);
}

#[test]
fn segments_must_fit_but_earlier_allocations_persist() {
    let fits = Arc::new(
        Module::parse(&wat(r#"(module (memory 1) (data (i32.const 65532) "abcd"))"#)).unwrap(),
    );
    let mut machine = AbstractMachine::new();
    machine.instantiate(&fits, &[]).unwrap();

    let overflows = Arc::new(
        Module::parse(&wat(r#"
            (module
              (table 1 funcref)
              (memory 1)
              (global i32 (i32.const 1))
              (func)
              (data (i32.const 65534) "abcd"))
        "#))
        .unwrap(),
    );
    let mut machine = AbstractMachine::new();
    let error = machine.instantiate(&overflows, &[]).unwrap_err();
    assert_eq!(error.source, InstantiationErrorSource::Linking);
    assert_eq!(error.trap, Some(Trap::MemoryOutOfBounds));
    let store = machine.store();
    assert_eq!(store.func_count(), 1);
    assert_eq!(store.table_count(), 1);
    assert_eq!(store.mem_count(), 1);
    assert_eq!(store.global_count(), 1);
}

const CORPUS: &str = r#"
    (module
      (type $i2i (func (param i32) (result i32)))
      (memory 1)
      (table 3 funcref)
      (elem (i32.const 0) func $inc $dec)
      (func $inc (type $i2i) (i32.add (local.get 0) (i32.const 1)))
      (func $dec (type $i2i) (i32.sub (local.get 0) (i32.const 1)))

      (func (export "arith") (param i32) (result i32) (local i32)
        (local.set 1 (i32.const 7))
        (i32.add (local.get 0) (local.get 1))
        (i32.and (local.get 0) (i32.const 0xff))
        (i32.mul)
        (i32.xor (i32.rotl (local.get 0) (i32.const 3)))
        (i32.div_u (i32.or (local.get 0) (i32.const 1))))

      (func (export "nested") (param i32) (result i32) (local i32)
        (local.set 0 (i32.and (local.get 0) (i32.const 0xff)))
        (block $outer
          (loop $top
            (block $skip
              (br_if $skip (i32.and (local.get 0) (i32.const 1)))
              (local.set 1 (i32.add (local.get 1) (local.get 0))))
            (local.set 0 (i32.sub (local.get 0) (i32.const 1)))
            (br_if $outer (i32.le_s (local.get 0) (i32.const 0)))
            (br $top)))
        (local.get 1))

      (func (export "dispatch") (param i32) (result i32)
        (call_indirect (type $i2i) (i32.mul (local.get 0) (i32.const 3)) (i32.rem_u (local.get 0) (i32.const 4))))

      (func (export "memory") (param i32) (result i32)
        (i32.store (i32.const 16) (local.get 0))
        (i64.store (i32.const 24) (i64.extend_i32_s (local.get 0)))
        (i32.add (i32.load8_s (i32.const 16)) (i32.wrap_i64 (i64.load (i32.const 24)))))

      (func (export "lanes") (param i32) (result i32)
        (i32x4.extract_lane 2
          (i32x4.mul
            (i32x4.splat (local.get 0))
            (v128.const i32x4 1 2 3 4))))

      (func (export "divide") (param i32) (result i32)
        (i32.div_s (i32.const 100) (i32.sub (local.get 0) (i32.const 5))))

      (func (export "floats") (param i32) (result f32)
        (f32.sqrt (f32.convert_i32_s (i32.sub (local.get 0) (i32.const 10)))))
    )
"#;

fn run_corpus(config: Config) -> Vec<Result<Vec<Val>, Trap>> {
    let module = Arc::new(Module::parse(&wat(CORPUS)).unwrap());
    let mut machine = AbstractMachine::with_config(config);
    let instance = machine.instantiate(&module, &[]).unwrap();
    let mut outcomes = Vec::new();
    for name in ["arith", "nested", "dispatch", "memory", "lanes", "divide", "floats"] {
        let func = instance.func_export(name).unwrap();
        for input in [0, 1, 2, 3, 5, 6, 10, 17, 255, -1, i32::MIN, i32::MAX] {
            outcomes.push(machine.invoke(func, &[Val::I32(input)]));
        }
    }
    outcomes
}

#[test]
fn naive_and_compiled_dispatch_agree() {
    let naive = run_corpus(Config::new().dispatch(DispatchMode::Naive));
    let compiled = run_corpus(
        Config::new()
            .dispatch(DispatchMode::Compiled)
            .compile_threshold(0),
    );
    assert_eq!(naive.len(), compiled.len());
    for (naive, compiled) in naive.iter().zip(&compiled) {
        match (naive, compiled) {
            (Ok(naive), Ok(compiled)) => {
                assert_eq!(naive.len(), compiled.len());
                for (naive, compiled) in naive.iter().zip(compiled) {
                    assert!(naive.bitwise_eq(*compiled), "{} != {}", naive, compiled);
                }
            }
            (Err(naive), Err(compiled)) => assert_eq!(naive.reason(), compiled.reason()),
            _ => panic!("{:?} != {:?}", naive, compiled),
        }
    }
}

#[test]
fn instruction_limit_stops_runaway_loops() {
    let module = Arc::new(
        Module::parse(&wat(r#"(module (func (export "spin") (loop (br 0))))"#)).unwrap(),
    );
    for dispatch in [DispatchMode::Naive, DispatchMode::Compiled] {
        let config = Config::new()
            .dispatch(dispatch)
            .compile_threshold(0)
            .instruction_limit(Some(10_000));
        let mut machine = AbstractMachine::with_config(config);
        let instance = machine.instantiate(&module, &[]).unwrap();
        let spin = instance.func_export("spin").unwrap();
        assert_eq!(machine.invoke(spin, &[]), Err(Trap::InstructionLimitExceeded));
    }
}

const BUDGETED: &str = r#"
    (module
      (global $count (export "counter") (mut i32) (i32.const 0))
      (func (export "add") (param i32 i32) (result i32)
        nop
        nop
        (i32.add (local.get 0) (local.get 1)))
      (func (export "count") (param i32) (result i32) (local i32)
        (local.set 1 (i32.const 0))
        (block $done
          (loop $next
            nop
            (br_if $done (i32.ge_u (local.get 1) (local.get 0)))
            (global.set $count (i32.add (global.get $count) (i32.const 1)))
            (local.set 1 (i32.add (local.get 1) (i32.const 1)))
            nop
            (br $next)))
        (local.get 1)))
"#;

fn run_budgeted(dispatch: DispatchMode, limit: u64) -> Vec<(Result<Vec<Val>, Trap>, Val)> {
    let module = Arc::new(Module::parse(&wat(BUDGETED)).unwrap());
    let config = Config::new()
        .dispatch(dispatch)
        .compile_threshold(0)
        .instruction_limit(Some(limit));
    let mut machine = AbstractMachine::with_config(config);
    let instance = machine.instantiate(&module, &[]).unwrap();
    let Some(ExternVal::Global(count)) = instance.export("counter") else {
        panic!("missing global export");
    };
    let mut outcomes = Vec::new();
    for (name, args) in [
        ("add", vec![Val::I32(1), Val::I32(2)]),
        ("count", vec![Val::I32(3)]),
    ] {
        let func = instance.func_export(name).unwrap();
        let result = machine.invoke(func, &args);
        let counted = machine.store().global(count).unwrap().get();
        outcomes.push((result, counted));
    }
    outcomes
}

#[test]
fn instruction_limits_agree_across_dispatch_modes() {
    let mut finished = false;
    for limit in 1..80 {
        let naive = run_budgeted(DispatchMode::Naive, limit);
        let compiled = run_budgeted(DispatchMode::Compiled, limit);
        assert_eq!(naive, compiled, "limit {}", limit);
        finished |= naive.iter().all(|(result, _)| result.is_ok());
    }
    assert!(finished);
    assert_eq!(
        run_budgeted(DispatchMode::Compiled, 4)[0].0,
        Err(Trap::InstructionLimitExceeded)
    );
}

#[test]
fn call_depth_is_configurable() {
    let module = Arc::new(
        Module::parse(&wat(r#"
            (module (func (export "down") (param i32)
              (if (local.get 0) (then (call 0 (i32.sub (local.get 0) (i32.const 1)))))))
        "#))
        .unwrap(),
    );
    let mut machine = AbstractMachine::with_config(Config::new().max_call_depth(50));
    let instance = machine.instantiate(&module, &[]).unwrap();
    let down = instance.func_export("down").unwrap();
    assert_eq!(machine.invoke(down, &[Val::I32(10)]), Ok(vec![]));
    assert_eq!(
        machine.invoke(down, &[Val::I32(100)]),
        Err(Trap::CallStackExhausted)
    );
}

#[derive(Default)]
struct Recorder {
    abort_at: Option<Opcode>,
    steps: Mutex<Vec<(usize, Opcode, Vec<u128>)>>,
    traps: Mutex<Vec<Trap>>,
}

impl InstructionHook for Recorder {
    fn before(&self, step: &Step<'_>) -> HookAction {
        let opcode = step.instr().opcode();
        self.steps
            .lock()
            .push((step.ip(), opcode, step.operands().collect()));
        if self.abort_at == Some(opcode) {
            HookAction::Abort
        } else {
            HookAction::Continue
        }
    }

    fn after(&self, _: &Step<'_>, trap: Option<&Trap>) {
        self.traps.lock().extend(trap.cloned());
    }
}

fn run_hooked(recorder: &Arc<Recorder>, name: &str, args: &[Val]) -> Result<Vec<Val>, Trap> {
    let module = Arc::new(
        Module::parse(&wat(r#"
            (module
              (func (export "add") (param i32 i32) (result i32)
                (i32.add (local.get 0) (local.get 1)))
              (func (export "boom") unreachable))
        "#))
        .unwrap(),
    );
    let hook: Arc<dyn InstructionHook> = recorder.clone();
    let config = Config::new()
        .dispatch(DispatchMode::Naive)
        .instruction_hook(Some(hook));
    let mut machine = AbstractMachine::with_config(config);
    let instance = machine.instantiate(&module, &[]).unwrap();
    let func = instance.func_export(name).unwrap();
    machine.invoke(func, args)
}

#[test]
fn instruction_hook_sees_every_step() {
    let recorder = Arc::new(Recorder::default());
    let result = run_hooked(&recorder, "add", &[Val::I32(1), Val::I32(2)]);
    assert_eq!(result, Ok(vec![Val::I32(3)]));
    assert_eq!(
        *recorder.steps.lock(),
        vec![
            (0, Opcode::LocalGet, vec![]),
            (1, Opcode::LocalGet, vec![1]),
            (2, Opcode::I32Add, vec![1, 2]),
            (3, Opcode::End, vec![3]),
        ]
    );
    assert!(recorder.traps.lock().is_empty());

    let recorder = Arc::new(Recorder::default());
    assert_eq!(run_hooked(&recorder, "boom", &[]), Err(Trap::Unreachable));
    assert_eq!(*recorder.traps.lock(), vec![Trap::Unreachable]);
}

#[test]
fn instruction_hook_can_abort() {
    let recorder = Arc::new(Recorder {
        abort_at: Some(Opcode::I32Add),
        ..Recorder::default()
    });
    let result = run_hooked(&recorder, "add", &[Val::I32(1), Val::I32(2)]);
    assert_eq!(result, Err(Trap::Aborted));
    assert_eq!(recorder.steps.lock().len(), 3);
}
