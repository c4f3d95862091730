use {
    criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion},
    std::sync::Arc,
    wasm_machine::{AbstractMachine, Config, DispatchMode, FuncAddr, Module, Val},
    wast::{parser, parser::ParseBuffer, Wat},
};

const WORKLOADS: &str = r#"
    (module
      (func $fib (export "fib") (param i32) (result i32)
        (if (result i32) (i32.lt_u (local.get 0) (i32.const 2))
          (then (local.get 0))
          (else
            (i32.add
              (call $fib (i32.sub (local.get 0) (i32.const 1)))
              (call $fib (i32.sub (local.get 0) (i32.const 2)))))))

      (memory 1)
      (func (export "sum") (param i32) (result i64) (local i32) (local i64)
        (block $done
          (loop $next
            (br_if $done (i32.ge_u (local.get 1) (local.get 0)))
            (i32.store (i32.and (i32.shl (local.get 1) (i32.const 2)) (i32.const 0xfffc))
              (local.get 1))
            (local.set 2
              (i64.add (local.get 2)
                (i64.extend_i32_u
                  (i32.load (i32.and (i32.shl (local.get 1) (i32.const 2)) (i32.const 0xfffc))))))
            (local.set 1 (i32.add (local.get 1) (i32.const 1)))
            (br $next)))
        (local.get 2)))
"#;

fn module() -> Arc<Module> {
    let buf = ParseBuffer::new(WORKLOADS).unwrap();
    let mut wat = parser::parse::<Wat>(&buf).unwrap();
    Arc::new(Module::parse(&wat.encode().unwrap()).unwrap())
}

fn machine(module: &Arc<Module>, dispatch: DispatchMode) -> (AbstractMachine, FuncAddr, FuncAddr) {
    let mut machine = AbstractMachine::with_config(Config::new().dispatch(dispatch));
    let instance = machine.instantiate(module, &[]).unwrap();
    let fib = instance.func_export("fib").unwrap();
    let sum = instance.func_export("sum").unwrap();
    (machine, fib, sum)
}

fn bench(c: &mut Criterion) {
    let module = module();
    let mut group = c.benchmark_group("dispatch");
    for (label, dispatch) in [
        ("naive", DispatchMode::Naive),
        ("compiled", DispatchMode::Compiled),
    ] {
        let (mut machine, fib, sum) = machine(&module, dispatch);
        group.bench_function(BenchmarkId::new("fib", label), |b| {
            b.iter(|| machine.invoke(fib, black_box(&[Val::I32(20)])).unwrap())
        });
        group.bench_function(BenchmarkId::new("sum", label), |b| {
            b.iter(|| machine.invoke(sum, black_box(&[Val::I32(10_000)])).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench);
criterion_main!(benches);
