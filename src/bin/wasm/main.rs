mod logging;
mod shell;
mod value;

use {
    crate::shell::{run_shell, Debugger},
    anyhow::{Context, Error},
    clap::{Parser, ValueEnum},
    std::{
        collections::HashMap,
        fs,
        path::{Path, PathBuf},
        process,
        sync::Arc,
    },
    tracing::{debug, warn},
    wasm_machine::{
        wasi::{self, Wasi},
        AbstractMachine, Caller, Config, DispatchMode, ExternType, ExternVal, FuncType, ImportName,
        InstructionHook, LinkError, Linker, Module, ModuleInstance, Trap, Val,
    },
};

/// Parses, validates and runs WebAssembly modules.
#[derive(Debug, Parser)]
#[command(name = "wasm", version)]
struct Args {
    /// The module to load.
    file: PathBuf,

    /// Print the parsed module.
    #[arg(short, long)]
    print: bool,

    /// Print the compiled dispatch of every function body.
    #[arg(long)]
    print_compiled: bool,

    /// Instantiate the module.
    #[arg(short, long)]
    instantiate: bool,

    /// Invoke the named exported function (implies --instantiate).
    #[arg(short, long, value_name = "NAME")]
    execute: Option<String>,

    /// Step through execution one instruction at a time.
    #[arg(short, long)]
    debug: bool,

    /// Read commands from stdin after instantiating (implies --instantiate).
    #[arg(short, long)]
    shell: bool,

    /// Stub every unresolved function import with a function that logs its arguments.
    #[arg(long)]
    export_noop: bool,

    /// Provide WASI preview1 functions.
    #[arg(short, long)]
    wasi: bool,

    /// Expose a host directory to WASI, optionally under a different guest path.
    #[arg(long, value_name = "HOST[:GUEST]")]
    wasi_map_dir: Vec<String>,

    /// Instantiate another module first and offer its exports to the imports of the next ones.
    #[arg(short, long, value_name = "[NAME=]FILE")]
    link: Vec<String>,

    /// An argument for the invoked function, as `T.const value` or `v(T.const a, ...)`.
    #[arg(long, value_name = "VALUE", value_parser = value::parse_value)]
    arg: Vec<Val>,

    /// Log debug events unless `RUST_LOG` says otherwise.
    #[arg(short, long)]
    verbose: bool,

    #[arg(long, value_enum, default_value_t = Dispatch::Compiled)]
    dispatch: Dispatch,

    /// Calls a function takes before its body is compiled.
    #[arg(long, default_value_t = 1)]
    compile_threshold: u32,

    #[arg(long, default_value_t = 16_384)]
    max_call_depth: usize,

    /// Instructions a single invocation may execute.
    #[arg(long)]
    instruction_limit: Option<u64>,

    /// Arguments for the WASI program.
    #[arg(trailing_var_arg = true)]
    args: Vec<String>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Dispatch {
    Naive,
    Compiled,
}

impl From<Dispatch> for DispatchMode {
    fn from(dispatch: Dispatch) -> Self {
        match dispatch {
            Dispatch::Naive => DispatchMode::Naive,
            Dispatch::Compiled => DispatchMode::Compiled,
        }
    }
}

fn main() {
    let args = Args::parse();
    logging::set_up_logging(args.verbose);
    match run(args) {
        Ok(code) => process::exit(code),
        Err(error) => {
            eprintln!("error: {:?}", error);
            process::exit(1);
        }
    }
}

fn load(path: &Path) -> Result<Arc<Module>, Error> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let module =
        Module::parse(&bytes).with_context(|| format!("failed to parse {}", path.display()))?;
    module
        .validate()
        .with_context(|| format!("failed to validate {}", path.display()))?;
    debug!(path = %path.display(), "loaded module");
    Ok(Arc::new(module))
}

/// Splits `name=path`. Without a name, the file stem names the module.
fn parse_link(link: &str) -> (String, PathBuf) {
    match link.split_once('=') {
        Some((name, path)) => (name.to_string(), PathBuf::from(path)),
        None => {
            let path = PathBuf::from(link);
            let name = path
                .file_stem()
                .map_or_else(|| link.to_string(), |stem| stem.to_string_lossy().into_owned());
            (name, path)
        }
    }
}

fn report_missing(error: &LinkError) {
    for name in &error.missing_imports {
        eprintln!("Missing import '{}'", name);
    }
}

fn noop(
    name: ImportName,
    type_: FuncType,
) -> impl Fn(&mut Caller<'_>, &[Val]) -> Result<Vec<Val>, Trap> {
    move |_, args| {
        let args: Vec<String> = args.iter().map(ToString::to_string).collect();
        warn!(
            "stub function '{}' called with arguments: {}",
            name,
            args.join(", ")
        );
        Ok(type_.results().iter().map(|type_| type_.default_val()).collect())
    }
}

fn run(args: Args) -> Result<i32, Error> {
    let module = load(&args.file)?;
    let instantiate = args.instantiate || args.execute.is_some() || args.shell;
    if args.print && !instantiate {
        println!("{}", module);
    }
    if args.print_compiled {
        print!("{}", module.display_compiled());
    }
    if !instantiate {
        return Ok(0);
    }

    let mut config = Config::new()
        .dispatch(args.dispatch.into())
        .compile_threshold(args.compile_threshold)
        .max_call_depth(args.max_call_depth)
        .instruction_limit(args.instruction_limit);
    let debugger = args.debug.then(|| Arc::new(Debugger::default()));
    if let Some(debugger) = &debugger {
        let hook: Arc<dyn InstructionHook> = debugger.clone();
        config = config
            .dispatch(DispatchMode::Naive)
            .instruction_hook(Some(hook));
    }
    let mut machine = AbstractMachine::with_config(config);

    let mut linked: Vec<(String, Arc<ModuleInstance>)> = Vec::new();
    for link in &args.link {
        let (name, path) = parse_link(link);
        let module = load(&path)?;
        let mut linker = Linker::new(&module);
        for (name, instance) in &linked {
            linker.link_instance(machine.store(), name, instance);
        }
        let imports = match linker.finish() {
            Ok(imports) => imports,
            Err(error) => {
                eprintln!("Linking imported module '{}' failed", path.display());
                report_missing(&error);
                return Ok(1);
            }
        };
        match machine.instantiate(&module, &imports) {
            Ok(instance) => linked.push((name, instance)),
            Err(error) => {
                eprintln!(
                    "Instantiation of imported module '{}' failed: {}",
                    path.display(),
                    error
                );
                return Ok(1);
            }
        }
    }

    let mut linker = Linker::new(&module);
    for (name, instance) in &linked {
        linker.link_instance(machine.store(), name, instance);
    }
    if args.wasi {
        let program = args.file.display().to_string();
        let mut wasi = Wasi::new().args(std::iter::once(program).chain(args.args.iter().cloned()));
        for mapping in &args.wasi_map_dir {
            let (host, guest) = wasi::parse_map_dir(mapping);
            let host = host
                .canonicalize()
                .with_context(|| format!("failed to map directory {}", host.display()))?;
            wasi = wasi.preopen_dir(host, guest);
        }
        let externs = wasi.link(machine.store_mut());
        linker.link(machine.store(), &externs);
    }
    if args.export_noop {
        let unresolved: Vec<(ImportName, FuncType)> = linker
            .unresolved_imports()
            .filter_map(|(name, type_)| match type_ {
                Some(ExternType::Func(type_)) => Some((name.clone(), type_.clone())),
                _ => None,
            })
            .collect();
        let mut stubs = HashMap::new();
        for (name, type_) in unresolved {
            let addr = machine.store_mut().alloc_host_func(
                name.name.clone(),
                type_.clone(),
                noop(name.clone(), type_),
            );
            stubs.insert(name, ExternVal::Func(addr));
        }
        linker.link(machine.store(), &stubs);
    }

    let imports = match linker.finish() {
        Ok(imports) => imports,
        Err(error) => {
            eprintln!("Linking main module failed");
            report_missing(&error);
            return Ok(1);
        }
    };
    let instance = match machine.instantiate(&module, &imports) {
        Ok(instance) => instance,
        Err(error) => {
            eprintln!("Module instantiation failed: {}", error);
            return Ok(1);
        }
    };
    if args.print {
        println!("{}", module);
    }
    if args.shell {
        return Ok(run_shell(&mut machine, &instance, debugger.as_deref()));
    }

    let Some(name) = &args.execute else {
        return Ok(0);
    };
    let Some(func) = instance.func_export(name) else {
        eprintln!("No such exported function: {}", name);
        return Ok(1);
    };
    let func_inst = machine
        .store()
        .func(func)
        .context("exported function is not allocated")?;
    if func_inst.is_host() {
        eprintln!("Exported function is a host function; cannot run that yet");
        return Ok(1);
    }
    let params = func_inst.type_().params().to_vec();
    let call_args = match value::call_arguments(&params, &args.arg) {
        Ok(call_args) => call_args,
        Err(error) => {
            eprintln!("{}", error);
            return Ok(1);
        }
    };

    let result = machine.invoke(func, &call_args);
    if debugger.is_some() {
        run_shell(&mut machine, &instance, debugger.as_deref());
    }
    match result {
        Ok(results) => {
            if !results.is_empty() {
                eprintln!("Returned:");
            }
            for result in results {
                println!("  -> {}", result);
            }
            Ok(0)
        }
        Err(trap) => {
            if let Some(code) = wasi::exit_code(&trap) {
                return Ok(code.wrapping_neg());
            }
            eprintln!("Execution trapped: {}", trap.reason());
            Ok(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_names_default_to_the_file_stem() {
        assert_eq!(
            parse_link("libs/env.wasm"),
            ("env".to_string(), PathBuf::from("libs/env.wasm"))
        );
        assert_eq!(
            parse_link("math=libs/m.wasm"),
            ("math".to_string(), PathBuf::from("libs/m.wasm"))
        );
    }

    #[test]
    fn arguments_parse() {
        let args = Args::try_parse_from([
            "wasm", "-e", "main", "--arg", "i32.const 1", "m.wasm", "-w", "--", "a", "-b",
        ])
        .unwrap();
        assert_eq!(args.execute.as_deref(), Some("main"));
        assert_eq!(args.arg, vec![Val::I32(1)]);
        assert!(args.wasi);
        assert_eq!(args.args, vec!["a", "-b"]);

        let args = Args::try_parse_from(["wasm", "-d", "-s", "m.wasm"]).unwrap();
        assert!(args.debug && args.shell);
    }
}
