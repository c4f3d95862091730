//! The interactive shell and the instruction-level debugger built on [`InstructionHook`].

use {
    crate::value,
    anyhow::{bail, ensure, Context, Error},
    parking_lot::Mutex,
    std::io::{self, BufRead, Write},
    tracing::debug,
    wasm_machine::{
        AbstractMachine, FuncAddr, FuncInst, HookAction, InstructionHook, MemAddr,
        ModuleInstance, Step, Store, Trap,
    },
};

const HELP: &str = "\
Commands:
  s, step, next             run one instruction
  c, continue               run until a trap or the end of the invocation
  p, print <what>           print something, see below
  call <fn> <args...>       call a function by export name or index
  set print stack|instr     print the stack or the instruction before every step
  unset print stack|instr   stop printing it
  q, quit                   leave the shell, or abort the paused invocation
  h, help                   print this help

Print:
  print stack               the operands and locals of the paused frame
  print instr               the paused instruction
  print memory <addr> [<offset> [<len>]]
  print function <addr>

Arguments are written `i32.const 1` or `i32.const:1`.
";

#[derive(Debug, Default)]
struct Settings {
    running: bool,
    print_stack: bool,
    print_instr: bool,
    last_command: String,
}

impl Settings {
    fn set(&mut self, enable: bool, what: &[&str]) -> Result<(), Error> {
        match what {
            ["print", "stack"] => self.print_stack = enable,
            ["print", "instr" | "instruction"] => self.print_instr = enable,
            ["print", other] => bail!("Unknown print category '{}'", other),
            [other, ..] => bail!("Unknown set category '{}'", other),
            [] => bail!("(un)set what?"),
        }
        Ok(())
    }
}

/// Pauses before every instruction and asks what to do next, until told to continue.
#[derive(Debug, Default)]
pub struct Debugger {
    settings: Mutex<Settings>,
}

impl InstructionHook for Debugger {
    fn before(&self, step: &Step<'_>) -> HookAction {
        let mut settings = self.settings.lock();
        if settings.print_stack {
            print_stack(step);
        }
        if settings.print_instr || !settings.running {
            println!("{:04} {}", step.ip(), step.instr());
        }
        if settings.running {
            return HookAction::Continue;
        }
        loop {
            let Some(line) = read_command("> ", &mut settings.last_command) else {
                return HookAction::Abort;
            };
            let words: Vec<&str> = line.split_whitespace().collect();
            match words.as_slice() {
                [] => {}
                ["s" | "step" | "next"] => return HookAction::Continue,
                ["c" | "continue"] => {
                    settings.running = true;
                    return HookAction::Continue;
                }
                ["q" | "quit"] => return HookAction::Abort,
                ["h" | "help"] => eprint!("{}", HELP),
                ["p" | "print", "s" | "stack"] => print_stack(step),
                ["p" | "print", "i" | "instr" | "instruction"] => println!("{}", step.instr()),
                ["p" | "print", what @ ..] => report(print_store(step.store(), what)),
                [cmd @ ("set" | "unset"), what @ ..] => report(settings.set(*cmd == "set", what)),
                ["call", ..] => eprintln!("Cannot call a function while paused"),
                [cmd, ..] => eprintln!("Command not understood: {}", cmd),
            }
        }
    }

    fn after(&self, step: &Step<'_>, trap: Option<&Trap>) {
        if let Some(trap) = trap {
            self.settings.lock().running = false;
            eprintln!("Trapped when executing ip={}", step.ip());
            eprintln!("{}", step.instr());
            eprintln!("Trap reason: {}", trap.reason());
        }
    }
}

/// Reads commands for `instance` until `quit` or the end of input.
///
/// `set` and `unset` configure `debugger`, which must be the hook installed on `machine`.
pub fn run_shell(
    machine: &mut AbstractMachine,
    instance: &ModuleInstance,
    debugger: Option<&Debugger>,
) -> i32 {
    let mut last_command = String::new();
    loop {
        let Some(line) = read_command("wasm> ", &mut last_command) else {
            return 0;
        };
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            [] => {}
            ["q" | "quit"] => return 0,
            ["h" | "help"] => eprint!("{}", HELP),
            ["call"] => eprintln!("call what?"),
            ["call", func, args @ ..] => report(call(machine, instance, func, args)),
            ["p" | "print", what @ ..] => report(print_store(machine.store(), what)),
            [cmd @ ("set" | "unset"), what @ ..] => match debugger {
                Some(debugger) => report(debugger.settings.lock().set(*cmd == "set", what)),
                None => eprintln!("Settings apply to the debugger, start with --debug"),
            },
            ["s" | "step" | "next" | "c" | "continue"] => eprintln!("Nothing is running"),
            [cmd, ..] => eprintln!("Command not understood: {}", cmd),
        }
    }
}

/// Prompts for a line. An empty line repeats the previous command. Returns `None` at the end of
/// input.
fn read_command(prompt: &str, last_command: &mut String) -> Option<String> {
    print!("{}", prompt);
    io::stdout().flush().ok()?;
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line).ok()? == 0 {
        return None;
    }
    let line = line.trim();
    if line.is_empty() {
        return Some(last_command.clone());
    }
    *last_command = line.to_string();
    Some(line.to_string())
}

fn report(result: Result<(), Error>) {
    if let Err(error) = result {
        eprintln!("{:#}", error);
    }
}

fn call(
    machine: &mut AbstractMachine,
    instance: &ModuleInstance,
    func: &str,
    args: &[&str],
) -> Result<(), Error> {
    let addr = match func.parse::<usize>() {
        Ok(idx) => instance.func_addrs().get(idx).copied(),
        Err(_) => instance.func_export(func),
    }
    .with_context(|| format!("Could not find a function {}", func))?;
    let params = machine
        .store()
        .func(addr)
        .context("function is not allocated")?
        .type_()
        .params()
        .to_vec();
    let supplied = group_values(args)
        .iter()
        .map(|text| value::parse_value(text))
        .collect::<Result<Vec<_>, _>>()?;
    ensure!(
        supplied.len() == params.len(),
        "Expected {} arguments for call, but found {}",
        params.len(),
        supplied.len()
    );
    let call_args = value::call_arguments(&params, &supplied)?;
    debug!(%addr, "calling from the shell");
    match machine.invoke(addr, &call_args) {
        Ok(results) => {
            if !results.is_empty() {
                eprintln!("Returned:");
            }
            for result in results {
                println!("  -> {}", result);
            }
        }
        Err(trap) => eprintln!("Execution trapped: {}", trap.reason()),
    }
    Ok(())
}

/// Rejoins the words of values the command line split apart: `i32.const` with the number after
/// it, and a lane list with the rest of its lanes.
fn group_values(words: &[&str]) -> Vec<String> {
    let mut values: Vec<String> = Vec::new();
    for word in words {
        match values.last_mut() {
            Some(last)
                if last.ends_with(".const") || (last.starts_with("v(") && !last.ends_with(')')) =>
            {
                last.push(' ');
                last.push_str(word);
            }
            _ => values.push(word.to_string()),
        }
    }
    values
}

fn print_stack(step: &Step<'_>) {
    println!("frame {} running function {}", step.depth(), step.func());
    for (idx, bits) in step.locals().enumerate() {
        println!("  local {}: {:#x}", idx, bits);
    }
    for bits in step.operands() {
        println!("  operand: {:#x}", bits);
    }
}

fn parse_addr(text: &str) -> Result<u32, Error> {
    text.parse()
        .with_context(|| format!("invalid address {}", text))
}

fn print_store(store: &Store, what: &[&str]) -> Result<(), Error> {
    match what {
        ["m" | "mem" | "memory", addr, range @ ..] => {
            let addr = parse_addr(addr)?;
            let bytes = store
                .mem(MemAddr::new(addr))
                .with_context(|| format!("invalid memory index {} (not found)", addr))?
                .bytes();
            let offset = match range.first() {
                Some(offset) => offset.parse::<usize>()?,
                None => 0,
            };
            let len = match range.get(1) {
                Some(len) => len.parse::<usize>()?,
                None => bytes.len(),
            };
            let end = offset.saturating_add(len).min(bytes.len());
            hex_dump(offset, bytes.get(offset..end).unwrap_or_default());
        }
        ["f" | "func" | "function", addr] => {
            let addr = parse_addr(addr)?;
            let func = store
                .func(FuncAddr::new(addr))
                .with_context(|| format!("invalid function index {} (not found)", addr))?;
            println!("type: {}", func.type_());
            match func {
                FuncInst::Host(host_func) => println!("host function {}", host_func.name()),
                FuncInst::Wasm(wasm_func) => {
                    let code = wasm_func
                        .instance()
                        .module()
                        .code()
                        .get(wasm_func.code_idx())
                        .context("function body is missing")?;
                    for (ip, instr) in code.body.instrs().iter().enumerate() {
                        println!("{:04} {}", ip, instr);
                    }
                }
            }
        }
        [] => bail!("Print what?"),
        [what, ..] => bail!("Cannot print '{}'", what),
    }
    Ok(())
}

fn hex_dump(base: usize, bytes: &[u8]) {
    for (row, chunk) in bytes.chunks(32).enumerate() {
        let hex: Vec<String> = chunk.iter().map(|byte| format!("{:02x}", byte)).collect();
        let text: String = chunk
            .iter()
            .map(|&byte| {
                if byte.is_ascii_graphic() {
                    char::from(byte)
                } else {
                    '.'
                }
            })
            .collect();
        println!("{:08x}  {:<95}  {}", base + row * 32, hex.join(" "), text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_values_are_rejoined() {
        assert_eq!(
            group_values(&["i32.const", "1", "i64.const:2", "v(i32.const", "1,", "i32.const", "2)"]),
            vec!["i32.const 1", "i64.const:2", "v(i32.const 1, i32.const 2)"]
        );
    }

    #[test]
    fn settings_toggle_printing() {
        let mut settings = Settings::default();
        settings.set(true, &["print", "stack"]).unwrap();
        settings.set(true, &["print", "instr"]).unwrap();
        settings.set(false, &["print", "stack"]).unwrap();
        assert!(!settings.print_stack);
        assert!(settings.print_instr);
        assert!(settings.set(true, &["print", "memory"]).is_err());
        assert!(settings.set(true, &["color"]).is_err());
    }

    #[test]
    fn printing_unknown_objects_fails() {
        let store = Store::new();
        assert!(print_store(&store, &["memory", "0"]).is_err());
        assert!(print_store(&store, &["function", "x"]).is_err());
        assert!(print_store(&store, &[]).is_err());
    }
}
