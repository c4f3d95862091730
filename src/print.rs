//! Human-readable outlines of modules and their compiled function bodies.

use {
    crate::{
        data::DataMode,
        elem::ElemMode,
        extern_val::{ExportDesc, ImportDesc},
        instr::{Expression, Opcode},
        module::Module,
    },
    std::fmt,
};

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "(module")?;
        for (idx, type_) in self.types().iter().enumerate() {
            writeln!(f, "  (type {} {})", idx, type_)?;
        }
        for import in self.imports() {
            write!(f, "  (import {:?} {:?} ", import.module, import.name)?;
            match import.desc {
                ImportDesc::Func(type_idx) => write!(f, "(func (type {}))", type_idx)?,
                ImportDesc::Table(type_) => write!(f, "(table {})", type_)?,
                ImportDesc::Mem(type_) => write!(f, "(memory {})", type_)?,
                ImportDesc::Global(type_) => write!(f, "(global {})", type_)?,
                ImportDesc::Tag(type_) => write!(f, "(tag {})", type_)?,
            }
            writeln!(f, ")")?;
        }
        let imported_func_count = self.imported_func_count();
        for (code_idx, (type_idx, code)) in self.functions().iter().zip(self.code()).enumerate() {
            writeln!(f, "  (func {} (type {})", imported_func_count + code_idx, type_idx)?;
            if !code.locals.is_empty() {
                write!(f, "    (local")?;
                for type_ in &code.locals {
                    write!(f, " {}", type_)?;
                }
                writeln!(f, ")")?;
            }
            write_body(f, &code.body)?;
            writeln!(f, "  )")?;
        }
        for (idx, type_) in self.tables().iter().enumerate() {
            writeln!(f, "  (table {} {})", idx, type_)?;
        }
        for (idx, type_) in self.memories().iter().enumerate() {
            writeln!(f, "  (memory {} {})", idx, type_)?;
        }
        for (idx, type_) in self.tags().iter().enumerate() {
            writeln!(f, "  (tag {} {})", idx, type_)?;
        }
        for (idx, global) in self.globals().iter().enumerate() {
            writeln!(f, "  (global {} {} {})", idx, global.type_, ConstExpr(&global.init))?;
        }
        for export in self.exports() {
            let (kind, idx) = match export.desc {
                ExportDesc::Func(idx) => ("func", idx.value()),
                ExportDesc::Table(idx) => ("table", idx.value()),
                ExportDesc::Mem(idx) => ("memory", idx.value()),
                ExportDesc::Global(idx) => ("global", idx.value()),
                ExportDesc::Tag(idx) => ("tag", idx.value()),
            };
            writeln!(f, "  (export {:?} ({} {}))", export.name, kind, idx)?;
        }
        if let Some(start) = self.start() {
            writeln!(f, "  (start {})", start)?;
        }
        for (idx, element) in self.elements().iter().enumerate() {
            write!(f, "  (elem {} ", idx)?;
            match &element.mode {
                ElemMode::Passive => write!(f, "passive")?,
                ElemMode::Active { table, offset } => {
                    write!(f, "(table {}) (offset {})", table, ConstExpr(offset))?
                }
                ElemMode::Declarative => write!(f, "declare")?,
            }
            writeln!(f, " {} ;; {} items)", element.type_, element.init.len())?;
        }
        for (idx, data) in self.data().iter().enumerate() {
            write!(f, "  (data {} ", idx)?;
            match &data.mode {
                DataMode::Passive => write!(f, "passive")?,
                DataMode::Active { mem, offset } => {
                    write!(f, "(memory {}) (offset {})", mem, ConstExpr(offset))?
                }
            }
            writeln!(f, " ;; {} bytes)", data.init.len())?;
        }
        for section in self.custom_sections() {
            writeln!(f, "  (custom {:?} ;; {} bytes)", section.name, section.bytes.len())?;
        }
        write!(f, ")")
    }
}

fn write_body(f: &mut fmt::Formatter<'_>, body: &Expression) -> fmt::Result {
    let mut depth = 0usize;
    for (ip, instr) in body.instrs().iter().enumerate() {
        let opcode = instr.opcode();
        if matches!(opcode, Opcode::End | Opcode::Else) {
            depth = depth.saturating_sub(1);
        }
        writeln!(f, "{:>6}: {:indent$}{}", ip, "", instr, indent = 2 * depth)?;
        if matches!(
            opcode,
            Opcode::Block | Opcode::Loop | Opcode::If | Opcode::Else | Opcode::TryTable
        ) {
            depth += 1;
        }
    }
    Ok(())
}

/// Prints a constant expression on one line, without its final `end`.
struct ConstExpr<'a>(&'a Expression);

impl fmt::Display for ConstExpr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let instrs = self.0.instrs();
        let instrs = match instrs.split_last() {
            Some((last, init)) if last.opcode() == Opcode::End => init,
            _ => instrs,
        };
        write!(f, "(")?;
        for (idx, instr) in instrs.iter().enumerate() {
            if idx > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", instr)?;
        }
        write!(f, ")")
    }
}

/// The compiled dispatch tables of every function body in a [`Module`].
///
/// Created by [`Module::display_compiled`]. Printing compiles bodies that have not been
/// compiled yet.
pub struct CompiledListing<'a> {
    module: &'a Module,
}

impl Module {
    /// Returns a printable listing of the compiled form of every function body.
    pub fn display_compiled(&self) -> CompiledListing<'_> {
        CompiledListing { module: self }
    }
}

impl fmt::Display for CompiledListing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let imported_func_count = self.module.imported_func_count();
        for (code_idx, code) in self.module.code().iter().enumerate() {
            writeln!(f, "func {}:", imported_func_count + code_idx)?;
            match code.body.compile() {
                Some(compiled) => write!(f, "{}", compiled.display(&code.body))?,
                None => writeln!(f, "  (not compiled)")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::instr::{Args, Instruction},
    };

    #[test]
    fn prints_constant_expressions_and_empty_modules() {
        let body = Expression::new(vec![
            Instruction::new(Opcode::Nop, Args::None),
            Instruction::new(Opcode::End, Args::None),
        ]);
        let listing = ConstExpr(&body).to_string();
        assert_eq!(listing, "(nop)");
        let module = Module::default();
        let text = module.to_string();
        assert!(text.starts_with("(module"));
        assert!(text.ends_with(')'));
    }
}
