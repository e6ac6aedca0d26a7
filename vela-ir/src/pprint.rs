use std::fmt::{Display, Formatter};

use vela_core::{fmt_separated, Location};

use crate::ir::{
    BasicBlock, Function, GlobalVariable, Instruction, Module, Op, TableEntry, Terminator,
    TerminatorKind, VTable, WitnessTable,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PrintOptions {
    /// Print `, loc L:C` after every instruction and terminator.
    pub verbose: bool,
    /// Emit top-level entities sorted by name instead of definition order.
    pub sorted: bool,
}

pub struct PrettyPrint<'a, T> {
    target: &'a T,
    indent: usize,
    options: PrintOptions,
}

impl<'a, T> PrettyPrint<'a, T> {
    pub fn new(target: &'a T) -> Self {
        Self::with_options(target, PrintOptions::default())
    }

    pub fn with_options(target: &'a T, options: PrintOptions) -> Self {
        PrettyPrint {
            target,
            indent: 0,
            options,
        }
    }

    pub fn next_level<'b, Z>(&self, target: &'b Z) -> PrettyPrint<'b, Z> {
        PrettyPrint {
            target,
            indent: self.indent + 1,
            options: self.options,
        }
    }

    pub fn same_level<'b, Z>(&self, target: &'b Z) -> PrettyPrint<'b, Z> {
        PrettyPrint {
            target,
            indent: self.indent,
            options: self.options,
        }
    }

    fn write_indent(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for _ in 0..self.indent {
            write!(f, "\t")?;
        }
        Ok(())
    }

    fn write_loc(&self, f: &mut Formatter<'_>, loc: Option<Location>) -> std::fmt::Result {
        match loc {
            Some(loc) if self.options.verbose => write!(f, ", loc {loc}"),
            _ => Ok(()),
        }
    }
}

/// A string literal in exactly the escape syntax the parser reads back.
struct Quoted<'a>(&'a str);

impl Display for Quoted<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "\"")?;
        for c in self.0.chars() {
            match c {
                '"' => write!(f, "\\\"")?,
                '\\' => write!(f, "\\\\")?,
                '\n' => write!(f, "\\n")?,
                '\r' => write!(f, "\\r")?,
                '\t' => write!(f, "\\t")?,
                c if c.is_control() => write!(f, "\\u{{{:x}}}", u32::from(c))?,
                c => write!(f, "{c}")?,
            }
        }
        write!(f, "\"")
    }
}

impl Display for PrettyPrint<'_, Op> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mnemonic = self.target.mnemonic();
        match self.target {
            Op::IntegerLiteral { value, width } => write!(f, "{mnemonic} {value} : {width}"),
            Op::Binary {
                lhs, rhs, width, ..
            } => write!(f, "{mnemonic} {lhs}, {rhs} : {width}"),
            Op::AllocStack(ty) => write!(f, "{mnemonic} {ty}"),
            Op::DeallocStack(address) => write!(f, "{mnemonic} {address}"),
            Op::Load { address, ty } => write!(f, "{mnemonic} {address} : {ty}"),
            Op::Store { value, address } => write!(f, "{mnemonic} {value} to {address}"),
            Op::GlobalAddr { global, ty } => write!(f, "{mnemonic} @{global} : {ty}"),
            Op::FunctionRef(name) => write!(f, "{mnemonic} @{name}"),
            Op::Apply { callee, args, ty } => {
                write!(f, "{mnemonic} {callee}(")?;
                fmt_separated(f, args, ", ")?;
                write!(f, ") : {ty}")
            }
            Op::AllocRef(class) => write!(f, "{mnemonic} ${class}"),
            Op::ClassMethod { object, method } => write!(f, "{mnemonic} {object}, {method}"),
            Op::WitnessMethod {
                conformer,
                protocol,
                method,
            } => write!(f, "{mnemonic} ${conformer} : {protocol}, {method}"),
            Op::StrongRetain(value) | Op::StrongRelease(value) => write!(f, "{mnemonic} {value}"),
            Op::CondFail { condition, message } => {
                write!(f, "{mnemonic} {condition}, {}", Quoted(message))
            }
            Op::AssertConfig => write!(f, "{mnemonic}"),
            Op::DebugValue { value, name } => {
                write!(f, "{mnemonic} {value}, {}", Quoted(name))
            }
        }
    }
}

impl Display for PrettyPrint<'_, Instruction> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.write_indent(f)?;
        if let Some(result) = self.target.result {
            write!(f, "{result} = ")?;
        }
        write!(f, "{}", self.same_level(&self.target.op))?;
        self.write_loc(f, self.target.loc)
    }
}

impl Display for PrettyPrint<'_, Terminator> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        use vela_core::keywords::{BR, COND_BR, RETURN, UNREACHABLE};
        self.write_indent(f)?;
        match &self.target.kind {
            TerminatorKind::Return(Some(value)) => write!(f, "{RETURN} {value}")?,
            TerminatorKind::Return(None) => write!(f, "{RETURN}")?,
            TerminatorKind::Branch(dest) => write!(f, "{BR} {dest}")?,
            TerminatorKind::CondBranch {
                condition,
                then_dest,
                else_dest,
            } => write!(f, "{COND_BR} {condition}, {then_dest}, {else_dest}")?,
            TerminatorKind::Unreachable => write!(f, "{UNREACHABLE}")?,
        }
        self.write_loc(f, self.target.loc)
    }
}

impl Display for PrettyPrint<'_, BasicBlock> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}:", self.target.label)?;
        for inst in &self.target.instructions {
            writeln!(f, "{}", self.next_level(inst))?;
        }
        writeln!(f, "{}", self.next_level(&self.target.terminator))
    }
}

impl Display for PrettyPrint<'_, Function> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let function = self.target;
        write!(f, "fn @{}(", function.name)?;
        fmt_separated(
            f,
            function.params.iter().map(|(v, ty)| format!("{v} : {ty}")),
            ", ",
        )?;
        write!(f, ") -> {}", function.return_type)?;
        let attrs = &function.attributes;
        let names = [
            (attrs.transparent, vela_core::keywords::TRANSPARENT),
            (attrs.private, vela_core::keywords::PRIVATE),
            (attrs.noreturn, vela_core::keywords::NORETURN),
        ];
        let mut names = names.iter().filter(|(set, _)| *set).map(|(_, n)| n).peekable();
        if names.peek().is_some() {
            write!(f, " [")?;
            fmt_separated(f, names, ", ")?;
            write!(f, "]")?;
        }
        if function.is_declaration() {
            return writeln!(f);
        }
        writeln!(f, " {{")?;
        for block in &function.blocks {
            write!(f, "{}", self.same_level(block))?;
        }
        writeln!(f, "}}")
    }
}

impl Display for PrettyPrint<'_, GlobalVariable> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let global = self.target;
        write!(f, "global @{} : {}", global.name, global.ty)?;
        if global.private {
            write!(f, " [{}]", vela_core::keywords::PRIVATE)?;
        }
        writeln!(f)
    }
}

fn fmt_entries(f: &mut Formatter<'_>, entries: &[TableEntry]) -> std::fmt::Result {
    writeln!(f, " {{")?;
    for (idx, entry) in entries.iter().enumerate() {
        write!(f, "\t{} : @{}", entry.method, entry.implementation)?;
        if idx + 1 < entries.len() {
            write!(f, ",")?;
        }
        writeln!(f)?;
    }
    writeln!(f, "}}")
}

impl Display for PrettyPrint<'_, VTable> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "vtable ${}", self.target.class)?;
        fmt_entries(f, &self.target.entries)
    }
}

impl Display for PrettyPrint<'_, WitnessTable> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let table = self.target;
        write!(f, "witness_table ${} : {}", table.conformer, table.protocol)?;
        fmt_entries(f, &table.entries)
    }
}

impl Display for PrettyPrint<'_, Module> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let module = self.target;
        writeln!(f, "// module {}", module.name)?;

        let mut globals: Vec<_> = module.globals.iter().collect();
        let mut functions: Vec<_> = module.functions.iter().collect();
        let mut vtables: Vec<_> = module.vtables.iter().collect();
        let mut witness_tables: Vec<_> = module.witness_tables.iter().collect();
        if self.options.sorted {
            globals.sort_by(|a, b| a.name.cmp(&b.name));
            functions.sort_by(|a, b| a.name.cmp(&b.name));
            vtables.sort_by(|a, b| a.class.cmp(&b.class));
            witness_tables.sort_by(|a, b| {
                (&a.conformer, &a.protocol).cmp(&(&b.conformer, &b.protocol))
            });
        }

        if !globals.is_empty() {
            writeln!(f)?;
            for global in globals {
                write!(f, "{}", self.same_level(global))?;
            }
        }
        for function in functions {
            writeln!(f)?;
            write!(f, "{}", self.same_level(function))?;
        }
        for vtable in vtables {
            writeln!(f)?;
            write!(f, "{}", self.same_level(vtable))?;
        }
        for table in witness_tables {
            writeln!(f)?;
            write!(f, "{}", self.same_level(table))?;
        }
        if !module.metadata.is_empty() {
            writeln!(f)?;
            writeln!(f, "metadata {{")?;
            for (key, value) in &module.metadata {
                writeln!(f, "\t{key} = {value};")?;
            }
            writeln!(f, "}}")?;
        }
        Ok(())
    }
}
