use std::collections::{HashMap, HashSet};

use vela_core::{Ident, Location};

use crate::ir::{Function, Module, Op, ResultRequirement, TerminatorKind, Value};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct VerifyError {
    pub location: Option<Location>,
    pub message: String,
}

struct Verifier<'a> {
    module: &'a Module,
    errors: Vec<VerifyError>,
}

impl<'a> Verifier<'a> {
    fn report(&mut self, location: Option<Location>, message: String) {
        self.errors.push(VerifyError { location, message });
    }

    fn check_symbols(&mut self) {
        let module = self.module;
        let mut symbols: HashSet<&Ident> = HashSet::new();
        for global in &module.globals {
            if !symbols.insert(&global.name) {
                self.report(global.loc, format!("redefinition of '@{}'", global.name));
            }
        }
        for function in &module.functions {
            if !symbols.insert(&function.name) {
                self.report(function.loc, format!("redefinition of '@{}'", function.name));
            }
        }
        let mut classes = HashSet::new();
        for vtable in &module.vtables {
            if !classes.insert(&vtable.class) {
                self.report(vtable.loc, format!("redefinition of vtable '${}'", vtable.class));
            }
            for entry in &vtable.entries {
                self.check_function_exists(vtable.loc, &entry.implementation);
            }
        }
        let mut conformances = HashSet::new();
        for table in &module.witness_tables {
            if !conformances.insert((&table.conformer, &table.protocol)) {
                self.report(
                    table.loc,
                    format!(
                        "redefinition of witness table '${} : {}'",
                        table.conformer, table.protocol
                    ),
                );
            }
            for entry in &table.entries {
                self.check_function_exists(table.loc, &entry.implementation);
            }
        }
    }

    fn check_function_exists(&mut self, location: Option<Location>, name: &Ident) {
        if self.module.function(name).is_none() {
            self.report(location, format!("reference to undefined function '@{name}'"));
        }
    }

    fn check_function(&mut self, function: &'a Function) {
        if function.is_declaration() {
            return;
        }
        let mut labels = HashSet::new();
        for block in &function.blocks {
            if !labels.insert(&block.label) {
                self.report(
                    block.terminator.loc,
                    format!("redefinition of block '{}' in '@{}'", block.label, function.name),
                );
            }
        }

        // value -> defining block, or None for parameters
        let mut defined: HashMap<Value, Option<usize>> = HashMap::new();
        for (value, _) in &function.params {
            if defined.insert(*value, None).is_some() {
                self.report(function.loc, format!("redefinition of value '{value}'"));
            }
        }
        for (idx, block) in function.blocks.iter().enumerate() {
            for inst in &block.instructions {
                if let Some(result) = inst.result {
                    if defined.insert(result, Some(idx)).is_some() {
                        self.report(inst.loc, format!("redefinition of value '{result}'"));
                    }
                }
            }
        }

        for (idx, block) in function.blocks.iter().enumerate() {
            let mut local = HashSet::new();
            for inst in &block.instructions {
                let mnemonic = inst.op.mnemonic();
                match (inst.op.result_requirement(), inst.result) {
                    (ResultRequirement::Required, None) => self.report(
                        inst.loc,
                        format!("instruction '{mnemonic}' must produce a result"),
                    ),
                    (ResultRequirement::Forbidden, Some(_)) => self.report(
                        inst.loc,
                        format!("instruction '{mnemonic}' does not produce a result"),
                    ),
                    _ => {}
                }
                for operand in inst.op.operands() {
                    self.check_use(&defined, &local, idx, operand, inst.loc);
                }
                match &inst.op {
                    Op::FunctionRef(name) => self.check_function_exists(inst.loc, name),
                    Op::GlobalAddr { global, .. } if self.module.global(global).is_none() => {
                        self.report(inst.loc, format!("reference to undefined global '@{global}'"))
                    }
                    _ => {}
                }
                if let Some(result) = inst.result {
                    local.insert(result);
                }
            }
            let terminator = &block.terminator;
            if let Some(operand) = terminator.operands() {
                self.check_use(&defined, &local, idx, operand, terminator.loc);
            }
            for dest in terminator.successors() {
                if function.block_index(dest).is_none() {
                    self.report(terminator.loc, format!("branch to undefined block '{dest}'"));
                }
            }
            match (&terminator.kind, function.return_type.is_unit()) {
                (TerminatorKind::Return(Some(_)), true) => self.report(
                    terminator.loc,
                    format!("'@{}' returns '()' but a value is returned", function.name),
                ),
                (TerminatorKind::Return(None), false) => self.report(
                    terminator.loc,
                    format!(
                        "'@{}' must return a value of type '{}'",
                        function.name, function.return_type
                    ),
                ),
                _ => {}
            }
        }
    }

    fn check_use(
        &mut self,
        defined: &HashMap<Value, Option<usize>>,
        local: &HashSet<Value>,
        block: usize,
        operand: Value,
        location: Option<Location>,
    ) {
        match defined.get(&operand) {
            None => self.report(location, format!("use of undefined value '{operand}'")),
            Some(Some(def_block)) if *def_block == block && !local.contains(&operand) => self
                .report(
                    location,
                    format!("value '{operand}' is used before its definition"),
                ),
            _ => {}
        }
    }
}

/// Checks the structural well-formedness of a module and returns every problem found.
pub fn verify_module(module: &Module) -> Vec<VerifyError> {
    let mut verifier = Verifier {
        module,
        errors: Vec::new(),
    };
    verifier.check_symbols();
    for function in &module.functions {
        verifier.check_function(function);
    }
    verifier.errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_module;

    fn messages(text: &str) -> Vec<String> {
        let module = parse_module(text, "test").unwrap();
        verify_module(&module)
            .into_iter()
            .map(|e| e.message)
            .collect()
    }

    #[test]
    fn test_well_formed_module() {
        let text = r#"
global @g : i64
fn @callee() -> ()
fn @f(%0 : i64) -> i64 {
bb0:
  %1 = global_addr @g : *i64
  %2 = function_ref @callee
  %3 = apply %2() : ()
  br bb1
bb1:
  return %0
}
vtable $C { #C.m : @f }
"#;
        assert!(messages(text).is_empty());
    }

    #[test]
    fn test_reports_undefined_and_misordered_values() {
        let text = r#"
fn @f() -> i64 {
bb0:
  %1 = add %0, %0 : i64
  %2 = add %3, %3 : i64
  %3 = integer_literal 1 : i64
  return %3
}
"#;
        let messages = messages(text);
        assert!(messages.contains(&"use of undefined value '%0'".to_string()));
        assert!(messages.contains(&"value '%3' is used before its definition".to_string()));
    }

    #[test]
    fn test_reports_structural_problems() {
        let text = r#"
global @f : i8
fn @f() -> () {
bb0:
  %0 = integer_literal 1 : i64
  %0 = integer_literal 2 : i64
  store %0 to %0
  %1 = function_ref @missing
  strong_retain %0
  br bb7
}
fn @g() -> i64 {
bb0:
  return
}
"#;
        let messages = messages(text);
        assert!(messages.contains(&"redefinition of '@f'".to_string()));
        assert!(messages.contains(&"redefinition of value '%0'".to_string()));
        assert!(messages.contains(&"reference to undefined function '@missing'".to_string()));
        assert!(messages.contains(&"branch to undefined block 'bb7'".to_string()));
        assert!(messages.contains(&"'@g' must return a value of type 'i64'".to_string()));
    }

    #[test]
    fn test_result_presence() {
        let text = "fn @f() -> () {\nbb0:\n  integer_literal 1 : i8\n  %0 = integer_literal 1 : i1\n  %1 = cond_fail %0, \"x\"\n  return\n}\n";
        let messages = messages(text);
        assert!(messages.contains(&"instruction 'integer_literal' must produce a result".to_string()));
        assert!(messages.contains(&"instruction 'cond_fail' does not produce a result".to_string()));
    }
}
