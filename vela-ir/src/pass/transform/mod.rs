use std::collections::HashMap;

use crate::ir::{Function, Value};

pub mod arc;
pub mod constant_propagation;
pub mod cse;
pub mod dce;
pub mod dead_function;
pub mod devirtualize;
pub mod diagnose_unreachable;
pub mod global_opt;
pub mod inliner;
pub mod linker;
pub mod load_store;
pub mod mem2reg;
pub mod noreturn;
pub mod simplify_cfg;
pub mod strip_debug;

/// Rewrites every use of a key of `substitution` to its value, following chains such as
/// `%3 -> %2 -> %1` to the end.
pub(crate) fn apply_substitution(function: &mut Function, substitution: &HashMap<Value, Value>) {
    if substitution.is_empty() {
        return;
    }
    let resolve = |mut value: Value| {
        let mut steps = 0;
        while let Some(&next) = substitution.get(&value) {
            if next == value || steps > substitution.len() {
                break;
            }
            value = next;
            steps += 1;
        }
        value
    };
    for block in function.blocks.iter_mut() {
        for inst in block.instructions.iter_mut() {
            for operand in inst.op.operands_mut() {
                *operand = resolve(*operand);
            }
        }
        if let Some(operand) = block.terminator.operands_mut() {
            *operand = resolve(*operand);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_module;

    #[test]
    fn test_substitution_follows_chains() {
        let text = r#"
fn @f(%0 : i64) -> i64 {
bb0:
  %1 = add %0, %0 : i64
  %2 = add %1, %1 : i64
  %3 = add %2, %0 : i64
  return %3
}
"#;
        let mut module = parse_module(text, "m").unwrap();
        let function = &mut module.functions[0];
        let substitution = HashMap::from([(Value(3), Value(2)), (Value(2), Value(1))]);
        apply_substitution(function, &substitution);
        assert_eq!(function.blocks[0].terminator.operands(), Some(Value(1)));
        assert_eq!(
            function.blocks[0].instructions[2].op.operands().collect::<Vec<_>>(),
            vec![Value(1), Value(0)]
        );
    }
}
