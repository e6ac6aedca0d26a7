use std::collections::{HashMap, HashSet};

use crate::ir::{Function, Module, Op, Value};
use crate::pass::{parse_config, BoxedPass, NoConfig, Pass, PassContext, PassError, PassType};

/// Deletes side-effect free instructions whose results are never used.
///
/// `debug_value` and `dealloc_stack` do not keep a value alive; they go away with it.
pub struct Dce;

pub fn get_pass(config: &toml::Table) -> Result<BoxedPass, toml::de::Error> {
    parse_config::<NoConfig>(config)?;
    Ok(Box::new(Dce))
}

fn live_uses(function: &Function) -> HashMap<Value, usize> {
    let mut counts = HashMap::new();
    for block in &function.blocks {
        for inst in &block.instructions {
            if matches!(inst.op, Op::DebugValue { .. } | Op::DeallocStack(_)) {
                continue;
            }
            for operand in inst.op.operands() {
                *counts.entry(operand).or_insert(0) += 1;
            }
        }
        if let Some(operand) = block.terminator.operands() {
            *counts.entry(operand).or_insert(0) += 1;
        }
    }
    counts
}

fn sweep(function: &mut Function) -> usize {
    let mut removed = 0;
    loop {
        let uses = live_uses(function);
        let dead: HashSet<Value> = function
            .blocks
            .iter()
            .flat_map(|b| b.instructions.iter())
            .filter(|inst| inst.op.is_removable_if_unused())
            .filter_map(|inst| inst.result)
            .filter(|result| !uses.contains_key(result))
            .collect();
        if dead.is_empty() {
            return removed;
        }
        for block in function.blocks.iter_mut() {
            block.instructions.retain(|inst| {
                let keep = match &inst.op {
                    Op::DebugValue { value, .. } | Op::DeallocStack(value) => !dead.contains(value),
                    _ => !inst.result.is_some_and(|r| dead.contains(&r)),
                };
                if !keep {
                    removed += 1;
                }
                keep
            });
        }
    }
}

impl Pass for Dce {
    fn identifier(&self) -> &'static str {
        "dce"
    }

    fn pass_type(&self) -> PassType {
        PassType::Transform
    }

    fn run(&mut self, module: &mut Module, ctx: &mut PassContext) -> Result<(), PassError> {
        let removed: usize = module.functions.iter_mut().map(sweep).sum();
        ctx.bump("removed", removed);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::pass::testing::run_pass;
    use crate::pass::PassOptions;

    #[test]
    fn test_removes_dead_chains() {
        let text = r#"
fn @g() -> i64
fn @f(%0 : i64) -> i64 {
bb0:
  %1 = integer_literal 2 : i64
  %2 = mul %0, %1 : i64
  debug_value %2, "twice"
  %3 = alloc_stack i64
  dealloc_stack %3
  %4 = function_ref @g
  %5 = apply %4() : i64
  %6 = add %0, %0 : i64
  return %6
}
"#;
        let outcome = run_pass(&mut Dce, text, &PassOptions::default());
        let block = &outcome.module.functions[1].blocks[0];
        let kept: Vec<&str> = block.instructions.iter().map(|i| i.op.mnemonic()).collect();
        assert_eq!(kept, vec!["function_ref", "apply", "add"]);
        assert_eq!(outcome.statistics.get("dce.removed"), 5);
    }
}
