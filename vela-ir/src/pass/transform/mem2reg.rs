use std::collections::{HashMap, HashSet};

use crate::ir::{BasicBlock, Function, Instruction, Module, Op, Value};
use crate::pass::{parse_config, BoxedPass, NoConfig, Pass, PassContext, PassError, PassType};

use super::apply_substitution;

/// Promotes stack slots whose whole life is spent in one block to SSA values.
pub struct Mem2Reg;

pub fn get_pass(config: &toml::Table) -> Result<BoxedPass, toml::de::Error> {
    parse_config::<NoConfig>(config)?;
    Ok(Box::new(Mem2Reg))
}

/// Slots only loaded, stored to, deallocated or described by `debug_value`, all within the
/// block that allocates them. Returns `(block, slot)` pairs.
fn promotable_slots(function: &Function) -> Vec<(usize, Value)> {
    let mut home = HashMap::new();
    for (index, block) in function.blocks.iter().enumerate() {
        for inst in &block.instructions {
            if let (Some(slot), Op::AllocStack(_)) = (inst.result, &inst.op) {
                home.insert(slot, index);
            }
        }
    }
    let mut rejected = HashSet::new();
    for (index, block) in function.blocks.iter().enumerate() {
        for inst in &block.instructions {
            let direct = match &inst.op {
                Op::Load { address, .. } | Op::DeallocStack(address) => Some(*address),
                Op::Store { value, address } if value != address => Some(*address),
                Op::DebugValue { value, .. } => Some(*value),
                _ => None,
            };
            for operand in inst.op.operands() {
                let Some(&owner) = home.get(&operand) else {
                    continue;
                };
                if direct != Some(operand) || owner != index {
                    rejected.insert(operand);
                }
            }
        }
        if let Some(operand) = block.terminator.operands() {
            rejected.insert(operand);
        }
    }
    let mut slots: Vec<(usize, Value)> = home
        .into_iter()
        .filter(|(slot, _)| !rejected.contains(slot))
        .map(|(slot, block)| (block, slot))
        .collect();
    slots.sort();
    slots
}

/// Rewrites the accesses to `slot` in `block`. Leaves the block alone and returns `false` when
/// the slot may be read before anything is stored to it.
fn promote(block: &mut BasicBlock, slot: Value, substitution: &mut HashMap<Value, Value>) -> bool {
    let mut current = None;
    let mut rewritten = Vec::with_capacity(block.instructions.len());
    let mut replaced = Vec::new();
    for inst in &block.instructions {
        match &inst.op {
            Op::AllocStack(_) if inst.result == Some(slot) => {}
            Op::DeallocStack(address) if *address == slot => {}
            Op::Store { value, address } if *address == slot => current = Some(*value),
            Op::Load { address, .. } if *address == slot => {
                let (Some(result), Some(value)) = (inst.result, current) else {
                    return false;
                };
                replaced.push((result, value));
            }
            Op::DebugValue { value, name } if *value == slot => {
                if let Some(current) = current {
                    rewritten.push(
                        Instruction::new(
                            None,
                            Op::DebugValue {
                                value: current,
                                name: name.clone(),
                            },
                        )
                        .with_loc(inst.loc),
                    );
                }
            }
            _ => rewritten.push(inst.clone()),
        }
    }
    block.instructions = rewritten;
    substitution.extend(replaced);
    true
}

impl Pass for Mem2Reg {
    fn identifier(&self) -> &'static str {
        "mem2reg"
    }

    fn pass_type(&self) -> PassType {
        PassType::Transform
    }

    fn run(&mut self, module: &mut Module, ctx: &mut PassContext) -> Result<(), PassError> {
        let mut promoted = 0;
        for function in module.functions.iter_mut() {
            let mut substitution = HashMap::new();
            for (block, slot) in promotable_slots(function) {
                if promote(&mut function.blocks[block], slot, &mut substitution) {
                    promoted += 1;
                }
            }
            apply_substitution(function, &substitution);
        }
        ctx.bump("promoted", promoted);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::pass::testing::run_pass;
    use crate::pass::PassOptions;

    #[test]
    fn test_promotes_local_slot() {
        let text = r#"
fn @f(%0 : i64) -> i64 {
bb0:
  %1 = alloc_stack i64
  debug_value %1, "x"
  store %0 to %1
  %2 = load %1 : i64
  %3 = add %2, %2 : i64
  store %3 to %1
  %4 = load %1 : i64
  dealloc_stack %1
  return %4
}
"#;
        let outcome = run_pass(&mut Mem2Reg, text, &PassOptions::default());
        let block = &outcome.module.functions[0].blocks[0];
        assert_eq!(block.instructions.len(), 1);
        assert_eq!(
            block.instructions[0].op.operands().collect::<Vec<_>>(),
            vec![Value(0), Value(0)]
        );
        assert_eq!(block.terminator.operands(), Some(Value(3)));
        assert_eq!(outcome.statistics.get("mem2reg.promoted"), 1);
    }

    #[test]
    fn test_keeps_escaping_and_uninitialized_slots() {
        let text = r#"
fn @g(%0 : *i64) -> ()
fn @f(%0 : i1) -> i64 {
bb0:
  %1 = alloc_stack i64
  %2 = alloc_stack i64
  %3 = alloc_stack i64
  %4 = function_ref @g
  %5 = apply %4(%1) : ()
  %6 = load %2 : i64
  %7 = integer_literal 1 : i64
  store %7 to %3
  br bb1
bb1:
  %8 = load %3 : i64
  dealloc_stack %3
  dealloc_stack %2
  dealloc_stack %1
  return %8
}
"#;
        let outcome = run_pass(&mut Mem2Reg, text, &PassOptions::default());
        let function = &outcome.module.functions[1];
        assert_eq!(function.instruction_count(), 12);
        assert_eq!(outcome.statistics.get("mem2reg.promoted"), 0);
    }
}
