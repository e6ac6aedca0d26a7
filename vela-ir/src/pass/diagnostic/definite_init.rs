use std::collections::{HashMap, HashSet};

use vela_core::Location;

use crate::ir::{BasicBlock, Function, Module, Op, Value};
use crate::pass::{parse_config, BoxedPass, NoConfig, Pass, PassContext, PassError, PassType};

/// Must-initialized dataflow over stack slots: a load from a slot that is not stored to on
/// every path from the entry block is an error.
pub struct DefiniteInit;

pub fn get_pass(config: &toml::Table) -> Result<BoxedPass, toml::de::Error> {
    parse_config::<NoConfig>(config)?;
    Ok(Box::new(DefiniteInit))
}

/// Runs the transfer function of `block` over `state`, calling `uninit_load` for every load
/// of a slot not yet initialized. Passing a slot to a call counts as initializing it.
fn walk(
    block: &BasicBlock,
    slots: &HashMap<Value, usize>,
    state: &mut [bool],
    mut uninit_load: impl FnMut(Value, Option<Location>),
) {
    for inst in &block.instructions {
        match &inst.op {
            Op::Store { address, .. } => {
                if let Some(&bit) = slots.get(address) {
                    state[bit] = true;
                }
            }
            Op::Apply { args, .. } => {
                for bit in args.iter().filter_map(|arg| slots.get(arg)) {
                    state[*bit] = true;
                }
            }
            Op::Load { address, .. } => {
                if let Some(&bit) = slots.get(address) {
                    if !state[bit] {
                        uninit_load(*address, inst.loc);
                    }
                }
            }
            _ => {}
        }
    }
}

/// Intersection of the predecessors' exit states; unvisited predecessors are ignored.
fn entry_state(block: usize, preds: &[Vec<usize>], exits: &[Option<Vec<bool>>], width: usize) -> Vec<bool> {
    if block == 0 {
        return vec![false; width];
    }
    preds[block]
        .iter()
        .filter_map(|pred| exits[*pred].as_ref())
        .fold(None, |acc: Option<Vec<bool>>, exit| match acc {
            None => Some(exit.clone()),
            Some(acc) => Some(acc.iter().zip(exit).map(|(a, b)| *a && *b).collect()),
        })
        .unwrap_or_else(|| vec![false; width])
}

/// Uninitialized slots with the location of their first offending load.
fn check(function: &Function) -> Vec<(Value, Option<Location>)> {
    let slots: HashMap<Value, usize> = function
        .blocks
        .iter()
        .flat_map(|b| b.instructions.iter())
        .filter(|inst| matches!(inst.op, Op::AllocStack(_)))
        .filter_map(|inst| inst.result)
        .enumerate()
        .map(|(bit, slot)| (slot, bit))
        .collect();
    if slots.is_empty() {
        return Vec::new();
    }
    let width = slots.len();
    let order = function.reverse_post_order();
    let preds = function.predecessors();
    let mut exits: Vec<Option<Vec<bool>>> = vec![None; function.blocks.len()];
    let mut changed = true;
    while changed {
        changed = false;
        for &block in &order {
            let mut state = entry_state(block, &preds, &exits, width);
            walk(&function.blocks[block], &slots, &mut state, |_, _| {});
            if exits[block].as_ref() != Some(&state) {
                exits[block] = Some(state);
                changed = true;
            }
        }
    }
    let mut reported = HashSet::new();
    let mut uninit = Vec::new();
    for &block in &order {
        let mut state = entry_state(block, &preds, &exits, width);
        walk(&function.blocks[block], &slots, &mut state, |slot, loc| {
            if reported.insert(slot) {
                uninit.push((slot, loc));
            }
        });
    }
    uninit
}

fn slot_name(function: &Function, slot: Value) -> String {
    function
        .blocks
        .iter()
        .flat_map(|b| b.instructions.iter())
        .find_map(|inst| match &inst.op {
            Op::DebugValue { value, name } if *value == slot => Some(name.clone()),
            _ => None,
        })
        .unwrap_or_else(|| slot.to_string())
}

impl Pass for DefiniteInit {
    fn identifier(&self) -> &'static str {
        "definite-init"
    }

    fn pass_type(&self) -> PassType {
        PassType::Diagnostic
    }

    fn run(&mut self, module: &mut Module, ctx: &mut PassContext) -> Result<(), PassError> {
        for function in module.functions.iter().filter(|f| !f.is_declaration()) {
            for (slot, loc) in check(function) {
                ctx.diagnostics.error(
                    loc,
                    format!(
                        "variable '{}' used before being initialized",
                        slot_name(function, slot)
                    ),
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::pass::testing::{messages, run_pass};
    use crate::pass::PassOptions;

    #[test]
    fn test_conditionally_initialized_slot() {
        let text = r#"
fn @f(%0 : i1) -> i64 {
bb0:
  %1 = alloc_stack i64
  debug_value %1, "x"
  cond_br %0, bb1, bb2
bb1:
  %2 = integer_literal 1 : i64
  store %2 to %1
  br bb2
bb2:
  %3 = load %1 : i64
  %4 = load %1 : i64
  dealloc_stack %1
  return %3
}
"#;
        let outcome = run_pass(&mut DefiniteInit, text, &PassOptions::default());
        assert_eq!(
            messages(&outcome),
            vec!["variable 'x' used before being initialized"]
        );
        assert_eq!(outcome.diagnostics[0].location.map(|l| l.line), Some(12));
    }

    #[test]
    fn test_loops_and_calls_initialize() {
        let text = r#"
fn @init(%0 : *i64) -> ()
fn @f(%0 : i1) -> i64 {
bb0:
  %1 = alloc_stack i64
  %2 = alloc_stack i64
  %3 = function_ref @init
  %4 = apply %3(%2) : ()
  %5 = integer_literal 0 : i64
  store %5 to %1
  br bb1
bb1:
  %6 = load %1 : i64
  %7 = load %2 : i64
  cond_br %0, bb1, bb2
bb2:
  dealloc_stack %2
  dealloc_stack %1
  return %6
}
"#;
        let outcome = run_pass(&mut DefiniteInit, text, &PassOptions::default());
        assert!(outcome.diagnostics.is_empty());
    }

    #[test]
    fn test_unnamed_slot_uses_value_name() {
        let text = r#"
fn @f() -> i8 {
bb0:
  %0 = alloc_stack i8
  %1 = load %0 : i8
  dealloc_stack %0
  return %1
}
"#;
        let outcome = run_pass(&mut DefiniteInit, text, &PassOptions::default());
        assert_eq!(
            messages(&outcome),
            vec!["variable '%0' used before being initialized"]
        );
    }
}
