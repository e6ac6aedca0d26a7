use std::collections::{HashMap, HashSet};

use crate::ir::{BasicBlock, Module, Op, Value};
use crate::pass::analysis::{AliasAnalysis, AliasResult};
use crate::pass::{parse_config, BoxedPass, NoConfig, Pass, PassContext, PassError, PassType};

use super::apply_substitution;

/// Block-local store-to-load forwarding, redundant load elimination and dead store
/// elimination over the alias analysis.
pub struct LoadStoreOpts;

pub fn get_pass(config: &toml::Table) -> Result<BoxedPass, toml::de::Error> {
    parse_config::<NoConfig>(config)?;
    Ok(Box::new(LoadStoreOpts))
}

#[derive(Default)]
struct Counters {
    forwarded: usize,
    dead_stores: usize,
}

struct BlockState<'a> {
    aa: &'a AliasAnalysis,
    /// Address and the value it is known to hold.
    known: Vec<(Value, Value)>,
    /// Stores not read yet, with their instruction index.
    pending: Vec<(Value, usize)>,
    dead: HashSet<usize>,
}

impl<'a> BlockState<'a> {
    fn new(aa: &'a AliasAnalysis) -> Self {
        Self {
            aa,
            known: Vec::new(),
            pending: Vec::new(),
            dead: HashSet::new(),
        }
    }

    fn clobber(&mut self, address: Value) {
        let aa = self.aa;
        self.known
            .retain(|(a, _)| aa.alias(*a, address) == AliasResult::NoAlias);
    }

    fn read(&mut self, address: Value) {
        let aa = self.aa;
        self.pending
            .retain(|(a, _)| aa.alias(*a, address) == AliasResult::NoAlias);
    }

    /// Pending stores to `address` that can never be read; returns how many there were.
    fn kill(&mut self, address: Value) -> usize {
        let aa = self.aa;
        let before = self.dead.len();
        let dead = &mut self.dead;
        self.pending.retain(|(a, index)| {
            if aa.alias(*a, address) == AliasResult::MustAlias {
                dead.insert(*index);
                false
            } else {
                true
            }
        });
        self.dead.len() - before
    }

    fn call(&mut self) {
        let aa = self.aa;
        self.known.retain(|(a, _)| !aa.is_visible_to_calls(*a));
        self.pending.retain(|(a, _)| !aa.is_visible_to_calls(*a));
    }

    fn lookup(&self, address: Value) -> Option<Value> {
        self.known
            .iter()
            .find(|(a, _)| self.aa.alias(*a, address) == AliasResult::MustAlias)
            .map(|(_, value)| *value)
    }
}

fn optimize_block(
    block: &mut BasicBlock,
    aa: &AliasAnalysis,
    substitution: &mut HashMap<Value, Value>,
    counters: &mut Counters,
) {
    let mut state = BlockState::new(aa);
    for (index, inst) in block.instructions.iter_mut().enumerate() {
        for operand in inst.op.operands_mut() {
            if let Some(&to) = substitution.get(operand) {
                *operand = to;
            }
        }
        match &inst.op {
            Op::Store { value, address } => {
                counters.dead_stores += state.kill(*address);
                state.clobber(*address);
                state.known.push((*address, *value));
                state.pending.push((*address, index));
            }
            Op::Load { address, .. } => {
                state.read(*address);
                let Some(result) = inst.result else {
                    continue;
                };
                match state.lookup(*address) {
                    Some(value) => {
                        substitution.insert(result, value);
                        state.dead.insert(index);
                        counters.forwarded += 1;
                    }
                    None => state.known.push((*address, result)),
                }
            }
            Op::DeallocStack(slot) => {
                counters.dead_stores += state.kill(*slot);
                state.clobber(*slot);
            }
            op if op.may_release() => state.call(),
            _ => {}
        }
    }
    let dead = state.dead;
    let mut index = 0;
    block.instructions.retain(|_| {
        let keep = !dead.contains(&index);
        index += 1;
        keep
    });
}

impl Pass for LoadStoreOpts {
    fn identifier(&self) -> &'static str {
        "load-store-opts"
    }

    fn pass_type(&self) -> PassType {
        PassType::Transform
    }

    fn run(&mut self, module: &mut Module, ctx: &mut PassContext) -> Result<(), PassError> {
        let mut counters = Counters::default();
        for function in module.functions.iter_mut() {
            if function.is_declaration() {
                continue;
            }
            let aa = ctx.alias(function)?;
            let mut substitution = HashMap::new();
            for block in function.blocks.iter_mut() {
                optimize_block(block, &aa, &mut substitution, &mut counters);
            }
            apply_substitution(function, &substitution);
        }
        ctx.bump("forwarded", counters.forwarded);
        ctx.bump("dead-stores", counters.dead_stores);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::pass::testing::run_pass;
    use crate::pass::PassOptions;

    #[test]
    fn test_forwarding_respects_calls_and_aliasing() {
        let text = r#"
fn @callee() -> ()
fn @f(%0 : *i64, %1 : i64, %2 : i64) -> i64 {
bb0:
  %3 = alloc_stack i64
  store %1 to %3
  store %2 to %3
  %4 = load %3 : i64
  store %1 to %0
  %5 = load %0 : i64
  %6 = function_ref @callee
  %7 = apply %6() : ()
  %8 = load %0 : i64
  %9 = load %3 : i64
  %10 = add %4, %5 : i64
  %11 = add %10, %8 : i64
  %12 = add %11, %9 : i64
  dealloc_stack %3
  return %12
}
"#;
        let mut pass = LoadStoreOpts;
        let outcome = run_pass(&mut pass, text, &PassOptions::default());
        let block = &outcome.module.functions[1].blocks[0];
        assert_eq!(block.instructions.len(), 10);
        let first_add = block
            .instructions
            .iter()
            .find(|i| i.result == Some(Value(10)))
            .unwrap();
        assert_eq!(first_add.op.operands().collect::<Vec<_>>(), vec![Value(2), Value(1)]);
        let last_add = block
            .instructions
            .iter()
            .find(|i| i.result == Some(Value(12)))
            .unwrap();
        assert_eq!(last_add.op.operands().collect::<Vec<_>>(), vec![Value(11), Value(2)]);
        assert_eq!(outcome.statistics.get("load-store-opts.forwarded"), 3);
        assert_eq!(outcome.statistics.get("load-store-opts.dead-stores"), 1);
    }

    #[test]
    fn test_store_before_dealloc_is_dead() {
        let text = r#"
fn @f(%0 : i64) -> () {
bb0:
  %1 = alloc_stack i64
  store %0 to %1
  dealloc_stack %1
  return
}
"#;
        let outcome = run_pass(&mut LoadStoreOpts, text, &PassOptions::default());
        let block = &outcome.module.functions[0].blocks[0];
        let kept: Vec<&str> = block.instructions.iter().map(|i| i.op.mnemonic()).collect();
        assert_eq!(kept, vec!["alloc_stack", "dealloc_stack"]);
    }
}
