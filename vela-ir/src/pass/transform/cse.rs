use std::collections::HashMap;

use crate::ir::{Function, Module, Op, Value};
use crate::pass::analysis::DominatorTree;
use crate::pass::{parse_config, BoxedPass, NoConfig, Pass, PassContext, PassError, PassType};

use super::apply_substitution;

/// Common subexpression elimination of pure instructions, scoped by dominance.
pub struct Cse;

pub fn get_pass(config: &toml::Table) -> Result<BoxedPass, toml::de::Error> {
    parse_config::<NoConfig>(config)?;
    Ok(Box::new(Cse))
}

/// Operands of commutative operations in a fixed order, so `add %1, %2` and `add %2, %1` meet.
fn canonical(op: &Op) -> Op {
    match op {
        Op::Binary {
            op,
            lhs,
            rhs,
            width,
        } if op.is_commutative() && rhs < lhs => Op::Binary {
            op: *op,
            lhs: *rhs,
            rhs: *lhs,
            width: *width,
        },
        _ => op.clone(),
    }
}

fn eliminate(function: &mut Function, dominance: &DominatorTree) -> usize {
    let mut available: HashMap<Op, Vec<(usize, Value)>> = HashMap::new();
    let mut substitution: HashMap<Value, Value> = HashMap::new();
    let mut eliminated = 0;
    for &index in dominance.reverse_post_order() {
        let block = &mut function.blocks[index];
        block.instructions.retain_mut(|inst| {
            for operand in inst.op.operands_mut() {
                if let Some(&to) = substitution.get(operand) {
                    *operand = to;
                }
            }
            let Some(result) = inst.result.filter(|_| inst.op.is_pure()) else {
                return true;
            };
            let key = canonical(&inst.op);
            let existing = available.get(&key).and_then(|defs| {
                defs.iter()
                    .find(|(def_block, _)| dominance.dominates(*def_block, index))
                    .map(|(_, value)| *value)
            });
            match existing {
                Some(value) => {
                    substitution.insert(result, value);
                    eliminated += 1;
                    false
                }
                None => {
                    available.entry(key).or_default().push((index, result));
                    true
                }
            }
        });
    }
    apply_substitution(function, &substitution);
    eliminated
}

impl Pass for Cse {
    fn identifier(&self) -> &'static str {
        "cse"
    }

    fn pass_type(&self) -> PassType {
        PassType::Transform
    }

    fn run(&mut self, module: &mut Module, ctx: &mut PassContext) -> Result<(), PassError> {
        let mut eliminated = 0;
        for function in module.functions.iter_mut() {
            if function.is_declaration() {
                continue;
            }
            let dominance = ctx.dominance(function)?;
            eliminated += eliminate(function, &dominance);
        }
        ctx.bump("eliminated", eliminated);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::pass::testing::run_pass;
    use crate::pass::PassOptions;

    #[test]
    fn test_eliminates_dominated_duplicates() {
        let text = r#"
global @g : i64
fn @f(%0 : i64, %1 : i64, %2 : i1) -> i64 {
bb0:
  %3 = add %0, %1 : i64
  %4 = add %1, %0 : i64
  %5 = global_addr @g : *i64
  cond_br %2, bb1, bb2
bb1:
  %6 = mul %3, %4 : i64
  %7 = global_addr @g : *i64
  br bb3
bb2:
  %8 = mul %3, %3 : i64
  br bb3
bb3:
  %9 = mul %3, %3 : i64
  return %9
}
"#;
        let outcome = run_pass(&mut Cse, text, &PassOptions::default());
        let function = &outcome.module.functions[0];
        // %4 and %7 repeat %3 and %5; %9 is dominated by neither %6 nor %8
        assert_eq!(function.blocks[0].instructions.len(), 2);
        assert_eq!(function.blocks[1].instructions.len(), 1);
        assert_eq!(
            function.blocks[1].instructions[0].op.operands().collect::<Vec<_>>(),
            vec![Value(3), Value(3)]
        );
        assert_eq!(function.blocks[3].instructions.len(), 1);
        assert_eq!(outcome.statistics.get("cse.eliminated"), 2);
    }

    #[test]
    fn test_side_effects_are_never_merged() {
        let text = r#"
fn @f(%0 : *i64) -> i64 {
bb0:
  %1 = load %0 : i64
  %2 = load %0 : i64
  %3 = add %1, %2 : i64
  return %3
}
"#;
        let outcome = run_pass(&mut Cse, text, &PassOptions::default());
        assert_eq!(outcome.module.functions[0].blocks[0].instructions.len(), 3);
        assert_eq!(outcome.statistics.get("cse.eliminated"), 0);
    }
}
