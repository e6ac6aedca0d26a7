use std::collections::{HashMap, HashSet};

use crate::ir::{BinOp, FoldError, Function, Instruction, Module, Op, Value};
use crate::pass::{
    parse_config, BoxedPass, NoConfig, Pass, PassContext, PassError, PassType,
    DISABLE_ASSERT_CONFIG_REPLACEMENT,
};
use crate::types::IntWidth;

/// Folds integer arithmetic over literals, `assert_config` and statically passing `cond_fail`.
///
/// The diagnostic flavor also reports literals that do not fit their type, arithmetic that
/// overflows and division by zero, each once per instruction.
pub struct ConstantPropagation {
    diagnose: bool,
}

pub fn get_diagnostic_pass(config: &toml::Table) -> Result<BoxedPass, toml::de::Error> {
    parse_config::<NoConfig>(config)?;
    Ok(Box::new(ConstantPropagation { diagnose: true }))
}

pub fn get_performance_pass(config: &toml::Table) -> Result<BoxedPass, toml::de::Error> {
    parse_config::<NoConfig>(config)?;
    Ok(Box::new(ConstantPropagation { diagnose: false }))
}

impl Pass for ConstantPropagation {
    fn identifier(&self) -> &'static str {
        if self.diagnose {
            "diagnostic-constant-propagation"
        } else {
            "performance-constant-propagation"
        }
    }

    fn pass_type(&self) -> PassType {
        PassType::Transform
    }

    fn run(&mut self, module: &mut Module, ctx: &mut PassContext) -> Result<(), PassError> {
        let mut folded = 0;
        let mut removed = 0;
        for function in module.functions.iter_mut() {
            let constants = self.fold(function, ctx, &mut folded);
            removed += remove_cond_fails(function, &constants, ctx.options.remove_runtime_asserts);
        }
        ctx.bump("folded", folded);
        ctx.bump("removed-cond-fails", removed);
        Ok(())
    }
}

impl ConstantPropagation {
    fn report(&self, ctx: &mut PassContext, inst: &Instruction, message: String) {
        if self.diagnose {
            ctx.diagnostics.error(inst.loc, message);
        }
    }

    /// Folds until nothing changes and returns the literal value of every constant.
    fn fold(
        &self,
        function: &mut Function,
        ctx: &mut PassContext,
        folded: &mut usize,
    ) -> HashMap<Value, i128> {
        let assert_config = ctx.options.assert_config;
        let mut constants = HashMap::new();
        let mut reported: HashSet<Value> = HashSet::new();
        loop {
            let mut changed = false;
            for block in function.blocks.iter_mut() {
                for inst in block.instructions.iter_mut() {
                    let Some(result) = inst.result else {
                        continue;
                    };
                    let replacement = match &inst.op {
                        Op::IntegerLiteral { value, width } => {
                            if width.contains(*value) {
                                constants.insert(result, *value);
                            } else if reported.insert(result) {
                                self.report(
                                    ctx,
                                    inst,
                                    format!(
                                        "integer literal '{value}' overflows when stored into '{width}'"
                                    ),
                                );
                            }
                            None
                        }
                        Op::Binary {
                            op,
                            lhs,
                            rhs,
                            width,
                        } => match (constants.get(lhs), constants.get(rhs)) {
                            (Some(&l), Some(&r)) => match op.evaluate(l, r, *width) {
                                Ok(value) => Some(Op::IntegerLiteral {
                                    value,
                                    width: op.result_width(*width),
                                }),
                                Err(error) => {
                                    if reported.insert(result) {
                                        let message = fold_error_message(error, *op, l, r, *width);
                                        self.report(ctx, inst, message);
                                    }
                                    None
                                }
                            },
                            (_, Some(&0)) if matches!(op, BinOp::SDiv | BinOp::SRem) => {
                                if reported.insert(result) {
                                    self.report(ctx, inst, "division by zero".to_string());
                                }
                                None
                            }
                            _ => None,
                        },
                        Op::AssertConfig if assert_config != DISABLE_ASSERT_CONFIG_REPLACEMENT => {
                            Some(Op::IntegerLiteral {
                                value: assert_config.into(),
                                width: IntWidth::I64,
                            })
                        }
                        _ => None,
                    };
                    if let Some(op) = replacement {
                        if let Op::IntegerLiteral { value, .. } = op {
                            constants.insert(result, value);
                        }
                        inst.op = op;
                        changed = true;
                        *folded += 1;
                    }
                }
            }
            if !changed {
                break constants;
            }
        }
    }
}

fn fold_error_message(error: FoldError, op: BinOp, lhs: i128, rhs: i128, width: IntWidth) -> String {
    match error {
        FoldError::DivisionByZero => "division by zero".to_string(),
        FoldError::Overflow => format!(
            "arithmetic operation '{lhs} {} {rhs}' (on type '{width}') results in an overflow",
            op.symbol()
        ),
    }
}

/// Drops `cond_fail` whose condition is the literal zero, or every `cond_fail` when runtime
/// asserts are disabled.
fn remove_cond_fails(function: &mut Function, constants: &HashMap<Value, i128>, all: bool) -> usize {
    let mut removed = 0;
    for block in function.blocks.iter_mut() {
        let before = block.instructions.len();
        block.instructions.retain(|inst| match &inst.op {
            Op::CondFail { condition, .. } => !all && constants.get(condition) != Some(&0),
            _ => true,
        });
        removed += before - block.instructions.len();
    }
    removed
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::pass::testing::{messages, run_pass};
    use crate::pass::PassOptions;

    #[test]
    fn test_folds_arithmetic_chains() {
        let text = r#"
fn @f() -> i1 {
bb0:
  %0 = integer_literal 6 : i32
  %1 = integer_literal 7 : i32
  %2 = mul %0, %1 : i32
  %3 = sub %2, %0 : i32
  %4 = integer_literal 36 : i32
  %5 = eq %3, %4 : i32
  return %5
}
"#;
        let mut pass = get_performance_pass(&toml::Table::new()).unwrap();
        let outcome = run_pass(pass.as_mut(), text, &PassOptions::default());
        let block = &outcome.module.functions[0].blocks[0];
        assert_eq!(
            block.instructions[3].op,
            Op::IntegerLiteral {
                value: 36,
                width: IntWidth::I32
            }
        );
        assert_eq!(
            block.instructions[5].op,
            Op::IntegerLiteral {
                value: 1,
                width: IntWidth::I1
            }
        );
        assert!(outcome.diagnostics.is_empty());
        assert_eq!(outcome.statistics.get("performance-constant-propagation.folded"), 3);
    }

    const OVERFLOWS: &str = r#"
fn @f(%0 : i32) -> () {
bb0:
  %1 = integer_literal 300 : i8
  %2 = integer_literal 127 : i8
  %3 = integer_literal 1 : i8
  %4 = add %2, %3 : i8
  %5 = integer_literal 0 : i32
  %6 = sdiv %0, %5 : i32
  return
}
"#;

    #[test]
    fn test_reports_overflow_and_division_by_zero() {
        let mut pass = get_diagnostic_pass(&toml::Table::new()).unwrap();
        let outcome = run_pass(pass.as_mut(), OVERFLOWS, &PassOptions::default());
        assert_eq!(
            messages(&outcome),
            vec![
                "integer literal '300' overflows when stored into 'i8'",
                "arithmetic operation '127 + 1' (on type 'i8') results in an overflow",
                "division by zero",
            ]
        );
        let loc = outcome.diagnostics[0].location.unwrap();
        assert_eq!((loc.line, loc.column), (4, 3));
    }

    #[test]
    fn test_performance_flavor_is_silent() {
        let mut pass = get_performance_pass(&toml::Table::new()).unwrap();
        let outcome = run_pass(pass.as_mut(), OVERFLOWS, &PassOptions::default());
        assert!(outcome.diagnostics.is_empty());
    }

    const ASSERTS: &str = r#"
fn @f(%0 : i1) -> () {
bb0:
  %1 = assert_config
  %2 = integer_literal 0 : i1
  cond_fail %2, "never"
  cond_fail %0, "maybe"
  return
}
"#;

    #[test]
    fn test_assert_config_and_cond_fail() {
        let options = PassOptions {
            assert_config: 2,
            ..PassOptions::default()
        };
        let mut pass = get_performance_pass(&toml::Table::new()).unwrap();
        let outcome = run_pass(pass.as_mut(), ASSERTS, &options);
        let block = &outcome.module.functions[0].blocks[0];
        assert_eq!(
            block.instructions[0].op,
            Op::IntegerLiteral {
                value: 2,
                width: IntWidth::I64
            }
        );
        assert_eq!(block.instructions.len(), 3);
        assert!(matches!(
            &block.instructions[2].op,
            Op::CondFail { message, .. } if message == "maybe"
        ));
    }

    #[test]
    fn test_disabled_assert_config_and_removed_asserts() {
        let options = PassOptions {
            assert_config: DISABLE_ASSERT_CONFIG_REPLACEMENT,
            remove_runtime_asserts: true,
            ..PassOptions::default()
        };
        let mut pass = get_performance_pass(&toml::Table::new()).unwrap();
        let outcome = run_pass(pass.as_mut(), ASSERTS, &options);
        let block = &outcome.module.functions[0].blocks[0];
        assert_eq!(block.instructions[0].op, Op::AssertConfig);
        assert_eq!(block.instructions.len(), 2);
        assert_eq!(outcome.statistics.get("performance-constant-propagation.removed-cond-fails"), 2);
    }
}
