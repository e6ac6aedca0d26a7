use vela_core::Location;

use crate::ir::{BasicBlock, Function, Module, TerminatorKind};
use crate::pass::{parse_config, BoxedPass, NoConfig, Pass, PassContext, PassError, PassType};

/// Folds constant branches, warns once per region of code that can never run, then deletes it.
pub struct DiagnoseUnreachable;

pub fn get_pass(config: &toml::Table) -> Result<BoxedPass, toml::de::Error> {
    parse_config::<NoConfig>(config)?;
    Ok(Box::new(DiagnoseUnreachable))
}

/// Location reported for an unreachable block, or `None` when the block holds nothing but
/// `unreachable`, which needs no warning.
fn warning_location(block: &BasicBlock) -> Option<Option<Location>> {
    match block.instructions.first() {
        Some(inst) => Some(inst.loc),
        None if block.terminator.kind == TerminatorKind::Unreachable => None,
        None => Some(block.terminator.loc),
    }
}

/// Heads of the unreachable regions: blocks without predecessors first, then one block for
/// each dead cycle that is left over.
fn region_heads(function: &Function) -> Vec<usize> {
    let reachable = function.reachable();
    let preds = function.predecessors();
    let mut covered = reachable.clone();
    let mut heads = Vec::new();
    let candidates = (0..function.blocks.len())
        .filter(|&b| !reachable[b] && preds[b].iter().all(|&p| p == b))
        .chain(0..function.blocks.len())
        .collect::<Vec<_>>();
    for head in candidates {
        if covered[head] {
            continue;
        }
        heads.push(head);
        let mut worklist = vec![head];
        covered[head] = true;
        while let Some(block) = worklist.pop() {
            for succ in function.successor_indices(block) {
                if !covered[succ] {
                    covered[succ] = true;
                    worklist.push(succ);
                }
            }
        }
    }
    heads
}

impl Pass for DiagnoseUnreachable {
    fn identifier(&self) -> &'static str {
        "diagnose-unreachable"
    }

    fn pass_type(&self) -> PassType {
        PassType::Transform
    }

    fn run(&mut self, module: &mut Module, ctx: &mut PassContext) -> Result<(), PassError> {
        let mut folded = 0;
        let mut removed = 0;
        for function in module.functions.iter_mut() {
            folded += function.fold_constant_branches();
            for head in region_heads(function) {
                if let Some(loc) = warning_location(&function.blocks[head]) {
                    ctx.diagnostics.warning(loc, "will never be executed");
                }
            }
            removed += function.remove_unreachable_blocks();
        }
        ctx.bump("folded-branches", folded);
        ctx.bump("removed-blocks", removed);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::diagnostic::Severity;
    use crate::pass::testing::{messages, run_pass};
    use crate::pass::PassOptions;

    #[test]
    fn test_warns_once_per_dead_region() {
        let text = r#"
fn @f() -> () {
bb0:
  %0 = integer_literal 1 : i1
  cond_br %0, bb1, bb2
bb1:
  return
bb2:
  %1 = integer_literal 5 : i64
  br bb3
bb3:
  %2 = integer_literal 6 : i64
  return
}
"#;
        let outcome = run_pass(&mut DiagnoseUnreachable, text, &PassOptions::default());
        assert_eq!(messages(&outcome), vec!["will never be executed"]);
        let diagnostic = &outcome.diagnostics[0];
        assert_eq!(diagnostic.severity, Severity::Warning);
        assert_eq!(diagnostic.location.map(|l| l.line), Some(9));
        let function = &outcome.module.functions[0];
        assert_eq!(function.blocks.len(), 2);
        assert_eq!(outcome.statistics.get("diagnose-unreachable.removed-blocks"), 2);
    }

    #[test]
    fn test_dead_cycles_and_bare_unreachable() {
        let text = r#"
fn @f() -> () {
bb0:
  return
bb1:
  br bb2
bb2:
  br bb1
bb3:
  unreachable
}
"#;
        let outcome = run_pass(&mut DiagnoseUnreachable, text, &PassOptions::default());
        assert_eq!(messages(&outcome), vec!["will never be executed"]);
        assert_eq!(outcome.diagnostics[0].location.map(|l| l.line), Some(6));
        assert_eq!(outcome.module.functions[0].blocks.len(), 1);
    }

    #[test]
    fn test_reachable_code_is_quiet() {
        let text = r#"
fn @f(%0 : i1) -> () {
bb0:
  cond_br %0, bb1, bb1
bb1:
  return
}
"#;
        let outcome = run_pass(&mut DiagnoseUnreachable, text, &PassOptions::default());
        assert!(outcome.diagnostics.is_empty());
        assert_eq!(outcome.statistics.get("diagnose-unreachable.folded-branches"), 1);
    }
}
