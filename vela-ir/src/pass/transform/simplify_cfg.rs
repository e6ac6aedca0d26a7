use crate::ir::{Function, Module, TerminatorKind};
use crate::pass::{parse_config, BoxedPass, NoConfig, Pass, PassContext, PassError, PassType};

pub struct SimplifyCfg;

pub fn get_pass(config: &toml::Table) -> Result<BoxedPass, toml::de::Error> {
    parse_config::<NoConfig>(config)?;
    Ok(Box::new(SimplifyCfg))
}

#[derive(Default)]
struct Counters {
    folded: usize,
    removed: usize,
    threaded: usize,
    merged: usize,
}

/// Redirects the predecessors of one empty block that only branches elsewhere.
fn thread_empty_block(function: &mut Function) -> bool {
    let found = function.blocks.iter().enumerate().skip(1).find_map(|(index, block)| {
        match &block.terminator.kind {
            TerminatorKind::Branch(dest) if block.instructions.is_empty() && dest != &block.label => {
                Some((index, dest.clone()))
            }
            _ => None,
        }
    });
    let Some((index, dest)) = found else {
        return false;
    };
    let label = function.blocks[index].label.clone();
    let mut threaded = false;
    for (pred, block) in function.blocks.iter_mut().enumerate() {
        if pred == index {
            continue;
        }
        for succ in block.terminator.successors_mut() {
            if *succ == label {
                *succ = dest.clone();
                threaded = true;
            }
        }
    }
    threaded
}

/// Appends one block to its only predecessor when that predecessor branches to it
/// unconditionally.
fn merge_straight_line(function: &mut Function) -> bool {
    let preds = function.predecessors();
    let found = (0..function.blocks.len()).find_map(|index| {
        let TerminatorKind::Branch(dest) = &function.blocks[index].terminator.kind else {
            return None;
        };
        let succ = function.block_index(dest)?;
        (succ != 0 && succ != index && preds[succ] == [index]).then_some((index, succ))
    });
    let Some((index, succ)) = found else {
        return false;
    };
    let merged = function.blocks.remove(succ);
    let index = if succ < index { index - 1 } else { index };
    let block = &mut function.blocks[index];
    block.instructions.extend(merged.instructions);
    block.terminator = merged.terminator;
    true
}

impl SimplifyCfg {
    fn simplify(function: &mut Function, counters: &mut Counters) {
        loop {
            let folded = function.fold_constant_branches();
            let removed = function.remove_unreachable_blocks();
            counters.folded += folded;
            counters.removed += removed;
            if thread_empty_block(function) {
                counters.threaded += 1;
                continue;
            }
            if merge_straight_line(function) {
                counters.merged += 1;
                continue;
            }
            if folded == 0 && removed == 0 {
                break;
            }
        }
    }
}

impl Pass for SimplifyCfg {
    fn identifier(&self) -> &'static str {
        "simplify-cfg"
    }

    fn pass_type(&self) -> PassType {
        PassType::Transform
    }

    fn run(&mut self, module: &mut Module, ctx: &mut PassContext) -> Result<(), PassError> {
        let mut counters = Counters::default();
        for function in module.functions.iter_mut().filter(|f| !f.is_declaration()) {
            Self::simplify(function, &mut counters);
        }
        ctx.bump("folded", counters.folded);
        ctx.bump("removed", counters.removed);
        ctx.bump("threaded", counters.threaded);
        ctx.bump("merged", counters.merged);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use vela_core::Ident;

    use super::*;
    use crate::pass::testing::run_pass;
    use crate::pass::PassOptions;

    #[test]
    fn test_collapses_to_a_single_block() {
        let text = r#"
fn @f(%0 : i64) -> i64 {
bb0:
  %1 = integer_literal 0 : i1
  cond_br %1, bb1, bb2
bb1:
  %2 = add %0, %0 : i64
  return %2
bb2:
  br bb3
bb3:
  %3 = mul %0, %0 : i64
  br bb4
bb4:
  return %3
}
"#;
        let outcome = run_pass(&mut SimplifyCfg, text, &PassOptions::default());
        let function = &outcome.module.functions[0];
        assert_eq!(function.blocks.len(), 1);
        assert_eq!(function.blocks[0].instructions.len(), 2);
        assert_eq!(
            function.blocks[0].terminator.kind,
            TerminatorKind::Return(Some(crate::ir::Value(3)))
        );
        assert_eq!(outcome.statistics.get("simplify-cfg.folded"), 1);
    }

    #[test]
    fn test_threads_empty_blocks_but_keeps_loops() {
        let text = r#"
fn @f(%0 : i1) -> () {
bb0:
  cond_br %0, bb1, bb3
bb1:
  br bb2
bb2:
  br bb2
bb3:
  return
}
"#;
        let outcome = run_pass(&mut SimplifyCfg, text, &PassOptions::default());
        let function = &outcome.module.functions[0];
        assert_eq!(
            function.blocks[0].terminator.kind,
            TerminatorKind::CondBranch {
                condition: crate::ir::Value(0),
                then_dest: Ident::new("bb2"),
                else_dest: Ident::new("bb3"),
            }
        );
        assert!(function.block_index(&Ident::new("bb1")).is_none());
        assert_eq!(function.blocks.len(), 3);
    }
}
