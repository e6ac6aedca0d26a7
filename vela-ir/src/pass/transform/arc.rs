use crate::ir::{BasicBlock, Module, Op};
use crate::pass::{parse_config, BoxedPass, NoConfig, Pass, PassContext, PassError, PassType};

/// Removes a `strong_retain` and a later `strong_release` of the same value in one block when
/// nothing between them may release an object.
pub struct ArcOpts;

pub fn get_pass(config: &toml::Table) -> Result<BoxedPass, toml::de::Error> {
    parse_config::<NoConfig>(config)?;
    Ok(Box::new(ArcOpts))
}

fn find_pair(block: &BasicBlock) -> Option<(usize, usize)> {
    for (start, inst) in block.instructions.iter().enumerate() {
        let Op::StrongRetain(retained) = inst.op else {
            continue;
        };
        for (offset, later) in block.instructions[start + 1..].iter().enumerate() {
            match later.op {
                Op::StrongRelease(released) if released == retained => {
                    return Some((start, start + 1 + offset));
                }
                ref op if op.may_release() => break,
                _ => {}
            }
        }
    }
    None
}

impl Pass for ArcOpts {
    fn identifier(&self) -> &'static str {
        "arc-opts"
    }

    fn pass_type(&self) -> PassType {
        PassType::Transform
    }

    fn run(&mut self, module: &mut Module, ctx: &mut PassContext) -> Result<(), PassError> {
        let mut removed = 0;
        for block in module
            .functions
            .iter_mut()
            .flat_map(|f| f.blocks.iter_mut())
        {
            while let Some((retain, release)) = find_pair(block) {
                block.instructions.remove(release);
                block.instructions.remove(retain);
                removed += 1;
            }
        }
        ctx.bump("removed-pairs", removed);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::pass::testing::run_pass;
    use crate::pass::PassOptions;

    #[test]
    fn test_pairs_are_removed_unless_released_in_between() {
        let text = r#"
fn @f(%0 : $C, %1 : $C) -> () {
bb0:
  strong_retain %0
  %2 = integer_literal 1 : i64
  strong_release %0
  strong_retain %0
  strong_release %1
  strong_release %0
  return
}
"#;
        let outcome = run_pass(&mut ArcOpts, text, &PassOptions::default());
        let block = &outcome.module.functions[0].blocks[0];
        let kept: Vec<&str> = block.instructions.iter().map(|i| i.op.mnemonic()).collect();
        assert_eq!(
            kept,
            vec!["integer_literal", "strong_retain", "strong_release", "strong_release"]
        );
        assert_eq!(outcome.statistics.get("arc-opts.removed-pairs"), 1);
    }
}
