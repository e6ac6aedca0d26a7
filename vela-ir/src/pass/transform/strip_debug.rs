use crate::ir::{Module, Op};
use crate::pass::{parse_config, BoxedPass, NoConfig, Pass, PassContext, PassError, PassType};

pub struct StripDebugInfo;

pub fn get_pass(config: &toml::Table) -> Result<BoxedPass, toml::de::Error> {
    parse_config::<NoConfig>(config)?;
    Ok(Box::new(StripDebugInfo))
}

impl Pass for StripDebugInfo {
    fn identifier(&self) -> &'static str {
        "strip-debug-info"
    }

    fn pass_type(&self) -> PassType {
        PassType::Transform
    }

    fn run(&mut self, module: &mut Module, ctx: &mut PassContext) -> Result<(), PassError> {
        let mut removed = 0;
        for block in module.functions.iter_mut().flat_map(|f| f.blocks.iter_mut()) {
            let before = block.instructions.len();
            block
                .instructions
                .retain(|inst| !matches!(inst.op, Op::DebugValue { .. }));
            removed += before - block.instructions.len();
        }
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
    fn test_debug_values_are_removed() {
        let text = r#"
fn @f(%0 : i64) -> i64 {
bb0:
  debug_value %0, "x"
  %1 = add %0, %0 : i64
  debug_value %1, "y"
  return %1
}
"#;
        let outcome = run_pass(&mut StripDebugInfo, text, &PassOptions::default());
        assert_eq!(outcome.module.functions[0].instruction_count(), 1);
        assert_eq!(outcome.statistics.get("strip-debug-info.removed"), 2);
    }
}
