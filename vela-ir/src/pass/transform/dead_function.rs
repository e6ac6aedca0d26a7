use crate::ir::Module;
use crate::pass::{parse_config, BoxedPass, NoConfig, Pass, PassContext, PassError, PassType};

/// Removes private functions that public functions and method tables cannot reach.
pub struct DeadFunctionElimination;

pub fn get_pass(config: &toml::Table) -> Result<BoxedPass, toml::de::Error> {
    parse_config::<NoConfig>(config)?;
    Ok(Box::new(DeadFunctionElimination))
}

impl Pass for DeadFunctionElimination {
    fn identifier(&self) -> &'static str {
        "dead-function-elim"
    }

    fn pass_type(&self) -> PassType {
        PassType::Transform
    }

    fn run(&mut self, module: &mut Module, ctx: &mut PassContext) -> Result<(), PassError> {
        let graph = ctx.call_graph(module)?;
        let public = module
            .functions
            .iter()
            .filter(|f| !f.attributes.private)
            .map(|f| &f.name);
        let tables = module
            .vtables
            .iter()
            .flat_map(|v| v.entries.iter())
            .chain(module.witness_tables.iter().flat_map(|w| w.entries.iter()))
            .map(|entry| &entry.implementation);
        let live = graph.reachable_from(public.chain(tables));
        let before = module.functions.len();
        module
            .functions
            .retain(|f| !f.attributes.private || live.contains(&f.name));
        let removed = before - module.functions.len();
        if removed > 0 {
            log::debug!("removed {removed} dead functions from module '{}'", module.name);
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
    fn test_keeps_reachable_private_functions() {
        let text = r#"
fn @helper() -> () [private] {
bb0:
  return
}
fn @orphan() -> () [private] {
bb0:
  %0 = function_ref @orphan
  return
}
fn @method() -> () [private]
fn @main() -> () {
bb0:
  %0 = function_ref @helper
  %1 = apply %0() : ()
  return
}
vtable $C { #C.m : @method }
"#;
        let outcome = run_pass(&mut DeadFunctionElimination, text, &PassOptions::default());
        let names: Vec<&str> = outcome
            .module
            .functions
            .iter()
            .map(|f| f.name.as_ref())
            .collect();
        assert_eq!(names, vec!["helper", "method", "main"]);
        assert_eq!(outcome.statistics.get("dead-function-elim.removed"), 1);
    }
}
