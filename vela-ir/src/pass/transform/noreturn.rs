use std::collections::HashSet;

use vela_core::Ident;

use crate::ir::{direct_callee, Module, Terminator, TerminatorKind};
use crate::pass::{parse_config, BoxedPass, NoConfig, Pass, PassContext, PassError, PassType};

/// Cuts every block short after a call to a `noreturn` function.
pub struct NoReturnFolding;

pub fn get_pass(config: &toml::Table) -> Result<BoxedPass, toml::de::Error> {
    parse_config::<NoConfig>(config)?;
    Ok(Box::new(NoReturnFolding))
}

impl Pass for NoReturnFolding {
    fn identifier(&self) -> &'static str {
        "noreturn-folding"
    }

    fn pass_type(&self) -> PassType {
        PassType::Transform
    }

    fn run(&mut self, module: &mut Module, ctx: &mut PassContext) -> Result<(), PassError> {
        let noreturn: HashSet<Ident> = module
            .functions
            .iter()
            .filter(|f| f.attributes.noreturn)
            .map(|f| f.name.clone())
            .collect();
        if noreturn.is_empty() {
            return Ok(());
        }
        let mut folded = 0;
        for function in module.functions.iter_mut() {
            let refs = function.function_refs();
            let mut changed = false;
            for block in function.blocks.iter_mut() {
                let call = block.instructions.iter().position(|inst| {
                    direct_callee(&refs, &inst.op).is_some_and(|name| noreturn.contains(name))
                });
                let Some(call) = call else {
                    continue;
                };
                let last = call + 1 == block.instructions.len();
                if last && block.terminator.kind == TerminatorKind::Unreachable {
                    continue;
                }
                block.instructions.truncate(call + 1);
                block.terminator = Terminator {
                    kind: TerminatorKind::Unreachable,
                    loc: block.instructions[call].loc,
                };
                changed = true;
                folded += 1;
            }
            if changed {
                let removed = function.remove_unreachable_blocks();
                log::trace!("@{}: dropped {removed} blocks after noreturn calls", function.name);
            }
        }
        ctx.bump("folded", folded);
        Ok(())
    }
}
