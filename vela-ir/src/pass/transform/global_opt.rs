use std::collections::HashSet;

use vela_core::Ident;

use crate::ir::{Module, Op};
use crate::pass::{parse_config, BoxedPass, NoConfig, Pass, PassContext, PassError, PassType};

/// Removes private globals that no `global_addr` refers to.
pub struct GlobalOpt;

pub fn get_pass(config: &toml::Table) -> Result<BoxedPass, toml::de::Error> {
    parse_config::<NoConfig>(config)?;
    Ok(Box::new(GlobalOpt))
}

impl Pass for GlobalOpt {
    fn identifier(&self) -> &'static str {
        "global-opt"
    }

    fn pass_type(&self) -> PassType {
        PassType::Transform
    }

    fn run(&mut self, module: &mut Module, ctx: &mut PassContext) -> Result<(), PassError> {
        let used: HashSet<Ident> = module
            .functions
            .iter()
            .flat_map(|f| f.blocks.iter())
            .flat_map(|b| b.instructions.iter())
            .filter_map(|inst| match &inst.op {
                Op::GlobalAddr { global, .. } => Some(global.clone()),
                _ => None,
            })
            .collect();
        let before = module.globals.len();
        module.globals.retain(|g| !g.private || used.contains(&g.name));
        ctx.bump("removed", before - module.globals.len());
        Ok(())
    }
}
