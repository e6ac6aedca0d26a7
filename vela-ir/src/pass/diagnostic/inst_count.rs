use std::collections::BTreeMap;

use crate::ir::{BasicBlock, Function, Instruction, Module};
use crate::pass::visitor::{default_visit_block, default_visit_function, IrVisitor, Trace};
use crate::pass::{parse_config, BoxedPass, NoConfig, Pass, PassContext, PassError, PassType};

/// Records how many functions, blocks and instructions the module has, plus a counter per
/// instruction mnemonic.
#[derive(Default)]
pub struct InstCount {
    functions: usize,
    blocks: usize,
    instructions: usize,
    by_mnemonic: BTreeMap<&'static str, usize>,
}

pub fn get_pass(config: &toml::Table) -> Result<BoxedPass, toml::de::Error> {
    parse_config::<NoConfig>(config)?;
    Ok(Box::<InstCount>::default())
}

impl IrVisitor for InstCount {
    type Context<'a> = Trace<'a>;

    fn visit_function<'a>(&mut self, function: &'a Function, context: &mut Trace<'a>) {
        self.functions += 1;
        default_visit_function(self, function, context);
    }

    fn visit_block<'a>(&mut self, block: &'a BasicBlock, context: &mut Trace<'a>) {
        self.blocks += 1;
        default_visit_block(self, block, context);
    }

    fn visit_instruction<'a>(&mut self, instruction: &'a Instruction, _: &mut Trace<'a>) {
        self.instructions += 1;
        *self.by_mnemonic.entry(instruction.op.mnemonic()).or_insert(0) += 1;
    }
}

impl Pass for InstCount {
    fn identifier(&self) -> &'static str {
        "inst-count"
    }

    fn pass_type(&self) -> PassType {
        PassType::Diagnostic
    }

    fn run(&mut self, module: &mut Module, ctx: &mut PassContext) -> Result<(), PassError> {
        *self = Self::default();
        self.visit_module(module, &mut Trace::default());
        log::debug!(
            "{} instructions in {} functions",
            self.instructions,
            self.functions
        );
        ctx.bump("functions", self.functions);
        ctx.bump("blocks", self.blocks);
        ctx.bump("instructions", self.instructions);
        for (mnemonic, count) in &self.by_mnemonic {
            ctx.bump(mnemonic, *count);
        }
        Ok(())
    }
}
