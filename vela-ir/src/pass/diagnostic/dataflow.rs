use std::collections::HashSet;

use vela_core::Ident;

use crate::ir::{direct_callee, Function, Module, Op, TerminatorKind};
use crate::pass::visitor::{IrVisitor, TracingContext, VisitorContext};
use crate::pass::{parse_config, BoxedPass, NoConfig, Pass, PassContext, PassError, PassType};

use super::DiagnosticAgent;

/// Reports reachable `unreachable` terminators in functions that must return a value, unless
/// the block ends by calling a `noreturn` function or with a `cond_fail`.
pub struct DataflowDiagnostics {
    noreturn: HashSet<Ident>,
}

pub fn get_pass(config: &toml::Table) -> Result<BoxedPass, toml::de::Error> {
    parse_config::<NoConfig>(config)?;
    Ok(Box::new(DataflowDiagnostics {
        noreturn: HashSet::new(),
    }))
}

impl DataflowDiagnostics {
    fn ends_in_trap(&self, function: &Function, block: usize) -> bool {
        let refs = function.function_refs();
        let last = function.blocks[block]
            .instructions
            .iter()
            .rev()
            .find(|inst| !matches!(inst.op, Op::DebugValue { .. }));
        match last.map(|inst| &inst.op) {
            Some(Op::CondFail { .. }) => true,
            Some(op) => direct_callee(&refs, op).is_some_and(|callee| self.noreturn.contains(callee)),
            None => false,
        }
    }
}

impl IrVisitor for DataflowDiagnostics {
    type Context<'a> = DiagnosticAgent<'a>;

    fn visit_function<'a>(&mut self, function: &'a Function, agent: &mut DiagnosticAgent<'a>) {
        if function.return_type.is_unit() || function.attributes.noreturn {
            return;
        }
        let reachable = function.reachable();
        for (index, block) in function.blocks.iter().enumerate() {
            if !reachable[index] || block.terminator.kind != TerminatorKind::Unreachable {
                continue;
            }
            if self.ends_in_trap(function, index) {
                continue;
            }
            agent.push_context(VisitorContext::Block(&block.label));
            agent.error(
                block.terminator.loc,
                format!(
                    "missing return in a function expected to return '{}'",
                    function.return_type
                ),
            );
            agent.pop_context();
        }
    }
}

impl Pass for DataflowDiagnostics {
    fn identifier(&self) -> &'static str {
        "dataflow-diagnostics"
    }

    fn pass_type(&self) -> PassType {
        PassType::Diagnostic
    }

    fn run(&mut self, module: &mut Module, ctx: &mut PassContext) -> Result<(), PassError> {
        self.noreturn = module
            .functions
            .iter()
            .filter(|f| f.attributes.noreturn)
            .map(|f| f.name.clone())
            .collect();
        let mut agent = DiagnosticAgent::new();
        self.visit_module(module, &mut agent);
        agent.flush(ctx);
        Ok(())
    }
}
