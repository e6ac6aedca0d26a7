use std::collections::HashMap;

use serde::Deserialize;
use vela_core::Ident;

use crate::ir::{Module, Op, VTable, WitnessTable};
use crate::pass::{parse_config, BoxedPass, Pass, PassContext, PassError, PassType};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DevirtualizeConfig {
    /// Overrides the devirtualization limit of the pass options.
    threshold: Option<usize>,
}

/// Turns method lookups with a statically known receiver into `function_ref`.
///
/// `class_method` is resolved when its object comes straight from `alloc_ref`; `witness_method`
/// names its conformer and is resolved whenever the witness table is present.
pub struct Devirtualize {
    threshold: Option<usize>,
}

pub fn get_pass(config: &toml::Table) -> Result<BoxedPass, toml::de::Error> {
    let config: DevirtualizeConfig = parse_config(config)?;
    Ok(Box::new(Devirtualize {
        threshold: config.threshold,
    }))
}

fn resolve(
    op: &Op,
    object_class: Option<&Ident>,
    vtables: &[VTable],
    witness_tables: &[WitnessTable],
) -> Option<Ident> {
    match op {
        Op::ClassMethod { method, .. } => {
            let class = object_class?;
            vtables
                .iter()
                .find(|v| &v.class == class)
                .and_then(|v| v.lookup(method))
                .cloned()
        }
        Op::WitnessMethod {
            conformer,
            protocol,
            method,
        } => witness_tables
            .iter()
            .find(|w| &w.conformer == conformer && &w.protocol == protocol)
            .and_then(|w| w.lookup(method))
            .cloned(),
        _ => None,
    }
}

impl Pass for Devirtualize {
    fn identifier(&self) -> &'static str {
        "devirtualize"
    }

    fn pass_type(&self) -> PassType {
        PassType::Transform
    }

    fn run(&mut self, module: &mut Module, ctx: &mut PassContext) -> Result<(), PassError> {
        let limit = match self.threshold.unwrap_or(ctx.options.devirt_threshold) {
            0 => usize::MAX,
            limit => limit,
        };
        let Module {
            functions,
            vtables,
            witness_tables,
            ..
        } = module;
        let mut devirtualized = 0;
        'functions: for function in functions.iter_mut() {
            let classes: HashMap<_, _> = function
                .definitions()
                .into_iter()
                .filter_map(|(value, op)| match op {
                    Op::AllocRef(class) => Some((value, class.clone())),
                    _ => None,
                })
                .collect();
            for inst in function.blocks.iter_mut().flat_map(|b| b.instructions.iter_mut()) {
                if devirtualized >= limit {
                    break 'functions;
                }
                let object_class = match &inst.op {
                    Op::ClassMethod { object, .. } => classes.get(object),
                    _ => None,
                };
                let target = resolve(
                    &inst.op,
                    object_class,
                    vtables.as_slice(),
                    witness_tables.as_slice(),
                );
                if let Some(target) = target {
                    log::trace!("{} resolved to @{target}", inst.op.mnemonic());
                    inst.op = Op::FunctionRef(target);
                    devirtualized += 1;
                }
            }
        }
        ctx.bump("devirtualized", devirtualized);
        Ok(())
    }
}
