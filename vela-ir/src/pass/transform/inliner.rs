use std::collections::{HashMap, HashSet};

use serde::Deserialize;
use vela_core::Ident;

use crate::ir::{
    direct_callee, BasicBlock, Function, Instruction, Module, Op, Terminator, TerminatorKind,
    Value,
};
use crate::pass::{parse_config, BoxedPass, NoConfig, Pass, PassContext, PassError, PassType};

/// Calls inlined into one caller before the inliner moves on.
const MAX_INLINES_PER_FUNCTION: usize = 100;

struct LabelAllocator {
    used: HashSet<Ident>,
    next: usize,
}

impl LabelAllocator {
    fn new(function: &Function) -> Self {
        Self {
            used: function.blocks.iter().map(|b| b.label.clone()).collect(),
            next: 0,
        }
    }

    fn fresh(&mut self) -> Ident {
        loop {
            let label = Ident::from(format!("bb{}", self.next));
            self.next += 1;
            if self.used.insert(label.clone()) {
                return label;
            }
        }
    }
}

/// Replaces the call at `caller.blocks[block].instructions[index]` with the body of `callee`.
///
/// A callee with a single returning block is spliced in place. Otherwise the caller block is
/// split after the call, the callee blocks are placed in between, and a returned value travels
/// to the continuation block through a fresh stack slot. Inlined code takes the location of the
/// call site.
fn inline_call(caller: &mut Function, block: usize, index: usize, callee: &Function) {
    let Op::Apply { args, ty, .. } = &caller.blocks[block].instructions[index].op else {
        return;
    };
    let (args, ty) = (args.clone(), ty.clone());
    let call = caller.blocks[block].instructions.remove(index);
    let loc = call.loc;

    let mut next = caller.next_value().0.max(call.result.map_or(0, |r| r.0 + 1));
    let mut values: HashMap<Value, Value> = callee
        .params
        .iter()
        .map(|(param, _)| *param)
        .zip(args.iter().copied())
        .collect();
    for inst in callee.blocks.iter().flat_map(|b| b.instructions.iter()) {
        if let Some(result) = inst.result {
            values.insert(result, Value(next));
            next += 1;
        }
    }
    let map_value = |value: Value| values.get(&value).copied().unwrap_or(value);
    let remap = |inst: &Instruction| {
        let mut inst = inst.clone();
        inst.result = inst.result.map(map_value);
        for operand in inst.op.operands_mut() {
            *operand = map_value(*operand);
        }
        inst.loc = loc;
        inst
    };

    if let [body] = callee.blocks.as_slice() {
        if let TerminatorKind::Return(returned) = &body.terminator.kind {
            let spliced: Vec<Instruction> = body.instructions.iter().map(&remap).collect();
            caller.blocks[block]
                .instructions
                .splice(index..index, spliced);
            if let (Some(result), Some(returned)) = (call.result, returned) {
                caller.replace_uses(result, map_value(*returned));
            }
            return;
        }
    }

    let mut labels = LabelAllocator::new(caller);
    let label_map: HashMap<&Ident, Ident> = callee
        .blocks
        .iter()
        .map(|b| (&b.label, labels.fresh()))
        .collect();
    let relabel = |label: &Ident| label_map.get(label).cloned().unwrap_or_else(|| label.clone());
    let continuation = labels.fresh();
    let slot = match call.result {
        Some(_) if !callee.return_type.is_unit() => Some(Value(next)),
        _ => None,
    };

    let split = &mut caller.blocks[block];
    let tail = split.instructions.split_off(index);
    if let Some(slot) = slot {
        split
            .instructions
            .push(Instruction::new(Some(slot), Op::AllocStack(ty.clone())).with_loc(loc));
    }
    let entry = relabel(&callee.blocks[0].label);
    let original = std::mem::replace(
        &mut split.terminator,
        Terminator {
            kind: TerminatorKind::Branch(entry),
            loc,
        },
    );

    let mut rest = BasicBlock::new(continuation.clone(), original);
    if let (Some(slot), Some(result)) = (slot, call.result) {
        rest.instructions.push(
            Instruction::new(Some(result), Op::Load { address: slot, ty }).with_loc(loc),
        );
        rest.instructions
            .push(Instruction::new(None, Op::DeallocStack(slot)).with_loc(loc));
    }
    rest.instructions.extend(tail);

    let mut inlined = Vec::with_capacity(callee.blocks.len() + 1);
    for body in &callee.blocks {
        let mut instructions: Vec<Instruction> = body.instructions.iter().map(&remap).collect();
        let kind = match &body.terminator.kind {
            TerminatorKind::Return(returned) => {
                if let (Some(slot), Some(value)) = (slot, returned) {
                    instructions.push(
                        Instruction::new(
                            None,
                            Op::Store {
                                value: map_value(*value),
                                address: slot,
                            },
                        )
                        .with_loc(loc),
                    );
                }
                TerminatorKind::Branch(continuation.clone())
            }
            TerminatorKind::Branch(dest) => TerminatorKind::Branch(relabel(dest)),
            TerminatorKind::CondBranch {
                condition,
                then_dest,
                else_dest,
            } => TerminatorKind::CondBranch {
                condition: map_value(*condition),
                then_dest: relabel(then_dest),
                else_dest: relabel(else_dest),
            },
            TerminatorKind::Unreachable => TerminatorKind::Unreachable,
        };
        inlined.push(BasicBlock {
            label: relabel(&body.label),
            instructions,
            terminator: Terminator { kind, loc },
        });
    }
    inlined.push(rest);
    caller.blocks.splice(block + 1..block + 1, inlined);
}

fn find_call_site<'c>(
    caller: &Function,
    candidates: &'c HashMap<Ident, Function>,
) -> Option<(usize, usize, &'c Function)> {
    let refs = caller.function_refs();
    for (b, block) in caller.blocks.iter().enumerate() {
        for (i, inst) in block.instructions.iter().enumerate() {
            let callee = direct_callee(&refs, &inst.op).and_then(|name| candidates.get(name));
            if let Some(callee) = callee.filter(|c| c.name != caller.name) {
                return Some((b, i, callee));
            }
        }
    }
    None
}

/// Inlines calls to `candidates` into `caller` until none is left, including calls brought in
/// by inlined bodies.
fn inline_into(caller: &mut Function, candidates: &HashMap<Ident, Function>) -> usize {
    let mut inlined = 0;
    while inlined < MAX_INLINES_PER_FUNCTION {
        let Some((block, index, callee)) = find_call_site(caller, candidates) else {
            break;
        };
        log::trace!("inlining @{} into @{}", callee.name, caller.name);
        inline_call(caller, block, index, callee);
        inlined += 1;
    }
    if inlined == MAX_INLINES_PER_FUNCTION {
        log::warn!("stopped inlining into @{} after {inlined} calls", caller.name);
    }
    inlined
}

/// Inlines every call to a `transparent` function.
pub struct MandatoryInlining;

pub fn get_mandatory_pass(config: &toml::Table) -> Result<BoxedPass, toml::de::Error> {
    parse_config::<NoConfig>(config)?;
    Ok(Box::new(MandatoryInlining))
}

impl Pass for MandatoryInlining {
    fn identifier(&self) -> &'static str {
        "mandatory-inlining"
    }

    fn pass_type(&self) -> PassType {
        PassType::Transform
    }

    fn run(&mut self, module: &mut Module, ctx: &mut PassContext) -> Result<(), PassError> {
        let graph = ctx.call_graph(module)?;
        let transparent: HashSet<&Ident> = module
            .functions
            .iter()
            .filter(|f| f.attributes.transparent && !f.is_declaration())
            .map(|f| &f.name)
            .collect();
        let mut candidates = HashMap::new();
        for function in module.functions.iter() {
            if !transparent.contains(&function.name) {
                continue;
            }
            if graph.is_recursive_within(&function.name, |g| transparent.contains(g)) {
                ctx.diagnostics.error(
                    function.loc,
                    "inlining 'transparent' functions forms circular loop",
                );
            } else {
                candidates.insert(function.name.clone(), function.clone());
            }
        }
        if candidates.is_empty() {
            return Ok(());
        }
        let inlined: usize = module
            .functions
            .iter_mut()
            .map(|function| inline_into(function, &candidates))
            .sum();
        ctx.bump("inlined", inlined);
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct InlineConfig {
    /// Overrides the inline threshold of the pass options.
    threshold: Option<usize>,
}

/// Inlines calls to small, non-recursive functions.
pub struct PerformanceInlining {
    threshold: Option<usize>,
}

pub fn get_performance_pass(config: &toml::Table) -> Result<BoxedPass, toml::de::Error> {
    let config: InlineConfig = parse_config(config)?;
    Ok(Box::new(PerformanceInlining {
        threshold: config.threshold,
    }))
}

impl Pass for PerformanceInlining {
    fn identifier(&self) -> &'static str {
        "inline"
    }

    fn pass_type(&self) -> PassType {
        PassType::Transform
    }

    fn run(&mut self, module: &mut Module, ctx: &mut PassContext) -> Result<(), PassError> {
        let threshold = self.threshold.unwrap_or(ctx.options.inline_threshold);
        let graph = ctx.call_graph(module)?;
        let candidates: HashMap<Ident, Function> = module
            .functions
            .iter()
            .filter(|f| {
                !f.is_declaration()
                    && !f.attributes.noreturn
                    && f.instruction_count() <= threshold
                    && !graph.is_recursive(&f.name)
            })
            .map(|f| (f.name.clone(), f.clone()))
            .collect();
        if candidates.is_empty() {
            return Ok(());
        }
        let inlined: usize = module
            .functions
            .iter_mut()
            .map(|function| inline_into(function, &candidates))
            .sum();
        ctx.bump("inlined", inlined);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::pass::testing::{messages, run_pass};
    use crate::pass::PassOptions;

    fn has_apply(function: &Function) -> bool {
        function
            .blocks
            .iter()
            .flat_map(|b| b.instructions.iter())
            .any(|inst| matches!(inst.op, Op::Apply { .. }))
    }

    #[test]
    fn test_transparent_call_is_spliced() {
        let text = r#"
fn @add(%0 : i64, %1 : i64) -> i64 [transparent] {
bb0:
  %2 = add %0, %1 : i64
  return %2
}
fn @main() -> i64 {
bb0:
  %0 = integer_literal 40 : i64
  %1 = integer_literal 2 : i64
  %2 = function_ref @add
  %3 = apply %2(%0, %1) : i64, loc 9:3
  return %3
}
"#;
        let outcome = run_pass(&mut MandatoryInlining, text, &PassOptions::default());
        let main = &outcome.module.functions[1];
        assert!(!has_apply(main));
        let block = &main.blocks[0];
        let add = &block.instructions[3];
        assert_eq!(
            add.op,
            Op::Binary {
                op: crate::ir::BinOp::Add,
                lhs: Value(0),
                rhs: Value(1),
                width: crate::types::IntWidth::I64,
            }
        );
        assert_eq!(add.loc.map(|l| (l.line, l.column)), Some((9, 3)));
        assert_eq!(block.terminator.operands(), add.result);
        assert_eq!(outcome.statistics.get("mandatory-inlining.inlined"), 1);
    }

    #[test]
    fn test_multi_block_callee_splits_the_caller() {
        let text = r#"
fn @pick(%0 : i1) -> i64 [transparent] {
bb0:
  cond_br %0, bb1, bb2
bb1:
  %1 = integer_literal 1 : i64
  return %1
bb2:
  %2 = integer_literal 2 : i64
  return %2
}
fn @main(%0 : i1) -> i64 {
bb0:
  %1 = function_ref @pick
  %2 = apply %1(%0) : i64
  %3 = add %2, %2 : i64
  return %3
}
"#;
        let outcome = run_pass(&mut MandatoryInlining, text, &PassOptions::default());
        let main = &outcome.module.functions[1];
        assert!(!has_apply(main));
        assert_eq!(main.blocks.len(), 5);
        let rest = &main.blocks[4];
        assert_eq!(rest.label, Ident::new("bb4"));
        assert_eq!(rest.instructions[0].result, Some(Value(2)));
        assert!(matches!(rest.instructions[0].op, Op::Load { .. }));
        assert_eq!(rest.terminator.kind, TerminatorKind::Return(Some(Value(3))));
        assert_eq!(
            main.blocks[0].terminator.kind,
            TerminatorKind::Branch(Ident::new("bb1"))
        );
    }

    #[test]
    fn test_transparent_cycle_is_diagnosed() {
        let text = r#"
fn @ping() -> () [transparent] {
bb0:
  %0 = function_ref @pong
  %1 = apply %0() : ()
  return
}
fn @pong() -> () [transparent] {
bb0:
  %0 = function_ref @ping
  %1 = apply %0() : ()
  return
}
"#;
        let outcome = run_pass(&mut MandatoryInlining, text, &PassOptions::default());
        assert_eq!(
            messages(&outcome),
            vec![
                "inlining 'transparent' functions forms circular loop",
                "inlining 'transparent' functions forms circular loop",
            ]
        );
        assert!(outcome.module.functions.iter().all(has_apply));
    }

    const SMALL_CALLEE: &str = r#"
fn @double(%0 : i64) -> i64 {
bb0:
  %1 = integer_literal 2 : i64
  %2 = mul %0, %1 : i64
  return %2
}
fn @main(%0 : i64) -> i64 {
bb0:
  %1 = function_ref @double
  %2 = apply %1(%0) : i64
  return %2
}
"#;

    #[test]
    fn test_performance_inliner_respects_threshold() {
        let mut pass = get_performance_pass(&toml::Table::new()).unwrap();
        let outcome = run_pass(pass.as_mut(), SMALL_CALLEE, &PassOptions::default());
        assert!(!has_apply(&outcome.module.functions[1]));

        let config: toml::Table = toml::from_str("threshold = 1").unwrap();
        let mut pass = get_performance_pass(&config).unwrap();
        let outcome = run_pass(pass.as_mut(), SMALL_CALLEE, &PassOptions::default());
        assert!(has_apply(&outcome.module.functions[1]));

        let options = PassOptions {
            inline_threshold: 0,
            ..PassOptions::default()
        };
        let mut pass = get_performance_pass(&toml::Table::new()).unwrap();
        let outcome = run_pass(pass.as_mut(), SMALL_CALLEE, &options);
        assert!(has_apply(&outcome.module.functions[1]));
    }

    #[test]
    fn test_recursive_functions_are_not_inlined() {
        let text = r#"
fn @loop(%0 : i64) -> i64 {
bb0:
  %1 = function_ref @loop
  %2 = apply %1(%0) : i64
  return %2
}
fn @main(%0 : i64) -> i64 {
bb0:
  %1 = function_ref @loop
  %2 = apply %1(%0) : i64
  return %2
}
"#;
        let mut pass = get_performance_pass(&toml::Table::new()).unwrap();
        let outcome = run_pass(pass.as_mut(), text, &PassOptions::default());
        assert!(has_apply(&outcome.module.functions[1]));
    }
}
