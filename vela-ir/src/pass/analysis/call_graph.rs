use std::collections::{BTreeMap, BTreeSet};

use vela_core::Ident;

use crate::ir::{Module, Op};

/// Function-reference graph: an edge `f -> g` means the body of `f` takes `function_ref @g`.
#[derive(Clone, Debug, Default)]
pub struct CallGraph {
    edges: BTreeMap<Ident, BTreeSet<Ident>>,
}

impl CallGraph {
    pub fn build(module: &Module) -> Self {
        let mut edges = BTreeMap::new();
        for function in &module.functions {
            let callees = function
                .blocks
                .iter()
                .flat_map(|b| b.instructions.iter())
                .filter_map(|inst| match &inst.op {
                    Op::FunctionRef(name) => Some(name.clone()),
                    _ => None,
                })
                .collect();
            edges.insert(function.name.clone(), callees);
        }
        Self { edges }
    }

    pub fn callees(&self, function: &Ident) -> impl Iterator<Item = &Ident> {
        self.edges.get(function).into_iter().flatten()
    }

    /// Everything reachable from `roots`, roots included.
    pub fn reachable_from<'a>(&self, roots: impl IntoIterator<Item = &'a Ident>) -> BTreeSet<Ident> {
        let mut seen = BTreeSet::new();
        let mut worklist: Vec<Ident> = roots.into_iter().cloned().collect();
        while let Some(name) = worklist.pop() {
            if seen.insert(name.clone()) {
                worklist.extend(self.callees(&name).cloned());
            }
        }
        seen
    }

    /// Whether `function` can reach itself through edges between functions accepted by `within`.
    pub fn is_recursive_within(&self, function: &Ident, within: impl Fn(&Ident) -> bool) -> bool {
        let mut seen = BTreeSet::new();
        let mut worklist: Vec<&Ident> = self.callees(function).filter(|c| within(*c)).collect();
        while let Some(name) = worklist.pop() {
            if name == function {
                return true;
            }
            if seen.insert(name) {
                worklist.extend(self.callees(name).filter(|c| within(*c)));
            }
        }
        false
    }

    pub fn is_recursive(&self, function: &Ident) -> bool {
        self.is_recursive_within(function, |_| true)
    }
}
