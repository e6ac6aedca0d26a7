use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt::{Display, Formatter};

use vela_core::Ident;

use crate::ir::{Function, Op, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AliasResult {
    NoAlias,
    MayAlias,
    MustAlias,
}

impl Display for AliasResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AliasResult::NoAlias => write!(f, "NoAlias"),
            AliasResult::MayAlias => write!(f, "MayAlias"),
            AliasResult::MustAlias => write!(f, "MustAlias"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Base {
    Stack(Value),
    Global(Ident),
    Unknown,
}

/// Base-object alias analysis for the addresses of one function.
///
/// An address is rooted at a stack slot, a global, or something unknown (a parameter or a
/// loaded pointer). A stack slot escapes when its address is used for anything but a direct
/// load, store, deallocation or debug value; only escaped slots may alias unknown addresses.
#[derive(Clone, Debug, Default)]
pub struct AliasAnalysis {
    bases: HashMap<Value, Base>,
    escaped: HashSet<Value>,
    addresses: BTreeSet<Value>,
}

impl AliasAnalysis {
    pub fn compute(function: &Function) -> Self {
        let mut analysis = Self::default();
        for (value, ty) in &function.params {
            if ty.is_address() {
                analysis.bases.insert(*value, Base::Unknown);
                analysis.addresses.insert(*value);
            }
        }
        for inst in function.blocks.iter().flat_map(|b| b.instructions.iter()) {
            let Some(result) = inst.result else {
                continue;
            };
            let base = match &inst.op {
                Op::AllocStack(_) => Base::Stack(result),
                Op::GlobalAddr { global, .. } => Base::Global(global.clone()),
                Op::Load { ty, .. } | Op::Apply { ty, .. } if ty.is_address() => Base::Unknown,
                _ => continue,
            };
            analysis.bases.insert(result, base);
            analysis.addresses.insert(result);
        }
        for block in &function.blocks {
            for inst in &block.instructions {
                let escaping: Vec<Value> = match &inst.op {
                    Op::Load { .. } | Op::DeallocStack(_) | Op::DebugValue { .. } => vec![],
                    Op::Store { value, .. } => vec![*value],
                    op => op.operands().collect(),
                };
                analysis.mark_escaped(escaping);
            }
            analysis.mark_escaped(block.terminator.operands());
        }
        analysis
    }

    fn mark_escaped(&mut self, values: impl IntoIterator<Item = Value>) {
        for value in values {
            if let Some(Base::Stack(slot)) = self.bases.get(&value) {
                self.escaped.insert(*slot);
            }
        }
    }

    fn base(&self, value: Value) -> Base {
        self.bases.get(&value).cloned().unwrap_or(Base::Unknown)
    }

    pub fn alias(&self, a: Value, b: Value) -> AliasResult {
        if a == b {
            return AliasResult::MustAlias;
        }
        match (self.base(a), self.base(b)) {
            (Base::Stack(x), Base::Stack(y)) if x == y => AliasResult::MustAlias,
            (Base::Global(x), Base::Global(y)) if x == y => AliasResult::MustAlias,
            (Base::Stack(_), Base::Stack(_))
            | (Base::Global(_), Base::Global(_))
            | (Base::Stack(_), Base::Global(_))
            | (Base::Global(_), Base::Stack(_)) => AliasResult::NoAlias,
            (Base::Stack(slot), Base::Unknown) | (Base::Unknown, Base::Stack(slot)) => {
                if self.escaped.contains(&slot) {
                    AliasResult::MayAlias
                } else {
                    AliasResult::NoAlias
                }
            }
            _ => AliasResult::MayAlias,
        }
    }

    /// Whether code outside the function, such as a callee, can write through `address`.
    pub fn is_visible_to_calls(&self, address: Value) -> bool {
        match self.base(address) {
            Base::Stack(slot) => self.escaped.contains(&slot),
            Base::Global(_) | Base::Unknown => true,
        }
    }

    pub fn has_escaped(&self, slot: Value) -> bool {
        self.escaped.contains(&slot)
    }

    /// Every address-typed value of the function, in value order.
    pub fn addresses(&self) -> impl Iterator<Item = Value> + '_ {
        self.addresses.iter().copied()
    }

    pub fn is_address(&self, value: Value) -> bool {
        self.addresses.contains(&value)
    }
}
