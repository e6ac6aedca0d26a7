use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use vela_core::{Ident, Location};

use crate::types::{IntWidth, Type};

/// A function-local SSA value, written `%N`.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Value(pub usize);

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// `#Class.method`, the key of a vtable or witness table entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MethodRef {
    pub class: Ident,
    pub method: Ident,
}

impl MethodRef {
    pub fn new(class: impl Into<Ident>, method: impl Into<Ident>) -> Self {
        Self {
            class: class.into(),
            method: method.into(),
        }
    }
}

impl Display for MethodRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}.{}", self.class, self.method)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    SDiv,
    SRem,
    And,
    Or,
    Xor,
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FoldError {
    DivisionByZero,
    Overflow,
}

impl BinOp {
    pub const ALL: [BinOp; 14] = [
        BinOp::Add,
        BinOp::Sub,
        BinOp::Mul,
        BinOp::SDiv,
        BinOp::SRem,
        BinOp::And,
        BinOp::Or,
        BinOp::Xor,
        BinOp::Eq,
        BinOp::Ne,
        BinOp::Slt,
        BinOp::Sle,
        BinOp::Sgt,
        BinOp::Sge,
    ];

    pub fn mnemonic(self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::SDiv => "sdiv",
            BinOp::SRem => "srem",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Xor => "xor",
            BinOp::Eq => "eq",
            BinOp::Ne => "ne",
            BinOp::Slt => "slt",
            BinOp::Sle => "sle",
            BinOp::Sgt => "sgt",
            BinOp::Sge => "sge",
        }
    }

    /// Operator spelling used in diagnostics, e.g. `127 + 1`.
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::SDiv => "/",
            BinOp::SRem => "%",
            BinOp::And => "&",
            BinOp::Or => "|",
            BinOp::Xor => "^",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Slt => "<",
            BinOp::Sle => "<=",
            BinOp::Sgt => ">",
            BinOp::Sge => ">=",
        }
    }

    pub fn from_mnemonic(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.mnemonic() == name)
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Slt | BinOp::Sle | BinOp::Sgt | BinOp::Sge
        )
    }

    pub fn is_commutative(self) -> bool {
        matches!(
            self,
            BinOp::Add | BinOp::Mul | BinOp::And | BinOp::Or | BinOp::Xor | BinOp::Eq | BinOp::Ne
        )
    }

    /// Evaluates the operation on operands of the given width. Comparisons produce `0` or `1`.
    pub fn evaluate(self, lhs: i128, rhs: i128, width: IntWidth) -> Result<i128, FoldError> {
        let result = match self {
            BinOp::Add => lhs.checked_add(rhs),
            BinOp::Sub => lhs.checked_sub(rhs),
            BinOp::Mul => lhs.checked_mul(rhs),
            BinOp::SDiv | BinOp::SRem if rhs == 0 => return Err(FoldError::DivisionByZero),
            BinOp::SDiv => lhs.checked_div(rhs),
            BinOp::SRem => lhs.checked_rem(rhs),
            BinOp::And => Some(lhs & rhs),
            BinOp::Or => Some(lhs | rhs),
            BinOp::Xor => Some(lhs ^ rhs),
            BinOp::Eq => return Ok((lhs == rhs) as i128),
            BinOp::Ne => return Ok((lhs != rhs) as i128),
            BinOp::Slt => return Ok((lhs < rhs) as i128),
            BinOp::Sle => return Ok((lhs <= rhs) as i128),
            BinOp::Sgt => return Ok((lhs > rhs) as i128),
            BinOp::Sge => return Ok((lhs >= rhs) as i128),
        };
        match result {
            Some(value) if width.contains(value) => Ok(value),
            _ => Err(FoldError::Overflow),
        }
    }

    pub fn result_width(self, operand: IntWidth) -> IntWidth {
        if self.is_comparison() {
            IntWidth::I1
        } else {
            operand
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Op {
    IntegerLiteral {
        value: i128,
        width: IntWidth,
    },
    Binary {
        op: BinOp,
        lhs: Value,
        rhs: Value,
        width: IntWidth,
    },
    AllocStack(Type),
    DeallocStack(Value),
    Load {
        address: Value,
        ty: Type,
    },
    Store {
        value: Value,
        address: Value,
    },
    GlobalAddr {
        global: Ident,
        ty: Type,
    },
    FunctionRef(Ident),
    Apply {
        callee: Value,
        args: Vec<Value>,
        ty: Type,
    },
    AllocRef(Ident),
    ClassMethod {
        object: Value,
        method: MethodRef,
    },
    WitnessMethod {
        conformer: Ident,
        protocol: Ident,
        method: MethodRef,
    },
    StrongRetain(Value),
    StrongRelease(Value),
    /// Traps at runtime when the condition is non-zero.
    CondFail {
        condition: Value,
        message: String,
    },
    AssertConfig,
    DebugValue {
        value: Value,
        name: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResultRequirement {
    Required,
    Forbidden,
    Optional,
}

macro_rules! box_iter {
    ($($x:expr),*) => {
        Box::new([$($x),*].into_iter())
    };
    (@ $x:expr) => {
        Box::new($x)
    };
}

impl Op {
    pub fn mnemonic(&self) -> &'static str {
        use vela_core::keywords::*;
        match self {
            Op::IntegerLiteral { .. } => INTEGER_LITERAL,
            Op::Binary { op, .. } => op.mnemonic(),
            Op::AllocStack(_) => ALLOC_STACK,
            Op::DeallocStack(_) => DEALLOC_STACK,
            Op::Load { .. } => LOAD,
            Op::Store { .. } => STORE,
            Op::GlobalAddr { .. } => GLOBAL_ADDR,
            Op::FunctionRef(_) => FUNCTION_REF,
            Op::Apply { .. } => APPLY,
            Op::AllocRef(_) => ALLOC_REF,
            Op::ClassMethod { .. } => CLASS_METHOD,
            Op::WitnessMethod { .. } => WITNESS_METHOD,
            Op::StrongRetain(_) => STRONG_RETAIN,
            Op::StrongRelease(_) => STRONG_RELEASE,
            Op::CondFail { .. } => COND_FAIL,
            Op::AssertConfig => ASSERT_CONFIG,
            Op::DebugValue { .. } => DEBUG_VALUE,
        }
    }

    pub fn result_requirement(&self) -> ResultRequirement {
        match self {
            Op::DeallocStack(_)
            | Op::Store { .. }
            | Op::StrongRetain(_)
            | Op::StrongRelease(_)
            | Op::CondFail { .. }
            | Op::DebugValue { .. } => ResultRequirement::Forbidden,
            Op::Apply { .. } => ResultRequirement::Optional,
            _ => ResultRequirement::Required,
        }
    }

    pub fn operands<'a>(&'a self) -> Box<dyn Iterator<Item = Value> + 'a> {
        match self {
            Op::IntegerLiteral { .. }
            | Op::AllocStack(_)
            | Op::GlobalAddr { .. }
            | Op::FunctionRef(_)
            | Op::AllocRef(_)
            | Op::WitnessMethod { .. }
            | Op::AssertConfig => box_iter![],
            Op::Binary { lhs, rhs, .. } => box_iter![*lhs, *rhs],
            Op::DeallocStack(address) => box_iter![*address],
            Op::Load { address, .. } => box_iter![*address],
            Op::Store { value, address } => box_iter![*value, *address],
            Op::Apply { callee, args, .. } => {
                box_iter!(@ std::iter::once(*callee).chain(args.iter().copied()))
            }
            Op::ClassMethod { object, .. } => box_iter![*object],
            Op::StrongRetain(value) | Op::StrongRelease(value) => box_iter![*value],
            Op::CondFail { condition, .. } => box_iter![*condition],
            Op::DebugValue { value, .. } => box_iter![*value],
        }
    }

    pub fn operands_mut(&mut self) -> Vec<&mut Value> {
        match self {
            Op::IntegerLiteral { .. }
            | Op::AllocStack(_)
            | Op::GlobalAddr { .. }
            | Op::FunctionRef(_)
            | Op::AllocRef(_)
            | Op::WitnessMethod { .. }
            | Op::AssertConfig => vec![],
            Op::Binary { lhs, rhs, .. } => vec![lhs, rhs],
            Op::DeallocStack(address) => vec![address],
            Op::Load { address, .. } => vec![address],
            Op::Store { value, address } => vec![value, address],
            Op::Apply { callee, args, .. } => std::iter::once(callee).chain(args).collect(),
            Op::ClassMethod { object, .. } => vec![object],
            Op::StrongRetain(value) | Op::StrongRelease(value) => vec![value],
            Op::CondFail { condition, .. } => vec![condition],
            Op::DebugValue { value, .. } => vec![value],
        }
    }

    /// Side-effect free and independent of memory: two equal pure ops compute the same value.
    pub fn is_pure(&self) -> bool {
        matches!(
            self,
            Op::IntegerLiteral { .. }
                | Op::Binary { .. }
                | Op::GlobalAddr { .. }
                | Op::FunctionRef(_)
                | Op::ClassMethod { .. }
                | Op::WitnessMethod { .. }
                | Op::AssertConfig
        )
    }

    pub fn is_removable_if_unused(&self) -> bool {
        self.is_pure() || matches!(self, Op::Load { .. } | Op::AllocStack(_) | Op::AllocRef(_))
    }

    pub fn may_release(&self) -> bool {
        matches!(self, Op::Apply { .. } | Op::StrongRelease(_))
    }

    pub fn may_write_memory(&self) -> bool {
        matches!(self, Op::Apply { .. } | Op::Store { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instruction {
    pub result: Option<Value>,
    pub op: Op,
    pub loc: Option<Location>,
}

impl Instruction {
    pub fn new(result: Option<Value>, op: Op) -> Self {
        Self {
            result,
            op,
            loc: None,
        }
    }

    pub fn with_loc(mut self, loc: Option<Location>) -> Self {
        self.loc = loc;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TerminatorKind {
    Return(Option<Value>),
    Branch(Ident),
    CondBranch {
        condition: Value,
        then_dest: Ident,
        else_dest: Ident,
    },
    Unreachable,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Terminator {
    pub kind: TerminatorKind,
    pub loc: Option<Location>,
}

impl Terminator {
    pub fn new(kind: TerminatorKind) -> Self {
        Self { kind, loc: None }
    }

    pub fn operands(&self) -> Option<Value> {
        match &self.kind {
            TerminatorKind::Return(value) => *value,
            TerminatorKind::CondBranch { condition, .. } => Some(*condition),
            TerminatorKind::Branch(_) | TerminatorKind::Unreachable => None,
        }
    }

    pub fn operands_mut(&mut self) -> Option<&mut Value> {
        match &mut self.kind {
            TerminatorKind::Return(value) => value.as_mut(),
            TerminatorKind::CondBranch { condition, .. } => Some(condition),
            TerminatorKind::Branch(_) | TerminatorKind::Unreachable => None,
        }
    }

    pub fn successors(&self) -> Vec<&Ident> {
        match &self.kind {
            TerminatorKind::Branch(dest) => vec![dest],
            TerminatorKind::CondBranch {
                then_dest,
                else_dest,
                ..
            } => vec![then_dest, else_dest],
            TerminatorKind::Return(_) | TerminatorKind::Unreachable => vec![],
        }
    }

    pub fn successors_mut(&mut self) -> Vec<&mut Ident> {
        match &mut self.kind {
            TerminatorKind::Branch(dest) => vec![dest],
            TerminatorKind::CondBranch {
                then_dest,
                else_dest,
                ..
            } => vec![then_dest, else_dest],
            TerminatorKind::Return(_) | TerminatorKind::Unreachable => vec![],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BasicBlock {
    pub label: Ident,
    pub instructions: Vec<Instruction>,
    pub terminator: Terminator,
}

impl BasicBlock {
    pub fn new(label: impl Into<Ident>, terminator: Terminator) -> Self {
        Self {
            label: label.into(),
            instructions: Vec::new(),
            terminator,
        }
    }

    /// Every value read by the block, in order, terminator last.
    pub fn uses(&self) -> impl Iterator<Item = Value> + '_ {
        self.instructions
            .iter()
            .flat_map(|inst| inst.op.operands())
            .chain(self.terminator.operands())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionAttributes {
    pub transparent: bool,
    pub private: bool,
    pub noreturn: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Function {
    pub name: Ident,
    pub params: Vec<(Value, Type)>,
    pub return_type: Type,
    pub attributes: FunctionAttributes,
    /// Empty for a declaration.
    pub blocks: Vec<BasicBlock>,
    pub loc: Option<Location>,
}

impl Function {
    pub fn declaration(name: impl Into<Ident>, params: Vec<(Value, Type)>, ret: Type) -> Self {
        Self {
            name: name.into(),
            params,
            return_type: ret,
            attributes: FunctionAttributes::default(),
            blocks: Vec::new(),
            loc: None,
        }
    }

    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn block_index(&self, label: &Ident) -> Option<usize> {
        self.blocks.iter().position(|b| &b.label == label)
    }

    pub fn successor_indices(&self, index: usize) -> Vec<usize> {
        self.blocks[index]
            .terminator
            .successors()
            .into_iter()
            .filter_map(|label| self.block_index(label))
            .collect()
    }

    pub fn predecessors(&self) -> Vec<Vec<usize>> {
        let mut preds = vec![Vec::new(); self.blocks.len()];
        for idx in 0..self.blocks.len() {
            for succ in self.successor_indices(idx) {
                if !preds[succ].contains(&idx) {
                    preds[succ].push(idx);
                }
            }
        }
        preds
    }

    /// Reverse post-order of the blocks reachable from the entry block.
    pub fn reverse_post_order(&self) -> Vec<usize> {
        if self.blocks.is_empty() {
            return Vec::new();
        }
        let mut visited = vec![false; self.blocks.len()];
        let mut post_order = Vec::with_capacity(self.blocks.len());
        let mut stack = vec![(0usize, self.successor_indices(0), 0usize)];
        visited[0] = true;
        while let Some((block, succs, next)) = stack.last_mut() {
            if let Some(&succ) = succs.get(*next) {
                *next += 1;
                if !visited[succ] {
                    visited[succ] = true;
                    let succs = self.successor_indices(succ);
                    stack.push((succ, succs, 0));
                }
            } else {
                post_order.push(*block);
                stack.pop();
            }
        }
        post_order.reverse();
        post_order
    }

    pub fn reachable(&self) -> Vec<bool> {
        let mut reachable = vec![false; self.blocks.len()];
        for idx in self.reverse_post_order() {
            reachable[idx] = true;
        }
        reachable
    }

    pub fn next_value(&self) -> Value {
        let defined = self.params.iter().map(|(v, _)| v.0).chain(
            self.blocks
                .iter()
                .flat_map(|b| b.instructions.iter().filter_map(|i| i.result.map(|v| v.0))),
        );
        Value(defined.max().map_or(0, |max| max + 1))
    }

    pub fn fresh_label(&self, prefix: &str) -> Ident {
        let used: HashSet<&str> = self.blocks.iter().map(|b| b.label.as_ref()).collect();
        (0..)
            .map(|n| format!("{prefix}{n}"))
            .find(|label| !used.contains(label.as_str()))
            .map(Ident::from)
            .unwrap_or_else(|| Ident::new(prefix))
    }

    pub fn use_counts(&self) -> HashMap<Value, usize> {
        let mut counts = HashMap::new();
        for block in &self.blocks {
            for value in block.uses() {
                *counts.entry(value).or_insert(0) += 1;
            }
        }
        counts
    }

    pub fn replace_uses(&mut self, from: Value, to: Value) {
        for block in &mut self.blocks {
            for inst in &mut block.instructions {
                for operand in inst.op.operands_mut() {
                    if *operand == from {
                        *operand = to;
                    }
                }
            }
            if let Some(operand) = block.terminator.operands_mut() {
                if *operand == from {
                    *operand = to;
                }
            }
        }
    }

    pub fn definitions(&self) -> HashMap<Value, &Op> {
        self.blocks
            .iter()
            .flat_map(|b| b.instructions.iter())
            .filter_map(|i| i.result.map(|r| (r, &i.op)))
            .collect()
    }

    /// Values defined by `integer_literal`, with their literal.
    pub fn constants(&self) -> HashMap<Value, i128> {
        self.definitions()
            .into_iter()
            .filter_map(|(value, op)| match op {
                Op::IntegerLiteral { value: c, .. } => Some((value, *c)),
                _ => None,
            })
            .collect()
    }

    /// Values defined by `function_ref`, with the referenced function.
    pub fn function_refs(&self) -> HashMap<Value, Ident> {
        self.definitions()
            .into_iter()
            .filter_map(|(value, op)| match op {
                Op::FunctionRef(name) => Some((value, name.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn instruction_count(&self) -> usize {
        self.blocks.iter().map(|b| b.instructions.len()).sum()
    }

    /// Rewrites `cond_br` on a literal condition, or with identical targets, into `br`.
    pub fn fold_constant_branches(&mut self) -> usize {
        let constants = self.constants();
        let mut folded = 0;
        for block in &mut self.blocks {
            if let TerminatorKind::CondBranch {
                condition,
                then_dest,
                else_dest,
            } = &block.terminator.kind
            {
                let dest = match constants.get(condition) {
                    Some(0) => else_dest.clone(),
                    Some(_) => then_dest.clone(),
                    None if then_dest == else_dest => then_dest.clone(),
                    None => continue,
                };
                block.terminator.kind = TerminatorKind::Branch(dest);
                folded += 1;
            }
        }
        folded
    }

    /// Drops the blocks not reachable from the entry block.
    pub fn remove_unreachable_blocks(&mut self) -> usize {
        let reachable = self.reachable();
        let before = self.blocks.len();
        let mut flags = reachable.into_iter();
        self.blocks.retain(|_| flags.next().unwrap_or(false));
        before - self.blocks.len()
    }
}

/// Name of the function called by `op`, when `op` applies a `function_ref` listed in `refs`.
pub fn direct_callee<'a>(refs: &'a HashMap<Value, Ident>, op: &Op) -> Option<&'a Ident> {
    match op {
        Op::Apply { callee, .. } => refs.get(callee),
        _ => None,
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GlobalVariable {
    pub name: Ident,
    pub ty: Type,
    pub private: bool,
    pub loc: Option<Location>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableEntry {
    pub method: MethodRef,
    pub implementation: Ident,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VTable {
    pub class: Ident,
    pub entries: Vec<TableEntry>,
    pub loc: Option<Location>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WitnessTable {
    pub conformer: Ident,
    pub protocol: Ident,
    pub entries: Vec<TableEntry>,
    pub loc: Option<Location>,
}

impl VTable {
    pub fn lookup(&self, method: &MethodRef) -> Option<&Ident> {
        lookup_entry(&self.entries, method)
    }
}

impl WitnessTable {
    pub fn lookup(&self, method: &MethodRef) -> Option<&Ident> {
        lookup_entry(&self.entries, method)
    }
}

fn lookup_entry<'a>(entries: &'a [TableEntry], method: &MethodRef) -> Option<&'a Ident> {
    entries
        .iter()
        .find(|entry| &entry.method == method)
        .map(|entry| &entry.implementation)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub name: Ident,
    pub globals: Vec<GlobalVariable>,
    pub functions: Vec<Function>,
    pub vtables: Vec<VTable>,
    pub witness_tables: Vec<WitnessTable>,
    #[serde(with = "sexpr_values")]
    pub metadata: BTreeMap<String, lexpr::Value>,
}

impl Module {
    pub fn new(name: impl Into<Ident>) -> Self {
        Self {
            name: name.into(),
            globals: Vec::new(),
            functions: Vec::new(),
            vtables: Vec::new(),
            witness_tables: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn function(&self, name: &Ident) -> Option<&Function> {
        self.functions.iter().find(|f| &f.name == name)
    }

    pub fn function_mut(&mut self, name: &Ident) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| &f.name == name)
    }

    pub fn global(&self, name: &Ident) -> Option<&GlobalVariable> {
        self.globals.iter().find(|g| &g.name == name)
    }

    pub fn vtable(&self, class: &Ident) -> Option<&VTable> {
        self.vtables.iter().find(|v| &v.class == class)
    }

    pub fn witness_table(&self, conformer: &Ident, protocol: &Ident) -> Option<&WitnessTable> {
        self.witness_tables
            .iter()
            .find(|w| &w.conformer == conformer && &w.protocol == protocol)
    }
}

/// Metadata values travel through serde as their printed s-expression.
mod sexpr_values {
    use std::collections::BTreeMap;

    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<String, lexpr::Value>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let printed: BTreeMap<&str, String> = map
            .iter()
            .map(|(key, value)| (key.as_str(), value.to_string()))
            .collect();
        printed.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<String, lexpr::Value>, D::Error> {
        BTreeMap::<String, String>::deserialize(deserializer)?
            .into_iter()
            .map(|(key, text)| {
                lexpr::from_str(&text)
                    .map(|value| (key, value))
                    .map_err(D::Error::custom)
            })
            .collect()
    }
}
