use std::fmt::{Display, Formatter};

pub mod alias;
pub mod call_graph;
pub mod dominance;

pub use alias::{AliasAnalysis, AliasResult};
pub use call_graph::CallGraph;
pub use dominance::DominatorTree;

/// Analyses a pass may request. They are recomputed on every request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AnalysisKind {
    CallGraph,
    Alias,
    Dominance,
}

impl AnalysisKind {
    pub const ALL: [AnalysisKind; 3] = [
        AnalysisKind::CallGraph,
        AnalysisKind::Alias,
        AnalysisKind::Dominance,
    ];
}

impl Display for AnalysisKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisKind::CallGraph => write!(f, "call-graph"),
            AnalysisKind::Alias => write!(f, "alias"),
            AnalysisKind::Dominance => write!(f, "dominance"),
        }
    }
}
