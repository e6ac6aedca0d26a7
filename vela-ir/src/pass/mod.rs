use std::collections::HashSet;
use std::io::Write;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::diagnostic::DiagnosticEngine;
use crate::ir::{Function, Module};
use crate::serialized::SerializationError;
use crate::verifier::VerifyError;

use self::analysis::{AliasAnalysis, AnalysisKind, CallGraph, DominatorTree};
use self::statistics::Statistics;

pub mod analysis;
pub mod diagnostic;
pub mod manager;
pub mod statistics;
pub mod transform;
pub mod visitor;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassType {
    // Generate diagnostic information
    Diagnostic,
    // Transform the IR module
    Transform,
}

impl std::fmt::Display for PassType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PassType::Diagnostic => write!(f, "diagnostic"),
            PassType::Transform => write!(f, "transform"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PassError {
    #[error("pass '{pass}' requires the {analysis} analysis, which is not registered")]
    MissingAnalysis {
        pass: &'static str,
        analysis: AnalysisKind,
    },
    #[error("module is malformed after pass '{pass}': {}", fmt_verify_errors(.errors))]
    Verification {
        pass: &'static str,
        errors: Vec<VerifyError>,
    },
    #[error("failed to write pass output")]
    Report(#[from] std::io::Error),
    #[error("failed to read library '{}'", .path.display())]
    LibraryRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to load library '{}'", .path.display())]
    LibraryFormat {
        path: PathBuf,
        source: SerializationError,
    },
}

fn fmt_verify_errors(errors: &[VerifyError]) -> String {
    errors
        .iter()
        .map(|e| match e.location {
            Some(loc) => format!("{loc}: {}", e.message),
            None => e.message.clone(),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// `assert_config` value that leaves `assert_config` instructions untouched.
pub const DISABLE_ASSERT_CONFIG_REPLACEMENT: u32 = u32::MAX;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PassOptions {
    /// Largest callee, in instructions, the performance inliner accepts.
    pub inline_threshold: usize,
    /// Maximum number of call sites devirtualized per run; `0` means no limit.
    pub devirt_threshold: usize,
    pub assert_config: u32,
    pub remove_runtime_asserts: bool,
    pub verify_all: bool,
    pub print_all: bool,
    pub import_paths: Vec<PathBuf>,
}

impl Default for PassOptions {
    fn default() -> Self {
        Self {
            inline_threshold: 50,
            devirt_threshold: 0,
            assert_config: 0,
            remove_runtime_asserts: false,
            verify_all: true,
            print_all: false,
            import_paths: Vec::new(),
        }
    }
}

pub struct PassContext<'a> {
    pub options: &'a PassOptions,
    pub diagnostics: &'a mut DiagnosticEngine,
    pub statistics: &'a mut Statistics,
    pub report: &'a mut dyn Write,
    analyses: &'a HashSet<AnalysisKind>,
    pass: &'static str,
}

impl<'a> PassContext<'a> {
    pub fn new(
        pass: &'static str,
        options: &'a PassOptions,
        analyses: &'a HashSet<AnalysisKind>,
        diagnostics: &'a mut DiagnosticEngine,
        statistics: &'a mut Statistics,
        report: &'a mut dyn Write,
    ) -> Self {
        Self {
            options,
            diagnostics,
            statistics,
            report,
            analyses,
            pass,
        }
    }

    fn require(&self, analysis: AnalysisKind) -> Result<(), PassError> {
        if self.analyses.contains(&analysis) {
            Ok(())
        } else {
            Err(PassError::MissingAnalysis {
                pass: self.pass,
                analysis,
            })
        }
    }

    pub fn dominance(&self, function: &Function) -> Result<DominatorTree, PassError> {
        self.require(AnalysisKind::Dominance)?;
        Ok(DominatorTree::compute(function))
    }

    pub fn alias(&self, function: &Function) -> Result<AliasAnalysis, PassError> {
        self.require(AnalysisKind::Alias)?;
        Ok(AliasAnalysis::compute(function))
    }

    pub fn call_graph(&self, module: &Module) -> Result<CallGraph, PassError> {
        self.require(AnalysisKind::CallGraph)?;
        Ok(CallGraph::build(module))
    }

    /// Adds `by` to the statistic `<pass>.<counter>`.
    pub fn bump(&mut self, counter: &str, by: usize) {
        if by > 0 {
            self.statistics.add(&format!("{}.{counter}", self.pass), by);
        }
    }
}

pub trait Pass {
    fn identifier(&self) -> &'static str;
    fn pass_type(&self) -> PassType;
    fn run(&mut self, module: &mut Module, ctx: &mut PassContext) -> Result<(), PassError>;
}

pub type BoxedPass = Box<dyn Pass>;

/// Signature shared by every pass constructor: the pass's own config table in, a pass out.
pub type PassConstructor = fn(&toml::Table) -> Result<BoxedPass, toml::de::Error>;

pub fn parse_config<T: DeserializeOwned>(config: &toml::Table) -> Result<T, toml::de::Error> {
    toml::Value::Table(config.clone()).try_into()
}

/// Config of passes that take no options; rejects any key.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoConfig {}
