use vela_ir::diagnostic::DiagnosticEngine;
use vela_ir::ir::Module;
use vela_ir::pass::analysis::AnalysisKind;
use vela_ir::pass::manager::PassManager;
use vela_ir::pass::statistics::Statistics;
use vela_ir::pass::PassOptions;

use crate::error::DriverError;
use crate::pipeline::Pipeline;

/// Process-wide state of one run.
pub struct Session {
    pub diagnostics: DiagnosticEngine,
    pub statistics: Statistics,
    /// Output of passes that print, such as `aa-dump` or `print_all`.
    pub report: Vec<u8>,
    pub target: Option<String>,
}

impl Session {
    pub fn new(diagnostics: DiagnosticEngine, statistics: Statistics) -> Self {
        Self {
            diagnostics,
            statistics,
            report: Vec::new(),
            target: None,
        }
    }
}

/// Runs `pipeline` over `module`. Returns whether any error diagnostic has been emitted.
pub fn run(
    module: &mut Module,
    pipeline: &Pipeline,
    options: &PassOptions,
    session: &mut Session,
) -> Result<bool, DriverError> {
    if let Some(target) = &session.target {
        log::info!("running {} passes for target '{target}'", pipeline.len());
    }
    let mut manager = PassManager::new(module, options);
    for analysis in AnalysisKind::ALL {
        manager.register_analysis(analysis);
    }
    for entry in pipeline.entries() {
        manager.add(entry.instantiate()?);
    }
    manager.run(
        &mut session.diagnostics,
        &mut session.statistics,
        &mut session.report,
    )?;
    Ok(session.diagnostics.had_error())
}
