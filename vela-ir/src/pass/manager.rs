use std::collections::HashSet;
use std::io::Write;

use crate::diagnostic::DiagnosticEngine;
use crate::ir::Module;
use crate::pprint::PrettyPrint;
use crate::verifier::verify_module;

use super::analysis::AnalysisKind;
use super::statistics::Statistics;
use super::{BoxedPass, PassContext, PassError, PassOptions};

/// Runs passes over one module, strictly in the order they were added.
pub struct PassManager<'m> {
    module: &'m mut Module,
    options: &'m PassOptions,
    analyses: HashSet<AnalysisKind>,
    passes: Vec<BoxedPass>,
}

impl<'m> PassManager<'m> {
    pub fn new(module: &'m mut Module, options: &'m PassOptions) -> Self {
        Self {
            module,
            options,
            analyses: HashSet::new(),
            passes: Vec::new(),
        }
    }

    pub fn register_analysis(&mut self, analysis: AnalysisKind) {
        self.analyses.insert(analysis);
    }

    pub fn add(&mut self, pass: BoxedPass) {
        self.passes.push(pass);
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    pub fn run(
        &mut self,
        diagnostics: &mut DiagnosticEngine,
        statistics: &mut Statistics,
        report: &mut dyn Write,
    ) -> Result<(), PassError> {
        for pass in self.passes.iter_mut() {
            let identifier = pass.identifier();
            log::debug!(
                "running {} pass '{identifier}' on module '{}'",
                pass.pass_type(),
                self.module.name
            );
            let mut ctx = PassContext::new(
                identifier,
                self.options,
                &self.analyses,
                diagnostics,
                statistics,
                report,
            );
            pass.run(self.module, &mut ctx)?;
            if self.options.print_all {
                writeln!(report, "// after {identifier}")?;
                write!(report, "{}", PrettyPrint::new(&*self.module))?;
            }
            if self.options.verify_all {
                let errors = verify_module(self.module);
                if !errors.is_empty() {
                    return Err(PassError::Verification {
                        pass: identifier,
                        errors,
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::diagnostic::{BufferingConsumer, DiagnosticBuffer};
    use crate::ir::{BasicBlock, Terminator, TerminatorKind};
    use crate::parser::parse_module;
    use crate::pass::{Pass, PassType};

    struct Recorder {
        name: &'static str,
        log: Rc<RefCell<Vec<&'static str>>>,
    }

    impl Pass for Recorder {
        fn identifier(&self) -> &'static str {
            self.name
        }

        fn pass_type(&self) -> PassType {
            PassType::Diagnostic
        }

        fn run(&mut self, _: &mut Module, ctx: &mut PassContext) -> Result<(), PassError> {
            self.log.borrow_mut().push(self.name);
            ctx.bump("runs", 1);
            Ok(())
        }
    }

    /// Appends a block that branches nowhere.
    struct Breaker;

    impl Pass for Breaker {
        fn identifier(&self) -> &'static str {
            "breaker"
        }

        fn pass_type(&self) -> PassType {
            PassType::Transform
        }

        fn run(&mut self, module: &mut Module, _: &mut PassContext) -> Result<(), PassError> {
            let block = BasicBlock::new(
                "bb9",
                Terminator::new(TerminatorKind::Branch("nowhere".into())),
            );
            module.functions[0].blocks.push(block);
            Ok(())
        }
    }

    struct NeedsDominance;

    impl Pass for NeedsDominance {
        fn identifier(&self) -> &'static str {
            "needs-dominance"
        }

        fn pass_type(&self) -> PassType {
            PassType::Transform
        }

        fn run(&mut self, module: &mut Module, ctx: &mut PassContext) -> Result<(), PassError> {
            ctx.dominance(&module.functions[0])?;
            Ok(())
        }
    }

    fn engine() -> DiagnosticEngine {
        DiagnosticEngine::new(Box::new(BufferingConsumer::new(DiagnosticBuffer::new())))
    }

    const TEXT: &str = "fn @f() -> () {\nbb0:\n  return\n}\n";

    #[test]
    fn test_passes_run_in_insertion_order() {
        let mut module = parse_module(TEXT, "m").unwrap();
        let options = PassOptions {
            print_all: true,
            ..PassOptions::default()
        };
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut manager = PassManager::new(&mut module, &options);
        for name in ["first", "second", "first"] {
            manager.add(Box::new(Recorder {
                name,
                log: log.clone(),
            }));
        }
        assert_eq!(manager.len(), 3);
        let mut stats = Statistics::new(true);
        let mut report = Vec::<u8>::new();
        manager.run(&mut engine(), &mut stats, &mut report).unwrap();
        assert_eq!(*log.borrow(), vec!["first", "second", "first"]);
        assert_eq!(stats.get("first.runs"), 2);
        let report = String::from_utf8(report).unwrap();
        assert_eq!(report.matches("// after").count(), 3);
    }

    #[test]
    fn test_verify_all_catches_broken_module() {
        let mut module = parse_module(TEXT, "m").unwrap();
        let options = PassOptions::default();
        let mut manager = PassManager::new(&mut module, &options);
        manager.add(Box::new(Breaker));
        let result = manager.run(&mut engine(), &mut Statistics::default(), &mut Vec::<u8>::new());
        assert!(matches!(result, Err(PassError::Verification { pass: "breaker", .. })));

        let mut module = parse_module(TEXT, "m").unwrap();
        let options = PassOptions {
            verify_all: false,
            ..PassOptions::default()
        };
        let mut manager = PassManager::new(&mut module, &options);
        manager.add(Box::new(Breaker));
        assert!(manager
            .run(&mut engine(), &mut Statistics::default(), &mut Vec::<u8>::new())
            .is_ok());
    }

    #[test]
    fn test_unregistered_analysis_is_an_error() {
        let mut module = parse_module(TEXT, "m").unwrap();
        let options = PassOptions::default();
        let mut manager = PassManager::new(&mut module, &options);
        manager.add(Box::new(NeedsDominance));
        let result = manager.run(&mut engine(), &mut Statistics::default(), &mut Vec::<u8>::new());
        assert!(matches!(
            result,
            Err(PassError::MissingAnalysis {
                analysis: AnalysisKind::Dominance,
                ..
            })
        ));

        let mut module = parse_module(TEXT, "m").unwrap();
        let mut manager = PassManager::new(&mut module, &options);
        manager.register_analysis(AnalysisKind::Dominance);
        manager.add(Box::new(NeedsDominance));
        assert!(manager
            .run(&mut engine(), &mut Statistics::default(), &mut Vec::<u8>::new())
            .is_ok());
    }
}
