use std::path::PathBuf;

use vela_core::Location;
use vela_ir::diagnostic::{
    BufferingConsumer, Diagnostic, DiagnosticBuffer, DiagnosticConsumer, DiagnosticEngine,
    PrintingConsumer, Severity,
};
use vela_ir::ir::Module;
use vela_ir::pass::statistics::Statistics;
use vela_ir::pass::PassOptions;
use vela_ir::pprint::{PrettyPrint, PrintOptions};
use vela_ir::serialized::serialize_module;

use crate::coordinator::{self, Session};
use crate::error::DriverError;
use crate::loader::{self, ModuleForm};
use crate::pipeline::Pipeline;
use crate::verify::{check, parse_expectations};

/// Everything about a run except the pipeline and the input bytes.
#[derive(Clone, Debug, Default)]
pub struct DriverOptions {
    /// Input path, `None` for stdin.
    pub input: Option<PathBuf>,
    pub module_name: Option<String>,
    pub target: Option<String>,
    pub verify: bool,
    pub print_stats: bool,
    pub print: PrintOptions,
    pub emit_serialized: bool,
    pub pass_options: PassOptions,
}

impl DriverOptions {
    fn display_name(&self) -> String {
        self.input
            .as_ref()
            .map_or_else(|| "<stdin>".to_string(), |path| path.display().to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    SemanticError,
    VerificationMismatch,
}

pub struct RunResult {
    pub status: RunStatus,
    /// The rendered module, when one was loaded.
    pub output: Option<Vec<u8>>,
    pub report: Vec<u8>,
    pub statistics: Statistics,
}

fn render(module: &Module, options: &DriverOptions) -> Result<Vec<u8>, DriverError> {
    if options.emit_serialized {
        Ok(serialize_module(module)?)
    } else {
        Ok(PrettyPrint::with_options(module, options.print)
            .to_string()
            .into_bytes())
    }
}

/// Loads `input`, runs `pipeline` over it and renders the result. In verify mode the status
/// only reflects whether the diagnostics matched the annotations of the input.
pub fn execute(
    options: &DriverOptions,
    pipeline: &Pipeline,
    input: &[u8],
) -> Result<RunResult, DriverError> {
    let file = options.display_name();
    execute_with(options, pipeline, input, || -> Box<dyn DiagnosticConsumer> {
        Box::new(PrintingConsumer::new(file.clone()))
    })
}

/// Hands every diagnostic held back in verify mode to the printing consumer.
fn replay(diagnostics: &mut DiagnosticEngine, buffer: &DiagnosticBuffer) {
    for diagnostic in buffer.take() {
        diagnostics.emit(diagnostic);
    }
}

/// [`execute`], reporting diagnostics through the consumers `printer` makes.
fn execute_with<P>(
    options: &DriverOptions,
    pipeline: &Pipeline,
    input: &[u8],
    printer: P,
) -> Result<RunResult, DriverError>
where
    P: Fn() -> Box<dyn DiagnosticConsumer>,
{
    let buffer = DiagnosticBuffer::new();
    let engine = if options.verify {
        DiagnosticEngine::new(Box::new(BufferingConsumer::new(buffer.clone())))
    } else {
        DiagnosticEngine::new(printer())
    };
    let mut session = Session::new(engine, Statistics::new(options.print_stats));
    session.target = options.target.clone();

    let loaded = loader::load(
        input,
        options.input.as_deref(),
        options.module_name.as_deref(),
        &mut session.diagnostics,
    );
    let processed = match loaded.module {
        Some(mut module) => {
            coordinator::run(&mut module, pipeline, &options.pass_options, &mut session)
                .and_then(|had_error| Ok((Some(render(&module, options)?), had_error)))
        }
        None => Ok((None, session.diagnostics.had_error())),
    };
    let (output, had_error) = match processed {
        Ok(processed) => processed,
        Err(err) => {
            if options.verify {
                session.diagnostics.set_consumer(printer());
                replay(&mut session.diagnostics, &buffer);
            }
            return Err(err);
        }
    };

    let status = if options.verify {
        session.diagnostics.set_consumer(printer());
        let annotated = match loaded.form {
            ModuleForm::Source => std::str::from_utf8(input).unwrap_or_default(),
            ModuleForm::Serialized => "",
        };
        let failures = match parse_expectations(annotated) {
            Ok(expectations) => check(&expectations, &buffer.take()),
            Err(err) => vec![Diagnostic::new(
                Severity::Error,
                Some(Location::new(err.line, 1)),
                err.message,
            )],
        };
        let failed = !failures.is_empty();
        for failure in failures {
            session.diagnostics.emit(failure);
        }
        if failed {
            RunStatus::VerificationMismatch
        } else {
            RunStatus::Success
        }
    } else if had_error {
        RunStatus::SemanticError
    } else {
        RunStatus::Success
    };
    log::debug!("run finished with {status:?}");
    Ok(RunResult {
        status,
        output,
        report: session.report,
        statistics: session.statistics,
    })
}

#[cfg(test)]
mod test {
    use vela_ir::parser::parse_module;

    use super::*;
    use crate::pipeline::{resolve, OptGroup, PassRequest};

    fn explicit(names: &[&str]) -> Pipeline {
        resolve(None, names.iter().map(|name| PassRequest::new(*name)).collect()).unwrap()
    }

    const ANNOTATED: &str = r#"
fn @f() -> i8 {
bb0:
  %0 = integer_literal 300 : i8 // expected-error {{overflows when stored into 'i8'}}
  return %0
}
"#;

    #[test]
    fn test_verify_mode_success() {
        let options = DriverOptions {
            verify: true,
            ..DriverOptions::default()
        };
        let pipeline = explicit(&["diagnostic-constant-propagation"]);
        let result = execute(&options, &pipeline, ANNOTATED.as_bytes()).unwrap();
        assert_eq!(result.status, RunStatus::Success);
        assert!(result.output.is_some());
    }

    #[test]
    fn test_verify_mode_mismatches() {
        let options = DriverOptions {
            verify: true,
            ..DriverOptions::default()
        };
        // nothing runs, so the expected error is never produced
        let result = execute(&options, &explicit(&[]), ANNOTATED.as_bytes()).unwrap();
        assert_eq!(result.status, RunStatus::VerificationMismatch);

        let plain = ANNOTATED.replace("// expected-error {{overflows when stored into 'i8'}}", "");
        let pipeline = explicit(&["diagnostic-constant-propagation"]);
        let result = execute(&options, &pipeline, plain.as_bytes()).unwrap();
        assert_eq!(result.status, RunStatus::VerificationMismatch);
    }

    #[test]
    fn test_semantic_error_without_verify() {
        let pipeline = explicit(&["diagnostic-constant-propagation"]);
        let result = execute(&DriverOptions::default(), &pipeline, ANNOTATED.as_bytes()).unwrap();
        assert_eq!(result.status, RunStatus::SemanticError);
        assert!(result.output.is_some());

        let result = execute(&DriverOptions::default(), &pipeline, b"fn @f(").unwrap();
        assert_eq!(result.status, RunStatus::SemanticError);
        assert!(result.output.is_none());
    }

    #[test]
    fn test_load_failure_still_verifies() {
        let options = DriverOptions {
            verify: true,
            ..DriverOptions::default()
        };
        let text = "fn @f() -> () {\nbb0:\n  br bb9 // expected-error {{undefined block 'bb9'}}\n}\n";
        let result = execute(&options, &explicit(&["dce"]), text.as_bytes()).unwrap();
        assert_eq!(result.status, RunStatus::Success);
        assert!(result.output.is_none());
    }

    #[test]
    fn test_failed_run_still_prints_held_back_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        let mut options = DriverOptions {
            verify: true,
            ..DriverOptions::default()
        };
        options.pass_options.import_paths = vec![dir.path().join("absent")];
        let pipeline = explicit(&["diagnostic-constant-propagation", "linker"]);
        let printed = DiagnosticBuffer::new();
        let result = execute_with(&options, &pipeline, ANNOTATED.as_bytes(), || -> Box<dyn DiagnosticConsumer> {
            Box::new(BufferingConsumer::new(printed.clone()))
        });
        assert!(matches!(result, Err(DriverError::Pass(_))));
        let printed = printed.take();
        assert_eq!(printed.len(), 1);
        assert!(printed[0].message.contains("overflows when stored into 'i8'"));
    }

    #[test]
    fn test_output_round_trips() {
        let text = "fn @g() -> ()\nglobal @b : i8\nfn @a() -> () {\nbb0:\n  return\n}\n";
        let options = DriverOptions {
            print: PrintOptions {
                verbose: false,
                sorted: true,
            },
            ..DriverOptions::default()
        };
        let result = execute(&options, &explicit(&[]), text.as_bytes()).unwrap();
        let printed = String::from_utf8(result.output.unwrap()).unwrap();
        let reparsed = parse_module(&printed, "main").unwrap();
        let names: Vec<String> = reparsed.functions.iter().map(|f| f.name.to_string()).collect();
        assert_eq!(names, vec!["a", "g"]);
        let again = execute(&options, &explicit(&[]), printed.as_bytes()).unwrap();
        assert_eq!(again.output.unwrap(), printed.into_bytes());
    }

    #[test]
    fn test_serialized_output_is_a_valid_input() {
        let text = "fn @a() -> () {\nbb0:\n  return\n}\n";
        let options = DriverOptions {
            emit_serialized: true,
            module_name: Some("lib".to_string()),
            ..DriverOptions::default()
        };
        let result = execute(&options, &explicit(&[]), text.as_bytes()).unwrap();
        let bytes = result.output.unwrap();
        let result = execute(
            &DriverOptions::default(),
            &resolve(Some(OptGroup::Performance), Vec::new()).unwrap(),
            &bytes,
        )
        .unwrap();
        assert_eq!(result.status, RunStatus::Success);
        let printed = String::from_utf8(result.output.unwrap()).unwrap();
        assert!(printed.starts_with("// module main"));
    }
}
