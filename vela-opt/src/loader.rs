use std::io::Read;
use std::path::Path;

use vela_core::Ident;
use vela_ir::diagnostic::DiagnosticEngine;
use vela_ir::ir::Module;
use vela_ir::parser::parse_module;
use vela_ir::serialized::{is_serialized_module, ModuleDeserializer};
use vela_ir::verifier::verify_module;

use crate::error::DriverError;

const DEFAULT_MODULE_NAME: &str = "main";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModuleForm {
    Source,
    Serialized,
}

pub fn classify(bytes: &[u8]) -> ModuleForm {
    if is_serialized_module(bytes) {
        ModuleForm::Serialized
    } else {
        ModuleForm::Source
    }
}

/// Reads the whole input; `None` means stdin.
pub fn read_input(path: Option<&Path>) -> Result<Vec<u8>, DriverError> {
    match path {
        Some(path) => std::fs::read(path).map_err(|source| DriverError::InputRead {
            name: path.display().to_string(),
            source,
        }),
        None => {
            let mut bytes = Vec::new();
            std::io::stdin()
                .read_to_end(&mut bytes)
                .map_err(|source| DriverError::InputRead {
                    name: "<stdin>".to_string(),
                    source,
                })?;
            Ok(bytes)
        }
    }
}

/// The override wins; serialized modules fall back to the input's file stem.
pub fn module_name(form: ModuleForm, name_override: Option<&str>, path: Option<&Path>) -> Ident {
    if let Some(name) = name_override {
        return Ident::from(name);
    }
    let stem = match form {
        ModuleForm::Serialized => path
            .and_then(|path| path.file_stem())
            .and_then(|stem| stem.to_str()),
        ModuleForm::Source => None,
    };
    Ident::from(stem.unwrap_or(DEFAULT_MODULE_NAME))
}

pub struct Loaded {
    pub form: ModuleForm,
    /// Absent when loading failed; the reasons were reported as error diagnostics.
    pub module: Option<Module>,
}

fn load_serialized(bytes: &[u8], name: Ident, diagnostics: &mut DiagnosticEngine) -> Option<Module> {
    match ModuleDeserializer::new(bytes) {
        Ok(contents) => {
            let mut module = Module::new(name);
            contents.load_all(&mut module);
            Some(module)
        }
        Err(err) => {
            diagnostics.error(None, format!("cannot load serialized module: {err}"));
            None
        }
    }
}

fn load_source(bytes: &[u8], name: Ident, diagnostics: &mut DiagnosticEngine) -> Option<Module> {
    let Ok(text) = std::str::from_utf8(bytes) else {
        diagnostics.error(None, "input is neither valid UTF-8 nor a serialized module");
        return None;
    };
    match parse_module(text, name) {
        Ok(module) => Some(module),
        Err(failure) => {
            diagnostics.error(Some(failure.location), failure.message);
            None
        }
    }
}

/// Classifies and loads the input, then checks it is well formed. Every problem is reported
/// through `diagnostics`.
pub fn load(
    bytes: &[u8],
    path: Option<&Path>,
    name_override: Option<&str>,
    diagnostics: &mut DiagnosticEngine,
) -> Loaded {
    let form = classify(bytes);
    let name = module_name(form, name_override, path);
    log::debug!("loading {form:?} module '{name}'");
    let module = match form {
        ModuleForm::Serialized => load_serialized(bytes, name, diagnostics),
        ModuleForm::Source => load_source(bytes, name, diagnostics),
    };
    let module = module.filter(|module| {
        let errors = verify_module(module);
        for error in &errors {
            diagnostics.error(error.location, error.message.clone());
        }
        errors.is_empty()
    });
    Loaded { form, module }
}
