use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use vela_core::Ident;

use crate::ir::{Function, Module, Op};
use crate::pass::{parse_config, BoxedPass, NoConfig, Pass, PassContext, PassError, PassType};
use crate::serialized::ModuleDeserializer;

/// File extension of serialized libraries in the import search paths.
pub const LIBRARY_EXTENSION: &str = "vmod";

/// Replaces declarations with definitions found in serialized libraries.
///
/// Declarations of the module resolve only against public library functions. Functions a
/// linked body refers to are declared and linked in turn, private ones included.
pub struct Linker;

pub fn get_pass(config: &toml::Table) -> Result<BoxedPass, toml::de::Error> {
    parse_config::<NoConfig>(config)?;
    Ok(Box::new(Linker))
}

struct Library {
    path: PathBuf,
    contents: ModuleDeserializer,
}

fn read_library(path: &Path) -> Result<Library, PassError> {
    let bytes = std::fs::read(path).map_err(|source| PassError::LibraryRead {
        path: path.to_path_buf(),
        source,
    })?;
    let contents = ModuleDeserializer::new(&bytes).map_err(|source| PassError::LibraryFormat {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Library {
        path: path.to_path_buf(),
        contents,
    })
}

/// Every library of every search path, in path order and then file name order.
fn load_libraries(paths: &[PathBuf]) -> Result<Vec<Library>, PassError> {
    let mut libraries = Vec::new();
    for dir in paths {
        let entries = std::fs::read_dir(dir).map_err(|source| PassError::LibraryRead {
            path: dir.clone(),
            source,
        })?;
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| PassError::LibraryRead {
                path: dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == LIBRARY_EXTENSION) {
                files.push(path);
            }
        }
        files.sort();
        for file in files {
            libraries.push(read_library(&file)?);
        }
    }
    Ok(libraries)
}

fn strip_locations(function: &mut Function) {
    function.loc = None;
    for block in function.blocks.iter_mut() {
        for inst in block.instructions.iter_mut() {
            inst.loc = None;
        }
        block.terminator.loc = None;
    }
}

/// Brings the functions and globals `definition` refers to into `module`, as declarations.
/// Returns the functions that were newly declared.
fn declare_dependencies(module: &mut Module, definition: &Function, library: &Module) -> Vec<Ident> {
    let mut declared = Vec::new();
    for inst in definition.blocks.iter().flat_map(|b| b.instructions.iter()) {
        match &inst.op {
            Op::FunctionRef(callee) if module.function(callee).is_none() => {
                let Some(source) = library.function(callee) else {
                    continue;
                };
                let mut declaration = Function::declaration(
                    callee.clone(),
                    source.params.clone(),
                    source.return_type.clone(),
                );
                declaration.attributes = source.attributes.clone();
                module.functions.push(declaration);
                declared.push(callee.clone());
            }
            Op::GlobalAddr { global, .. } if module.global(global).is_none() => {
                if let Some(source) = library.global(global) {
                    let mut copy = source.clone();
                    copy.loc = None;
                    module.globals.push(copy);
                }
            }
            _ => {}
        }
    }
    declared
}

impl Pass for Linker {
    fn identifier(&self) -> &'static str {
        "linker"
    }

    fn pass_type(&self) -> PassType {
        PassType::Transform
    }

    fn run(&mut self, module: &mut Module, ctx: &mut PassContext) -> Result<(), PassError> {
        if ctx.options.import_paths.is_empty() {
            return Ok(());
        }
        let libraries = load_libraries(&ctx.options.import_paths)?;
        log::debug!("linking against {} libraries", libraries.len());
        // (name, pulled in by a linked body)
        let mut worklist: VecDeque<(Ident, bool)> = module
            .functions
            .iter()
            .filter(|f| f.is_declaration())
            .map(|f| (f.name.clone(), false))
            .collect();
        let mut linked = 0;
        while let Some((name, pulled)) = worklist.pop_front() {
            let Some(index) = module
                .functions
                .iter()
                .position(|f| f.name == name && f.is_declaration())
            else {
                continue;
            };
            let found = libraries.iter().find_map(|library| {
                library
                    .contents
                    .function(&name)
                    .filter(|f| pulled || !f.attributes.private)
                    .map(|f| (library, f))
            });
            let Some((library, definition)) = found else {
                continue;
            };
            log::trace!("@{name} linked from {}", library.path.display());
            let mut definition = definition.clone();
            strip_locations(&mut definition);
            for callee in declare_dependencies(module, &definition, library.contents.module()) {
                worklist.push_back((callee, true));
            }
            module.functions[index] = definition;
            linked += 1;
        }
        ctx.bump("linked", linked);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parser::parse_module;
    use crate::pass::testing::run_pass;
    use crate::pass::PassOptions;
    use crate::serialized::serialize_module;

    const LIBRARY: &str = r#"
global @counter : i64 [private]
fn @helper(%0 : i64) -> i64 {
bb0:
  %1 = function_ref @secret
  %2 = apply %1(%0) : i64
  %3 = global_addr @counter : *i64
  store %2 to %3
  return %2
}
fn @secret(%0 : i64) -> i64 [private] {
bb0:
  return %0
}
fn @hidden() -> () [private] {
bb0:
  return
}
"#;

    const MAIN: &str = r#"
fn @helper(%0 : i64) -> i64
fn @hidden() -> ()
fn @main() -> i64 {
bb0:
  %0 = integer_literal 1 : i64
  %1 = function_ref @helper
  %2 = apply %1(%0) : i64
  %3 = function_ref @hidden
  %4 = apply %3() : ()
  return %2
}
"#;

    fn library_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let library = parse_module(LIBRARY, "lib").unwrap();
        std::fs::write(
            dir.path().join("lib.vmod"),
            serialize_module(&library).unwrap(),
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a library").unwrap();
        dir
    }

    #[test]
    fn test_links_public_definitions_and_their_dependencies() {
        let dir = library_dir();
        let options = PassOptions {
            import_paths: vec![dir.path().to_path_buf()],
            ..PassOptions::default()
        };
        let outcome = run_pass(&mut Linker, MAIN, &options);
        let module = &outcome.module;
        let helper = module.function(&Ident::new("helper")).unwrap();
        assert!(!helper.is_declaration());
        assert!(helper.loc.is_none());
        let secret = module.function(&Ident::new("secret")).unwrap();
        assert!(!secret.is_declaration());
        assert!(secret.attributes.private);
        assert!(module
            .function(&Ident::new("hidden"))
            .unwrap()
            .is_declaration());
        assert!(module.global(&Ident::new("counter")).is_some());
        assert_eq!(outcome.statistics.get("linker.linked"), 2);
    }

    #[test]
    fn test_without_import_paths_is_identity() {
        let outcome = run_pass(&mut Linker, MAIN, &PassOptions::default());
        assert_eq!(outcome.module, parse_module(MAIN, "test").unwrap());
    }

    #[test]
    fn test_malformed_library_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.vmod"), b"garbage").unwrap();
        assert!(matches!(
            load_libraries(&[dir.path().to_path_buf()]),
            Err(PassError::LibraryFormat { .. })
        ));
        let missing = dir.path().join("missing");
        assert!(matches!(
            load_libraries(&[missing]),
            Err(PassError::LibraryRead { .. })
        ));
    }
}
