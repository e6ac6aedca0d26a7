use vela_core::Ident;

use crate::ir::{Function, Module};

/// Leading bytes of every serialized module, followed by a little-endian `u16` format version.
pub const SIGNATURE: [u8; 4] = *b"\x89VIR";
pub const FORMAT_VERSION: u16 = 1;
const HEADER_LEN: usize = SIGNATURE.len() + 2;

#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("missing serialized module signature")]
    MissingSignature,
    #[error("unsupported serialized module version {found} (expected {FORMAT_VERSION})")]
    UnsupportedVersion { found: u16 },
    #[error("malformed serialized module: {0}")]
    Malformed(#[from] bincode::Error),
}

pub fn is_serialized_module(bytes: &[u8]) -> bool {
    bytes.starts_with(&SIGNATURE)
}

pub fn serialize_module(module: &Module) -> Result<Vec<u8>, SerializationError> {
    let mut bytes = Vec::with_capacity(HEADER_LEN);
    bytes.extend_from_slice(&SIGNATURE);
    bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    bincode::serialize_into(&mut bytes, module)?;
    Ok(bytes)
}

/// Decoded contents of a serialized module, ready to be merged into another module.
pub struct ModuleDeserializer {
    module: Module,
}

impl ModuleDeserializer {
    pub fn new(bytes: &[u8]) -> Result<Self, SerializationError> {
        if !is_serialized_module(bytes) {
            return Err(SerializationError::MissingSignature);
        }
        let version = match bytes.get(SIGNATURE.len()..HEADER_LEN) {
            Some([lo, hi]) => u16::from_le_bytes([*lo, *hi]),
            _ => return Err(SerializationError::UnsupportedVersion { found: 0 }),
        };
        if version != FORMAT_VERSION {
            return Err(SerializationError::UnsupportedVersion { found: version });
        }
        let module = bincode::deserialize(&bytes[HEADER_LEN..])?;
        Ok(Self { module })
    }

    pub fn module_name(&self) -> &Ident {
        &self.module.name
    }

    pub fn function(&self, name: &Ident) -> Option<&Function> {
        self.module.function(name).filter(|f| !f.is_declaration())
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    /// Merges every entity into `into`. A definition replaces a declaration of the same name;
    /// entities `into` already defines are kept.
    pub fn load_all(self, into: &mut Module) {
        let Module {
            globals,
            functions,
            vtables,
            witness_tables,
            metadata,
            ..
        } = self.module;
        for global in globals {
            if into.global(&global.name).is_none() {
                into.globals.push(global);
            }
        }
        for function in functions {
            match into.function_mut(&function.name) {
                Some(existing) if existing.is_declaration() && !function.is_declaration() => {
                    *existing = function;
                }
                Some(_) => {}
                None => into.functions.push(function),
            }
        }
        for vtable in vtables {
            if into.vtable(&vtable.class).is_none() {
                into.vtables.push(vtable);
            }
        }
        for table in witness_tables {
            if into.witness_table(&table.conformer, &table.protocol).is_none() {
                into.witness_tables.push(table);
            }
        }
        for (key, value) in metadata {
            into.metadata.entry(key).or_insert(value);
        }
        log::debug!(
            "loaded {} functions into module '{}'",
            into.functions.len(),
            into.name
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_module;

    const TEXT: &str = r#"
global @g : i64 [private]
fn @helper(%0 : i64) -> i64 {
bb0:
  %1 = integer_literal -3 : i64
  %2 = mul %0, %1 : i64
  return %2
}
fn @user() -> i64
vtable $C { #C.m : @helper }
metadata { origin = (lib "core"); }
"#;

    #[test]
    fn test_serialized_round_trip() {
        let module = parse_module(TEXT, "lib").unwrap();
        let bytes = serialize_module(&module).unwrap();
        assert!(is_serialized_module(&bytes));
        assert_eq!(&bytes[4..6], &FORMAT_VERSION.to_le_bytes());
        let loaded = ModuleDeserializer::new(&bytes).unwrap();
        assert_eq!(loaded.module(), &module);
        assert!(loaded.function(&Ident::new("user")).is_none());
        assert!(loaded.function(&Ident::new("helper")).is_some());
    }

    #[test]
    fn test_rejects_bad_headers() {
        assert!(matches!(
            ModuleDeserializer::new(b"fn @f() -> ()"),
            Err(SerializationError::MissingSignature)
        ));
        let mut bytes = SIGNATURE.to_vec();
        bytes.extend_from_slice(&7u16.to_le_bytes());
        assert!(matches!(
            ModuleDeserializer::new(&bytes),
            Err(SerializationError::UnsupportedVersion { found: 7 })
        ));
        let mut bytes = SIGNATURE.to_vec();
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&[1, 2, 3]);
        assert!(matches!(
            ModuleDeserializer::new(&bytes),
            Err(SerializationError::Malformed(_))
        ));
    }

    #[test]
    fn test_load_all_resolves_declarations() {
        let library = parse_module(TEXT, "lib").unwrap();
        let bytes = serialize_module(&library).unwrap();
        let mut target = parse_module(
            "fn @helper(%0 : i64) -> i64\nfn @user() -> i64 {\nbb0:\n  %0 = integer_literal 1 : i64\n  return %0\n}\n",
            "main",
        )
        .unwrap();
        ModuleDeserializer::new(&bytes).unwrap().load_all(&mut target);
        let helper = target.function(&Ident::new("helper")).unwrap();
        assert!(!helper.is_declaration());
        let user = target.function(&Ident::new("user")).unwrap();
        assert!(!user.is_declaration());
        assert_eq!(target.functions.len(), 2);
        assert_eq!(target.globals.len(), 1);
        assert_eq!(target.name, Ident::new("main"));
        assert!(target.metadata.contains_key("origin"));
    }
}
