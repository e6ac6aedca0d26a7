use std::path::Path;

use serde::Deserialize;
use vela_ir::pass::BoxedPass;

use crate::catalog::{lookup_entry, PassInfo, DIAGNOSTICS, PERFORMANCE};
use crate::error::DriverError;

/// Predefined pass groups.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OptGroup {
    Diagnostics,
    Performance,
}

/// One requested pass: its identifier and its config table.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PassRequest {
    pub name: String,
    #[serde(default)]
    pub config: toml::Table,
}

impl PassRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: toml::Table::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PassSchedule {
    passes: Vec<PassRequest>,
}

pub fn parse_schedule(text: &str) -> Result<Vec<PassRequest>, toml::de::Error> {
    toml::from_str::<PassSchedule>(text).map(|schedule| schedule.passes)
}

pub fn read_schedule(path: &Path) -> Result<Vec<PassRequest>, DriverError> {
    let text = std::fs::read_to_string(path).map_err(|source| DriverError::ScheduleRead {
        path: path.to_path_buf(),
        source,
    })?;
    parse_schedule(&text).map_err(|source| DriverError::ScheduleParse {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunMode {
    Diagnostics,
    Performance,
    Explicit,
}

impl RunMode {
    pub fn select(group: Option<OptGroup>) -> Self {
        match group {
            Some(OptGroup::Diagnostics) => RunMode::Diagnostics,
            Some(OptGroup::Performance) => RunMode::Performance,
            None => RunMode::Explicit,
        }
    }
}

pub struct PipelineEntry {
    pub identifier: &'static str,
    pub info: &'static PassInfo,
    pub config: toml::Table,
}

impl PipelineEntry {
    pub fn instantiate(&self) -> Result<BoxedPass, DriverError> {
        (self.info.constructor)(&self.config).map_err(|source| DriverError::PassConfig {
            pass: self.identifier.to_string(),
            source,
        })
    }
}

/// The resolved, ordered passes of one run.
pub struct Pipeline {
    mode: RunMode,
    entries: Vec<PipelineEntry>,
}

impl Pipeline {
    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn entries(&self) -> &[PipelineEntry] {
        &self.entries
    }

    pub fn identifiers(&self) -> Vec<&'static str> {
        self.entries.iter().map(|entry| entry.identifier).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

fn entry(request: PassRequest) -> Result<PipelineEntry, DriverError> {
    let (identifier, info) =
        lookup_entry(&request.name).ok_or_else(|| DriverError::UnknownPass(request.name.clone()))?;
    let entry = PipelineEntry {
        identifier,
        info,
        config: request.config,
    };
    entry.instantiate()?;
    Ok(entry)
}

fn group(names: &[&str]) -> Result<Vec<PipelineEntry>, DriverError> {
    names.iter().map(|name| entry(PassRequest::new(*name))).collect()
}

/// Validates every explicit request, then picks the group when one is given and the explicit
/// list otherwise.
pub fn resolve(group_choice: Option<OptGroup>, explicit: Vec<PassRequest>) -> Result<Pipeline, DriverError> {
    let explicit = explicit
        .into_iter()
        .map(entry)
        .collect::<Result<Vec<_>, _>>()?;
    let mode = RunMode::select(group_choice);
    let entries = match mode {
        RunMode::Explicit => explicit,
        RunMode::Diagnostics | RunMode::Performance => {
            if !explicit.is_empty() {
                log::warn!(
                    "ignoring {} explicitly requested passes in favor of the {mode:?} group",
                    explicit.len()
                );
            }
            group(if mode == RunMode::Diagnostics {
                DIAGNOSTICS
            } else {
                PERFORMANCE
            })?
        }
    };
    log::debug!("resolved {} passes in {mode:?} mode", entries.len());
    Ok(Pipeline { mode, entries })
}

#[cfg(test)]
mod test {
    use super::*;

    fn requests(names: &[&str]) -> Vec<PassRequest> {
        names.iter().map(|name| PassRequest::new(*name)).collect()
    }

    #[test]
    fn test_explicit_list_keeps_order_and_duplicates() {
        let pipeline = resolve(None, requests(&["cse", "dce", "cse"])).unwrap();
        assert_eq!(pipeline.mode(), RunMode::Explicit);
        assert_eq!(pipeline.identifiers(), vec!["cse", "dce", "cse"]);
    }

    #[test]
    fn test_group_overrides_explicit_list() {
        let pipeline = resolve(Some(OptGroup::Diagnostics), requests(&["cse"])).unwrap();
        assert_eq!(pipeline.mode(), RunMode::Diagnostics);
        assert_eq!(pipeline.identifiers(), DIAGNOSTICS.to_vec());
        let pipeline = resolve(Some(OptGroup::Performance), Vec::new()).unwrap();
        assert_eq!(pipeline.len(), PERFORMANCE.len());
    }

    #[test]
    fn test_explicit_list_is_validated_even_with_group() {
        let result = resolve(Some(OptGroup::Performance), requests(&["cse", "no-such-pass"]));
        assert!(matches!(result, Err(DriverError::UnknownPass(name)) if name == "no-such-pass"));
        let mut bad = PassRequest::new("dce");
        bad.config.insert("threshold".into(), toml::Value::Integer(1));
        assert!(matches!(
            resolve(Some(OptGroup::Diagnostics), vec![bad]),
            Err(DriverError::PassConfig { .. })
        ));
    }

    #[test]
    fn test_empty_pipeline() {
        let pipeline = resolve(None, Vec::new()).unwrap();
        assert!(pipeline.is_empty());
    }

    #[test]
    fn test_schedule_format() {
        let text = r#"
[[passes]]
name = "inline"
config = { threshold = 10 }

[[passes]]
name = "dce"
"#;
        let schedule = parse_schedule(text).unwrap();
        assert_eq!(schedule.len(), 2);
        assert_eq!(schedule[0].config.get("threshold"), Some(&toml::Value::Integer(10)));
        assert!(schedule[1].config.is_empty());
        assert!(parse_schedule("[[passes]]\nname = \"dce\"\nextra = 1\n").is_err());
    }

    #[test]
    fn test_missing_schedule_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = read_schedule(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(DriverError::ScheduleRead { .. })));
    }
}
