use std::path::{Path, PathBuf};

use vela_ir::pass::{PassOptions, DISABLE_ASSERT_CONFIG_REPLACEMENT};
use vela_ir::pprint::PrintOptions;

use crate::driver::DriverOptions;
use crate::error::DriverError;
use crate::pipeline::{read_schedule, OptGroup, PassRequest};

#[derive(Debug, clap::Parser)]
#[clap(name = "vela-opt", about = "Run vela IR passes over a module")]
pub struct Opt {
    /// Path to the input module, textual or serialized (stdin if absent or "-")
    pub input: Option<PathBuf>,
    /// Path to the output file (stdout if absent or "-")
    #[clap(short, long)]
    pub output: Option<PathBuf>,
    /// Add a directory to the library search path
    #[clap(short = 'I', value_name = "DIR")]
    pub import_paths: Vec<PathBuf>,
    /// Name of the module (defaults to "main", or the file stem of a serialized input)
    #[clap(long)]
    pub module_name: Option<String>,
    /// Target triple
    #[clap(long)]
    pub target: Option<String>,
    /// Run a predefined pass group instead of the passes given with -p
    #[clap(long, value_enum)]
    pub group: Option<OptGroup>,
    /// Pass to run; may be repeated
    #[clap(short = 'p', long = "pass", value_name = "PASS", conflicts_with = "schedule")]
    pub passes: Vec<String>,
    /// Path to a TOML pass schedule
    #[clap(long)]
    pub schedule: Option<PathBuf>,
    /// Verify diagnostics against expected-* annotations in the input
    #[clap(long)]
    pub verify: bool,
    /// Print pass statistics to stderr
    #[clap(long)]
    pub print_stats: bool,
    /// Emit locations with every instruction
    #[clap(long)]
    pub emit_verbose: bool,
    /// Sort globals, functions and tables by name in the output
    #[clap(long)]
    pub sort_output: bool,
    /// Write the serialized form instead of text
    #[clap(long)]
    pub emit_serialized: bool,
    /// List all available passes
    #[clap(long)]
    pub list_passes: bool,
    /// Largest callee, in instructions, the inline pass accepts
    #[clap(long, default_value_t = 50)]
    pub inline_threshold: usize,
    /// Maximum number of devirtualized call sites (0 means no limit)
    #[clap(long, default_value_t = 0)]
    pub devirt_threshold: usize,
    /// Value `assert_config` folds to
    #[clap(long, default_value_t = 0)]
    pub assert_conf_id: u32,
    /// Remove every cond_fail
    #[clap(long)]
    pub remove_runtime_asserts: bool,
    /// Verify the module after every pass
    #[clap(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub verify_all: bool,
    /// Print the module after every pass
    #[clap(long)]
    pub print_all: bool,
}

/// `-` stands for the standard stream.
fn non_dash(path: &Option<PathBuf>) -> Option<&Path> {
    path.as_deref().filter(|path| *path != Path::new("-"))
}

impl Opt {
    pub fn input_path(&self) -> Option<&Path> {
        non_dash(&self.input)
    }

    pub fn output_path(&self) -> Option<&Path> {
        non_dash(&self.output)
    }

    /// The explicitly requested passes, from the schedule file or the -p flags.
    pub fn requests(&self) -> Result<Vec<PassRequest>, DriverError> {
        match &self.schedule {
            Some(path) => read_schedule(path),
            None => Ok(self.passes.iter().map(PassRequest::new).collect()),
        }
    }

    pub fn pass_options(&self) -> PassOptions {
        if self.assert_conf_id == DISABLE_ASSERT_CONFIG_REPLACEMENT {
            log::debug!("assert_config replacement disabled");
        }
        PassOptions {
            inline_threshold: self.inline_threshold,
            devirt_threshold: self.devirt_threshold,
            assert_config: self.assert_conf_id,
            remove_runtime_asserts: self.remove_runtime_asserts,
            verify_all: self.verify_all,
            print_all: self.print_all,
            import_paths: self.import_paths.clone(),
        }
    }

    pub fn driver_options(&self) -> DriverOptions {
        DriverOptions {
            input: self.input_path().map(Path::to_path_buf),
            module_name: self.module_name.clone(),
            target: self.target.clone(),
            verify: self.verify,
            print_stats: self.print_stats,
            print: PrintOptions {
                verbose: self.emit_verbose,
                sorted: self.sort_output,
            },
            emit_serialized: self.emit_serialized,
            pass_options: self.pass_options(),
        }
    }
}

#[cfg(test)]
mod test {
    use clap::Parser;

    use super::*;

    #[test]
    fn test_defaults() {
        let opt = Opt::try_parse_from(["vela-opt"]).unwrap();
        assert_eq!(opt.pass_options(), PassOptions::default());
        assert!(opt.input_path().is_none());
        assert!(opt.requests().unwrap().is_empty());
    }

    #[test]
    fn test_options() {
        let opt = Opt::try_parse_from([
            "vela-opt",
            "-",
            "-o",
            "out.vir",
            "-I",
            "lib",
            "-I",
            "more",
            "-p",
            "cse",
            "--pass",
            "dce",
            "--group",
            "performance",
            "--verify-all",
            "false",
            "--assert-conf-id",
            "1",
        ])
        .unwrap();
        assert!(opt.input_path().is_none());
        assert_eq!(opt.output_path(), Some(Path::new("out.vir")));
        assert_eq!(opt.group, Some(OptGroup::Performance));
        let names: Vec<String> = opt.requests().unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["cse", "dce"]);
        let options = opt.pass_options();
        assert!(!options.verify_all);
        assert_eq!(options.assert_config, 1);
        assert_eq!(options.import_paths, vec![PathBuf::from("lib"), PathBuf::from("more")]);
    }

    #[test]
    fn test_pass_list_conflicts_with_schedule() {
        let result = Opt::try_parse_from(["vela-opt", "-p", "cse", "--schedule", "s.toml"]);
        assert!(result.is_err());
    }
}
