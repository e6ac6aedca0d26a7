use std::io::Write;
use std::process::ExitCode;

use clap::Parser;

mod catalog;
mod cli;
mod coordinator;
mod driver;
mod error;
mod loader;
mod pipeline;
mod verify;

use cli::Opt;
use driver::{RunResult, RunStatus};
use error::{fmt_error_chain, DriverError};

fn write_output(opt: &Opt, result: &RunResult) -> Result<(), DriverError> {
    // the report goes where it cannot corrupt a binary module
    if opt.emit_serialized || opt.output_path().is_some() {
        std::io::stderr()
            .write_all(&result.report)
            .map_err(DriverError::OutputWrite)?;
    } else {
        std::io::stdout()
            .write_all(&result.report)
            .map_err(DriverError::OutputWrite)?;
    }
    let Some(output) = &result.output else {
        return Ok(());
    };
    match opt.output_path() {
        Some(path) => {
            let mut file =
                std::fs::File::create(path).map_err(|source| DriverError::OutputOpen {
                    path: path.to_path_buf(),
                    source,
                })?;
            file.write_all(output).map_err(DriverError::OutputWrite)
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(output).map_err(DriverError::OutputWrite)?;
            stdout.flush().map_err(DriverError::OutputWrite)
        }
    }
}

fn run(opt: &Opt) -> Result<RunStatus, DriverError> {
    if opt.list_passes {
        let mut listing = String::new();
        catalog::fmt_catalog(&mut listing)?;
        print!("{listing}");
        return Ok(RunStatus::Success);
    }

    let pipeline = pipeline::resolve(opt.group, opt.requests()?)?;
    log::info!("pipeline: {}", pipeline.identifiers().join(", "));
    let options = opt.driver_options();
    let input = loader::read_input(opt.input_path())?;
    let result = driver::execute(&options, &pipeline, &input)?;
    if options.print_stats && !result.statistics.is_empty() {
        eprint!("{}", result.statistics);
    }
    write_output(opt, &result)?;
    Ok(result.status)
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let opt = Opt::parse();
    match run(&opt) {
        Ok(RunStatus::Success) => ExitCode::SUCCESS,
        Ok(status) => {
            log::debug!("exiting with failure: {status:?}");
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("{}", fmt_error_chain(&err));
            ExitCode::FAILURE
        }
    }
}
