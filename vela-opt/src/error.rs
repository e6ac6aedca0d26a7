use std::path::PathBuf;

use vela_ir::pass::PassError;
use vela_ir::serialized::SerializationError;

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("unknown pass '{0}' (see --list-passes)")]
    UnknownPass(String),
    #[error("invalid configuration for pass '{pass}'")]
    PassConfig {
        pass: String,
        source: toml::de::Error,
    },
    #[error("failed to read schedule '{}'", .path.display())]
    ScheduleRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse schedule '{}'", .path.display())]
    ScheduleParse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("failed to read input '{name}'")]
    InputRead {
        name: String,
        source: std::io::Error,
    },
    #[error("failed to open output '{}'", .path.display())]
    OutputOpen {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write output")]
    OutputWrite(#[source] std::io::Error),
    #[error("failed to serialize the module")]
    Serialize(#[from] SerializationError),
    #[error("pass pipeline failed")]
    Pass(#[from] PassError),
    #[error("failed to format the pass catalog")]
    Catalog(#[from] std::fmt::Error),
}

/// `error: <message>` followed by one `caused by` line per source in the chain.
pub fn fmt_error_chain(error: &dyn std::error::Error) -> String {
    let mut message = format!("error: {error}");
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(&format!("\n  caused by: {cause}"));
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_error_chain_lists_sources() {
        let error = DriverError::InputRead {
            name: "missing.vir".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        };
        assert_eq!(
            fmt_error_chain(&error),
            "error: failed to read input 'missing.vir'\n  caused by: no such file"
        );
    }
}
