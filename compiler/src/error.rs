// error.rs — Failures of the arcc binary outside of compilation
//
// Compile errors are diagnostics; these are the I/O and configuration
// problems that stop the binary before or after the front end runs.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: invalid channel manifest: {source}", .path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("channel '{name}': unknown type '{ty}'")]
    ChannelType { name: String, ty: String },

    #[error("channel '{name}' is declared more than once")]
    DuplicateChannel { name: String },

    #[error("cannot serialize output: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("{0} error(s) in source")]
    Compile(usize),
}

impl CliError {
    /// Process exit code: 1 for compile errors, 2 for everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Compile(_) => 1,
            _ => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes() {
        assert_eq!(CliError::Compile(3).exit_code(), 1);
        let io = CliError::Io {
            path: PathBuf::from("x.arc"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        assert_eq!(io.exit_code(), 2);
        assert_eq!(io.to_string(), "x.arc: not found");
    }
}
