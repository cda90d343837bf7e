use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A child process ran and exited unsuccessfully. The code is surfaced
    /// unchanged as our own exit status.
    #[error("`{program}` exited with status {code}")]
    ToolFailed { program: String, code: i32 },

    #[error("failed to start `{program}`")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("environment variable `{0}` must be set")]
    MissingEnvironment(String),

    #[error("could not parse the output of `cargo read-manifest`")]
    ManifestParse(#[from] serde_json::Error),

    #[error("uploading docs for package with no library")]
    MissingLibraryTarget,
}

impl Error {
    /// Exit status the whole run should terminate with for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::ToolFailed { code, .. } => *code,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_passthrough() {
        let err = Error::ToolFailed {
            program: "cargo".to_string(),
            code: 101,
        };
        assert_eq!(err.exit_code(), 101);
        assert_eq!(Error::MissingLibraryTarget.exit_code(), 1);
        assert_eq!(
            Error::MissingEnvironment("GH_TOKEN".to_string()).to_string(),
            "environment variable `GH_TOKEN` must be set"
        );
    }
}
