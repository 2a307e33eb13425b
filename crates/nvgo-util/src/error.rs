//! Errors raised while setting up logging.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("could not create log directory {}", path.display())]
    LogDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not open log file {}", path.display())]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("logging already initialized: {0}")]
    AlreadyInitialized(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    #[test]
    fn test_log_file_error_names_path_and_keeps_cause() {
        let err = Error::LogFile {
            path: PathBuf::from("/var/log/nvgo.log"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.to_string(), "could not open log file /var/log/nvgo.log");
        assert_eq!(StdError::source(&err).unwrap().to_string(), "denied");
        assert!(StdError::source(&Error::AlreadyInitialized("x".into())).is_none());
    }
}
