use std::path::PathBuf;

use kernel::TagError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing credentials, malformed tags or configuration.
    #[error("{0}")]
    Config(String),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("connection failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("invalid server response: {0}")]
    Decode(String),

    #[error("no Robot Framework test results found in {}", .0.display())]
    NothingToUpload(PathBuf),

    #[error("upload failed: none of the files of run {run_id} were uploaded")]
    UploadFailed { run_id: String },
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether repeating the same request may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport(_) => true,
            Error::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Whether the error is a configuration or authentication problem.
    #[must_use]
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_) | Error::Unauthorized(_))
    }
}

impl From<TagError> for Error {
    fn from(e: TagError) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Error::Decode(e.to_string())
        } else {
            Error::Transport(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Error::Server { status: 502, message: String::new() }, true)]
    #[case(Error::Server { status: 400, message: String::new() }, false)]
    #[case(Error::NotFound("run x".to_owned()), false)]
    #[case(Error::Unauthorized(String::new()), false)]
    #[case(Error::Config(String::new()), false)]
    #[trace]
    fn retryable(#[case] error: Error, #[case] expected: bool) {
        // Act
        let actual = error.is_retryable();

        // Assert
        assert_eq!(actual, expected);
    }

    #[test]
    fn tag_error_becomes_config_error() {
        // Arrange
        let e = TagError::Value(String::new());

        // Act
        let err: Error = e.into();

        // Assert
        assert!(matches!(err, Error::Config(_)));
    }
}
