use {std::path::PathBuf, thiserror::Error};

pub type Result<T> = std::result::Result<T, Error>;

/// Failure modes of the post-processing pipeline.
///
/// Shape and contract violations (mismatched operands of increment addition,
/// merging an undeclared field) are programmer errors and panic via `assert!`
/// instead of surfacing here.
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error for key `{key}`: {reason}")]
    Config { key: String, reason: String },

    #[error("precondition violated: {0}")]
    Precondition(String),

    #[error("invalid date `{value}`: {reason}")]
    Date { value: String, reason: String },

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed increment file {path}: {reason}")]
    Format { path: PathBuf, reason: String },
}

impl Error {
    pub fn config(key: &str, reason: impl Into<String>) -> Self {
        Error::Config {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
