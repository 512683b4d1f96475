use thiserror::Error;

#[derive(Error, Debug)]
pub enum BundleError {
    #[error("Unsupported format: {path} is not a {expected} archive ({found})")]
    UnsupportedFormat {
        path: String,
        expected: String,
        found: String,
    },

    #[error("Bundle is already closed")]
    AlreadyClosed,

    #[error("Destination already exists: {0}")]
    DestinationExists(String),

    #[error("Destination is a directory: {0}")]
    DestinationIsDirectory(String),

    #[error("Malformed error document {path}: {reason}")]
    MalformedError { path: String, reason: String },

    #[error("Malformed reference {path}: {reason}")]
    MalformedReference { path: String, reason: String },

    #[error("Not a reference: {0}")]
    NotAReference(String),

    #[error("Not a value: {0}")]
    NotAValue(String),

    #[error("Not a list: {0}")]
    NotAList(String),

    #[error("Not an error: {0}")]
    NotAnError(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Reserved path: {0} is managed by the container")]
    ReservedPath(String),

    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Invalid port name: {0}")]
    InvalidPortName(String),

    #[error("Invalid media type: {0}")]
    InvalidMediaType(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Invalid URI: {0}")]
    Url(#[from] url::ParseError),
}

impl BundleError {
    pub(crate) fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        BundleError::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BundleError>;
