use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Missing input: {0}")]
    MissingInput(&'static str),

    #[error("Invalid format of {field}: {value:?}")]
    InvalidFormat { field: &'static str, value: String },

    /// Transport-level failure talking to the search API. Aborts the whole fetch.
    #[error("Problem connecting to the search API: {0}")]
    ConnectionFailure(#[source] BoxError),

    /// Any database error. The surrounding transaction is never committed.
    #[error("Database error: {0}")]
    PersistenceFailure(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Io Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Result dump is not valid JSON: {0}")]
    Dump(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn invalid(field: &'static str, value: impl Into<String>) -> Self {
        Error::InvalidFormat {
            field,
            value: value.into(),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        // The request URL carries the API key.
        Error::ConnectionFailure(Box::new(value.without_url()))
    }
}
