use thiserror::Error;

#[derive(Error, Debug)]
pub enum XtdbError {
    #[error("{0}")]
    InvalidField(String),
    #[error("Invalid aggregate function: {0}")]
    InvalidAggregateFunction(String),
    #[error("Aggregate {function} expects {expected} extra argument(s), got {given}")]
    InvalidAggregateArity { function: String, expected: usize, given: usize },
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),
    #[error("Cannot combine a {left} clause with a {right} clause, use a find-where instead")]
    IncompatibleSection { left: String, right: String },
    #[error("Cannot use | on a single where clause with an and clause, use & instead")]
    DisjunctionOfConjunction,
    #[error("Unsupported combination: {0}")]
    UnsupportedCombination(String),
    #[error("Invalid sort direction: {0} (expected asc or desc)")]
    InvalidSortDirection(String),
    #[error("Invalid in arguments: {0}")]
    InvalidInArguments(String),
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    #[error("Cannot query using incomplete clause")]
    IncompleteQuery,
    #[error("Config error: {0}")]
    Config(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("Remote query error: {0}")]
    RemoteQuery(String),
    #[error("JSON error: {0}")]
    Json(String),
    #[error("IO error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, XtdbError>;

// Helper conversions
impl From<config::ConfigError> for XtdbError {
    fn from(e: config::ConfigError) -> Self { Self::Config(e.to_string()) }
}
impl From<reqwest::Error> for XtdbError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => Self::Http { status: status.as_u16(), message: e.to_string() },
            None => Self::Transport(e.to_string()),
        }
    }
}
impl From<serde_json::Error> for XtdbError {
    fn from(e: serde_json::Error) -> Self { Self::Json(e.to_string()) }
}
impl From<std::io::Error> for XtdbError {
    fn from(e: std::io::Error) -> Self { Self::Io(e.to_string()) }
}
