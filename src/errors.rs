use thiserror::Error;

pub type Result<T> = std::result::Result<T, PlotError>;

#[derive(Error, Debug)]
pub enum PlotError {
    #[error("Python not installed or not found in PATH")]
    PythonNotFound,

    #[error("No valid code snippet generated by the agent")]
    ExtractionEmpty,

    #[error("Disallowed tokens in generated code: {}", .0.join(", "))]
    ValidationRejected(Vec<String>),

    #[error("Runtime error during snippet execution: {0}")]
    ExecutionError(String),

    #[error("Snippet execution timeout exceeded")]
    Timeout,

    #[error("Missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("Missing API key (set PLOT_API_KEY)")]
    MissingApiKey,

    #[error("Language model request failed: {0}")]
    ModelRequest(String),

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl From<reqwest::Error> for PlotError {
    fn from(err: reqwest::Error) -> Self {
        PlotError::ModelRequest(err.to_string())
    }
}
