use thiserror::Error;

#[derive(Debug, Error)]
pub enum PackingError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Invalid container dimensions: {width}x{height}")]
    InvalidDimensions { width: f64, height: f64 },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Invalid layout: {0}")]
    InvalidLayout(String),
    #[error("Physics backend error: {0}")]
    Backend(String),
    #[error("Solver error: {0}")]
    Solver(String),
    #[error("Task was cancelled")]
    Cancelled,
    #[error("Another packing task is already running")]
    Busy,
}

pub type Result<T> = std::result::Result<T, PackingError>;
