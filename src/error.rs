#[cfg(feature = "python")]
use pyo3::exceptions::{PyRuntimeError, PyValueError};
#[cfg(feature = "python")]
use pyo3::PyErr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RidershipError {
    #[error("Data load failed: {0}")]
    DataLoad(String),

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("InvalidData: {0}")]
    InvalidData(String),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RidershipError {
    /// Errors that make the dataset unusable. These abort startup.
    pub fn is_load_error(&self) -> bool {
        matches!(
            self,
            Self::DataLoad(_) | Self::MissingColumn(_) | Self::Io(_)
        )
    }
}

#[cfg(feature = "python")]
impl From<RidershipError> for PyErr {
    fn from(err: RidershipError) -> PyErr {
        match err {
            RidershipError::InvalidFilter(_) => PyValueError::new_err(err.to_string()),
            _ => PyRuntimeError::new_err(err.to_string()),
        }
    }
}
