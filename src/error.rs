use thiserror::Error;

use crate::controller::Action;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid number in `{field}`: {value}")]
    InvalidNumber { field: String, value: f64 },

    #[error("template error: {0}")]
    Template(#[from] tera::Error),

    #[error(transparent)]
    Raster(#[from] RasterError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("PDF encoding failed: {0}")]
    Pdf(String),

    #[error("{action} is already in progress")]
    Busy { action: Action },

    #[error("no invoice ID found")]
    MissingId,

    #[error("invalid email address: {0:?}")]
    InvalidEmail(String),

    #[error("{action} returned unexpected status {status}")]
    UnexpectedStatus { action: Action, status: u16 },

    #[error("failed to parse invoice: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("prompt aborted: {0}")]
    Prompt(#[from] inquire::InquireError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures while turning a preview into pixels.
#[derive(Error, Debug)]
pub enum RasterError {
    #[error("typst is not installed or not runnable ({binary}): {source}")]
    MissingRenderer {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("typst compilation failed: {0}")]
    Compilation(String),

    #[error("could not load image asset `{name}`: {reason}")]
    Asset { name: String, reason: String },

    #[error("rendered preview produced no pages")]
    Empty,

    #[error("image decode failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures talking to the persistence, thumbnail or auth collaborators.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("service responded with status {0}")]
    Status(u16),

    #[error("unexpected response: {0}")]
    Response(String),

    #[error("not signed in: {0}")]
    Unauthenticated(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aborted_prompt_is_not_a_config_error() {
        let err: Error = inquire::InquireError::OperationCanceled.into();
        assert!(matches!(err, Error::Prompt(_)));
        assert!(err.to_string().starts_with("prompt aborted"));
    }
}
