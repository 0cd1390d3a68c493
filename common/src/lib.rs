use arrow::error::ArrowError;
use aws_sdk_s3::primitives::ByteStreamError;
use aws_smithy_runtime_api::client::result::CreateUnhandledError;
use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_runtime_api::http::Response;
use datafusion::error::DataFusionError;
use parquet::errors::ParquetError;
use thiserror::Error;
use url::ParseError;

pub mod config;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("UTF-8 conversion error: {0}")]
    Utf8(std::string::FromUtf8Error),

    #[error("AWS SDK error: {0}")]
    AwsSdk(String),

    #[error("Upstream returned status {0}")]
    UpstreamStatus(u16),

    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Bucket already exists: {0}")]
    BucketAlreadyExists(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("ByteStream error: {0}")]
    ByteStream(#[from] ByteStreamError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("DataFusion error: {0}")]
    DataFusion(#[from] DataFusionError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Schema validation error: {0}")]
    SchemaValidation(String),

    #[error("Invalid task graph: {0}")]
    InvalidGraph(String),

    #[error("Unit '{unit}' timed out after {secs}s")]
    Timeout { unit: String, secs: u64 },

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether a failed unit attempt with this error should be retried.
    ///
    /// Storage, database and transport failures are transient. Parse, schema
    /// and configuration failures fail the same way on every attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(_)
            | Error::Io(_)
            | Error::AwsSdk(_)
            | Error::Storage(_)
            | Error::ByteStream(_)
            | Error::Parquet(_)
            | Error::DataFusion(_)
            | Error::Timeout { .. }
            | Error::Other(_) => true,
            Error::UpstreamStatus(code) => *code == 429 || *code >= 500,
            Error::Json(_)
            | Error::Csv(_)
            | Error::Utf8(_)
            | Error::Config(_)
            | Error::BucketAlreadyExists(_)
            | Error::NotFound(_)
            | Error::Arrow(_)
            | Error::InvalidInput(_)
            | Error::SchemaValidation(_)
            | Error::InvalidGraph(_) => false,
        }
    }
}

// Implement From for various SdkError types
impl<E: std::fmt::Debug + CreateUnhandledError> From<SdkError<E, Response>> for Error {
    fn from(err: SdkError<E, Response>) -> Self {
        Error::AwsSdk(format!("{:?}", err))
    }
}

impl From<object_store::Error> for Error {
    fn from(err: object_store::Error) -> Self {
        match err {
            object_store::Error::NotFound { path, .. } => Error::NotFound(path),
            other => Error::Storage(format!("Object store error: {}", other)),
        }
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(err: std::string::FromUtf8Error) -> Self {
        Error::Utf8(err)
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::InvalidInput(format!("URL parse error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(Error::Storage("connection reset".into()).is_retryable());
        assert!(Error::Timeout { unit: "load_weather".into(), secs: 5 }.is_retryable());
        assert!(!Error::SchemaValidation("bad date".into()).is_retryable());
        assert!(!Error::InvalidGraph("cycle".into()).is_retryable());
        assert!(Error::UpstreamStatus(503).is_retryable());
        assert!(Error::UpstreamStatus(429).is_retryable());
        assert!(!Error::UpstreamStatus(404).is_retryable());
    }

    #[test]
    fn test_object_store_not_found_maps_to_not_found() {
        let err: Error = object_store::Error::NotFound {
            path: "weather/a.json".to_string(),
            source: "missing".into(),
        }
        .into();
        assert!(matches!(err, Error::NotFound(ref p) if p == "weather/a.json"));
    }
}
