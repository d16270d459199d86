use thiserror::Error;

/// Why a candidate file was turned away at intake.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid file type: {name} ({mime}) is not in the accepted list")]
    TypeNotAllowed { name: String, mime: String },

    #[error("File too large: {name} is {size_mb:.2}MB, maximum is {max_mb}MB")]
    SizeExceeded {
        name: String,
        size_mb: f64,
        max_mb: f64,
    },
}

impl ValidationError {
    pub fn file_name(&self) -> &str {
        match self {
            ValidationError::TypeNotAllowed { name, .. } => name,
            ValidationError::SizeExceeded { name, .. } => name,
        }
    }
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("Failed to read file {name}: {source}")]
    FileRead {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Upload failed with status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {field} - {message}")]
    InvalidConfig { field: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convert to string for embedders that only display errors
impl From<UploadError> for String {
    fn from(error: UploadError) -> Self {
        error.to_string()
    }
}

pub type UploadResult<T> = Result<T, UploadError>;

impl UploadError {
    pub fn invalid_config(field: &str, message: &str) -> Self {
        Self::InvalidConfig {
            field: field.to_string(),
            message: message.to_string(),
        }
    }

    pub fn file_read(name: &str, source: std::io::Error) -> Self {
        Self::FileRead {
            name: name.to_string(),
            source,
        }
    }

    pub fn unsupported_encoding(value: &str) -> Self {
        Self::UnsupportedEncoding(value.to_string())
    }

    /// Transient failures an embedder may reasonably re-invoke.
    pub fn is_retryable(&self) -> bool {
        match self {
            UploadError::Network(_) | UploadError::Io(_) | UploadError::FileRead { .. } => true,
            UploadError::HttpStatus { status, .. } => {
                matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
            }
            _ => false,
        }
    }

    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            UploadError::Validation(_)
                | UploadError::UnsupportedEncoding(_)
                | UploadError::InvalidConfig { .. }
                | UploadError::Config(_)
        )
    }
}
