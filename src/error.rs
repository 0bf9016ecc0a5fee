//! Error types for ctxcrop
//!
//! All modules use `CropResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Advisory delay handed to callers that hit a generation in progress
pub const BUSY_RETRY_AFTER_SECS: u64 = 3;

/// Result type alias for ctxcrop operations
pub type CropResult<T> = Result<T, CropError>;

/// All errors that can occur in ctxcrop
#[derive(Error, Debug)]
pub enum CropError {
    // Request validation errors
    #[error("Invalid source URI {uri}: {reason}")]
    InvalidSource { uri: String, reason: String },

    #[error("Unknown image style: {0}")]
    UnknownStyle(String),

    #[error("Unknown file scheme: {0}")]
    UnknownScheme(String),

    #[error("Unknown crop type: {0}")]
    UnknownCropType(String),

    #[error("Invalid crop settings '{settings}': {reason}")]
    InvalidCropSettings { settings: String, reason: String },

    // Delivery outcomes
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Image generation in progress, retry after {retry_after}s")]
    Busy { retry_after: u64 },

    #[error("Unable to generate the derived image located at {derivative}")]
    GenerationFailed { derivative: String },

    /// What a requester sees of a failed delivery
    #[error("{message} (HTTP {status}){}", retry_suffix(.retry_after))]
    Rejected {
        status: u16,
        message: &'static str,
        retry_after: Option<u64>,
    },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid path: {path}: {reason}")]
    PathInvalid { path: PathBuf, reason: String },

    // Serialization and codec errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl CropError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create an invalid source error
    pub fn invalid_source(uri: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSource {
            uri: uri.into(),
            reason: reason.into(),
        }
    }

    /// Create a busy error carrying the standard retry hint
    pub fn busy() -> Self {
        Self::Busy {
            retry_after: BUSY_RETRY_AFTER_SECS,
        }
    }

    /// Check if error is retryable by the caller
    pub fn is_retryable(&self) -> bool {
        self.retry_after().is_some()
    }

    /// Seconds the caller should wait before retrying, if retryable
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::Busy { retry_after } => Some(*retry_after),
            Self::Rejected { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Replace internal detail with the status and generic message
    pub fn into_public(self) -> Self {
        if let Self::Rejected { .. } = self {
            return self;
        }
        Self::Rejected {
            status: self.status_code(),
            message: self.public_message(),
            retry_after: self.retry_after(),
        }
    }

    /// HTTP-style status for the error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidSource { .. }
            | Self::UnknownStyle(_)
            | Self::UnknownCropType(_)
            | Self::InvalidCropSettings { .. }
            | Self::User(_) => 400,
            Self::UnknownScheme(_) | Self::NotFound(_) => 404,
            Self::AccessDenied(_) => 403,
            Self::Busy { .. } => 503,
            Self::Rejected { status, .. } => *status,
            _ => 500,
        }
    }

    /// Message safe to show to a requesting agent
    ///
    /// Never includes internal paths.
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::NotFound(_) | Self::UnknownScheme(_) => {
                "Error generating image, missing source file."
            }
            Self::AccessDenied(_) => "Access denied.",
            Self::Busy { .. } => "Image generation in progress. Try again shortly.",
            Self::Rejected { message, .. } => *message,
            Self::InvalidSource { .. }
            | Self::UnknownStyle(_)
            | Self::UnknownCropType(_)
            | Self::InvalidCropSettings { .. } => "Invalid image request.",
            _ => "Error generating image.",
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::UnknownStyle(_) => Some("Run: ctxcrop styles"),
            Self::UnknownCropType(_) => Some("Crop types are declared under [crop_types] in config"),
            Self::Busy { .. } | Self::Rejected { status: 503, .. } => {
                Some("Another request is generating this derivative")
            }
            Self::ConfigInvalid { .. } => Some("Run: ctxcrop config show"),
            _ => None,
        }
    }
}

fn retry_suffix(retry_after: &Option<u64>) -> String {
    match retry_after {
        Some(secs) => format!(", Retry-After: {}", secs),
        None => String::new(),
    }
}
