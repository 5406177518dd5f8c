//! Error handling utilities shared across the crate.

use std::path::PathBuf;

use thiserror::Error;

use crate::datafile::TokenWidth;
use crate::special_tokens::TokenId;

/// Convenient result type used throughout the crate.
pub type Result<T, E = TokprepError> = std::result::Result<T, E>;

/// Domain-specific error describing failures while fetching, annotating, encoding or writing.
#[derive(Debug, Error)]
pub enum TokprepError {
    /// Pipeline configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Filesystem IO error with optional context path.
    #[error("io error while processing {path:?}: {source}")]
    Io {
        /// Underlying IO error returned by the standard library.
        source: std::io::Error,
        /// Target path associated with the IO failure if available.
        path: Option<PathBuf>,
    },
    /// A raw source could not be fetched or located.
    #[error("failed to fetch {url}: {message}")]
    Fetch {
        /// Location that was requested.
        url: String,
        /// Description of the failure.
        message: String,
    },
    /// Error bubbled up from the `tokenizers` crate.
    #[error("huggingface tokenizers error: {0}")]
    Tokenizers(String),
    /// A control string appeared in text where it was not declared allowed.
    #[error("special token {token:?} found at byte offset {offset} but not allowed for this call")]
    DisallowedSpecialToken {
        /// The offending special string.
        token: String,
        /// Byte offset of the first occurrence within the encoded text.
        offset: usize,
    },
    /// A token id does not fit the on-disk integer width.
    #[error("token id {id} does not fit in a {width} token file")]
    TokenOutOfRange {
        /// Offending token id.
        id: TokenId,
        /// Width the file was being written with.
        width: TokenWidth,
    },
    /// A binary token file failed header or length validation.
    #[error("invalid token file {path:?}: {reason}")]
    InvalidTokenFile {
        /// File that was being read.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },
    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Catch-all variant for invariants that should not occur.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<tokenizers::Error> for TokprepError {
    fn from(err: tokenizers::Error) -> Self {
        Self::Tokenizers(err.to_string())
    }
}

impl From<serde_json::Error> for TokprepError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for TokprepError {
    fn from(err: reqwest::Error) -> Self {
        let url = err
            .url()
            .map(|url| url.to_string())
            .unwrap_or_else(|| "<unknown>".into());
        Self::Fetch {
            url,
            message: err.to_string(),
        }
    }
}

impl TokprepError {
    /// Helper constructor that attaches an optional path when wrapping IO errors.
    pub fn io(source: std::io::Error, path: Option<PathBuf>) -> Self {
        Self::Io { source, path }
    }

    /// Helper constructor for token file validation failures.
    pub fn invalid_token_file(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidTokenFile {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
