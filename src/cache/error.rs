use thiserror::Error;

/// Failures of the cache backends or of the stored entry encoding.
///
/// None of these ever reach a client: the gate treats them as a miss and the
/// write path as a skipped write.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend `{bin}` failed: {message}")]
    Backend { bin: String, message: String },
    #[error("failed to encode cache entry `{key}`: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to decode cache entry `{key}`: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl CacheError {
    pub fn backend(bin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            bin: bin.into(),
            message: message.into(),
        }
    }
}
