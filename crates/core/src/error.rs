//! Errors raised while converting between wire records and typed views.

/// Result alias for model conversions.
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors that can occur when decoding or encoding records.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// The record belongs to a different job or stage type
    #[error("expected {entity} type '{expected}', found '{found}'")]
    KindMismatch {
        /// "job" or "stage"
        entity: &'static str,
        /// Discriminant the caller asked for
        expected: &'static str,
        /// Discriminant carried by the record
        found: String,
    },

    /// A payload did not match the shape declared by its kind
    #[error("invalid {field} payload: {source}")]
    Payload {
        /// Which payload failed ("data", "userMetadata")
        field: &'static str,
        /// Underlying serde error
        #[source]
        source: serde_json::Error,
    },
}
