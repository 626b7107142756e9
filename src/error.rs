use thiserror::Error;

/// Decode failures. Every variant produced while consuming the stream carries
/// the byte offset at which the failing read started, so callers can log
/// which asset broke without receiving a partial document.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unexpected end of input at offset {offset}")]
    PrematureEof { offset: usize },

    #[error("invalid utf-8 in string at offset {offset}")]
    InvalidUtf8 { offset: usize },

    #[error("{table} index {index} out of range (len={len}) at offset {offset}")]
    OutOfRangeIndex {
        table: &'static str,
        index: usize,
        len: usize,
        offset: usize,
    },

    #[error("unsupported feature '{feature}' for format version '{version}' at offset {offset}")]
    UnsupportedVersionFeature {
        feature: &'static str,
        version: String,
        offset: usize,
    },

    #[error("unknown {kind} type tag {tag} at offset {offset}")]
    UnknownTypeTag {
        kind: &'static str,
        tag: u8,
        offset: usize,
    },

    #[error("failed to serialize document: {message}")]
    Export { message: String },
}
