//! Debug re-serialization of a decoded document.
//!
//! The output is formatted JSON in the schema's field naming, meant for
//! inspection and diffing. It is not a verified inverse of decode: some
//! fields are carried over as decoded and others are omitted when they hold
//! their defaults, so do not treat it as a round-trip contract.

use crate::{Error, SkeletonDocument};

/// Renders the document as pretty-printed JSON text.
pub fn to_export_string(document: &SkeletonDocument) -> Result<String, Error> {
    serde_json::to_string_pretty(document).map_err(|e| Error::Export {
        message: e.to_string(),
    })
}
