//! Decoding of list responses.
//!
//! List endpoints answer with a bare top-level JSON array. The array is
//! decoded directly into a typed list in server order; anything else is a
//! [`CloudBuildError::Decode`] and no partial list is returned.

use serde::de::DeserializeOwned;

use crate::error::{CloudBuildError, Result};

/// Decode a JSON array of objects into `Vec<T>`, preserving order.
///
/// `null`, non-array documents and elements missing required fields are
/// all rejected.
pub fn decode_array<T: DeserializeOwned>(json: &str) -> Result<Vec<T>> {
    let trimmed = json.trim();
    if trimmed.is_empty() {
        return Err(CloudBuildError::Decode("empty response body".to_string()));
    }
    serde_json::from_str::<Vec<T>>(trimmed).map_err(|e| CloudBuildError::Decode(e.to_string()))
}
