//! Reading reference tables that are not always UTF-8.

use std::fmt;
use std::path::Path;

use serde::Deserialize;

use crate::error::{BillingError, Result};

/// Text encodings a reference table may be stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum TextEncoding {
    #[serde(rename = "utf-8")]
    Utf8,
    #[serde(rename = "latin-1")]
    Latin1,
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextEncoding::Utf8 => write!(f, "utf-8"),
            TextEncoding::Latin1 => write!(f, "latin-1"),
        }
    }
}

impl TextEncoding {
    fn decode(self, bytes: Vec<u8>) -> std::result::Result<String, Vec<u8>> {
        match self {
            TextEncoding::Utf8 => String::from_utf8(bytes).map_err(|e| e.into_bytes()),
            TextEncoding::Latin1 => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
        }
    }
}

/// Reads `path` as UTF-8, retrying once with `fallback` when decoding fails.
///
/// # Errors
///
/// `MissingResource` if the file cannot be opened, `EncodingMismatch` if
/// neither encoding decodes it.
pub fn read_text(path: &Path, fallback: Option<TextEncoding>) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|e| BillingError::from_io(path, e))?;
    decode_with_fallback(path, bytes, fallback)
}

pub(crate) fn decode_with_fallback(
    path: &Path,
    bytes: Vec<u8>,
    fallback: Option<TextEncoding>,
) -> Result<String> {
    let bytes = match TextEncoding::Utf8.decode(bytes) {
        Ok(text) => return Ok(text),
        Err(bytes) => bytes,
    };
    let mismatch = |tried: String| BillingError::EncodingMismatch {
        path: path.to_path_buf(),
        tried,
    };
    let Some(fallback) = fallback.filter(|enc| *enc != TextEncoding::Utf8) else {
        return Err(mismatch("utf-8".to_string()));
    };
    tracing::warn!(
        file = %path.display(),
        %fallback,
        "utf-8 decode failed, retrying with fallback encoding"
    );
    fallback
        .decode(bytes)
        .map_err(|_| mismatch(format!("utf-8 or {fallback}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LATIN1_CAFE: &[u8] = b"name\ncaf\xe9\n";

    #[test]
    fn utf8_passes_through() {
        let text = decode_with_fallback(Path::new("t.csv"), b"a,b\n".to_vec(), None);
        assert_eq!(text.ok().as_deref(), Some("a,b\n"));
    }

    #[test]
    fn latin1_fallback_decodes() {
        let text =
            decode_with_fallback(Path::new("t.csv"), LATIN1_CAFE.to_vec(), Some(TextEncoding::Latin1));
        assert_eq!(text.ok().as_deref(), Some("name\ncafé\n"));
    }

    #[test]
    fn no_fallback_is_an_encoding_mismatch() {
        let err = decode_with_fallback(Path::new("t.csv"), LATIN1_CAFE.to_vec(), None)
            .expect_err("must fail");
        assert!(matches!(err, BillingError::EncodingMismatch { .. }));

        let err =
            decode_with_fallback(Path::new("t.csv"), LATIN1_CAFE.to_vec(), Some(TextEncoding::Utf8))
                .expect_err("same encoding is not a fallback");
        assert!(matches!(err, BillingError::EncodingMismatch { .. }));
    }

    #[test]
    fn missing_file_is_missing_resource() {
        let err = read_text(Path::new("/nonexistent/prices.csv"), None).expect_err("must fail");
        assert!(matches!(err, BillingError::MissingResource { .. }));
    }
}
