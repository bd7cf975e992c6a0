//! Turns whatever the caller sent (uploaded bytes, bare base64, or a data URI)
//! into one canonical `data:image/<subtype>;base64,<body>` string.

use crate::error::{GatewayError, Result};
use base64::{
    alphabet,
    engine::{self, general_purpose, DecodePaddingMode},
    Engine as _,
};
use std::fmt;

const DATA_IMAGE_SCHEME: &str = "data:image";
const DEFAULT_SUBTYPE: &str = "png";

/// Accepts padded and unpadded standard base64.
const LENIENT: engine::GeneralPurpose = engine::GeneralPurpose::new(
    &alphabet::STANDARD,
    general_purpose::PAD.with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// A validated, self-contained image data URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    subtype: String,
    body: String,
    decoded_len: usize,
}

impl DataUri {
    pub fn mime_type(&self) -> String {
        format!("image/{}", self.subtype)
    }

    /// The canonical, padded base64 body.
    pub fn base64_body(&self) -> &str {
        &self.body
    }

    pub fn decoded_len(&self) -> usize {
        self.decoded_len
    }
}

impl fmt::Display for DataUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "data:image/{};base64,{}", self.subtype, self.body)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PayloadNormalizer {
    max_bytes: usize,
}

impl PayloadNormalizer {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    /// Checks a declared upload content type and returns its image subtype.
    pub fn check_media_type(&self, content_type: Option<&str>) -> Result<String> {
        let content_type = content_type.unwrap_or_default().trim().to_ascii_lowercase();
        let subtype = content_type
            .strip_prefix("image/")
            .map(|rest| rest.split(';').next().unwrap_or_default().trim())
            .unwrap_or_default();

        if !is_valid_subtype(subtype) {
            let shown = if content_type.is_empty() {
                "none".to_string()
            } else {
                content_type.clone()
            };
            return Err(GatewayError::UnsupportedMediaType(format!(
                "File must be an image (got content type: {})",
                shown
            )));
        }

        Ok(subtype.to_string())
    }

    pub fn check_size(&self, len: usize) -> Result<()> {
        if len > self.max_bytes {
            return Err(GatewayError::PayloadTooLarge(format!(
                "Image exceeds the maximum size of {} bytes",
                self.max_bytes
            )));
        }
        Ok(())
    }

    /// Raw upload path: content type first, then size, then encode.
    pub fn from_bytes(&self, bytes: &[u8], content_type: Option<&str>) -> Result<DataUri> {
        let subtype = self.check_media_type(content_type)?;
        self.check_size(bytes.len())?;
        if bytes.is_empty() {
            return Err(GatewayError::InvalidImageData("uploaded file is empty".into()));
        }

        Ok(DataUri {
            subtype,
            body: general_purpose::STANDARD.encode(bytes),
            decoded_len: bytes.len(),
        })
    }

    /// String path: bare base64 or a `data:image/...` URI.
    pub fn from_encoded(&self, input: &str) -> Result<DataUri> {
        let input = input.trim();

        let (subtype, body) = if input.starts_with(DATA_IMAGE_SCHEME) {
            let (header, body) = input.split_once(',').ok_or_else(|| {
                GatewayError::InvalidImageData("data URI has no payload separator".into())
            })?;
            (declared_subtype(header), body)
        } else {
            (DEFAULT_SUBTYPE.to_string(), input)
        };

        let body = body.trim();
        if body.is_empty() {
            return Err(GatewayError::InvalidImageData("image payload is empty".into()));
        }

        let decoded = LENIENT.decode(body)?;
        if decoded.is_empty() {
            return Err(GatewayError::InvalidImageData("image payload is empty".into()));
        }
        self.check_size(decoded.len())?;

        Ok(DataUri {
            subtype,
            body: general_purpose::STANDARD.encode(&decoded),
            decoded_len: decoded.len(),
        })
    }
}

/// Pulls `jpeg` out of `data:image/jpeg;base64`, falling back to png.
fn declared_subtype(header: &str) -> String {
    header
        .strip_prefix("data:image/")
        .map(|rest| rest.split(';').next().unwrap_or_default().trim())
        .filter(|subtype| is_valid_subtype(subtype))
        .map(|subtype| subtype.to_ascii_lowercase())
        .unwrap_or_else(|| DEFAULT_SUBTYPE.to_string())
}

/// RFC 6838 restricted-name characters, enough for `png`, `svg+xml` and friends.
fn is_valid_subtype(subtype: &str) -> bool {
    !subtype.is_empty()
        && subtype
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}
