//! Uploaded image payloads and contact address checks

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use petcast_core::{PetcastError, Result};
use std::fmt;

/// An encoded image as uploaded by the customer
#[derive(Clone, PartialEq, Eq)]
pub struct ImagePayload {
    mime_type: String,
    bytes: Vec<u8>,
}

impl ImagePayload {
    /// Build from raw bytes. Without an explicit `image/*` MIME type the
    /// format is sniffed from the magic bytes.
    pub fn from_bytes(bytes: Vec<u8>, mime_type: Option<&str>) -> Result<Self> {
        if bytes.is_empty() {
            return Err(no_image());
        }
        let mime_type = match mime_type.filter(|m| m.starts_with("image/")) {
            Some(m) => m.to_string(),
            None => image::guess_format(&bytes)
                .map(|f| f.to_mime_type().to_string())
                .map_err(|_| {
                    PetcastError::MissingInput("Upload is not a recognised image".to_string())
                })?,
        };
        Ok(Self { mime_type, bytes })
    }

    /// Parse a `data:image/...;base64,...` URL (the browser form encoding)
    pub fn from_data_url(data_url: &str) -> Result<Self> {
        let data_url = data_url.trim();
        if data_url.is_empty() {
            return Err(no_image());
        }
        let rest = data_url.strip_prefix("data:").ok_or_else(|| {
            PetcastError::MissingInput("Image must be a data URL".to_string())
        })?;
        let (header, payload) = rest.split_once(',').ok_or_else(|| {
            PetcastError::MissingInput("Malformed image data URL".to_string())
        })?;
        let mime = header
            .strip_suffix(";base64")
            .ok_or_else(|| PetcastError::MissingInput("Image data URL must be base64".to_string()))?;
        if !mime.starts_with("image/") {
            return Err(PetcastError::MissingInput(format!(
                "Unsupported upload type '{}'",
                mime
            )));
        }
        let bytes = BASE64
            .decode(payload.trim())
            .map_err(|e| PetcastError::MissingInput(format!("Invalid image encoding: {}", e)))?;
        Self::from_bytes(bytes, Some(mime))
    }

    /// Render as a data URL for provider requests
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, BASE64.encode(&self.bytes))
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImagePayload")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

fn no_image() -> PetcastError {
    PetcastError::MissingInput("No image provided".to_string())
}

/// Syntactic check of an email-style contact address
pub fn validate_contact_address(address: &str) -> Result<()> {
    let invalid = || PetcastError::MissingInput("Invalid email address".to_string());
    let address = address.trim();
    if address.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = address.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|l| l.is_empty()) {
        return Err(invalid());
    }
    Ok(())
}
