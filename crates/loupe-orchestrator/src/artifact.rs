//! Image artifacts produced by the generating agent.
//!
//! An [`ImageArtifact`] is only ever constructed from bytes that decode as a
//! supported raster format, so holders can rely on the media type and
//! dimensions being real.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::GenericImageView;
use loupe_abstraction::ContentBlock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shortest token considered when scanning script output for image data.
const MIN_CANDIDATE_LEN: usize = 16;

/// Errors raised while turning raw output into an artifact.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArtifactError {
    /// No base64 payload was found in the output.
    #[error("no image data found in script output")]
    NotFound,

    /// The payload is not valid base64.
    #[error("invalid base64 image data: {0}")]
    Base64(String),

    /// The payload decoded but is not a supported image.
    #[error("image data could not be decoded: {0}")]
    Image(String),
}

/// A validated raster image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageArtifact {
    /// MIME type, e.g. `image/png`.
    pub media_type: String,
    /// Base64-encoded bytes, without a `data:` prefix.
    pub data: String,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl ImageArtifact {
    /// Validates raw image bytes and wraps them.
    ///
    /// # Errors
    /// Returns [`ArtifactError::Image`] if the bytes are not a supported image.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ArtifactError> {
        let format = image::guess_format(bytes).map_err(|e| ArtifactError::Image(e.to_string()))?;
        let decoded = image::load_from_memory_with_format(bytes, format)
            .map_err(|e| ArtifactError::Image(e.to_string()))?;
        let (width, height) = GenericImageView::dimensions(&decoded);

        Ok(Self {
            media_type: format.to_mime_type().to_string(),
            data: STANDARD.encode(bytes),
            width,
            height,
        })
    }

    /// Decodes base64 (optionally a full `data:` URL) and validates the image.
    ///
    /// # Errors
    /// Returns [`ArtifactError::Base64`] for malformed base64 and
    /// [`ArtifactError::Image`] for undecodable images.
    pub fn from_base64(encoded: &str) -> Result<Self, ArtifactError> {
        let payload = strip_data_url(encoded.trim());
        let bytes = STANDARD.decode(payload).map_err(|e| ArtifactError::Base64(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Scans free-form script output for the image it printed.
    ///
    /// Tokens are tried longest first; the first one that decodes to a valid
    /// image wins.
    ///
    /// # Errors
    /// Returns [`ArtifactError::NotFound`] when no token looks like base64, or
    /// the error from the longest candidate when none decode.
    pub fn find_in_output(output: &str) -> Result<Self, ArtifactError> {
        let mut candidates: Vec<&str> = output
            .split_whitespace()
            .map(clean_token)
            .filter(|token| token.len() >= MIN_CANDIDATE_LEN && is_base64_alphabet(token))
            .collect();

        if candidates.is_empty() {
            return Err(ArtifactError::NotFound);
        }
        candidates.sort_by_key(|token| std::cmp::Reverse(token.len()));

        let mut first_error = None;
        for candidate in candidates {
            match Self::from_base64(candidate) {
                Ok(artifact) => return Ok(artifact),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        Err(first_error.unwrap_or(ArtifactError::NotFound))
    }

    /// Decoded image bytes.
    ///
    /// # Errors
    /// Returns [`ArtifactError::Base64`] if the stored data was tampered with.
    pub fn bytes(&self) -> Result<Vec<u8>, ArtifactError> {
        STANDARD.decode(&self.data).map_err(|e| ArtifactError::Base64(e.to_string()))
    }

    /// `data:` URL suitable for HTML previews and vision requests.
    #[must_use]
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.data)
    }

    /// File extension matching the media type.
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self.media_type.as_str() {
            "image/jpeg" => "jpg",
            "image/gif" => "gif",
            "image/webp" => "webp",
            "image/bmp" => "bmp",
            _ => "png",
        }
    }

    /// Converts the artifact into a model content block.
    #[must_use]
    pub fn to_content_block(&self) -> ContentBlock {
        ContentBlock::image(self.media_type.clone(), self.data.clone())
    }
}

fn strip_data_url(value: &str) -> &str {
    if value.starts_with("data:") {
        if let Some((_, payload)) = value.split_once(',') {
            return payload;
        }
    }
    value
}

// Python prints bytes as b'...' and JSON wraps strings in quotes.
fn clean_token(token: &str) -> &str {
    let token = strip_data_url(token);
    let token = token.strip_prefix("b'").or_else(|| token.strip_prefix("b\"")).unwrap_or(token);
    token.trim_matches(|c| matches!(c, '\'' | '"' | ',' | ';' | '(' | ')' | '[' | ']'))
}

fn is_base64_alphabet(token: &str) -> bool {
    token.bytes().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'='))
}
