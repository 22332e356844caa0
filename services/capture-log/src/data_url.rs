//! `data:image/<subtype>;base64,<payload>` parsing.

use crate::error::IngestError;
use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine,
};
use regex::Regex;
use std::sync::OnceLock;

/// Standard alphabet, no padding expected, trailing bits ignored
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::RequireNone)
        .with_decode_allow_trailing_bits(true),
);

fn data_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // Payload runs to the end of input and may not contain line terminators
        Regex::new(r"^data:(image/[A-Za-z0-9_]+);base64,([^\n\r\u{2028}\u{2029}]+)$")
            .expect("data url pattern is valid")
    })
}

/// An image data URL split into its parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDataUrl<'a> {
    /// Full MIME type, e.g. `image/png`
    pub mime_type: &'a str,
    /// Base64 payload exactly as submitted
    pub payload: &'a str,
}

impl<'a> ImageDataUrl<'a> {
    /// Match `input` against the image data URL shape
    pub fn parse(input: &'a str) -> Result<Self, IngestError> {
        let captures = data_url_pattern()
            .captures(input)
            .ok_or(IngestError::InvalidDataUrl)?;

        match (captures.get(1), captures.get(2)) {
            (Some(mime), Some(payload)) => Ok(Self {
                mime_type: mime.as_str(),
                payload: payload.as_str(),
            }),
            _ => Err(IngestError::InvalidDataUrl),
        }
    }

    /// MIME subtype, used as the file extension (`image/jpeg` -> `jpeg`)
    pub fn extension(&self) -> &'a str {
        self.mime_type
            .split_once('/')
            .map(|(_, subtype)| subtype)
            .unwrap_or(self.mime_type)
    }

    /// Decode the payload into image bytes
    pub fn decode(&self) -> Result<Vec<u8>, IngestError> {
        decode_lenient(self.payload)
    }
}

/// Best-effort base64 decoding.
///
/// Accepts the standard and URL-safe alphabets, optional padding and stray
/// characters; stops at the first `=`. Garbage yields whatever bytes the
/// valid characters spell rather than an error.
pub fn decode_lenient(payload: &str) -> Result<Vec<u8>, IngestError> {
    let mut normalized: Vec<u8> = payload
        .bytes()
        .take_while(|&b| b != b'=')
        .filter_map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'+' | b'/' => Some(b),
            b'-' => Some(b'+'),
            b'_' => Some(b'/'),
            _ => None,
        })
        .collect();

    // A single leftover sextet cannot form a byte
    if normalized.len() % 4 == 1 {
        normalized.pop();
    }

    Ok(LENIENT.decode(normalized)?)
}
