//! String, byte, base64, object and timestamp conversions.
//!
//! Objects are encoded as JSON over UTF-8 bytes. Any `Serialize` type can be
//! encoded; failures report the Rust type involved. Timestamps are rendered
//! in UTC.

use std::any::type_name;
use std::time::SystemTime;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

#[derive(Debug)]
pub enum ConversionError {
    /// Input string was empty or only whitespace.
    Blank,
    Utf8(std::string::FromUtf8Error),
    Base64(base64::DecodeError),
    Timestamp(chrono::ParseError),
    Serialize {
        type_name: &'static str,
        source: serde_json::Error,
    },
    Deserialize {
        type_name: &'static str,
        source: serde_json::Error,
    },
}

impl std::fmt::Display for ConversionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversionError::Blank => write!(f, "input is blank"),
            ConversionError::Utf8(error) => write!(f, "invalid UTF-8: {}", error),
            ConversionError::Base64(error) => write!(f, "invalid base64: {}", error),
            ConversionError::Timestamp(error) => write!(f, "invalid ISO 8601 timestamp: {}", error),
            ConversionError::Serialize { type_name, source } => {
                write!(f, "type {} cannot be serialized: {}", type_name, source)
            }
            ConversionError::Deserialize { type_name, source } => {
                write!(f, "type {} cannot be deserialized: {}", type_name, source)
            }
        }
    }
}

impl std::error::Error for ConversionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConversionError::Blank => None,
            ConversionError::Utf8(error) => Some(error),
            ConversionError::Base64(error) => Some(error),
            ConversionError::Timestamp(error) => Some(error),
            ConversionError::Serialize { source, .. } | ConversionError::Deserialize { source, .. } => {
                Some(source)
            }
        }
    }
}

fn non_blank(input: &str) -> Result<&str, ConversionError> {
    if input.trim().is_empty() {
        Err(ConversionError::Blank)
    } else {
        Ok(input)
    }
}

// --- Strings and bytes ---

pub fn string_to_bytes(input: &str) -> Result<Vec<u8>, ConversionError> {
    non_blank(input).map(|input| input.as_bytes().to_vec())
}

pub fn bytes_to_string(input: &[u8]) -> Result<String, ConversionError> {
    String::from_utf8(input.to_vec()).map_err(ConversionError::Utf8)
}

pub fn base64_to_bytes(input: &str) -> Result<Vec<u8>, ConversionError> {
    STANDARD
        .decode(non_blank(input)?.trim())
        .map_err(ConversionError::Base64)
}

pub fn bytes_to_base64(input: &[u8]) -> String {
    STANDARD.encode(input)
}

// --- Timestamps ---

/// Round-trippable ISO 8601 form with nanosecond precision, e.g.
/// `2023-11-14T22:13:20.123456789Z`.
pub fn time_to_iso8601_string(input: SystemTime) -> String {
    DateTime::<Utc>::from(input).to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Short sortable UTC form, e.g. `2023-11-14 22:13:20Z`.
pub fn time_to_utc_display_string(input: SystemTime) -> String {
    DateTime::<Utc>::from(input).format("%Y-%m-%d %H:%M:%SZ").to_string()
}

/// Accepts any RFC 3339 offset and normalizes to UTC.
pub fn iso8601_to_time(input: &str) -> Result<SystemTime, ConversionError> {
    let parsed = DateTime::parse_from_rfc3339(non_blank(input)?.trim()).map_err(ConversionError::Timestamp)?;
    Ok(SystemTime::from(parsed.with_timezone(&Utc)))
}

// --- Objects ---

pub fn object_to_bytes<T: Serialize + ?Sized>(input: &T) -> Result<Vec<u8>, ConversionError> {
    serde_json::to_vec(input).map_err(|source| ConversionError::Serialize {
        type_name: type_name::<T>(),
        source,
    })
}

pub fn bytes_to_object<T: DeserializeOwned>(input: &[u8]) -> Result<T, ConversionError> {
    serde_json::from_slice(input).map_err(|source| ConversionError::Deserialize {
        type_name: type_name::<T>(),
        source,
    })
}

/// Deep copy through the serialized form.
pub fn clone_object<T: Serialize + DeserializeOwned>(input: &T) -> Result<T, ConversionError> {
    bytes_to_object(&object_to_bytes(input)?)
}

pub fn object_to_base64<T: Serialize + ?Sized>(input: &T) -> Result<String, ConversionError> {
    object_to_bytes(input).map(|bytes| bytes_to_base64(&bytes))
}

pub fn base64_to_object<T: DeserializeOwned>(input: &str) -> Result<T, ConversionError> {
    bytes_to_object(&base64_to_bytes(input)?)
}
