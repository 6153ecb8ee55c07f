//! Core data models used throughout EduGuide.
//!
//! These types represent the student records, document chunks, and chat
//! transcript entries that flow through the ingestion and answer pipeline.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// A student record as stored on disk, one JSON file per student.
///
/// Every field is optional; absent values are rendered with placeholders by
/// [`crate::profile::format_for_prompt`] instead of failing the load.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StudentProfile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub major: Option<String>,
    /// Either `"Sophomore"` or `2` in the source data.
    #[serde(default, deserialize_with = "lenient_text")]
    pub year: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub gpa: Option<f64>,
    #[serde(default)]
    pub academic_standing: Option<String>,
    /// Keyed by course code; ordered by code so rendering is stable.
    #[serde(default)]
    pub courses: BTreeMap<String, CourseRecord>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CourseRecord {
    #[serde(default, deserialize_with = "lenient_text")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub grade: Option<String>,
    /// Usually a percentage string like `"85%"`, sometimes a bare number.
    #[serde(default, deserialize_with = "lenient_text")]
    pub attendance: Option<String>,
}

/// Accept strings, numbers and booleans as text; `null` becomes `None`.
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        Some(serde_json::Value::Bool(b)) => Some(b.to_string()),
        Some(other) => Some(other.to_string()),
    })
}

/// Accept a JSON number or a numeric string; anything else is treated as missing.
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

/// A bounded slice of one page of extracted document text.
///
/// `offset` is the character offset of `text` within its page, which is what
/// lets overlapping neighbours be stitched back into the original page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentChunk {
    pub id: String,
    pub source_file: String,
    /// 1-based page (or slide) number within the source file.
    pub page: u32,
    /// Position of this chunk within its page, contiguous from 0.
    pub chunk_index: u32,
    pub offset: usize,
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
}

/// A document handed to the ingestion pipeline, from disk or an upload.
#[derive(Debug, Clone)]
pub struct UploadedDocument {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadedDocument {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One entry in the chat transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_accepts_number_or_text() {
        let a: StudentProfile = serde_json::from_str(r#"{"year": 2}"#).unwrap();
        let b: StudentProfile = serde_json::from_str(r#"{"year": "Junior"}"#).unwrap();
        assert_eq!(a.year.as_deref(), Some("2"));
        assert_eq!(b.year.as_deref(), Some("Junior"));
    }

    #[test]
    fn gpa_accepts_numeric_string() {
        let p: StudentProfile = serde_json::from_str(r#"{"gpa": "3.25"}"#).unwrap();
        assert_eq!(p.gpa, Some(3.25));
        let q: StudentProfile = serde_json::from_str(r#"{"gpa": "n/a"}"#).unwrap();
        assert_eq!(q.gpa, None);
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&ChatMessage::assistant("hi")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }
}
