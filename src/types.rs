use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::UploadError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    #[default]
    Idle,
    Uploading,
    Success,
    Error,
}

impl UploadStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadStatus::Success | UploadStatus::Error)
    }
}

/// Live transfer figures for one file. Only present while the file is uploading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadMetrics {
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_kbps: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_seconds: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadEncoding {
    #[default]
    Multipart,
    Base64,
    Raw,
}

impl UploadEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadEncoding::Multipart => "multipart",
            UploadEncoding::Base64 => "base64",
            UploadEncoding::Raw => "raw",
        }
    }
}

impl fmt::Display for UploadEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UploadEncoding {
    type Err = UploadError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "multipart" => Ok(UploadEncoding::Multipart),
            "base64" => Ok(UploadEncoding::Base64),
            "raw" => Ok(UploadEncoding::Raw),
            _ => Err(UploadError::unsupported_encoding(value)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UploadMethod {
    #[default]
    Post,
    Put,
    Patch,
}

impl UploadMethod {
    pub fn as_reqwest(&self) -> reqwest::Method {
        match self {
            UploadMethod::Post => reqwest::Method::POST,
            UploadMethod::Put => reqwest::Method::PUT,
            UploadMethod::Patch => reqwest::Method::PATCH,
        }
    }
}

impl fmt::Display for UploadMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UploadMethod::Post => "POST",
            UploadMethod::Put => "PUT",
            UploadMethod::Patch => "PATCH",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_from_str() {
        assert_eq!("RAW".parse::<UploadEncoding>().unwrap(), UploadEncoding::Raw);
        assert_eq!(
            " base64 ".parse::<UploadEncoding>().unwrap(),
            UploadEncoding::Base64
        );

        match "gzip".parse::<UploadEncoding>() {
            Err(UploadError::UnsupportedEncoding(value)) => assert_eq!(value, "gzip"),
            other => panic!("expected unsupported encoding, got {:?}", other),
        }
    }

    #[test]
    fn test_metrics_serialization_omits_missing_fields() {
        let metrics = UploadMetrics {
            progress: 40,
            rate_kbps: None,
            remaining_seconds: None,
        };
        let json = serde_json::to_value(metrics).unwrap();
        assert_eq!(json, serde_json::json!({ "progress": 40 }));
    }

    #[test]
    fn test_method_serde_names() {
        let method: UploadMethod = serde_json::from_str("\"PUT\"").unwrap();
        assert_eq!(method, UploadMethod::Put);
        assert_eq!(method.to_string(), "PUT");
    }
}
