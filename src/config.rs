use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{UploadError, UploadResult};
use crate::labels::DEFAULT_LANGUAGE;
use crate::types::{UploadEncoding, UploadMethod};
use crate::uploader::chunking::chunk_bytes;
use crate::validation::ValidationRules;

pub const DEFAULT_FIELD_NAME: &str = "file";
pub const DEFAULT_CHUNK_SIZE_KB: f64 = 512.0;

/// Everything the dropzone needs, with defaults for every field.
///
/// Deserialised from camelCase JSON. Call [`DropzoneConfig::normalized`] (or
/// [`validate_config`]) before use; [`crate::Dropzone::new`] does both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DropzoneConfig {
    /// Accepted MIME types. `None` or empty accepts everything.
    pub accept: Option<Vec<String>>,
    pub multiple: bool,
    /// `None` means unbounded.
    pub max_files: Option<usize>,
    /// `None` means unbounded.
    pub max_size_mb: Option<f64>,
    pub upload_url: Option<String>,
    pub upload_method: UploadMethod,
    pub upload_one_by_one: bool,
    pub upload_field_name: String,
    pub upload_encoding: UploadEncoding,
    pub upload_chunk: bool,
    /// Chunk size in KB. Fractions are allowed.
    pub chunk_size: f64,
    /// Only files larger than this are chunked. `None` chunks every file.
    #[serde(rename = "chunkThresholdMB")]
    pub chunk_threshold_mb: Option<f64>,
    pub lang: String,
    pub locales_dir: Option<PathBuf>,
}

impl Default for DropzoneConfig {
    fn default() -> Self {
        Self {
            accept: None,
            multiple: true,
            max_files: None,
            max_size_mb: None,
            upload_url: None,
            upload_method: UploadMethod::Post,
            upload_one_by_one: false,
            upload_field_name: DEFAULT_FIELD_NAME.to_string(),
            upload_encoding: UploadEncoding::Multipart,
            upload_chunk: false,
            chunk_size: DEFAULT_CHUNK_SIZE_KB,
            chunk_threshold_mb: None,
            lang: DEFAULT_LANGUAGE.to_string(),
            locales_dir: None,
        }
    }
}

impl DropzoneConfig {
    /// Validate and fold equivalent spellings into one form.
    pub fn normalized(mut self) -> UploadResult<Self> {
        if let Some(accept) = self.accept.take() {
            let accept: Vec<String> = accept
                .into_iter()
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect();
            self.accept = if accept.is_empty() { None } else { Some(accept) };
        }

        self.upload_url = self
            .upload_url
            .take()
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());

        self.upload_field_name = self.upload_field_name.trim().to_string();
        if self.chunk_threshold_mb == Some(0.0) {
            self.chunk_threshold_mb = None;
        }

        validate_config(&self)?;
        Ok(self)
    }

    pub fn validation_rules(&self) -> ValidationRules {
        ValidationRules {
            accept: self.accept.clone(),
            max_size_mb: self.max_size_mb,
        }
    }

    pub fn with_upload_url(mut self, url: impl Into<String>) -> Self {
        self.upload_url = Some(url.into());
        self
    }
}

pub fn validate_config(config: &DropzoneConfig) -> UploadResult<()> {
    if config.max_files == Some(0) {
        return Err(UploadError::invalid_config("maxFiles", "Must be at least 1"));
    }

    if let Some(max) = config.max_size_mb {
        if !(max.is_finite() && max > 0.0) {
            return Err(UploadError::invalid_config(
                "maxSizeMb",
                "Must be a positive number",
            ));
        }
    }

    if let Some(url) = &config.upload_url {
        match reqwest::Url::parse(url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            Ok(_) => {
                return Err(UploadError::invalid_config(
                    "uploadUrl",
                    "Must be an http or https address",
                ))
            }
            Err(e) => {
                return Err(UploadError::invalid_config(
                    "uploadUrl",
                    &format!("Not a valid URL: {}", e),
                ))
            }
        }
    }

    if config.upload_field_name.is_empty() {
        return Err(UploadError::invalid_config(
            "uploadFieldName",
            "Cannot be empty",
        ));
    }

    if config.upload_chunk && chunk_bytes(config.chunk_size).is_none() {
        return Err(UploadError::invalid_config(
            "chunkSize",
            "Must be a positive size in KB when chunking is enabled",
        ));
    }

    if let Some(threshold) = config.chunk_threshold_mb {
        if !(threshold.is_finite() && threshold > 0.0) {
            return Err(UploadError::invalid_config(
                "chunkThresholdMB",
                "Must be a positive number",
            ));
        }
    }

    if config.lang.trim().is_empty() {
        return Err(UploadError::invalid_config("lang", "Cannot be empty"));
    }

    Ok(())
}

pub fn default_config_path() -> UploadResult<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| UploadError::Config("Could not find config directory".to_string()))?
        .join("uploadium");

    fs::create_dir_all(&config_dir)?;
    Ok(config_dir.join("config.json"))
}

/// Load a config file, writing the defaults there first if it does not exist.
pub fn load_config(path: &Path) -> UploadResult<DropzoneConfig> {
    if !path.exists() {
        let default_config = DropzoneConfig::default();
        save_config(path, &default_config)?;
        return Ok(default_config);
    }

    let config_str = fs::read_to_string(path)?;
    let config: DropzoneConfig = serde_json::from_str(&config_str).map_err(|e| {
        UploadError::Config(format!("Failed to parse {}: {}", path.display(), e))
    })?;

    config.normalized()
}

pub fn save_config(path: &Path, config: &DropzoneConfig) -> UploadResult<()> {
    validate_config(config)?;

    if path.exists() {
        let backup_path = path.with_extension("json.bak");
        if let Err(e) = fs::copy(path, &backup_path) {
            log::warn!("Failed to create config backup: {}", e);
        }
    } else if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let config_str = serde_json::to_string_pretty(config)?;
    fs::write(path, config_str)?;

    log::info!("Configuration saved to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_json() {
        let config: DropzoneConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, DropzoneConfig::default());
        assert!(config.multiple);
        assert_eq!(config.upload_field_name, "file");
        assert_eq!(config.upload_encoding, UploadEncoding::Multipart);
        assert_eq!(config.chunk_size, 512.0);
        assert_eq!(config.max_files, None);
    }

    #[test]
    fn test_camel_case_keys() {
        let config: DropzoneConfig = serde_json::from_str(
            r#"{
                "accept": ["image/png"],
                "maxFiles": 3,
                "uploadUrl": "https://example.com/upload",
                "uploadOneByOne": true,
                "uploadEncoding": "base64",
                "uploadChunk": true,
                "chunkSize": 64,
                "chunkThresholdMB": 5
            }"#,
        )
        .unwrap();

        assert_eq!(config.max_files, Some(3));
        assert!(config.upload_one_by_one);
        assert_eq!(config.upload_encoding, UploadEncoding::Base64);
        assert_eq!(config.chunk_threshold_mb, Some(5.0));
    }

    #[test]
    fn test_unknown_encoding_is_rejected() {
        let result = serde_json::from_str::<DropzoneConfig>(r#"{ "uploadEncoding": "gzip" }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_normalize_folds_empty_values() {
        let config = DropzoneConfig {
            accept: Some(vec![" ".to_string()]),
            upload_url: Some("  ".to_string()),
            chunk_threshold_mb: Some(0.0),
            ..DropzoneConfig::default()
        }
        .normalized()
        .unwrap();

        assert_eq!(config.accept, None);
        assert_eq!(config.upload_url, None);
        assert_eq!(config.chunk_threshold_mb, None);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let zero_files = DropzoneConfig {
            max_files: Some(0),
            ..DropzoneConfig::default()
        };
        assert!(validate_config(&zero_files).is_err());

        let bad_url = DropzoneConfig::default().with_upload_url("ftp://example.com");
        assert!(bad_url.normalized().is_err());

        let zero_chunk = DropzoneConfig {
            upload_chunk: true,
            chunk_size: 0.0,
            ..DropzoneConfig::default()
        };
        match validate_config(&zero_chunk) {
            Err(UploadError::InvalidConfig { field, .. }) => assert_eq!(field, "chunkSize"),
            other => panic!("expected invalid config, got {:?}", other),
        }
    }

    #[test]
    fn test_oversized_chunk_size_is_rejected() {
        let huge = DropzoneConfig {
            upload_chunk: true,
            chunk_size: (1u64 << 54) as f64,
            ..DropzoneConfig::default()
        }
        .with_upload_url("http://localhost/upload");

        match huge.normalized() {
            Err(UploadError::InvalidConfig { field, .. }) => assert_eq!(field, "chunkSize"),
            other => panic!("expected invalid config, got {:?}", other),
        }
    }

    #[test]
    fn test_fractional_chunk_size() {
        let config: DropzoneConfig =
            serde_json::from_str(r#"{ "uploadChunk": true, "chunkSize": 0.5 }"#).unwrap();
        let config = config.normalized().unwrap();
        assert_eq!(config.chunk_size, 0.5);
        assert_eq!(chunk_bytes(config.chunk_size), Some(512));
    }

    #[test]
    fn test_load_creates_default_then_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let created = load_config(&path).unwrap();
        assert!(path.exists());
        assert_eq!(created, DropzoneConfig::default());

        let custom = DropzoneConfig {
            max_files: Some(2),
            ..DropzoneConfig::default()
        }
        .with_upload_url("http://localhost:8080/upload");
        save_config(&path, &custom).unwrap();
        assert!(path.with_extension("json.bak").exists());

        assert_eq!(load_config(&path).unwrap(), custom);
    }
}
