use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use serde_json::{json, Value};

use crate::errors::UploadResult;
use crate::file::SourceFile;
use crate::types::UploadEncoding;

pub const CONTENT_TYPE: &str = "Content-Type";
pub const MULTIPART_FORM_DATA: &str = "multipart/form-data";
pub const OCTET_STREAM: &str = "application/octet-stream";
pub const APPLICATION_JSON: &str = "application/json";

#[derive(Debug, Clone, PartialEq)]
pub enum FormField {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        mime: String,
        data: Bytes,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Form fields; the transport assigns the boundary.
    Multipart(Vec<FormField>),
    Binary(Bytes),
    Json(Value),
}

/// A request body plus the headers that describe it.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedRequest {
    pub payload: Payload,
    pub headers: Vec<(String, String)>,
}

impl EncodedRequest {
    pub fn new(payload: Payload) -> Self {
        Self {
            payload,
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(CONTENT_TYPE)
    }
}

/// Encode `files` into one request body.
///
/// `raw` only carries a single file; with more than one it falls back to multipart.
pub async fn encode(
    files: &[SourceFile],
    encoding: UploadEncoding,
    field_name: &str,
) -> UploadResult<EncodedRequest> {
    match encoding {
        UploadEncoding::Raw if files.len() == 1 => encode_raw(&files[0]).await,
        UploadEncoding::Raw => {
            log::debug!(
                "raw encoding with {} files, sending as multipart instead",
                files.len()
            );
            encode_multipart(files, field_name).await
        }
        UploadEncoding::Multipart => encode_multipart(files, field_name).await,
        UploadEncoding::Base64 => encode_base64(files, field_name).await,
    }
}

async fn encode_multipart(files: &[SourceFile], field_name: &str) -> UploadResult<EncodedRequest> {
    let mut fields = Vec::with_capacity(files.len());
    for file in files {
        fields.push(FormField::File {
            name: field_name.to_string(),
            file_name: file.name().to_string(),
            mime: mime_or_default(file.mime()).to_string(),
            data: file.read().await?,
        });
    }

    Ok(EncodedRequest::new(Payload::Multipart(fields)).with_header(CONTENT_TYPE, MULTIPART_FORM_DATA))
}

async fn encode_raw(file: &SourceFile) -> UploadResult<EncodedRequest> {
    let data = file.read().await?;
    Ok(EncodedRequest::new(Payload::Binary(data)).with_header(CONTENT_TYPE, mime_or_default(file.mime())))
}

async fn encode_base64(files: &[SourceFile], field_name: &str) -> UploadResult<EncodedRequest> {
    let mut entries = Vec::with_capacity(files.len());
    for file in files {
        let data = file.read().await?;
        entries.push(json!({
            "name": file.name(),
            "type": file.mime(),
            "size": file.size(),
            "content": BASE64.encode(&data),
        }));
    }

    let mut body = serde_json::Map::new();
    body.insert(field_name.to_string(), Value::Array(entries));

    Ok(EncodedRequest::new(Payload::Json(Value::Object(body))).with_header(CONTENT_TYPE, APPLICATION_JSON))
}

pub fn mime_or_default(mime: &str) -> &str {
    if mime.is_empty() {
        OCTET_STREAM
    } else {
        mime
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::UploadError;

    fn sample_files() -> Vec<SourceFile> {
        vec![
            SourceFile::from_bytes("a.png", "image/png", vec![1u8, 2, 3]),
            SourceFile::from_bytes("b.bin", "", vec![4u8]),
        ]
    }

    #[tokio::test]
    async fn test_multipart_puts_every_file_under_field_name() {
        let request = encode(&sample_files(), UploadEncoding::Multipart, "upload")
            .await
            .unwrap();

        assert_eq!(request.content_type(), Some(MULTIPART_FORM_DATA));
        let Payload::Multipart(fields) = request.payload else {
            panic!("expected multipart payload");
        };
        assert_eq!(fields.len(), 2);
        for field in &fields {
            match field {
                FormField::File { name, .. } => assert_eq!(name, "upload"),
                FormField::Text { .. } => panic!("no text fields expected"),
            }
        }
        match &fields[1] {
            FormField::File { mime, .. } => assert_eq!(mime, OCTET_STREAM),
            FormField::Text { .. } => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_raw_single_file_uses_its_mime() {
        let files = &sample_files()[..1];
        let request = encode(files, UploadEncoding::Raw, "file").await.unwrap();

        assert_eq!(request.content_type(), Some("image/png"));
        assert_eq!(request.payload, Payload::Binary(Bytes::from_static(&[1, 2, 3])));
    }

    #[tokio::test]
    async fn test_raw_without_mime_defaults_to_octet_stream() {
        let files = &sample_files()[1..];
        let request = encode(files, UploadEncoding::Raw, "file").await.unwrap();
        assert_eq!(request.content_type(), Some(OCTET_STREAM));
    }

    // Guards the documented fallback: raw with several files is sent as multipart.
    #[tokio::test]
    async fn test_raw_with_two_files_falls_back_to_multipart() {
        let raw = encode(&sample_files(), UploadEncoding::Raw, "file").await.unwrap();
        let multipart = encode(&sample_files(), UploadEncoding::Multipart, "file")
            .await
            .unwrap();

        assert_eq!(raw, multipart);
        assert_eq!(raw.content_type(), Some(MULTIPART_FORM_DATA));
    }

    #[tokio::test]
    async fn test_base64_json_shape() {
        let request = encode(&sample_files(), UploadEncoding::Base64, "docs")
            .await
            .unwrap();

        assert_eq!(request.content_type(), Some(APPLICATION_JSON));
        let Payload::Json(body) = request.payload else {
            panic!("expected json payload");
        };
        assert_eq!(
            body,
            json!({
                "docs": [
                    { "name": "a.png", "type": "image/png", "size": 3, "content": "AQID" },
                    { "name": "b.bin", "type": "", "size": 1, "content": "BA==" }
                ]
            })
        );
    }

    #[tokio::test]
    async fn test_base64_fails_when_a_file_cannot_be_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vanishing.txt");
        std::fs::write(&path, b"soon gone").unwrap();
        let file = SourceFile::from_path(&path).await.unwrap();
        std::fs::remove_file(&path).unwrap();

        let files = vec![sample_files().remove(0), file];
        match encode(&files, UploadEncoding::Base64, "file").await {
            Err(UploadError::FileRead { name, .. }) => assert_eq!(name, "vanishing.txt"),
            other => panic!("expected read error, got {:?}", other),
        }
    }
}
