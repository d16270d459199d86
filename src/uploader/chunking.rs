use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use serde_json::json;

use super::encoder::{
    EncodedRequest, FormField, Payload, APPLICATION_JSON, CONTENT_TYPE, OCTET_STREAM,
};
use crate::types::UploadEncoding;

pub const HEADER_FILE_NAME: &str = "X-File-Name";
pub const HEADER_CHUNK_INDEX: &str = "X-Chunk-Index";
pub const HEADER_TOTAL_CHUNKS: &str = "X-Total-Chunks";
pub const HEADER_UPLOAD_ID: &str = "X-Upload-Id";

/// Chunk length in bytes for a size given in KB.
///
/// `None` unless the size is finite and comes to at least one byte that fits in a `u64`.
pub fn chunk_bytes(chunk_size_kb: f64) -> Option<u64> {
    let bytes = (chunk_size_kb * 1024.0).round();
    if bytes.is_finite() && bytes >= 1.0 && bytes < u64::MAX as f64 {
        Some(bytes as u64)
    } else {
        None
    }
}

/// Chunk length to use for a file of `file_size` bytes, or `None` to send it whole.
pub fn chunking_for(
    enabled: bool,
    chunk_size_kb: f64,
    threshold_mb: Option<f64>,
    file_size: u64,
) -> Option<u64> {
    if !enabled {
        return None;
    }
    let bytes = chunk_bytes(chunk_size_kb)?;

    match threshold_mb {
        Some(threshold) if threshold > 0.0 && file_size as f64 <= threshold * 1024.0 * 1024.0 => {
            None
        }
        _ => Some(bytes),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
    pub index: u64,
    pub offset: u64,
    pub len: u64,
}

/// How one file is cut into chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    pub file_size: u64,
    pub chunk_bytes: u64,
    pub total_chunks: u64,
}

impl ChunkPlan {
    pub fn new(file_size: u64, chunk_bytes: u64) -> Self {
        let chunk_bytes = chunk_bytes.max(1);
        // An empty file still goes out as a single empty chunk
        let total_chunks = file_size.div_ceil(chunk_bytes).max(1);
        Self {
            file_size,
            chunk_bytes,
            total_chunks,
        }
    }

    pub fn chunks(&self) -> impl Iterator<Item = ChunkRange> + '_ {
        (0..self.total_chunks).map(move |index| {
            let offset = index * self.chunk_bytes;
            ChunkRange {
                index,
                offset,
                len: self.chunk_bytes.min(self.file_size.saturating_sub(offset)),
            }
        })
    }
}

/// Describes one chunk on the wire.
#[derive(Debug, Clone, Copy)]
pub struct ChunkMeta<'a> {
    pub field_name: &'a str,
    pub file_name: &'a str,
    pub index: u64,
    pub total_chunks: u64,
    pub upload_id: &'a str,
}

pub fn build_chunk_request(
    encoding: UploadEncoding,
    meta: ChunkMeta<'_>,
    chunk: Bytes,
) -> EncodedRequest {
    match encoding {
        UploadEncoding::Multipart => {
            let text = |name: &str, value: String| FormField::Text {
                name: name.to_string(),
                value,
            };
            let fields = vec![
                FormField::File {
                    name: meta.field_name.to_string(),
                    file_name: meta.file_name.to_string(),
                    mime: OCTET_STREAM.to_string(),
                    data: chunk,
                },
                text("fileName", meta.file_name.to_string()),
                text("chunkIndex", meta.index.to_string()),
                text("totalChunks", meta.total_chunks.to_string()),
                text("uploadId", meta.upload_id.to_string()),
            ];
            EncodedRequest::new(Payload::Multipart(fields))
        }
        UploadEncoding::Raw => EncodedRequest::new(Payload::Binary(chunk))
            .with_header(CONTENT_TYPE, OCTET_STREAM)
            .with_header(HEADER_FILE_NAME, meta.file_name)
            .with_header(HEADER_CHUNK_INDEX, meta.index.to_string())
            .with_header(HEADER_TOTAL_CHUNKS, meta.total_chunks.to_string())
            .with_header(HEADER_UPLOAD_ID, meta.upload_id),
        UploadEncoding::Base64 => {
            let body = json!({
                "fileName": meta.file_name,
                "chunkIndex": meta.index,
                "totalChunks": meta.total_chunks,
                "uploadId": meta.upload_id,
                "data": BASE64.encode(&chunk),
            });
            EncodedRequest::new(Payload::Json(body)).with_header(CONTENT_TYPE, APPLICATION_JSON)
        }
    }
}
