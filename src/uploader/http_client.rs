use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use reqwest::header::CONTENT_LENGTH;
use reqwest::{multipart, Body, Client, RequestBuilder};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::encoder::{EncodedRequest, FormField, Payload, CONTENT_TYPE, OCTET_STREAM};
use crate::errors::{UploadError, UploadResult};
use crate::types::UploadMethod;

/// Size of the pieces a body is streamed in; one progress event per piece.
const STREAM_PIECE_BYTES: usize = 64 * 1024;

/// Byte counters reported while a request body is being sent.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TransferProgress {
    pub loaded: u64,
    /// Zero when the length is unknown
    pub total: u64,
    /// Bytes per second, if the transport measures it
    pub rate: Option<f64>,
    /// Seconds left, if the transport estimates it
    pub estimated: Option<f64>,
}

pub type ProgressFn = Arc<dyn Fn(TransferProgress) + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub struct TransferResponse {
    pub status: u16,
    pub body: String,
}

impl TransferResponse {
    pub fn json(&self) -> UploadResult<serde_json::Value> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// Sends one encoded request and reports upload progress as the body goes out.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        url: &str,
        method: UploadMethod,
        request: EncodedRequest,
        progress: ProgressFn,
    ) -> UploadResult<TransferResponse>;
}

/// reqwest-backed transport. No timeout is imposed beyond the client's defaults.
#[derive(Debug, Clone, Default)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpClient {
    async fn send(
        &self,
        url: &str,
        method: UploadMethod,
        request: EncodedRequest,
        progress: ProgressFn,
    ) -> UploadResult<TransferResponse> {
        let EncodedRequest { payload, headers } = request;
        let is_multipart = matches!(payload, Payload::Multipart(_));

        let mut builder = self.client.request(method.as_reqwest(), url);
        for (name, value) in &headers {
            // reqwest writes the multipart content type itself, boundary included
            if is_multipart && name.eq_ignore_ascii_case(CONTENT_TYPE) {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder = match payload {
            Payload::Multipart(fields) => builder.multipart(build_form(fields, progress)?),
            Payload::Binary(data) => streamed_body(builder, data, progress),
            Payload::Json(value) => {
                let data = Bytes::from(serde_json::to_vec(&value)?);
                streamed_body(builder, data, progress)
            }
        };

        log::debug!("{} {} ({} headers)", method, url, headers.len());
        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        log::debug!(
            "Upload response {} (first 300 chars): {}",
            status,
            body.chars().take(300).collect::<String>()
        );

        if status.is_success() {
            Ok(TransferResponse {
                status: status.as_u16(),
                body,
            })
        } else {
            Err(UploadError::HttpStatus {
                status: status.as_u16(),
                body,
            })
        }
    }
}

fn streamed_body(builder: RequestBuilder, data: Bytes, progress: ProgressFn) -> RequestBuilder {
    let len = data.len() as u64;
    let counter = ProgressCounter::new(len, progress);
    builder
        .header(CONTENT_LENGTH, len.to_string())
        .body(counter.body(data))
}

fn build_form(fields: Vec<FormField>, progress: ProgressFn) -> UploadResult<multipart::Form> {
    let total: u64 = fields
        .iter()
        .map(|f| match f {
            FormField::File { data, .. } => data.len() as u64,
            FormField::Text { .. } => 0,
        })
        .sum();
    let counter = ProgressCounter::new(total, progress);

    let mut form = multipart::Form::new();
    for field in fields {
        form = match field {
            FormField::Text { name, value } => form.text(name, value),
            FormField::File {
                name,
                file_name,
                mime,
                data,
            } => {
                let len = data.len() as u64;
                let part = multipart::Part::stream_with_length(counter.body(data), len)
                    .file_name(file_name)
                    .mime_str(part_mime(&mime))?;
                form.part(name, part)
            }
        };
    }

    Ok(form)
}

/// MIME type for a file part. Values reqwest cannot parse go out as octet-stream.
fn part_mime(mime: &str) -> &str {
    if mime.parse::<mime_guess::Mime>().is_ok() {
        mime
    } else {
        log::warn!("Unparseable MIME type {:?}, sending part as {}", mime, OCTET_STREAM);
        OCTET_STREAM
    }
}

/// Counts bytes handed to the connection across one or more bodies of a request.
#[derive(Clone)]
struct ProgressCounter {
    loaded: Arc<AtomicU64>,
    total: u64,
    progress: ProgressFn,
}

impl ProgressCounter {
    fn new(total: u64, progress: ProgressFn) -> Self {
        Self {
            loaded: Arc::new(AtomicU64::new(0)),
            total,
            progress,
        }
    }

    fn body(&self, data: Bytes) -> Body {
        Body::wrap_stream(self.stream(data))
    }

    fn stream(
        &self,
        data: Bytes,
    ) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + Sync + 'static {
        let counter = self.clone();
        futures::stream::iter(split_pieces(data).into_iter().map(move |piece| {
            let len = piece.len() as u64;
            let loaded = counter.loaded.fetch_add(len, Ordering::SeqCst) + len;
            (counter.progress)(TransferProgress {
                loaded,
                total: counter.total,
                rate: None,
                estimated: None,
            });
            Ok(piece)
        }))
    }
}

fn split_pieces(data: Bytes) -> Vec<Bytes> {
    (0..data.len())
        .step_by(STREAM_PIECE_BYTES)
        .map(|start| data.slice(start..(start + STREAM_PIECE_BYTES).min(data.len())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_counter_reports_every_piece() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let progress: ProgressFn = Arc::new(move |p: TransferProgress| {
            sink.lock().unwrap().push((p.loaded, p.total));
        });

        let first = Bytes::from(vec![7u8; STREAM_PIECE_BYTES + 10]);
        let second = Bytes::from_static(b"tail");
        let total = (first.len() + second.len()) as u64;
        let counter = ProgressCounter::new(total, progress);

        let pieces: Vec<Bytes> = counter.stream(first).map(|p| p.unwrap()).collect().await;
        assert_eq!(pieces.len(), 2);
        let tail: Vec<Bytes> = counter.stream(second).map(|p| p.unwrap()).collect().await;
        assert_eq!(tail.len(), 1);

        let limit = STREAM_PIECE_BYTES as u64;
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(limit, total), (limit + 10, total), (total, total)]
        );
    }

    #[test]
    fn test_empty_body_has_no_pieces() {
        assert!(split_pieces(Bytes::new()).is_empty());
        assert_eq!(split_pieces(Bytes::from_static(b"abc")).len(), 1);
    }

    #[test]
    fn test_malformed_mime_falls_back_to_octet_stream() {
        assert_eq!(part_mime("image/png"), "image/png");
        assert_eq!(part_mime("not a mime"), OCTET_STREAM);

        let progress: ProgressFn = Arc::new(|_: TransferProgress| {});
        let fields = vec![FormField::File {
            name: "file".to_string(),
            file_name: "odd.bin".to_string(),
            mime: "not a mime".to_string(),
            data: Bytes::from_static(b"data"),
        }];
        assert!(build_form(fields, progress).is_ok());
    }

    #[test]
    fn test_response_json() {
        let response = TransferResponse {
            status: 200,
            body: r#"{"ok":true}"#.to_string(),
        };
        assert_eq!(response.json().unwrap()["ok"], true);
    }
}
