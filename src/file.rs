use bytes::Bytes;
use std::fmt;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::errors::{UploadError, UploadResult};

/// Opaque identifier assigned to a file when it enters the set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(String);

impl FileId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FileId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone)]
enum FileContent {
    Memory(Bytes),
    Disk(PathBuf),
}

/// A candidate file: name, MIME type, size and where its bytes live.
#[derive(Debug, Clone)]
pub struct SourceFile {
    name: String,
    mime: String,
    size: u64,
    content: FileContent,
}

impl SourceFile {
    pub fn from_bytes(name: impl Into<String>, mime: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            name: name.into(),
            mime: mime.into(),
            size: data.len() as u64,
            content: FileContent::Memory(data),
        }
    }

    /// Describe a file on disk. The bytes are read lazily when the file is encoded.
    pub async fn from_path(path: impl AsRef<Path>) -> UploadResult<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(UploadError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a file", path.display()),
            )));
        }

        let name = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        let mime = mime_guess::from_path(path)
            .first()
            .map(|m| m.essence_str().to_string())
            .unwrap_or_default();

        Ok(Self {
            name,
            mime,
            size: metadata.len(),
            content: FileContent::Disk(path.to_path_buf()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// MIME type as reported at intake; may be empty when unknown.
    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn size_mb(&self) -> f64 {
        self.size as f64 / 1024.0 / 1024.0
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.content {
            FileContent::Disk(path) => Some(path),
            FileContent::Memory(_) => None,
        }
    }

    pub async fn read(&self) -> UploadResult<Bytes> {
        match &self.content {
            FileContent::Memory(data) => Ok(data.clone()),
            FileContent::Disk(path) => tokio::fs::read(path)
                .await
                .map(Bytes::from)
                .map_err(|e| UploadError::file_read(&self.name, e)),
        }
    }

    /// Read `len` bytes starting at `offset`, clamped to the end of the file.
    pub async fn read_range(&self, offset: u64, len: u64) -> UploadResult<Bytes> {
        match &self.content {
            FileContent::Memory(data) => {
                let start = (offset as usize).min(data.len());
                let end = (offset.saturating_add(len) as usize).min(data.len());
                Ok(data.slice(start..end))
            }
            FileContent::Disk(path) => {
                let read = async {
                    let mut file = tokio::fs::File::open(path).await?;
                    file.seek(SeekFrom::Start(offset)).await?;
                    let mut buf = Vec::with_capacity(len as usize);
                    file.take(len).read_to_end(&mut buf).await?;
                    Ok::<_, std::io::Error>(Bytes::from(buf))
                };
                read.await.map_err(|e| UploadError::file_read(&self.name, e))
            }
        }
    }
}

/// A file admitted into the set, together with its identifier.
#[derive(Debug, Clone)]
pub struct ManagedFile {
    pub id: FileId,
    pub file: SourceFile,
}

impl ManagedFile {
    pub fn new(file: SourceFile) -> Self {
        Self {
            id: FileId::generate(),
            file,
        }
    }
}
