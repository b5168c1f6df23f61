//! Outgoing payloads accepted by [`super::LogicalSocket::send`].

use std::fmt;
use std::future::Future;
use std::path::PathBuf;

use bytes::Bytes;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;

use crate::error::BlobError;

/// Data that can be sent over a logical socket.
///
/// Text and binary data are forwarded synchronously. A [`Blob`] has to be
/// materialized first, which happens asynchronously.
#[derive(Debug)]
pub enum SendData {
    /// A text frame.
    Text(String),
    /// A binary frame. Buffers and borrowed views both end up here.
    Binary(Bytes),
    /// Lazily materialized binary data.
    Blob(Blob),
}

impl From<String> for SendData {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for SendData {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<Bytes> for SendData {
    fn from(data: Bytes) -> Self {
        Self::Binary(data)
    }
}

impl From<Vec<u8>> for SendData {
    fn from(data: Vec<u8>) -> Self {
        Self::Binary(Bytes::from(data))
    }
}

impl From<&[u8]> for SendData {
    fn from(view: &[u8]) -> Self {
        Self::Binary(Bytes::copy_from_slice(view))
    }
}

impl From<Blob> for SendData {
    fn from(blob: Blob) -> Self {
        Self::Blob(blob)
    }
}

/// Binary data whose bytes are produced asynchronously.
pub struct Blob {
    source: BoxFuture<'static, Result<Bytes, BlobError>>,
    label: &'static str,
}

impl Blob {
    /// Creates a blob from any future yielding its bytes.
    pub fn new<F>(source: F) -> Self
    where
        F: Future<Output = Result<Bytes, BlobError>> + Send + 'static,
    {
        Self {
            source: source.boxed(),
            label: "future",
        }
    }

    /// Creates a blob over bytes already in memory.
    #[must_use]
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            source: async move { Ok(data) }.boxed(),
            label: "memory",
        }
    }

    /// Creates a blob backed by a file, read when the blob is materialized.
    #[must_use]
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            source: async move {
                let contents = tokio::fs::read(&path).await?;
                Ok(Bytes::from(contents))
            }
            .boxed(),
            label: "file",
        }
    }

    /// Materializes the blob into one contiguous buffer.
    ///
    /// # Errors
    ///
    /// Returns the [`BlobError`] produced by the blob's source.
    pub async fn bytes(self) -> Result<Bytes, BlobError> {
        self.source.await
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blob").field("source", &self.label).finish()
    }
}
