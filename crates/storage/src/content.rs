//! File content accepted by [`Driver::put_file`](crate::Driver::put_file).

use std::fmt;
use tokio::io::AsyncRead;

/// A lazy, finite, single-pass source of bytes.
///
/// Returned by [`Driver::get_file_stream`](crate::Driver::get_file_stream)
/// and accepted by [`Content::Stream`]. Once drained it cannot be rewound;
/// ask the driver for a new one.
pub type ByteReader = Box<dyn AsyncRead + Send + Unpin + 'static>;

/// Content to be written by [`Driver::put_file`](crate::Driver::put_file).
pub enum Content {
    Bytes(Vec<u8>),
    Text(String),
    /// Written as it is read; the write only completes once fully drained.
    Stream(ByteReader),
}
impl Content {
    pub fn stream(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self::Stream(Box::new(reader))
    }
}
impl fmt::Debug for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Self::Text(text) => f.debug_tuple("Text").field(&text.len()).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}
impl From<Vec<u8>> for Content {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}
impl From<&[u8]> for Content {
    fn from(bytes: &[u8]) -> Self {
        Self::Bytes(bytes.to_vec())
    }
}
impl<const N: usize> From<&[u8; N]> for Content {
    fn from(bytes: &[u8; N]) -> Self {
        Self::Bytes(bytes.to_vec())
    }
}
impl From<String> for Content {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}
impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}
impl From<ByteReader> for Content {
    fn from(reader: ByteReader) -> Self {
        Self::Stream(reader)
    }
}
