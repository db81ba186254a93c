use bytes::Buf;
use bytes::Bytes;
use bytes::BytesMut;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;

use crate::ProtoError;

/// Length prefix size in bytes.
pub const PREFIX_LEN: usize = 4;

pub const DEFAULT_MAX_FRAME_LEN: usize = 1024 * 1024;

#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
    buf: BytesMut,
    max_frame_len: usize,
}

impl<R> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(4 * 1024),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    pub fn max_frame_len(mut self, max: usize) -> Self {
        self.max_frame_len = max.max(1);
        self
    }
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Read the next frame payload.
    ///
    /// `Ok(None)` means the peer closed the stream on a frame boundary.
    /// Cancel safe: partially read frames stay buffered for the next call.
    pub async fn read_frame(&mut self) -> Result<Option<Bytes>, ProtoError> {
        loop {
            if let Some(payload) = self.split_frame()? {
                return Ok(Some(payload));
            }

            let n = self.inner.read_buf(&mut self.buf).await?;
            if n == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(ProtoError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "eof inside frame",
                )));
            }
        }
    }

    fn split_frame(&mut self) -> Result<Option<Bytes>, ProtoError> {
        if self.buf.len() < PREFIX_LEN {
            return Ok(None);
        }
        let len = u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]) as usize;
        if len > self.max_frame_len {
            return Err(ProtoError::FrameTooLarge {
                len,
                max: self.max_frame_len,
            });
        }
        if self.buf.len() < PREFIX_LEN + len {
            self.buf.reserve(PREFIX_LEN + len - self.buf.len());
            return Ok(None);
        }
        self.buf.advance(PREFIX_LEN);
        Ok(Some(self.buf.split_to(len).freeze()))
    }
}

#[derive(Debug)]
pub struct FrameWriter<W> {
    inner: W,
}

impl<W> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Write one frame whose payload is the concatenation of `parts`.
    ///
    /// The parts are written back to back after the prefix, so an envelope
    /// header and its body never need to be copied into one buffer.
    pub async fn write_frame_parts(&mut self, parts: &[&[u8]]) -> Result<(), ProtoError> {
        let len: usize = parts.iter().map(|p| p.len()).sum();
        let len_u32: u32 = len.try_into().map_err(|_| ProtoError::FrameTooLarge {
            len,
            max: u32::MAX as usize,
        })?;

        self.inner.write_all(&len_u32.to_be_bytes()).await?;
        for p in parts.iter().filter(|p| !p.is_empty()) {
            self.inner.write_all(p).await?;
        }
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<(), ProtoError> {
        self.inner.flush().await?;
        Ok(())
    }
}
