use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::ProtoError;
use crate::frame::{FrameReader, FrameWriter};

/// Response kind carrying an [`crate::ErrorReply`] body.
pub const KIND_ERROR: &str = "error";
/// Push kind carrying a [`crate::Notice`] body.
pub const KIND_NOTICE: &str = "notice";

pub const MAX_KIND_LEN: usize = u8::MAX as usize;

/// One self-describing message: a kind tag plus an opaque body.
///
/// Encoding (inside one frame):
/// - kind_len: 1 byte
/// - kind: kind_len bytes (utf-8, non-empty)
/// - body: remaining bytes (codec specific)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub kind: String,
    pub body: Bytes,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            kind: kind.into(),
            body: body.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == KIND_ERROR
    }

    pub fn is_notice(&self) -> bool {
        self.kind == KIND_NOTICE
    }
}

/// Parse a frame payload into an envelope. The body is a slice of `p`.
pub fn parse_envelope(p: Bytes) -> Result<Envelope, ProtoError> {
    if p.is_empty() {
        return Err(ProtoError::TooShort { need: 1, got: 0 });
    }
    let kind_len = p[0] as usize;
    if kind_len == 0 {
        return Err(ProtoError::Malformed("empty kind"));
    }
    if p.len() < 1 + kind_len {
        return Err(ProtoError::TooShort {
            need: 1 + kind_len,
            got: p.len(),
        });
    }
    let kind = std::str::from_utf8(&p[1..1 + kind_len])
        .map_err(|_| ProtoError::Malformed("kind is not utf-8"))?
        .to_string();
    Ok(Envelope {
        kind,
        body: p.slice(1 + kind_len..),
    })
}

#[derive(Debug)]
pub struct EnvelopeReader<R> {
    frames: FrameReader<R>,
}

impl<R> EnvelopeReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            frames: FrameReader::new(inner),
        }
    }

    pub fn max_frame_len(self, max: usize) -> Self {
        Self {
            frames: self.frames.max_frame_len(max),
        }
    }
}

impl<R: AsyncRead + Unpin> EnvelopeReader<R> {
    /// Read the next envelope; `Ok(None)` on clean end of stream.
    pub async fn read_envelope(&mut self) -> Result<Option<Envelope>, ProtoError> {
        match self.frames.read_frame().await? {
            Some(p) => parse_envelope(p).map(Some),
            None => Ok(None),
        }
    }
}

#[derive(Debug)]
pub struct EnvelopeWriter<W> {
    frames: FrameWriter<W>,
}

impl<W> EnvelopeWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            frames: FrameWriter::new(inner),
        }
    }
}

impl<W: AsyncWrite + Unpin> EnvelopeWriter<W> {
    /// Write and flush one envelope.
    pub async fn write_envelope(&mut self, env: &Envelope) -> Result<(), ProtoError> {
        let kind = env.kind.as_bytes();
        if kind.is_empty() {
            return Err(ProtoError::Malformed("empty kind"));
        }
        let kind_len: u8 = kind
            .len()
            .try_into()
            .map_err(|_| ProtoError::Malformed("kind longer than 255 bytes"))?;
        self.frames
            .write_frame_parts(&[&[kind_len], kind, &env.body])
            .await?;
        self.frames.flush().await
    }
}
