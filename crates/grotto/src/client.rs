use std::collections::VecDeque;
use std::io;

use grottoproto::envelope::KIND_NOTICE;
use grottoproto::{
    Codec, CodecError, Command, Envelope, EnvelopeReader, EnvelopeWriter, ErrorCode, ErrorReply,
    Notice, ProtoError,
};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("connect: {0}")]
    Connect(#[source] io::Error),
    #[error(transparent)]
    Proto(#[from] ProtoError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("{code}: {message}")]
    Remote { code: ErrorCode, message: String },
    #[error("server closed the connection")]
    Closed,
    #[error("expected a {want:?} reply, got {got:?}")]
    UnexpectedKind { want: String, got: String },
}

impl ClientError {
    /// The server's error code, if the server refused the request.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            ClientError::Remote { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// A connection to a shard, one request in flight at a time.
///
/// Notices that arrive while waiting for a reply are queued and handed out
/// by [`Client::next_notice`].
pub struct Client<S, C> {
    reader: EnvelopeReader<ReadHalf<S>>,
    writer: EnvelopeWriter<WriteHalf<S>>,
    codec: C,
    notices: VecDeque<Notice>,
}

impl<C: Codec> Client<TcpStream, C> {
    pub async fn connect(addr: impl ToSocketAddrs, codec: C) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await.map_err(ClientError::Connect)?;
        stream.set_nodelay(true).map_err(ClientError::Connect)?;
        Ok(Self::new(stream, codec))
    }
}

impl<S, C> Client<S, C>
where
    S: AsyncRead + AsyncWrite + Unpin,
    C: Codec,
{
    pub fn new(stream: S, codec: C) -> Self {
        let (rd, wr) = tokio::io::split(stream);
        Self {
            reader: EnvelopeReader::new(rd),
            writer: EnvelopeWriter::new(wr),
            codec,
            notices: VecDeque::new(),
        }
    }

    /// Send `cmd` and wait for the server's populated copy of it.
    pub async fn request<T: Command>(&mut self, cmd: T) -> Result<T, ClientError> {
        let request = cmd.into_request();
        let kind = request.kind();
        let body = request.encode_body(&self.codec)?;
        self.writer
            .write_envelope(&Envelope::new(kind.as_str(), body))
            .await?;

        loop {
            let env = self.read().await?;
            if env.is_notice() {
                let n = self.codec.decode(&env.body)?;
                self.notices.push_back(n);
                continue;
            }
            if env.is_error() {
                let reply: ErrorReply = self.codec.decode(&env.body)?;
                return Err(ClientError::Remote {
                    code: reply.code,
                    message: reply.message,
                });
            }
            if env.kind != kind.as_str() {
                return Err(ClientError::UnexpectedKind {
                    want: kind.to_string(),
                    got: env.kind,
                });
            }
            let reply = kind.decode(&self.codec, &env.body)?;
            return T::from_request(reply).map_err(|r| ClientError::UnexpectedKind {
                want: kind.to_string(),
                got: r.kind().to_string(),
            });
        }
    }

    /// A queued notice, or the next one off the wire.
    pub async fn next_notice(&mut self) -> Result<Notice, ClientError> {
        if let Some(n) = self.notices.pop_front() {
            return Ok(n);
        }
        let env = self.read().await?;
        if !env.is_notice() {
            return Err(ClientError::UnexpectedKind {
                want: KIND_NOTICE.to_string(),
                got: env.kind,
            });
        }
        Ok(self.codec.decode(&env.body)?)
    }

    async fn read(&mut self) -> Result<Envelope, ClientError> {
        self.reader.read_envelope().await?.ok_or(ClientError::Closed)
    }
}
