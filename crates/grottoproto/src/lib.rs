//! `grottoproto`: the wire protocol spoken between grotto clients and shards.
//!
//! Every message is an envelope carried inside one length-prefixed frame:
//! - outer framing: `u32` big-endian byte length + payload
//! - payload: `kind_len: u8`, `kind` (utf-8), then the codec-encoded body
//!
//! The envelope layer never looks inside the body. Bodies are produced and
//! consumed by a pluggable [`codec::Codec`]; the shipped one is JSON.

pub mod codec;
pub mod envelope;
pub mod frame;
pub mod kinds;
pub mod request;
pub mod types;

pub use codec::{Codec, CodecError, JsonCodec};
pub use envelope::{Envelope, EnvelopeReader, EnvelopeWriter};
pub use kinds::KindRegistry;
pub use request::{Command, Request, RequestKind};
pub use types::{
    CharacterId, Direction, ErrorCode, ErrorReply, ItemView, Location, Notice, NoticeSink,
    RoomView,
};

#[derive(Debug, thiserror::Error)]
pub enum ProtoError {
    #[error("message too short: need {need}, got {got}")]
    TooShort { need: usize, got: usize },
    #[error("malformed message: {0}")]
    Malformed(&'static str),
    #[error("frame too large: {len} > {max}")]
    FrameTooLarge { len: usize, max: usize },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
