//! Requests a shard executes on behalf of a character.
//!
//! Each request struct carries its inputs plus result fields that the shard
//! fills in while handling it; the populated struct is what goes back to the
//! client. Result fields default when absent on the wire.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::codec::{Codec, CodecError};
use crate::types::{CharacterId, Direction, ItemView, Location, NoticeSink, RoomView};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Join {
    pub name: String,
    #[serde(default)]
    pub bot: bool,
    /// Set when done.
    #[serde(default)]
    pub ident: CharacterId,
    #[serde(default)]
    pub location: Option<Location>,
    /// Attached by the connection handler, never sent over the wire.
    #[serde(skip)]
    pub sink: Option<NoticeSink>,
}

impl Join {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn bot(mut self) -> Self {
        self.bot = true;
        self
    }

    pub fn with_sink(mut self, sink: NoticeSink) -> Self {
        self.sink = Some(sink);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leave {
    #[serde(default)]
    pub ident: CharacterId,
    /// Set when done.
    #[serde(default)]
    pub name: String,
}

impl Leave {
    pub fn new(ident: CharacterId) -> Self {
        Self {
            ident,
            name: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Move {
    #[serde(default)]
    pub ident: CharacterId,
    pub direction: Direction,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub room: Option<RoomView>,
}

impl Move {
    pub fn new(ident: CharacterId, direction: Direction) -> Self {
        Self {
            ident,
            direction,
            location: None,
            room: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Say {
    #[serde(default)]
    pub ident: CharacterId,
    pub text: String,
    /// How many characters were sent the line.
    #[serde(default)]
    pub heard: usize,
}

impl Say {
    pub fn new(ident: CharacterId, text: impl Into<String>) -> Self {
        Self {
            ident,
            text: text.into(),
            heard: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Look {
    #[serde(default)]
    pub ident: CharacterId,
    #[serde(default)]
    pub room: Option<RoomView>,
    #[serde(default)]
    pub items: Vec<ItemView>,
    #[serde(default)]
    pub characters: Vec<String>,
}

impl Look {
    pub fn new(ident: CharacterId) -> Self {
        Self {
            ident,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Examine {
    #[serde(default)]
    pub ident: CharacterId,
    pub target: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl Examine {
    pub fn new(ident: CharacterId, target: impl Into<String>) -> Self {
        Self {
            ident,
            target: target.into(),
            description: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pickup {
    #[serde(default)]
    pub ident: CharacterId,
    pub item: String,
    #[serde(default)]
    pub picked: Option<ItemView>,
}

impl Pickup {
    pub fn new(ident: CharacterId, item: impl Into<String>) -> Self {
        Self {
            ident,
            item: item.into(),
            picked: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub ident: CharacterId,
    #[serde(default)]
    pub items: Vec<ItemView>,
}

impl Inventory {
    pub fn new(ident: CharacterId) -> Self {
        Self {
            ident,
            items: Vec::new(),
        }
    }
}

/// Ends the game loop. Never registered for remote clients.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stop {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Join,
    Leave,
    Move,
    Say,
    Look,
    Examine,
    Pickup,
    Inventory,
    Stop,
}

impl RequestKind {
    pub const ALL: [RequestKind; 9] = [
        RequestKind::Join,
        RequestKind::Leave,
        RequestKind::Move,
        RequestKind::Say,
        RequestKind::Look,
        RequestKind::Examine,
        RequestKind::Pickup,
        RequestKind::Inventory,
        RequestKind::Stop,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RequestKind::Join => "join",
            RequestKind::Leave => "leave",
            RequestKind::Move => "move",
            RequestKind::Say => "say",
            RequestKind::Look => "look",
            RequestKind::Examine => "examine",
            RequestKind::Pickup => "pickup",
            RequestKind::Inventory => "inventory",
            RequestKind::Stop => "stop",
        }
    }

    /// Decode an envelope body into the request of this kind.
    pub fn decode<C: Codec>(self, codec: &C, body: &[u8]) -> Result<Request, CodecError> {
        Ok(match self {
            RequestKind::Join => Request::Join(codec.decode(body)?),
            RequestKind::Leave => Request::Leave(codec.decode(body)?),
            RequestKind::Move => Request::Move(codec.decode(body)?),
            RequestKind::Say => Request::Say(codec.decode(body)?),
            RequestKind::Look => Request::Look(codec.decode(body)?),
            RequestKind::Examine => Request::Examine(codec.decode(body)?),
            RequestKind::Pickup => Request::Pickup(codec.decode(body)?),
            RequestKind::Inventory => Request::Inventory(codec.decode(body)?),
            RequestKind::Stop => Request::Stop(codec.decode(body)?),
        })
    }
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub enum Request {
    Join(Join),
    Leave(Leave),
    Move(Move),
    Say(Say),
    Look(Look),
    Examine(Examine),
    Pickup(Pickup),
    Inventory(Inventory),
    Stop(Stop),
}

impl Request {
    pub fn kind(&self) -> RequestKind {
        match self {
            Request::Join(_) => RequestKind::Join,
            Request::Leave(_) => RequestKind::Leave,
            Request::Move(_) => RequestKind::Move,
            Request::Say(_) => RequestKind::Say,
            Request::Look(_) => RequestKind::Look,
            Request::Examine(_) => RequestKind::Examine,
            Request::Pickup(_) => RequestKind::Pickup,
            Request::Inventory(_) => RequestKind::Inventory,
            Request::Stop(_) => RequestKind::Stop,
        }
    }

    /// The character a request acts as, if it acts as one.
    pub fn ident(&self) -> Option<CharacterId> {
        match self {
            Request::Join(_) | Request::Stop(_) => None,
            Request::Leave(r) => Some(r.ident),
            Request::Move(r) => Some(r.ident),
            Request::Say(r) => Some(r.ident),
            Request::Look(r) => Some(r.ident),
            Request::Examine(r) => Some(r.ident),
            Request::Pickup(r) => Some(r.ident),
            Request::Inventory(r) => Some(r.ident),
        }
    }

    /// Overwrite the acting character. No-op for `Join` and `Stop`.
    pub fn set_ident(&mut self, ident: CharacterId) {
        match self {
            Request::Join(_) | Request::Stop(_) => {}
            Request::Leave(r) => r.ident = ident,
            Request::Move(r) => r.ident = ident,
            Request::Say(r) => r.ident = ident,
            Request::Look(r) => r.ident = ident,
            Request::Examine(r) => r.ident = ident,
            Request::Pickup(r) => r.ident = ident,
            Request::Inventory(r) => r.ident = ident,
        }
    }

    pub fn encode_body<C: Codec>(&self, codec: &C) -> Result<Bytes, CodecError> {
        match self {
            Request::Join(r) => codec.encode(r),
            Request::Leave(r) => codec.encode(r),
            Request::Move(r) => codec.encode(r),
            Request::Say(r) => codec.encode(r),
            Request::Look(r) => codec.encode(r),
            Request::Examine(r) => codec.encode(r),
            Request::Pickup(r) => codec.encode(r),
            Request::Inventory(r) => codec.encode(r),
            Request::Stop(r) => codec.encode(r),
        }
    }
}

/// A typed request that can travel through the untyped [`Request`] enum.
pub trait Command: Sized + Send + 'static {
    fn into_request(self) -> Request;

    /// Recover the typed request; hands the enum back on a kind mismatch.
    fn from_request(req: Request) -> Result<Self, Request>;
}

impl Command for Request {
    fn into_request(self) -> Request {
        self
    }

    fn from_request(req: Request) -> Result<Self, Request> {
        Ok(req)
    }
}

macro_rules! command {
    ($($ty:ident),* $(,)?) => {
        $(
            impl Command for $ty {
                fn into_request(self) -> Request {
                    Request::$ty(self)
                }

                fn from_request(req: Request) -> Result<Self, Request> {
                    match req {
                        Request::$ty(r) => Ok(r),
                        other => Err(other),
                    }
                }
            }

            impl From<$ty> for Request {
                fn from(r: $ty) -> Self {
                    Request::$ty(r)
                }
            }
        )*
    };
}

command!(Join, Leave, Move, Say, Look, Examine, Pickup, Inventory, Stop);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;

    #[test]
    fn result_fields_are_optional_on_the_wire() {
        let r = RequestKind::Move
            .decode(&JsonCodec, br#"{"direction":"e"}"#)
            .unwrap();
        let Request::Move(m) = r else {
            panic!("decoded {r:?}");
        };
        assert_eq!(m.direction, Direction::E);
        assert!(m.ident.is_unset());
        assert!(m.location.is_none());
    }

    #[test]
    fn join_sink_never_goes_over_the_wire() {
        let (tx, _rx) = tokio::sync::mpsc::channel(1);
        let j = Join::new("Ann").with_sink(tx);
        let body = Request::Join(j).encode_body(&JsonCodec).unwrap();
        let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(v["name"], "Ann");
        assert!(v.get("sink").is_none());
    }

    #[test]
    fn set_ident_skips_join_and_stop() {
        let mut j = Request::Join(Join::new("Ann"));
        j.set_ident(CharacterId(9));
        assert_eq!(j.ident(), None);

        let mut s = Request::Say(Say::new(CharacterId(1), "hi"));
        s.set_ident(CharacterId(9));
        assert_eq!(s.ident(), Some(CharacterId(9)));
    }

    #[test]
    fn typed_round_trip_through_the_enum() {
        let req = Look::new(CharacterId(3)).into_request();
        assert_eq!(req.kind(), RequestKind::Look);
        assert!(Say::from_request(req.clone()).is_err());
        assert_eq!(Look::from_request(req).unwrap().ident, CharacterId(3));
    }

    #[test]
    fn kind_names_are_unique() {
        let mut names: Vec<_> = RequestKind::ALL.iter().map(|k| k.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), RequestKind::ALL.len());
    }
}
