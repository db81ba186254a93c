use std::fmt;

use serde::{Deserialize, Serialize};

/// Character identity assigned by the shard. Zero is never allocated.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct CharacterId(pub u64);

impl CharacterId {
    pub const UNSET: CharacterId = CharacterId(0);

    pub fn is_unset(self) -> bool {
        self == Self::UNSET
    }
}

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Serialized as the lowercase short name; deserialized through
/// [`Direction::parse`], so `"north"` and `"NE"` are accepted too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Direction {
    N,
    NE,
    E,
    SE,
    S,
    SW,
    W,
    NW,
}

impl Direction {
    pub const ALL: [Direction; 8] = [
        Direction::N,
        Direction::NE,
        Direction::E,
        Direction::SE,
        Direction::S,
        Direction::SW,
        Direction::W,
        Direction::NW,
    ];

    pub const fn opposite(self) -> Direction {
        match self {
            Direction::N => Direction::S,
            Direction::NE => Direction::SW,
            Direction::E => Direction::W,
            Direction::SE => Direction::NW,
            Direction::S => Direction::N,
            Direction::SW => Direction::NE,
            Direction::W => Direction::E,
            Direction::NW => Direction::SE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::N => "N",
            Direction::NE => "NE",
            Direction::E => "E",
            Direction::SE => "SE",
            Direction::S => "S",
            Direction::SW => "SW",
            Direction::W => "W",
            Direction::NW => "NW",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Direction::N => "north",
            Direction::NE => "northeast",
            Direction::E => "east",
            Direction::SE => "southeast",
            Direction::S => "south",
            Direction::SW => "southwest",
            Direction::W => "west",
            Direction::NW => "northwest",
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "n" | "north" => Some(Direction::N),
            "ne" | "northeast" | "north-east" => Some(Direction::NE),
            "e" | "east" => Some(Direction::E),
            "se" | "southeast" | "south-east" => Some(Direction::SE),
            "s" | "south" => Some(Direction::S),
            "sw" | "southwest" | "south-west" => Some(Direction::SW),
            "w" | "west" => Some(Direction::W),
            "nw" | "northwest" | "north-west" => Some(Direction::NW),
            _ => None,
        }
    }
}

impl TryFrom<String> for Direction {
    type Error = String;

    fn try_from(token: String) -> Result<Self, Self::Error> {
        Direction::parse(&token).ok_or_else(|| format!("unknown direction {token:?}"))
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub area: String,
    pub room: String,
}

impl Location {
    pub fn new(area: impl Into<String>, room: impl Into<String>) -> Self {
        Self {
            area: area.into(),
            room: room.into(),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.area, self.room)
    }
}

/// What a client is told about a room.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomView {
    pub id: String,
    pub short: String,
    pub long: String,
    pub exits: Vec<Direction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemView {
    pub name: String,
    pub count: u32,
}

/// Pushed to connected characters outside of any request/response pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notice {
    Said { from: String, text: String },
    Arrived { name: String, from: Option<Direction> },
    Departed { name: String, toward: Direction },
    Joined { name: String },
    Left { name: String },
}

/// Where the shard delivers notices for one connected character.
pub type NoticeSink = tokio::sync::mpsc::Sender<Notice>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotFound,
    InvalidArgument,
    UnknownRequest,
    Stopped,
    BadRequest,
    /// The shard failed after the request may already have been applied.
    Internal,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::NotFound => "not_found",
            ErrorCode::InvalidArgument => "invalid_argument",
            ErrorCode::UnknownRequest => "unknown_request",
            ErrorCode::Stopped => "stopped",
            ErrorCode::BadRequest => "bad_request",
            ErrorCode::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of an `error` envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReply {
    /// Kind of the request that failed, as sent by the client.
    pub kind: String,
    pub code: ErrorCode,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opposite_is_an_involution() {
        for d in Direction::ALL {
            assert_eq!(d.opposite().opposite(), d);
            assert_ne!(d.opposite(), d);
        }
    }

    #[test]
    fn parse_accepts_short_and_long_names() {
        assert_eq!(Direction::parse("n"), Some(Direction::N));
        assert_eq!(Direction::parse(" North "), Some(Direction::N));
        assert_eq!(Direction::parse("south-west"), Some(Direction::SW));
        assert_eq!(Direction::parse("NE"), Some(Direction::NE));
        assert_eq!(Direction::parse("up"), None);
        for d in Direction::ALL {
            assert_eq!(Direction::parse(d.as_str()), Some(d));
            assert_eq!(Direction::parse(d.name()), Some(d));
        }
    }

    #[test]
    fn direction_decodes_any_parseable_name() {
        for (raw, want) in [
            (r#""n""#, Direction::N),
            (r#""north""#, Direction::N),
            (r#""N""#, Direction::N),
            (r#""South-West""#, Direction::SW),
            (r#""ne""#, Direction::NE),
        ] {
            let got: Direction = serde_json::from_str(raw).unwrap();
            assert_eq!(got, want, "{raw}");
        }
        assert!(serde_json::from_str::<Direction>(r#""up""#).is_err());
        assert_eq!(serde_json::to_string(&Direction::SW).unwrap(), r#""sw""#);
    }

    #[test]
    fn unset_id_is_zero() {
        assert!(CharacterId::default().is_unset());
        assert!(!CharacterId(1).is_unset());
        assert_eq!(CharacterId(7).to_string(), "#7");
    }
}
