use grottoproto::ErrorCode;

use crate::world::WorldError;

/// Why a submitted request failed. Travels back through the task completion.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("{what} {id:?} not found")]
    NotFound { what: &'static str, id: String },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("unknown request kind {0:?}")]
    UnknownRequest(String),
    #[error("game stopped")]
    Stopped,
}

impl GameError {
    pub fn not_found(what: &'static str, id: impl ToString) -> Self {
        GameError::NotFound {
            what,
            id: id.to_string(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            GameError::NotFound { .. } => ErrorCode::NotFound,
            GameError::InvalidArgument(_) => ErrorCode::InvalidArgument,
            GameError::UnknownRequest(_) => ErrorCode::UnknownRequest,
            GameError::Stopped => ErrorCode::Stopped,
        }
    }
}

impl From<WorldError> for GameError {
    fn from(e: WorldError) -> Self {
        match e {
            WorldError::UnknownArea(id) => GameError::NotFound { what: "area", id },
            WorldError::UnknownRoom { room, .. } => GameError::NotFound { what: "room", id: room },
            other => GameError::InvalidArgument(other.to_string()),
        }
    }
}
