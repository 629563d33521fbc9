//! Error types surfaced by the player.

use std::fmt;

use crate::backend::BackendError;

pub type PlayerResult<T = ()> = Result<T, PlayerError>;

/// Errors a caller of [`Player`](crate::player::Player) can observe.
///
/// Out-of-range parameter input is not an error: it is clamped. Timer
/// callbacks that fire for a session which is gone are discarded silently.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerError {
    /// The audio backend could not be acquired; nothing was started.
    ResourceUnavailable(String),
    /// Invalid configuration (file, melody table).
    Config(String),
}

impl fmt::Display for PlayerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResourceUnavailable(why) => write!(f, "could not start: audio backend unavailable ({why})"),
            Self::Config(why) => write!(f, "invalid configuration: {why}"),
        }
    }
}

impl std::error::Error for PlayerError {}

impl From<BackendError> for PlayerError {
    fn from(e: BackendError) -> Self {
        PlayerError::ResourceUnavailable(e.0)
    }
}

impl From<toml::de::Error> for PlayerError {
    fn from(e: toml::de::Error) -> Self {
        PlayerError::Config(e.to_string())
    }
}

impl From<std::io::Error> for PlayerError {
    fn from(e: std::io::Error) -> Self {
        PlayerError::Config(e.to_string())
    }
}
