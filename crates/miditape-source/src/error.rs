//! Error types for MIDI sources.

use miditape_core::Beats;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SMF format error: {0}")]
    Format(miditape_smf::Error),

    #[error("Event at {attempted} precedes previous event at {previous}")]
    Order { previous: Beats, attempted: Beats },

    #[error("Invalid source state: {0}")]
    State(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Core(#[from] miditape_core::Error),

    #[error("Dispatch error: {0}")]
    Dispatch(String),
}

impl From<miditape_smf::Error> for Error {
    fn from(err: miditape_smf::Error) -> Self {
        match err {
            miditape_smf::Error::Io(io) => Error::Io(io),
            other => Error::Format(other),
        }
    }
}

impl Error {
    pub(crate) fn state(msg: impl Into<String>) -> Self {
        Error::State(msg.into())
    }

    #[inline]
    pub fn is_io(&self) -> bool {
        matches!(self, Error::Io(_))
    }

    #[inline]
    pub fn is_format(&self) -> bool {
        matches!(self, Error::Format(_))
    }

    #[inline]
    pub fn is_order(&self) -> bool {
        matches!(self, Error::Order { .. })
    }

    #[inline]
    pub fn is_state(&self) -> bool {
        matches!(self, Error::State(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
