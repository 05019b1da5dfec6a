//! Centralized error type for the miditape umbrella crate.
//!
//! Wraps all subsystem errors so `?` propagates naturally across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] miditape_core::Error),

    #[error("SMF: {0}")]
    Smf(#[from] miditape_smf::Error),

    #[error(transparent)]
    Source(#[from] miditape_source::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
