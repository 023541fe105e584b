//! Marketplace domain logic: search, availability and status lifecycles.

pub mod geo;
mod lifecycle;
mod search;
mod slots;

pub use lifecycle::*;
pub use search::*;
pub use slots::*;

use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum MarketError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("not authorized: {0}")]
    NotAuthorized(String),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("requested time range overlaps an existing appointment")]
    SlotUnavailable,

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Storage(StoreError),
}

impl From<StoreError> for MarketError {
    fn from(err: StoreError) -> Self {
        match err {
            // Unique violations are rule violations, not storage failures
            StoreError::Conflict(message) => Self::InvalidTransition(message),
            other => Self::Storage(other),
        }
    }
}

pub type MarketResult<T> = Result<T, MarketError>;
