//! Error types for SkyCover.

use crate::core::types::{AccountId, Amount, Hash256};
use thiserror::Error;

/// Result type alias for SkyCover operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in SkyCover operations.
///
/// Every variant is a precondition failure: the operation that returned it
/// left no partial state behind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // Access errors
    #[error("Contract is currently not operational")]
    NotOperational,

    #[error("Caller {0} is not authorized")]
    Unauthorized(AccountId),

    #[error("Airline {0} is not registered or not funded")]
    NotFoundOrUnauthorized(AccountId),

    // Registry errors
    #[error("Unknown airline: {0}")]
    UnknownAirline(AccountId),

    #[error("Unknown flight: {0}")]
    UnknownFlight(Hash256),

    #[error("Already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Airline {endorser} already voted for {candidate}")]
    DuplicateVote {
        candidate: AccountId,
        endorser: AccountId,
    },

    // Insurance errors
    #[error("Invalid amount {amount}: must be in (0, {cap}]")]
    InvalidAmount { amount: Amount, cap: Amount },

    #[error("Flight {0} is not delayed by the airline")]
    FlightNotDelayedByAirline(Hash256),

    #[error("Flight {0} already has a resolved status")]
    FlightAlreadyResolved(Hash256),

    #[error("No active policy for {0}")]
    NoActivePolicy(AccountId),

    #[error("Passenger {0} already holds an active policy on this flight")]
    PolicyAlreadyActive(AccountId),

    #[error("Insufficient balance for {0}")]
    InsufficientBalance(AccountId),

    #[error("Insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: Amount, available: Amount },

    #[error("Amount overflow")]
    Overflow,

    // Oracle errors
    #[error("Index {index} is not assigned to reporter {reporter}")]
    IndexMismatch { reporter: AccountId, index: u8 },

    #[error("Status request {0} is closed or unknown")]
    RequestClosedOrUnknown(Hash256),

    #[error("Status request {0} already exists")]
    DuplicateRequest(Hash256),

    #[error("Reporter {0} already responded to this request")]
    DuplicateResponse(AccountId),

    #[error("Invalid status code: {0}")]
    InvalidStatusCode(u8),

    #[error("Insufficient fee: need {needed}, paid {paid}")]
    InsufficientFee { needed: Amount, paid: Amount },

    #[error("Entropy unavailable for lookback {0}")]
    EntropyUnavailable(u32),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Logging initialization failed: {0}")]
    Logging(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
