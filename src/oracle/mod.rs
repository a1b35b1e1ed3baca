//! Oracle Consensus
//!
//! Resolves flight status from independent reporters:
//! - Randomized index assignment with a wrapping nonce
//! - Status requests keyed by index and flight
//! - Quorum acceptance, firing once per request

pub mod engine;
pub mod entropy;
pub mod request;

pub use engine::{
    OpenedRequest, OracleConsensusEngine, OracleSettings, PendingResponse, Reporter, Resolution,
    ResponseOutcome,
};
pub use entropy::{BlockWindow, EntropySource, IndexGenerator};
pub use request::{request_key, RequestState, StatusRequest};
