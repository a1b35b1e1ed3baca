//! Status requests and their collected responses.

use crate::core::{derive_key, now, AccountId, FlightKey, RequestKey, Timestamp};
use crate::registry::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Derive the key of a status request.
pub fn request_key(index: u8, airline: &AccountId, designator: &str, departure: i64) -> RequestKey {
    derive_key(&[
        &[index],
        airline.as_str().as_bytes(),
        designator.as_bytes(),
        &departure.to_be_bytes(),
    ])
}

/// Request lifecycle. `Closed` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestState {
    Open,
    Closed,
}

/// A request for a flight's status, answered by reporters holding its index.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusRequest {
    pub key: RequestKey,
    /// Index reporters must hold to answer
    pub index: u8,
    pub flight: FlightKey,
    pub airline: AccountId,
    pub designator: String,
    pub departure: i64,
    /// Party that asked for the status
    pub requester: AccountId,
    pub state: RequestState,
    /// Reporters per reported status, in arrival order
    responses: BTreeMap<StatusCode, Vec<AccountId>>,
    /// Status accepted at quorum
    pub resolved: Option<StatusCode>,
    pub opened_at: Timestamp,
    pub closed_at: Option<Timestamp>,
}

impl StatusRequest {
    pub fn open(
        index: u8,
        flight: FlightKey,
        airline: &AccountId,
        designator: &str,
        departure: i64,
        requester: &AccountId,
    ) -> Self {
        Self {
            key: request_key(index, airline, designator, departure),
            index,
            flight,
            airline: airline.clone(),
            designator: designator.to_string(),
            departure,
            requester: requester.clone(),
            state: RequestState::Open,
            responses: BTreeMap::new(),
            resolved: None,
            opened_at: now(),
            closed_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state == RequestState::Open
    }

    /// Whether `reporter` already answered this request.
    pub fn has_responded(&self, reporter: &AccountId) -> bool {
        self.responses.values().any(|list| list.contains(reporter))
    }

    /// Append a response. Returns the number of reporters agreeing on `status`.
    pub fn record(&mut self, reporter: &AccountId, status: StatusCode) -> usize {
        let list = self.responses.entry(status).or_default();
        list.push(reporter.clone());
        list.len()
    }

    /// Close the request with the accepted status.
    pub fn close(&mut self, status: StatusCode) {
        self.state = RequestState::Closed;
        self.resolved = Some(status);
        self.closed_at = Some(now());
    }

    /// Reporters that reported `status`, in arrival order.
    pub fn responses_for(&self, status: StatusCode) -> &[AccountId] {
        self.responses.get(&status).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total responses across all statuses.
    pub fn response_count(&self) -> usize {
        self.responses.values().map(Vec::len).sum()
    }
}
