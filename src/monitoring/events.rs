//! Marketplace notifications.
//!
//! Every state transition is appended to a bounded in-memory history and
//! broadcast to live subscribers (e.g. reporters filtering requests by index).

use crate::core::{now, AccountId, Amount, FlightKey, RequestKey, Timestamp};
use crate::registry::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::broadcast;

/// A notification emitted by the marketplace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MarketplaceEvent {
    /// A status request was opened for reporters holding `index`
    OracleRequest {
        index: u8,
        request: RequestKey,
        airline: AccountId,
        flight: String,
        departure: i64,
    },
    /// A reporter answered a status request
    OracleReport {
        reporter: AccountId,
        airline: AccountId,
        flight: String,
        departure: i64,
        status: StatusCode,
    },
    /// A status request reached quorum
    FlightStatusInfo {
        airline: AccountId,
        flight: String,
        departure: i64,
        status: StatusCode,
    },
    AirlineRegistered {
        airline: AccountId,
        votes: u32,
    },
    AirlineVoteRecorded {
        candidate: AccountId,
        endorser: AccountId,
        votes: u32,
    },
    AirlineFunded {
        airline: AccountId,
        amount: Amount,
        total: Amount,
    },
    FlightRegistered {
        key: FlightKey,
        airline: AccountId,
        flight: String,
        departure: i64,
    },
    PolicyPurchased {
        passenger: AccountId,
        flight: FlightKey,
        amount: Amount,
    },
    InsureeCredited {
        passenger: AccountId,
        flight: FlightKey,
        payout: Amount,
    },
    Withdrawal {
        passenger: AccountId,
        amount: Amount,
    },
    OperationalChanged {
        operational: bool,
    },
}

/// An event with its emission time and sequence number.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventRecord {
    pub sequence: u64,
    pub timestamp: Timestamp,
    pub event: MarketplaceEvent,
}

/// Bounded event history plus a broadcast channel for live subscribers.
///
/// The history keeps the newest `capacity` records; older ones are evicted.
#[derive(Debug)]
pub struct EventBus {
    history: VecDeque<EventRecord>,
    capacity: usize,
    next_sequence: u64,
    sender: broadcast::Sender<EventRecord>,
}

impl EventBus {
    /// Create a bus retaining, and buffering per subscriber, up to `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
            next_sequence: 0,
            sender,
        }
    }

    /// Record and broadcast an event.
    pub fn emit(&mut self, event: MarketplaceEvent) {
        let record = EventRecord {
            sequence: self.next_sequence,
            timestamp: now(),
            event,
        };
        self.next_sequence += 1;

        // No live subscribers is fine; the history keeps the record.
        let _ = self.sender.send(record.clone());
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(record);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.sender.subscribe()
    }

    /// Retained records, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &EventRecord> {
        self.history.iter()
    }

    /// Retained events emitted at or after `sequence`.
    pub fn since(&self, sequence: u64) -> impl Iterator<Item = &MarketplaceEvent> {
        self.history
            .iter()
            .filter(move |record| record.sequence >= sequence)
            .map(|record| &record.event)
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
