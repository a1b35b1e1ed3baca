//! Airline admission by bootstrap or majority vote.
//!
//! Below the bootstrap size any participating airline admits a candidate on
//! its own. From then on a candidate needs endorsements from at least half of
//! the registered airlines, one vote per distinct endorser.

use crate::access::AccessController;
use crate::core::{now, AccountId, Amount, Error, Result, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

/// An airline known to the registry, registered or still collecting votes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Airline {
    /// Airline identity
    pub id: AccountId,
    /// Whether the airline has been admitted
    pub is_registered: bool,
    /// Votes received
    pub invitation_count: u32,
    /// Airlines that already voted for this one
    pub voted_by: BTreeSet<AccountId>,
    /// Funding deposited by the airline
    pub funding: Amount,
    /// Admission time
    pub registered_at: Option<Timestamp>,
}

impl Airline {
    fn candidate(id: AccountId) -> Self {
        Self {
            id,
            is_registered: false,
            invitation_count: 0,
            voted_by: BTreeSet::new(),
            funding: 0,
            registered_at: None,
        }
    }
}

/// Outcome of a registration call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Admission {
    /// Whether the candidate is now registered
    pub admitted: bool,
    /// Votes the candidate holds after this call
    pub votes: u32,
}

/// Registry of airlines.
#[derive(Clone, Debug)]
pub struct AirlineRegistry {
    airlines: HashMap<AccountId, Airline>,
    registered_count: u32,
    /// Membership size from which admission requires a majority vote
    bootstrap_size: u32,
}

impl AirlineRegistry {
    /// Create an empty registry.
    pub fn new(bootstrap_size: u32) -> Self {
        Self {
            airlines: HashMap::new(),
            registered_count: 0,
            bootstrap_size,
        }
    }

    /// Register the founding airline without an endorser.
    pub fn found(&mut self, founder: AccountId) -> Result<()> {
        if self.is_registered(&founder) {
            return Err(Error::AlreadyRegistered(founder.to_string()));
        }
        let mut airline = Airline::candidate(founder.clone());
        airline.is_registered = true;
        airline.invitation_count = 1;
        airline.registered_at = Some(now());
        self.airlines.insert(founder.clone(), airline);
        self.registered_count += 1;
        info!(airline = %founder, "founding airline registered");
        Ok(())
    }

    /// Register `candidate` on behalf of `endorser`, or record the endorser's vote.
    ///
    /// The endorser's own standing is checked by the caller.
    pub fn register(
        &mut self,
        access: &AccessController,
        caller: &AccountId,
        candidate: &AccountId,
        endorser: &AccountId,
    ) -> Result<Admission> {
        access.guard(caller)?;

        if self.is_registered(candidate) {
            return Err(Error::AlreadyRegistered(candidate.to_string()));
        }

        if self.registered_count < self.bootstrap_size {
            let airline = self
                .airlines
                .entry(candidate.clone())
                .or_insert_with(|| Airline::candidate(candidate.clone()));
            airline.is_registered = true;
            airline.invitation_count = 1;
            airline.voted_by.insert(endorser.clone());
            airline.registered_at = Some(now());
            self.registered_count += 1;

            info!(airline = %candidate, endorser = %endorser, "airline admitted during bootstrap");
            return Ok(Admission {
                admitted: true,
                votes: 1,
            });
        }

        if let Some(existing) = self.airlines.get(candidate) {
            if existing.voted_by.contains(endorser) {
                return Err(Error::DuplicateVote {
                    candidate: candidate.clone(),
                    endorser: endorser.clone(),
                });
            }
        }

        let registered_count = self.registered_count;
        let airline = self
            .airlines
            .entry(candidate.clone())
            .or_insert_with(|| Airline::candidate(candidate.clone()));
        airline.invitation_count += 1;
        airline.voted_by.insert(endorser.clone());
        let votes = airline.invitation_count;

        if Self::has_majority(votes, registered_count) {
            airline.is_registered = true;
            airline.registered_at = Some(now());
            self.registered_count += 1;
            info!(airline = %candidate, votes, registered_count, "airline admitted by majority vote");
            Ok(Admission {
                admitted: true,
                votes,
            })
        } else {
            debug!(airline = %candidate, endorser = %endorser, votes, registered_count, "airline vote recorded");
            Ok(Admission {
                admitted: false,
                votes,
            })
        }
    }

    /// Add `amount` to a registered airline's funding. Returns the new total.
    pub fn fund(
        &mut self,
        access: &AccessController,
        caller: &AccountId,
        airline: &AccountId,
        amount: Amount,
    ) -> Result<Amount> {
        access.guard(caller)?;

        let entry = self
            .airlines
            .get_mut(airline)
            .filter(|a| a.is_registered)
            .ok_or_else(|| Error::UnknownAirline(airline.clone()))?;
        let total = entry.funding.checked_add(amount).ok_or(Error::Overflow)?;
        entry.funding = total;

        info!(airline = %airline, amount, total, "airline funded");
        Ok(total)
    }

    /// Strict-majority rule used once the bootstrap size is reached.
    pub fn has_majority(votes: u32, registered_count: u32) -> bool {
        2 * u64::from(votes) >= u64::from(registered_count)
    }

    pub fn is_registered(&self, id: &AccountId) -> bool {
        self.airlines.get(id).map(|a| a.is_registered).unwrap_or(false)
    }

    /// Registered and funded with at least `min_funding`.
    pub fn is_participating(&self, id: &AccountId, min_funding: Amount) -> bool {
        self.airlines
            .get(id)
            .map(|a| a.is_registered && a.funding >= min_funding)
            .unwrap_or(false)
    }

    pub fn get(&self, id: &AccountId) -> Option<&Airline> {
        self.airlines.get(id)
    }

    pub fn registered_count(&self) -> u32 {
        self.registered_count
    }

    /// Votes a candidate currently holds.
    pub fn votes(&self, id: &AccountId) -> u32 {
        self.airlines.get(id).map(|a| a.invitation_count).unwrap_or(0)
    }
}
