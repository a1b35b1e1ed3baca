//! Oracle quorum resolution.
//!
//! Reporters register for a fee and receive three distinct indices. A status
//! request is opened under one pseudo-random index; only reporters holding
//! that index may answer. Responses are grouped by reported status, and the
//! first status to gather `quorum` reporters closes the request. A closed
//! request never accepts another response, so resolution fires once.

use crate::access::AccessController;
use crate::core::{now, AccountId, Amount, Error, FlightKey, RequestKey, Result, Timestamp};
use crate::monitoring::{EventBus, MarketplaceEvent};
use crate::oracle::entropy::{EntropySource, IndexGenerator};
use crate::oracle::request::{request_key, StatusRequest};
use crate::registry::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// A registered status reporter.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Reporter {
    pub id: AccountId,
    /// Assigned indices, pairwise distinct
    pub indices: Vec<u8>,
    /// Fee paid at registration
    pub fee_paid: Amount,
    pub registered_at: Timestamp,
}

/// Oracle parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleSettings {
    /// Registration fee
    pub fee: Amount,
    /// Agreeing reporters needed to resolve
    pub quorum: usize,
    /// Indices are drawn from `[0, index_range)`
    pub index_range: u8,
    pub indices_per_reporter: usize,
    /// Largest nonce before wrapping
    pub nonce_wrap: u32,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            fee: 1,
            quorum: 3,
            index_range: 10,
            indices_per_reporter: 3,
            nonce_wrap: 250,
        }
    }
}

/// A status accepted by quorum.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub request: RequestKey,
    pub flight: FlightKey,
    pub airline: AccountId,
    pub designator: String,
    pub departure: i64,
    pub status: StatusCode,
    pub requester: AccountId,
}

/// Result of a submitted response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResponseOutcome {
    /// Response stored; `votes` reporters agree on the reported status so far
    Recorded { votes: usize },
    /// This response completed the quorum
    Resolved(Resolution),
}

/// A checked response waiting to be committed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingResponse {
    slot: usize,
    key: RequestKey,
    reporter: AccountId,
    airline: AccountId,
    designator: String,
    departure: i64,
    status: StatusCode,
    votes: usize,
    resolution: Option<Resolution>,
}

impl PendingResponse {
    /// Reporters agreeing on the reported status once committed.
    pub fn votes(&self) -> usize {
        self.votes
    }

    /// Resolution the commit will fire, if this response completes the quorum.
    pub fn resolution(&self) -> Option<&Resolution> {
        self.resolution.as_ref()
    }
}

/// An opened status request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenedRequest {
    pub index: u8,
    pub key: RequestKey,
}

/// Oracle consensus engine.
pub struct OracleConsensusEngine<E: EntropySource> {
    entropy: E,
    generator: IndexGenerator,
    reporters: HashMap<AccountId, Reporter>,
    /// Request arena
    requests: Vec<StatusRequest>,
    /// Request key -> arena slot
    by_key: HashMap<RequestKey, usize>,
    settings: OracleSettings,
}

impl<E: EntropySource> OracleConsensusEngine<E> {
    pub fn new(entropy: E, settings: OracleSettings) -> Self {
        Self {
            entropy,
            generator: IndexGenerator::new(settings.index_range, settings.nonce_wrap),
            reporters: HashMap::new(),
            requests: Vec::new(),
            by_key: HashMap::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &OracleSettings {
        &self.settings
    }

    /// Mutable access to the entropy source, e.g. to feed new blocks.
    pub fn entropy_mut(&mut self) -> &mut E {
        &mut self.entropy
    }

    /// Register a reporter that paid `paid`. Returns its indices.
    pub fn register_reporter(
        &mut self,
        access: &AccessController,
        caller: &AccountId,
        reporter: &AccountId,
        paid: Amount,
    ) -> Result<Vec<u8>> {
        access.guard(caller)?;

        if paid < self.settings.fee {
            return Err(Error::InsufficientFee {
                needed: self.settings.fee,
                paid,
            });
        }
        if self.reporters.contains_key(reporter) {
            return Err(Error::AlreadyRegistered(reporter.to_string()));
        }

        let indices = self.generator.distinct_indices(
            &self.entropy,
            reporter,
            self.settings.indices_per_reporter,
        )?;

        self.reporters.insert(
            reporter.clone(),
            Reporter {
                id: reporter.clone(),
                indices: indices.clone(),
                fee_paid: paid,
                registered_at: now(),
            },
        );

        info!(reporter = %reporter, ?indices, "reporter registered");
        Ok(indices)
    }

    /// Indices assigned to a registered reporter.
    pub fn indices(&self, reporter: &AccountId) -> Result<&[u8]> {
        self.reporters
            .get(reporter)
            .map(|r| r.indices.as_slice())
            .ok_or_else(|| Error::Unauthorized(reporter.clone()))
    }

    /// Open a status request for a registered flight.
    ///
    /// A drawn index whose request key is already taken is redrawn with the
    /// advanced nonce. Only when a full nonce cycle finds no free key does the
    /// call fail with `DuplicateRequest`, leaving the nonce untouched.
    #[allow(clippy::too_many_arguments)]
    pub fn request_status(
        &mut self,
        access: &AccessController,
        caller: &AccountId,
        events: &mut EventBus,
        requester: &AccountId,
        flight: FlightKey,
        airline: &AccountId,
        designator: &str,
        departure: i64,
    ) -> Result<OpenedRequest> {
        access.guard(caller)?;

        let mut draft = self.generator.clone();
        let mut draws = 0;
        let (index, key) = loop {
            let index = draft.next_index(&self.entropy, requester)?;
            let key = request_key(index, airline, designator, departure);
            if !self.by_key.contains_key(&key) {
                break (index, key);
            }
            // A full nonce cycle covers every draw this requester can make.
            if draws >= self.settings.nonce_wrap {
                return Err(Error::DuplicateRequest(key));
            }
            draws += 1;
        };
        self.generator = draft;

        let request = StatusRequest::open(index, flight, airline, designator, departure, requester);
        self.by_key.insert(key, self.requests.len());
        self.requests.push(request);

        info!(index, request = %key, airline = %airline, flight = designator, departure, "status request opened");
        events.emit(MarketplaceEvent::OracleRequest {
            index,
            request: key,
            airline: airline.clone(),
            flight: designator.to_string(),
            departure,
        });

        Ok(OpenedRequest { index, key })
    }

    /// Record a reporter's answer to an open request.
    #[allow(clippy::too_many_arguments)]
    pub fn submit_response(
        &mut self,
        access: &AccessController,
        caller: &AccountId,
        events: &mut EventBus,
        reporter: &AccountId,
        index: u8,
        airline: &AccountId,
        designator: &str,
        departure: i64,
        status: StatusCode,
    ) -> Result<ResponseOutcome> {
        let pending = self.check_response(
            access, caller, reporter, index, airline, designator, departure, status,
        )?;
        Ok(self.commit_response(events, pending))
    }

    /// Validate a response without recording it.
    ///
    /// The returned [`PendingResponse`] carries the resolution the response
    /// would trigger, so callers can prepare its effects before committing.
    #[allow(clippy::too_many_arguments)]
    pub fn check_response(
        &self,
        access: &AccessController,
        caller: &AccountId,
        reporter: &AccountId,
        index: u8,
        airline: &AccountId,
        designator: &str,
        departure: i64,
        status: StatusCode,
    ) -> Result<PendingResponse> {
        access.guard(caller)?;

        if !self.indices(reporter)?.contains(&index) {
            return Err(Error::IndexMismatch {
                reporter: reporter.clone(),
                index,
            });
        }
        if !status.is_resolved() {
            return Err(Error::InvalidStatusCode(status.code()));
        }

        let key = request_key(index, airline, designator, departure);
        let (slot, request) = self
            .by_key
            .get(&key)
            .and_then(|slot| self.requests.get(*slot).map(|r| (*slot, r)))
            .filter(|(_, r)| r.is_open())
            .ok_or(Error::RequestClosedOrUnknown(key))?;
        if request.has_responded(reporter) {
            return Err(Error::DuplicateResponse(reporter.clone()));
        }

        let votes = request.responses_for(status).len() + 1;
        let resolution = (votes >= self.settings.quorum).then(|| Resolution {
            request: key,
            flight: request.flight,
            airline: airline.clone(),
            designator: designator.to_string(),
            departure,
            status,
            requester: request.requester.clone(),
        });

        Ok(PendingResponse {
            slot,
            key,
            reporter: reporter.clone(),
            airline: airline.clone(),
            designator: designator.to_string(),
            departure,
            status,
            votes,
            resolution,
        })
    }

    /// Record a checked response, closing its request at quorum.
    pub fn commit_response(&mut self, events: &mut EventBus, pending: PendingResponse) -> ResponseOutcome {
        let PendingResponse {
            slot,
            key,
            reporter,
            airline,
            designator,
            departure,
            status,
            votes,
            resolution,
        } = pending;

        if let Some(request) = self.requests.get_mut(slot) {
            request.record(&reporter, status);
            if resolution.is_some() {
                request.close(status);
            }
        }

        debug!(reporter = %reporter, request = %key, status = %status, votes, "response recorded");
        events.emit(MarketplaceEvent::OracleReport {
            reporter,
            airline: airline.clone(),
            flight: designator.clone(),
            departure,
            status,
        });

        match resolution {
            None => ResponseOutcome::Recorded { votes },
            Some(resolution) => {
                info!(request = %key, flight = %designator, status = %status, votes, "status resolved by quorum");
                events.emit(MarketplaceEvent::FlightStatusInfo {
                    airline,
                    flight: designator,
                    departure,
                    status,
                });
                ResponseOutcome::Resolved(resolution)
            }
        }
    }

    pub fn request(&self, key: &RequestKey) -> Option<&StatusRequest> {
        self.by_key.get(key).and_then(|slot| self.requests.get(*slot))
    }

    /// Requests currently open, oldest first.
    pub fn open_requests(&self) -> impl Iterator<Item = &StatusRequest> {
        self.requests.iter().filter(|r| r.is_open())
    }

    pub fn reporter(&self, id: &AccountId) -> Option<&Reporter> {
        self.reporters.get(id)
    }

    pub fn reporter_count(&self) -> usize {
        self.reporters.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Hash256;
    use crate::oracle::entropy::BlockWindow;

    struct Fixture {
        access: AccessController,
        app: AccountId,
        events: EventBus,
        engine: OracleConsensusEngine<BlockWindow>,
        airline: AccountId,
    }

    fn fixture() -> Fixture {
        let owner = AccountId::from("owner");
        let app = AccountId::from("app");
        let mut access = AccessController::new(owner.clone());
        access.authorize(&owner, app.clone()).unwrap();
        Fixture {
            access,
            app,
            events: EventBus::default(),
            engine: OracleConsensusEngine::new(BlockWindow::seeded(11, 256), OracleSettings::default()),
            airline: AccountId::from("airline-0"),
        }
    }

    impl Fixture {
        fn register_reporters(&mut self, count: usize) -> Vec<AccountId> {
            (0..count)
                .map(|n| {
                    let id = AccountId::new(format!("reporter-{}", n));
                    self.engine
                        .register_reporter(&self.access, &self.app, &id, 1)
                        .unwrap();
                    id
                })
                .collect()
        }

        fn open(&mut self) -> OpenedRequest {
            self.engine
                .request_status(
                    &self.access,
                    &self.app,
                    &mut self.events,
                    &AccountId::from("alice"),
                    FlightKey::zero(),
                    &self.airline,
                    "ND1309",
                    1_700_000_000,
                )
                .unwrap()
        }

        fn respond(&mut self, reporter: &AccountId, index: u8, status: StatusCode) -> Result<ResponseOutcome> {
            self.engine.submit_response(
                &self.access,
                &self.app,
                &mut self.events,
                reporter,
                index,
                &self.airline,
                "ND1309",
                1_700_000_000,
                status,
            )
        }

        fn holders(&self, reporters: &[AccountId], index: u8) -> Vec<AccountId> {
            reporters
                .iter()
                .filter(|r| self.engine.indices(r).unwrap().contains(&index))
                .cloned()
                .collect()
        }
    }

    #[test]
    fn test_register_reporter_fee() {
        let mut f = fixture();
        let id = AccountId::from("reporter");

        let cheap = f.engine.register_reporter(&f.access, &f.app, &id, 0);
        assert_eq!(cheap, Err(Error::InsufficientFee { needed: 1, paid: 0 }));
        assert!(f.engine.indices(&id).is_err());

        let indices = f.engine.register_reporter(&f.access, &f.app, &id, 1).unwrap();
        assert_eq!(indices.len(), 3);
        assert_eq!(f.engine.indices(&id).unwrap(), indices.as_slice());

        let again = f.engine.register_reporter(&f.access, &f.app, &id, 1);
        assert!(matches!(again, Err(Error::AlreadyRegistered(_))));
    }

    #[test]
    fn test_request_emits_event() {
        let mut f = fixture();
        let opened = f.open();
        assert!(opened.index < 10);
        assert!(f.engine.request(&opened.key).unwrap().is_open());
        assert!(matches!(
            f.events.history().next().unwrap().event,
            MarketplaceEvent::OracleRequest { index, .. } if index == opened.index
        ));
    }

    #[test]
    fn test_index_mismatch() {
        let mut f = fixture();
        let reporters = f.register_reporters(1);
        let opened = f.open();
        let assigned = f.engine.indices(&reporters[0]).unwrap().to_vec();
        let foreign = (0..10).find(|i| !assigned.contains(i)).unwrap();

        let result = f.respond(&reporters[0], foreign, StatusCode::OnTime);
        assert!(matches!(result, Err(Error::IndexMismatch { .. })));
        assert_eq!(f.engine.request(&opened.key).unwrap().response_count(), 0);
    }

    #[test]
    fn test_unregistered_reporter() {
        let mut f = fixture();
        let opened = f.open();
        let result = f.respond(&AccountId::from("stranger"), opened.index, StatusCode::OnTime);
        assert!(matches!(result, Err(Error::Unauthorized(_))));
    }

    #[test]
    fn test_quorum_resolves_once() {
        let mut f = fixture();
        let reporters = f.register_reporters(40);
        let opened = f.open();
        let holders = f.holders(&reporters, opened.index);
        assert!(holders.len() >= 4, "seeded window gives enough holders");

        // Disagreeing response does not count toward the winning status
        assert_eq!(
            f.respond(&holders[0], opened.index, StatusCode::OnTime).unwrap(),
            ResponseOutcome::Recorded { votes: 1 }
        );
        assert_eq!(
            f.respond(&holders[1], opened.index, StatusCode::LateAirline).unwrap(),
            ResponseOutcome::Recorded { votes: 1 }
        );
        f.respond(&holders[2], opened.index, StatusCode::LateAirline).unwrap();

        let outcome = f.respond(&holders[3], opened.index, StatusCode::LateAirline).unwrap();
        let resolution = match outcome {
            ResponseOutcome::Resolved(resolution) => resolution,
            other => panic!("expected resolution, got {:?}", other),
        };
        assert_eq!(resolution.status, StatusCode::LateAirline);
        assert_eq!(resolution.requester, AccountId::from("alice"));
        assert!(!f.engine.request(&opened.key).unwrap().is_open());

        if let Some(late) = holders.get(4) {
            let result = f.respond(late, opened.index, StatusCode::OnTime);
            assert_eq!(result, Err(Error::RequestClosedOrUnknown(opened.key)));
        }
        let resolved_events = f
            .events
            .history()
            .filter(|r| matches!(r.event, MarketplaceEvent::FlightStatusInfo { .. }))
            .count();
        assert_eq!(resolved_events, 1);
    }

    #[test]
    fn test_duplicate_response_rejected() {
        let mut f = fixture();
        let reporters = f.register_reporters(40);
        let opened = f.open();
        let holder = f.holders(&reporters, opened.index)[0].clone();

        f.respond(&holder, opened.index, StatusCode::OnTime).unwrap();
        let again = f.respond(&holder, opened.index, StatusCode::OnTime);
        assert_eq!(again, Err(Error::DuplicateResponse(holder)));
    }

    #[test]
    fn test_unknown_status_rejected() {
        let mut f = fixture();
        let reporters = f.register_reporters(40);
        let opened = f.open();
        let holder = f.holders(&reporters, opened.index)[0].clone();

        let result = f.respond(&holder, opened.index, StatusCode::Unknown);
        assert_eq!(result, Err(Error::InvalidStatusCode(0)));
    }

    #[test]
    fn test_unknown_request() {
        let mut f = fixture();
        let reporters = f.register_reporters(1);
        let index = f.engine.indices(&reporters[0]).unwrap()[0];
        let result = f.respond(&reporters[0], index, StatusCode::OnTime);
        assert!(matches!(result, Err(Error::RequestClosedOrUnknown(_))));
    }

    #[test]
    fn test_same_requester_retries_same_flight() {
        let mut f = fixture();
        let mut indices = Vec::new();
        for _ in 0..10 {
            let opened = f.open();
            assert!(!indices.contains(&opened.index));
            assert!(f.engine.request(&opened.key).unwrap().is_open());
            indices.push(opened.index);
        }
        indices.sort_unstable();
        assert_eq!(indices, (0..10).collect::<Vec<u8>>());

        // Every index of the flight is taken now.
        let nonce = f.engine.generator.nonce();
        let result = f.engine.request_status(
            &f.access,
            &f.app,
            &mut f.events,
            &AccountId::from("alice"),
            FlightKey::zero(),
            &f.airline,
            "ND1309",
            1_700_000_000,
        );
        assert!(matches!(result, Err(Error::DuplicateRequest(_))));
        assert_eq!(f.engine.generator.nonce(), nonce);
    }

    #[test]
    fn test_check_response_records_nothing() {
        let mut f = fixture();
        let reporters = f.register_reporters(40);
        let opened = f.open();
        let holders = f.holders(&reporters, opened.index);
        f.respond(&holders[0], opened.index, StatusCode::LateAirline).unwrap();
        f.respond(&holders[1], opened.index, StatusCode::LateAirline).unwrap();

        let pending = f
            .engine
            .check_response(
                &f.access,
                &f.app,
                &holders[2],
                opened.index,
                &f.airline,
                "ND1309",
                1_700_000_000,
                StatusCode::LateAirline,
            )
            .unwrap();
        assert_eq!(pending.votes(), 3);
        assert_eq!(pending.resolution().unwrap().status, StatusCode::LateAirline);

        // Dropping the pending response leaves the request untouched.
        drop(pending);
        let request = f.engine.request(&opened.key).unwrap();
        assert!(request.is_open());
        assert_eq!(request.response_count(), 2);
        assert!(!request.has_responded(&holders[2]));
    }

    #[test]
    fn test_exhausted_indices_keep_nonce() {
        let mut f = fixture();
        // Constant entropy per block lets the same requester collide on purpose.
        let mut window = BlockWindow::new(256);
        for _ in 0..256 {
            window.push(Hash256::new([9u8; 32]));
        }
        f.engine = OracleConsensusEngine::new(window, OracleSettings {
            index_range: 1,
            indices_per_reporter: 1,
            ..OracleSettings::default()
        });

        f.open();
        let nonce = f.engine.generator.nonce();
        let result = f.engine.request_status(
            &f.access,
            &f.app,
            &mut f.events,
            &AccountId::from("alice"),
            FlightKey::zero(),
            &f.airline,
            "ND1309",
            1_700_000_000,
        );
        assert!(matches!(result, Err(Error::DuplicateRequest(_))));
        assert_eq!(f.engine.generator.nonce(), nonce);
    }
}
