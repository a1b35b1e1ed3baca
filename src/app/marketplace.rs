//! The marketplace state aggregate.
//!
//! Owns every component and exposes the user-facing operations. Each
//! operation checks the operational flag first, then the acting party's
//! standing, then delegates to the component with the marketplace's own
//! identity as the authorized caller. Payments that arrive with an operation
//! are escrowed only after the component accepted it.

use crate::access::AccessController;
use crate::app::config::MarketplaceConfig;
use crate::core::{AccountId, Amount, Error, FlightKey, RequestKey, Result};
use crate::insurance::{CreditPlan, InsuranceLedger, Policy, ValueTransfer, Vault};
use crate::monitoring::{EventBus, EventRecord, MarketplaceEvent};
use crate::oracle::{
    BlockWindow, EntropySource, OpenedRequest, OracleConsensusEngine, Reporter, Resolution,
    ResponseOutcome, StatusRequest,
};
use crate::registry::{flight_key, Admission, Airline, AirlineRegistry, Flight, FlightRegistry, StatusCode};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Identity the marketplace uses when calling its own data components.
pub const APP_IDENTITY: &str = "skycover:app";

/// Effects of a quorum resolution, computed before anything is recorded.
struct ResolutionPlan {
    flight: FlightKey,
    requester: AccountId,
    /// Status to set; `None` when the flight was already resolved
    status: Option<StatusCode>,
    credits: Option<CreditPlan>,
}

/// Flight-delay insurance marketplace.
pub struct Marketplace<E: EntropySource = BlockWindow, T: ValueTransfer = Vault> {
    id: AccountId,
    config: MarketplaceConfig,
    access: AccessController,
    airlines: AirlineRegistry,
    flights: FlightRegistry,
    insurance: InsuranceLedger,
    oracles: OracleConsensusEngine<E>,
    vault: T,
    events: EventBus,
}

impl Marketplace<BlockWindow, Vault> {
    /// Create a marketplace with a seeded block window and an in-process vault.
    pub fn seeded(
        config: MarketplaceConfig,
        owner: AccountId,
        founder: AccountId,
        seed: u64,
    ) -> Result<Self> {
        let window = BlockWindow::seeded(seed, config.entropy_window as usize);
        Self::new(config, owner, founder, window, Vault::new())
    }
}

impl<E: EntropySource, T: ValueTransfer> Marketplace<E, T> {
    /// Create a marketplace owned by `owner` with `founder` as first airline.
    pub fn new(
        config: MarketplaceConfig,
        owner: AccountId,
        founder: AccountId,
        entropy: E,
        vault: T,
    ) -> Result<Self> {
        config.validate()?;

        let id = AccountId::from(APP_IDENTITY);
        let mut access = AccessController::new(owner.clone());
        access.authorize(&owner, id.clone())?;

        let mut airlines = AirlineRegistry::new(config.bootstrap_airlines);
        airlines.found(founder.clone())?;

        let mut events = EventBus::new(config.event_capacity);
        events.emit(MarketplaceEvent::AirlineRegistered {
            airline: founder.clone(),
            votes: 1,
        });

        info!(owner = %owner, founder = %founder, "marketplace initialized");
        Ok(Self {
            id,
            insurance: InsuranceLedger::new(config.payout_terms()),
            oracles: OracleConsensusEngine::new(entropy, config.oracle_settings()),
            flights: FlightRegistry::new(),
            config,
            access,
            airlines,
            vault,
            events,
        })
    }

    // ---- access ----------------------------------------------------------

    pub fn is_operational(&self) -> bool {
        self.access.is_operational()
    }

    /// Pause or resume the marketplace. Owner only; callable while paused.
    pub fn set_operational(&mut self, caller: &AccountId, mode: bool) -> Result<()> {
        let changed = self.access.is_operational() != mode;
        self.access.set_operational(caller, mode)?;
        if changed {
            self.events
                .emit(MarketplaceEvent::OperationalChanged { operational: mode });
        }
        Ok(())
    }

    /// Authorize another caller on the data components. Owner only.
    pub fn authorize_caller(&mut self, caller: &AccountId, who: AccountId) -> Result<()> {
        self.access.authorize(caller, who)
    }

    /// Revoke a caller from the data components. Owner only.
    pub fn revoke_caller(&mut self, caller: &AccountId, who: &AccountId) -> Result<()> {
        self.access.revoke(caller, who)
    }

    // ---- airlines --------------------------------------------------------

    /// `endorser` registers, or votes for, `candidate`.
    pub fn register_airline(
        &mut self,
        endorser: &AccountId,
        candidate: &AccountId,
    ) -> Result<Admission> {
        self.access.require_operational()?;
        self.require_participating(endorser)?;

        let admission = self
            .airlines
            .register(&self.access, &self.id, candidate, endorser)?;

        if admission.admitted {
            self.events.emit(MarketplaceEvent::AirlineRegistered {
                airline: candidate.clone(),
                votes: admission.votes,
            });
        } else {
            self.events.emit(MarketplaceEvent::AirlineVoteRecorded {
                candidate: candidate.clone(),
                endorser: endorser.clone(),
                votes: admission.votes,
            });
        }
        Ok(admission)
    }

    /// Deposit funding for a registered airline. Returns its total funding.
    pub fn fund_airline(&mut self, airline: &AccountId, amount: Amount) -> Result<Amount> {
        self.access.require_operational()?;

        let total = self.airlines.fund(&self.access, &self.id, airline, amount)?;
        self.vault.receive(airline, amount);

        if total >= self.config.airline_funding && total - amount < self.config.airline_funding {
            info!(airline = %airline, total, "airline now participating");
        }
        self.events.emit(MarketplaceEvent::AirlineFunded {
            airline: airline.clone(),
            amount,
            total,
        });
        Ok(total)
    }

    // ---- flights ---------------------------------------------------------

    /// Register a flight operated by a participating airline.
    pub fn register_flight(
        &mut self,
        airline: &AccountId,
        designator: &str,
        departure: i64,
    ) -> Result<FlightKey> {
        self.access.require_operational()?;
        self.require_participating(airline)?;

        let key = self.flights.register(
            &self.access,
            &self.id,
            &self.airlines,
            airline,
            designator,
            departure,
        )?;

        self.events.emit(MarketplaceEvent::FlightRegistered {
            key,
            airline: airline.clone(),
            flight: designator.to_string(),
            departure,
        });
        Ok(key)
    }

    // ---- insurance -------------------------------------------------------

    /// `passenger` insures a flight for `amount`.
    pub fn buy_policy(
        &mut self,
        passenger: &AccountId,
        airline: &AccountId,
        designator: &str,
        departure: i64,
        amount: Amount,
    ) -> Result<FlightKey> {
        self.access.require_operational()?;

        let key = flight_key(airline, designator, departure);
        if self.flights.require(&key)?.status.is_resolved() {
            return Err(Error::FlightAlreadyResolved(key));
        }

        self.insurance
            .buy_policy(&self.access, &self.id, &key, passenger, amount)?;
        self.vault.receive(passenger, amount);

        self.events.emit(MarketplaceEvent::PolicyPurchased {
            passenger: passenger.clone(),
            flight: key,
            amount,
        });
        Ok(key)
    }

    /// `passenger` claims the payout of their policy on a flight delayed by the airline.
    pub fn claim_payout(
        &mut self,
        passenger: &AccountId,
        airline: &AccountId,
        designator: &str,
        departure: i64,
    ) -> Result<Amount> {
        self.access.require_operational()?;

        let key = flight_key(airline, designator, departure);
        let payout = self.insurance.credit_insuree(
            &self.access,
            &self.id,
            &self.flights,
            &key,
            passenger,
        )?;

        self.events.emit(MarketplaceEvent::InsureeCredited {
            passenger: passenger.clone(),
            flight: key,
            payout,
        });
        Ok(payout)
    }

    /// Pay out the caller's whole credit balance.
    pub fn withdraw(&mut self, passenger: &AccountId) -> Result<Amount> {
        self.access.require_operational()?;

        let amount = self
            .insurance
            .withdraw(&self.access, &self.id, passenger, &mut self.vault)?;

        self.events.emit(MarketplaceEvent::Withdrawal {
            passenger: passenger.clone(),
            amount,
        });
        Ok(amount)
    }

    // ---- oracles ---------------------------------------------------------

    /// Register a status reporter that paid `paid`. Returns its indices.
    pub fn register_oracle_reporter(&mut self, reporter: &AccountId, paid: Amount) -> Result<Vec<u8>> {
        self.access.require_operational()?;

        let indices = self
            .oracles
            .register_reporter(&self.access, &self.id, reporter, paid)?;
        self.vault.receive(reporter, paid);
        Ok(indices)
    }

    /// Indices assigned to a reporter.
    pub fn my_indices(&self, reporter: &AccountId) -> Result<Vec<u8>> {
        self.oracles.indices(reporter).map(<[u8]>::to_vec)
    }

    /// Ask reporters for the status of a registered flight.
    pub fn request_flight_status(
        &mut self,
        requester: &AccountId,
        airline: &AccountId,
        designator: &str,
        departure: i64,
    ) -> Result<OpenedRequest> {
        self.access.require_operational()?;

        let key = flight_key(airline, designator, departure);
        self.flights.require(&key)?;

        self.oracles.request_status(
            &self.access,
            &self.id,
            &mut self.events,
            requester,
            key,
            airline,
            designator,
            departure,
        )
    }

    /// A reporter answers an open status request.
    ///
    /// The response completing the quorum also applies the resolution: the
    /// flight status is set and, on an airline delay, every active policy on
    /// the flight is credited. Every fallible step runs before the response
    /// is recorded, so an error leaves the request and the flight untouched.
    #[allow(clippy::too_many_arguments)]
    pub fn submit_oracle_response(
        &mut self,
        reporter: &AccountId,
        index: u8,
        airline: &AccountId,
        designator: &str,
        departure: i64,
        status: StatusCode,
    ) -> Result<ResponseOutcome> {
        self.access.require_operational()?;

        let pending = self.oracles.check_response(
            &self.access,
            &self.id,
            reporter,
            index,
            airline,
            designator,
            departure,
            status,
        )?;
        let plan = pending
            .resolution()
            .map(|resolution| self.plan_resolution(resolution))
            .transpose()?;

        if let Some(ResolutionPlan { status: Some(status), flight, .. }) = &plan {
            self.flights.set_status(&self.access, &self.id, flight, *status)?;
        }
        let outcome = self.oracles.commit_response(&mut self.events, pending);
        if let Some(plan) = plan {
            self.apply_resolution(plan);
        }
        Ok(outcome)
    }

    fn plan_resolution(&self, resolution: &Resolution) -> Result<ResolutionPlan> {
        let mut plan = ResolutionPlan {
            flight: resolution.flight,
            requester: resolution.requester.clone(),
            status: None,
            credits: None,
        };

        let current = self.flights.require(&resolution.flight)?.status;
        if current.is_resolved() {
            warn!(
                flight = %resolution.designator,
                current = %current,
                reported = %resolution.status,
                "flight already resolved; keeping first status"
            );
            return Ok(plan);
        }

        plan.status = Some(resolution.status);
        if resolution.status.is_airline_fault() {
            plan.credits = Some(
                self.insurance
                    .plan_credits(&self.access, &self.id, &resolution.flight)?,
            );
        }
        Ok(plan)
    }

    fn apply_resolution(&mut self, plan: ResolutionPlan) {
        let ResolutionPlan {
            flight,
            requester,
            credits,
            ..
        } = plan;
        if let Some(credits) = credits {
            let credited = self.insurance.apply_credits(credits);
            if !credited.iter().any(|(p, _)| p == &requester) {
                debug!(requester = %requester, "requester holds no active policy");
            }
            for (passenger, payout) in credited {
                self.events.emit(MarketplaceEvent::InsureeCredited {
                    passenger,
                    flight,
                    payout,
                });
            }
        }
    }

    /// Feed a new block hash to the entropy source.
    pub fn entropy_mut(&mut self) -> &mut E {
        self.oracles.entropy_mut()
    }

    // ---- queries ---------------------------------------------------------

    fn require_participating(&self, airline: &AccountId) -> Result<()> {
        if self
            .airlines
            .is_participating(airline, self.config.airline_funding)
        {
            Ok(())
        } else {
            Err(Error::NotFoundOrUnauthorized(airline.clone()))
        }
    }

    /// Registered and funded.
    pub fn is_participating(&self, airline: &AccountId) -> bool {
        self.airlines
            .is_participating(airline, self.config.airline_funding)
    }

    pub fn is_airline(&self, airline: &AccountId) -> bool {
        self.airlines.is_registered(airline)
    }

    pub fn airline(&self, airline: &AccountId) -> Option<&Airline> {
        self.airlines.get(airline)
    }

    pub fn registered_airline_count(&self) -> u32 {
        self.airlines.registered_count()
    }

    pub fn flight(&self, key: &FlightKey) -> Option<&Flight> {
        self.flights.get(key)
    }

    pub fn flight_status(&self, airline: &AccountId, designator: &str, departure: i64) -> Option<StatusCode> {
        self.flights.status(&flight_key(airline, designator, departure))
    }

    pub fn policy(&self, key: &FlightKey, passenger: &AccountId) -> Option<&Policy> {
        self.insurance.policy(key, passenger)
    }

    pub fn credit_balance(&self, passenger: &AccountId) -> Amount {
        self.insurance.credit_balance(passenger)
    }

    pub fn reporter(&self, reporter: &AccountId) -> Option<&Reporter> {
        self.oracles.reporter(reporter)
    }

    pub fn request(&self, key: &RequestKey) -> Option<&StatusRequest> {
        self.oracles.request(key)
    }

    pub fn open_requests(&self) -> impl Iterator<Item = &StatusRequest> {
        self.oracles.open_requests()
    }

    /// Retained events, oldest first.
    pub fn events(&self) -> impl Iterator<Item = &EventRecord> {
        self.events.history()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.events.subscribe()
    }

    pub fn config(&self) -> &MarketplaceConfig {
        &self.config
    }

    pub fn vault(&self) -> &T {
        &self.vault
    }

    /// Identity used for data-component calls.
    pub fn app_identity(&self) -> &AccountId {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> AccountId {
        AccountId::from(name)
    }

    fn marketplace() -> Marketplace {
        let mut m = Marketplace::seeded(MarketplaceConfig::default(), id("owner"), id("airline-0"), 5)
            .unwrap();
        m.fund_airline(&id("airline-0"), 10).unwrap();
        m
    }

    #[test]
    fn test_founder_registered() {
        let m = marketplace();
        assert!(m.is_airline(&id("airline-0")));
        assert!(m.is_participating(&id("airline-0")));
        assert_eq!(m.registered_airline_count(), 1);
        assert_eq!(m.vault().balance(), 10);
    }

    #[test]
    fn test_unfunded_airline_cannot_endorse() {
        let mut m = marketplace();
        m.register_airline(&id("airline-0"), &id("airline-1")).unwrap();

        let result = m.register_airline(&id("airline-1"), &id("airline-2"));
        assert_eq!(result, Err(Error::NotFoundOrUnauthorized(id("airline-1"))));

        let flight = m.register_flight(&id("airline-1"), "XX1", 1);
        assert_eq!(flight, Err(Error::NotFoundOrUnauthorized(id("airline-1"))));
    }

    #[test]
    fn test_paused_marketplace() {
        let mut m = marketplace();
        m.set_operational(&id("owner"), false).unwrap();

        assert_eq!(
            m.register_airline(&id("airline-0"), &id("airline-1")),
            Err(Error::NotOperational)
        );
        assert_eq!(m.withdraw(&id("alice")), Err(Error::NotOperational));
        assert!(!m.is_airline(&id("airline-1")));

        m.set_operational(&id("owner"), true).unwrap();
        assert!(m.register_airline(&id("airline-0"), &id("airline-1")).unwrap().admitted);
    }

    #[test]
    fn test_only_owner_pauses() {
        let mut m = marketplace();
        let result = m.set_operational(&id("airline-0"), false);
        assert_eq!(result, Err(Error::Unauthorized(id("airline-0"))));
        assert!(m.is_operational());
    }

    #[test]
    fn test_revoked_app_identity_blocks_mutations() {
        let mut m = marketplace();
        let app = m.app_identity().clone();
        m.revoke_caller(&id("owner"), &app).unwrap();

        let result = m.register_flight(&id("airline-0"), "ND1309", 1);
        assert_eq!(result, Err(Error::Unauthorized(app.clone())));

        m.authorize_caller(&id("owner"), app).unwrap();
        assert!(m.register_flight(&id("airline-0"), "ND1309", 1).is_ok());
    }

    #[test]
    fn test_buy_policy_requires_flight() {
        let mut m = marketplace();
        let result = m.buy_policy(&id("alice"), &id("airline-0"), "ND1309", 1, 1);
        assert!(matches!(result, Err(Error::UnknownFlight(_))));
        assert_eq!(m.vault().balance(), 10);
    }

    #[test]
    fn test_rejected_policy_escrows_nothing() {
        let mut m = marketplace();
        m.register_flight(&id("airline-0"), "ND1309", 1).unwrap();

        let result = m.buy_policy(&id("alice"), &id("airline-0"), "ND1309", 1, 2);
        assert_eq!(result, Err(Error::InvalidAmount { amount: 2, cap: 1 }));
        assert_eq!(m.vault().balance(), 10);

        m.buy_policy(&id("alice"), &id("airline-0"), "ND1309", 1, 1).unwrap();
        assert_eq!(m.vault().balance(), 11);
    }

    #[test]
    fn test_request_requires_registered_flight() {
        let mut m = marketplace();
        let result = m.request_flight_status(&id("alice"), &id("airline-0"), "ND1309", 1);
        assert!(matches!(result, Err(Error::UnknownFlight(_))));
        assert!(m.events().all(|r| !matches!(r.event, MarketplaceEvent::OracleRequest { .. })));
    }

    #[test]
    fn test_reporter_fee_escrowed() {
        let mut m = marketplace();
        let indices = m.register_oracle_reporter(&id("oracle-1"), 1).unwrap();
        assert_eq!(m.my_indices(&id("oracle-1")).unwrap(), indices);
        assert_eq!(m.vault().balance(), 11);

        let cheap = m.register_oracle_reporter(&id("oracle-2"), 0);
        assert_eq!(cheap, Err(Error::InsufficientFee { needed: 1, paid: 0 }));
        assert_eq!(m.vault().balance(), 11);
    }

    /// Open a request on `designator` and send `status` from the first
    /// three holders of its index. Returns the request and the last outcome.
    fn resolve(
        m: &mut Marketplace,
        reporters: &[AccountId],
        designator: &str,
        status: StatusCode,
    ) -> (OpenedRequest, Result<ResponseOutcome>) {
        let opened = m
            .request_flight_status(&id("alice"), &id("airline-0"), designator, 1)
            .unwrap();
        let holders: Vec<AccountId> = reporters
            .iter()
            .filter(|r| m.my_indices(r).unwrap().contains(&opened.index))
            .cloned()
            .collect();
        assert!(holders.len() >= 3);

        for reporter in &holders[..2] {
            m.submit_oracle_response(reporter, opened.index, &id("airline-0"), designator, 1, status)
                .unwrap();
        }
        let last = m.submit_oracle_response(&holders[2], opened.index, &id("airline-0"), designator, 1, status);
        (opened, last)
    }

    #[test]
    fn test_failed_resolution_changes_nothing() {
        let config = MarketplaceConfig {
            policy_cap: Amount::MAX / 3,
            payout_denominator: 1,
            ..MarketplaceConfig::default()
        };
        let mut m = Marketplace::seeded(config, id("owner"), id("airline-0"), 5).unwrap();
        m.fund_airline(&id("airline-0"), 10).unwrap();
        let reporters: Vec<AccountId> = (0..50)
            .map(|n| {
                let reporter = AccountId::new(format!("oracle-{}", n));
                m.register_oracle_reporter(&reporter, 1).unwrap();
                reporter
            })
            .collect();

        let first = m.register_flight(&id("airline-0"), "ND1", 1).unwrap();
        let second = m.register_flight(&id("airline-0"), "ND2", 1).unwrap();
        m.buy_policy(&id("alice"), &id("airline-0"), "ND1", 1, Amount::MAX / 3).unwrap();
        m.buy_policy(&id("alice"), &id("airline-0"), "ND2", 1, Amount::MAX / 3).unwrap();

        let (_, outcome) = resolve(&mut m, &reporters, "ND1", StatusCode::LateAirline);
        assert!(matches!(outcome, Ok(ResponseOutcome::Resolved(_))));
        assert_eq!(m.credit_balance(&id("alice")), Amount::MAX);

        // The second payout cannot fit in alice's balance.
        let (opened, outcome) = resolve(&mut m, &reporters, "ND2", StatusCode::LateAirline);
        assert_eq!(outcome, Err(Error::Overflow));

        let request = m.request(&opened.key).unwrap();
        assert!(request.is_open());
        assert_eq!(request.response_count(), 2);
        assert_eq!(m.flight(&second).unwrap().status, StatusCode::Unknown);
        assert_eq!(m.policy(&second, &id("alice")).unwrap().paid, Amount::MAX / 3);
        assert_eq!(m.policy(&first, &id("alice")).unwrap().paid, 0);
        assert_eq!(m.credit_balance(&id("alice")), Amount::MAX);
        let resolved = m
            .events()
            .filter(|r| matches!(r.event, MarketplaceEvent::FlightStatusInfo { .. }))
            .count();
        assert_eq!(resolved, 1);
    }

    #[test]
    fn test_claim_before_resolution() {
        let mut m = marketplace();
        let key = m.register_flight(&id("airline-0"), "ND1309", 1).unwrap();
        m.buy_policy(&id("alice"), &id("airline-0"), "ND1309", 1, 1).unwrap();

        let result = m.claim_payout(&id("alice"), &id("airline-0"), "ND1309", 1);
        assert_eq!(result, Err(Error::FlightNotDelayedByAirline(key)));
    }
}
