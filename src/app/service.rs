//! Async access to a shared marketplace.
//!
//! Wraps the marketplace in a `tokio` read-write lock. Every mutating call
//! takes the write lock for its whole duration, so concurrent callers are
//! applied one at a time in lock-acquisition order.

use crate::app::marketplace::Marketplace;
use crate::core::{AccountId, Amount, FlightKey, Result};
use crate::insurance::{ValueTransfer, Vault};
use crate::monitoring::EventRecord;
use crate::oracle::{BlockWindow, EntropySource, OpenedRequest, ResponseOutcome};
use crate::registry::{Admission, StatusCode};
use tokio::sync::{broadcast, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Shared, serialized marketplace handle.
pub struct MarketplaceService<E: EntropySource = BlockWindow, T: ValueTransfer = Vault> {
    marketplace: RwLock<Marketplace<E, T>>,
}

impl<E: EntropySource, T: ValueTransfer> MarketplaceService<E, T> {
    pub fn new(marketplace: Marketplace<E, T>) -> Self {
        Self {
            marketplace: RwLock::new(marketplace),
        }
    }

    /// Read access for queries.
    pub async fn read(&self) -> RwLockReadGuard<'_, Marketplace<E, T>> {
        self.marketplace.read().await
    }

    /// Exclusive access, e.g. to run several operations back to back.
    pub async fn write(&self) -> RwLockWriteGuard<'_, Marketplace<E, T>> {
        self.marketplace.write().await
    }

    pub async fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.marketplace.read().await.subscribe()
    }

    pub async fn is_operational(&self) -> bool {
        self.marketplace.read().await.is_operational()
    }

    pub async fn set_operational(&self, caller: &AccountId, mode: bool) -> Result<()> {
        self.marketplace.write().await.set_operational(caller, mode)
    }

    pub async fn register_airline(&self, endorser: &AccountId, candidate: &AccountId) -> Result<Admission> {
        self.marketplace
            .write()
            .await
            .register_airline(endorser, candidate)
    }

    pub async fn fund_airline(&self, airline: &AccountId, amount: Amount) -> Result<Amount> {
        self.marketplace.write().await.fund_airline(airline, amount)
    }

    pub async fn register_flight(
        &self,
        airline: &AccountId,
        designator: &str,
        departure: i64,
    ) -> Result<FlightKey> {
        self.marketplace
            .write()
            .await
            .register_flight(airline, designator, departure)
    }

    pub async fn buy_policy(
        &self,
        passenger: &AccountId,
        airline: &AccountId,
        designator: &str,
        departure: i64,
        amount: Amount,
    ) -> Result<FlightKey> {
        self.marketplace
            .write()
            .await
            .buy_policy(passenger, airline, designator, departure, amount)
    }

    pub async fn claim_payout(
        &self,
        passenger: &AccountId,
        airline: &AccountId,
        designator: &str,
        departure: i64,
    ) -> Result<Amount> {
        self.marketplace
            .write()
            .await
            .claim_payout(passenger, airline, designator, departure)
    }

    pub async fn withdraw(&self, passenger: &AccountId) -> Result<Amount> {
        self.marketplace.write().await.withdraw(passenger)
    }

    pub async fn register_oracle_reporter(&self, reporter: &AccountId, paid: Amount) -> Result<Vec<u8>> {
        self.marketplace
            .write()
            .await
            .register_oracle_reporter(reporter, paid)
    }

    pub async fn my_indices(&self, reporter: &AccountId) -> Result<Vec<u8>> {
        self.marketplace.read().await.my_indices(reporter)
    }

    pub async fn request_flight_status(
        &self,
        requester: &AccountId,
        airline: &AccountId,
        designator: &str,
        departure: i64,
    ) -> Result<OpenedRequest> {
        self.marketplace
            .write()
            .await
            .request_flight_status(requester, airline, designator, departure)
    }

    pub async fn submit_oracle_response(
        &self,
        reporter: &AccountId,
        index: u8,
        airline: &AccountId,
        designator: &str,
        departure: i64,
        status: StatusCode,
    ) -> Result<ResponseOutcome> {
        self.marketplace.write().await.submit_oracle_response(
            reporter, index, airline, designator, departure, status,
        )
    }

    pub async fn credit_balance(&self, passenger: &AccountId) -> Amount {
        self.marketplace.read().await.credit_balance(passenger)
    }
}
