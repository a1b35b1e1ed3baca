//! Policies, payouts and withdrawable credit.
//!
//! A passenger stakes at most the policy cap on a flight. When the flight
//! resolves as delayed by the airline the stake is converted into credit at
//! the payout ratio (3/2, truncating) and the policy is zeroed, so it can be
//! credited only once. Credit leaves the ledger through [`InsuranceLedger::withdraw`].

use crate::access::AccessController;
use crate::core::{now, AccountId, Amount, Error, FlightKey, Result, Timestamp};
use crate::insurance::transfer::ValueTransfer;
use crate::registry::FlightRegistry;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

/// A passenger's policy on one flight.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Insured passenger
    pub passenger: AccountId,
    /// Insured flight
    pub flight: FlightKey,
    /// Amount staked; zero once credited
    pub paid: Amount,
    /// Purchase time
    pub purchased_at: Timestamp,
}

impl Policy {
    pub fn is_active(&self) -> bool {
        self.paid > 0
    }
}

/// Payout parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutTerms {
    /// Maximum stake per policy
    pub cap: Amount,
    pub numerator: Amount,
    pub denominator: Amount,
}

impl PayoutTerms {
    /// `paid * numerator / denominator`, truncating.
    pub fn payout(&self, paid: Amount) -> Result<Amount> {
        let gross = paid.checked_mul(self.numerator).ok_or(Error::Overflow)?;
        gross.checked_div(self.denominator).ok_or(Error::Overflow)
    }
}

impl Default for PayoutTerms {
    fn default() -> Self {
        Self {
            cap: 1,
            numerator: 3,
            denominator: 2,
        }
    }
}

/// Credits computed for one flight, not yet applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreditPlan {
    flight: FlightKey,
    /// Passenger, payout, new balance
    entries: Vec<(AccountId, Amount, Amount)>,
}

/// Credit taken out of the ledger while its transfer is in flight.
#[must_use]
#[derive(Debug, PartialEq, Eq)]
pub struct Withdrawal {
    passenger: AccountId,
    amount: Amount,
}

impl Withdrawal {
    pub fn amount(&self) -> Amount {
        self.amount
    }
}

/// Insurance ledger.
#[derive(Clone, Debug)]
pub struct InsuranceLedger {
    /// Policies grouped by flight
    policies: BTreeMap<FlightKey, BTreeMap<AccountId, Policy>>,
    /// Withdrawable credit per passenger
    credits: HashMap<AccountId, Amount>,
    terms: PayoutTerms,
}

impl InsuranceLedger {
    pub fn new(terms: PayoutTerms) -> Self {
        Self {
            policies: BTreeMap::new(),
            credits: HashMap::new(),
            terms,
        }
    }

    pub fn terms(&self) -> &PayoutTerms {
        &self.terms
    }

    /// Record a policy for `passenger` on `flight`.
    pub fn buy_policy(
        &mut self,
        access: &AccessController,
        caller: &AccountId,
        flight: &FlightKey,
        passenger: &AccountId,
        amount: Amount,
    ) -> Result<()> {
        access.guard(caller)?;

        if amount == 0 || amount > self.terms.cap {
            return Err(Error::InvalidAmount {
                amount,
                cap: self.terms.cap,
            });
        }

        let holders = self.policies.entry(*flight).or_default();
        if holders.get(passenger).map(Policy::is_active).unwrap_or(false) {
            return Err(Error::PolicyAlreadyActive(passenger.clone()));
        }

        holders.insert(
            passenger.clone(),
            Policy {
                passenger: passenger.clone(),
                flight: *flight,
                paid: amount,
                purchased_at: now(),
            },
        );

        info!(passenger = %passenger, flight = %flight, amount, "policy purchased");
        Ok(())
    }

    /// Convert a passenger's policy into credit. Returns the payout.
    pub fn credit_insuree(
        &mut self,
        access: &AccessController,
        caller: &AccountId,
        flights: &FlightRegistry,
        flight: &FlightKey,
        passenger: &AccountId,
    ) -> Result<Amount> {
        access.guard(caller)?;
        self.require_airline_fault(flights, flight)?;

        let paid = self
            .policy(flight, passenger)
            .filter(|p| p.is_active())
            .map(|p| p.paid)
            .ok_or_else(|| Error::NoActivePolicy(passenger.clone()))?;

        let payout = self.terms.payout(paid)?;
        let balance = self
            .credit_balance(passenger)
            .checked_add(payout)
            .ok_or(Error::Overflow)?;

        if let Some(policy) = self.policies.get_mut(flight).and_then(|h| h.get_mut(passenger)) {
            policy.paid = 0;
        }
        self.credits.insert(passenger.clone(), balance);

        info!(passenger = %passenger, flight = %flight, paid, payout, "insuree credited");
        Ok(payout)
    }

    /// Credit every active policy on `flight`. All or nothing.
    pub fn credit_all(
        &mut self,
        access: &AccessController,
        caller: &AccountId,
        flights: &FlightRegistry,
        flight: &FlightKey,
    ) -> Result<Vec<(AccountId, Amount)>> {
        access.guard(caller)?;
        self.require_airline_fault(flights, flight)?;
        let plan = self.plan_credits(access, caller, flight)?;
        Ok(self.apply_credits(plan))
    }

    /// Compute the credit of every active policy on `flight` without
    /// touching state. Fails if any new balance would overflow.
    pub fn plan_credits(
        &self,
        access: &AccessController,
        caller: &AccountId,
        flight: &FlightKey,
    ) -> Result<CreditPlan> {
        access.guard(caller)?;

        let mut entries: Vec<(AccountId, Amount, Amount)> = Vec::new();
        for policy in self.policyholders(flight).filter(|p| p.is_active()) {
            let payout = self.terms.payout(policy.paid)?;
            let balance = self
                .credit_balance(&policy.passenger)
                .checked_add(payout)
                .ok_or(Error::Overflow)?;
            entries.push((policy.passenger.clone(), payout, balance));
        }

        Ok(CreditPlan {
            flight: *flight,
            entries,
        })
    }

    /// Apply a plan from [`InsuranceLedger::plan_credits`]. Returns the
    /// credited passengers with their payouts.
    pub fn apply_credits(&mut self, plan: CreditPlan) -> Vec<(AccountId, Amount)> {
        let CreditPlan { flight, entries } = plan;

        let mut credited = Vec::with_capacity(entries.len());
        for (passenger, payout, balance) in entries {
            if let Some(policy) = self.policies.get_mut(&flight).and_then(|h| h.get_mut(&passenger)) {
                policy.paid = 0;
            }
            self.credits.insert(passenger.clone(), balance);
            info!(passenger = %passenger, flight = %flight, payout, "insuree credited");
            credited.push((passenger, payout));
        }

        debug!(flight = %flight, count = credited.len(), "flight policies credited");
        credited
    }

    /// Pay out a passenger's whole credit balance.
    ///
    /// The balance is cleared before `transfer` runs; if the transfer fails
    /// the balance is restored and the transfer error returned.
    pub fn withdraw<T: ValueTransfer + ?Sized>(
        &mut self,
        access: &AccessController,
        caller: &AccountId,
        passenger: &AccountId,
        transfer: &mut T,
    ) -> Result<Amount> {
        let withdrawal = self.start_withdrawal(access, caller, passenger)?;
        let amount = withdrawal.amount();

        if let Err(err) = transfer.transfer(passenger, amount) {
            warn!(passenger = %passenger, amount, error = %err, "withdrawal transfer failed");
            self.cancel_withdrawal(withdrawal);
            return Err(err);
        }

        info!(passenger = %passenger, amount, "credit withdrawn");
        Ok(amount)
    }

    /// Take a passenger's whole balance out of the ledger.
    pub fn start_withdrawal(
        &mut self,
        access: &AccessController,
        caller: &AccountId,
        passenger: &AccountId,
    ) -> Result<Withdrawal> {
        access.guard(caller)?;

        let amount = self.credit_balance(passenger);
        if amount == 0 {
            return Err(Error::InsufficientBalance(passenger.clone()));
        }

        self.credits.insert(passenger.clone(), 0);
        Ok(Withdrawal {
            passenger: passenger.clone(),
            amount,
        })
    }

    /// Return a withdrawal whose transfer failed to the passenger's balance.
    pub fn cancel_withdrawal(&mut self, withdrawal: Withdrawal) {
        let balance = self.credits.entry(withdrawal.passenger).or_insert(0);
        *balance = balance.saturating_add(withdrawal.amount);
    }

    fn require_airline_fault(&self, flights: &FlightRegistry, flight: &FlightKey) -> Result<()> {
        let status = flights.require(flight)?.status;
        if status.is_airline_fault() {
            Ok(())
        } else {
            Err(Error::FlightNotDelayedByAirline(*flight))
        }
    }

    pub fn policy(&self, flight: &FlightKey, passenger: &AccountId) -> Option<&Policy> {
        self.policies.get(flight).and_then(|h| h.get(passenger))
    }

    /// Policies held on a flight, ordered by passenger.
    pub fn policyholders(&self, flight: &FlightKey) -> impl Iterator<Item = &Policy> {
        self.policies.get(flight).into_iter().flat_map(|h| h.values())
    }

    pub fn credit_balance(&self, passenger: &AccountId) -> Amount {
        self.credits.get(passenger).copied().unwrap_or(0)
    }
}

impl Default for InsuranceLedger {
    fn default() -> Self {
        Self::new(PayoutTerms::default())
    }
}
