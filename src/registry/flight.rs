//! Flight registration and resolved status codes.

use crate::access::AccessController;
use crate::core::{derive_key, now, AccountId, Error, FlightKey, Result, Timestamp};
use crate::registry::airline::AirlineRegistry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

/// Delay status of a flight. Serialized as its numeric code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum StatusCode {
    Unknown,
    OnTime,
    LateAirline,
    LateWeather,
    LateTechnical,
    LateOther,
}

impl StatusCode {
    /// Numeric code reported by oracles.
    pub fn code(&self) -> u8 {
        match self {
            StatusCode::Unknown => 0,
            StatusCode::OnTime => 10,
            StatusCode::LateAirline => 20,
            StatusCode::LateWeather => 30,
            StatusCode::LateTechnical => 40,
            StatusCode::LateOther => 50,
        }
    }

    /// Parse a numeric code.
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(StatusCode::Unknown),
            10 => Ok(StatusCode::OnTime),
            20 => Ok(StatusCode::LateAirline),
            30 => Ok(StatusCode::LateWeather),
            40 => Ok(StatusCode::LateTechnical),
            50 => Ok(StatusCode::LateOther),
            other => Err(Error::InvalidStatusCode(other)),
        }
    }

    /// Whether this is a terminal (resolved) status.
    pub fn is_resolved(&self) -> bool {
        *self != StatusCode::Unknown
    }

    /// Whether the delay is the airline's fault and triggers payouts.
    pub fn is_airline_fault(&self) -> bool {
        *self == StatusCode::LateAirline
    }
}

impl TryFrom<u8> for StatusCode {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self> {
        Self::from_code(code)
    }
}

impl From<StatusCode> for u8 {
    fn from(status: StatusCode) -> u8 {
        status.code()
    }
}

impl Default for StatusCode {
    fn default() -> Self {
        StatusCode::Unknown
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusCode::Unknown => write!(f, "unknown"),
            StatusCode::OnTime => write!(f, "on_time"),
            StatusCode::LateAirline => write!(f, "late_airline"),
            StatusCode::LateWeather => write!(f, "late_weather"),
            StatusCode::LateTechnical => write!(f, "late_technical"),
            StatusCode::LateOther => write!(f, "late_other"),
        }
    }
}

/// Derive the key of a flight.
pub fn flight_key(airline: &AccountId, designator: &str, departure: i64) -> FlightKey {
    derive_key(&[
        airline.as_str().as_bytes(),
        designator.as_bytes(),
        &departure.to_be_bytes(),
    ])
}

/// A registered flight.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Flight {
    /// Derived key
    pub key: FlightKey,
    /// Operating airline
    pub airline: AccountId,
    /// Flight designator, e.g. "ND1309"
    pub designator: String,
    /// Departure time (unix seconds)
    pub departure: i64,
    pub is_registered: bool,
    /// Current status
    pub status: StatusCode,
    /// Last status change
    pub updated_at: Timestamp,
}

/// Registry of flights keyed by flight key.
#[derive(Clone, Debug, Default)]
pub struct FlightRegistry {
    flights: HashMap<FlightKey, Flight>,
}

impl FlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a flight for an admitted airline.
    pub fn register(
        &mut self,
        access: &AccessController,
        caller: &AccountId,
        airlines: &AirlineRegistry,
        airline: &AccountId,
        designator: &str,
        departure: i64,
    ) -> Result<FlightKey> {
        access.guard(caller)?;

        if !airlines.is_registered(airline) {
            return Err(Error::UnknownAirline(airline.clone()));
        }

        let key = flight_key(airline, designator, departure);
        if self.flights.contains_key(&key) {
            return Err(Error::AlreadyRegistered(format!(
                "{} {} @ {}",
                airline, designator, departure
            )));
        }

        self.flights.insert(
            key,
            Flight {
                key,
                airline: airline.clone(),
                designator: designator.to_string(),
                departure,
                is_registered: true,
                status: StatusCode::Unknown,
                updated_at: now(),
            },
        );

        info!(airline = %airline, flight = designator, departure, key = %key, "flight registered");
        Ok(key)
    }

    /// Overwrite the status of a flight.
    ///
    /// Does not enforce single resolution; the resolution path checks
    /// [`StatusCode::is_resolved`] before calling.
    pub fn set_status(
        &mut self,
        access: &AccessController,
        caller: &AccountId,
        key: &FlightKey,
        status: StatusCode,
    ) -> Result<StatusCode> {
        access.guard(caller)?;

        let flight = self
            .flights
            .get_mut(key)
            .ok_or(Error::UnknownFlight(*key))?;
        flight.status = status;
        flight.updated_at = now();

        info!(flight = %flight.designator, key = %key, status = %status, "flight status set");
        Ok(status)
    }

    pub fn get(&self, key: &FlightKey) -> Option<&Flight> {
        self.flights.get(key)
    }

    /// Look up a registered flight or fail with `UnknownFlight`.
    pub fn require(&self, key: &FlightKey) -> Result<&Flight> {
        self.flights.get(key).ok_or(Error::UnknownFlight(*key))
    }

    pub fn status(&self, key: &FlightKey) -> Option<StatusCode> {
        self.flights.get(key).map(|f| f.status)
    }

    pub fn len(&self) -> usize {
        self.flights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flights.is_empty()
    }
}
