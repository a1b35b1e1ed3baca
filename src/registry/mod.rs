//! Registries
//!
//! Airlines and the flights they operate:
//! - Bootstrap and majority-vote airline admission
//! - Airline funding deposits
//! - Flight registration and resolved delay status

pub mod airline;
pub mod flight;

pub use airline::{Admission, Airline, AirlineRegistry};
pub use flight::{flight_key, Flight, FlightRegistry, StatusCode};
