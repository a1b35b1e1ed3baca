//! Access Control
//!
//! Gates every mutating operation:
//! - Owner-only administration
//! - Authorized caller list for data components
//! - Operational (pause) switch

pub mod controller;

pub use controller::AccessController;
