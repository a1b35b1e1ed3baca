//! Core utilities and common types for SkyCover.

pub mod error;
pub mod hash;
pub mod types;

pub use error::{Error, Result};
pub use hash::derive_key;
pub use types::*;
