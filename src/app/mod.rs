//! Marketplace Application
//!
//! Composes the components into one state aggregate:
//! - Configuration with validated defaults
//! - Guarded user-facing operations and resolution routing
//! - Async service serializing concurrent callers

pub mod config;
pub mod marketplace;
pub mod service;

pub use config::MarketplaceConfig;
pub use marketplace::{Marketplace, APP_IDENTITY};
pub use service::MarketplaceService;
