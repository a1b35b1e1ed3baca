//! # SkyCover - Flight-Delay Insurance Marketplace
//!
//! A consensus and escrow engine providing:
//! - **Registry**: airline admission by bootstrap or majority vote, flights
//! - **Insurance**: capped policies, 3/2 payout on airline delay, withdrawals
//! - **Oracle**: randomized reporter indices and quorum status resolution
//!
//! ## Quick Start
//!
//! ```rust
//! use skycover::app::{Marketplace, MarketplaceConfig};
//! use skycover::core::AccountId;
//!
//! let owner = AccountId::from("owner");
//! let founder = AccountId::from("airline-0");
//! let mut market = Marketplace::seeded(MarketplaceConfig::default(), owner, founder.clone(), 42)?;
//!
//! market.fund_airline(&founder, 10)?;
//! market.register_flight(&founder, "ND1309", 1_700_000_000)?;
//! market.buy_policy(&AccountId::from("alice"), &founder, "ND1309", 1_700_000_000, 1)?;
//! # Ok::<(), skycover::Error>(())
//! ```

pub mod access;
pub mod app;
pub mod core;
pub mod insurance;
pub mod monitoring;
pub mod oracle;
pub mod registry;

pub use crate::core::error::{Error, Result};
