//! Monitoring Module
//!
//! Provides observability:
//! - Structured logging setup over `tracing`
//! - Marketplace event history and broadcast

pub mod events;
pub mod logging;

pub use events::{EventBus, EventRecord, MarketplaceEvent};
pub use logging::{init_logging, LogFormat, LogLevel, LoggerConfig};
