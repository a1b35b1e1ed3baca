//! Caller authorization and operational status.

use crate::core::{AccountId, Error, Result};
use std::collections::HashSet;
use tracing::info;

/// Tracks the owning identity, the authorized callers and whether the
/// system currently accepts mutating operations.
#[derive(Clone, Debug)]
pub struct AccessController {
    /// Owning identity
    owner: AccountId,
    /// Callers allowed to mutate data components
    authorized: HashSet<AccountId>,
    /// Operational flag
    operational: bool,
}

impl AccessController {
    /// Create a controller owned by `owner`, operational and with no authorized callers.
    pub fn new(owner: AccountId) -> Self {
        Self {
            owner,
            authorized: HashSet::new(),
            operational: true,
        }
    }

    /// Owning identity.
    pub fn owner(&self) -> &AccountId {
        &self.owner
    }

    pub fn is_operational(&self) -> bool {
        self.operational
    }

    /// Pause or resume the system. Callable while paused.
    pub fn set_operational(&mut self, caller: &AccountId, mode: bool) -> Result<()> {
        self.require_owner(caller)?;
        if self.operational != mode {
            info!(operational = mode, by = %caller, "operational status changed");
        }
        self.operational = mode;
        Ok(())
    }

    /// Add `who` to the authorized callers.
    pub fn authorize(&mut self, caller: &AccountId, who: AccountId) -> Result<()> {
        self.require_operational()?;
        self.require_owner(caller)?;
        info!(caller = %who, "caller authorized");
        self.authorized.insert(who);
        Ok(())
    }

    /// Remove `who` from the authorized callers.
    pub fn revoke(&mut self, caller: &AccountId, who: &AccountId) -> Result<()> {
        self.require_operational()?;
        self.require_owner(caller)?;
        if self.authorized.remove(who) {
            info!(caller = %who, "caller revoked");
        }
        Ok(())
    }

    pub fn is_authorized(&self, who: &AccountId) -> bool {
        self.authorized.contains(who)
    }

    pub fn require_operational(&self) -> Result<()> {
        if self.operational {
            Ok(())
        } else {
            Err(Error::NotOperational)
        }
    }

    pub fn require_owner(&self, caller: &AccountId) -> Result<()> {
        if caller == &self.owner {
            Ok(())
        } else {
            Err(Error::Unauthorized(caller.clone()))
        }
    }

    pub fn require_authorized(&self, caller: &AccountId) -> Result<()> {
        if self.is_authorized(caller) {
            Ok(())
        } else {
            Err(Error::Unauthorized(caller.clone()))
        }
    }

    /// Guard for data-component mutations: operational, then authorized.
    pub fn guard(&self, caller: &AccountId) -> Result<()> {
        self.require_operational()?;
        self.require_authorized(caller)
    }
}
