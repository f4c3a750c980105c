use log::info;
use nix::unistd::Uid;
use thiserror::Error;

use crate::bundle::Bundle;
use crate::carrier::{CarrierConfigError, CarrierConfigService, SubscriptionId};
use crate::delegation::{DelegatedIdentity, DelegationError, IdentityDelegate};

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("identity delegation failed: {0}")]
    Delegation(#[from] DelegationError),
    #[error("carrier config override failed: {0}")]
    CarrierConfig(#[from] CarrierConfigError),
}

/// Mediates a single privileged configuration change: one delegation
/// bracket around one carrier config call. Holds no state across
/// invocations; safe to construct once per operation.
pub struct ConfigBroker<'a, D: IdentityDelegate, C: CarrierConfigService> {
    delegate: &'a D,
    carrier: &'a C,
    uid: Uid,
}

impl<'a, D: IdentityDelegate, C: CarrierConfigService> ConfigBroker<'a, D, C> {
    /// `uid` is the real uid the delegated identity is tied to, normally
    /// the current process's own.
    pub fn new(delegate: &'a D, carrier: &'a C, uid: Uid) -> Self {
        ConfigBroker {
            delegate,
            carrier,
            uid,
        }
    }

    /// Coerces the raw argument set and applies it as a persistent override
    /// for `sub_id`. The delegation is released on every exit path once
    /// acquired; if acquisition itself fails, there is nothing to release.
    pub fn apply_config(&self, sub_id: SubscriptionId, arguments: &Bundle) -> Result<(), BrokerError> {
        info!("applying carrier config override for subscription {sub_id}");
        let _identity = DelegatedIdentity::acquire(self.delegate, self.uid)?;
        let overrides = arguments.to_persistable();
        self.carrier.override_config(sub_id, Some(&overrides), true)?;
        Ok(())
    }

    /// Removes any standing override for `sub_id`, with the same bracket.
    pub fn clear_config(&self, sub_id: SubscriptionId) -> Result<(), BrokerError> {
        info!("clearing carrier config override for subscription {sub_id}");
        let _identity = DelegatedIdentity::acquire(self.delegate, self.uid)?;
        self.carrier.override_config(sub_id, None, true)?;
        Ok(())
    }
}
