use std::fmt;

use thiserror::Error;

use crate::bundle::PersistableBundle;

/// Identifies a SIM/carrier profile. Opaque; validation is the platform
/// service's job, not ours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub i32);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub type CarrierConfigResult<T> = Result<T, CarrierConfigError>;

#[derive(Debug, Error)]
pub enum CarrierConfigError {
    #[error("failed to reach the carrier config service: {0}")]
    ServiceUnreachable(std::io::Error),
    #[error("carrier config service rejected `{command}`: {message}")]
    CommandRejected { command: String, message: String },
    #[error("cannot render {type_name} value for key {key} over the shell transport")]
    UnsupportedOverride {
        key: String,
        type_name: &'static str,
    },
}

/// The carrier configuration override surface of the telephony stack.
pub trait CarrierConfigService {
    /// Applies `overrides` for `sub_id`, or removes any standing override
    /// when `overrides` is `None`. With `persist` the change survives
    /// reboot. May fail on a bad subscription id or a permission denial.
    fn override_config(
        &self,
        sub_id: SubscriptionId,
        overrides: Option<&PersistableBundle>,
        persist: bool,
    ) -> CarrierConfigResult<()>;

    /// Reads back the service's textual rendering of a single config value.
    fn query_config(&self, sub_id: SubscriptionId, key: &str) -> CarrierConfigResult<String>;
}
