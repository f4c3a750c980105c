use nix::unistd::Uid;
use thiserror::Error;

pub type DelegationResult<T> = Result<T, DelegationError>;

#[derive(Debug, Error)]
pub enum DelegationError {
    #[error("shell identity delegation is already held by this process")]
    AlreadyHeld,
    #[error("failed to start delegated shell identity: {0}")]
    StartFailed(String),
    #[error("delegation broker unreachable: {0}")]
    BrokerUnreachable(std::io::Error),
}

/// A broker that can temporarily delegate the shell permission identity to
/// another uid. The underlying session is process-global and non-reentrant:
/// starting a delegation while one is held must fail.
pub trait IdentityDelegate {
    fn start_delegate(&self, uid: Uid) -> DelegationResult<()>;

    /// Tears down the delegation. Infallible at this boundary; transports
    /// log failures rather than surface them, since release runs during
    /// cleanup and must not mask the original error.
    fn stop_delegate(&self);
}

/// Scoped hold on a delegated shell identity. Releasing is tied to `Drop`,
/// so the delegation is torn down on every exit path from the bracketed
/// region, including unwinding.
pub struct DelegatedIdentity<'a, D: IdentityDelegate + ?Sized> {
    delegate: &'a D,
}

impl<D: IdentityDelegate + ?Sized> std::fmt::Debug for DelegatedIdentity<'_, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelegatedIdentity").finish_non_exhaustive()
    }
}

impl<'a, D: IdentityDelegate + ?Sized> DelegatedIdentity<'a, D> {
    /// Starts delegating to `uid`. If the start itself fails, no release is
    /// issued; the guard only exists once the delegation is actually held.
    pub fn acquire(delegate: &'a D, uid: Uid) -> DelegationResult<Self> {
        delegate.start_delegate(uid)?;
        Ok(DelegatedIdentity { delegate })
    }
}

impl<D: IdentityDelegate + ?Sized> Drop for DelegatedIdentity<'_, D> {
    fn drop(&mut self) {
        self.delegate.stop_delegate();
    }
}
