//! VmmHandler - Runtime operations on a running instance.

use guestprep_shared::GuestprepResult;

/// Runtime operations on a running instance.
///
/// Separates runtime operations (destroy, state query) from spawning
/// ([`super::VmmController`]). The handler is purely about instance
/// lifecycle:
/// - Force-destroy the instance
/// - Check if it is still running
/// - Identify it in logs
pub trait VmmHandler: Send + Sync {
    /// Hard-stop the instance. Idempotent: destroying a stopped instance
    /// succeeds.
    fn destroy(&mut self) -> GuestprepResult<()>;

    /// Check if the instance is still running.
    fn is_running(&self) -> bool;

    /// Instance name as known to the hypervisor.
    fn id(&self) -> &str;
}
