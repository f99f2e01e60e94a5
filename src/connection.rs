//! The capability set the manager requires from a transport connection.

use crate::handle::Handle;
use crate::readiness::{Lifecycle, Readiness};
use crate::table::SlotId;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

/// Shared reference to a registered connection.
///
/// The manager holds one clone for as long as the connection is registered.
/// Whoever registered the connection may keep its own clone; auto-destroyable
/// connections are released by dropping the manager's clone.
pub type ConnectionRef<C> = Rc<RefCell<C>>;

/// Back-reference handed to a connection while it is registered.
///
/// Bookkeeping only: it names the slot the manager keeps for the connection
/// and is cleared again when the connection is unregistered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerToken {
    slot: SlotId,
    handle: Handle,
}

impl ManagerToken {
    pub(crate) fn new(slot: SlotId, handle: Handle) -> Self {
        Self { slot, handle }
    }

    pub fn slot(&self) -> SlotId {
        self.slot
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }
}

/// A transport endpoint driven by the connection manager.
///
/// Every I/O method performs at most one unit of work and reports the
/// resulting readiness. The manager never inspects payloads; it only reacts
/// to the flags.
///
/// Implementations must not hold a borrow of themselves across calls into
/// the manager, since the manager borrows the connection mutably to drive it.
pub trait Connection {
    /// The native handle, stable for the lifetime of the registration.
    fn handle(&self) -> Handle;

    /// Send pending data.
    fn send(&mut self) -> Readiness;

    /// Receive available data.
    fn receive(&mut self) -> Readiness;

    /// Return to the baseline mode. `forceful` is set when the reset is the
    /// result of a timeout.
    fn reset(&mut self, forceful: bool) -> Readiness;

    /// Release transport resources. Must be idempotent.
    fn shutdown(&mut self);

    /// Current readiness without performing I/O.
    fn readiness(&self) -> Readiness;

    fn state(&self) -> Lifecycle;

    /// How long the connection may stay in a timeout-supervised mode.
    fn timeout(&self) -> Duration;

    /// Whether the manager may shut down and release this connection on its
    /// own when it dies or times out.
    fn is_auto_destroyable(&self) -> bool;

    /// Called with `Some` on registration and `None` on unregistration.
    fn bind_manager(&mut self, token: Option<ManagerToken>) {
        let _ = token;
    }
}

impl<C: Connection + ?Sized> Connection for Box<C> {
    fn handle(&self) -> Handle {
        (**self).handle()
    }

    fn send(&mut self) -> Readiness {
        (**self).send()
    }

    fn receive(&mut self) -> Readiness {
        (**self).receive()
    }

    fn reset(&mut self, forceful: bool) -> Readiness {
        (**self).reset(forceful)
    }

    fn shutdown(&mut self) {
        (**self).shutdown()
    }

    fn readiness(&self) -> Readiness {
        (**self).readiness()
    }

    fn state(&self) -> Lifecycle {
        (**self).state()
    }

    fn timeout(&self) -> Duration {
        (**self).timeout()
    }

    fn is_auto_destroyable(&self) -> bool {
        (**self).is_auto_destroyable()
    }

    fn bind_manager(&mut self, token: Option<ManagerToken>) {
        (**self).bind_manager(token)
    }
}
