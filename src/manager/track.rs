//! Readiness reconciliation and timeout list maintenance.

use super::ConnectionManager;
use crate::connection::Connection;
use crate::list::Links;
use crate::readiness::Readiness;
use crate::table::{Membership, SlotId};
use tracing::{debug, trace};

impl<C: Connection + ?Sized + 'static> ConnectionManager<C> {
    /// Reconcile manager state with freshly observed `readiness`.
    ///
    /// When the connection turns writable and fast writes are enabled, its
    /// pending data is sent right away instead of waiting for the next poll,
    /// and the result is reconciled in turn. That is at most one send: after
    /// the first reconciliation the slot is already writable, so the second
    /// cannot turn it writable again. Returns the last readiness reconciled.
    pub(super) fn track(&mut self, id: SlotId, readiness: Readiness) -> Readiness {
        if !self.reconcile(id, readiness) || !self.fast_write {
            return readiness;
        }
        let Some(conn) = self.connection_at(id) else {
            return readiness;
        };

        trace!("fast write in slot {}", id.as_usize());
        let sent = conn.borrow_mut().send();
        self.reconcile(id, sent);
        sent
    }

    /// One reconciliation step. Returns `true` if the connection just became
    /// writable.
    fn reconcile(&mut self, id: SlotId, readiness: Readiness) -> bool {
        let Some(slot) = self.table.get(id) else {
            return false;
        };
        let handle = slot.handle;
        let membership = slot.membership;
        let changed = readiness.changed_from(slot.last);
        let mut fast_write = false;

        if changed.is_readable() {
            if readiness.is_readable() {
                self.readable.insert(handle);
            } else {
                self.readable.remove(handle);
            }
        }
        if changed.is_writable() {
            if readiness.is_writable() {
                self.writable.insert(handle);
                fast_write = true;
            } else {
                self.writable.remove(handle);
            }
        }

        if readiness.needs_attention() {
            if membership != Membership::Serviceable {
                self.detach(id);
                self.serviceable.push_back(&mut *self.table, id);
                self.set_membership(id, Membership::Serviceable);
                trace!("handle {handle} queued for service");
            }
        } else if readiness.needs_timeout() {
            // a slot waiting for service keeps its place; the timeout is
            // armed once it comes back untracked
            if membership == Membership::Untracked {
                self.schedule_timeout(id);
            }
        } else if membership == Membership::Timeout {
            self.detach(id);
            trace!("handle {handle} no longer supervised");
        }

        if readiness.contains(Readiness::HAD_ERROR) {
            self.errors.io += 1;
        }
        if readiness.contains(Readiness::HAD_RX_ERROR) {
            self.errors.rx += 1;
        }
        if readiness.contains(Readiness::HAD_TX_ERROR) {
            self.errors.tx += 1;
        }

        if let Some(slot) = self.table.get_mut(id) {
            slot.last = readiness;
        }
        trace!("handle {handle} readiness {readiness:?}");

        fast_write
    }

    /// Insert the slot into the timeout list, due `timeout()` from now.
    ///
    /// Connections tend to arrive in bursts with equal or growing timeouts,
    /// so the insertion point is searched backward from the tail. Among equal
    /// deadlines the newest entry ends up nearest the tail.
    fn schedule_timeout(&mut self, id: SlotId) {
        let Some(conn) = self.connection_at(id) else {
            return;
        };
        let timeout = conn.borrow().timeout();
        let Some(deadline) = self.clock.now().checked_add(timeout) else {
            debug!("timeout of {timeout:?} in slot {} never expires", id.as_usize());
            return;
        };

        self.detach(id);

        let mut after = self.timeouts.tail();
        while let Some(prev) = after {
            match self.table.get(prev).and_then(|slot| slot.deadline) {
                Some(due) if due > deadline => after = self.table.link(prev).prev,
                _ => break,
            }
        }
        self.timeouts.insert_after(&mut *self.table, after, id);

        if let Some(slot) = self.table.get_mut(id) {
            slot.deadline = Some(deadline);
            slot.membership = Membership::Timeout;
        }
    }

    /// Unlink the slot from whichever list it is in. Claimed slots become
    /// untracked.
    pub(super) fn detach(&mut self, id: SlotId) {
        let Some(slot) = self.table.get(id) else {
            return;
        };
        match slot.membership {
            Membership::Timeout => self.timeouts.unlink(&mut *self.table, id),
            Membership::Serviceable => self.serviceable.unlink(&mut *self.table, id),
            Membership::Untracked | Membership::Free => return,
        }
        self.set_membership(id, Membership::Untracked);
    }

    fn set_membership(&mut self, id: SlotId, membership: Membership) {
        if let Some(slot) = self.table.get_mut(id) {
            slot.membership = membership;
            if membership != Membership::Timeout {
                slot.deadline = None;
            }
        }
    }
}
