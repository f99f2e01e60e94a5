//! The poll cycle: exporting handle sets, consuming readiness and timeouts,
//! and handing connections to the protocol layer.

use super::ConnectionManager;
use crate::connection::{Connection, ConnectionRef};
use crate::handle::{Handle, HandleSet, PollSets};
use crate::table::{Membership, SlotId};
use tracing::{debug, trace};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
enum Direction {
    Send,
    Receive,
}

impl<C: Connection + ?Sized + 'static> ConnectionManager<C> {
    /// Copies of the readable and writable handle sets for the polling
    /// primitive.
    pub fn poll_sets(&self) -> PollSets {
        PollSets {
            readable: self.readable.clone(),
            writable: self.writable.clone(),
            capacity: self.table.capacity(),
        }
    }

    /// Whether any connection is under timeout supervision.
    pub fn has_timeouts(&self) -> bool {
        !self.timeouts.is_empty()
    }

    /// When the first supervised connection times out. `None` means no
    /// connection is supervised, i.e. the next timeout is infinitely far away.
    pub fn earliest_deadline(&self) -> Option<Instant> {
        let head = self.timeouts.head()?;
        self.table.get(head)?.deadline
    }

    /// Time left until the earliest deadline, zero if it already passed.
    /// `None` when nothing is supervised; pass it straight to the polling
    /// primitive as "wait indefinitely".
    pub fn earliest_span(&self, now: Instant) -> Option<Duration> {
        self.earliest_deadline()
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// Expire every connection whose deadline is at or before `now`.
    ///
    /// Auto-destroyable connections are shut down and released, the others
    /// are reset forcefully. Returns the number of expired connections.
    pub fn process_timeouts(&mut self, now: Instant) -> usize {
        // the list is sorted, so the first future deadline ends the walk
        let due: Vec<SlotId> = self
            .timeouts
            .iter(&*self.table)
            .take_while(|id| {
                self.table
                    .get(*id)
                    .and_then(|slot| slot.deadline)
                    .is_some_and(|deadline| deadline <= now)
            })
            .collect();

        let mut expired = 0;
        for id in due {
            let Some(slot) = self.table.get(id) else {
                continue;
            };
            if slot.membership != Membership::Timeout
                || !slot.deadline.is_some_and(|deadline| deadline <= now)
            {
                continue;
            }
            let handle = slot.handle;
            let Some(conn) = slot.connection.clone() else {
                continue;
            };

            debug!("connection on handle {handle} timed out");
            expired += 1;

            if conn.borrow().is_auto_destroyable() {
                self.destroy(handle);
            } else {
                self.detach(id);
                let readiness = conn.borrow_mut().reset(true);
                self.track(id, readiness);
            }
        }
        expired
    }

    /// Drive I/O on the handles the polling primitive reported ready.
    ///
    /// Writable handles are served before readable ones, so replies already
    /// queued go out before new requests come in. A connection that reports
    /// itself dead is destroyed if it is auto-destroyable and reset
    /// otherwise. Returns the number of serviceable connections.
    pub fn process_ready(&mut self, readable: &HandleSet, writable: &HandleSet) -> usize {
        for handle in writable {
            self.drive(handle, Direction::Send);
        }
        for handle in readable {
            self.drive(handle, Direction::Receive);
        }
        self.serviceable.len()
    }

    fn drive(&mut self, handle: Handle, direction: Direction) {
        let Some(id) = self.table.lookup(handle) else {
            trace!("ignoring ready handle {handle}: not registered");
            return;
        };
        let Some(conn) = self.connection_at(id) else {
            return;
        };

        let result = match direction {
            Direction::Send => conn.borrow_mut().send(),
            Direction::Receive => conn.borrow_mut().receive(),
        };
        let last = self.track(id, result);

        if result.is_dead() || last.is_dead() {
            self.bury(id, &conn);
        }
    }

    /// Deal with a connection that failed beyond repair.
    pub(super) fn bury(&mut self, id: SlotId, conn: &ConnectionRef<C>) {
        let handle = conn.borrow().handle();
        debug!("connection on handle {handle} is dead");

        if conn.borrow().is_auto_destroyable() {
            self.destroy(handle);
        } else {
            let readiness = conn.borrow_mut().reset(false);
            self.track(id, readiness);
        }
    }

    /// Pop the connection that has waited longest for service.
    pub fn next_serviceable(&mut self) -> Option<ConnectionRef<C>> {
        let id = self.serviceable.pop_front(&mut *self.table)?;
        let slot = self.table.get_mut(id)?;
        slot.membership = Membership::Untracked;
        slot.connection.clone()
    }

    /// Bring a connection back into play after the protocol layer is done
    /// with it.
    ///
    /// Live connections are reconciled with their current readiness. Dead
    /// auto-destroyable connections are shut down and released; other dead
    /// connections get a best-effort reset. Returns whether the connection
    /// is still registered and alive.
    pub fn reactivate(&mut self, conn: &ConnectionRef<C>) -> bool {
        let handle = conn.borrow().handle();
        let Some(id) = self.table.lookup(handle) else {
            return false;
        };

        if !conn.borrow().state().is_dead() {
            let readiness = conn.borrow().readiness();
            if !self.track(id, readiness).is_dead() {
                return true;
            }
            // the fast write found the transport broken
            self.bury(id, conn);
            return self.table.lookup(handle).is_some() && !conn.borrow().state().is_dead();
        }

        if conn.borrow().is_auto_destroyable() {
            self.destroy(handle);
            return false;
        }

        debug!("reactivating dead connection on handle {handle}, resetting");
        let readiness = conn.borrow_mut().reset(false);
        self.track(id, readiness);
        !conn.borrow().state().is_dead()
    }
}
