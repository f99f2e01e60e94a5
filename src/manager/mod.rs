//! The connection manager.
//!
//! Owns the slot table, the readable/writable handle sets, the timeout list
//! and the serviceable list for one set of connections. Everything runs on
//! the caller's thread: the caller blocks on its polling primitive and feeds
//! the results back through [`ConnectionManager::process_ready`] and
//! [`ConnectionManager::process_timeouts`].

mod cycle;
mod track;

use crate::builder::ManagerBuilder;
use crate::clock::Clock;
use crate::config::ManagerConfig;
use crate::connection::{Connection, ConnectionRef, ManagerToken};
use crate::error::{ConfigError, Error};
use crate::handle::{Handle, HandleSet};
use crate::list::SlotList;
use crate::table::{IndexingMode, Membership, SlotId, SlotTable};
use tracing::{debug, warn};
use std::rc::Rc;
use std::time::Instant;

/// Snapshot of the manager's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    /// Registered connections.
    pub connections: usize,
    /// Connections waiting in the serviceable list.
    pub serviceable: usize,
    /// Reported `HAD_ERROR` flags.
    pub io_errors: u64,
    /// Reported `HAD_RX_ERROR` flags.
    pub rx_errors: u64,
    /// Reported `HAD_TX_ERROR` flags.
    pub tx_errors: u64,
}

#[derive(Debug, Default)]
struct ErrorCounters {
    io: u64,
    rx: u64,
    tx: u64,
}

/// Tracks registered connections and drives their I/O.
///
/// # Example
///
/// ```ignore
/// let mut manager: ConnectionManager = ConnectionManager::new();
/// manager.add_connection(listener.clone())?;
///
/// loop {
///     let sets = manager.poll_sets();
///     let wait = manager.earliest_span(manager.now());
///     let ready = connmgr::poll::wait(&sets, wait)?;
///
///     manager.process_ready(&ready.readable, &ready.writable);
///     manager.process_timeouts(manager.now());
///
///     while let Some(conn) = manager.next_serviceable() {
///         // hand `conn` to the protocol layer ...
///         manager.reactivate(&conn);
///     }
/// }
/// ```
pub struct ConnectionManager<C: Connection + ?Sized + 'static = dyn Connection> {
    table: Box<dyn SlotTable<C>>,
    clock: Rc<dyn Clock>,
    readable: HandleSet,
    writable: HandleSet,
    timeouts: SlotList,
    serviceable: SlotList,
    errors: ErrorCounters,
    fast_write: bool,
}

impl<C: Connection + ?Sized + 'static> ConnectionManager<C> {
    /// Create a manager with the default configuration and system clock.
    pub fn new() -> Self {
        ManagerBuilder::new().build_unchecked()
    }

    /// Create a manager from a validated configuration.
    pub fn with_config(config: ManagerConfig) -> Result<Self, ConfigError> {
        ManagerBuilder::new().config(config).build()
    }

    pub(crate) fn from_parts(
        table: Box<dyn SlotTable<C>>,
        clock: Rc<dyn Clock>,
        fast_write: bool,
    ) -> Self {
        Self {
            table,
            clock,
            readable: HandleSet::new(),
            writable: HandleSet::new(),
            timeouts: SlotList::new(),
            serviceable: SlotList::new(),
            errors: ErrorCounters::default(),
            fast_write,
        }
    }

    /// Current time according to the manager's clock.
    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    pub fn indexing(&self) -> IndexingMode {
        self.table.mode()
    }

    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Put a connection under the control of the manager.
    ///
    /// The connection is asked for its current readiness right away, so a
    /// listening connection starts out readable without further setup. A
    /// connection that turns out dead at this point is handled like any
    /// other dead connection, so it may already be gone when this returns.
    pub fn add_connection(&mut self, conn: ConnectionRef<C>) -> Result<SlotId, Error> {
        let handle = conn.borrow().handle();
        let id = match self.table.insert(handle) {
            Ok(id) => id,
            Err(e @ Error::AlreadyRegistered(_)) => {
                debug!("rejecting connection: {e}");
                return Err(e);
            }
            Err(e) => {
                warn!("rejecting connection on handle {handle}: {e}");
                return Err(e);
            }
        };

        if let Some(slot) = self.table.get_mut(id) {
            slot.connection = Some(conn.clone());
        }
        conn.borrow_mut()
            .bind_manager(Some(ManagerToken::new(id, handle)));

        debug!("registered connection on handle {handle} in slot {}", id.as_usize());

        let readiness = conn.borrow().readiness();
        if self.track(id, readiness).is_dead() {
            self.bury(id, &conn);
        }
        Ok(id)
    }

    /// Take a connection out of the control of the manager.
    ///
    /// The connection is deselected for reading and writing and dropped from
    /// whichever list it was in. The manager releases its reference; the
    /// connection itself is left untouched otherwise.
    pub fn remove_connection(&mut self, conn: &ConnectionRef<C>) -> Result<(), Error> {
        let handle = conn.borrow().handle();
        self.unregister(handle).map(|_| ())
    }

    /// Put a connection back into its default mode, e.g. after an I/O error
    /// on a datagram transport.
    pub fn reset_connection(&mut self, conn: &ConnectionRef<C>) -> Result<(), Error> {
        let handle = conn.borrow().handle();
        let id = self.table.lookup(handle).ok_or(Error::NotRegistered(handle))?;
        if conn.borrow().state().is_dead() {
            return Err(Error::ConnectionDead(handle));
        }

        debug!("resetting connection on handle {handle}");
        let readiness = conn.borrow_mut().reset(false);
        self.track(id, readiness);
        Ok(())
    }

    /// The connection registered for `handle`.
    pub fn lookup_connection(&self, handle: Handle) -> Option<ConnectionRef<C>> {
        let id = self.table.lookup(handle)?;
        self.table.get(id)?.connection.clone()
    }

    /// Unregister the connection on `handle` and hand back the manager's
    /// reference to it.
    fn unregister(&mut self, handle: Handle) -> Result<ConnectionRef<C>, Error> {
        let id = self.table.lookup(handle).ok_or(Error::NotRegistered(handle))?;

        self.detach(id);
        self.readable.remove(handle);
        self.writable.remove(handle);

        let conn = self
            .table
            .get_mut(id)
            .and_then(|slot| slot.connection.take())
            .ok_or(Error::NotRegistered(handle))?;
        self.table.erase(handle);

        conn.borrow_mut().bind_manager(None);
        debug!("unregistered connection on handle {handle}");
        Ok(conn)
    }

    /// Unregister, shut down and release an auto-destroyable connection.
    fn destroy(&mut self, handle: Handle) {
        if let Ok(conn) = self.unregister(handle) {
            conn.borrow_mut().shutdown();
            debug!("destroyed connection on handle {handle}");
        }
    }

    #[inline]
    fn connection_at(&self, id: SlotId) -> Option<ConnectionRef<C>> {
        self.table.get(id)?.connection.clone()
    }

    // ------------------------------------------------------------------
    // Statistics
    // ------------------------------------------------------------------

    pub fn connection_count(&self) -> usize {
        self.table.len()
    }

    pub fn serviceable_count(&self) -> usize {
        self.serviceable.len()
    }

    pub fn io_errors(&self) -> u64 {
        self.errors.io
    }

    pub fn rx_errors(&self) -> u64 {
        self.errors.rx
    }

    pub fn tx_errors(&self) -> u64 {
        self.errors.tx
    }

    pub fn stats(&self) -> Stats {
        Stats {
            connections: self.connection_count(),
            serviceable: self.serviceable_count(),
            io_errors: self.errors.io,
            rx_errors: self.errors.rx,
            tx_errors: self.errors.tx,
        }
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Which list the connection on `handle` currently sits in.
    pub fn membership(&self, handle: Handle) -> Option<Membership> {
        let id = self.table.lookup(handle)?;
        self.table.get(id).map(|slot| slot.membership)
    }

    /// Handles in the timeout list, earliest deadline first.
    pub fn timeout_order(&self) -> Vec<(Handle, Instant)> {
        self.timeouts
            .iter(&*self.table)
            .filter_map(|id| {
                let slot = self.table.get(id)?;
                Some((slot.handle, slot.deadline?))
            })
            .collect()
    }

    /// Verify the structural invariants of the lists, sets and counters.
    ///
    /// Walks every slot, so it is meant for tests and debugging rather than
    /// the hot path.
    pub fn check_invariants(&self) -> Result<(), String> {
        let mut in_timeouts = 0;
        let mut previous: Option<Instant> = None;
        for id in self.timeouts.iter(&*self.table) {
            let slot = self.table.get(id).ok_or("timeout list links a missing slot")?;
            if slot.membership != Membership::Timeout {
                return Err(format!("slot {} in timeout list is {:?}", id.as_usize(), slot.membership));
            }
            let deadline = slot.deadline.ok_or("timeout list slot without deadline")?;
            if previous.is_some_and(|p| p > deadline) {
                return Err("timeout list is not sorted".to_string());
            }
            previous = Some(deadline);
            in_timeouts += 1;
        }
        if in_timeouts != self.timeouts.len() {
            return Err("timeout list length mismatch".to_string());
        }

        let mut in_serviceable = 0;
        for id in self.serviceable.iter(&*self.table) {
            let slot = self.table.get(id).ok_or("serviceable list links a missing slot")?;
            if slot.membership != Membership::Serviceable {
                return Err(format!(
                    "slot {} in serviceable list is {:?}",
                    id.as_usize(),
                    slot.membership
                ));
            }
            in_serviceable += 1;
        }
        if in_serviceable != self.serviceable.len() {
            return Err("serviceable list length mismatch".to_string());
        }

        let claimed = self.table.claimed();
        let mut timeouts_tagged = 0;
        let mut serviceable_tagged = 0;
        for id in &claimed {
            let slot = self.table.get(*id).ok_or("claimed slot missing")?;
            if slot.connection.is_none() {
                return Err(format!("slot {} is claimed but unbound", id.as_usize()));
            }
            match slot.membership {
                Membership::Timeout => timeouts_tagged += 1,
                Membership::Serviceable => serviceable_tagged += 1,
                Membership::Free => return Err("claimed slot tagged free".to_string()),
                Membership::Untracked => {}
            }
        }
        if timeouts_tagged != in_timeouts || serviceable_tagged != in_serviceable {
            return Err("list membership tags disagree with list contents".to_string());
        }

        for handle in self.readable.iter().chain(self.writable.iter()) {
            if self.table.lookup(handle).is_none() {
                return Err(format!("handle {handle} is polled but not registered"));
            }
        }
        Ok(())
    }
}

impl<C: Connection + ?Sized + 'static> Default for ConnectionManager<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Connection + ?Sized + 'static> Drop for ConnectionManager<C> {
    fn drop(&mut self) {
        for id in self.table.claimed() {
            let Some(conn) = self.connection_at(id) else {
                continue;
            };
            let auto = conn
                .try_borrow()
                .map(|c| c.is_auto_destroyable())
                .unwrap_or(false);
            if auto {
                let handle = self.table.get(id).map(|slot| slot.handle);
                if let Some(handle) = handle {
                    self.destroy(handle);
                }
            }
        }
    }
}
