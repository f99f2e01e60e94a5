//! Behavior of the connection manager against scripted connections.

use connmgr::{
    Clock, Connection, ConnectionManager, Error, Handle, HandleSet, IndexingMode, Lifecycle,
    ManagerBuilder, ManagerToken, ManualClock, Membership, Readiness, Stats,
};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

const IDLE: Readiness = Readiness::READABLE.union(Readiness::NEED_TIMEOUT);
const SENDING: Readiness = Readiness::WRITABLE.union(Readiness::NEED_TIMEOUT);
const TRANSIENT: Readiness = Readiness::HAD_ERROR
    .union(Readiness::HAD_RX_ERROR)
    .union(Readiness::HAD_TX_ERROR);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    Send(u64),
    Receive(u64),
    Reset(u64, bool),
    Shutdown(u64),
}

type Journal = Rc<RefCell<Vec<Event>>>;
type MockRef = Rc<RefCell<Mock>>;

/// A connection whose I/O results are scripted by the test.
struct Mock {
    handle: Handle,
    readiness: Readiness,
    timeout: Duration,
    auto: bool,
    on_send: VecDeque<Readiness>,
    on_receive: VecDeque<Readiness>,
    reset_to: Readiness,
    sends: usize,
    resets: usize,
    forceful_resets: usize,
    shutdowns: usize,
    token: Option<ManagerToken>,
    journal: Option<Journal>,
}

impl Mock {
    fn new(handle: u64) -> Self {
        Self {
            handle: Handle::new(handle),
            readiness: IDLE,
            timeout: Duration::from_secs(1),
            auto: false,
            on_send: VecDeque::new(),
            on_receive: VecDeque::new(),
            reset_to: IDLE,
            sends: 0,
            resets: 0,
            forceful_resets: 0,
            shutdowns: 0,
            token: None,
            journal: None,
        }
    }

    fn with_readiness(mut self, readiness: Readiness) -> Self {
        self.readiness = readiness;
        self
    }

    fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn auto(mut self) -> Self {
        self.auto = true;
        self
    }

    fn on_send(mut self, readiness: Readiness) -> Self {
        self.on_send.push_back(readiness);
        self
    }

    fn on_receive(mut self, readiness: Readiness) -> Self {
        self.on_receive.push_back(readiness);
        self
    }

    fn journal(mut self, journal: &Journal) -> Self {
        self.journal = Some(journal.clone());
        self
    }

    fn shared(self) -> MockRef {
        Rc::new(RefCell::new(self))
    }

    fn record(&self, event: Event) {
        if let Some(journal) = &self.journal {
            journal.borrow_mut().push(event);
        }
    }

    /// Apply a scripted result. Error flags are reported once, not kept.
    fn step(&mut self, scripted: Option<Readiness>) -> Readiness {
        match scripted {
            Some(result) => {
                self.readiness = result - TRANSIENT;
                result
            }
            None => self.readiness,
        }
    }
}

impl Connection for Mock {
    fn handle(&self) -> Handle {
        self.handle
    }

    fn send(&mut self) -> Readiness {
        self.sends += 1;
        self.record(Event::Send(self.handle.as_u64()));
        let scripted = self.on_send.pop_front();
        self.step(scripted)
    }

    fn receive(&mut self) -> Readiness {
        self.record(Event::Receive(self.handle.as_u64()));
        let scripted = self.on_receive.pop_front();
        self.step(scripted)
    }

    fn reset(&mut self, forceful: bool) -> Readiness {
        self.resets += 1;
        if forceful {
            self.forceful_resets += 1;
        }
        self.record(Event::Reset(self.handle.as_u64(), forceful));
        self.readiness = self.reset_to;
        self.readiness
    }

    fn shutdown(&mut self) {
        self.shutdowns += 1;
        self.record(Event::Shutdown(self.handle.as_u64()));
        self.readiness = Readiness::DEAD;
    }

    fn readiness(&self) -> Readiness {
        self.readiness
    }

    fn state(&self) -> Lifecycle {
        if self.readiness.is_dead() {
            Lifecycle::Dead
        } else if self.readiness.is_dormant() {
            Lifecycle::Dormant
        } else {
            Lifecycle::Active
        }
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn is_auto_destroyable(&self) -> bool {
        self.auto
    }

    fn bind_manager(&mut self, token: Option<ManagerToken>) {
        self.token = token;
    }
}

fn manager(mode: IndexingMode) -> (Rc<ManualClock>, ConnectionManager<Mock>) {
    let clock = Rc::new(ManualClock::new());
    let manager = ManagerBuilder::new()
        .indexing(mode)
        .capacity(64)
        .clock(clock.clone())
        .build()
        .unwrap();
    (clock, manager)
}

fn set(handles: &[u64]) -> HandleSet {
    handles.iter().map(|h| Handle::new(*h)).collect()
}

fn ms(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

const MODES: [IndexingMode; 2] = [IndexingMode::Dense, IndexingMode::Sparse];

#[test]
fn add_and_remove_restore_state() {
    for mode in MODES {
        let (_clock, mut manager) = manager(mode);
        let conn = Mock::new(5).shared();

        manager.add_connection(conn.clone()).unwrap();
        assert_eq!(manager.connection_count(), 1);
        assert!(manager.poll_sets().readable.contains(Handle::new(5)));
        assert!(manager.has_timeouts());
        assert_eq!(manager.membership(Handle::new(5)), Some(Membership::Timeout));
        assert_eq!(
            conn.borrow().token.map(|t| t.handle()),
            Some(Handle::new(5))
        );
        manager.check_invariants().unwrap();

        manager.remove_connection(&conn).unwrap();
        assert_eq!(manager.connection_count(), 0);
        assert!(manager.poll_sets().is_empty());
        assert!(!manager.has_timeouts());
        assert_eq!(manager.earliest_deadline(), None);
        assert!(conn.borrow().token.is_none());
        assert!(manager.lookup_connection(Handle::new(5)).is_none());
        assert_eq!(conn.borrow().shutdowns, 0);
        assert_eq!(Rc::strong_count(&conn), 1);
        manager.check_invariants().unwrap();

        assert_eq!(
            manager.remove_connection(&conn),
            Err(Error::NotRegistered(Handle::new(5)))
        );
    }
}

#[test]
fn duplicate_registration_is_rejected() {
    for mode in MODES {
        let (_clock, mut manager) = manager(mode);
        let first = Mock::new(3).shared();
        let second = Mock::new(3).with_readiness(SENDING).shared();

        manager.add_connection(first.clone()).unwrap();
        let before = manager.poll_sets();

        assert_eq!(
            manager.add_connection(second.clone()),
            Err(Error::AlreadyRegistered(Handle::new(3)))
        );
        assert_eq!(manager.connection_count(), 1);
        assert_eq!(manager.poll_sets(), before);
        assert!(second.borrow().token.is_none());
        assert_eq!(second.borrow().sends, 0);

        let found = manager.lookup_connection(Handle::new(3)).unwrap();
        assert!(Rc::ptr_eq(&found, &first));
        manager.check_invariants().unwrap();
    }
}

#[test]
fn table_limits_are_reported() {
    let (_clock, mut dense) = manager(IndexingMode::Dense);
    assert_eq!(
        dense.add_connection(Mock::new(64).shared()),
        Err(Error::HandleOutOfRange {
            handle: Handle::new(64),
            capacity: 64
        })
    );

    let mut sparse: ConnectionManager<Mock> = ManagerBuilder::new()
        .indexing(IndexingMode::Sparse)
        .capacity(2)
        .build()
        .unwrap();
    sparse.add_connection(Mock::new(u64::MAX - 1).shared()).unwrap();
    sparse.add_connection(Mock::new(1 << 40).shared()).unwrap();
    assert_eq!(
        sparse.add_connection(Mock::new(9).shared()),
        Err(Error::TableFull { capacity: 2 })
    );
    assert_eq!(sparse.connection_count(), 2);
    sparse.check_invariants().unwrap();
}

#[test]
fn earliest_deadline_is_the_minimum() {
    for mode in MODES {
        let (clock, mut manager) = manager(mode);
        for (handle, timeout) in [(1, 500), (2, 100), (3, 300)] {
            let conn = Mock::new(handle).with_timeout(ms(timeout)).shared();
            manager.add_connection(conn).unwrap();
        }

        assert_eq!(manager.earliest_deadline(), Some(clock.at(ms(100))));
        assert_eq!(manager.earliest_span(clock.now()), Some(ms(100)));

        clock.advance(ms(150));
        assert_eq!(manager.earliest_span(clock.now()), Some(Duration::ZERO));

        let order: Vec<u64> = manager
            .timeout_order()
            .iter()
            .map(|(h, _)| h.as_u64())
            .collect();
        assert_eq!(order, vec![2, 3, 1]);
    }
}

#[test]
fn timeouts_fire_in_deadline_order() {
    for mode in MODES {
        let (clock, mut manager) = manager(mode);
        let journal = Journal::default();
        let conns: Vec<MockRef> = [(3, 3), (1, 1), (2, 2)]
            .into_iter()
            .map(|(handle, secs)| {
                Mock::new(handle)
                    .with_timeout(Duration::from_secs(secs))
                    .journal(&journal)
                    .shared()
            })
            .collect();
        for conn in &conns {
            manager.add_connection(conn.clone()).unwrap();
        }

        clock.advance(ms(2500));
        assert_eq!(manager.process_timeouts(clock.now()), 2);
        assert_eq!(
            *journal.borrow(),
            vec![Event::Reset(1, true), Event::Reset(2, true)]
        );

        // the reset connections are supervised again from now
        let order: Vec<(u64, Duration)> = manager
            .timeout_order()
            .iter()
            .map(|(h, deadline)| (h.as_u64(), *deadline - clock.at(Duration::ZERO)))
            .collect();
        assert_eq!(
            order,
            vec![(3, ms(3000)), (1, ms(3500)), (2, ms(4500))]
        );
        assert_eq!(conns[0].borrow().resets, 0);
        assert_eq!(manager.connection_count(), 3);
        manager.check_invariants().unwrap();

        assert_eq!(manager.process_timeouts(clock.now()), 0);
    }
}

#[test]
fn auto_destroyable_connection_is_released_on_timeout() {
    for mode in MODES {
        let (clock, mut manager) = manager(mode);
        let conn = Mock::new(4).auto().shared();
        manager.add_connection(conn.clone()).unwrap();

        clock.advance(ms(999));
        assert_eq!(manager.process_timeouts(clock.now()), 0);

        clock.advance(ms(1));
        assert_eq!(manager.process_timeouts(clock.now()), 1);
        assert_eq!(manager.connection_count(), 0);
        assert_eq!(conn.borrow().shutdowns, 1);
        assert_eq!(conn.borrow().resets, 0);
        assert!(conn.borrow().token.is_none());
        assert!(manager.poll_sets().is_empty());
        assert_eq!(Rc::strong_count(&conn), 1);
        manager.check_invariants().unwrap();
    }
}

#[test]
fn dead_connection_is_reset_when_not_auto_destroyable() {
    for mode in MODES {
        let (_clock, mut manager) = manager(mode);
        let conn = Mock::new(7)
            .on_receive(Readiness::DEAD | Readiness::HAD_ERROR | Readiness::HAD_RX_ERROR)
            .shared();
        manager.add_connection(conn.clone()).unwrap();

        manager.process_ready(&set(&[7]), &HandleSet::new());

        assert_eq!(conn.borrow().resets, 1);
        assert_eq!(conn.borrow().shutdowns, 0);
        assert_eq!(manager.connection_count(), 1);
        assert_eq!(manager.io_errors(), 1);
        assert_eq!(manager.rx_errors(), 1);
        assert_eq!(manager.tx_errors(), 0);
        assert!(manager.poll_sets().readable.contains(Handle::new(7)));
        assert_eq!(manager.membership(Handle::new(7)), Some(Membership::Timeout));
        manager.check_invariants().unwrap();
    }
}

#[test]
fn dead_connection_is_destroyed_when_auto_destroyable() {
    for mode in MODES {
        let (_clock, mut manager) = manager(mode);
        let conn = Mock::new(8)
            .auto()
            .on_send(Readiness::DEAD | Readiness::HAD_ERROR | Readiness::HAD_TX_ERROR)
            .shared();
        manager.add_connection(conn.clone()).unwrap();

        manager.process_ready(&HandleSet::new(), &set(&[8]));

        assert_eq!(conn.borrow().shutdowns, 1);
        assert_eq!(conn.borrow().resets, 0);
        assert_eq!(manager.connection_count(), 0);
        assert!(manager.lookup_connection(Handle::new(8)).is_none());
        assert_eq!(
            manager.stats(),
            Stats {
                connections: 0,
                serviceable: 0,
                io_errors: 1,
                rx_errors: 0,
                tx_errors: 1,
            }
        );

        // a stale readiness report for the released handle is ignored
        manager.process_ready(&set(&[8]), &set(&[8]));
        assert_eq!(conn.borrow().shutdowns, 1);
        manager.check_invariants().unwrap();
    }
}

#[test]
fn writes_are_driven_before_reads() {
    let (_clock, mut manager) = manager(IndexingMode::Dense);
    let journal = Journal::default();
    for handle in [1, 2] {
        let conn = Mock::new(handle).journal(&journal).shared();
        manager.add_connection(conn).unwrap();
    }

    manager.process_ready(&set(&[1, 2]), &set(&[2]));
    assert_eq!(
        *journal.borrow(),
        vec![Event::Send(2), Event::Receive(1), Event::Receive(2)]
    );
}

#[test]
fn serviceable_connections_come_out_in_arrival_order() {
    for mode in MODES {
        let (_clock, mut manager) = manager(mode);
        let conns: Vec<MockRef> = [10, 11, 12]
            .into_iter()
            .map(|handle| Mock::new(handle).on_receive(Readiness::ATTENTION).shared())
            .collect();
        for conn in &conns {
            manager.add_connection(conn.clone()).unwrap();
        }

        assert_eq!(manager.process_ready(&set(&[11]), &HandleSet::new()), 1);
        assert_eq!(manager.process_ready(&set(&[10]), &HandleSet::new()), 2);
        assert_eq!(manager.process_ready(&set(&[12]), &HandleSet::new()), 3);

        // waiting for service means no timeout and no polling
        assert!(!manager.has_timeouts());
        assert!(manager.poll_sets().is_empty());
        manager.check_invariants().unwrap();

        let mut order = Vec::new();
        while let Some(conn) = manager.next_serviceable() {
            let handle = conn.borrow().handle();
            assert_eq!(manager.membership(handle), Some(Membership::Untracked));
            order.push(handle.as_u64());
        }
        assert_eq!(order, vec![11, 10, 12]);
        assert_eq!(manager.serviceable_count(), 0);
        assert!(manager.next_serviceable().is_none());
        manager.check_invariants().unwrap();
    }
}

#[test]
fn repeated_attention_keeps_queue_position() {
    for mode in MODES {
        let (_clock, mut manager) = manager(mode);
        let first = Mock::new(1)
            .on_receive(Readiness::ATTENTION)
            .on_receive(Readiness::ATTENTION)
            .shared();
        let second = Mock::new(2).on_receive(Readiness::ATTENTION).shared();
        manager.add_connection(first).unwrap();
        manager.add_connection(second).unwrap();

        manager.process_ready(&set(&[1]), &HandleSet::new());
        manager.process_ready(&set(&[2]), &HandleSet::new());
        assert_eq!(manager.process_ready(&set(&[1]), &HandleSet::new()), 2);
        manager.check_invariants().unwrap();

        let order: Vec<u64> = std::iter::from_fn(|| manager.next_serviceable())
            .map(|conn| conn.borrow().handle().as_u64())
            .collect();
        assert_eq!(order, vec![1, 2]);
    }
}

#[test]
fn reactivate_rearms_live_connection() {
    for mode in MODES {
        let (clock, mut manager) = manager(mode);
        let conn = Mock::new(6).on_receive(Readiness::ATTENTION).shared();
        manager.add_connection(conn.clone()).unwrap();
        manager.process_ready(&set(&[6]), &HandleSet::new());

        let served = manager.next_serviceable().unwrap();
        clock.advance(ms(200));
        served.borrow_mut().readiness = IDLE;

        assert!(manager.reactivate(&served));
        assert_eq!(manager.membership(Handle::new(6)), Some(Membership::Timeout));
        assert_eq!(manager.earliest_deadline(), Some(clock.at(ms(1200))));
        assert!(manager.poll_sets().readable.contains(Handle::new(6)));
        manager.check_invariants().unwrap();
    }
}

#[test]
fn reactivate_handles_dead_connections() {
    for mode in MODES {
        let (_clock, mut manager) = manager(mode);
        let owned = Mock::new(1).on_receive(Readiness::ATTENTION).shared();
        let ephemeral = Mock::new(2).auto().on_receive(Readiness::ATTENTION).shared();
        manager.add_connection(owned.clone()).unwrap();
        manager.add_connection(ephemeral.clone()).unwrap();
        manager.process_ready(&set(&[1, 2]), &HandleSet::new());

        while let Some(conn) = manager.next_serviceable() {
            conn.borrow_mut().readiness = Readiness::DEAD;
        }

        // reset brings the owned connection back
        assert!(manager.reactivate(&owned));
        assert_eq!(owned.borrow().resets, 1);
        assert_eq!(owned.borrow().shutdowns, 0);
        assert!(manager.lookup_connection(Handle::new(1)).is_some());

        assert!(!manager.reactivate(&ephemeral));
        assert_eq!(ephemeral.borrow().shutdowns, 1);
        assert!(manager.lookup_connection(Handle::new(2)).is_none());

        // no longer registered
        assert!(!manager.reactivate(&ephemeral));
        assert_eq!(ephemeral.borrow().shutdowns, 1);
        manager.check_invariants().unwrap();
    }
}

#[test]
fn writable_connection_is_flushed_right_away() {
    let (_clock, mut manager) = manager(IndexingMode::Dense);
    let conn = Mock::new(3).on_send(IDLE).shared();
    manager.add_connection(conn.clone()).unwrap();
    conn.borrow_mut().readiness = SENDING;

    assert!(manager.reactivate(&conn));
    assert_eq!(conn.borrow().sends, 1);
    let sets = manager.poll_sets();
    assert!(sets.readable.contains(Handle::new(3)));
    assert!(!sets.writable.contains(Handle::new(3)));
}

#[test]
fn fast_write_stops_while_still_writable() {
    let (_clock, mut manager) = manager(IndexingMode::Dense);
    let conn = Mock::new(3).with_readiness(SENDING).shared();

    manager.add_connection(conn.clone()).unwrap();

    // the send made no progress, so the handle is left to the poll
    assert_eq!(conn.borrow().sends, 1);
    assert!(manager.poll_sets().writable.contains(Handle::new(3)));
    manager.check_invariants().unwrap();
}

#[test]
fn toggling_connection_gets_one_send_per_reconciliation() {
    for mode in MODES {
        let (_clock, mut manager) = manager(mode);
        let conn = Mock::new(3)
            .with_readiness(SENDING)
            .on_send(IDLE)
            .on_send(SENDING)
            .on_send(IDLE)
            .on_send(SENDING)
            .shared();

        manager.add_connection(conn.clone()).unwrap();
        assert_eq!(conn.borrow().sends, 1);
        assert!(manager.poll_sets().writable.is_empty());

        // writable again: one more send, which reports writable once more
        conn.borrow_mut().readiness = SENDING;
        assert!(manager.reactivate(&conn));
        assert_eq!(conn.borrow().sends, 2);
        assert!(manager.poll_sets().writable.contains(Handle::new(3)));

        // the rest of the script is left to the poll cycle
        assert_eq!(conn.borrow().on_send.len(), 2);
        manager.check_invariants().unwrap();
    }
}

#[test]
fn fast_write_can_be_disabled() {
    let mut manager: ConnectionManager<Mock> = ManagerBuilder::new()
        .capacity(16)
        .fast_write(false)
        .build()
        .unwrap();
    let conn = Mock::new(3).with_readiness(SENDING).on_send(IDLE).shared();

    manager.add_connection(conn.clone()).unwrap();
    assert_eq!(conn.borrow().sends, 0);
    assert!(manager.poll_sets().writable.contains(Handle::new(3)));

    manager.process_ready(&HandleSet::new(), &set(&[3]));
    assert_eq!(conn.borrow().sends, 1);
    assert!(manager.poll_sets().writable.is_empty());
}

#[test]
fn dead_fast_write_on_registration_destroys_connection() {
    let (_clock, mut manager) = manager(IndexingMode::Sparse);
    let conn = Mock::new(3)
        .auto()
        .with_readiness(SENDING)
        .on_send(Readiness::DEAD | Readiness::HAD_TX_ERROR)
        .shared();

    assert!(manager.add_connection(conn.clone()).is_ok());
    assert_eq!(conn.borrow().shutdowns, 1);
    assert_eq!(manager.connection_count(), 0);
    assert_eq!(manager.tx_errors(), 1);
    manager.check_invariants().unwrap();
}

#[test]
fn reset_connection_checks_registration_and_state() {
    let (_clock, mut manager) = manager(IndexingMode::Dense);
    let conn = Mock::new(9).on_receive(Readiness::ATTENTION).shared();

    assert_eq!(
        manager.reset_connection(&conn),
        Err(Error::NotRegistered(Handle::new(9)))
    );

    manager.add_connection(conn.clone()).unwrap();
    manager.process_ready(&set(&[9]), &HandleSet::new());
    assert_eq!(manager.membership(Handle::new(9)), Some(Membership::Serviceable));

    conn.borrow_mut().reset_to = Readiness::DORMANT;
    manager.reset_connection(&conn).unwrap();
    assert_eq!(conn.borrow().resets, 1);
    assert_eq!(conn.borrow().forceful_resets, 0);
    // clearing attention does not pull a connection out of the service queue
    assert_eq!(manager.membership(Handle::new(9)), Some(Membership::Serviceable));

    conn.borrow_mut().readiness = Readiness::DEAD;
    assert_eq!(
        manager.reset_connection(&conn),
        Err(Error::ConnectionDead(Handle::new(9)))
    );
    assert_eq!(conn.borrow().resets, 1);
}

#[test]
fn equal_deadlines_keep_insertion_order() {
    for mode in MODES {
        let (_clock, mut manager) = manager(mode);
        for (handle, secs) in [(1, 2), (2, 1), (3, 1), (4, 2), (5, 1)] {
            let conn = Mock::new(handle).with_timeout(Duration::from_secs(secs)).shared();
            manager.add_connection(conn).unwrap();
        }

        let order: Vec<u64> = manager
            .timeout_order()
            .iter()
            .map(|(h, _)| h.as_u64())
            .collect();
        assert_eq!(order, vec![2, 3, 5, 1, 4]);
    }
}

#[test]
fn dropping_manager_releases_auto_destroyable_connections() {
    let ephemeral = Mock::new(1).auto().shared();
    let owned = Mock::new(2).shared();
    {
        let (_clock, mut manager) = manager(IndexingMode::Dense);
        manager.add_connection(ephemeral.clone()).unwrap();
        manager.add_connection(owned.clone()).unwrap();
    }

    assert_eq!(ephemeral.borrow().shutdowns, 1);
    assert!(ephemeral.borrow().token.is_none());
    assert_eq!(owned.borrow().shutdowns, 0);
    assert_eq!(Rc::strong_count(&ephemeral), 1);
    assert_eq!(Rc::strong_count(&owned), 1);
}

#[test]
fn randomized_operations_preserve_invariants() {
    for mode in MODES {
        let (clock, mut manager) = manager(mode);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0x5eed);
        let mut registered: HashMap<u64, MockRef> = HashMap::new();

        for _ in 0..2000 {
            match rng.gen_range(0..6) {
                0 | 1 => {
                    let handle = rng.gen_range(0..64);
                    let mut mock = Mock::new(handle).with_timeout(ms(rng.gen_range(0..1000)));
                    if rng.gen_bool(0.5) {
                        mock = mock.auto();
                    }
                    let conn = mock.shared();
                    match manager.add_connection(conn.clone()) {
                        Ok(_) => {
                            assert!(registered.insert(handle, conn).is_none());
                        }
                        Err(e) => {
                            assert_eq!(e, Error::AlreadyRegistered(Handle::new(handle)));
                            assert!(registered.contains_key(&handle));
                        }
                    }
                }
                2 => {
                    let handle = rng.gen_range(0..64);
                    if let Some(conn) = registered.remove(&handle) {
                        manager.remove_connection(&conn).unwrap();
                    }
                }
                3 => {
                    let handle = rng.gen_range(0..64);
                    if let Some(conn) = registered.get(&handle) {
                        conn.borrow_mut().on_receive.push_back(Readiness::ATTENTION);
                        manager.process_ready(&set(&[handle]), &HandleSet::new());
                    }
                }
                4 => {
                    if let Some(conn) = manager.next_serviceable() {
                        conn.borrow_mut().readiness = IDLE;
                        manager.reactivate(&conn);
                    }
                }
                _ => {
                    clock.advance(ms(rng.gen_range(0..100)));
                    manager.process_timeouts(clock.now());
                    registered.retain(|handle, _| {
                        manager.lookup_connection(Handle::new(*handle)).is_some()
                    });
                }
            }

            manager.check_invariants().unwrap();
            assert_eq!(manager.connection_count(), registered.len());

            let deadlines: Vec<_> = manager.timeout_order().into_iter().map(|(_, d)| d).collect();
            assert!(deadlines.windows(2).all(|w| w[0] <= w[1]));
            assert_eq!(
                manager.earliest_deadline(),
                deadlines.first().copied()
            );
        }
    }
}
