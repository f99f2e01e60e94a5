//! Readiness multiplexing over `poll(2)`.
//!
//! The manager never blocks. These helpers do the blocking part of a poll
//! cycle on its behalf: turn the exported handle sets into a `poll()` call,
//! and feed the ready subsets and expired deadlines back.

use crate::connection::Connection;
use crate::handle::{Handle, PollSets};
use crate::manager::ConnectionManager;
use tracing::trace;
use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

/// Block until a handle in `sets` is ready or `timeout` passes.
///
/// `None` waits indefinitely. Returns the subsets that are ready; a handle in
/// an error or hang-up condition is reported ready in every direction it was
/// waiting on, so its connection gets to observe the failure. An interrupted
/// wait returns empty sets.
pub fn wait(sets: &PollSets, timeout: Option<Duration>) -> io::Result<PollSets> {
    let mut fds: Vec<libc::pollfd> = Vec::with_capacity(sets.readable.len() + sets.writable.len());

    for handle in sets.readable.iter().chain(sets.writable.iter()) {
        let Ok(fd) = RawFd::try_from(handle.as_u64()) else {
            continue;
        };
        if fds.iter().any(|pfd| pfd.fd == fd) {
            continue;
        }
        let mut events: libc::c_short = 0;
        if sets.readable.contains(handle) {
            events |= libc::POLLIN;
        }
        if sets.writable.contains(handle) {
            events |= libc::POLLOUT;
        }
        fds.push(libc::pollfd {
            fd,
            events,
            revents: 0,
        });
    }

    let timeout_ms = timeout_millis(timeout);
    let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };

    let mut ready = PollSets {
        capacity: sets.capacity,
        ..PollSets::default()
    };

    if rc < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(ready);
        }
        return Err(err);
    }

    for pfd in fds.iter().filter(|pfd| pfd.revents != 0) {
        let handle = Handle::new(pfd.fd as u64);
        let failed = pfd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0;

        if pfd.revents & libc::POLLIN != 0 || (failed && sets.readable.contains(handle)) {
            ready.readable.insert(handle);
        }
        if pfd.revents & libc::POLLOUT != 0 || (failed && sets.writable.contains(handle)) {
            ready.writable.insert(handle);
        }
    }

    Ok(ready)
}

/// Round up to whole milliseconds so a wait never ends before its deadline.
fn timeout_millis(timeout: Option<Duration>) -> libc::c_int {
    match timeout {
        None => -1,
        Some(d) => {
            let ms = d.as_nanos().div_ceil(1_000_000);
            ms.min(libc::c_int::MAX as u128) as libc::c_int
        }
    }
}

/// Run one poll cycle: wait for readiness or the earliest deadline (capped by
/// `max_wait`), drive I/O on the ready handles and expire due timeouts.
///
/// Returns the number of serviceable connections. With nothing to poll, no
/// supervised connection and no `max_wait`, this blocks indefinitely.
pub fn poll_once<C: Connection + ?Sized + 'static>(
    manager: &mut ConnectionManager<C>,
    max_wait: Option<Duration>,
) -> io::Result<usize> {
    let sets = manager.poll_sets();
    let until_deadline = manager.earliest_span(manager.now());
    let timeout = match (until_deadline, max_wait) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    };

    let ready = wait(&sets, timeout)?;
    trace!(
        "poll: {} readable, {} writable ready",
        ready.readable.len(),
        ready.writable.len()
    );

    manager.process_ready(&ready.readable, &ready.writable);
    let now = manager.now();
    manager.process_timeouts(now);
    Ok(manager.serviceable_count())
}
