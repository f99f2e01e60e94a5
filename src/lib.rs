//! connmgr - Connection management core for RPC-style network services.
//!
//! The [`ConnectionManager`] keeps track of every registered transport
//! connection, tells the caller which handles to poll for reading and
//! writing, supervises per-connection timeouts, and queues connections that
//! need attention from the protocol layer.
//!
//! # Features
//!
//! - **Handle-indexed slots**: dense tables addressed by file descriptor, or
//!   hashed tables for opaque handles, picked by configuration
//! - **Ordered timeouts**: a sorted list with O(1) earliest-deadline lookup
//! - **FIFO service queue**: connections are handed out in the order they
//!   asked for attention
//! - **Caller-driven**: the manager never blocks; the caller owns the poll
//!
//! # Quick Start
//!
//! ```ignore
//! use connmgr::{ConnectionManager, poll};
//! use std::time::Duration;
//!
//! let mut manager: ConnectionManager = ConnectionManager::new();
//! manager.add_connection(listener.clone())?;
//!
//! loop {
//!     poll::poll_once(&mut manager, Some(Duration::from_secs(1)))?;
//!
//!     while let Some(conn) = manager.next_serviceable() {
//!         // process the connection's request ...
//!         manager.reactivate(&conn);
//!     }
//! }
//! ```
//!
//! # Connections
//!
//! Anything implementing [`Connection`] can be registered. The manager only
//! looks at the [`Readiness`] flags a connection reports after each step and
//! never at the data it carries. Connections whose
//! [`is_auto_destroyable`](Connection::is_auto_destroyable) returns `true` are
//! shut down and released by the manager when they die or time out; all
//! others are reset and left to their owner.

mod builder;
mod clock;
mod config;
mod connection;
mod error;
mod handle;
mod list;
mod manager;
mod readiness;

pub mod table;

#[cfg(unix)]
pub mod poll;
#[cfg(unix)]
pub mod tcp;

// Re-exports
pub use builder::ManagerBuilder;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{DEFAULT_CAPACITY, ManagerConfig};
pub use connection::{Connection, ConnectionRef, ManagerToken};
pub use error::{ConfigError, Error};
pub use handle::{Handle, HandleSet, PollSets};
pub use manager::{ConnectionManager, Stats};
pub use readiness::{Lifecycle, Readiness};
pub use table::{IndexingMode, Membership, SlotId};
