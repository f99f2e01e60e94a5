//! Manager builder with fluent API.

use crate::clock::{Clock, SystemClock};
use crate::config::ManagerConfig;
use crate::connection::Connection;
use crate::error::ConfigError;
use crate::manager::ConnectionManager;
use crate::table::{self, IndexingMode};
use std::rc::Rc;

/// Builder for creating a connection manager with custom configuration.
///
/// # Example
///
/// ```ignore
/// use connmgr::{ConnectionManager, IndexingMode, ManagerBuilder};
///
/// let manager: ConnectionManager = ManagerBuilder::new()
///     .indexing(IndexingMode::Sparse)
///     .capacity(4096)
///     .fast_write(false)
///     .build()?;
/// ```
#[derive(Clone)]
pub struct ManagerBuilder {
    config: ManagerConfig,
    clock: Rc<dyn Clock>,
}

impl Default for ManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ManagerBuilder {
    /// Create a new builder with default settings and the system clock.
    pub fn new() -> Self {
        Self {
            config: ManagerConfig::default(),
            clock: Rc::new(SystemClock),
        }
    }

    /// Replace all settings with those of `config`.
    pub fn config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the handle indexing strategy.
    ///
    /// - `Dense`: slots addressed by handle value (default on Unix)
    /// - `Sparse`: hash buckets over a fixed slot pool
    pub fn indexing(mut self, mode: IndexingMode) -> Self {
        self.config.indexing = mode;
        self
    }

    /// Set the maximum number of slots.
    ///
    /// In dense mode, handles must be below this value.
    /// Default: 1024
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity;
        self
    }

    /// Send right away when a connection turns writable, instead of waiting
    /// for the next poll.
    ///
    /// Default: true
    pub fn fast_write(mut self, enabled: bool) -> Self {
        self.config.fast_write = enabled;
        self
    }

    /// Use `clock` to compute deadlines.
    pub fn clock(mut self, clock: Rc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Build the manager with the configured settings.
    pub fn build<C: Connection + ?Sized + 'static>(
        self,
    ) -> Result<ConnectionManager<C>, ConfigError> {
        self.config.validate()?;
        Ok(self.build_unchecked())
    }

    pub(crate) fn build_unchecked<C: Connection + ?Sized + 'static>(self) -> ConnectionManager<C> {
        let table = table::build(self.config.indexing, self.config.capacity);
        ConnectionManager::from_parts(table, self.clock, self.config.fast_write)
    }
}
