//! Readiness flags and lifecycle states reported by connections.

bitflags::bitflags! {
    /// Readiness reported by a connection after each I/O step.
    ///
    /// Flags are independent of each other. The manager reacts to every flag
    /// separately and only when its value differs from the last observation.
    /// The empty set means the connection is dormant.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Readiness: u16 {
        /// Wants to receive data.
        const READABLE = 1 << 0;
        /// Has data to send.
        const WRITABLE = 1 << 1;
        /// Needs attention from the protocol layer.
        const ATTENTION = 1 << 2;
        /// Must be supervised by a timeout.
        const NEED_TIMEOUT = 1 << 3;
        /// An I/O error occurred.
        const HAD_ERROR = 1 << 4;
        /// A receive error occurred.
        const HAD_RX_ERROR = 1 << 5;
        /// A send error occurred.
        const HAD_TX_ERROR = 1 << 6;
        /// The transport is broken beyond repair.
        const DEAD = 1 << 7;
    }
}

impl Readiness {
    /// No flags set.
    pub const DORMANT: Self = Self::empty();

    #[inline]
    pub fn is_dormant(&self) -> bool {
        self.is_empty()
    }

    #[inline]
    pub fn is_readable(&self) -> bool {
        self.contains(Self::READABLE)
    }

    #[inline]
    pub fn is_writable(&self) -> bool {
        self.contains(Self::WRITABLE)
    }

    #[inline]
    pub fn needs_attention(&self) -> bool {
        self.contains(Self::ATTENTION)
    }

    #[inline]
    pub fn needs_timeout(&self) -> bool {
        self.contains(Self::NEED_TIMEOUT)
    }

    #[inline]
    pub fn is_dead(&self) -> bool {
        self.contains(Self::DEAD)
    }

    /// Flags whose value differs between `self` and `previous`.
    #[inline]
    pub fn changed_from(&self, previous: Readiness) -> Readiness {
        *self ^ previous
    }
}

/// Coarse lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    #[default]
    Dormant,
    Active,
    Dead,
}

impl Lifecycle {
    #[inline]
    pub fn is_dead(&self) -> bool {
        matches!(self, Lifecycle::Dead)
    }
}
