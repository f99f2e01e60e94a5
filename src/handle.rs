//! Native handles and the readable/writable handle sets.

use std::collections::BTreeSet;
use std::fmt;

#[cfg(unix)]
use std::os::unix::io::RawFd;

/// Opaque OS-level identifier of a connection's transport resource.
///
/// On Unix this is a file descriptor. Platforms with opaque socket handles
/// can store any 64-bit value and use the sparse slot table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(u64);

impl Handle {
    /// Create a handle from a raw value.
    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Create a handle from a file descriptor. Negative descriptors are
    /// invalid and yield `None`.
    #[cfg(unix)]
    #[inline]
    pub fn from_raw_fd(fd: RawFd) -> Option<Self> {
        u64::try_from(fd).ok().map(Self)
    }

    /// The descriptor this handle was created from.
    #[cfg(unix)]
    #[inline]
    pub fn as_raw_fd(&self) -> RawFd {
        self.0 as RawFd
    }

    #[inline]
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// The handle as an index, or `None` when it does not fit in `usize`.
    #[inline]
    pub fn as_index(&self) -> Option<usize> {
        usize::try_from(self.0).ok()
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Handle {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// A set of handles, iterated in ascending handle order.
///
/// This plays the part of an `fd_set`: the manager keeps one for handles
/// that want to read and one for handles that want to write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandleSet {
    handles: BTreeSet<Handle>,
}

impl HandleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handle. Returns `false` if it was already present.
    #[inline]
    pub fn insert(&mut self, handle: Handle) -> bool {
        self.handles.insert(handle)
    }

    /// Remove a handle. Returns `false` if it was not present.
    #[inline]
    pub fn remove(&mut self, handle: Handle) -> bool {
        self.handles.remove(&handle)
    }

    #[inline]
    pub fn contains(&self, handle: Handle) -> bool {
        self.handles.contains(&handle)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// The largest handle in the set.
    pub fn max(&self) -> Option<Handle> {
        self.handles.last().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = Handle> + '_ {
        self.handles.iter().copied()
    }
}

impl FromIterator<Handle> for HandleSet {
    fn from_iter<I: IntoIterator<Item = Handle>>(iter: I) -> Self {
        Self {
            handles: iter.into_iter().collect(),
        }
    }
}

impl Extend<Handle> for HandleSet {
    fn extend<I: IntoIterator<Item = Handle>>(&mut self, iter: I) {
        self.handles.extend(iter);
    }
}

impl<'a> IntoIterator for &'a HandleSet {
    type Item = Handle;
    type IntoIter = std::iter::Copied<std::collections::btree_set::Iter<'a, Handle>>;

    fn into_iter(self) -> Self::IntoIter {
        self.handles.iter().copied()
    }
}

/// Snapshot of the handle sets to hand to the polling primitive.
///
/// Also used in the other direction: the subsets reported ready by the
/// polling primitive come back in this shape.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollSets {
    pub readable: HandleSet,
    pub writable: HandleSet,
    /// Configured maximum number of handles the table can track.
    pub capacity: usize,
}

impl PollSets {
    /// One past the largest handle in either set, the `nfds` argument of a
    /// `select()` style call.
    pub fn bound(&self) -> u64 {
        self.readable
            .max()
            .max(self.writable.max())
            .map(|h| h.as_u64() + 1)
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.readable.is_empty() && self.writable.is_empty()
    }
}
