//! TCP transport connections over non-blocking std sockets.
//!
//! [`TcpConnection`] moves raw bytes between a stream and the protocol layer
//! without looking at them. [`TcpListenerConnection`] accepts new streams and
//! raises attention so the caller can register them.

use crate::connection::{Connection, ManagerToken};
use crate::handle::Handle;
use crate::readiness::{Lifecycle, Readiness};
use bytes::{Buf, Bytes, BytesMut};
use tracing::{debug, trace};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::os::unix::io::AsRawFd;
use std::time::Duration;

/// Default time a connection may stay idle or stalled while sending.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Most bytes a single `receive` reads.
const READ_CHUNK: usize = 16 * 1024;

fn handle_of<T: AsRawFd>(fd: &T) -> io::Result<Handle> {
    Handle::from_raw_fd(fd.as_raw_fd())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "invalid file descriptor"))
}

/// Where a stream connection is in its request/reply cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Waiting for a request.
    Idle,
    /// Holding received bytes for the protocol layer.
    Received,
    /// Flushing a queued reply.
    Sending,
    Dead,
}

/// A stream connection that buffers requests and replies.
pub struct TcpConnection {
    stream: Option<TcpStream>,
    handle: Handle,
    peer: Option<SocketAddr>,
    recv_buf: BytesMut,
    send_buf: BytesMut,
    mode: Mode,
    timeout: Duration,
    auto_destroy: bool,
    token: Option<ManagerToken>,
}

impl TcpConnection {
    /// Wrap a connected stream. The stream is switched to non-blocking mode.
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        let handle = handle_of(&stream)?;
        let peer = stream.peer_addr().ok();

        Ok(Self {
            stream: Some(stream),
            handle,
            peer,
            recv_buf: BytesMut::with_capacity(READ_CHUNK),
            send_buf: BytesMut::new(),
            mode: Mode::Idle,
            timeout: DEFAULT_TIMEOUT,
            auto_destroy: true,
            token: None,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whether the manager may shut the connection down on death or timeout.
    /// Default: true
    pub fn auto_destroy(mut self, enabled: bool) -> Self {
        self.auto_destroy = enabled;
        self
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// The manager token, while registered.
    pub fn token(&self) -> Option<ManagerToken> {
        self.token
    }

    /// Take the bytes received so far. The connection goes back to waiting
    /// for more unless a reply is queued afterwards.
    pub fn take_received(&mut self) -> Bytes {
        if self.mode == Mode::Received {
            self.mode = Mode::Idle;
        }
        self.recv_buf.split().freeze()
    }

    /// Queue `data` to be sent back to the peer.
    pub fn queue_reply(&mut self, data: &[u8]) {
        if self.mode == Mode::Dead || data.is_empty() {
            return;
        }
        self.send_buf.extend_from_slice(data);
        self.mode = Mode::Sending;
    }

    /// Bytes still waiting to be sent.
    pub fn pending(&self) -> usize {
        self.send_buf.len()
    }

    fn fail(&mut self, flags: Readiness) -> Readiness {
        self.mode = Mode::Dead;
        self.readiness() | flags
    }
}

impl Connection for TcpConnection {
    fn handle(&self) -> Handle {
        self.handle
    }

    fn send(&mut self) -> Readiness {
        let Some(stream) = self.stream.as_mut() else {
            return self.fail(Readiness::empty());
        };

        while !self.send_buf.is_empty() {
            match stream.write(&self.send_buf) {
                Ok(0) => {
                    return self.fail(Readiness::HAD_ERROR | Readiness::HAD_TX_ERROR);
                }
                Ok(n) => {
                    trace!("handle {}: sent {} bytes", self.handle, n);
                    self.send_buf.advance(n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!("handle {}: send failed: {}", self.handle, e);
                    return self.fail(Readiness::HAD_ERROR | Readiness::HAD_TX_ERROR);
                }
            }
        }

        if self.mode == Mode::Sending && self.send_buf.is_empty() {
            self.mode = Mode::Idle;
        }
        self.readiness()
    }

    fn receive(&mut self) -> Readiness {
        let Some(stream) = self.stream.as_mut() else {
            return self.fail(Readiness::empty());
        };

        // one read per call; anything left over is picked up by the next poll
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match stream.read(&mut chunk) {
                Ok(0) => {
                    debug!("handle {}: peer closed", self.handle);
                    return self.fail(Readiness::empty());
                }
                Ok(n) => {
                    trace!("handle {}: received {} bytes", self.handle, n);
                    self.recv_buf.extend_from_slice(&chunk[..n]);
                    if self.mode == Mode::Idle {
                        self.mode = Mode::Received;
                    }
                    break;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!("handle {}: receive failed: {}", self.handle, e);
                    return self.fail(Readiness::HAD_ERROR | Readiness::HAD_RX_ERROR);
                }
            }
        }
        self.readiness()
    }

    fn reset(&mut self, forceful: bool) -> Readiness {
        trace!("handle {}: reset (forceful: {})", self.handle, forceful);
        self.recv_buf.clear();
        self.send_buf.clear();
        if self.mode != Mode::Dead && self.stream.is_some() {
            self.mode = Mode::Idle;
        }
        self.readiness()
    }

    fn shutdown(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.mode = Mode::Dead;
    }

    fn readiness(&self) -> Readiness {
        match self.mode {
            Mode::Idle => Readiness::READABLE | Readiness::NEED_TIMEOUT,
            Mode::Received => Readiness::ATTENTION,
            Mode::Sending => Readiness::WRITABLE | Readiness::NEED_TIMEOUT,
            Mode::Dead => Readiness::DEAD,
        }
    }

    fn state(&self) -> Lifecycle {
        match self.mode {
            Mode::Dead => Lifecycle::Dead,
            Mode::Idle if self.recv_buf.is_empty() => Lifecycle::Dormant,
            _ => Lifecycle::Active,
        }
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn is_auto_destroyable(&self) -> bool {
        self.auto_destroy
    }

    fn bind_manager(&mut self, token: Option<ManagerToken>) {
        self.token = token;
    }
}

/// A listening socket that accepts one stream per receive.
///
/// Never times out and is never destroyed by the manager. Accepted streams
/// queue up until [`take_accepted`](Self::take_accepted) collects them; while
/// any are queued the listener asks for attention.
pub struct TcpListenerConnection {
    listener: Option<TcpListener>,
    handle: Handle,
    accepted: VecDeque<(TcpStream, SocketAddr)>,
}

impl TcpListenerConnection {
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        Self::new(TcpListener::bind(addr)?)
    }

    pub fn new(listener: TcpListener) -> io::Result<Self> {
        listener.set_nonblocking(true)?;
        let handle = handle_of(&listener)?;
        Ok(Self {
            listener: Some(listener),
            handle,
            accepted: VecDeque::new(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        match &self.listener {
            Some(listener) => listener.local_addr(),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "listener shut down")),
        }
    }

    /// Next accepted stream, oldest first.
    pub fn take_accepted(&mut self) -> Option<(TcpStream, SocketAddr)> {
        self.accepted.pop_front()
    }
}

impl Connection for TcpListenerConnection {
    fn handle(&self) -> Handle {
        self.handle
    }

    fn send(&mut self) -> Readiness {
        self.readiness()
    }

    fn receive(&mut self) -> Readiness {
        let Some(listener) = self.listener.as_ref() else {
            return Readiness::DEAD;
        };

        match listener.accept() {
            Ok((stream, addr)) => {
                debug!("accepted connection from {addr}");
                self.accepted.push_back((stream, addr));
                self.readiness()
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => self.readiness(),
            Err(e) => {
                debug!("accept failed: {e}");
                self.readiness() | Readiness::HAD_ERROR | Readiness::HAD_RX_ERROR
            }
        }
    }

    fn reset(&mut self, _forceful: bool) -> Readiness {
        self.readiness()
    }

    fn shutdown(&mut self) {
        self.listener = None;
        self.accepted.clear();
    }

    fn readiness(&self) -> Readiness {
        if self.listener.is_none() {
            return Readiness::DEAD;
        }
        if self.accepted.is_empty() {
            Readiness::READABLE
        } else {
            Readiness::READABLE | Readiness::ATTENTION
        }
    }

    fn state(&self) -> Lifecycle {
        if self.listener.is_some() {
            Lifecycle::Active
        } else {
            Lifecycle::Dead
        }
    }

    fn timeout(&self) -> Duration {
        Duration::MAX
    }

    fn is_auto_destroyable(&self) -> bool {
        false
    }
}
