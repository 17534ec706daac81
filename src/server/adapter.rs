//! The contract between the server core and the caller's event loop.
//!
//! The core never touches the network itself. Everything that involves a
//! real socket goes through an [`IoAdapter`]: opening the listener, asking
//! to be notified when a socket becomes readable or writable, and the
//! actual accept/read/write calls. The event loop reports readiness back by
//! calling [`Server::socket_action`](crate::server::Server::socket_action).

use std::cell::RefCell;
use std::fmt;
use std::io::{self, IoSlice};
use std::ops::{BitOr, BitOrAssign};
use std::rc::Rc;

/// Opaque socket handle chosen by the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Socket(pub i64);

impl Socket {
    pub const INVALID: Socket = Socket(-1);

    pub fn is_valid(&self) -> bool {
        self.0 >= 0
    }
}

impl fmt::Display for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Set of readiness conditions a socket is registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Interest(u8);

impl Interest {
    pub const NONE: Interest = Interest(0);
    /// Notify when the socket is readable (or, for the listener, acceptable).
    pub const READ: Interest = Interest(1 << 1);
    /// Notify when the socket is writable.
    pub const WRITE: Interest = Interest(1 << 2);
    /// Stop notifying for this socket.
    pub const REMOVE: Interest = Interest(1 << 3);

    pub fn contains(&self, other: Interest) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Clears the bits of `other`.
    pub fn remove(&mut self, other: Interest) {
        self.0 &= !other.0;
    }

    pub fn bits(&self) -> u8 {
        self.0
    }
}

impl BitOr for Interest {
    type Output = Interest;

    fn bitor(self, rhs: Interest) -> Interest {
        Interest(self.0 | rhs.0)
    }
}

impl BitOrAssign for Interest {
    fn bitor_assign(&mut self, rhs: Interest) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.contains(Interest::READ) {
            names.push("READ");
        }
        if self.contains(Interest::WRITE) {
            names.push("WRITE");
        }
        if self.contains(Interest::REMOVE) {
            names.push("REMOVE");
        }
        if names.is_empty() {
            names.push("NONE");
        }
        write!(f, "{}", names.join("|"))
    }
}

/// Caller-supplied transport and event-loop integration.
///
/// Any state the adapter needs (sockets, registrations, its own user data)
/// lives in the implementing type.
pub trait IoAdapter {
    /// Creates the listening socket.
    fn open_socket(&mut self) -> io::Result<Socket>;

    /// Closes a socket previously returned by `open_socket` or `accept`.
    fn close_socket(&mut self, socket: Socket) -> io::Result<()>;

    /// Registers interest for `socket`.
    ///
    /// `interest` is cumulative (everything the core currently waits for) or
    /// [`Interest::REMOVE`]. Registrations are one-shot per condition: a
    /// report through `socket_action` uses up the flags it carries, and the
    /// core asks again if it still needs them. Flags the report did not
    /// carry must stay armed; the core will not request them again.
    fn request_poll(&mut self, socket: Socket, interest: Interest) -> io::Result<()>;

    /// Accepts one pending connection on `listener`.
    ///
    /// Returns `ErrorKind::WouldBlock` when nothing is pending.
    fn accept(&mut self, listener: Socket) -> io::Result<Socket>;

    /// Reads into `buf`. `Ok(0)` means the peer closed the connection.
    fn recv(&mut self, socket: Socket, buf: &mut [u8]) -> io::Result<usize>;

    /// Writes as much of `bufs` as the socket accepts in one call.
    fn send_vectored(&mut self, socket: Socket, bufs: &[IoSlice<'_>]) -> io::Result<usize>;
}

/// Adapter handle shared by the server and every connection.
pub type SharedAdapter = Rc<RefCell<dyn IoAdapter>>;

/// Wraps an adapter for [`ServerOption::Adapter`](crate::server::ServerOption::Adapter).
pub fn shared<A: IoAdapter + 'static>(adapter: A) -> SharedAdapter {
    Rc::new(RefCell::new(adapter))
}
