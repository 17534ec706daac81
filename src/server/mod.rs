//! Socket registry and readiness dispatcher.
//!
//! A [`Server`] owns the listening socket and every live [`Connection`].
//! The event loop tells it which socket became ready through
//! [`Server::socket_action`]; the server turns that into an accept, a read
//! fed to the connection's parser, or a vectored write of the connection's
//! outgoing queue, and then asks the adapter for whatever interest it needs
//! next.

pub mod adapter;
pub mod echo;
pub mod listener;

use std::collections::HashMap;
use std::fmt;
use std::io;

use tracing::{debug, trace, warn};

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::http::connection::{Connection, Drained};
use crate::http::handler::{Handler, NoopHandler};

use adapter::{Interest, SharedAdapter, Socket};

/// Size of the single read performed per readiness notification.
const READ_BUFFER_SIZE: usize = 16 * 1024;

/// Settings accepted by [`Server::set_option`].
pub enum ServerOption {
    /// Transport and poll integration.
    Adapter(SharedAdapter),
    /// Request callbacks. Can be replaced at any time.
    Handler(Box<dyn Handler>),
    Config(ServerConfig),
}

impl fmt::Debug for ServerOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerOption::Adapter(_) => f.write_str("Adapter(..)"),
            ServerOption::Handler(_) => f.write_str("Handler(..)"),
            ServerOption::Config(config) => f.debug_tuple("Config").field(config).finish(),
        }
    }
}

pub struct Server {
    config: ServerConfig,
    adapter: Option<SharedAdapter>,
    handler: Box<dyn Handler>,
    listen: Option<Socket>,
    listen_interest: Interest,
    /// Listener closed by [`Server::cancel`]; late notifications for it are dropped.
    cancelled: Option<Socket>,
    connections: HashMap<Socket, Connection>,
    started: bool,
}

impl Default for Server {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}

impl Server {
    /// Creates a server with no adapter and a handler that ignores requests.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            adapter: None,
            handler: Box::new(NoopHandler),
            listen: None,
            listen_interest: Interest::NONE,
            cancelled: None,
            connections: HashMap::new(),
            started: false,
        }
    }

    /// Applies one setting.
    ///
    /// The adapter and the config are fixed once the server has started;
    /// changing them afterwards fails with [`Error::InvalidState`].
    pub fn set_option(&mut self, option: ServerOption) -> Result<()> {
        match option {
            ServerOption::Adapter(adapter) => {
                if self.started {
                    return Err(Error::InvalidState("adapter cannot change after start"));
                }
                self.adapter = Some(adapter);
            }
            ServerOption::Handler(handler) => self.handler = handler,
            ServerOption::Config(config) => {
                if self.started {
                    return Err(Error::InvalidState("config cannot change after start"));
                }
                self.config = config;
            }
        }
        Ok(())
    }

    /// Opens the listening socket and asks for read interest on it.
    pub fn start(&mut self) -> Result<()> {
        if self.started {
            return Err(Error::InvalidState("server already started"));
        }
        let adapter = self.adapter()?;
        let listen = adapter.borrow_mut().open_socket().map_err(Error::Socket)?;
        if !listen.is_valid() {
            return Err(Error::InvalidSocket(listen));
        }
        self.listen = Some(listen);
        self.started = true;
        debug!(socket = %listen, "server started");
        self.arm_listener()
    }

    /// Stops accepting. Existing connections are left alone.
    pub fn cancel(&mut self) -> Result<()> {
        let listen = self
            .listen
            .take()
            .ok_or(Error::InvalidState("server is not listening"))?;
        let adapter = self.adapter()?;
        self.listen_interest = Interest::NONE;
        self.cancelled = Some(listen);
        let mut adapter = adapter.borrow_mut();
        adapter
            .request_poll(listen, Interest::REMOVE)
            .map_err(Error::Socket)?;
        adapter.close_socket(listen).map_err(Error::Socket)?;
        debug!(socket = %listen, "listener cancelled");
        Ok(())
    }

    /// Registers a connection for `socket` and asks for read interest.
    pub fn add_client(&mut self, socket: Socket) -> Result<()> {
        let adapter = self.adapter()?;
        if self.connections.contains_key(&socket) {
            return Err(Error::SocketExists(socket));
        }
        if self.cancelled == Some(socket) {
            // the handle was reused for a new client
            self.cancelled = None;
        }
        let mut conn = Connection::new(socket, adapter, &self.config);
        conn.poll(Interest::READ)?;
        self.connections.insert(socket, conn);
        debug!(socket = %socket, clients = self.connections.len(), "client added");
        Ok(())
    }

    /// Removes the connection for `socket` from the registry without closing it.
    pub fn pop_client(&mut self, socket: Socket) -> Result<Connection> {
        self.connections
            .remove(&socket)
            .ok_or(Error::InvalidSocket(socket))
    }

    pub fn connection(&self, socket: Socket) -> Option<&Connection> {
        self.connections.get(&socket)
    }

    pub fn connection_mut(&mut self, socket: Socket) -> Option<&mut Connection> {
        self.connections.get_mut(&socket)
    }

    pub fn listen_socket(&self) -> Option<Socket> {
        self.listen
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Handles a readiness notification for `socket`.
    ///
    /// The reported `flags` are consumed from the socket's registered
    /// interest before anything runs. For a connection, reading happens
    /// before writing. A failure on a connection closes that connection
    /// and is returned; [`Error::ClientEof`] reports an orderly close by
    /// the peer. Neither affects other connections or the listener.
    /// Notifications still in flight for a cancelled listener are ignored.
    pub fn socket_action(&mut self, socket: Socket, flags: Interest) -> Result<()> {
        if self.listen == Some(socket) {
            return self.on_listener_ready(flags);
        }
        if self.cancelled == Some(socket) {
            trace!(socket = %socket, "readiness on cancelled listener, ignored");
            return Ok(());
        }
        if !self.connections.contains_key(&socket) {
            debug!(socket = %socket, "readiness on unknown socket, registering it");
            return self.add_client(socket);
        }
        if flags.contains(Interest::READ) {
            self.on_readable(socket)?;
        }
        if flags.contains(Interest::WRITE) && self.connections.contains_key(&socket) {
            self.on_writable(socket)?;
        }
        Ok(())
    }

    fn adapter(&self) -> Result<SharedAdapter> {
        self.adapter
            .clone()
            .ok_or(Error::NotImplemented("no I/O adapter configured"))
    }

    fn arm_listener(&mut self) -> Result<()> {
        let Some(listen) = self.listen else {
            return Ok(());
        };
        if self.listen_interest.contains(Interest::READ) {
            return Ok(());
        }
        self.adapter()?
            .borrow_mut()
            .request_poll(listen, Interest::READ)
            .map_err(Error::Socket)?;
        self.listen_interest |= Interest::READ;
        Ok(())
    }

    fn on_listener_ready(&mut self, flags: Interest) -> Result<()> {
        self.listen_interest.remove(flags);
        let (Some(listen), true) = (self.listen, flags.contains(Interest::READ)) else {
            return self.arm_listener();
        };
        let adapter = self.adapter()?;
        let accepted = adapter.borrow_mut().accept(listen);
        match accepted {
            Ok(client) => match self.add_client(client) {
                Ok(()) => {}
                Err(e) => {
                    warn!(socket = %client, error = %e, "rejecting accepted connection");
                    if let Err(e) = adapter.borrow_mut().close_socket(client) {
                        warn!(socket = %client, error = %e, "close failed");
                    }
                }
            },
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                trace!(socket = %listen, "nothing to accept");
            }
            Err(e) => warn!(socket = %listen, error = %e, "accept failed"),
        }
        self.arm_listener()
    }

    fn on_readable(&mut self, socket: Socket) -> Result<()> {
        let adapter = self.adapter()?;
        let Some(conn) = self.connections.get_mut(&socket) else {
            return Ok(());
        };
        conn.consume_interest(Interest::READ);
        if conn.is_paused() {
            trace!(socket = %socket, "paused, leaving data in the socket");
            return Ok(());
        }

        let mut buf = [0u8; READ_BUFFER_SIZE];
        let received = adapter.borrow_mut().recv(socket, &mut buf);
        match received {
            Ok(0) => {
                debug!(socket = %socket, "client closed connection");
                if let Err(e) = conn.feed(&[], self.handler.as_mut()) {
                    debug!(socket = %socket, error = %e, "request cut short by eof");
                }
                self.teardown(socket);
                Err(Error::ClientEof)
            }
            Ok(n) => {
                trace!(socket = %socket, bytes = n, "read");
                let fed = conn.feed(&buf[..n], self.handler.as_mut()).and_then(|()| {
                    if conn.is_complete() || conn.is_paused() {
                        Ok(())
                    } else {
                        conn.poll(Interest::READ)
                    }
                });
                fed.or_else(|e| self.fail(socket, e))
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                conn.poll(Interest::READ).or_else(|e| self.fail(socket, e))
            }
            Err(e) => self.fail(socket, Error::Socket(e)),
        }
    }

    fn on_writable(&mut self, socket: Socket) -> Result<()> {
        let adapter = self.adapter()?;
        let max_segments = self.config.max_write_segments;
        let Some(conn) = self.connections.get_mut(&socket) else {
            return Ok(());
        };
        conn.consume_interest(Interest::WRITE);

        let sent = {
            let slices = conn.outgoing().io_slices(max_segments);
            if slices.is_empty() {
                Ok(0)
            } else {
                adapter.borrow_mut().send_vectored(socket, &slices)
            }
        };
        let written = match sent {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => 0,
            Err(e) => return self.fail(socket, Error::Socket(e)),
        };
        trace!(socket = %socket, bytes = written, "wrote");
        conn.outgoing_mut().drain_written(written);

        if !conn.outgoing().is_empty() {
            return conn.poll(Interest::WRITE).or_else(|e| self.fail(socket, e));
        }
        match conn.on_drained(self.handler.as_mut()) {
            Ok(Drained::Close) => {
                debug!(socket = %socket, "response sent, closing connection");
                self.teardown(socket);
                Ok(())
            }
            Ok(Drained::Ready | Drained::Pending) => Ok(()),
            Err(e) => self.fail(socket, e),
        }
    }

    fn fail(&mut self, socket: Socket, err: Error) -> Result<()> {
        warn!(socket = %socket, error = %err, "closing connection");
        self.teardown(socket);
        Err(err)
    }

    /// Removes interest, closes the socket and forgets the connection.
    fn teardown(&mut self, socket: Socket) {
        let Some(mut conn) = self.connections.remove(&socket) else {
            return;
        };
        if let Err(e) = conn.remove_interest() {
            debug!(socket = %socket, error = %e, "removing poll interest failed");
        }
        if let Some(adapter) = &self.adapter {
            if let Err(e) = adapter.borrow_mut().close_socket(socket) {
                warn!(socket = %socket, error = %e, "close failed");
            }
        }
        debug!(socket = %socket, clients = self.connections.len(), "client removed");
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("listen", &self.listen)
            .field("clients", &self.connections.len())
            .field("started", &self.started)
            .finish_non_exhaustive()
    }
}
