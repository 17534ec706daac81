//! Tokio-backed run loop.
//!
//! [`TokioAdapter`] maps the one-shot poll-interest contract onto tokio
//! readiness futures: every request for interest spawns a small task that
//! waits for the socket to become ready and reports back over a channel.
//! A report that carries only part of the registered interest leaves the
//! rest armed.
//! [`serve`] receives those reports and hands them to
//! [`Server::socket_action`]. Reads and writes go through tokio's
//! non-blocking `try_read` / `try_write_vectored`.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::io::{self, IoSlice};
use std::net::SocketAddr;
use std::rc::Rc;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::Interest as Readiness;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Error;
use crate::http::handler::Handler;
use crate::server::adapter::{Interest, IoAdapter, SharedAdapter, Socket};
use crate::server::echo::EchoHandler;
use crate::server::{Server, ServerOption};

/// Report from a readiness task.
#[derive(Debug)]
pub enum Event {
    Ready {
        socket: Socket,
        flags: Interest,
        token: u64,
    },
    Accepted {
        token: u64,
        result: io::Result<TcpStream>,
    },
}

pub struct TokioAdapter {
    listen_addr: String,
    listener: Option<(Socket, Arc<TcpListener>)>,
    streams: HashMap<Socket, Arc<TcpStream>>,
    pending: VecDeque<TcpStream>,
    /// Live readiness task per socket: its token, what it waits for, and
    /// a handle to abort it.
    armed: HashMap<Socket, (u64, Interest, AbortHandle)>,
    next_socket: i64,
    next_token: u64,
    events: mpsc::UnboundedSender<Event>,
}

impl TokioAdapter {
    pub fn new(listen_addr: impl Into<String>, events: mpsc::UnboundedSender<Event>) -> Self {
        Self {
            listen_addr: listen_addr.into(),
            listener: None,
            streams: HashMap::new(),
            pending: VecDeque::new(),
            armed: HashMap::new(),
            next_socket: 1,
            next_token: 0,
            events,
        }
    }

    /// Address the listener is bound to, once opened.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        let (_, listener) = self.listener.as_ref()?;
        listener.local_addr().ok()
    }

    /// Clears the registration that produced `token`, which reported `flags`.
    ///
    /// Only the reported flags are used up. Whatever else that registration
    /// waited for is armed again, matching the core, which consumes exactly
    /// the reported flags from its recorded interest.
    ///
    /// Returns false for a report that was superseded by a newer
    /// registration or whose socket is gone; such reports must be dropped.
    pub fn take_ready(&mut self, socket: Socket, token: u64, flags: Interest) -> bool {
        let mut rest = match self.armed.get(&socket) {
            Some((current, interest, _)) if *current == token => *interest,
            _ => return false,
        };
        self.armed.remove(&socket);
        rest.remove(flags);
        if !rest.is_empty() {
            if let Err(e) = self.arm_stream(socket, rest) {
                debug!(socket = %socket, error = %e, "re-arming unreported interest failed");
            }
        }
        true
    }

    /// Queues a connection produced by the accept task so that the next
    /// [`accept`](IoAdapter::accept) returns it.
    ///
    /// Returns the listening socket if the report is current.
    pub fn adopt(&mut self, token: u64, result: io::Result<TcpStream>) -> Option<Socket> {
        let listen = self.listener.as_ref().map(|(socket, _)| *socket)?;
        if !self.take_ready(listen, token, Interest::READ) {
            return None;
        }
        match result {
            Ok(stream) => self.pending.push_back(stream),
            Err(e) => warn!(error = %e, "accept failed"),
        }
        Some(listen)
    }

    fn allocate_socket(&mut self) -> Socket {
        let socket = Socket(self.next_socket);
        self.next_socket += 1;
        socket
    }

    fn allocate_token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }

    fn disarm(&mut self, socket: Socket) {
        if let Some((_, _, handle)) = self.armed.remove(&socket) {
            handle.abort();
        }
    }

    fn arm_listener(&mut self, listener: Arc<TcpListener>, socket: Socket) {
        let token = self.allocate_token();
        let events = self.events.clone();
        let handle = tokio::spawn(async move {
            let result = listener.accept().await.map(|(stream, _)| stream);
            let _ = events.send(Event::Accepted { token, result });
        });
        self.armed
            .insert(socket, (token, Interest::READ, handle.abort_handle()));
    }

    fn arm_stream(&mut self, socket: Socket, interest: Interest) -> io::Result<()> {
        let stream = self.stream(socket)?.clone();
        let wanted = match (
            interest.contains(Interest::READ),
            interest.contains(Interest::WRITE),
        ) {
            (true, true) => Readiness::READABLE | Readiness::WRITABLE,
            (true, false) => Readiness::READABLE,
            (false, true) => Readiness::WRITABLE,
            (false, false) => return Ok(()),
        };
        let token = self.allocate_token();
        let events = self.events.clone();
        let handle = tokio::spawn(async move {
            let mut flags = Interest::NONE;
            if let Ok(ready) = stream.ready(wanted).await {
                if ready.is_readable() {
                    flags |= Interest::READ;
                }
                if ready.is_writable() {
                    flags |= Interest::WRITE;
                }
            }
            if flags.is_empty() {
                // error readiness, let the next read or write surface it
                flags = interest;
            }
            let _ = events.send(Event::Ready { socket, flags, token });
        });
        self.armed
            .insert(socket, (token, interest, handle.abort_handle()));
        Ok(())
    }

    fn stream(&self, socket: Socket) -> io::Result<&Arc<TcpStream>> {
        self.streams
            .get(&socket)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("unknown socket {socket}")))
    }
}

impl Drop for TokioAdapter {
    fn drop(&mut self) {
        for (_, (_, _, handle)) in self.armed.drain() {
            handle.abort();
        }
    }
}

impl IoAdapter for TokioAdapter {
    fn open_socket(&mut self) -> io::Result<Socket> {
        let std_listener = std::net::TcpListener::bind(&self.listen_addr)?;
        std_listener.set_nonblocking(true)?;
        let listener = TcpListener::from_std(std_listener)?;
        let socket = self.allocate_socket();
        self.listener = Some((socket, Arc::new(listener)));
        Ok(socket)
    }

    fn close_socket(&mut self, socket: Socket) -> io::Result<()> {
        self.disarm(socket);
        if self.listener.as_ref().is_some_and(|(listen, _)| *listen == socket) {
            self.listener = None;
            self.pending.clear();
            return Ok(());
        }
        self.streams
            .remove(&socket)
            .map(drop)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("unknown socket {socket}")))
    }

    fn request_poll(&mut self, socket: Socket, interest: Interest) -> io::Result<()> {
        self.disarm(socket);
        if interest.contains(Interest::REMOVE) {
            return Ok(());
        }
        let listener = match &self.listener {
            Some((listen, listener)) if *listen == socket => Some(listener.clone()),
            _ => None,
        };
        match listener {
            Some(listener) if interest.contains(Interest::READ) => {
                self.arm_listener(listener, socket);
                Ok(())
            }
            Some(_) => Ok(()),
            None => self.arm_stream(socket, interest),
        }
    }

    fn accept(&mut self, _listener: Socket) -> io::Result<Socket> {
        let stream = self
            .pending
            .pop_front()
            .ok_or_else(|| io::Error::from(io::ErrorKind::WouldBlock))?;
        if let Ok(peer) = stream.peer_addr() {
            info!("Accepted connection from {}", peer);
        }
        let socket = self.allocate_socket();
        self.streams.insert(socket, Arc::new(stream));
        Ok(socket)
    }

    fn recv(&mut self, socket: Socket, buf: &mut [u8]) -> io::Result<usize> {
        self.stream(socket)?.try_read(buf)
    }

    fn send_vectored(&mut self, socket: Socket, bufs: &[IoSlice<'_>]) -> io::Result<usize> {
        self.stream(socket)?.try_write_vectored(bufs)
    }
}

/// Serves the demo echo handler until the listener is cancelled and every
/// connection has closed. Requesting `/cancel/` cancels the listener.
pub async fn run(cfg: &Config) -> anyhow::Result<()> {
    let cancel = Rc::new(Cell::new(false));
    serve(cfg, Box::new(EchoHandler::new(cancel.clone())), cancel).await
}

/// Runs `handler` on a tokio-driven [`Server`].
///
/// Setting `cancel` stops the listener on the next loop turn; the loop
/// returns once no connection is left.
pub async fn serve(
    cfg: &Config,
    handler: Box<dyn Handler>,
    cancel: Rc<Cell<bool>>,
) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let adapter = Rc::new(RefCell::new(TokioAdapter::new(&cfg.server.listen_addr, tx)));
    let shared: SharedAdapter = adapter.clone();

    let mut server = Server::new(cfg.server.clone());
    server.set_option(ServerOption::Adapter(shared))?;
    server.set_option(ServerOption::Handler(handler))?;
    server
        .start()
        .with_context(|| format!("listening on {}", cfg.server.listen_addr))?;
    if let Some(addr) = adapter.borrow().local_addr() {
        info!("Listening on {}", addr);
    }

    while let Some(event) = rx.recv().await {
        let target = match event {
            Event::Ready { socket, flags, token } => {
                let current = adapter.borrow_mut().take_ready(socket, token, flags);
                current.then_some((socket, flags))
            }
            Event::Accepted { token, result } => {
                let listen = adapter.borrow_mut().adopt(token, result);
                listen.map(|socket| (socket, Interest::READ))
            }
        };
        if let Some((socket, flags)) = target {
            match server.socket_action(socket, flags) {
                Ok(()) => {}
                Err(Error::ClientEof) => debug!(socket = %socket, "client disconnected"),
                Err(e) => warn!(socket = %socket, error = %e, "connection error"),
            }
        }

        if cancel.get() && server.listen_socket().is_some() {
            info!("Cancel requested, no longer accepting connections");
            server.cancel()?;
        }
        if server.listen_socket().is_none() && server.is_empty() {
            break;
        }
    }

    info!("Server stopped");
    Ok(())
}
