#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io::{self, IoSlice};
use std::rc::Rc;

use lantern::http::connection::Connection;
use lantern::http::handler::Handler;
use lantern::server::adapter::{self, Interest, IoAdapter, Socket};
use lantern::server::{Server, ServerOption};

pub const LISTEN: Socket = Socket(1);

/// Everything the mock adapter saw, plus the data it will hand out.
#[derive(Debug, Default)]
pub struct MockState {
    pub polls: Vec<(Socket, Interest)>,
    /// Current one-shot registration per socket.
    pub armed: HashMap<Socket, Interest>,
    pub closed: Vec<Socket>,
    /// Per-socket reads. An empty chunk reads as EOF; no chunk reads as WouldBlock.
    pub incoming: HashMap<Socket, VecDeque<Vec<u8>>>,
    pub written: HashMap<Socket, Vec<u8>>,
    /// Maximum bytes accepted by one vectored write.
    pub write_limit: Option<usize>,
    pub pending_accepts: VecDeque<Socket>,
    pub broken: Vec<Socket>,
}

impl MockState {
    pub fn push_incoming(&mut self, socket: Socket, bytes: &[u8]) {
        self.incoming
            .entry(socket)
            .or_default()
            .push_back(bytes.to_vec());
    }

    pub fn polls_for(&self, socket: Socket) -> Vec<Interest> {
        self.polls
            .iter()
            .filter(|(s, _)| *s == socket)
            .map(|(_, i)| *i)
            .collect()
    }

    pub fn armed_for(&self, socket: Socket) -> Interest {
        self.armed.get(&socket).copied().unwrap_or_default()
    }

    pub fn written_str(&self, socket: Socket) -> String {
        String::from_utf8_lossy(self.written.get(&socket).map_or(&[][..], Vec::as_slice))
            .into_owned()
    }
}

pub struct MockAdapter {
    state: Rc<RefCell<MockState>>,
}

impl IoAdapter for MockAdapter {
    fn open_socket(&mut self) -> io::Result<Socket> {
        Ok(LISTEN)
    }

    fn close_socket(&mut self, socket: Socket) -> io::Result<()> {
        self.state.borrow_mut().closed.push(socket);
        Ok(())
    }

    fn request_poll(&mut self, socket: Socket, interest: Interest) -> io::Result<()> {
        let mut state = self.state.borrow_mut();
        state.polls.push((socket, interest));
        if interest.contains(Interest::REMOVE) {
            state.armed.remove(&socket);
        } else {
            state.armed.insert(socket, interest);
        }
        Ok(())
    }

    fn accept(&mut self, _listener: Socket) -> io::Result<Socket> {
        self.state
            .borrow_mut()
            .pending_accepts
            .pop_front()
            .ok_or_else(|| io::ErrorKind::WouldBlock.into())
    }

    fn recv(&mut self, socket: Socket, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.borrow_mut();
        if state.broken.contains(&socket) {
            return Err(io::ErrorKind::ConnectionReset.into());
        }
        let chunk = state
            .incoming
            .get_mut(&socket)
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| io::Error::from(io::ErrorKind::WouldBlock))?;
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        Ok(n)
    }

    fn send_vectored(&mut self, socket: Socket, bufs: &[IoSlice<'_>]) -> io::Result<usize> {
        let mut state = self.state.borrow_mut();
        if state.broken.contains(&socket) {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        let mut budget = state.write_limit.unwrap_or(usize::MAX);
        let out = state.written.entry(socket).or_default();
        let mut total = 0;
        for buf in bufs {
            let n = buf.len().min(budget);
            out.extend_from_slice(&buf[..n]);
            total += n;
            budget -= n;
            if budget == 0 {
                break;
            }
        }
        Ok(total)
    }
}

/// A server wired to a fresh mock adapter. Not started.
pub fn server(handler: impl Handler + 'static) -> (Server, Rc<RefCell<MockState>>) {
    let state = Rc::new(RefCell::new(MockState::default()));
    let mut server = Server::default();
    server
        .set_option(ServerOption::Adapter(adapter::shared(MockAdapter {
            state: state.clone(),
        })))
        .unwrap();
    server.set_option(ServerOption::Handler(Box::new(handler))).unwrap();
    (server, state)
}

/// Reports `flags` for `socket` the way a one-shot poller does: the flags
/// must be armed, they leave the registration, and the rest stays armed.
pub fn report(
    server: &mut Server,
    state: &Rc<RefCell<MockState>>,
    socket: Socket,
    flags: Interest,
) -> lantern::Result<()> {
    {
        let mut state = state.borrow_mut();
        let mut armed = state.armed_for(socket);
        assert!(
            armed.contains(flags),
            "socket {socket} reported {flags} but only {armed} is armed"
        );
        armed.remove(flags);
        if armed.is_empty() {
            state.armed.remove(&socket);
        } else {
            state.armed.insert(socket, armed);
        }
    }
    server.socket_action(socket, flags)
}

/// Answers every request with its URL as a chunked body.
#[derive(Default, Clone)]
pub struct Reply {
    pub urls: Rc<RefCell<Vec<String>>>,
}

impl Handler for Reply {
    fn on_message_complete(&mut self, conn: &mut Connection) -> lantern::Result<()> {
        let url = conn.url().to_string();
        self.urls.borrow_mut().push(url.clone());
        let response = conn.new_response()?;
        let mut writer = conn.begin(response)?;
        writer.write(url.as_bytes())?;
        writer.end()
    }
}

/// Expected wire bytes for [`Reply`] answering `url` without compression.
pub fn reply_bytes(url: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n{:x}\r\n{}\r\n0\r\n\r\n",
        url.len(),
        url
    )
}

/// Decodes a chunked body (without trailers).
pub fn dechunk(mut body: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let line_end = body.windows(2).position(|w| w == b"\r\n").unwrap();
        let size = usize::from_str_radix(std::str::from_utf8(&body[..line_end]).unwrap(), 16).unwrap();
        body = &body[line_end + 2..];
        if size == 0 {
            return out;
        }
        out.extend_from_slice(&body[..size]);
        body = &body[size + 2..];
    }
}

/// Splits a response into its head (up to the blank line) and its body.
pub fn split_head(wire: &[u8]) -> (String, &[u8]) {
    let end = wire.windows(4).position(|w| w == b"\r\n\r\n").unwrap() + 4;
    (String::from_utf8_lossy(&wire[..end]).into_owned(), &wire[end..])
}
