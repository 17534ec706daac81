use std::any::Any;
use std::fmt;

use tracing::{debug, trace};

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::http::buffer::ByteBuffer;
use crate::http::handler::Handler;
use crate::http::header::{Header, HeaderList};
use crate::http::outgoing::OutgoingQueue;
use crate::http::parser::{ParseError, Parser, ParserSink};
use crate::http::request::{self, Method};
use crate::http::response::Response;
use crate::http::writer::ResponseWriter;
use crate::server::adapter::{Interest, SharedAdapter, Socket};

const CONTINUE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";

/// Where the header accumulator is between parser events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderPhase {
    Start,
    Field,
    Value,
}

/// What the dispatcher should do once the outgoing queue has drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Drained {
    /// The response is still open.
    Pending,
    /// The response was finished and released; the connection waits for the next request.
    Ready,
    /// The peer asked not to keep the connection.
    Close,
}

/// One client connection.
///
/// A connection turns parser events into a URL, a header list and handler
/// callbacks, owns at most one open [`Response`], and queues outgoing bytes
/// until the socket is writable. Request state is reset after every
/// message, so the same connection serves pipelined and keep-alive requests.
///
/// ```text
///    Idle ──feed──► Parsing ──message complete──► Complete
///     ▲                                              │
///     └──── response done and drained (backlog) ◄────┘
/// ```
///
/// Bytes that arrive after a complete request are kept in a backlog and
/// parsed only once the response for that request has been sent.
pub struct Connection {
    socket: Socket,
    adapter: SharedAdapter,
    data: Option<Box<dyn Any>>,
    parser: Parser,
    method: Option<Method>,
    minor_version: u8,
    keep_alive: bool,
    url: ByteBuffer,
    headers: HeaderList,
    phase: HeaderPhase,
    field: ByteBuffer,
    value: ByteBuffer,
    response: Option<Response>,
    interest: Interest,
    request_complete: bool,
    paused: bool,
    outgoing: OutgoingQueue,
    backlog: Vec<u8>,
    compression_level: u32,
}

impl Connection {
    pub(crate) fn new(socket: Socket, adapter: SharedAdapter, config: &ServerConfig) -> Self {
        Self {
            socket,
            adapter,
            data: None,
            parser: Parser::new(config.max_header_size),
            method: None,
            minor_version: 1,
            keep_alive: true,
            url: ByteBuffer::new(),
            headers: HeaderList::new(),
            phase: HeaderPhase::Start,
            field: ByteBuffer::new(),
            value: ByteBuffer::new(),
            response: None,
            interest: Interest::NONE,
            request_complete: false,
            paused: false,
            outgoing: OutgoingQueue::new(),
            backlog: Vec::new(),
            compression_level: config.compression_level,
        }
    }

    /// Feeds bytes read from the socket. An empty slice signals end of input.
    ///
    /// Fails with [`Error::Parser`] on malformed input, or with whatever
    /// error a handler callback returned. Either way the connection must be
    /// closed.
    pub fn feed(&mut self, data: &[u8], handler: &mut dyn Handler) -> Result<()> {
        if data.is_empty() {
            return self.parser.finish();
        }
        if self.request_complete {
            return self.stash(data);
        }

        let mut parser = std::mem::take(&mut self.parser);
        let result = parser.execute(data, &mut Events { conn: self, handler });
        self.parser = parser;
        let consumed = result?;

        if consumed < data.len() {
            if !self.request_complete {
                return Err(ParseError::Trailing.into());
            }
            self.stash(&data[consumed..])?;
        }
        Ok(())
    }

    /// Adds `flags` to the poll interest, calling the adapter only when the
    /// interest actually grows.
    ///
    /// Asking for [`Interest::READ`] while paused fails with
    /// [`Error::InvalidState`] and leaves the interest untouched.
    pub fn poll(&mut self, flags: Interest) -> Result<()> {
        if flags.contains(Interest::READ) && self.paused {
            return Err(Error::InvalidState("read interest requested while paused"));
        }
        let previous = self.interest;
        self.interest |= flags;
        if self.interest == previous {
            return Ok(());
        }
        trace!(socket = %self.socket, interest = %self.interest, "requesting poll");
        self.adapter
            .borrow_mut()
            .request_poll(self.socket, self.interest)
            .map_err(Error::Socket)
    }

    /// Pauses or resumes reading. Resuming asks for read interest again.
    pub fn pause(&mut self, paused: bool) -> Result<()> {
        let resumed = self.paused && !paused;
        self.paused = paused;
        if resumed {
            self.poll(Interest::READ)?;
        }
        Ok(())
    }

    /// Queues raw bytes for the socket. Nothing is sent until [`flush`](Connection::flush).
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.outgoing.push_back(bytes)
    }

    /// Asks for write interest if anything is queued.
    pub fn flush(&mut self) -> Result<()> {
        if self.outgoing.is_empty() {
            return Ok(());
        }
        self.poll(Interest::WRITE)
    }

    /// Creates a response negotiated against the current request's headers.
    pub fn new_response(&self) -> Result<Response> {
        Response::for_request(&self.headers, self.compression_level)
    }

    /// Binds `response` to this connection and returns a writer for it.
    ///
    /// Fails with [`Error::InvalidState`] if a response is already open.
    pub fn begin(&mut self, response: Response) -> Result<ResponseWriter<'_>> {
        if self.response.is_some() {
            return Err(Error::InvalidState("a response is already in progress"));
        }
        self.response = Some(response);
        self.flush_response()?;
        Ok(ResponseWriter::new(self))
    }

    /// Writer for the open response, if any.
    pub fn response(&mut self) -> Option<ResponseWriter<'_>> {
        if self.response.is_some() {
            Some(ResponseWriter::new(self))
        } else {
            None
        }
    }

    pub fn current_response(&self) -> Option<&Response> {
        self.response.as_ref()
    }

    pub fn socket(&self) -> Socket {
        self.socket
    }

    /// Request target accumulated so far.
    pub fn url(&self) -> &str {
        self.url.as_str().unwrap_or_default()
    }

    pub fn method(&self) -> Option<Method> {
        self.method
    }

    /// Minor HTTP version of the last request (`1` for HTTP/1.1).
    pub fn minor_version(&self) -> u8 {
        self.minor_version
    }

    /// Request headers received so far.
    pub fn headers(&self) -> &HeaderList {
        &self.headers
    }

    pub fn header_phase(&self) -> HeaderPhase {
        self.phase
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    pub fn is_complete(&self) -> bool {
        self.request_complete
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn interest(&self) -> Interest {
        self.interest
    }

    pub fn outgoing(&self) -> &OutgoingQueue {
        &self.outgoing
    }

    pub(crate) fn outgoing_mut(&mut self) -> &mut OutgoingQueue {
        &mut self.outgoing
    }

    /// Attaches handler-owned data to the connection.
    pub fn set_data(&mut self, data: Box<dyn Any>) {
        self.data = Some(data);
    }

    pub fn data<T: 'static>(&self) -> Option<&T> {
        self.data.as_deref()?.downcast_ref()
    }

    pub fn data_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.data.as_deref_mut()?.downcast_mut()
    }

    pub fn take_data(&mut self) -> Option<Box<dyn Any>> {
        self.data.take()
    }

    pub(crate) fn response_slot(&mut self) -> Option<&mut Response> {
        self.response.as_mut()
    }

    /// Moves the open response's serialized bytes to the outgoing queue and flushes.
    pub(crate) fn flush_response(&mut self) -> Result<()> {
        if let Some(response) = self.response.as_mut() {
            self.outgoing.append(response.output_mut())?;
        }
        self.flush()
    }

    /// A readiness notification consumes the flags it reports.
    pub(crate) fn consume_interest(&mut self, flags: Interest) {
        self.interest.remove(flags);
    }

    /// Drops every registration for this socket.
    pub(crate) fn remove_interest(&mut self) -> Result<()> {
        self.interest = Interest::NONE;
        self.adapter
            .borrow_mut()
            .request_poll(self.socket, Interest::REMOVE)
            .map_err(Error::Socket)
    }

    /// Called once the outgoing queue is empty.
    ///
    /// Releases a finished response and either prepares for the next
    /// request (parsing any backlog first) or reports that the connection
    /// should close.
    pub(crate) fn on_drained(&mut self, handler: &mut dyn Handler) -> Result<Drained> {
        if !self.response.as_ref().is_some_and(Response::is_done) {
            return Ok(Drained::Pending);
        }
        self.response = None;
        if !self.keep_alive {
            return Ok(Drained::Close);
        }

        self.request_complete = false;
        if !self.backlog.is_empty() {
            let backlog = std::mem::take(&mut self.backlog);
            debug!(socket = %self.socket, bytes = backlog.len(), "parsing pipelined request");
            self.feed(&backlog, handler)?;
        }
        if !self.request_complete && !self.paused {
            self.poll(Interest::READ)?;
        }
        Ok(Drained::Ready)
    }

    fn stash(&mut self, data: &[u8]) -> Result<()> {
        self.backlog.try_reserve(data.len())?;
        self.backlog.extend_from_slice(data);
        Ok(())
    }

    fn reset_request(&mut self) {
        self.url.clear();
        self.headers.clear();
        self.field.clear();
        self.value.clear();
        self.phase = HeaderPhase::Start;
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("socket", &self.socket)
            .field("url", &self.url)
            .field("interest", &self.interest)
            .field("request_complete", &self.request_complete)
            .field("paused", &self.paused)
            .field("pending_bytes", &self.outgoing.pending_bytes())
            .finish_non_exhaustive()
    }
}

/// Parser sink that routes events into a connection and its handler.
struct Events<'a> {
    conn: &'a mut Connection,
    handler: &'a mut dyn Handler,
}

impl Events<'_> {
    /// Moves the scratch field/value into the header list.
    fn finish_header(&mut self) -> Result<()> {
        let header = Header::new(self.conn.field.take(), self.conn.value.take());
        let result = self
            .handler
            .on_header(self.conn, header.field(), header.value());
        self.conn.headers.insert_tail(header)?;
        result
    }
}

impl ParserSink for Events<'_> {
    fn on_message_begin(&mut self, method: Method, minor_version: u8) -> Result<()> {
        self.conn.method = Some(method);
        self.conn.minor_version = minor_version;
        Ok(())
    }

    fn on_url(&mut self, chunk: &[u8]) -> Result<()> {
        self.conn.url.append(chunk)
    }

    fn on_header_field(&mut self, chunk: &[u8]) -> Result<()> {
        if self.conn.phase == HeaderPhase::Value {
            self.finish_header()?;
        }
        self.conn.field.append(chunk)?;
        self.conn.phase = HeaderPhase::Field;
        Ok(())
    }

    fn on_header_value(&mut self, chunk: &[u8]) -> Result<()> {
        self.conn.value.append(chunk)?;
        self.conn.phase = HeaderPhase::Value;
        Ok(())
    }

    fn on_headers_complete(&mut self) -> Result<()> {
        if self.conn.phase == HeaderPhase::Value {
            self.finish_header()?;
        }
        self.conn.phase = HeaderPhase::Start;
        self.conn.keep_alive = request::keep_alive(self.conn.minor_version, &self.conn.headers);
        if request::expects_continue(&self.conn.headers) {
            debug!(socket = %self.conn.socket, "sending 100 Continue");
            self.conn.write(CONTINUE)?;
            self.conn.flush()?;
        }
        Ok(())
    }

    fn on_body(&mut self, chunk: &[u8]) -> Result<()> {
        self.handler.on_body(self.conn, chunk)
    }

    fn on_message_complete(&mut self) -> Result<()> {
        let result = self.handler.on_message_complete(self.conn);
        self.conn.reset_request();
        self.conn.request_complete = true;
        result
    }
}
