//! Incremental HTTP/1.x request tokenizer.
//!
//! [`Parser`] is fed raw bytes as they arrive and reports what it finds to a
//! [`ParserSink`] as a stream of events. The request head is buffered until
//! the blank line and parsed with `httparse`; the body is streamed out as it
//! is read, either by `Content-Length` or by chunked transfer coding.

use thiserror::Error;

use crate::error::Result;
use crate::http::request::Method;

/// Upper bound on the number of request headers.
const MAX_HEADERS: usize = 100;

/// Longest accepted chunk-size or trailer line.
const MAX_CHUNK_LINE: usize = 4096;

/// Default limit on the size of the request head (80 KiB).
pub const DEFAULT_MAX_HEADER_SIZE: usize = 80 * 1024;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed request head: {0}")]
    Malformed(#[from] httparse::Error),
    #[error("unsupported method")]
    InvalidMethod,
    #[error("request head exceeds {0} bytes")]
    HeaderTooLarge(usize),
    #[error("invalid Content-Length")]
    InvalidContentLength,
    #[error("invalid chunk framing")]
    InvalidChunk,
    #[error("connection closed mid-request")]
    UnexpectedEof,
    #[error("bytes left over after the request")]
    Trailing,
}

/// Receives parser events, in order, for each request.
///
/// Every callback may fail; the error stops the parser and is returned from
/// [`Parser::execute`] unchanged.
pub trait ParserSink {
    fn on_message_begin(&mut self, _method: Method, _minor_version: u8) -> Result<()> {
        Ok(())
    }

    fn on_url(&mut self, _chunk: &[u8]) -> Result<()> {
        Ok(())
    }

    fn on_header_field(&mut self, _chunk: &[u8]) -> Result<()> {
        Ok(())
    }

    fn on_header_value(&mut self, _chunk: &[u8]) -> Result<()> {
        Ok(())
    }

    fn on_headers_complete(&mut self) -> Result<()> {
        Ok(())
    }

    fn on_body(&mut self, _chunk: &[u8]) -> Result<()> {
        Ok(())
    }

    fn on_message_complete(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Head,
    FixedBody { remaining: u64 },
    ChunkSize,
    ChunkData { remaining: u64 },
    ChunkDataEnd { seen_cr: bool },
    Trailers,
}

enum BodyKind {
    Empty,
    Length(u64),
    Chunked,
}

#[derive(Debug)]
pub struct Parser {
    state: State,
    head: Vec<u8>,
    line: Vec<u8>,
    max_header_size: usize,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HEADER_SIZE)
    }
}

impl Parser {
    pub fn new(max_header_size: usize) -> Self {
        Self {
            state: State::Head,
            head: Vec::new(),
            line: Vec::new(),
            max_header_size,
        }
    }

    /// True when no request is in progress.
    pub fn is_idle(&self) -> bool {
        self.state == State::Head && self.head.is_empty()
    }

    /// Feeds `data` to the parser and returns how many bytes were consumed.
    ///
    /// Parsing stops right after a message-complete event, so a short count
    /// means the remaining bytes belong to the next (pipelined) request.
    pub fn execute<S: ParserSink + ?Sized>(&mut self, data: &[u8], sink: &mut S) -> Result<usize> {
        let mut pos = 0;
        while pos < data.len() {
            let rest = &data[pos..];
            match self.state {
                State::Head => {
                    if self.head.is_empty() {
                        // Stray CRLFs between requests are allowed.
                        let skip = rest.iter().take_while(|&&b| b == b'\r' || b == b'\n').count();
                        if skip > 0 {
                            pos += skip;
                            continue;
                        }
                    }
                    let scan_from = self.head.len().saturating_sub(3);
                    self.head.try_reserve(rest.len())?;
                    self.head.extend_from_slice(rest);
                    match find_head_end(&self.head[scan_from..]) {
                        Some(i) => {
                            let end = scan_from + i + 4;
                            if end > self.max_header_size {
                                return Err(ParseError::HeaderTooLarge(self.max_header_size).into());
                            }
                            let excess = self.head.len() - end;
                            self.head.truncate(end);
                            pos = data.len() - excess;
                            if self.finish_head(sink)? {
                                return Ok(pos);
                            }
                        }
                        None => {
                            if self.head.len() > self.max_header_size {
                                return Err(ParseError::HeaderTooLarge(self.max_header_size).into());
                            }
                            pos = data.len();
                        }
                    }
                }
                State::FixedBody { remaining } => {
                    let take = remaining.min(rest.len() as u64) as usize;
                    let left = remaining - take as u64;
                    pos += take;
                    self.state = State::FixedBody { remaining: left };
                    sink.on_body(&rest[..take])?;
                    if left == 0 {
                        self.complete(sink)?;
                        return Ok(pos);
                    }
                }
                State::ChunkSize => match rest.iter().position(|b| *b == b'\n') {
                    Some(i) => {
                        self.push_line(&rest[..=i])?;
                        pos += i + 1;
                        let size = match httparse::parse_chunk_size(&self.line) {
                            Ok(httparse::Status::Complete((_, size))) => size,
                            _ => return Err(ParseError::InvalidChunk.into()),
                        };
                        self.line.clear();
                        self.state = if size == 0 {
                            State::Trailers
                        } else {
                            State::ChunkData { remaining: size }
                        };
                    }
                    None => {
                        self.push_line(rest)?;
                        pos = data.len();
                    }
                },
                State::ChunkData { remaining } => {
                    let take = remaining.min(rest.len() as u64) as usize;
                    let left = remaining - take as u64;
                    pos += take;
                    self.state = if left == 0 {
                        State::ChunkDataEnd { seen_cr: false }
                    } else {
                        State::ChunkData { remaining: left }
                    };
                    sink.on_body(&rest[..take])?;
                }
                State::ChunkDataEnd { seen_cr } => {
                    pos += 1;
                    match rest[0] {
                        b'\r' if !seen_cr => self.state = State::ChunkDataEnd { seen_cr: true },
                        b'\n' => self.state = State::ChunkSize,
                        _ => return Err(ParseError::InvalidChunk.into()),
                    }
                }
                State::Trailers => match rest.iter().position(|b| *b == b'\n') {
                    Some(i) => {
                        self.push_line(&rest[..=i])?;
                        pos += i + 1;
                        let blank = matches!(self.line.as_slice(), b"\r\n" | b"\n");
                        self.line.clear();
                        if blank {
                            self.complete(sink)?;
                            return Ok(pos);
                        }
                    }
                    None => {
                        self.push_line(rest)?;
                        pos = data.len();
                    }
                },
            }
        }
        Ok(pos)
    }

    /// Signals end of input. Fails if a request was only partially received.
    pub fn finish(&mut self) -> Result<()> {
        if self.is_idle() {
            Ok(())
        } else {
            Err(ParseError::UnexpectedEof.into())
        }
    }

    fn push_line(&mut self, bytes: &[u8]) -> Result<()> {
        if self.line.len() + bytes.len() > MAX_CHUNK_LINE {
            return Err(ParseError::InvalidChunk.into());
        }
        self.line.try_reserve(bytes.len())?;
        self.line.extend_from_slice(bytes);
        Ok(())
    }

    fn complete<S: ParserSink + ?Sized>(&mut self, sink: &mut S) -> Result<()> {
        self.state = State::Head;
        sink.on_message_complete()
    }

    /// Emits the events for a buffered head. Returns true if the message has no body.
    fn finish_head<S: ParserSink + ?Sized>(&mut self, sink: &mut S) -> Result<bool> {
        let head = std::mem::take(&mut self.head);
        let result = self.emit_head(&head, sink);
        self.head = head;
        self.head.clear();
        result
    }

    fn emit_head<S: ParserSink + ?Sized>(&mut self, head: &[u8], sink: &mut S) -> Result<bool> {
        let mut slots = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut slots);
        match req.parse(head) {
            Ok(httparse::Status::Complete(_)) => {}
            Ok(httparse::Status::Partial) => return Err(ParseError::UnexpectedEof.into()),
            Err(e) => return Err(ParseError::Malformed(e).into()),
        }

        let method = req
            .method
            .and_then(Method::from_str)
            .ok_or(ParseError::InvalidMethod)?;
        sink.on_message_begin(method, req.version.unwrap_or(1))?;
        sink.on_url(req.path.unwrap_or("/").as_bytes())?;

        let mut body = BodyKind::Empty;
        for header in req.headers.iter() {
            if header.name.eq_ignore_ascii_case("transfer-encoding") {
                let last = header.value.rsplit(|b| *b == b',').next().unwrap_or_default();
                if last.trim_ascii().eq_ignore_ascii_case(b"chunked") {
                    body = BodyKind::Chunked;
                }
            } else if header.name.eq_ignore_ascii_case("content-length") {
                let length = parse_content_length(header.value)?;
                match body {
                    BodyKind::Chunked => {}
                    BodyKind::Length(seen) if seen != length => {
                        return Err(ParseError::InvalidContentLength.into());
                    }
                    _ => body = BodyKind::Length(length),
                }
            }
            sink.on_header_field(header.name.as_bytes())?;
            sink.on_header_value(header.value)?;
        }
        sink.on_headers_complete()?;

        match body {
            BodyKind::Empty | BodyKind::Length(0) => {
                self.complete(sink)?;
                Ok(true)
            }
            BodyKind::Length(remaining) => {
                self.state = State::FixedBody { remaining };
                Ok(false)
            }
            BodyKind::Chunked => {
                self.state = State::ChunkSize;
                Ok(false)
            }
        }
    }
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn parse_content_length(value: &[u8]) -> Result<u64> {
    std::str::from_utf8(value)
        .ok()
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| ParseError::InvalidContentLength.into())
}
