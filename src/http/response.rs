use std::fmt;

use tracing::debug;

use crate::error::{Error, Result};
use crate::http::buffer::ByteBuffer;
use crate::http::encoding::{Encoder, Encoding};
use crate::http::header::{Header, HeaderList};
use crate::http::outgoing::OutgoingQueue;

const HTTP_VERSION: &str = "HTTP/1.1";

macro_rules! status_codes {
    ($($code:literal $name:ident $reason:literal;)+) => {
        /// HTTP status codes the server can emit.
        ///
        /// The set is closed: [`StatusCode::from_u16`] returns `None` for
        /// anything not listed here.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum StatusCode {
            $(
                #[doc = concat!(stringify!($code), " ", $reason)]
                $name,
            )+
        }

        impl StatusCode {
            /// Every supported status code, in ascending order.
            pub const ALL: &'static [StatusCode] = &[$(StatusCode::$name),+];

            /// Returns the numeric HTTP status code.
            ///
            /// # Example
            ///
            /// ```
            /// # use lantern::http::response::StatusCode;
            /// assert_eq!(StatusCode::Ok.as_u16(), 200);
            /// assert_eq!(StatusCode::NotFound.as_u16(), 404);
            /// ```
            pub fn as_u16(&self) -> u16 {
                match self {
                    $(StatusCode::$name => $code,)+
                }
            }

            /// Returns the standard HTTP reason phrase for this status code.
            pub fn reason_phrase(&self) -> &'static str {
                match self {
                    $(StatusCode::$name => $reason,)+
                }
            }

            /// Looks up a numeric code.
            ///
            /// ```
            /// # use lantern::http::response::StatusCode;
            /// assert_eq!(StatusCode::from_u16(204), Some(StatusCode::NoContent));
            /// assert_eq!(StatusCode::from_u16(299), None);
            /// ```
            pub fn from_u16(code: u16) -> Option<Self> {
                match code {
                    $($code => Some(StatusCode::$name),)+
                    _ => None,
                }
            }
        }
    };
}

status_codes! {
    100 Continue "Continue";
    101 SwitchingProtocols "Switching Protocols";
    200 Ok "OK";
    201 Created "Created";
    202 Accepted "Accepted";
    203 NonAuthoritativeInformation "Non-Authoritative Information";
    204 NoContent "No Content";
    205 ResetContent "Reset Content";
    206 PartialContent "Partial Content";
    300 MultipleChoices "Multiple Choices";
    301 MovedPermanently "Moved Permanently";
    302 Found "Found";
    303 SeeOther "See Other";
    304 NotModified "Not Modified";
    305 UseProxy "Use Proxy";
    307 TemporaryRedirect "Temporary Redirect";
    400 BadRequest "Bad Request";
    401 Unauthorized "Unauthorized";
    402 PaymentRequired "Payment Required";
    403 Forbidden "Forbidden";
    404 NotFound "Not Found";
    405 MethodNotAllowed "Method Not Allowed";
    406 NotAcceptable "Not Acceptable";
    407 ProxyAuthenticationRequired "Proxy Authentication Required";
    408 RequestTimeout "Request Timeout";
    409 Conflict "Conflict";
    410 Gone "Gone";
    411 LengthRequired "Length Required";
    412 PreconditionFailed "Precondition Failed";
    413 RequestEntityTooLarge "Request Entity Too Large";
    414 RequestUriTooLong "Request-URI Too Long";
    415 UnsupportedMediaType "Unsupported Media Type";
    416 RequestedRangeNotSatisfiable "Requested Range Not Satisfiable";
    417 ExpectationFailed "Expectation Failed";
    500 InternalServerError "Internal Server Error";
    501 NotImplemented "Not Implemented";
    502 BadGateway "Bad Gateway";
    503 ServiceUnavailable "Service Unavailable";
    504 GatewayTimeout "Gateway Timeout";
    505 HttpVersionNotSupported "HTTP Version Not Supported";
}

impl StatusCode {
    /// `HTTP/1.1 <code> <reason>\r\n`
    pub fn status_line(&self) -> String {
        format!("{} {} {}\r\n", HTTP_VERSION, self.as_u16(), self.reason_phrase())
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.reason_phrase())
    }
}

/// How the body length is communicated to the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    Chunked,
    ContentLength,
}

/// An HTTP response being produced incrementally.
///
/// A response starts out chunked with a `Transfer-Encoding: chunked` header.
/// Headers can be changed until the first [`write`](Response::write); that
/// write serializes the status line and headers, after which every body
/// write is framed according to [`Framing`]. Setting `Content-Length`
/// switches to raw framing and always takes precedence over
/// `Transfer-Encoding`, whatever the order of the calls.
///
/// Serialized bytes accumulate in [`output`](Response::output) as separate
/// segments. When the response is bound to a
/// [`Connection`](crate::http::connection::Connection) they are moved to the
/// connection's outgoing queue after every call.
#[derive(Debug)]
pub struct Response {
    headers: HeaderList,
    head_written: bool,
    headers_sent: bool,
    framing: Framing,
    done: bool,
    terminated: bool,
    encoder: Option<Encoder>,
    output: OutgoingQueue,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    /// Creates a chunked response with no content coding.
    pub fn new() -> Self {
        let chunked = Header::new(
            ByteBuffer::from("Transfer-Encoding"),
            ByteBuffer::from("chunked"),
        );
        Self {
            headers: HeaderList::from(vec![chunked]),
            head_written: false,
            headers_sent: false,
            framing: Framing::Chunked,
            done: false,
            terminated: false,
            encoder: None,
            output: OutgoingQueue::new(),
        }
    }

    /// Creates a response whose content coding is negotiated from the
    /// request's `Accept-Encoding` header, if any.
    pub fn for_request(request_headers: &HeaderList, level: u32) -> Result<Self> {
        let mut response = Self::new();
        if let Some(accept) = request_headers.find("Accept-Encoding") {
            response.negotiate(accept.value(), level)?;
        }
        Ok(response)
    }

    /// Chooses a content coding from an `Accept-Encoding` value and adds the
    /// matching `Content-Encoding` header.
    ///
    /// Does nothing once a coding was chosen or when `Content-Length` framing
    /// is in effect.
    pub fn negotiate(&mut self, accept_encoding: &[u8], level: u32) -> Result<()> {
        if self.headers_sent {
            return Err(Error::InvalidState("headers already sent"));
        }
        if self.encoder.is_some() || self.framing == Framing::ContentLength {
            return Ok(());
        }
        let encoding = Encoding::from_accept_encoding(accept_encoding);
        if let Some(encoder) = Encoder::new(encoding, level) {
            self.headers
                .push(b"Content-Encoding", encoding.as_str().as_bytes())?;
            self.encoder = Some(encoder);
        }
        Ok(())
    }

    /// Sets a response header.
    ///
    /// Fails with [`Error::InvalidState`] once headers were sent.
    pub fn set_header(&mut self, field: &str, value: impl AsRef<[u8]>) -> Result<()> {
        if self.headers_sent {
            return Err(Error::InvalidState("headers already sent"));
        }
        if field.eq_ignore_ascii_case("Content-Length") {
            self.headers.remove_all("Transfer-Encoding");
            self.headers.remove_all("Content-Length");
            if self.encoder.take().is_some() {
                self.headers.remove_all("Content-Encoding");
            }
            self.framing = Framing::ContentLength;
        } else if field.eq_ignore_ascii_case("Transfer-Encoding") {
            if self.framing == Framing::ContentLength {
                debug!("ignoring Transfer-Encoding on a Content-Length response");
                return Ok(());
            }
            self.headers.remove_all("Transfer-Encoding");
            self.framing = Framing::Chunked;
        }
        self.headers.push(field.as_bytes(), value.as_ref())
    }

    /// Queues the status line. Unknown codes fail with [`Error::InvalidParam`].
    pub fn write_head(&mut self, code: u16) -> Result<()> {
        let status = StatusCode::from_u16(code)
            .ok_or_else(|| Error::InvalidParam(format!("unknown status code {code}")))?;
        if self.head_written || self.headers_sent {
            return Err(Error::InvalidState("status line already written"));
        }
        self.output.push_owned(status.status_line().into_bytes())?;
        self.head_written = true;
        Ok(())
    }

    /// Writes a piece of the body.
    ///
    /// The first call also sends the headers (and a `200 OK` status line if
    /// [`write_head`](Response::write_head) was not called). With chunked
    /// framing an empty write emits the terminating `0\r\n\r\n` chunk; with
    /// `Content-Length` framing it writes nothing.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.done {
            return Err(Error::InvalidState("response already ended"));
        }
        self.send(data)
    }

    /// Formats into a scratch buffer and writes the result, so `write!` works
    /// on a response.
    pub fn write_fmt(&mut self, args: fmt::Arguments<'_>) -> Result<()> {
        let mut scratch = String::new();
        fmt::Write::write_fmt(&mut scratch, args)
            .map_err(|_| Error::InvalidParam("formatting failed".to_string()))?;
        self.write(scratch.as_bytes())
    }

    /// Finishes the response by writing the terminating frame.
    pub fn end(&mut self) -> Result<()> {
        if self.done {
            return Err(Error::InvalidState("response already ended"));
        }
        self.done = true;
        self.send(&[])
    }

    pub fn headers(&self) -> &HeaderList {
        &self.headers
    }

    pub fn headers_sent(&self) -> bool {
        self.headers_sent
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    pub fn is_chunked(&self) -> bool {
        self.framing == Framing::Chunked
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn encoding(&self) -> Encoding {
        self.encoder
            .as_ref()
            .map_or(Encoding::Identity, Encoder::encoding)
    }

    /// Serialized segments not yet handed to a connection.
    pub fn output(&self) -> &OutgoingQueue {
        &self.output
    }

    pub(crate) fn output_mut(&mut self) -> &mut OutgoingQueue {
        &mut self.output
    }

    fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.headers_sent {
            self.send_headers()?;
        }
        if self.terminated {
            if data.is_empty() {
                return Ok(());
            }
            return Err(Error::InvalidState("body already terminated"));
        }
        match self.framing {
            Framing::ContentLength => self.output.push_back(data),
            Framing::Chunked if data.is_empty() => {
                if let Some(encoder) = self.encoder.take() {
                    let tail = encoder.finish().map_err(Error::Compression)?;
                    self.push_chunk(&tail)?;
                }
                self.terminated = true;
                self.output.push_back(b"0\r\n\r\n")
            }
            Framing::Chunked => match self.encoder.as_mut() {
                Some(encoder) => {
                    let compressed = encoder.encode(data).map_err(Error::Compression)?;
                    self.push_chunk(&compressed)
                }
                None => self.push_chunk(data),
            },
        }
    }

    fn send_headers(&mut self) -> Result<()> {
        if !self.head_written {
            self.write_head(StatusCode::Ok.as_u16())?;
        }
        for header in self.headers.drain() {
            let mut line = Vec::new();
            line.try_reserve_exact(header.field().len() + header.value().len() + 4)?;
            line.extend_from_slice(header.field());
            line.extend_from_slice(b": ");
            line.extend_from_slice(header.value());
            line.extend_from_slice(b"\r\n");
            self.output.push_owned(line)?;
        }
        self.output.push_back(b"\r\n")?;
        self.headers_sent = true;
        Ok(())
    }

    /// Wraps `data` in a `<hex-size>\r\n<data>\r\n` frame.
    fn push_chunk(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let size = format!("{:x}\r\n", data.len());
        let mut frame = Vec::new();
        frame.try_reserve_exact(size.len() + data.len() + 2)?;
        frame.extend_from_slice(size.as_bytes());
        frame.extend_from_slice(data);
        frame.extend_from_slice(b"\r\n");
        self.output.push_owned(frame)
    }
}
