use crate::http::header::HeaderList;

/// HTTP request methods.
///
/// Requests with any other method are rejected by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET - Retrieve a resource
    GET,
    /// POST - Create or submit data
    POST,
    /// PUT - Replace a resource
    PUT,
    /// DELETE - Delete a resource
    DELETE,
    /// HEAD - Like GET but without the response body
    HEAD,
    /// OPTIONS - Describe communication options
    OPTIONS,
    /// PATCH - Partial modification of a resource
    PATCH,
    /// CONNECT - Establish a tunnel
    CONNECT,
    /// TRACE - Loop-back test
    TRACE,
}

impl Method {
    /// Parses an HTTP method from a string.
    ///
    /// # Arguments
    ///
    /// * `s` - String representation of the method (case-sensitive, typically uppercase)
    ///
    /// # Returns
    ///
    /// `Some(Method)` if the string matches a known method, `None` otherwise.
    ///
    /// # Example
    ///
    /// ```
    /// # use lantern::http::request::Method;
    /// assert_eq!(Method::from_str("GET"), Some(Method::GET));
    /// assert_eq!(Method::from_str("get"), None);
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "GET" => Some(Method::GET),
            "POST" => Some(Method::POST),
            "PUT" => Some(Method::PUT),
            "DELETE" => Some(Method::DELETE),
            "HEAD" => Some(Method::HEAD),
            "OPTIONS" => Some(Method::OPTIONS),
            "PATCH" => Some(Method::PATCH),
            "CONNECT" => Some(Method::CONNECT),
            "TRACE" => Some(Method::TRACE),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::HEAD => "HEAD",
            Method::OPTIONS => "OPTIONS",
            Method::PATCH => "PATCH",
            Method::CONNECT => "CONNECT",
            Method::TRACE => "TRACE",
        }
    }
}

/// Determines whether the connection should remain open after the response.
///
/// An explicit `Connection: close` or `Connection: keep-alive` token decides.
/// Otherwise HTTP/1.1 defaults to keep-alive and HTTP/1.0 to close.
pub fn keep_alive(minor_version: u8, headers: &HeaderList) -> bool {
    let mut wants = minor_version >= 1;
    for header in headers.iter().filter(|h| h.is("Connection")) {
        let tokens = header
            .value()
            .split(|b| *b == b',')
            .map(|t| t.trim_ascii());
        for token in tokens {
            if token.eq_ignore_ascii_case(b"close") {
                return false;
            }
            if token.eq_ignore_ascii_case(b"keep-alive") {
                wants = true;
            }
        }
    }
    wants
}

/// Returns true if the request carries `Expect: 100-continue`.
pub fn expects_continue(headers: &HeaderList) -> bool {
    headers
        .iter()
        .filter(|h| h.is("Expect"))
        .any(|h| h.value().trim_ascii().eq_ignore_ascii_case(b"100-continue"))
}
