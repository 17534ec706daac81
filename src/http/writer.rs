use std::fmt;

use crate::error::{Error, Result};
use crate::http::connection::Connection;
use crate::http::response::Response;

/// Borrowed handle to a connection's open response.
///
/// Every call is applied to the [`Response`] and its serialized output is
/// moved straight to the connection's outgoing queue, followed by a request
/// for write interest.
pub struct ResponseWriter<'a> {
    conn: &'a mut Connection,
}

impl<'a> ResponseWriter<'a> {
    pub(crate) fn new(conn: &'a mut Connection) -> Self {
        Self { conn }
    }

    pub fn set_header(&mut self, field: &str, value: impl AsRef<[u8]>) -> Result<()> {
        self.with(|response| response.set_header(field, value))
    }

    pub fn write_head(&mut self, code: u16) -> Result<()> {
        self.with(|response| response.write_head(code))
    }

    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        self.with(|response| response.write(data))
    }

    pub fn write_fmt(&mut self, args: fmt::Arguments<'_>) -> Result<()> {
        self.with(|response| response.write_fmt(args))
    }

    /// Ends the response. The connection releases it once everything is sent.
    pub fn end(mut self) -> Result<()> {
        self.with(Response::end)
    }

    pub fn response(&self) -> Option<&Response> {
        self.conn.current_response()
    }

    pub fn connection(&mut self) -> &mut Connection {
        self.conn
    }

    fn with<T>(&mut self, f: impl FnOnce(&mut Response) -> Result<T>) -> Result<T> {
        let response = self
            .conn
            .response_slot()
            .ok_or(Error::InvalidState("no response in progress"))?;
        let value = f(response)?;
        self.conn.flush_response()?;
        Ok(value)
    }
}

impl fmt::Debug for ResponseWriter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseWriter")
            .field("socket", &self.conn.socket())
            .field("response", &self.conn.current_response())
            .finish()
    }
}
