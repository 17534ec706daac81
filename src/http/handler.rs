use crate::error::Result;
use crate::http::connection::Connection;

/// Request callbacks invoked by a [`Connection`] while it parses.
///
/// All callbacks run synchronously inside
/// [`Server::socket_action`](crate::server::Server::socket_action). Returning
/// an error aborts the request and the connection is closed. The accumulated
/// URL, method and headers are available through the connection's getters;
/// they are reset right after `on_message_complete` returns.
pub trait Handler {
    /// A request header was parsed. It is appended to
    /// [`Connection::headers`] once this returns.
    fn on_header(&mut self, _conn: &mut Connection, _field: &[u8], _value: &[u8]) -> Result<()> {
        Ok(())
    }

    /// A piece of the request body. The core does not keep it.
    fn on_body(&mut self, _conn: &mut Connection, _chunk: &[u8]) -> Result<()> {
        Ok(())
    }

    /// The request has been fully received. This is where a response is
    /// usually started with [`Connection::begin`].
    fn on_message_complete(&mut self, _conn: &mut Connection) -> Result<()> {
        Ok(())
    }
}

/// Handler that ignores every request.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

impl Handler for NoopHandler {}
