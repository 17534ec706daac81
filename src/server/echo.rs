use std::cell::Cell;
use std::rc::Rc;

use tracing::{debug, info};

use crate::error::Result;
use crate::http::connection::Connection;
use crate::http::handler::Handler;

/// Demo handler that answers every request with a plain-text description
/// of it: URL, method, headers, then the request body.
///
/// A request for a URL starting with `/cancel/` sets the shared `cancel`
/// flag, which the run loop turns into [`Server::cancel`](crate::server::Server::cancel).
#[derive(Debug, Clone)]
pub struct EchoHandler {
    cancel: Rc<Cell<bool>>,
}

impl EchoHandler {
    pub fn new(cancel: Rc<Cell<bool>>) -> Self {
        Self { cancel }
    }
}

impl Handler for EchoHandler {
    fn on_body(&mut self, conn: &mut Connection, chunk: &[u8]) -> Result<()> {
        match conn.data_mut::<Vec<u8>>() {
            Some(body) => {
                body.try_reserve(chunk.len())?;
                body.extend_from_slice(chunk);
            }
            None => conn.set_data(Box::new(chunk.to_vec())),
        }
        Ok(())
    }

    fn on_message_complete(&mut self, conn: &mut Connection) -> Result<()> {
        let body = conn
            .take_data()
            .and_then(|data| data.downcast::<Vec<u8>>().ok())
            .map(|body| *body)
            .unwrap_or_default();
        let url = conn.url().to_string();
        let method = conn.method().map_or("-", |m| m.as_str());
        let headers: Vec<String> = conn
            .headers()
            .iter()
            .map(|h| format!("{}: {}", h.field_str(), String::from_utf8_lossy(h.value())))
            .collect();

        info!("{} {}", method, url);
        if url.starts_with("/cancel/") {
            debug!(socket = %conn.socket(), "cancel requested");
            self.cancel.set(true);
        }

        let response = conn.new_response()?;
        let mut writer = conn.begin(response)?;
        writer.set_header("Content-Type", "text/plain")?;
        write!(writer, "URL: {url}\r\n")?;
        write!(writer, "Method: {method}\r\n")?;
        for header in &headers {
            write!(writer, "{header}\r\n")?;
        }
        writer.write(b"\r\n")?;
        writer.write(&body)?;
        writer.end()
    }
}
