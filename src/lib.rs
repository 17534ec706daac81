//! Lantern - embeddable non-blocking HTTP/1.1 server engine
//!
//! The core parses requests and serializes responses without doing any
//! I/O of its own. The host event loop supplies an
//! [`IoAdapter`](server::adapter::IoAdapter) and reports readiness through
//! [`Server::socket_action`](server::Server::socket_action).

pub mod config;
pub mod error;
pub mod http;
pub mod server;

pub use error::{Error, Result};
