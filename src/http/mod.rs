//! HTTP/1.1 protocol implementation.
//!
//! Nothing in this module performs I/O. Bytes read by the event loop are fed
//! into a [`Connection`](connection::Connection), which parses them and calls
//! back into a [`Handler`](handler::Handler); responses are serialized into
//! an outgoing queue that the server drains when the socket is writable.
//!
//! # Architecture
//!
//! - **`connection`**: per-client request state, poll interest and outgoing queue
//! - **`parser`**: incremental request parser emitting events to a sink
//! - **`request`**: request methods and keep-alive / `Expect` rules
//! - **`response`**: status table and the incremental response serializer
//! - **`writer`**: borrowed handle to a connection's open response
//! - **`encoding`**: `Accept-Encoding` negotiation and streaming compressors
//! - **`header`**, **`buffer`**, **`outgoing`**: the containers underneath
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌─────────────┐
//!        │   Reading   │ ← READ interest, bytes fed to the parser
//!        └──────┬──────┘
//!               │ Message complete (later bytes go to the backlog)
//!               ▼
//!        ┌──────────────────┐
//!        │   Responding     │ ← handler writes, WRITE interest
//!        └──────┬───────────┘
//!               │ Response ended and queue drained
//!               ├─ Keep-Alive → parse backlog, then Reading
//!               └─ Close → socket closed
//! ```

pub mod buffer;
pub mod connection;
pub mod encoding;
pub mod handler;
pub mod header;
pub mod outgoing;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
