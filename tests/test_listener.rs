mod common;

use std::cell::Cell;
use std::future::Future;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Duration;

use common::{dechunk, split_head};
use lantern::config::{Config, ServerConfig};
use lantern::server::adapter::{Interest, IoAdapter};
use lantern::server::echo::EchoHandler;
use lantern::server::listener::{Event, TokioAdapter, serve};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;

const DEADLINE: Duration = Duration::from_secs(10);
const LAST_CHUNK: &[u8] = b"\r\n0\r\n\r\n";

fn free_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

async fn connect(addr: SocketAddr) -> TcpStream {
    for _ in 0..50 {
        if let Ok(stream) = TcpStream::connect(addr).await {
            return stream;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("nothing listening on {addr}");
}

async fn read_until(stream: &mut TcpStream, wire: &mut Vec<u8>, done: impl Fn(&[u8]) -> bool) {
    let mut buf = [0u8; 4096];
    while !done(wire.as_slice()) {
        let n = stream.read(&mut buf).await.unwrap();
        assert!(n > 0, "connection closed early: {}", String::from_utf8_lossy(wire.as_slice()));
        wire.extend_from_slice(&buf[..n]);
    }
}

/// Reads until `count` complete chunked responses have arrived.
async fn read_responses(stream: &mut TcpStream, count: usize) -> Vec<u8> {
    let mut wire = Vec::new();
    read_until(stream, &mut wire, |w| {
        w.windows(LAST_CHUNK.len()).filter(|c| *c == LAST_CHUNK).count() >= count
    })
    .await;
    wire
}

fn echoed(response: &[u8]) -> String {
    let (head, body) = split_head(response);
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"), "{head}");
    assert!(head.contains("Transfer-Encoding: chunked\r\n"), "{head}");
    String::from_utf8(dechunk(body)).unwrap()
}

/// Runs the echo server on loopback while `client` talks to it, then
/// cancels the listener with a `/cancel/` request and waits for the loop
/// to return.
async fn with_echo_server<F, Fut>(client: F)
where
    F: FnOnce(SocketAddr) -> Fut,
    Fut: Future<Output = ()>,
{
    let addr = free_addr();
    let cfg = Config {
        server: ServerConfig {
            listen_addr: addr.to_string(),
            ..ServerConfig::default()
        },
    };
    let cancel = Rc::new(Cell::new(false));
    let server = serve(&cfg, Box::new(EchoHandler::new(cancel.clone())), cancel);
    let client = async move {
        client(addr).await;
        let mut stream = connect(addr).await;
        stream
            .write_all(b"GET /cancel/ HTTP/1.1\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut wire = Vec::new();
        stream.read_to_end(&mut wire).await.unwrap();
        assert!(echoed(&wire).starts_with("URL: /cancel/\r\n"));
    };

    let (served, ()) = timeout(DEADLINE, async { tokio::join!(server, client) })
        .await
        .expect("loopback exchange stalled");
    served.unwrap();
}

#[tokio::test]
async fn test_get_round_trip() {
    with_echo_server(|addr| async move {
        let mut stream = connect(addr).await;
        stream
            .write_all(b"GET /hello HTTP/1.1\r\nHost: lantern\r\n\r\n")
            .await
            .unwrap();

        let wire = read_responses(&mut stream, 1).await;
        assert_eq!(
            echoed(&wire),
            "URL: /hello\r\nMethod: GET\r\nHost: lantern\r\n\r\n"
        );
    })
    .await;
}

#[tokio::test]
async fn test_expect_continue_body_is_read() {
    with_echo_server(|addr| async move {
        let mut stream = connect(addr).await;
        stream
            .write_all(b"POST /upload HTTP/1.1\r\nExpect: 100-continue\r\nContent-Length: 4\r\n\r\n")
            .await
            .unwrap();

        let mut interim = Vec::new();
        read_until(&mut stream, &mut interim, |w| w.ends_with(b"\r\n\r\n")).await;
        assert_eq!(interim, b"HTTP/1.1 100 Continue\r\n\r\n");

        stream.write_all(b"body").await.unwrap();
        let wire = read_responses(&mut stream, 1).await;
        assert_eq!(
            echoed(&wire),
            "URL: /upload\r\nMethod: POST\r\nExpect: 100-continue\r\nContent-Length: 4\r\n\r\nbody"
        );

        // the connection keeps reading after the exchange
        stream.write_all(b"GET /next HTTP/1.1\r\n\r\n").await.unwrap();
        let wire = read_responses(&mut stream, 1).await;
        assert_eq!(echoed(&wire), "URL: /next\r\nMethod: GET\r\n\r\n");
    })
    .await;
}

#[tokio::test]
async fn test_pipelined_requests_round_trip() {
    with_echo_server(|addr| async move {
        let mut stream = connect(addr).await;
        stream
            .write_all(b"GET /a HTTP/1.1\r\n\r\nGET /b HTTP/1.1\r\n\r\n")
            .await
            .unwrap();

        let wire = read_responses(&mut stream, 2).await;
        let first_end = wire
            .windows(LAST_CHUNK.len())
            .position(|c| c == LAST_CHUNK)
            .unwrap()
            + LAST_CHUNK.len();
        assert_eq!(echoed(&wire[..first_end]), "URL: /a\r\nMethod: GET\r\n\r\n");
        assert_eq!(echoed(&wire[first_end..]), "URL: /b\r\nMethod: GET\r\n\r\n");
    })
    .await;
}

#[tokio::test]
async fn test_connection_close_round_trip() {
    with_echo_server(|addr| async move {
        let mut stream = connect(addr).await;
        stream
            .write_all(b"GET /bye HTTP/1.1\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();

        let mut wire = Vec::new();
        stream.read_to_end(&mut wire).await.unwrap();
        assert!(wire.ends_with(LAST_CHUNK));
        assert_eq!(
            echoed(&wire),
            "URL: /bye\r\nMethod: GET\r\nConnection: close\r\n\r\n"
        );
    })
    .await;
}

#[tokio::test]
async fn test_partial_report_rearms_the_rest() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut adapter = TokioAdapter::new("127.0.0.1:0", tx);
    let listen = adapter.open_socket().unwrap();
    adapter.request_poll(listen, Interest::READ).unwrap();
    let mut client = TcpStream::connect(adapter.local_addr().unwrap()).await.unwrap();

    let Some(Event::Accepted { token, result }) = timeout(DEADLINE, rx.recv()).await.unwrap() else {
        panic!("expected an accept report");
    };
    assert_eq!(adapter.adopt(token, result), Some(listen));
    let socket = adapter.accept(listen).unwrap();

    // writable at once, nothing to read yet
    adapter
        .request_poll(socket, Interest::READ | Interest::WRITE)
        .unwrap();
    let Some(Event::Ready { socket: ready, flags, token: first }) =
        timeout(DEADLINE, rx.recv()).await.unwrap()
    else {
        panic!("expected a readiness report");
    };
    assert_eq!(ready, socket);
    assert_eq!(flags, Interest::WRITE);
    assert!(adapter.take_ready(socket, first, flags));

    client.write_all(b"x").await.unwrap();
    let Some(Event::Ready { socket: ready, flags, token }) =
        timeout(DEADLINE, rx.recv()).await.unwrap()
    else {
        panic!("expected a readiness report");
    };
    assert_eq!(ready, socket);
    assert_eq!(flags, Interest::READ);
    assert!(!adapter.take_ready(socket, first, flags));
    assert!(adapter.take_ready(socket, token, flags));

    let mut buf = [0u8; 8];
    assert_eq!(adapter.recv(socket, &mut buf).unwrap(), 1);
    assert_eq!(&buf[..1], b"x");
}
