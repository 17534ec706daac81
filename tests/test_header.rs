use lantern::http::buffer::ByteBuffer;
use lantern::http::header::{Header, HeaderList};

#[test]
fn test_insertion_order_preserved() {
    let mut headers = HeaderList::new();
    headers.push(b"Host", b"example.com").unwrap();
    headers.push(b"Accept", b"*/*").unwrap();
    headers.push(b"Cookie", b"a=1").unwrap();

    let fields: Vec<&str> = headers.iter().map(Header::field_str).collect();
    assert_eq!(fields, vec!["Host", "Accept", "Cookie"]);
}

#[test]
fn test_find_is_case_insensitive() {
    let mut headers = HeaderList::new();
    headers.push(b"Content-Type", b"text/html").unwrap();

    assert_eq!(headers.find("CONTENT-TYPE").unwrap().value(), b"text/html");
    assert!(headers.contains("content-type"));
    assert!(headers.find("Content-Length").is_none());
}

#[test]
fn test_duplicates_allowed_first_match_wins() {
    let mut headers = HeaderList::new();
    headers.push(b"Set-Cookie", b"a=1").unwrap();
    headers.push(b"set-cookie", b"b=2").unwrap();

    assert_eq!(headers.len(), 2);
    assert_eq!(headers.find("Set-Cookie").unwrap().value_str(), Some("a=1"));
}

#[test]
fn test_remove_all() {
    let mut headers = HeaderList::new();
    headers.push(b"Transfer-Encoding", b"chunked").unwrap();
    headers.push(b"Key", b"v").unwrap();
    headers.push(b"transfer-encoding", b"gzip").unwrap();

    assert_eq!(headers.remove_all("Transfer-Encoding"), 2);
    assert_eq!(headers.len(), 1);
    assert_eq!(headers.remove_all("Transfer-Encoding"), 0);
}

#[test]
fn test_insert_tail_keeps_buffers() {
    let mut field = ByteBuffer::from("X-Id");
    let mut value = ByteBuffer::from("42");
    let value_ptr = value.as_bytes().as_ptr();

    let mut headers = HeaderList::new();
    headers
        .insert_tail(Header::new(field.take(), value.take()))
        .unwrap();

    let header = headers.find("x-id").unwrap();
    assert_eq!(header.value().as_ptr(), value_ptr);
    assert!(field.is_empty());
    assert!(value.is_empty());
}

#[test]
fn test_drain_and_clear() {
    let mut headers = HeaderList::new();
    headers.push(b"A", b"1").unwrap();
    headers.push(b"B", b"2").unwrap();

    let drained: Vec<Header> = headers.drain().collect();
    assert_eq!(drained.len(), 2);
    assert!(headers.is_empty());

    headers.push(b"C", b"3").unwrap();
    headers.clear();
    assert!(headers.is_empty());
}
