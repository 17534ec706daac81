use lantern::http::buffer::ByteBuffer;

#[test]
fn test_append_concatenates() {
    let mut buf = ByteBuffer::new();
    buf.append(b"Hello").unwrap();
    buf.append(b" world").unwrap();
    buf.append(b"!").unwrap();

    assert_eq!(buf.as_bytes(), b"Hello world!");
    assert_eq!(buf.as_str(), Some("Hello world!"));
    assert_eq!(buf.len(), 12);
}

#[test]
fn test_move_transfers_storage() {
    let mut a = ByteBuffer::from("Hello world!");
    let mut b = ByteBuffer::new();
    let ptr = a.as_bytes().as_ptr();

    b.move_from(&mut a);

    assert!(a.is_empty());
    assert_eq!(a.len(), 0);
    assert_eq!(b.as_bytes(), b"Hello world!");
    assert_eq!(b.as_bytes().as_ptr(), ptr);
}

#[test]
fn test_take_leaves_empty() {
    let mut a = ByteBuffer::from("field");
    let taken = a.take();

    assert!(a.is_empty());
    assert_eq!(taken.as_bytes(), b"field");
}

#[test]
fn test_clear_releases_storage() {
    let mut buf = ByteBuffer::from("some bytes");
    buf.clear();

    assert!(buf.is_empty());
    assert_eq!(buf.capacity(), 0);

    buf.append(b"again").unwrap();
    assert_eq!(buf.as_bytes(), b"again");
}

#[test]
fn test_case_insensitive_compare() {
    let buf = ByteBuffer::from("Content-Type");
    assert!(buf.eq_ignore_ascii_case(b"content-type"));
    assert!(!buf.eq_ignore_ascii_case(b"content-length"));
}

#[test]
fn test_invalid_utf8_has_no_str_view() {
    let buf = ByteBuffer::from(&[0xff, 0xfe][..]);
    assert_eq!(buf.as_str(), None);
    assert_eq!(buf.len(), 2);
}
