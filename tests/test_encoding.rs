use std::io::Read;

use lantern::http::encoding::{Encoder, Encoding};

#[test]
fn test_first_supported_coding_wins() {
    assert_eq!(Encoding::from_accept_encoding(b"gzip, deflate"), Encoding::Gzip);
    assert_eq!(Encoding::from_accept_encoding(b"deflate,gzip"), Encoding::Deflate);
    assert_eq!(Encoding::from_accept_encoding(b"br, x-gzip"), Encoding::Gzip);
    assert_eq!(Encoding::from_accept_encoding(b"GZIP"), Encoding::Gzip);
}

#[test]
fn test_unsupported_or_refused_codings() {
    assert_eq!(Encoding::from_accept_encoding(b""), Encoding::Identity);
    assert_eq!(Encoding::from_accept_encoding(b"br, zstd"), Encoding::Identity);
    assert_eq!(Encoding::from_accept_encoding(b"gzip;q=0, deflate"), Encoding::Deflate);
    assert_eq!(Encoding::from_accept_encoding(b"gzip;q=0.5"), Encoding::Gzip);
}

#[test]
fn test_identity_has_no_encoder() {
    assert!(Encoder::new(Encoding::Identity, 6).is_none());
    assert_eq!(
        Encoder::new(Encoding::Deflate, 6).unwrap().encoding(),
        Encoding::Deflate
    );
}

#[test]
fn test_encoder_streams_until_finish() {
    let mut encoder = Encoder::new(Encoding::Gzip, 6).unwrap();
    let mut stream = Vec::new();

    for part in ["alpha ", "beta ", "gamma"] {
        let out = encoder.encode(part.as_bytes()).unwrap();
        assert!(!out.is_empty());
        stream.extend_from_slice(&out);
    }
    stream.extend_from_slice(&encoder.finish().unwrap());

    let mut decoded = String::new();
    flate2::read::GzDecoder::new(&stream[..])
        .read_to_string(&mut decoded)
        .unwrap();
    assert_eq!(decoded, "alpha beta gamma");
}
