//! Content negotiation and streaming compression of response bodies.

use std::io::{self, Write};

use flate2::Compression;
use flate2::write::{GzEncoder, ZlibEncoder};

/// Content coding negotiated from `Accept-Encoding`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Identity,
    Gzip,
    Deflate,
}

impl Encoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Identity => "identity",
            Encoding::Gzip => "gzip",
            Encoding::Deflate => "deflate",
        }
    }

    /// Picks the first supported coding listed in an `Accept-Encoding` value.
    ///
    /// Tokens are separated by commas or spaces. Parameters are ignored,
    /// except that `q=0` refuses a coding.
    ///
    /// # Example
    ///
    /// ```
    /// # use lantern::http::encoding::Encoding;
    /// assert_eq!(Encoding::from_accept_encoding(b"br, deflate, gzip"), Encoding::Deflate);
    /// assert_eq!(Encoding::from_accept_encoding(b"br"), Encoding::Identity);
    /// ```
    pub fn from_accept_encoding(value: &[u8]) -> Self {
        let mut entries = value.split(|b| *b == b',').map(<[u8]>::trim_ascii);
        entries
            .find_map(|entry| {
                let mut parts = entry.split(|b| *b == b';');
                let names = parts.next().unwrap_or_default();
                if parts.any(is_zero_quality) {
                    return None;
                }
                names
                    .split(|b| *b == b' ')
                    .find_map(|token| match token.to_ascii_lowercase().as_slice() {
                        b"gzip" | b"x-gzip" => Some(Encoding::Gzip),
                        b"deflate" => Some(Encoding::Deflate),
                        _ => None,
                    })
            })
            .unwrap_or(Encoding::Identity)
    }
}

fn is_zero_quality(param: &[u8]) -> bool {
    let param = param.trim_ascii();
    let Some(q) = param
        .strip_prefix(b"q=")
        .or_else(|| param.strip_prefix(b"Q="))
    else {
        return false;
    };
    std::str::from_utf8(q)
        .ok()
        .and_then(|q| q.trim().parse::<f32>().ok())
        .is_some_and(|q| q == 0.0)
}

/// Incremental compressor for one response body.
///
/// Each [`encode`](Encoder::encode) call sync-flushes so the bytes written so
/// far can be sent right away; the stream is only terminated by
/// [`finish`](Encoder::finish).
pub enum Encoder {
    Gzip(GzEncoder<Vec<u8>>),
    Deflate(ZlibEncoder<Vec<u8>>),
}

impl Encoder {
    /// Returns `None` for [`Encoding::Identity`].
    pub fn new(encoding: Encoding, level: u32) -> Option<Self> {
        let level = Compression::new(level.min(9));
        match encoding {
            Encoding::Identity => None,
            Encoding::Gzip => Some(Encoder::Gzip(GzEncoder::new(Vec::new(), level))),
            Encoding::Deflate => Some(Encoder::Deflate(ZlibEncoder::new(Vec::new(), level))),
        }
    }

    pub fn encoding(&self) -> Encoding {
        match self {
            Encoder::Gzip(_) => Encoding::Gzip,
            Encoder::Deflate(_) => Encoding::Deflate,
        }
    }

    /// Compresses `data` and returns every byte the compressor produced.
    pub fn encode(&mut self, data: &[u8]) -> io::Result<Vec<u8>> {
        match self {
            Encoder::Gzip(enc) => {
                enc.write_all(data)?;
                enc.flush()?;
                Ok(std::mem::take(enc.get_mut()))
            }
            Encoder::Deflate(enc) => {
                enc.write_all(data)?;
                enc.flush()?;
                Ok(std::mem::take(enc.get_mut()))
            }
        }
    }

    /// Terminates the stream and returns the trailing bytes.
    pub fn finish(self) -> io::Result<Vec<u8>> {
        match self {
            Encoder::Gzip(enc) => enc.finish(),
            Encoder::Deflate(enc) => enc.finish(),
        }
    }
}

impl std::fmt::Debug for Encoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Encoder").field(&self.encoding()).finish()
    }
}
