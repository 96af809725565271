//! Response content encodings.
//!
//! The client never compresses requests. It only has to undo whatever
//! `Content-Encoding` the server applied before the body reaches the
//! JSON-RPC codec. Gzip is always available; `deflate`, `br` and `zstd` each
//! sit behind a `compression-*` feature.

use std::io::{self, Read};

use bytes::Bytes;
use flate2::read::GzDecoder;

/// Content encodings recognised on responses.
///
/// Matching is case-insensitive. Encodings that are unknown, or whose cargo
/// feature is disabled, are reported as [`ContentEncoding::Identity`]: the body
/// is handed to the codec untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentEncoding {
    #[default]
    Identity,
    Gzip,
    #[cfg(feature = "compression-deflate")]
    Deflate,
    #[cfg(feature = "compression-br")]
    Brotli,
    #[cfg(feature = "compression-zstd")]
    Zstd,
}

impl ContentEncoding {
    /// Parse a `Content-Encoding` header value.
    pub fn from_header(value: Option<&str>) -> Self {
        let Some(value) = value.map(str::trim) else {
            return Self::Identity;
        };
        if value.eq_ignore_ascii_case("gzip") || value.eq_ignore_ascii_case("x-gzip") {
            return Self::Gzip;
        }
        #[cfg(feature = "compression-deflate")]
        if value.eq_ignore_ascii_case("deflate") {
            return Self::Deflate;
        }
        #[cfg(feature = "compression-br")]
        if value.eq_ignore_ascii_case("br") {
            return Self::Brotli;
        }
        #[cfg(feature = "compression-zstd")]
        if value.eq_ignore_ascii_case("zstd") {
            return Self::Zstd;
        }
        Self::Identity
    }

    /// Header token for this encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Gzip => "gzip",
            #[cfg(feature = "compression-deflate")]
            Self::Deflate => "deflate",
            #[cfg(feature = "compression-br")]
            Self::Brotli => "br",
            #[cfg(feature = "compression-zstd")]
            Self::Zstd => "zstd",
        }
    }

    pub fn is_identity(&self) -> bool {
        matches!(self, Self::Identity)
    }

    /// Undo this encoding on a complete body.
    ///
    /// Identity hands the body back without copying. Corrupt input, and a
    /// result larger than `max_size` bytes, are I/O errors.
    pub fn decode(&self, body: Bytes, max_size: Option<usize>) -> io::Result<Bytes> {
        match self {
            Self::Identity => {
                check_size(body.len(), max_size)?;
                Ok(body)
            }
            Self::Gzip => drain(GzDecoder::new(&body[..]), max_size),
            #[cfg(feature = "compression-deflate")]
            Self::Deflate => drain(flate2::read::ZlibDecoder::new(&body[..]), max_size),
            #[cfg(feature = "compression-br")]
            Self::Brotli => drain(brotli::Decompressor::new(&body[..], 4096), max_size),
            #[cfg(feature = "compression-zstd")]
            Self::Zstd => drain(zstd::Decoder::new(&body[..])?, max_size),
        }
    }
}

impl std::fmt::Display for ContentEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read a decoder to the end, stopping one byte past `max_size`.
fn drain<R: Read>(mut reader: R, max_size: Option<usize>) -> io::Result<Bytes> {
    let mut out = Vec::new();
    match max_size {
        Some(max) => (&mut reader)
            .take((max as u64).saturating_add(1))
            .read_to_end(&mut out)?,
        None => reader.read_to_end(&mut out)?,
    };
    check_size(out.len(), max_size)?;
    Ok(Bytes::from(out))
}

fn check_size(size: usize, max_size: Option<usize>) -> io::Result<()> {
    match max_size {
        Some(max) if size > max => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("decoded body exceeds {max} bytes"),
        )),
        _ => Ok(()),
    }
}
