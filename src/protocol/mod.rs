//! URL protocol layer: a registry of named transports, each exposing
//! open/read/write/seek/close over an opaque [`UrlContext`].
//!
//! Mirrors the buffered byte-stream's expectation of a `Read + Write +
//! Seek`-shaped backend while keeping the "parse scheme, dispatch by
//! exact name" contract of the protocol list it replaces.

pub mod file;
pub mod http;
pub mod pipe;
pub mod tcp;
pub mod udp;

use std::io::{Read, Seek, Write};

use crate::error::{Error, Result};

/// Open-mode flags, mirroring the two values the protocol layer needs.
pub mod flags {
  pub const RDONLY: i32 = 0;
  pub const WRONLY: i32 = 1;
}

/// Any type implementing this can back a [`crate::ioctx::ByteIoContext`].
/// `is_streamed` sources are not seekable; `seek` on one must return
/// [`Error::NotSeekable`].
pub trait Protocol: Read + Write {
  fn url_seek(&mut self, offset: i64, whence: Whence) -> Result<i64>;
  fn is_streamed(&self) -> bool;
  /// Preferred chunk size for this transport; UDP packets, for instance,
  /// must not exceed this when written.
  fn packet_size(&self) -> usize {
    1
  }
}

/// The two seek origins the buffered byte-stream layer actually uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
  Set,
  Cur,
}

/// A boxed, type-erased opened protocol context.
pub type UrlContext = Box<dyn Protocol + Send>;

/// Parse the `scheme:` prefix off `uri`. An empty, single-character, or
/// absent prefix defaults to `file`.
fn scheme_of(uri: &str) -> &str {
  match uri.find(':') {
    Some(pos) if pos > 1 => &uri[..pos],
    _ => "file",
  }
}

/// Open `uri` for the given `flags` (see [`flags`]), dispatching to the
/// protocol named by its scheme.
pub fn open(uri: &str, open_flags: i32) -> Result<UrlContext> {
  match scheme_of(uri) {
    "file" => file::open(strip_scheme(uri, "file"), open_flags),
    "pipe" => pipe::open(open_flags),
    "udp" => udp::open(strip_scheme(uri, "udp")),
    "tcp" => tcp::open(strip_scheme(uri, "tcp")),
    "http" => http::open(uri, open_flags),
    scheme => Err(Error::UnsupportedFormat(format!("unknown protocol: {scheme}"))),
  }
}

fn strip_scheme<'a>(uri: &'a str, scheme: &str) -> &'a str {
  let prefix = format!("{scheme}:");
  uri.strip_prefix(&prefix).unwrap_or(uri)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn scheme_defaults_to_file_for_bare_paths() {
    assert_eq!(scheme_of("my_video.mp4"), "file");
    assert_eq!(scheme_of("C:/video.mp4"), "file");
  }

  #[test]
  fn scheme_recognised_for_known_prefixes() {
    assert_eq!(scheme_of("udp:239.0.0.1:1234"), "udp");
    assert_eq!(scheme_of("http://example.com/stream"), "http");
  }
}
