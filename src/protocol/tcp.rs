//! `tcp:` protocol — connect-only client, blocking I/O.

use std::io::{Read, Write};
use std::net::TcpStream;

use super::{Protocol, UrlContext, Whence};
use crate::error::{Error, Result};

pub struct TcpProtocol {
  stream: TcpStream,
}

impl Protocol for TcpProtocol {
  fn url_seek(&mut self, _offset: i64, _whence: Whence) -> Result<i64> {
    Err(Error::NotSeekable)
  }

  fn is_streamed(&self) -> bool {
    true
  }
}

impl Read for TcpProtocol {
  fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
    self.stream.read(buf)
  }
}

impl Write for TcpProtocol {
  fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
    self.stream.write(buf)
  }

  fn flush(&mut self) -> std::io::Result<()> {
    self.stream.flush()
  }
}

pub fn open(host_port: &str) -> Result<UrlContext> {
  let stream = TcpStream::connect(host_port)?;
  Ok(Box::new(TcpProtocol { stream }))
}
