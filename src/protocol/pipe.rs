//! `pipe:` protocol — stdin on read, stdout on write. Not seekable.

use std::io::{Read, Stdin, Stdout, Write};

use super::{flags, Protocol, UrlContext, Whence};
use crate::error::{Error, Result};

pub enum PipeProtocol {
  Read(Stdin),
  Write(Stdout),
}

impl Protocol for PipeProtocol {
  fn url_seek(&mut self, _offset: i64, _whence: Whence) -> Result<i64> {
    Err(Error::NotSeekable)
  }

  fn is_streamed(&self) -> bool {
    true
  }
}

impl Read for PipeProtocol {
  fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
    match self {
      PipeProtocol::Read(stdin) => stdin.read(buf),
      PipeProtocol::Write(_) => Err(std::io::Error::from(std::io::ErrorKind::Unsupported)),
    }
  }
}

impl Write for PipeProtocol {
  fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
    match self {
      PipeProtocol::Write(stdout) => stdout.write(buf),
      PipeProtocol::Read(_) => Err(std::io::Error::from(std::io::ErrorKind::Unsupported)),
    }
  }

  fn flush(&mut self) -> std::io::Result<()> {
    match self {
      PipeProtocol::Write(stdout) => stdout.flush(),
      PipeProtocol::Read(_) => Ok(()),
    }
  }
}

pub fn open(open_flags: i32) -> Result<UrlContext> {
  if open_flags == flags::WRONLY {
    Ok(Box::new(PipeProtocol::Write(std::io::stdout())))
  } else {
    Ok(Box::new(PipeProtocol::Read(std::io::stdin())))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn pipe_is_never_seekable() {
    let mut ctx = open(flags::WRONLY).unwrap();
    assert!(ctx.url_seek(0, Whence::Cur).is_err());
  }
}
