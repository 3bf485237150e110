//! `file:` protocol — direct POSIX file I/O.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};

use super::{flags, Protocol, UrlContext, Whence};
use crate::error::Result;

pub struct FileProtocol {
  file: File,
}

impl Protocol for FileProtocol {
  fn url_seek(&mut self, offset: i64, whence: Whence) -> Result<i64> {
    let from = match whence {
      Whence::Set => SeekFrom::Start(offset as u64),
      Whence::Cur => SeekFrom::Current(offset),
    };
    Ok(self.file.seek(from)?)
  }

  fn is_streamed(&self) -> bool {
    false
  }
}

impl Read for FileProtocol {
  fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
    self.file.read(buf)
  }
}

impl Write for FileProtocol {
  fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
    self.file.write(buf)
  }

  fn flush(&mut self) -> std::io::Result<()> {
    self.file.flush()
  }
}

pub fn open(path: &str, open_flags: i32) -> Result<UrlContext> {
  let file = if open_flags == flags::WRONLY {
    OpenOptions::new()
      .write(true)
      .create(true)
      .truncate(true)
      .open(path)?
  } else {
    OpenOptions::new().read(true).open(path)?
  };
  Ok(Box::new(FileProtocol { file }))
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write as _;

  #[test]
  fn writes_then_reads_back() {
    let dir = std::env::temp_dir();
    let path = dir.join("avformat_rs_file_protocol_test.bin");
    let path_str = path.to_str().unwrap().to_string();

    let mut ctx = open(&path_str, flags::WRONLY).unwrap();
    ctx.write_all(b"hello").unwrap();
    drop(ctx);

    let mut ctx = open(&path_str, flags::RDONLY).unwrap();
    let mut buf = Vec::new();
    ctx.read_to_end(&mut buf).unwrap();
    assert_eq!(buf, b"hello");

    let _ = std::fs::remove_file(&path_str);
  }
}
