//! The buffered byte-stream layer: a paging buffer over a [`UrlContext`]
//! (or a caller-supplied memory buffer), exposing typed integer
//! primitives in both endiannesses and flush-on-write semantics.
//!
//! This is the layer every container module in [`crate::format`] reads
//! and writes through; none of them touch a [`crate::protocol::Protocol`]
//! directly.

use crate::error::{Error, Result};
use crate::protocol::{UrlContext, Whence};

/// Default buffer size for protocol-backed streams: a small multiple of
/// a typical packet size.
pub const DEFAULT_BUFFER_SIZE: usize = 32 * 1024;

enum Backend {
  Url(UrlContext),
  Mem,
}

/// Buffered byte-stream over a protocol or an in-memory buffer.
///
/// Invariants (read mode): `buf_ptr <= buf_end <= buffer.len()` and bytes
/// in `buffer[..buf_end]` are valid data already fetched from the
/// backend. Invariants (write mode): `buf_ptr <= capacity` and bytes in
/// `buffer[..buf_ptr]` are pending writes not yet drained.
pub struct ByteIoContext {
  backend: Backend,
  buffer: Vec<u8>,
  capacity: usize,
  buf_ptr: usize,
  buf_end: usize,
  /// Stream position corresponding to `buffer[0]`.
  pos: i64,
  write_mode: bool,
  must_flush: bool,
  eof: bool,
  is_streamed: bool,
}

impl ByteIoContext {
  /// Attach to an opened [`UrlContext`], sizing the internal buffer to a
  /// multiple of the protocol's preferred packet size.
  pub fn fdopen(url: UrlContext, write_mode: bool) -> Self {
    let is_streamed = url.is_streamed();
    let packet_size = url.packet_size().max(1);
    let capacity = ((DEFAULT_BUFFER_SIZE + packet_size - 1) / packet_size) * packet_size;
    Self {
      backend: Backend::Url(url),
      buffer: vec![0u8; capacity],
      capacity,
      buf_ptr: 0,
      buf_end: 0,
      pos: 0,
      write_mode,
      must_flush: false,
      eof: false,
      is_streamed,
    }
  }

  /// Wrap a caller-owned in-memory buffer for bounded in-memory muxing.
  /// In write mode the buffer starts empty and grows; in read mode it is
  /// the full contents to read from.
  pub fn open_buf(memory: Vec<u8>, write_mode: bool) -> Self {
    let capacity = memory.len().max(DEFAULT_BUFFER_SIZE);
    let buf_end = if write_mode { 0 } else { memory.len() };
    let mut buffer = memory;
    buffer.resize(capacity, 0);
    Self {
      backend: Backend::Mem,
      buffer,
      capacity,
      buf_ptr: 0,
      buf_end,
      pos: 0,
      write_mode,
      must_flush: false,
      eof: false,
      is_streamed: false,
    }
  }

  pub fn is_streamed(&self) -> bool {
    self.is_streamed
  }

  /// For memory-backed contexts, take the bytes written so far.
  pub fn into_inner_buf(self) -> Vec<u8> {
    self.buffer[..self.buf_ptr.max(self.buf_end)].to_vec()
  }

  // --- write side ---------------------------------------------------

  pub fn put_byte(&mut self, byte: u8) -> Result<()> {
    match self.backend {
      Backend::Mem => {
        // The in-memory buffer IS the whole output; grow it rather than
        // draining to nowhere and resetting the write cursor.
        if self.buf_ptr >= self.buffer.len() {
          self.buffer.resize(self.buf_ptr + 1, 0);
        }
        self.buffer[self.buf_ptr] = byte;
        self.buf_ptr += 1;
      }
      Backend::Url(_) => {
        if self.buf_ptr >= self.capacity {
          self.drain()?;
        }
        self.buffer[self.buf_ptr] = byte;
        self.buf_ptr += 1;
      }
    }
    Ok(())
  }

  pub fn put_buffer(&mut self, bytes: &[u8]) -> Result<()> {
    for &b in bytes {
      self.put_byte(b)?;
    }
    Ok(())
  }

  pub fn put_le16(&mut self, v: u16) -> Result<()> {
    self.put_buffer(&v.to_le_bytes())
  }
  pub fn put_be16(&mut self, v: u16) -> Result<()> {
    self.put_buffer(&v.to_be_bytes())
  }
  pub fn put_le32(&mut self, v: u32) -> Result<()> {
    self.put_buffer(&v.to_le_bytes())
  }
  pub fn put_be32(&mut self, v: u32) -> Result<()> {
    self.put_buffer(&v.to_be_bytes())
  }
  pub fn put_le64(&mut self, v: u64) -> Result<()> {
    self.put_buffer(&v.to_le_bytes())
  }
  pub fn put_be64(&mut self, v: u64) -> Result<()> {
    self.put_buffer(&v.to_be_bytes())
  }

  /// Drain whatever is currently pending to the backend immediately.
  pub fn put_flush_packet(&mut self) -> Result<()> {
    self.drain()
  }

  fn drain(&mut self) -> Result<()> {
    match &mut self.backend {
      Backend::Url(url) => {
        if self.buf_ptr == 0 {
          return Ok(());
        }
        use std::io::Write;
        url.write_all(&self.buffer[..self.buf_ptr])?;
        self.pos += self.buf_ptr as i64;
        self.buf_ptr = 0;
        self.must_flush = false;
      }
      Backend::Mem => {
        // Nothing to drain: the in-memory buffer already holds every
        // byte written so far at its final position.
      }
    }
    Ok(())
  }

  // --- read side ------------------------------------------------------

  pub fn get_byte(&mut self) -> Result<u8> {
    if self.buf_ptr >= self.buf_end {
      self.refill()?;
      if self.buf_ptr >= self.buf_end {
        return Err(Error::Eof);
      }
    }
    let byte = self.buffer[self.buf_ptr];
    self.buf_ptr += 1;
    Ok(byte)
  }

  /// Read up to `out.len()` bytes, returning the number actually read
  /// (short on EOF, never an error for a short read here).
  pub fn get_buffer(&mut self, out: &mut [u8]) -> Result<usize> {
    let mut read = 0;
    while read < out.len() {
      if self.buf_ptr >= self.buf_end {
        self.refill()?;
        if self.buf_ptr >= self.buf_end {
          break;
        }
      }
      let available = self.buf_end - self.buf_ptr;
      let n = available.min(out.len() - read);
      out[read..read + n].copy_from_slice(&self.buffer[self.buf_ptr..self.buf_ptr + n]);
      self.buf_ptr += n;
      read += n;
    }
    Ok(read)
  }

  fn refill(&mut self) -> Result<()> {
    match &mut self.backend {
      Backend::Url(url) => {
        use std::io::Read;
        let n = url.read(&mut self.buffer[..])?;
        self.pos += self.buf_ptr as i64;
        self.buf_ptr = 0;
        self.buf_end = n;
        if n == 0 {
          self.eof = true;
        }
        Ok(())
      }
      Backend::Mem => {
        // Memory-backed reads are satisfied entirely up front in
        // `open_buf`; running out means real end of stream.
        self.eof = true;
        Ok(())
      }
    }
  }

  fn get_exact(&mut self, n: usize) -> Result<Vec<u8>> {
    let mut out = vec![0u8; n];
    let read = self.get_buffer(&mut out)?;
    if read != n {
      return Err(Error::Eof);
    }
    Ok(out)
  }

  pub fn get_le16(&mut self) -> Result<u16> {
    let b = self.get_exact(2)?;
    Ok(u16::from_le_bytes([b[0], b[1]]))
  }
  pub fn get_be16(&mut self) -> Result<u16> {
    let b = self.get_exact(2)?;
    Ok(u16::from_be_bytes([b[0], b[1]]))
  }
  pub fn get_le32(&mut self) -> Result<u32> {
    let b = self.get_exact(4)?;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
  }
  pub fn get_be32(&mut self) -> Result<u32> {
    let b = self.get_exact(4)?;
    Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
  }
  pub fn get_le64(&mut self) -> Result<u64> {
    let b = self.get_exact(8)?;
    Ok(u64::from_le_bytes(b.try_into().unwrap()))
  }
  pub fn get_be64(&mut self) -> Result<u64> {
    let b = self.get_exact(8)?;
    Ok(u64::from_be_bytes(b.try_into().unwrap()))
  }

  pub fn url_feof(&self) -> bool {
    self.eof && self.buf_ptr >= self.buf_end
  }

  // --- seek ------------------------------------------------------------

  /// Current stream position, equivalent to `fseek(0, Whence::Cur)`.
  pub fn tell(&self) -> i64 {
    self.pos + self.buf_ptr as i64
  }

  /// Seek within the stream. Only `Set`/`Cur` whences are supported.
  pub fn fseek(&mut self, offset: i64, whence: Whence) -> Result<i64> {
    let target = match whence {
      Whence::Set => offset,
      Whence::Cur => self.tell() + offset,
    };

    if self.write_mode {
      let window_start = self.pos;
      let window_end = self.pos + self.buf_ptr as i64;
      if !self.must_flush && target >= window_start && target <= window_end {
        self.buf_ptr = (target - window_start) as usize;
        return Ok(target);
      }
      self.drain()?;
      self.seek_backend(target)?;
      self.pos = target;
      self.must_flush = true;
      Ok(target)
    } else {
      let window_start = self.pos;
      let window_end = self.pos + self.buf_end as i64;
      if target >= window_start && target <= window_end {
        self.buf_ptr = (target - window_start) as usize;
        return Ok(target);
      }
      self.seek_backend(target)?;
      self.pos = target;
      self.buf_ptr = 0;
      self.buf_end = 0;
      self.eof = false;
      Ok(target)
    }
  }

  fn seek_backend(&mut self, target: i64) -> Result<()> {
    match &mut self.backend {
      Backend::Url(url) => {
        if self.is_streamed {
          return Err(Error::NotSeekable);
        }
        url.url_seek(target, Whence::Set)?;
        Ok(())
      }
      Backend::Mem => {
        if target < 0 || target as usize > self.buffer.len() {
          return Err(Error::InvalidData("seek out of bounds".into()));
        }
        self.buf_end = self.buffer.len().max(target as usize);
        Ok(())
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn byte_stream_round_trip_through_memory_buffer() {
    let mut ctx = ByteIoContext::open_buf(Vec::new(), true);
    ctx.put_byte(0x12).unwrap();
    ctx.put_le16(0x3456).unwrap();
    ctx.put_be32(0x789abcde).unwrap();
    let bytes = ctx.into_inner_buf();
    assert_eq!(bytes, vec![0x12, 0x56, 0x34, 0x78, 0x9a, 0xbc, 0xde]);

    let mut reader = ByteIoContext::open_buf(bytes, false);
    assert_eq!(reader.get_byte().unwrap(), 0x12);
    assert_eq!(reader.get_le16().unwrap(), 0x3456);
    assert_eq!(reader.get_be32().unwrap(), 0x789abcde);
  }

  #[test]
  fn seek_in_buffer_does_not_touch_backend_in_read_mode() {
    let data = vec![0u8, 1, 2, 3, 4, 5, 6, 7];
    let mut ctx = ByteIoContext::open_buf(data, false);
    ctx.get_byte().unwrap();
    ctx.get_byte().unwrap();
    let pos = ctx.fseek(0, Whence::Set).unwrap();
    assert_eq!(pos, 0);
    assert_eq!(ctx.tell(), 0);
    assert_eq!(ctx.get_byte().unwrap(), 0);
  }

  #[test]
  fn eof_latches_after_short_read() {
    let mut ctx = ByteIoContext::open_buf(vec![1, 2, 3], false);
    let mut out = [0u8; 8];
    let n = ctx.get_buffer(&mut out).unwrap();
    assert_eq!(n, 3);
    assert!(ctx.url_feof());
  }

  #[test]
  fn put_flush_packet_is_a_no_op_when_nothing_pending() {
    let mut ctx = ByteIoContext::open_buf(Vec::new(), true);
    ctx.put_flush_packet().unwrap();
    assert_eq!(ctx.into_inner_buf(), Vec::<u8>::new());
  }
}
