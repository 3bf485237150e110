//! `udp:` protocol — write-only unicast, URI `host:port`.

use std::io::{Read, Write};
use std::net::UdpSocket;

use super::{Protocol, UrlContext, Whence};
use crate::error::{Error, Result};

/// Default fragment size, chosen to stay under typical path MTU.
const DEFAULT_PACKET_SIZE: usize = 1500;
/// Caps the kernel tx buffer so queued-but-unsent datagrams cannot build
/// up latency past roughly one packet's worth of data.
const TX_BUFFER_CAP: usize = 32 * 1024;

pub struct UdpProtocol {
  socket: UdpSocket,
  packet_size: usize,
}

impl Protocol for UdpProtocol {
  fn url_seek(&mut self, _offset: i64, _whence: Whence) -> Result<i64> {
    Err(Error::NotSeekable)
  }

  fn is_streamed(&self) -> bool {
    true
  }

  fn packet_size(&self) -> usize {
    self.packet_size
  }
}

impl Read for UdpProtocol {
  fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
    self.socket.recv(buf)
  }
}

impl Write for UdpProtocol {
  fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
    let mut sent = 0;
    for chunk in buf.chunks(self.packet_size) {
      sent += self.socket.send(chunk)?;
    }
    Ok(sent)
  }

  fn flush(&mut self) -> std::io::Result<()> {
    Ok(())
  }
}

pub fn open(host_port: &str) -> Result<UrlContext> {
  let socket = UdpSocket::bind("0.0.0.0:0")?;
  socket.connect(host_port)?;
  set_send_buffer_cap(&socket, TX_BUFFER_CAP);
  Ok(Box::new(UdpProtocol {
    socket,
    packet_size: DEFAULT_PACKET_SIZE,
  }))
}

#[cfg(not(unix))]
fn set_send_buffer_cap(_socket: &UdpSocket, _cap: usize) {}

#[cfg(unix)]
fn set_send_buffer_cap(socket: &UdpSocket, cap: usize) {
  use std::os::unix::io::AsRawFd;
  // Best-effort; a failure here does not affect write correctness, only
  // how much kernel buffering can build up in front of the wire.
  unsafe {
    let fd = socket.as_raw_fd();
    let cap = cap as libc_sndbuf_t;
    let _ = set_sockopt_sndbuf(fd, cap);
  }
}

#[cfg(unix)]
type libc_sndbuf_t = i32;

#[cfg(unix)]
unsafe fn set_sockopt_sndbuf(fd: i32, cap: i32) -> i32 {
  extern "C" {
    fn setsockopt(
      socket: i32,
      level: i32,
      name: i32,
      value: *const i32,
      len: u32,
    ) -> i32;
  }
  const SOL_SOCKET: i32 = 1;
  const SO_SNDBUF: i32 = 7;
  setsockopt(fd, SOL_SOCKET, SO_SNDBUF, &cap as *const i32, 4)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn udp_is_streamed_and_fragments_writes() {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    let local_addr = socket.local_addr().unwrap();
    drop(socket);
    let mut ctx = open(&local_addr.to_string()).unwrap();
    assert!(ctx.is_streamed());
    assert!(ctx.write(&vec![0u8; 4000]).is_ok());
  }
}
