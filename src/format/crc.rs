//! Output-only test sink: hashes every packet payload with Adler-32 and
//! emits a single `CRC=%08x\n` line at the trailer.

use crate::error::Result;
use crate::packet::Packet;

use super::registry::OutputFormatDescriptor;
use super::{FormatContext, Muxer};

const MOD_ADLER: u32 = 65521;

#[derive(Default)]
pub struct CrcMuxer {
  a: u32,
  b: u32,
  started: bool,
}

impl CrcMuxer {
  fn update(&mut self, data: &[u8]) {
    if !self.started {
      self.a = 1;
      self.b = 0;
      self.started = true;
    }
    for &byte in data {
      self.a = (self.a + byte as u32) % MOD_ADLER;
      self.b = (self.b + self.a) % MOD_ADLER;
    }
  }

  fn checksum(&self) -> u32 {
    (self.b << 16) | self.a
  }
}

impl Muxer for CrcMuxer {
  fn write_header(&mut self, _ctx: &mut FormatContext) -> Result<()> {
    self.a = 1;
    self.b = 0;
    self.started = true;
    Ok(())
  }

  fn write_packet(&mut self, _ctx: &mut FormatContext, packet: &Packet) -> Result<()> {
    self.update(packet.data());
    Ok(())
  }

  fn write_trailer(&mut self, ctx: &mut FormatContext) -> Result<()> {
    let line = format!("CRC={:08x}\n", self.checksum());
    ctx.io.put_buffer(line.as_bytes())?;
    ctx.io.put_flush_packet()
  }
}

pub fn register(_inputs: &mut Vec<super::registry::InputFormatDescriptor>, outputs: &mut Vec<OutputFormatDescriptor>) {
  outputs.push(OutputFormatDescriptor {
    name: "crc",
    mime_type: "",
    extensions: "",
    needs_number: false,
    make: || Box::new(CrcMuxer::default()),
  });
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ioctx::ByteIoContext;

  fn make_context() -> FormatContext {
    FormatContext {
      io: ByteIoContext::open_buf(Vec::new(), true),
      filename: String::new(),
      streams: Vec::new(),
      metadata: super::super::Metadata::default(),
      deferred_packets: std::collections::VecDeque::new(),
    }
  }

  #[test]
  fn crc_line_matches_adler32_of_concatenated_payloads() {
    let mut ctx = make_context();
    let mut muxer = CrcMuxer::default();
    muxer.write_header(&mut ctx).unwrap();
    muxer.write_packet(&mut ctx, &Packet::from_bytes(b"Wiki".to_vec())).unwrap();
    muxer.write_packet(&mut ctx, &Packet::from_bytes(b"pedia".to_vec())).unwrap();
    muxer.write_trailer(&mut ctx).unwrap();

    let bytes = ctx.io.into_inner_buf();
    let text = String::from_utf8(bytes).unwrap();
    // Adler-32("Wikipedia") is a well-known test vector: 0x11E60398.
    assert_eq!(text, "CRC=11e60398\n");
  }
}
