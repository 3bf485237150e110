//! AU (Sun/NeXT `.snd`) muxer and demuxer.
//!
//! The canonical `.snd` magic is big-endian-tagged (`MKTAG('.','s','n',
//! 'd')` read with `get_le32` in the source this module's behaviour is
//! grounded on). That source writes the magic via the same little-endian
//! primitive it uses for every other header field, and its own reader
//! matches on the little-endian encoding — so writer and reader agree
//! with each other but the result is not byte-compatible with a
//! canonical big-endian `.snd` file. Preserved here exactly, not fixed.

use tracing::debug;

use crate::codectags::{self, CodecTag};
use crate::error::{Error, Result};
use crate::packet::Packet;
use crate::protocol::Whence;
use crate::rational::Rational;
use crate::stream::{CodecParameters, Stream};

use super::registry::{InputFormatDescriptor, OutputFormatDescriptor};
use super::{Demuxer, FormatContext, Muxer};

pub static CODEC_AU_TAGS: &[CodecTag] = codectags::CODEC_AU_TAGS;

const AU_HEADER_SIZE: u32 = 24;
/// Magic bytes as written: little-endian, see module docs.
const AU_MAGIC_LE: [u8; 4] = [b'.', b's', b'n', b'd'];

pub fn register(inputs: &mut Vec<InputFormatDescriptor>, outputs: &mut Vec<OutputFormatDescriptor>) {
  inputs.push(InputFormatDescriptor {
    name: "au",
    mime_type: "audio/basic",
    extensions: "au,snd",
    make: || Box::new(AuDemuxer::default()),
  });
  outputs.push(OutputFormatDescriptor {
    name: "au",
    mime_type: "audio/basic",
    extensions: "au,snd",
    needs_number: false,
    make: || Box::new(AuMuxer::default()),
  });
}

#[derive(Default)]
pub struct AuMuxer {
  data_size_offset: i64,
  data_bytes: u32,
}

impl Muxer for AuMuxer {
  fn write_header(&mut self, ctx: &mut FormatContext) -> Result<()> {
    let stream = ctx.stream(0)?.clone();
    let params = &stream.parameters;
    let tag = codectags::get_tag(CODEC_AU_TAGS, params.codec_id).ok_or(Error::UnknownCodecTag)?;

    let io = &mut ctx.io;
    io.put_buffer(&AU_MAGIC_LE)?;
    io.put_be32(AU_HEADER_SIZE)?;
    self.data_size_offset = io.tell();
    io.put_be32(0xFFFFFFFF)?; // unknown size until trailer patches it
    io.put_be32(tag)?;
    io.put_be32(params.sample_rate)?;
    io.put_be32(params.channels as u32)?;

    Ok(())
  }

  fn write_packet(&mut self, ctx: &mut FormatContext, packet: &Packet) -> Result<()> {
    ctx.io.put_buffer(packet.data())?;
    self.data_bytes += packet.data().len() as u32;
    Ok(())
  }

  fn write_trailer(&mut self, ctx: &mut FormatContext) -> Result<()> {
    ctx.io.put_flush_packet()?;
    if ctx.io.is_streamed() {
      return Ok(());
    }
    let end = ctx.io.tell();
    debug!(offset = self.data_size_offset, value = self.data_bytes, "patching au data size");
    ctx.io.fseek(self.data_size_offset, Whence::Set)?;
    ctx.io.put_be32(self.data_bytes)?;
    ctx.io.fseek(end, Whence::Set)?;
    ctx.io.put_flush_packet()
  }
}

#[derive(Default)]
pub struct AuDemuxer {
  data_remaining: u32,
}

impl Demuxer for AuDemuxer {
  fn read_probe(&self, probe_data: &[u8]) -> i32 {
    if probe_data.len() >= 4 && probe_data[0..4] == AU_MAGIC_LE {
      100
    } else {
      0
    }
  }

  fn read_header(&mut self, ctx: &mut FormatContext) -> Result<()> {
    let mut magic = [0u8; 4];
    ctx.io.get_buffer(&mut magic)?;
    // Matches on the same little-endian encoding the writer produces.
    if magic != AU_MAGIC_LE {
      return Err(Error::InvalidData("bad AU magic".into()));
    }

    let header_size = ctx.io.get_be32()?;
    let data_size = ctx.io.get_be32()?;
    let tag = ctx.io.get_be32()?;
    let sample_rate = ctx.io.get_be32()?;
    let channels = ctx.io.get_be32()? as u16;

    if header_size > AU_HEADER_SIZE {
      skip(ctx, header_size - AU_HEADER_SIZE)?;
    }

    self.data_remaining = if data_size == 0xFFFFFFFF { u32::MAX } else { data_size };

    let codec_id = codectags::get_id(CODEC_AU_TAGS, tag);
    let params = CodecParameters::audio(codec_id, channels, sample_rate, 0);
    let stream = Stream::new(0, Rational::new(1, sample_rate.max(1) as i64), params);
    ctx.add_stream(stream)?;
    Ok(())
  }

  fn read_packet(&mut self, ctx: &mut FormatContext) -> Result<Packet> {
    if self.data_remaining == 0 {
      return Err(Error::Eof);
    }
    const CHUNK: u32 = 4096;
    let size = self.data_remaining.min(CHUNK) as usize;
    let mut buf = vec![0u8; size];
    let read = ctx.io.get_buffer(&mut buf)?;
    if read == 0 {
      return Err(Error::Eof);
    }
    buf.truncate(read);
    self.data_remaining = self.data_remaining.saturating_sub(read as u32);
    let mut packet = Packet::from_bytes(buf);
    packet.set_stream_index(0);
    packet.set_key(true);
    Ok(packet)
  }
}

fn skip(ctx: &mut FormatContext, n: u32) -> Result<()> {
  let mut remaining = n as usize;
  let mut buf = [0u8; 256];
  while remaining > 0 {
    let chunk = remaining.min(buf.len());
    let read = ctx.io.get_buffer(&mut buf[..chunk])?;
    if read == 0 {
      return Err(Error::Eof);
    }
    remaining -= read;
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::codectags::CodecId;
  use crate::ioctx::ByteIoContext;

  fn make_context() -> FormatContext {
    FormatContext {
      io: ByteIoContext::open_buf(Vec::new(), true),
      filename: "out.au".into(),
      streams: Vec::new(),
      metadata: super::super::Metadata::default(),
      deferred_packets: std::collections::VecDeque::new(),
    }
  }

  #[test]
  fn round_trip_preserves_payload_and_patches_data_size() {
    let mut ctx = make_context();
    let params = CodecParameters::audio(CodecId::PcmMulaw, 1, 8000, 8);
    ctx.add_stream(Stream::new(0, Rational::new(1, 8000), params)).unwrap();

    let mut muxer = AuMuxer::default();
    muxer.write_header(&mut ctx).unwrap();
    let packet = Packet::from_bytes(vec![1, 2, 3, 4, 5]);
    muxer.write_packet(&mut ctx, &packet).unwrap();
    muxer.write_trailer(&mut ctx).unwrap();

    let bytes = ctx.io.into_inner_buf();
    assert_eq!(bytes.len(), 29);
    assert_eq!(&bytes[0..4], &AU_MAGIC_LE);
    assert_eq!(u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]), 5);

    let mut reader_ctx = FormatContext {
      io: ByteIoContext::open_buf(bytes, false),
      filename: "out.au".into(),
      streams: Vec::new(),
      metadata: super::super::Metadata::default(),
      deferred_packets: std::collections::VecDeque::new(),
    };
    let mut demuxer = AuDemuxer::default();
    demuxer.read_header(&mut reader_ctx).unwrap();
    let packet = demuxer.read_packet(&mut reader_ctx).unwrap();
    assert_eq!(packet.data(), &[1, 2, 3, 4, 5]);
  }
}
