//! WAV (RIFF/WAVE) muxer and demuxer.

use tracing::debug;

use crate::codectags::{self, CodecId, CodecTag};
use crate::error::{Error, Result};
use crate::packet::Packet;
use crate::protocol::Whence;
use crate::rational::Rational;
use crate::stream::{CodecParameters, Stream};

use super::registry::{InputFormatDescriptor, OutputFormatDescriptor};
use super::{Demuxer, FormatContext, Muxer};

pub static CODEC_WAV_TAGS: &[CodecTag] = codectags::CODEC_WAV_TAGS;

pub fn register(inputs: &mut Vec<InputFormatDescriptor>, outputs: &mut Vec<OutputFormatDescriptor>) {
  inputs.push(InputFormatDescriptor {
    name: "wav",
    mime_type: "audio/x-wav",
    extensions: "wav",
    make: || Box::new(WavDemuxer::default()),
  });
  outputs.push(OutputFormatDescriptor {
    name: "wav",
    mime_type: "audio/x-wav",
    extensions: "wav",
    needs_number: false,
    make: || Box::new(WavMuxer::default()),
  });
}

#[derive(Default)]
pub struct WavMuxer {
  data_size_offset: i64,
  data_bytes: u32,
}

impl Muxer for WavMuxer {
  fn write_header(&mut self, ctx: &mut FormatContext) -> Result<()> {
    let stream = ctx.stream(0)?.clone();
    let params = &stream.parameters;
    let tag = codectags::get_tag(CODEC_WAV_TAGS, params.codec_id).unwrap_or(0);
    let block_align = if params.block_align != 0 {
      params.block_align
    } else {
      params.channels * (params.bits_per_sample / 8).max(1)
    };
    let byte_rate = params.sample_rate * block_align as u32;

    let io = &mut ctx.io;
    io.put_buffer(b"RIFF")?;
    io.put_le32(0)?; // patched at trailer time
    io.put_buffer(b"WAVE")?;

    io.put_buffer(b"fmt ")?;
    io.put_le32(18)?; // WAVEFORMATEX plus the cb_size trailer word
    io.put_le16(tag as u16)?;
    io.put_le16(params.channels)?;
    io.put_le32(params.sample_rate)?;
    io.put_le32(byte_rate)?;
    io.put_le16(block_align)?;
    io.put_le16(params.bits_per_sample)?;
    io.put_le16(0)?; // cb_size: no extended format data for plain PCM

    io.put_buffer(b"data")?;
    self.data_size_offset = io.tell() as i64;
    io.put_le32(0)?; // patched at trailer time

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
    let riff_size = (end as u32).wrapping_sub(8);

    debug!(offset = 4, value = riff_size, "patching wav riff size");
    ctx.io.fseek(4, Whence::Set)?;
    ctx.io.put_le32(riff_size)?;

    debug!(offset = self.data_size_offset, value = self.data_bytes, "patching wav data size");
    ctx.io.fseek(self.data_size_offset, Whence::Set)?;
    ctx.io.put_le32(self.data_bytes)?;
    ctx.io.fseek(end, Whence::Set)?;
    ctx.io.put_flush_packet()
  }
}

#[derive(Default)]
pub struct WavDemuxer {
  data_remaining: u32,
}

impl Demuxer for WavDemuxer {
  fn read_probe(&self, probe_data: &[u8]) -> i32 {
    if probe_data.len() >= 12 && &probe_data[0..4] == b"RIFF" && &probe_data[8..12] == b"WAVE" {
      100
    } else {
      0
    }
  }

  fn read_header(&mut self, ctx: &mut FormatContext) -> Result<()> {
    let mut tag = [0u8; 4];
    ctx.io.get_buffer(&mut tag)?;
    if &tag != b"RIFF" {
      return Err(Error::InvalidData("missing RIFF tag".into()));
    }
    ctx.io.get_le32()?; // riff size, unused on read
    ctx.io.get_buffer(&mut tag)?;
    if &tag != b"WAVE" {
      return Err(Error::InvalidData("missing WAVE tag".into()));
    }

    let mut format_tag = 0u16;
    let mut channels = 1u16;
    let mut sample_rate = 0u32;
    let mut bits_per_sample = 0u16;
    let mut block_align = 0u16;
    let mut have_fmt = false;

    loop {
      let mut chunk_id = [0u8; 4];
      let read = ctx.io.get_buffer(&mut chunk_id)?;
      if read < 4 {
        break;
      }
      let chunk_size = ctx.io.get_le32()?;

      if &chunk_id == b"fmt " {
        format_tag = ctx.io.get_le16()?;
        channels = ctx.io.get_le16()?;
        sample_rate = ctx.io.get_le32()?;
        ctx.io.get_le32()?; // byte rate
        block_align = ctx.io.get_le16()?;
        bits_per_sample = ctx.io.get_le16()?;
        let consumed = 16;
        if chunk_size > consumed {
          skip(ctx, chunk_size - consumed)?;
        }
        have_fmt = true;
      } else if &chunk_id == b"data" {
        self.data_remaining = chunk_size;
        break;
      } else {
        skip(ctx, chunk_size)?;
      }

      if chunk_size % 2 == 1 {
        skip(ctx, 1)?;
      }
    }

    if !have_fmt {
      return Err(Error::InvalidData("missing fmt chunk".into()));
    }

    let codec_id = codectags::wav_codec_get_id(format_tag as u32, bits_per_sample);
    let mut params = CodecParameters::audio(codec_id, channels, sample_rate, bits_per_sample);
    params.codec_tag = format_tag as u32;
    params.block_align = block_align;

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
    let mut packet = Packet::new(size);
    let read = ctx.io.get_buffer(packet.data_mut())?;
    if read == 0 {
      return Err(Error::Eof);
    }
    self.data_remaining -= read as u32;
    let mut packet = if read != size {
      Packet::from_bytes(packet.data()[..read].to_vec())
    } else {
      packet
    };
    packet.set_stream_index(0);
    packet.set_key(true);
    Ok(packet)
  }
}

fn skip(ctx: &mut FormatContext, n: u32) -> Result<()> {
  let mut remaining = n as i64;
  let mut buf = [0u8; 256];
  while remaining > 0 {
    let n = (remaining as usize).min(buf.len());
    let read = ctx.io.get_buffer(&mut buf[..n])?;
    if read == 0 {
      return Err(Error::Eof);
    }
    remaining -= read as i64;
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ioctx::ByteIoContext;

  fn make_context() -> FormatContext {
    FormatContext {
      io: ByteIoContext::open_buf(Vec::new(), true),
      filename: "out.wav".into(),
      streams: Vec::new(),
      metadata: super::super::Metadata::default(),
      deferred_packets: std::collections::VecDeque::new(),
    }
  }

  #[test]
  fn s1_wav_round_trip() {
    let mut ctx = make_context();
    let params = CodecParameters::audio(CodecId::PcmS16Le, 1, 8000, 16);
    ctx.add_stream(Stream::new(0, Rational::new(1, 8000), params)).unwrap();

    let mut muxer = WavMuxer::default();
    muxer.write_header(&mut ctx).unwrap();
    let packet = Packet::from_bytes(vec![0x34, 0x12, 0x78, 0x56]);
    muxer.write_packet(&mut ctx, &packet).unwrap();
    muxer.write_trailer(&mut ctx).unwrap();

    let bytes = ctx.io.into_inner_buf();
    assert_eq!(bytes.len(), 50);
    assert_eq!(&bytes[0..4], b"RIFF");
    assert_eq!(&bytes[8..12], b"WAVE");
    assert_eq!(&bytes[20..22], &[0x01, 0x00]);
    assert_eq!(&bytes[22..24], &[0x01, 0x00]);
    assert_eq!(u32::from_le_bytes([bytes[24], bytes[25], bytes[26], bytes[27]]), 0x00001F40);

    let mut reader_ctx = FormatContext {
      io: ByteIoContext::open_buf(bytes, false),
      filename: "out.wav".into(),
      streams: Vec::new(),
      metadata: super::super::Metadata::default(),
      deferred_packets: std::collections::VecDeque::new(),
    };
    let mut demuxer = WavDemuxer::default();
    demuxer.read_header(&mut reader_ctx).unwrap();
    let packet = demuxer.read_packet(&mut reader_ctx).unwrap();
    assert_eq!(packet.data(), &[0x34, 0x12, 0x78, 0x56]);
  }
}
