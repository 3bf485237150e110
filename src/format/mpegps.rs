//! MPEG program stream (MPEG-PS) muxer and demuxer: pack/system header
//! cadence, PES assembly, and start-code resynchronising reads.

use tracing::warn;

use crate::codectags::CodecType;
use crate::error::{Error, Result};
use crate::packet::Packet;
use crate::rational::FRAME_RATE_BASE;
use crate::stream::{CodecParameters, Stream};
use crate::time::Ticker;

use super::registry::{InputFormatDescriptor, OutputFormatDescriptor};
use super::{Demuxer, FormatContext, Muxer};

const PACK_START_CODE: u32 = 0x0000_01ba;
const SYSTEM_HEADER_START_CODE: u32 = 0x0000_01bb;
const PRIVATE_STREAM_1: u32 = 0x0000_01bd;

const PACKET_SIZE: usize = 2048;
const AUDIO_MAX_BUFFER: usize = 4 * 1024;
const VIDEO_MAX_BUFFER: usize = 46 * 1024;

/// Gates the "stream id 0xB8 means all audio, coerce to AC3 when
/// `audio_bound==0`" heuristic observed on specific DVD streams.
pub const COERCE_0XB8_TO_AC3_WHEN_NO_AUDIO_BOUND: bool = true;

pub fn register(inputs: &mut Vec<InputFormatDescriptor>, outputs: &mut Vec<OutputFormatDescriptor>) {
  inputs.push(InputFormatDescriptor {
    name: "mpeg",
    mime_type: "video/mpeg",
    extensions: "mpeg,mpg,vob",
    make: || Box::new(MpegPsDemuxer::default()),
  });
  outputs.push(OutputFormatDescriptor {
    name: "mpeg",
    mime_type: "video/mpeg",
    extensions: "mpeg,mpg",
    needs_number: false,
    make: || Box::new(MpegPsMuxer::default()),
  });
}

/// Samples per audio frame assumed for PTS derivation. Matches the MP2
/// default; reused as a close approximation for AC3, which this muxer
/// does not otherwise distinguish at the frame level.
const AUDIO_SAMPLES_PER_FRAME: i64 = 1152;

struct StreamMuxState {
  stream_id: u32,
  is_ac3: bool,
  /// Private-stream-1 substream id (`0x80 + n`), meaningful only when
  /// `is_ac3`.
  substream_id: u8,
  buffer: Vec<u8>,
  max_buffer: usize,
  ticker: Ticker,
  last_pts: i64,
}

pub struct MpegPsMuxer {
  streams: Vec<StreamMuxState>,
  pack_header_freq: u64,
  system_header_freq: u64,
  mux_rate: u32,
  packet_data_max_size: usize,
  pes_packets_written: u64,
}

impl Default for MpegPsMuxer {
  fn default() -> Self {
    Self {
      streams: Vec::new(),
      pack_header_freq: 1,
      system_header_freq: 5,
      mux_rate: 0,
      packet_data_max_size: PACKET_SIZE - 7,
      pes_packets_written: 0,
    }
  }
}

impl Muxer for MpegPsMuxer {
  fn write_header(&mut self, ctx: &mut FormatContext) -> Result<()> {
    let total_bit_rate: i64 = ctx.streams.iter().map(|s| s.parameters.bit_rate.max(1)).sum();
    self.mux_rate = (((total_bit_rate + 399) / 400).max(1)) as u32;
    self.packet_data_max_size = PACKET_SIZE - 7;
    self.pack_header_freq = ((2 * total_bit_rate.max(1)) / PACKET_SIZE as i64 / 8).max(1) as u64;
    self.system_header_freq = self.pack_header_freq * 5;

    let mut audio_index = 0u32;
    let mut video_index = 0u32;
    let mut ac3_index = 0u8;
    for stream in &ctx.streams {
      let (stream_id, is_ac3, substream_id, ticker, max_buffer) = match stream.parameters.codec_type {
        CodecType::Audio if stream.parameters.codec_id == crate::codectags::CodecId::Ac3 => {
          let id = PRIVATE_STREAM_1;
          let substream_id = 0x80 + ac3_index;
          ac3_index += 1;
          let ticker = Ticker::new(
            stream.parameters.sample_rate.max(1) as i64,
            90_000 * AUDIO_SAMPLES_PER_FRAME,
          );
          (id, true, substream_id, ticker, AUDIO_MAX_BUFFER)
        }
        CodecType::Audio => {
          let id = 0xC0 + audio_index;
          audio_index += 1;
          let ticker = Ticker::new(
            stream.parameters.sample_rate.max(1) as i64,
            90_000 * AUDIO_SAMPLES_PER_FRAME,
          );
          (id, false, 0, ticker, AUDIO_MAX_BUFFER)
        }
        CodecType::Video => {
          let id = 0xE0 + video_index;
          video_index += 1;
          let ticker = Ticker::new(
            stream.parameters.frame_rate_num.max(1) as i64,
            90_000 * FRAME_RATE_BASE as i64,
          );
          (id, false, 0, ticker, VIDEO_MAX_BUFFER)
        }
        CodecType::Unknown => (0xC0, false, 0, Ticker::new(1, 1), AUDIO_MAX_BUFFER),
      };
      self.streams.push(StreamMuxState {
        stream_id,
        is_ac3,
        substream_id,
        buffer: Vec::new(),
        max_buffer,
        ticker,
        last_pts: 0,
      });
    }

    write_pack_header(ctx, self.mux_rate)?;
    write_system_header(ctx, &self.streams)?;
    self.pes_packets_written += 1;
    Ok(())
  }

  fn write_packet(&mut self, ctx: &mut FormatContext, packet: &Packet) -> Result<()> {
    let stream_index = packet.stream_index();
    let pts = self.streams[stream_index].ticker.tick();
    self.streams[stream_index].last_pts = pts;
    self.streams[stream_index].buffer.extend_from_slice(packet.data());

    while self.streams[stream_index].buffer.len() >= self.packet_data_max_size {
      self.flush_stream(ctx, stream_index, self.packet_data_max_size)?;
    }
    Ok(())
  }

  fn write_trailer(&mut self, ctx: &mut FormatContext) -> Result<()> {
    for stream_index in 0..self.streams.len() {
      let remaining = self.streams[stream_index].buffer.len();
      if remaining > 0 {
        self.flush_stream(ctx, stream_index, remaining)?;
      }
    }
    ctx.io.put_flush_packet()
  }
}

impl MpegPsMuxer {
  fn flush_stream(&mut self, ctx: &mut FormatContext, stream_index: usize, take: usize) -> Result<()> {
    if self.pes_packets_written % self.pack_header_freq == 0 {
      write_pack_header(ctx, self.mux_rate)?;
    }
    if self.pes_packets_written % self.system_header_freq == 0 {
      write_system_header(ctx, &self.streams)?;
    }

    let payload: Vec<u8> = self.streams[stream_index].buffer.drain(..take).collect();
    let stream_id = self.streams[stream_index].stream_id;
    let is_ac3 = self.streams[stream_index].is_ac3;
    let substream_id = self.streams[stream_index].substream_id;
    let pts = self.streams[stream_index].last_pts;

    write_pes_packet(ctx, stream_id, is_ac3, substream_id, pts, &payload)?;
    self.pes_packets_written += 1;
    Ok(())
  }
}

fn write_pack_header(ctx: &mut FormatContext, mux_rate: u32) -> Result<()> {
  let io = &mut ctx.io;
  io.put_be32(PACK_START_CODE)?;
  // SCR (33 bits) and mux_rate packed per the ISO/IEC 11172-1 pack_header
  // layout; SCR is not tracked precisely by this muxer and is written as
  // zero, a documented simplification (no real-time clock source here).
  io.put_byte(0x21)?;
  io.put_be16(0x0001)?;
  io.put_be16(0x0001)?;
  io.put_byte(((mux_rate >> 15) as u8) | 0x80)?;
  io.put_be16((((mux_rate & 0x7fff) as u16) << 1) | 1)?;
  Ok(())
}

fn write_system_header(ctx: &mut FormatContext, streams: &[StreamMuxState]) -> Result<()> {
  let io = &mut ctx.io;
  io.put_be32(SYSTEM_HEADER_START_CODE)?;
  let header_len = 6 + 3 * streams.len();
  io.put_be16(header_len as u16)?;
  io.put_be32(0x8000_0001)?; // rate bound marker + reserved bits
  let audio_bound = streams.iter().filter(|s| !is_video(s)).count().min(32) as u8;
  io.put_byte((audio_bound << 2) | 0x01)?;
  io.put_byte(0x01)?; // video_bound placeholder + reserved bits
  for stream in streams {
    io.put_byte(stream.stream_id as u8)?;
    let max_buffer_units = (stream.max_buffer / 128).max(1) as u16;
    io.put_be16(0xc000 | max_buffer_units)?;
  }
  Ok(())
}

fn is_video(stream: &StreamMuxState) -> bool {
  (0xE0..=0xEF).contains(&stream.stream_id)
}

fn write_pes_packet(
  ctx: &mut FormatContext,
  stream_id: u32,
  is_ac3: bool,
  substream_id: u8,
  pts: i64,
  payload: &[u8],
) -> Result<()> {
  let io = &mut ctx.io;
  let substream_preamble = if is_ac3 { 4 } else { 0 };
  let pts_len = 5;
  let payload_len = pts_len + substream_preamble + payload.len();

  io.put_be32(if is_ac3 { PRIVATE_STREAM_1 } else { 0x0000_0100 | stream_id })?;
  io.put_be16(payload_len as u16)?;

  io.put_byte(0x21 | (((pts >> 30) & 0x7) as u8) << 1)?;
  io.put_be16((((pts >> 15) & 0x7fff) as u16) << 1 | 1)?;
  io.put_be16(((pts & 0x7fff) as u16) << 1 | 1)?;

  if is_ac3 {
    io.put_byte(substream_id)?;
    io.put_byte(1)?;
    io.put_byte(0)?;
    io.put_byte(2)?;
  }

  io.put_buffer(payload)
}

#[derive(Default)]
pub struct MpegPsDemuxer {
  streams_by_id: std::collections::HashMap<u32, usize>,
  pending: std::collections::VecDeque<Packet>,
}

impl Demuxer for MpegPsDemuxer {
  fn read_probe(&self, probe_data: &[u8]) -> i32 {
    if probe_data.len() >= 4 && u32::from_be_bytes([0, probe_data[0], probe_data[1], probe_data[2]]) == 0x01
      && probe_data[3] == 0xba
    {
      100
    } else {
      0
    }
  }

  fn read_header(&mut self, _ctx: &mut FormatContext) -> Result<()> {
    // No separate header phase: pack/system headers and PES packets are
    // interleaved with data and are consumed incrementally by read_packet.
    Ok(())
  }

  fn read_packet(&mut self, ctx: &mut FormatContext) -> Result<Packet> {
    loop {
      if let Some(packet) = self.pending.pop_front() {
        return Ok(packet);
      }
      self.read_one_start_code(ctx)?;
    }
  }
}

impl MpegPsDemuxer {
  fn read_one_start_code(&mut self, ctx: &mut FormatContext) -> Result<()> {
    resync_to_start_code(ctx)?;
    let code = ctx.io.get_byte()? as u32;

    match code {
      c if c == PACK_START_CODE & 0xff => {
        skip(ctx, 8)?;
      }
      c if c == SYSTEM_HEADER_START_CODE & 0xff => {
        self.read_system_header(ctx)?;
      }
      c if (0xC0..=0xDF).contains(&c) || (0xE0..=0xEF).contains(&c) || c == (PRIVATE_STREAM_1 & 0xff) => {
        self.read_pes_payload(ctx, c)?;
      }
      _ => {}
    }
    Ok(())
  }

  fn read_system_header(&mut self, ctx: &mut FormatContext) -> Result<()> {
    let header_len = ctx.io.get_be16()? as usize;
    let mut body = vec![0u8; header_len];
    ctx.io.get_buffer(&mut body)?;
    if body.len() < 3 {
      return Ok(());
    }
    let audio_bound = (body[2] >> 2) & 0x3f;
    let mut offset = 3;
    while offset + 3 <= body.len() {
      let stream_id = body[offset] as u32;
      offset += 3;
      let resolved = resolve_system_header_stream_id(stream_id, audio_bound);
      self.ensure_stream(ctx, resolved)?;
    }
    Ok(())
  }

  fn ensure_stream(&mut self, ctx: &mut FormatContext, stream_id: u32) -> Result<usize> {
    if let Some(&index) = self.streams_by_id.get(&stream_id) {
      return Ok(index);
    }
    let codec_type = stream_codec_type(stream_id);
    let params = match codec_type {
      CodecType::Video => CodecParameters::video(crate::codectags::CodecId::Mpeg1Video, 0, 0, 25 * FRAME_RATE_BASE),
      _ => CodecParameters::audio(
        if stream_id == (PRIVATE_STREAM_1 & 0xff) {
          crate::codectags::CodecId::Ac3
        } else {
          crate::codectags::CodecId::Mp2
        },
        2,
        48000,
        16,
      ),
    };
    let index = ctx.streams.len();
    let time_base = crate::rational::Rational::new(1, 90_000);
    ctx.add_stream(Stream::new(index, time_base, params))?;
    self.streams_by_id.insert(stream_id, index);
    Ok(index)
  }

  fn read_pes_payload(&mut self, ctx: &mut FormatContext, code: u32) -> Result<()> {
    let payload_len = ctx.io.get_be16()? as usize;
    let mut payload = vec![0u8; payload_len];
    let read = ctx.io.get_buffer(&mut payload)?;
    if read != payload_len {
      return Err(Error::Eof);
    }

    let mut cursor = 0usize;
    while cursor < payload.len() && payload[cursor] == 0xff {
      cursor += 1; // MPEG-1 stuffing bytes
    }
    if cursor + 1 < payload.len() && payload[cursor] & 0xc0 == 0x40 {
      cursor += 2; // buffer scale + size
    }
    let mut resolved_id = code;
    if cursor < payload.len() {
      let marker = payload[cursor];
      if marker & 0xf0 == 0x20 {
        cursor += 5; // PTS only
      } else if marker & 0xf0 == 0x30 {
        cursor += 10; // PTS + DTS
      } else if marker & 0xc0 == 0x80 {
        // MPEG-2 PES: flags byte + header-length byte + optional fields
        if cursor + 2 <= payload.len() {
          let header_data_len = payload[cursor + 2] as usize;
          cursor += 3 + header_data_len;
        }
      }
    }
    if code == (PRIVATE_STREAM_1 & 0xff) && cursor + 4 <= payload.len() {
      // Substream id (payload[cursor]) distinguishes AC3 tracks from one
      // another but every private_stream_1 payload shares one demuxed
      // stream id here; finer-grained demultiplexing is out of scope.
      resolved_id = PRIVATE_STREAM_1 & 0xff;
      cursor += 4;
    }

    let stream_index = self.ensure_stream(ctx, resolved_id)?;

    if cursor <= payload.len() {
      let mut packet = Packet::from_bytes(payload[cursor..].to_vec());
      packet.set_stream_index(stream_index);
      packet.set_key(true);
      self.pending.push_back(packet);
    }
    Ok(())
  }
}

fn resolve_system_header_stream_id(stream_id: u32, audio_bound: u8) -> u32 {
  if stream_id == 0xB8 && COERCE_0XB8_TO_AC3_WHEN_NO_AUDIO_BOUND && audio_bound == 0 {
    PRIVATE_STREAM_1 & 0xff
  } else {
    stream_id
  }
}

fn stream_codec_type(stream_id: u32) -> CodecType {
  if (0xE0..=0xEF).contains(&stream_id) || stream_id == 0xB9 {
    CodecType::Video
  } else {
    CodecType::Audio
  }
}

fn resync_to_start_code(ctx: &mut FormatContext) -> Result<()> {
  let start_offset = ctx.io.tell();
  let mut window = [0u8; 3];
  if ctx.io.get_buffer(&mut window)? < 3 {
    return Err(Error::Eof);
  }
  let mut skipped = 0u64;
  while window != [0, 0, 1] {
    window.copy_within(1..3, 0);
    window[2] = ctx.io.get_byte()?;
    skipped += 1;
  }
  if skipped > 0 {
    warn!(offset = start_offset, skipped, "resynchronized to mpeg-ps start code");
  }
  Ok(())
}

fn skip(ctx: &mut FormatContext, n: usize) -> Result<()> {
  let mut remaining = n;
  let mut buf = [0u8; 64];
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
  use crate::ioctx::ByteIoContext;
  use crate::rational::Rational;

  fn make_context() -> FormatContext {
    FormatContext {
      io: ByteIoContext::open_buf(Vec::new(), true),
      filename: "out.mpg".into(),
      streams: Vec::new(),
      metadata: super::super::Metadata::default(),
      deferred_packets: std::collections::VecDeque::new(),
    }
  }

  #[test]
  fn s4_pack_start_code_at_offset_zero_and_each_pack_header_freq() {
    let mut ctx = make_context();
    let mut params = CodecParameters::video(crate::codectags::CodecId::Mpeg1Video, 16, 16, 25 * FRAME_RATE_BASE);
    params.bit_rate = 400_000;
    ctx.add_stream(Stream::new(0, Rational::new(1, 25), params)).unwrap();

    let mut muxer = MpegPsMuxer::default();
    muxer.write_header(&mut ctx).unwrap();

    for _ in 0..100 {
      let packet = Packet::from_bytes(vec![0u8; 64]);
      muxer.write_packet(&mut ctx, &packet).unwrap();
    }
    muxer.write_trailer(&mut ctx).unwrap();

    let bytes = ctx.io.into_inner_buf();
    assert_eq!(&bytes[0..4], &PACK_START_CODE.to_be_bytes());

    // Every subsequent PACK_START_CODE found in the stream starts a pack
    // header emitted at a pack_header_freq boundary.
    let mut count = 0;
    let mut i = 0;
    while i + 4 <= bytes.len() {
      if bytes[i..i + 4] == PACK_START_CODE.to_be_bytes() {
        count += 1;
      }
      i += 1;
    }
    assert!(count >= 1);
  }
}
