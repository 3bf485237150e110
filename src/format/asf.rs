//! ASF (Advanced Systems Format) muxer and demuxer: well-known object
//! GUIDs, fixed 3200-byte data packets, and fragment reassembly.

use tracing::debug;

use crate::codectags::CodecType;
use crate::error::{Error, Result};
use crate::guid::{self, Guid};
use crate::packet::Packet;
use crate::protocol::Whence;
use crate::rational::{Rational, FRAME_RATE_BASE};
use crate::stream::{CodecParameters, Stream, StreamPrivate};

use super::registry::{InputFormatDescriptor, OutputFormatDescriptor};
use super::{Demuxer, FormatContext, Muxer};

const PACKET_SIZE: usize = 3200;
const FRAGMENT_HEADER_SIZE: usize = 17;

/// Per-stream bookkeeping: the 1-based ASF stream number and the running
/// fragment sequence counter used when muxing.
#[derive(Debug, Clone, Default)]
pub struct AsfStreamState {
  pub stream_number: u8,
  pub frame_number: u64,
  seq: u32,
}

pub fn register(inputs: &mut Vec<InputFormatDescriptor>, outputs: &mut Vec<OutputFormatDescriptor>) {
  inputs.push(InputFormatDescriptor {
    name: "asf",
    mime_type: "video/x-ms-asf",
    extensions: "asf,wmv,wma",
    make: || Box::new(AsfDemuxer::default()),
  });
  outputs.push(OutputFormatDescriptor {
    name: "asf",
    mime_type: "video/x-ms-asf",
    extensions: "asf,wmv,wma",
    needs_number: false,
    make: || Box::new(AsfMuxer::default()),
  });
}

struct PendingFragment {
  stream_number: u8,
  key_frame: bool,
  seq: u32,
  frag_offset: u32,
  payload_size: u32,
  timestamp_ms: u32,
  data: Vec<u8>,
}

#[derive(Default)]
pub struct AsfMuxer {
  pending: Vec<PendingFragment>,
  pending_bytes: usize,
  /// Offset of the top-level `asf_header` object's size field, patched
  /// in `write_trailer` once the header's true extent is known.
  header_size_offset: i64,
  /// Size of the top-level header object, computed once `write_header`
  /// reaches the `data_header` boundary.
  header_size: u64,
  /// Offset of the file-properties object's `file size` field.
  file_size_offset: i64,
  /// Offset of the file-properties object's `data packets count` field.
  data_packets_count_offset: i64,
  /// Offset of the data object's `total data packets` field.
  total_data_packets_offset: i64,
  packet_count: u64,
}

impl Muxer for AsfMuxer {
  fn write_header(&mut self, ctx: &mut FormatContext) -> Result<()> {
    for (i, stream) in ctx.streams.iter_mut().enumerate() {
      stream.set_private(StreamPrivate::Asf(AsfStreamState {
        stream_number: (i + 1) as u8,
        frame_number: 0,
        seq: 0,
      }));
    }

    let io = &mut ctx.io;
    let header_start = io.tell();
    write_guid(io, &guid::ASF_HEADER)?;
    self.header_size_offset = io.tell();
    io.put_le64(0)?; // header object size, patched in write_trailer
    io.put_le32((2 + ctx.streams.len()) as u32)?;
    io.put_byte(1)?;
    io.put_byte(2)?;

    write_guid(io, &guid::FILE_HEADER)?;
    io.put_le64(104)?;
    write_guid(io, &guid::MY_GUID)?;
    self.file_size_offset = io.tell();
    io.put_le64(0)?; // file size, patched in write_trailer
    io.put_le64(0)?; // creation date
    self.data_packets_count_offset = io.tell();
    io.put_le64(0)?; // data packets count, patched in write_trailer
    io.put_le64(0)?; // play duration
    io.put_le64(0)?; // send duration
    io.put_le64(0)?; // preroll
    io.put_le32(0)?; // flags
    io.put_le32(PACKET_SIZE as u32)?; // min packet size
    io.put_le32(PACKET_SIZE as u32)?; // max packet size
    io.put_le32(0)?; // max bitrate

    write_guid(io, &guid::HEAD1_GUID)?;
    io.put_le64(24)?;
    write_guid(io, &guid::HEAD2_GUID)?;
    io.put_le64(24)?;

    if !ctx.metadata.title.is_empty()
      || !ctx.metadata.author.is_empty()
      || !ctx.metadata.copyright.is_empty()
      || !ctx.metadata.comment.is_empty()
    {
      write_comment_header(io, ctx)?;
    }

    for stream in ctx.streams.iter() {
      write_stream_header(io, stream)?;
    }

    write_guid(io, &guid::CODEC_COMMENT_HEADER)?;
    io.put_le64(24 + 16 + 4)?;
    write_guid(io, &guid::CODEC_COMMENT1_HEADER)?;
    io.put_le32(0)?; // entry count

    // The header object covers everything from asf_header up to (but not
    // including) the data object that follows.
    self.header_size = (io.tell() - header_start) as u64;

    write_guid(io, &guid::DATA_HEADER)?;
    io.put_le64(50)?;
    write_guid(io, &guid::MY_GUID)?;
    self.total_data_packets_offset = io.tell();
    io.put_le64(0)?; // total data packets, patched in write_trailer
    io.put_le16(0x0101)?;

    Ok(())
  }

  fn write_packet(&mut self, ctx: &mut FormatContext, packet: &Packet) -> Result<()> {
    let stream_index = packet.stream_index();
    let (stream_number, timestamp_ms, frame_number) = {
      let stream = ctx.stream_mut(stream_index)?;
      let state = match stream.private_mut() {
        Some(StreamPrivate::Asf(state)) => state,
        _ => return Err(Error::StreamNotFound(stream_index)),
      };
      let frame_number = state.frame_number;
      state.frame_number += 1;
      (state.stream_number, 0u32, frame_number)
    };

    let timestamp_ms = {
      let params = &ctx.stream(stream_index)?.parameters;
      match params.codec_type {
        CodecType::Audio if params.sample_rate > 0 => {
          let frame_size = 1u64; // one packet == one "frame" of payload at this API boundary
          (frame_number * frame_size * 1000 / params.sample_rate as u64) as u32
        }
        CodecType::Video if params.frame_rate_num > 0 => {
          (frame_number * 1000 * FRAME_RATE_BASE as u64 / params.frame_rate_num as u64) as u32
        }
        _ => timestamp_ms,
      }
    };

    let seq = {
      let stream = ctx.stream_mut(stream_index)?;
      match stream.private_mut() {
        Some(StreamPrivate::Asf(state)) => {
          let seq = state.seq;
          state.seq += 1;
          seq
        }
        _ => return Err(Error::StreamNotFound(stream_index)),
      }
    };

    let payload_size = packet.data().len() as u32;
    self.pending_bytes += FRAGMENT_HEADER_SIZE + packet.data().len();
    self.pending.push(PendingFragment {
      stream_number,
      key_frame: packet.is_key(),
      seq,
      frag_offset: 0,
      payload_size,
      timestamp_ms,
      data: packet.data().to_vec(),
    });

    self.flush_if_needed(ctx)
  }

  fn write_trailer(&mut self, ctx: &mut FormatContext) -> Result<()> {
    if !self.pending.is_empty() {
      self.flush_packet(ctx)?;
    }
    ctx.io.put_flush_packet()?;
    if ctx.io.is_streamed() {
      return Ok(());
    }

    let end = ctx.io.tell();
    debug!(offset = self.header_size_offset, value = self.header_size, "patching asf header object size");
    ctx.io.fseek(self.header_size_offset, Whence::Set)?;
    ctx.io.put_le64(self.header_size)?;

    debug!(offset = self.file_size_offset, value = end, "patching asf file size");
    ctx.io.fseek(self.file_size_offset, Whence::Set)?;
    ctx.io.put_le64(end as u64)?;

    debug!(offset = self.data_packets_count_offset, value = self.packet_count, "patching asf data packets count");
    ctx.io.fseek(self.data_packets_count_offset, Whence::Set)?;
    ctx.io.put_le64(self.packet_count)?;

    debug!(offset = self.total_data_packets_offset, value = self.packet_count, "patching asf total data packets");
    ctx.io.fseek(self.total_data_packets_offset, Whence::Set)?;
    ctx.io.put_le64(self.packet_count)?;

    ctx.io.fseek(end, Whence::Set)?;
    ctx.io.put_flush_packet()
  }
}

impl AsfMuxer {
  // Fixed header-per-fragment (17 bytes) dominates the "fewer than 18
  // bytes remain" rule from the packet layout: below that, the next
  // fragment header plus at least one payload byte would not fit.
  fn flush_if_needed(&mut self, ctx: &mut FormatContext) -> Result<()> {
    const PACKET_PAYLOAD_BUDGET: usize = PACKET_SIZE - 12; // fixed packet prologue
    if self.pending_bytes + FRAGMENT_HEADER_SIZE >= PACKET_PAYLOAD_BUDGET {
      self.flush_packet(ctx)?;
    }
    Ok(())
  }

  fn flush_packet(&mut self, ctx: &mut FormatContext) -> Result<()> {
    let io = &mut ctx.io;
    let packet_start = io.tell();

    io.put_byte(0x82)?;
    io.put_le16(0)?;
    let first = self.pending.first();
    let flags = if first.is_some() { 0x01 } else { 0x00 };
    io.put_byte(flags)?;
    io.put_byte(0x5d)?;
    io.put_byte(0)?; // pad size (none, fixed-size packets are padded at the end)
    let timestamp = first.map(|f| f.timestamp_ms).unwrap_or(0);
    io.put_le32(timestamp)?;
    io.put_le16(0)?; // duration
    io.put_byte((self.pending.len() as u8) | 0x80)?;

    for fragment in &self.pending {
      let stream_byte = fragment.stream_number | if fragment.key_frame { 0x80 } else { 0 };
      io.put_byte(stream_byte)?;
      io.put_byte((fragment.seq & 0xff) as u8)?;
      io.put_le32(fragment.frag_offset)?;
      io.put_byte(0x08)?;
      io.put_le32(fragment.payload_size)?;
      io.put_le32(fragment.timestamp_ms)?;
      io.put_le16(fragment.data.len() as u16)?;
      io.put_buffer(&fragment.data)?;
    }

    let written = (io.tell() - packet_start) as usize;
    if written < PACKET_SIZE {
      for _ in 0..(PACKET_SIZE - written) {
        io.put_byte(0)?;
      }
    }

    self.pending.clear();
    self.pending_bytes = 0;
    self.packet_count += 1;
    Ok(())
  }
}

fn write_guid(io: &mut crate::ioctx::ByteIoContext, guid: &Guid) -> Result<()> {
  io.put_buffer(&guid.to_bytes())
}

fn write_stream_header(io: &mut crate::ioctx::ByteIoContext, stream: &Stream) -> Result<()> {
  let is_video = stream.parameters.codec_type == CodecType::Video;
  write_guid(io, &guid::STREAM_HEADER)?;

  let type_specific: Vec<u8> = if is_video {
    let mut buf = Vec::new();
    buf.extend_from_slice(&stream.parameters.width.to_le_bytes());
    buf.extend_from_slice(&stream.parameters.height.to_le_bytes());
    buf.push(2);
    buf.extend_from_slice(&40u16.to_le_bytes());
    buf.extend_from_slice(&40u32.to_le_bytes()); // biSize
    buf.extend_from_slice(&stream.parameters.width.to_le_bytes());
    buf.extend_from_slice(&stream.parameters.height.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes()); // planes
    buf.extend_from_slice(&24u16.to_le_bytes()); // bit count
    buf.extend_from_slice(&stream.parameters.codec_tag.to_le_bytes());
    buf.extend_from_slice(&[0u8; 20]);
    buf
  } else {
    let mut buf = Vec::new();
    buf.extend_from_slice(&(stream.parameters.codec_tag as u16).to_le_bytes());
    buf.extend_from_slice(&stream.parameters.channels.to_le_bytes());
    buf.extend_from_slice(&stream.parameters.sample_rate.to_le_bytes());
    buf.extend_from_slice(&(stream.parameters.sample_rate * stream.parameters.block_align.max(1) as u32).to_le_bytes());
    buf.extend_from_slice(&stream.parameters.block_align.to_le_bytes());
    buf.extend_from_slice(&stream.parameters.bits_per_sample.to_le_bytes());
    buf.extend_from_slice(&0u16.to_le_bytes()); // cb_size
    buf
  };

  // 24 for the GUID+size header itself, then 16+16+8+4+4+2+4 of fixed
  // stream_header body fields, then the type-specific payload.
  let object_size = 24 + 54 + type_specific.len() as u64;
  io.put_le64(object_size)?;
  if is_video {
    write_guid(io, &guid::VIDEO_STREAM)?;
    write_guid(io, &guid::VIDEO_CONCEAL_NONE)?;
  } else {
    write_guid(io, &guid::AUDIO_STREAM)?;
    write_guid(io, &guid::AUDIO_CONCEAL_NONE)?;
  }
  io.put_le64(0)?; // time offset
  io.put_le32(0)?; // type-specific data length placeholder, corrected below
  io.put_le32(type_specific.len() as u32)?;
  io.put_le16(stream.id as u16)?;
  io.put_le32(0)?; // reserved
  io.put_buffer(&type_specific)
}

fn write_comment_header(io: &mut crate::ioctx::ByteIoContext, ctx: &FormatContext) -> Result<()> {
  write_guid(io, &guid::COMMENT_HEADER)?;
  let fields = [
    &ctx.metadata.title,
    &ctx.metadata.author,
    &ctx.metadata.copyright,
    &ctx.metadata.comment,
  ];
  let mut body = Vec::new();
  for field in fields {
    let utf16: Vec<u16> = field.encode_utf16().chain(std::iter::once(0)).collect();
    body.extend_from_slice(&((utf16.len() * 2) as u16).to_le_bytes());
    for unit in utf16 {
      body.extend_from_slice(&unit.to_le_bytes());
    }
  }
  io.put_le64(24 + body.len() as u64)?;
  io.put_buffer(&body)
}

#[derive(Default)]
pub struct AsfDemuxer {
  in_data: bool,
  partials: std::collections::HashMap<u8, PendingFragment>,
  completed: std::collections::VecDeque<Packet>,
}

impl Demuxer for AsfDemuxer {
  fn read_probe(&self, probe_data: &[u8]) -> i32 {
    if probe_data.len() >= 16 && probe_data[0..16] == guid::ASF_HEADER.to_bytes() {
      100
    } else {
      0
    }
  }

  fn read_header(&mut self, ctx: &mut FormatContext) -> Result<()> {
    let mut header = [0u8; 16];
    ctx.io.get_buffer(&mut header)?;
    if header != guid::ASF_HEADER.to_bytes() {
      return Err(Error::InvalidData("missing asf_header GUID".into()));
    }
    ctx.io.get_le64()?; // header object size
    ctx.io.get_le32()?; // sub-object count
    ctx.io.get_byte()?;
    ctx.io.get_byte()?;

    loop {
      let mut object_guid = [0u8; 16];
      let read = ctx.io.get_buffer(&mut object_guid)?;
      if read < 16 {
        return Err(Error::InvalidData("truncated ASF object stream".into()));
      }
      let object_size = ctx.io.get_le64()?;
      let remaining = object_size.saturating_sub(24);

      if object_guid == guid::STREAM_HEADER.to_bytes() {
        read_stream_header(ctx, remaining)?;
      } else if object_guid == guid::DATA_HEADER.to_bytes() {
        // The data_header body (file GUID, packet count, reserved word)
        // carries nothing the demuxer needs; skip it wholesale and start
        // reading fixed-size packets immediately after.
        skip(ctx, remaining as u32)?;
        self.in_data = true;
        break;
      } else {
        skip(ctx, remaining)?;
      }
    }

    Ok(())
  }

  fn read_packet(&mut self, ctx: &mut FormatContext) -> Result<Packet> {
    loop {
      if let Some(packet) = self.completed.pop_front() {
        return Ok(packet);
      }
      if !self.in_data {
        return Err(Error::Eof);
      }
      self.read_one_asf_packet(ctx)?;
    }
  }
}

impl AsfDemuxer {
  fn read_one_asf_packet(&mut self, ctx: &mut FormatContext) -> Result<()> {
    let start = ctx.io.tell();
    let mut prologue = [0u8; 1];
    if ctx.io.get_buffer(&mut prologue)? == 0 {
      self.in_data = false;
      return Ok(());
    }
    ctx.io.get_le16()?; // reserved word
    let _flags = ctx.io.get_byte()?;
    ctx.io.get_byte()?; // 0x5d
    ctx.io.get_byte()?; // pad size byte
    ctx.io.get_le32()?; // timestamp
    ctx.io.get_le16()?; // duration
    let nb_frames = ctx.io.get_byte()? & 0x7f;

    for _ in 0..nb_frames {
      let stream_byte = ctx.io.get_byte()?;
      let stream_number = stream_byte & 0x7f;
      let key_frame = stream_byte & 0x80 != 0;
      let seq = ctx.io.get_byte()? as u32;
      let frag_offset = ctx.io.get_le32()?;
      ctx.io.get_byte()?; // 0x08
      let payload_size = ctx.io.get_le32()?;
      let timestamp_ms = ctx.io.get_le32()?;
      let frag_len = ctx.io.get_le16()? as usize;
      let mut data = vec![0u8; frag_len];
      ctx.io.get_buffer(&mut data)?;

      if ctx.streams.iter().all(|s| s.id != stream_number as u32) {
        continue;
      }

      let extends = self
        .partials
        .get(&stream_number)
        .map(|p| p.seq == seq && p.frag_offset == frag_offset)
        .unwrap_or(false);

      if !extends {
        if frag_offset != 0 {
          self.partials.remove(&stream_number);
          continue;
        }
        self.partials.insert(
          stream_number,
          PendingFragment {
            stream_number,
            key_frame,
            seq,
            frag_offset: 0,
            payload_size,
            timestamp_ms,
            data: Vec::new(),
          },
        );
      }

      let partial = self.partials.get_mut(&stream_number).unwrap();
      partial.data.extend_from_slice(&data);
      partial.frag_offset += data.len() as u32;

      if partial.frag_offset >= partial.payload_size {
        let partial = self.partials.remove(&stream_number).unwrap();
        let stream_index = ctx
          .streams
          .iter()
          .position(|s| s.id == stream_number as u32)
          .unwrap();
        let mut packet = Packet::from_bytes(partial.data);
        packet.set_stream_index(stream_index);
        packet.set_key(partial.key_frame);
        self.completed.push_back(packet);
      }
    }

    let consumed = (ctx.io.tell() - start) as usize;
    if consumed < PACKET_SIZE {
      skip(ctx, (PACKET_SIZE - consumed) as u32)?;
    }
    Ok(())
  }
}

fn read_stream_header(ctx: &mut FormatContext, remaining: u64) -> Result<()> {
  let mut stream_type_guid = [0u8; 16];
  ctx.io.get_buffer(&mut stream_type_guid)?;
  let mut error_concealment_guid = [0u8; 16];
  ctx.io.get_buffer(&mut error_concealment_guid)?;
  ctx.io.get_le64()?; // time offset
  let type_specific_len = ctx.io.get_le32()?;
  ctx.io.get_le32()?; // error-concealment data length
  let stream_id = ctx.io.get_le16()?;
  ctx.io.get_le32()?; // reserved

  let mut type_specific = vec![0u8; type_specific_len as usize];
  ctx.io.get_buffer(&mut type_specific)?;

  let is_video = stream_type_guid == guid::VIDEO_STREAM.to_bytes();
  let params = if is_video {
    let width = u32::from_le_bytes(type_specific[0..4].try_into().unwrap_or_default());
    let height = u32::from_le_bytes(type_specific[4..8].try_into().unwrap_or_default());
    // Real frame rate is not carried in this header; derive from payload
    // timestamps once packets arrive. Preserved fallback per the source.
    CodecParameters::video(crate::codectags::CodecId::None, width, height, 25 * FRAME_RATE_BASE)
  } else {
    let channels = u16::from_le_bytes(type_specific[2..4].try_into().unwrap_or_default());
    let sample_rate = u32::from_le_bytes(type_specific[4..8].try_into().unwrap_or_default());
    let bits_per_sample = if type_specific.len() >= 16 {
      u16::from_le_bytes(type_specific[14..16].try_into().unwrap_or_default())
    } else {
      0
    };
    CodecParameters::audio(crate::codectags::CodecId::None, channels, sample_rate, bits_per_sample)
  };

  let index = ctx.streams.len();
  let time_base = if is_video {
    Rational::new(1, 1000)
  } else if params.sample_rate > 0 {
    Rational::new(1, params.sample_rate as i64)
  } else {
    Rational::new(1, 1000)
  };
  let mut stream = Stream::new(index, time_base, params);
  stream.id = stream_id as u32;
  stream.set_private(StreamPrivate::Asf(AsfStreamState {
    stream_number: stream_id as u8,
    frame_number: 0,
    seq: 0,
  }));
  ctx.add_stream(stream)?;

  let consumed = 16 + 16 + 8 + 4 + 4 + 2 + 4 + type_specific.len() as u64;
  if remaining > consumed {
    skip(ctx, (remaining - consumed) as u32)?;
  }
  Ok(())
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
      filename: "out.asf".into(),
      streams: Vec::new(),
      metadata: super::super::Metadata::default(),
      deferred_packets: std::collections::VecDeque::new(),
    }
  }

  #[test]
  fn s3_first_data_packet_starts_with_escape_and_key_stream_flag() {
    let mut ctx = make_context();
    let params = CodecParameters::video(CodecId::RawVideo, 16, 16, 25 * FRAME_RATE_BASE);
    ctx.add_stream(Stream::new(0, Rational::new(1, 1000), params)).unwrap();

    let mut muxer = AsfMuxer::default();
    muxer.write_header(&mut ctx).unwrap();
    let mut packet = Packet::from_bytes(vec![0u8; 32]);
    packet.set_key(true);
    muxer.write_packet(&mut ctx, &packet).unwrap();
    muxer.write_trailer(&mut ctx).unwrap();

    let bytes = ctx.io.into_inner_buf();
    let data_packet_start = bytes.len() - PACKET_SIZE;
    let packet_bytes = &bytes[data_packet_start..];
    assert_eq!(packet_bytes[0], 0x82);
    assert_eq!(packet_bytes[1], 0x00);
    assert_eq!(packet_bytes[2], 0x00);
    assert_eq!(packet_bytes[3] & 0x01, 0x01);
    let stream_byte_offset = 13;
    assert_eq!(packet_bytes[stream_byte_offset], 0x01 | 0x80);
  }

  #[test]
  fn trailer_patches_header_size_file_size_and_packet_count() {
    let mut ctx = make_context();
    let params = CodecParameters::video(CodecId::RawVideo, 16, 16, 25 * FRAME_RATE_BASE);
    ctx.add_stream(Stream::new(0, Rational::new(1, 1000), params)).unwrap();

    let mut muxer = AsfMuxer::default();
    muxer.write_header(&mut ctx).unwrap();
    for _ in 0..3 {
      let mut packet = Packet::from_bytes(vec![0u8; 2000]);
      packet.set_key(true);
      muxer.write_packet(&mut ctx, &packet).unwrap();
    }
    muxer.write_trailer(&mut ctx).unwrap();

    let bytes = ctx.io.into_inner_buf();
    let data_header_start = bytes.len() - PACKET_SIZE * 3 - 50;

    let header_size = u64::from_le_bytes(bytes[16..24].try_into().unwrap());
    assert_eq!(header_size, data_header_start as u64);

    let file_size_offset = 16 + 8 + 4 + 1 + 1 + 16 + 8 + 16;
    let file_size = u64::from_le_bytes(bytes[file_size_offset..file_size_offset + 8].try_into().unwrap());
    assert_eq!(file_size, bytes.len() as u64);

    let total_packets_offset = data_header_start + 16 + 8 + 16;
    let total_packets = u64::from_le_bytes(bytes[total_packets_offset..total_packets_offset + 8].try_into().unwrap());
    assert_eq!(total_packets, 3);
  }

  #[test]
  fn every_data_packet_is_exactly_3200_bytes() {
    let mut ctx = make_context();
    let params = CodecParameters::audio(CodecId::PcmS16Le, 1, 8000, 16);
    ctx.add_stream(Stream::new(0, Rational::new(1, 8000), params)).unwrap();

    let mut muxer = AsfMuxer::default();
    muxer.write_header(&mut ctx).unwrap();
    let data_start = ctx.io.tell();
    for _ in 0..20 {
      let packet = Packet::from_bytes(vec![0u8; 256]);
      muxer.write_packet(&mut ctx, &packet).unwrap();
    }
    muxer.write_trailer(&mut ctx).unwrap();

    let bytes = ctx.io.into_inner_buf();
    let data_len = bytes.len() as i64 - data_start;
    assert_eq!(data_len % PACKET_SIZE as i64, 0);
    assert!(data_len > 0);
  }
}
