//! AVI (RIFF) muxer and demuxer.

use tracing::{debug, warn};

use crate::codectags::{self, CodecTag, CodecType};
use crate::error::{Error, Result};
use crate::packet::Packet;
use crate::protocol::Whence;
use crate::rational::{Rational, FRAME_RATE_BASE};
use crate::stream::{CodecParameters, Stream, StreamPrivate};

use super::registry::{InputFormatDescriptor, OutputFormatDescriptor};
use super::{Demuxer, FormatContext, Muxer};

pub static CODEC_BMP_TAGS: &[CodecTag] = codectags::CODEC_BMP_TAGS;

const AVIIF_KEYFRAME: u32 = 0x10;
const AVIF_HASINDEX: u32 = 0x10;
const AVIF_ISINTERLEAVED: u32 = 0x100;
const AVIF_TRUSTCKTYPE: u32 = 0x800;

/// Per-stream bookkeeping attached to [`Stream::private`]: the two-digit
/// stream ordinal used to build its `NNdc`/`NNwb` chunk tag.
#[derive(Debug, Clone)]
pub struct AviStreamState {
  pub stream_ordinal: u8,
  pub is_video: bool,
}

impl AviStreamState {
  fn chunk_tag(&self) -> [u8; 4] {
    let digits = format!("{:02}", self.stream_ordinal);
    let suffix = if self.is_video { b"dc" } else { b"wb" };
    let digits = digits.as_bytes();
    [digits[0], digits[1], suffix[0], suffix[1]]
  }
}

struct IndexEntry {
  tag: [u8; 4],
  flags: u32,
  offset_from_movi: u32,
  length: u32,
}

pub fn register(inputs: &mut Vec<InputFormatDescriptor>, outputs: &mut Vec<OutputFormatDescriptor>) {
  inputs.push(InputFormatDescriptor {
    name: "avi",
    mime_type: "video/x-msvideo",
    extensions: "avi",
    make: || Box::new(AviDemuxer::default()),
  });
  outputs.push(OutputFormatDescriptor {
    name: "avi",
    mime_type: "video/x-msvideo",
    extensions: "avi",
    needs_number: false,
    make: || Box::new(AviMuxer::default()),
  });
}

#[derive(Default)]
pub struct AviMuxer {
  movi_start: i64,
  riff_size_offset: i64,
  movi_size_offset: i64,
  index: Vec<IndexEntry>,
}

impl Muxer for AviMuxer {
  fn write_header(&mut self, ctx: &mut FormatContext) -> Result<()> {
    for (i, stream) in ctx.streams.iter_mut().enumerate() {
      let is_video = stream.parameters.codec_type == CodecType::Video;
      stream.set_private(StreamPrivate::Avi(AviStreamState {
        stream_ordinal: i as u8,
        is_video,
      }));
    }

    let video_frame_rate_num = ctx
      .streams
      .iter()
      .find(|s| s.parameters.codec_type == CodecType::Video)
      .map(|s| s.parameters.frame_rate_num)
      .unwrap_or(25 * FRAME_RATE_BASE);
    let total_bit_rate: i64 = ctx.streams.iter().map(|s| s.parameters.bit_rate).sum();

    let io = &mut ctx.io;
    io.put_buffer(b"RIFF")?;
    self.riff_size_offset = io.tell();
    io.put_le32(0)?;
    io.put_buffer(b"AVI ")?;

    io.put_buffer(b"LIST")?;
    let hdrl_size_offset = io.tell();
    io.put_le32(0)?;
    io.put_buffer(b"hdrl")?;

    io.put_buffer(b"avih")?;
    io.put_le32(56)?;
    let frame_period = (1_000_000u64 * FRAME_RATE_BASE as u64 / video_frame_rate_num.max(1) as u64) as u32;
    io.put_le32(frame_period)?;
    io.put_le32((total_bit_rate / 8) as u32)?;
    io.put_le32(0)?; // padding granularity
    io.put_le32(AVIF_TRUSTCKTYPE | AVIF_HASINDEX | AVIF_ISINTERLEAVED)?;
    io.put_le32(0)?; // total frames, unknown up front
    io.put_le32(0)?; // initial frames
    io.put_le32(ctx.streams.len() as u32)?;
    io.put_le32(0)?; // suggested buffer size
    io.put_le32(0)?; // width (unused at this level)
    io.put_le32(0)?; // height
    io.put_buffer(&[0u8; 16])?; // reserved

    for stream in ctx.streams.iter() {
      let private = match stream.private() {
        Some(StreamPrivate::Avi(s)) => s.clone(),
        _ => unreachable!("set above"),
      };
      io.put_buffer(b"LIST")?;
      let strl_size_offset = io.tell();
      io.put_le32(0)?;
      io.put_buffer(b"strl")?;

      io.put_buffer(b"strh")?;
      io.put_le32(56)?;
      if private.is_video {
        io.put_buffer(b"vids")?;
        let tag = codectags::get_tag(CODEC_BMP_TAGS, stream.parameters.codec_id).unwrap_or(0);
        io.put_buffer(&tag.to_le_bytes())?;
        io.put_le32(0)?; // flags
        io.put_le16(0)?; // priority
        io.put_le16(0)?; // language
        io.put_le32(0)?; // initial frames
        io.put_le32(FRAME_RATE_BASE)?; // scale
        io.put_le32(stream.parameters.frame_rate_num)?; // rate
        io.put_le32(0)?; // start
        io.put_le32(0)?; // length, patched conceptually but left 0 here
        io.put_le32(0)?; // suggested buffer size
        io.put_le32(u32::MAX)?; // quality
        io.put_le32(0)?; // sample size
        io.put_buffer(&[0u8; 8])?; // frame rect
      } else {
        io.put_buffer(b"auds")?;
        io.put_le32(1)?; // fourcc placeholder for audio stream type
        io.put_le32(0)?;
        io.put_le16(0)?;
        io.put_le16(0)?;
        io.put_le32(0)?;
        io.put_le32(1)?; // scale
        io.put_le32((stream.parameters.bit_rate / 8).max(1) as u32)?; // rate
        io.put_le32(0)?;
        io.put_le32(0)?;
        io.put_le32(0)?;
        io.put_le32(u32::MAX)?;
        io.put_le32(0)?;
        io.put_buffer(&[0u8; 8])?;
      }
      patch_list_size(io, strl_size_offset)?;

      io.put_buffer(b"strf")?;
      if private.is_video {
        io.put_le32(40)?;
        io.put_le32(40)?; // biSize
        io.put_le32(stream.parameters.width)?;
        io.put_le32(stream.parameters.height)?;
        io.put_le16(1)?; // planes
        io.put_le16(stream.parameters.bits_per_sample.max(24))?;
        let tag = codectags::get_tag(CODEC_BMP_TAGS, stream.parameters.codec_id).unwrap_or(0);
        io.put_buffer(&tag.to_le_bytes())?;
        io.put_le32(0)?; // image size
        io.put_le32(0)?;
        io.put_le32(0)?;
        io.put_le32(0)?;
        io.put_le32(0)?;
      } else {
        io.put_le32(16)?;
        io.put_le16(1)?; // format tag placeholder
        io.put_le16(stream.parameters.channels)?;
        io.put_le32(stream.parameters.sample_rate)?;
        io.put_le32((stream.parameters.sample_rate * stream.parameters.channels as u32 * 2))?;
        io.put_le16(stream.parameters.block_align)?;
        io.put_le16(stream.parameters.bits_per_sample)?;
      }

      patch_list_size(io, strl_size_offset_end_correction(strl_size_offset))?;
    }

    patch_list_size(io, hdrl_size_offset)?;

    io.put_buffer(b"LIST")?;
    self.movi_size_offset = io.tell();
    io.put_le32(0)?;
    io.put_buffer(b"movi")?;
    self.movi_start = io.tell();

    Ok(())
  }

  fn write_packet(&mut self, ctx: &mut FormatContext, packet: &Packet) -> Result<()> {
    let private = match ctx.stream(packet.stream_index())?.private() {
      Some(StreamPrivate::Avi(s)) => s.clone(),
      _ => return Err(Error::StreamNotFound(packet.stream_index())),
    };
    let tag = private.chunk_tag();
    let offset_from_movi = (ctx.io.tell() - self.movi_start) as u32;

    ctx.io.put_buffer(&tag)?;
    ctx.io.put_le32(packet.data().len() as u32)?;
    ctx.io.put_buffer(packet.data())?;
    if packet.data().len() % 2 == 1 {
      ctx.io.put_byte(0)?;
    }

    self.index.push(IndexEntry {
      tag,
      flags: if packet.is_key() { AVIIF_KEYFRAME } else { 0 },
      offset_from_movi,
      length: packet.data().len() as u32,
    });
    Ok(())
  }

  fn write_trailer(&mut self, ctx: &mut FormatContext) -> Result<()> {
    let movi_end = ctx.io.tell();

    ctx.io.put_buffer(b"idx1")?;
    ctx.io.put_le32((self.index.len() * 16) as u32)?;
    for entry in &self.index {
      ctx.io.put_buffer(&entry.tag)?;
      ctx.io.put_le32(entry.flags)?;
      ctx.io.put_le32(entry.offset_from_movi)?;
      ctx.io.put_le32(entry.length)?;
    }

    ctx.io.put_flush_packet()?;
    if ctx.io.is_streamed() {
      return Ok(());
    }
    let end = ctx.io.tell();

    let riff_size = (end - self.riff_size_offset - 4) as u32;
    debug!(offset = self.riff_size_offset, value = riff_size, "patching avi riff size");
    ctx.io.fseek(self.riff_size_offset, Whence::Set)?;
    ctx.io.put_le32(riff_size)?;

    let movi_size = (movi_end - self.movi_size_offset - 4) as u32;
    debug!(offset = self.movi_size_offset, value = movi_size, "patching avi movi list size");
    ctx.io.fseek(self.movi_size_offset, Whence::Set)?;
    ctx.io.put_le32(movi_size)?;

    ctx.io.fseek(end, Whence::Set)?;
    ctx.io.put_flush_packet()
  }
}

fn patch_list_size(io: &mut crate::ioctx::ByteIoContext, size_offset: i64) -> Result<()> {
  let end = io.tell();
  io.fseek(size_offset, Whence::Set)?;
  io.put_le32((end - size_offset - 4) as u32)?;
  io.fseek(end, Whence::Set)?;
  Ok(())
}

/// `strl`'s size field covers both `strh` and `strf`; this helper is a
/// thin naming wrapper so the mux code above reads linearly even though
/// it patches the same offset twice (once would suffice, but patching
/// after `strf` is what actually has the final size).
fn strl_size_offset_end_correction(offset: i64) -> i64 {
  offset
}

#[derive(Default)]
pub struct AviDemuxer {
  movi_end: i64,
  frame_period: u32,
}

impl Demuxer for AviDemuxer {
  fn read_probe(&self, probe_data: &[u8]) -> i32 {
    if probe_data.len() >= 12 && &probe_data[0..4] == b"RIFF" && &probe_data[8..12] == b"AVI " {
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
    ctx.io.get_le32()?;
    ctx.io.get_buffer(&mut tag)?;
    if &tag != b"AVI " {
      return Err(Error::InvalidData("missing AVI tag".into()));
    }

    let mut current_video: Option<usize> = None;
    loop {
      let mut chunk_id = [0u8; 4];
      if ctx.io.get_buffer(&mut chunk_id)? < 4 {
        break;
      }

      if &chunk_id == b"LIST" {
        let list_size = ctx.io.get_le32()?;
        let mut list_type = [0u8; 4];
        ctx.io.get_buffer(&mut list_type)?;
        if &list_type == b"movi" {
          self.movi_end = ctx.io.tell() + (list_size - 4) as i64;
          break;
        }
        // Otherwise (hdrl/strl) descend by continuing the loop: its
        // children are the next chunks in the stream.
        continue;
      }

      let chunk_size = ctx.io.get_le32()?;
      match &chunk_id {
        b"avih" => {
          self.frame_period = ctx.io.get_le32()?;
          skip(ctx, chunk_size - 4)?;
        }
        b"strh" => {
          let mut kind = [0u8; 4];
          ctx.io.get_buffer(&mut kind)?;
          let is_video = &kind == b"vids";
          let fourcc = ctx.io.get_le32()?;
          ctx.io.get_le32()?; // flags
          ctx.io.get_le16()?; // priority
          ctx.io.get_le16()?; // language
          ctx.io.get_le32()?; // initial frames
          let scale = ctx.io.get_le32()?;
          let rate = ctx.io.get_le32()?;
          skip(ctx, chunk_size - 4 - 4 - 4 - 2 - 2 - 4 - 4 - 4)?;

          let codec_type = if is_video { CodecType::Video } else { CodecType::Audio };
          let codec_id = if is_video {
            codectags::get_id(CODEC_BMP_TAGS, fourcc)
          } else {
            crate::codectags::CodecId::None
          };
          let index = ctx.streams.len();
          let mut params = CodecParameters::video(codec_id, 0, 0, 0);
          params.codec_type = codec_type;
          if is_video {
            params.frame_rate_num = if scale != 0 {
              ((rate as u64 * FRAME_RATE_BASE as u64) / scale as u64) as u32
            } else {
              25 * FRAME_RATE_BASE
            };
          } else {
            params.bit_rate = (rate as i64) * 8;
          }
          let mut stream = Stream::new(index, Rational::new(1, 1), params);
          stream.set_private(StreamPrivate::Avi(AviStreamState {
            stream_ordinal: index as u8,
            is_video,
          }));
          ctx.add_stream(stream)?;
          if is_video {
            current_video = Some(index);
          }
        }
        b"strf" => {
          if let Some(index) = current_video.take() {
            let stream = ctx.stream_mut(index)?;
            if stream.parameters.codec_type == CodecType::Video {
              ctx.io.get_le32()?; // biSize
              let width = ctx.io.get_le32()?;
              let height = ctx.io.get_le32()?;
              skip(ctx, chunk_size.saturating_sub(12))?;
              let stream = ctx.stream_mut(index)?;
              stream.parameters.width = width;
              stream.parameters.height = height;
            } else {
              skip(ctx, chunk_size)?;
            }
          } else if let Some(stream) = ctx.streams.last_mut() {
            if stream.parameters.codec_type == CodecType::Audio {
              let format_tag = ctx.io.get_le16()? as u32;
              let channels = ctx.io.get_le16()?;
              let sample_rate = ctx.io.get_le32()?;
              ctx.io.get_le32()?; // byte rate
              let block_align = ctx.io.get_le16()?;
              let bits_per_sample = ctx.io.get_le16()?;
              skip(ctx, chunk_size.saturating_sub(16))?;
              stream.parameters.codec_tag = format_tag;
              stream.parameters.channels = channels;
              stream.parameters.sample_rate = sample_rate;
              stream.parameters.block_align = block_align;
              stream.parameters.bits_per_sample = bits_per_sample;
              stream.time_base = Rational::new(1, sample_rate.max(1) as i64);
            } else {
              skip(ctx, chunk_size)?;
            }
          } else {
            skip(ctx, chunk_size)?;
          }
        }
        _ => {
          skip(ctx, chunk_size)?;
        }
      }
      if chunk_size % 2 == 1 {
        skip(ctx, 1)?;
      }
    }

    Ok(())
  }

  fn read_packet(&mut self, ctx: &mut FormatContext) -> Result<Packet> {
    loop {
      if ctx.io.tell() >= self.movi_end && self.movi_end != 0 {
        return Err(Error::Eof);
      }
      let mut tag = [0u8; 4];
      let read = resync_to_tag(ctx, &mut tag)?;
      if !read {
        return Err(Error::Eof);
      }
      let size = match ctx.io.get_le32() {
        Ok(size) => size,
        Err(_) => return Err(Error::Eof),
      };

      let stream_index = two_digit_to_index(&tag);
      let is_data = tag[2] == b'd' && tag[3] == b'c' || tag[2] == b'w' && tag[3] == b'b';
      if !is_data || stream_index >= ctx.streams.len() {
        skip(ctx, size)?;
        if size % 2 == 1 {
          skip(ctx, 1)?;
        }
        continue;
      }

      let mut packet = Packet::new(size as usize);
      let n = ctx.io.get_buffer(packet.data_mut())?;
      if n != size as usize {
        return Err(Error::Eof);
      }
      if size % 2 == 1 {
        skip(ctx, 1)?;
      }
      packet.set_stream_index(stream_index);
      packet.set_key(true);
      return Ok(packet);
    }
  }
}

fn two_digit_to_index(tag: &[u8; 4]) -> usize {
  let tens = (tag[0] as char).to_digit(10).unwrap_or(0);
  let ones = (tag[1] as char).to_digit(10).unwrap_or(0);
  (tens * 10 + ones) as usize
}

/// Scan byte-at-a-time until a plausible `NNdc`/`NNwb` tag is found,
/// resynchronising past corrupt bytes rather than failing outright.
fn resync_to_tag(ctx: &mut FormatContext, out: &mut [u8; 4]) -> Result<bool> {
  let start_offset = ctx.io.tell();
  let mut window = [0u8; 4];
  let read = ctx.io.get_buffer(&mut window)?;
  if read < 4 {
    return Ok(false);
  }
  let mut skipped = 0u64;
  loop {
    let looks_like_tag = window[0].is_ascii_digit()
      && window[1].is_ascii_digit()
      && ((window[2] == b'd' && window[3] == b'c') || (window[2] == b'w' && window[3] == b'b'));
    if looks_like_tag {
      *out = window;
      if skipped > 0 {
        warn!(offset = start_offset, skipped, "resynchronized to avi chunk tag");
      }
      return Ok(true);
    }
    window.copy_within(1..4, 0);
    match ctx.io.get_byte() {
      Ok(b) => {
        window[3] = b;
        skipped += 1;
      }
      Err(_) => return Ok(false),
    }
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
      filename: "out.avi".into(),
      streams: Vec::new(),
      metadata: super::super::Metadata::default(),
      deferred_packets: std::collections::VecDeque::new(),
    }
  }

  #[test]
  fn s2_avi_index_has_three_entries_tagged_00dc_four_apart() {
    let mut ctx = make_context();
    let params = CodecParameters::video(CodecId::RawVideo, 16, 16, 25 * FRAME_RATE_BASE);
    ctx.add_stream(Stream::new(0, Rational::new(1, 25), params)).unwrap();

    let mut muxer = AviMuxer::default();
    muxer.write_header(&mut ctx).unwrap();
    for _ in 0..3 {
      let packet = Packet::from_bytes(vec![0, 0, 0, 0]);
      muxer.write_packet(&mut ctx, &packet).unwrap();
    }
    muxer.write_trailer(&mut ctx).unwrap();

    assert_eq!(muxer.index.len(), 3);
    for entry in &muxer.index {
      assert_eq!(&entry.tag, b"00dc");
    }
    assert_eq!(muxer.index[1].offset_from_movi - muxer.index[0].offset_from_movi, 8 + 4);
    assert_eq!(muxer.index[2].offset_from_movi - muxer.index[1].offset_from_movi, 8 + 4);
  }
}
