//! MOV / MP4 demuxer: a recursive-descent atom parser plus sequential,
//! chunk-offset-ordered packet delivery across streams.
//!
//! Mux is out of scope: the source this module's behaviour is grounded
//! on only ever reads MOV/MP4, never writes it.

use crate::codectags::{self, CodecType};
use crate::error::{Error, Result};
use crate::packet::Packet;
use crate::rational::{Rational, FRAME_RATE_BASE};
use crate::stream::{CodecParameters, Stream, StreamPrivate};

use super::registry::InputFormatDescriptor;
use super::{Demuxer, FormatContext};

pub static CODEC_MOV_VIDEO_TAGS: &[codectags::CodecTag] = codectags::CODEC_MOV_VIDEO_TAGS;
pub static CODEC_MOV_AUDIO_TAGS: &[codectags::CodecTag] = codectags::CODEC_MOV_AUDIO_TAGS;

pub fn register(inputs: &mut Vec<InputFormatDescriptor>, _outputs: &mut Vec<super::registry::OutputFormatDescriptor>) {
  inputs.push(InputFormatDescriptor {
    name: "mov",
    mime_type: "video/quicktime",
    extensions: "mov,mp4,m4a,m4v",
    make: || Box::new(MovDemuxer::default()),
  });
}

/// Sample-to-chunk and chunk-offset index tables plus the read cursor
/// the sequential packet reader advances across a single stream.
#[derive(Debug, Clone, Default)]
pub struct MovStreamState {
  pub chunk_offsets: Vec<u64>,
  /// `(first_chunk, samples_per_chunk)` runs as read from `stsc`, 1-based
  /// `first_chunk` per the on-disk convention.
  pub sample_to_chunk: Vec<(u32, u32)>,
  pub sample_size: SampleSize,
  pub visible: bool,
  pub next_chunk: usize,
}

#[derive(Debug, Clone)]
pub enum SampleSize {
  Constant(u32),
  PerSample(Vec<u32>),
}

impl Default for SampleSize {
  fn default() -> Self {
    SampleSize::Constant(0)
  }
}

impl MovStreamState {
  /// Total byte size of chunk `chunk_index` (0-based), derived from the
  /// sample-to-chunk runs and the per-sample or constant sample size.
  fn chunk_size(&self, chunk_index: usize) -> u64 {
    let samples_in_chunk = self.samples_in_chunk(chunk_index);
    match &self.sample_size {
      SampleSize::Constant(size) => samples_in_chunk as u64 * *size as u64,
      SampleSize::PerSample(sizes) => {
        let start = self.sample_index_of_chunk(chunk_index);
        sizes[start..start + samples_in_chunk].iter().map(|&s| s as u64).sum()
      }
    }
  }

  fn samples_in_chunk(&self, chunk_index: usize) -> usize {
    let chunk_number = (chunk_index + 1) as u32;
    let mut count = 1u32;
    for &(first_chunk, samples_per_chunk) in &self.sample_to_chunk {
      if first_chunk <= chunk_number {
        count = samples_per_chunk;
      }
    }
    count as usize
  }

  fn sample_index_of_chunk(&self, chunk_index: usize) -> usize {
    (0..chunk_index).map(|c| self.samples_in_chunk(c)).sum()
  }
}

#[derive(Default)]
pub struct MovDemuxer {
  mdat_offset: u64,
}

impl Demuxer for MovDemuxer {
  fn read_probe(&self, probe_data: &[u8]) -> i32 {
    if probe_data.len() >= 8 && &probe_data[4..8] == b"ftyp" {
      100
    } else if probe_data.len() >= 8 && (&probe_data[4..8] == b"moov" || &probe_data[4..8] == b"mdat") {
      80
    } else {
      0
    }
  }

  fn read_header(&mut self, ctx: &mut FormatContext) -> Result<()> {
    let mut seen_moov = false;
    let mut seen_mdat = false;

    loop {
      let size = match ctx.io.get_be32() {
        Ok(size) => size as u64,
        Err(_) => break,
      };
      let mut kind = [0u8; 4];
      if ctx.io.get_buffer(&mut kind)? < 4 {
        break;
      }
      let header_len: u64 = if size == 1 { 16 } else { 8 };
      let full_size = if size == 1 { ctx.io.get_be64()? } else { size };
      let body_len = if full_size == 0 { u64::MAX } else { full_size - header_len };

      match &kind {
        b"moov" => {
          read_moov(ctx, body_len)?;
          seen_moov = true;
        }
        b"mdat" => {
          self.mdat_offset = ctx.io.tell() as u64;
          skip(ctx, body_len)?;
          seen_mdat = true;
        }
        _ => {
          skip(ctx, body_len)?;
        }
      }

      if seen_moov && seen_mdat {
        break;
      }
    }

    if !seen_moov {
      return Err(Error::InvalidData("missing moov atom".into()));
    }

    ctx.streams.retain(|s| s.parameters.codec_type != CodecType::Unknown);
    for (new_index, stream) in ctx.streams.iter_mut().enumerate() {
      stream.index = new_index;
    }

    // read_header's atom walk skipped past mdat's body by size; rewind
    // to its start so sequential packet reads see the same bytes again.
    ctx.io.fseek(self.mdat_offset as i64, crate::protocol::Whence::Set)?;
    Ok(())
  }

  fn read_packet(&mut self, ctx: &mut FormatContext) -> Result<Packet> {
    loop {
      let candidate = ctx
        .streams
        .iter()
        .enumerate()
        .filter_map(|(i, s)| match s.private() {
          Some(StreamPrivate::Mov(state)) if state.next_chunk < state.chunk_offsets.len() => {
            Some((i, state.chunk_offsets[state.next_chunk]))
          }
          _ => None,
        })
        .min_by_key(|(_, offset)| *offset);

      let (stream_index, offset) = match candidate {
        Some(c) => c,
        None => return Err(Error::Eof),
      };

      if (ctx.io.tell() as u64) < offset {
        skip(ctx, offset - ctx.io.tell() as u64)?;
      }

      let chunk_index = match ctx.stream(stream_index)?.private() {
        Some(StreamPrivate::Mov(state)) => state.next_chunk,
        _ => unreachable!(),
      };
      let chunk_len = match ctx.stream(stream_index)?.private() {
        Some(StreamPrivate::Mov(state)) => state.chunk_size(chunk_index),
        _ => unreachable!(),
      };

      if let Some(StreamPrivate::Mov(state)) = ctx.stream_mut(stream_index)?.private_mut() {
        state.next_chunk += 1;
      }

      let mut data = vec![0u8; chunk_len as usize];
      let read = ctx.io.get_buffer(&mut data)?;
      if read != data.len() {
        return Err(Error::Eof);
      }

      let mut packet = Packet::from_bytes(data);
      packet.set_stream_index(stream_index);
      packet.set_key(true);
      return Ok(packet);
    }
  }
}

fn read_moov(ctx: &mut FormatContext, body_len: u64) -> Result<()> {
  read_container_body(ctx, body_len, &mut |ctx, kind, len| {
    if kind == b"trak" {
      read_trak(ctx, len)
    } else {
      skip(ctx, len)
    }
  })
}

fn read_trak(ctx: &mut FormatContext, body_len: u64) -> Result<()> {
  let mut params = CodecParameters::video(crate::codectags::CodecId::None, 0, 0, 25 * FRAME_RATE_BASE);
  params.codec_type = CodecType::Unknown;
  let mut state = MovStreamState::default();

  let start = ctx.io.tell() as u64;
  let end = start + body_len;
  while (ctx.io.tell() as u64) < end {
    let atom_start = ctx.io.tell() as u64;
    let size = ctx.io.get_be32()? as u64;
    let mut kind = [0u8; 4];
    ctx.io.get_buffer(&mut kind)?;
    if size < 8 {
      break;
    }
    let body = size - 8;

    match &kind {
      b"mdia" => read_mdia(ctx, body, &mut params, &mut state)?,
      _ => skip(ctx, body)?,
    }
    let consumed = (ctx.io.tell() as u64) - atom_start;
    if consumed < size {
      skip(ctx, size - consumed)?;
    }
  }

  let index = ctx.streams.len();
  let time_base = if params.codec_type == CodecType::Audio && params.sample_rate > 0 {
    Rational::new(1, params.sample_rate as i64)
  } else {
    Rational::new(1, 1000)
  };
  let mut stream = Stream::new(index, time_base, params);
  state.visible = stream.parameters.codec_type != CodecType::Unknown;
  stream.set_private(StreamPrivate::Mov(state));
  ctx.add_stream(stream)?;
  Ok(())
}

fn read_mdia(
  ctx: &mut FormatContext,
  body_len: u64,
  params: &mut CodecParameters,
  state: &mut MovStreamState,
) -> Result<()> {
  read_container_body(ctx, body_len, &mut |ctx, kind, len| match kind {
    b"hdlr" => read_hdlr(ctx, len, params),
    b"minf" => read_minf(ctx, len, params, state),
    _ => skip(ctx, len),
  })
}

fn read_hdlr(ctx: &mut FormatContext, body_len: u64, params: &mut CodecParameters) -> Result<()> {
  let start = ctx.io.tell() as u64;
  ctx.io.get_be32()?; // version+flags
  ctx.io.get_be32()?; // predefined/component type
  let mut subtype = [0u8; 4];
  ctx.io.get_buffer(&mut subtype)?;
  params.codec_type = match &subtype {
    b"soun" => CodecType::Audio,
    b"vide" => CodecType::Video,
    _ => CodecType::Unknown,
  };
  let consumed = (ctx.io.tell() as u64) - start;
  skip(ctx, body_len.saturating_sub(consumed))
}

fn read_minf(
  ctx: &mut FormatContext,
  body_len: u64,
  params: &mut CodecParameters,
  state: &mut MovStreamState,
) -> Result<()> {
  read_container_body(ctx, body_len, &mut |ctx, kind, len| match kind {
    b"stbl" => read_stbl(ctx, len, params, state),
    _ => skip(ctx, len),
  })
}

fn read_stbl(
  ctx: &mut FormatContext,
  body_len: u64,
  params: &mut CodecParameters,
  state: &mut MovStreamState,
) -> Result<()> {
  read_container_body(ctx, body_len, &mut |ctx, kind, len| match kind {
    b"stsd" => read_stsd(ctx, len, params),
    b"stco" => read_stco(ctx, len, state),
    b"co64" => read_co64(ctx, len, state),
    b"stsc" => read_stsc(ctx, len, state),
    b"stsz" => read_stsz(ctx, len, state),
    _ => skip(ctx, len),
  })
}

fn read_stsd(ctx: &mut FormatContext, body_len: u64, params: &mut CodecParameters) -> Result<()> {
  let start = ctx.io.tell() as u64;
  ctx.io.get_be32()?; // version+flags
  let entry_count = ctx.io.get_be32()?;
  if entry_count > 0 {
    ctx.io.get_be32()?; // sample description size
    let mut fourcc_bytes = [0u8; 4];
    ctx.io.get_buffer(&mut fourcc_bytes)?;
    let fourcc = codectags::fourcc(fourcc_bytes);
    ctx.io.get_buffer(&mut [0u8; 6])?; // reserved
    ctx.io.get_be16()?; // data reference index

    match params.codec_type {
      CodecType::Audio => {
        ctx.io.get_be32()?; // version/revision
        ctx.io.get_be32()?; // vendor
        let channels = ctx.io.get_be16()?;
        let sample_size = ctx.io.get_be16()?;
        ctx.io.get_be16()?; // compression id
        ctx.io.get_be16()?; // packet size
        let sample_rate = (ctx.io.get_be32()? >> 16) as u32;
        params.codec_id = codectags::get_id(CODEC_MOV_AUDIO_TAGS, fourcc);
        params.codec_tag = fourcc;
        params.channels = channels;
        params.bits_per_sample = sample_size;
        params.sample_rate = sample_rate;
      }
      CodecType::Video => {
        ctx.io.get_be16()?; // version
        ctx.io.get_be16()?; // revision
        ctx.io.get_be32()?; // vendor
        ctx.io.get_be32()?; // temporal quality
        ctx.io.get_be32()?; // spatial quality
        let width = ctx.io.get_be16()? as u32;
        let height = ctx.io.get_be16()? as u32;
        params.codec_id = codectags::get_id(CODEC_MOV_VIDEO_TAGS, fourcc);
        params.codec_tag = fourcc;
        params.width = width;
        params.height = height;
      }
      CodecType::Unknown => {}
    }
  }
  let consumed = (ctx.io.tell() as u64) - start;
  skip(ctx, body_len.saturating_sub(consumed))
}

fn read_stco(ctx: &mut FormatContext, body_len: u64, state: &mut MovStreamState) -> Result<()> {
  let start = ctx.io.tell() as u64;
  ctx.io.get_be32()?; // version+flags
  let count = ctx.io.get_be32()?;
  state.chunk_offsets = (0..count).map(|_| ctx.io.get_be32().map(|v| v as u64)).collect::<Result<_>>()?;
  let consumed = (ctx.io.tell() as u64) - start;
  skip(ctx, body_len.saturating_sub(consumed))
}

fn read_co64(ctx: &mut FormatContext, body_len: u64, state: &mut MovStreamState) -> Result<()> {
  let start = ctx.io.tell() as u64;
  ctx.io.get_be32()?; // version+flags
  let count = ctx.io.get_be32()?;
  state.chunk_offsets = (0..count).map(|_| ctx.io.get_be64()).collect::<Result<_>>()?;
  let consumed = (ctx.io.tell() as u64) - start;
  skip(ctx, body_len.saturating_sub(consumed))
}

fn read_stsc(ctx: &mut FormatContext, body_len: u64, state: &mut MovStreamState) -> Result<()> {
  let start = ctx.io.tell() as u64;
  ctx.io.get_be32()?; // version+flags
  let count = ctx.io.get_be32()?;
  let mut runs = Vec::with_capacity(count as usize);
  for _ in 0..count {
    let first_chunk = ctx.io.get_be32()?;
    let samples_per_chunk = ctx.io.get_be32()?;
    ctx.io.get_be32()?; // sample description index
    runs.push((first_chunk, samples_per_chunk));
  }
  state.sample_to_chunk = runs;
  let consumed = (ctx.io.tell() as u64) - start;
  skip(ctx, body_len.saturating_sub(consumed))
}

fn read_stsz(ctx: &mut FormatContext, body_len: u64, state: &mut MovStreamState) -> Result<()> {
  let start = ctx.io.tell() as u64;
  ctx.io.get_be32()?; // version+flags
  let uniform_size = ctx.io.get_be32()?;
  let count = ctx.io.get_be32()?;
  state.sample_size = if uniform_size != 0 {
    SampleSize::Constant(uniform_size)
  } else {
    let sizes = (0..count).map(|_| ctx.io.get_be32()).collect::<Result<_>>()?;
    SampleSize::PerSample(sizes)
  };
  let consumed = (ctx.io.tell() as u64) - start;
  skip(ctx, body_len.saturating_sub(consumed))
}

/// Walk a container atom's direct children, invoking `f` for each with
/// its declared body length, until `body_len` bytes have been consumed.
fn read_container_body(
  ctx: &mut FormatContext,
  body_len: u64,
  f: &mut dyn FnMut(&mut FormatContext, &[u8; 4], u64) -> Result<()>,
) -> Result<()> {
  let start = ctx.io.tell() as u64;
  let end = start + body_len;
  while (ctx.io.tell() as u64) < end {
    let atom_start = ctx.io.tell() as u64;
    let size = ctx.io.get_be32()? as u64;
    let mut kind = [0u8; 4];
    ctx.io.get_buffer(&mut kind)?;
    if size < 8 {
      break;
    }
    let body = size - 8;
    f(ctx, &kind, body)?;
    let consumed = (ctx.io.tell() as u64) - atom_start;
    if consumed < size {
      skip(ctx, size - consumed)?;
    }
  }
  Ok(())
}

fn skip(ctx: &mut FormatContext, n: u64) -> Result<()> {
  let mut remaining = n as usize;
  let mut buf = [0u8; 512];
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

  fn atom(kind: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&((8 + body.len()) as u32).to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(body);
    out
  }

  fn stsd_body(codec_type: CodecType) -> Vec<u8> {
    let mut entry = Vec::new();
    entry.extend_from_slice(&0u32.to_be_bytes()); // sample description size (unused here)
    match codec_type {
      CodecType::Video => {
        entry.extend_from_slice(b"raw ");
        entry.extend_from_slice(&[0u8; 6]);
        entry.extend_from_slice(&0u16.to_be_bytes());
        entry.extend_from_slice(&[0u8; 16]);
        entry.extend_from_slice(&16u16.to_be_bytes()); // width
        entry.extend_from_slice(&16u16.to_be_bytes()); // height
        entry.extend_from_slice(&[0u8; 14]);
      }
      _ => unreachable!(),
    }
    let mut body = Vec::new();
    body.extend_from_slice(&0u32.to_be_bytes());
    body.extend_from_slice(&1u32.to_be_bytes());
    body.extend_from_slice(&entry);
    body
  }

  fn build_trak(offsets: &[u32]) -> Vec<u8> {
    let hdlr_body = {
      let mut b = Vec::new();
      b.extend_from_slice(&0u32.to_be_bytes());
      b.extend_from_slice(&0u32.to_be_bytes());
      b.extend_from_slice(b"vide");
      b.extend_from_slice(&[0u8; 12]);
      b
    };
    let stsd = atom(b"stsd", &stsd_body(CodecType::Video));
    let mut stco_body = Vec::new();
    stco_body.extend_from_slice(&0u32.to_be_bytes());
    stco_body.extend_from_slice(&(offsets.len() as u32).to_be_bytes());
    for &o in offsets {
      stco_body.extend_from_slice(&o.to_be_bytes());
    }
    let stco = atom(b"stco", &stco_body);
    let mut stsc_body = Vec::new();
    stsc_body.extend_from_slice(&0u32.to_be_bytes());
    stsc_body.extend_from_slice(&1u32.to_be_bytes());
    stsc_body.extend_from_slice(&1u32.to_be_bytes());
    stsc_body.extend_from_slice(&1u32.to_be_bytes());
    stsc_body.extend_from_slice(&1u32.to_be_bytes());
    let stsc = atom(b"stsc", &stsc_body);
    let mut stsz_body = Vec::new();
    stsz_body.extend_from_slice(&0u32.to_be_bytes());
    stsz_body.extend_from_slice(&4u32.to_be_bytes()); // uniform size
    stsz_body.extend_from_slice(&(offsets.len() as u32).to_be_bytes());
    let stsz = atom(b"stsz", &stsz_body);

    let mut stbl_body = Vec::new();
    stbl_body.extend_from_slice(&stsd);
    stbl_body.extend_from_slice(&stco);
    stbl_body.extend_from_slice(&stsc);
    stbl_body.extend_from_slice(&stsz);
    let stbl = atom(b"stbl", &stbl_body);

    let minf = atom(b"minf", &stbl);
    let mut mdia_body = Vec::new();
    mdia_body.extend_from_slice(&atom(b"hdlr", &hdlr_body));
    mdia_body.extend_from_slice(&minf);
    let mdia = atom(b"mdia", &mdia_body);

    atom(b"trak", &mdia)
  }

  #[test]
  fn s5_chunk_order_interleaves_two_streams() {
    // `stco` entries are fixed-width regardless of value, so moov's byte
    // size (and hence where mdat starts) does not depend on the offsets
    // we choose — compute it first with placeholder offsets, then bake
    // in absolute offsets that land inside the mdat body that follows.
    let placeholder = build_trak(&[0, 0]);
    let moov_len_with_two_traks = 8 + placeholder.len() * 2;
    let mdat_start = (moov_len_with_two_traks + 8) as u32;

    // Relative placement within mdat mirrors the spec scenario's
    // interleaved pattern: stream A at [100, 300], stream B at [200, 400].
    let trak_a = build_trak(&[mdat_start + 100, mdat_start + 300]);
    let trak_b = build_trak(&[mdat_start + 200, mdat_start + 400]);
    let mut moov_body = Vec::new();
    moov_body.extend_from_slice(&trak_a);
    moov_body.extend_from_slice(&trak_b);
    let moov = atom(b"moov", &moov_body);
    assert_eq!(moov.len() as u32, mdat_start - 8);

    let mdat_body_len = 400 + 4;
    let mut mdat_body = vec![0u8; mdat_body_len];
    for (label, rel) in [(1u8, 100usize), (2, 200), (3, 300), (4, 400)] {
      mdat_body[rel..rel + 4].copy_from_slice(&[label; 4]);
    }
    let mdat = atom(b"mdat", &mdat_body);

    let mut bytes = Vec::new();
    bytes.extend_from_slice(&moov);
    bytes.extend_from_slice(&mdat);

    let mut ctx = FormatContext {
      io: ByteIoContext::open_buf(bytes, false),
      filename: "in.mov".into(),
      streams: Vec::new(),
      metadata: super::super::Metadata::default(),
      deferred_packets: std::collections::VecDeque::new(),
    };
    let mut demuxer = MovDemuxer::default();
    demuxer.read_header(&mut ctx).unwrap();
    assert_eq!(ctx.streams.len(), 2);

    let labels: Vec<u8> = (0..4)
      .map(|_| demuxer.read_packet(&mut ctx).unwrap().data()[0])
      .collect();
    assert_eq!(labels, vec![1, 2, 3, 4]);
  }
}
