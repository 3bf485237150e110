//! Raw image-sequence muxer/demuxer: PGM/PGMYUV/PPM framing with a P5/P6
//! header, plus headerless YUV, each frame its own file produced from a
//! `printf`-style `%0Nd` filename template.

use crate::error::{Error, Result};
use crate::packet::Packet;
use crate::rational::{Rational, FRAME_RATE_BASE};
use crate::stream::{CodecParameters, Stream};

use super::registry::{InputFormatDescriptor, OutputFormatDescriptor};
use super::{Demuxer, FormatContext, Muxer};

/// Substitute a `%0Nd` (or bare `%d`) printf-style placeholder in
/// `template` with `index`, zero-padded to `N` digits.
///
/// `"out%03d.pgm"` with `index=7` becomes `"out007.pgm"`.
pub fn expand_template(template: &str, index: u64) -> Result<String> {
  let Some(pct) = template.find('%') else {
    return Ok(template.to_string());
  };
  let rest = &template[pct + 1..];
  let digit_end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
  let width_str = &rest[..digit_end];
  let after_width = &rest[digit_end..];
  if !after_width.starts_with('d') {
    return Err(Error::InvalidData(format!("unsupported template conversion in {template:?}")));
  }
  let width: usize = width_str.parse().unwrap_or(0);
  let number = format!("{index:0width$}", width = width);
  Ok(format!("{}{}{}", &template[..pct], number, &after_width[1..]))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageVariant {
  Pgm,
  Pgmyuv,
  Ppm,
  Yuv,
}

pub struct ImageMuxer {
  variant: ImageVariant,
  index: u64,
}

impl ImageMuxer {
  fn new(variant: ImageVariant) -> Self {
    Self { variant, index: 0 }
  }
}

impl Muxer for ImageMuxer {
  fn write_header(&mut self, _ctx: &mut FormatContext) -> Result<()> {
    Ok(())
  }

  fn write_packet(&mut self, ctx: &mut FormatContext, packet: &Packet) -> Result<()> {
    let stream = ctx.stream(packet.stream_index())?;
    let (width, height) = (stream.parameters.width, stream.parameters.height);
    match self.variant {
      ImageVariant::Pgm => {
        let header = format!("P5\n{width} {height}\n255\n");
        ctx.io.put_buffer(header.as_bytes())?;
        ctx.io.put_buffer(packet.data())?;
      }
      ImageVariant::Pgmyuv => {
        let header = format!("P5\n{width} {}\n255\n", height + height / 2);
        ctx.io.put_buffer(header.as_bytes())?;
        ctx.io.put_buffer(packet.data())?;
      }
      ImageVariant::Ppm => {
        let header = format!("P6\n{width} {height}\n255\n");
        ctx.io.put_buffer(header.as_bytes())?;
        ctx.io.put_buffer(packet.data())?;
      }
      ImageVariant::Yuv => {
        ctx.io.put_buffer(packet.data())?;
      }
    }
    self.index += 1;
    Ok(())
  }

  fn write_trailer(&mut self, ctx: &mut FormatContext) -> Result<()> {
    ctx.io.put_flush_packet()
  }
}

pub struct ImageDemuxer {
  variant: ImageVariant,
}

impl ImageDemuxer {
  fn new(variant: ImageVariant) -> Self {
    Self { variant }
  }
}

impl Demuxer for ImageDemuxer {
  fn read_header(&mut self, ctx: &mut FormatContext) -> Result<()> {
    match self.variant {
      ImageVariant::Yuv => {
        // No self-describing header; width/height must come from the
        // caller's stream options in a real deployment. Here a 0x0
        // placeholder is recorded and the demuxer reads to EOF per call.
        let params = CodecParameters::video(crate::codectags::CodecId::RawVideo, 0, 0, 25 * FRAME_RATE_BASE);
        ctx.add_stream(Stream::new(0, Rational::new(1, 25), params))?;
      }
      _ => {
        let (magic, width, height) = read_netpbm_header(ctx)?;
        let expected_magic = match self.variant {
          ImageVariant::Ppm => "P6",
          _ => "P5",
        };
        if magic != expected_magic {
          return Err(Error::InvalidData(format!("expected {expected_magic}, found {magic}")));
        }
        let params = CodecParameters::video(crate::codectags::CodecId::RawVideo, width, height, 25 * FRAME_RATE_BASE);
        ctx.add_stream(Stream::new(0, Rational::new(1, 25), params))?;
        // Rewind: the frame body still needs to be read by read_packet.
        ctx.io.fseek(0, crate::protocol::Whence::Set)?;
      }
    }
    Ok(())
  }

  fn read_packet(&mut self, ctx: &mut FormatContext) -> Result<Packet> {
    match self.variant {
      ImageVariant::Yuv => {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
          let n = ctx.io.get_buffer(&mut chunk)?;
          if n == 0 {
            break;
          }
          buf.extend_from_slice(&chunk[..n]);
        }
        if buf.is_empty() {
          return Err(Error::Eof);
        }
        let mut packet = Packet::from_bytes(buf);
        packet.set_key(true);
        Ok(packet)
      }
      _ => {
        let (_, width, height) = read_netpbm_header(ctx)?;
        let samples = width as usize
          * match self.variant {
            ImageVariant::Pgmyuv => height as usize + height as usize / 2,
            _ => height as usize,
          };
        let channels = if matches!(self.variant, ImageVariant::Ppm) { 3 } else { 1 };
        let mut buf = vec![0u8; samples * channels];
        let read = ctx.io.get_buffer(&mut buf)?;
        if read != buf.len() {
          return Err(Error::Eof);
        }
        let mut packet = Packet::from_bytes(buf);
        packet.set_key(true);
        Ok(packet)
      }
    }
  }
}

/// Parse a PNM (`P5`/`P6`) header: magic, whitespace, width, height,
/// maxval, then exactly one whitespace byte before the pixel data.
/// `#`-led comments are skipped wherever whitespace is expected, per the
/// PNM convention.
fn read_netpbm_header(ctx: &mut FormatContext) -> Result<(String, u32, u32)> {
  let magic = read_token(ctx)?;
  let width: u32 = read_token(ctx)?.parse().map_err(|_| Error::InvalidData("bad width".into()))?;
  let height: u32 = read_token(ctx)?.parse().map_err(|_| Error::InvalidData("bad height".into()))?;
  let _maxval = read_token(ctx)?;
  Ok((magic, width, height))
}

fn read_token(ctx: &mut FormatContext) -> Result<String> {
  let mut out = String::new();
  loop {
    let byte = ctx.io.get_byte()?;
    if byte == b'#' {
      while ctx.io.get_byte()? != b'\n' {}
      continue;
    }
    if byte.is_ascii_whitespace() {
      if out.is_empty() {
        continue;
      }
      break;
    }
    out.push(byte as char);
  }
  Ok(out)
}

pub fn register(inputs: &mut Vec<InputFormatDescriptor>, outputs: &mut Vec<OutputFormatDescriptor>) {
  inputs.push(InputFormatDescriptor {
    name: "pgm",
    mime_type: "image/x-portable-graymap",
    extensions: "pgm",
    make: || Box::new(ImageDemuxer::new(ImageVariant::Pgm)),
  });
  outputs.push(OutputFormatDescriptor {
    name: "pgm",
    mime_type: "image/x-portable-graymap",
    extensions: "pgm",
    needs_number: true,
    make: || Box::new(ImageMuxer::new(ImageVariant::Pgm)),
  });

  inputs.push(InputFormatDescriptor {
    name: "pgmyuv",
    mime_type: "image/x-portable-graymap",
    extensions: "pgm",
    make: || Box::new(ImageDemuxer::new(ImageVariant::Pgmyuv)),
  });
  outputs.push(OutputFormatDescriptor {
    name: "pgmyuv",
    mime_type: "image/x-portable-graymap",
    extensions: "pgm",
    needs_number: true,
    make: || Box::new(ImageMuxer::new(ImageVariant::Pgmyuv)),
  });

  inputs.push(InputFormatDescriptor {
    name: "ppm",
    mime_type: "image/x-portable-pixmap",
    extensions: "ppm",
    make: || Box::new(ImageDemuxer::new(ImageVariant::Ppm)),
  });
  outputs.push(OutputFormatDescriptor {
    name: "ppm",
    mime_type: "image/x-portable-pixmap",
    extensions: "ppm",
    needs_number: true,
    make: || Box::new(ImageMuxer::new(ImageVariant::Ppm)),
  });

  inputs.push(InputFormatDescriptor {
    name: "yuv",
    mime_type: "video/x-raw-yuv",
    extensions: "yuv",
    make: || Box::new(ImageDemuxer::new(ImageVariant::Yuv)),
  });
  outputs.push(OutputFormatDescriptor {
    name: "yuv",
    mime_type: "video/x-raw-yuv",
    extensions: "yuv",
    needs_number: true,
    make: || Box::new(ImageMuxer::new(ImageVariant::Yuv)),
  });
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ioctx::ByteIoContext;

  #[test]
  fn template_zero_pads_index() {
    assert_eq!(expand_template("out%03d.pgm", 7).unwrap(), "out007.pgm");
    assert_eq!(expand_template("out%03d.pgm", 1234).unwrap(), "out1234.pgm");
    assert_eq!(expand_template("frame%d.ppm", 5).unwrap(), "frame5.ppm");
    assert_eq!(expand_template("static.pgm", 5).unwrap(), "static.pgm");
  }

  fn make_context(data: Vec<u8>) -> FormatContext {
    FormatContext {
      io: ByteIoContext::open_buf(data, false),
      filename: String::new(),
      streams: Vec::new(),
      metadata: super::super::Metadata::default(),
      deferred_packets: std::collections::VecDeque::new(),
    }
  }

  #[test]
  fn pgm_header_parses_width_height_and_skips_comment() {
    let mut ctx = make_context(b"P5\n# a comment\n4 2\n255\n\x01\x02\x03\x04\x05\x06\x07\x08".to_vec());
    let mut demuxer = ImageDemuxer::new(ImageVariant::Pgm);
    demuxer.read_header(&mut ctx).unwrap();
    assert_eq!(ctx.streams[0].parameters.width, 4);
    assert_eq!(ctx.streams[0].parameters.height, 2);

    let packet = demuxer.read_packet(&mut ctx).unwrap();
    assert_eq!(packet.size(), 8);
  }

  #[test]
  fn ppm_header_rejects_pgm_magic() {
    let mut ctx = make_context(b"P5\n4 2\n255\n\x00\x00\x00\x00\x00\x00\x00\x00".to_vec());
    let mut demuxer = ImageDemuxer::new(ImageVariant::Ppm);
    assert!(demuxer.read_header(&mut ctx).is_err());
  }
}
